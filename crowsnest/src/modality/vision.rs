//! Sim camera adapter: zoom is the only settable knob. Confirms on the
//! second dwell by default and drops a frame grab next to the task data.

use async_trait::async_trait;
use shared_types::{ArtifactRef, Decision, ModalityKind, Observation, Tile};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::capability::CapabilityProfile;

use super::{AdapterError, ModalityAdapter, SimStep};

// JPEG SOI/APP0 header; enough for content sniffing on the review UI.
const FRAME_STUB: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0xFF, 0xD9,
];

pub struct SimVisionAdapter {
    profile: CapabilityProfile,
    artifact_dir: PathBuf,
    dwells: AtomicU32,
    script: Mutex<VecDeque<SimStep>>,
    /// Dwell index (1-based) that confirms; None never confirms
    confirm_on: Option<u32>,
}

impl SimVisionAdapter {
    pub fn new(profile: CapabilityProfile, artifact_dir: PathBuf) -> Self {
        Self {
            profile,
            artifact_dir,
            dwells: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            confirm_on: Some(2),
        }
    }

    pub fn with_script(self, steps: Vec<SimStep>) -> Self {
        *self.script.lock().expect("sim script lock poisoned") = steps.into();
        self
    }

    pub fn confirm_on(mut self, dwell: u32) -> Self {
        self.confirm_on = Some(dwell);
        self
    }

    pub fn never_confirms(mut self) -> Self {
        self.confirm_on = None;
        self
    }

    fn next_step(&self) -> SimStep {
        if let Some(step) = self
            .script
            .lock()
            .expect("sim script lock poisoned")
            .pop_front()
        {
            self.dwells.fetch_add(1, Ordering::SeqCst);
            return step;
        }
        let count = self.dwells.fetch_add(1, Ordering::SeqCst) + 1;
        match self.confirm_on {
            Some(n) if count == n => SimStep::Confirmed,
            _ => SimStep::NotConfirmed,
        }
    }

    async fn write_frame(&self) -> Option<ArtifactRef> {
        let path = self.artifact_dir.join("artifact.jpg");
        if let Err(e) = tokio::fs::create_dir_all(&self.artifact_dir).await {
            tracing::warn!(error = %e, "Could not create artifact directory");
            return None;
        }
        match tokio::fs::write(&path, FRAME_STUB).await {
            Ok(()) => Some(ArtifactRef {
                path: path.to_string_lossy().into_owned(),
                content_type: "image/jpeg".to_string(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Frame grab write failed; continuing without artifact");
                None
            }
        }
    }
}

#[async_trait]
impl ModalityAdapter for SimVisionAdapter {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Vision
    }

    fn capabilities(&self) -> CapabilityProfile {
        self.profile.clone()
    }

    fn current_state(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "vision",
            "dwells": self.dwells.load(Ordering::SeqCst),
            "artifact_dir": self.artifact_dir.to_string_lossy(),
        })
    }

    async fn execute_tile(&self, tile: &Tile) -> Result<(Observation, Decision), AdapterError> {
        // The sim analyzer scores well inside the SLA.
        tokio::time::sleep(Duration::from_millis(tile.dwell_ms.min(50))).await;

        match self.next_step() {
            SimStep::Hang => std::future::pending().await,
            SimStep::Fatal(message) => Err(AdapterError::Fatal(message)),
            SimStep::Confirmed => {
                let artifact = self.write_frame().await;
                let observation = Observation {
                    features: BTreeMap::from([("analyzer_score".to_string(), 0.9)]),
                    artifact,
                };
                let decision = Decision {
                    confirmed: true,
                    score: 0.9,
                    meta: serde_json::json!({"analyzer": "sim_vision"}),
                };
                Ok((observation, decision))
            }
            SimStep::NotConfirmed => {
                let observation = Observation {
                    features: BTreeMap::from([("analyzer_score".to_string(), 0.2)]),
                    artifact: None,
                };
                let decision = Decision {
                    confirmed: false,
                    score: 0.2,
                    meta: serde_json::json!({"analyzer": "sim_vision"}),
                };
                Ok((observation, decision))
            }
        }
    }
}
