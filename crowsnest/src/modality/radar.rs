//! Sim radar adapter: power/gain/clutter knobs. Needs a few dwells to
//! integrate before the analyzer trusts a return, so it confirms from the
//! third dwell onward and renders a scope snapshot when it does.

use async_trait::async_trait;
use shared_types::{ArtifactRef, Decision, ModalityKind, Observation, Tile};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::capability::CapabilityProfile;

use super::{AdapterError, ModalityAdapter, SimStep};

// PNG signature + IEND; a placeholder scope render.
const SCOPE_STUB: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
    0x44,
];

pub struct SimRadarAdapter {
    profile: CapabilityProfile,
    artifact_dir: PathBuf,
    dwells: AtomicU32,
    script: Mutex<VecDeque<SimStep>>,
    /// First dwell index (1-based) that confirms; every later dwell also
    /// confirms. None never confirms.
    confirm_from: Option<u32>,
}

impl SimRadarAdapter {
    pub fn new(profile: CapabilityProfile, artifact_dir: PathBuf) -> Self {
        Self {
            profile,
            artifact_dir,
            dwells: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            confirm_from: Some(3),
        }
    }

    pub fn with_script(self, steps: Vec<SimStep>) -> Self {
        *self.script.lock().expect("sim script lock poisoned") = steps.into();
        self
    }

    pub fn confirm_from(mut self, dwell: u32) -> Self {
        self.confirm_from = Some(dwell);
        self
    }

    pub fn never_confirms(mut self) -> Self {
        self.confirm_from = None;
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
        match self.confirm_from {
            Some(n) if count >= n => SimStep::Confirmed,
            _ => SimStep::NotConfirmed,
        }
    }

    async fn write_scope(&self) -> Option<ArtifactRef> {
        let path = self.artifact_dir.join("heatmap.png");
        if let Err(e) = tokio::fs::create_dir_all(&self.artifact_dir).await {
            tracing::warn!(error = %e, "Could not create artifact directory");
            return None;
        }
        match tokio::fs::write(&path, SCOPE_STUB).await {
            Ok(()) => Some(ArtifactRef {
                path: path.to_string_lossy().into_owned(),
                content_type: "image/png".to_string(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Scope render write failed; continuing without artifact");
                None
            }
        }
    }
}

#[async_trait]
impl ModalityAdapter for SimRadarAdapter {
    fn kind(&self) -> ModalityKind {
        ModalityKind::Radar
    }

    fn capabilities(&self) -> CapabilityProfile {
        self.profile.clone()
    }

    fn current_state(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "radar",
            "dwells": self.dwells.load(Ordering::SeqCst),
            "artifact_dir": self.artifact_dir.to_string_lossy(),
        })
    }

    async fn execute_tile(&self, tile: &Tile) -> Result<(Observation, Decision), AdapterError> {
        tokio::time::sleep(Duration::from_millis(tile.dwell_ms.min(50))).await;

        match self.next_step() {
            SimStep::Hang => std::future::pending().await,
            SimStep::Fatal(message) => Err(AdapterError::Fatal(message)),
            SimStep::Confirmed => {
                let artifact = self.write_scope().await;
                let observation = Observation {
                    features: BTreeMap::from([
                        ("analyzer_score".to_string(), 0.9),
                        ("return_strength".to_string(), 0.7),
                    ]),
                    artifact,
                };
                let decision = Decision {
                    confirmed: true,
                    score: 0.9,
                    meta: serde_json::json!({"analyzer": "sim_radar"}),
                };
                Ok((observation, decision))
            }
            SimStep::NotConfirmed => {
                let observation = Observation {
                    features: BTreeMap::from([
                        ("analyzer_score".to_string(), 0.2),
                        ("return_strength".to_string(), 0.1),
                    ]),
                    artifact: None,
                };
                let decision = Decision {
                    confirmed: false,
                    score: 0.2,
                    meta: serde_json::json!({"analyzer": "sim_radar"}),
                };
                Ok((observation, decision))
            }
        }
    }
}
