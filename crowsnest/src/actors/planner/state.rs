//! Search task state management
//!
//! One `SearchTask` tracks a single cue through the planner state machine:
//! the tile plan and cursor, the executed-tile log, budgets, and the
//! negative-information belief map. The actor owns exactly one of these at
//! a time; everything here is synchronous bookkeeping.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use shared_types::{
    ArtifactRef, Cue, Decision, DwellOutcome, FailureReason, Observation, PlannerStatus,
    SearchResult, SearchState, Tile, TileRecord,
};

use crate::capability::ClampNote;
use crate::config::BudgetConfig;

use super::belief::BearingBelief;

/// Result of the pre-dispatch budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Ok,
    TilesExhausted,
    TimeExhausted,
}

/// Choose the next tile to dispatch given the remaining plan and the
/// decision history so far. Pure: replay with the same inputs picks the
/// same tile. Today this is plan order; the history argument is the seam
/// for belief-driven reordering.
pub fn select_next_tile(plan: &[Tile], cursor: usize, _history: &[TileRecord]) -> Option<usize> {
    if cursor < plan.len() {
        Some(cursor)
    } else {
        None
    }
}

/// Legal state-machine moves. Preemption re-enters `Planning` from any
/// active state; terminal states return to `Idle` immediately.
pub fn can_transition(from: SearchState, to: SearchState) -> bool {
    use SearchState::*;
    matches!(
        (from, to),
        (Idle, Planning)
            | (Planning, ExecutingTile)
            | (Planning, Failed)
            | (Planning, Planning)
            | (ExecutingTile, AwaitingAnalysis)
            | (ExecutingTile, Failed)
            | (ExecutingTile, Planning)
            | (AwaitingAnalysis, Done)
            | (AwaitingAnalysis, Replan)
            | (AwaitingAnalysis, Failed)
            | (AwaitingAnalysis, Planning)
            | (Replan, ExecutingTile)
            | (Replan, Failed)
            | (Done, Idle)
            | (Failed, Idle)
    )
}

/// One in-flight search bound to one cue.
pub struct SearchTask {
    pub task_id: String,
    pub cue: Cue,
    pub state: SearchState,

    pub plan: Vec<Tile>,
    pub cursor: usize,

    pub executed: Vec<TileRecord>,
    pub executed_tiles: u32,
    pub timeouts: u32,
    pub consecutive_timeouts: u32,
    pub clamp_notes: Vec<ClampNote>,

    pub started_at: DateTime<Utc>,
    started_instant: Instant,
    deadline: Instant,
    max_tiles: u32,

    pub last_tile: Option<Tile>,
    pub artifact: Option<ArtifactRef>,
    pub belief: BearingBelief,

    /// Monotonic sequence for dispatches; outcomes carrying an older
    /// sequence are stale and ignored
    pub tile_seq: u64,
    sighting_published: bool,
}

impl SearchTask {
    pub fn new(cue: Cue, budgets: &BudgetConfig) -> Self {
        let now = Instant::now();
        Self {
            task_id: ulid::Ulid::new().to_string(),
            cue,
            state: SearchState::Planning,
            plan: Vec::new(),
            cursor: 0,
            executed: Vec::new(),
            executed_tiles: 0,
            timeouts: 0,
            consecutive_timeouts: 0,
            clamp_notes: Vec::new(),
            started_at: Utc::now(),
            started_instant: now,
            deadline: now + std::time::Duration::from_millis(budgets.time_budget_ms),
            max_tiles: budgets.max_tiles,
            last_tile: None,
            artifact: None,
            belief: BearingBelief::default(),
            tile_seq: 0,
            sighting_published: false,
        }
    }

    pub fn transition(&mut self, to: SearchState) {
        if !can_transition(self.state, to) {
            tracing::warn!(
                task_id = %self.task_id,
                from = %self.state,
                to = %to,
                "Illegal state transition"
            );
            debug_assert!(false, "illegal transition {} -> {}", self.state, to);
        }
        tracing::debug!(task_id = %self.task_id, from = %self.state, to = %to, "State transition");
        self.state = to;
    }

    /// Checked before every dispatch, never after: one in-flight tile may
    /// finish past the boundary, but no new tile starts after exhaustion.
    pub fn budget_check(&self, now: Instant) -> BudgetCheck {
        if self.executed_tiles >= self.max_tiles {
            return BudgetCheck::TilesExhausted;
        }
        if now >= self.deadline {
            return BudgetCheck::TimeExhausted;
        }
        BudgetCheck::Ok
    }

    /// Exhaustion before any dispatch is a configuration problem;
    /// afterwards it is the normal no-detection outcome.
    pub fn exhaustion_reason(&self) -> FailureReason {
        if self.executed.is_empty() {
            FailureReason::ZeroBudget
        } else {
            FailureReason::NoDetection
        }
    }

    pub fn next_tile_index(&self) -> Option<usize> {
        select_next_tile(&self.plan, self.cursor, &self.executed)
    }

    /// Consume the tile at `index` and hand it to a dispatch. Returns the
    /// dispatch sequence number the outcome must echo.
    pub fn begin_dispatch(&mut self, index: usize, gated: Tile, notes: Vec<ClampNote>) -> u64 {
        self.cursor = index + 1;
        self.tile_seq += 1;
        self.last_tile = Some(gated);
        self.clamp_notes.extend(notes);
        self.transition(SearchState::ExecutingTile);
        self.tile_seq
    }

    pub fn record_decision(
        &mut self,
        observation: &Observation,
        decision: Decision,
        elapsed_ms: u64,
    ) {
        let Some(tile) = self.last_tile.clone() else {
            tracing::warn!(task_id = %self.task_id, "Decision with no tile in flight");
            return;
        };
        self.executed_tiles += 1;
        self.consecutive_timeouts = 0;
        if let Some(artifact) = &observation.artifact {
            self.artifact = Some(artifact.clone());
        }
        if !decision.confirmed {
            self.belief.record_miss(tile.az_deg);
        }
        let outcome = if decision.confirmed {
            DwellOutcome::Confirmed
        } else {
            DwellOutcome::NotConfirmed
        };
        self.executed.push(TileRecord {
            tile,
            decision: Some(decision),
            outcome,
            elapsed_ms,
        });
    }

    pub fn record_timeout(&mut self, elapsed_ms: u64) {
        let Some(tile) = self.last_tile.clone() else {
            tracing::warn!(task_id = %self.task_id, "Timeout with no tile in flight");
            return;
        };
        self.timeouts += 1;
        self.consecutive_timeouts += 1;
        self.executed.push(TileRecord {
            tile,
            decision: None,
            outcome: DwellOutcome::TimedOut,
            elapsed_ms,
        });
    }

    pub fn record_fatal(&mut self, elapsed_ms: u64) {
        if let Some(tile) = self.last_tile.clone() {
            self.executed.push(TileRecord {
                tile,
                decision: None,
                outcome: DwellOutcome::Fatal,
                elapsed_ms,
            });
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_instant.elapsed().as_millis() as u64
    }

    pub fn time_remaining_ms(&self, now: Instant) -> u64 {
        self.deadline
            .saturating_duration_since(now)
            .as_millis() as u64
    }

    /// One sighting per task, ever. Returns false once spent.
    pub fn claim_sighting_publish(&mut self) -> bool {
        if self.sighting_published {
            return false;
        }
        self.sighting_published = true;
        true
    }

    pub fn success_result(&self, winning: TileRecord) -> SearchResult {
        SearchResult {
            task_id: self.task_id.clone(),
            found: true,
            time_to_first_true_ms: Some(self.elapsed_ms()),
            executed: self.executed.clone(),
            winning_tile: Some(winning.tile.clone()),
            winning_decision: winning.decision.clone(),
            artifact: self.artifact.clone(),
            failure: None,
            timeouts: self.timeouts,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure_result(&self, reason: FailureReason) -> SearchResult {
        SearchResult {
            task_id: self.task_id.clone(),
            found: false,
            time_to_first_true_ms: None,
            executed: self.executed.clone(),
            winning_tile: None,
            winning_decision: None,
            artifact: self.artifact.clone(),
            failure: Some(reason),
            timeouts: self.timeouts,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn status(&self, now: Instant) -> PlannerStatus {
        PlannerStatus {
            state: self.state.to_string(),
            task_id: Some(self.task_id.clone()),
            last_tile: self.last_tile.clone(),
            executed_tiles: self.executed_tiles,
            timeouts: self.timeouts,
            time_remaining_ms: Some(self.time_remaining_ms(now)),
            artifact: self.artifact.clone(),
            last_result_found: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ModalityKind;
    use std::collections::BTreeMap;

    fn cue() -> Cue {
        Cue {
            object_id: "c-1".to_string(),
            bearing_deg: 10.0,
            bearing_error_deg: 5.0,
            modality: ModalityKind::Vision,
            confidence: 80,
            priority: 0,
            received_at: Utc::now(),
            context: serde_json::Value::Null,
        }
    }

    fn budgets(time_ms: u64, tiles: u32) -> BudgetConfig {
        BudgetConfig {
            time_budget_ms: time_ms,
            max_tiles: tiles,
            max_consecutive_timeouts: 1,
        }
    }

    fn decision(confirmed: bool) -> Decision {
        Decision {
            confirmed,
            score: if confirmed { 0.9 } else { 0.2 },
            meta: serde_json::Value::Null,
        }
    }

    fn observation() -> Observation {
        Observation {
            features: BTreeMap::new(),
            artifact: None,
        }
    }

    #[test]
    fn transition_table() {
        use SearchState::*;
        assert!(can_transition(Idle, Planning));
        assert!(can_transition(Planning, ExecutingTile));
        assert!(can_transition(Planning, Failed));
        assert!(can_transition(ExecutingTile, AwaitingAnalysis));
        assert!(can_transition(AwaitingAnalysis, Done));
        assert!(can_transition(AwaitingAnalysis, Replan));
        assert!(can_transition(AwaitingAnalysis, Failed));
        assert!(can_transition(Replan, ExecutingTile));
        assert!(can_transition(Done, Idle));
        assert!(can_transition(Failed, Idle));
        // preemption re-enters planning from any active state
        assert!(can_transition(Planning, Planning));
        assert!(can_transition(ExecutingTile, Planning));
        assert!(can_transition(AwaitingAnalysis, Planning));

        assert!(!can_transition(Idle, ExecutingTile));
        assert!(!can_transition(Done, Planning));
        assert!(!can_transition(Replan, Done));
        assert!(!can_transition(AwaitingAnalysis, ExecutingTile));
    }

    #[test]
    fn next_tile_selection_is_plan_order_and_pure() {
        let plan = vec![
            Tile::new(0.0, 0.0, 150),
            Tile::new(2.0, 0.0, 150),
            Tile::new(4.0, 0.0, 150),
        ];
        assert_eq!(select_next_tile(&plan, 0, &[]), Some(0));
        assert_eq!(select_next_tile(&plan, 0, &[]), Some(0));
        assert_eq!(select_next_tile(&plan, 2, &[]), Some(2));
        assert_eq!(select_next_tile(&plan, 3, &[]), None);
    }

    #[test]
    fn tile_budget_enforced() {
        let mut task = SearchTask::new(cue(), &budgets(60_000, 2));
        task.plan = vec![Tile::new(0.0, 0.0, 10); 5];
        assert_eq!(task.budget_check(Instant::now()), BudgetCheck::Ok);

        for _ in 0..2 {
            let idx = task.next_tile_index().unwrap();
            let tile = task.plan[idx].clone();
            task.begin_dispatch(idx, tile, Vec::new());
            task.transition(SearchState::AwaitingAnalysis);
            task.record_decision(&observation(), decision(false), 5);
            task.transition(SearchState::Replan);
        }
        assert_eq!(task.budget_check(Instant::now()), BudgetCheck::TilesExhausted);
        assert_eq!(task.exhaustion_reason(), FailureReason::NoDetection);
    }

    #[test]
    fn zero_time_budget_exhausts_before_first_dispatch() {
        let task = SearchTask::new(cue(), &budgets(0, 12));
        assert_eq!(task.budget_check(Instant::now()), BudgetCheck::TimeExhausted);
        assert_eq!(task.exhaustion_reason(), FailureReason::ZeroBudget);
    }

    #[test]
    fn zero_tile_budget_exhausts_before_first_dispatch() {
        let task = SearchTask::new(cue(), &budgets(4000, 0));
        assert_eq!(task.budget_check(Instant::now()), BudgetCheck::TilesExhausted);
        assert_eq!(task.exhaustion_reason(), FailureReason::ZeroBudget);
    }

    #[test]
    fn timeout_counts_but_does_not_execute() {
        let mut task = SearchTask::new(cue(), &budgets(4000, 12));
        task.plan = vec![Tile::new(0.0, 0.0, 10); 3];

        let idx = task.next_tile_index().unwrap();
        let tile = task.plan[idx].clone();
        task.begin_dispatch(idx, tile, Vec::new());
        task.transition(SearchState::AwaitingAnalysis);
        task.record_timeout(800);

        assert_eq!(task.executed_tiles, 0);
        assert_eq!(task.timeouts, 1);
        assert_eq!(task.consecutive_timeouts, 1);
        assert_eq!(task.executed.len(), 1);
        assert_eq!(task.executed[0].outcome, DwellOutcome::TimedOut);
        // the tile was consumed: cursor moved on
        assert_eq!(task.next_tile_index(), Some(1));
    }

    #[test]
    fn decision_resets_consecutive_timeouts() {
        let mut task = SearchTask::new(cue(), &budgets(4000, 12));
        task.plan = vec![Tile::new(0.0, 0.0, 10); 3];

        let idx = task.next_tile_index().unwrap();
        let tile = task.plan[idx].clone();
        task.begin_dispatch(idx, tile, Vec::new());
        task.transition(SearchState::AwaitingAnalysis);
        task.record_timeout(800);
        assert_eq!(task.consecutive_timeouts, 1);

        task.transition(SearchState::Replan);
        let idx = task.next_tile_index().unwrap();
        let tile = task.plan[idx].clone();
        task.begin_dispatch(idx, tile, Vec::new());
        task.transition(SearchState::AwaitingAnalysis);
        task.record_decision(&observation(), decision(false), 5);
        assert_eq!(task.consecutive_timeouts, 0);
        assert_eq!(task.executed_tiles, 1);
    }

    #[test]
    fn misses_feed_the_belief_map() {
        let mut task = SearchTask::new(cue(), &budgets(4000, 12));
        task.plan = vec![Tile::new(12.0, 0.0, 10)];
        let idx = task.next_tile_index().unwrap();
        let tile = task.plan[idx].clone();
        task.begin_dispatch(idx, tile, Vec::new());
        task.transition(SearchState::AwaitingAnalysis);
        task.record_decision(&observation(), decision(false), 5);
        assert!(task.belief.mass_at(12.0) < 1.0);
    }

    #[test]
    fn sighting_publish_claimed_once() {
        let mut task = SearchTask::new(cue(), &budgets(4000, 12));
        assert!(task.claim_sighting_publish());
        assert!(!task.claim_sighting_publish());
        assert!(!task.claim_sighting_publish());
    }

    #[test]
    fn results_carry_the_executed_log() {
        let mut task = SearchTask::new(cue(), &budgets(4000, 12));
        task.plan = vec![Tile::new(0.0, 0.0, 10); 2];
        for confirmed in [false, true] {
            let idx = task.next_tile_index().unwrap();
            let tile = task.plan[idx].clone();
            task.begin_dispatch(idx, tile, Vec::new());
            task.transition(SearchState::AwaitingAnalysis);
            task.record_decision(&observation(), decision(confirmed), 5);
            if !confirmed {
                task.transition(SearchState::Replan);
            }
        }
        let winning = task.executed.last().cloned().unwrap();
        let result = task.success_result(winning);
        assert!(result.found);
        assert_eq!(result.executed.len(), 2);
        assert!(result.time_to_first_true_ms.is_some());
        assert!(result.winning_decision.as_ref().unwrap().confirmed);

        let failure = task.failure_result(FailureReason::NoDetection);
        assert!(!failure.found);
        assert_eq!(failure.failure, Some(FailureReason::NoDetection));
    }
}
