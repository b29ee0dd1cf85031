use crate::common::{AssetReference, LandmarkId, NarrationText};
use crate::error::StageError;
use crate::pipeline::state::{Outcome, PipelineState};
use crate::pipeline::timings::StageTimings;
use crate::spatial::AnchorHandle;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// One in-flight attempt: walks the stages once and is consumed by [`PipelineRun::finish`].
#[derive(Debug)]
pub struct PipelineRun {
    id: Uuid,
    state: PipelineState,
    path: Vec<PipelineState>,
    started_at: Instant,
    timings: StageTimings,
    state_tx: Arc<watch::Sender<PipelineState>>,
    landmark: Option<LandmarkId>,
    asset: Option<AssetReference>,
    anchor: Option<AnchorHandle>,
    narration: Option<NarrationText>,
}

impl PipelineRun {
    pub fn new(id: Uuid, state_tx: Arc<watch::Sender<PipelineState>>) -> Self {
        Self {
            id,
            state: PipelineState::Idle,
            path: Vec::new(),
            started_at: Instant::now(),
            timings: StageTimings::new(),
            state_tx,
            landmark: None,
            asset: None,
            anchor: None,
            narration: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to the next stage. Skipping a stage is an error.
    pub fn advance(&mut self, next: PipelineState) -> Result<(), StageError> {
        if next.is_idle() || !self.state.can_transition_to(next) {
            return Err(StageError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Run {} entering {}", self.id, next);
        self.timings.enter(next);
        self.set_state(next);
        Ok(())
    }

    pub fn record_landmark(&mut self, landmark: LandmarkId) {
        self.landmark = Some(landmark);
    }

    pub fn record_asset(&mut self, asset: AssetReference) {
        self.asset = Some(asset);
    }

    pub fn record_anchor(&mut self, anchor: AnchorHandle) {
        self.anchor = Some(anchor);
    }

    pub fn record_narration(&mut self, narration: NarrationText) {
        self.narration = Some(narration);
    }

    pub fn landmark(&self) -> Option<&LandmarkId> {
        self.landmark.as_ref()
    }

    pub fn anchor(&self) -> Option<&AnchorHandle> {
        self.anchor.as_ref()
    }

    /// Return to `Idle` with a terminal outcome and produce the run report.
    pub fn finish(mut self, outcome: Outcome) -> RunReport {
        let outcome = if outcome.is_valid_from(self.state) {
            outcome
        } else {
            warn!(
                "Run {} cannot end with {} from {}; recording failure instead",
                self.id, outcome, self.state
            );
            Outcome::Failed(format!("{} reported from {}", outcome, self.state))
        };

        self.timings.close();
        self.set_state(PipelineState::Idle);

        RunReport {
            run_id: self.id,
            outcome,
            path: self.path,
            landmark: self.landmark.and_then(|l| l.name().map(str::to_string)),
            asset: self.asset.map(|a| a.as_str().to_string()),
            anchor_id: self.anchor.map(|a| a.id()),
            narration_words: self.narration.map(|n| n.word_count()).unwrap_or(0),
            stage_timings_ms: self
                .timings
                .iter()
                .map(|(stage, duration)| (stage, millis(duration)))
                .collect(),
            total_ms: millis(self.started_at.elapsed()),
        }
    }

    fn set_state(&mut self, next: PipelineState) {
        self.state = next;
        self.path.push(next);
        self.state_tx.send_replace(next);
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Every state entered, ending in `Idle`
    pub path: Vec<PipelineState>,
    pub landmark: Option<String>,
    pub asset: Option<String>,
    pub anchor_id: Option<Uuid>,
    pub narration_words: usize,
    /// Time spent in each entered stage, in entry order
    pub stage_timings_ms: IndexMap<PipelineState, u64>,
    pub total_ms: u64,
}

impl RunReport {
    /// Report for a run whose task ended without producing one.
    pub fn lost(run_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            run_id,
            outcome: Outcome::Failed(reason.into()),
            path: vec![PipelineState::Idle],
            landmark: None,
            asset: None,
            anchor_id: None,
            narration_words: 0,
            stage_timings_ms: IndexMap::new(),
            total_ms: 0,
        }
    }

    pub fn entered(&self, state: PipelineState) -> bool {
        self.path.contains(&state)
    }
}
