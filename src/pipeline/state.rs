use serde::Serialize;
use std::fmt;

/// Coordinator states, in the order a run walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    CapturingFrame,
    Recognizing,
    LookingUpAsset,
    PlacingAndLoading,
    Narrating,
    Synthesizing,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::CapturingFrame => "CapturingFrame",
            PipelineState::Recognizing => "Recognizing",
            PipelineState::LookingUpAsset => "LookingUpAsset",
            PipelineState::PlacingAndLoading => "PlacingAndLoading",
            PipelineState::Narrating => "Narrating",
            PipelineState::Synthesizing => "Synthesizing",
        }
    }

    /// The state that follows on the normal path
    pub fn successor(&self) -> PipelineState {
        match self {
            PipelineState::Idle => PipelineState::CapturingFrame,
            PipelineState::CapturingFrame => PipelineState::Recognizing,
            PipelineState::Recognizing => PipelineState::LookingUpAsset,
            PipelineState::LookingUpAsset => PipelineState::PlacingAndLoading,
            PipelineState::PlacingAndLoading => PipelineState::Narrating,
            PipelineState::Narrating => PipelineState::Synthesizing,
            PipelineState::Synthesizing => PipelineState::Idle,
        }
    }

    /// Forward moves go to the successor only. Every stage may drop back to `Idle`;
    /// which outcome that return may carry is decided by [`Outcome::is_valid_from`].
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        if next == PipelineState::Idle {
            return *self != PipelineState::Idle;
        }
        self.successor() == next
    }

    pub fn is_idle(&self) -> bool {
        *self == PipelineState::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason")]
pub enum Outcome {
    Success,
    AbortedNoLandmark,
    AbortedNoAsset,
    AbortedNoNarration,
    Failed(String),
}

impl Outcome {
    /// Whether a run in `state` may finish with this outcome.
    pub fn is_valid_from(&self, state: PipelineState) -> bool {
        match self {
            Outcome::Success => state == PipelineState::Synthesizing,
            Outcome::AbortedNoLandmark => state == PipelineState::Recognizing,
            Outcome::AbortedNoAsset => state == PipelineState::LookingUpAsset,
            Outcome::AbortedNoNarration => state == PipelineState::Narrating,
            Outcome::Failed(_) => !state.is_idle(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("Success"),
            Outcome::AbortedNoLandmark => f.write_str("AbortedNoLandmark"),
            Outcome::AbortedNoAsset => f.write_str("AbortedNoAsset"),
            Outcome::AbortedNoNarration => f.write_str("AbortedNoNarration"),
            Outcome::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}
