use crate::pipeline::state::PipelineState;
use indexmap::IndexMap;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks how long a run spent in each stage, in the order stages were entered
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    durations: IndexMap<PipelineState, Duration>,
    current: Option<(PipelineState, Instant)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entry into a stage, closing whichever stage was open
    pub fn enter(&mut self, stage: PipelineState) {
        self.close();
        self.current = Some((stage, Instant::now()));
    }

    /// Close the open stage and return how long it ran
    pub fn close(&mut self) -> Option<(PipelineState, Duration)> {
        let (stage, started) = self.current.take()?;
        let elapsed = started.elapsed();
        *self.durations.entry(stage).or_insert(Duration::ZERO) += elapsed;
        Some((stage, elapsed))
    }

    pub fn get(&self, stage: PipelineState) -> Duration {
        self.durations.get(&stage).copied().unwrap_or(Duration::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PipelineState, Duration)> + '_ {
        self.durations.iter().map(|(stage, duration)| (*stage, *duration))
    }

    pub fn total(&self) -> Duration {
        self.durations.values().sum()
    }

    pub fn stage_count(&self) -> usize {
        self.durations.len()
    }
}
