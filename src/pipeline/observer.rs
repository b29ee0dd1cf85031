use crate::pipeline::run::{millis, RunReport};
use crate::pipeline::state::{Outcome, PipelineState};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Observer pattern for run metrics
pub trait PipelineObserver: Send + Sync {
    fn on_stage_completed(&mut self, run_id: Uuid, stage: PipelineState, duration: Duration);
    fn on_run_finished(&mut self, run_id: Uuid, outcome: &Outcome, total: Duration);
}

/// Fans run reports out to every registered observer
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify_run(&mut self, report: &RunReport) {
        for observer in &mut self.observers {
            for (stage, elapsed) in &report.stage_timings_ms {
                observer.on_stage_completed(report.run_id, *stage, Duration::from_millis(*elapsed));
            }
            observer.on_run_finished(
                report.run_id,
                &report.outcome,
                Duration::from_millis(report.total_ms),
            );
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStats {
    pub samples: usize,
    pub avg_ms: f32,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub runs: usize,
    pub successes: usize,
    pub aborted_no_landmark: usize,
    pub aborted_no_asset: usize,
    pub aborted_no_narration: usize,
    pub failures: usize,
    pub avg_run_ms: f32,
    pub stages: IndexMap<PipelineState, StageStats>,
}

/// Keeps outcome counters and EWMA stage latencies
#[derive(Clone, Default)]
pub struct RunStatsMonitor {
    stats: Arc<Mutex<RunStats>>,
}

const ALPHA: f32 = 0.1; // EWMA smoothing factor

impl RunStatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_ewma(current: f32, samples: usize, new_value: u64) -> f32 {
        if samples == 0 {
            new_value as f32
        } else {
            current * (1.0 - ALPHA) + new_value as f32 * ALPHA
        }
    }
}

impl PipelineObserver for RunStatsMonitor {
    fn on_stage_completed(&mut self, _run_id: Uuid, stage: PipelineState, duration: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = millis(duration);
        let entry = stats.stages.entry(stage).or_default();
        entry.avg_ms = Self::update_ewma(entry.avg_ms, entry.samples, elapsed);
        entry.max_ms = entry.max_ms.max(elapsed);
        entry.samples += 1;
    }

    fn on_run_finished(&mut self, run_id: Uuid, outcome: &Outcome, total: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.avg_run_ms = Self::update_ewma(stats.avg_run_ms, stats.runs, millis(total));
        stats.runs += 1;
        match outcome {
            Outcome::Success => stats.successes += 1,
            Outcome::AbortedNoLandmark => stats.aborted_no_landmark += 1,
            Outcome::AbortedNoAsset => stats.aborted_no_asset += 1,
            Outcome::AbortedNoNarration => stats.aborted_no_narration += 1,
            Outcome::Failed(_) => stats.failures += 1,
        }
        tracing::debug!(
            "RunStatsMonitor: run {} finished ({}), total runs {}",
            run_id,
            outcome,
            stats.runs
        );
    }
}
