pub mod asset_load;
pub mod coordinator;
pub mod guard;
pub mod observer;
pub mod run;
pub mod state;
pub mod timings;

pub use asset_load::{AssetLoadReport, PendingLoad};
pub use coordinator::{CoordinatorBuilder, PipelineCoordinator, RunHandle, Trigger};
pub use observer::{ObserverSet, PipelineObserver, RunStats, RunStatsMonitor};
pub use run::{PipelineRun, RunReport};
pub use state::{Outcome, PipelineState};
