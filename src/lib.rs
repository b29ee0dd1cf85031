pub mod common;
pub mod config;
pub mod error;
pub mod narration;
pub mod pipeline;
pub mod ports;
pub mod simulated;
pub mod spatial;
pub mod speech;

pub use crate::config::Configuration;
pub use crate::error::{AppError, ServiceError, StageError};

pub use crate::pipeline::{Outcome, PipelineCoordinator, PipelineState, RunReport, Trigger};
