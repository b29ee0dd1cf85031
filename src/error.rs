use crate::pipeline::state::PipelineState;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to load configuration: {0}")]
    ConfigSource(#[from] config::ConfigError),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
    #[error("Failed to serialize run report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that end a pipeline run early without being an expected "no result" exit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("{stage} timed out after {timeout:?}")]
    TimedOut {
        stage: PipelineState,
        timeout: Duration,
    },
    #[error("{stage} was cancelled")]
    Cancelled { stage: PipelineState },
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },
    #[error("asset load failed: {0}")]
    AssetLoad(String),
}

// Collaborator Error Type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Service rejected the request: {0}")]
    Rejected(String),
    #[error("Malformed service response: {0}")]
    Malformed(String),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let borrowed = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        let owned = std::panic::catch_unwind(|| panic!("{} text", "formatted")).unwrap_err();
        let other = std::panic::catch_unwind(|| std::panic::panic_any(7_u8)).unwrap_err();

        assert_eq!(panic_message(borrowed.as_ref()), "static text");
        assert_eq!(panic_message(owned.as_ref()), "formatted text");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
