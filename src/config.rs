use crate::error::AppError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `NARRATOR_CAPTURE_TIMEOUT_MS=5000`.
pub const ENV_PREFIX: &str = "NARRATOR";

/// Configuration file picked up from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "narrator";

/// Configuration options for the capture-to-narration pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub frame_poll_interval_ms: u64,
    pub capture_timeout_ms: u64,
    pub recognition_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub narration_timeout_ms: u64,
    pub speech_timeout_ms: u64,
    pub asset_load_timeout_ms: u64,
    /// Distance in front of the viewer at which the anchor is placed
    pub placement_distance: f32,
    /// Fold the asset load result into the run outcome
    pub require_asset_load: bool,
    pub narration_min_words: u32,
    pub narration_max_words: u32,
    pub log_level: String,
    pub demo: DemoSettings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_poll_interval_ms: 200,
            capture_timeout_ms: 10_000,
            recognition_timeout_ms: 20_000,
            lookup_timeout_ms: 15_000,
            narration_timeout_ms: 20_000,
            speech_timeout_ms: 60_000,
            asset_load_timeout_ms: 60_000,
            placement_distance: 2.0,
            require_asset_load: false,
            narration_min_words: 80,
            narration_max_words: 120,
            log_level: "info".to_string(),
            demo: DemoSettings::default(),
        }
    }
}

/// Settings for the simulated collaborators driven by the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub landmark: String,
    pub asset_url: String,
    pub failed_polls: u32,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            landmark: "India Gate".to_string(),
            asset_url: "https://assets.example.com/models/india-gate.glb".to_string(),
            failed_polls: 3,
            min_latency_ms: 50,
            max_latency_ms: 250,
        }
    }
}

impl Configuration {
    /// Layer defaults, an optional config file and `NARRATOR_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let configuration: Configuration = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AppError> {
        let timeouts = [
            ("frame_poll_interval_ms", self.frame_poll_interval_ms),
            ("capture_timeout_ms", self.capture_timeout_ms),
            ("recognition_timeout_ms", self.recognition_timeout_ms),
            ("lookup_timeout_ms", self.lookup_timeout_ms),
            ("narration_timeout_ms", self.narration_timeout_ms),
            ("speech_timeout_ms", self.speech_timeout_ms),
            ("asset_load_timeout_ms", self.asset_load_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.frame_poll_interval_ms >= self.capture_timeout_ms {
            return Err(AppError::Config(
                "frame_poll_interval_ms must be shorter than capture_timeout_ms".to_string(),
            ));
        }

        if !self.placement_distance.is_finite() || self.placement_distance <= 0.0 {
            return Err(AppError::Config(
                "placement_distance must be a positive number".to_string(),
            ));
        }

        if self.narration_min_words == 0 || self.narration_min_words > self.narration_max_words {
            return Err(AppError::Config(
                "narration word range must be non-empty and start above 0".to_string(),
            ));
        }

        if self.demo.min_latency_ms > self.demo.max_latency_ms {
            return Err(AppError::Config(
                "demo.min_latency_ms must not exceed demo.max_latency_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn frame_poll_interval(&self) -> Duration {
        Duration::from_millis(self.frame_poll_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn narration_timeout(&self) -> Duration {
        Duration::from_millis(self.narration_timeout_ms)
    }

    pub fn speech_timeout(&self) -> Duration {
        Duration::from_millis(self.speech_timeout_ms)
    }

    pub fn asset_load_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_load_timeout_ms)
    }
}
