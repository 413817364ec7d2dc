//! Configuration for the windowing pipeline.

use crate::core::alignment::JoinPolicy;
use crate::core::debounce::{DebounceBoundary, OffValuePolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on grid points per chunk (`chunk_duration / sample_period`).
pub const MAX_CHUNK_SAMPLES: u64 = 5_000_000;

/// Main configuration for the pipeline.
///
/// Every component is built from this struct; nothing reads configuration
/// from process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the sub-metered appliance
    pub appliance: String,

    /// Samples per training window
    pub window_size: usize,

    /// Windows per batch
    pub batch_size: usize,

    /// Power (W) above which the appliance counts as on
    pub on_threshold: f64,

    /// Upper clip for appliance power (W)
    pub max_power: f64,

    /// Shortest on-period that is kept
    #[serde(with = "duration_serde")]
    pub min_on_duration: Duration,

    /// Shortest off-period that is not bridged
    #[serde(with = "duration_serde")]
    pub min_off_duration: Duration,

    /// Period of the common resampling grid
    #[serde(with = "duration_serde")]
    pub sample_period: Duration,

    /// Length of each store read during traversal
    #[serde(with = "duration_serde")]
    pub chunk_duration: Duration,

    /// How appliance readings are matched to the mains grid
    pub join: JoinPolicy,

    /// What off samples of the appliance target hold
    pub off_value: OffValuePolicy,

    /// How runs cut off by the end of a series are debounced
    pub boundary: DebounceBoundary,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            appliance: "kettle".to_string(),
            window_size: 480,
            batch_size: 64,
            on_threshold: 2000.0,
            max_power: 3100.0,
            min_on_duration: Duration::from_secs(12),
            min_off_duration: Duration::from_secs(0),
            sample_period: Duration::from_secs(6),
            chunk_duration: Duration::from_secs(15 * 24 * 60 * 60), // 15 days
            join: JoinPolicy::default(),
            off_value: OffValuePolicy::default(),
            boundary: DebounceBoundary::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default location.
    ///
    /// Falls back to the defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration as pretty-printed JSON.
    ///
    /// Refuses configurations that would not load back unchanged.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nilm-windowing")
            .join("pipeline.json")
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.appliance.trim().is_empty() {
            return Err(invalid("appliance name must not be empty"));
        }
        if self.window_size == 0 {
            return Err(invalid("window_size must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be positive"));
        }
        if !self.on_threshold.is_finite() || self.on_threshold < 0.0 {
            return Err(invalid(format!(
                "on_threshold must be a finite non-negative power, got {}",
                self.on_threshold
            )));
        }
        if !self.max_power.is_finite() || self.max_power <= self.on_threshold {
            return Err(invalid(format!(
                "max_power must be finite and above on_threshold ({}), got {}",
                self.on_threshold, self.max_power
            )));
        }
        let mut durations = vec![
            ("min_on_duration", self.min_on_duration),
            ("min_off_duration", self.min_off_duration),
            ("sample_period", self.sample_period),
            ("chunk_duration", self.chunk_duration),
        ];
        if let JoinPolicy::Pad { tolerance } = self.join {
            durations.push(("join tolerance", tolerance));
        }
        for (name, duration) in durations {
            if duration.subsec_nanos() != 0 {
                return Err(invalid(format!(
                    "{name} must be a whole number of seconds, got {duration:?}"
                )));
            }
        }

        if self.sample_period.is_zero() {
            return Err(invalid("sample_period must be at least one second"));
        }
        if self.chunk_duration < self.sample_period {
            return Err(invalid("chunk_duration must be at least one sample_period"));
        }
        let chunk_samples = self.chunk_duration.as_secs() / self.sample_period.as_secs();
        if chunk_samples > MAX_CHUNK_SAMPLES {
            return Err(invalid(format!(
                "chunk_duration spans {chunk_samples} sample periods, at most {MAX_CHUNK_SAMPLES} allowed"
            )));
        }
        self.chunk_length()?;

        if let OffValuePolicy::Sentinel { value } = self.off_value {
            if !value.is_finite() {
                return Err(invalid(format!("off-value sentinel must be finite, got {value}")));
            }
        }

        Ok(())
    }

    /// Sample period in milliseconds, the unit of the resampling grid.
    pub fn sample_period_millis(&self) -> i64 {
        i64::try_from(self.sample_period.as_millis()).unwrap_or(i64::MAX)
    }

    /// Chunk length as a signed duration for time-range arithmetic.
    pub fn chunk_length(&self) -> Result<chrono::Duration, ConfigError> {
        chrono::Duration::from_std(self.chunk_duration)
            .map_err(|e| invalid(format!("chunk_duration out of range: {e}")))
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
