//! Errors surfaced by the pipeline.

use crate::config::ConfigError;
use crate::store::{BuildingId, Meter, StoreError};

/// Errors that can abort pipeline construction or a batch fetch.
#[derive(Debug)]
pub enum PipelineError {
    /// Invalid parameters, detected at construction
    Configuration(ConfigError),
    /// Unusable data: no training samples, non-finite statistics, or a
    /// traversal that yields no windows at all
    DataValidation(String),
    /// The store failed to deliver readings; never retried here
    UpstreamRead {
        building: BuildingId,
        meter: Meter,
        source: StoreError,
    },
}

impl PipelineError {
    pub(crate) fn upstream(building: BuildingId, meter: &Meter) -> impl FnOnce(StoreError) -> Self {
        let meter = meter.clone();
        move |source| PipelineError::UpstreamRead {
            building,
            meter,
            source,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Configuration(e) => write!(f, "Configuration error: {e}"),
            PipelineError::DataValidation(msg) => write!(f, "Data validation error: {msg}"),
            PipelineError::UpstreamRead {
                building,
                meter,
                source,
            } => write!(
                f,
                "Upstream read error for {meter} of building {building}: {source}"
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Configuration(e) => Some(e),
            PipelineError::UpstreamRead { source, .. } => Some(source),
            PipelineError::DataValidation(_) => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Configuration(e)
    }
}
