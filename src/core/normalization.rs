//! Mains normalization statistics computed from training buildings.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::store::{BuildingId, Meter, PowerStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Added to the standard deviation so constant mains does not divide by zero.
pub const NORMALIZATION_EPSILON: f64 = 1e-8;

/// Mean and standard deviation of training mains power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParameters {
    mean: f64,
    std: f64,
}

impl NormalizationParameters {
    /// Fails unless both values are finite and the deviation is non-negative.
    pub fn new(mean: f64, std: f64) -> Result<Self, PipelineError> {
        if !mean.is_finite() || !std.is_finite() || std < 0.0 {
            return Err(PipelineError::DataValidation(format!(
                "normalization parameters must be finite (mean={mean}, std={std}); \
                 check the training mains data"
            )));
        }
        Ok(Self { mean, std })
    }

    /// Mean of training mains power.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation of training mains power.
    pub fn std(&self) -> f64 {
        self.std
    }

    /// Standardize one mains value.
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / (self.std + NORMALIZATION_EPSILON)
    }

    /// Standardize a slice of mains values.
    pub fn normalize_in_place(&self, values: &mut [f64]) {
        for value in values {
            *value = self.normalize(*value);
        }
    }
}

/// Single-pass mean and variance accumulator (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMoments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningMoments {
    /// Add one value. NaN marks a missing reading and is skipped.
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of values accumulated, NaN excluded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, once at least one value was pushed.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance (n - 1 denominator).
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }

    /// Mean and sample standard deviation of everything pushed.
    pub fn finish(&self) -> Result<NormalizationParameters, PipelineError> {
        match (self.mean(), self.sample_variance()) {
            (None, _) => Err(PipelineError::DataValidation(
                "no training data available for normalization".to_string(),
            )),
            (Some(_), None) => Err(PipelineError::DataValidation(
                "a single training sample cannot give a standard deviation".to_string(),
            )),
            (Some(mean), Some(variance)) => NormalizationParameters::new(mean, variance.sqrt()),
        }
    }
}

impl Extend<f64> for RunningMoments {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

/// Derives normalization parameters from the mains of training buildings.
///
/// Mains is read in bounded time chunks, so memory use does not grow with the
/// length of the series.
#[derive(Debug, Clone)]
pub struct NormalizationComputer {
    chunk: chrono::Duration,
}

impl NormalizationComputer {
    /// Create a computer reading mains in `chunk`-long pieces.
    pub fn new(chunk: chrono::Duration) -> Self {
        Self { chunk }
    }

    /// Create a computer using the configured chunk length.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(config.chunk_length()?))
    }

    /// Mean and sample standard deviation of all mains readings of `buildings`.
    pub fn compute<S: PowerStore + ?Sized>(
        &self,
        store: &S,
        buildings: &[BuildingId],
    ) -> Result<NormalizationParameters, PipelineError> {
        let mut moments = RunningMoments::default();

        for &building in buildings {
            let frame = store
                .timeframe(building, &Meter::Mains)
                .map_err(PipelineError::upstream(building, &Meter::Mains))?;

            for chunk in frame.chunks(self.chunk) {
                let samples = store
                    .read(building, &Meter::Mains, Some(chunk))
                    .map_err(PipelineError::upstream(building, &Meter::Mains))?;
                moments.extend(samples.iter().map(|s| s.power));
                debug!(
                    building,
                    start = %chunk.start,
                    samples = samples.len(),
                    "accumulated training mains chunk"
                );
            }
        }

        let params = moments.finish()?;
        info!(
            mean = params.mean(),
            std = params.std(),
            samples = moments.count(),
            "computed mains normalization parameters"
        );
        Ok(params)
    }
}
