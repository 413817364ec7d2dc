//! Alignment of the mains and appliance streams onto one time grid.
//!
//! Metering hardware reports on independent clocks with missing ticks, so an
//! exact-timestamp join would discard most readings. Mains is snapped onto a
//! fixed-period grid with nearest-neighbour lookup of bounded reach, appliance
//! readings are matched to that grid, and only the remaining short mains gaps
//! are filled.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::store::PowerSample;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// How appliance readings are matched to mains grid points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Only identical timestamps match
    Exact,
    /// A reading matches the latest grid point at or before it, at most
    /// `tolerance` earlier
    Pad {
        #[serde(with = "crate::config::duration_serde")]
        tolerance: Duration,
    },
}

impl Default for JoinPolicy {
    fn default() -> Self {
        JoinPolicy::Pad {
            tolerance: Duration::from_secs(6),
        }
    }
}

/// Mains and appliance power sharing one timestamp grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedSeries {
    timestamps: Vec<DateTime<Utc>>,
    mains: Vec<f64>,
    appliance: Vec<f64>,
}

impl AlignedSeries {
    /// Build a series from co-indexed parts.
    ///
    /// Fails unless all three parts have the same length and timestamps are
    /// strictly increasing.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        mains: Vec<f64>,
        appliance: Vec<f64>,
    ) -> Result<Self, PipelineError> {
        if timestamps.len() != mains.len() || mains.len() != appliance.len() {
            return Err(PipelineError::DataValidation(format!(
                "aligned series parts differ in length: {} timestamps, {} mains, {} appliance",
                timestamps.len(),
                mains.len(),
                appliance.len()
            )));
        }
        if timestamps.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PipelineError::DataValidation(
                "aligned series timestamps must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            timestamps,
            mains,
            appliance,
        })
    }

    /// Number of aligned points.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when no point survived alignment.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Grid timestamps, strictly increasing.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Mains power per point.
    pub fn mains(&self) -> &[f64] {
        &self.mains
    }

    /// Appliance power per point.
    pub fn appliance(&self) -> &[f64] {
        &self.appliance
    }

    /// Mains values, for in-place transforms that keep the length.
    pub fn mains_mut(&mut self) -> &mut [f64] {
        &mut self.mains
    }

    /// Appliance values, for in-place transforms that keep the length.
    pub fn appliance_mut(&mut self) -> &mut [f64] {
        &mut self.appliance
    }
}

/// A point of the resampled mains grid.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridPoint {
    at_millis: i64,
    mains: Option<f64>,
}

/// Merges two irregularly sampled streams onto a common time base.
#[derive(Debug, Clone)]
pub struct AlignmentResampler {
    period_millis: i64,
    join: JoinPolicy,
}

impl AlignmentResampler {
    /// Create a resampler for a grid of `sample_period`.
    pub fn new(sample_period: Duration, join: JoinPolicy) -> Self {
        let period_millis = i64::try_from(sample_period.as_millis()).unwrap_or(i64::MAX);
        Self {
            period_millis: period_millis.max(1),
            join,
        }
    }

    /// Create a resampler from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.sample_period, config.join)
    }

    /// Align raw mains and appliance readings.
    ///
    /// NaN readings count as missing. The result never has more points than
    /// the deduplicated appliance stream or the mains grid.
    pub fn align(&self, mains: Vec<PowerSample>, appliance: Vec<PowerSample>) -> AlignedSeries {
        let mains = sort_and_dedup(mains);
        let appliance = sort_and_dedup(appliance);

        let grid = self.resample(&mains);
        let mut joined = self.join(&grid, &appliance);

        forward_fill(joined.iter_mut().map(|(_, mains, _)| mains));
        forward_fill(joined.iter_mut().rev().map(|(_, mains, _)| mains));

        if joined.iter().any(|(_, mains, _)| mains.is_none()) {
            warn!(
                points = joined.len(),
                "no mains reading near any appliance reading, dropping chunk"
            );
            return AlignedSeries::default();
        }

        let mut series = AlignedSeries::default();
        for (at_millis, mains, appliance) in joined {
            let (Some(timestamp), Some(mains)) = (Utc.timestamp_millis_opt(at_millis).single(), mains)
            else {
                continue;
            };
            series.timestamps.push(timestamp);
            series.mains.push(mains);
            series.appliance.push(appliance);
        }
        series
    }

    /// Snap mains onto grid points at whole multiples of the period since the
    /// epoch, from the first to the last reading.
    ///
    /// Each grid point takes the nearest reading no more than one period away
    /// (ties go to the earlier reading); farther readings leave a gap.
    fn resample(&self, mains: &[PowerSample]) -> Vec<GridPoint> {
        let (Some(first), Some(last)) = (mains.first(), mains.last()) else {
            return Vec::new();
        };

        let period = self.period_millis;
        let start = first.timestamp_millis().div_euclid(period) * period;
        let end = last.timestamp_millis().div_euclid(period) * period;

        let mut grid = Vec::with_capacity(((end - start) / period + 1) as usize);
        let mut next = 0;
        let mut at = start;
        while at <= end {
            // First reading at or after this grid point
            while next < mains.len() && mains[next].timestamp_millis() < at {
                next += 1;
            }

            let before = next.checked_sub(1).map(|i| &mains[i]);
            let after = mains.get(next);
            let nearest = match (before, after) {
                (Some(b), Some(a)) => {
                    if at - b.timestamp_millis() <= a.timestamp_millis() - at {
                        Some(b)
                    } else {
                        Some(a)
                    }
                }
                (b, a) => b.or(a),
            };

            grid.push(GridPoint {
                at_millis: at,
                mains: nearest
                    .filter(|s| (s.timestamp_millis() - at).abs() <= period)
                    .map(|s| s.power),
            });
            at += period;
        }
        grid
    }

    /// Inner join of the grid and the appliance readings.
    ///
    /// Driven by appliance readings; every grid point is used at most once,
    /// by the first reading that matches it.
    fn join(&self, grid: &[GridPoint], appliance: &[PowerSample]) -> Vec<(i64, Option<f64>, f64)> {
        let Some(first) = grid.first() else {
            return Vec::new();
        };

        let period = self.period_millis;
        let mut joined = Vec::with_capacity(appliance.len().min(grid.len()));
        let mut last_index = None;

        for sample in appliance {
            let offset = sample.timestamp_millis() - first.at_millis;
            if offset < 0 {
                continue;
            }

            let index = match self.join {
                JoinPolicy::Exact => {
                    if offset % period != 0 {
                        continue;
                    }
                    (offset / period) as usize
                }
                JoinPolicy::Pad { tolerance } => {
                    let index = ((offset / period) as usize).min(grid.len() - 1);
                    let lag = sample.timestamp_millis() - grid[index].at_millis;
                    if lag as u128 > tolerance.as_millis() {
                        continue;
                    }
                    index
                }
            };

            let Some(point) = grid.get(index) else {
                continue;
            };
            if last_index == Some(index) {
                continue;
            }
            last_index = Some(index);
            joined.push((point.at_millis, point.mains, sample.power));
        }
        joined
    }
}

/// Sort by timestamp and keep the first reading of each timestamp.
fn sort_and_dedup(mut samples: Vec<PowerSample>) -> Vec<PowerSample> {
    samples.retain(|s| !s.power.is_nan());
    if samples.windows(2).any(|pair| pair[0].timestamp > pair[1].timestamp) {
        // Stable, so the first occurrence stays first
        samples.sort_by_key(|s| s.timestamp);
    }
    samples.dedup_by_key(|s| s.timestamp);
    samples
}

/// Replace each gap with the last value seen before it.
fn forward_fill<'a>(values: impl Iterator<Item = &'a mut Option<f64>>) {
    let mut last = None;
    for value in values {
        match value {
            Some(v) => last = Some(*v),
            None => *value = last,
        }
    }
}
