//! Appliance on/off labeling with minimum-duration constraints.
//!
//! Raw power is thresholded into on/off states, then short on-blips are
//! suppressed and short off-gaps after an on-period are bridged. The trace is
//! then used to mask and clip the appliance power target.

use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How runs cut off by the end of the series are debounced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceBoundary {
    /// Judge the final run on its observed duration like any other run
    #[default]
    TreatAsShort,
    /// Never suppress or bridge the final run
    Exempt,
}

/// Value carried by appliance samples labeled off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OffValuePolicy {
    /// Off samples are exactly zero
    #[default]
    Zero,
    /// Off samples carry a sentinel the downstream loss ignores
    Sentinel { value: f64 },
}

impl OffValuePolicy {
    /// Value written to off samples.
    pub fn off_value(&self) -> f64 {
        match self {
            OffValuePolicy::Zero => 0.0,
            OffValuePolicy::Sentinel { value } => *value,
        }
    }
}

/// Binary operating state per sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplianceStatusTrace {
    states: Vec<bool>,
}

impl ApplianceStatusTrace {
    /// On/off state per sample.
    pub fn states(&self) -> &[bool] {
        &self.states
    }

    /// Number of samples in the trace.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True for a trace of an empty series.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of samples labeled on.
    pub fn on_count(&self) -> usize {
        self.states.iter().filter(|&&on| on).count()
    }

    /// States as 0/1 labels.
    pub fn labels(&self) -> Vec<u8> {
        self.states.iter().map(|&on| u8::from(on)).collect()
    }
}

/// A maximal run of identical states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    on: bool,
    start: usize,
    len: usize,
}

/// Run-length encode a state sequence.
fn runs(states: &[bool]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (i, &on) in states.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.on == on => run.len += 1,
            _ => runs.push(Run { on, start: i, len: 1 }),
        }
    }
    runs
}

/// Append a run, merging it into the previous one when the states agree.
fn push_merged(runs: &mut Vec<Run>, run: Run) {
    match runs.last_mut() {
        Some(last) if last.on == run.on => last.len += run.len,
        _ => runs.push(run),
    }
}

/// Turns appliance power into a debounced on/off trace.
#[derive(Debug, Clone)]
pub struct StatusDebouncer {
    on_threshold: f64,
    min_on_secs: f64,
    min_off_secs: f64,
    period_secs: f64,
    boundary: DebounceBoundary,
}

impl StatusDebouncer {
    /// Create a debouncer; durations are converted to sample counts via `sample_period`.
    pub fn new(
        on_threshold: f64,
        min_on_duration: Duration,
        min_off_duration: Duration,
        sample_period: Duration,
    ) -> Self {
        Self {
            on_threshold,
            min_on_secs: min_on_duration.as_secs_f64(),
            min_off_secs: min_off_duration.as_secs_f64(),
            period_secs: sample_period.as_secs_f64(),
            boundary: DebounceBoundary::default(),
        }
    }

    /// Set how the final run of a series is treated.
    pub fn with_boundary(mut self, boundary: DebounceBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Create a debouncer from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.on_threshold,
            config.min_on_duration,
            config.min_off_duration,
            config.sample_period,
        )
        .with_boundary(config.boundary)
    }

    /// Label appliance power: on where power exceeds the threshold, then
    /// debounced.
    pub fn label(&self, power: &[f64]) -> ApplianceStatusTrace {
        let raw: Vec<bool> = power.iter().map(|&p| p > self.on_threshold).collect();
        self.debounce(&raw)
    }

    /// Debounce a raw state sequence.
    ///
    /// One pass over the run decomposition: on-runs shorter than the minimum
    /// on-duration are suppressed, then every off-run that follows an on-run
    /// and is shorter than the minimum off-duration is bridged. Off durations
    /// include any suppressed blips inside them. The leading run has no
    /// preceding transition and is never bridged.
    pub fn debounce(&self, raw: &[bool]) -> ApplianceStatusTrace {
        let raw_runs = runs(raw);
        let last = raw_runs.len().saturating_sub(1);

        let mut kept: Vec<Run> = Vec::with_capacity(raw_runs.len());
        for (i, run) in raw_runs.iter().enumerate() {
            let exempt = self.boundary == DebounceBoundary::Exempt && i == last;
            let on = run.on && (exempt || !self.shorter_than(run.len, self.min_on_secs));
            push_merged(&mut kept, Run { on, ..*run });
        }

        let last = kept.len().saturating_sub(1);
        let mut states = vec![false; raw.len()];
        for (i, run) in kept.iter().enumerate() {
            let exempt = self.boundary == DebounceBoundary::Exempt && i == last;
            // Runs alternate, so any off-run past the first follows an on-run
            let bridged =
                !run.on && i > 0 && !exempt && self.shorter_than(run.len, self.min_off_secs);
            states[run.start..run.start + run.len].fill(run.on || bridged);
        }

        ApplianceStatusTrace { states }
    }

    fn shorter_than(&self, samples: usize, min_secs: f64) -> bool {
        (samples as f64) * self.period_secs < min_secs
    }
}

/// Masks and clips appliance power with a status trace.
#[derive(Debug, Clone)]
pub struct TargetShaper {
    on_threshold: f64,
    max_power: f64,
    off_value: OffValuePolicy,
}

impl TargetShaper {
    /// Create a shaper clipping on samples to `[on_threshold, max_power]`.
    pub fn new(on_threshold: f64, max_power: f64, off_value: OffValuePolicy) -> Self {
        Self {
            on_threshold,
            max_power,
            off_value,
        }
    }

    /// Create a shaper from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.on_threshold, config.max_power, config.off_value)
    }

    /// Off samples take the off value; on samples are clipped to
    /// `[on_threshold, max_power]`. Off samples are never clipped.
    pub fn shape(&self, power: &mut [f64], trace: &ApplianceStatusTrace) {
        let off = self.off_value.off_value();
        for (p, &on) in power.iter_mut().zip(trace.states()) {
            *p = if on {
                p.max(self.on_threshold).min(self.max_power)
            } else {
                off
            };
        }
    }
}
