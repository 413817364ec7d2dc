//! Infinite batch assembly over a cyclic traversal of buildings and chunks.
//!
//! For each building in a fixed order, the overlap of its mains and appliance
//! meters is read chunk by chunk, aligned, labeled, normalized and cut into
//! windows. All buildings' windows form one logical stream; when it runs out
//! the [`TraversalCursor`] wraps to the first building, so batches are never
//! short and the caller never handles restarts.

use crate::config::{ConfigError, PipelineConfig};
use crate::core::alignment::{AlignedSeries, AlignmentResampler};
use crate::core::debounce::{ApplianceStatusTrace, StatusDebouncer, TargetShaper};
use crate::core::normalization::NormalizationParameters;
use crate::core::windowing::{Window, WindowSegmenter};
use crate::diagnostics::{create_shared_stats, SharedTraversalStats};
use crate::error::PipelineError;
use crate::store::{BuildingId, Meter, PowerSample, PowerStore, TimeFrame, TimeFrameChunks};
use chrono::{DateTime, Utc};
use ndarray::Array3;
use tracing::{debug, info, warn};

/// `batch_size` windows stacked for the learning component.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Normalized mains, shape `(batch_size, window_size, 1)`
    pub mains: Array3<f64>,
    /// Appliance target, shape `(batch_size, window_size, 1)`
    pub appliance: Array3<f64>,
    /// Start time of each window
    pub starts: Vec<DateTime<Utc>>,
}

impl Batch {
    fn from_windows(windows: &[Window], window_size: usize) -> Self {
        let shape = (windows.len(), window_size, 1);
        Self {
            mains: Array3::from_shape_fn(shape, |(i, j, _)| windows[i].mains[j]),
            appliance: Array3::from_shape_fn(shape, |(i, j, _)| windows[i].appliance[j]),
            starts: windows.iter().map(|w| w.start).collect(),
        }
    }

    /// Number of windows in the batch.
    pub fn batch_size(&self) -> usize {
        self.mains.dim().0
    }

    /// Samples per window.
    pub fn window_size(&self) -> usize {
        self.mains.dim().1
    }
}

/// Per-chunk processing: alignment, labeling, target shaping, normalization.
#[derive(Debug, Clone)]
pub struct ChunkPipeline {
    resampler: AlignmentResampler,
    debouncer: StatusDebouncer,
    shaper: TargetShaper,
    params: NormalizationParameters,
}

impl ChunkPipeline {
    /// Build every stage from the configuration and training statistics.
    pub fn new(config: &PipelineConfig, params: NormalizationParameters) -> Self {
        Self {
            resampler: AlignmentResampler::from_config(config),
            debouncer: StatusDebouncer::from_config(config),
            shaper: TargetShaper::from_config(config),
            params,
        }
    }

    /// Turn one chunk of raw readings into a normalized, labeled series.
    pub fn process(
        &self,
        mains: Vec<PowerSample>,
        appliance: Vec<PowerSample>,
    ) -> (AlignedSeries, ApplianceStatusTrace) {
        let mut series = self.resampler.align(mains, appliance);
        let trace = self.debouncer.label(series.appliance());
        self.shaper.shape(series.appliance_mut(), &trace);
        self.params.normalize_in_place(series.mains_mut());
        (series, trace)
    }
}

/// Position of the traversal: building, chunk and window offset.
#[derive(Debug, Clone, Default)]
pub struct TraversalCursor {
    building_index: usize,
    /// Chunks of the current building not yet read; `None` until opened
    chunks: Option<TimeFrameChunks>,
    /// Chunk the current series came from
    chunk: Option<TimeFrame>,
    series: AlignedSeries,
    next_window: usize,
    windows_this_pass: u64,
    wraps: u64,
}

impl TraversalCursor {
    /// Index into the assembler's building list.
    pub fn building_index(&self) -> usize {
        self.building_index
    }

    /// Time range of the chunk windows are currently taken from.
    pub fn chunk(&self) -> Option<TimeFrame> {
        self.chunk
    }

    /// Index of the next window within the current chunk.
    pub fn window_offset(&self) -> usize {
        self.next_window
    }

    /// Completed passes over all buildings.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    fn next_building(&mut self) {
        self.building_index += 1;
        self.chunks = None;
        self.chunk = None;
        self.series = AlignedSeries::default();
        self.next_window = 0;
    }

    fn rewind(&mut self) {
        *self = TraversalCursor {
            wraps: self.wraps,
            ..TraversalCursor::default()
        };
    }
}

/// Serves an endless sequence of full batches to the training driver.
///
/// Not meant to be shared between threads: give each worker its own
/// assembler. Store handles and normalization parameters are cheap to share.
pub struct StreamingBatchAssembler<S> {
    store: S,
    buildings: Vec<BuildingId>,
    appliance: Meter,
    chunk_length: chrono::Duration,
    pipeline: ChunkPipeline,
    segmenter: WindowSegmenter,
    batch_size: usize,
    batches_per_epoch: usize,
    cursor: TraversalCursor,
    /// Windows pulled for a batch that has not been served yet
    pending: Vec<Window>,
    stats: SharedTraversalStats,
}

impl<S: PowerStore> StreamingBatchAssembler<S> {
    /// Create an assembler over `buildings`, traversed in the given order.
    ///
    /// Reads only meter metadata; no readings are fetched until the first batch.
    pub fn new(
        store: S,
        buildings: Vec<BuildingId>,
        params: NormalizationParameters,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        if buildings.is_empty() {
            return Err(ConfigError::Invalid("at least one building is required".to_string()).into());
        }

        let segmenter = WindowSegmenter::new(config.window_size)?;
        let batches_per_epoch = estimate_batches_per_epoch(&store, &buildings, config)?;
        info!(
            buildings = ?buildings,
            appliance = %config.appliance,
            batches_per_epoch,
            "created batch assembler"
        );

        Ok(Self {
            store,
            buildings,
            appliance: Meter::appliance(config.appliance.clone()),
            chunk_length: config.chunk_length()?,
            pipeline: ChunkPipeline::new(config, params),
            segmenter,
            batch_size: config.batch_size,
            batches_per_epoch,
            cursor: TraversalCursor::default(),
            pending: Vec::with_capacity(config.batch_size),
            stats: create_shared_stats(),
        })
    }

    /// Estimated number of batches in one pass over all buildings.
    pub fn batches_per_epoch(&self) -> usize {
        self.batches_per_epoch
    }

    /// Buildings in traversal order.
    pub fn buildings(&self) -> &[BuildingId] {
        &self.buildings
    }

    /// Current traversal position.
    pub fn cursor(&self) -> &TraversalCursor {
        &self.cursor
    }

    /// Shared handle to this assembler's counters.
    pub fn stats(&self) -> SharedTraversalStats {
        SharedTraversalStats::clone(&self.stats)
    }

    /// Restart the traversal from the first building.
    ///
    /// Windows held back from a failed batch are discarded.
    pub fn reset(&mut self) {
        self.cursor.rewind();
        self.pending.clear();
    }

    /// Fetch the next full batch, wrapping around the buildings as needed.
    ///
    /// On error no batch is returned. Windows already pulled for it are kept
    /// and open the next batch, and the failed chunk read is attempted again
    /// on the next call, so no window of the pass is skipped.
    pub fn next_batch(&mut self) -> Result<Batch, PipelineError> {
        while self.pending.len() < self.batch_size {
            match self.next_window()? {
                Some(window) => self.pending.push(window),
                None => self.wrap()?,
            }
        }

        let windows = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        self.stats.record_batch_served();
        Ok(Batch::from_windows(&windows, self.segmenter.window_size()))
    }

    /// Next window of the current pass, or `None` once every building is done.
    fn next_window(&mut self) -> Result<Option<Window>, PipelineError> {
        loop {
            if let Some(window) = self
                .segmenter
                .window_at(&self.cursor.series, self.cursor.next_window)
            {
                self.cursor.next_window += 1;
                self.cursor.windows_this_pass += 1;
                self.stats.record_window_emitted();
                return Ok(Some(window));
            }

            let Some(&building) = self.buildings.get(self.cursor.building_index) else {
                return Ok(None);
            };

            // Advance a copy so a failed read leaves the cursor on that chunk
            let mut chunks = match &self.cursor.chunks {
                Some(chunks) => chunks.clone(),
                None => self.open_building(building)?,
            };
            match chunks.next() {
                Some(frame) => {
                    let series = self.load_chunk(building, frame)?;
                    self.cursor.chunks = Some(chunks);
                    self.cursor.chunk = Some(frame);
                    self.cursor.series = series;
                    self.cursor.next_window = 0;
                }
                None => self.cursor.next_building(),
            }
        }
    }

    fn wrap(&mut self) -> Result<(), PipelineError> {
        if self.cursor.windows_this_pass == 0 {
            return Err(PipelineError::DataValidation(format!(
                "a full traversal of buildings {:?} produced no windows of {} samples",
                self.buildings,
                self.segmenter.window_size()
            )));
        }

        self.cursor.rewind();
        self.cursor.wraps += 1;
        self.stats.record_wrap();
        info!(
            wraps = self.cursor.wraps,
            "window stream exhausted, restarting from the first building"
        );
        Ok(())
    }

    /// Chunks covering the period where both meters of a building have data.
    fn open_building(&self, building: BuildingId) -> Result<TimeFrameChunks, PipelineError> {
        let mains = self
            .store
            .timeframe(building, &Meter::Mains)
            .map_err(PipelineError::upstream(building, &Meter::Mains))?;
        let appliance = self
            .store
            .timeframe(building, &self.appliance)
            .map_err(PipelineError::upstream(building, &self.appliance))?;

        match mains.overlap(&appliance) {
            Some(overlap) => Ok(overlap.chunks(self.chunk_length)),
            None => {
                warn!(
                    building,
                    meter = %self.appliance,
                    "mains and appliance meters do not overlap, skipping building"
                );
                Ok(TimeFrame::new(mains.start, mains.start).chunks(self.chunk_length))
            }
        }
    }

    fn load_chunk(&self, building: BuildingId, frame: TimeFrame) -> Result<AlignedSeries, PipelineError> {
        let mains = self
            .store
            .read(building, &Meter::Mains, Some(frame))
            .map_err(PipelineError::upstream(building, &Meter::Mains))?;
        let appliance = self
            .store
            .read(building, &self.appliance, Some(frame))
            .map_err(PipelineError::upstream(building, &self.appliance))?;
        self.stats.record_chunk_read();

        let (series, trace) = self.pipeline.process(mains, appliance);
        self.stats.record_samples_aligned(series.len() as u64);
        debug!(
            building,
            start = %frame.start,
            end = %frame.end,
            samples = series.len(),
            on_samples = trace.on_count(),
            windows = self.segmenter.window_count(series.len()),
            "prepared chunk"
        );
        Ok(series)
    }
}

impl<S: PowerStore> Iterator for StreamingBatchAssembler<S> {
    type Item = Result<Batch, PipelineError>;

    /// Never returns `None`; exhaustion wraps around.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Σ mains duration ÷ sample period ÷ window size ÷ batch size, at least 1.
///
/// An estimate from metadata only: gaps in the real data lower the true yield.
fn estimate_batches_per_epoch<S: PowerStore>(
    store: &S,
    buildings: &[BuildingId],
    config: &PipelineConfig,
) -> Result<usize, PipelineError> {
    let mut total_millis: i64 = 0;
    for &building in buildings {
        let frame = store
            .timeframe(building, &Meter::Mains)
            .map_err(PipelineError::upstream(building, &Meter::Mains))?;
        total_millis = total_millis.saturating_add(frame.duration().num_milliseconds());
    }

    let samples = total_millis / config.sample_period_millis();
    let batches = samples as usize / config.window_size / config.batch_size;
    Ok(batches.max(1))
}
