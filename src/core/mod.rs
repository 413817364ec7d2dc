//! Core processing stages of the window stream.
//!
//! This module contains:
//! - Alignment of mains and appliance readings onto a shared time grid
//! - Appliance on/off labeling with duration debouncing, and target shaping
//! - Mains normalization statistics
//! - Window segmentation and infinite batch assembly

pub mod alignment;
pub mod batching;
pub mod debounce;
pub mod normalization;
pub mod windowing;

// Re-export commonly used types
pub use alignment::{AlignedSeries, AlignmentResampler, JoinPolicy};
pub use batching::{Batch, ChunkPipeline, StreamingBatchAssembler, TraversalCursor};
pub use debounce::{
    ApplianceStatusTrace, DebounceBoundary, OffValuePolicy, StatusDebouncer, TargetShaper,
};
pub use normalization::{
    NormalizationComputer, NormalizationParameters, RunningMoments, NORMALIZATION_EPSILON,
};
pub use windowing::{Window, WindowSegmenter, Windows};
