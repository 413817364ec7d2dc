//! NILM windowing - streaming preparation of power data for appliance models.
//!
//! This library turns raw aggregate (mains) and per-appliance power readings
//! from a time-series store into an endless stream of fixed-size training
//! batches for non-intrusive load monitoring.
//!
//! # Guarantees
//!
//! - **Bounded memory**: readings are fetched one time chunk at a time
//! - **No leakage**: normalization statistics come from training buildings only
//! - **No short batches**: the stream wraps around instead of running dry
//! - **Stable labels**: on/off debouncing is idempotent and never invents activations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         NILM windowing                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────────┐              │
//! │  │ PowerStore │──▶│  Alignment  │──▶│  Debounce   │              │
//! │  │  (chunks)  │   │ (6 s grid)  │   │ (on / off)  │              │
//! │  └────────────┘   └─────────────┘   └─────────────┘              │
//! │         │                                  │                     │
//! │         ▼                                  ▼                     │
//! │  ┌─────────────┐  ┌─────────────┐   ┌─────────────┐              │
//! │  │Normalization│─▶│  Windowing  │──▶│   Batches   │──▶ trainer   │
//! │  │(train only) │  │ (W samples) │   │ (B x W x 1) │              │
//! │  └─────────────┘  └─────────────┘   └─────────────┘              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nilm_windowing::{InMemoryStore, NilmDataset, PipelineConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let dataset = NilmDataset::new(store, vec![1, 2], vec![5], PipelineConfig::default())
//!     .expect("Failed to prepare dataset");
//!
//! let mut batches = dataset.training_assembler().expect("Failed to create assembler");
//! let batch = batches.next_batch().expect("Failed to read batch");
//! assert_eq!(batch.mains.dim(), (64, 480, 1));
//! ```

pub mod config;
pub mod core;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{ConfigError, PipelineConfig};
pub use core::{
    AlignedSeries, AlignmentResampler, ApplianceStatusTrace, Batch, DebounceBoundary, JoinPolicy,
    NormalizationComputer, NormalizationParameters, OffValuePolicy, StatusDebouncer,
    StreamingBatchAssembler, TargetShaper, Window, WindowSegmenter,
};
pub use dataset::NilmDataset;
pub use diagnostics::{SharedTraversalStats, TraversalSnapshot, TraversalStats};
pub use error::PipelineError;
pub use store::{BuildingId, InMemoryStore, Meter, PowerSample, PowerStore, StoreError, TimeFrame};

/// Crate version, reported in logs by training drivers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
