//! Access to the external time-series store.
//!
//! The pipeline never owns the metering data. It asks a [`PowerStore`] for the
//! time range a meter covers and for the readings inside a sub-range, one
//! bounded chunk at a time.

pub mod memory;
pub mod types;

use std::sync::Arc;

// Re-export commonly used types
pub use memory::InMemoryStore;
pub use types::{BuildingId, Meter, PowerSample, StoreError, TimeFrame, TimeFrameChunks};

/// A read-only source of power readings, keyed by building and meter.
///
/// Readings returned by [`PowerStore::read`] are expected in timestamp order,
/// but may contain duplicate or missing timestamps; the alignment stage
/// tolerates unsorted input as well.
pub trait PowerStore {
    /// The overall time range covered by a meter.
    fn timeframe(&self, building: BuildingId, meter: &Meter) -> Result<TimeFrame, StoreError>;

    /// Readings of a meter, restricted to `range` when given.
    fn read(
        &self,
        building: BuildingId,
        meter: &Meter,
        range: Option<TimeFrame>,
    ) -> Result<Vec<PowerSample>, StoreError>;
}

impl<T: PowerStore + ?Sized> PowerStore for Arc<T> {
    fn timeframe(&self, building: BuildingId, meter: &Meter) -> Result<TimeFrame, StoreError> {
        (**self).timeframe(building, meter)
    }

    fn read(
        &self,
        building: BuildingId,
        meter: &Meter,
        range: Option<TimeFrame>,
    ) -> Result<Vec<PowerSample>, StoreError> {
        (**self).read(building, meter, range)
    }
}

impl<T: PowerStore + ?Sized> PowerStore for &T {
    fn timeframe(&self, building: BuildingId, meter: &Meter) -> Result<TimeFrame, StoreError> {
        (**self).timeframe(building, meter)
    }

    fn read(
        &self,
        building: BuildingId,
        meter: &Meter,
        range: Option<TimeFrame>,
    ) -> Result<Vec<PowerSample>, StoreError> {
        (**self).read(building, meter, range)
    }
}
