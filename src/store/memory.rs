//! In-memory implementation of the time-series store.
//!
//! Used for fixtures and tests. Readings are kept exactly as inserted, so
//! unsorted or duplicated input reaches the pipeline unchanged.

use crate::store::types::{BuildingId, Meter, PowerSample, StoreError, TimeFrame};
use crate::store::PowerStore;
use chrono::Duration;
use std::collections::HashMap;

/// A store holding every meter's readings in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    meters: HashMap<(BuildingId, Meter), Vec<PowerSample>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the readings of a meter.
    pub fn insert(&mut self, building: BuildingId, meter: Meter, samples: Vec<PowerSample>) {
        self.meters.insert((building, meter), samples);
    }

    /// Builder-style variant of [`InMemoryStore::insert`].
    pub fn with_meter(mut self, building: BuildingId, meter: Meter, samples: Vec<PowerSample>) -> Self {
        self.insert(building, meter, samples);
        self
    }

    /// All buildings with at least one meter, in ascending order.
    pub fn buildings(&self) -> Vec<BuildingId> {
        let mut buildings: Vec<BuildingId> = self.meters.keys().map(|(b, _)| *b).collect();
        buildings.sort_unstable();
        buildings.dedup();
        buildings
    }

    fn samples(&self, building: BuildingId, meter: &Meter) -> Result<&[PowerSample], StoreError> {
        self.meters
            .get(&(building, meter.clone()))
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownMeter {
                building,
                meter: meter.clone(),
            })
    }
}

impl PowerStore for InMemoryStore {
    fn timeframe(&self, building: BuildingId, meter: &Meter) -> Result<TimeFrame, StoreError> {
        let samples = self.samples(building, meter)?;

        let first = samples.iter().map(|s| s.timestamp).min();
        let last = samples.iter().map(|s| s.timestamp).max();
        match (first, last) {
            // End is exclusive, so step just past the last reading
            (Some(first), Some(last)) => Ok(TimeFrame::new(first, last + Duration::milliseconds(1))),
            _ => Err(StoreError::EmptyMeter {
                building,
                meter: meter.clone(),
            }),
        }
    }

    fn read(
        &self,
        building: BuildingId,
        meter: &Meter,
        range: Option<TimeFrame>,
    ) -> Result<Vec<PowerSample>, StoreError> {
        let samples = self.samples(building, meter)?;

        Ok(match range {
            Some(range) => samples
                .iter()
                .filter(|s| range.contains(s.timestamp))
                .copied()
                .collect(),
            None => samples.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_meter(
                2,
                Meter::Mains,
                vec![
                    PowerSample::new(at(12), 300.0),
                    PowerSample::new(at(0), 100.0),
                    PowerSample::new(at(6), 200.0),
                ],
            )
            .with_meter(1, Meter::appliance("kettle"), vec![PowerSample::new(at(0), 0.0)])
    }

    #[test]
    fn test_timeframe_spans_unsorted_readings() {
        let frame = store().timeframe(2, &Meter::Mains).unwrap();
        assert_eq!(frame.start, at(0));
        assert!(frame.contains(at(12)));
        assert!(!frame.contains(at(13)));
    }

    #[test]
    fn test_read_filters_by_range_and_keeps_order() {
        let samples = store()
            .read(2, &Meter::Mains, Some(TimeFrame::new(at(5), at(13))))
            .unwrap();
        let powers: Vec<f64> = samples.iter().map(|s| s.power).collect();
        assert_eq!(powers, vec![300.0, 200.0]);
    }

    #[test]
    fn test_unknown_meter() {
        let result = store().read(3, &Meter::Mains, None);
        assert!(matches!(result, Err(StoreError::UnknownMeter { building: 3, .. })));
    }

    #[test]
    fn test_empty_meter_has_no_timeframe() {
        let store = InMemoryStore::new().with_meter(1, Meter::Mains, Vec::new());
        assert!(matches!(
            store.timeframe(1, &Meter::Mains),
            Err(StoreError::EmptyMeter { building: 1, .. })
        ));
    }

    #[test]
    fn test_buildings_sorted_and_unique() {
        assert_eq!(store().buildings(), vec![1, 2]);
    }
}
