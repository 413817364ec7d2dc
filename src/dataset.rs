//! Training/test split over one store.
//!
//! Normalization statistics come from the training buildings only and are
//! applied unchanged to the test buildings.

use crate::config::{ConfigError, PipelineConfig};
use crate::core::{NormalizationComputer, NormalizationParameters, StreamingBatchAssembler};
use crate::error::PipelineError;
use crate::store::{BuildingId, PowerStore};
use std::sync::Arc;

/// A store plus the buildings used for training and testing.
pub struct NilmDataset<S: ?Sized> {
    store: Arc<S>,
    training: Vec<BuildingId>,
    test: Vec<BuildingId>,
    config: PipelineConfig,
    params: NormalizationParameters,
}

impl<S: PowerStore + ?Sized> NilmDataset<S> {
    /// Validate the configuration and compute mains statistics from the
    /// training buildings. Any failure here is fatal for the dataset.
    pub fn new(
        store: Arc<S>,
        training: Vec<BuildingId>,
        test: Vec<BuildingId>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        if training.is_empty() {
            return Err(ConfigError::Invalid("no training buildings given".to_string()).into());
        }
        if test.is_empty() {
            return Err(ConfigError::Invalid("no test buildings given".to_string()).into());
        }

        let params = NormalizationComputer::from_config(&config)?.compute(&*store, &training)?;

        Ok(Self {
            store,
            training,
            test,
            config,
            params,
        })
    }

    /// Statistics computed from the training buildings.
    pub fn normalization(&self) -> NormalizationParameters {
        self.params
    }

    /// The validated configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Buildings used for training, in traversal order.
    pub fn training_buildings(&self) -> &[BuildingId] {
        &self.training
    }

    /// Held-out buildings, in traversal order.
    pub fn test_buildings(&self) -> &[BuildingId] {
        &self.test
    }

    /// Batch stream over the training buildings.
    pub fn training_assembler(&self) -> Result<StreamingBatchAssembler<Arc<S>>, PipelineError> {
        self.assembler(self.training.clone())
    }

    /// Batch stream over the test buildings, normalized with training statistics.
    pub fn test_assembler(&self) -> Result<StreamingBatchAssembler<Arc<S>>, PipelineError> {
        self.assembler(self.test.clone())
    }

    fn assembler(
        &self,
        buildings: Vec<BuildingId>,
    ) -> Result<StreamingBatchAssembler<Arc<S>>, PipelineError> {
        StreamingBatchAssembler::new(Arc::clone(&self.store), buildings, self.params, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Meter, PowerSample};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn readings(offset: f64, len: usize) -> Vec<PowerSample> {
        (0..len)
            .map(|i| {
                let at = Utc.timestamp_opt(1_700_000_004 + i as i64 * 6, 0).unwrap();
                PowerSample::new(at, offset + (i % 5) as f64)
            })
            .collect()
    }

    fn store() -> Arc<InMemoryStore> {
        let mut store = InMemoryStore::new();
        store.insert(1, Meter::Mains, readings(100.0, 60));
        store.insert(1, Meter::appliance("kettle"), readings(0.0, 60));
        store.insert(2, Meter::Mains, readings(5000.0, 60));
        store.insert(2, Meter::appliance("kettle"), readings(0.0, 60));
        Arc::new(store)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            window_size: 8,
            batch_size: 2,
            chunk_duration: Duration::from_secs(3600),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_statistics_from_training_buildings() {
        let dataset = NilmDataset::new(store(), vec![1], vec![2], config()).unwrap();
        assert!((dataset.normalization().mean() - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_assemblers_share_training_statistics() {
        let dataset = NilmDataset::new(store(), vec![1], vec![2], config()).unwrap();

        let train = dataset.training_assembler().unwrap();
        let mut test = dataset.test_assembler().unwrap();
        assert_eq!(train.buildings(), &[1]);
        assert_eq!(test.buildings(), &[2]);

        // Test mains sits far above the training mean
        let batch = test.next_batch().unwrap();
        assert!(batch.mains.iter().all(|&v| v > 100.0));
    }

    #[test]
    fn test_empty_building_lists_rejected() {
        assert!(matches!(
            NilmDataset::new(store(), vec![], vec![2], config()),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            NilmDataset::new(store(), vec![1], vec![], config()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_training_building_is_fatal() {
        assert!(matches!(
            NilmDataset::new(store(), vec![9], vec![2], config()),
            Err(PipelineError::UpstreamRead { building: 9, .. })
        ));
    }
}
