//! Integration tests for the window stream against an in-memory store

use chrono::{DateTime, TimeZone, Utc};
use nilm_windowing::core::RunningMoments;
use nilm_windowing::{
    AlignmentResampler, JoinPolicy, InMemoryStore, Meter, NilmDataset, PipelineConfig,
    PipelineError, PowerSample, StatusDebouncer, StreamingBatchAssembler, WindowSegmenter,
};
use statrs::statistics::Statistics;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A multiple of 6 s, so readings fall on grid points.
const T0: i64 = 1_700_000_004;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T0 + secs, 0).unwrap()
}

/// One building with a kettle boiling for a minute every ten minutes.
///
/// Mains jitters by up to two seconds and misses every 17th reading; the
/// kettle meter reports on the grid.
fn insert_building(store: &mut InMemoryStore, building: u32, readings: i64, base_load: f64) {
    let mut mains = Vec::new();
    let mut kettle = Vec::new();
    for i in 0..readings {
        let boiling = i % 100 < 10;
        let kettle_power = if boiling { 2500.0 } else { 1.0 };
        let load = base_load + (i % 7) as f64 * 15.0;

        if i % 17 != 5 {
            mains.push(PowerSample::new(at(i * 6 + i % 3), load + kettle_power));
        }
        kettle.push(PowerSample::new(at(i * 6), kettle_power));
    }
    store.insert(building, Meter::Mains, mains);
    store.insert(building, Meter::appliance("kettle"), kettle);
}

fn config() -> PipelineConfig {
    PipelineConfig {
        window_size: 32,
        batch_size: 4,
        chunk_duration: Duration::from_secs(3600),
        ..PipelineConfig::default()
    }
}

fn store() -> Arc<InMemoryStore> {
    let mut store = InMemoryStore::new();
    insert_building(&mut store, 1, 1500, 200.0);
    insert_building(&mut store, 2, 900, 350.0);
    insert_building(&mut store, 5, 700, 120.0);
    Arc::new(store)
}

#[test]
fn test_stream_never_runs_dry() {
    init_tracing();
    let dataset = NilmDataset::new(store(), vec![1, 2], vec![5], config()).unwrap();
    let mut assembler = dataset.training_assembler().unwrap();

    let calls = assembler.batches_per_epoch() + 3;
    for _ in 0..calls {
        let batch = assembler.next_batch().unwrap();
        assert_eq!(batch.mains.dim(), (4, 32, 1));
        assert_eq!(batch.appliance.dim(), (4, 32, 1));
    }

    let stats = assembler.stats().snapshot();
    assert_eq!(stats.batches_served, calls as u64);
    assert_eq!(stats.windows_emitted, calls as u64 * 4);
    assert!(stats.wraps >= 1);
}

#[test]
fn test_iterator_keeps_yielding() {
    init_tracing();
    let dataset = NilmDataset::new(store(), vec![5], vec![2], config()).unwrap();
    let assembler = dataset.test_assembler().unwrap();

    let epoch = assembler.batches_per_epoch();
    let batches: Vec<_> = assembler.take(epoch * 3).collect();
    assert_eq!(batches.len(), epoch * 3);
    assert!(batches.iter().all(Result::is_ok));
}

#[test]
fn test_targets_are_masked_and_clipped() {
    init_tracing();
    let config = config();
    let dataset = NilmDataset::new(store(), vec![1], vec![2], config.clone()).unwrap();
    let mut assembler = dataset.training_assembler().unwrap();

    for _ in 0..assembler.batches_per_epoch() {
        let batch = assembler.next_batch().unwrap();
        for &value in batch.appliance.iter() {
            assert!(
                value == 0.0 || (config.on_threshold..=config.max_power).contains(&value),
                "unexpected target {value}"
            );
        }
    }
}

#[test]
fn test_training_mains_is_standardized() {
    init_tracing();
    let store = store();
    let dataset = NilmDataset::new(Arc::clone(&store), vec![1, 2], vec![5], config()).unwrap();
    let params = dataset.normalization();

    let mut normalized = Vec::new();
    for building in [1, 2] {
        let samples = nilm_windowing::PowerStore::read(&*store, building, &Meter::Mains, None).unwrap();
        normalized.extend(samples.iter().map(|s| params.normalize(s.power)));
    }

    assert!(normalized.iter().mean().abs() < 1e-9);
    assert!((normalized.iter().std_dev() - 1.0).abs() < 1e-6);

    let mut moments = RunningMoments::default();
    moments.extend(normalized.iter().copied());
    assert_eq!(moments.count(), normalized.len() as u64);
}

#[test]
fn test_buildings_traversed_in_order() {
    init_tracing();
    let mut store = InMemoryStore::new();
    insert_building(&mut store, 3, 64, 100.0);
    insert_building(&mut store, 4, 64, 9000.0);
    let config = PipelineConfig {
        window_size: 16,
        batch_size: 1,
        ..config()
    };
    let params = nilm_windowing::NormalizationParameters::new(0.0, 1.0).unwrap();
    let mut assembler = StreamingBatchAssembler::new(&store, vec![3, 4], params, &config).unwrap();

    let mut firsts = Vec::new();
    for _ in 0..8 {
        let batch = assembler.next_batch().unwrap();
        firsts.push(batch.mains[[0, 0, 0]] > 5000.0);
    }
    // Four windows from each building, low-load building first
    assert_eq!(firsts, vec![false, false, false, false, true, true, true, true]);
}

#[test]
fn test_too_short_data_fails_instead_of_spinning() {
    init_tracing();
    let mut store = InMemoryStore::new();
    insert_building(&mut store, 1, 20, 100.0);
    let params = nilm_windowing::NormalizationParameters::new(0.0, 1.0).unwrap();

    let mut assembler = StreamingBatchAssembler::new(&store, vec![1], params, &config()).unwrap();
    assert!(matches!(
        assembler.next_batch(),
        Err(PipelineError::DataValidation(_))
    ));
}

#[test]
fn test_debounce_bridges_trailing_gap() {
    let debouncer = StatusDebouncer::new(
        5.0,
        Duration::from_secs(1),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let trace = debouncer.label(&[0.0, 0.0, 6.0, 6.0, 0.0, 0.0]);
    assert_eq!(trace.labels(), vec![0, 0, 1, 1, 1, 1]);
}

#[test]
fn test_window_scenario() {
    let resampler = AlignmentResampler::new(Duration::from_secs(6), JoinPolicy::Exact);
    let samples: Vec<PowerSample> = (0..10).map(|i| PowerSample::new(at(i * 6), i as f64)).collect();
    let series = resampler.align(samples.clone(), samples);
    assert_eq!(series.len(), 10);

    let windows: Vec<_> = WindowSegmenter::new(4).unwrap().segment(&series).collect();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].mains, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(windows[1].mains, vec![4.0, 5.0, 6.0, 7.0]);
}

#[test]
fn test_alignment_never_grows_series() {
    let resampler = AlignmentResampler::new(Duration::from_secs(6), JoinPolicy::default());
    for stride in [3, 6, 7, 13] {
        let mains: Vec<PowerSample> = (0..200)
            .map(|i| PowerSample::new(at(i * 6 + i % 4), 100.0))
            .collect();
        let appliance: Vec<PowerSample> = (0..150)
            .map(|i| PowerSample::new(at(i * stride), 1.0))
            .collect();

        let series = resampler.align(mains, appliance);
        assert!(series.len() <= 150, "stride {stride}: {} samples", series.len());
        assert!(series.len() <= 200, "stride {stride}: {} samples", series.len());
        assert!(series.timestamps().windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_config_file_drives_pipeline() {
    init_tracing();
    let path = std::env::temp_dir().join("nilm-windowing-pipeline-test.json");
    let config = PipelineConfig {
        appliance: "kettle".to_string(),
        ..config()
    };
    config.save_to(&path).unwrap();
    let loaded = PipelineConfig::load_from(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, config);
    let dataset = NilmDataset::new(store(), vec![1], vec![5], loaded).unwrap();
    assert!(dataset.test_assembler().unwrap().next_batch().is_ok());
}
