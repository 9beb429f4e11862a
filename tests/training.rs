use std::sync::Arc;

use burn::backend::{Autodiff, NdArray};
use burn::data::dataset::{Dataset, InMemDataset};
use burn::module::AutodiffModule;
use burn::tensor::{Distribution, Tensor};

use vqvae::checkpoint::CheckpointStore;
use vqvae::config::TrainingConfig;
use vqvae::data::provider::{BuiltinDatasets, DatasetProvider, DatasetSplits};
use vqvae::data::synthetic::SyntheticImages;
use vqvae::data::{ImageItem, ImageShape};
use vqvae::error::Phase;
use vqvae::model::VqVaeConfig;
use vqvae::monitor::MemoryMonitor;
use vqvae::train::{train, RunContext, StopReason, TAG_FIRST_EPOCH, TAG_ORIGINAL, TAG_RECONSTRUCTION, TAG_TRAIN_LOSS};
use vqvae::TrainError;

type B = Autodiff<NdArray>;

fn tiny_config() -> TrainingConfig {
    let model = VqVaeConfig::new(4, 2, 3, 6, 0.25).with_num_residual_layers(1);

    TrainingConfig::new("synthetic".to_string(), 4, 1e-3, 3, 2, true, true, 2, model)
        .with_eval_batch_size(4)
        .with_snapshot_interval(1)
        .with_prefer_accelerator(false)
}

fn tiny_splits() -> DatasetSplits {
    SyntheticImages {
        shape: ImageShape::new(1, 8, 8),
        train_len: 8,
        test_len: 4,
        seed: 9,
    }
    .splits()
}

fn context(monitor: &MemoryMonitor, store: CheckpointStore) -> RunContext {
    RunContext::new(monitor.clone(), monitor.clone()).with_checkpoints(store)
}

#[test]
fn full_run_reports_to_every_sink() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let store = CheckpointStore::new(dir.path());
    let mut context = context(&monitor, store.clone());
    let device = Default::default();

    let report = train::<B>(&tiny_config(), tiny_splits(), &mut context, &device).unwrap();

    // with a window of 2 the only epoch able to stop a 3 epoch run is the last
    assert_eq!(report.history.len(), 3);
    assert!(matches!(
        report.stop,
        StopReason::MaxEpochsReached | StopReason::EarlyStopped { epoch: 2 }
    ));
    assert!(report.history.epochs().iter().all(|epoch| epoch.train.is_finite() && epoch.eval.is_finite()));
    assert!(report.train_variance > 0.0);

    let train_losses = monitor.scalars(TAG_TRAIN_LOSS);
    assert_eq!(train_losses.iter().map(|event| event.step).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(train_losses[1].value, report.history.train_losses()[1]);

    assert_eq!(monitor.images(TAG_ORIGINAL).len(), 1);
    assert_eq!(monitor.images(TAG_RECONSTRUCTION).len(), 3);

    let snapshots = monitor.images(TAG_FIRST_EPOCH);
    assert_eq!(snapshots.iter().map(|event| event.step).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(snapshots[0].grid.shape, [2, 1, 8, 8]);

    let run_config = monitor.run_config().unwrap();
    assert_eq!(run_config.get("dataset").map(String::as_str), Some("synthetic"));
    assert_eq!(run_config.get("num_embeddings").map(String::as_str), Some("6"));

    assert!(store.path_for("synthetic").is_file());
}

#[test]
fn checkpoint_holds_the_final_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let store = CheckpointStore::new(dir.path());
    let mut context = context(&monitor, store.clone());
    let device = Default::default();
    let config = tiny_config().with_num_workers(2);

    let report = train::<B>(&config, tiny_splits(), &mut context, &device).unwrap();

    let fresh = config.model.init::<B>(1, &device);
    let loaded = store.load("synthetic", fresh, &device).unwrap();

    let images = Tensor::<NdArray, 4>::random([2, 1, 8, 8], Distribution::Default, &device);
    let expected = report.model.valid().forward(images.clone()).reconstruction;
    let actual = loaded.valid().forward(images).reconstruction;

    assert_eq!(
        expected.into_data().to_vec::<f32>().unwrap(),
        actual.into_data().to_vec::<f32>().unwrap()
    );
}

#[test]
fn nan_pixels_abort_the_first_batch() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let mut context = context(&monitor, CheckpointStore::new(dir.path()));
    let config = tiny_config().with_train_variance(Some(1.0));

    let broken = (0..8)
        .map(|label| ImageItem {
            pixels: vec![f32::NAN; 64],
            label,
        })
        .collect::<Vec<_>>();
    let splits = DatasetSplits {
        train: Arc::new(InMemDataset::new(broken.clone())),
        test: Arc::new(InMemDataset::new(broken)),
        shape: ImageShape::new(1, 8, 8),
        fixed_variance: None,
    };

    let err = train::<B>(&config, splits, &mut context, &Default::default())
        .err()
        .unwrap();

    assert!(matches!(
        err,
        TrainError::NonFiniteLoss {
            phase: Phase::Training,
            epoch: 0,
            batch: 0,
            ..
        }
    ));
    assert!(monitor.scalars(TAG_TRAIN_LOSS).is_empty());
}

#[test]
fn unknown_dataset_is_reported_before_training() {
    let err = BuiltinDatasets::default().get("xray").err().unwrap();

    assert!(matches!(err, TrainError::DatasetUnavailable { ref name } if name == "xray"));
}

#[test]
fn invalid_window_is_rejected_before_any_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let mut context = context(&monitor, CheckpointStore::new(dir.path()));
    let mut config = tiny_config();
    config.early_stopping_epochs = 3;

    let err = train::<B>(&config, tiny_splits(), &mut context, &Default::default())
        .err()
        .unwrap();

    assert!(matches!(err, TrainError::Configuration(_)));
    assert!(monitor.run_config().is_none());
}

#[test]
fn nan_in_evaluation_aborts_the_evaluation_phase() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let mut context = context(&monitor, CheckpointStore::new(dir.path()));

    let mut splits = tiny_splits();
    let mut test = (0..splits.test.len())
        .map(|index| splits.test.get(index).unwrap())
        .collect::<Vec<_>>();
    test[1].pixels[0] = f32::NAN;
    splits.test = Arc::new(InMemDataset::new(test));

    let err = train::<B>(&tiny_config(), splits, &mut context, &Default::default())
        .err()
        .unwrap();

    assert!(matches!(
        err,
        TrainError::NonFiniteLoss {
            phase: Phase::Evaluation,
            epoch: 0,
            batch: 0,
            ..
        }
    ));
    // the training epoch itself completed
    assert_eq!(monitor.images(TAG_FIRST_EPOCH).len(), 2);
    assert!(monitor.scalars(TAG_TRAIN_LOSS).is_empty());
}

#[test]
fn overflowing_update_aborts_on_the_codebook() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = MemoryMonitor::default();
    let mut context = context(&monitor, CheckpointStore::new(dir.path()));
    // finite as f64, infinite once cast to the f32 parameters
    let config = TrainingConfig {
        learning_rate: 1e39,
        ..tiny_config()
    };

    let err = train::<B>(&config, tiny_splits(), &mut context, &Default::default())
        .err()
        .unwrap();

    assert!(matches!(err, TrainError::NonFiniteCodebook { epoch: 0, batch: 0 }));
}
