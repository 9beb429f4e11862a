use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use tracing::{debug, warn};

use crate::error::{Result, TrainError};
use crate::model::VqVae;

const FILE_STEM: &str = "model";
const WRITE_ATTEMPTS: usize = 2;

/// Full-precision parameter blobs under `<root>/<dataset>/model.bin`. Each save
/// replaces the previous one.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, dataset: &str) -> PathBuf {
        self.stem_for(dataset).with_extension("bin")
    }

    // the recorder appends the extension itself
    fn stem_for(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset).join(FILE_STEM)
    }

    pub fn save<B: Backend>(&self, dataset: &str, model: &VqVae<B>) -> Result<PathBuf> {
        let path = self.path_for(dataset);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

        let written = with_retry(WRITE_ATTEMPTS, |attempt| {
            fs::create_dir_all(self.root.join(dataset))
                .map_err(|err| err.to_string())
                .and_then(|_| {
                    model
                        .clone()
                        .save_file(self.stem_for(dataset), &recorder)
                        .map_err(|err| format!("{err:?}"))
                })
                .inspect_err(|err| warn!(path = %path.display(), attempt, %err, "checkpoint write failed"))
        });

        match written {
            Ok(()) => {
                debug!(path = %path.display(), "saved checkpoint");
                Ok(path)
            }
            Err(reason) => Err(TrainError::CheckpointWrite { path, reason }),
        }
    }

    /// Loads the stored parameters into `model`, which must have been built from
    /// the same model configuration.
    pub fn load<B: Backend>(&self, dataset: &str, model: VqVae<B>, device: &B::Device) -> Result<VqVae<B>> {
        let path = self.path_for(dataset);
        if !path.is_file() {
            return Err(TrainError::CheckpointRead {
                path,
                reason: "no such file".to_string(),
            });
        }

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .load_file(self.stem_for(dataset), &recorder, device)
            .map_err(|err| TrainError::CheckpointRead {
                path,
                reason: format!("{err:?}"),
            })
    }
}

/// Calls `write` up to `attempts` times, stopping at the first success.
fn with_retry(
    attempts: usize,
    mut write: impl FnMut(usize) -> std::result::Result<(), String>,
) -> std::result::Result<(), String> {
    let mut last = Err(String::from("no write attempted"));
    for attempt in 1..=attempts {
        last = write(attempt);
        if last.is_ok() {
            break;
        }
    }

    last
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::prelude::Tensor;
    use burn::tensor::Distribution;

    use super::*;
    use crate::model::VqVaeConfig;

    type TestBackend = NdArray;

    fn config() -> VqVaeConfig {
        VqVaeConfig::new(4, 2, 3, 5, 0.25).with_num_residual_layers(1)
    }

    fn outputs(model: &VqVae<TestBackend>, images: Tensor<TestBackend, 4>) -> Vec<f32> {
        model
            .forward(images)
            .reconstruction
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn same_state_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let model = config().init::<TestBackend>(1, &Default::default());

        let path = store.save("synthetic", &model).unwrap();
        let first = fs::read(&path).unwrap();
        store.save("synthetic", &model).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(path, dir.path().join("synthetic").join("model.bin"));
        assert_eq!(first, second);
    }

    #[test]
    fn loaded_model_reproduces_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let store = CheckpointStore::new(dir.path());
        let images = Tensor::<TestBackend, 4>::random([2, 1, 8, 8], Distribution::Default, &device);

        let saved = config().init::<TestBackend>(1, &device);
        store.save("synthetic", &saved).unwrap();

        let fresh = config().init::<TestBackend>(1, &device);
        let loaded = store.load("synthetic", fresh, &device).unwrap();

        assert_eq!(outputs(&saved, images.clone()), outputs(&loaded, images));
    }

    #[test]
    fn later_saves_replace_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let store = CheckpointStore::new(dir.path());
        let images = Tensor::<TestBackend, 4>::random([1, 1, 8, 8], Distribution::Default, &device);

        store.save("synthetic", &config().init::<TestBackend>(1, &device)).unwrap();
        let latest = config().init::<TestBackend>(1, &device);
        store.save("synthetic", &latest).unwrap();

        let loaded = store
            .load("synthetic", config().init::<TestBackend>(1, &device), &device)
            .unwrap();
        assert_eq!(outputs(&latest, images.clone()), outputs(&loaded, images));
    }

    #[test]
    fn missing_checkpoint_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let err = store
            .load("mnist", config().init::<TestBackend>(1, &Default::default()), &Default::default())
            .err()
            .unwrap();

        assert!(matches!(err, TrainError::CheckpointRead { .. }));
    }

    #[test]
    fn retry_gives_up_after_the_second_attempt() {
        let mut calls = 0;
        let result = with_retry(WRITE_ATTEMPTS, |_| {
            calls += 1;
            Err(format!("disk full {calls}"))
        });

        assert_eq!(calls, 2);
        assert_eq!(result, Err("disk full 2".to_string()));
    }

    #[test]
    fn retry_recovers_from_one_failure() {
        let mut calls = 0;
        let result = with_retry(WRITE_ATTEMPTS, |attempt| {
            calls += 1;
            if attempt == 1 {
                Err("busy".to_string())
            } else {
                Ok(())
            }
        });

        assert_eq!(calls, 2);
        assert!(result.is_ok());
    }

    #[test]
    fn file_in_place_of_the_root_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("occupied");
        fs::write(&root, b"not a directory").unwrap();
        let store = CheckpointStore::new(&root);

        let err = store
            .save("synthetic", &config().init::<TestBackend>(1, &Default::default()))
            .err()
            .unwrap();

        match err {
            TrainError::CheckpointWrite { path, reason } => {
                assert_eq!(path, root.join("synthetic").join("model.bin"));
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
