use std::sync::Arc;

use burn::data::dataset::Dataset;
use tracing::info;

use crate::data::synthetic::SyntheticImages;
use crate::data::{ImageItem, ImageShape};
use crate::error::{Result, TrainError};

pub type ImageDataset = Arc<dyn Dataset<ImageItem>>;

pub struct DatasetSplits {
    pub train: ImageDataset,
    pub test: ImageDataset,
    pub shape: ImageShape,
    /// Precomputed training pixel variance, for datasets too large to scan.
    pub fixed_variance: Option<f64>,
}

pub trait DatasetProvider {
    fn get(&self, name: &str) -> Result<DatasetSplits>;
}

/// Resolves the datasets this crate knows how to build.
#[derive(Debug, Clone, Default)]
pub struct BuiltinDatasets {
    pub synthetic: SyntheticImages,
}

impl DatasetProvider for BuiltinDatasets {
    fn get(&self, name: &str) -> Result<DatasetSplits> {
        let splits = match name.to_ascii_lowercase().as_str() {
            "synthetic" => self.synthetic.splits(),
            #[cfg(feature = "mnist")]
            "mnist" => crate::data::mnist::mnist_splits(),
            _ => {
                return Err(TrainError::DatasetUnavailable {
                    name: name.to_string(),
                })
            }
        };

        info!(
            dataset = name,
            train = splits.train.len(),
            test = splits.test.len(),
            shape = ?splits.shape,
            "loaded dataset"
        );

        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dataset_names_the_request() {
        let err = BuiltinDatasets::default().get("imagenet-42").err().unwrap();

        assert!(matches!(&err, TrainError::DatasetUnavailable { name } if name == "imagenet-42"));
        assert!(err.to_string().contains("imagenet-42"));
    }

    #[test]
    fn resolves_synthetic() {
        let splits = BuiltinDatasets::default().get("synthetic").unwrap();

        assert_eq!(splits.shape, ImageShape::new(1, 16, 16));
        assert_eq!(splits.train.len(), 512);
    }
}
