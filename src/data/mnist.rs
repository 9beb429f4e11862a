use std::sync::Arc;

use burn::data::dataset::transform::{Mapper, MapperDataset};
use burn::data::dataset::vision::{MnistDataset, MnistItem};

use crate::data::provider::DatasetSplits;
use crate::data::{ImageItem, ImageShape};

const MNIST_SIDE: usize = 28;

struct ScalePixels;

impl Mapper<MnistItem, ImageItem> for ScalePixels {
    fn map(&self, item: &MnistItem) -> ImageItem {
        ImageItem {
            pixels: item.image.iter().flatten().map(|pixel| pixel / 255.0).collect(),
            label: item.label as usize,
        }
    }
}

/// Downloads into burn's dataset cache on first use.
pub fn mnist_splits() -> DatasetSplits {
    DatasetSplits {
        train: Arc::new(MapperDataset::new(MnistDataset::train(), ScalePixels)),
        test: Arc::new(MapperDataset::new(MnistDataset::test(), ScalePixels)),
        shape: ImageShape::new(1, MNIST_SIDE, MNIST_SIDE),
        fixed_variance: None,
    }
}
