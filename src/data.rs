use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Tensor};
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

#[cfg(feature = "mnist")]
pub mod mnist;
pub mod provider;
pub mod stats;
pub mod stream;
pub mod synthetic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub fn num_pixels(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// One image in CHW order with pixels in `[0, 1]`. The label is carried but
/// never used by the autoencoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
    pub label: usize,
}

pub struct ImageBatch<B: Backend> {
    // B x C x H x W
    pub images: Tensor<B, 4>,
}

/// Moves host items onto the compute device; the only place tensors are created
/// from dataset items.
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    shape: ImageShape,
    device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(shape: ImageShape, device: B::Device) -> Self {
        Self { shape, device }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let ImageShape {
            channels,
            height,
            width,
        } = self.shape;
        let batch_size = items.len();

        let mut pixels = Vec::with_capacity(batch_size * self.shape.num_pixels());
        for item in items {
            assert_eq!(
                item.pixels.len(),
                self.shape.num_pixels(),
                "image does not match the declared dataset shape"
            );
            pixels.extend(item.pixels);
        }

        let data = TensorData::new(pixels, [batch_size, channels, height, width]);

        ImageBatch {
            images: Tensor::from_data(data, &self.device),
        }
    }
}
