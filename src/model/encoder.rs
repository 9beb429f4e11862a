use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

use crate::model::residual::{ResidualStack, ResidualStackConfig};

#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub in_channels: usize,
    pub num_hidden: usize,
    pub num_residual_hidden: usize,
    pub num_residual_layers: usize,
    pub embedding_dim: usize,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let half_hidden = self.num_hidden / 2;

        Encoder {
            downsample_1: Conv2dConfig::new([self.in_channels, half_hidden], [4, 4])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            downsample_2: Conv2dConfig::new([half_hidden, self.num_hidden], [4, 4])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv: Conv2dConfig::new([self.num_hidden, self.num_hidden], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            residual: ResidualStackConfig::new(
                self.num_hidden,
                self.num_residual_hidden,
                self.num_residual_layers,
            )
            .init(device),
            pre_quantization: Conv2dConfig::new([self.num_hidden, self.embedding_dim], [1, 1])
                .init(device),
        }
    }
}

/// Downsamples by 4 in both spatial dimensions and projects to the codebook dimension.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    downsample_1: Conv2d<B>,
    downsample_2: Conv2d<B>,
    conv: Conv2d<B>,
    residual: ResidualStack<B>,
    pre_quantization: Conv2d<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = relu(self.downsample_1.forward(images));
        let hidden = relu(self.downsample_2.forward(hidden));
        let hidden = self.conv.forward(hidden);
        let hidden = self.residual.forward(hidden);

        self.pre_quantization.forward(hidden)
    }
}
