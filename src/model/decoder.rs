use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

use crate::model::residual::{ResidualStack, ResidualStackConfig};

#[derive(Config, Debug)]
pub struct DecoderConfig {
    pub embedding_dim: usize,
    pub num_hidden: usize,
    pub num_residual_hidden: usize,
    pub num_residual_layers: usize,
    pub out_channels: usize,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        let half_hidden = self.num_hidden / 2;

        Decoder {
            conv: Conv2dConfig::new([self.embedding_dim, self.num_hidden], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            residual: ResidualStackConfig::new(
                self.num_hidden,
                self.num_residual_hidden,
                self.num_residual_layers,
            )
            .init(device),
            upsample_1: ConvTranspose2dConfig::new([self.num_hidden, half_hidden], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .init(device),
            upsample_2: ConvTranspose2dConfig::new([half_hidden, self.out_channels], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    conv: Conv2d<B>,
    residual: ResidualStack<B>,
    upsample_1: ConvTranspose2d<B>,
    upsample_2: ConvTranspose2d<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(&self, quantized: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = self.conv.forward(quantized);
        let hidden = self.residual.forward(hidden);
        let hidden = relu(self.upsample_1.forward(hidden));

        self.upsample_2.forward(hidden)
    }
}
