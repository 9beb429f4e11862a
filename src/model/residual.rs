use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;
use itertools::Itertools;

#[derive(Module, Debug)]
pub struct ResidualLayer<B: Backend> {
    conv_3x3: Conv2d<B>,
    conv_1x1: Conv2d<B>,
}

impl<B: Backend> ResidualLayer<B> {
    pub fn forward(&self, hidden: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.conv_3x3.forward(relu(hidden.clone()));
        let residual = self.conv_1x1.forward(relu(residual));

        hidden + residual
    }
}

#[derive(Config, Debug)]
pub struct ResidualStackConfig {
    pub num_hidden: usize,
    pub num_residual_hidden: usize,
    pub num_layers: usize,
}

impl ResidualStackConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualStack<B> {
        let layers = (0..self.num_layers)
            .map(|_| ResidualLayer {
                conv_3x3: Conv2dConfig::new([self.num_hidden, self.num_residual_hidden], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false)
                    .init(device),
                conv_1x1: Conv2dConfig::new([self.num_residual_hidden, self.num_hidden], [1, 1])
                    .with_bias(false)
                    .init(device),
            })
            .collect_vec();

        ResidualStack { layers }
    }
}

/// Shape-preserving stack of residual blocks, closed by a ReLU.
#[derive(Module, Debug)]
pub struct ResidualStack<B: Backend> {
    layers: Vec<ResidualLayer<B>>,
}

impl<B: Backend> ResidualStack<B> {
    pub fn forward(&self, mut hidden: Tensor<B, 4>) -> Tensor<B, 4> {
        for layer in &self.layers {
            hidden = layer.forward(hidden);
        }

        relu(hidden)
    }
}
