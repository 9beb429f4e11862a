use burn::config::Config;
use burn::module::Module;
use burn::prelude::Backend;
use burn::tensor::Tensor;

use crate::error::TrainError;
use crate::model::decoder::{Decoder, DecoderConfig};
use crate::model::encoder::{Encoder, EncoderConfig};
use crate::model::quantizer::{QuantizerOutput, VectorQuantizer, VectorQuantizerConfig};

pub mod decoder;
pub mod encoder;
pub mod quantizer;
pub mod residual;

#[derive(Config, Debug)]
pub struct VqVaeConfig {
    pub num_hidden: usize,
    pub num_residual_hidden: usize,
    pub embedding_dim: usize,
    pub num_embeddings: usize,
    pub commitment_cost: f64,
    #[config(default = 2)]
    pub num_residual_layers: usize,
}

impl VqVaeConfig {
    pub fn init<B: Backend>(&self, channels: usize, device: &B::Device) -> VqVae<B> {
        let encoder = EncoderConfig::new(
            channels,
            self.num_hidden,
            self.num_residual_hidden,
            self.num_residual_layers,
            self.embedding_dim,
        );
        let decoder = DecoderConfig::new(
            self.embedding_dim,
            self.num_hidden,
            self.num_residual_hidden,
            self.num_residual_layers,
            channels,
        );
        let quantizer =
            VectorQuantizerConfig::new(self.num_embeddings, self.embedding_dim, self.commitment_cost);

        VqVae {
            encoder: encoder.init(device),
            quantizer: quantizer.init(device),
            decoder: decoder.init(device),
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.num_hidden < 2 || self.num_residual_hidden == 0 {
            return Err(TrainError::config(
                "`num_hidden` must be at least 2 and `num_residual_hidden` positive",
            ));
        }
        if self.embedding_dim == 0 || self.num_embeddings == 0 {
            return Err(TrainError::config(
                "`embedding_dim` and `num_embeddings` must be positive",
            ));
        }
        if !(self.commitment_cost.is_finite() && self.commitment_cost >= 0.0) {
            return Err(TrainError::config(format!(
                "`commitment_cost` must be a non-negative number, got {}",
                self.commitment_cost
            )));
        }

        Ok(())
    }
}

/// Encoder, codebook bottleneck and decoder. Every learnable parameter of a run
/// lives here, so a record of this module is a complete checkpoint.
#[derive(Module, Debug)]
pub struct VqVae<B: Backend> {
    pub encoder: Encoder<B>,
    pub quantizer: VectorQuantizer<B>,
    pub decoder: Decoder<B>,
}

pub struct VqVaeOutput<B: Backend> {
    pub reconstruction: Tensor<B, 4>,
    pub quantizer: QuantizerOutput<B>,
}

impl<B: Backend> VqVae<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> VqVaeOutput<B> {
        // images : B x C x H x W
        let latents = self.encoder.forward(images);
        // latents : B x D x H/4 x W/4
        let quantizer = self.quantizer.forward(latents);
        let reconstruction = self.decoder.forward(quantizer.quantized.clone());

        VqVaeOutput {
            reconstruction,
            quantizer,
        }
    }
}
