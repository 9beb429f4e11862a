use burn::config::Config;
use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::{Backend, Int, Tensor};

use crate::model::quantizer::codebook::{Codebook, CodebookConfig};
use crate::ops::{flatten_spatial, unflatten_spatial};

pub mod codebook;

#[derive(Config, Debug)]
pub struct VectorQuantizerConfig {
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    pub commitment_cost: f64,
}

impl VectorQuantizerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> VectorQuantizer<B> {
        VectorQuantizer {
            codebook: CodebookConfig::new(self.num_embeddings, self.embedding_dim).init(device),
            commitment_cost: self.commitment_cost,
        }
    }
}

#[derive(Module, Debug)]
pub struct VectorQuantizer<B: Backend> {
    pub codebook: Codebook<B>,
    commitment_cost: f64,
}

pub struct QuantizerOutput<B: Backend> {
    /// Quantized grid whose gradient w.r.t. the latents is the identity.
    pub quantized: Tensor<B, 4>,
    /// B x H x W codebook indices.
    pub assignments: Tensor<B, 3, Int>,
    /// `codebook_loss + commitment_cost * commitment_loss`
    pub loss: Tensor<B, 1>,
    pub codebook_loss: Tensor<B, 1>,
    pub commitment_loss: Tensor<B, 1>,
    pub perplexity: Tensor<B, 1>,
}

impl<B: Backend> VectorQuantizer<B> {
    pub fn from_codebook(codebook: Codebook<B>, commitment_cost: f64) -> Self {
        Self {
            codebook,
            commitment_cost,
        }
    }

    pub fn commitment_cost(&self) -> f64 {
        self.commitment_cost
    }

    pub fn forward(&self, latents: Tensor<B, 4>) -> QuantizerOutput<B> {
        let [batch, channels, height, width] = latents.dims();
        assert_eq!(
            channels,
            self.codebook.embedding_dim(),
            "latent channels must equal the codebook dimension"
        );

        // (B*H*W) x D
        let rows = flatten_spatial(latents.clone());
        let indices = self.codebook.nearest(rows);
        let perplexity = self.perplexity(indices.clone());

        let selected = unflatten_spatial(self.codebook.lookup(indices.clone()), [batch, height, width]);

        let mse = MseLoss::new();
        // pulls the codebook towards the encoder output, the encoder is frozen here
        let codebook_loss = mse.forward(selected.clone(), latents.clone().detach(), Reduction::Mean);
        // pulls the encoder towards its assignment, the codebook is frozen here
        let commitment_loss = mse.forward(latents.clone(), selected.clone().detach(), Reduction::Mean);
        let loss = codebook_loss.clone() + commitment_loss.clone().mul_scalar(self.commitment_cost);

        // straight-through: value of `selected`, gradient of `latents`
        let quantized = latents.clone() + (selected - latents).detach();

        QuantizerOutput {
            quantized,
            assignments: indices.reshape([batch, height, width]),
            loss,
            codebook_loss,
            commitment_loss,
            perplexity,
        }
    }

    /// exp of the entropy of the batch's assignment histogram; K when every code
    /// is used equally, 1 when a single code takes everything.
    fn perplexity(&self, indices: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let count = indices.dims()[0];
        let num_embeddings = self.codebook.num_embeddings();
        let device = indices.device();

        let one_hot = Tensor::<B, 2>::zeros([count, num_embeddings], &device).scatter(
            1,
            indices.reshape([count, 1]),
            Tensor::ones([count, 1], &device),
        );
        let probs = one_hot.mean_dim(0);

        let entropy = (probs.clone() * (probs + 1e-10).log()).sum().neg();
        entropy.exp()
    }
}
