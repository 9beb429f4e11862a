use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::{Backend, Tensor};

use crate::error::{Result, TrainError};

/// `mse(target, reconstruction) / train_variance + quantizer_loss`.
///
/// The variance is fixed for the whole run so that losses stay comparable
/// across batches, epochs and the train/eval split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionObjective {
    train_variance: f64,
}

pub struct LossTerms<B: Backend> {
    pub total: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    pub quantization: Tensor<B, 1>,
}

impl ReconstructionObjective {
    pub fn new(train_variance: f64) -> Result<Self> {
        if !(train_variance.is_finite() && train_variance > 0.0) {
            return Err(TrainError::config(format!(
                "training pixel variance must be positive, got {train_variance}"
            )));
        }

        Ok(Self { train_variance })
    }

    pub fn train_variance(&self) -> f64 {
        self.train_variance
    }

    pub fn combine<B: Backend>(
        &self,
        target: Tensor<B, 4>,
        reconstruction: Tensor<B, 4>,
        quantizer_loss: Tensor<B, 1>,
    ) -> LossTerms<B> {
        let reconstruction = MseLoss::new()
            .forward(reconstruction, target, Reduction::Mean)
            .div_scalar(self.train_variance);
        let total = reconstruction.clone() + quantizer_loss.clone();

        LossTerms {
            total,
            reconstruction,
            quantization: quantizer_loss,
        }
    }
}
