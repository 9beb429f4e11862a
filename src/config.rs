use std::collections::BTreeMap;
use std::path::Path;

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::model::VqVaeConfig;

pub mod mnist;
pub mod synthetic;

/// Which evaluation batch is used for the reconstruction snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceBatch {
    First,
    Last,
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub dataset: String,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub early_stopping_epochs: usize,
    pub save_model: bool,
    pub save_reconstructions_first_epoch: bool,
    pub example_image_amount: usize,
    pub model: VqVaeConfig,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0)]
    pub num_workers: usize,
    #[config(default = 256)]
    pub eval_batch_size: usize,
    #[config(default = 20)]
    pub snapshot_interval: usize,
    #[config(default = "String::from(\"models/saved_models\")")]
    pub checkpoint_root: String,
    /// Overrides both the computed pixel variance and the dataset's literal.
    #[config(default = "None")]
    pub train_variance: Option<f64>,
    #[config(default = "ReferenceBatch::Last")]
    pub reference_batch: ReferenceBatch,
    #[config(default = true)]
    pub prefer_accelerator: bool,
    #[config(default = false)]
    pub print_debug: bool,
}

impl TrainingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let config = Self::load(path).map_err(|err| {
            TrainError::config(format!("cannot load `{}`: {err:?}", path.display()))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Rejects settings under which a run would be meaningless. Runs before any
    /// training state exists.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(TrainError::config("`dataset` must name a dataset"));
        }
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(TrainError::config("batch sizes must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "`learning_rate` must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_epochs == 0 {
            return Err(TrainError::config("`max_epochs` must be positive"));
        }
        // a window of k keeps k - 1 previous epochs, so k < 2 never has anything to compare against
        if self.early_stopping_epochs < 2 {
            return Err(TrainError::config(format!(
                "`early_stopping_epochs` must be at least 2, got {}",
                self.early_stopping_epochs
            )));
        }
        if self.early_stopping_epochs >= self.max_epochs {
            return Err(TrainError::config(format!(
                "`early_stopping_epochs` ({}) must be smaller than `max_epochs` ({})",
                self.early_stopping_epochs, self.max_epochs
            )));
        }
        if self.example_image_amount == 0 {
            return Err(TrainError::config("`example_image_amount` must be positive"));
        }
        if self.save_reconstructions_first_epoch && self.snapshot_interval == 0 {
            return Err(TrainError::config("`snapshot_interval` must be positive"));
        }
        if let Some(variance) = self.train_variance {
            if !(variance.is_finite() && variance > 0.0) {
                return Err(TrainError::config(format!(
                    "`train_variance` must be positive, got {variance}"
                )));
            }
        }

        self.model.validate()
    }

    /// Flat key/value view for the metrics sink, model keys merged into the top level.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();

        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return flat;
        };

        for (key, value) in fields {
            match value {
                serde_json::Value::Object(nested) => {
                    for (key, value) in nested {
                        flat.insert(key, render(value));
                    }
                }
                value => {
                    flat.insert(key, render(value));
                }
            }
        }

        flat
    }
}

fn render(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
