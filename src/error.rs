use std::any::Any;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrainError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Evaluation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Training => f.write_str("training"),
            Phase::Evaluation => f.write_str("evaluation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("dataset `{name}` is not available")]
    DatasetUnavailable { name: String },

    #[error("dataset item {index} could not be read")]
    MissingItem { index: usize },

    #[error("batch producer stopped before the epoch was complete: {reason}")]
    BatchProducer { reason: String },

    #[error("compute device unavailable: {0}")]
    ComputeResourceUnavailable(String),

    #[error("non-finite {phase} loss {value} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss {
        phase: Phase,
        epoch: usize,
        batch: usize,
        value: f64,
    },

    #[error("codebook holds non-finite values after the update at epoch {epoch}, batch {batch}")]
    NonFiniteCodebook { epoch: usize, batch: usize },

    #[error("failed to write checkpoint `{}`: {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    #[error("failed to read checkpoint `{}`: {reason}", path.display())]
    CheckpointRead { path: PathBuf, reason: String },
}

impl TrainError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        TrainError::Configuration(message.into())
    }
}

/// Text of a caught panic, if it carried one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}
