pub mod checkpoint;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod loss;
pub mod model;
pub mod monitor;
pub mod ops;
pub mod train;

pub use error::{Result, TrainError};
