use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use burn::prelude::{Backend, Tensor};
use serde::Serialize;
use tracing::{debug, info};

pub mod file;

/// Host copy of up to `limit` images, N x C x H x W.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageGrid {
    pub shape: [usize; 4],
    pub pixels: Vec<f32>,
}

impl ImageGrid {
    pub fn from_tensor<B: Backend>(images: Tensor<B, 4>, limit: usize) -> Option<Self> {
        let [batch, channels, height, width] = images.dims();
        let count = usize::min(batch, limit);
        if count == 0 {
            return None;
        }

        let pixels = images
            .slice([0..count])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .ok()?;

        Some(Self {
            shape: [count, channels, height, width],
            pixels,
        })
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }
}

/// Receives image snapshots. Failures stay inside the sink.
pub trait VisualizationSink {
    fn emit_image(&mut self, tag: &str, grid: &ImageGrid, step: usize);
}

/// Receives scalar series and the run's hyperparameters. Failures stay inside the sink.
pub trait MetricsSink {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: usize);

    fn emit_run_config(&mut self, config: &BTreeMap<String, String>);
}

/// Writes everything to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMonitor;

impl VisualizationSink for LogMonitor {
    fn emit_image(&mut self, tag: &str, grid: &ImageGrid, step: usize) {
        debug!(tag, step, shape = ?grid.shape, "image snapshot");
    }
}

impl MetricsSink for LogMonitor {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: usize) {
        debug!(tag, step, value, "scalar");
    }

    fn emit_run_config(&mut self, config: &BTreeMap<String, String>) {
        info!(?config, "run configuration");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f64,
    pub step: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEvent {
    pub tag: String,
    pub grid: ImageGrid,
    pub step: usize,
}

#[derive(Debug, Default)]
struct Recorded {
    scalars: Vec<ScalarEvent>,
    images: Vec<ImageEvent>,
    run_config: Option<BTreeMap<String, String>>,
}

/// Keeps every event in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryMonitor {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryMonitor {
    pub fn scalars(&self, tag: &str) -> Vec<ScalarEvent> {
        self.with(|recorded| {
            recorded
                .scalars
                .iter()
                .filter(|event| event.tag == tag)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn images(&self, tag: &str) -> Vec<ImageEvent> {
        self.with(|recorded| {
            recorded
                .images
                .iter()
                .filter(|event| event.tag == tag)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn run_config(&self) -> Option<BTreeMap<String, String>> {
        self.with(|recorded| recorded.run_config.clone()).flatten()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> Option<T> {
        self.recorded.lock().ok().map(|mut recorded| f(&mut recorded))
    }
}

impl VisualizationSink for MemoryMonitor {
    fn emit_image(&mut self, tag: &str, grid: &ImageGrid, step: usize) {
        self.with(|recorded| {
            recorded.images.push(ImageEvent {
                tag: tag.to_string(),
                grid: grid.clone(),
                step,
            })
        });
    }
}

impl MetricsSink for MemoryMonitor {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: usize) {
        self.with(|recorded| {
            recorded.scalars.push(ScalarEvent {
                tag: tag.to_string(),
                value,
                step,
            })
        });
    }

    fn emit_run_config(&mut self, config: &BTreeMap<String, String>) {
        self.with(|recorded| recorded.run_config = Some(config.clone()));
    }
}
