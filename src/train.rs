use burn::data::dataloader::batcher::Batcher;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::{Backend, Tensor};
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, info, Level};

use crate::checkpoint::CheckpointStore;
use crate::config::TrainingConfig;
use crate::data::provider::DatasetSplits;
use crate::data::stats::pixel_variance;
use crate::data::stream::BatchStream;
use crate::data::{ImageBatcher, ImageShape};
use crate::error::{Phase, Result, TrainError};
use crate::loss::ReconstructionObjective;
use crate::model::VqVae;
use crate::monitor::{ImageGrid, LogMonitor, MetricsSink, VisualizationSink};
use crate::ops::ScalarExt;
use crate::train::early_stopping::TrailingWindowStop;
use crate::train::history::{EpochLosses, LossHistory};

pub mod early_stopping;
pub mod history;

pub const TAG_FIRST_EPOCH: &str = "Epoch1 reconstructions";
pub const TAG_ORIGINAL: &str = "Original";
pub const TAG_RECONSTRUCTION: &str = "Reconstruction";
pub const TAG_TRAIN_LOSS: &str = "Loss/train";
pub const TAG_TEST_LOSS: &str = "Loss/test";
pub const TAG_TEST_PERPLEXITY: &str = "Perplexity/test";

/// Everything a run writes to besides the model itself.
pub struct RunContext {
    pub visualization: Box<dyn VisualizationSink>,
    pub metrics: Box<dyn MetricsSink>,
    /// Falls back to `checkpoint_root` from the configuration.
    pub checkpoints: Option<CheckpointStore>,
}

impl RunContext {
    pub fn new(visualization: impl VisualizationSink + 'static, metrics: impl MetricsSink + 'static) -> Self {
        Self {
            visualization: Box::new(visualization),
            metrics: Box::new(metrics),
            checkpoints: None,
        }
    }

    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(LogMonitor, LogMonitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EarlyStopped { epoch: usize },
    MaxEpochsReached,
}

pub struct TrainingReport<B: AutodiffBackend> {
    pub model: VqVae<B>,
    pub history: LossHistory,
    pub stop: StopReason,
    pub train_variance: f64,
}

/// Configuration override, then the dataset's own literal, then the unbiased
/// variance over every training pixel.
pub fn resolve_variance(config: &TrainingConfig, splits: &DatasetSplits) -> Result<f64> {
    match (config.train_variance, splits.fixed_variance) {
        (Some(variance), _) => Ok(variance),
        (None, Some(variance)) => Ok(variance),
        (None, None) => pixel_variance(splits.train.as_ref()),
    }
}

fn check_splits(config: &TrainingConfig, splits: &DatasetSplits) -> Result<()> {
    let ImageShape { height, width, .. } = splits.shape;
    // two stride-2 stages
    if height % 4 != 0 || width % 4 != 0 || height == 0 || width == 0 {
        return Err(TrainError::config(format!(
            "image size {height}x{width} must be a positive multiple of 4 on both sides"
        )));
    }
    if splits.train.len() < config.batch_size {
        return Err(TrainError::config(format!(
            "training split holds {} images, fewer than one batch of {}",
            splits.train.len(),
            config.batch_size
        )));
    }
    if splits.test.is_empty() {
        return Err(TrainError::config("evaluation split is empty"));
    }

    Ok(())
}

fn emit_images<B: Backend>(
    sink: &mut dyn VisualizationSink,
    tag: &str,
    images: Tensor<B, 4>,
    limit: usize,
    step: usize,
) {
    if let Some(grid) = ImageGrid::from_tensor(images, limit) {
        sink.emit_image(tag, &grid, step);
    }
}

fn non_finite(phase: Phase, epoch: usize, batch: usize, value: f64) -> TrainError {
    TrainError::NonFiniteLoss {
        phase,
        epoch,
        batch,
        value,
    }
}

/// Runs training epochs, each followed by an evaluation epoch, until the
/// trailing-window criterion fires or `max_epochs` is reached.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    splits: DatasetSplits,
    context: &mut RunContext,
    device: &B::Device,
) -> Result<TrainingReport<B>> {
    config.validate()?;
    check_splits(config, &splits)?;

    let objective = ReconstructionObjective::new(resolve_variance(config, &splits)?)?;
    info!(
        dataset = %config.dataset,
        train_variance = objective.train_variance(),
        ?device,
        "starting run"
    );

    B::seed(config.seed);
    context.metrics.emit_run_config(&config.flatten());

    let mut model: VqVae<B> = config.model.init(splits.shape.channels, device);
    if config.print_debug {
        info!(params = model.num_params(), "{model}");
    }
    let mut optimizer = AdamConfig::new().init();

    let mut train_stream = BatchStream::shuffled(splits.train.clone(), config.batch_size, config.seed)
        .with_workers(config.num_workers)?;
    let mut eval_stream =
        BatchStream::sequential(splits.test.clone(), config.eval_batch_size).with_workers(config.num_workers)?;

    let train_batcher = ImageBatcher::<B>::new(splits.shape, device.clone());
    let eval_batcher = ImageBatcher::<B::InnerBackend>::new(splits.shape, device.clone());

    let reference = eval_batcher
        .batch(eval_stream.designated(config.reference_batch)?)
        .images;

    let stopping = TrailingWindowStop::new(config.early_stopping_epochs);
    let mut history = LossHistory::default();
    let mut stop = StopReason::MaxEpochsReached;

    for epoch in 0..config.max_epochs {
        // training
        let mut loss_sum = 0.0;
        let mut num_batches = 0usize;
        for (batch, items) in train_stream.epoch().enumerate() {
            let images = train_batcher.batch(items?).images;

            let output = model.forward(images.clone());
            let terms = objective.combine(images, output.reconstruction, output.quantizer.loss);

            let loss = terms.total.scalar::<f64>();
            if !loss.is_finite() {
                return Err(non_finite(Phase::Training, epoch, batch, loss));
            }
            if tracing::enabled!(Level::DEBUG) {
                debug!(
                    epoch,
                    batch,
                    loss,
                    reconstruction = terms.reconstruction.scalar::<f64>(),
                    quantization = terms.quantization.scalar::<f64>(),
                    "training batch"
                );
            }

            let grads = GradientsParams::from_grads(terms.total.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            if !model.quantizer.codebook.is_finite() {
                return Err(TrainError::NonFiniteCodebook { epoch, batch });
            }

            if epoch == 0 && config.save_reconstructions_first_epoch && batch % config.snapshot_interval == 0 {
                let snapshot = model.valid().forward(reference.clone()).reconstruction;
                emit_images(
                    context.visualization.as_mut(),
                    TAG_FIRST_EPOCH,
                    snapshot,
                    config.example_image_amount,
                    batch,
                );
            }

            loss_sum += loss;
            num_batches += 1;
        }
        let train_loss = loss_sum / num_batches as f64;

        // evaluation
        let valid = model.valid();
        let mut loss_sum = 0.0;
        let mut perplexity_sum = 0.0;
        let mut num_batches = 0usize;
        for (batch, items) in eval_stream.epoch().enumerate() {
            let images = eval_batcher.batch(items?).images;

            let output = valid.forward(images.clone());
            let perplexity = output.quantizer.perplexity.scalar::<f64>();
            let terms = objective.combine(images, output.reconstruction, output.quantizer.loss);

            let loss = terms.total.scalar::<f64>();
            if !loss.is_finite() {
                return Err(non_finite(Phase::Evaluation, epoch, batch, loss));
            }

            loss_sum += loss;
            perplexity_sum += perplexity;
            num_batches += 1;
        }
        let eval_loss = loss_sum / num_batches as f64;
        let perplexity = perplexity_sum / num_batches as f64;

        if epoch == 0 {
            emit_images(
                context.visualization.as_mut(),
                TAG_ORIGINAL,
                reference.clone(),
                config.example_image_amount,
                epoch,
            );
        }
        let reconstruction = valid.forward(reference.clone()).reconstruction;
        emit_images(
            context.visualization.as_mut(),
            TAG_RECONSTRUCTION,
            reconstruction,
            config.example_image_amount,
            epoch,
        );

        context.metrics.emit_scalar(TAG_TRAIN_LOSS, train_loss, epoch);
        context.metrics.emit_scalar(TAG_TEST_LOSS, eval_loss, epoch);
        context.metrics.emit_scalar(TAG_TEST_PERPLEXITY, perplexity, epoch);
        info!(epoch, train_loss, eval_loss, perplexity, "epoch finished");

        history.push(EpochLosses {
            train: train_loss,
            eval: eval_loss,
            perplexity,
        });

        if config.save_model {
            let store = context
                .checkpoints
                .get_or_insert_with(|| CheckpointStore::new(&config.checkpoint_root));
            let path = store.save(&config.dataset, &model)?;
            info!(epoch, path = %path.display(), "checkpoint saved");
        }

        if stopping.should_stop(history.train_losses()) {
            info!(epoch, window = stopping.window(), "training loss rose above the trailing window, stopping");
            stop = StopReason::EarlyStopped { epoch };
            break;
        }
    }

    Ok(TrainingReport {
        model,
        history,
        stop,
        train_variance: objective.train_variance(),
    })
}
