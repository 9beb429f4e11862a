use std::path::PathBuf;

use burn::backend::{Autodiff, NdArray, Wgpu};
use burn::tensor::backend::AutodiffBackend;
use color_eyre::eyre::{self, WrapErr};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vqvae::config::synthetic::synthetic_config;
use vqvae::config::TrainingConfig;
use vqvae::data::provider::{BuiltinDatasets, DatasetProvider};
use vqvae::device::ComputeTarget;
use vqvae::monitor::file::{ImageDump, JsonlMetrics};
use vqvae::train::{train, RunContext, StopReason};

fn run<B: AutodiffBackend>(config: &TrainingConfig, device: B::Device) -> eyre::Result<()> {
    let splits = BuiltinDatasets::default().get(&config.dataset)?;

    let run_dir = PathBuf::from("runs").join(&config.dataset);
    let mut context = RunContext::new(ImageDump::new(run_dir.join("images")), JsonlMetrics::new(&run_dir));

    let report = train::<B>(config, splits, &mut context, &device)?;

    match report.stop {
        StopReason::EarlyStopped { epoch } => info!(epoch, "stopped early"),
        StopReason::MaxEpochsReached => info!(epochs = report.history.len(), "reached max epochs"),
    }
    if let Some(last) = report.history.last() {
        info!(train_loss = last.train, eval_loss = last.eval, "final losses");
    }

    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrainingConfig::from_file(&path).wrap_err_with(|| format!("loading {path}"))?,
        None => synthetic_config(),
    };
    config.validate()?;

    match ComputeTarget::select(config.prefer_accelerator) {
        ComputeTarget::Accelerator(device) => run::<Autodiff<Wgpu>>(&config, device),
        ComputeTarget::Host(device) => run::<Autodiff<NdArray>>(&config, device),
    }
}
