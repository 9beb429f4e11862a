use crate::config::TrainingConfig;
use crate::model::VqVaeConfig;

/// Small model over the procedural dataset, for smoke runs without downloads.
pub fn synthetic_config() -> TrainingConfig {
    let model_config = VqVaeConfig::new(16, 8, 8, 32, 0.5).with_num_residual_layers(1);

    TrainingConfig::new(
        "synthetic".into(),
        16,
        2e-3,
        10,
        4,
        false,
        true,
        8,
        model_config,
    )
    .with_eval_batch_size(64)
    .with_snapshot_interval(10)
}
