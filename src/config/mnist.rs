use crate::config::TrainingConfig;
use crate::model::VqVaeConfig;

/// MNIST settings: a lower learning rate and a stronger commitment term than
/// the colour presets, which keeps the 7x7 latent grid from collapsing.
pub fn mnist_config() -> TrainingConfig {
    let model_config = VqVaeConfig::new(64, 32, 64, 512, 1.0);

    TrainingConfig::new(
        "mnist".into(),
        32,
        1e-4,
        100,
        50,
        true,
        true,
        8,
        model_config,
    )
}
