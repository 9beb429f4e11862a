use std::sync::Arc;

use burn::data::dataset::InMemDataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::provider::DatasetSplits;
use crate::data::{ImageItem, ImageShape};

/// Seeded procedural images: a faint diagonal gradient with a few bright
/// rectangles. Cheap enough for tests and smoke runs.
#[derive(Debug, Clone)]
pub struct SyntheticImages {
    pub shape: ImageShape,
    pub train_len: usize,
    pub test_len: usize,
    pub seed: u64,
}

impl Default for SyntheticImages {
    fn default() -> Self {
        Self {
            shape: ImageShape::new(1, 16, 16),
            train_len: 512,
            test_len: 128,
            seed: 0,
        }
    }
}

impl SyntheticImages {
    pub fn splits(&self) -> DatasetSplits {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let train = (0..self.train_len).map(|_| self.sample(&mut rng)).collect();
        let test = (0..self.test_len).map(|_| self.sample(&mut rng)).collect();

        DatasetSplits {
            train: Arc::new(InMemDataset::new(train)),
            test: Arc::new(InMemDataset::new(test)),
            shape: self.shape,
            fixed_variance: None,
        }
    }

    fn sample(&self, rng: &mut StdRng) -> ImageItem {
        let ImageShape {
            channels,
            height,
            width,
        } = self.shape;
        let mut pixels = vec![0.0f32; self.shape.num_pixels()];

        let tilt: f32 = rng.gen_range(0.0..0.3);
        for channel in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    let along = (x + y) as f32 / (width + height) as f32;
                    pixels[(channel * height + y) * width + x] = tilt * along;
                }
            }
        }

        let num_rects = rng.gen_range(1..=3);
        for _ in 0..num_rects {
            let top = rng.gen_range(0..height);
            let left = rng.gen_range(0..width);
            let bottom = rng.gen_range(top..height) + 1;
            let right = rng.gen_range(left..width) + 1;

            for channel in 0..channels {
                let intensity: f32 = rng.gen_range(0.5..=1.0);
                for y in top..bottom {
                    for x in left..right {
                        pixels[(channel * height + y) * width + x] = intensity;
                    }
                }
            }
        }

        ImageItem {
            pixels,
            label: num_rects,
        }
    }
}
