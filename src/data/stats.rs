use burn::data::dataset::Dataset;
use rayon::prelude::*;

use crate::data::ImageItem;
use crate::error::{Result, TrainError};

/// Running count, mean and sum of squared deviations; partial results from
/// different threads merge without a second pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn from_pixels(pixels: &[f32]) -> Self {
        pixels.iter().fold(Moments::default(), |mut moments, &pixel| {
            let pixel = pixel as f64;
            moments.count += 1;
            let delta = pixel - moments.mean;
            moments.mean += delta / moments.count as f64;
            moments.m2 += delta * (pixel - moments.mean);
            moments
        })
    }

    fn merge(self, other: Moments) -> Moments {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2 + other.m2 + delta * delta * (self.count as f64 * other.count as f64) / count as f64;

        Moments { count, mean, m2 }
    }
}

/// Unbiased variance over every pixel of every item in `dataset`.
pub fn pixel_variance(dataset: &dyn Dataset<ImageItem>) -> Result<f64> {
    let moments = (0..dataset.len())
        .into_par_iter()
        .map(|index| {
            dataset
                .get(index)
                .map(|item| Moments::from_pixels(&item.pixels))
                .ok_or(TrainError::MissingItem { index })
        })
        .try_reduce(Moments::default, |a, b| Ok(a.merge(b)))?;

    if moments.count < 2 {
        return Err(TrainError::config(
            "training split needs at least two pixels to estimate its variance",
        ));
    }

    Ok(moments.m2 / (moments.count - 1) as f64)
}
