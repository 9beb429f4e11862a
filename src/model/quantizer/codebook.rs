use burn::config::Config;
use burn::module::{Module, Param};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::Distribution;

use crate::ops::{all_finite, squared_distances};

#[derive(Config, Debug)]
pub struct CodebookConfig {
    pub num_embeddings: usize,
    pub embedding_dim: usize,
}

impl CodebookConfig {
    /// Uniform in `[-1/K, 1/K]` so that early assignments spread over the whole table.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Codebook<B> {
        let bound = 1.0 / self.num_embeddings as f64;
        let vectors = Tensor::random(
            [self.num_embeddings, self.embedding_dim],
            Distribution::Uniform(-bound, bound),
            device,
        );

        Codebook::from_tensor(vectors)
    }
}

#[derive(Module, Debug)]
pub struct Codebook<B: Backend> {
    pub embeddings: Param<Tensor<B, 2>>,
}

impl<B: Backend> Codebook<B> {
    pub fn from_tensor(vectors: Tensor<B, 2>) -> Self {
        Self {
            embeddings: Param::from_tensor(vectors),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.embeddings.val().dims()[0]
    }

    pub fn embedding_dim(&self) -> usize {
        self.embeddings.val().dims()[1]
    }

    /// Index of the closest codebook vector for every row of `vectors` (N x D).
    /// Equidistant entries resolve to the lowest index on every backend.
    pub fn nearest(&self, vectors: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        let count = vectors.dims()[0];
        let num_embeddings = self.num_embeddings();
        let device = vectors.device();

        let distances = squared_distances(vectors.detach(), self.embeddings.val().detach());
        let closest = distances.clone().min_dim(1);
        let not_closest = (distances.clone() - closest).greater_elem(0.0);

        // among the minimal entries pick the smallest index
        let indices = Tensor::<B, 1, Int>::arange(0..num_embeddings as i64, &device)
            .float()
            .reshape([1, num_embeddings]);
        let candidates = (distances.zeros_like() + indices).mask_fill(not_closest, num_embeddings as f32);

        candidates.argmin(1).reshape([count])
    }

    /// Gathers the codebook rows for `indices`; gradients reach the codebook only.
    pub fn lookup(&self, indices: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.embeddings.val().select(0, indices)
    }

    pub fn is_finite(&self) -> bool {
        all_finite(self.embeddings.val())
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn init_stays_within_bounds() {
        let device = Default::default();
        let codebook = CodebookConfig::new(16, 4).init::<TestBackend>(&device);

        assert_eq!(codebook.num_embeddings(), 16);
        assert_eq!(codebook.embedding_dim(), 4);

        let values = codebook.embeddings.val().into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|value| value.abs() <= 1.0 / 16.0));
        assert!(codebook.is_finite());
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let device = Default::default();
        let codebook = Codebook::<TestBackend>::from_tensor(Tensor::from_floats(
            [[0.0, 1.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            &device,
        ));
        let vectors = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.5, 0.5], [0.1, 0.9]], &device);

        let indices = codebook.nearest(vectors).into_data().to_vec::<i64>().unwrap();

        assert_eq!(indices, vec![1, 0, 0]);
    }

    #[test]
    fn non_finite_entries_are_reported() {
        let device = Default::default();
        let codebook = Codebook::<TestBackend>::from_tensor(Tensor::from_floats(
            [[0.0, f32::INFINITY], [1.0, 0.0]],
            &device,
        ));

        assert!(!codebook.is_finite());
    }
}
