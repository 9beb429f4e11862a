use burn::prelude::{Backend, ElementConversion, Tensor};
use burn::tensor::Element;

pub trait ScalarExt {
    fn scalar<E: Element>(&self) -> E;
}

impl<B: Backend> ScalarExt for Tensor<B, 1> {
    fn scalar<E: Element>(&self) -> E {
        assert_eq!(self.dims()[0], 1, "scalar() needs a single-element tensor");

        self.clone().into_scalar().elem()
    }
}

/// Pairwise squared euclidean distances between the rows of `a` (N x D) and
/// the rows of `b` (K x D), as an N x K tensor.
pub fn squared_distances<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let k = b.dims()[0];

    let a_sq = a.clone().powf_scalar(2.0).sum_dim(1);
    let b_sq = b.clone().powf_scalar(2.0).sum_dim(1).reshape([1, k]);
    let cross = a.matmul(b.transpose());

    a_sq + b_sq - cross.mul_scalar(2.0)
}

/// B x C x H x W -> (B*H*W) x C, one row per spatial position.
pub fn flatten_spatial<B: Backend>(grid: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = grid.dims();

    grid.swap_dims(1, 2)
        .swap_dims(2, 3)
        .reshape([batch * height * width, channels])
}

/// Inverse of [`flatten_spatial`].
pub fn unflatten_spatial<B: Backend>(rows: Tensor<B, 2>, [batch, height, width]: [usize; 3]) -> Tensor<B, 4> {
    let channels = rows.dims()[1];

    rows.reshape([batch, height, width, channels])
        .swap_dims(2, 3)
        .swap_dims(1, 2)
}

pub fn all_finite<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> bool {
    match tensor.into_data().convert::<f32>().to_vec::<f32>() {
        Ok(values) => values.iter().all(|value| value.is_finite()),
        Err(_) => false,
    }
}
