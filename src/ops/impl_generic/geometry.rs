//! Generic relative-geometry implementation
//!
//! Same algorithm on every backend, composed from numr autograd primitives
//! so gradients reach the input coordinates.

use crate::error::{Error, Result};
use numr::autograd::{
    Var, var_add, var_add_scalar, var_cat, var_cos, var_mul, var_neg, var_relu, var_reshape,
    var_sin, var_sqrt, var_sub, var_sum,
};
use numr::dtype::DType;
use numr::ops::{ActivationOps, CompareOps, ReduceOps, ScalarOps, ShapeOps, TensorOps, UnaryOps};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

/// Added under the square root so the gradient stays finite at d = 0.
const NORM_EPS_SQ: f64 = 1e-24;

/// Make a Var contiguous (copies data if non-contiguous).
/// Preserves the requires_grad flag but not the grad_fn (treated as a leaf).
pub(crate) fn var_contiguous<R: Runtime>(v: &Var<R>) -> Var<R> {
    if v.tensor().is_contiguous() {
        v.clone()
    } else {
        Var::new(v.tensor().contiguous(), v.requires_grad())
    }
}

/// Euclidean norm over the last axis, keeping it as a size-1 axis.
pub fn vector_norm_impl<R, C>(client: &C, x: &Var<R>) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + TensorOps<R> + ScalarOps<R> + ReduceOps<R> + UnaryOps<R>,
    R::Client: TensorOps<R> + ScalarOps<R> + ReduceOps<R> + UnaryOps<R>,
{
    let ndim = x.shape().len();
    if ndim == 0 {
        return Err(Error::InvalidArgument {
            arg: "x",
            reason: "vector norm needs at least one axis".into(),
        });
    }
    let sq = var_mul(x, x, client).map_err(Error::Numr)?;
    let sum = var_sum(&sq, &[ndim - 1], true, client).map_err(Error::Numr)?;
    let sum = var_add_scalar(&sum, NORM_EPS_SQ, client).map_err(Error::Numr)?;
    var_sqrt(&sum, client).map_err(Error::Numr)
}

/// Pairwise relative vectors `[B, N, N, 3]` and distances `[B, N, N]`.
pub fn relative_geometry_impl<R, C>(client: &C, coords: &Var<R>) -> Result<(Var<R>, Var<R>)>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + TensorOps<R> + ScalarOps<R> + ReduceOps<R> + UnaryOps<R>,
    R::Client: TensorOps<R> + ScalarOps<R> + ReduceOps<R> + UnaryOps<R>,
{
    let shape = coords.shape().to_vec();
    if shape.len() != 3 || shape[2] != 3 {
        return Err(Error::shape("coords", "[B, N, 3]", &shape));
    }
    let (b, n) = (shape[0], shape[1]);

    let coords = var_contiguous(coords);
    let ci = var_reshape(&coords, &[b, n, 1, 3]).map_err(Error::Numr)?;
    let cj = var_reshape(&coords, &[b, 1, n, 3]).map_err(Error::Numr)?;
    let rel = var_sub(&ci, &cj, client).map_err(Error::Numr)?;

    let dist = vector_norm_impl(client, &rel)?;
    let dist = var_reshape(&dist, &[b, n, n]).map_err(Error::Numr)?;
    Ok((rel, dist))
}

/// Sinusoidal distance encoding: `[...]` → `[..., 2F + 1]`.
pub fn fourier_encode_dist_impl<R, C>(client: &C, dist: &Var<R>, num_bands: usize) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + TensorOps<R> + UnaryOps<R> + ShapeOps<R>,
    R::Client: TensorOps<R> + UnaryOps<R> + ShapeOps<R>,
{
    let dist = var_contiguous(dist);
    let mut shape = dist.shape().to_vec();
    shape.push(1);
    let x = var_reshape(&dist, &shape).map_err(Error::Numr)?;
    if num_bands == 0 {
        return Ok(x);
    }

    // d / 2^i is exact as a multiply by 2^-i
    let inv_scales: Vec<f32> = (0..num_bands).map(|i| 0.5f32.powi(i as i32)).collect();
    let inv_scales = Var::new(
        Tensor::<R>::from_slice(&inv_scales, &[num_bands], dist.tensor().device()),
        false,
    );
    let scaled = var_mul(&x, &inv_scales, client).map_err(Error::Numr)?;

    let sin = var_sin(&scaled, client).map_err(Error::Numr)?;
    let cos = var_cos(&scaled, client).map_err(Error::Numr)?;
    var_cat(&[&sin, &cos, &x], -1, client).map_err(Error::Numr)
}

/// `max(x, min)` as `x + relu(min - x)`, differentiable everywhere but the kink.
pub fn clamp_min_impl<R, C>(client: &C, x: &Var<R>, min: f64) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + TensorOps<R> + ScalarOps<R> + ActivationOps<R> + CompareOps<R>,
    R::Client: TensorOps<R> + ScalarOps<R> + ActivationOps<R> + CompareOps<R>,
{
    let neg = var_neg(x, client).map_err(Error::Numr)?;
    let gap = var_add_scalar(&neg, min, client).map_err(Error::Numr)?;
    let lift = var_relu(&gap, client).map_err(Error::Numr)?;
    var_add(x, &lift, client).map_err(Error::Numr)
}
