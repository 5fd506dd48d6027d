//! Gated normalization of relative coordinate vectors

use crate::error::{Error, Result};
use crate::nn::activation::Activation;
use crate::nn::layernorm::LayerNorm;
use crate::nn::module::{Module, extend_named};
use crate::nn::var_builder::VarBuilder;
use crate::ops::traits::GeometryOps;
use numr::autograd::{Var, var_div, var_mul};
use numr::dtype::DType;
use numr::ops::{ActivationOps, CompareOps, ReduceOps, ScalarOps, TensorOps, UnaryOps};
use numr::runtime::{Runtime, RuntimeClient};

/// Lower bound on the vector length used as a divisor.
pub const COORS_NORM_EPS: f64 = 1e-8;

/// Rescales relative vectors to unit length times a learned gate:
/// `out = gelu(layernorm(|x|)) * x / max(|x|, eps)`.
///
/// The direction of every vector is preserved, so the output stays
/// rotation-equivariant.
pub struct CoorsNorm<R: Runtime> {
    scale: LayerNorm<R>,
    eps: f64,
}

impl<R: Runtime<DType = DType>> CoorsNorm<R> {
    pub fn new(scale: LayerNorm<R>, eps: f64) -> Self {
        Self { scale, eps }
    }

    pub fn from_varbuilder(vb: &mut VarBuilder<R>, layer_norm_eps: f32) -> Result<Self> {
        let scale = LayerNorm::from_varbuilder(&mut vb.pp("scale"), 1, layer_norm_eps)?;
        Ok(Self::new(scale, COORS_NORM_EPS))
    }

    /// rel: `[..., 3]`, output: same shape
    pub fn forward<C>(&self, client: &C, rel: &Var<R>) -> Result<Var<R>>
    where
        C: RuntimeClient<R>
            + TensorOps<R>
            + ScalarOps<R>
            + ReduceOps<R>
            + ActivationOps<R>
            + UnaryOps<R>
            + CompareOps<R>
            + GeometryOps<R>,
        R::Client: TensorOps<R>
            + ScalarOps<R>
            + ReduceOps<R>
            + ActivationOps<R>
            + UnaryOps<R>
            + CompareOps<R>,
    {
        let norm = client.vector_norm(rel)?;
        let clamped = client.clamp_min(&norm, self.eps)?;
        let normed = var_div(rel, &clamped, client).map_err(Error::Numr)?;

        let phase = self.scale.forward(client, &norm)?;
        let phase = Activation::Gelu.forward_var(client, &phase).map_err(Error::Numr)?;
        var_mul(&phase, &normed, client).map_err(Error::Numr)
    }
}

impl<R: Runtime> Module<R> for CoorsNorm<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        extend_named(&mut out, "scale", &self.scale);
        out
    }
}
