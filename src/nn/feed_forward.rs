//! GEGLU feed-forward sublayer

use crate::error::{Error, Result};
use crate::nn::activation::Activation;
use crate::nn::linear::Linear;
use crate::nn::module::{Module, extend_named};
use crate::nn::var_builder::VarBuilder;
use crate::nn::varmap::Init;
use numr::autograd::{Var, var_mul, var_reshape};
use numr::dtype::DType;
use numr::ops::{ActivationOps, CompareOps, ScalarOps, TensorOps, UnaryOps};
use numr::runtime::{Runtime, RuntimeClient};

/// Position-wise feed-forward: `out(x * gelu(gate))` where `x` and `gate`
/// are the two halves of `proj(input)`.
///
/// proj: `[2 * mult * dim, dim]`, out: `[dim, mult * dim]`
pub struct FeedForward<R: Runtime> {
    proj: Linear<R>,
    out: Linear<R>,
}

impl<R: Runtime<DType = DType>> FeedForward<R> {
    pub fn new(proj: Linear<R>, out: Linear<R>) -> Self {
        Self { proj, out }
    }

    pub fn from_varbuilder(vb: &mut VarBuilder<R>, dim: usize, mult: usize) -> Result<Self> {
        let inner = dim * mult;
        let proj = Linear::from_varbuilder(&mut vb.pp("proj"), dim, inner * 2, true, Init::PyTorchLinear)?;
        let out = Linear::from_varbuilder(&mut vb.pp("out"), inner, dim, true, Init::PyTorchLinear)?;
        Ok(Self::new(proj, out))
    }

    /// input: `[B, N, dim]`, output: `[B, N, dim]`
    pub fn forward<C>(&self, client: &C, input: &Var<R>) -> Result<Var<R>>
    where
        C: RuntimeClient<R>
            + TensorOps<R>
            + ScalarOps<R>
            + ActivationOps<R>
            + UnaryOps<R>
            + CompareOps<R>,
        R::Client: TensorOps<R> + ScalarOps<R> + ActivationOps<R> + UnaryOps<R> + CompareOps<R>,
    {
        let shape = input.shape().to_vec();
        let dim = self.proj.in_features();
        if shape.last() != Some(&dim) {
            return Err(Error::shape("features", format!("[..., {dim}]"), &shape));
        }
        let rows: usize = shape[..shape.len() - 1].iter().product();
        let x2d = var_reshape(input, &[rows, dim]).map_err(Error::Numr)?;

        let x = self.proj.forward_chunk(client, &x2d, 0, 2)?;
        let gate = self.proj.forward_chunk(client, &x2d, 1, 2)?;
        let gate = Activation::Gelu.forward_var(client, &gate).map_err(Error::Numr)?;
        let hidden = var_mul(&x, &gate, client).map_err(Error::Numr)?;

        let out = self.out.forward(client, &hidden)?;
        var_reshape(&out, &shape).map_err(Error::Numr)
    }
}

impl<R: Runtime> Module<R> for FeedForward<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        extend_named(&mut out, "proj", &self.proj);
        extend_named(&mut out, "out", &self.out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::VarMap;
    use crate::test_utils::cpu_setup;
    use numr::runtime::cpu::CpuRuntime;
    use numr::tensor::Tensor;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_feed_forward_shape_and_params() {
        let (client, device) = cpu_setup();
        let mut map = VarMap::<CpuRuntime>::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut vb = VarBuilder::with_rng(&mut map, &device, &mut rng);
        let ff = FeedForward::from_varbuilder(&mut vb, 4, 4).unwrap();

        // proj: 4 -> 32 (+32 bias), out: 16 -> 4 (+4 bias)
        assert_eq!(ff.num_parameters(), 4 * 32 + 32 + 16 * 4 + 4);

        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[0.3f32; 24], &[2, 3, 4], &device),
            false,
        );
        let out = ff.forward(&client, &input).unwrap();
        assert_eq!(out.shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_feed_forward_geglu_values() {
        let (client, device) = cpu_setup();
        // dim 1, mult 1: x = 2 * in, gate = in; out = identity
        let proj = Linear::new(
            Tensor::<CpuRuntime>::from_slice(&[2.0f32, 1.0], &[2, 1], &device),
            None,
            false,
        );
        let out = Linear::new(
            Tensor::<CpuRuntime>::from_slice(&[1.0f32], &[1, 1], &device),
            None,
            false,
        );
        let ff = FeedForward::new(proj, out);

        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[1.0f32, -1.0], &[1, 2, 1], &device),
            false,
        );
        let got: Vec<f32> = ff.forward(&client, &input).unwrap().tensor().to_vec();
        // 2 * gelu(1) and -2 * gelu(-1)
        assert!((got[0] - 2.0 * 0.841_192).abs() < 1e-3, "{}", got[0]);
        assert!((got[1] - 2.0 * 0.158_808).abs() < 1e-3, "{}", got[1]);
    }
}
