//! Activation function enum for configurable layers

use numr::autograd::{Var, var_add, var_mul, var_mul_scalar, var_relu, var_sigmoid, var_tanh};
use numr::ops::{ActivationOps, CompareOps, ScalarOps, TensorOps, UnaryOps};
use numr::dtype::DType;
use numr::runtime::{Runtime, RuntimeClient};

/// `2 * sqrt(2 / pi)`, the logistic form of the tanh GELU approximation.
const GELU_SIGMOID_SCALE: f64 = 1.595_769_121_605_730_7;
const GELU_CUBIC: f64 = 0.044_715;

/// Activation function selector.
///
/// Used by [`Mlp`](crate::nn::Mlp) for its hidden and (optional) output
/// nonlinearity, and as the GELU gate of the feed-forward and
/// coordinate-norm layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Gelu,
    Tanh,
}

impl Activation {
    /// Apply this activation to a `Var`, keeping the autograd graph.
    pub fn forward_var<R, C>(&self, client: &C, x: &Var<R>) -> numr::error::Result<Var<R>>
    where
        R: Runtime<DType = DType>,
        C: RuntimeClient<R>
            + TensorOps<R>
            + ScalarOps<R>
            + ActivationOps<R>
            + UnaryOps<R>
            + CompareOps<R>,
        R::Client: TensorOps<R> + ScalarOps<R> + ActivationOps<R> + UnaryOps<R> + CompareOps<R>,
    {
        match self {
            Activation::Relu => var_relu(x, client),
            Activation::Gelu => var_gelu_tanh(x, client),
            Activation::Tanh => var_tanh(x, client),
        }
    }
}

/// `x * sigmoid(2 * sqrt(2/pi) * (x + 0.044715 x^3))`, equal to
/// `0.5 x (1 + tanh(sqrt(2/pi) (x + 0.044715 x^3)))`.
fn var_gelu_tanh<R, C>(x: &Var<R>, client: &C) -> numr::error::Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + TensorOps<R> + ScalarOps<R> + ActivationOps<R>,
    R::Client: TensorOps<R> + ScalarOps<R> + ActivationOps<R>,
{
    let x2 = var_mul(x, x, client)?;
    let x3 = var_mul(&x2, x, client)?;
    let cubic = var_mul_scalar(&x3, GELU_CUBIC, client)?;
    let inner = var_add(x, &cubic, client)?;
    let inner = var_mul_scalar(&inner, GELU_SIGMOID_SCALE, client)?;
    let gate = var_sigmoid(&inner, client)?;
    var_mul(x, &gate, client)
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Gelu => write!(f, "gelu"),
            Activation::Tanh => write!(f, "tanh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cpu_setup;
    use numr::autograd::{backward, var_sum};
    use numr::runtime::cpu::CpuRuntime;
    use numr::tensor::Tensor;

    fn apply(act: Activation, data: &[f32]) -> Vec<f32> {
        let (client, device) = cpu_setup();
        let x = Var::new(
            Tensor::<CpuRuntime>::from_slice(data, &[data.len()], &device),
            false,
        );
        act.forward_var(&client, &x).unwrap().tensor().to_vec()
    }

    #[test]
    fn test_relu_values() {
        assert_eq!(apply(Activation::Relu, &[-2.0, 0.0, 3.0]), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_gelu_values() {
        let out = apply(Activation::Gelu, &[-1.0, 0.0, 1.0, 3.0]);
        let expected = [-0.158_808f32, 0.0, 0.841_192, 2.996_363];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }
    }

    #[test]
    fn test_tanh_values() {
        let out = apply(Activation::Tanh, &[-1.0, 0.0, 0.5]);
        for (got, x) in out.iter().zip([-1.0f32, 0.0, 0.5]) {
            assert!((got - x.tanh()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gelu_gradient() {
        let (client, device) = cpu_setup();
        let x = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[0.0f32, 1.0], &[2], &device),
            true,
        );
        let y = Activation::Gelu.forward_var(&client, &x).unwrap();
        let loss = var_sum(&y, &[0], false, &client).unwrap();
        let grads = backward(&loss, &client).unwrap();
        let g: Vec<f32> = grads.get(x.tensor().id()).unwrap().to_vec();

        // d/dx gelu(x): 0.5 at zero, about 1.083 at one
        assert!((g[0] - 0.5).abs() < 1e-4, "{}", g[0]);
        assert!((g[1] - 1.0830).abs() < 1e-3, "{}", g[1]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let act = Activation::Tanh;
        let json = serde_json::to_string(&act).unwrap();
        assert_eq!(json, "\"tanh\"");
        let back: Activation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Activation::Tanh);
        assert!(serde_json::from_str::<Activation>("\"silu\"").is_err());
    }
}
