//! Two-layer perceptron used by the attention block's learned functions

use crate::error::{Error, Result};
use crate::nn::activation::Activation;
use crate::nn::linear::Linear;
use crate::nn::module::{Module, extend_named};
use crate::nn::var_builder::VarBuilder;
use crate::nn::varmap::Init;
use numr::autograd::{Var, var_reshape};
use numr::dtype::DType;
use numr::ops::{ActivationOps, CompareOps, ScalarOps, TensorOps, UnaryOps};
use numr::runtime::{Runtime, RuntimeClient};

/// `fc2(act(fc1(x)))`, optionally followed by an output activation.
///
/// Accepts any number of leading dims; they are flattened into one row
/// axis around the matmuls and restored afterwards.
pub struct Mlp<R: Runtime> {
    fc1: Linear<R>,
    fc2: Linear<R>,
    hidden_act: Activation,
    out_act: Option<Activation>,
}

impl<R: Runtime<DType = DType>> Mlp<R> {
    pub fn new(
        fc1: Linear<R>,
        fc2: Linear<R>,
        hidden_act: Activation,
        out_act: Option<Activation>,
    ) -> Self {
        Self {
            fc1,
            fc2,
            hidden_act,
            out_act,
        }
    }

    /// Build `in → hidden (ReLU) → out` with weights under `fc1` / `fc2`.
    pub fn from_varbuilder(
        vb: &mut VarBuilder<R>,
        dims: [usize; 3],
        out_act: Option<Activation>,
        weight_init: Init,
    ) -> Result<Self> {
        let [input, hidden, output] = dims;
        let fc1 = Linear::from_varbuilder(&mut vb.pp("fc1"), input, hidden, true, weight_init)?;
        let fc2 = Linear::from_varbuilder(&mut vb.pp("fc2"), hidden, output, true, weight_init)?;
        Ok(Self::new(fc1, fc2, Activation::Relu, out_act))
    }

    /// input: `[..., in]`, output: `[..., out]`
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
        let in_features = self.fc1.in_features();
        let (&last, lead) = shape
            .split_last()
            .ok_or_else(|| Error::shape("input", format!("[..., {in_features}]"), &shape))?;
        if last != in_features {
            return Err(Error::shape("input", format!("[..., {in_features}]"), &shape));
        }
        let rows: usize = lead.iter().product();

        let x = var_reshape(input, &[rows, in_features]).map_err(Error::Numr)?;
        let h = self.fc1.forward(client, &x)?;
        let h = self
            .hidden_act
            .forward_var(client, &h)
            .map_err(Error::Numr)?;
        let mut out = self.fc2.forward(client, &h)?;
        if let Some(act) = self.out_act {
            out = act.forward_var(client, &out).map_err(Error::Numr)?;
        }

        let mut out_shape = lead.to_vec();
        out_shape.push(self.fc2.out_features());
        var_reshape(&out, &out_shape).map_err(Error::Numr)
    }

    pub fn out_features(&self) -> usize {
        self.fc2.out_features()
    }
}

impl<R: Runtime> Module<R> for Mlp<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        extend_named(&mut out, "fc1", &self.fc1);
        extend_named(&mut out, "fc2", &self.fc2);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cpu_setup;
    use numr::runtime::cpu::CpuRuntime;
    use numr::tensor::Tensor;

    fn identity_mlp(device: &numr::runtime::cpu::CpuDevice, out_act: Option<Activation>) -> Mlp<CpuRuntime> {
        let eye = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 0.0, 0.0, 1.0], &[2, 2], device);
        let fc1 = Linear::new(eye.clone(), None, false);
        let fc2 = Linear::new(eye, None, false);
        Mlp::new(fc1, fc2, Activation::Relu, out_act)
    }

    #[test]
    fn test_mlp_keeps_leading_dims() {
        let (client, device) = cpu_setup();
        let mlp = identity_mlp(&device, None);

        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[1.0f32; 24], &[2, 3, 2, 2], &device),
            false,
        );
        let out = mlp.forward(&client, &input).unwrap();
        assert_eq!(out.shape(), &[2, 3, 2, 2]);
    }

    #[test]
    fn test_mlp_applies_hidden_relu() {
        let (client, device) = cpu_setup();
        let mlp = identity_mlp(&device, None);

        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 2.0], &[1, 2], &device),
            false,
        );
        let out: Vec<f32> = mlp.forward(&client, &input).unwrap().tensor().to_vec();
        assert_eq!(out, vec![0.0, 2.0]);
    }

    #[test]
    fn test_mlp_output_activation() {
        let (client, device) = cpu_setup();
        let mlp = identity_mlp(&device, Some(Activation::Tanh));

        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[0.0f32, 100.0], &[1, 2], &device),
            false,
        );
        let out: Vec<f32> = mlp.forward(&client, &input).unwrap().tensor().to_vec();
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mlp_rejects_wrong_width() {
        let (client, device) = cpu_setup();
        let mlp = identity_mlp(&device, None);
        let input = Var::new(
            Tensor::<CpuRuntime>::from_slice(&[1.0f32; 3], &[1, 3], &device),
            false,
        );
        assert!(matches!(
            mlp.forward(&client, &input),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_mlp_named_parameters() {
        let (_client, device) = cpu_setup();
        let mlp = identity_mlp(&device, None);
        let names: Vec<String> = mlp.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["fc1.weight", "fc2.weight"]);
    }
}
