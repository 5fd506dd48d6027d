//! Dense linear layer

use crate::error::{Error, Result};
use crate::nn::module::Module;
use crate::nn::var_builder::VarBuilder;
use crate::nn::varmap::Init;
use numr::autograd::{Var, var_add, var_matmul, var_narrow, var_transpose};
use numr::dtype::DType;
use numr::ops::TensorOps;
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

/// Dense linear layer: output = input @ weight^T + bias
///
/// Parameters are `Var<R>`, so gradients reach them through any forward.
pub struct Linear<R: Runtime> {
    weight: Var<R>,
    bias: Option<Var<R>>,
}

impl<R: Runtime<DType = DType>> Linear<R> {
    /// Create from loaded tensors. `trainable` controls gradient tracking.
    pub fn new(weight: Tensor<R>, bias: Option<Tensor<R>>, trainable: bool) -> Self {
        Self {
            weight: Var::new(weight, trainable),
            bias: bias.map(|b| Var::new(b, trainable)),
        }
    }

    /// Load `weight` (and `bias` when requested) from the builder, sampling
    /// missing weights with `weight_init` and biases with the PyTorch default.
    pub fn from_varbuilder(
        vb: &mut VarBuilder<R>,
        in_features: usize,
        out_features: usize,
        bias: bool,
        weight_init: Init,
    ) -> Result<Self> {
        let weight = vb.take_or_init("weight", &[out_features, in_features], weight_init)?;
        let bias = if bias {
            let bound = 1.0 / (in_features.max(1) as f32).sqrt();
            Some(vb.take_or_init("bias", &[out_features], Init::Uniform(bound))?)
        } else {
            None
        };
        Ok(Self::new(weight, bias, true))
    }

    /// Forward: input @ weight^T + bias
    ///
    /// input: `[..., in_features]`, output: `[..., out_features]`
    pub fn forward<C>(&self, client: &C, input: &Var<R>) -> Result<Var<R>>
    where
        C: RuntimeClient<R> + TensorOps<R>,
        R::Client: TensorOps<R>,
    {
        let w_t = var_transpose(&self.weight).map_err(Error::Numr)?;
        let output = var_matmul(input, &w_t, client).map_err(Error::Numr)?;
        match &self.bias {
            Some(bias) => var_add(&output, bias, client).map_err(Error::Numr),
            None => Ok(output),
        }
    }

    /// Forward through output rows `[chunk * n, (chunk + 1) * n)` of a layer
    /// whose output splits into `chunks` equal parts of width `n`.
    ///
    /// Equivalent to chunking the full output along the last dim, but the
    /// row slice of the weight stays contiguous, so the result does too.
    pub fn forward_chunk<C>(
        &self,
        client: &C,
        input: &Var<R>,
        chunk: usize,
        chunks: usize,
    ) -> Result<Var<R>>
    where
        C: RuntimeClient<R> + TensorOps<R>,
        R::Client: TensorOps<R>,
    {
        let out_features = self.out_features();
        if chunks == 0 || chunk >= chunks || out_features % chunks != 0 {
            return Err(Error::InvalidArgument {
                arg: "chunk",
                reason: format!(
                    "cannot take chunk {chunk} of {chunks} from {out_features} output features"
                ),
            });
        }
        let width = out_features / chunks;
        let start = chunk * width;

        let w = var_narrow(&self.weight, 0, start, width).map_err(Error::Numr)?;
        let w_t = var_transpose(&w).map_err(Error::Numr)?;
        let output = var_matmul(input, &w_t, client).map_err(Error::Numr)?;
        match &self.bias {
            Some(bias) => {
                let b = var_narrow(bias, 0, start, width).map_err(Error::Numr)?;
                var_add(&output, &b, client).map_err(Error::Numr)
            }
            None => Ok(output),
        }
    }

    pub fn weight(&self) -> &Var<R> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Var<R>> {
        self.bias.as_ref()
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }
}

impl<R: Runtime> Module<R> for Linear<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut params = vec![("weight".to_string(), &self.weight)];
        if let Some(b) = &self.bias {
            params.push(("bias".to_string(), b));
        }
        params
    }
}
