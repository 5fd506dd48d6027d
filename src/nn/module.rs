//! Neural network module traits for parameter access and serialization.

use numr::autograd::Var;
use numr::runtime::Runtime;
use numr::tensor::Tensor;
use std::collections::HashMap;

/// Core trait for neural network modules.
///
/// Provides access to trainable parameters for optimizers and
/// named parameters for checkpoint serialization.
///
/// Forward passes stay as inherent methods on each layer because
/// signatures differ (different client bounds, input types).
pub trait Module<R: Runtime> {
    /// All trainable parameters (for optimizer).
    fn parameters(&self) -> Vec<&Var<R>> {
        self.named_parameters().into_iter().map(|(_, v)| v).collect()
    }

    /// Named parameters (for checkpointing). Names use dot notation
    /// for nested modules: `"layers.0.attn.to_q.weight"`.
    fn named_parameters(&self) -> Vec<(String, &Var<R>)>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|v| v.tensor().numel()).sum()
    }
}

/// State dict export for model checkpointing.
///
/// The exported map uses the same names `from_varbuilder` constructors
/// read, so `VarMap::from_tensors(model.state_dict())` reloads the model.
pub trait StateDict<R: Runtime>: Module<R> {
    /// Export model state as name→tensor map.
    fn state_dict(&self) -> HashMap<String, Tensor<R>> {
        self.named_parameters()
            .into_iter()
            .map(|(name, var)| (name, var.tensor().clone()))
            .collect()
    }
}

impl<R: Runtime, M: Module<R>> StateDict<R> for M {}

/// Append a child module's named parameters under `prefix`.
pub(crate) fn extend_named<'a, R: Runtime>(
    out: &mut Vec<(String, &'a Var<R>)>,
    prefix: &str,
    child: &'a impl Module<R>,
) {
    out.extend(
        child
            .named_parameters()
            .into_iter()
            .map(|(name, var)| (format!("{prefix}.{name}"), var)),
    );
}
