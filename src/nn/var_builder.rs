//! VarBuilder: scoped access to weights in a VarMap.
//!
//! Provides prefix-based navigation for hierarchical weight names
//! (e.g., "layers.0.attn.to_q.weight"). A builder created with
//! [`VarBuilder::with_rng`] also samples any weight the map does not hold,
//! so fresh construction and checkpoint loading share one code path.

use crate::error::{Error, Result};
use crate::nn::varmap::{Init, VarMap};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;
use rand::rngs::StdRng;

/// Scoped access to weights in a `VarMap`.
pub struct VarBuilder<'a, R: Runtime> {
    varmap: &'a mut VarMap<R>,
    rng: Option<&'a mut StdRng>,
    prefix: String,
    device: &'a R::Device,
}

impl<'a, R: Runtime<DType = DType>> VarBuilder<'a, R> {
    /// Create a root VarBuilder that only loads existing weights.
    pub fn new(varmap: &'a mut VarMap<R>, device: &'a R::Device) -> Self {
        Self {
            varmap,
            rng: None,
            prefix: String::new(),
            device,
        }
    }

    /// Create a root VarBuilder that initializes missing weights from `rng`.
    pub fn with_rng(varmap: &'a mut VarMap<R>, device: &'a R::Device, rng: &'a mut StdRng) -> Self {
        Self {
            varmap,
            rng: Some(rng),
            prefix: String::new(),
            device,
        }
    }

    /// Create a sub-builder with an additional prefix component.
    pub fn push_prefix(&mut self, segment: &str) -> VarBuilder<'_, R> {
        let prefix = if self.prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.prefix, segment)
        };
        VarBuilder {
            varmap: self.varmap,
            rng: self.rng.as_deref_mut(),
            prefix,
            device: self.device,
        }
    }

    /// Alias for `push_prefix`.
    pub fn pp(&mut self, segment: &str) -> VarBuilder<'_, R> {
        self.push_prefix(segment)
    }

    /// Full name for a weight relative to this builder's prefix.
    fn full_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    /// Get a tensor by name (relative to prefix).
    pub fn get_tensor(&self, name: &str) -> Result<&Tensor<R>> {
        let full = self.full_name(name);
        self.varmap.get_tensor(&full)
    }

    /// Take a tensor by name, removing it from the map (zero-copy).
    pub fn take_tensor(&mut self, name: &str) -> Result<Tensor<R>> {
        let full = self.full_name(name);
        self.varmap.take_tensor(&full)
    }

    /// Get a tensor and validate its shape.
    pub fn get_with_shape(&self, name: &str, expected_shape: &[usize]) -> Result<&Tensor<R>> {
        let full = self.full_name(name);
        let t = self.varmap.get_tensor(&full)?;
        check_shape(&full, t, expected_shape)?;
        Ok(t)
    }

    /// Take a tensor of the expected shape, or sample a new one with `init`.
    ///
    /// Sampling only happens when the builder carries an RNG; a load-only
    /// builder reports the missing weight instead.
    pub fn take_or_init(&mut self, name: &str, shape: &[usize], init: Init) -> Result<Tensor<R>> {
        let full = self.full_name(name);
        if self.varmap.contains(&full) {
            let t = self.varmap.take_tensor(&full)?;
            check_shape(&full, &t, shape)?;
            return Ok(t);
        }
        match self.rng.as_deref_mut() {
            Some(rng) => {
                let data = init.sample(shape, rng)?;
                Ok(Tensor::<R>::from_slice(&data, shape, self.device))
            }
            None => Err(Error::ModelError {
                reason: format!("weight not found: {full}"),
            }),
        }
    }

    /// Device for this builder.
    pub fn device(&self) -> &R::Device {
        self.device
    }

    /// Check if a name exists (relative to prefix).
    pub fn contains(&self, name: &str) -> bool {
        let full = self.full_name(name);
        self.varmap.contains(&full)
    }

    /// Current prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn check_shape<R: Runtime>(full: &str, t: &Tensor<R>, expected_shape: &[usize]) -> Result<()> {
    if t.shape() != expected_shape {
        return Err(Error::ModelError {
            reason: format!(
                "shape mismatch for '{}': expected {:?}, got {:?}",
                full,
                expected_shape,
                t.shape()
            ),
        });
    }
    Ok(())
}
