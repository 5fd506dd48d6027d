//! VarMap: named collection of model weights.

use crate::error::{Error, Result};
use numr::runtime::Runtime;
use numr::tensor::Tensor;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Normal, Uniform};
use std::collections::HashMap;

/// Initialization strategy for new tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// All zeros
    Zeros,
    /// All ones
    Ones,
    /// Constant value
    Const(f32),
    /// Uniform random in `[-bound, bound]`
    Uniform(f32),
    /// Normal with zero mean and the given standard deviation
    Normal(f32),
    /// Kaiming uniform (PyTorch Linear default): U(-1/sqrt(in), 1/sqrt(in)),
    /// with `in` taken from the last dimension of the shape
    PyTorchLinear,
    /// PyTorch Embedding default: N(0, 1)
    PyTorchEmbedding,
}

impl Init {
    /// Sample `shape.iter().product()` values in row-major order.
    pub fn sample(&self, shape: &[usize], rng: &mut StdRng) -> Result<Vec<f32>> {
        let numel: usize = shape.iter().product();
        let data = match *self {
            Init::Zeros => vec![0.0; numel],
            Init::Ones => vec![1.0; numel],
            Init::Const(v) => vec![v; numel],
            Init::Uniform(bound) => sample_uniform(bound, numel, rng),
            Init::Normal(std) => sample_normal(std, numel, rng)?,
            Init::PyTorchLinear => {
                let fan_in = shape.last().copied().unwrap_or(1).max(1);
                sample_uniform(1.0 / (fan_in as f32).sqrt(), numel, rng)
            }
            Init::PyTorchEmbedding => sample_normal(1.0, numel, rng)?,
        };
        Ok(data)
    }
}

fn sample_uniform(bound: f32, numel: usize, rng: &mut StdRng) -> Vec<f32> {
    if bound == 0.0 {
        return vec![0.0; numel];
    }
    let dist = Uniform::new_inclusive(-bound.abs(), bound.abs());
    (0..numel).map(|_| rng.sample(dist)).collect()
}

fn sample_normal(std: f32, numel: usize, rng: &mut StdRng) -> Result<Vec<f32>> {
    let dist = Normal::new(0.0f32, std).map_err(|e| Error::ModelError {
        reason: format!("invalid normal init std {std}: {e}"),
    })?;
    Ok((0..numel).map(|_| rng.sample(dist)).collect())
}

/// Named collection of model weights.
pub struct VarMap<R: Runtime> {
    data: HashMap<String, Tensor<R>>,
}

impl<R: Runtime> VarMap<R> {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Build from a name→tensor map, e.g. a model's state dict.
    pub fn from_tensors(tensors: HashMap<String, Tensor<R>>) -> Self {
        Self { data: tensors }
    }

    /// Insert a tensor.
    pub fn insert(&mut self, name: String, tensor: Tensor<R>) {
        self.data.insert(name, tensor);
    }

    /// Get a tensor by name.
    pub fn get_tensor(&self, name: &str) -> Result<&Tensor<R>> {
        self.data.get(name).ok_or_else(|| Error::ModelError {
            reason: format!("weight not found: {name}"),
        })
    }

    /// Remove and return a tensor by name (zero-copy extraction).
    pub fn take_tensor(&mut self, name: &str) -> Result<Tensor<R>> {
        self.data.remove(name).ok_or_else(|| Error::ModelError {
            reason: format!("weight not found: {name}"),
        })
    }

    /// All weight names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }

    /// Number of weights.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over all weights.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor<R>)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check if a name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }
}

impl<R: Runtime> Default for VarMap<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numr::runtime::cpu::{CpuDevice, CpuRuntime};
    use rand::SeedableRng;

    fn device() -> CpuDevice {
        CpuDevice::new()
    }

    #[test]
    fn test_varmap_insert_and_get() {
        let d = device();
        let mut map = VarMap::<CpuRuntime>::new();
        map.insert("w1".into(), Tensor::from_slice(&[1.0f32, 2.0], &[2], &d));
        assert_eq!(map.len(), 1);
        assert!(map.contains("w1"));
        assert!(!map.contains("w2"));

        let t = map.get_tensor("w1").unwrap();
        assert_eq!(t.shape(), &[2]);
    }

    #[test]
    fn test_varmap_take_tensor() {
        let d = device();
        let mut map = VarMap::<CpuRuntime>::new();
        map.insert("w".into(), Tensor::from_slice(&[1.0f32, 2.0], &[2], &d));

        let t = map.take_tensor("w").unwrap();
        assert_eq!(t.shape(), &[2]);
        assert!(map.is_empty());
        assert!(map.take_tensor("w").is_err());
    }

    #[test]
    fn test_varmap_names_and_iter() {
        let d = device();
        let mut map = VarMap::<CpuRuntime>::new();
        map.insert("x".into(), Tensor::from_slice(&[1.0f32], &[1], &d));
        map.insert("y".into(), Tensor::from_slice(&[2.0f32], &[1], &d));

        let mut names: Vec<&str> = map.names().collect();
        names.sort();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn test_init_constant_variants() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(Init::Zeros.sample(&[3], &mut rng).unwrap(), vec![0.0; 3]);
        assert_eq!(Init::Ones.sample(&[2, 2], &mut rng).unwrap(), vec![1.0; 4]);
        assert_eq!(
            Init::Const(0.5).sample(&[2], &mut rng).unwrap(),
            vec![0.5, 0.5]
        );
    }

    #[test]
    fn test_init_pytorch_linear_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        // fan_in = 16 → bound 0.25
        let data = Init::PyTorchLinear.sample(&[8, 16], &mut rng).unwrap();
        assert_eq!(data.len(), 128);
        assert!(data.iter().all(|v| v.abs() <= 0.25));
        assert!(data.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_init_normal_is_seeded() {
        let a = Init::Normal(1e-3)
            .sample(&[64], &mut StdRng::seed_from_u64(3))
            .unwrap();
        let b = Init::Normal(1e-3)
            .sample(&[64], &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a, b);
        let mean = a.iter().sum::<f32>() / a.len() as f32;
        assert!(mean.abs() < 1e-3, "mean={mean}");
    }

    #[test]
    fn test_init_normal_rejects_bad_std() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Init::Normal(f32::NAN).sample(&[2], &mut rng).is_err());
    }
}
