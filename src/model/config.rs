//! EnTransformer configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by the equivariant attention block and the full stack.
///
/// Validated once at construction; a built model never re-reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnTransformerConfig {
    /// Feature width D
    pub feature_dim: usize,

    /// Number of (attention, feed-forward) layer pairs
    pub depth: usize,

    /// Attention heads
    #[serde(default = "default_heads")]
    pub heads: usize,

    /// Per-head width
    #[serde(default = "default_head_dim")]
    pub head_dim: usize,

    /// Width of the optional pairwise edge input (0 = no edges)
    #[serde(default)]
    pub edge_dim: usize,

    /// Message width M
    #[serde(default = "default_message_dim")]
    pub message_dim: usize,

    /// Fourier bands F for the distance encoding
    #[serde(default = "default_fourier_bands")]
    pub fourier_bands: usize,

    /// Rescale relative vectors with the gated CoorsNorm before the
    /// coordinate update
    #[serde(default)]
    pub normalize_relative_vectors: bool,

    /// Squash coordinate weights with tanh
    #[serde(default)]
    pub normalize_coordinate_weights: bool,

    /// Neighbors per node; 0 attends densely over all nodes
    #[serde(default)]
    pub neighbor_count: usize,

    /// Restrict interaction to adjacency-true pairs (adjacency then required)
    #[serde(default)]
    pub sparse_neighbors_only: bool,

    /// Pairs farther apart are invalid; `None` means unlimited
    #[serde(default)]
    pub max_neighbor_radius: Option<f64>,

    /// Std-dev of the normal init for attention Linear weights
    #[serde(default = "default_param_init_scale")]
    pub param_init_scale: f64,

    /// Token vocabulary for `forward_tokens`; `None` means features are
    /// passed in directly
    #[serde(default)]
    pub vocabulary_size: Option<usize>,

    /// LayerNorm epsilon
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,

    /// Feed-forward hidden multiplier
    #[serde(default = "default_ff_mult")]
    pub ff_mult: usize,

    /// Seed for parameter initialization
    #[serde(default)]
    pub seed: u64,
}

fn default_heads() -> usize {
    8
}

fn default_head_dim() -> usize {
    64
}

fn default_message_dim() -> usize {
    16
}

fn default_fourier_bands() -> usize {
    4
}

fn default_param_init_scale() -> f64 {
    1e-3
}

fn default_layer_norm_eps() -> f64 {
    1e-5
}

fn default_ff_mult() -> usize {
    4
}

/// How each node picks the nodes it attends over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborMode {
    /// Every node attends over all N nodes
    Dense,
    /// Every node attends over its k nearest valid nodes
    TopK(usize),
}

impl std::fmt::Display for NeighborMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NeighborMode::Dense => write!(f, "dense"),
            NeighborMode::TopK(k) => write!(f, "top-{k}"),
        }
    }
}

impl EnTransformerConfig {
    /// Config with every optional field at its default.
    pub fn new(feature_dim: usize, depth: usize) -> Self {
        Self {
            feature_dim,
            depth,
            heads: default_heads(),
            head_dim: default_head_dim(),
            edge_dim: 0,
            message_dim: default_message_dim(),
            fourier_bands: default_fourier_bands(),
            normalize_relative_vectors: false,
            normalize_coordinate_weights: false,
            neighbor_count: 0,
            sparse_neighbors_only: false,
            max_neighbor_radius: None,
            param_init_scale: default_param_init_scale(),
            vocabulary_size: None,
            layer_norm_eps: default_layer_norm_eps(),
            ff_mult: default_ff_mult(),
            seed: 0,
        }
    }

    /// Validate configuration constraints
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("feature_dim", self.feature_dim),
            ("depth", self.depth),
            ("heads", self.heads),
            ("head_dim", self.head_dim),
            ("message_dim", self.message_dim),
            ("ff_mult", self.ff_mult),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config {
                    reason: format!("{name} must be > 0"),
                });
            }
        }
        if self.vocabulary_size == Some(0) {
            return Err(Error::Config {
                reason: "vocabulary_size must be > 0 when set".into(),
            });
        }
        if !(self.param_init_scale.is_finite() && self.param_init_scale > 0.0) {
            return Err(Error::Config {
                reason: format!(
                    "param_init_scale must be finite and > 0, got {}",
                    self.param_init_scale
                ),
            });
        }
        if !(self.layer_norm_eps.is_finite() && self.layer_norm_eps > 0.0) {
            return Err(Error::Config {
                reason: format!("layer_norm_eps must be finite and > 0, got {}", self.layer_norm_eps),
            });
        }
        if let Some(radius) = self.max_neighbor_radius {
            // +inf is accepted as "unlimited"
            if radius.is_nan() || radius <= 0.0 {
                return Err(Error::Config {
                    reason: format!("max_neighbor_radius must be > 0, got {radius}"),
                });
            }
        }
        Ok(())
    }

    pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::ModelError {
            reason: format!("IO error: {e}"),
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| Error::ModelError {
            reason: format!("YAML parse error: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::ModelError {
            reason: format!("IO error: {e}"),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| Error::ModelError {
            reason: format!("JSON parse error: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn neighbor_mode(&self) -> NeighborMode {
        match self.neighbor_count {
            0 => NeighborMode::Dense,
            k => NeighborMode::TopK(k),
        }
    }

    /// Width of all heads side by side
    pub fn inner_dim(&self) -> usize {
        self.heads * self.head_dim
    }

    /// Width of the distance encoding, 2F + 1
    pub fn pos_dim(&self) -> usize {
        self.fourier_bands * 2 + 1
    }

    /// Finite radius, if any
    pub fn radius(&self) -> Option<f64> {
        self.max_neighbor_radius.filter(|r| r.is_finite())
    }
}
