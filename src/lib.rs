//! # geomr
//!
//! **E(n)-equivariant graph attention built on numr.**
//!
//! geomr implements the EnTransformer: attention over point sets that
//! jointly updates node features and node coordinates. Rotating,
//! reflecting or translating the input coordinates transforms the output
//! coordinates the same way and leaves the output features unchanged.
//! Node order is irrelevant up to the matching permutation of outputs.
//!
//! ## Relationship to numr
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    geomr ◄── YOU ARE HERE                │
//! │  (equivariant attention, neighbor selection, geometry)  │
//! └──────────────────────────┬──────────────────────────────┘
//! │                      numr                                │
//! │     (tensors, ops, runtime, autograd, linalg, FFT)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design
//!
//! - **Extension traits**: geometry and neighbor ops (`GeometryOps`,
//!   `NeighborOps`) implemented on numr's clients
//! - **impl_generic**: composite ops composed from numr primitives
//! - **nn**: `Var`-backed layers with named parameters, loadable from a `VarMap`
//! - **model**: the attention block, the residual layer stack and its config
//!
//! ## Example
//!
//! ```no_run
//! use geomr::model::{EnTransformer, EnTransformerConfig};
//! use numr::autograd::Var;
//! use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
//! use numr::tensor::Tensor;
//!
//! let device = CpuDevice::new();
//! let client = CpuClient::new(device.clone());
//!
//! let mut config = EnTransformerConfig::new(16, 2);
//! config.neighbor_count = 3;
//! let model = EnTransformer::<CpuRuntime>::from_config(&config, &device)?;
//!
//! let feats = Var::new(Tensor::<CpuRuntime>::zeros(&[1, 5, 16], numr::dtype::DType::F32, &device), false);
//! let coors = Var::new(Tensor::<CpuRuntime>::zeros(&[1, 5, 3], numr::dtype::DType::F32, &device), false);
//! let (feats, coors) = model.forward(&client, &feats, &coors, None, None, None)?;
//! # Ok::<(), geomr::error::Error>(())
//! ```

pub mod error;
pub mod model;
pub mod nn;
pub mod ops;

pub use error::{Error, Result};
pub use model::{EnTransformer, EnTransformerConfig, EquivariantAttention};
pub use ops::{GeometryOps, NeighborOps};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::error::{Error as NumrError, Result as NumrResult};
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;

#[cfg(test)]
pub(crate) mod test_utils {
    use numr::runtime::cpu::{CpuClient, CpuDevice};

    /// Create a CPU client and device for use in unit tests.
    pub(crate) fn cpu_setup() -> (CpuClient, CpuDevice) {
        let device = CpuDevice::new();
        let client = CpuClient::new(device.clone());
        (client, device)
    }
}
