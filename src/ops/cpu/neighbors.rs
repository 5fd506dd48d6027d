//! CPU implementation of NeighborOps, delegating to impl_generic
//!
//! Selection runs on host memory directly, so the generic rayon kernel is
//! already the CPU kernel.

use crate::error::Result;
use crate::ops::impl_generic::neighbors::{
    gather_nodes_impl, gather_pairs_impl, pair_validity_impl, select_neighbors_impl,
};
use crate::ops::traits::NeighborOps;
use numr::autograd::Var;
use numr::runtime::cpu::{CpuClient, CpuRuntime};
use numr::tensor::Tensor;

impl NeighborOps<CpuRuntime> for CpuClient {
    fn pair_validity(
        &self,
        rel_dist: &Tensor<CpuRuntime>,
        mask: Option<&Tensor<CpuRuntime>>,
        adjacency: Option<&Tensor<CpuRuntime>>,
        max_radius: Option<f64>,
    ) -> Result<Option<Tensor<CpuRuntime>>> {
        pair_validity_impl::<CpuRuntime>(rel_dist, mask, adjacency, max_radius)
    }

    fn select_neighbors(
        &self,
        rel_dist: &Tensor<CpuRuntime>,
        validity: Option<&Tensor<CpuRuntime>>,
        k: usize,
    ) -> Result<Tensor<CpuRuntime>> {
        select_neighbors_impl::<CpuRuntime>(rel_dist, validity, k)
    }

    fn gather_pairs(
        &self,
        values: &Var<CpuRuntime>,
        indices: &Tensor<CpuRuntime>,
    ) -> Result<Var<CpuRuntime>> {
        gather_pairs_impl(self, values, indices)
    }

    fn gather_nodes(
        &self,
        values: &Var<CpuRuntime>,
        indices: &Tensor<CpuRuntime>,
    ) -> Result<Var<CpuRuntime>> {
        gather_nodes_impl(self, values, indices)
    }
}
