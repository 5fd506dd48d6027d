//! Neighborhood selection and gather operations trait

use crate::error::Result;
use numr::autograd::Var;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Neighborhood construction for sparse (top-k) attention.
///
/// Masks, adjacency and validity are F32 tensors holding 1.0 for "valid"
/// and 0.0 for "invalid". Neighbor indices are I64 `[B, N, K]`.
pub trait NeighborOps<R: Runtime> {
    /// Combine node mask, adjacency and radius into a pair validity tensor.
    ///
    /// - `rel_dist`: `[B, N, N]`
    /// - `mask`: `[B, N]`; a pair is valid only if both endpoints are
    /// - `adjacency`: `[B, N, N]`; a pair is valid only if adjacent
    /// - `max_radius`: pairs farther apart are invalid
    ///
    /// Returns `None` when nothing restricts the pairs.
    fn pair_validity(
        &self,
        rel_dist: &Tensor<R>,
        mask: Option<&Tensor<R>>,
        adjacency: Option<&Tensor<R>>,
        max_radius: Option<f64>,
    ) -> Result<Option<Tensor<R>>>;

    /// Indices of the `k` nearest nodes per node, `[B, N, k]` I64.
    ///
    /// Invalid pairs rank behind every valid one, whatever their distances.
    /// Ties keep the lower node index first, so the result is deterministic.
    /// `k > N` is a shape error.
    fn select_neighbors(
        &self,
        rel_dist: &Tensor<R>,
        validity: Option<&Tensor<R>>,
        k: usize,
    ) -> Result<Tensor<R>>;

    /// Reindex pairwise values by neighbor index.
    ///
    /// `values`: `[B, N, N, ...]`, `indices`: `[B, N, K]` → `[B, N, K, ...]`
    /// with `out[b, i, j] = values[b, i, indices[b, i, j]]`.
    fn gather_pairs(&self, values: &Var<R>, indices: &Tensor<R>) -> Result<Var<R>>;

    /// Reindex per-node values by neighbor index.
    ///
    /// `values`: `[B, N, C]`, `indices`: `[B, N, K]` → `[B, N, K, C]`
    /// with `out[b, i, j] = values[b, indices[b, i, j]]`.
    fn gather_nodes(&self, values: &Var<R>, indices: &Tensor<R>) -> Result<Var<R>>;
}
