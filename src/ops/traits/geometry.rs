//! Relative-geometry operations trait

use crate::error::Result;
use numr::autograd::Var;
use numr::runtime::Runtime;

/// Geometry primitives for point-cloud attention.
///
/// Composite ops built from numr autograd primitives, so gradients flow
/// back into coordinates.
///
/// # Layout contract
///
/// - `coords`: `[B, N, 3]`
/// - relative vectors: `[B, N, N, 3]` with `rel[b, i, j] = coords[b, i] - coords[b, j]`
/// - distances: `[B, N, N]`
pub trait GeometryOps<R: Runtime> {
    /// Pairwise relative vectors and their Euclidean lengths.
    ///
    /// Returns `(rel_coors [B, N, N, 3], rel_dist [B, N, N])`.
    fn relative_geometry(&self, coords: &Var<R>) -> Result<(Var<R>, Var<R>)>;

    /// Euclidean norm over the last axis, kept as a size-1 axis.
    ///
    /// Stays differentiable at the zero vector.
    fn vector_norm(&self, x: &Var<R>) -> Result<Var<R>>;

    /// Sinusoidal distance encoding.
    ///
    /// Appends a trailing axis of length `2 * num_bands + 1` holding
    /// `sin(d / 2^i)` for every band, then `cos(d / 2^i)`, then `d` itself.
    /// `num_bands = 0` yields just `[d]`.
    fn fourier_encode_dist(&self, dist: &Var<R>, num_bands: usize) -> Result<Var<R>>;

    /// Differentiable `max(x, min)`.
    fn clamp_min(&self, x: &Var<R>, min: f64) -> Result<Var<R>>;
}
