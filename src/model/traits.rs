//! Client bounds for model forward passes

use crate::ops::traits::{GeometryOps, NeighborOps};
use numr::ops::{
    ActivationOps, BinaryOps, CompareOps, IndexingOps, ReduceOps, ScalarOps, ShapeOps, TensorOps, UnaryOps,
};
use numr::runtime::{Runtime, RuntimeClient};

/// Trait alias for the full set of client bounds required by the
/// equivariant attention block and the layer stack.
pub trait GeometryClient<R: Runtime>:
    RuntimeClient<R>
    + TensorOps<R>
    + ScalarOps<R>
    + ReduceOps<R>
    + IndexingOps<R>
    + ShapeOps<R>
    + ActivationOps<R>
    + BinaryOps<R>
    + UnaryOps<R>
    + CompareOps<R>
    + GeometryOps<R>
    + NeighborOps<R>
{
}

impl<R, C> GeometryClient<R> for C
where
    R: Runtime,
    C: RuntimeClient<R>
        + TensorOps<R>
        + ScalarOps<R>
        + ReduceOps<R>
        + IndexingOps<R>
        + ShapeOps<R>
        + ActivationOps<R>
        + BinaryOps<R>
        + UnaryOps<R>
        + CompareOps<R>
        + GeometryOps<R>
        + NeighborOps<R>,
{
}

/// Bounds on `R::Client`, which autograd uses to run backward ops.
pub trait AutogradClient<R: Runtime>:
    TensorOps<R>
    + ScalarOps<R>
    + ReduceOps<R>
    + IndexingOps<R>
    + ShapeOps<R>
    + ActivationOps<R>
    + BinaryOps<R>
    + UnaryOps<R>
    + CompareOps<R>
{
}

impl<R, C> AutogradClient<R> for C
where
    R: Runtime,
    C: TensorOps<R>
        + ScalarOps<R>
        + ReduceOps<R>
        + IndexingOps<R>
        + ShapeOps<R>
        + ActivationOps<R>
        + BinaryOps<R>
        + UnaryOps<R>
        + CompareOps<R>,
{
}
