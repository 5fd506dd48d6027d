pub mod cpu;
pub mod impl_generic;
pub mod traits;

pub use traits::GeometryOps;
pub use traits::NeighborOps;

use crate::error::{Error, Result};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Node mask `[B, N]` (1.0 = real node, 0.0 = padding) from row-major booleans.
pub fn node_mask_from_bools<R: Runtime<DType = DType>>(
    mask: &[bool],
    batch: usize,
    nodes: usize,
    device: &R::Device,
) -> Result<Tensor<R>> {
    indicator_tensor(mask, &[batch, nodes], "mask", device)
}

/// Adjacency `[B, N, N]` (1.0 = connected) from row-major booleans.
pub fn adjacency_from_bools<R: Runtime<DType = DType>>(
    adjacency: &[bool],
    batch: usize,
    nodes: usize,
    device: &R::Device,
) -> Result<Tensor<R>> {
    indicator_tensor(adjacency, &[batch, nodes, nodes], "adjacency", device)
}

fn indicator_tensor<R: Runtime<DType = DType>>(
    flags: &[bool],
    shape: &[usize],
    arg: &'static str,
    device: &R::Device,
) -> Result<Tensor<R>> {
    let expected: usize = shape.iter().product();
    if flags.len() != expected {
        return Err(Error::InvalidArgument {
            arg,
            reason: format!(
                "{} flags cannot fill shape {:?} ({} elements)",
                flags.len(),
                shape,
                expected
            ),
        });
    }
    let data: Vec<f32> = flags.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect();
    Ok(Tensor::<R>::from_slice(&data, shape, device))
}
