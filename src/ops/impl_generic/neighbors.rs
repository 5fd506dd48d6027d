//! Generic neighborhood selection and gather implementation
//!
//! Validity and top-k selection pull the pairwise distances to the host,
//! rank each `(batch, node)` row in parallel and upload the result.
//! Gathers compose `var_gather`, so gradients flow back through the
//! selected keys, values and geometry.

use crate::error::{Error, Result};
use crate::ops::impl_generic::geometry::var_contiguous;
use numr::autograd::{Var, var_gather, var_reshape};
use numr::dtype::DType;
use numr::ops::IndexingOps;
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;
use rayon::prelude::*;

fn pair_dims(rel_dist: &[usize]) -> Result<(usize, usize)> {
    if rel_dist.len() != 3 || rel_dist[1] != rel_dist[2] {
        return Err(Error::shape("rel_dist", "[B, N, N]", rel_dist));
    }
    Ok((rel_dist[0], rel_dist[1]))
}

fn host_f32<R: Runtime<DType = DType>>(t: &Tensor<R>, arg: &'static str) -> Result<Vec<f32>> {
    if t.dtype() != DType::F32 {
        return Err(Error::InvalidArgument {
            arg,
            reason: format!("expected F32 tensor, got {:?}", t.dtype()),
        });
    }
    Ok(t.contiguous().to_vec::<f32>())
}

/// Pair validity `[B, N, N]` from node mask, adjacency and radius.
pub fn pair_validity_impl<R: Runtime<DType = DType>>(
    rel_dist: &Tensor<R>,
    mask: Option<&Tensor<R>>,
    adjacency: Option<&Tensor<R>>,
    max_radius: Option<f64>,
) -> Result<Option<Tensor<R>>> {
    let radius = max_radius.filter(|r| r.is_finite());
    if mask.is_none() && adjacency.is_none() && radius.is_none() {
        return Ok(None);
    }
    let (b, n) = pair_dims(rel_dist.shape())?;

    let mask = match mask {
        Some(m) => {
            if m.shape() != [b, n] {
                return Err(Error::shape("mask", format!("[{b}, {n}]"), m.shape()));
            }
            Some(host_f32(m, "mask")?)
        }
        None => None,
    };
    let adjacency = match adjacency {
        Some(a) => {
            if a.shape() != [b, n, n] {
                return Err(Error::shape("adjacency", format!("[{b}, {n}, {n}]"), a.shape()));
            }
            Some(host_f32(a, "adjacency")?)
        }
        None => None,
    };
    let dist = host_f32(rel_dist, "rel_dist")?;

    let mut valid = vec![0.0f32; b * n * n];
    valid
        .par_chunks_mut(n.max(1))
        .enumerate()
        .for_each(|(row, out)| {
            let batch = row / n;
            let offset = row * n;
            for (j, slot) in out.iter_mut().enumerate() {
                let mut ok = true;
                if let Some(mask) = &mask {
                    ok &= mask[row] > 0.5 && mask[batch * n + j] > 0.5;
                }
                if let Some(adj) = &adjacency {
                    ok &= adj[offset + j] > 0.5;
                }
                if let Some(r) = radius {
                    ok &= f64::from(dist[offset + j]) <= r;
                }
                *slot = if ok { 1.0 } else { 0.0 };
            }
        });

    Ok(Some(Tensor::<R>::from_slice(
        &valid,
        &[b, n, n],
        rel_dist.device(),
    )))
}

/// Top-k nearest neighbors per node: I64 `[B, N, k]`.
pub fn select_neighbors_impl<R: Runtime<DType = DType>>(
    rel_dist: &Tensor<R>,
    validity: Option<&Tensor<R>>,
    k: usize,
) -> Result<Tensor<R>> {
    let (b, n) = pair_dims(rel_dist.shape())?;
    if k == 0 {
        return Err(Error::InvalidArgument {
            arg: "k",
            reason: "neighbor count must be positive".into(),
        });
    }
    if k > n {
        return Err(Error::ShapeMismatch {
            arg: "neighbor_count",
            expected: format!("at most {n} neighbors (node count)"),
            got: vec![k],
        });
    }

    let ranking = host_f32(rel_dist, "rel_dist")?;
    let invalid: Vec<bool> = match validity {
        Some(validity) => {
            if validity.shape() != [b, n, n] {
                return Err(Error::shape(
                    "validity",
                    format!("[{b}, {n}, {n}]"),
                    validity.shape(),
                ));
            }
            host_f32(validity, "validity")?
                .par_iter()
                .map(|&v| v <= 0.5)
                .collect()
        }
        None => vec![false; b * n * n],
    };

    let mut indices = vec![0i64; b * n * k];
    indices
        .par_chunks_mut(k)
        .zip(ranking.par_chunks(n).zip(invalid.par_chunks(n)))
        .for_each(|(out, (row, row_invalid))| {
            let mut order: Vec<usize> = (0..n).collect();
            // valid pairs first, then by distance; stable, so ties keep ascending node index
            order.sort_by(|&x, &y| {
                row_invalid[x]
                    .cmp(&row_invalid[y])
                    .then(row[x].total_cmp(&row[y]))
            });
            for (slot, &j) in out.iter_mut().zip(&order) {
                *slot = j as i64;
            }
        });

    Ok(Tensor::<R>::from_slice(&indices, &[b, n, k], rel_dist.device()))
}

fn check_indices<R: Runtime<DType = DType>>(indices: &Tensor<R>, lead: &[usize]) -> Result<usize> {
    let shape = indices.shape();
    if indices.dtype() != DType::I64 {
        return Err(Error::InvalidArgument {
            arg: "indices",
            reason: format!("expected I64 neighbor indices, got {:?}", indices.dtype()),
        });
    }
    if shape.len() != 3 || shape[..2] != *lead {
        return Err(Error::shape(
            "indices",
            format!("[{}, {}, K]", lead[0], lead[1]),
            shape,
        ));
    }
    Ok(shape[2])
}

/// `[B, N, N, ...]` values reindexed to `[B, N, K, ...]`.
pub fn gather_pairs_impl<R, C>(client: &C, values: &Var<R>, indices: &Tensor<R>) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + IndexingOps<R>,
    R::Client: IndexingOps<R>,
{
    let vshape = values.shape().to_vec();
    if vshape.len() < 3 || vshape[1] != vshape[2] {
        return Err(Error::shape("values", "[B, N, N, ...]", &vshape));
    }
    let k = check_indices(indices, &vshape[..2])?;
    let trailing = &vshape[3..];

    let mut idx_shape = vec![vshape[0], vshape[1], k];
    idx_shape.extend(std::iter::repeat_n(1, trailing.len()));
    let mut out_shape = vec![vshape[0], vshape[1], k];
    out_shape.extend_from_slice(trailing);

    let index = indices
        .reshape(&idx_shape)
        .map_err(Error::Numr)?
        .broadcast_to(&out_shape)
        .map_err(Error::Numr)?
        .contiguous();

    var_gather(&var_contiguous(values), 2, &index, client).map_err(Error::Numr)
}

/// `[B, N, C]` node values reindexed to `[B, N, K, C]`.
pub fn gather_nodes_impl<R, C>(client: &C, values: &Var<R>, indices: &Tensor<R>) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: RuntimeClient<R> + IndexingOps<R>,
    R::Client: IndexingOps<R>,
{
    let vshape = values.shape().to_vec();
    if vshape.len() != 3 {
        return Err(Error::shape("values", "[B, N, C]", &vshape));
    }
    let (b, n, c) = (vshape[0], vshape[1], vshape[2]);
    let k = check_indices(indices, &[b, n])?;

    // flatten (node, neighbor) so one gather along the node axis does it
    let index = indices
        .reshape(&[b, n * k, 1])
        .map_err(Error::Numr)?
        .broadcast_to(&[b, n * k, c])
        .map_err(Error::Numr)?
        .contiguous();

    let gathered = var_gather(&var_contiguous(values), 1, &index, client).map_err(Error::Numr)?;
    var_reshape(&gathered, &[b, n, k, c]).map_err(Error::Numr)
}
