//! E(n)-equivariant attention block
//!
//! One call jointly updates node features and node coordinates:
//!
//! 1. pairwise relative vectors and distances
//! 2. pair validity from mask, adjacency (sparse-only mode) and radius
//! 3. optional top-k neighbor selection; every pairwise quantity is then
//!    reindexed with the same `[B, N, K]` index
//! 4. Fourier distance encoding → position embedding, added to values and
//!    to the message input `(q_i - k_j)`
//! 5. messages → coordinate weights → `Σ_j w_ij · rel_ij` (coordinate delta)
//! 6. messages → attention logits → masked softmax → `Σ_j a_ij · v_j`
//!    (feature delta)
//!
//! Internal layout is `[B, N, J, H, *]` (node, neighbor, head), so no
//! permute or copy is needed between stages. In dense mode J = N and the
//! per-neighbor tensors broadcast over the node axis instead of being
//! materialized.

use super::super::config::{EnTransformerConfig, NeighborMode};
use super::super::traits::{AutogradClient, GeometryClient};
use crate::error::{Error, Result};
use crate::nn::module::{Module, extend_named};
use crate::nn::{Activation, CoorsNorm, Init, Linear, Mlp, VarBuilder, VarMap};
use numr::autograd::{
    Var, var_add, var_cat, var_div, var_exp, var_mul, var_reshape, var_sub, var_sum,
};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Equivariant multi-head attention over a point set.
///
/// Weights (dotted names as read by [`from_varbuilder`](Self::from_varbuilder)):
/// - `to_qkv`: `[3 * H * Dh, D]`, no bias
/// - `to_out`: `[D, H * Dh]` + bias
/// - `to_pos_emb`: `2F+1 → 2Dh → Dh`
/// - `edge_mlp`: `Dh+E → 2(Dh+E) → M`, ReLU output
/// - `to_attn_mlp`: `M → 4M → 1`
/// - `coors_mlp`: `H*M → 4M → 1`, tanh output when coordinate weights are normalized
/// - `rel_coors_norm` (optional): gated relative-vector normalization
pub struct EquivariantAttention<R: Runtime> {
    to_qkv: Linear<R>,
    to_out: Linear<R>,
    to_pos_emb: Mlp<R>,
    edge_mlp: Mlp<R>,
    to_attn_mlp: Mlp<R>,
    coors_mlp: Mlp<R>,
    rel_coors_norm: Option<CoorsNorm<R>>,
    config: EnTransformerConfig,
}

/// Pairwise quantities after neighborhood selection.
///
/// Neighbor axis J is `k` in top-k mode and `N` in dense mode.
struct Neighborhood<R: Runtime> {
    /// `[B, N, J, 3]`
    rel_coors: Var<R>,
    /// `[B, N, J]`
    rel_dist: Var<R>,
    /// `[B, N, J, 1]`, `None` when every pair is valid
    validity: Option<Var<R>>,
    /// `[B, N, J, E]`
    edges: Option<Var<R>>,
    /// `[B, N, K]` in top-k mode
    indices: Option<Tensor<R>>,
    size: usize,
}

impl<R: Runtime<DType = DType>> EquivariantAttention<R> {
    /// Fresh block with weights sampled from `config.seed`.
    pub fn from_config(config: &EnTransformerConfig, device: &R::Device) -> Result<Self> {
        let mut varmap = VarMap::new();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut vb = VarBuilder::with_rng(&mut varmap, device, &mut rng);
        Self::from_varbuilder(&mut vb, config)
    }

    /// Load weights by name; missing ones are sampled only if `vb` has an RNG.
    pub fn from_varbuilder(vb: &mut VarBuilder<R>, config: &EnTransformerConfig) -> Result<Self> {
        config.validate()?;
        let c = config;
        let inner = c.inner_dim();
        let edge_input = c.head_dim + c.edge_dim;
        let m = c.message_dim;
        let init = Init::Normal(c.param_init_scale as f32);

        let to_qkv = Linear::from_varbuilder(&mut vb.pp("to_qkv"), c.feature_dim, inner * 3, false, init)?;
        let to_out = Linear::from_varbuilder(&mut vb.pp("to_out"), inner, c.feature_dim, true, init)?;
        let to_pos_emb = Mlp::from_varbuilder(
            &mut vb.pp("to_pos_emb"),
            [c.pos_dim(), c.head_dim * 2, c.head_dim],
            None,
            init,
        )?;
        let edge_mlp = Mlp::from_varbuilder(
            &mut vb.pp("edge_mlp"),
            [edge_input, edge_input * 2, m],
            Some(Activation::Relu),
            init,
        )?;
        let to_attn_mlp = Mlp::from_varbuilder(&mut vb.pp("to_attn_mlp"), [m, m * 4, 1], None, init)?;
        let coors_mlp = Mlp::from_varbuilder(
            &mut vb.pp("coors_mlp"),
            [m * c.heads, m * 4, 1],
            c.normalize_coordinate_weights.then_some(Activation::Tanh),
            init,
        )?;
        let rel_coors_norm = if c.normalize_relative_vectors {
            Some(CoorsNorm::from_varbuilder(
                &mut vb.pp("rel_coors_norm"),
                c.layer_norm_eps as f32,
            )?)
        } else {
            None
        };

        Ok(Self {
            to_qkv,
            to_out,
            to_pos_emb,
            edge_mlp,
            to_attn_mlp,
            coors_mlp,
            rel_coors_norm,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &EnTransformerConfig {
        &self.config
    }

    /// Forward pass.
    ///
    /// - `feats`: `[B, N, D]`
    /// - `coors`: `[B, N, 3]`
    /// - `edges`: `[B, N, N, E]`, required exactly when `edge_dim > 0`
    /// - `mask`: `[B, N]` F32, 1.0 for real nodes
    /// - `adjacency`: `[B, N, N]` F32, required in sparse-only mode and
    ///   ignored otherwise
    ///
    /// Returns `(feature_delta [B, N, D], coordinate_delta [B, N, 3])`.
    pub fn forward<C>(
        &self,
        client: &C,
        feats: &Var<R>,
        coors: &Var<R>,
        edges: Option<&Var<R>>,
        mask: Option<&Tensor<R>>,
        adjacency: Option<&Tensor<R>>,
    ) -> Result<(Var<R>, Var<R>)>
    where
        C: GeometryClient<R>,
        R::Client: AutogradClient<R>,
    {
        let (b, n) = self.check_inputs(feats, coors, edges, mask, adjacency)?;
        let (h, dh) = (self.config.heads, self.config.head_dim);
        let inner = self.config.inner_dim();

        let hood = self.neighborhood(client, coors, edges, mask, adjacency)?;
        let j = hood.size;
        log::trace!(
            "equivariant attention: {} over {} nodes, {} neighbors each",
            self.config.neighbor_mode(),
            n,
            j
        );

        // ── Queries, keys, values ─────────────────────────────────────
        let q = self.to_qkv.forward_chunk(client, feats, 0, 3)?;
        let k = self.to_qkv.forward_chunk(client, feats, 1, 3)?;
        let v = self.to_qkv.forward_chunk(client, feats, 2, 3)?;

        let q = var_reshape(&q, &[b, n, 1, h, dh]).map_err(Error::Numr)?;
        let (k, v) = match &hood.indices {
            Some(idx) => {
                let k = client.gather_nodes(&k, idx)?;
                let v = client.gather_nodes(&v, idx)?;
                (
                    var_reshape(&k, &[b, n, j, h, dh]).map_err(Error::Numr)?,
                    var_reshape(&v, &[b, n, j, h, dh]).map_err(Error::Numr)?,
                )
            }
            None => (
                var_reshape(&k, &[b, 1, n, h, dh]).map_err(Error::Numr)?,
                var_reshape(&v, &[b, 1, n, h, dh]).map_err(Error::Numr)?,
            ),
        };

        // ── Position embedding, shared by all heads ───────────────────
        let enc = client.fourier_encode_dist(&hood.rel_dist, self.config.fourier_bands)?;
        let pos = self.to_pos_emb.forward(client, &enc)?;
        let pos = var_reshape(&pos, &[b, n, j, 1, dh]).map_err(Error::Numr)?;

        let v = var_add(&v, &pos, client).map_err(Error::Numr)?;

        // ── Messages ──────────────────────────────────────────────────
        let qk = var_sub(&q, &k, client).map_err(Error::Numr)?;
        let mut edge_input = var_add(&qk, &pos, client).map_err(Error::Numr)?;
        if let Some(e) = &hood.edges {
            let e = self.repeat_over_heads(client, e, [b, n, j])?;
            edge_input = var_cat(&[&edge_input, &e], -1, client).map_err(Error::Numr)?;
        }
        // [B, N, J, H, M]
        let m_ij = self.edge_mlp.forward(client, &edge_input)?;

        // ── Coordinate update ─────────────────────────────────────────
        let m_flat =
            var_reshape(&m_ij, &[b, n, j, h * self.config.message_dim]).map_err(Error::Numr)?;
        // [B, N, J, 1]
        let mut coor_weights = self.coors_mlp.forward(client, &m_flat)?;
        if let Some(valid) = &hood.validity {
            coor_weights = var_mul(&coor_weights, valid, client).map_err(Error::Numr)?;
        }

        let rel = match &self.rel_coors_norm {
            Some(norm) => norm.forward(client, &hood.rel_coors)?,
            None => hood.rel_coors.clone(),
        };
        let weighted = var_mul(&coor_weights, &rel, client).map_err(Error::Numr)?;
        let coors_delta = var_sum(&weighted, &[2], false, client).map_err(Error::Numr)?;

        // ── Attention ─────────────────────────────────────────────────
        let sim = self.to_attn_mlp.forward(client, &m_ij)?;
        let sim = var_reshape(&sim, &[b, n, j, h]).map_err(Error::Numr)?;
        let attn = masked_softmax(client, &sim, hood.validity.as_ref())?;
        let attn = var_reshape(&attn, &[b, n, j, h, 1]).map_err(Error::Numr)?;

        let weighted = var_mul(&attn, &v, client).map_err(Error::Numr)?;
        let out = var_sum(&weighted, &[2], false, client).map_err(Error::Numr)?;
        let out = var_reshape(&out, &[b, n, inner]).map_err(Error::Numr)?;
        let feats_delta = self.to_out.forward(client, &out)?;

        Ok((feats_delta, coors_delta))
    }

    /// Reject bad inputs before any computation; returns `(B, N)`.
    fn check_inputs(
        &self,
        feats: &Var<R>,
        coors: &Var<R>,
        edges: Option<&Var<R>>,
        mask: Option<&Tensor<R>>,
        adjacency: Option<&Tensor<R>>,
    ) -> Result<(usize, usize)> {
        let c = &self.config;
        if c.sparse_neighbors_only && adjacency.is_none() {
            return Err(Error::Config {
                reason: "missing adjacency for sparse-only mode".into(),
            });
        }

        let fs = feats.shape();
        if fs.len() != 3 || fs[2] != c.feature_dim {
            return Err(Error::shape("feats", format!("[B, N, {}]", c.feature_dim), fs));
        }
        let (b, n) = (fs[0], fs[1]);
        if b == 0 || n == 0 {
            return Err(Error::shape(
                "feats",
                format!("[B, N, {}] with B, N > 0", c.feature_dim),
                fs,
            ));
        }

        if coors.shape() != [b, n, 3] {
            return Err(Error::shape("coors", format!("[{b}, {n}, 3]"), coors.shape()));
        }

        match (edges, c.edge_dim) {
            (None, 0) => {}
            (Some(e), edge_dim) if edge_dim > 0 => {
                if e.shape() != [b, n, n, edge_dim] {
                    return Err(Error::shape(
                        "edges",
                        format!("[{b}, {n}, {n}, {edge_dim}]"),
                        e.shape(),
                    ));
                }
            }
            (None, edge_dim) => {
                return Err(Error::InvalidArgument {
                    arg: "edges",
                    reason: format!("edge_dim is {edge_dim} but no edges were given"),
                });
            }
            (Some(e), _) => {
                return Err(Error::shape("edges", "none (edge_dim is 0)", e.shape()));
            }
        }

        if let Some(m) = mask {
            if m.shape() != [b, n] {
                return Err(Error::shape("mask", format!("[{b}, {n}]"), m.shape()));
            }
        }
        if let Some(a) = adjacency {
            if a.shape() != [b, n, n] {
                return Err(Error::shape("adjacency", format!("[{b}, {n}, {n}]"), a.shape()));
            }
        }

        if let NeighborMode::TopK(k) = c.neighbor_mode() {
            if k > n {
                return Err(Error::ShapeMismatch {
                    arg: "neighbor_count",
                    expected: format!("at most {n} neighbors (node count)"),
                    got: vec![k],
                });
            }
        }
        Ok((b, n))
    }

    /// Relative geometry, validity and (in top-k mode) the gathered view.
    fn neighborhood<C>(
        &self,
        client: &C,
        coors: &Var<R>,
        edges: Option<&Var<R>>,
        mask: Option<&Tensor<R>>,
        adjacency: Option<&Tensor<R>>,
    ) -> Result<Neighborhood<R>>
    where
        C: GeometryClient<R>,
        R::Client: AutogradClient<R>,
    {
        let (rel_coors, rel_dist) = client.relative_geometry(coors)?;
        let (b, n) = (rel_dist.shape()[0], rel_dist.shape()[1]);

        let adjacency = if self.config.sparse_neighbors_only {
            adjacency
        } else {
            None
        };
        let validity =
            client.pair_validity(rel_dist.tensor(), mask, adjacency, self.config.radius())?;

        match self.config.neighbor_mode() {
            NeighborMode::Dense => {
                let validity = validity
                    .map(|v| v.reshape(&[b, n, n, 1]).map(|t| Var::new(t, false)))
                    .transpose()
                    .map_err(Error::Numr)?;
                Ok(Neighborhood {
                    rel_coors,
                    rel_dist,
                    validity,
                    edges: edges.cloned(),
                    indices: None,
                    size: n,
                })
            }
            NeighborMode::TopK(k) => {
                let idx = client.select_neighbors(rel_dist.tensor(), validity.as_ref(), k)?;
                let rel_coors = client.gather_pairs(&rel_coors, &idx)?;
                let rel_dist = client.gather_pairs(&rel_dist, &idx)?;
                let validity = match validity {
                    Some(v) => {
                        let v = client.gather_pairs(&Var::new(v, false), &idx)?;
                        Some(var_reshape(&v, &[b, n, k, 1]).map_err(Error::Numr)?)
                    }
                    None => None,
                };
                let edges = edges.map(|e| client.gather_pairs(e, &idx)).transpose()?;
                Ok(Neighborhood {
                    rel_coors,
                    rel_dist,
                    validity,
                    edges,
                    indices: Some(idx),
                    size: k,
                })
            }
        }
    }

    /// `[B, N, J, E]` → `[B, N, J, H, E]` by broadcasting against zeros, so
    /// the result is a fresh tensor that still carries the edge gradient.
    fn repeat_over_heads<C>(&self, client: &C, edges: &Var<R>, [b, n, j]: [usize; 3]) -> Result<Var<R>>
    where
        C: GeometryClient<R>,
        R::Client: AutogradClient<R>,
    {
        let e = self.config.edge_dim;
        let e5 = var_reshape(edges, &[b, n, j, 1, e]).map_err(Error::Numr)?;
        let zeros = Tensor::<R>::zeros(
            &[1, 1, 1, self.config.heads, 1],
            DType::F32,
            edges.tensor().device(),
        );
        var_add(&e5, &Var::new(zeros, false), client).map_err(Error::Numr)
    }
}

/// Softmax over the neighbor axis (dim 2) of `sim` `[B, N, J, H]`.
///
/// Invalid pairs get logit `-f32::MAX`, and the result is multiplied by
/// validity so rows of invalid query nodes come out as exact zeros.
fn masked_softmax<R, C>(client: &C, sim: &Var<R>, validity: Option<&Var<R>>) -> Result<Var<R>>
where
    R: Runtime<DType = DType>,
    C: GeometryClient<R>,
    R::Client: AutogradClient<R>,
{
    let logits = match validity {
        Some(valid) => {
            let kept = var_mul(sim, valid, client).map_err(Error::Numr)?;
            let offset = client.add_scalar(valid.tensor(), -1.0).map_err(Error::Numr)?;
            let bias = client
                .mul_scalar(&offset, f32::MAX as f64)
                .map_err(Error::Numr)?;
            var_add(&kept, &Var::new(bias, false), client).map_err(Error::Numr)?
        }
        None => sim.clone(),
    };

    // constant shift; softmax is invariant to it
    let row_max = client.max(logits.tensor(), &[2], true).map_err(Error::Numr)?;
    let shifted = var_sub(&logits, &Var::new(row_max, false), client).map_err(Error::Numr)?;
    let exp = var_exp(&shifted, client).map_err(Error::Numr)?;
    let denom = var_sum(&exp, &[2], true, client).map_err(Error::Numr)?;
    let attn = var_div(&exp, &denom, client).map_err(Error::Numr)?;

    match validity {
        Some(valid) => var_mul(&attn, valid, client).map_err(Error::Numr),
        None => Ok(attn),
    }
}

impl<R: Runtime> Module<R> for EquivariantAttention<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        extend_named(&mut out, "to_qkv", &self.to_qkv);
        extend_named(&mut out, "to_out", &self.to_out);
        extend_named(&mut out, "to_pos_emb", &self.to_pos_emb);
        extend_named(&mut out, "edge_mlp", &self.edge_mlp);
        extend_named(&mut out, "to_attn_mlp", &self.to_attn_mlp);
        extend_named(&mut out, "coors_mlp", &self.coors_mlp);
        if let Some(norm) = &self.rel_coors_norm {
            extend_named(&mut out, "rel_coors_norm", norm);
        }
        out
    }
}
