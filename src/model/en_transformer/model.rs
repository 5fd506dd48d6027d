//! Full EnTransformer: optional token embedding plus `depth` layer pairs

use super::super::config::EnTransformerConfig;
use super::super::traits::{AutogradClient, GeometryClient};
use super::attention::EquivariantAttention;
use super::stack::{PairInputs, StackEntry, Sublayer};
use crate::error::{Error, Result};
use crate::nn::module::{Module, extend_named};
use crate::nn::{Embedding, FeedForward, LayerNorm, VarBuilder, VarMap};
use numr::autograd::Var;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Stack of pre-norm residual equivariant attention and feed-forward layers.
///
/// Parameter names:
/// - `token_emb.weight` (only with a vocabulary)
/// - `layers.{i}.attn.norm.*`, `layers.{i}.attn.<block params>`
/// - `layers.{i}.ff.norm.*`, `layers.{i}.ff.{proj,out}.*`
pub struct EnTransformer<R: Runtime> {
    config: EnTransformerConfig,
    token_emb: Option<Embedding<R>>,
    /// `[attn_0, ff_0, attn_1, ff_1, ...]`
    layers: Vec<StackEntry<R>>,
}

impl<R: Runtime<DType = DType>> EnTransformer<R> {
    /// Fresh model with weights sampled from `config.seed`.
    pub fn from_config(config: &EnTransformerConfig, device: &R::Device) -> Result<Self> {
        let mut varmap = VarMap::new();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut vb = VarBuilder::with_rng(&mut varmap, device, &mut rng);
        Self::from_varbuilder(&mut vb, config)
    }

    /// Build from named weights.
    ///
    /// With a load-only builder every weight must be present; with an RNG
    /// the missing ones are sampled.
    pub fn from_varbuilder(vb: &mut VarBuilder<R>, config: &EnTransformerConfig) -> Result<Self> {
        config.validate()?;
        let eps = config.layer_norm_eps as f32;

        let token_emb = match config.vocabulary_size {
            Some(vocab) => Some(Embedding::from_varbuilder(
                &mut vb.pp("token_emb"),
                vocab,
                config.feature_dim,
            )?),
            None => None,
        };

        let mut layers = Vec::with_capacity(config.depth * 2);
        for i in 0..config.depth {
            let mut layer_vb = vb.pp(&format!("layers.{i}"));

            let mut attn_vb = layer_vb.pp("attn");
            let norm = LayerNorm::from_varbuilder(&mut attn_vb.pp("norm"), config.feature_dim, eps)?;
            let attn = EquivariantAttention::from_varbuilder(&mut attn_vb, config)?;
            layers.push(StackEntry::new(Some(norm), Sublayer::Attention(attn), true));

            let mut ff_vb = layer_vb.pp("ff");
            let norm = LayerNorm::from_varbuilder(&mut ff_vb.pp("norm"), config.feature_dim, eps)?;
            let ff = FeedForward::from_varbuilder(&mut ff_vb, config.feature_dim, config.ff_mult)?;
            layers.push(StackEntry::new(Some(norm), Sublayer::FeedForward(ff), true));
        }

        let model = Self {
            config: config.clone(),
            token_emb,
            layers,
        };
        log::debug!(
            "EnTransformer: depth {}, {} neighbors, {} parameters",
            config.depth,
            config.neighbor_mode(),
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &EnTransformerConfig {
        &self.config
    }

    pub fn layers(&self) -> &[StackEntry<R>] {
        &self.layers
    }

    /// Run every layer in order.
    ///
    /// Same inputs as [`EquivariantAttention::forward`]; returns the final
    /// `(features [B, N, D], coordinates [B, N, 3])`.
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
        let fs = feats.shape();
        if fs.len() == 3 && (fs[0] == 0 || fs[1] == 0) {
            return Err(Error::shape("feats", "[B, N, D] with B, N > 0", fs));
        }
        let pairs = PairInputs {
            edges,
            mask,
            adjacency,
        };
        let mut feats = feats.clone();
        let mut coors = coors.clone();
        for layer in &self.layers {
            (feats, coors) = layer.forward(client, &feats, &coors, pairs)?;
        }
        Ok((feats, coors))
    }

    /// Embed I64 node labels `[B, N]`, then [`forward`](Self::forward).
    pub fn forward_tokens<C>(
        &self,
        client: &C,
        tokens: &Tensor<R>,
        coors: &Var<R>,
        edges: Option<&Var<R>>,
        mask: Option<&Tensor<R>>,
        adjacency: Option<&Tensor<R>>,
    ) -> Result<(Var<R>, Var<R>)>
    where
        C: GeometryClient<R>,
        R::Client: AutogradClient<R>,
    {
        let emb = self.token_emb.as_ref().ok_or_else(|| Error::InvalidArgument {
            arg: "tokens",
            reason: "model was built without vocabulary_size".into(),
        })?;
        if tokens.dtype() != DType::I64 {
            return Err(Error::InvalidArgument {
                arg: "tokens",
                reason: format!("expected I64 labels, got {:?}", tokens.dtype()),
            });
        }
        if tokens.shape().len() != 2 || tokens.shape().contains(&0) {
            return Err(Error::shape("tokens", "[B, N] with B, N > 0", tokens.shape()));
        }

        let vocab = emb.vocab_size() as i64;
        if let Some(bad) = tokens
            .contiguous()
            .to_vec::<i64>()
            .into_iter()
            .find(|&t| t < 0 || t >= vocab)
        {
            return Err(Error::InvalidArgument {
                arg: "tokens",
                reason: format!("label {bad} outside vocabulary of {vocab}"),
            });
        }

        let feats = emb.forward(client, tokens)?;
        self.forward(client, &feats, coors, edges, mask, adjacency)
    }
}

impl<R: Runtime> Module<R> for EnTransformer<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        if let Some(emb) = &self.token_emb {
            extend_named(&mut out, "token_emb", emb);
        }
        for (i, pair) in self.layers.chunks(2).enumerate() {
            for (entry, kind) in pair.iter().zip(["attn", "ff"]) {
                extend_named(&mut out, &format!("layers.{i}.{kind}"), entry);
            }
        }
        out
    }
}
