//! Pre-norm residual wrappers for the layer stack

use super::super::traits::{AutogradClient, GeometryClient};
use super::attention::EquivariantAttention;
use crate::error::{Error, Result};
use crate::nn::module::{Module, extend_named};
use crate::nn::{FeedForward, LayerNorm};
use numr::autograd::{Var, var_add};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Block wrapped by a [`StackEntry`].
pub enum Sublayer<R: Runtime> {
    Attention(EquivariantAttention<R>),
    FeedForward(FeedForward<R>),
}

/// Optional pre-norm plus optional residual around one sublayer.
///
/// With `residual`, outputs are `feats + Δfeats` and `coors + Δcoors`.
/// Without it the deltas replace the inputs; a feed-forward sublayer
/// yields no coordinate delta, so coordinates pass through untouched.
pub struct StackEntry<R: Runtime> {
    norm: Option<LayerNorm<R>>,
    sublayer: Sublayer<R>,
    residual: bool,
}

/// Optional inputs forwarded to every attention sublayer.
pub struct PairInputs<'a, R: Runtime> {
    /// `[B, N, N, E]`
    pub edges: Option<&'a Var<R>>,
    /// `[B, N]`
    pub mask: Option<&'a Tensor<R>>,
    /// `[B, N, N]`
    pub adjacency: Option<&'a Tensor<R>>,
}

impl<R: Runtime> Clone for PairInputs<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Runtime> Copy for PairInputs<'_, R> {}

impl<R: Runtime> Default for PairInputs<'_, R> {
    fn default() -> Self {
        Self {
            edges: None,
            mask: None,
            adjacency: None,
        }
    }
}

impl<R: Runtime<DType = DType>> StackEntry<R> {
    pub fn new(norm: Option<LayerNorm<R>>, sublayer: Sublayer<R>, residual: bool) -> Self {
        Self {
            norm,
            sublayer,
            residual,
        }
    }

    pub fn sublayer(&self) -> &Sublayer<R> {
        &self.sublayer
    }

    pub fn forward<C>(
        &self,
        client: &C,
        feats: &Var<R>,
        coors: &Var<R>,
        pairs: PairInputs<'_, R>,
    ) -> Result<(Var<R>, Var<R>)>
    where
        C: GeometryClient<R>,
        R::Client: AutogradClient<R>,
    {
        let normed = match &self.norm {
            Some(norm) => norm.forward(client, feats)?,
            None => feats.clone(),
        };

        let (feats_delta, coors_delta) = match &self.sublayer {
            Sublayer::Attention(attn) => {
                let (df, dc) = attn.forward(
                    client,
                    &normed,
                    coors,
                    pairs.edges,
                    pairs.mask,
                    pairs.adjacency,
                )?;
                (df, Some(dc))
            }
            Sublayer::FeedForward(ff) => (ff.forward(client, &normed)?, None),
        };

        if !self.residual {
            return Ok((feats_delta, coors_delta.unwrap_or_else(|| coors.clone())));
        }

        let feats = var_add(feats, &feats_delta, client).map_err(Error::Numr)?;
        let coors = match coors_delta {
            Some(dc) => var_add(coors, &dc, client).map_err(Error::Numr)?,
            None => coors.clone(),
        };
        Ok((feats, coors))
    }
}

impl<R: Runtime> Module<R> for StackEntry<R> {
    fn named_parameters(&self) -> Vec<(String, &Var<R>)> {
        let mut out = Vec::new();
        if let Some(norm) = &self.norm {
            extend_named(&mut out, "norm", norm);
        }
        match &self.sublayer {
            Sublayer::Attention(attn) => out.extend(attn.named_parameters()),
            Sublayer::FeedForward(ff) => out.extend(ff.named_parameters()),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::EnTransformerConfig;
    use crate::nn::{VarBuilder, VarMap};
    use crate::test_utils::cpu_setup;
    use numr::runtime::cpu::CpuRuntime;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn feed_forward_entry(residual: bool) -> StackEntry<CpuRuntime> {
        let (_client, device) = cpu_setup();
        let mut varmap = VarMap::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut vb = VarBuilder::with_rng(&mut varmap, &device, &mut rng);
        let norm = LayerNorm::from_varbuilder(&mut vb.pp("norm"), 4, 1e-5).unwrap();
        let ff = FeedForward::from_varbuilder(&mut vb, 4, 2).unwrap();
        StackEntry::new(Some(norm), Sublayer::FeedForward(ff), residual)
    }

    fn vars() -> (Var<CpuRuntime>, Var<CpuRuntime>) {
        let (_client, device) = cpu_setup();
        let feats = Tensor::<CpuRuntime>::from_slice(&[0.5f32, -1.0, 2.0, 0.0, 1.0, 1.5, -0.5, 3.0], &[1, 2, 4], &device);
        let coors = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, -1.0, 0.0, 4.0], &[1, 2, 3], &device);
        (Var::new(feats, false), Var::new(coors, false))
    }

    #[test]
    fn test_feed_forward_leaves_coordinates() {
        let (client, _device) = cpu_setup();
        let (feats, coors) = vars();
        for residual in [true, false] {
            let entry = feed_forward_entry(residual);
            let (f, c) = entry
                .forward(&client, &feats, &coors, PairInputs::default())
                .unwrap();
            assert_eq!(f.shape(), &[1, 2, 4]);
            assert_eq!(c.tensor().to_vec::<f32>(), coors.tensor().to_vec::<f32>());
        }
    }

    #[test]
    fn test_residual_adds_delta() {
        let (client, _device) = cpu_setup();
        let (feats, coors) = vars();
        let plain = feed_forward_entry(false);
        let residual = feed_forward_entry(true);

        let (delta, _) = plain
            .forward(&client, &feats, &coors, PairInputs::default())
            .unwrap();
        let (out, _) = residual
            .forward(&client, &feats, &coors, PairInputs::default())
            .unwrap();

        let x = feats.tensor().to_vec::<f32>();
        let d = delta.tensor().to_vec::<f32>();
        let o = out.tensor().to_vec::<f32>();
        for i in 0..x.len() {
            assert!((o[i] - (x[i] + d[i])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_attention_entry_names() {
        let (_client, device) = cpu_setup();
        let mut config = EnTransformerConfig::new(4, 1);
        config.heads = 1;
        config.head_dim = 2;
        let mut varmap = VarMap::<CpuRuntime>::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut vb = VarBuilder::with_rng(&mut varmap, &device, &mut rng);
        let norm = LayerNorm::from_varbuilder(&mut vb.pp("norm"), 4, 1e-5).unwrap();
        let attn = EquivariantAttention::from_varbuilder(&mut vb, &config).unwrap();
        let entry = StackEntry::new(Some(norm), Sublayer::Attention(attn), true);

        let names: Vec<String> = entry.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names[0], "norm.weight");
        assert!(names.contains(&"to_qkv.weight".to_string()));
    }
}
