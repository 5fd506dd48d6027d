//! E(n)-equivariant transformer
//!
//! [`EquivariantAttention`] is the single block; [`EnTransformer`] stacks
//! `depth` pre-norm residual (attention, feed-forward) pairs on top of it.

pub mod attention;
pub mod model;
pub mod stack;

pub use attention::EquivariantAttention;
pub use model::EnTransformer;
pub use stack::{PairInputs, StackEntry, Sublayer};
