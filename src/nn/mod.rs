pub mod activation;
pub mod coors_norm;
pub mod embedding;
pub mod feed_forward;
pub mod layernorm;
pub mod linear;
pub mod mlp;
pub mod module;
pub mod var_builder;
pub mod varmap;

pub use activation::Activation;
pub use coors_norm::CoorsNorm;
pub use embedding::Embedding;
pub use feed_forward::FeedForward;
pub use layernorm::LayerNorm;
pub use linear::Linear;
pub use mlp::Mlp;
pub use module::{Module, StateDict};
pub use var_builder::VarBuilder;
pub use varmap::{Init, VarMap};
