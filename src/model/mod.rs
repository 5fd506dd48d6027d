pub mod config;
pub mod en_transformer;
pub mod traits;

pub use config::{EnTransformerConfig, NeighborMode};
pub use en_transformer::{EnTransformer, EquivariantAttention, PairInputs, StackEntry, Sublayer};
pub use traits::{AutogradClient, GeometryClient};
