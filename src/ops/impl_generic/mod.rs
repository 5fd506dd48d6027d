pub mod geometry;
pub mod neighbors;

pub use geometry::{
    clamp_min_impl, fourier_encode_dist_impl, relative_geometry_impl, vector_norm_impl,
};
pub use neighbors::{
    gather_nodes_impl, gather_pairs_impl, pair_validity_impl, select_neighbors_impl,
};
