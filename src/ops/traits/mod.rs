pub mod geometry;
pub mod neighbors;

pub use geometry::GeometryOps;
pub use neighbors::NeighborOps;
