pub mod geometry;
pub mod neighbors;
