//! CPU implementation of GeometryOps, delegating to impl_generic

use crate::error::Result;
use crate::ops::impl_generic::geometry::{
    clamp_min_impl, fourier_encode_dist_impl, relative_geometry_impl, vector_norm_impl,
};
use crate::ops::traits::GeometryOps;
use numr::autograd::Var;
use numr::runtime::cpu::{CpuClient, CpuRuntime};

impl GeometryOps<CpuRuntime> for CpuClient {
    fn relative_geometry(
        &self,
        coords: &Var<CpuRuntime>,
    ) -> Result<(Var<CpuRuntime>, Var<CpuRuntime>)> {
        relative_geometry_impl(self, coords)
    }

    fn vector_norm(&self, x: &Var<CpuRuntime>) -> Result<Var<CpuRuntime>> {
        vector_norm_impl(self, x)
    }

    fn fourier_encode_dist(
        &self,
        dist: &Var<CpuRuntime>,
        num_bands: usize,
    ) -> Result<Var<CpuRuntime>> {
        fourier_encode_dist_impl(self, dist, num_bands)
    }

    fn clamp_min(&self, x: &Var<CpuRuntime>, min: f64) -> Result<Var<CpuRuntime>> {
        clamp_min_impl(self, x, min)
    }
}
