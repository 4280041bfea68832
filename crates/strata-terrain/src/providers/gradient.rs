//! Radial falloff layer blending a circular and a box-shaped gradient.

use serde::{Deserialize, Serialize};

use super::{BlendMode, ProviderKind, TopographyProvider};

/// Parameters for [`GradientProvider`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientParams {
    /// Center of the gradient in normalized coordinates.
    pub origin: (f32, f32),
    /// Radius inside which the gradient is at full strength.
    pub inner_radius: f32,
    /// Radius at which the gradient reaches zero.
    pub outer_radius: f32,
    /// Height of the gradient at full strength.
    pub amplitude: f32,
    /// `0` = circular falloff, `1` = box falloff.
    pub shape: f32,
    pub blend: BlendMode,
}

impl Default for GradientParams {
    fn default() -> Self {
        Self {
            origin: (0.5, 0.5),
            inner_radius: 0.0,
            outer_radius: 1.0,
            amplitude: 100.0,
            shape: 0.5,
            blend: BlendMode::Add,
        }
    }
}

/// Island-style falloff centered on an origin.
#[derive(Clone, Debug)]
pub struct GradientProvider {
    params: GradientParams,
}

impl GradientProvider {
    pub fn new(params: GradientParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GradientParams {
        &self.params
    }

    fn circular(&self, du: f32, dv: f32) -> f32 {
        let sqr_distance = du * du + dv * dv;
        let sqr_inner = self.params.inner_radius * self.params.inner_radius;
        let sqr_outer = self.params.outer_radius * self.params.outer_radius;
        let t = (sqr_distance - sqr_inner) / (sqr_outer - sqr_inner).max(f32::EPSILON);
        1.0 - t.clamp(0.0, 1.0)
    }

    fn boxed(&self, du: f32, dv: f32) -> f32 {
        let distance = du.max(dv);
        let range = (self.params.outer_radius - self.params.inner_radius).max(f32::EPSILON);
        let t = (distance - self.params.inner_radius) / range;
        1.0 - t.clamp(0.0, 1.0)
    }
}

impl TopographyProvider for GradientProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gradient
    }

    fn blend(&self) -> BlendMode {
        self.params.blend
    }

    fn contribution(&self, u: f32, v: f32) -> f32 {
        let du = (self.params.origin.0 - u).abs();
        let dv = (self.params.origin.1 - v).abs();
        let circular = self.circular(du, dv);
        let boxed = self.boxed(du, dv);
        let shape = self.params.shape.clamp(0.0, 1.0);
        (circular + (boxed - circular) * shape) * self.params.amplitude
    }
}
