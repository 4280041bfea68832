//! Topography providers: the stacked layers sampled into every cell.
//!
//! Each provider returns a contribution for normalized grid coordinates
//! `(u, v)` in `[0, 1]`, and declares how that contribution combines with
//! the running accumulator. Providers are applied in registration order;
//! `Subtract` and `Multiply` make that order observable.

mod basic;
mod gradient;
mod noise_layers;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use basic::{ConstantProvider, LinearRampProvider, RampAxis};
pub use gradient::{GradientParams, GradientProvider};
pub use noise_layers::{
    DirectionalWarp, FbmParams, FbmProvider, PerlinLayerParams, PerlinLayerProvider,
    RidgedParams, RidgedProvider,
};

/// How a provider's contribution combines with the accumulated height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Add,
    Subtract,
    Multiply,
}

impl BlendMode {
    #[inline]
    pub fn apply(self, accumulator: f32, contribution: f32) -> f32 {
        match self {
            BlendMode::Add => accumulator + contribution,
            BlendMode::Subtract => accumulator - contribution,
            BlendMode::Multiply => accumulator * contribution,
        }
    }
}

/// Stable discriminant for provider implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Constant,
    LinearRamp,
    Gradient,
    PerlinLayer,
    Fbm,
    Ridged,
    /// Caller-defined provider outside this crate.
    Custom(&'static str),
}

/// A stateless-per-call height layer.
pub trait TopographyProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn blend(&self) -> BlendMode;

    /// Raw contribution at normalized coordinates `(u, v)`.
    fn contribution(&self, u: f32, v: f32) -> f32;
}

/// Fold every provider over a zero accumulator in order.
#[inline]
pub fn accumulate(providers: &[Arc<dyn TopographyProvider>], u: f32, v: f32) -> f32 {
    providers.iter().fold(0.0, |height, provider| {
        provider.blend().apply(height, provider.contribution(u, v))
    })
}
