//! Constant and linear ramp layers.

use serde::{Deserialize, Serialize};

use super::{BlendMode, ProviderKind, TopographyProvider};

/// Contributes the same value everywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantProvider {
    pub value: f32,
    #[serde(default)]
    pub blend: BlendMode,
}

impl ConstantProvider {
    pub fn new(value: f32, blend: BlendMode) -> Self {
        Self { value, blend }
    }
}

impl TopographyProvider for ConstantProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Constant
    }

    fn blend(&self) -> BlendMode {
        self.blend
    }

    fn contribution(&self, _u: f32, _v: f32) -> f32 {
        self.value
    }
}

/// Axis a [`LinearRampProvider`] varies along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RampAxis {
    #[default]
    U,
    V,
}

/// Contributes `start + slope * t`, where `t` is `u` or `v`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRampProvider {
    #[serde(default)]
    pub axis: RampAxis,
    #[serde(default)]
    pub start: f32,
    pub slope: f32,
    #[serde(default)]
    pub blend: BlendMode,
}

impl LinearRampProvider {
    /// A ramp from 0 to 1 along `axis`.
    pub fn unit(axis: RampAxis) -> Self {
        Self {
            axis,
            start: 0.0,
            slope: 1.0,
            blend: BlendMode::Add,
        }
    }
}

impl TopographyProvider for LinearRampProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LinearRamp
    }

    fn blend(&self) -> BlendMode {
        self.blend
    }

    fn contribution(&self, u: f32, v: f32) -> f32 {
        let t = match self.axis {
            RampAxis::U => u,
            RampAxis::V => v,
        };
        self.start + self.slope * t
    }
}
