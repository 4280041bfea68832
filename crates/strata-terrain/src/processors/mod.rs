//! Whole-field post-processors.
//!
//! Stages run strictly in registration order over the complete global
//! heightfield, because each one reads neighbor cells that may belong to any
//! patch. A stage that observes cancellation returns
//! [`StageStatus::Cancelled`] and leaves the field in an unspecified but
//! valid state; the generator discards it.

mod beach;
mod blur;
mod curvature;
mod falloff;
mod hydraulic;
mod normalize;
mod thermal;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::cancel::CancelToken;
use crate::heightfield::Heightfield;

pub use beach::{BeachParams, BeachProcessor};
pub use blur::{GaussianBlur, MAX_BLUR_RADIUS, gaussian_kernel};
pub use curvature::{CurvatureParams, CurvatureRelaxation};
pub use falloff::{EdgeFalloff, EdgeFalloffParams};
pub use hydraulic::{HydraulicErosion, HydraulicParams};
pub use normalize::{CurveKey, NormalizeParams, NormalizeProcessor, Remap};
pub use thermal::{ThermalErosion, ThermalMode};

/// Stable discriminant for processor implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    HydraulicErosion,
    ThermalErosion,
    CurvatureRelaxation,
    GaussianBlur,
    Beach,
    Normalize,
    EdgeFalloff,
    /// Caller-defined processor outside this crate.
    Custom(&'static str),
}

/// How a stage finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Cancelled,
}

/// Errors a stage can report instead of completing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("expected a {expected_width}x{expected_height} field, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },
}

/// Per-build state shared with every stage.
#[derive(Clone, Debug, Default)]
pub struct StageContext {
    pub cancel: CancelToken,
    /// Build-wide seed mixed into every stage's own seed.
    pub seed: u64,
}

impl StageContext {
    pub fn new(cancel: CancelToken, seed: u64) -> Self {
        Self { cancel, seed }
    }

    /// Derive a deterministic RNG for one particle of a stage.
    ///
    /// The same `(build seed, stage seed, index)` triple always yields the
    /// same sequence, independent of which worker runs the particle.
    pub fn particle_rng(&self, stage_seed: u64, index: u64) -> ChaCha8Rng {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        stage_seed.hash(&mut hasher);
        index.hash(&mut hasher);
        ChaCha8Rng::seed_from_u64(hasher.finish())
    }
}

/// A stage that rewrites the global heightfield in place.
pub trait PostProcessor: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    /// Human-readable stage name used in logs and errors.
    fn name(&self) -> &str;

    fn apply(&self, field: &mut Heightfield, ctx: &StageContext)
    -> Result<StageStatus, StageError>;
}

/// Fail with [`StageError::InvalidParameter`] unless `value` is finite.
pub(crate) fn require_finite(name: &'static str, value: f32) -> Result<(), StageError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StageError::InvalidParameter {
            name,
            reason: format!("must be finite, got {value}"),
        })
    }
}

/// Number of particles simulated between cancellation checks.
pub(crate) const PARTICLE_BATCH: usize = 1024;

#[cfg(test)]
pub(crate) mod test_util {
    use crate::heightfield::Heightfield;

    /// Flat field with a square bump of `amount` centered in the grid.
    pub fn bump(size: usize, amount: f32) -> Heightfield {
        let c = size / 2;
        Heightfield::from_fn(size, size, |x, y| {
            if x.abs_diff(c) <= 1 && y.abs_diff(c) <= 1 {
                amount
            } else {
                0.0
            }
        })
    }

    /// Field whose left half is 0 and right half is 1.
    pub fn step(size: usize) -> Heightfield {
        Heightfield::from_fn(size, size, |x, _| if x < size / 2 { 0.0 } else { 1.0 })
    }
}
