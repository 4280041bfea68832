//! Shoreline shaping driven by the coastline distance field.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus, require_finite};
use crate::coastline::CoastlineField;
use crate::heightfield::Heightfield;

/// Parameters for [`BeachProcessor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeachParams {
    pub sea_level: f32,
    /// Steepness of the underwater profile; higher values deepen faster.
    pub sediment_stiffness: f32,
    /// Distance in cells over which land slopes down to sea level.
    pub shore_width: f32,
    /// How far underwater cells move toward the profile, in `[0, 1]`.
    pub underwater_blend: f32,
}

impl Default for BeachParams {
    fn default() -> Self {
        Self {
            sea_level: 0.0,
            sediment_stiffness: 0.2,
            shore_width: 50.0,
            underwater_blend: 0.8,
        }
    }
}

/// Equilibrium beach depth at `distance` cells from the shoreline.
#[inline]
fn profile_depth(stiffness: f32, distance: f32) -> f32 {
    stiffness * distance.powf(2.0 / 3.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Blends underwater cells toward an equilibrium depth profile and eases
/// land near the shore down to sea level.
#[derive(Clone, Debug, Default)]
pub struct BeachProcessor {
    params: BeachParams,
}

impl BeachProcessor {
    pub fn new(params: BeachParams) -> Self {
        Self { params }
    }

    fn validate(&self) -> Result<(), StageError> {
        let p = &self.params;
        require_finite("sea_level", p.sea_level)?;
        require_finite("sediment_stiffness", p.sediment_stiffness)?;
        require_finite("underwater_blend", p.underwater_blend)?;
        if !(p.shore_width.is_finite() && p.shore_width > 0.0) {
            return Err(StageError::InvalidParameter {
                name: "shore_width",
                reason: format!("must be positive, got {}", p.shore_width),
            });
        }
        Ok(())
    }
}

impl PostProcessor for BeachProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Beach
    }

    fn name(&self) -> &str {
        "beach"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        self.validate()?;
        if ctx.cancel.is_cancelled() {
            return Ok(StageStatus::Cancelled);
        }

        let coast = CoastlineField::compute(field, self.params.sea_level);
        if ctx.cancel.is_cancelled() {
            return Ok(StageStatus::Cancelled);
        }

        let p = &self.params;
        field
            .as_mut_slice()
            .par_iter_mut()
            .zip(coast.as_slice().par_iter())
            .for_each(|(h, &distance)| {
                if !distance.is_finite() {
                    return;
                }
                if *h <= p.sea_level {
                    let target = p.sea_level - profile_depth(p.sediment_stiffness, distance);
                    *h = lerp(*h, target, p.underwater_blend);
                } else if distance <= p.shore_width {
                    *h = lerp(p.sea_level, *h, distance / p.shore_width);
                }
            });

        Ok(StageStatus::Completed)
    }
}
