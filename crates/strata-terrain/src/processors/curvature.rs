//! Curvature relaxation: ridges are pulled down and valleys filled toward
//! the local 4-neighbor average.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus, require_finite};
use crate::cancel::Cancelled;
use crate::heightfield::Heightfield;

/// Parameters for [`CurvatureRelaxation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvatureParams {
    /// Fraction of the excess removed from cells above their neighbors.
    pub ridge_gain: f32,
    /// Fraction of the deficit filled in cells below their neighbors.
    pub valley_relax: f32,
    pub iterations: u32,
    /// Largest change applied to one cell per pass.
    pub max_step: f32,
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self {
            ridge_gain: 0.35,
            valley_relax: 0.2,
            iterations: 1,
            max_step: 0.05,
        }
    }
}

/// Double-buffered ridge/valley diffusion. Border cells are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct CurvatureRelaxation {
    params: CurvatureParams,
}

impl CurvatureRelaxation {
    pub fn new(params: CurvatureParams) -> Self {
        Self { params }
    }

    fn pass(
        &self,
        src: &[f32],
        dst: &mut [f32],
        width: usize,
        ctx: &StageContext,
    ) -> Result<(), Cancelled> {
        let height = src.len() / width;
        let ridge = self.params.ridge_gain.max(0.0);
        let valley = self.params.valley_relax.max(0.0);
        let max_step = self.params.max_step;

        dst.par_chunks_mut(width).enumerate().try_for_each(|(y, row)| {
            ctx.cancel.check()?;
            let offset = y * width;
            if y == 0 || y == height - 1 {
                row.copy_from_slice(&src[offset..offset + width]);
                return Ok(());
            }
            row[0] = src[offset];
            row[width - 1] = src[offset + width - 1];
            for x in 1..width - 1 {
                let idx = offset + x;
                let h = src[idx];
                let avg =
                    (src[idx - 1] + src[idx + 1] + src[idx - width] + src[idx + width]) * 0.25;
                let diff = h - avg;
                let gain = if diff > 0.0 { ridge } else { valley };
                let delta = (diff * gain).clamp(-max_step, max_step);
                row[x] = h - delta;
            }
            Ok::<(), Cancelled>(())
        })
    }
}

impl PostProcessor for CurvatureRelaxation {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CurvatureRelaxation
    }

    fn name(&self) -> &str {
        "curvature_relaxation"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        require_finite("ridge_gain", self.params.ridge_gain)?;
        require_finite("valley_relax", self.params.valley_relax)?;
        if self.params.max_step.is_nan() || self.params.max_step < 0.0 {
            return Err(StageError::InvalidParameter {
                name: "max_step",
                reason: format!("must be non-negative, got {}", self.params.max_step),
            });
        }
        let width = field.width();
        if width < 3 || field.height() < 3 || self.params.iterations == 0 {
            return Ok(StageStatus::Completed);
        }

        let mut scratch = vec![0.0; field.len()];
        let mut result_in_scratch = false;

        for _ in 0..self.params.iterations {
            let outcome = if result_in_scratch {
                self.pass(&scratch, field.as_mut_slice(), width, ctx)
            } else {
                self.pass(field.as_slice(), &mut scratch, width, ctx)
            };
            if outcome.is_err() {
                return Ok(StageStatus::Cancelled);
            }
            result_in_scratch = !result_in_scratch;
        }

        if result_in_scratch {
            field.as_mut_slice().copy_from_slice(&scratch);
        }
        Ok(StageStatus::Completed)
    }
}
