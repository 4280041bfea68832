//! Sinks the grid border so the terrain fades out at its edges.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus, require_finite};
use crate::cancel::Cancelled;
use crate::heightfield::Heightfield;

/// Parameters for [`EdgeFalloff`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeFalloffParams {
    /// World units between adjacent cells.
    pub cell_spacing: f32,
    /// World distance from the edge at which heights reach full strength.
    pub width: f32,
    /// Falloff exponent; values below `0.1` are raised to `0.1`.
    pub smoothness: f32,
}

impl Default for EdgeFalloffParams {
    fn default() -> Self {
        Self {
            cell_spacing: 1.0,
            width: 16.0,
            smoothness: 1.0,
        }
    }
}

/// Multiplies each cell by `saturate(edge_distance * spacing / width) ^ smoothness`.
#[derive(Clone, Debug, Default)]
pub struct EdgeFalloff {
    params: EdgeFalloffParams,
}

impl EdgeFalloff {
    pub fn new(params: EdgeFalloffParams) -> Self {
        Self { params }
    }
}

impl PostProcessor for EdgeFalloff {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::EdgeFalloff
    }

    fn name(&self) -> &str {
        "edge_falloff"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        let p = &self.params;
        require_finite("cell_spacing", p.cell_spacing)?;
        require_finite("smoothness", p.smoothness)?;
        if !(p.width.is_finite() && p.width > 0.0) {
            return Err(StageError::InvalidParameter {
                name: "width",
                reason: format!("must be positive, got {}", p.width),
            });
        }

        let width = field.width();
        let height = field.height();
        if width == 0 {
            return Ok(StageStatus::Completed);
        }
        let exponent = p.smoothness.max(0.1);
        let scale = p.cell_spacing / p.width;

        let outcome = field
            .as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .try_for_each(|(y, row)| {
                ctx.cancel.check()?;
                let dist_y = y.min(height - 1 - y);
                for (x, h) in row.iter_mut().enumerate() {
                    let edge = dist_y.min(x.min(width - 1 - x));
                    let t = (edge as f32 * scale).clamp(0.0, 1.0).powf(exponent);
                    *h *= t;
                }
                Ok::<(), Cancelled>(())
            });

        Ok(match outcome {
            Ok(()) => StageStatus::Completed,
            Err(Cancelled) => StageStatus::Cancelled,
        })
    }
}
