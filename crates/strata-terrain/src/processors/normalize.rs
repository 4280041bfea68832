//! Remap the whole field into a target range.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus, require_finite};
use crate::heightfield::Heightfield;

/// One control point of a [`Remap::Curve`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub input: f32,
    pub output: f32,
}

/// Shaping applied to the normalized `[0, 1]` value before it is mapped
/// into the output range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Remap {
    #[default]
    Linear,
    Power(f32),
    /// Piecewise-linear curve, clamped to the first and last key.
    Curve(Vec<CurveKey>),
}

impl Remap {
    /// Evaluate for `t` in `[0, 1]`. `keys` of a curve must be sorted.
    fn evaluate(&self, t: f32) -> f32 {
        match self {
            Remap::Linear => t,
            Remap::Power(exponent) => t.powf(*exponent),
            Remap::Curve(keys) => evaluate_curve(keys, t),
        }
    }
}

fn evaluate_curve(keys: &[CurveKey], t: f32) -> f32 {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return t;
    };
    if t <= first.input {
        return first.output;
    }
    if t >= last.input {
        return last.output;
    }
    let upper = keys.partition_point(|k| k.input <= t);
    let a = keys[upper - 1];
    let b = keys[upper];
    let span = b.input - a.input;
    if span <= 0.0 {
        return b.output;
    }
    a.output + (b.output - a.output) * ((t - a.input) / span)
}

/// Parameters for [`NormalizeProcessor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub out_min: f32,
    pub out_max: f32,
    pub remap: Remap,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            out_min: -1.0,
            out_max: 1.0,
            remap: Remap::Linear,
        }
    }
}

/// Rescales heights from their observed range into `[out_min, out_max]`.
///
/// A flat field maps every cell to `out_min`.
#[derive(Clone, Debug, Default)]
pub struct NormalizeProcessor {
    params: NormalizeParams,
}

impl NormalizeProcessor {
    pub fn new(mut params: NormalizeParams) -> Self {
        if let Remap::Curve(keys) = &mut params.remap {
            keys.sort_by(|a, b| a.input.total_cmp(&b.input));
        }
        Self { params }
    }
}

impl PostProcessor for NormalizeProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Normalize
    }

    fn name(&self) -> &str {
        "normalize"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        let p = &self.params;
        require_finite("out_min", p.out_min)?;
        require_finite("out_max", p.out_max)?;
        if let Remap::Power(exponent) = p.remap
            && !(exponent.is_finite() && exponent > 0.0)
        {
            return Err(StageError::InvalidParameter {
                name: "exponent",
                reason: format!("must be positive, got {exponent}"),
            });
        }
        if ctx.cancel.is_cancelled() {
            return Ok(StageStatus::Cancelled);
        }

        let (min, max) = field
            .as_slice()
            .par_iter()
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &h| (lo.min(h), hi.max(h)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(a, b), (c, d)| (a.min(c), b.max(d)),
            );
        let range = max - min;

        field.as_mut_slice().par_iter_mut().for_each(|h| {
            let t = if range > 0.0 { (*h - min) / range } else { 0.0 };
            let shaped = p.remap.evaluate(t.clamp(0.0, 1.0));
            *h = p.out_min + (p.out_max - p.out_min) * shaped;
        });

        Ok(StageStatus::Completed)
    }
}
