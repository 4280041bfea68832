//! Separable Gaussian blur with clamped edges.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus, require_finite};
use crate::cancel::Cancelled;
use crate::heightfield::Heightfield;

/// Largest accepted kernel half-width.
pub const MAX_BLUR_RADIUS: u32 = 50;

/// Normalized 1D Gaussian kernel of `2 * radius + 1` taps.
///
/// `radius` is clamped to [`MAX_BLUR_RADIUS`]; a non-positive or non-finite
/// `sigma` falls back to `1.0`.
pub fn gaussian_kernel(radius: u32, sigma: f32) -> Vec<f32> {
    let radius = radius.min(MAX_BLUR_RADIUS) as i32;
    let sigma = if sigma.is_finite() && sigma > 0.0 { sigma } else { 1.0 };
    let two_sigma_sq = 2.0 * sigma * sigma;
    let norm = 1.0 / ((2.0 * std::f32::consts::PI).sqrt() * sigma);

    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| norm * (-((i * i) as f32) / two_sigma_sq).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Separable Gaussian blur post-processor.
///
/// `radius` above [`MAX_BLUR_RADIUS`] is clamped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianBlur {
    pub radius: u32,
    pub sigma: f32,
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma: 1.5,
        }
    }
}

impl GaussianBlur {
    pub fn new(radius: u32, sigma: f32) -> Self {
        Self { radius, sigma }
    }
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

impl PostProcessor for GaussianBlur {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::GaussianBlur
    }

    fn name(&self) -> &str {
        "gaussian_blur"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        require_finite("sigma", self.sigma)?;
        let radius = self.radius.min(MAX_BLUR_RADIUS);
        if radius == 0 || field.is_empty() {
            return Ok(StageStatus::Completed);
        }

        let kernel = gaussian_kernel(radius, self.sigma);
        let radius = radius as isize;
        let width = field.width();
        let height = field.height();
        let mut temp = vec![0.0_f32; field.len()];

        let src = field.as_slice();
        let horizontal = temp
            .par_chunks_mut(width)
            .enumerate()
            .try_for_each(|(y, row)| {
                ctx.cancel.check()?;
                let line = &src[y * width..(y + 1) * width];
                for (x, out) in row.iter_mut().enumerate() {
                    *out = kernel
                        .iter()
                        .enumerate()
                        .map(|(k, w)| {
                            w * line[clamp_index(x as isize + k as isize - radius, width)]
                        })
                        .sum();
                }
                Ok::<(), Cancelled>(())
            });
        if horizontal.is_err() {
            return Ok(StageStatus::Cancelled);
        }

        let vertical = field
            .as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .try_for_each(|(y, row)| {
                ctx.cancel.check()?;
                for (x, out) in row.iter_mut().enumerate() {
                    *out = kernel
                        .iter()
                        .enumerate()
                        .map(|(k, w)| {
                            let sy = clamp_index(y as isize + k as isize - radius, height);
                            w * temp[sy * width + x]
                        })
                        .sum();
                }
                Ok::<(), Cancelled>(())
            });

        Ok(match vertical {
            Ok(()) => StageStatus::Completed,
            Err(Cancelled) => StageStatus::Cancelled,
        })
    }
}
