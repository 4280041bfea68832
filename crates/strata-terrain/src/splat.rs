//! Splat weight painting from height and slope.
//!
//! Every sampler owns one layer. Layers are packed four to a texel:
//! `layer_index / 4` selects the splat map and `layer_index % 4` the channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grid::{GridCoordinate, PatchLayout};
use crate::heightfield::Heightfield;

/// Channels packed into one splat texel.
pub const CHANNELS_PER_MAP: usize = 4;

/// Stable discriminant for splat sampler implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplatSamplerKind {
    Altitude,
    Steepness,
    Constant,
    /// Caller-defined sampler outside this crate.
    Custom(&'static str),
}

/// Computes one layer's weight from a cell's height and slope.
pub trait SplatSampler: Send + Sync {
    fn kind(&self) -> SplatSamplerKind;

    fn layer_index(&self) -> usize;

    fn weight(&self, height: f32, inclination_degrees: f32) -> u8;
}

#[inline]
fn to_byte(t: f32) -> u8 {
    (t.clamp(0.0, 1.0) * f32::from(u8::MAX)).round() as u8
}

/// Full weight above `max_altitude`, none below `min_altitude`, smoothstep
/// in between.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSampler {
    pub layer_index: usize,
    pub min_altitude: f32,
    pub max_altitude: f32,
}

impl Default for AltitudeSampler {
    fn default() -> Self {
        Self {
            layer_index: 2,
            min_altitude: 50.0,
            max_altitude: 250.0,
        }
    }
}

impl SplatSampler for AltitudeSampler {
    fn kind(&self) -> SplatSamplerKind {
        SplatSamplerKind::Altitude
    }

    fn layer_index(&self) -> usize {
        self.layer_index
    }

    fn weight(&self, height: f32, _inclination_degrees: f32) -> u8 {
        let span = self.max_altitude - self.min_altitude;
        if span <= 0.0 {
            return if height >= self.max_altitude { u8::MAX } else { 0 };
        }
        let t = ((height - self.min_altitude) / span).clamp(0.0, 1.0);
        to_byte(t * t * (3.0 - 2.0 * t))
    }
}

/// Weight rising linearly from `min_slope` to `max_slope` degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteepnessSampler {
    pub layer_index: usize,
    pub min_slope: f32,
    pub max_slope: f32,
}

impl Default for SteepnessSampler {
    fn default() -> Self {
        Self {
            layer_index: 1,
            min_slope: 45.0,
            max_slope: 60.0,
        }
    }
}

impl SplatSampler for SteepnessSampler {
    fn kind(&self) -> SplatSamplerKind {
        SplatSamplerKind::Steepness
    }

    fn layer_index(&self) -> usize {
        self.layer_index
    }

    fn weight(&self, _height: f32, inclination_degrees: f32) -> u8 {
        let span = self.max_slope - self.min_slope;
        if span <= 0.0 {
            return if inclination_degrees >= self.max_slope { u8::MAX } else { 0 };
        }
        to_byte((inclination_degrees - self.min_slope) / span)
    }
}

/// The same weight everywhere, typically a base layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantWeightSampler {
    pub layer_index: usize,
    pub weight: u8,
}

impl SplatSampler for ConstantWeightSampler {
    fn kind(&self) -> SplatSamplerKind {
        SplatSamplerKind::Constant
    }

    fn layer_index(&self) -> usize {
        self.layer_index
    }

    fn weight(&self, _height: f32, _inclination_degrees: f32) -> u8 {
        self.weight
    }
}

/// Local slope in degrees from central differences, one-sided at borders.
pub fn inclination_degrees(field: &Heightfield, x: usize, y: usize, cell_spacing: f32) -> f32 {
    let x0 = x.saturating_sub(1);
    let x1 = (x + 1).min(field.width() - 1);
    let y0 = y.saturating_sub(1);
    let y1 = (y + 1).min(field.height() - 1);

    let slope = |a: f32, b: f32, cells: usize| {
        if cells == 0 {
            0.0
        } else {
            (b - a) / (cells as f32 * cell_spacing)
        }
    };
    let dx = slope(field.get(x0, y), field.get(x1, y), x1 - x0);
    let dy = slope(field.get(x, y0), field.get(x, y1), y1 - y0);
    dx.hypot(dy).atan().to_degrees()
}

/// Packed weights for one patch and one group of four layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplatMap {
    /// `layer_index / 4` of every layer in this map.
    pub group: usize,
    /// Row-major texels, `patch_size * patch_size` long.
    pub texels: Vec<[u8; CHANNELS_PER_MAP]>,
}

/// Paint every sampler's weight for the patch at `coord`.
///
/// Returns one [`SplatMap`] per distinct layer group, ordered by group.
/// Samplers sharing a layer are applied in order; the last one wins.
/// Returns `None` if `coord` is outside `layout`.
pub fn paint_patch(
    field: &Heightfield,
    layout: &PatchLayout,
    coord: GridCoordinate,
    samplers: &[Arc<dyn SplatSampler>],
    cell_spacing: f32,
) -> Option<Vec<SplatMap>> {
    let (ox, oy) = layout.cell_offset(coord)?;
    let size = layout.patch_size();
    let groups: BTreeSet<usize> = samplers
        .iter()
        .map(|s| s.layer_index() / CHANNELS_PER_MAP)
        .collect();

    let mut maps: Vec<SplatMap> = groups
        .iter()
        .map(|&group| SplatMap {
            group,
            texels: vec![[0; CHANNELS_PER_MAP]; size * size],
        })
        .collect();

    for j in 0..size {
        for i in 0..size {
            let (gx, gy) = (ox + i, oy + j);
            let height = field.get(gx, gy);
            let inclination = inclination_degrees(field, gx, gy, cell_spacing);
            for sampler in samplers {
                let layer = sampler.layer_index();
                let slot = groups
                    .iter()
                    .position(|&g| g == layer / CHANNELS_PER_MAP)
                    .unwrap_or_default();
                maps[slot].texels[j * size + i][layer % CHANNELS_PER_MAP] =
                    sampler.weight(height, inclination);
            }
        }
    }

    Some(maps)
}
