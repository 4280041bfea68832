//! Noise-driven layers: single Perlin, multi-octave fBm and ridged mountains.

use glam::Vec2;
use noise::{NoiseFn, Perlin, Simplex};
use serde::{Deserialize, Serialize};

use super::{BlendMode, ProviderKind, TopographyProvider};

/// Perlin noise remapped from `[-1, 1]` to `[0, 1]`.
#[inline]
fn perlin01(noise: &Perlin, x: f32, y: f32) -> f32 {
    let n = noise.get([f64::from(x), f64::from(y)]) as f32;
    (n * 0.5 + 0.5).clamp(0.0, 1.0)
}

/// Parameters for [`PerlinLayerProvider`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlinLayerParams {
    pub seed: u32,
    /// Noise cycles across the full grid. Higher values give smaller details.
    pub frequency: f32,
    /// Vertical strength of the layer.
    pub amplitude: f32,
    /// Shifts the sampling window in noise space.
    pub offset: (f32, f32),
    pub blend: BlendMode,
}

impl Default for PerlinLayerParams {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: 100.0,
            amplitude: 100.0,
            offset: (0.0, 0.0),
            blend: BlendMode::Add,
        }
    }
}

/// A single octave of Perlin noise scaled by an amplitude.
pub struct PerlinLayerProvider {
    noise: Perlin,
    params: PerlinLayerParams,
}

impl PerlinLayerProvider {
    pub fn new(params: PerlinLayerParams) -> Self {
        Self {
            noise: Perlin::new(params.seed),
            params,
        }
    }
}

impl TopographyProvider for PerlinLayerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PerlinLayer
    }

    fn blend(&self) -> BlendMode {
        self.params.blend
    }

    fn contribution(&self, u: f32, v: f32) -> f32 {
        let x = u * self.params.frequency + self.params.offset.0;
        let y = v * self.params.frequency + self.params.offset.1;
        perlin01(&self.noise, x, y) * self.params.amplitude
    }
}

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbmParams {
    pub seed: u32,
    /// Number of noise octaves to composite. Typical range: 4-8.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves. Default: 2.0.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves. Default: 0.5.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles across the grid.
    pub base_frequency: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
    pub blend: BlendMode,
}

impl Default for FbmParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 4.0,
            amplitude: 1.0,
            blend: BlendMode::Add,
        }
    }
}

/// Fractal Brownian motion over simplex noise.
///
/// Each successive octave multiplies frequency by `lacunarity` and
/// amplitude by `persistence`, producing self-similar detail at
/// progressively finer scales.
pub struct FbmProvider {
    noise: Simplex,
    params: FbmParams,
}

impl FbmProvider {
    pub fn new(params: FbmParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Sample at normalized coordinates in `f64`.
    pub fn sample(&self, u: f64, v: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([u * frequency, v * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// Theoretical maximum absolute output (geometric series sum).
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp.abs();
            amp *= self.params.persistence;
        }
        sum
    }

    pub fn params(&self) -> &FbmParams {
        &self.params
    }
}

impl TopographyProvider for FbmProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fbm
    }

    fn blend(&self) -> BlendMode {
        self.params.blend
    }

    fn contribution(&self, u: f32, v: f32) -> f32 {
        self.sample(f64::from(u), f64::from(v)) as f32
    }
}

/// Large-scale warp applied along a prevailing direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionalWarp {
    pub strength: f32,
    pub angle_degrees: f32,
    pub frequency: f32,
}

/// Parameters for [`RidgedProvider`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgedParams {
    pub seed: u32,
    /// World units spanned by the grid; `(u, v)` are scaled by this first.
    pub extent: f32,
    /// Noise frequency in world units.
    pub scale: f32,
    /// Weight of the high-frequency detail octave.
    pub roughness: f32,
    /// Exponent sharpening ridge crests.
    pub ridge: f32,
    /// Constant added after shaping.
    pub offset: f32,
    /// Final height multiplier.
    pub amplitude: f32,
    /// Relative frequency of the mountain mask, if masking is enabled.
    pub mask_scale: Option<f32>,
    /// Terrace steps per unit height, if terracing is enabled.
    pub terrace_steps: Option<f32>,
    pub directional_warp: Option<DirectionalWarp>,
    pub blend: BlendMode,
}

impl Default for RidgedParams {
    fn default() -> Self {
        Self {
            seed: 0,
            extent: 1024.0,
            scale: 0.004,
            roughness: 0.1,
            ridge: 1.5,
            offset: 0.0,
            amplitude: 1.0,
            mask_scale: None,
            terrace_steps: None,
            directional_warp: None,
            blend: BlendMode::Add,
        }
    }
}

const BASE_WARP_FREQUENCY: f32 = 0.002;
const BASE_WARP_STRENGTH: f32 = 15.0;
const DETAIL_FREQUENCY: f32 = 3.5;
const HEIGHT_SCALE: f32 = 0.3;

/// Domain-warped ridged noise with optional mask and terracing.
pub struct RidgedProvider {
    noise: Perlin,
    params: RidgedParams,
}

impl RidgedProvider {
    pub fn new(params: RidgedParams) -> Self {
        Self {
            noise: Perlin::new(params.seed),
            params,
        }
    }

    pub fn params(&self) -> &RidgedParams {
        &self.params
    }

    fn warp(&self, p: Vec2) -> Vec2 {
        let n = &self.noise;
        let mut warped = Vec2::new(
            p.x + perlin01(n, p.x * BASE_WARP_FREQUENCY, p.y * BASE_WARP_FREQUENCY)
                * BASE_WARP_STRENGTH,
            p.y + perlin01(n, p.y * BASE_WARP_FREQUENCY, p.x * BASE_WARP_FREQUENCY)
                * BASE_WARP_STRENGTH,
        );

        if let Some(dw) = &self.params.directional_warp
            && dw.strength > 0.0
        {
            let angle = dw.angle_degrees.to_radians();
            let dir = Vec2::new(angle.cos(), angle.sin());
            let orth = dir.perp();
            let freq = dw.frequency.max(1e-4);
            let a = perlin01(n, p.x * freq, p.y * freq);
            let b = perlin01(n, (p.x + 123.45) * freq, (p.y - 987.65) * freq);
            warped += (orth * a + dir * b * 0.5) * dw.strength;
        }

        warped
    }
}

impl TopographyProvider for RidgedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ridged
    }

    fn blend(&self) -> BlendMode {
        self.params.blend
    }

    fn contribution(&self, u: f32, v: f32) -> f32 {
        let p = self.params();
        let w = self.warp(Vec2::new(u, v) * p.extent) * p.scale;

        let mut value = perlin01(&self.noise, w.x, w.y);
        value = (1.0 - (value * 2.0 - 1.0).abs()).powf(p.ridge);
        value += perlin01(&self.noise, w.x * DETAIL_FREQUENCY, w.y * DETAIL_FREQUENCY)
            * p.roughness;

        if let Some(mask_scale) = p.mask_scale {
            let m = perlin01(&self.noise, w.x * mask_scale, w.y * mask_scale);
            value *= (m * 1.5 - 0.2).clamp(0.0, 1.0);
        }

        let mut height = value * HEIGHT_SCALE + p.offset;
        if let Some(steps) = p.terrace_steps
            && steps > 0.0
        {
            height = (height * steps).round() / steps;
        }

        height * p.amplitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_perlin_layer_is_deterministic() {
        let params = PerlinLayerParams {
            seed: 42,
            frequency: 8.0,
            ..Default::default()
        };
        let a = PerlinLayerProvider::new(params.clone());
        let b = PerlinLayerProvider::new(params);
        let h1 = a.contribution(0.31, 0.72);
        let h2 = b.contribution(0.31, 0.72);
        assert!(
            (h1 - h2).abs() < EPSILON,
            "Same seed + same coord must produce identical height: {h1} vs {h2}"
        );
    }

    #[test]
    fn test_perlin_layer_within_amplitude() {
        let provider = PerlinLayerProvider::new(PerlinLayerParams {
            frequency: 13.0,
            amplitude: 5.0,
            ..Default::default()
        });
        for i in 0..50 {
            for j in 0..50 {
                let h = provider.contribution(i as f32 / 49.0, j as f32 / 49.0);
                assert!(
                    (0.0..=5.0).contains(&h),
                    "Perlin layer {h} outside [0, amplitude]"
                );
            }
        }
    }

    #[test]
    fn test_fbm_within_max_amplitude() {
        let provider = FbmProvider::new(FbmParams {
            seed: 3,
            ..Default::default()
        });
        let max_amp = provider.max_amplitude();
        for i in 0..40 {
            for j in 0..40 {
                let h = provider.sample(i as f64 / 39.0, j as f64 / 39.0);
                assert!(
                    h.abs() <= max_amp + 1e-9,
                    "Height {h} exceeds max amplitude {max_amp}"
                );
            }
        }
    }

    #[test]
    fn test_fbm_different_seeds_differ() {
        let a = FbmProvider::new(FbmParams {
            seed: 1,
            ..Default::default()
        });
        let b = FbmProvider::new(FbmParams {
            seed: 999,
            ..Default::default()
        });
        let differs = (0..20).any(|i| {
            let u = 0.05 * i as f64 + 0.013;
            (a.sample(u, 0.37) - b.sample(u, 0.37)).abs() > 1e-9
        });
        assert!(differs, "Different seeds should produce different heights");
    }

    #[test]
    fn test_ridged_terrace_quantizes() {
        let provider = RidgedProvider::new(RidgedParams {
            terrace_steps: Some(4.0),
            ..Default::default()
        });
        for i in 0..30 {
            let h = provider.contribution(i as f32 / 29.0, 0.5);
            let scaled = h * 4.0;
            assert!(
                (scaled - scaled.round()).abs() < 1e-4,
                "Terraced height {h} is not a multiple of 1/4"
            );
        }
    }

    #[test]
    fn test_ridged_mask_never_increases_height() {
        let plain = RidgedProvider::new(RidgedParams::default());
        let masked = RidgedProvider::new(RidgedParams {
            mask_scale: Some(0.5),
            ..Default::default()
        });
        for i in 0..30 {
            let u = i as f32 / 29.0;
            assert!(
                masked.contribution(u, 0.25) <= plain.contribution(u, 0.25) + EPSILON,
                "Mask must only attenuate"
            );
        }
    }
}
