//! Thermal erosion: material slumps from slopes steeper than a threshold.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    PARTICLE_BATCH, PostProcessor, ProcessorKind, StageContext, StageError, StageStatus,
    require_finite,
};
use crate::cancel::Cancelled;
use crate::heightfield::{AtomicHeightfield, Heightfield};

/// Which thermal erosion variant to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ThermalMode {
    /// Deterministic sweeps over every interior cell.
    Relaxation {
        iterations: u32,
        /// Height difference below which nothing moves.
        threshold: f32,
        strength: f32,
        /// Upper bound on material moved per neighbor pair per sweep.
        max_step: f32,
    },
    /// Randomly sampled cells, simulated concurrently.
    Particle {
        iterations: usize,
        talus_angle_degrees: f32,
        strength: f32,
        seed: u64,
    },
}

impl ThermalMode {
    pub fn relaxation() -> Self {
        ThermalMode::Relaxation {
            iterations: 2,
            threshold: 0.0005,
            strength: 0.3,
            max_step: 1.0,
        }
    }

    pub fn particle() -> Self {
        ThermalMode::Particle {
            iterations: 250_000,
            talus_angle_degrees: 45.0,
            strength: 0.5,
            seed: 12345,
        }
    }
}

impl Default for ThermalMode {
    fn default() -> Self {
        Self::relaxation()
    }
}

/// Thermal erosion post-processor.
#[derive(Clone, Debug, Default)]
pub struct ThermalErosion {
    mode: ThermalMode,
}

impl ThermalErosion {
    pub fn new(mode: ThermalMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &ThermalMode {
        &self.mode
    }
}

fn relax(
    field: &mut Heightfield,
    ctx: &StageContext,
    iterations: u32,
    threshold: f32,
    strength: f32,
    max_step: f32,
) -> Result<(), Cancelled> {
    let width = field.width();
    let height = field.height();
    let cells = field.as_mut_slice();

    for _ in 0..iterations {
        for y in 1..height - 1 {
            ctx.cancel.check()?;
            for x in 1..width - 1 {
                let idx = y * width + x;
                for n in [idx + 1, idx - 1, idx + width, idx - width] {
                    let diff = cells[idx] - cells[n];
                    if diff > threshold {
                        let amount = ((diff - threshold) * strength)
                            .min(diff * 0.5)
                            .min(max_step);
                        cells[idx] -= amount;
                        cells[n] += amount;
                    }
                }
            }
        }
    }
    Ok(())
}

fn slump_particle(
    field: &AtomicHeightfield,
    ctx: &StageContext,
    seed: u64,
    index: u64,
    talus: f32,
    strength: f32,
) {
    let mut rng = ctx.particle_rng(seed, index);
    let width = field.width();
    let x = rng.random_range(1..width - 1);
    let y = rng.random_range(1..field.height() - 1);
    let idx = field.index(x, y);
    let h = field.load(idx);

    let mut max_diff = 0.0;
    let mut lowest = None;
    for n in [idx + 1, idx - 1, idx + width, idx - width] {
        let diff = h - field.load(n);
        if diff > max_diff {
            max_diff = diff;
            lowest = Some(n);
        }
    }

    if let Some(n) = lowest
        && max_diff > talus
    {
        let amount = ((max_diff - talus) * strength).min(max_diff * 0.5);
        field.add(idx, -amount);
        field.add(n, amount);
    }
}

impl PostProcessor for ThermalErosion {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ThermalErosion
    }

    fn name(&self) -> &str {
        "thermal_erosion"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        if field.width() < 3 || field.height() < 3 {
            return Ok(StageStatus::Completed);
        }

        let outcome = match self.mode {
            ThermalMode::Relaxation {
                iterations,
                threshold,
                strength,
                max_step,
            } => {
                require_finite("threshold", threshold)?;
                require_finite("strength", strength)?;
                if max_step.is_nan() || max_step < 0.0 {
                    return Err(StageError::InvalidParameter {
                        name: "max_step",
                        reason: format!("must be non-negative, got {max_step}"),
                    });
                }
                relax(field, ctx, iterations, threshold, strength, max_step)
            }
            ThermalMode::Particle {
                iterations,
                talus_angle_degrees,
                strength,
                seed,
            } => {
                require_finite("strength", strength)?;
                if !(0.0..90.0).contains(&talus_angle_degrees) {
                    return Err(StageError::InvalidParameter {
                        name: "talus_angle_degrees",
                        reason: format!("must be within [0, 90), got {talus_angle_degrees}"),
                    });
                }
                let talus = talus_angle_degrees.to_radians().tan();
                let atomic = AtomicHeightfield::from_heightfield(field);
                let batches = iterations.div_ceil(PARTICLE_BATCH);

                let outcome = (0..batches).into_par_iter().try_for_each(|batch| {
                    ctx.cancel.check()?;
                    let start = batch * PARTICLE_BATCH;
                    let end = (start + PARTICLE_BATCH).min(iterations);
                    for index in start..end {
                        slump_particle(&atomic, ctx, seed, index as u64, talus, strength);
                    }
                    Ok::<(), Cancelled>(())
                });
                if outcome.is_ok() {
                    atomic.write_back(field);
                }
                outcome
            }
        };

        Ok(match outcome {
            Ok(()) => StageStatus::Completed,
            Err(Cancelled) => StageStatus::Cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::processors::test_util::bump;

    fn spike(size: usize, peak: f32) -> Heightfield {
        let c = size / 2;
        Heightfield::from_fn(size, size, |x, y| if x == c && y == c { peak } else { 0.0 })
    }

    #[test]
    fn test_relaxation_lowers_peak_and_conserves_mass() {
        let mut field = spike(9, 1.0);
        let before = field.sum();

        let status = ThermalErosion::new(ThermalMode::relaxation())
            .apply(&mut field, &StageContext::default())
            .unwrap();

        assert_eq!(status, StageStatus::Completed);
        assert!(field.get(4, 4) < 1.0, "Peak must lose material");
        assert!(field.get(5, 4) > 0.0, "Neighbor must gain material");
        assert!(
            (field.sum() - before).abs() < 1e-5,
            "Relaxation moves material without creating it"
        );
    }

    #[test]
    fn test_relaxation_ignores_gentle_slopes() {
        let mut field = Heightfield::from_fn(8, 8, |x, _| x as f32 * 1e-5);
        let original = field.clone();
        ThermalErosion::new(ThermalMode::relaxation())
            .apply(&mut field, &StageContext::default())
            .unwrap();
        assert_eq!(field, original, "Slopes under the threshold must not move");
    }

    #[test]
    fn test_particle_mode_conserves_mass() {
        let mut field = bump(33, 5.0);
        let before = field.sum();
        let mode = ThermalMode::Particle {
            iterations: 20_000,
            talus_angle_degrees: 30.0,
            strength: 0.5,
            seed: 9,
        };

        let status = ThermalErosion::new(mode)
            .apply(&mut field, &StageContext::default())
            .unwrap();

        assert_eq!(status, StageStatus::Completed);
        assert!(
            (field.sum() - before).abs() < 1e-3,
            "Particle slumping must conserve mass: before={before}, after={}",
            field.sum()
        );
        assert!(field.get(17, 16) < 5.0, "Steep bump edge must slump");
    }

    #[test]
    fn test_particle_mode_respects_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut field = bump(17, 5.0);
        let original = field.clone();

        let status = ThermalErosion::new(ThermalMode::particle())
            .apply(&mut field, &StageContext::new(cancel, 0))
            .unwrap();

        assert_eq!(status, StageStatus::Cancelled);
        assert_eq!(field, original);
    }

    #[test]
    fn test_rejects_vertical_talus() {
        let mode = ThermalMode::Particle {
            iterations: 1,
            talus_angle_degrees: 90.0,
            strength: 0.5,
            seed: 0,
        };
        let err = ThermalErosion::new(mode)
            .apply(&mut bump(9, 1.0), &StageContext::default())
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidParameter { .. }));
    }
}
