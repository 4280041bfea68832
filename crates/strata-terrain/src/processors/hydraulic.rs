//! Droplet-based hydraulic erosion.
//!
//! Each droplet follows the bilinear gradient downhill, eroding where it can
//! carry more sediment and depositing where it slows or climbs. Droplets run
//! concurrently against an [`AtomicHeightfield`]; interleavings on shared
//! cells vary between runs but every delta lands.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    PARTICLE_BATCH, PostProcessor, ProcessorKind, StageContext, StageError, StageStatus,
    require_finite,
};
use crate::cancel::Cancelled;
use crate::heightfield::{AtomicHeightfield, Heightfield};

/// Droplets stop once their water drops below this volume.
const MIN_WATER: f32 = 0.01;

/// Parameters for [`HydraulicErosion`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicParams {
    /// Number of droplets simulated.
    pub droplets: usize,
    pub seed: u64,
    /// How much of the previous direction a droplet keeps, in `[0, 1]`.
    pub inertia: f32,
    pub gravity: f32,
    /// Sediment carried per unit of slope, speed and water.
    pub capacity_factor: f32,
    /// Capacity floor so droplets on flat ground still carry sediment.
    pub min_slope_capacity: f32,
    pub erosion_rate: f32,
    pub deposition_rate: f32,
    /// Fraction of water lost per step, in `[0, 1]`.
    pub evaporation_speed: f32,
    pub initial_water: f32,
    pub initial_speed: f32,
    /// Maximum steps per droplet.
    pub max_lifetime: u32,
}

impl Default for HydraulicParams {
    fn default() -> Self {
        Self {
            droplets: 50_000,
            seed: 1337,
            inertia: 0.05,
            gravity: 4.0,
            capacity_factor: 4.0,
            min_slope_capacity: 0.01,
            erosion_rate: 0.3,
            deposition_rate: 0.3,
            evaporation_speed: 0.01,
            initial_water: 1.0,
            initial_speed: 1.0,
            max_lifetime: 30,
        }
    }
}

impl HydraulicParams {
    fn validate(&self) -> Result<(), StageError> {
        for (name, value) in [
            ("inertia", self.inertia),
            ("gravity", self.gravity),
            ("capacity_factor", self.capacity_factor),
            ("min_slope_capacity", self.min_slope_capacity),
            ("erosion_rate", self.erosion_rate),
            ("deposition_rate", self.deposition_rate),
            ("evaporation_speed", self.evaporation_speed),
            ("initial_water", self.initial_water),
            ("initial_speed", self.initial_speed),
        ] {
            require_finite(name, value)?;
        }
        if !(0.0..=1.0).contains(&self.inertia) {
            return Err(StageError::InvalidParameter {
                name: "inertia",
                reason: format!("must be within [0, 1], got {}", self.inertia),
            });
        }
        if !(0.0..=1.0).contains(&self.evaporation_speed) {
            return Err(StageError::InvalidParameter {
                name: "evaporation_speed",
                reason: format!("must be within [0, 1], got {}", self.evaporation_speed),
            });
        }
        Ok(())
    }
}

/// Hydraulic erosion post-processor.
#[derive(Clone, Debug, Default)]
pub struct HydraulicErosion {
    params: HydraulicParams,
}

/// Height and gradient at a continuous position.
struct Sample {
    height: f32,
    gradient: Vec2,
}

/// Cell index and fractional offset of a continuous position.
#[inline]
fn cell_of(pos: Vec2) -> (usize, usize, Vec2) {
    let x = pos.x.floor();
    let y = pos.y.floor();
    (x as usize, y as usize, Vec2::new(pos.x - x, pos.y - y))
}

/// Bilinear height and gradient. `pos` must satisfy `0 <= pos < dim - 1`.
fn sample(field: &AtomicHeightfield, pos: Vec2) -> Sample {
    let (x, y, f) = cell_of(pos);
    let h00 = field.get(x, y);
    let h10 = field.get(x + 1, y);
    let h01 = field.get(x, y + 1);
    let h11 = field.get(x + 1, y + 1);

    let gradient = Vec2::new(
        (h10 - h00) * (1.0 - f.y) + (h11 - h01) * f.y,
        (h01 - h00) * (1.0 - f.x) + (h11 - h10) * f.x,
    );
    let height = h00 * (1.0 - f.x) * (1.0 - f.y)
        + h10 * f.x * (1.0 - f.y)
        + h01 * (1.0 - f.x) * f.y
        + h11 * f.x * f.y;

    Sample { height, gradient }
}

/// Add `amount` to the four cells around `pos`, weighted bilinearly.
fn scatter(field: &AtomicHeightfield, pos: Vec2, amount: f32) {
    let (x, y, f) = cell_of(pos);
    field.add(field.index(x, y), amount * (1.0 - f.x) * (1.0 - f.y));
    field.add(field.index(x + 1, y), amount * f.x * (1.0 - f.y));
    field.add(field.index(x, y + 1), amount * (1.0 - f.x) * f.y);
    field.add(field.index(x + 1, y + 1), amount * f.x * f.y);
}

impl HydraulicErosion {
    pub fn new(params: HydraulicParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HydraulicParams {
        &self.params
    }

    fn simulate_droplet(&self, field: &AtomicHeightfield, ctx: &StageContext, index: u64) {
        let p = &self.params;
        let mut rng = ctx.particle_rng(p.seed, index);
        let limit = Vec2::new((field.width() - 1) as f32, (field.height() - 1) as f32);
        let inside = |v: Vec2| v.x >= 0.0 && v.y >= 0.0 && v.x < limit.x && v.y < limit.y;

        let mut pos = Vec2::new(
            rng.random_range(0.0..limit.x),
            rng.random_range(0.0..limit.y),
        );
        let mut dir = Vec2::ZERO;
        let mut speed = p.initial_speed;
        let mut water = p.initial_water;
        let mut sediment = 0.0_f32;

        for _ in 0..p.max_lifetime {
            let here = sample(field, pos);

            dir = dir * p.inertia - here.gradient * (1.0 - p.inertia);
            if dir.length() < 1e-4 {
                let angle = rng.random_range(0.0..TAU);
                dir = Vec2::new(angle.cos(), angle.sin());
            } else {
                dir = dir.normalize();
            }

            let next = pos + dir;
            if !inside(next) {
                break;
            }

            let delta = sample(field, next).height - here.height;
            let capacity =
                (-delta * speed * water * p.capacity_factor).max(p.min_slope_capacity);

            if sediment > capacity || delta > 0.0 {
                // Climbing only drops what is carried, never more.
                let amount = if delta > 0.0 {
                    delta.min(sediment)
                } else {
                    (sediment - capacity) * p.deposition_rate
                };
                sediment -= amount;
                scatter(field, pos, amount);
            } else {
                let amount = ((capacity - sediment) * p.erosion_rate).min(-delta);
                sediment += amount;
                scatter(field, pos, -amount);
            }

            speed = (speed * speed + delta.abs() * p.gravity).max(0.0).sqrt();
            water *= 1.0 - p.evaporation_speed;
            pos = next;

            if water < MIN_WATER {
                break;
            }
        }

        if sediment > 0.0 {
            scatter(field, pos, sediment);
        }
    }
}

impl PostProcessor for HydraulicErosion {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::HydraulicErosion
    }

    fn name(&self) -> &str {
        "hydraulic_erosion"
    }

    fn apply(
        &self,
        field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        self.params.validate()?;
        if field.width() < 2 || field.height() < 2 || self.params.droplets == 0 {
            return Ok(StageStatus::Completed);
        }

        let atomic = AtomicHeightfield::from_heightfield(field);
        let droplets = self.params.droplets;
        let batches = droplets.div_ceil(PARTICLE_BATCH);

        let outcome = (0..batches).into_par_iter().try_for_each(|batch| {
            ctx.cancel.check()?;
            let start = batch * PARTICLE_BATCH;
            let end = (start + PARTICLE_BATCH).min(droplets);
            for index in start..end {
                self.simulate_droplet(&atomic, ctx, index as u64);
            }
            Ok::<(), Cancelled>(())
        });

        if outcome.is_err() {
            return Ok(StageStatus::Cancelled);
        }

        atomic.write_back(field);
        Ok(StageStatus::Completed)
    }
}
