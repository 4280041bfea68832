//! RON pipeline recipes.
//!
//! A recipe names every provider, processor and splat sampler of a build as
//! plain data, so pipelines can be tuned without recompiling:
//!
//! ```ron
//! (
//!     providers: [
//!         Fbm((seed: 7, octaves: 5, amplitude: 120.0)),
//!         Gradient((amplitude: 80.0, blend: Multiply)),
//!     ],
//!     processors: [
//!         HydraulicErosion((droplets: 20000)),
//!         Normalize((out_min: -20.0, out_max: 300.0)),
//!     ],
//!     samplers: [
//!         Altitude((layer_index: 2, min_altitude: 50.0, max_altitude: 250.0)),
//!     ],
//!     cell_spacing: 2.0,
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::generator::Pipeline;
use crate::processors::{
    BeachParams, BeachProcessor, CurvatureParams, CurvatureRelaxation, EdgeFalloff,
    EdgeFalloffParams, GaussianBlur, HydraulicErosion, HydraulicParams, NormalizeParams,
    NormalizeProcessor, ThermalErosion, ThermalMode,
};
use crate::providers::{
    ConstantProvider, FbmParams, FbmProvider, GradientParams, GradientProvider,
    LinearRampProvider, PerlinLayerParams, PerlinLayerProvider, RidgedParams, RidgedProvider,
};
use crate::splat::{AltitudeSampler, ConstantWeightSampler, SteepnessSampler};

/// Errors raised while loading or writing a recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("failed to read recipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize recipe: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProviderDef {
    Constant(ConstantProvider),
    LinearRamp(LinearRampProvider),
    Gradient(GradientParams),
    PerlinLayer(PerlinLayerParams),
    Fbm(FbmParams),
    Ridged(RidgedParams),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProcessorDef {
    HydraulicErosion(HydraulicParams),
    ThermalErosion(ThermalMode),
    CurvatureRelaxation(CurvatureParams),
    GaussianBlur(GaussianBlur),
    Beach(BeachParams),
    Normalize(NormalizeParams),
    EdgeFalloff(EdgeFalloffParams),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SamplerDef {
    Altitude(AltitudeSampler),
    Steepness(SteepnessSampler),
    Constant(ConstantWeightSampler),
}

/// A serializable description of a [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub providers: Vec<ProviderDef>,
    pub processors: Vec<ProcessorDef>,
    pub samplers: Vec<SamplerDef>,
    /// World units between adjacent cells.
    pub cell_spacing: f32,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            processors: Vec::new(),
            samplers: Vec::new(),
            cell_spacing: 1.0,
        }
    }
}

impl Recipe {
    /// An island: fBm relief shaped by a radial gradient, eroded, given
    /// beaches and normalized, painted with grass, rock and snow layers.
    pub fn island(seed: u32) -> Self {
        Self {
            providers: vec![
                ProviderDef::Fbm(FbmParams {
                    seed,
                    amplitude: 0.6,
                    ..Default::default()
                }),
                ProviderDef::Gradient(GradientParams {
                    inner_radius: 0.1,
                    outer_radius: 0.5,
                    amplitude: 1.0,
                    ..Default::default()
                }),
                ProviderDef::Constant(ConstantProvider::new(0.35, Default::default())),
            ],
            processors: vec![
                ProcessorDef::HydraulicErosion(HydraulicParams {
                    droplets: 20_000,
                    seed: u64::from(seed),
                    ..Default::default()
                }),
                ProcessorDef::ThermalErosion(ThermalMode::relaxation()),
                ProcessorDef::CurvatureRelaxation(CurvatureParams::default()),
                ProcessorDef::Beach(BeachParams {
                    sea_level: 0.7,
                    sediment_stiffness: 0.02,
                    shore_width: 12.0,
                    underwater_blend: 0.8,
                }),
                ProcessorDef::Normalize(NormalizeParams {
                    out_min: -40.0,
                    out_max: 300.0,
                    ..Default::default()
                }),
            ],
            samplers: vec![
                SamplerDef::Constant(ConstantWeightSampler {
                    layer_index: 0,
                    weight: u8::MAX,
                }),
                SamplerDef::Steepness(SteepnessSampler::default()),
                SamplerDef::Altitude(AltitudeSampler::default()),
            ],
            cell_spacing: 1.0,
        }
    }

    pub fn from_ron(source: &str) -> Result<Self, RecipeError> {
        Ok(ron::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe = Self::from_ron(&contents)?;
        tracing::info!(path = %path.display(), "loaded pipeline recipe");
        Ok(recipe)
    }

    pub fn to_ron(&self) -> Result<String, RecipeError> {
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Instantiate every stage in declaration order.
    pub fn into_pipeline(self) -> Pipeline {
        let mut pipeline = Pipeline::new().with_cell_spacing(self.cell_spacing);

        for def in self.providers {
            pipeline = match def {
                ProviderDef::Constant(p) => pipeline.with_provider(p),
                ProviderDef::LinearRamp(p) => pipeline.with_provider(p),
                ProviderDef::Gradient(p) => pipeline.with_provider(GradientProvider::new(p)),
                ProviderDef::PerlinLayer(p) => pipeline.with_provider(PerlinLayerProvider::new(p)),
                ProviderDef::Fbm(p) => pipeline.with_provider(FbmProvider::new(p)),
                ProviderDef::Ridged(p) => pipeline.with_provider(RidgedProvider::new(p)),
            };
        }

        for def in self.processors {
            pipeline = match def {
                ProcessorDef::HydraulicErosion(p) => {
                    pipeline.with_processor(HydraulicErosion::new(p))
                }
                ProcessorDef::ThermalErosion(mode) => {
                    pipeline.with_processor(ThermalErosion::new(mode))
                }
                ProcessorDef::CurvatureRelaxation(p) => {
                    pipeline.with_processor(CurvatureRelaxation::new(p))
                }
                ProcessorDef::GaussianBlur(blur) => pipeline.with_processor(blur),
                ProcessorDef::Beach(p) => pipeline.with_processor(BeachProcessor::new(p)),
                ProcessorDef::Normalize(p) => pipeline.with_processor(NormalizeProcessor::new(p)),
                ProcessorDef::EdgeFalloff(p) => pipeline.with_processor(EdgeFalloff::new(p)),
            };
        }

        for def in self.samplers {
            pipeline = match def {
                SamplerDef::Altitude(s) => pipeline.with_sampler(s),
                SamplerDef::Steepness(s) => pipeline.with_sampler(s),
                SamplerDef::Constant(s) => pipeline.with_sampler(s),
            };
        }

        pipeline
    }
}
