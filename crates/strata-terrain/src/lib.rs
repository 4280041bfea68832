//! Procedural heightfield synthesis for patch-streamed terrain.
//!
//! A build samples stacked topography providers into one global heightfield,
//! runs an ordered chain of post-processors over the whole field (erosion,
//! relaxation, blur, coastline shaping, normalization), then splits the
//! result into overlapping patch buffers and splat weight maps that are
//! handed to a host one patch at a time.

mod cancel;
mod generator;
mod grid;
mod heightfield;
mod patches;
mod sampling;

pub mod coastline;
pub mod processors;
pub mod providers;
pub mod recipe;
pub mod splat;

pub use cancel::{CancelToken, Cancelled};
pub use coastline::{CoastlineField, euclidean_distance_field};
pub use generator::{
    BuildOutcome, BuildReport, GenerationError, GeneratorOptions, HostError, PatchFailure,
    Pipeline, StageTiming, TerrainGenerator, TerrainHost,
};
pub use grid::{GridCoordinate, LayoutError, PatchLayout};
pub use heightfield::{AtomicHeightfield, Heightfield};
pub use patches::{PatchBuffer, split_patch, stitch_patch};
pub use processors::{PostProcessor, ProcessorKind, StageContext, StageError, StageStatus};
pub use providers::{BlendMode, ProviderKind, TopographyProvider};
pub use recipe::{Recipe, RecipeError};
pub use sampling::sample_heightfield;
pub use splat::{SplatMap, SplatSampler, SplatSamplerKind};
