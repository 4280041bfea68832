//! The asynchronous build entry point.
//!
//! A build runs its CPU phases on a dedicated rayon pool, one phase at a
//! time, each inside `spawn_blocking` so the async runtime never stalls:
//!
//! 1. sample every provider into the global heightfield,
//! 2. run each post-processor over the whole field in registration order,
//! 3. split patches and paint splat maps in parallel, then stream the
//!    finished patches through a bounded channel to the host.
//!
//! Cancellation is observed inside phases 1 and 2. Once hand-off has begun
//! the build always completes. A panic while painting aborts the build
//! before any patch reaches the host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::cancel::CancelToken;
use crate::grid::{GridCoordinate, LayoutError, PatchLayout};
use crate::heightfield::Heightfield;
use crate::patches::{PatchBuffer, split_patch};
use crate::processors::{PostProcessor, StageContext, StageError, StageStatus};
use crate::providers::TopographyProvider;
use crate::sampling::sample_heightfield;
use crate::splat::{SplatMap, SplatSampler, paint_patch};

/// Opaque failure reported by a host install callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives finished patch buffers.
///
/// The host copies what it needs; buffers are dropped after each call.
pub trait TerrainHost: Send {
    fn install_heights(
        &mut self,
        coordinate: GridCoordinate,
        heights: &[f32],
    ) -> Result<(), HostError>;

    fn install_splat(
        &mut self,
        coordinate: GridCoordinate,
        group: usize,
        texels: &[[u8; 4]],
    ) -> Result<(), HostError>;
}

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid patch layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("stage `{stage}` panicked")]
    StagePanicked { stage: String },

    #[error("stage `{stage}` was aborted by the runtime")]
    Aborted { stage: String },

    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),
}

/// A patch whose hand-off the host rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchFailure {
    pub coordinate: GridCoordinate,
    /// `None` for the height buffer, `Some(group)` for a splat map.
    pub layer_group: Option<usize>,
    pub error: HostError,
}

/// Wall-clock time spent in one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed: Duration,
}

/// Summary of a completed build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub patches_installed: usize,
    pub splat_maps_installed: usize,
    pub failures: Vec<PatchFailure>,
    pub stage_timings: Vec<StageTiming>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Completed(BuildReport),
    Cancelled,
}

/// Ordered providers, processors and splat samplers for one build.
#[derive(Clone)]
pub struct Pipeline {
    providers: Vec<Arc<dyn TopographyProvider>>,
    processors: Vec<Arc<dyn PostProcessor>>,
    samplers: Vec<Arc<dyn SplatSampler>>,
    cell_spacing: f32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            processors: Vec::new(),
            samplers: Vec::new(),
            cell_spacing: 1.0,
        }
    }

    pub fn with_provider(mut self, provider: impl TopographyProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn with_processor(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    pub fn with_sampler(mut self, sampler: impl SplatSampler + 'static) -> Self {
        self.samplers.push(Arc::new(sampler));
        self
    }

    /// World units between adjacent cells, used for slope computation.
    pub fn with_cell_spacing(mut self, cell_spacing: f32) -> Self {
        self.cell_spacing = cell_spacing;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn TopographyProvider>] {
        &self.providers
    }

    pub fn processors(&self) -> &[Arc<dyn PostProcessor>] {
        &self.processors
    }

    pub fn samplers(&self) -> &[Arc<dyn SplatSampler>] {
        &self.samplers
    }

    pub fn cell_spacing(&self) -> f32 {
        self.cell_spacing
    }
}

/// Tuning for [`TerrainGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOptions {
    /// Worker threads in the rayon pool. `0` picks `num_cpus - 1`, at least one.
    pub worker_threads: usize,
    /// Finished patches queued for the host at once.
    pub hand_off_capacity: usize,
    /// Build-wide seed mixed into every stage's own seed.
    pub seed: u64,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            hand_off_capacity: 64,
            seed: 1337,
        }
    }
}

impl GeneratorOptions {
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let cpus = num_cpus::get().max(2);
        (cpus - 1).max(1)
    }
}

/// One patch ready for the host.
struct PatchPayload {
    patch: PatchBuffer,
    splat_maps: Vec<SplatMap>,
}

const SAMPLING_STAGE: &str = "sampling";
const HAND_OFF_STAGE: &str = "hand_off";

fn join_failure(stage: &str, err: JoinError) -> GenerationError {
    if err.is_panic() {
        GenerationError::StagePanicked {
            stage: stage.to_owned(),
        }
    } else {
        GenerationError::Aborted {
            stage: stage.to_owned(),
        }
    }
}

/// Builds heightfields for a fixed patch layout.
pub struct TerrainGenerator {
    layout: PatchLayout,
    options: GeneratorOptions,
    pool: Arc<rayon::ThreadPool>,
}

impl TerrainGenerator {
    pub fn new(layout: PatchLayout, options: GeneratorOptions) -> Result<Self, GenerationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.effective_worker_threads())
            .thread_name(|i| format!("strata-worker-{i}"))
            .build()
            .map_err(|e| GenerationError::WorkerPool(e.to_string()))?;

        Ok(Self {
            layout,
            options,
            pool: Arc::new(pool),
        })
    }

    /// Create a generator covering the patches a host currently has.
    pub fn for_coordinates<I>(
        coordinates: I,
        patch_stride: u32,
        options: GeneratorOptions,
    ) -> Result<Self, GenerationError>
    where
        I: IntoIterator<Item = GridCoordinate>,
    {
        let layout = PatchLayout::from_coordinates(coordinates, patch_stride)?;
        Self::new(layout, options)
    }

    pub fn layout(&self) -> &PatchLayout {
        &self.layout
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Run `work` on the rayon pool without blocking the async runtime.
    async fn run_blocking<T, F>(&self, stage: &str, work: F) -> Result<T, GenerationError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.install(work))
            .await
            .map_err(|e| join_failure(stage, e))
    }

    /// Generate the terrain and hand every patch to `host`.
    ///
    /// Returns `Ok(BuildOutcome::Cancelled)` if `cancel` fires before
    /// hand-off begins; nothing has been installed in that case. Host
    /// rejections are collected in the report rather than aborting the
    /// build.
    pub async fn build<H>(
        &self,
        pipeline: Arc<Pipeline>,
        host: &mut H,
        cancel: &CancelToken,
    ) -> Result<BuildOutcome, GenerationError>
    where
        H: TerrainHost + ?Sized,
    {
        let span = info_span!(
            "build",
            patches = self.layout.patch_total(),
            width = self.layout.grid_width(),
            height = self.layout.grid_height(),
        );
        self.build_inner(pipeline, host, cancel).instrument(span).await
    }

    async fn build_inner<H>(
        &self,
        pipeline: Arc<Pipeline>,
        host: &mut H,
        cancel: &CancelToken,
    ) -> Result<BuildOutcome, GenerationError>
    where
        H: TerrainHost + ?Sized,
    {
        let mut report = BuildReport::default();
        if cancel.is_cancelled() {
            info!("build cancelled before sampling");
            return Ok(BuildOutcome::Cancelled);
        }

        let Some(field) = self.sample(&pipeline, cancel, &mut report).await? else {
            info!("build cancelled during sampling");
            return Ok(BuildOutcome::Cancelled);
        };

        let Some(field) = self.process(&pipeline, field, cancel, &mut report).await? else {
            info!("build cancelled during post-processing");
            return Ok(BuildOutcome::Cancelled);
        };

        if cancel.is_cancelled() {
            info!("build cancelled before hand-off");
            return Ok(BuildOutcome::Cancelled);
        }

        self.hand_off(&pipeline, field, host, &mut report)
            .instrument(info_span!("stage", stage = HAND_OFF_STAGE))
            .await?;

        info!(
            patches = report.patches_installed,
            splat_maps = report.splat_maps_installed,
            failures = report.failures.len(),
            "build complete"
        );
        Ok(BuildOutcome::Completed(report))
    }

    async fn sample(
        &self,
        pipeline: &Arc<Pipeline>,
        cancel: &CancelToken,
        report: &mut BuildReport,
    ) -> Result<Option<Heightfield>, GenerationError> {
        let start = Instant::now();
        let layout = self.layout;
        let providers = Arc::clone(pipeline);
        let token = cancel.clone();

        let sampled = self
            .run_blocking(SAMPLING_STAGE, move || {
                sample_heightfield(&layout, providers.providers(), &token)
            })
            .instrument(info_span!("stage", stage = SAMPLING_STAGE))
            .await?;

        record(report, SAMPLING_STAGE, start.elapsed());
        Ok(sampled.ok())
    }

    async fn process(
        &self,
        pipeline: &Arc<Pipeline>,
        mut field: Heightfield,
        cancel: &CancelToken,
        report: &mut BuildReport,
    ) -> Result<Option<Heightfield>, GenerationError> {
        for processor in pipeline.processors() {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let stage = processor.name().to_owned();
            let processor = Arc::clone(processor);
            let ctx = StageContext::new(cancel.clone(), self.options.seed);
            let start = Instant::now();

            let (returned, status) = self
                .run_blocking(&stage, move || {
                    let status = processor.apply(&mut field, &ctx);
                    (field, status)
                })
                .instrument(info_span!("stage", stage = %stage))
                .await?;
            field = returned;

            match status {
                Ok(StageStatus::Completed) => record(report, &stage, start.elapsed()),
                Ok(StageStatus::Cancelled) => return Ok(None),
                Err(source) => return Err(GenerationError::Stage { stage, source }),
            }
        }
        Ok(Some(field))
    }

    async fn hand_off<H>(
        &self,
        pipeline: &Arc<Pipeline>,
        field: Heightfield,
        host: &mut H,
        report: &mut BuildReport,
    ) -> Result<(), GenerationError>
    where
        H: TerrainHost + ?Sized,
    {
        let start = Instant::now();
        let layout = self.layout;
        let pipeline = Arc::clone(pipeline);

        let payloads: Vec<PatchPayload> = self
            .run_blocking(HAND_OFF_STAGE, move || {
                (0..layout.patch_total())
                    .into_par_iter()
                    .filter_map(|index| {
                        let patch = split_patch(&field, &layout, index)?;
                        let splat_maps = paint_patch(
                            &field,
                            &layout,
                            patch.coordinate,
                            pipeline.samplers(),
                            pipeline.cell_spacing(),
                        )
                        .unwrap_or_default();
                        Some(PatchPayload { patch, splat_maps })
                    })
                    .collect()
            })
            .await?;

        // Every patch is painted before the host sees the first one.
        let (tx, mut rx) = mpsc::channel::<PatchPayload>(self.options.hand_off_capacity.max(1));
        let feeder = tokio::spawn(async move {
            for payload in payloads {
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        while let Some(payload) = rx.recv().await {
            install(host, payload, report);
        }
        feeder
            .await
            .map_err(|e| join_failure(HAND_OFF_STAGE, e))?;

        record(report, HAND_OFF_STAGE, start.elapsed());
        Ok(())
    }
}

fn record(report: &mut BuildReport, stage: &str, elapsed: Duration) {
    debug!(stage, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "stage finished");
    report.stage_timings.push(StageTiming {
        stage: stage.to_owned(),
        elapsed,
    });
}

fn install<H>(host: &mut H, payload: PatchPayload, report: &mut BuildReport)
where
    H: TerrainHost + ?Sized,
{
    let coordinate = payload.patch.coordinate;
    if let Err(error) = host.install_heights(coordinate, &payload.patch.heights) {
        warn!(%coordinate, %error, "host rejected patch heights");
        report.failures.push(PatchFailure {
            coordinate,
            layer_group: None,
            error,
        });
        return;
    }
    report.patches_installed += 1;

    for map in payload.splat_maps {
        match host.install_splat(coordinate, map.group, &map.texels) {
            Ok(()) => report.splat_maps_installed += 1,
            Err(error) => {
                warn!(%coordinate, group = map.group, %error, "host rejected splat map");
                report.failures.push(PatchFailure {
                    coordinate,
                    layer_group: Some(map.group),
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BlendMode, ConstantProvider};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingHost {
        heights: BTreeMap<GridCoordinate, Vec<f32>>,
        splats: BTreeMap<(GridCoordinate, usize), usize>,
    }

    impl TerrainHost for RecordingHost {
        fn install_heights(
            &mut self,
            coordinate: GridCoordinate,
            heights: &[f32],
        ) -> Result<(), HostError> {
            self.heights.insert(coordinate, heights.to_vec());
            Ok(())
        }

        fn install_splat(
            &mut self,
            coordinate: GridCoordinate,
            group: usize,
            texels: &[[u8; 4]],
        ) -> Result<(), HostError> {
            self.splats.insert((coordinate, group), texels.len());
            Ok(())
        }
    }

    fn generator(stride: u32, px: u32, py: u32) -> TerrainGenerator {
        let layout = PatchLayout::new(stride, px, py).unwrap();
        TerrainGenerator::new(
            layout,
            GeneratorOptions {
                worker_threads: 2,
                hand_off_capacity: 2,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_every_patch_is_installed() {
        let generator = generator(4, 3, 2);
        let pipeline =
            Arc::new(Pipeline::new().with_provider(ConstantProvider::new(1.0, BlendMode::Add)));
        let mut host = RecordingHost::default();

        let outcome = generator
            .build(pipeline, &mut host, &CancelToken::new())
            .await
            .unwrap();

        let BuildOutcome::Completed(report) = outcome else {
            panic!("expected a completed build");
        };
        assert_eq!(report.patches_installed, 6);
        assert_eq!(report.splat_maps_installed, 0);
        assert!(report.failures.is_empty());
        assert_eq!(host.heights.len(), 6);
        assert!(host.heights.values().all(|h| h.len() == 25));
        let stages: Vec<&str> = report.stage_timings.iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(stages, ["sampling", "hand_off"]);
    }

    #[tokio::test]
    async fn test_pre_cancelled_build_installs_nothing() {
        let generator = generator(4, 2, 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut host = RecordingHost::default();

        let outcome = generator
            .build(Arc::new(Pipeline::new()), &mut host, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, BuildOutcome::Cancelled);
        assert!(host.heights.is_empty());
    }

    #[test]
    fn test_worker_thread_default_leaves_headroom() {
        let options = GeneratorOptions::default();
        assert!(options.effective_worker_threads() >= 1);
        let fixed = GeneratorOptions {
            worker_threads: 3,
            ..Default::default()
        };
        assert_eq!(fixed.effective_worker_threads(), 3);
    }

    #[test]
    fn test_for_coordinates_rejects_empty_set() {
        let err = TerrainGenerator::for_coordinates(Vec::new(), 8, GeneratorOptions::default());
        assert!(matches!(err, Err(GenerationError::Layout(LayoutError::EmptyGrid))));
    }
}
