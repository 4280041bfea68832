//! End-to-end builds against an in-memory host.

use std::collections::BTreeMap;
use std::sync::Arc;

use strata_terrain::processors::{
    GaussianBlur, HydraulicErosion, HydraulicParams, NormalizeParams, NormalizeProcessor,
};
use strata_terrain::providers::{ConstantProvider, LinearRampProvider, RampAxis};
use strata_terrain::splat::{
    AltitudeSampler, ConstantWeightSampler, SplatSampler, SplatSamplerKind,
};
use strata_terrain::{
    BlendMode, BuildOutcome, BuildReport, CancelToken, GenerationError, GeneratorOptions,
    GridCoordinate, Heightfield, HostError, LayoutError, PatchBuffer, PatchLayout, Pipeline,
    PostProcessor, ProcessorKind, ProviderKind, StageContext, StageError, StageStatus,
    TerrainGenerator, TerrainHost, TopographyProvider, stitch_patch,
};

#[derive(Default)]
struct MemoryHost {
    heights: BTreeMap<GridCoordinate, Vec<f32>>,
    splats: BTreeMap<(GridCoordinate, usize), Vec<[u8; 4]>>,
    reject_heights: Option<GridCoordinate>,
    reject_splats: bool,
}

impl TerrainHost for MemoryHost {
    fn install_heights(
        &mut self,
        coordinate: GridCoordinate,
        heights: &[f32],
    ) -> Result<(), HostError> {
        if self.reject_heights == Some(coordinate) {
            return Err(HostError::new("patch is locked"));
        }
        self.heights.insert(coordinate, heights.to_vec());
        Ok(())
    }

    fn install_splat(
        &mut self,
        coordinate: GridCoordinate,
        group: usize,
        texels: &[[u8; 4]],
    ) -> Result<(), HostError> {
        if self.reject_splats {
            return Err(HostError::new("no splat storage"));
        }
        self.splats.insert((coordinate, group), texels.to_vec());
        Ok(())
    }
}

fn generator(stride: u32, px: u32, py: u32) -> TerrainGenerator {
    let layout = PatchLayout::new(stride, px, py).unwrap();
    TerrainGenerator::new(
        layout,
        GeneratorOptions {
            worker_threads: 2,
            hand_off_capacity: 4,
            seed: 7,
        },
    )
    .unwrap()
}

async fn completed(
    generator: &TerrainGenerator,
    pipeline: Pipeline,
    host: &mut MemoryHost,
) -> BuildReport {
    match generator
        .build(Arc::new(pipeline), host, &CancelToken::new())
        .await
        .unwrap()
    {
        BuildOutcome::Completed(report) => report,
        BuildOutcome::Cancelled => panic!("expected a completed build"),
    }
}

fn reassemble(layout: &PatchLayout, host: &MemoryHost) -> Heightfield {
    let mut field = Heightfield::new(layout.grid_width(), layout.grid_height());
    for (&coordinate, heights) in &host.heights {
        let patch = PatchBuffer {
            coordinate,
            size: layout.patch_size(),
            heights: heights.clone(),
        };
        assert!(stitch_patch(&mut field, layout, &patch));
    }
    field
}

#[tokio::test]
async fn test_constant_provider_fills_single_patch() {
    let generator = generator(64, 1, 1);
    let pipeline = Pipeline::new().with_provider(ConstantProvider::new(0.5, BlendMode::Add));
    let mut host = MemoryHost::default();

    let report = completed(&generator, pipeline, &mut host).await;

    assert_eq!(report.patches_installed, 1);
    let heights = &host.heights[&GridCoordinate::new(0, 0)];
    assert_eq!(heights.len(), 65 * 65);
    assert!(heights.iter().all(|&h| h == 0.5), "Every cell should hold the constant");
}

#[tokio::test]
async fn test_ramp_is_continuous_across_patches() {
    let generator = generator(4, 2, 2);
    let pipeline = Pipeline::new().with_provider(LinearRampProvider::unit(RampAxis::U));
    let mut host = MemoryHost::default();

    let report = completed(&generator, pipeline, &mut host).await;
    assert_eq!(report.patches_installed, 4);

    let a = &host.heights[&GridCoordinate::new(0, 0)];
    let b = &host.heights[&GridCoordinate::new(1, 0)];
    let c = &host.heights[&GridCoordinate::new(0, 1)];
    for i in 0..5 {
        assert_eq!(
            a[i * 5 + 4].to_bits(),
            b[i * 5].to_bits(),
            "Shared column differs at row {i}"
        );
        assert_eq!(a[20 + i].to_bits(), c[i].to_bits(), "Shared row differs at column {i}");
    }

    let field = reassemble(generator.layout(), &host);
    assert_eq!(field.get(0, 0), 0.0);
    assert_eq!(field.get(8, 8), 1.0);
    assert_eq!(field.get(4, 2), 0.5);
}

#[tokio::test]
async fn test_full_pipeline_paints_every_patch() {
    let generator = generator(8, 2, 2);
    let pipeline = Pipeline::new()
        .with_provider(LinearRampProvider::unit(RampAxis::V))
        .with_processor(HydraulicErosion::new(HydraulicParams {
            droplets: 200,
            ..Default::default()
        }))
        .with_processor(GaussianBlur::new(1, 1.0))
        .with_processor(NormalizeProcessor::new(NormalizeParams {
            out_min: 0.0,
            out_max: 300.0,
            ..Default::default()
        }))
        .with_sampler(ConstantWeightSampler {
            layer_index: 0,
            weight: 255,
        })
        .with_sampler(AltitudeSampler {
            layer_index: 4,
            ..Default::default()
        });
    let mut host = MemoryHost::default();

    let report = completed(&generator, pipeline, &mut host).await;

    assert_eq!(report.patches_installed, 4);
    assert_eq!(report.splat_maps_installed, 8, "Two layer groups per patch");
    assert!(report.failures.is_empty());
    let stages: Vec<&str> = report.stage_timings.iter().map(|t| t.stage.as_str()).collect();
    assert_eq!(
        stages,
        ["sampling", "hydraulic_erosion", "gaussian_blur", "normalize", "hand_off"]
    );

    let field = reassemble(generator.layout(), &host);
    let (min, max) = field.min_max().unwrap();
    assert!(min.abs() < 1e-3 && (max - 300.0).abs() < 1e-3, "Normalized to [0, 300]");

    let base = &host.splats[&(GridCoordinate::new(0, 0), 0)];
    assert!(base.iter().all(|t| t[0] == 255));
    let snow: Vec<u8> = host
        .splats
        .iter()
        .filter(|((_, group), _)| *group == 1)
        .flat_map(|(_, texels)| texels.iter().map(|t| t[0]))
        .collect();
    assert_eq!(snow.iter().max(), Some(&255), "The highest cell is fully snowed");
    assert_eq!(snow.iter().min(), Some(&0), "The lowest cell has no snow");
}

#[tokio::test]
async fn test_cancelled_build_installs_nothing() {
    let generator = generator(16, 2, 2);
    let pipeline = Arc::new(
        Pipeline::new()
            .with_provider(LinearRampProvider::unit(RampAxis::U))
            .with_processor(GaussianBlur::default()),
    );
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut host = MemoryHost::default();

    let outcome = generator.build(pipeline, &mut host, &cancel).await.unwrap();

    assert_eq!(outcome, BuildOutcome::Cancelled);
    assert!(host.heights.is_empty());
    assert!(host.splats.is_empty());
}

struct CancelDuringStage;

impl PostProcessor for CancelDuringStage {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Custom("cancel_during_stage")
    }

    fn name(&self) -> &str {
        "cancel_during_stage"
    }

    fn apply(
        &self,
        _field: &mut Heightfield,
        ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        ctx.cancel.cancel();
        Ok(StageStatus::Cancelled)
    }
}

#[tokio::test]
async fn test_cancellation_between_stages_stops_the_chain() {
    let generator = generator(4, 1, 1);
    let pipeline = Pipeline::new()
        .with_provider(ConstantProvider::new(1.0, BlendMode::Add))
        .with_processor(CancelDuringStage)
        .with_processor(FailingStage);
    let mut host = MemoryHost::default();

    let outcome = generator
        .build(Arc::new(pipeline), &mut host, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, BuildOutcome::Cancelled, "Later stages must not run");
    assert!(host.heights.is_empty());
}

#[tokio::test]
async fn test_host_failures_are_reported_not_fatal() {
    let generator = generator(4, 2, 1);
    let pipeline = Pipeline::new()
        .with_provider(ConstantProvider::new(1.0, BlendMode::Add))
        .with_sampler(ConstantWeightSampler {
            layer_index: 0,
            weight: 1,
        });
    let mut host = MemoryHost {
        reject_heights: Some(GridCoordinate::new(1, 0)),
        ..Default::default()
    };

    let report = completed(&generator, pipeline, &mut host).await;

    assert_eq!(report.patches_installed, 1);
    assert_eq!(report.splat_maps_installed, 1);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.coordinate, GridCoordinate::new(1, 0));
    assert_eq!(failure.layer_group, None);
    assert_eq!(failure.error, HostError::new("patch is locked"));
    assert!(
        !host.splats.contains_key(&(GridCoordinate::new(1, 0), 0)),
        "Splats are skipped for a patch whose heights were rejected"
    );
}

#[tokio::test]
async fn test_splat_failures_name_the_layer_group() {
    let generator = generator(4, 1, 1);
    let pipeline = Pipeline::new().with_sampler(ConstantWeightSampler {
        layer_index: 9,
        weight: 3,
    });
    let mut host = MemoryHost {
        reject_splats: true,
        ..Default::default()
    };

    let report = completed(&generator, pipeline, &mut host).await;

    assert_eq!(report.patches_installed, 1);
    assert_eq!(report.splat_maps_installed, 0);
    assert_eq!(report.failures[0].layer_group, Some(2));
}

struct PanickingProvider;

impl TopographyProvider for PanickingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom("panicking")
    }

    fn blend(&self) -> BlendMode {
        BlendMode::Add
    }

    fn contribution(&self, _u: f32, _v: f32) -> f32 {
        panic!("provider exploded")
    }
}

#[tokio::test]
async fn test_panicking_provider_is_an_error() {
    let generator = generator(4, 1, 1);
    let pipeline = Pipeline::new().with_provider(PanickingProvider);
    let mut host = MemoryHost::default();

    let err = generator
        .build(Arc::new(pipeline), &mut host, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, GenerationError::StagePanicked { stage } if stage == "sampling"),
        "unexpected error: {err}"
    );
    assert!(host.heights.is_empty());
}

/// Panics on the right edge of a unit ramp, so only some patches fail.
struct EdgePanickingSampler;

impl SplatSampler for EdgePanickingSampler {
    fn kind(&self) -> SplatSamplerKind {
        SplatSamplerKind::Custom("edge_panicking")
    }

    fn layer_index(&self) -> usize {
        0
    }

    fn weight(&self, height: f32, _inclination_degrees: f32) -> u8 {
        if height >= 1.0 {
            panic!("sampler exploded at the edge");
        }
        0
    }
}

#[tokio::test]
async fn test_panicking_sampler_hands_off_nothing() {
    let generator = generator(4, 8, 8);
    let pipeline = Pipeline::new()
        .with_provider(LinearRampProvider::unit(RampAxis::U))
        .with_sampler(EdgePanickingSampler);
    let mut host = MemoryHost::default();

    let err = generator
        .build(Arc::new(pipeline), &mut host, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, GenerationError::StagePanicked { stage } if stage == "hand_off"),
        "unexpected error: {err}"
    );
    assert!(host.heights.is_empty(), "{} patches reached the host", host.heights.len());
    assert!(host.splats.is_empty());
}

struct FailingStage;

impl PostProcessor for FailingStage {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Custom("failing")
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn apply(
        &self,
        _field: &mut Heightfield,
        _ctx: &StageContext,
    ) -> Result<StageStatus, StageError> {
        Err(StageError::InvalidParameter {
            name: "mode",
            reason: "unsupported".into(),
        })
    }
}

#[tokio::test]
async fn test_stage_error_names_the_stage() {
    let generator = generator(4, 1, 1);
    let pipeline = Pipeline::new().with_processor(FailingStage);
    let mut host = MemoryHost::default();

    let err = generator
        .build(Arc::new(pipeline), &mut host, &CancelToken::new())
        .await
        .unwrap_err();

    match err {
        GenerationError::Stage { stage, source } => {
            assert_eq!(stage, "failing");
            assert!(matches!(source, StageError::InvalidParameter { name: "mode", .. }));
        }
        other => panic!("expected a stage error, got {other:?}"),
    }
    assert!(host.heights.is_empty());
}

#[tokio::test]
async fn test_invalid_processor_parameters_fail_the_build() {
    let generator = generator(4, 1, 1);
    let pipeline = Pipeline::new().with_processor(GaussianBlur::new(2, f32::NAN));
    let mut host = MemoryHost::default();

    let err = generator
        .build(Arc::new(pipeline), &mut host, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Stage { ref stage, .. } if stage == "gaussian_blur"));
}

#[test]
fn test_empty_host_grid_is_a_layout_error() {
    let result = TerrainGenerator::for_coordinates(Vec::new(), 64, GeneratorOptions::default());
    assert!(matches!(result, Err(GenerationError::Layout(LayoutError::EmptyGrid))));

    assert!(matches!(PatchLayout::new(0, 1, 1), Err(LayoutError::ZeroStride)));
}

#[tokio::test]
async fn test_host_coordinates_define_the_grid() {
    let coords = [GridCoordinate::new(-1, 2), GridCoordinate::new(0, 3)];
    let generator =
        TerrainGenerator::for_coordinates(coords, 4, GeneratorOptions::default()).unwrap();
    let pipeline = Pipeline::new().with_provider(ConstantProvider::new(2.0, BlendMode::Add));
    let mut host = MemoryHost::default();

    let report = completed(&generator, pipeline, &mut host).await;

    assert_eq!(report.patches_installed, 4, "Bounding box covers 2x2 patches");
    assert!(host.heights.contains_key(&GridCoordinate::new(-1, 2)));
    assert!(host.heights.contains_key(&GridCoordinate::new(0, 3)));
}

#[tokio::test]
async fn test_builds_are_deterministic() {
    let pipeline = || {
        Pipeline::new()
            .with_provider(LinearRampProvider::unit(RampAxis::U))
            .with_processor(HydraulicErosion::new(HydraulicParams {
                droplets: 300,
                ..Default::default()
            }))
    };
    let mut first = MemoryHost::default();
    let mut second = MemoryHost::default();

    // A single worker replays droplets in the same order.
    let options = GeneratorOptions {
        worker_threads: 1,
        ..Default::default()
    };
    let layout = PatchLayout::new(8, 1, 1).unwrap();
    let generator = TerrainGenerator::new(layout, options).unwrap();
    completed(&generator, pipeline(), &mut first).await;
    completed(&generator, pipeline(), &mut second).await;

    let a = &first.heights[&GridCoordinate::new(0, 0)];
    let b = &second.heights[&GridCoordinate::new(0, 0)];
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-4, "Same seed should give the same terrain");
    }
}
