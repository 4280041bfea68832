use criterion::{Criterion, black_box, criterion_group, criterion_main};
use strata_terrain::processors::{GaussianBlur, HydraulicErosion, HydraulicParams};
use strata_terrain::providers::{FbmParams, FbmProvider};
use strata_terrain::*;

fn island(size: usize) -> Heightfield {
    let c = size as f32 / 2.0;
    Heightfield::from_fn(size, size, |x, y| {
        let dx = x as f32 - c;
        let dy = y as f32 - c;
        c * 0.6 - (dx * dx + dy * dy).sqrt()
    })
}

fn bench_distance_field(c: &mut Criterion) {
    let field = island(512);
    c.bench_function("coastline_field_512", |bencher| {
        bencher.iter(|| black_box(CoastlineField::compute(black_box(&field), 0.0)))
    });
}

fn bench_hydraulic_erosion(c: &mut Criterion) {
    let base = island(256);
    let erosion = HydraulicErosion::new(HydraulicParams {
        droplets: 10_000,
        ..Default::default()
    });
    let ctx = StageContext::default();
    c.bench_function("hydraulic_erosion_256_10k", |bencher| {
        bencher.iter(|| {
            let mut field = base.clone();
            black_box(erosion.apply(&mut field, &ctx).ok());
            field
        })
    });
}

fn bench_gaussian_blur(c: &mut Criterion) {
    let base = island(512);
    let blur = GaussianBlur::new(4, 2.0);
    let ctx = StageContext::default();
    c.bench_function("gaussian_blur_512_r4", |bencher| {
        bencher.iter(|| {
            let mut field = base.clone();
            black_box(blur.apply(&mut field, &ctx).ok());
            field
        })
    });
}

fn bench_sampling(c: &mut Criterion) {
    let layout = PatchLayout::new(64, 4, 4).unwrap();
    let providers: Vec<std::sync::Arc<dyn TopographyProvider>> =
        vec![std::sync::Arc::new(FbmProvider::new(FbmParams::default()))];
    let cancel = CancelToken::new();
    c.bench_function("sample_fbm_257", |bencher| {
        bencher.iter(|| black_box(sample_heightfield(&layout, &providers, &cancel)))
    });
}

criterion_group!(
    benches,
    bench_distance_field,
    bench_hydraulic_erosion,
    bench_gaussian_blur,
    bench_sampling,
);
criterion_main!(benches);
