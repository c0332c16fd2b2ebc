//! Criterion benchmarks for BM3D core operations.
//!
//! Run with: cargo bench -p bm3d_core
//! Run specific: cargo bench -p bm3d_core -- bench_fft2d

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array2, Array3};
use rand::prelude::*;
use rustfft::FftPlanner;

use bm3d_core::block_matching::find_similar_patches;
use bm3d_core::{
    bm3d, estimate_noise_sigma, fft2d, ifft2d, run_bm3d_step, wht2d_8x8_forward,
    wht2d_8x8_inverse, Bm3dKernelConfig, Bm3dMode, Bm3dParams, Bm3dPlans, ColorSpace,
    IntegralImages, MatchQuery,
};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn random_matrix_f32(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen())
}

fn random_matrix_f64(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen())
}

fn random_rgb(rows: usize, cols: usize, seed: u64) -> Array3<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((rows, cols, 3), |_| rng.gen())
}

fn kernel_config<F: bm3d_core::Bm3dFloat>(threshold: f64) -> Bm3dKernelConfig<F> {
    Bm3dKernelConfig {
        threshold: F::from_f64_c(threshold),
        patch_size: 8,
        step_size: 3,
        search_window: 24,
        max_matches: 16,
    }
}

// =============================================================================
// FFT Benchmarks
// =============================================================================

fn bench_fft2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft2d");

    for size in [8, 16, 32] {
        let input = random_matrix_f32(size, size, 42);
        let mut planner = FftPlanner::new();
        let fft_row = planner.plan_fft_forward(size);
        let fft_col = planner.plan_fft_forward(size);
        let ifft_row = planner.plan_fft_inverse(size);
        let ifft_col = planner.plan_fft_inverse(size);

        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("forward", size), &size, |b, _| {
            b.iter(|| fft2d(black_box(input.view()), &fft_row, &fft_col))
        });

        let freq = fft2d(input.view(), &fft_row, &fft_col);
        group.bench_with_input(BenchmarkId::new("inverse", size), &size, |b, _| {
            b.iter(|| ifft2d(black_box(&freq), &ifft_row, &ifft_col))
        });
    }

    group.finish();
}

// =============================================================================
// WHT Benchmarks
// =============================================================================

fn bench_wht_8x8(c: &mut Criterion) {
    let mut group = c.benchmark_group("wht_8x8");
    let input = random_matrix_f32(8, 8, 123);

    group.throughput(Throughput::Elements(64));

    group.bench_function("forward", |b| {
        b.iter(|| wht2d_8x8_forward(black_box(input.view())))
    });

    let freq = wht2d_8x8_forward(input.view());
    group.bench_function("inverse", |b| {
        b.iter(|| wht2d_8x8_inverse(black_box(&freq)))
    });

    group.finish();
}

// =============================================================================
// Block Matching Benchmarks
// =============================================================================

fn bench_block_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_matching");

    for size in [64, 128, 256] {
        let image = random_matrix_f32(size, size, 42);
        let integral = IntegralImages::new(image.view());

        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("integral_images", size), &size, |b, _| {
            b.iter(|| IntegralImages::new(black_box(image.view())))
        });

        for (window, max_matches) in [(24, 16), (39, 32)] {
            let query = MatchQuery {
                ref_pos: (size / 2, size / 2),
                patch_size: (8, 8),
                search_window: (window, window),
                max_matches,
                step: 3,
            };
            group.bench_with_input(
                BenchmarkId::new(format!("find_similar_8x8_win{}_max{}", window, max_matches), size),
                &size,
                |b, _| b.iter(|| find_similar_patches(black_box(image.view()), &integral, &query)),
            );
        }
    }

    group.finish();
}

// =============================================================================
// Noise Estimation Benchmarks
// =============================================================================

fn bench_noise_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("noise_estimation");
    group.sample_size(20);

    for size in [256, 512] {
        let image = random_matrix_f32(size, size, 42);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::new("db3_mad", size), &size, |b, _| {
            b.iter(|| estimate_noise_sigma(black_box(image.view())))
        });
    }

    group.finish();
}

// =============================================================================
// Full BM3D Pipeline Benchmarks
// =============================================================================

fn bench_bm3d_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm3d_full");
    group.sample_size(10);

    for (size, label) in [(128, "small_128"), (256, "medium_256")] {
        let image = random_matrix_f32(size, size, 42);
        let ht_config = kernel_config::<f32>(2.7);
        let wiener_config = kernel_config::<f32>(0.0);
        let plans = Bm3dPlans::for_config(&ht_config);

        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("hard_threshold", label), &size, |b, _| {
            b.iter(|| {
                run_bm3d_step(
                    black_box(image.view()),
                    image.view(),
                    Bm3dMode::HardThreshold,
                    0.1,
                    &ht_config,
                    &plans,
                )
            })
        });

        let pilot = run_bm3d_step(
            image.view(),
            image.view(),
            Bm3dMode::HardThreshold,
            0.1,
            &ht_config,
            &plans,
        )
        .expect("hard-threshold pass");

        group.bench_with_input(BenchmarkId::new("wiener", label), &size, |b, _| {
            b.iter(|| {
                run_bm3d_step(
                    black_box(image.view()),
                    pilot.view(),
                    Bm3dMode::Wiener,
                    0.1,
                    &wiener_config,
                    &plans,
                )
            })
        });
    }

    group.finish();
}

fn bench_bm3d_color(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm3d_color");
    group.sample_size(10);

    let image = random_rgb(96, 96, 7);
    group.throughput(Throughput::Elements((96 * 96 * 3) as u64));

    for cs in [ColorSpace::Rgb, ColorSpace::Opp] {
        let params = Bm3dParams::default().with_color_space(cs);
        group.bench_function(cs.to_string(), |b| {
            b.iter(|| bm3d(black_box(image.view()), 25.0, &params))
        });
    }

    group.finish();
}

// =============================================================================
// f32 vs f64 Precision Comparison Benchmarks
// =============================================================================

fn bench_precision_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("f32_vs_f64");
    group.sample_size(10);

    let size = 128;
    let image_f32 = random_matrix_f32(size, size, 42);
    let image_f64 = random_matrix_f64(size, size, 42);
    let config_f32 = kernel_config::<f32>(2.7);
    let config_f64 = kernel_config::<f64>(2.7);
    let plans_f32 = Bm3dPlans::for_config(&config_f32);
    let plans_f64 = Bm3dPlans::for_config(&config_f64);

    group.throughput(Throughput::Elements((size * size) as u64));

    group.bench_function("bm3d_128_f32", |b| {
        b.iter(|| {
            run_bm3d_step(
                black_box(image_f32.view()),
                image_f32.view(),
                Bm3dMode::HardThreshold,
                0.1f32,
                &config_f32,
                &plans_f32,
            )
        })
    });

    group.bench_function("bm3d_128_f64", |b| {
        b.iter(|| {
            run_bm3d_step(
                black_box(image_f64.view()),
                image_f64.view(),
                Bm3dMode::HardThreshold,
                0.1f64,
                &config_f64,
                &plans_f64,
            )
        })
    });

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    benches,
    bench_fft2d,
    bench_wht_8x8,
    bench_block_matching,
    bench_noise_estimation,
    bench_bm3d_full,
    bench_bm3d_color,
    bench_precision_comparison,
);

criterion_main!(benches);
