//! Benchmarks for the windowing transforms on training-sized spectrograms.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use songprep::transforms::{
    pad_to_window, random_window, standardize_spect, view_as_window_batch, SpectScaler,
};

/// Synthetic spectrogram: 257 frequency bins, ~10s of 2ms time bins.
fn make_spect() -> Array2<f64> {
    Array2::from_shape_fn((257, 5000), |(r, c)| {
        ((r * 31 + c * 7) as f64 * 0.01).sin()
    })
}

fn bench_pad_to_window(c: &mut Criterion) {
    let spect = make_spect();
    c.bench_function("pad_to_window_176", |b| {
        b.iter(|| pad_to_window(black_box(&spect), 176, 0.0).unwrap())
    });
}

fn bench_view_as_window_batch(c: &mut Criterion) {
    let spect = make_spect();
    let (padded, _) = pad_to_window(&spect, 176, 0.0).unwrap();
    c.bench_function("view_as_window_batch_176", |b| {
        b.iter(|| view_as_window_batch(black_box(&padded), 176).unwrap())
    });
}

fn bench_random_window(c: &mut Criterion) {
    let spect = make_spect();
    let mut rng = StdRng::seed_from_u64(42);
    c.bench_function("random_window_176", |b| {
        b.iter(|| {
            random_window(black_box(&spect), 176, &mut rng)
                .unwrap()
                .to_owned()
        })
    });
}

fn bench_standardize(c: &mut Criterion) {
    let spect = make_spect();
    let scaler = SpectScaler::fit([spect.view()]).unwrap();
    let (window, _) = pad_to_window(&spect, 176, 0.0).unwrap();
    c.bench_function("standardize_full", |b| {
        b.iter(|| {
            standardize_spect(
                black_box(&window),
                scaler.mean_freqs(),
                scaler.std_freqs(),
                scaler.non_zero_std(),
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_pad_to_window,
    bench_view_as_window_batch,
    bench_random_window,
    bench_standardize
);
criterion_main!(benches);
