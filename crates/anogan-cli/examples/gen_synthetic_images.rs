//! Generate a synthetic image dataset for smoke-testing `anogan train`.
//!
//! Normal images are smooth Gaussian blobs at random positions. Anomalous
//! test images are either blobs buried in heavy noise or inverted blobs.
//! Pixels are in [-1, 1]; label 0 is normal, 1 is anomalous.
//!
//! Usage: cargo run -p anogan-cli --example gen_synthetic_images -- data/blobs.parquet [side] [n_train] [n_test]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use records::{ImageRecord, ImageWriter, Split};

fn blob(rng: &mut StdRng, side: u32) -> Vec<f32> {
    let s = side as f32;
    let cx = rng.gen_range(0.3 * s..0.7 * s);
    let cy = rng.gen_range(0.3 * s..0.7 * s);
    let sigma = rng.gen_range(0.12 * s..0.22 * s);
    (0..side * side)
        .map(|i| {
            let (y, x) = ((i / side) as f32, (i % side) as f32);
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            2.0 * (-d2 / (2.0 * sigma * sigma)).exp() - 1.0
        })
        .collect()
}

fn anomaly(rng: &mut StdRng, side: u32, noise: &Normal<f32>) -> Vec<f32> {
    let mut pixels = blob(rng, side);
    if rng.gen_bool(0.5) {
        for p in &mut pixels {
            *p = (*p + noise.sample(rng)).clamp(-1.0, 1.0);
        }
    } else {
        for p in &mut pixels {
            *p = -*p;
        }
    }
    pixels
}

fn record(split: Split, label: i64, side: u32, pixels: Vec<f32>) -> ImageRecord {
    ImageRecord {
        split,
        label,
        channels: 1,
        height: side,
        width: side,
        pixels,
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "data/blobs.parquet".to_string());
    let side: u32 = args.next().map(|s| s.parse().unwrap()).unwrap_or(16);
    let n_train: usize = args.next().map(|s| s.parse().unwrap()).unwrap_or(512);
    let n_test: usize = args.next().map(|s| s.parse().unwrap()).unwrap_or(128);
    let path = std::path::PathBuf::from(&output);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(0);
    let noise = Normal::new(0.0f32, 0.6).unwrap();
    let mut writer = ImageWriter::new(path.clone());

    for _ in 0..n_train {
        let pixels = blob(&mut rng, side);
        writer.record(record(Split::Train, 0, side, pixels));
    }
    let mut anomalous = 0;
    for i in 0..n_test {
        // Every fourth test image is anomalous.
        if i % 4 == 3 {
            let pixels = anomaly(&mut rng, side, &noise);
            writer.record(record(Split::Test, 1, side, pixels));
            anomalous += 1;
        } else {
            let pixels = blob(&mut rng, side);
            writer.record(record(Split::Test, 0, side, pixels));
        }
    }

    let count = writer.len();
    writer.finish().unwrap();
    println!(
        "Wrote {count} images ({n_train} train, {n_test} test, {anomalous} anomalous, {side}x{side}) to {}",
        path.display()
    );
}
