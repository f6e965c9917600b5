//! Batches and the data-source interface.
//!
//! Batches are plain host-side buffers; the [`bridge`](crate::model::bridge)
//! turns them into burn tensors. [`InMemoryDataset`] is the data source used
//! by the CLI, built from an image Parquet file via the `records` crate.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use records::{ImageRecord, Split};

/// Shape of a single image: `channels × height × width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageDims {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    /// Values per image.
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Tensor shape of `batch` images.
    pub fn batch_shape(&self, batch: usize) -> [usize; 4] {
        [batch, self.channels, self.height, self.width]
    }
}

/// A batch of images, flattened channel-major, image after image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub dims: ImageDims,
    pub pixels: Vec<f32>,
}

impl ImageBatch {
    /// Wrap a flat buffer. Fails if its length is not a whole number of images.
    pub fn new(dims: ImageDims, pixels: Vec<f32>) -> anyhow::Result<Self> {
        let numel = dims.numel();
        if numel == 0 {
            anyhow::bail!("image dims {dims:?} hold no values");
        }
        if pixels.len() % numel != 0 {
            anyhow::bail!(
                "{} values is not a whole number of {}x{}x{} images",
                pixels.len(),
                dims.channels,
                dims.height,
                dims.width
            );
        }
        Ok(Self { dims, pixels })
    }

    /// An all-zero batch of `len` images.
    pub fn zeros(dims: ImageDims, len: usize) -> Self {
        Self { dims, pixels: vec![0.0; len * dims.numel()] }
    }

    /// Stack individual images into a batch.
    pub fn stack<'a>(dims: ImageDims, images: impl IntoIterator<Item = &'a [f32]>) -> anyhow::Result<Self> {
        let mut pixels = Vec::new();
        for (i, image) in images.into_iter().enumerate() {
            if image.len() != dims.numel() {
                anyhow::bail!("image {i} has {} values, expected {}", image.len(), dims.numel());
            }
            pixels.extend_from_slice(image);
        }
        Self::new(dims, pixels)
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.pixels.len() / self.dims.numel()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixels of image `i`.
    pub fn image(&self, i: usize) -> &[f32] {
        let n = self.dims.numel();
        &self.pixels[i * n..(i + 1) * n]
    }
}

/// A test batch: images plus one integer label per image.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBatch {
    pub images: ImageBatch,
    pub labels: Vec<i64>,
}

/// Finite, restartable batch sequences for training and testing.
pub trait DataSource {
    /// Shape of every image this source yields.
    fn dims(&self) -> ImageDims;

    /// Number of training batches one pass yields.
    fn train_batches_per_epoch(&self) -> usize;

    /// Restart the training sequence.
    fn reset_train(&mut self);

    /// Next training batch, or `None` once the pass is exhausted.
    fn next_train_batch(&mut self) -> Option<ImageBatch>;

    /// Restart the test sequence.
    fn reset_test(&mut self);

    /// Next test batch, or `None` once the test set is exhausted.
    fn next_test_batch(&mut self) -> Option<LabeledBatch>;
}

/// Dataset held in memory.
///
/// Training batches are drawn from a seeded shuffle redone on every
/// [`reset_train`](DataSource::reset_train) and are always full (a trailing
/// partial batch is dropped). Test batches follow insertion order and the
/// last one may be partial.
pub struct InMemoryDataset {
    dims: ImageDims,
    train: Vec<Vec<f32>>,
    test: Vec<(Vec<f32>, i64)>,
    batch_size: usize,
    test_batch_size: usize,
    order: Vec<usize>,
    train_cursor: usize,
    test_cursor: usize,
    rng: StdRng,
}

impl InMemoryDataset {
    pub fn new(
        dims: ImageDims,
        train: Vec<Vec<f32>>,
        test: Vec<(Vec<f32>, i64)>,
        batch_size: usize,
        test_batch_size: usize,
        seed: u64,
    ) -> anyhow::Result<Self> {
        if batch_size == 0 || test_batch_size == 0 {
            anyhow::bail!("batch sizes must be > 0 (got {batch_size} / {test_batch_size})");
        }
        let numel = dims.numel();
        if let Some(i) = train.iter().position(|img| img.len() != numel) {
            anyhow::bail!("train image {i} has {} values, expected {numel}", train[i].len());
        }
        if let Some(i) = test.iter().position(|(img, _)| img.len() != numel) {
            anyhow::bail!("test image {i} has {} values, expected {numel}", test[i].0.len());
        }

        let mut dataset = Self {
            dims,
            order: (0..train.len()).collect(),
            train,
            test,
            batch_size,
            test_batch_size,
            train_cursor: 0,
            test_cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        dataset.reset_train();
        Ok(dataset)
    }

    /// Build from Parquet image records; every record must share one shape.
    pub fn from_records(
        records: Vec<ImageRecord>,
        batch_size: usize,
        test_batch_size: usize,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let first = records
            .first()
            .ok_or_else(|| anyhow::anyhow!("dataset holds no images"))?;
        let dims = ImageDims::new(first.channels as usize, first.height as usize, first.width as usize);

        let mut train = Vec::new();
        let mut test = Vec::new();
        for (i, r) in records.into_iter().enumerate() {
            let shape = ImageDims::new(r.channels as usize, r.height as usize, r.width as usize);
            if shape != dims {
                anyhow::bail!("image {i} has shape {shape:?}, expected {dims:?}");
            }
            match r.split {
                Split::Train => train.push(r.pixels),
                Split::Test => test.push((r.pixels, r.label)),
            }
        }

        tracing::info!(
            train = train.len(),
            test = test.len(),
            channels = dims.channels,
            height = dims.height,
            width = dims.width,
            "Loaded in-memory dataset"
        );

        Self::new(dims, train, test, batch_size, test_batch_size, seed)
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

impl DataSource for InMemoryDataset {
    fn dims(&self) -> ImageDims {
        self.dims
    }

    fn train_batches_per_epoch(&self) -> usize {
        self.train.len() / self.batch_size
    }

    fn reset_train(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.train_cursor = 0;
    }

    fn next_train_batch(&mut self) -> Option<ImageBatch> {
        let end = self.train_cursor + self.batch_size;
        if end > self.order.len() {
            return None;
        }
        let mut pixels = Vec::with_capacity(self.batch_size * self.dims.numel());
        for &idx in &self.order[self.train_cursor..end] {
            pixels.extend_from_slice(&self.train[idx]);
        }
        self.train_cursor = end;
        Some(ImageBatch { dims: self.dims, pixels })
    }

    fn reset_test(&mut self) {
        self.test_cursor = 0;
    }

    fn next_test_batch(&mut self) -> Option<LabeledBatch> {
        if self.test_cursor >= self.test.len() {
            return None;
        }
        let end = (self.test_cursor + self.test_batch_size).min(self.test.len());
        let mut pixels = Vec::with_capacity((end - self.test_cursor) * self.dims.numel());
        let mut labels = Vec::with_capacity(end - self.test_cursor);
        for (image, label) in &self.test[self.test_cursor..end] {
            pixels.extend_from_slice(image);
            labels.push(*label);
        }
        self.test_cursor = end;
        Some(LabeledBatch {
            images: ImageBatch { dims: self.dims, pixels },
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ImageDims {
        ImageDims::new(1, 2, 2)
    }

    fn make_dataset(n_train: usize, n_test: usize, batch: usize, test_batch: usize) -> InMemoryDataset {
        let train = (0..n_train).map(|i| vec![i as f32; 4]).collect();
        let test = (0..n_test).map(|i| (vec![i as f32; 4], (i % 2) as i64)).collect();
        InMemoryDataset::new(dims(), train, test, batch, test_batch, 7).unwrap()
    }

    #[test]
    fn test_image_batch_len_and_access() {
        let batch = ImageBatch::new(dims(), (0..12).map(|v| v as f32).collect()).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.image(1), &[4.0, 5.0, 6.0, 7.0]);
        assert!(ImageBatch::new(dims(), vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_stack_checks_sizes() {
        let a = [1.0_f32; 4];
        let b = [2.0_f32; 3];
        assert!(ImageBatch::stack(dims(), [&a[..], &b[..]]).is_err());
        let ok = ImageBatch::stack(dims(), [&a[..], &a[..]]).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn test_train_batches_are_full_and_cover_a_permutation() {
        let mut ds = make_dataset(10, 0, 3, 1);
        assert_eq!(ds.train_batches_per_epoch(), 3);

        let mut seen = Vec::new();
        while let Some(batch) = ds.next_train_batch() {
            assert_eq!(batch.len(), 3);
            for i in 0..batch.len() {
                seen.push(batch.image(i)[0] as usize);
            }
        }
        assert_eq!(seen.len(), 9);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 9, "No image should repeat within one pass");
    }

    #[test]
    fn test_reset_train_restarts() {
        let mut ds = make_dataset(4, 0, 2, 1);
        assert!(ds.next_train_batch().is_some());
        assert!(ds.next_train_batch().is_some());
        assert!(ds.next_train_batch().is_none());
        ds.reset_train();
        assert!(ds.next_train_batch().is_some());
    }

    #[test]
    fn test_test_batches_in_order_with_partial_tail() {
        let mut ds = make_dataset(0, 5, 1, 2);
        let sizes: Vec<usize> = std::iter::from_fn(|| ds.next_test_batch())
            .map(|b| {
                assert_eq!(b.images.len(), b.labels.len());
                b.labels.len()
            })
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        ds.reset_test();
        let first = ds.next_test_batch().unwrap();
        assert_eq!(first.images.image(0)[0], 0.0);
        assert_eq!(first.labels, vec![0, 1]);
    }

    #[test]
    fn test_from_records_splits_and_rejects_mixed_shapes() {
        let rec = |split, label, channels| ImageRecord {
            split,
            label,
            channels,
            height: 2,
            width: 2,
            pixels: vec![0.5; 4 * channels as usize],
        };
        let ds = InMemoryDataset::from_records(
            vec![rec(Split::Train, 0, 1), rec(Split::Test, 1, 1), rec(Split::Train, 0, 1)],
            1,
            1,
            0,
        )
        .unwrap();
        assert_eq!(ds.train_len(), 2);
        assert_eq!(ds.test_len(), 1);

        let mixed = InMemoryDataset::from_records(vec![rec(Split::Train, 0, 1), rec(Split::Train, 0, 3)], 1, 1, 0);
        assert!(mixed.is_err());
    }
}
