//! Tensor bridge: conversions between host-side batches (`Vec<f32>`) and
//! burn tensors.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::training::data::{ImageBatch, ImageDims};

/// Convert an image batch to a `(batch, channels, height, width)` tensor.
pub fn images_to_tensor<B: Backend>(batch: &ImageBatch, device: &B::Device) -> Tensor<B, 4> {
    let shape = batch.dims.batch_shape(batch.len());
    Tensor::from_data(TensorData::new(batch.pixels.clone(), shape), device)
}

/// Convert a row-major `rows × cols` buffer to a 2D tensor.
///
/// # Panics
/// Panics if `values.len() != rows * cols`.
pub fn matrix_to_tensor<B: Backend>(
    values: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    assert_eq!(
        values.len(),
        rows * cols,
        "buffer of {} values cannot be shaped {rows}x{cols}",
        values.len()
    );
    Tensor::from_data(TensorData::new(values.to_vec(), [rows, cols]), device)
}

/// Convert a label vector to a `(batch, 1)` column tensor.
pub fn column_to_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    matrix_to_tensor(values, values.len(), 1, device)
}

/// Flatten any tensor to host `f32` values.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> anyhow::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {e:?}"))
}

/// Extract per-row values of a `(batch, 1)` or `(batch,)`-like tensor as f64.
pub fn tensor_to_f64s<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> anyhow::Result<Vec<f64>> {
    Ok(tensor_to_vec(tensor)?.into_iter().map(f64::from).collect())
}

/// Extract a single f64 scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}

/// Convert a `(batch, channels, height, width)` tensor back to an image batch.
pub fn tensor_to_images<B: Backend>(tensor: Tensor<B, 4>) -> anyhow::Result<ImageBatch> {
    let [_, channels, height, width] = tensor.dims();
    let pixels = tensor_to_vec(tensor)?;
    ImageBatch::new(ImageDims::new(channels, height, width), pixels)
}
