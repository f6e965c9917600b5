//! Reads image datasets and anomaly scores back from Parquet files.

use crate::metrics::compute_metrics;
use crate::types::{ImageRecord, ScoreRecord, ScoreSummary, Split};
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::Path;

fn read_batches(path: &Path) -> anyhow::Result<Vec<RecordBatch>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch_result in reader {
        batches.push(batch_result?);
    }
    Ok(batches)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Column {index} ({name}) is not {}",
                std::any::type_name::<T>().rsplit("::").next().unwrap_or("the expected type")
            )
        })
}

/// Static methods for reading image datasets.
pub struct ImageReader;

impl ImageReader {
    /// Read every image in file order.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<ImageRecord>> {
        let mut records = Vec::new();
        for batch in read_batches(path)? {
            records.append(&mut extract_images(&batch)?);
        }

        tracing::debug!(
            count = records.len(),
            path = %path.display(),
            "Read image records"
        );

        Ok(records)
    }

    /// Read only the images of one split, in file order.
    pub fn read_split(path: &Path, split: Split) -> anyhow::Result<Vec<ImageRecord>> {
        let records = Self::read_all(path)?;
        Ok(records.into_iter().filter(|r| r.split == split).collect())
    }
}

fn extract_images(batch: &RecordBatch) -> anyhow::Result<Vec<ImageRecord>> {
    let splits = column::<StringArray>(batch, 0, "split")?;
    let labels = column::<Int64Array>(batch, 1, "label")?;
    let channels = column::<UInt32Array>(batch, 2, "channels")?;
    let heights = column::<UInt32Array>(batch, 3, "height")?;
    let widths = column::<UInt32Array>(batch, 4, "width")?;
    let pixels = column::<BinaryArray>(batch, 5, "pixels")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let split = Split::parse(splits.value(i))
            .ok_or_else(|| anyhow::anyhow!("Row {i}: unknown split {:?}", splits.value(i)))?;
        let bytes = pixels.value(i);
        if bytes.len() % 4 != 0 {
            anyhow::bail!("Row {i}: pixel blob of {} bytes is not a whole number of f32", bytes.len());
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let record = ImageRecord {
            split,
            label: labels.value(i),
            channels: channels.value(i),
            height: heights.value(i),
            width: widths.value(i),
            pixels: values,
        };
        if record.pixels.len() != record.numel() {
            anyhow::bail!(
                "Row {i}: {} pixels do not match shape {}x{}x{}",
                record.pixels.len(),
                record.channels,
                record.height,
                record.width
            );
        }
        records.push(record);
    }
    Ok(records)
}

/// Static methods for reading anomaly score files.
pub struct ScoreReader;

impl ScoreReader {
    /// Read all score records in evaluation order.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<ScoreRecord>> {
        let mut records = Vec::new();
        for batch in read_batches(path)? {
            let indices = column::<UInt64Array>(&batch, 0, "index")?;
            let scores = column::<Float64Array>(&batch, 1, "score")?;
            let labels = column::<Int64Array>(&batch, 2, "label")?;
            let anomalous = column::<BooleanArray>(&batch, 3, "is_anomalous")?;
            for i in 0..batch.num_rows() {
                records.push(ScoreRecord {
                    index: indices.value(i),
                    score: scores.value(i),
                    label: labels.value(i),
                    is_anomalous: anomalous.value(i),
                });
            }
        }
        Ok(records)
    }

    /// Compute counts and detection metrics from a score file.
    pub fn read_summary(path: &Path) -> anyhow::Result<ScoreSummary> {
        let records = Self::read_all(path)?;
        let scores: Vec<f64> = records.iter().map(|r| r.score).collect();
        let flags: Vec<bool> = records.iter().map(|r| r.is_anomalous).collect();
        let anomalous_count = flags.iter().filter(|&&a| a).count();
        let mean_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        Ok(ScoreSummary {
            total_records: records.len(),
            anomalous_count,
            normal_count: records.len() - anomalous_count,
            mean_score,
            metrics: compute_metrics(&scores, &flags),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ScoreWriter;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let err = ScoreReader::read_all(&tmp.path().join("absent.parquet")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"), "Unexpected error: {err}");
    }

    #[test]
    fn test_empty_score_file_summary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.parquet");
        ScoreWriter::new(path.clone()).finish().unwrap();

        let summary = ScoreReader::read_summary(&path).unwrap();
        assert_eq!(summary.total_records, 0);
        assert_eq!(summary.mean_score, 0.0);
        assert!(summary.metrics.is_none());
    }
}
