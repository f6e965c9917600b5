//! Writes image datasets and anomaly scores to Parquet files using Arrow.

use crate::types::{ImageRecord, ScoreRecord};
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arrow schema for image dataset Parquet files (6 columns).
///
/// `pixels` holds the little-endian `f32` bytes of the flattened image.
pub fn image_schema() -> Schema {
    Schema::new(vec![
        Field::new("split", DataType::Utf8, false),
        Field::new("label", DataType::Int64, false),
        Field::new("channels", DataType::UInt32, false),
        Field::new("height", DataType::UInt32, false),
        Field::new("width", DataType::UInt32, false),
        Field::new("pixels", DataType::Binary, false),
    ])
}

/// Arrow schema for anomaly score Parquet files (4 columns).
pub fn score_schema() -> Schema {
    Schema::new(vec![
        Field::new("index", DataType::UInt64, false),
        Field::new("score", DataType::Float64, false),
        Field::new("label", DataType::Int64, false),
        Field::new("is_anomalous", DataType::Boolean, false),
    ])
}

fn write_batch(path: &Path, schema: Arc<Schema>, batch: RecordBatch) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Buffers image records and writes them to a Parquet file.
pub struct ImageWriter {
    records: Vec<ImageRecord>,
    output_path: PathBuf,
}

impl ImageWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            records: Vec::new(),
            output_path,
        }
    }

    /// Buffer a single image.
    pub fn record(&mut self, record: ImageRecord) {
        self.records.push(record);
    }

    /// Buffer multiple images.
    pub fn record_all(&mut self, records: Vec<ImageRecord>) {
        self.records.extend(records);
    }

    /// Number of buffered images.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered images and return the output path.
    ///
    /// Fails if any record's pixel count disagrees with its declared shape.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(image_schema());
        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_image_batch(&self.records)?
        };
        write_batch(&self.output_path, schema, batch)?;

        tracing::info!(
            images = self.records.len(),
            path = %self.output_path.display(),
            "Wrote image Parquet file"
        );

        Ok(self.output_path)
    }
}

fn build_image_batch(records: &[ImageRecord]) -> anyhow::Result<RecordBatch> {
    for (i, r) in records.iter().enumerate() {
        if r.pixels.len() != r.numel() {
            anyhow::bail!(
                "Image {i} has {} pixels, expected {} ({}x{}x{})",
                r.pixels.len(),
                r.numel(),
                r.channels,
                r.height,
                r.width
            );
        }
    }

    let schema = Arc::new(image_schema());
    let splits: StringArray = records.iter().map(|r| Some(r.split.to_string())).collect();
    let labels: Int64Array = records.iter().map(|r| Some(r.label)).collect();
    let channels: UInt32Array = records.iter().map(|r| Some(r.channels)).collect();
    let heights: UInt32Array = records.iter().map(|r| Some(r.height)).collect();
    let widths: UInt32Array = records.iter().map(|r| Some(r.width)).collect();

    let bytes: Vec<Vec<u8>> = records
        .iter()
        .map(|r| r.pixels.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();
    let pixels: BinaryArray = bytes.iter().map(|b| Some(b.as_slice())).collect();

    let columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(splits),
        Arc::new(labels),
        Arc::new(channels),
        Arc::new(heights),
        Arc::new(widths),
        Arc::new(pixels),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Buffers score records and writes them to a Parquet file.
pub struct ScoreWriter {
    records: Vec<ScoreRecord>,
    output_path: PathBuf,
}

impl ScoreWriter {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            records: Vec::new(),
            output_path,
        }
    }

    /// Build score records from aligned score/label arrays.
    ///
    /// A sample is anomalous iff its label equals `anomalous_label`.
    pub fn from_scores(scores: &[f64], labels: &[i64], anomalous_label: i64) -> anyhow::Result<Vec<ScoreRecord>> {
        if scores.len() != labels.len() {
            anyhow::bail!(
                "Got {} scores but {} labels; arrays must align",
                scores.len(),
                labels.len()
            );
        }
        Ok(scores
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (&score, &label))| ScoreRecord {
                index: i as u64,
                score,
                label,
                is_anomalous: label == anomalous_label,
            })
            .collect())
    }

    pub fn record_all(&mut self, records: Vec<ScoreRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered scores and return the output path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(score_schema());
        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            let indices: UInt64Array = self.records.iter().map(|r| Some(r.index)).collect();
            let scores: Float64Array = self.records.iter().map(|r| Some(r.score)).collect();
            let labels: Int64Array = self.records.iter().map(|r| Some(r.label)).collect();
            let anomalous: BooleanArray = self.records.iter().map(|r| Some(r.is_anomalous)).collect();
            let columns: Vec<Arc<dyn arrow::array::Array>> = vec![
                Arc::new(indices),
                Arc::new(scores),
                Arc::new(labels),
                Arc::new(anomalous),
            ];
            RecordBatch::try_new(schema.clone(), columns)?
        };
        write_batch(&self.output_path, schema, batch)?;

        tracing::info!(
            records = self.records.len(),
            path = %self.output_path.display(),
            "Wrote score Parquet file"
        );

        Ok(self.output_path)
    }
}
