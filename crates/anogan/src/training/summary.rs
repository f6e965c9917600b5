//! Run summaries: human-readable log lines plus named scalar/image records.
//!
//! The training core only sees the [`Summarizer`] trait; nothing it returns
//! can change control flow. [`RunSummarizer`] is the file-backed implementation:
//! log lines go to `log.txt`, scalars to a JSON-lines file, images to PNG grids.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::training::data::ImageBatch;

/// One named summary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    Scalar { name: String, value: f64 },
    Images { name: String, images: ImageBatch },
}

impl Summary {
    pub fn scalar(name: &str, value: f64) -> Self {
        Self::Scalar { name: name.to_string(), value }
    }

    pub fn images(name: &str, images: ImageBatch) -> Self {
        Self::Images { name: name.to_string(), images }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::Images { name, .. } => name,
        }
    }
}

/// Sink for log lines and step summaries.
pub trait Summarizer {
    fn log(&mut self, message: &str);
    fn record(&mut self, step: usize, summaries: &[Summary]);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSummarizer;

impl Summarizer for NullSummarizer {
    fn log(&mut self, _message: &str) {}

    fn record(&mut self, _step: usize, _summaries: &[Summary]) {}
}

/// Keeps log lines and summaries in memory.
#[derive(Debug, Default)]
pub struct RecordingSummarizer {
    pub lines: Vec<String>,
    pub records: Vec<(usize, Vec<Summary>)>,
}

impl RecordingSummarizer {
    /// Every recorded summary named `name`, with its step.
    pub fn named(&self, name: &str) -> Vec<(usize, &Summary)> {
        self.records
            .iter()
            .flat_map(|(step, summaries)| summaries.iter().map(move |s| (*step, s)))
            .filter(|(_, s)| s.name() == name)
            .collect()
    }
}

impl Summarizer for RecordingSummarizer {
    fn log(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }

    fn record(&mut self, step: usize, summaries: &[Summary]) {
        self.records.push((step, summaries.to_vec()));
    }
}

#[derive(Serialize)]
struct ScalarLine<'a> {
    step: usize,
    name: &'a str,
    value: f64,
}

/// Writes `log.txt`, `summaries.jsonl` and `images/<name>_<step>.png` under a directory.
pub struct RunSummarizer {
    dir: PathBuf,
}

impl RunSummarizer {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join("images"))?;
        Ok(Self { dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("log.txt")
    }

    pub fn scalars_path(&self) -> PathBuf {
        self.dir.join("summaries.jsonl")
    }

    pub fn image_path(&self, name: &str, step: usize) -> PathBuf {
        self.dir.join("images").join(format!("{name}_{step:04}.png"))
    }

    fn write_scalars(&self, step: usize, summaries: &[Summary]) -> anyhow::Result<()> {
        let mut lines = String::new();
        for summary in summaries {
            if let Summary::Scalar { name, value } = summary {
                lines.push_str(&serde_json::to_string(&ScalarLine { step, name, value: *value })?);
                lines.push('\n');
            }
        }
        if lines.is_empty() {
            return Ok(());
        }
        append(&self.scalars_path(), &lines)
    }
}

fn append(path: &Path, text: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

impl Summarizer for RunSummarizer {
    fn log(&mut self, message: &str) {
        if let Err(e) = append(&self.log_path(), &format!("{message}\n")) {
            tracing::warn!(error = %e, "Failed to write log line");
        }
    }

    fn record(&mut self, step: usize, summaries: &[Summary]) {
        if let Err(e) = self.write_scalars(step, summaries) {
            tracing::warn!(step, error = %e, "Failed to write scalar summaries");
        }
        for summary in summaries {
            if let Summary::Images { name, images } = summary {
                let path = self.image_path(name, step);
                if let Err(e) = save_image_grid(images, &path) {
                    tracing::warn!(step, name, error = %e, "Failed to write image summary");
                }
            }
        }
    }
}

/// Map a tanh-range value in `[-1, 1]` to a byte.
fn to_byte(v: f32) -> u8 {
    (((v + 1.0) * 0.5).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Tile a batch into a near-square grid and save it as PNG.
///
/// One-channel batches become grayscale; three-channel batches become RGB;
/// anything else is rendered from its first channel.
pub fn save_image_grid(batch: &ImageBatch, path: &Path) -> anyhow::Result<()> {
    let n = batch.len();
    if n == 0 {
        anyhow::bail!("cannot render an empty batch");
    }
    let dims = batch.dims;
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let (h, w) = (dims.height, dims.width);
    let plane = h * w;
    let grid_w = (cols * w) as u32;
    let grid_h = (rows * h) as u32;

    let pixel = |img: &[f32], c: usize, y: usize, x: usize| to_byte(img[c * plane + y * w + x]);

    if dims.channels == 3 {
        let mut out = image::RgbImage::new(grid_w, grid_h);
        for i in 0..n {
            let img = batch.image(i);
            let (ox, oy) = ((i % cols) * w, (i / cols) * h);
            for y in 0..h {
                for x in 0..w {
                    let rgb = [pixel(img, 0, y, x), pixel(img, 1, y, x), pixel(img, 2, y, x)];
                    out.put_pixel((ox + x) as u32, (oy + y) as u32, image::Rgb(rgb));
                }
            }
        }
        out.save(path)?;
    } else {
        let mut out = image::GrayImage::new(grid_w, grid_h);
        for i in 0..n {
            let img = batch.image(i);
            let (ox, oy) = ((i % cols) * w, (i / cols) * h);
            for y in 0..h {
                for x in 0..w {
                    out.put_pixel((ox + x) as u32, (oy + y) as u32, image::Luma([pixel(img, 0, y, x)]));
                }
            }
        }
        out.save(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::data::ImageDims;
    use tempfile::TempDir;

    #[test]
    fn test_to_byte_range() {
        assert_eq!(to_byte(-1.0), 0);
        assert_eq!(to_byte(1.0), 255);
        assert_eq!(to_byte(5.0), 255);
        assert_eq!(to_byte(0.0), 128);
    }

    #[test]
    fn test_scalars_append_as_json_lines() {
        let tmp = TempDir::new().unwrap();
        let mut summarizer = RunSummarizer::new(tmp.path()).unwrap();
        summarizer.record(0, &[Summary::scalar("generator_loss", 0.5), Summary::scalar("discriminator_loss", 1.25)]);
        summarizer.record(1, &[Summary::scalar("generator_loss", 0.25)]);

        let text = std::fs::read_to_string(summarizer.scalars_path()).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["name"], "discriminator_loss");
        assert_eq!(lines[2]["step"], 1);
        assert_eq!(lines[2]["value"], 0.25);
    }

    #[test]
    fn test_log_lines_appended() {
        let tmp = TempDir::new().unwrap();
        let mut summarizer = RunSummarizer::new(tmp.path()).unwrap();
        summarizer.log("Epoch 0: d_loss=1.0");
        summarizer.log("Epoch 1: d_loss=0.9");
        let text = std::fs::read_to_string(summarizer.log_path()).unwrap();
        assert_eq!(text, "Epoch 0: d_loss=1.0\nEpoch 1: d_loss=0.9\n");
    }

    #[test]
    fn test_recording_summarizer_lookup() {
        let mut summarizer = RecordingSummarizer::default();
        summarizer.record(0, &[Summary::scalar("a", 1.0), Summary::scalar("b", 2.0)]);
        summarizer.record(1, &[Summary::scalar("a", 3.0)]);
        let steps: Vec<usize> = summarizer.named("a").iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![0, 1]);
    }

    #[test]
    fn test_image_grid_written() {
        let tmp = TempDir::new().unwrap();
        let mut summarizer = RunSummarizer::new(tmp.path()).unwrap();
        let dims = ImageDims::new(1, 3, 2);
        let batch = ImageBatch::new(dims, (0..30).map(|v| (v as f32 / 15.0) - 1.0).collect()).unwrap();
        summarizer.record(3, &[Summary::images("samples", batch)]);

        let path = summarizer.image_path("samples", 3);
        assert!(path.ends_with("images/samples_0003.png"));
        let img = image::open(&path).unwrap();
        // 5 images → 3 columns × 2 rows of 2×3 tiles.
        assert_eq!((img.width(), img.height()), (6, 6));
    }

    #[test]
    fn test_rgb_grid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rgb.png");
        let batch = ImageBatch::zeros(ImageDims::new(3, 2, 2), 4);
        save_image_grid(&batch, &path).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn test_summary_names() {
        assert_eq!(Summary::scalar("a", 1.0).name(), "a");
        let batch = ImageBatch::zeros(ImageDims::new(1, 1, 1), 1);
        assert_eq!(Summary::images("b", batch).name(), "b");
    }
}
