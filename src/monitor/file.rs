use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::monitor::{ImageGrid, MetricsSink, VisualizationSink};

/// Appends one JSON object per scalar to `<dir>/metrics.jsonl` and writes the
/// run configuration to `<dir>/run_config.json`.
pub struct JsonlMetrics {
    dir: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlMetrics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: None,
        }
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join("metrics.jsonl")
    }

    pub fn run_config_path(&self) -> PathBuf {
        self.dir.join("run_config.json")
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.metrics_path())?;
            self.writer = Some(BufWriter::new(file));
        }

        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("metrics writer unavailable"))
    }

    fn append(&mut self, tag: &str, value: f64, step: usize) -> io::Result<()> {
        let line = json!({ "tag": tag, "value": value, "step": step });
        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl MetricsSink for JsonlMetrics {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: usize) {
        if let Err(err) = self.append(tag, value, step) {
            warn!(tag, step, %err, "dropping scalar");
        }
    }

    fn emit_run_config(&mut self, config: &BTreeMap<String, String>) {
        let path = self.run_config_path();
        if let Err(err) = write_json(&path, config) {
            warn!(path = %path.display(), %err, "cannot record run configuration");
        }
    }
}

/// Writes each snapshot to `<dir>/<tag>/<step>.json`.
pub struct ImageDump {
    dir: PathBuf,
}

impl ImageDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, tag: &str, step: usize) -> PathBuf {
        let tag = tag.replace(['/', '\\', ' '], "_");
        self.dir.join(tag).join(format!("{step}.json"))
    }
}

impl VisualizationSink for ImageDump {
    fn emit_image(&mut self, tag: &str, grid: &ImageGrid, step: usize) {
        let path = self.path_for(tag, step);
        if let Err(err) = write_json(&path, grid) {
            warn!(tag, step, path = %path.display(), %err, "dropping image snapshot");
        }
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = JsonlMetrics::new(dir.path().join("run"));

        metrics.emit_scalar("Loss/train", 0.5, 0);
        metrics.emit_scalar("Loss/train", 0.25, 1);

        let content = fs::read_to_string(metrics.metrics_path()).unwrap();
        let lines = content
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["value"], 0.25);
        assert_eq!(lines[1]["step"], 1);
    }

    #[test]
    fn run_config_is_a_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = JsonlMetrics::new(dir.path());

        let config = BTreeMap::from([("batch_size".to_string(), "32".to_string())]);
        metrics.emit_run_config(&config);

        let content = fs::read_to_string(metrics.run_config_path()).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn images_land_under_their_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = ImageDump::new(dir.path());
        let grid = ImageGrid {
            shape: [1, 1, 1, 2],
            pixels: vec![0.0, 1.0],
        };

        images.emit_image("Epoch1 reconstructions", &grid, 3);

        let path = dir.path().join("Epoch1_reconstructions").join("3.json");
        assert!(path.exists());
    }

    #[test]
    fn unwritable_sink_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut metrics = JsonlMetrics::new(&blocker);
        metrics.emit_scalar("Loss/test", 1.0, 0);

        assert!(!blocker.join("metrics.jsonl").exists());
    }
}
