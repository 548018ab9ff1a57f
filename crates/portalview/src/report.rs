use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const REPORT_FILE: &str = "frames.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub index: u32,
    pub time_secs: f64,
    /// Progress of the simulated window, `None` once it has finished.
    pub progress: Option<f32>,
    pub active: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub backend: String,
    pub fps: f64,
    pub duration_secs: f64,
    pub textured: bool,
    pub frames: Vec<FrameRecord>,
}

impl FrameReport {
    pub fn new(backend: &str, fps: f64, duration_secs: f64, textured: bool) -> Self {
        Self {
            backend: backend.to_string(),
            fps,
            duration_secs,
            textured,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: FrameRecord) {
        self.frames.push(frame);
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self).context("failed to serialise frame report")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write frame report {}", path.display()))
    }
}
