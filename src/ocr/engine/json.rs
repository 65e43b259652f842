use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::ocr::{Detection, Detector, PageImage};

/// Replays detections recorded by an external recognizer.
///
/// The file holds a JSON array of `{"rect": {..}, "text": .., "confidence": ..}`
/// objects in image pixels.
#[derive(Debug, Clone)]
pub struct JsonDetector {
    name: String,
    path: PathBuf,
}

impl JsonDetector {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl Detector for JsonDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _image: &PageImage) -> Result<Vec<Detection>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read detections: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse detections: {}", self.path.display()))
    }
}
