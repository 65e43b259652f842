use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::process::Command;
use tracing::debug;

use crate::ocr::{Detection, Detector, PageImage};

use super::parse::parse_hocr;

/// One tesseract invocation restricted to a single language pack.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    language: String,
    psm: u32,
}

impl TesseractDetector {
    pub fn new(language: impl Into<String>, psm: u32) -> Self {
        Self {
            language: language.into(),
            psm,
        }
    }
}

impl Detector for TesseractDetector {
    fn name(&self) -> &str {
        &self.language
    }

    fn detect(&self, image: &PageImage) -> Result<Vec<Detection>> {
        if image.bytes.is_empty() {
            return Err(anyhow!("page image has no pixel data"));
        }
        let mut tmp = tempfile::Builder::new()
            .prefix("page-overlay-")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        tmp.write_all(&image.bytes)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let hocr = run_tesseract_hocr(tmp.path(), &self.language, self.psm)?;
        let detections = parse_hocr(&hocr);
        debug!(
            "tesseract pass '{}' (psm {}) found {} lines",
            self.language,
            self.psm,
            detections.len()
        );
        Ok(detections)
    }
}

fn run_tesseract_hocr(path: &std::path::Path, language: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("--dpi")
        .arg("300")
        .arg("hocr")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract -l {} failed: {}", language, stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
