use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::geom::normalize_rect;
use super::language::{LanguageIdentifier, dominant_language, identify_language};
use crate::ocr::Detection;
use crate::region::{OcrData, Region};

/// Result of one detector pass, in pass-precedence order.
#[derive(Debug)]
pub struct PassOutput {
    pub name: String,
    pub result: anyhow::Result<Vec<Detection>>,
}

impl PassOutput {
    pub fn ok(name: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            name: name.into(),
            result: Ok(detections),
        }
    }

    pub fn failed(name: impl Into<String>, err: anyhow::Error) -> Self {
        Self {
            name: name.into(),
            result: Err(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// Every pass failed, so nothing is known about the page.
    #[error("no detections: all {passes} detector passes failed ({failures})")]
    NoDetections { passes: usize, failures: String },
    #[error("source image has no area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Merges detector passes into one page.
///
/// Passes are taken in the order given, most specific script first. The first
/// pass is taken as is. A detection from any later pass is dropped when a
/// region with exactly the same text was already accepted, including one from
/// the same pass. Detections whose rectangle is empty after clamping are
/// dropped too. A
/// failed pass contributes nothing; only when every pass failed is the scan
/// reported as [`ScanError::NoDetections`].
pub fn consolidate(
    width: u32,
    height: u32,
    passes: Vec<PassOutput>,
    identifier: &dyn LanguageIdentifier,
) -> Result<OcrData, ScanError> {
    if width == 0 || height == 0 {
        return Err(ScanError::EmptyImage { width, height });
    }
    let processed_at = now_millis();
    let pass_count = passes.len();
    let mut failures = Vec::new();
    let mut regions: Vec<Region> = Vec::new();

    for (pass_idx, pass) in passes.into_iter().enumerate() {
        let detections = match pass.result {
            Ok(detections) => detections,
            Err(err) => {
                warn!("detector pass '{}' failed: {:#}", pass.name, err);
                failures.push(format!("{}: {}", pass.name, err));
                continue;
            }
        };
        for (det_idx, detection) in detections.into_iter().enumerate() {
            if detection.text.trim().is_empty() {
                continue;
            }
            if pass_idx > 0
                && regions
                    .iter()
                    .any(|region| region.original_text == detection.text)
            {
                debug!(
                    "pass '{}' re-detected '{}'; keeping accepted region",
                    pass.name, detection.text
                );
                continue;
            }
            let Some(bounds) = normalize_rect(&detection.rect, width, height) else {
                debug!(
                    "pass '{}' dropped '{}' with empty rectangle {:?}",
                    pass.name, detection.text, detection.rect
                );
                continue;
            };
            let language = identify_language(identifier, &detection.text);
            let confidence = detection
                .confidence
                .filter(|value| value.is_finite())
                .map(|value| value.clamp(0.0, 1.0))
                .unwrap_or(0.0);
            regions.push(Region {
                id: region_id(processed_at, pass_idx, det_idx, &detection.text),
                bounds,
                original_text: detection.text,
                translated_text: String::new(),
                language,
                confidence,
                is_manually_edited: false,
                custom_font_size: None,
            });
        }
    }

    if pass_count > 0 && failures.len() == pass_count {
        return Err(ScanError::NoDetections {
            passes: pass_count,
            failures: failures.join("; "),
        });
    }

    let dominant_language = dominant_language(&regions);
    info!(
        "consolidated {} regions from {} passes (dominant language: {})",
        regions.len(),
        pass_count,
        dominant_language
    );
    Ok(OcrData {
        regions,
        source_image_width: width,
        source_image_height: height,
        processed_at,
        dominant_language,
    })
}

fn region_id(processed_at: u64, pass_idx: usize, det_idx: usize, text: &str) -> String {
    let seed = format!("{}:{}:{}:{}", processed_at, pass_idx, det_idx, text);
    format!("{:x}", md5::compute(seed.as_bytes()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}
