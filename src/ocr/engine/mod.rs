mod consolidate;
mod geom;
mod json;
mod language;
mod parse;
mod tesseract;
mod text;

use anyhow::anyhow;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::info;

use crate::ocr::{Detector, PageImage};
use crate::region::OcrData;

pub use consolidate::{PassOutput, ScanError, consolidate};
pub use json::JsonDetector;
pub use language::{
    LanguageIdentifier, ScriptLanguageIdentifier, dominant_language, normalize_language_tag,
};
pub use tesseract::TesseractDetector;

/// Runs every detector over the same page concurrently. Outputs come back in
/// detector order regardless of completion order.
pub async fn detect_passes(
    image: Arc<PageImage>,
    detectors: Vec<Arc<dyn Detector>>,
) -> Vec<PassOutput> {
    let handles = detectors.into_iter().map(|detector| {
        let image = Arc::clone(&image);
        let name = detector.name().to_string();
        let handle = tokio::task::spawn_blocking(move || detector.detect(&image));
        async move {
            match handle.await {
                Ok(result) => PassOutput { name, result },
                Err(err) => PassOutput::failed(name, anyhow!("detector task panicked: {}", err)),
            }
        }
    });
    join_all(handles).await
}

/// Detects and consolidates one page.
pub async fn scan_page(
    image: PageImage,
    detectors: Vec<Arc<dyn Detector>>,
    identifier: &dyn LanguageIdentifier,
) -> Result<OcrData, ScanError> {
    let (width, height) = (image.width, image.height);
    if width == 0 || height == 0 {
        return Err(ScanError::EmptyImage { width, height });
    }
    info!("scanning {}x{} page with {} passes", width, height, detectors.len());
    let passes = detect_passes(Arc::new(image), detectors).await;
    consolidate(width, height, passes, identifier)
}
