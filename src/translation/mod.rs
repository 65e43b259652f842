mod gemini;

use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, info};

use crate::region::{OcrData, WriteMode};

pub use gemini::{DEFAULT_MODEL, GeminiTranslator};

/// Resolves to one translation per input text, in input order.
pub type TranslateFuture = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send>>;

/// Translates a whole page's texts in one call.
pub trait BatchTranslator: Send + Sync {
    fn translate_batch(&self, texts: Vec<String>, target_lang: &str) -> TranslateFuture;
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation batch failed: {0:#}")]
    Batch(anyhow::Error),
    #[error("translation batch misaligned: sent {sent} texts, received {received}")]
    Misaligned { sent: usize, received: usize },
}

/// Texts captured for one batch call, keyed by region id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub written: usize,
    /// Automated writes dropped because the region was edited by hand.
    pub kept_manual: usize,
    /// Ids that no longer exist on the page.
    pub stale: usize,
}

/// Regions whose text should go to the translator. Manually edited regions
/// are left out unless `mode` is [`WriteMode::Force`].
pub fn pending_translations(data: &OcrData, mode: WriteMode) -> PendingBatch {
    let mut batch = PendingBatch::default();
    for region in &data.regions {
        if region.is_manually_edited && mode == WriteMode::RespectManualEdits {
            continue;
        }
        batch.ids.push(region.id.clone());
        batch.texts.push(region.original_text.clone());
    }
    batch
}

/// Writes a finished batch back by region id.
///
/// The manual-edit flag is checked again here, so an edit made while the
/// batch was in flight wins. A batch whose length does not match `ids` is
/// rejected whole and the page is left untouched.
pub fn merge_translations(
    data: &mut OcrData,
    ids: &[String],
    translations: Vec<String>,
    mode: WriteMode,
) -> Result<MergeReport, TranslateError> {
    if ids.len() != translations.len() {
        return Err(TranslateError::Misaligned {
            sent: ids.len(),
            received: translations.len(),
        });
    }
    let mut report = MergeReport::default();
    for (id, translation) in ids.iter().zip(translations) {
        let Some(region) = data.region_mut(id) else {
            debug!("region {} vanished before its translation arrived", id);
            report.stale += 1;
            continue;
        };
        if region.apply_automated_translation(translation, mode) {
            report.written += 1;
        } else {
            report.kept_manual += 1;
        }
    }
    Ok(report)
}

/// Collects, translates and merges one page.
pub async fn translate_page(
    data: &mut OcrData,
    translator: &dyn BatchTranslator,
    target_lang: &str,
    mode: WriteMode,
) -> Result<MergeReport, TranslateError> {
    let batch = pending_translations(data, mode);
    if batch.is_empty() {
        return Ok(MergeReport::default());
    }
    info!("translating {} regions into {}", batch.len(), target_lang);
    let translations = translator
        .translate_batch(batch.texts, target_lang)
        .await
        .map_err(TranslateError::Batch)?;
    merge_translations(data, &batch.ids, translations, mode)
}
