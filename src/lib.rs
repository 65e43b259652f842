use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub mod logging;
pub mod ocr;
mod paths;
pub mod region;
pub mod settings;
pub mod store;
pub mod translation;

pub use ocr::{
    Detection, Detector, LanguageIdentifier, PageImage, PixelRect, ScanError,
    ScriptLanguageIdentifier,
};
pub use region::{Bounds, Language, OcrData, Region, WriteMode};
pub use store::{FileStore, PageStore};
pub use translation::{BatchTranslator, GeminiTranslator, TranslateError};

use ocr::{FontMeasure, JsonDetector, SurfacePoint, TesseractDetector};
use settings::Settings;

const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
const FALLBACK_FONTS: [&str; 5] = [
    "Noto Sans CJK SC",
    "Noto Sans CJK JP",
    "Source Han Sans SC",
    "PingFang SC",
    "Hiragino Sans",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: Option<String>,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub enum Command {
    Scan {
        image: String,
        page: Option<String>,
        /// Recorded detection files replacing the tesseract passes, in pass order.
        detections: Vec<String>,
    },
    Translate {
        page: String,
        lang: Option<String>,
        key: Option<String>,
        force: bool,
    },
    Edit {
        page: String,
        region: String,
        text: Option<String>,
        reset: bool,
        font_size: Option<f32>,
        auto_size: bool,
    },
    Render {
        page: String,
        image: String,
        output: String,
        width: Option<u32>,
        height: Option<u32>,
        original: bool,
    },
    Hit {
        page: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Layout {
        text: String,
        width: f32,
        height: f32,
        font_size: Option<f32>,
    },
    Show {
        page: String,
        json: bool,
    },
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let store = FileStore::new(settings.store_dir());

    match config.command {
        Command::Scan {
            image,
            page,
            detections,
        } => scan(&settings, &store, &image, page, &detections).await,
        Command::Translate {
            page,
            lang,
            key,
            force,
        } => translate(&settings, &store, &page, lang, key, force).await,
        Command::Edit {
            page,
            region,
            text,
            reset,
            font_size,
            auto_size,
        } => {
            let mut data = load_page(&store, &page)?;
            let target = data
                .region_mut(&region)
                .ok_or_else(|| anyhow!("region '{}' not found on page '{}'", region, page))?;
            if let Some(text) = text {
                target.apply_manual_edit(text);
            }
            if reset {
                target.reset_manual_edit();
            }
            if let Some(size) = font_size {
                if !(size > 0.0) {
                    return Err(anyhow!("font size must be positive"));
                }
                target.custom_font_size = Some(size);
            }
            if auto_size {
                target.custom_font_size = None;
            }
            let output = serde_json::to_string_pretty(target)?;
            store.save(&page, &data)?;
            Ok(output)
        }
        Command::Render {
            page,
            image,
            output,
            width,
            height,
            original,
        } => {
            let data = load_page(&store, &page)?;
            render(&settings, &data, &image, &output, width, height, original)
        }
        Command::Hit {
            page,
            x,
            y,
            width,
            height,
        } => {
            let data = load_page(&store, &page)?;
            let hit = ocr::hit_test(
                SurfacePoint::new(x, y),
                &data.regions,
                data.source_image_width,
                data.source_image_height,
                width,
                height,
            );
            Ok(serde_json::to_string_pretty(&hit)?)
        }
        Command::Layout {
            text,
            width,
            height,
            font_size,
        } => {
            let (measure, _) = overlay_font(&settings)?;
            let result = match font_size {
                Some(size) => ocr::layout_fixed(&text, width, height, size, &measure),
                None => ocr::layout_with(&text, width, height, &measure, &settings.layout),
            };
            Ok(serde_json::to_string_pretty(&result)?)
        }
        Command::Show { page, json } => {
            let data = load_page(&store, &page)?;
            if json {
                return Ok(String::from_utf8_lossy(&data.to_blob()?).to_string());
            }
            Ok(format_page(&page, &data))
        }
    }
}

async fn scan(
    settings: &Settings,
    store: &FileStore,
    image_path: &str,
    page: Option<String>,
    detection_files: &[String],
) -> Result<String> {
    let bytes = std::fs::read(image_path)
        .with_context(|| format!("failed to read image: {}", image_path))?;
    let image = PageImage::from_bytes(bytes)?;
    let detectors: Vec<Arc<dyn Detector>> = if detection_files.is_empty() {
        settings
            .ocr_passes
            .iter()
            .map(|pass| Arc::new(TesseractDetector::new(pass, settings.ocr_psm)) as Arc<dyn Detector>)
            .collect()
    } else {
        detection_files
            .iter()
            .map(|path| {
                let name = Path::new(path)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(path.as_str())
                    .to_string();
                Arc::new(JsonDetector::new(name, path)) as Arc<dyn Detector>
            })
            .collect()
    };
    let page_id = page.unwrap_or_else(|| default_page_id(image_path));
    let data = ocr::scan_page(image, detectors, &ScriptLanguageIdentifier).await?;
    store.save(&page_id, &data)?;
    if data.is_empty() {
        warn!("page '{}' scanned without any text regions", page_id);
    }
    Ok(format_page(&page_id, &data))
}

async fn translate(
    settings: &Settings,
    store: &FileStore,
    page: &str,
    lang: Option<String>,
    key: Option<String>,
    force: bool,
) -> Result<String> {
    let mut data = load_page(store, page)?;
    let key = key
        .filter(|value| !value.trim().is_empty())
        .or_else(|| std::env::var(GEMINI_KEY_ENV).ok())
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("no API key found (set {} or pass --key)", GEMINI_KEY_ENV))?;
    let mut translator = GeminiTranslator::new(key);
    if let Some(model) = settings.translation_model.as_deref() {
        translator = translator.with_model(model);
    }
    let target_lang = lang.unwrap_or_else(|| settings.target_lang.clone());
    let mode = if force {
        WriteMode::Force
    } else {
        WriteMode::RespectManualEdits
    };
    let report = translation::translate_page(&mut data, &translator, &target_lang, mode).await?;
    store.save(page, &data)?;
    Ok(serde_json::to_string_pretty(&report)?)
}

fn render(
    settings: &Settings,
    data: &OcrData,
    image_path: &str,
    output: &str,
    width: Option<u32>,
    height: Option<u32>,
    original: bool,
) -> Result<String> {
    let bytes = std::fs::read(image_path)
        .with_context(|| format!("failed to read image: {}", image_path))?;
    let mime = image::guess_format(&bytes)
        .with_context(|| format!("unrecognized image format: {}", image_path))?
        .to_mime_type();
    let surface_w = width.unwrap_or(data.source_image_width);
    let surface_h = height.unwrap_or(data.source_image_height);

    let (measure, family) = overlay_font(settings)?;
    let mut style = settings.overlay_style();
    if style.font_family.is_none() {
        style.font_family = family;
    }
    if original {
        style.show_translation = false;
    }
    let outcome = ocr::render_svg(&bytes, mime, data, surface_w, surface_h, &style, &measure)?;

    let output_path = Path::new(output);
    let is_svg = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    if is_svg {
        std::fs::write(output_path, &outcome.svg)
            .with_context(|| format!("failed to write SVG: {}", output))?;
    } else {
        let output_mime = image::ImageFormat::from_path(output_path)
            .with_context(|| format!("unsupported output format: {}", output))?
            .to_mime_type();
        let rendered = ocr::render_svg_bytes(&outcome.svg, output_mime, measure.font_data())?;
        std::fs::write(output_path, rendered)
            .with_context(|| format!("failed to write image: {}", output))?;
    }
    let truncated = outcome
        .instructions
        .iter()
        .filter(|instruction| instruction.truncated)
        .count();
    Ok(format!(
        "rendered {} regions to {} ({}x{}, {} truncated)",
        outcome.instructions.len(),
        output,
        surface_w,
        surface_h,
        truncated
    ))
}

/// Measurement font for layout, plus the family name to put in the SVG.
fn overlay_font(settings: &Settings) -> Result<(FontMeasure, Option<String>)> {
    let font_path = settings.overlay_font_path.as_deref().map(Path::new);
    let font_family = settings.overlay_font_family.as_deref();
    if font_path.is_some() || font_family.is_some() {
        let resolved = ocr::resolve_overlay_font(font_path, font_family, &FALLBACK_FONTS)?;
        return Ok((FontMeasure::new(Some(resolved.metrics)), Some(resolved.family)));
    }
    match ocr::resolve_overlay_font(None, None, &FALLBACK_FONTS) {
        Ok(resolved) => Ok((FontMeasure::new(Some(resolved.metrics)), Some(resolved.family))),
        Err(err) => {
            warn!("no overlay font available ({}); using estimated metrics", err);
            Ok((FontMeasure::estimated(), None))
        }
    }
}

fn load_page(store: &FileStore, page: &str) -> Result<OcrData> {
    store
        .load(page)?
        .ok_or_else(|| anyhow!("no usable scan stored for page '{}'", page))
}

fn default_page_id(image_path: &str) -> String {
    Path::new(image_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("page")
        .to_string()
}

fn format_page(page: &str, data: &OcrData) -> String {
    let mut out = format!(
        "page {}: {}x{}, {} regions, dominant language {}, processed {}",
        page,
        data.source_image_width,
        data.source_image_height,
        data.regions.len(),
        data.dominant_language,
        format_processed_at(data.processed_at)
    );
    for region in &data.regions {
        let b = region.bounds;
        out.push_str(&format!(
            "\n{}\t{}\t{:.2}\t[{:.3}, {:.3}, {:.3}, {:.3}]{}\t{}",
            region.id,
            region.language,
            region.confidence,
            b.left,
            b.top,
            b.right,
            b.bottom,
            if region.is_manually_edited { " *" } else { "" },
            region.original_text.replace('\n', " ")
        ));
        if !region.translated_text.is_empty() {
            out.push_str(&format!(" => {}", region.translated_text.replace('\n', " ")));
        }
    }
    out
}

fn format_processed_at(millis: u64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|at| {
            at.format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_else(|| millis.to_string())
}
