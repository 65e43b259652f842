mod engine;
mod font;
mod layout;
mod render;
pub mod script;

use anyhow::{Context, Result};
use image::GenericImageView;
use serde::{Deserialize, Serialize};

pub use engine::{
    JsonDetector, LanguageIdentifier, PassOutput, ScanError, ScriptLanguageIdentifier,
    TesseractDetector, consolidate, detect_passes, dominant_language, normalize_language_tag,
    scan_page,
};
pub use font::{FontMeasure, FontMetrics, ResolvedOverlayFont, load_font_metrics, resolve_overlay_font};
pub use layout::{LayoutOptions, LayoutResult, TextMeasure, TextSize, layout, layout_fixed, layout_with};
pub use render::{
    DrawInstruction, DrawnLine, OverlayStyle, RenderOutcome, SurfacePoint, SurfaceRect, hit_test,
    letterbox, render, render_svg, render_svg_bytes, to_render_space,
};

/// Pixel rectangle as reported by a detector. Edges may fall outside the
/// image; consolidation clamps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// One text block found by a detector pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub rect: PixelRect,
    pub text: String,
    /// Detector confidence in `[0, 1]`, when the detector reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(rect: PixelRect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
            confidence: None,
        }
    }
}

/// Source page handed to every detector pass.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl PageImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let image =
            image::load_from_memory(&bytes).with_context(|| "failed to decode page image")?;
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            bytes,
        })
    }

    /// Dimensions only, for detectors that never look at pixels.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes: Vec::new(),
        }
    }
}

/// A single script-specific recognizer pass.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, image: &PageImage) -> Result<Vec<Detection>>;
}
