use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Normalized rectangle, each edge relative to the source image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    /// Clamps every edge into `[0, 1]` and returns `None` when the result has
    /// no width or no height.
    pub fn clamped(left: f32, top: f32, right: f32, bottom: f32) -> Option<Self> {
        let left = clamp_unit(left);
        let top = clamp_unit(top);
        let right = clamp_unit(right);
        let bottom = clamp_unit(bottom);
        if left < right && top < bottom {
            Some(Self {
                left,
                top,
                right,
                bottom,
            })
        } else {
            None
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.left)
            && (0.0..=1.0).contains(&self.top)
            && (0.0..=1.0).contains(&self.right)
            && (0.0..=1.0).contains(&self.bottom)
            && self.left < self.right
            && self.top < self.bottom
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Zh,
    Ja,
    En,
    Unknown,
    Other(String),
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::En => "en",
            Language::Unknown => "unknown",
            Language::Other(tag) => tag,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Language::Unknown)
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        match value.as_str() {
            "zh" => Language::Zh,
            "ja" => Language::Ja,
            "en" => Language::En,
            "unknown" | "" => Language::Unknown,
            _ => Language::Other(value),
        }
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub bounds: Bounds,
    pub original_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default = "unknown_language")]
    pub language: Language,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub is_manually_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_font_size: Option<f32>,
}

fn unknown_language() -> Language {
    Language::Unknown
}

/// Whether an automated translation write may replace a manual edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    RespectManualEdits,
    Force,
}

impl Region {
    /// Text shown on the overlay: the translation when requested and present.
    pub fn display_text(&self, show_translation: bool) -> &str {
        if show_translation && !self.translated_text.trim().is_empty() {
            &self.translated_text
        } else {
            &self.original_text
        }
    }

    pub fn apply_manual_edit(&mut self, text: impl Into<String>) {
        self.translated_text = text.into();
        self.is_manually_edited = true;
    }

    pub fn reset_manual_edit(&mut self) {
        self.is_manually_edited = false;
    }

    /// Writes an automated translation. Returns `false` when the write was
    /// dropped because a human edit owns the text.
    pub fn apply_automated_translation(&mut self, text: impl Into<String>, mode: WriteMode) -> bool {
        if self.is_manually_edited && mode == WriteMode::RespectManualEdits {
            info!(
                "keeping manual edit on region {}; automated translation dropped",
                self.id
            );
            return false;
        }
        self.translated_text = text.into();
        if mode == WriteMode::Force {
            self.is_manually_edited = false;
        }
        true
    }
}

/// Consolidated regions for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrData {
    pub regions: Vec<Region>,
    pub source_image_width: u32,
    pub source_image_height: u32,
    /// Unix epoch milliseconds of the last consolidation.
    #[serde(default)]
    pub processed_at: u64,
    #[serde(default = "unknown_language")]
    pub dominant_language: Language,
}

impl OcrData {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn region_mut(&mut self, id: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|region| region.id == id)
    }

    pub fn to_blob(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a persisted blob. Anything that does not parse or violates the
    /// page invariants reads as "no data".
    pub fn from_blob(bytes: &[u8]) -> Option<Self> {
        let data: OcrData = match serde_json::from_slice(bytes) {
            Ok(data) => data,
            Err(err) => {
                warn!("ignoring malformed page blob: {}", err);
                return None;
            }
        };
        if data.source_image_width == 0 || data.source_image_height == 0 {
            warn!("ignoring page blob with zero image dimensions");
            return None;
        }
        if let Some(bad) = data
            .regions
            .iter()
            .find(|region| !region.bounds.is_valid() || region.original_text.is_empty())
        {
            warn!("ignoring page blob with invalid region {}", bad.id);
            return None;
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, text: &str) -> Region {
        Region {
            id: id.to_string(),
            bounds: Bounds::clamped(0.1, 0.1, 0.4, 0.2).expect("bounds"),
            original_text: text.to_string(),
            translated_text: String::new(),
            language: Language::Unknown,
            confidence: 0.0,
            is_manually_edited: false,
            custom_font_size: None,
        }
    }

    #[test]
    fn clamped_bounds_stay_in_unit_square() {
        let bounds = Bounds::clamped(-0.2, 0.5, 1.4, 0.9).expect("bounds");
        assert_eq!(bounds.left, 0.0);
        assert_eq!(bounds.right, 1.0);
        assert!(bounds.is_valid());
    }

    #[test]
    fn clamped_bounds_reject_empty_area() {
        assert!(Bounds::clamped(0.5, 0.1, 0.5, 0.3).is_none());
        assert!(Bounds::clamped(1.2, 0.1, 1.5, 0.3).is_none());
        assert!(Bounds::clamped(0.1, 0.4, 0.3, 0.2).is_none());
    }

    #[test]
    fn language_tags_round_trip_through_strings() {
        assert_eq!(Language::from("zh".to_string()), Language::Zh);
        assert_eq!(Language::from("".to_string()), Language::Unknown);
        assert_eq!(
            Language::from("ko".to_string()),
            Language::Other("ko".to_string())
        );
        assert_eq!(String::from(Language::Other("ko".to_string())), "ko");
    }

    #[test]
    fn automated_translation_respects_manual_edit() {
        let mut block = region("a", "你好");
        block.apply_manual_edit("Xin chào");
        assert!(!block.apply_automated_translation("Hello", WriteMode::RespectManualEdits));
        assert_eq!(block.translated_text, "Xin chào");
        assert!(block.is_manually_edited);

        assert!(block.apply_automated_translation("Hello", WriteMode::Force));
        assert_eq!(block.translated_text, "Hello");
        assert!(!block.is_manually_edited);
    }

    #[test]
    fn display_text_falls_back_to_original() {
        let mut block = region("a", "你好");
        assert_eq!(block.display_text(true), "你好");
        block.translated_text = "Hello".to_string();
        assert_eq!(block.display_text(true), "Hello");
        assert_eq!(block.display_text(false), "你好");
    }

    #[test]
    fn blob_tolerates_missing_and_unknown_fields() {
        let blob = br#"{
            "regions": [
                {
                    "id": "r1",
                    "bounds": {"left": 0.1, "top": 0.1, "right": 0.4, "bottom": 0.2},
                    "original_text": "Hello",
                    "future_field": 42
                }
            ],
            "source_image_width": 800,
            "source_image_height": 1200
        }"#;
        let data = OcrData::from_blob(blob).expect("blob");
        assert_eq!(data.regions.len(), 1);
        let region = &data.regions[0];
        assert_eq!(region.language, Language::Unknown);
        assert!(region.translated_text.is_empty());
        assert!(!region.is_manually_edited);
        assert_eq!(data.dominant_language, Language::Unknown);
    }

    #[test]
    fn blob_round_trips() {
        let mut block = region("r1", "你好");
        block.language = Language::Zh;
        block.custom_font_size = Some(18.0);
        let data = OcrData {
            regions: vec![block],
            source_image_width: 640,
            source_image_height: 480,
            processed_at: 1_700_000_000_000,
            dominant_language: Language::Zh,
        };
        let blob = data.to_blob().expect("encode");
        assert_eq!(OcrData::from_blob(&blob), Some(data));
    }

    #[test]
    fn malformed_blob_reads_as_no_data() {
        assert!(OcrData::from_blob(b"not json").is_none());
        assert!(OcrData::from_blob(br#"{"regions": []}"#).is_none());
        let zero = br#"{"regions": [], "source_image_width": 0, "source_image_height": 10}"#;
        assert!(OcrData::from_blob(zero).is_none());
        let inverted = br#"{
            "regions": [{"id": "x", "bounds": {"left": 0.5, "top": 0.1, "right": 0.2, "bottom": 0.2}, "original_text": "a"}],
            "source_image_width": 10,
            "source_image_height": 10
        }"#;
        assert!(OcrData::from_blob(inverted).is_none());
    }
}
