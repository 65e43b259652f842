use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

use crate::ocr::script::is_cjk_char;
use crate::region::{Language, Region};

/// Best-effort language identification for a detected text.
pub trait LanguageIdentifier: Send + Sync {
    /// Returns a raw language tag such as `zh-Hant`, `en` or `und`.
    fn identify(&self, text: &str) -> Result<String>;
}

impl<F> LanguageIdentifier for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn identify(&self, text: &str) -> Result<String> {
        self(text)
    }
}

/// Script-count identifier used when no model-backed identifier is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptLanguageIdentifier;

impl LanguageIdentifier for ScriptLanguageIdentifier {
    fn identify(&self, text: &str) -> Result<String> {
        let mut kana = 0usize;
        let mut han = 0usize;
        let mut latin = 0usize;
        for ch in text.chars() {
            if matches!(ch as u32, 0x3040..=0x30FF | 0x31F0..=0x31FF) {
                kana += 1;
            } else if is_cjk_char(ch) {
                han += 1;
            } else if ch.is_ascii_alphabetic() {
                latin += 1;
            }
        }
        let tag = if kana > 0 {
            "ja"
        } else if han > 0 && han >= latin {
            "zh"
        } else if latin > 0 {
            "en"
        } else {
            "und"
        };
        Ok(tag.to_string())
    }
}

const KNOWN_PREFIXES: [(&str, Language); 3] = [
    ("zh", Language::Zh),
    ("ja", Language::Ja),
    ("en", Language::En),
];

/// Maps raw identifier output onto the region language set.
pub fn normalize_language_tag(raw: &str) -> Language {
    let tag = raw.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case("und") || tag.eq_ignore_ascii_case("unknown") {
        return Language::Unknown;
    }
    let lower = tag.to_ascii_lowercase();
    for (prefix, language) in KNOWN_PREFIXES {
        if lower.starts_with(prefix) {
            return language;
        }
    }
    Language::Other(tag.to_string())
}

pub(super) fn identify_language(identifier: &dyn LanguageIdentifier, text: &str) -> Language {
    match identifier.identify(text) {
        Ok(raw) => normalize_language_tag(&raw),
        Err(err) => {
            debug!("language identification failed: {}", err);
            Language::Unknown
        }
    }
}

/// Most frequent language among `regions`, ignoring `unknown` unless nothing
/// else is present. Ties go to the language seen first in region order.
pub fn dominant_language(regions: &[Region]) -> Language {
    let mut counts: HashMap<&Language, (usize, usize)> = HashMap::new();
    for (order, region) in regions.iter().enumerate() {
        counts.entry(&region.language).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .filter(|(language, _)| !language.is_unknown())
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(language, _)| language.clone())
        .unwrap_or(Language::Unknown)
}
