use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::ocr::{LayoutOptions, OverlayStyle};
use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    /// Detector passes in precedence order, most specific script first.
    pub ocr_passes: Vec<String>,
    pub ocr_psm: u32,
    pub layout: LayoutOptions,
    pub overlay_padding: f32,
    pub overlay_text_color: String,
    pub overlay_stroke_color: String,
    pub overlay_fill_color: String,
    pub overlay_letterbox_color: String,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<String>,
    pub show_translation: bool,
    pub debug_overlay: bool,
    pub target_lang: String,
    pub translation_model: Option<String>,
    pub store_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            ocr_passes: vec!["chi_sim".to_string(), "jpn".to_string(), "eng".to_string()],
            ocr_psm: 6,
            layout: LayoutOptions::default(),
            overlay_padding: style.padding,
            overlay_text_color: style.text_color,
            overlay_stroke_color: style.stroke_color,
            overlay_fill_color: style.fill_color,
            overlay_letterbox_color: style.letterbox_color,
            overlay_font_family: None,
            overlay_font_path: None,
            show_translation: style.show_translation,
            debug_overlay: style.debug,
            target_lang: "en".to_string(),
            translation_model: None,
            store_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    layout: Option<LayoutSettings>,
    overlay: Option<OverlaySettings>,
    translation: Option<TranslationSettings>,
    storage: Option<StorageSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    passes: Option<Vec<String>>,
    psm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    max_font_size: Option<f32>,
    min_font_size: Option<f32>,
    step: Option<f32>,
    max_iterations: Option<usize>,
    padding: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    text_color: Option<String>,
    stroke_color: Option<String>,
    fill_color: Option<String>,
    letterbox_color: Option<String>,
    font_family: Option<String>,
    font_path: Option<String>,
    show_translation: Option<bool>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    target_lang: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSettings {
    dir: Option<String>,
}

pub fn load_settings(extra_path: Option<&std::path::Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, "embedded defaults")?);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse_settings(&content, &path.display().to_string())?);
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str, origin: &str) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", origin))
}

impl Settings {
    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            fill_color: self.overlay_fill_color.clone(),
            stroke_color: self.overlay_stroke_color.clone(),
            text_color: self.overlay_text_color.clone(),
            letterbox_color: self.overlay_letterbox_color.clone(),
            font_family: self.overlay_font_family.clone(),
            show_translation: self.show_translation,
            debug: self.debug_overlay,
            padding: self.overlay_padding,
            layout: self.layout,
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .as_deref()
            .and_then(paths::resolve_dir)
            .unwrap_or_else(paths::store_dir)
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(passes) = ocr.passes {
                let passes = passes
                    .into_iter()
                    .map(|pass| pass.trim().to_string())
                    .filter(|pass| !pass.is_empty())
                    .collect::<Vec<_>>();
                if !passes.is_empty() {
                    self.ocr_passes = passes;
                }
            }
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
        }
        if let Some(layout) = incoming.layout {
            if let Some(size) = layout.max_font_size
                && size > 0.0
            {
                self.layout.max_font_size = size;
            }
            if let Some(size) = layout.min_font_size
                && size > 0.0
            {
                self.layout.min_font_size = size;
            }
            if let Some(step) = layout.step
                && step > 0.0
            {
                self.layout.step = step;
            }
            if let Some(iterations) = layout.max_iterations
                && iterations > 0
            {
                self.layout.max_iterations = iterations;
            }
            if let Some(padding) = layout.padding
                && padding >= 0.0
            {
                self.overlay_padding = padding;
            }
        }
        if let Some(overlay) = incoming.overlay {
            merge_color(&mut self.overlay_text_color, overlay.text_color);
            merge_color(&mut self.overlay_stroke_color, overlay.stroke_color);
            merge_color(&mut self.overlay_fill_color, overlay.fill_color);
            merge_color(&mut self.overlay_letterbox_color, overlay.letterbox_color);
            if let Some(family) = overlay.font_family
                && !family.trim().is_empty()
            {
                self.overlay_font_family = Some(family);
            }
            if let Some(path) = overlay.font_path
                && !path.trim().is_empty()
            {
                self.overlay_font_path = Some(path);
            }
            if let Some(show) = overlay.show_translation {
                self.show_translation = show;
            }
            if let Some(debug) = overlay.debug {
                self.debug_overlay = debug;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(lang) = translation.target_lang
                && !lang.trim().is_empty()
            {
                self.target_lang = lang.trim().to_string();
            }
            if let Some(model) = translation.model
                && !model.trim().is_empty()
            {
                self.translation_model = Some(model);
            }
        }
        if let Some(storage) = incoming.storage
            && let Some(dir) = storage.dir
            && !dir.trim().is_empty()
        {
            self.store_dir = Some(dir);
        }
    }
}

fn merge_color(target: &mut String, incoming: Option<String>) {
    if let Some(color) = incoming
        && !color.trim().is_empty()
    {
        *target = color;
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
