use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use super::layout::{LayoutOptions, LayoutResult, TextMeasure, layout_fixed, layout_with};
use crate::region::{OcrData, Region};

/// Rectangle in render-surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub const EMPTY: SurfaceRect = SurfaceRect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, point: SurfacePoint) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }

    fn inset(&self, padding: f32) -> SurfaceRect {
        let pad_x = padding.min(self.width * 0.25).max(0.0);
        let pad_y = padding.min(self.height * 0.25).max(0.0);
        SurfaceRect {
            x: self.x + pad_x,
            y: self.y + pad_y,
            width: self.width - pad_x * 2.0,
            height: self.height - pad_y * 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfacePoint {
    pub x: f32,
    pub y: f32,
}

impl SurfacePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where a `source_w` x `source_h` image lands when fitted (aspect preserved,
/// centered) inside a `surface_w` x `surface_h` surface.
pub fn letterbox(source_w: u32, source_h: u32, surface_w: f32, surface_h: f32) -> SurfaceRect {
    if source_w == 0 || source_h == 0 || !(surface_w > 0.0) || !(surface_h > 0.0) {
        return SurfaceRect::EMPTY;
    }
    let image_aspect = source_w as f32 / source_h as f32;
    let surface_aspect = surface_w / surface_h;
    let (width, height) = if image_aspect > surface_aspect {
        (surface_w, surface_w / image_aspect)
    } else {
        (surface_h * image_aspect, surface_h)
    };
    SurfaceRect {
        x: (surface_w - width) * 0.5,
        y: (surface_h - height) * 0.5,
        width,
        height,
    }
}

/// Maps a region onto the render surface, honoring letterboxing.
pub fn to_render_space(
    region: &Region,
    source_w: u32,
    source_h: u32,
    surface_w: f32,
    surface_h: f32,
) -> SurfaceRect {
    let frame = letterbox(source_w, source_h, surface_w, surface_h);
    if frame.width <= 0.0 || frame.height <= 0.0 {
        return SurfaceRect::EMPTY;
    }
    let scale_x = frame.width / source_w as f32;
    let scale_y = frame.height / source_h as f32;
    let bounds = region.bounds;
    let left = bounds.left * source_w as f32;
    let top = bounds.top * source_h as f32;
    SurfaceRect {
        x: frame.x + left * scale_x,
        y: frame.y + top * scale_y,
        width: bounds.width() * source_w as f32 * scale_x,
        height: bounds.height() * source_h as f32 * scale_y,
    }
}

/// First region, in page order, whose mapped rectangle contains `point`.
pub fn hit_test(
    point: SurfacePoint,
    regions: &[Region],
    source_w: u32,
    source_h: u32,
    surface_w: f32,
    surface_h: f32,
) -> Option<&Region> {
    regions.iter().find(|region| {
        to_render_space(region, source_w, source_h, surface_w, surface_h).contains(point)
    })
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub fill_color: String,
    pub stroke_color: String,
    pub text_color: String,
    pub letterbox_color: String,
    pub font_family: Option<String>,
    pub show_translation: bool,
    /// Outline every region rectangle in addition to the overlay boxes.
    pub debug: bool,
    pub padding: f32,
    pub layout: LayoutOptions,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill_color: "#ffffff".to_string(),
            stroke_color: "#d0d0d0".to_string(),
            text_color: "#111111".to_string(),
            letterbox_color: "#000000".to_string(),
            font_family: None,
            show_translation: true,
            debug: false,
            padding: 2.0,
            layout: LayoutOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawnLine {
    pub text: String,
    pub x: f32,
    /// Baseline.
    pub y: f32,
}

/// Everything needed to paint one region's overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawInstruction {
    pub region_id: String,
    /// Background box, equal to the region's mapped rectangle.
    pub rect: SurfaceRect,
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<DrawnLine>,
    pub truncated: bool,
}

/// Lays out every region of `data` on a `surface_w` x `surface_h` surface.
///
/// Regions with nothing to show or no drawable area are skipped. A region
/// with `custom_font_size` keeps that size and is only wrapped.
pub fn render<M>(
    data: &OcrData,
    surface_w: f32,
    surface_h: f32,
    style: &OverlayStyle,
    measure: &M,
) -> Vec<DrawInstruction>
where
    M: TextMeasure + ?Sized,
{
    let mut instructions = Vec::new();
    for region in &data.regions {
        let rect = to_render_space(
            region,
            data.source_image_width,
            data.source_image_height,
            surface_w,
            surface_h,
        );
        let text = region.display_text(style.show_translation);
        let inner = rect.inset(style.padding);
        let result = layout_region(region, text, &inner, style, measure);
        if result.is_empty() {
            continue;
        }
        let lines = result
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| DrawnLine {
                text: line.clone(),
                x: inner.x,
                y: inner.y + result.font_size + idx as f32 * result.line_height,
            })
            .collect();
        instructions.push(DrawInstruction {
            region_id: region.id.clone(),
            rect,
            font_size: result.font_size,
            line_height: result.line_height,
            lines,
            truncated: result.truncated,
        });
    }
    instructions
}

fn layout_region<M>(
    region: &Region,
    text: &str,
    inner: &SurfaceRect,
    style: &OverlayStyle,
    measure: &M,
) -> LayoutResult
where
    M: TextMeasure + ?Sized,
{
    match region.custom_font_size.filter(|size| *size > 0.0) {
        Some(size) => layout_fixed(text, inner.width, inner.height, size, measure),
        None => layout_with(text, inner.width, inner.height, measure, &style.layout),
    }
}

pub struct RenderOutcome {
    pub svg: String,
    pub instructions: Vec<DrawInstruction>,
}

/// Composes the page image, letterboxed on the surface, with the overlay.
pub fn render_svg<M>(
    image_bytes: &[u8],
    image_mime: &str,
    data: &OcrData,
    surface_w: u32,
    surface_h: u32,
    style: &OverlayStyle,
    measure: &M,
) -> Result<RenderOutcome>
where
    M: TextMeasure + ?Sized,
{
    if surface_w == 0 || surface_h == 0 {
        return Err(anyhow!("render surface has no area ({}x{})", surface_w, surface_h));
    }
    let (width, height) = (surface_w as f32, surface_h as f32);
    let frame = letterbox(data.source_image_width, data.source_image_height, width, height);
    let encoded = BASE64.encode(image_bytes);
    let data_uri = format!("data:{};base64,{}", image_mime, encoded);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = surface_w,
        h = surface_h
    ));
    svg.push_str(&format!(
        r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{fill}"/>"#,
        w = surface_w,
        h = surface_h,
        fill = escape_xml(&style.letterbox_color)
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        x = frame.x,
        y = frame.y,
        w = frame.width,
        h = frame.height
    ));

    let instructions = render(data, width, height, style, measure);
    let font_family = style.font_family.as_deref();
    for (idx, instruction) in instructions.iter().enumerate() {
        let rect = instruction.rect;
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" stroke="{stroke}" stroke-width="1"/>"#,
            x = rect.x,
            y = rect.y,
            w = rect.width,
            h = rect.height,
            fill = escape_xml(&style.fill_color),
            stroke = escape_xml(&style.stroke_color)
        ));
        let clip_id = format!("clip-{}", idx);
        svg.push_str(&format!(
            r#"<clipPath id="{id}"><rect x="{x}" y="{y}" width="{w}" height="{h}"/></clipPath>"#,
            id = clip_id,
            x = rect.x,
            y = rect.y,
            w = rect.width,
            h = rect.height
        ));
        let family_attr = font_family
            .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
            .unwrap_or_default();
        svg.push_str(&format!(
            r#"<text font-size="{size}" fill="{color}"{family} clip-path="url(#{clip})">"#,
            size = instruction.font_size,
            color = escape_xml(&style.text_color),
            family = family_attr,
            clip = clip_id
        ));
        for line in &instruction.lines {
            svg.push_str(&format!(
                r#"<tspan x="{x}" y="{y}">{text}</tspan>"#,
                x = line.x,
                y = line.y,
                text = escape_xml(&line.text)
            ));
        }
        svg.push_str("</text>");
    }

    if style.debug {
        for region in &data.regions {
            let rect = to_render_space(
                region,
                data.source_image_width,
                data.source_image_height,
                width,
                height,
            );
            svg.push_str(&format!(
                r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#00c853" stroke-width="2"/>"##,
                x = rect.x,
                y = rect.y,
                w = rect.width,
                h = rect.height
            ));
        }
    }

    svg.push_str("</svg>");
    Ok(RenderOutcome { svg, instructions })
}

pub fn render_svg_bytes(svg: &str, output_mime: &str, font_data: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let format = image_format_from_mime(output_mime)
        .ok_or_else(|| anyhow!("unsupported output image mime '{}'", output_mime))?;
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut cursor, format)
        .with_context(|| "failed to encode rendered page")?;
    Ok(bytes)
}

fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/webp" => Some(image::ImageFormat::WebP),
        "image/bmp" => Some(image::ImageFormat::Bmp),
        "image/tiff" => Some(image::ImageFormat::Tiff),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Bounds, Language};
    use image::GenericImageView;

    fn region(id: &str, left: f32, top: f32, right: f32, bottom: f32, text: &str) -> Region {
        Region {
            id: id.to_string(),
            bounds: Bounds::clamped(left, top, right, bottom).expect("bounds"),
            original_text: text.to_string(),
            translated_text: String::new(),
            language: Language::Unknown,
            confidence: 1.0,
            is_manually_edited: false,
            custom_font_size: None,
        }
    }

    fn page(width: u32, height: u32, regions: Vec<Region>) -> OcrData {
        OcrData {
            regions,
            source_image_width: width,
            source_image_height: height,
            processed_at: 0,
            dominant_language: Language::Unknown,
        }
    }

    fn mono(text: &str, font_size: f32) -> (f32, f32) {
        (text.chars().count() as f32 * font_size * 0.5, font_size * 1.2)
    }

    fn assert_rect(actual: SurfaceRect, expected: [f32; 4]) {
        let got = [actual.x, actual.y, actual.width, actual.height];
        for (a, e) in got.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-3, "{:?} != {:?}", got, expected);
        }
    }

    #[test]
    fn wide_image_is_width_constrained() {
        assert_rect(letterbox(2000, 1000, 1000.0, 1000.0), [0.0, 250.0, 1000.0, 500.0]);
        let r = region("a", 0.5, 0.5, 1.0, 1.0, "x");
        assert_rect(
            to_render_space(&r, 2000, 1000, 1000.0, 1000.0),
            [500.0, 500.0, 500.0, 250.0],
        );
    }

    #[test]
    fn tall_image_is_height_constrained() {
        assert_rect(letterbox(1000, 2000, 1000.0, 1000.0), [250.0, 0.0, 500.0, 1000.0]);
        let r = region("a", 0.0, 0.0, 0.5, 0.5, "x");
        assert_rect(
            to_render_space(&r, 1000, 2000, 1000.0, 1000.0),
            [250.0, 0.0, 250.0, 500.0],
        );
    }

    #[test]
    fn matching_aspect_fills_the_surface() {
        let r = region("a", 0.1, 0.2, 0.3, 0.4, "x");
        assert_rect(
            to_render_space(&r, 100, 50, 400.0, 200.0),
            [40.0, 40.0, 80.0, 40.0],
        );
    }

    #[test]
    fn degenerate_surface_maps_to_nothing() {
        let r = region("a", 0.1, 0.2, 0.3, 0.4, "x");
        assert_eq!(to_render_space(&r, 100, 50, 0.0, 200.0), SurfaceRect::EMPTY);
        assert_eq!(to_render_space(&r, 0, 50, 400.0, 200.0), SurfaceRect::EMPTY);
    }

    #[test]
    fn hit_test_prefers_earlier_regions() {
        let regions = vec![
            region("first", 0.0, 0.0, 0.6, 0.6, "a"),
            region("second", 0.4, 0.4, 1.0, 1.0, "b"),
        ];
        for _ in 0..3 {
            let hit = hit_test(SurfacePoint::new(50.0, 50.0), &regions, 100, 100, 100.0, 100.0);
            assert_eq!(hit.map(|r| r.id.as_str()), Some("first"));
        }
        let hit = hit_test(SurfacePoint::new(90.0, 90.0), &regions, 100, 100, 100.0, 100.0);
        assert_eq!(hit.map(|r| r.id.as_str()), Some("second"));
    }

    #[test]
    fn hit_test_ignores_letterbox_margins() {
        let regions = vec![region("full", 0.0, 0.0, 1.0, 1.0, "a")];
        assert!(hit_test(SurfacePoint::new(500.0, 100.0), &regions, 2000, 1000, 1000.0, 1000.0).is_none());
        assert!(hit_test(SurfacePoint::new(500.0, 500.0), &regions, 2000, 1000, 1000.0, 1000.0).is_some());
    }

    #[test]
    fn render_prefers_translation_and_skips_empty_regions() {
        let mut translated = region("t", 0.0, 0.0, 1.0, 0.5, "你好");
        translated.translated_text = "Hello".to_string();
        let blank = region("blank", 0.0, 0.5, 1.0, 1.0, " ");
        let data = page(200, 100, vec![translated, blank]);
        let style = OverlayStyle {
            padding: 0.0,
            ..OverlayStyle::default()
        };
        let instructions = render(&data, 200.0, 100.0, &style, &mono);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].region_id, "t");
        assert_eq!(instructions[0].lines[0].text, "Hello");
        assert!(instructions[0].lines[0].y <= instructions[0].rect.bottom());

        let original = OverlayStyle {
            show_translation: false,
            ..style
        };
        let instructions = render(&data, 200.0, 100.0, &original, &mono);
        assert_eq!(instructions[0].lines[0].text, "你好");
    }

    #[test]
    fn custom_font_size_is_kept() {
        let mut r = region("c", 0.0, 0.0, 1.0, 1.0, "Hello world");
        r.custom_font_size = Some(14.0);
        let data = page(400, 400, vec![r]);
        let instructions = render(&data, 400.0, 400.0, &OverlayStyle::default(), &mono);
        assert_eq!(instructions[0].font_size, 14.0);
    }

    #[test]
    fn svg_places_image_inside_the_letterbox_and_escapes_text() {
        let mut r = region("a", 0.0, 0.0, 1.0, 1.0, "<a&b>");
        r.translated_text = String::new();
        let data = page(200, 100, vec![r]);
        let style = OverlayStyle {
            debug: true,
            ..OverlayStyle::default()
        };
        let outcome =
            render_svg(b"png", "image/png", &data, 100, 100, &style, &mono).expect("svg");
        assert!(outcome.svg.contains(r#"x="0" y="25" width="100" height="50""#));
        assert!(outcome.svg.contains("&lt;a&amp;b&gt;"));
        assert!(outcome.svg.contains("#00c853"));
        assert_eq!(outcome.instructions.len(), 1);
        assert!(render_svg(b"png", "image/png", &data, 0, 100, &style, &mono).is_err());
    }

    #[test]
    fn rasterizes_to_png() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="3"><rect x="0" y="0" width="4" height="3" fill="#ff0000"/></svg>"##;
        let bytes = render_svg_bytes(svg, "image/png", None).expect("png");
        let decoded = image::load_from_memory(&bytes).expect("decode");
        assert_eq!(decoded.dimensions(), (4, 3));
        assert!(render_svg_bytes(svg, "image/x-unknown", None).is_err());
    }
}
