use serde::{Deserialize, Serialize};
use tracing::debug;

use super::script::{BreakKind, BreakUnit, break_units};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSize {
    pub width: f32,
    pub height: f32,
}

/// Measures a single line of text at a font size. `height` is the line box
/// height used to stack wrapped lines.
pub trait TextMeasure {
    fn measure(&self, text: &str, font_size: f32) -> TextSize;
}

impl<F> TextMeasure for F
where
    F: Fn(&str, f32) -> (f32, f32),
{
    fn measure(&self, text: &str, font_size: f32) -> TextSize {
        let (width, height) = self(text, font_size);
        TextSize { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub max_font_size: f32,
    pub min_font_size: f32,
    pub step: f32,
    /// Grid sizes tried per layout. When the grid is longer, large boxes
    /// start lower so the search still reaches `min_font_size`.
    pub max_iterations: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_font_size: 40.0,
            min_font_size: 12.0,
            step: 2.0,
            max_iterations: 15,
        }
    }
}

impl LayoutOptions {
    fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let min_font_size = if self.min_font_size > 0.0 {
            self.min_font_size
        } else {
            defaults.min_font_size
        };
        let max_font_size = if self.max_font_size.is_finite() {
            self.max_font_size.max(min_font_size)
        } else {
            defaults.max_font_size.max(min_font_size)
        };
        let step = if self.step > 0.0 && self.step.is_finite() {
            self.step
        } else {
            defaults.step
        };
        Self {
            max_font_size,
            min_font_size,
            step,
            max_iterations: self.max_iterations.max(1),
        }
    }

    /// Index of the smallest grid size that is not below `min_font_size`.
    fn last_grid_index(&self) -> usize {
        ((self.max_font_size - self.min_font_size) / self.step + 1e-4).floor() as usize
    }

    fn grid_size(&self, index: usize) -> f32 {
        (self.max_font_size - index as f32 * self.step).max(self.min_font_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutResult {
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<String>,
    /// Lines were dropped because the rectangle could not hold them.
    pub truncated: bool,
    /// The kept lines still exceed the rectangle at the chosen size.
    pub overflow: bool,
}

impl LayoutResult {
    fn empty() -> Self {
        Self {
            font_size: 0.0,
            line_height: 0.0,
            lines: Vec::new(),
            truncated: false,
            overflow: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Starting font size by rectangle area available per character (px²).
const START_SIZE_BY_AREA: [(f32, f32); 7] = [
    (150.0, 12.0),
    (300.0, 16.0),
    (600.0, 20.0),
    (1_000.0, 24.0),
    (1_600.0, 30.0),
    (2_500.0, 36.0),
    (4_000.0, 42.0),
];

pub fn layout<M>(text: &str, width: f32, height: f32, measure: &M) -> LayoutResult
where
    M: TextMeasure + ?Sized,
{
    layout_with(text, width, height, measure, &LayoutOptions::default())
}

/// Shrink-to-fit layout of `text` inside a `width` x `height` box.
///
/// Candidate sizes sit on a fixed grid `max_font_size - k * step`; the search
/// starts at the grid point at or below the area-based guess, but never more
/// than `max_iterations` points above the minimum, and walks down until the
/// text fits. When nothing fits the minimum size is used and lines
/// past the box height are dropped. Never fails: empty text or a box without
/// area yields zero lines.
pub fn layout_with<M>(
    text: &str,
    width: f32,
    height: f32,
    measure: &M,
    options: &LayoutOptions,
) -> LayoutResult
where
    M: TextMeasure + ?Sized,
{
    let text = text.trim();
    if text.is_empty() || !has_area(width, height) {
        return LayoutResult::empty();
    }
    let options = options.sanitized();
    let units = break_units(text);

    let start = starting_font_size(text, width, height, &options);
    let guess_index = ((options.max_font_size - start) / options.step - 1e-4)
        .ceil()
        .max(0.0) as usize;
    // The last `max_iterations` grid points always end at the minimum size.
    let last_index = options.last_grid_index();
    let first_index = last_index.saturating_sub(options.max_iterations - 1);
    for step_index in guess_index.max(first_index)..=last_index {
        let font_size = options.grid_size(step_index);
        if let Some(result) = try_fit(text, &units, font_size, width, height, measure) {
            return result;
        }
    }

    let result = best_effort(&units, options.min_font_size, width, height, measure);
    if result.truncated || result.overflow {
        debug!(
            "text does not fit {:.1}x{:.1} at minimum size {:.1}",
            width, height, options.min_font_size
        );
    }
    result
}

/// Wraps at a caller-chosen size without shrinking, dropping lines the box
/// cannot hold.
pub fn layout_fixed<M>(
    text: &str,
    width: f32,
    height: f32,
    font_size: f32,
    measure: &M,
) -> LayoutResult
where
    M: TextMeasure + ?Sized,
{
    let text = text.trim();
    if text.is_empty() || !has_area(width, height) || !(font_size > 0.0) {
        return LayoutResult::empty();
    }
    best_effort(&break_units(text), font_size, width, height, measure)
}

fn has_area(width: f32, height: f32) -> bool {
    width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()
}

fn starting_font_size(text: &str, width: f32, height: f32, options: &LayoutOptions) -> f32 {
    let chars = text.chars().filter(|ch| !ch.is_whitespace()).count().max(1);
    let area_per_char = width * height / chars as f32;
    let guess = START_SIZE_BY_AREA
        .iter()
        .find(|(limit, _)| area_per_char < *limit)
        .map(|(_, size)| *size)
        .unwrap_or(options.max_font_size);
    guess.clamp(options.min_font_size, options.max_font_size)
}

fn try_fit<M>(
    text: &str,
    units: &[BreakUnit],
    font_size: f32,
    width: f32,
    height: f32,
    measure: &M,
) -> Option<LayoutResult>
where
    M: TextMeasure + ?Sized,
{
    let single = measure.measure(text, font_size);
    let line_height = single.height.max(0.0);
    let forced_breaks = text.matches('\n').count();
    if forced_breaks == 0 && single.width <= width && line_height <= height {
        return Some(LayoutResult {
            font_size,
            line_height,
            lines: vec![text.to_string()],
            truncated: false,
            overflow: false,
        });
    }

    let estimated = (single.width / width).ceil().max(1.0) + forced_breaks as f32;
    if estimated * line_height > height {
        return None;
    }

    let wrapped = wrap_units(units, font_size, width, max_lines(height, line_height), measure);
    // Splitting inside a break candidate is only acceptable at the minimum size.
    if wrapped.truncated || wrapped.too_wide || wrapped.split {
        return None;
    }
    Some(LayoutResult {
        font_size,
        line_height,
        lines: wrapped.lines,
        truncated: false,
        overflow: false,
    })
}

fn best_effort<M>(
    units: &[BreakUnit],
    font_size: f32,
    width: f32,
    height: f32,
    measure: &M,
) -> LayoutResult
where
    M: TextMeasure + ?Sized,
{
    let line_height = measure.measure("", font_size).height.max(0.0);
    let line_height = if line_height > 0.0 {
        line_height
    } else {
        let joined = units.iter().map(|unit| unit.text.as_str()).collect::<String>();
        measure.measure(joined.trim(), font_size).height.max(0.0)
    };
    let limit = max_lines(height, line_height).max(1);
    let wrapped = wrap_units(units, font_size, width, limit, measure);
    let overflow = wrapped.too_wide || wrapped.lines.len() as f32 * line_height > height;
    LayoutResult {
        font_size,
        line_height,
        lines: wrapped.lines,
        truncated: wrapped.truncated,
        overflow,
    }
}

fn max_lines(height: f32, line_height: f32) -> usize {
    if line_height <= 0.0 {
        usize::MAX
    } else {
        (height / line_height + 1e-4).floor() as usize
    }
}

struct Wrapped {
    lines: Vec<String>,
    truncated: bool,
    too_wide: bool,
    split: bool,
}

/// Greedy line filling over break candidates.
fn wrap_units<M>(
    units: &[BreakUnit],
    font_size: f32,
    width: f32,
    max_lines: usize,
    measure: &M,
) -> Wrapped
where
    M: TextMeasure + ?Sized,
{
    let mut breaker = LineBreaker {
        measure,
        font_size,
        width,
        max_lines,
        lines: Vec::new(),
        current: String::new(),
        truncated: false,
        too_wide: false,
        split: false,
    };
    let completed = units.iter().all(|unit| match unit.kind {
        BreakKind::Newline => breaker.close_line(),
        BreakKind::Space => {
            if !breaker.current.is_empty() {
                breaker.current.push_str(&unit.text);
            }
            true
        }
        BreakKind::Text => breaker.push_text(&unit.text),
    });
    if completed {
        breaker.close_line();
    }
    Wrapped {
        lines: breaker.lines,
        truncated: breaker.truncated,
        too_wide: breaker.too_wide,
        split: breaker.split,
    }
}

struct LineBreaker<'a, M: TextMeasure + ?Sized> {
    measure: &'a M,
    font_size: f32,
    width: f32,
    max_lines: usize,
    lines: Vec<String>,
    current: String,
    truncated: bool,
    too_wide: bool,
    split: bool,
}

impl<M: TextMeasure + ?Sized> LineBreaker<'_, M> {
    fn fits(&self, text: &str) -> bool {
        self.measure.measure(text, self.font_size).width <= self.width
    }

    /// Returns `false` once the line budget is exhausted.
    fn close_line(&mut self) -> bool {
        let line = self.current.trim_end().to_string();
        self.current.clear();
        if line.is_empty() {
            return true;
        }
        if self.lines.len() >= self.max_lines {
            self.truncated = true;
            return false;
        }
        if !self.fits(&line) {
            self.too_wide = true;
        }
        self.lines.push(line);
        true
    }

    fn push_text(&mut self, piece: &str) -> bool {
        let candidate = format!("{}{}", self.current, piece);
        if self.fits(&candidate) {
            self.current = candidate;
            return true;
        }
        if !self.current.trim().is_empty() && !self.close_line() {
            return false;
        }
        self.current.clear();
        if self.fits(piece) {
            self.current.push_str(piece);
            return true;
        }
        // A single candidate wider than the box is split per character.
        self.split = true;
        for ch in piece.chars() {
            let mut candidate = self.current.clone();
            candidate.push(ch);
            if self.current.is_empty() || self.fits(&candidate) {
                self.current = candidate;
            } else {
                if !self.close_line() {
                    return false;
                }
                self.current.push(ch);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is one em wide; lines are 1.2 em tall.
    fn monospace(text: &str, font_size: f32) -> (f32, f32) {
        (text.chars().count() as f32 * font_size, font_size * 1.2)
    }

    fn assert_lines_fit(result: &LayoutResult, width: f32) {
        for line in &result.lines {
            let (w, _) = monospace(line, result.font_size);
            assert!(w <= width + 1e-3, "line '{}' is {} wide", line, w);
        }
    }

    #[test]
    fn empty_text_or_box_yields_no_lines() {
        assert!(layout("", 100.0, 40.0, &monospace).is_empty());
        assert!(layout("   ", 100.0, 40.0, &monospace).is_empty());
        assert!(layout("hello", 0.0, 40.0, &monospace).is_empty());
        assert!(layout("hello", 100.0, -5.0, &monospace).is_empty());
        assert!(layout("hello", f32::NAN, 40.0, &monospace).is_empty());
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let result = layout("Hi", 200.0, 60.0, &monospace);
        assert_eq!(result.lines, vec!["Hi"]);
        assert!(!result.overflow);
        assert!(result.font_size <= 40.0);
        assert!(result.font_size * 2.0 <= 200.0);
    }

    #[test]
    fn cjk_text_wraps_in_a_narrow_box() {
        let result = layout("你好世界再见朋友", 100.0, 40.0, &monospace);
        assert!(result.lines.len() >= 2, "{:?}", result);
        assert_lines_fit(&result, 100.0);
        assert_eq!(result.lines.concat(), "你好世界再见朋友");
        assert!(!result.truncated);
    }

    #[test]
    fn latin_text_wraps_on_spaces_only() {
        let result = layout("the quick brown fox", 60.0, 200.0, &monospace);
        assert!(result.lines.len() >= 2);
        for line in &result.lines {
            assert!(!line.starts_with(' ') && !line.ends_with(' '));
            for word in line.split(' ') {
                assert!(["the", "quick", "brown", "fox"].contains(&word), "{}", word);
            }
        }
    }

    #[test]
    fn oversized_text_degrades_to_minimum_size() {
        let text = "字".repeat(500);
        let result = layout(&text, 50.0, 30.0, &monospace);
        assert_eq!(result.font_size, 12.0);
        assert_eq!(result.lines.len(), 2);
        assert!(result.truncated);
        assert_lines_fit(&result, 50.0);
    }

    #[test]
    fn never_panics_on_awkward_inputs() {
        let long_latin = "lorem ipsum ".repeat(42);
        let long_cjk = "漢字かなカナ".repeat(84);
        let inputs = ["", "a", "字", "!!!", "\n\n", long_latin.as_str(), long_cjk.as_str()];
        let boxes = [(0.0, 0.0), (1.0, 1.0), (5.0, 400.0), (400.0, 5.0), (300.0, 300.0)];
        for text in inputs {
            for (w, h) in boxes {
                let result = layout(text, w, h, &monospace);
                assert!(result.lines.len() <= text.chars().count());
            }
        }
    }

    #[test]
    fn larger_boxes_never_pick_smaller_fonts() {
        let samples = [
            "你好世界再见朋友",
            "Hello there, how are you doing today?",
            "OK我们走吧 go!",
            "a",
        ];
        for text in samples {
            let mut previous = 0.0;
            for scale in 1..=30 {
                let w = 20.0 * scale as f32;
                let h = 8.0 * scale as f32;
                let result = layout(text, w, h, &monospace);
                assert!(
                    result.font_size >= previous,
                    "{} shrank from {} to {} at {}x{}",
                    text,
                    previous,
                    result.font_size,
                    w,
                    h
                );
                previous = result.font_size;
            }
        }
    }

    #[test]
    fn monotonic_for_any_step_even_when_the_grid_outgrows_the_iterations() {
        let samples = ["Hi", "你好世界再见朋友", "Hello there, how are you doing today?"];
        for step in [1.5, 2.0, 2.5] {
            for max_iterations in [15, 6] {
                let options = LayoutOptions {
                    max_font_size: 48.0,
                    min_font_size: 12.0,
                    step,
                    max_iterations,
                };
                for text in samples {
                    let mut previous = 0.0;
                    for scale in 1..=40 {
                        let w = 25.0 * scale as f32;
                        let result = layout_with(text, w, 20.0 + scale as f32, &monospace, &options);
                        assert!(
                            result.font_size >= previous,
                            "step {} iters {}: '{}' shrank from {} to {} at width {}",
                            step,
                            max_iterations,
                            text,
                            previous,
                            result.font_size,
                            w
                        );
                        previous = result.font_size;
                    }
                }
            }
        }
    }

    #[test]
    fn wide_short_box_is_not_forced_to_minimum_size() {
        let options = LayoutOptions {
            max_font_size: 48.0,
            min_font_size: 12.0,
            step: 1.5,
            max_iterations: 15,
        };
        let small = layout_with("Hi", 200.0, 20.0, &monospace, &options);
        let big = layout_with("Hi", 1000.0, 20.0, &monospace, &options);
        assert!(small.font_size > options.min_font_size);
        assert!(big.font_size >= small.font_size, "{} < {}", big.font_size, small.font_size);
    }

    #[test]
    fn forced_newlines_start_new_lines() {
        let result = layout("ab\ncd", 400.0, 400.0, &monospace);
        assert_eq!(result.lines, vec!["ab", "cd"]);
    }

    #[test]
    fn fixed_size_wraps_without_shrinking() {
        let result = layout_fixed("你好世界", 40.0, 100.0, 20.0, &monospace);
        assert_eq!(result.font_size, 20.0);
        assert_eq!(result.lines, vec!["你好", "世界"]);
        assert!(!result.overflow);
    }

    #[test]
    fn overlong_words_are_split() {
        let result = layout_fixed("Supercalifragilistic", 60.0, 200.0, 12.0, &monospace);
        assert!(result.lines.len() > 1);
        assert_lines_fit(&result, 60.0);
        assert_eq!(result.lines.concat(), "Supercalifragilistic");
    }
}
