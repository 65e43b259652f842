use crate::ocr::{Detection, PixelRect};

use super::geom::{rect_height, union_rect};
use super::text::{needs_space, weighted_conf};

#[derive(Debug, Clone)]
struct WordToken {
    text: String,
    rect: PixelRect,
    conf: f32,
    len: usize,
}

/// Turns tesseract hOCR output into one detection per visual line segment.
///
/// Words inside an `ocr_line` span that are separated by a wide gap or sit at
/// a clearly different height become separate detections.
pub(super) fn parse_hocr(hocr: &str) -> Vec<Detection> {
    let mut detections = Vec::new();
    let bytes = hocr.as_bytes();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &hocr[start..tag_end];
        if !tag.contains("ocr_line") && !tag.contains("ocr_caption") && !tag.contains("ocr_header")
        {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let mut words = parse_hocr_words(&hocr[inner_start..inner_end]);
        words.sort_by_key(|word| word.rect.left);
        for segment in split_word_segments(words) {
            if let Some(detection) = build_detection(&segment) {
                detections.push(detection);
            }
        }
        i = inner_end + "</span>".len();
    }
    detections
}

fn split_word_segments(words: Vec<WordToken>) -> Vec<Vec<WordToken>> {
    if words.len() <= 1 {
        return if words.is_empty() { Vec::new() } else { vec![words] };
    }

    let mut heights = words
        .iter()
        .map(|word| rect_height(&word.rect))
        .collect::<Vec<_>>();
    heights.sort_unstable();
    let median_h = heights[heights.len() / 2].max(1) as f32;
    let gap_threshold = (median_h * 2.5).clamp(12.0, 120.0);
    let vertical_threshold = (median_h * 0.9).clamp(6.0, 80.0);

    let mut segments: Vec<Vec<WordToken>> = Vec::new();
    let mut current: Vec<WordToken> = Vec::new();
    let mut last_right = 0i32;
    let mut last_center_y = 0f32;
    for word in words {
        let center_y = (word.rect.top + word.rect.bottom) as f32 * 0.5;
        if current.is_empty() {
            last_right = word.rect.right;
            last_center_y = center_y;
            current.push(word);
            continue;
        }
        let gap = (word.rect.left - last_right).max(0) as f32;
        if gap > gap_threshold || (center_y - last_center_y).abs() > vertical_threshold {
            segments.push(std::mem::take(&mut current));
            last_right = word.rect.right;
            last_center_y = center_y;
        } else {
            last_right = last_right.max(word.rect.right);
            last_center_y = (last_center_y + center_y) * 0.5;
        }
        current.push(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn build_detection(words: &[WordToken]) -> Option<Detection> {
    let first = words.first()?;
    let mut text = String::new();
    let mut rect = first.rect;
    let mut last_token: &str = "";
    for word in words {
        if !text.is_empty() && needs_space(last_token, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        last_token = &word.text;
        rect = union_rect(&rect, &word.rect);
    }
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let pairs = words
        .iter()
        .map(|word| (word.conf, word.len))
        .collect::<Vec<_>>();
    Some(Detection {
        rect,
        text: text.to_string(),
        confidence: Some((weighted_conf(&pairs) / 100.0).clamp(0.0, 1.0)),
    })
}

fn parse_hocr_words(inner: &str) -> Vec<WordToken> {
    let bytes = inner.as_bytes();
    let mut words = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &inner[start..tag_end];
        if !tag.contains("ocrx_word") {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let word_text =
            decode_entities(&strip_tags(&inner[inner_start..inner_end])).replace('\u{00a0}', " ");
        let word_text = word_text.trim();
        if let (Some(rect), false) = (parse_hocr_bbox_from_title(tag), word_text.is_empty()) {
            words.push(WordToken {
                text: word_text.to_string(),
                rect,
                conf: parse_hocr_conf_from_title(tag).unwrap_or(0.0),
                len: word_text.chars().count().max(1),
            });
        }
        i = inner_end + "</span>".len();
    }
    words
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|win| win == needle)
        .map(|pos| from + pos)
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_span_inner(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if bytes[i..].starts_with(b"<span") {
                depth += 1;
            } else if bytes[i..].starts_with(b"</span") {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
        }
        i += 1;
    }
    None
}

fn extract_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=", name);
    let idx = tag.find(&needle)?;
    let rest = &tag[idx + needle.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn strip_tags(value: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn parse_hocr_bbox_from_title(tag: &str) -> Option<PixelRect> {
    let title = extract_attr(tag, "title")?;
    let bbox_idx = title.find("bbox")?;
    let nums = title[bbox_idx + 4..]
        .split([' ', ';'])
        .filter(|v| !v.is_empty())
        .take(4)
        .filter_map(|v| v.parse::<i32>().ok())
        .collect::<Vec<_>>();
    let &[left, top, right, bottom] = nums.as_slice() else {
        return None;
    };
    if right <= left || bottom <= top {
        return None;
    }
    Some(PixelRect::new(left, top, right, bottom))
}

fn parse_hocr_conf_from_title(tag: &str) -> Option<f32> {
    let title = extract_attr(tag, "title")?;
    let idx = title.find("x_wconf")?;
    let value = title[idx + "x_wconf".len()..]
        .split([' ', ';'])
        .find(|v| !v.is_empty())?;
    value.parse::<f32>().ok()
}
