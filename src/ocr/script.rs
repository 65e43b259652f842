//! Script classification and line-break candidates for mixed CJK/Latin text.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Cjk,
    Latin,
    Punctuation,
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptSegment {
    pub text: String,
    pub kind: ScriptKind,
}

/// Sentence-terminating and clause marks a line may end on.
const BREAK_PUNCTUATION: [char; 13] = [
    '。', '，', '、', '；', '：', '？', '！', '.', ',', ';', ':', '?', '!',
];

pub fn is_cjk_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x309F | 0x30A0..=0x30FF | 0x31F0..=0x31FF
    )
}

pub fn classify_char(ch: char) -> ScriptKind {
    if BREAK_PUNCTUATION.contains(&ch) {
        ScriptKind::Punctuation
    } else if ch.is_whitespace() {
        ScriptKind::Whitespace
    } else if is_cjk_char(ch) {
        ScriptKind::Cjk
    } else {
        ScriptKind::Latin
    }
}

/// Splits `text` into maximal runs of one character class. Concatenating the
/// segments gives back `text`.
pub fn segment(text: &str) -> Vec<ScriptSegment> {
    let mut segments: Vec<ScriptSegment> = Vec::new();
    for ch in text.chars() {
        let kind = classify_char(ch);
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push(ch),
            _ => segments.push(ScriptSegment {
                text: ch.to_string(),
                kind,
            }),
        }
    }
    segments
}

pub fn is_cjk_dominant(text: &str) -> bool {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for ch in text.chars() {
        total += 1;
        if classify_char(ch) == ScriptKind::Cjk {
            cjk += 1;
        }
    }
    total > 0 && cjk * 2 > total
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Text,
    Space,
    Newline,
}

/// Smallest piece the line breaker places; a break is allowed after each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakUnit {
    pub text: String,
    pub kind: BreakKind,
}

impl BreakUnit {
    fn new(text: impl Into<String>, kind: BreakKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Break candidates for `text`.
///
/// Text without CJK characters only breaks at whitespace. Anything containing
/// CJK breaks at whitespace, after punctuation, at every script transition and
/// inside CJK runs every character (CJK-dominant text) or every two characters
/// (mixed text). Punctuation sticks to what precedes it so no line starts with
/// a comma or full stop.
pub fn break_units(text: &str) -> Vec<BreakUnit> {
    let segments = segment(text);
    if !segments.iter().any(|seg| seg.kind == ScriptKind::Cjk) {
        return latin_units(&segments);
    }
    let chunk = if is_cjk_dominant(text) { 1 } else { 2 };

    let mut units: Vec<BreakUnit> = Vec::new();
    for seg in segments {
        match seg.kind {
            ScriptKind::Whitespace => push_whitespace(&mut units, &seg.text),
            ScriptKind::Cjk => {
                let chars = seg.text.chars().collect::<Vec<_>>();
                for piece in chars.chunks(chunk) {
                    units.push(BreakUnit::new(piece.iter().collect::<String>(), BreakKind::Text));
                }
            }
            ScriptKind::Latin => units.push(BreakUnit::new(seg.text, BreakKind::Text)),
            ScriptKind::Punctuation => match units.last_mut() {
                Some(last) if last.kind == BreakKind::Text => last.text.push_str(&seg.text),
                _ => units.push(BreakUnit::new(seg.text, BreakKind::Text)),
            },
        }
    }
    units
}

fn latin_units(segments: &[ScriptSegment]) -> Vec<BreakUnit> {
    let mut units: Vec<BreakUnit> = Vec::new();
    let mut word = String::new();
    for seg in segments {
        if seg.kind == ScriptKind::Whitespace {
            if !word.is_empty() {
                units.push(BreakUnit::new(std::mem::take(&mut word), BreakKind::Text));
            }
            push_whitespace(&mut units, &seg.text);
        } else {
            word.push_str(&seg.text);
        }
    }
    if !word.is_empty() {
        units.push(BreakUnit::new(word, BreakKind::Text));
    }
    units
}

fn push_whitespace(units: &mut Vec<BreakUnit>, run: &str) {
    let mut spaces = String::new();
    for ch in run.chars() {
        if ch == '\n' {
            if !spaces.is_empty() {
                units.push(BreakUnit::new(std::mem::take(&mut spaces), BreakKind::Space));
            }
            units.push(BreakUnit::new("\n", BreakKind::Newline));
        } else {
            spaces.push(ch);
        }
    }
    if !spaces.is_empty() {
        units.push(BreakUnit::new(spaces, BreakKind::Space));
    }
}
