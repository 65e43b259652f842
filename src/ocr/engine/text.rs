pub(super) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            (a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric())
                || (a.is_ascii_punctuation() && b.is_ascii_alphanumeric())
                || (a.is_alphabetic() && b.is_alphabetic() && !is_ideograph(a) && !is_ideograph(b))
        }
        _ => false,
    }
}

pub(super) fn weighted_conf(pairs: &[(f32, usize)]) -> f32 {
    let total: usize = pairs.iter().map(|(_, len)| *len).sum();
    if total == 0 {
        return 0.0;
    }
    pairs
        .iter()
        .map(|(conf, len)| conf * *len as f32)
        .sum::<f32>()
        / total as f32
}

fn is_ideograph(ch: char) -> bool {
    crate::ocr::script::is_cjk_char(ch)
}
