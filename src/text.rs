//! Text normalization shared by extraction, validation and grouping.
//!
//! All length limits in this crate count characters, not bytes: listing
//! text is mostly Japanese and byte slicing would split code points.

/// Canonical separator used between listing attributes (`L・BRAND・状態`).
pub const CANONICAL_DOT: char = '・';

/// Glyphs OCR produces for the canonical separator depending on font and zoom:
/// halfwidth middle dot, middle dot, full stop, bullet, halfwidth ideographic full stop.
const DOT_VARIANTS: [char; 5] = ['\u{FF65}', '\u{00B7}', '.', '\u{2022}', '\u{FF61}'];

/// Removes every whitespace run. Blank input yields an empty string.
///
/// Only for equality and substring checks, never for display.
pub fn normalize_for_comparison(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Maps every dot-like glyph to [`CANONICAL_DOT`]. Idempotent.
pub fn normalize_dots(text: &str) -> String {
    text.chars()
        .map(|c| if DOT_VARIANTS.contains(&c) { CANONICAL_DOT } else { c })
        .collect()
}

/// Collapses line breaks and whitespace runs into single spaces and trims.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Cuts `text` before the first marker (in list order) it contains.
///
/// Only the first marker found is applied.
pub fn cut_at_first<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    for marker in markers {
        if let Some(pos) = text.find(marker) {
            return text[..pos].trim();
        }
    }
    text
}

/// Cuts `text` before every marker it contains, applying them in list order.
pub fn cut_at_each<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    let mut out = text.trim();
    for marker in markers {
        if let Some(pos) = out.find(marker) {
            out = out[..pos].trim();
        }
    }
    out
}

/// Returns the value between the first and second canonical dots when the
/// string has at least three dot-separated parts, else the whole trimmed
/// string. Either way capped to `max_chars`.
pub fn between_dots(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let parts: Vec<&str> = trimmed.split(CANONICAL_DOT).collect();
    if parts.len() >= 3 {
        truncate_chars(parts[1].trim(), max_chars).to_string()
    } else {
        truncate_chars(trimmed, max_chars).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_for_comparison() {
        assert_eq!(normalize_for_comparison("  JACOB  COHEN\n"), "JACOBCOHEN");
        assert_eq!(normalize_for_comparison("デニム　パンツ"), "デニムパンツ");
        assert_eq!(normalize_for_comparison("   \t\n"), "");
        assert_eq!(normalize_for_comparison(""), "");
    }

    #[test]
    fn test_normalize_dots_variants() {
        assert_eq!(normalize_dots("L･JACOB COHEN·目立った傷"), "L・JACOB COHEN・目立った傷");
        assert_eq!(normalize_dots("a•b｡c.d"), "a・b・c・d");
    }

    #[test]
    fn test_normalize_dots_idempotent() {
        for s in ["L･A·B.C•D｡E", "no dots here", "", "・・・"] {
            let once = normalize_dots(s);
            assert_eq!(normalize_dots(&once), once);
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace(" a\n  b\r\n\tc "), "a b c");
        assert_eq!(collapse_whitespace("\n"), "");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("ジャコブコーエン", 3), "ジャコ");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_cut_at_first_uses_list_order() {
        let text = "デニム 送料込み 目立った傷";
        assert_eq!(cut_at_first(text, &["目立った傷", "送料込み"]), "デニム 送料込み");
        assert_eq!(cut_at_first(text, &["なし"]), text);
    }

    #[test]
    fn test_cut_at_each() {
        assert_eq!(cut_at_each(" A 時間前 B 送料込み ", &["送料込み", "時間前"]), "A");
    }

    #[test]
    fn test_between_dots() {
        assert_eq!(between_dots("L・JACOB COHEN・目立った傷や汚れなし", 40), "JACOB COHEN");
        assert_eq!(between_dots("  JACOB COHEN ", 40), "JACOB COHEN");
        assert_eq!(between_dots("A・B", 40), "A・B");
        assert_eq!(between_dots(&"x".repeat(60), 40).chars().count(), 40);
    }
}
