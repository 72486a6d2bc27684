//! Full-text fallback for brand extraction.
//!
//! OCR fragment order does not always follow visual order, so every
//! occurrence of the label in the joined text is tried.

use std::sync::LazyLock;

use regex::Regex;

use super::{find_label, full_text, is_label_start, label_positions, FieldStrategy, BRAND_VALUE_EXCLUDE};
use crate::ocr::Page;
use crate::text::{between_dots, cut_at_each, truncate_chars};
use crate::validate::{is_valid_brand, MAX_BRAND_CHARS};

/// Characters of context read after a label occurrence.
const WINDOW_CHARS: usize = 80;

/// Category words that follow the brand row in the joined text.
const CATEGORY_STOPS: [&str; 7] = [
    "ファッション",
    "メンズ",
    "レディース",
    "パンツ",
    "デニム",
    "シャツ",
    "スニーカー",
];

static LEADING_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[：:\s]+").expect("static pattern"));

static CATEGORY_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*カテゴリ(?:ー)?\s*").expect("static pattern"));

static DOUBLE_SPACE_OR_YEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}|\d+円").expect("static pattern"));

static LATIN_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9\s\-]+?)(?:\s|$|/|カテゴリ)").expect("static pattern")
});

/// Label followed by a Latin run; the run is cut where a terminator begins.
static LABEL_LATIN_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ブランド\s*[：:]?\s*([A-Za-z][A-Za-z0-9\s・\-]*)").expect("static pattern")
});

static RUN_TERMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s+カテゴリ|\s{2,}|\s*/\s*ファッション|$)").expect("static pattern")
});

fn first_part<'a>(re: &Regex, text: &'a str) -> &'a str {
    re.split(text).next().unwrap_or("").trim()
}

/// Reads a brand from the text following one label occurrence.
fn take_brand_from_rest(rest: &str) -> Option<String> {
    let rest = truncate_chars(rest.trim(), 60).trim();
    let rest = LEADING_SEPARATORS.replace(rest, "");
    let part = first_part(&CATEGORY_LABEL, &rest);
    let part = first_part(&DOUBLE_SPACE_OR_YEN, part);
    let part = cut_at_each(part, &CATEGORY_STOPS);
    let part = truncate_chars(part, MAX_BRAND_CHARS).trim();

    let cand = between_dots(part, MAX_BRAND_CHARS);
    if !cand.is_empty() && !BRAND_VALUE_EXCLUDE.contains(&cand.as_str()) && is_valid_brand(&cand) {
        return Some(cand);
    }

    // Latin brand names survive even when the tail is garbage.
    let caps = LATIN_WORD.captures(part)?;
    let val = between_dots(caps.get(1)?.as_str().trim(), MAX_BRAND_CHARS);
    if !val.is_empty() && is_valid_brand(&val) {
        Some(val)
    } else {
        None
    }
}

/// Shortest prefix (at least two characters) of the run starting at
/// `start` that is immediately followed by a terminator.
fn terminated_run(s: &str, start: usize, end: usize) -> Option<&str> {
    s[start..end]
        .char_indices()
        .map(|(i, c)| start + i + c.len_utf8())
        .skip(1)
        .find(|&cut| RUN_TERMINATOR.is_match(&s[cut..]))
        .map(|cut| &s[start..cut])
}

/// Text window following the label at byte offset `label_start`.
fn window_after<'a>(s: &'a str, label_start: usize, label: &str) -> &'a str {
    truncate_chars(&s[label_start + label.len()..], WINDOW_CHARS)
}

/// Finds the brand in the page's joined text.
///
/// Order: the first label occurrence, then a label followed by a Latin run
/// anywhere in the text, then every label occurrence in turn.
pub fn extract_brand_from_text(full: &str) -> String {
    const LABEL: &str = super::BRAND_LABEL;

    let s = full.replace(['\n', '\r'], " ");
    let Some(first) = find_label(&s, LABEL) else {
        return String::new();
    };

    if let Some(brand) = take_brand_from_rest(window_after(&s, first, LABEL)) {
        return brand;
    }

    for caps in LABEL_LATIN_RUN.captures_iter(&s) {
        let Some(label) = caps.get(0) else { continue };
        if !is_label_start(&s, label.start()) {
            continue;
        }
        let Some(run) = caps.get(1) else { continue };
        if let Some(value) = terminated_run(&s, run.start(), run.end()) {
            let val = between_dots(value.trim(), MAX_BRAND_CHARS);
            if !val.is_empty() && is_valid_brand(&val) {
                return val;
            }
        }
    }

    for pos in label_positions(&s, LABEL) {
        if let Some(brand) = take_brand_from_rest(window_after(&s, pos, LABEL)) {
            return brand;
        }
    }

    String::new()
}

/// Last link of the brand chain: scan the joined page text.
pub struct FullTextScan {
    label: &'static str,
}

impl FullTextScan {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl FieldStrategy for FullTextScan {
    fn name(&self) -> &'static str {
        "full-text-scan"
    }

    fn extract(&self, page: &Page<'_>) -> Option<String> {
        let text = full_text(page.detections);
        if find_label(&text, self.label).is_none() {
            return None;
        }
        let brand = extract_brand_from_text(&text);
        (!brand.is_empty()).then_some(brand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_after_label() {
        assert_eq!(
            extract_brand_from_text("項目 ブランド JACOB COHEN カテゴリー メンズ パンツ"),
            "JACOB COHEN"
        );
    }

    #[test]
    fn test_brand_with_colon() {
        assert_eq!(extract_brand_from_text("ブランド：ユニクロ  カテゴリー"), "ユニクロ");
    }

    #[test]
    fn test_brand_between_dots_in_text() {
        assert_eq!(
            extract_brand_from_text("ブランド L・JACOB COHEN・目立った傷や汚れなし"),
            "JACOB COHEN"
        );
    }

    #[test]
    fn test_no_label() {
        assert_eq!(extract_brand_from_text("JACOB COHEN デニム"), "");
        assert_eq!(extract_brand_from_text(""), "");
    }

    #[test]
    fn test_category_stop_words_cut() {
        assert_eq!(extract_brand_from_text("ブランド リーバイス デニム ジーンズ"), "リーバイス");
    }

    #[test]
    fn test_later_occurrence_used_when_first_is_noise() {
        // First label is followed by boilerplate; the second carries the value.
        let text = "ブランド 配送料の負担 送料込み ブランド ユニクロ カテゴリー";
        assert_eq!(extract_brand_from_text(text), "ユニクロ");
    }

    #[test]
    fn test_latin_run_fallback() {
        // The first window is rejected ("発送" ends up in the value);
        // the label followed by a Latin run terminated by a double space wins.
        let text = "ブランド 発送まで2日 ブランド NIKE  ";
        assert_eq!(extract_brand_from_text(text), "NIKE");
    }

    #[test]
    fn test_label_inside_title_ignored() {
        assert_eq!(extract_brand_from_text("【ハイブランド】JACOB COHEN J688 デニム"), "");
        assert_eq!(
            extract_brand_from_text("【ハイブランド】デニム ブランド：ユニクロ カテゴリー"),
            "ユニクロ"
        );
    }

    #[test]
    fn test_terminated_run() {
        let s = "ABC DEF  tail";
        assert_eq!(terminated_run(s, 0, 9), Some("ABC DEF"));
        let s = "AB";
        assert_eq!(terminated_run(s, 0, 2), Some("AB"));
        let s = "A";
        assert_eq!(terminated_run(s, 0, 1), None);
    }
}
