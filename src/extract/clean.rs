//! Cleanup for raw field text read from fixed regions.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{between_dots, collapse_whitespace, cut_at_each, normalize_dots, truncate_chars};
use crate::validate::{MAX_BRAND_CHARS, PRODUCT_NAME_INVALID_CONTAINS};

/// Interface words that bleed into the title region.
const PRODUCT_UI_WORDS: [&str; 6] = ["いいね", "コメント", "商品の説明", "配送料", "税込", "送料込み"];

const MAX_CLEAN_PRODUCT_CHARS: usize = 150;
const MAX_FINAL_PRODUCT_CHARS: usize = 120;

static YEN_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[¥￥]\s*[\d,]+").expect("static pattern"));

static YEN_SUFFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})*\s*円").expect("static pattern"));

/// Strips UI words and prices from raw title text.
pub fn clean_product_text(raw: &str) -> String {
    let mut text = raw.to_string();
    for word in PRODUCT_UI_WORDS {
        text = text.replace(word, "");
    }
    let text = YEN_PREFIXED.replace_all(&text, "");
    let text = YEN_SUFFIXED.replace_all(&text, "");
    let text = collapse_whitespace(&text);
    truncate_chars(&text, MAX_CLEAN_PRODUCT_CHARS).to_string()
}

/// Brand from a `condition・BRAND・detail` region read.
pub fn brand_from_raw(raw: &str) -> String {
    between_dots(&normalize_dots(raw), MAX_BRAND_CHARS)
}

/// Cuts a title candidate before any boilerplate phrase. When a `【` marker
/// is present the title is taken from there.
pub fn trim_product_name_raw(text: &str, max_len: usize) -> String {
    let mut out = cut_at_each(text, &PRODUCT_NAME_INVALID_CONTAINS);
    if let Some(pos) = out.find('【') {
        out = cut_at_each(&out[pos..], &PRODUCT_NAME_INVALID_CONTAINS);
    }
    truncate_chars(out, max_len).trim().to_string()
}

/// Final display form of an accepted title.
pub fn finalize_product_name(name: &str) -> String {
    let collapsed = collapse_whitespace(name);
    truncate_chars(&collapsed, MAX_FINAL_PRODUCT_CHARS).to_string()
}
