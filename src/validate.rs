//! Field validation. Precision first: anything that smells like UI copy,
//! shipping boilerplate or OCR noise is rejected and the caller falls back
//! to a placeholder instead of emitting a guess.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum brand length, in characters.
pub const MAX_BRAND_CHARS: usize = 40;

/// Listing boilerplate that never belongs in a brand value.
pub const BRAND_INVALID_CONTAINS: [&str; 10] = [
    "商品の状態",
    "配送料の負担",
    "配送の方法",
    "発送までの日数",
    "配送元の地域",
    "らくらくメルカリ",
    "匿名配送",
    "内容をコピー",
    "値下げ依頼",
    "ご遠慮",
];

/// Label fragments that mean a brand candidate swallowed a neighbouring field.
const BRAND_FIELD_FRAGMENTS: [&str; 6] = ["商品の状態", "配送料", "負担", "発送", "地域", "カテゴリ"];

/// Description and UI copy that marks where a product title stops.
pub const PRODUCT_NAME_INVALID_CONTAINS: [&str; 14] = [
    "商品の状態",
    "配送料の負担",
    "配送の方法",
    "発送までの日数",
    "配送元の地域",
    "らくらくメルカリ",
    "匿名配送",
    "内容をコピー",
    "値下げ依頼",
    "目立った傷や汚れ",
    "時間前",
    "送料込み",
    "日以内で売れた",
    "出品してみません",
];

/// Size and colour words common in apparel titles.
const PRODUCT_NAME_KEYWORDS: [&str; 5] = ["サイズ", "濃紺", "ブラック", "ホワイト", "ネイビー"];

static ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]").expect("static pattern"));

static STRAY_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[』」']").expect("static pattern"));

/// Minimum share of allowed characters for a title without stronger signals.
const MIN_CLEAN_RATIO: f32 = 0.4;

/// Latin letters and digits, hiragana, katakana, CJK ideographs, space,
/// middle dot, wave dash, em dash.
fn is_clean_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c,
            '\u{3040}'..='\u{309F}'
            | '\u{30A0}'..='\u{30FF}'
            | '\u{4E00}'..='\u{9FFF}'
            | ' '
            | '\u{00B7}'
            | '\u{301C}'
            | '\u{2014}')
}

/// Share of characters in `s` drawn from the allowed alphabet.
pub fn clean_char_ratio(s: &str) -> f32 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    s.chars().filter(|&c| is_clean_char(c)).count() as f32 / total as f32
}

/// True if `s` can be emitted as a brand.
pub fn is_valid_brand(s: &str) -> bool {
    if s.is_empty() || s.chars().count() > MAX_BRAND_CHARS {
        return false;
    }
    let t = s.trim();
    if BRAND_INVALID_CONTAINS.iter().any(|inv| t.contains(inv)) {
        return false;
    }
    !BRAND_FIELD_FRAGMENTS.iter().any(|frag| t.contains(frag))
}

/// True if `s` reads like a listing title rather than description text or OCR noise.
pub fn looks_like_product_name(s: &str) -> bool {
    let len = s.chars().count();
    if len < 2 {
        return false;
    }
    if PRODUCT_NAME_INVALID_CONTAINS.iter().any(|inv| s.contains(inv)) {
        return false;
    }
    if s.contains('【') || s.contains('】') {
        return true;
    }
    let alnum = ALNUM.find_iter(s).count();
    if alnum >= 3 {
        return true;
    }
    if PRODUCT_NAME_KEYWORDS.iter().any(|k| s.contains(k)) {
        return true;
    }
    // Misread brackets with no real title markers are noise.
    if STRAY_QUOTES.is_match(s) {
        return false;
    }
    if len <= 4 {
        return false;
    }
    clean_char_ratio(s) >= MIN_CLEAN_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_brands() {
        assert!(is_valid_brand("JACOB COHEN"));
        assert!(is_valid_brand("ユニクロ"));
        assert!(is_valid_brand("A.P.C."));
    }

    #[test]
    fn test_brand_rejects_empty_and_long() {
        assert!(!is_valid_brand(""));
        assert!(!is_valid_brand(&"A".repeat(41)));
        assert!(is_valid_brand(&"A".repeat(40)));
        // 40 Japanese characters is still within the limit
        assert!(is_valid_brand(&"ア".repeat(40)));
    }

    #[test]
    fn test_brand_rejects_boilerplate() {
        assert!(!is_valid_brand("配送料の負担 送料込み"));
        assert!(!is_valid_brand("JACOB COHEN カテゴリー"));
        assert!(!is_valid_brand("らくらくメルカリ便"));
        assert!(!is_valid_brand("発送"));
    }

    #[test]
    fn test_product_name_bracket_marker() {
        assert!(looks_like_product_name("【美品】デニム"));
    }

    #[test]
    fn test_product_name_alnum() {
        assert!(looks_like_product_name("JACOB COHEN J688"));
        assert!(looks_like_product_name("ab1"));
    }

    #[test]
    fn test_product_name_keywords() {
        assert!(looks_like_product_name("ネイビー"));
        assert!(looks_like_product_name("サイズ"));
    }

    #[test]
    fn test_product_name_rejects_boilerplate() {
        assert!(!looks_like_product_name("【美品】デニム 送料込み"));
        assert!(!looks_like_product_name("3時間前"));
    }

    #[test]
    fn test_product_name_rejects_noise() {
        assert!(!looks_like_product_name(""));
        assert!(!looks_like_product_name("あ"));
        assert!(!looks_like_product_name("」ぁ』"));
        assert!(!looks_like_product_name("デニム"));
        assert!(!looks_like_product_name("#%&*()!?~^"));
    }

    #[test]
    fn test_product_name_clean_ratio() {
        assert!(looks_like_product_name("ストレッチデニムパンツ"));
        assert!(clean_char_ratio("a%%%%") < MIN_CLEAN_RATIO);
        assert!(!looks_like_product_name("a%%%%"));
        assert_eq!(clean_char_ratio(""), 0.0);
    }

    #[test]
    fn test_product_name_clean_ratio_boundary_passes() {
        assert_eq!(clean_char_ratio("ab%%%"), MIN_CLEAN_RATIO);
        assert!(looks_like_product_name("ab%%%"));
    }
}
