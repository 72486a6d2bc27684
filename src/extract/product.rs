//! Title text from the product-name zone of a full-page read.

use super::{find_label, BRAND_LABEL};
use crate::ocr::Page;
use crate::text::{cut_at_first, truncate_chars};
use crate::zone::FractionalZone;

/// Fragments carrying any of these are UI, not title text. The brand label
/// is matched separately so titles like `【ハイブランド】` survive.
const ZONE_EXCLUDE: [&str; 19] = [
    "メルカリ",
    "送料",
    "お気に入り",
    "カテゴリ",
    "カテゴリー",
    "出品者",
    "商品の説明",
    "項目",
    "円",
    "￥",
    "フォロー",
    "コメント",
    "共有",
    "カード",
    "この商品",
    "目立った傷や汚れ",
    "傷や汚れなし",
    "時間前",
    "送料込み",
];

/// Condition and timestamp lines (`L・BRAND・目立った傷や汚れなし`).
const LINE_EXCLUDE: [&str; 5] = ["目立った傷", "傷や汚れ", "時間前", "送料込み", "なし」"];

const BREAK_MARKERS: [&str; 3] = ["時間前", "送料込み", "目立った傷"];
const CUT_MARKERS: [&str; 4] = ["目立った傷", "傷や汚れ", "時間前", "送料込み"];

const MAX_PARTS: usize = 4;
const MAX_JOINED_CHARS: usize = 90;
const MAX_ZONE_CHARS: usize = 150;

fn is_excluded(text: &str) -> bool {
    ZONE_EXCLUDE.iter().any(|ex| text.contains(ex))
        || find_label(text, BRAND_LABEL).is_some()
        || LINE_EXCLUDE.iter().any(|pat| text.contains(pat))
}

/// Joins the largest-font fragments centred in `zone`.
///
/// Titles are set in the biggest type on the screen, so fragments are ranked
/// by box height and then top to bottom; at most four are used.
pub fn product_name_zone_text(page: &Page<'_>, zone: &FractionalZone) -> String {
    let mut in_zone: Vec<(f32, f32, &str)> = page
        .detections
        .iter()
        .filter_map(|d| {
            let t = d.text.trim();
            if t.chars().count() < 2 || is_excluded(t) {
                return None;
            }
            let (cx, cy) = d.quad.center();
            zone.contains(page.width, page.height, cx, cy)
                .then(|| (cy, d.quad.height(), t))
        })
        .collect();
    if in_zone.is_empty() {
        return String::new();
    }

    // Stable sort keeps reading order between equal keys.
    in_zone.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));

    let mut parts: Vec<&str> = Vec::new();
    for &(_, _, t) in in_zone.iter().take(MAX_PARTS) {
        if BREAK_MARKERS.iter().any(|m| t.contains(m)) {
            break;
        }
        parts.push(t);
        if parts.join(" ").chars().count() > MAX_JOINED_CHARS {
            break;
        }
    }

    let joined = parts.join(" ");
    let raw = cut_at_first(joined.trim(), &CUT_MARKERS);
    truncate_chars(raw, MAX_ZONE_CHARS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::det;
    use crate::ocr::Detection;
    use crate::zone::defaults::PRODUCT_NAME_ZONE;

    fn page(detections: &[Detection]) -> Page<'_> {
        Page {
            width: 1000,
            height: 2000,
            detections,
        }
    }

    #[test]
    fn test_largest_font_first() {
        let detections = vec![
            det("デニムパンツ", 50.0, 900.0, 400.0, 40.0),
            det("【美品】JACOB COHEN", 50.0, 800.0, 600.0, 70.0),
            det("12,800円", 50.0, 1000.0, 200.0, 80.0),
        ];
        assert_eq!(
            product_name_zone_text(&page(&detections), &PRODUCT_NAME_ZONE),
            "【美品】JACOB COHEN デニムパンツ"
        );
    }

    #[test]
    fn test_skips_condition_line_and_outside_zone() {
        let detections = vec![
            det("L・JACOB COHEN・目立った傷や汚れなし", 50.0, 850.0, 800.0, 90.0),
            det("J688 デニム", 50.0, 900.0, 400.0, 50.0),
            det("いいね 12", 50.0, 1500.0, 200.0, 60.0),
        ];
        assert_eq!(product_name_zone_text(&page(&detections), &PRODUCT_NAME_ZONE), "J688 デニム");
    }

    #[test]
    fn test_brand_row_excluded_but_title_word_kept() {
        let detections = vec![
            det("【ハイブランド】JACOB COHEN", 50.0, 800.0, 600.0, 70.0),
            det("ブランド JACOB COHEN", 50.0, 900.0, 600.0, 90.0),
        ];
        assert_eq!(
            product_name_zone_text(&page(&detections), &PRODUCT_NAME_ZONE),
            "【ハイブランド】JACOB COHEN"
        );
    }

    #[test]
    fn test_empty_zone() {
        let detections = vec![det("A", 50.0, 900.0, 10.0, 40.0)];
        assert_eq!(product_name_zone_text(&page(&detections), &PRODUCT_NAME_ZONE), "");
        assert_eq!(product_name_zone_text(&page(&[]), &PRODUCT_NAME_ZONE), "");
    }

    #[test]
    fn test_at_most_four_fragments() {
        let detections: Vec<Detection> = (0..6)
            .map(|i| det(&format!("P{}", i), 50.0, 720.0 + i as f32 * 50.0, 100.0, 40.0))
            .collect();
        assert_eq!(
            product_name_zone_text(&page(&detections), &PRODUCT_NAME_ZONE),
            "P0 P1 P2 P3"
        );
    }
}
