//! Field extraction: turns OCR detections into candidate field values.
//!
//! Brand extraction is an ordered chain of strategies, each returning an
//! optional value; the first success wins. The chain is the same whichever
//! analyzer feeds it, so full-page and per-region OCR share one contract.

pub mod anchor;
pub mod clean;
pub mod fulltext;
pub mod product;

pub use anchor::{AnchorBelow, AnchorSameBlock, AnchorSameLine, SeparatorLine};
pub use clean::{brand_from_raw, clean_product_text, finalize_product_name, trim_product_name_raw};
pub use fulltext::{extract_brand_from_text, FullTextScan};
pub use product::product_name_zone_text;

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ScreenshotConfig;
use crate::ocr::{Detection, Page};
use crate::zone::FractionalZone;

/// Label printed next to the brand value on the listing detail screen.
pub const BRAND_LABEL: &str = "ブランド";

/// Neighbouring labels that are never a brand value. Reaching one while
/// collecting neighbours ends the candidate.
pub const BRAND_VALUE_EXCLUDE: [&str; 13] = [
    "項目",
    "ブランド",
    "商品",
    "メルカリ",
    "出品者",
    "カテゴリ",
    "カテゴリー",
    "送料",
    "商品の説明",
    "カード",
    "フォロー",
    "コメント",
    "共有",
];

static DOUBLE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("static pattern"));

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[¥￥]\s*(\d[\d,]*)|(\d[\d,]*)\s*円").expect("static pattern")
});

/// Text before the first run of two or more whitespace characters.
pub(crate) fn before_double_space(text: &str) -> &str {
    match DOUBLE_SPACE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// True for neighbour text that ends brand collection.
pub(crate) fn is_stop_value(text: &str) -> bool {
    BRAND_VALUE_EXCLUDE.contains(&text) || text.starts_with("カテゴリ")
}

/// A field label starts its fragment or follows whitespace, a separator,
/// or the `項目` header. Inside a word (`【ハイブランド】`) it is title text.
pub(crate) fn is_label_start(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    before.ends_with("項目")
        || before.chars().next_back().is_none_or(|c| {
            c.is_whitespace() || matches!(c, '：' | ':' | '・' | '|' | '｜' | '/' | '／')
        })
}

/// Byte offsets of every standalone occurrence of `label` in `text`.
pub fn label_positions<'a>(text: &'a str, label: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(label)
        .map(|(pos, _)| pos)
        .filter(move |&pos| is_label_start(text, pos))
}

/// First standalone occurrence of `label`.
pub fn find_label(text: &str, label: &str) -> Option<usize> {
    label_positions(text, label).next()
}

/// One way of producing a field value from a page of detections.
pub trait FieldStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn extract(&self, page: &Page<'_>) -> Option<String>;
}

/// Strategies tried in order until one yields a value.
pub struct StrategyChain {
    strategies: Vec<Box<dyn FieldStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn FieldStrategy>>) -> Self {
        Self { strategies }
    }

    /// Returns the first value produced, with the name of the strategy that produced it.
    pub fn run(&self, page: &Page<'_>) -> Option<(&'static str, String)> {
        self.strategies
            .iter()
            .find_map(|s| s.extract(page).map(|value| (s.name(), value)))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

/// Brand extraction over full-page detections.
///
/// When a brand zone is configured the page is first narrowed to detections
/// centred inside it (all detections are kept if none are), and the
/// separator-line reading of that zone is tried before any anchor search.
pub struct BrandExtractor {
    zone: Option<FractionalZone>,
    chain: StrategyChain,
}

impl BrandExtractor {
    pub fn new(config: &ScreenshotConfig) -> Self {
        let mut strategies: Vec<Box<dyn FieldStrategy>> = Vec::new();
        if config.brand_zone.is_some() {
            strategies.push(Box::new(SeparatorLine));
        }
        strategies.push(Box::new(AnchorSameBlock::new(BRAND_LABEL)));
        strategies.push(Box::new(AnchorSameLine::new(
            BRAND_LABEL,
            config.same_line_tolerance,
        )));
        strategies.push(Box::new(AnchorBelow::new(
            BRAND_LABEL,
            config.same_line_tolerance,
        )));
        strategies.push(Box::new(FullTextScan::new(BRAND_LABEL)));

        Self {
            zone: config.brand_zone,
            chain: StrategyChain::new(strategies),
        }
    }

    /// Returns the brand, or an empty string when every strategy declines.
    pub fn extract(&self, page: &Page<'_>) -> String {
        if page.detections.is_empty() {
            return String::new();
        }

        let narrowed: Vec<Detection>;
        let page = match &self.zone {
            Some(zone) => {
                narrowed = filter_to_zone(page, zone);
                if narrowed.is_empty() {
                    *page
                } else {
                    Page {
                        detections: &narrowed,
                        ..*page
                    }
                }
            }
            None => *page,
        };

        match self.chain.run(&page) {
            Some((strategy, brand)) => {
                crate::log(&format!("Brand '{}' found by {}", brand, strategy));
                brand
            }
            None => String::new(),
        }
    }
}

/// Detections whose centre lies inside `zone`.
pub fn filter_to_zone(page: &Page<'_>, zone: &FractionalZone) -> Vec<Detection> {
    page.detections
        .iter()
        .filter(|d| {
            let (cx, cy) = d.quad.center();
            zone.contains(page.width, page.height, cx, cy)
        })
        .cloned()
        .collect()
}

/// Text of detections starting in the top `top_ratio` of the screen.
///
/// In a scroll sequence the partially visible title sits here, which is
/// what screenshot grouping keys on.
pub fn top_text(page: &Page<'_>, top_ratio: f32) -> String {
    let top_y_max = page.height as f32 * top_ratio;
    page.detections
        .iter()
        .filter(|d| d.quad.top() < top_y_max)
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// All detection text, space separated.
pub fn full_text(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the first yen amount (`¥12,800` or `12,800円`) in `text`.
pub fn parse_price(text: &str) -> Option<u32> {
    let caps = PRICE.captures(text)?;
    let digits: String = caps
        .get(1)
        .or_else(|| caps.get(2))?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
