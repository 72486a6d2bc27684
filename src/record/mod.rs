//! Product records: one per screenshot group.
//!
//! Assembly picks the brand, title and price for a group and decides which
//! screenshots become listing images. Identifiers continue from the highest
//! one already persisted, so repeated runs against the same catalog never
//! collide.

pub mod store;

pub use store::{
    append_records, copy_images, load_existing, remove_images, unique_destination,
    write_debug_dump, write_json_atomic,
};

use anyhow::{anyhow, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract::{finalize_product_name, trim_product_name_raw};
use crate::pipeline::ScreenshotResult;
use crate::validate::looks_like_product_name;

/// Brand used when no member screenshot yields one.
pub const BRAND_SENTINEL: &str = "その他";

/// Title used when no candidate survives validation.
pub const PRODUCT_NAME_PLACEHOLDER: &str = "（商品名を編集してください）";

const ZONE_NAME_MAX_CHARS: usize = 100;
const TOP_NAME_MAX_CHARS: usize = 120;

static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*?(\d+)$").expect("static pattern"));

/// A catalog entry as persisted in `data.json` and `suggested_products.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub brand: String,
    pub product_name: String,
    pub price: u32,
    /// Paths relative to the project root, `images/<id>_<k>.<ext>`
    pub images: Vec<String>,
    pub screenshot_count: usize,
    /// Local date, `YYYY-MM-DD`
    pub created_at: String,
}

/// Hands out `product-NNN` identifiers.
#[derive(Debug)]
pub struct IdAllocator {
    /// Highest number already in use, 0 when none
    last: u64,
}

impl IdAllocator {
    /// Continues after the highest trailing number among existing ids.
    ///
    /// Ids without a trailing number, or with one too large to count from,
    /// are logged and ignored.
    pub fn seeded_from<'a>(existing_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut last = 0;
        for id in existing_ids {
            let Some(caps) = TRAILING_NUMBER.captures(id) else {
                crate::log(&format!("Ignoring id '{}': no numeric suffix", id));
                continue;
            };
            match caps[1].parse::<u64>() {
                Ok(n) => last = last.max(n),
                Err(e) => crate::log(&format!("Ignoring id '{}': {}", id, e)),
            }
        }
        Self { last }
    }

    /// Seeds from raw persisted records; entries without a string `id` are skipped.
    pub fn from_records(records: &[serde_json::Value]) -> Self {
        Self::seeded_from(records.iter().filter_map(|r| r.get("id")?.as_str()))
    }

    pub fn next_id(&mut self) -> Result<String> {
        let n = self
            .last
            .checked_add(1)
            .ok_or_else(|| anyhow!("Product id space exhausted after {}", self.last))?;
        self.last = n;
        Ok(format!("product-{:03}", n))
    }
}

/// Field values chosen for one group, before an id and images are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductDraft {
    pub brand: String,
    pub product_name: String,
    pub price: u32,
    /// Listing screenshots in index order; brand-detail screenshots are left out
    pub sources: Vec<PathBuf>,
}

impl ProductDraft {
    /// Copies the source screenshots into `images_dir` and builds the record.
    pub fn into_record(self, id: String, images_dir: &Path, created_at: &str) -> Result<ProductRecord> {
        let images = copy_images(&self.sources, &id, images_dir)?;
        Ok(ProductRecord {
            id,
            brand: self.brand,
            product_name: self.product_name,
            price: self.price,
            screenshot_count: images.len(),
            images,
            created_at: created_at.to_string(),
        })
    }
}

/// Today's local date in record format.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// First non-empty brand among members in index order.
fn choose_brand(members: &[&ScreenshotResult]) -> String {
    members
        .iter()
        .map(|r| r.brand.trim())
        .find(|b| !b.is_empty())
        .unwrap_or(BRAND_SENTINEL)
        .to_string()
}

/// Longest by character count; the earliest wins ties.
fn longest<'a, F>(candidates: &[&'a ScreenshotResult], key: F) -> Option<&'a ScreenshotResult>
where
    F: Fn(&ScreenshotResult) -> &str,
{
    let mut best: Option<(&ScreenshotResult, usize)> = None;
    for &r in candidates {
        let len = key(r).trim().chars().count();
        if best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((r, len));
        }
    }
    best.map(|(r, _)| r)
}

/// Title for a group, or the placeholder.
///
/// The zone-extracted names are tried first, longest first. Failing that,
/// the member with the longest top-of-screen text is used.
pub fn choose_product_name(title_candidates: &[&ScreenshotResult]) -> String {
    let mut zone_names: Vec<String> = title_candidates
        .iter()
        .map(|r| trim_product_name_raw(&r.product_name_zone, ZONE_NAME_MAX_CHARS))
        .filter(|name| !name.is_empty())
        .collect();
    // Stable: equal lengths keep index order.
    zone_names.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));
    if let Some(name) = zone_names.iter().find(|n| looks_like_product_name(n)) {
        return finalize_product_name(name);
    }

    if let Some(best) = longest(title_candidates, |r| r.top_text.as_str()) {
        let top = best.top_text.trim();
        let raw = if top.is_empty() { best.full_text.trim() } else { top };
        let name = trim_product_name_raw(raw, TOP_NAME_MAX_CHARS);
        if !name.is_empty() && looks_like_product_name(&name) {
            return finalize_product_name(&name);
        }
    }

    PRODUCT_NAME_PLACEHOLDER.to_string()
}

/// Fields for one group of indices into `results`.
///
/// Returns `None` when every member is a brand-detail screenshot: such a
/// group has nothing to show. Brand-detail members still contribute their brand.
pub fn draft_group(results: &[ScreenshotResult], members: &[usize]) -> Option<ProductDraft> {
    let mut indices = members.to_vec();
    indices.sort_unstable();
    let all: Vec<&ScreenshotResult> = indices.iter().filter_map(|&i| results.get(i)).collect();
    let titles: Vec<&ScreenshotResult> = all.iter().copied().filter(|r| !r.has_brand_label).collect();
    if titles.is_empty() {
        return None;
    }

    Some(ProductDraft {
        brand: choose_brand(&all),
        product_name: choose_product_name(&titles),
        price: titles.iter().find_map(|r| r.price).unwrap_or(0),
        sources: titles.iter().map(|r| r.path.clone()).collect(),
    })
}

/// Fields for a screenshot recorded on its own, as the folder watcher does.
///
/// Unlike [`draft_group`] the screenshot is always kept: with nothing to
/// group it with, it is the listing image whatever it shows.
pub fn draft_single(result: &ScreenshotResult) -> ProductDraft {
    let members = [result];
    ProductDraft {
        brand: choose_brand(&members),
        product_name: choose_product_name(&members),
        price: result.price.unwrap_or(0),
        sources: vec![result.path.clone()],
    }
}

/// Drafts for every group that has at least one listing screenshot.
pub fn draft_groups(results: &[ScreenshotResult], groups: &[Vec<usize>]) -> Vec<ProductDraft> {
    let mut drafts = Vec::new();
    for members in groups {
        match draft_group(results, members) {
            Some(draft) => drafts.push(draft),
            None => crate::log(&format!(
                "Skipping group {:?}: only brand-detail screenshots",
                members
            )),
        }
    }
    drafts
}
