//! Configuration for extraction and folder watching.
//!
//! Both files are optional. A missing or malformed file, or a zone override
//! that breaks the fractional-zone invariant, is logged and replaced by the
//! built-in defaults: one bad config file must never fail a whole batch.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::zone::{defaults, FractionalZone, PixelZone};

/// A zone override where every sub-key is optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialZone {
    pub x_min: Option<f32>,
    pub x_max: Option<f32>,
    pub y_min: Option<f32>,
    pub y_max: Option<f32>,
}

impl PartialZone {
    /// Overrides only the sub-keys present, then checks the result.
    pub fn apply(&self, base: FractionalZone) -> Result<FractionalZone> {
        FractionalZone::new(
            self.x_min.unwrap_or(base.x_min),
            self.x_max.unwrap_or(base.x_max),
            self.y_min.unwrap_or(base.y_min),
            self.y_max.unwrap_or(base.y_max),
        )
    }
}

/// Which analyzer produces a screenshot's fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Full-page OCR, fields located relative to label anchors.
    #[default]
    Anchor,
    /// Per-region OCR on fixed crops of the listing screen.
    Zone,
}

/// Settings for the Tesseract adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct TesseractSettings {
    /// Explicit executable; searched for when absent
    pub cmd: Option<PathBuf>,
    /// Language list passed to `-l`
    pub lang: String,
    /// Page segmentation mode passed to `--psm`
    pub psm: u32,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            cmd: None,
            lang: "jpn+eng".to_string(),
            psm: 6,
        }
    }
}

/// On-disk shape of `screenshot_config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawScreenshotConfig {
    brand_region: Option<PartialZone>,
    brand_zone: Option<PartialZone>,
    product_region: Option<PartialZone>,
    product_name_zone: Option<PartialZone>,
    price_region: Option<PartialZone>,
    brand_pixels: Option<PixelZone>,
    product_pixels: Option<PixelZone>,
    price_pixels: Option<PixelZone>,
    preprocess: Option<bool>,
    contrast_factor: Option<f32>,
    extraction_mode: Option<ExtractionMode>,
    use_mercari_iphone_ocr: Option<bool>,
    ocr_engine: Option<String>,
    same_line_tolerance: Option<f32>,
    top_ratio: Option<f32>,
    min_overlap: Option<usize>,
    tesseract_cmd: Option<PathBuf>,
    tesseract_lang: Option<String>,
    tesseract_psm: Option<u32>,
}

/// Resolved extraction configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenshotConfig {
    /// Brand crop for the zone analyzer
    pub brand_region: FractionalZone,
    /// Product-name crop for the zone analyzer
    pub product_region: FractionalZone,
    /// Price crop for the zone analyzer
    pub price_region: FractionalZone,
    /// Brand filter for the anchor analyzer, only set when configured
    pub brand_zone: Option<FractionalZone>,
    /// Title band for the anchor analyzer
    pub product_name_zone: FractionalZone,
    /// Device-pixel crops for the zone analyzer; each replaces its fractional region
    pub brand_pixels: Option<PixelZone>,
    pub product_pixels: Option<PixelZone>,
    pub price_pixels: Option<PixelZone>,
    /// Advisory flag for the image-preparation step
    pub preprocess: bool,
    pub contrast_factor: f32,
    pub mode: ExtractionMode,
    /// Same-line band around an anchor, as a fraction of image height
    pub same_line_tolerance: f32,
    /// Portion of the screen treated as "top" text for grouping
    pub top_ratio: f32,
    /// Minimum shared substring length for grouping
    pub min_overlap: usize,
    pub tesseract: TesseractSettings,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            brand_region: defaults::BRAND_REGION,
            product_region: defaults::PRODUCT_REGION,
            price_region: defaults::PRICE_REGION,
            brand_zone: None,
            product_name_zone: defaults::PRODUCT_NAME_ZONE,
            brand_pixels: None,
            product_pixels: None,
            price_pixels: None,
            preprocess: true,
            contrast_factor: 1.5,
            mode: ExtractionMode::Anchor,
            same_line_tolerance: 0.18,
            top_ratio: 0.35,
            min_overlap: 3,
            tesseract: TesseractSettings::default(),
        }
    }
}

/// Applies an override, keeping `base` if the result would be invalid.
fn resolve_zone(key: &str, partial: Option<&PartialZone>, base: FractionalZone) -> FractionalZone {
    match partial {
        Some(p) => match p.apply(base) {
            Ok(zone) => zone,
            Err(e) => {
                crate::log(&format!("Ignoring {} override: {}. Using default.", key, e));
                base
            }
        },
        None => base,
    }
}

impl ScreenshotConfig {
    /// Loads config from file, or returns defaults if it is missing or broken.
    pub fn load(config_path: &Path) -> Self {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match Self::from_json_str(&content) {
                    Ok(config) => {
                        crate::log(&format!(
                            "Loaded screenshot config from {}",
                            config_path.display()
                        ));
                        return config;
                    }
                    Err(e) => {
                        crate::log(&format!(
                            "Failed to parse screenshot config: {}. Using defaults.",
                            e
                        ));
                    }
                },
                Err(e) => {
                    crate::log(&format!(
                        "Failed to read screenshot config: {}. Using defaults.",
                        e
                    ));
                }
            }
        }
        Self::default()
    }

    /// Parses the JSON form. Invalid zone overrides fall back individually;
    /// only a document that is not valid JSON of the expected shape errors.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawScreenshotConfig = serde_json::from_str(content)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawScreenshotConfig) -> Self {
        let defaults = Self::default();

        // Each analyzer prefers its own spelling and borrows the other one.
        let brand_for_zone = raw.brand_region.as_ref().or(raw.brand_zone.as_ref());
        let brand_for_anchor = raw.brand_zone.as_ref().or(raw.brand_region.as_ref());
        let product_for_zone = raw.product_region.as_ref().or(raw.product_name_zone.as_ref());
        let product_for_anchor = raw.product_name_zone.as_ref().or(raw.product_region.as_ref());

        let mode = match raw.extraction_mode {
            Some(mode) => mode,
            None if raw.use_mercari_iphone_ocr == Some(true) => ExtractionMode::Zone,
            None if raw.ocr_engine.as_deref() == Some("tesseract") => ExtractionMode::Zone,
            None => defaults.mode,
        };

        let same_line_tolerance = match raw.same_line_tolerance {
            Some(t) if t > 0.0 && t <= 1.0 => t,
            Some(t) => {
                crate::log(&format!("Ignoring same_line_tolerance {}. Using default.", t));
                defaults.same_line_tolerance
            }
            None => defaults.same_line_tolerance,
        };
        let top_ratio = match raw.top_ratio {
            Some(r) if r > 0.0 && r <= 1.0 => r,
            Some(r) => {
                crate::log(&format!("Ignoring top_ratio {}. Using default.", r));
                defaults.top_ratio
            }
            None => defaults.top_ratio,
        };

        Self {
            brand_region: resolve_zone("brand_region", brand_for_zone, defaults::BRAND_REGION),
            product_region: resolve_zone(
                "product_region",
                product_for_zone,
                defaults::PRODUCT_REGION,
            ),
            price_region: resolve_zone(
                "price_region",
                raw.price_region.as_ref(),
                defaults::PRICE_REGION,
            ),
            brand_zone: brand_for_anchor
                .map(|p| resolve_zone("brand_zone", Some(p), FractionalZone::FULL)),
            product_name_zone: resolve_zone(
                "product_name_zone",
                product_for_anchor,
                defaults::PRODUCT_NAME_ZONE,
            ),
            brand_pixels: raw.brand_pixels,
            product_pixels: raw.product_pixels,
            price_pixels: raw.price_pixels,
            preprocess: raw.preprocess.unwrap_or(defaults.preprocess),
            contrast_factor: raw.contrast_factor.unwrap_or(defaults.contrast_factor),
            mode,
            same_line_tolerance,
            top_ratio,
            min_overlap: raw.min_overlap.filter(|&n| n > 0).unwrap_or(defaults.min_overlap),
            tesseract: TesseractSettings {
                cmd: raw.tesseract_cmd,
                lang: raw
                    .tesseract_lang
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or(defaults.tesseract.lang),
                psm: raw.tesseract_psm.unwrap_or(defaults.tesseract.psm),
            },
        }
    }
}

/// Folder watcher configuration (`watch_config.json`).
///
/// Relative directories are resolved against the project root.
/// Empty strings count as "not set".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Folder to poll for new screenshots (e.g. a synced drive folder)
    pub watch_folder: String,
    /// Catalog that new records are appended to
    pub data_json: String,
    /// Where catalog images are copied
    pub images_dir: String,
    /// Where successfully processed sources are moved
    pub processed_dir: String,
    /// Where sources that failed processing are moved
    pub failed_dir: String,
    /// Delay between folder scans (milliseconds)
    pub poll_interval_ms: u64,
    /// Wait before reading a newly seen file, for sync clients still writing it (milliseconds)
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_folder: String::new(),
            data_json: "data/data.json".to_string(),
            images_dir: "images".to_string(),
            processed_dir: "processed".to_string(),
            failed_dir: "failed".to_string(),
            poll_interval_ms: 1000,
            settle_ms: 2000,
        }
    }
}

impl WatchConfig {
    /// Loads config from file, or returns defaults if it is missing or broken.
    pub fn load(config_path: &Path) -> Self {
        if !config_path.exists() {
            crate::log("watch_config.json not found. Using default config.");
            return Self::default();
        }
        match fs::read_to_string(config_path) {
            Ok(content) => match serde_json::from_str::<WatchConfig>(&content) {
                Ok(config) => config.fill_blanks(),
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse watch_config.json: {}. Using defaults.",
                        e
                    ));
                    Self::default()
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read watch_config.json: {}. Using defaults.",
                    e
                ));
                Self::default()
            }
        }
    }

    fn fill_blanks(mut self) -> Self {
        let defaults = Self::default();
        for (value, default) in [
            (&mut self.data_json, defaults.data_json),
            (&mut self.images_dir, defaults.images_dir),
            (&mut self.processed_dir, defaults.processed_dir),
            (&mut self.failed_dir, defaults.failed_dir),
        ] {
            if value.trim().is_empty() {
                *value = default;
            }
        }
        self
    }
}
