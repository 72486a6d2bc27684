//! Batch pipeline: analyze screenshots, group them, write records.
//!
//! Per-screenshot analysis is independent and runs on a bounded pool of
//! scoped worker threads. Grouping starts only after every result is in,
//! and results are put back in input order first so the outcome does not
//! depend on thread scheduling.

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::config::{ExtractionMode, ScreenshotConfig};
use crate::extract::{
    brand_from_raw, clean_product_text, filter_to_zone, find_label, full_text, parse_price,
    product_name_zone_text, top_text, BrandExtractor, BRAND_LABEL,
};
use crate::grouping::{group_screenshots, GroupKey};
use crate::ocr::{
    crop_rect, detections_to_text, preprocess_for_ocr, Detection, OcrProvider, Page,
    PreprocessOptions,
};
use crate::record::{
    draft_groups, load_existing, today, write_debug_dump, write_json_atomic, IdAllocator,
    ProductRecord,
};
use crate::text::truncate_chars;
use crate::validate::is_valid_brand;
use crate::zone::{FractionalZone, Region};

/// Extensions picked up from the input folder (compared lowercased).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Everything extracted from one screenshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScreenshotResult {
    pub path: PathBuf,
    /// Text in the top part of the screen, used for grouping
    pub top_text: String,
    pub full_text: String,
    /// Title candidate read from the product-name zone
    pub product_name_zone: String,
    /// Validated brand, or empty
    pub brand: String,
    /// The screen shows the brand detail row rather than the listing photo
    pub has_brand_label: bool,
    pub raw_brand_text: String,
    pub raw_product_text: String,
    pub raw_price_text: String,
    pub price: Option<u32>,
}

impl GroupKey for ScreenshotResult {
    fn top_text(&self) -> &str {
        &self.top_text
    }

    fn full_text(&self) -> &str {
        &self.full_text
    }
}

/// Turns one decoded screenshot into a [`ScreenshotResult`].
///
/// Analysis never fails: OCR errors degrade to empty fields.
pub trait ScreenshotAnalyzer: Sync {
    fn name(&self) -> &'static str;

    fn analyze(&self, path: &Path, img: &DynamicImage) -> ScreenshotResult;
}

/// Runs OCR, logging and swallowing backend errors.
fn recognize_or_empty(ocr: &dyn OcrProvider, img: &DynamicImage, what: &str, path: &Path) -> Vec<Detection> {
    match ocr.recognize(img) {
        Ok(detections) => detections,
        Err(e) => {
            crate::log(&format!("OCR failed for {} ({}): {}", path.display(), what, e));
            Vec::new()
        }
    }
}

/// Full-page OCR; fields are located from label anchors and screen zones.
pub struct AnchorAnalyzer {
    ocr: Box<dyn OcrProvider>,
    brand: BrandExtractor,
    top_ratio: f32,
    product_name_zone: FractionalZone,
    brand_region: FractionalZone,
    product_region: FractionalZone,
    price_region: FractionalZone,
}

impl AnchorAnalyzer {
    pub fn new(config: &ScreenshotConfig, ocr: Box<dyn OcrProvider>) -> Self {
        Self {
            ocr,
            brand: BrandExtractor::new(config),
            top_ratio: config.top_ratio,
            product_name_zone: config.product_name_zone,
            brand_region: config.brand_region,
            product_region: config.product_region,
            price_region: config.price_region,
        }
    }

    /// Fields from detections already in hand.
    pub fn analyze_page(&self, path: &Path, page: &Page<'_>) -> ScreenshotResult {
        let full = full_text(page.detections);
        let region_text = |zone: &FractionalZone| full_text(&filter_to_zone(page, zone));
        let raw_price_text = region_text(&self.price_region);

        ScreenshotResult {
            path: path.to_path_buf(),
            top_text: top_text(page, self.top_ratio),
            product_name_zone: product_name_zone_text(page, &self.product_name_zone),
            brand: self.brand.extract(page),
            has_brand_label: find_label(&full, BRAND_LABEL).is_some(),
            raw_brand_text: region_text(&self.brand_region),
            raw_product_text: region_text(&self.product_region),
            price: parse_price(&raw_price_text),
            raw_price_text,
            full_text: full,
        }
    }
}

impl ScreenshotAnalyzer for AnchorAnalyzer {
    fn name(&self) -> &'static str {
        "anchor"
    }

    fn analyze(&self, path: &Path, img: &DynamicImage) -> ScreenshotResult {
        let detections = recognize_or_empty(self.ocr.as_ref(), img, "page", path);
        let page = Page {
            width: img.width(),
            height: img.height(),
            detections: &detections,
        };
        self.analyze_page(path, &page)
    }
}

/// Per-region OCR on fixed crops of the listing screen.
pub struct ZoneAnalyzer {
    ocr: Box<dyn OcrProvider>,
    brand_region: Region,
    product_region: Region,
    price_region: Region,
    /// `None` skips preprocessing
    preprocess: Option<PreprocessOptions>,
}

impl ZoneAnalyzer {
    pub fn new(config: &ScreenshotConfig, ocr: Box<dyn OcrProvider>) -> Self {
        let preprocess = config.preprocess.then(|| PreprocessOptions {
            contrast_factor: config.contrast_factor,
            ..PreprocessOptions::default()
        });
        Self {
            ocr,
            brand_region: Region::pick(config.brand_pixels, config.brand_region),
            product_region: Region::pick(config.product_pixels, config.product_region),
            price_region: Region::pick(config.price_pixels, config.price_region),
            preprocess,
        }
    }

    fn read_region(&self, path: &Path, img: &DynamicImage, region: &Region, what: &str) -> String {
        let rect = region.rect((img.width(), img.height()));
        if rect.is_empty() {
            return String::new();
        }
        let crop = crop_rect(img, rect);
        let prepared = match &self.preprocess {
            Some(options) => preprocess_for_ocr(&crop, options),
            None => crop,
        };
        let text = detections_to_text(&recognize_or_empty(self.ocr.as_ref(), &prepared, what, path));
        crate::log(&format!(
            "[OCR debug] {}: {} region: {:?}",
            file_label(path),
            what,
            text
        ));
        text
    }
}

impl ScreenshotAnalyzer for ZoneAnalyzer {
    fn name(&self) -> &'static str {
        "zone"
    }

    fn analyze(&self, path: &Path, img: &DynamicImage) -> ScreenshotResult {
        let raw_brand = self.read_region(path, img, &self.brand_region, "brand");
        let raw_product = self.read_region(path, img, &self.product_region, "product name");
        let raw_price = self.read_region(path, img, &self.price_region, "price");

        let raw_product = truncate_chars(&raw_product, 300).to_string();
        let brand = brand_from_raw(&raw_brand);
        let brand = if is_valid_brand(&brand) { brand } else { String::new() };

        ScreenshotResult {
            path: path.to_path_buf(),
            top_text: truncate_chars(&raw_product, 200).to_string(),
            full_text: raw_product.clone(),
            product_name_zone: clean_product_text(&raw_product),
            brand,
            has_brand_label: false,
            raw_brand_text: truncate_chars(&raw_brand, 200).to_string(),
            price: parse_price(&raw_price),
            raw_price_text: truncate_chars(&raw_price, 100).to_string(),
            raw_product_text: raw_product,
        }
    }
}

/// Picks the analyzer for the configured extraction mode.
pub fn build_analyzer(config: &ScreenshotConfig, ocr: Box<dyn OcrProvider>) -> Box<dyn ScreenshotAnalyzer> {
    match config.mode {
        ExtractionMode::Anchor => Box::new(AnchorAnalyzer::new(config, ocr)),
        ExtractionMode::Zone => Box::new(ZoneAnalyzer::new(config, ocr)),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decodes and analyzes one file. Undecodable images are logged and skipped.
pub fn analyze_path(path: &Path, analyzer: &dyn ScreenshotAnalyzer) -> Option<ScreenshotResult> {
    match image::open(path) {
        Ok(img) if img.width() > 0 && img.height() > 0 => Some(analyzer.analyze(path, &img)),
        Ok(_) => {
            crate::log(&format!("Skipping {}: empty image", file_label(path)));
            None
        }
        Err(e) => {
            crate::log(&format!("Skipping {}: {}", file_label(path), e));
            None
        }
    }
}

/// Analyzes `paths` on up to `workers` threads and returns the results in
/// input order, without the skipped files.
pub fn analyze_batch(paths: &[PathBuf], analyzer: &dyn ScreenshotAnalyzer, workers: usize) -> Vec<ScreenshotResult> {
    let workers = workers.clamp(1, paths.len().max(1));
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || {
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = paths.get(i) else { break };
                    if tx.send((i, analyze_path(path, analyzer))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut indexed: Vec<(usize, ScreenshotResult)> = rx
        .into_iter()
        .filter_map(|(i, result)| result.map(|r| (i, r)))
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}

/// Image files directly inside `dir`, sorted by path.
pub fn collect_input_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// File locations for one batch run.
#[derive(Clone, Debug)]
pub struct BatchPaths {
    pub input_dir: PathBuf,
    pub images_dir: PathBuf,
    pub data_json: PathBuf,
    pub suggested_json: PathBuf,
    pub debug_json: PathBuf,
}

impl BatchPaths {
    /// Standard layout under the project root.
    pub fn from_project_root() -> Self {
        Self {
            input_dir: crate::paths::get_input_dir(),
            images_dir: crate::paths::get_images_dir(),
            data_json: crate::paths::get_data_json(),
            suggested_json: crate::paths::get_suggested_json(),
            debug_json: crate::paths::get_debug_json(),
        }
    }
}

/// What a batch run produced.
#[derive(Debug)]
pub struct BatchSummary {
    pub screenshots: usize,
    pub groups: usize,
    pub records: Vec<ProductRecord>,
}

/// Processes every screenshot in the input folder into suggested records.
///
/// Only an empty input folder fails the run; unreadable images, OCR errors
/// and copy failures are logged and skipped.
pub fn run_batch(
    paths: &BatchPaths,
    analyzer: &dyn ScreenshotAnalyzer,
    min_overlap: usize,
    workers: usize,
) -> Result<BatchSummary> {
    fs::create_dir_all(&paths.input_dir)
        .with_context(|| format!("Failed to create {}", paths.input_dir.display()))?;
    fs::create_dir_all(&paths.images_dir)
        .with_context(|| format!("Failed to create {}", paths.images_dir.display()))?;

    let images = collect_input_images(&paths.input_dir)?;
    if images.is_empty() {
        bail!(
            "No images in {}. Add screenshots and run again.",
            paths.input_dir.display()
        );
    }
    crate::log(&format!(
        "Analyzing {} screenshots with the {} analyzer ({} workers)",
        images.len(),
        analyzer.name(),
        workers.max(1)
    ));

    let results = analyze_batch(&images, analyzer, workers);

    match write_debug_dump(&paths.debug_json, &results) {
        Ok(()) => crate::log(&format!("OCR debug dump written to {}", paths.debug_json.display())),
        Err(e) => crate::log(&format!("Skipping OCR debug dump: {:#}", e)),
    }

    let groups = group_screenshots(&results, min_overlap);

    let existing = load_existing(&paths.data_json).unwrap_or_else(|e| {
        crate::log(&format!("Ignoring existing catalog for id seeding: {:#}", e));
        Vec::new()
    });
    let mut ids = IdAllocator::from_records(&existing);
    let created_at = today();

    let mut records = Vec::new();
    for draft in draft_groups(&results, &groups) {
        let id = ids.next_id()?;
        match draft.into_record(id.clone(), &paths.images_dir, &created_at) {
            Ok(record) => records.push(record),
            Err(e) => crate::log(&format!("Skipping {}: {:#}", id, e)),
        }
    }

    write_json_atomic(&paths.suggested_json, &records)?;
    crate::log(&format!(
        "Grouped {} screenshots into {} products; wrote {}",
        results.len(),
        groups.len(),
        paths.suggested_json.display()
    ));

    Ok(BatchSummary {
        screenshots: results.len(),
        groups: groups.len(),
        records,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ocr::Quad;
    use image::{ImageBuffer, Rgba};

    /// OCR stand-in that returns fixed detections keyed by image width.
    pub struct FakeOcr {
        pub pages: Vec<(u32, Vec<Detection>)>,
    }

    impl OcrProvider for FakeOcr {
        fn recognize(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
            Ok(self
                .pages
                .iter()
                .find(|(w, _)| *w == img.width())
                .map(|(_, d)| d.clone())
                .unwrap_or_default())
        }
    }

    pub fn det(text: &str, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new(Quad::from_rect(x, y, w, h), text, 0.9)
    }

    /// Writes a blank PNG of the given size.
    pub fn write_png(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        img.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{det, write_png, FakeOcr};
    use super::*;
    use anyhow::anyhow;
    use tempfile::tempdir;

    struct FailingOcr;

    impl OcrProvider for FailingOcr {
        fn recognize(&self, _img: &DynamicImage) -> Result<Vec<Detection>> {
            Err(anyhow!("backend down"))
        }
    }

    /// Title screen of listing A (width 100), its brand-detail screen (101),
    /// and an unrelated listing B (102). Height 200 for all.
    fn fake_pages() -> FakeOcr {
        FakeOcr {
            pages: vec![
                (
                    100,
                    vec![
                        det("【美品】JACOB COHEN J688", 5.0, 10.0, 90.0, 12.0),
                        det("【美品】JACOB COHEN J688 デニム", 5.0, 80.0, 90.0, 14.0),
                        det("¥12,800", 5.0, 110.0, 40.0, 10.0),
                    ],
                ),
                (
                    101,
                    vec![
                        det("JACOB COHEN J688 デニム", 5.0, 10.0, 90.0, 12.0),
                        det("ブランド", 5.0, 130.0, 20.0, 8.0),
                        det("JACOB COHEN", 40.0, 130.0, 50.0, 8.0),
                    ],
                ),
                (
                    102,
                    vec![
                        det("ユニクロ エアリズム Tシャツ", 5.0, 10.0, 90.0, 12.0),
                        det("ユニクロ エアリズム Tシャツ", 5.0, 80.0, 90.0, 14.0),
                    ],
                ),
            ],
        }
    }

    #[test]
    fn test_anchor_analyzer_fields() {
        let config = ScreenshotConfig::default();
        let analyzer = AnchorAnalyzer::new(&config, Box::new(fake_pages()));
        let img = DynamicImage::new_rgba8(101, 200);

        let result = analyzer.analyze(Path::new("b.png"), &img);

        assert!(result.has_brand_label);
        assert_eq!(result.brand, "JACOB COHEN");
        assert_eq!(result.top_text, "JACOB COHEN J688 デニム");
    }

    #[test]
    fn test_anchor_analyzer_price_region() {
        let config = ScreenshotConfig::default();
        let analyzer = AnchorAnalyzer::new(&config, Box::new(fake_pages()));
        let img = DynamicImage::new_rgba8(100, 200);

        let result = analyzer.analyze(Path::new("a.png"), &img);

        assert_eq!(result.raw_price_text, "¥12,800");
        assert_eq!(result.price, Some(12800));
        assert!(!result.has_brand_label);
    }

    #[test]
    fn test_ocr_failure_degrades_to_empty() {
        let config = ScreenshotConfig::default();
        let img = DynamicImage::new_rgba8(100, 200);

        let anchor = AnchorAnalyzer::new(&config, Box::new(FailingOcr));
        let result = anchor.analyze(Path::new("a.png"), &img);
        assert_eq!(result.full_text, "");
        assert_eq!(result.brand, "");

        let zone = ZoneAnalyzer::new(&config, Box::new(FailingOcr));
        let result = zone.analyze(Path::new("a.png"), &img);
        assert_eq!(result.raw_product_text, "");
        assert_eq!(result.price, None);
    }

    #[test]
    fn test_zone_analyzer_reads_regions() {
        struct RegionOcr;
        impl OcrProvider for RegionOcr {
            fn recognize(&self, _img: &DynamicImage) -> Result<Vec<Detection>> {
                Ok(vec![det("L・JACOB COHEN・目立った傷や汚れなし ¥3,000", 0.0, 0.0, 1.0, 1.0)])
            }
        }

        let config = ScreenshotConfig {
            preprocess: false,
            mode: ExtractionMode::Zone,
            ..ScreenshotConfig::default()
        };
        let analyzer = ZoneAnalyzer::new(&config, Box::new(RegionOcr));
        let img = DynamicImage::new_rgba8(1000, 2000);

        let result = analyzer.analyze(Path::new("a.png"), &img);

        assert_eq!(result.brand, "JACOB COHEN");
        assert_eq!(result.price, Some(3000));
        assert_eq!(result.product_name_zone, "L・JACOB COHEN・目立った傷や汚れなし");
        assert_eq!(result.top_text, result.full_text);
        assert!(!result.has_brand_label);
    }

    #[test]
    fn test_zone_analyzer_uses_pixel_regions() {
        use crate::zone::PixelZone;
        use std::sync::Mutex;

        #[derive(Default)]
        struct SizeOcr {
            sizes: Mutex<Vec<(u32, u32)>>,
        }
        impl OcrProvider for SizeOcr {
            fn recognize(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
                self.sizes.lock().unwrap().push((img.width(), img.height()));
                Ok(Vec::new())
            }
        }
        impl OcrProvider for std::sync::Arc<SizeOcr> {
            fn recognize(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
                self.as_ref().recognize(img)
            }
        }

        let ocr = std::sync::Arc::new(SizeOcr::default());
        let config = ScreenshotConfig {
            preprocess: false,
            mode: ExtractionMode::Zone,
            brand_pixels: Some(PixelZone { x: 60, y: 1500, width: 400, height: 90 }),
            price_pixels: Some(PixelZone { x: 900, y: 1900, width: 500, height: 500 }),
            ..ScreenshotConfig::default()
        };
        let analyzer = ZoneAnalyzer::new(&config, Box::new(ocr.clone()));
        analyzer.analyze(Path::new("a.png"), &DynamicImage::new_rgba8(1000, 2000));

        let sizes = ocr.sizes.lock().unwrap();
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes[0], (400, 90));
        // Clamped to the image bounds
        assert_eq!(sizes[2], (100, 100));
    }

    #[test]
    fn test_build_analyzer_follows_mode() {
        let anchor = build_analyzer(&ScreenshotConfig::default(), Box::new(FailingOcr));
        assert_eq!(anchor.name(), "anchor");
        let zone_config = ScreenshotConfig {
            mode: ExtractionMode::Zone,
            ..ScreenshotConfig::default()
        };
        assert_eq!(build_analyzer(&zone_config, Box::new(FailingOcr)).name(), "zone");
    }

    #[test]
    fn test_analyze_batch_keeps_input_order_and_skips_unreadable() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let broken = dir.path().join("b.png");
        let c = dir.path().join("c.png");
        write_png(&a, 100, 200);
        fs::write(&broken, b"not an image").unwrap();
        write_png(&c, 102, 200);

        let analyzer = AnchorAnalyzer::new(&ScreenshotConfig::default(), Box::new(fake_pages()));
        let results = analyze_batch(&[a.clone(), broken, c.clone()], &analyzer, 3);

        let paths: Vec<&PathBuf> = results.iter().map(|r| &r.path).collect();
        assert_eq!(paths, vec![&a, &c]);
    }

    #[test]
    fn test_collect_input_images_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let images = collect_input_images(dir.path()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg"]);
    }

    fn batch_paths(root: &Path) -> BatchPaths {
        BatchPaths {
            input_dir: root.join("screenshots_input"),
            images_dir: root.join("images"),
            data_json: root.join("data").join("data.json"),
            suggested_json: root.join("suggested_products.json"),
            debug_json: root.join("ocr_debug.json"),
        }
    }

    #[test]
    fn test_run_batch_end_to_end() {
        let dir = tempdir().unwrap();
        let paths = batch_paths(dir.path());
        fs::create_dir_all(&paths.input_dir).unwrap();
        fs::create_dir_all(paths.data_json.parent().unwrap()).unwrap();
        fs::write(&paths.data_json, r#"[{"id": "product-007"}]"#).unwrap();

        write_png(&paths.input_dir.join("1_title.png"), 100, 200);
        write_png(&paths.input_dir.join("2_brand.png"), 101, 200);
        write_png(&paths.input_dir.join("3_other.png"), 102, 200);

        let analyzer = AnchorAnalyzer::new(&ScreenshotConfig::default(), Box::new(fake_pages()));
        let summary = run_batch(&paths, &analyzer, 3, 2).unwrap();

        assert_eq!(summary.screenshots, 3);
        assert_eq!(summary.groups, 2);
        assert_eq!(summary.records.len(), 2);

        let first = &summary.records[0];
        assert_eq!(first.id, "product-008");
        assert_eq!(first.brand, "JACOB COHEN");
        assert_eq!(first.product_name, "【美品】JACOB COHEN J688 デニム");
        assert_eq!(first.price, 12800);
        // The brand-detail screenshot is not a catalog image
        assert_eq!(first.images, vec!["images/product-008_1.png"]);
        assert_eq!(first.screenshot_count, 1);

        let second = &summary.records[1];
        assert_eq!(second.id, "product-009");
        assert_eq!(second.brand, "その他");

        assert!(paths.images_dir.join("product-008_1.png").exists());
        let written: Vec<ProductRecord> =
            serde_json::from_str(&fs::read_to_string(&paths.suggested_json).unwrap()).unwrap();
        assert_eq!(written, summary.records);
        assert!(paths.debug_json.exists());
    }

    #[test]
    fn test_run_batch_without_input_fails() {
        let dir = tempdir().unwrap();
        let paths = batch_paths(dir.path());
        let analyzer = AnchorAnalyzer::new(&ScreenshotConfig::default(), Box::new(fake_pages()));
        let err = run_batch(&paths, &analyzer, 3, 1).unwrap_err();
        assert!(err.to_string().contains("No images"));
        assert!(!paths.suggested_json.exists());
    }
}
