//! Folder watcher: turns each new screenshot dropped into a folder (for
//! example a synced phone folder) into a catalog record.
//!
//! The folder is polled. Every new image is registered once, given time to
//! finish syncing, analyzed on its own, appended to the catalog as a
//! one-screenshot record, and moved to `processed/`. Files that fail go to
//! `failed/` instead.

pub mod registry;

pub use registry::ProcessedRegistry;

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::WatchConfig;
use crate::pipeline::{analyze_path, ScreenshotAnalyzer};
use crate::record::{
    append_records, draft_single, load_existing, remove_images, today, unique_destination,
    IdAllocator, ProductRecord,
};

/// Set to end [`Watcher::run`] after the current poll.
pub static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Resets the stop flag. Call before starting a watcher.
pub fn reset_stop_flag() {
    STOP_REQUESTED.store(false, Ordering::SeqCst);
}

/// Asks a running watcher to stop.
pub fn request_stop() {
    crate::log("Stop requested");
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Extensions the watcher reacts to (compared lowercased).
pub const WATCHED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Resolved locations the watcher reads and writes.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchPaths {
    pub watch_folder: PathBuf,
    pub data_json: PathBuf,
    pub images_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub failed_dir: PathBuf,
}

impl WatchPaths {
    /// Resolves relative entries against the project root.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        if config.watch_folder.trim().is_empty() {
            bail!("watch_folder is not set in watch_config.json");
        }
        let resolve = |p: &str| crate::paths::resolve(Path::new(p));
        Ok(Self {
            watch_folder: resolve(&config.watch_folder),
            data_json: resolve(&config.data_json),
            images_dir: resolve(&config.images_dir),
            processed_dir: resolve(&config.processed_dir),
            failed_dir: resolve(&config.failed_dir),
        })
    }
}

/// What happened to one watched file.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// A record was appended; the source went to `processed/`.
    Added(ProductRecord),
    /// Moved to `failed/` (or left in place if even that failed).
    Failed(String),
    /// Disappeared while settling.
    Vanished,
}

fn is_watched_image(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| WATCHED_EXTENSIONS.contains(&e.as_str()))
}

/// Moves `src` into `dir`, suffixing the name on a clash. Falls back to
/// copy and delete when a rename is not possible (e.g. across drives).
pub fn move_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("No file name: {}", src.display()))?;
    let ext = src
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let dest = unique_destination(dir, &stem, &ext);

    if fs::rename(src, &dest).is_err() {
        fs::copy(src, &dest)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        fs::remove_file(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    }
    Ok(dest)
}

/// Analyzes one image and appends it to the catalog as its own record.
///
/// The catalog is re-read for every file so ids stay unique even if it was
/// edited meanwhile. When the append fails the copied images are removed
/// again, so the id is not taken.
pub fn process_new_image(
    path: &Path,
    paths: &WatchPaths,
    analyzer: &dyn ScreenshotAnalyzer,
) -> Result<ProductRecord> {
    let result = analyze_path(path, analyzer)
        .ok_or_else(|| anyhow!("Could not decode {}", path.display()))?;

    let existing = load_existing(&paths.data_json)?;
    let id = IdAllocator::from_records(&existing).next_id()?;
    let record = draft_single(&result).into_record(id, &paths.images_dir, &today())?;
    if let Err(e) = append_records(&paths.data_json, std::slice::from_ref(&record)) {
        remove_images(&record.images, &paths.images_dir);
        return Err(e);
    }
    Ok(record)
}

/// Polling watcher over one folder.
pub struct Watcher<'a> {
    paths: WatchPaths,
    analyzer: &'a dyn ScreenshotAnalyzer,
    registry: ProcessedRegistry,
    poll_interval: Duration,
    settle: Duration,
}

impl<'a> Watcher<'a> {
    pub fn new(
        paths: WatchPaths,
        analyzer: &'a dyn ScreenshotAnalyzer,
        poll_interval: Duration,
        settle: Duration,
    ) -> Result<Self> {
        if !paths.watch_folder.is_dir() {
            bail!("Watch folder does not exist: {}", paths.watch_folder.display());
        }
        Ok(Self {
            paths,
            analyzer,
            registry: ProcessedRegistry::new(),
            poll_interval,
            settle,
        })
    }

    pub fn from_config(config: &WatchConfig, analyzer: &'a dyn ScreenshotAnalyzer) -> Result<Self> {
        Self::new(
            WatchPaths::from_config(config)?,
            analyzer,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.settle_ms),
        )
    }

    pub fn registry(&self) -> &ProcessedRegistry {
        &self.registry
    }

    /// Handles every image not seen before, in name order.
    pub fn poll_once(&mut self) -> Result<Vec<(PathBuf, Outcome)>> {
        let folder = &self.paths.watch_folder;
        let mut fresh = Vec::new();
        for entry in fs::read_dir(folder).with_context(|| format!("Failed to read {}", folder.display()))? {
            let path = entry?.path();
            if path.is_file() && is_watched_image(&path) {
                fresh.push(path);
            }
        }
        fresh.sort();
        fresh.retain(|p| self.registry.register(p));

        let mut handled = Vec::with_capacity(fresh.len());
        for path in fresh {
            let outcome = self.handle(&path);
            handled.push((path, outcome));
        }
        Ok(handled)
    }

    fn handle(&self, path: &Path) -> Outcome {
        // Sync clients may still be writing the file.
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        if !path.exists() {
            crate::log(&format!("{} disappeared before processing", path.display()));
            return Outcome::Vanished;
        }

        match process_new_image(path, &self.paths, self.analyzer) {
            Ok(record) => {
                crate::log(&format!(
                    "Added id={} brand={} product_name={}",
                    record.id,
                    record.brand,
                    crate::text::truncate_chars(&record.product_name, 30)
                ));
                match move_into(path, &self.paths.processed_dir) {
                    Ok(dest) => crate::log(&format!("Moved to processed: {}", dest.display())),
                    Err(e) => crate::log(&format!("Failed to move {} to processed: {:#}", path.display(), e)),
                }
                Outcome::Added(record)
            }
            Err(e) => {
                crate::log(&format!("Error processing {}: {:#}", path.display(), e));
                match move_into(path, &self.paths.failed_dir) {
                    Ok(dest) => crate::log(&format!("Moved to failed: {}", dest.display())),
                    Err(move_err) => crate::log(&format!(
                        "Failed to move {} to failed: {:#}",
                        path.display(),
                        move_err
                    )),
                }
                Outcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// Polls until `stop` is set. Scan errors are logged and retried.
    pub fn run(&mut self, stop: &AtomicBool) {
        crate::log(&format!(
            "Watching {} (.png / .jpg / .jpeg)",
            self.paths.watch_folder.display()
        ));
        while !stop.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once() {
                crate::log(&format!("Watch scan failed: {:#}", e));
            }
            thread::sleep(self.poll_interval);
        }
        crate::log("Watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenshotConfig;
    use crate::pipeline::test_support::{det, write_png, FakeOcr};
    use crate::pipeline::AnchorAnalyzer;
    use tempfile::tempdir;

    fn analyzer() -> AnchorAnalyzer {
        AnchorAnalyzer::new(
            &ScreenshotConfig::default(),
            Box::new(FakeOcr {
                pages: vec![
                    (
                        100,
                        vec![
                            det("【美品】JACOB COHEN J688", 5.0, 10.0, 90.0, 12.0),
                            det("【美品】JACOB COHEN J688 デニム", 5.0, 80.0, 90.0, 14.0),
                        ],
                    ),
                    (
                        101,
                        vec![
                            det("ブランド", 5.0, 130.0, 20.0, 8.0),
                            det("JACOB COHEN", 40.0, 130.0, 50.0, 8.0),
                        ],
                    ),
                ],
            }),
        )
    }

    fn watch_paths(root: &Path) -> WatchPaths {
        let paths = WatchPaths {
            watch_folder: root.join("inbox"),
            data_json: root.join("data").join("data.json"),
            images_dir: root.join("images"),
            processed_dir: root.join("processed"),
            failed_dir: root.join("failed"),
        };
        fs::create_dir_all(&paths.watch_folder).unwrap();
        paths
    }

    fn watcher<'a>(paths: WatchPaths, analyzer: &'a AnchorAnalyzer) -> Watcher<'a> {
        Watcher::new(paths, analyzer, Duration::ZERO, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_new_image_becomes_record() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        fs::create_dir_all(paths.data_json.parent().unwrap()).unwrap();
        fs::write(&paths.data_json, r#"[{"id": "product-004"}]"#).unwrap();
        write_png(&paths.watch_folder.join("IMG_1.PNG"), 100, 200);

        let analyzer = analyzer();
        let mut w = watcher(paths.clone(), &analyzer);
        let handled = w.poll_once().unwrap();

        assert_eq!(handled.len(), 1);
        let Outcome::Added(record) = &handled[0].1 else {
            panic!("expected a record, got {:?}", handled[0].1);
        };
        assert_eq!(record.id, "product-005");
        assert_eq!(record.product_name, "【美品】JACOB COHEN J688 デニム");
        assert_eq!(record.brand, "その他");
        assert_eq!(record.images, vec!["images/product-005_1.png"]);

        assert!(paths.images_dir.join("product-005_1.png").exists());
        assert!(paths.processed_dir.join("IMG_1.PNG").exists());
        assert!(!paths.watch_folder.join("IMG_1.PNG").exists());

        let catalog = load_existing(&paths.data_json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1]["id"], "product-005");
    }

    #[test]
    fn test_brand_detail_screen_still_recorded() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        write_png(&paths.watch_folder.join("brand.png"), 101, 200);

        let analyzer = analyzer();
        let mut w = watcher(paths.clone(), &analyzer);
        let handled = w.poll_once().unwrap();

        let Outcome::Added(record) = &handled[0].1 else {
            panic!("expected a record, got {:?}", handled[0].1);
        };
        assert_eq!(record.id, "product-001");
        assert_eq!(record.brand, "JACOB COHEN");
        assert_eq!(load_existing(&paths.data_json).unwrap().len(), 1);
        assert!(paths.processed_dir.join("brand.png").exists());
    }

    #[test]
    fn test_title_containing_label_word_is_recorded() {
        let analyzer = AnchorAnalyzer::new(
            &ScreenshotConfig::default(),
            Box::new(FakeOcr {
                pages: vec![(
                    100,
                    vec![det("【ハイブランド】JACOB COHEN J688 デニム", 5.0, 10.0, 90.0, 14.0)],
                )],
            }),
        );
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        write_png(&paths.watch_folder.join("IMG_2.png"), 100, 200);

        let mut w = watcher(paths.clone(), &analyzer);
        let handled = w.poll_once().unwrap();

        let Outcome::Added(record) = &handled[0].1 else {
            panic!("expected a record, got {:?}", handled[0].1);
        };
        assert_eq!(record.brand, "その他");
        assert_eq!(record.product_name, "【ハイブランド】JACOB COHEN J688 デニム");
        assert_eq!(load_existing(&paths.data_json).unwrap().len(), 1);
        assert!(paths.processed_dir.join("IMG_2.png").exists());
    }

    #[test]
    fn test_failed_append_removes_copied_images() {
        let dir = tempdir().unwrap();
        let mut paths = watch_paths(dir.path());
        // A file where the catalog directory should be: reads see no catalog,
        // the write cannot create it.
        fs::write(dir.path().join("blocker"), b"x").unwrap();
        paths.data_json = dir.path().join("blocker").join("data.json");
        write_png(&paths.watch_folder.join("IMG_3.png"), 100, 200);

        let analyzer = analyzer();
        let mut w = watcher(paths.clone(), &analyzer);
        let handled = w.poll_once().unwrap();

        assert!(matches!(handled[0].1, Outcome::Failed(_)));
        assert!(!paths.images_dir.join("product-001_1.png").exists());
        assert!(paths.failed_dir.join("IMG_3.png").exists());
    }

    #[test]
    fn test_undecodable_image_goes_to_failed() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        fs::write(paths.watch_folder.join("broken.png"), b"not an image").unwrap();

        let analyzer = analyzer();
        let mut w = watcher(paths.clone(), &analyzer);
        let handled = w.poll_once().unwrap();

        assert!(matches!(handled[0].1, Outcome::Failed(_)));
        assert!(paths.failed_dir.join("broken.png").exists());
        assert!(!paths.data_json.exists());
    }

    #[test]
    fn test_each_path_handled_once() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        let notes = paths.watch_folder.join("notes.txt");
        fs::write(&notes, b"x").unwrap();
        write_png(&paths.watch_folder.join("a.png"), 100, 200);

        let analyzer = analyzer();
        let mut w = watcher(paths.clone(), &analyzer);
        assert_eq!(w.poll_once().unwrap().len(), 1);

        // Same name dropped again: already registered for this run
        write_png(&paths.watch_folder.join("a.png"), 100, 200);
        assert!(w.poll_once().unwrap().is_empty());
        assert!(paths.watch_folder.join("a.png").exists());
        assert!(notes.exists());
        assert_eq!(w.registry().len(), 1);
    }

    #[test]
    fn test_move_into_suffixes_clash() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("processed");
        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("a.png"), b"old").unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, b"new").unwrap();

        let dest = move_into(&src, &dest_dir).unwrap();

        assert_eq!(dest, dest_dir.join("a_2.png"));
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(fs::read(dest_dir.join("a.png")).unwrap(), b"old");
        assert!(!src.exists());
    }

    #[test]
    fn test_missing_watch_folder_rejected() {
        let dir = tempdir().unwrap();
        let analyzer = analyzer();
        let paths = WatchPaths {
            watch_folder: dir.path().join("nope"),
            data_json: dir.path().join("data.json"),
            images_dir: dir.path().join("images"),
            processed_dir: dir.path().join("processed"),
            failed_dir: dir.path().join("failed"),
        };
        assert!(Watcher::new(paths, &analyzer, Duration::ZERO, Duration::ZERO).is_err());
        assert!(WatchPaths::from_config(&WatchConfig::default()).is_err());
    }

    #[test]
    fn test_request_stop_ends_run() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        let analyzer = analyzer();
        let mut w = watcher(paths, &analyzer);

        reset_stop_flag();
        assert!(!STOP_REQUESTED.load(Ordering::SeqCst));
        request_stop();
        w.run(&STOP_REQUESTED);
        assert!(STOP_REQUESTED.load(Ordering::SeqCst));
        reset_stop_flag();
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let dir = tempdir().unwrap();
        let paths = watch_paths(dir.path());
        let analyzer = analyzer();
        let mut w = watcher(paths, &analyzer);
        let stop = AtomicBool::new(true);
        w.run(&stop);
        assert!(w.registry().is_empty());
    }
}
