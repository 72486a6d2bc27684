//! Persistence for records, copied images and the OCR debug dump.
//!
//! Every JSON file is written to a temporary file in the target directory
//! and renamed into place, so an interrupted run leaves either the old file
//! or the new one.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::ProductRecord;
use crate::pipeline::ScreenshotResult;
use crate::text::truncate_chars;

/// Writes `value` as pretty JSON via a temp file and an atomic rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())
        .context("Failed to write JSON data")?;
    tmp.as_file().sync_all().context("Failed to flush JSON data")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Reads a persisted record list. A missing file is an empty catalog;
/// anything that is not a JSON array is an error.
///
/// Records are kept as raw JSON so fields added by hand survive a rewrite.
pub fn load_existing(path: &Path) -> Result<Vec<serde_json::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))
}

/// Appends records to the catalog at `path`, keeping existing entries as-is.
pub fn append_records(path: &Path, records: &[ProductRecord]) -> Result<()> {
    let mut all = load_existing(path)?;
    for record in records {
        all.push(serde_json::to_value(record).context("Failed to serialize record")?);
    }
    write_json_atomic(path, &all)
}

/// First free path `dir/<stem><ext>`, then `dir/<stem>_2<ext>`, `_3`, ...
pub fn unique_destination(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{}{}", stem, ext));
    if !first.exists() {
        return first;
    }
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Lowercased extension with the dot, or empty.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Copies `sources` into `images_dir` as `<id>_<k><ext>` (k from 1) and
/// returns the catalog paths (`images/<file>`).
pub fn copy_images(sources: &[PathBuf], id: &str, images_dir: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(images_dir)
        .with_context(|| format!("Failed to create directory: {}", images_dir.display()))?;

    let mut names = Vec::with_capacity(sources.len());
    for (k, src) in sources.iter().enumerate() {
        let dest = unique_destination(images_dir, &format!("{}_{}", id, k + 1), &dotted_extension(src));
        fs::copy(src, &dest).with_context(|| {
            format!("Failed to copy {} to {}", src.display(), dest.display())
        })?;
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        names.push(format!("images/{}", file_name));
    }
    Ok(names)
}

/// Deletes images written by [`copy_images`], given their catalog paths.
/// Failures are logged; a leftover copy only wastes space.
pub fn remove_images(images: &[String], images_dir: &Path) {
    for image in images {
        let Some(name) = Path::new(image).file_name() else { continue };
        let path = images_dir.join(name);
        if let Err(e) = fs::remove_file(&path) {
            crate::log(&format!("Failed to remove {}: {}", path.display(), e));
        }
    }
}

#[derive(Serialize)]
struct DebugEntry<'a> {
    file: String,
    top_text: &'a str,
    product_name_zone: &'a str,
    full_text: &'a str,
    brand_extracted: &'a str,
    has_brand_label: bool,
    raw_brand_text: &'a str,
    raw_product_text: &'a str,
    raw_price_text: &'a str,
}

/// Writes what OCR saw for each screenshot, for diagnosing missed fields.
pub fn write_debug_dump(path: &Path, results: &[ScreenshotResult]) -> Result<()> {
    let entries: Vec<DebugEntry<'_>> = results
        .iter()
        .map(|r| DebugEntry {
            file: r
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            top_text: &r.top_text,
            product_name_zone: &r.product_name_zone,
            full_text: truncate_chars(&r.full_text, 500),
            brand_extracted: &r.brand,
            has_brand_label: r.has_brand_label,
            raw_brand_text: &r.raw_brand_text,
            raw_product_text: truncate_chars(&r.raw_product_text, 500),
            raw_price_text: &r.raw_price_text,
        })
        .collect();
    write_json_atomic(path, &entries)
}
