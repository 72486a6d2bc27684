//! Screenshot Catalog
//!
//! Turns batches of marketplace-listing screenshots into product records.
//! Each screenshot is OCR'd, brand and product name are pulled out of known
//! screen regions, and screenshots of the same listing are grouped into one
//! record.

pub mod config;
pub mod extract;
pub mod grouping;
pub mod ocr;
pub mod paths;
pub mod pipeline;
pub mod record;
pub mod text;
pub mod validate;
pub mod watch;
pub mod zone;

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

/// Logs a message to both console and log file with timestamp.
///
/// The log file is only written when the logs directory already exists,
/// so library users that never call [`paths::ensure_directories`] get
/// console output only.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let logs_dir = paths::get_logs_dir();
    if !logs_dir.is_dir() {
        return;
    }
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("screenshot_catalog.log"))
    {
        let _ = file.write_all(line.as_bytes());
    }
}
