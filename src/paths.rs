use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static PROJECT_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Sets the project root. Only the first call has any effect.
pub fn init_project_root(root: &Path) {
    let _ = PROJECT_ROOT.set(root.to_path_buf());
}

/// Returns the project root: the value passed to [`init_project_root`],
/// or the current working directory.
pub fn get_project_root() -> &'static PathBuf {
    PROJECT_ROOT.get_or_init(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Returns the screenshot inbox: `<root>/screenshots_input/`
pub fn get_input_dir() -> PathBuf {
    get_project_root().join("screenshots_input")
}

/// Returns the catalog image directory: `<root>/images/`
pub fn get_images_dir() -> PathBuf {
    get_project_root().join("images")
}

/// Returns the accumulated catalog: `<root>/data/data.json`
pub fn get_data_json() -> PathBuf {
    get_project_root().join("data").join("data.json")
}

/// Returns the batch output: `<root>/suggested_products.json`
pub fn get_suggested_json() -> PathBuf {
    get_project_root().join("suggested_products.json")
}

/// Returns the per-screenshot OCR dump: `<root>/ocr_debug.json`
pub fn get_debug_json() -> PathBuf {
    get_project_root().join("ocr_debug.json")
}

/// Returns the extraction config: `<root>/screenshot_config.json`
pub fn get_screenshot_config() -> PathBuf {
    get_project_root().join("screenshot_config.json")
}

/// Returns the watcher config: `<root>/watch_config.json`
pub fn get_watch_config() -> PathBuf {
    get_project_root().join("watch_config.json")
}

/// Returns the logs directory: `<root>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_project_root().join("logs")
}

/// Resolves a configured path against the project root unless it is absolute.
pub fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_project_root().join(path)
    }
}

/// Ensures all batch directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_input_dir())?;
    std::fs::create_dir_all(get_images_dir())?;
    Ok(())
}
