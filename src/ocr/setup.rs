use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::log;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

const EXE_NAME: &str = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };

/// Install locations checked when Tesseract is not on PATH.
const COMMON_INSTALL_DIRS: [&str; 5] = [
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/usr/bin",
];

/// System tessdata locations.
const SYSTEM_TESSDATA_DIRS: [&str; 5] = [
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Returns the per-user directory for Tesseract files.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screenshot-catalog")
        .join("tesseract")
}

/// Splits a `-l` language list such as `jpn+eng`.
fn languages(lang: &str) -> impl Iterator<Item = &str> {
    lang.split('+').map(str::trim).filter(|l| !l.is_empty())
}

fn has_all_traineddata(dir: &Path, lang: &str) -> bool {
    languages(lang).all(|l| dir.join(format!("{}.traineddata", l)).exists())
}

/// Finds the Tesseract executable: explicit command, our local dir,
/// PATH, then common install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(cmd) = explicit {
        if cmd.exists() {
            return Ok(cmd.to_path_buf());
        }
        log(&format!(
            "Configured tesseract_cmd not found: {}. Searching instead.",
            cmd.display()
        ));
    }

    let local_exe = get_tesseract_dir().join(EXE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in &COMMON_INSTALL_DIRS {
        let p = Path::new(dir).join(EXE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding every language in `lang`.
pub fn find_tessdata_dir(lang: &str) -> Result<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    if has_all_traineddata(&local_tessdata, lang) {
        return Ok(local_tessdata);
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_all_traineddata(&p, lang) {
            return Ok(p);
        }
        let p = p.join("tessdata");
        if has_all_traineddata(&p, lang) {
            return Ok(p);
        }
    }

    for dir in &SYSTEM_TESSDATA_DIRS {
        let p = PathBuf::from(dir);
        if has_all_traineddata(&p, lang) {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "tessdata directory not found. Please ensure traineddata for '{}' is available.",
        lang
    ))
}

/// Makes sure traineddata for every language in `lang` is available,
/// downloading missing files into the local tessdata directory.
pub fn ensure_tessdata(lang: &str) -> Result<PathBuf> {
    if let Ok(dir) = find_tessdata_dir(lang) {
        log(&format!("tessdata found at: {}", dir.display()));
        return Ok(dir);
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata_dir)?;

    for language in languages(lang) {
        let target = tessdata_dir.join(format!("{}.traineddata", language));
        if !target.exists() {
            download_traineddata(language, &target)?;
        }
    }

    log(&format!("tessdata ready at: {}", tessdata_dir.display()));
    Ok(tessdata_dir)
}

/// Downloads one traineddata file from the upstream tessdata repository.
fn download_traineddata(language: &str, target: &Path) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    log(&format!("Downloading {}.traineddata...", language));

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "screenshot-catalog")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    file.write_all(&bytes)?;

    log(&format!(
        "Downloaded {}.traineddata ({} bytes)",
        language,
        bytes.len()
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_languages_split() {
        let langs: Vec<&str> = languages("jpn+eng").collect();
        assert_eq!(langs, vec!["jpn", "eng"]);
        let single: Vec<&str> = languages(" eng ").collect();
        assert_eq!(single, vec!["eng"]);
    }

    #[test]
    fn test_has_all_traineddata() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();
        assert!(has_all_traineddata(dir.path(), "eng"));
        assert!(!has_all_traineddata(dir.path(), "jpn+eng"));
        fs::write(dir.path().join("jpn.traineddata"), b"x").unwrap();
        assert!(has_all_traineddata(dir.path(), "jpn+eng"));
    }

    #[test]
    fn test_explicit_executable_wins() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("my-tesseract");
        fs::write(&exe, b"").unwrap();
        assert_eq!(find_tesseract_executable(Some(&exe)).unwrap(), exe);
    }
}
