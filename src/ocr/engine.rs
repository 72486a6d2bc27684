use anyhow::{anyhow, Result};
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{Detection, OcrProvider, Quad};
use crate::config::TesseractSettings;

/// OCR backend that shells out to the Tesseract executable.
#[derive(Clone, Debug)]
pub struct TesseractOcr {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    lang: String,
    psm: u32,
}

impl TesseractOcr {
    /// Locates Tesseract and its traineddata for the configured languages.
    pub fn discover(settings: &TesseractSettings) -> Result<Self> {
        let executable = find_tesseract_executable(settings.cmd.as_deref())?;
        // A missing local tessdata dir is fine: Tesseract then uses its built-in path.
        let tessdata = find_tessdata_dir(&settings.lang).ok();
        Ok(Self {
            executable,
            tessdata,
            lang: settings.lang.clone(),
            psm: settings.psm,
        })
    }
}

impl OcrProvider for TesseractOcr {
    fn recognize(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Create temporary output file (Tesseract adds .tsv extension)
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

/// Words of one Tesseract line being accumulated.
struct LineAccumulator {
    key: (i32, i32, i32),
    words: Vec<String>,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    conf_sum: f32,
}

impl LineAccumulator {
    fn new(key: (i32, i32, i32), left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            key,
            words: Vec::new(),
            left,
            top,
            right,
            bottom,
            conf_sum: 0.0,
        }
    }

    fn push(&mut self, text: &str, conf: f32, left: f32, top: f32, right: f32, bottom: f32) {
        self.words.push(text.to_string());
        self.conf_sum += conf;
        self.left = self.left.min(left);
        self.top = self.top.min(top);
        self.right = self.right.max(right);
        self.bottom = self.bottom.max(bottom);
    }

    fn finish(self) -> Option<Detection> {
        if self.words.is_empty() {
            return None;
        }
        let confidence = self.conf_sum / self.words.len() as f32 / 100.0;
        Some(Detection::new(
            Quad::from_rect(self.left, self.top, self.right - self.left, self.bottom - self.top),
            self.words.join(" "),
            confidence,
        ))
    }
}

/// Parses Tesseract TSV output into one detection per text line.
///
/// Word rows (level 5) sharing block, paragraph and line numbers are merged;
/// the quad is the union of their boxes and the confidence their mean.
fn parse_tsv_output(tsv: &str) -> Vec<Detection> {
    let mut detections = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for line in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        let left: f32 = fields[6].parse().unwrap_or(0.0);
        let top: f32 = fields[7].parse().unwrap_or(0.0);
        let right = left + fields[8].parse::<f32>().unwrap_or(0.0);
        let bottom = top + fields[9].parse::<f32>().unwrap_or(0.0);

        let same_line = current.as_ref().is_some_and(|acc| acc.key == key);
        if !same_line {
            if let Some(done) = current.take().and_then(LineAccumulator::finish) {
                detections.push(done);
            }
            current = Some(LineAccumulator::new(key, left, top, right, bottom));
        }
        if let Some(acc) = current.as_mut() {
            acc.push(text, conf, left, top, right, bottom);
        }
    }

    if let Some(done) = current.and_then(LineAccumulator::finish) {
        detections.push(done);
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_parse_groups_words_into_lines() {
        let content = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1179\t2556\t-1\t",
            "4\t1\t1\t1\t1\t0\t100\t200\t300\t40\t-1\t",
            "5\t1\t1\t1\t1\t1\t100\t200\t120\t40\t90\tブランド",
            "5\t1\t1\t1\t1\t2\t300\t205\t100\t30\t80\tJACOB",
            "5\t1\t1\t1\t2\t1\t100\t300\t200\t50\t70\tCOHEN",
        ]);

        let detections = parse_tsv_output(&content);
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].text, "ブランド JACOB");
        assert_eq!(detections[0].quad, Quad::from_rect(100.0, 200.0, 300.0, 40.0));
        assert!((detections[0].confidence - 0.85).abs() < 1e-6);

        assert_eq!(detections[1].text, "COHEN");
        assert!((detections[1].confidence - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_parse_skips_empty_and_negative_conf() {
        let content = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t-1\tghost",
            "5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t95\t  ",
            "malformed row",
        ]);
        assert!(parse_tsv_output(&content).is_empty());
    }

    #[test]
    fn test_parse_header_only() {
        assert!(parse_tsv_output(HEADER).is_empty());
    }
}
