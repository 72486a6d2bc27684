pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractOcr;
pub use preprocess::{crop_rect, preprocess_for_ocr, PreprocessOptions};
pub use setup::ensure_tessdata;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Bounding quadrilateral of an OCR hit, four `(x, y)` corners in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [(f32, f32); 4]);

impl Quad {
    /// Axis-aligned quad, corners clockwise from top-left.
    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> Self {
        Quad([
            (left, top),
            (left + width, top),
            (left + width, top + height),
            (left, top + height),
        ])
    }

    /// Mean of the four corners.
    pub fn center(&self) -> (f32, f32) {
        let (sx, sy) = self
            .0
            .iter()
            .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / 4.0, sy / 4.0)
    }

    pub fn top(&self) -> f32 {
        self.0.iter().map(|p| p.1).fold(f32::INFINITY, f32::min)
    }

    /// Vertical extent, used as a font-size proxy.
    pub fn height(&self) -> f32 {
        let bottom = self.0.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        bottom - self.top()
    }
}

/// One recognized text fragment. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub quad: Quad,
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

impl Detection {
    pub fn new(quad: Quad, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            quad,
            text: text.into(),
            confidence,
        }
    }
}

/// Everything the extraction engine needs from one screenshot.
#[derive(Clone, Copy, Debug)]
pub struct Page<'a> {
    pub width: u32,
    pub height: u32,
    pub detections: &'a [Detection],
}

/// An OCR backend. Recognition is blocking and may be slow; callers impose
/// no timeout of their own.
pub trait OcrProvider: Send + Sync {
    /// Returns the text fragments found in `img`, in the backend's output order.
    fn recognize(&self, img: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Joins the text of all detections, one per line, for region OCR where
/// the whole crop is one field.
pub fn detections_to_text(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_geometry() {
        let quad = Quad::from_rect(10.0, 20.0, 30.0, 40.0);
        assert_eq!(quad.center(), (25.0, 40.0));
        assert_eq!(quad.top(), 20.0);
        assert_eq!(quad.height(), 40.0);
    }

    #[test]
    fn test_skewed_quad_height() {
        let quad = Quad([(0.0, 12.0), (100.0, 10.0), (100.0, 30.0), (0.0, 32.0)]);
        assert_eq!(quad.top(), 10.0);
        assert_eq!(quad.height(), 22.0);
    }

    #[test]
    fn test_detections_to_text_skips_blank() {
        let quad = Quad::from_rect(0.0, 0.0, 1.0, 1.0);
        let detections = vec![
            Detection::new(quad, " L・JACOB COHEN ", 0.9),
            Detection::new(quad, "   ", 0.9),
            Detection::new(quad, "目立った傷や汚れなし", 0.8),
        ];
        assert_eq!(
            detections_to_text(&detections),
            "L・JACOB COHEN\n目立った傷や汚れなし"
        );
    }
}
