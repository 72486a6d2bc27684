//! Image preparation for region OCR.
//!
//! Pipeline: grayscale → 2x upscale → contrast → adaptive threshold → sharpen.
//! Each step is usable on its own.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

use crate::zone::Rect;

/// Which pipeline steps to run.
#[derive(Clone, Copy, Debug)]
pub struct PreprocessOptions {
    pub resize_2x: bool,
    /// 1.0 leaves contrast untouched
    pub contrast_factor: f32,
    pub adaptive_threshold: bool,
    pub sharpen: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            resize_2x: true,
            contrast_factor: 1.5,
            adaptive_threshold: true,
            sharpen: true,
        }
    }
}

/// Crops a pixel rectangle; the rect must already lie inside the image.
pub fn crop_rect(img: &DynamicImage, rect: Rect) -> DynamicImage {
    img.crop_imm(rect.x, rect.y, rect.width, rect.height)
}

/// Upscales by 2x with Lanczos filtering (helps small text).
pub fn resize_2x(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    imageops::resize(img, w * 2, h * 2, FilterType::Lanczos3)
}

/// Scales every pixel's distance from the mean brightness by `factor`.
pub fn increase_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let pixel_count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.pixels().map(|p| p[0] as u64).sum();
    let mean = sum as f32 / pixel_count as f32;

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let value = mean + factor * (pixel[0] as f32 - mean);
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    output
}

/// Binarizes against the local mean of a `block_size` window minus `c`,
/// which copes with uneven lighting. Even block sizes are bumped to odd.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let block_size = if block_size % 2 == 0 { block_size + 1 } else { block_size };
    let radius = (block_size / 2) as i64;

    // Summed-area table with a zero border row/column.
    let stride = w as usize + 1;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += img.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let mut output = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - radius).max(0) as usize;
            let y0 = (y - radius).max(0) as usize;
            let x1 = ((x + radius + 1) as usize).min(w as usize);
            let y1 = ((y + radius + 1) as usize).min(h as usize);
            let area = ((x1 - x0) * (y1 - y0)) as i64;
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let threshold = sum as i64 / area - c as i64;
            let value = img.get_pixel(x as u32, y as u32)[0] as i64;
            let out = if value > threshold { 255u8 } else { 0u8 };
            output.put_pixel(x as u32, y as u32, Luma([out]));
        }
    }
    output
}

/// 3x3 sharpen (helps thin strokes).
pub fn sharpen(img: &GrayImage) -> GrayImage {
    let kernel = [-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0];
    imageops::filter3x3(img, &kernel)
}

/// Runs the full pipeline and returns an image ready for the OCR backend.
pub fn preprocess_for_ocr(img: &DynamicImage, options: &PreprocessOptions) -> DynamicImage {
    let mut gray = img.to_luma8();
    if options.resize_2x {
        gray = resize_2x(&gray);
    }
    if options.contrast_factor != 1.0 {
        gray = increase_contrast(&gray, options.contrast_factor);
    }
    if options.adaptive_threshold {
        gray = adaptive_threshold(&gray, 15, 8);
    }
    if options.sharpen {
        gray = sharpen(&gray);
    }
    DynamicImage::ImageLuma8(gray)
}
