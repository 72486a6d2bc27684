//! Zone selection: rectangular regions of a screenshot expected to hold one field.
//!
//! Zones come in two flavours. Fractional zones scale with the screenshot and
//! are validated at construction. Pixel zones are tuned for one device
//! resolution and are only clamped when evaluated against a real image.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Pixel rectangle inside an image. `width`/`height` may be zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// A region expressed as fractions of the image size.
///
/// Invariant: `0 <= x_min < x_max <= 1` and `0 <= y_min < y_max <= 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FractionalZone {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl FractionalZone {
    /// The whole image.
    pub const FULL: FractionalZone = FractionalZone {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
    };

    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Result<Self> {
        let zone = Self { x_min, x_max, y_min, y_max };
        zone.validate()?;
        Ok(zone)
    }

    pub fn validate(&self) -> Result<()> {
        let axis_ok = |min: f32, max: f32| (0.0..=1.0).contains(&min) && min < max && max <= 1.0;
        if !axis_ok(self.x_min, self.x_max) {
            return Err(anyhow!(
                "Invalid horizontal range x_min={} x_max={}",
                self.x_min,
                self.x_max
            ));
        }
        if !axis_ok(self.y_min, self.y_max) {
            return Err(anyhow!(
                "Invalid vertical range y_min={} y_max={}",
                self.y_min,
                self.y_max
            ));
        }
        Ok(())
    }

    /// True if the pixel point lies inside the zone (edges included).
    pub fn contains(&self, width: u32, height: u32, x: f32, y: f32) -> bool {
        let (w, h) = (width as f32, height as f32);
        self.x_min * w <= x && x <= self.x_max * w && self.y_min * h <= y && y <= self.y_max * h
    }
}

/// A region in absolute pixels, for layouts tuned to one device resolution.
///
/// Never validated at construction: out-of-range values degrade to a smaller
/// or empty region when evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelZone {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Default fractional regions for the marketplace app's listing screen
/// (captured on a 1179x2556 phone).
pub mod defaults {
    use super::FractionalZone;

    pub const BRAND_REGION: FractionalZone = FractionalZone {
        x_min: 0.05,
        x_max: 0.95,
        y_min: 0.60,
        y_max: 0.68,
    };

    pub const PRODUCT_REGION: FractionalZone = FractionalZone {
        x_min: 0.05,
        x_max: 0.95,
        y_min: 0.40,
        y_max: 0.48,
    };

    pub const PRICE_REGION: FractionalZone = FractionalZone {
        x_min: 0.05,
        x_max: 0.95,
        y_min: 0.52,
        y_max: 0.60,
    };

    /// Band right under the listing photo and the like/comment icons,
    /// where the title is rendered in the full-page layout.
    pub const PRODUCT_NAME_ZONE: FractionalZone = FractionalZone {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.35,
        y_max: 0.55,
    };
}

/// Converts a fractional zone to pixels, truncating toward zero.
pub fn crop_fraction(image_size: (u32, u32), zone: &FractionalZone) -> Rect {
    let (w, h) = image_size;
    let x0 = ((zone.x_min * w as f32) as u32).min(w);
    let x1 = ((zone.x_max * w as f32) as u32).min(w);
    let y0 = ((zone.y_min * h as f32) as u32).min(h);
    let y1 = ((zone.y_max * h as f32) as u32).min(h);

    Rect {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    }
}

/// Evaluates a pixel zone against an image, clamping the origin into
/// `[0, W-1] x [0, H-1]` and the far edges to the image bounds.
pub fn crop_fixed(image_size: (u32, u32), zone: &PixelZone) -> Rect {
    let (w, h) = image_size;
    if w == 0 || h == 0 {
        return Rect::default();
    }

    let x = zone.x.clamp(0, w as i64 - 1) as u32;
    let y = zone.y.clamp(0, h as i64 - 1) as u32;
    let right = (x as u64 + zone.width as u64).min(w as u64) as u32;
    let bottom = (y as u64 + zone.height as u64).min(h as u64) as u32;

    Rect {
        x,
        y,
        width: right - x,
        height: bottom - y,
    }
}

/// Where a field is cropped from: relative to the image, or in device pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Region {
    Fraction(FractionalZone),
    Pixels(PixelZone),
}

impl Region {
    /// Pixel zones win over the fractional fallback when configured.
    pub fn pick(pixels: Option<PixelZone>, fraction: FractionalZone) -> Self {
        pixels.map_or(Region::Fraction(fraction), Region::Pixels)
    }

    pub fn rect(&self, image_size: (u32, u32)) -> Rect {
        match self {
            Region::Fraction(zone) => crop_fraction(image_size, zone),
            Region::Pixels(zone) => crop_fixed(image_size, zone),
        }
    }
}
