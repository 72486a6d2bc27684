//! Anchor-based strategies: find the detection carrying a field label and
//! read the value from the same fragment, the same visual line, or below.

use super::{before_double_space, find_label, full_text, is_stop_value, FieldStrategy};
use crate::ocr::{Detection, Page};
use crate::text::{between_dots, cut_at_each};
use crate::validate::{is_valid_brand, MAX_BRAND_CHARS};

/// Neighbour fragments longer than this are description text, not values.
const MAX_NEIGHBOUR_CHARS: usize = 50;

/// Field labels that end a same-block value.
const SAME_BLOCK_STOPS: [&str; 4] = ["商品の状態", "配送料の負担", "配送の方法", "カテゴリ"];

/// The first detection carrying the label as a field label.
#[derive(Clone, Copy, Debug)]
struct Anchor<'a> {
    index: usize,
    detection: &'a Detection,
    center: (f32, f32),
}

fn find_anchor<'a>(detections: &'a [Detection], label: &str) -> Option<Anchor<'a>> {
    detections
        .iter()
        .enumerate()
        .find(|(_, d)| {
            let t = d.text.trim();
            !t.is_empty() && find_label(t, label).is_some()
        })
        .map(|(index, detection)| Anchor {
            index,
            detection,
            center: detection.quad.center(),
        })
}

/// Splits on the separator, caps the length and validates.
fn accept_brand(candidate: &str) -> Option<String> {
    let value = between_dots(candidate, MAX_BRAND_CHARS);
    if !value.is_empty() && is_valid_brand(&value) {
        Some(value)
    } else {
        None
    }
}

/// Joins ordered neighbour texts up to the first stop label.
fn join_until_stop<'a>(ordered: impl Iterator<Item = &'a str>) -> String {
    let mut parts = Vec::new();
    for text in ordered {
        if is_stop_value(text) {
            break;
        }
        parts.push(text);
    }
    parts.join(" ").trim().to_string()
}

/// Where a neighbour sits relative to the anchor.
enum Placement {
    SameLine,
    Below,
    Elsewhere,
}

fn placement(page: &Page<'_>, anchor: &Anchor<'_>, center: (f32, f32), tolerance: f32) -> Placement {
    let (ax, ay) = anchor.center;
    let (cx, cy) = center;
    let y_tolerance = page.height as f32 * tolerance;
    if (cy - ay).abs() <= y_tolerance && cx > ax {
        Placement::SameLine
    } else if cy > ay && (cx - ax).abs() <= page.width as f32 * 0.5 {
        Placement::Below
    } else {
        Placement::Elsewhere
    }
}

/// Neighbour detections in the requested placement, with their sort key.
fn neighbours<'a>(
    page: &Page<'a>,
    anchor: &Anchor<'_>,
    tolerance: f32,
    same_line: bool,
) -> Vec<(f32, &'a str)> {
    let mut found = Vec::new();
    for (i, d) in page.detections.iter().enumerate() {
        if i == anchor.index {
            continue;
        }
        let t = d.text.trim();
        if t.is_empty() || t.chars().count() > MAX_NEIGHBOUR_CHARS {
            continue;
        }
        let center = d.quad.center();
        match (placement(page, anchor, center, tolerance), same_line) {
            (Placement::SameLine, true) => found.push((center.0 - anchor.center.0, t)),
            (Placement::Below, false) => found.push((center.1 - anchor.center.1, t)),
            _ => {}
        }
    }
    found.sort_by(|a, b| a.0.total_cmp(&b.0));
    found
}

/// The whole brand zone as one `condition・BRAND・detail` line.
pub struct SeparatorLine;

impl FieldStrategy for SeparatorLine {
    fn name(&self) -> &'static str {
        "separator-line"
    }

    fn extract(&self, page: &Page<'_>) -> Option<String> {
        accept_brand(&full_text(page.detections))
    }
}

/// Text following the label inside the anchor's own fragment,
/// e.g. `項目 ブランド JACOB COHEN`.
pub struct AnchorSameBlock {
    label: &'static str,
}

impl AnchorSameBlock {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl FieldStrategy for AnchorSameBlock {
    fn name(&self) -> &'static str {
        "anchor-same-block"
    }

    fn extract(&self, page: &Page<'_>) -> Option<String> {
        let anchor = find_anchor(page.detections, self.label)?;
        let text = anchor.detection.text.trim();
        let pos = find_label(text, self.label)?;
        let rest = text[pos + self.label.len()..].trim_start();
        let rest = rest
            .strip_prefix(['：', ':'])
            .unwrap_or(rest)
            .trim();

        let rest = cut_at_each(rest, &SAME_BLOCK_STOPS);
        let rest = before_double_space(rest).trim();
        accept_brand(rest)
    }
}

/// Fragments to the right of the anchor on the same visual line,
/// joined left to right.
pub struct AnchorSameLine {
    label: &'static str,
    tolerance: f32,
}

impl AnchorSameLine {
    /// `tolerance` is the half-height of the line band as a fraction of image height.
    pub fn new(label: &'static str, tolerance: f32) -> Self {
        Self { label, tolerance }
    }
}

impl FieldStrategy for AnchorSameLine {
    fn name(&self) -> &'static str {
        "anchor-same-line"
    }

    fn extract(&self, page: &Page<'_>) -> Option<String> {
        let anchor = find_anchor(page.detections, self.label)?;
        let ordered = neighbours(page, &anchor, self.tolerance, true);
        accept_brand(&join_until_stop(ordered.into_iter().map(|(_, t)| t)))
    }
}

/// Fragments below the anchor within half a screen width, joined top to bottom.
pub struct AnchorBelow {
    label: &'static str,
    tolerance: f32,
}

impl AnchorBelow {
    pub fn new(label: &'static str, tolerance: f32) -> Self {
        Self { label, tolerance }
    }
}

impl FieldStrategy for AnchorBelow {
    fn name(&self) -> &'static str {
        "anchor-below"
    }

    fn extract(&self, page: &Page<'_>) -> Option<String> {
        let anchor = find_anchor(page.detections, self.label)?;
        let ordered = neighbours(page, &anchor, self.tolerance, false);
        accept_brand(&join_until_stop(ordered.into_iter().map(|(_, t)| t)))
    }
}
