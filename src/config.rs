// Config reducer module
// Restructures the flat form values into the shape the watermark renderer reads

use crate::form::{FontFamily, FontWeight, FormValues};
use serde::Serialize;

/// Snapshot of the form taken on every change. Replaced whole, never patched.
pub type WatermarkConfig = FormValues;

/// Font styling grouped the way the renderer takes it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FontStyle {
    pub color: String,
    /// CSS length, e.g. `"16px"`
    pub font_size: String,
    pub font_family: FontFamily,
    pub font_weight: FontWeight,
}

impl FontStyle {
    /// Numeric part of `font_size`
    pub fn font_size_px(&self) -> f32 {
        self.font_size
            .strip_suffix("px")
            .and_then(|n| n.parse().ok())
            .unwrap_or(16.0)
    }
}

/// Watermark renderer parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkProps {
    pub content: String,
    /// Degrees, clockwise
    pub rotate: f32,
    /// Horizontal and vertical spacing between marks
    pub gap: [f32; 2],
    /// Start of the tile grid; `None` means half the gap on that axis
    pub offset: [Option<f32>; 2],
    pub font_style: FontStyle,
    pub z_index: i32,
}

impl Default for WatermarkProps {
    fn default() -> Self {
        reduce(&WatermarkConfig::default())
    }
}

/// Derive renderer props from a config snapshot
pub fn reduce(config: &WatermarkConfig) -> WatermarkProps {
    WatermarkProps {
        content: config.content.clone(),
        rotate: config.rotate,
        gap: [config.gaps_x, config.gaps_y],
        offset: [config.offset_x, config.offset_y],
        font_style: FontStyle {
            color: config.color.clone(),
            font_size: format!("{}px", config.font_size),
            font_family: config.font_family,
            font_weight: config.font_weight,
        },
        z_index: config.z_index,
    }
}
