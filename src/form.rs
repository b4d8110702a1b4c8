// Form surface module
// Holds the flat field values and enforces each widget's constraints

use crate::color::Rgba;
use crate::error::FormError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FONT_SIZE_MIN: f32 = 12.0;
pub const FONT_SIZE_MAX: f32 = 100.0;
pub const ROTATE_MIN: f32 = -180.0;
pub const ROTATE_MAX: f32 = 180.0;

/// Font weight options offered by the form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Lighter,
    Normal,
    Bold,
}

impl FontWeight {
    const OPTIONS: &'static str = "lighter, normal, bold";

    pub fn as_str(self) -> &'static str {
        match self {
            FontWeight::Lighter => "lighter",
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }

    fn from_option(s: &str) -> Option<Self> {
        match s {
            "lighter" => Some(FontWeight::Lighter),
            "normal" => Some(FontWeight::Normal),
            "bold" => Some(FontWeight::Bold),
            _ => None,
        }
    }
}

/// Font family options offered by the form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    SansSerif,
    Serif,
}

impl FontFamily {
    const OPTIONS: &'static str = "sans-serif, serif";

    pub fn as_str(self) -> &'static str {
        match self {
            FontFamily::SansSerif => "sans-serif",
            FontFamily::Serif => "serif",
        }
    }

    fn from_option(s: &str) -> Option<Self> {
        match s {
            "sans-serif" => Some(FontFamily::SansSerif),
            "serif" => Some(FontFamily::Serif),
            _ => None,
        }
    }
}

/// Complete set of form field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValues {
    pub content: String,
    pub gaps_x: f32,
    pub gaps_y: f32,
    pub offset_x: Option<f32>,
    pub offset_y: Option<f32>,
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: FontFamily,
    pub color: String,
    pub rotate: f32,
    pub z_index: i32,
}

impl Default for FormValues {
    fn default() -> Self {
        Self {
            content: "Arco Design".to_string(),
            gaps_x: 100.0,
            gaps_y: 100.0,
            offset_x: None,
            offset_y: None,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: FontFamily::SansSerif,
            color: "rgba(0,0,0,0.12)".to_string(),
            rotate: 30.0,
            z_index: 1,
        }
    }
}

/// The form surface: every field is bound to a default, edits are
/// validated the way the corresponding widget would constrain them
#[derive(Debug, Clone, Default)]
pub struct Form {
    values: FormValues,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of every field
    pub fn values(&self) -> &FormValues {
        &self.values
    }

    /// Apply a single field edit
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), FormError> {
        let v = &mut self.values;
        match name {
            "content" => v.content = string_field("content", &value)?.to_string(),
            "fontWeight" => {
                let s = string_field("fontWeight", &value)?;
                v.font_weight = FontWeight::from_option(s).ok_or_else(|| FormError::NotAnOption {
                    field: "fontWeight",
                    options: FontWeight::OPTIONS,
                    value: s.to_string(),
                })?;
            }
            "fontFamily" => {
                let s = string_field("fontFamily", &value)?;
                v.font_family = FontFamily::from_option(s).ok_or_else(|| FormError::NotAnOption {
                    field: "fontFamily",
                    options: FontFamily::OPTIONS,
                    value: s.to_string(),
                })?;
            }
            "color" => {
                let s = string_field("color", &value)?;
                s.parse::<Rgba>()?;
                v.color = s.to_string();
            }
            "fontSize" => {
                v.font_size = ranged_field("fontSize", &value, FONT_SIZE_MIN, FONT_SIZE_MAX)?
            }
            "rotate" => v.rotate = ranged_field("rotate", &value, ROTATE_MIN, ROTATE_MAX)?,
            "gapsX" => v.gaps_x = ranged_field("gapsX", &value, 0.0, f32::MAX)?,
            "gapsY" => v.gaps_y = ranged_field("gapsY", &value, 0.0, f32::MAX)?,
            "offsetX" => v.offset_x = optional_field("offsetX", &value)?,
            "offsetY" => v.offset_y = optional_field("offsetY", &value)?,
            "zIndex" => return Err(FormError::ReadOnly("zIndex")),
            other => return Err(FormError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    /// Apply a JSON object of edits in order, stopping at the first rejected one
    pub fn set_fields(&mut self, fields: Map<String, Value>) -> Result<(), FormError> {
        for (name, value) in fields {
            self.set_field(&name, value)?;
        }
        Ok(())
    }
}

fn string_field<'a>(field: &'static str, value: &'a Value) -> Result<&'a str, FormError> {
    value.as_str().ok_or(FormError::InvalidType {
        field,
        expected: "a string",
    })
}

fn number_field(field: &'static str, value: &Value) -> Result<f32, FormError> {
    value
        .as_f64()
        .map(|n| n as f32)
        .filter(|n| n.is_finite())
        .ok_or(FormError::InvalidType {
            field,
            expected: "a number",
        })
}

fn ranged_field(field: &'static str, value: &Value, min: f32, max: f32) -> Result<f32, FormError> {
    let n = number_field(field, value)?;
    if !(min..=max).contains(&n) {
        return Err(FormError::OutOfRange {
            field,
            min,
            max,
            value: n,
        });
    }
    Ok(n)
}

fn optional_field(field: &'static str, value: &Value) -> Result<Option<f32>, FormError> {
    if value.is_null() {
        return Ok(None);
    }
    number_field(field, value).map(Some)
}
