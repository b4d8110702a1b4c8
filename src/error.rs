// Error types module
// One enum per failure kind the tool can report

use thiserror::Error;

/// A form edit rejected by the field's widget constraints
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    /// Field name not known to the form
    #[error("Unknown form field: {0}")]
    UnknownField(String),

    /// Field exists but cannot be edited
    #[error("Form field is not editable: {0}")]
    ReadOnly(&'static str),

    /// Value has the wrong JSON type for the field
    #[error("Invalid value for {field}: expected {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    /// Numeric value outside the widget's range
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f32,
        max: f32,
        value: f32,
    },

    /// Value not one of the field's options
    #[error("{field} must be one of {options}, got {value:?}")]
    NotAnOption {
        field: &'static str,
        options: &'static str,
        value: String,
    },

    /// Color picker value that does not parse
    #[error(transparent)]
    Color(#[from] ColorError),
}

/// CSS color string that could not be parsed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid color: {0:?}")]
pub struct ColorError(pub String);

/// Image decode failure
#[derive(Error, Debug)]
pub enum LoadError {
    /// Failed to read the file or stdin
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    /// Input was empty
    #[error("No image data received")]
    Empty,

    /// Bytes are not a recognised image
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Malformed data URI
    #[error("Invalid data URI: {0}")]
    DataUri(String),

    /// Background decode task did not complete
    #[error("Image decode task failed: {0}")]
    Task(String),
}

/// Export pipeline failure
#[derive(Error, Debug)]
pub enum ExportError {
    /// Download requested while no image is loaded
    #[error("No image loaded")]
    NoImage,

    /// No element with the requested id
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Capture step failed
    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    /// PNG encoding failed
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    /// Download sink could not deliver the file
    #[error("Failed to save download: {0}")]
    Download(#[from] std::io::Error),

    /// Background capture task did not complete
    #[error("Export task failed: {0}")]
    Task(String),
}
