// Command line interface module
// Handles parsing of command line arguments and stdin input

use anyhow::{bail, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tilemark::form::{FONT_SIZE_MAX, FONT_SIZE_MIN, ROTATE_MAX, ROTATE_MIN};
use tilemark::image_loader::format_from_extension;
use tilemark::{ImageInput, EXPORT_SCALE};

/// tilemark - Overlay a tiled text watermark on a picture
#[derive(Parser, Debug)]
#[command(name = "tilemark")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the image file (can also be provided via stdin pipe)
    #[arg(value_name = "IMAGE")]
    pub image_path: Option<PathBuf>,

    /// JSON object of form fields applied before the flags below
    #[arg(long, value_name = "FILE")]
    pub form: Option<PathBuf>,

    /// Watermark text
    #[arg(long)]
    pub content: Option<String>,

    /// Font weight
    #[arg(long, value_parser = ["lighter", "normal", "bold"])]
    pub font_weight: Option<String>,

    /// Font family
    #[arg(long, value_parser = ["sans-serif", "serif"])]
    pub font_family: Option<String>,

    /// Text color with alpha, e.g. "rgba(0,0,0,0.12)" or "#00000020"
    #[arg(long, value_parser = parse_color)]
    pub color: Option<String>,

    /// Font size in pixels (12 - 100)
    #[arg(long, value_parser = parse_font_size)]
    pub font_size: Option<f32>,

    /// Rotation in degrees (-180 - 180)
    #[arg(long, value_parser = parse_rotate, allow_negative_numbers = true)]
    pub rotate: Option<f32>,

    /// Horizontal gap between marks
    #[arg(long, value_parser = parse_gap)]
    pub gap_x: Option<f32>,

    /// Vertical gap between marks
    #[arg(long, value_parser = parse_gap)]
    pub gap_y: Option<f32>,

    /// Horizontal start offset of the mark grid
    #[arg(long, value_parser = parse_offset, allow_negative_numbers = true)]
    pub offset_x: Option<f32>,

    /// Vertical start offset of the mark grid
    #[arg(long, value_parser = parse_offset, allow_negative_numbers = true)]
    pub offset_y: Option<f32>,

    /// Directory the exported picture is saved into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Export pixel density relative to the picture's natural size
    #[arg(short, long, default_value_t = EXPORT_SCALE, value_parser = parse_scale)]
    pub scale: f32,

    /// Write the export to stdout as a data:image/png URL instead of a file
    #[arg(long, default_value = "false")]
    pub data_url: bool,

    /// Print the derived watermark props as JSON and exit
    #[arg(long, default_value = "false")]
    pub print_config: bool,
}

/// Parsed arguments with resolved image source
#[derive(Debug)]
pub struct ParsedArgs {
    pub image: Option<ImageInput>,
    pub form_file: Option<PathBuf>,
    /// Field edits from flags, in form order
    pub edits: Vec<(&'static str, Value)>,
    pub output_dir: PathBuf,
    pub scale: f32,
    pub data_url: bool,
    pub print_config: bool,
}

fn parse_ranged(s: &str, min: f32, max: f32, what: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("Invalid {} value", what))?;
    if !(min..=max).contains(&value) {
        return Err(format!("{} must be between {} and {}", what, min, max));
    }
    Ok(value)
}

fn parse_font_size(s: &str) -> Result<f32, String> {
    parse_ranged(s, FONT_SIZE_MIN, FONT_SIZE_MAX, "Font size")
}

fn parse_rotate(s: &str) -> Result<f32, String> {
    parse_ranged(s, ROTATE_MIN, ROTATE_MAX, "Rotation")
}

fn parse_gap(s: &str) -> Result<f32, String> {
    parse_ranged(s, 0.0, f32::MAX, "Gap")
}

fn parse_offset(s: &str) -> Result<f32, String> {
    parse_ranged(s, f32::MIN, f32::MAX, "Offset")
}

fn parse_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|_| "Invalid scale value")?;
    if !(scale.is_finite() && scale > 0.0) {
        return Err("Scale must be greater than 0".to_string());
    }
    Ok(scale)
}

fn parse_color(s: &str) -> Result<String, String> {
    s.parse::<tilemark::color::Rgba>()
        .map(|_| s.to_string())
        .map_err(|e| e.to_string())
}

/// Check if stdin has data available (is a pipe)
fn stdin_has_data() -> bool {
    !atty::is(atty::Stream::Stdin)
}

/// Only picture files are accepted; files without an extension are sniffed later
fn check_image_path(path: &Path) -> Result<()> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if format_from_extension(ext).is_none() {
            bail!("Not an image file: {}", path.display());
        }
    }
    Ok(())
}

impl Args {
    /// Field edits in the order the form lists its fields
    fn edits(&self) -> Vec<(&'static str, Value)> {
        let mut edits = Vec::new();
        if let Some(ref content) = self.content {
            edits.push(("content", json!(content)));
        }
        if let Some(ref weight) = self.font_weight {
            edits.push(("fontWeight", json!(weight)));
        }
        if let Some(ref family) = self.font_family {
            edits.push(("fontFamily", json!(family)));
        }
        if let Some(ref color) = self.color {
            edits.push(("color", json!(color)));
        }
        if let Some(size) = self.font_size {
            edits.push(("fontSize", json!(size)));
        }
        if let Some(rotate) = self.rotate {
            edits.push(("rotate", json!(rotate)));
        }
        if let Some(gap) = self.gap_x {
            edits.push(("gapsX", json!(gap)));
        }
        if let Some(gap) = self.gap_y {
            edits.push(("gapsY", json!(gap)));
        }
        if let Some(offset) = self.offset_x {
            edits.push(("offsetX", json!(offset)));
        }
        if let Some(offset) = self.offset_y {
            edits.push(("offsetY", json!(offset)));
        }
        edits
    }
}

/// Parse command line arguments and resolve where the picture comes from
pub fn parse_args() -> Result<ParsedArgs> {
    resolve(Args::parse(), stdin_has_data())
}

fn resolve(args: Args, stdin_piped: bool) -> Result<ParsedArgs> {
    let image = if let Some(ref path) = args.image_path {
        check_image_path(path)?;
        Some(ImageInput::Path(path.clone()))
    } else if stdin_piped {
        Some(ImageInput::Stdin)
    } else if args.print_config {
        None
    } else {
        bail!("No image provided. Please provide an image path or pipe image data to stdin.\n\
               Usage: tilemark <IMAGE> [OPTIONS]\n\
               Or:    cat image.png | tilemark [OPTIONS]");
    };

    Ok(ParsedArgs {
        image,
        form_file: args.form.clone(),
        edits: args.edits(),
        output_dir: args.output.clone(),
        scale: args.scale,
        data_url: args.data_url,
        print_config: args.print_config,
    })
}
