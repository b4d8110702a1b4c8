// Image loading module
// Reads a picture into a data URI plus decoded pixels

use crate::error::LoadError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbaImage};
use log::debug;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Where the picture bytes come from
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Local file
    Path(PathBuf),
    /// Everything piped on stdin
    Stdin,
    /// Bytes already in memory
    Bytes(Vec<u8>),
}

/// The single active picture
#[derive(Debug, Clone)]
pub struct ImageSource {
    data_uri: String,
    pixels: Arc<RgbaImage>,
}

impl ImageSource {
    /// Decode raw file bytes, auto-detecting the format
    pub fn from_bytes(data: &[u8]) -> Result<Self, LoadError> {
        if data.is_empty() {
            return Err(LoadError::Empty);
        }

        let format = image::guess_format(data)?;
        let img = image::load(Cursor::new(data), format)?;

        let data_uri = format!(
            "data:{};base64,{}",
            format.to_mime_type(),
            STANDARD.encode(data)
        );

        Ok(Self {
            data_uri,
            pixels: Arc::new(img.to_rgba8()),
        })
    }

    /// Decode a `data:<mime>;base64,<payload>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self, LoadError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| LoadError::DataUri("missing data: scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| LoadError::DataUri("missing payload separator".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(LoadError::DataUri("payload is not base64".to_string()));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| LoadError::DataUri(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    /// MIME type recorded in the data URI
    pub fn mime(&self) -> &str {
        self.data_uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or_default()
    }

    pub fn pixels(&self) -> &Arc<RgbaImage> {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Read and decode a picture without blocking the caller's event loop
pub async fn load(input: ImageInput) -> Result<ImageSource, LoadError> {
    let data = match input {
        ImageInput::Path(path) => {
            debug!("Reading image file: {}", path.display());
            tokio::fs::read(&path).await?
        }
        ImageInput::Stdin => read_stdin().await?,
        ImageInput::Bytes(data) => data,
    };

    tokio::task::spawn_blocking(move || ImageSource::from_bytes(&data))
        .await
        .map_err(|e| LoadError::Task(e.to_string()))?
}

/// Read all of stdin
async fn read_stdin() -> Result<Vec<u8>, LoadError> {
    let mut buffer = Vec::new();
    tokio::io::stdin().read_to_end(&mut buffer).await?;
    if buffer.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(buffer)
}

/// Get the appropriate image format from file extension
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    match ext.to_lowercase().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "gif" => Some(ImageFormat::Gif),
        "webp" => Some(ImageFormat::WebP),
        "bmp" => Some(ImageFormat::Bmp),
        "ico" => Some(ImageFormat::Ico),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn builds_png_data_uri() {
        let source = ImageSource::from_bytes(&png_bytes(3, 2, [1, 2, 3, 255])).unwrap();
        assert!(source.data_uri().starts_with("data:image/png;base64,"));
        assert_eq!(source.mime(), "image/png");
        assert_eq!((source.width(), source.height()), (3, 2));
        assert_eq!(source.pixels().get_pixel(2, 1).0, [1, 2, 3, 255]);
    }

    #[test]
    fn data_uri_round_trips_to_same_pixels() {
        let original = ImageSource::from_bytes(&png_bytes(4, 4, [9, 8, 7, 128])).unwrap();
        let reparsed = ImageSource::from_data_uri(original.data_uri()).unwrap();
        assert_eq!(reparsed.pixels().as_raw(), original.pixels().as_raw());
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(ImageSource::from_bytes(b""), Err(LoadError::Empty)));
        assert!(matches!(
            ImageSource::from_bytes(b"definitely not a picture"),
            Err(LoadError::Decode(_))
        ));
        assert!(matches!(
            ImageSource::from_data_uri("data:text/plain,hello"),
            Err(LoadError::DataUri(_))
        ));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png_bytes(5, 7, [0, 0, 0, 255])).unwrap();

        let source = load(ImageInput::Path(path)).await.unwrap();
        assert_eq!((source.width(), source.height()), (5, 7));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load(ImageInput::Path(PathBuf::from("/nonexistent/pic.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(format_from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_extension("svg"), None);
    }
}
