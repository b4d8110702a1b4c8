// Export pipeline module
// Captures the watermark container at high density and hands the PNG to a
// download sink

use crate::color::Rgba;
use crate::config::WatermarkProps;
use crate::error::ExportError;
use crate::watermark::{blend_over, WatermarkRenderer};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::cell::RefCell;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Stable id of the element holding the picture and its watermark
pub const CONTAINER_ID: &str = "watermark-container";

/// Name offered for the exported file
pub const DOWNLOAD_FILE_NAME: &str = "watermarked-image.png";

/// Pixel density of the export relative to the on-screen container
pub const EXPORT_SCALE: f32 = 4.0;

/// Snapshot of the container: base picture plus the props it is drawn with
#[derive(Debug, Clone)]
pub struct Scene {
    pub image: Arc<RgbaImage>,
    pub props: WatermarkProps,
}

impl Scene {
    /// Full content width; the container shrinks to the picture's natural size
    pub fn scroll_width(&self) -> u32 {
        self.image.width()
    }

    pub fn scroll_height(&self) -> u32 {
        self.image.height()
    }
}

/// Capture settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    pub scale: f32,
    /// `None` leaves uncovered pixels transparent
    pub background: Option<Rgba>,
    pub width: u32,
    pub height: u32,
}

impl CaptureOptions {
    /// Options for a full capture of `scene` at [`EXPORT_SCALE`]
    pub fn for_scene(scene: &Scene) -> Self {
        Self {
            scale: EXPORT_SCALE,
            background: None,
            width: scene.scroll_width(),
            height: scene.scroll_height(),
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Size of the raster this capture produces
    pub fn output_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.scale).round() as u32,
            (self.height as f32 * self.scale).round() as u32,
        )
    }
}

/// Turns a scene into pixels
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, scene: &Scene, options: &CaptureOptions) -> Result<RgbaImage, ExportError>;
}

/// Software rasterizer: resampled picture plus tiled watermark
pub struct CanvasRasterizer {
    renderer: Mutex<WatermarkRenderer>,
}

impl Default for CanvasRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasRasterizer {
    pub fn new() -> Self {
        Self::with_renderer(WatermarkRenderer::new())
    }

    pub fn with_renderer(renderer: WatermarkRenderer) -> Self {
        Self {
            renderer: Mutex::new(renderer),
        }
    }

    fn paint_watermark(
        &self,
        canvas: &mut RgbaImage,
        props: &WatermarkProps,
        scale: f32,
    ) -> Result<(), ExportError> {
        // A panic in an earlier capture leaves nothing half-written in the renderer
        let mut renderer = self.renderer.lock().unwrap_or_else(PoisonError::into_inner);
        renderer
            .paint(canvas, props, scale)
            .map_err(|e| ExportError::Rasterize(e.to_string()))
    }
}

impl Rasterizer for CanvasRasterizer {
    fn rasterize(&self, scene: &Scene, options: &CaptureOptions) -> Result<RgbaImage, ExportError> {
        let (width, height) = options.output_size();
        if width == 0 || height == 0 {
            return Err(ExportError::Rasterize(format!(
                "empty capture area {}x{}",
                width, height
            )));
        }

        let background = options.background.unwrap_or(Rgba::TRANSPARENT);
        let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba(background.to_array()));

        let image_width = (scene.image.width() as f32 * options.scale).round() as u32;
        let image_height = (scene.image.height() as f32 * options.scale).round() as u32;
        let picture = if (image_width, image_height) == scene.image.dimensions() {
            scene.image.as_ref().clone()
        } else {
            imageops::resize(scene.image.as_ref(), image_width, image_height, FilterType::Lanczos3)
        };

        // Negative z-index puts the mark beneath the picture
        if scene.props.z_index < 0 {
            self.paint_watermark(&mut canvas, &scene.props, options.scale)?;
            draw_picture(&mut canvas, &picture);
        } else {
            draw_picture(&mut canvas, &picture);
            self.paint_watermark(&mut canvas, &scene.props, options.scale)?;
        }

        debug!("Rasterized {}x{} at {}x", width, height, options.scale);
        Ok(canvas)
    }
}

/// Composite the picture at the canvas origin
fn draw_picture(canvas: &mut RgbaImage, picture: &RgbaImage) {
    let width = canvas.width().min(picture.width());
    let height = canvas.height().min(picture.height());
    for y in 0..height {
        for x in 0..width {
            let src = picture.get_pixel(x, y).0;
            match src[3] {
                0 => {}
                255 => canvas.put_pixel(x, y, image::Rgba(src)),
                _ => {
                    let dst = canvas.get_pixel_mut(x, y);
                    dst.0 = blend_over(dst.0, src);
                }
            }
        }
    }
}

/// A finished export waiting to be handed to the user
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl Download {
    /// `data:image/png;base64,...` form of the file
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// Receives finished downloads
pub trait DownloadSink {
    fn save(&self, download: &Download) -> Result<PathBuf, ExportError>;
}

/// Saves downloads into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, download: &Download) -> Result<PathBuf, ExportError> {
        let target = self.dir.join(&download.file_name);
        let partial = self.dir.join(format!(".{}.part", download.file_name));

        // Write aside and rename so a failed write never leaves a truncated file
        if let Err(e) = fs::write(&partial, &download.png) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(target)
    }
}

/// Writes each download as one `data:image/png` URL line
pub struct DataUrlSink<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> DataUrlSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> DownloadSink for DataUrlSink<W> {
    fn save(&self, download: &Download) -> Result<PathBuf, ExportError> {
        let url = download.data_url();
        debug!("Dispatching {} as {} byte data URL", download.file_name, url.len());

        let mut out = self.out.borrow_mut();
        writeln!(out, "{}", url)?;
        out.flush()?;
        Ok(PathBuf::from(&download.file_name))
    }
}

/// Lossless PNG encoding of the capture
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buffer)
}

/// Capture `scene` and encode it, off the calling task
pub async fn export(
    scene: Scene,
    options: CaptureOptions,
    rasterizer: Arc<dyn Rasterizer>,
) -> Result<Download, ExportError> {
    tokio::task::spawn_blocking(move || -> Result<Download, ExportError> {
        let canvas = rasterizer.rasterize(&scene, &options)?;
        let png = encode_png(&canvas)?;
        Ok(Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: canvas.width(),
            height: canvas.height(),
            png,
        })
    })
    .await
    .map_err(|e| ExportError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(width: u32, height: u32) -> Scene {
        let mut props = WatermarkProps::default();
        props.content = "W".to_string();
        props.gap = [50.0, 50.0];
        props.rotate = 0.0;
        Scene {
            image: Arc::new(RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]))),
            props,
        }
    }

    #[test]
    fn capture_covers_full_scroll_size_at_density() {
        let scene = scene(30, 20);
        let options = CaptureOptions::for_scene(&scene);
        assert_eq!((options.width, options.height), (30, 20));
        assert_eq!(options.scale, 4.0);
        assert_eq!(options.background, None);
        assert_eq!(options.output_size(), (120, 80));
    }

    #[test]
    fn rasterizes_to_output_size() {
        let scene = scene(30, 20);
        let canvas = CanvasRasterizer::new()
            .rasterize(&scene, &CaptureOptions::for_scene(&scene))
            .unwrap();
        assert_eq!(canvas.dimensions(), (120, 80));
    }

    #[test]
    fn transparent_picture_stays_transparent_without_mark() {
        let mut scene = scene(4, 4);
        scene.image = Arc::new(RgbaImage::new(4, 4));
        scene.props.content.clear();

        let canvas = CanvasRasterizer::new()
            .rasterize(&scene, &CaptureOptions::for_scene(&scene).with_scale(1.0))
            .unwrap();
        assert!(canvas.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn empty_capture_area_fails() {
        let mut scene = scene(1, 1);
        scene.image = Arc::new(RgbaImage::new(0, 0));
        let err = CanvasRasterizer::new()
            .rasterize(&scene, &CaptureOptions::for_scene(&scene))
            .unwrap_err();
        assert!(matches!(err, ExportError::Rasterize(_)));
    }

    #[test]
    fn png_decodes_back_to_capture() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let png = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn directory_sink_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let download = Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: 1,
            height: 1,
            png: vec![1, 2, 3],
        };

        let path = sink.save(&download).unwrap();
        assert_eq!(path, dir.path().join("watermarked-image.png"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn directory_sink_missing_dir_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let sink = DirectorySink::new(&missing);
        let download = Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: 1,
            height: 1,
            png: vec![0],
        };

        assert!(matches!(sink.save(&download), Err(ExportError::Download(_))));
        assert!(!missing.exists());
    }

    #[test]
    fn directory_sink_failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory already sitting at the target name makes the rename fail
        fs::create_dir(dir.path().join(DOWNLOAD_FILE_NAME)).unwrap();
        fs::write(dir.path().join(DOWNLOAD_FILE_NAME).join("keep"), b"x").unwrap();

        let sink = DirectorySink::new(dir.path());
        let download = Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: 1,
            height: 1,
            png: vec![7],
        };

        assert!(matches!(sink.save(&download), Err(ExportError::Download(_))));
        assert!(!dir.path().join(".watermarked-image.png.part").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn data_url_sink_writes_one_line() {
        let sink = DataUrlSink::new(Vec::new());
        let download = Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: 1,
            height: 1,
            png: vec![0x89, b'P', b'N', b'G'],
        };

        let name = sink.save(&download).unwrap();
        assert_eq!(name, PathBuf::from("watermarked-image.png"));
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "data:image/png;base64,iVBORw==\n"
        );
    }

    #[test]
    fn data_url_is_png() {
        let download = Download {
            file_name: DOWNLOAD_FILE_NAME.to_string(),
            width: 1,
            height: 1,
            png: vec![0x89, b'P', b'N', b'G'],
        };
        assert_eq!(download.data_url(), "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn export_produces_png_download() {
        let scene = scene(10, 5);
        let options = CaptureOptions::for_scene(&scene);
        let download = export(scene, options, Arc::new(CanvasRasterizer::new()))
            .await
            .unwrap();

        assert_eq!(download.file_name, "watermarked-image.png");
        assert_eq!((download.width, download.height), (40, 20));
        let decoded = image::load_from_memory(&download.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }
}
