use std::cell::RefCell;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde_json::json;
use tilemark::notify::Level;
use tilemark::{
    App, CanvasRasterizer, CaptureOptions, DataUrlSink, DirectorySink, Download, DownloadSink,
    ExportError, ImageInput, Rasterizer, Scene,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba([240, 240, 240, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode fixture");
    out
}

/// Records what it was handed instead of writing files
#[derive(Default)]
struct RecordingSink {
    saved: RefCell<Vec<Download>>,
}

impl DownloadSink for RecordingSink {
    fn save(&self, download: &Download) -> Result<PathBuf, ExportError> {
        self.saved.borrow_mut().push(download.clone());
        Ok(PathBuf::from(&download.file_name))
    }
}

struct FailingRasterizer;

impl Rasterizer for FailingRasterizer {
    fn rasterize(&self, _: &Scene, _: &CaptureOptions) -> Result<RgbaImage, ExportError> {
        Err(ExportError::Rasterize("canvas exploded".to_string()))
    }
}

async fn app_with_image(width: u32, height: u32) -> App {
    let mut app = App::new();
    app.load_image(ImageInput::Bytes(png(width, height)))
        .await
        .expect("load fixture");
    app
}

#[tokio::test]
async fn download_disabled_until_image_loaded() {
    let mut app = App::new();
    assert!(!app.can_download());

    let sink = RecordingSink::default();
    let err = app
        .download(Arc::new(CanvasRasterizer::new()), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::NoImage));
    assert!(sink.saved.borrow().is_empty());
    assert!(app.notifications().entries().is_empty());

    app.load_image(ImageInput::Bytes(png(2, 2))).await.unwrap();
    assert!(app.can_download());
}

#[tokio::test]
async fn export_is_four_times_scroll_size() {
    let mut app = app_with_image(37, 21).await;
    app.set_field("content", json!("W")).unwrap();
    app.set_field("gapsX", json!(50)).unwrap();
    app.set_field("gapsY", json!(50)).unwrap();
    app.set_field("rotate", json!(0)).unwrap();

    let sink = RecordingSink::default();
    app.download(Arc::new(CanvasRasterizer::new()), &sink)
        .await
        .unwrap();

    let saved = sink.saved.borrow();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_name, "watermarked-image.png");
    assert_eq!((saved[0].width, saved[0].height), (148, 84));

    let decoded = image::load_from_memory_with_format(&saved[0].png, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (148, 84));

    assert_eq!(app.notifications().count(Level::Success), 1);
    assert_eq!(app.notifications().count(Level::Error), 0);
}

#[tokio::test]
async fn rasterization_failure_offers_nothing() {
    let mut app = app_with_image(8, 8).await;
    let image_before = app.image().unwrap().data_uri().to_string();
    let props_before = app.props().clone();
    let revision_before = app.revision();

    let sink = RecordingSink::default();
    let err = app
        .download(Arc::new(FailingRasterizer), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Rasterize(_)));
    assert!(sink.saved.borrow().is_empty());
    assert_eq!(app.notifications().count(Level::Error), 1);
    assert_eq!(app.notifications().count(Level::Success), 0);

    assert_eq!(app.image().unwrap().data_uri(), image_before);
    assert_eq!(app.props(), &props_before);
    assert_eq!(app.revision(), revision_before);
}

#[tokio::test]
async fn saves_png_into_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new().with_export_scale(1.0);
    app.load_image(ImageInput::Bytes(png(6, 4))).await.unwrap();

    let path = app
        .download(Arc::new(CanvasRasterizer::new()), &DirectorySink::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("watermarked-image.png"));
    let written = image::open(&path).unwrap();
    assert_eq!((written.width(), written.height()), (6, 4));
}

#[tokio::test]
async fn watermark_beneath_opaque_picture_is_hidden() {
    let mut app = App::new().with_export_scale(1.0);
    app.load_image(ImageInput::Bytes(png(40, 40))).await.unwrap();
    app.set_field("color", json!("#000000")).unwrap();
    app.set_field("fontSize", json!(40)).unwrap();
    app.set_field("gapsX", json!(0)).unwrap();
    app.set_field("gapsY", json!(0)).unwrap();

    let scene = app.container(tilemark::CONTAINER_ID).unwrap();
    let mut beneath = scene.clone();
    beneath.props.z_index = -1;

    let rasterizer = CanvasRasterizer::new();
    let options = CaptureOptions::for_scene(&scene).with_scale(1.0);
    let under = rasterizer.rasterize(&beneath, &options).unwrap();

    assert!(under.pixels().all(|p| p.0 == [240, 240, 240, 255]));
}

#[tokio::test]
async fn huge_gap_exports_and_later_exports_still_work() {
    let mut app = app_with_image(10, 10).await;
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(CanvasRasterizer::new());
    let sink = RecordingSink::default();

    for gap in [1e9, 2000.0, 100.0] {
        app.set_field("gapsX", json!(gap)).unwrap();
        app.set_field("gapsY", json!(gap)).unwrap();
        app.download(rasterizer.clone(), &sink).await.unwrap();
    }

    let saved = sink.saved.borrow();
    assert_eq!(saved.len(), 3);
    assert!(saved.iter().all(|d| (d.width, d.height) == (40, 40)));
    assert_eq!(app.notifications().count(Level::Success), 3);
    assert_eq!(app.notifications().count(Level::Error), 0);
}

#[tokio::test]
async fn data_url_sink_receives_decodable_png() {
    let mut app = App::new().with_export_scale(1.0);
    app.load_image(ImageInput::Bytes(png(3, 5))).await.unwrap();

    let sink = DataUrlSink::new(Vec::new());
    app.download(Arc::new(CanvasRasterizer::new()), &sink)
        .await
        .unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    let encoded = out
        .trim_end()
        .strip_prefix("data:image/png;base64,")
        .expect("data URL prefix");
    let bytes = STANDARD.decode(encoded).unwrap();
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (3, 5));
}

#[tokio::test]
async fn missing_output_directory_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new().with_export_scale(1.0);
    app.load_image(ImageInput::Bytes(png(2, 2))).await.unwrap();

    let sink = DirectorySink::new(dir.path().join("missing"));
    let err = app
        .download(Arc::new(CanvasRasterizer::new()), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Download(_)));
    assert_eq!(app.notifications().count(Level::Error), 1);
}
