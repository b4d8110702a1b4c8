// tilemark - Overlay a tiled text watermark on a picture and export it as PNG

pub mod app;
pub mod color;
pub mod config;
pub mod error;
pub mod export;
pub mod form;
pub mod image_loader;
pub mod notify;
pub mod panel;
pub mod watermark;

pub use app::App;
pub use config::{reduce, FontStyle, WatermarkConfig, WatermarkProps};
pub use error::{ColorError, ExportError, FormError, LoadError};
pub use export::{
    CanvasRasterizer, CaptureOptions, DataUrlSink, DirectorySink, Download, DownloadSink,
    Rasterizer, Scene,
    CONTAINER_ID, DOWNLOAD_FILE_NAME, EXPORT_SCALE,
};
pub use form::{FontFamily, FontWeight, Form, FormValues};
pub use image_loader::{ImageInput, ImageSource};
