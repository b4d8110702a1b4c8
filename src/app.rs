// Application state module
// Single owner of the form, derived watermark props, loaded picture and panel

use crate::config::{reduce, WatermarkConfig, WatermarkProps};
use crate::error::{ExportError, FormError, LoadError};
use crate::export::{
    export, CaptureOptions, DownloadSink, Rasterizer, Scene, CONTAINER_ID, EXPORT_SCALE,
};
use crate::form::Form;
use crate::image_loader::{self, ImageInput, ImageSource};
use crate::notify::{Notification, NotificationLog, Notifier};
use crate::panel::Panel;
use log::{debug, error, info};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Main application state
pub struct App {
    form: Form,
    /// Snapshot of the form at the last change
    config: WatermarkConfig,
    /// Props derived from `config`
    props: WatermarkProps,
    image: Option<ImageSource>,
    panel: Panel,
    notifications: NotificationLog,
    /// Bumped on every config change; the preview redraws when it moves
    revision: u64,
    export_scale: f32,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create the application with every field at its default
    pub fn new() -> Self {
        let form = Form::new();
        let config = form.values().clone();
        let props = reduce(&config);
        Self {
            form,
            config,
            props,
            image: None,
            panel: Panel::default(),
            notifications: NotificationLog::default(),
            revision: 0,
            export_scale: EXPORT_SCALE,
        }
    }

    /// Override the export pixel density
    pub fn with_export_scale(mut self, scale: f32) -> Self {
        self.export_scale = scale;
        self
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    pub fn props(&self) -> &WatermarkProps {
        &self.props
    }

    pub fn image(&self) -> Option<&ImageSource> {
        self.image.as_ref()
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.notifications
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Edit one form field, then re-derive the props
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), FormError> {
        self.form.set_field(name, value)?;
        self.on_values_change();
        Ok(())
    }

    /// Apply several edits; each accepted edit re-derives the props
    pub fn set_fields(&mut self, fields: Map<String, Value>) -> Result<(), FormError> {
        for (name, value) in fields {
            self.set_field(&name, value)?;
        }
        Ok(())
    }

    /// Re-read the whole form and replace the config snapshot
    pub fn on_values_change(&mut self) {
        self.config = self.form.values().clone();
        self.props = reduce(&self.config);
        self.revision += 1;
        debug!("Watermark config revision {}: {:?}", self.revision, self.props);
    }

    /// Replace the active picture
    pub fn set_image(&mut self, source: ImageSource) {
        info!("Image loaded: {}x{} pixels", source.width(), source.height());
        self.image = Some(source);
    }

    /// Read and decode a picture. On failure the previous picture stays active.
    pub async fn load_image(&mut self, input: ImageInput) -> Result<(), LoadError> {
        match image_loader::load(input).await {
            Ok(source) => {
                self.set_image(source);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load image: {}", e);
                self.notifications
                    .notify(Notification::error("Failed to load image"));
                Err(e)
            }
        }
    }

    /// The download action is only enabled once a picture is loaded
    pub fn can_download(&self) -> bool {
        self.image.is_some()
    }

    /// Look up a container by element id
    pub fn container(&self, id: &str) -> Result<Scene, ExportError> {
        if id != CONTAINER_ID {
            return Err(ExportError::ContainerNotFound(id.to_string()));
        }
        let image = self.image.as_ref().ok_or(ExportError::NoImage)?;
        Ok(Scene {
            image: Arc::clone(image.pixels()),
            props: self.props.clone(),
        })
    }

    /// Export the container and hand the PNG to `sink`.
    ///
    /// Does nothing while no picture is loaded. Otherwise exactly one
    /// notification is recorded: success once the sink accepted the file,
    /// failure if any step failed, in which case nothing is saved.
    pub async fn download(
        &mut self,
        rasterizer: Arc<dyn Rasterizer>,
        sink: &dyn DownloadSink,
    ) -> Result<PathBuf, ExportError> {
        if !self.can_download() {
            return Err(ExportError::NoImage);
        }

        match self.run_export(rasterizer, sink).await {
            Ok(path) => {
                self.notifications
                    .notify(Notification::success("Download succeeded"));
                Ok(path)
            }
            Err(e) => {
                error!("Export failed: {}", e);
                self.notifications
                    .notify(Notification::error("Download failed"));
                Err(e)
            }
        }
    }

    async fn run_export(
        &self,
        rasterizer: Arc<dyn Rasterizer>,
        sink: &dyn DownloadSink,
    ) -> Result<PathBuf, ExportError> {
        let scene = self.container(CONTAINER_ID)?;
        let options = CaptureOptions::for_scene(&scene).with_scale(self.export_scale);
        let download = export(scene, options, rasterizer).await?;
        sink.save(&download)
    }

    pub fn toggle_panel(&mut self) {
        self.panel.toggle();
        debug!("Panel visible: {}", self.panel.is_visible());
    }
}
