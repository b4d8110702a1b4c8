// tilemark - Overlay a tiled text watermark on a picture and export it as PNG
// Applies the form fields, loads the picture and saves the 4x export

mod cli;

use anyhow::{Context, Result};
use log::info;
use serde_json::{Map, Value};
use std::sync::Arc;
use tilemark::{App, CanvasRasterizer, DataUrlSink, DirectorySink};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = cli::parse_args()?;

    let mut app = App::new().with_export_scale(args.scale);

    if let Some(ref path) = args.form_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read form file: {}", path.display()))?;
        let fields: Map<String, Value> = serde_json::from_str(&text)
            .with_context(|| format!("Form file is not a JSON object: {}", path.display()))?;
        app.set_fields(fields).context("Invalid form file")?;
    }

    for (name, value) in args.edits {
        app.set_field(name, value)?;
    }

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(app.props())?);
        return Ok(());
    }

    let input = args.image.context("No image source provided")?;
    app.load_image(input).await?;

    let rasterizer = Arc::new(CanvasRasterizer::new());
    if args.data_url {
        info!("Exporting at {}x to stdout", args.scale);
        let sink = DataUrlSink::new(std::io::stdout().lock());
        app.download(rasterizer, &sink).await?;
        return Ok(());
    }

    info!(
        "Exporting at {}x into {}",
        args.scale,
        args.output_dir.display()
    );
    let sink = DirectorySink::new(&args.output_dir);
    let path = app.download(rasterizer, &sink).await?;

    info!("Saved {}", path.display());
    Ok(())
}
