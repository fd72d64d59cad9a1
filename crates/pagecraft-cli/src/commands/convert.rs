//! Conversion commands - PDF pages to images and images to PDF.

use std::path::PathBuf;

use clap::Args;
use console::style;

use pagecraft_core::workflow::ImageFile;
use pagecraft_core::{
    ConvertMode, Converter, DirectorySink, ImageFormat, LopdfLibrary, PageRasterizer, PagecraftConfig,
    RasterEngine,
};
#[cfg(feature = "pdfium")]
use pagecraft_core::PdfiumRasterizer;
#[cfg(feature = "pdfium")]
use tracing::warn;

use super::{BarProgress, cancel_on_ctrl_c, expand_inputs, load_config, read_input, report_outcome};

/// Arguments for the to-images command.
#[derive(Args)]
pub struct ToImagesArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Page ranges to render (default: every page)
    #[arg(short, long)]
    ranges: Option<String>,

    /// Image format: png, jpeg or webp
    #[arg(short, long, value_parser = parse_format)]
    format: Option<ImageFormat>,

    /// Image width in pixels
    #[arg(short, long)]
    width: Option<u32>,

    /// Encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Output directory for the archive
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

/// Arguments for the from-images command.
#[derive(Args)]
pub struct FromImagesArgs {
    /// Input images or glob patterns, one page each, in order
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (default: converted.pdf in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    ImageFormat::from_extension(s).ok_or_else(|| format!("unsupported image format: {s}"))
}

fn converter<R: RasterEngine>(config: &PagecraftConfig, engine: R) -> Converter<LopdfLibrary, R> {
    Converter::with_backends(LopdfLibrary::new(), engine)
        .with_parser(config.range_parser())
        .with_render_options(config.render.image_options())
        .with_output_names(
            config.output.converted_name.clone(),
            config.output.images_archive_suffix.clone(),
        )
}

pub async fn run_to_images(args: ToImagesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    #[cfg(feature = "pdfium")]
    match PdfiumRasterizer::from_system_library() {
        Ok(engine) => return to_images(args, &config, engine).await,
        Err(e) => warn!("{}; using the built-in rasterizer", e),
    }

    to_images(args, &config, PageRasterizer::new()).await
}

async fn to_images<R: RasterEngine>(
    args: ToImagesArgs,
    config: &PagecraftConfig,
    engine: R,
) -> anyhow::Result<()> {
    let (name, data) = read_input(&args.input)?;

    let mut converter = converter(config, engine);
    converter
        .set_pdf_file(name, data)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.input.display(), e))?;
    if let Some(ranges) = args.ranges {
        converter.set_range_input(ranges);
    }
    if let Some(format) = args.format {
        converter.set_image_format(format);
    }
    if let Some(width) = args.width {
        converter.set_image_width(width);
    }
    if let Some(quality) = args.quality {
        converter.set_image_quality(quality);
    }

    println!(
        "{} Rendering {} pages as {}",
        style("ℹ").blue(),
        converter.pages_to_render().len(),
        converter.render_options().format.extension()
    );
    cancel_on_ctrl_c(converter.cancellation_token());

    let mut sink = DirectorySink::new(&args.output_dir);
    let mut progress = BarProgress::new("pages");
    let result = converter.convert(&mut sink, &mut progress).await;
    progress.finish();

    report_outcome(&result?, sink.written());
    Ok(())
}

pub async fn run_from_images(args: FromImagesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let files = expand_inputs(&args.inputs)?;

    let mut images = Vec::with_capacity(files.len());
    for path in &files {
        let (name, data) = read_input(path)?;
        images.push(ImageFile::new(name, data));
    }

    let mut converter = converter(&config, PageRasterizer::new());
    let mut output_dir = PathBuf::from(".");
    if let Some(output) = &args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            output_dir = parent.to_path_buf();
        }
        if let Some(file_name) = output.file_name().and_then(|n| n.to_str()) {
            converter = converter.with_output_names(
                file_name.to_string(),
                config.output.images_archive_suffix.clone(),
            );
        }
    }
    converter.set_mode(ConvertMode::ImagesToPdf);
    converter.set_image_files(images);
    cancel_on_ctrl_c(converter.cancellation_token());

    let mut sink = DirectorySink::new(output_dir);
    let mut progress = BarProgress::new("images");
    let result = converter.convert(&mut sink, &mut progress).await;
    progress.finish();

    report_outcome(&result?, sink.written());
    Ok(())
}
