//! Conversion between PDF pages and raster images.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FileId, SessionStatus, SourceFile, StatusProgress};
use crate::error::{PagecraftError, Result};
use crate::pdf::{DocumentLibrary, LopdfLibrary, PDF_MIME};
use crate::pipeline::{self, BatchOutcome, CancellationToken, ProgressSink, UnitProcessor};
use crate::range::RangeParser;
use crate::render::{ImageFormat, PageRasterizer, RasterEngine, RenderOptions, flatten_to_jpeg};
use crate::sink::{Delivery, FileSink};

/// JPEG quality of images placed on pages by a converter session.
const EMBED_QUALITY: u8 = 90;

/// MIME type of page image archives.
#[cfg(feature = "archive")]
pub const ZIP_MIME: &str = "application/zip";

/// Direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvertMode {
    #[default]
    PdfToImages,
    ImagesToPdf,
}

/// An input image for images-to-PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl AsRef<[u8]> for ImageFile {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// One page rendered to an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_number: u32,
    pub filename: String,
    pub data: Vec<u8>,
}

struct RenderUnits<'a, R: RasterEngine> {
    engine: &'a R,
    source: &'a [u8],
    options: RenderOptions,
}

impl<R: RasterEngine> UnitProcessor<u32> for RenderUnits<'_, R> {
    type Output = RenderedPage;
    type Error = PagecraftError;

    async fn process(&mut self, page_number: &u32, _index: usize) -> Result<RenderedPage> {
        let data = self
            .engine
            .render_page(self.source, *page_number, self.options)
            .await?;
        Ok(RenderedPage {
            page_number: *page_number,
            filename: format!("page_{}.{}", page_number, self.options.format.extension()),
            data,
        })
    }
}

/// Render 1-indexed `pages` of `source` one after another.
pub async fn render_pages<R, P>(
    engine: &R,
    source: &[u8],
    pages: &[u32],
    options: RenderOptions,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<BatchOutcome<RenderedPage>>
where
    R: RasterEngine,
    P: ProgressSink + ?Sized,
{
    let mut units = RenderUnits {
        engine,
        source,
        options,
    };
    pipeline::run(pages, &mut units, progress, cancel).await
}

/// Pack rendered pages into an uncompressed ZIP archive.
#[cfg(feature = "archive")]
pub fn bundle_images(pages: &[RenderedPage]) -> Result<Vec<u8>> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for page in pages {
        writer.start_file(page.filename.as_str(), options)?;
        writer.write_all(&page.data)?;
    }
    let archive = writer.finish()?.into_inner();
    debug!("Bundled {} images into {} bytes", pages.len(), archive.len());
    Ok(archive)
}

struct ImagePages<'a, L: DocumentLibrary> {
    library: &'a L,
    doc: &'a mut L::Document,
    quality: u8,
}

impl<L: DocumentLibrary, I: AsRef<[u8]>> UnitProcessor<I> for ImagePages<'_, L> {
    type Output = ();
    type Error = PagecraftError;

    async fn process(&mut self, image: &I, index: usize) -> Result<()> {
        let embeddable = flatten_to_jpeg(image.as_ref(), self.quality)?;
        self.library.add_image_page(
            self.doc,
            &embeddable.jpeg,
            embeddable.width,
            embeddable.height,
        )?;
        debug!(
            "Image {} placed on a {}x{} page",
            index + 1,
            embeddable.width,
            embeddable.height
        );
        Ok(())
    }
}

/// Build a PDF with one page per image, each page the size of its image.
/// Returns `None` if cancelled.
pub async fn images_to_pdf<L, I, P>(
    library: &L,
    images: &[I],
    quality: u8,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>>
where
    L: DocumentLibrary,
    I: AsRef<[u8]>,
    P: ProgressSink + ?Sized,
{
    let mut doc = library.create();
    let mut units = ImagePages {
        library,
        doc: &mut doc,
        quality,
    };
    match pipeline::run(images, &mut units, progress, cancel).await? {
        BatchOutcome::Completed(_) => {
            let bytes = library.save(&mut doc)?;
            info!("Converted {} images to PDF", images.len());
            Ok(Some(bytes))
        }
        BatchOutcome::Cancelled => Ok(None),
    }
}

/// PDF-to-images and images-to-PDF settings.
pub struct Converter<L: DocumentLibrary = LopdfLibrary, R: RasterEngine = PageRasterizer> {
    library: L,
    engine: R,
    parser: RangeParser,
    mode: ConvertMode,
    pdf: Option<SourceFile>,
    next_id: u64,
    images: Vec<ImageFile>,
    range_input: String,
    options: RenderOptions,
    converted_name: String,
    archive_suffix: String,
    status: SessionStatus,
    cancel: CancellationToken,
}

impl Converter<LopdfLibrary, PageRasterizer> {
    pub fn new() -> Self {
        Self::with_backends(LopdfLibrary::new(), PageRasterizer::new())
    }
}

impl Default for Converter<LopdfLibrary, PageRasterizer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: DocumentLibrary, R: RasterEngine> Converter<L, R> {
    pub fn with_backends(library: L, engine: R) -> Self {
        Self {
            library,
            engine,
            parser: RangeParser::new(),
            mode: ConvertMode::PdfToImages,
            pdf: None,
            next_id: 0,
            images: Vec::new(),
            range_input: "1".to_string(),
            options: RenderOptions::new(1200, ImageFormat::Png, 90),
            converted_name: "converted.pdf".to_string(),
            archive_suffix: "_images.zip".to_string(),
            status: SessionStatus::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_parser(mut self, parser: RangeParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output_names(mut self, converted_name: impl Into<String>, archive_suffix: impl Into<String>) -> Self {
        self.converted_name = converted_name.into();
        self.archive_suffix = archive_suffix.into();
        self
    }

    pub fn set_mode(&mut self, mode: ConvertMode) {
        self.mode = mode;
        self.status.error = None;
    }

    pub fn mode(&self) -> ConvertMode {
        self.mode
    }

    /// Load the PDF to export. The range text becomes every page.
    pub fn set_pdf_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<usize> {
        let file = SourceFile::load(&self.library, FileId(self.next_id), name, data)?;
        self.next_id += 1;
        let pages = file.page_count();
        self.range_input = if pages > 1 {
            format!("1-{pages}")
        } else {
            "1".to_string()
        };
        self.pdf = Some(file);
        Ok(pages)
    }

    pub fn clear_pdf(&mut self) {
        self.pdf = None;
        self.range_input = "1".to_string();
    }

    pub fn pdf(&self) -> Option<&SourceFile> {
        self.pdf.as_ref()
    }

    pub fn set_image_files(&mut self, images: Vec<ImageFile>) {
        self.images = images;
        self.status.error = None;
    }

    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    pub fn images(&self) -> &[ImageFile] {
        &self.images
    }

    pub fn set_range_input(&mut self, input: impl Into<String>) {
        self.range_input = input.into();
    }

    pub fn range_input(&self) -> &str {
        &self.range_input
    }

    pub fn set_image_format(&mut self, format: ImageFormat) {
        self.options.format = format;
    }

    pub fn set_image_quality(&mut self, quality: u8) {
        self.options.quality = quality.clamp(1, 100);
    }

    pub fn set_image_width(&mut self, width: u32) {
        self.options.width = width.max(1);
    }

    pub fn render_options(&self) -> RenderOptions {
        self.options
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.status.is_processing = false;
        self.status.progress = 0;
    }

    pub fn clear_error(&mut self) {
        self.status.error = None;
    }

    /// Pages selected by the range text, each page once, in range order.
    pub fn pages_to_render(&self) -> Vec<u32> {
        let total = self.pdf.as_ref().map_or(0, |f| f.page_count() as u32);
        let mut pages = Vec::new();
        for page in self.parser.parse(&self.range_input, total).page_numbers() {
            if !pages.contains(&page) {
                pages.push(page);
            }
        }
        pages
    }

    /// Run the conversion for the current mode.
    pub async fn convert<S, P>(&mut self, sink: &mut S, progress: &mut P) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        match self.mode {
            #[cfg(feature = "archive")]
            ConvertMode::PdfToImages => self.convert_pdf_to_images(sink, progress).await,
            #[cfg(not(feature = "archive"))]
            ConvertMode::PdfToImages => {
                let message = "Image export requires the archive feature";
                self.status.fail(message);
                Err(PagecraftError::Config(message.to_string()))
            }
            ConvertMode::ImagesToPdf => self.convert_images_to_pdf(sink, progress).await,
        }
    }

    /// Render the selected pages and deliver them as one ZIP archive.
    #[cfg(feature = "archive")]
    pub async fn convert_pdf_to_images<S, P>(
        &mut self,
        sink: &mut S,
        progress: &mut P,
    ) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let Some(file) = &self.pdf else {
            let message = "No PDF file loaded";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        };

        self.status.begin();
        let pages = self.pages_to_render();
        if pages.is_empty() {
            let message = "No valid page ranges specified";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        }

        self.cancel.reset();
        let archive_name = format!("{}{}", file.stem(), self.archive_suffix);
        let mut reporter = StatusProgress {
            status: &mut self.status,
            inner: progress,
        };
        let result = render_pages(&self.engine, file.data(), &pages, self.options, &mut reporter, &self.cancel)
            .await
            .and_then(|outcome| match outcome {
                BatchOutcome::Completed(rendered) => {
                    let archive = bundle_images(&rendered)?;
                    sink.deliver(&archive, &archive_name, ZIP_MIME)?;
                    Ok(BatchOutcome::Completed(vec![Delivery::Delivered(archive_name)]))
                }
                BatchOutcome::Cancelled => Ok(BatchOutcome::Cancelled),
            });

        self.status.settle(&result);
        result
    }

    /// Turn every image into a page of one PDF and deliver it.
    pub async fn convert_images_to_pdf<S, P>(
        &mut self,
        sink: &mut S,
        progress: &mut P,
    ) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        if self.images.is_empty() {
            let message = "No images selected";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        }

        self.status.begin();
        self.cancel.reset();
        let mut reporter = StatusProgress {
            status: &mut self.status,
            inner: progress,
        };
        let result = match images_to_pdf(&self.library, &self.images, EMBED_QUALITY, &mut reporter, &self.cancel).await {
            Ok(Some(bytes)) => sink
                .deliver(&bytes, &self.converted_name, PDF_MIME)
                .map(|()| BatchOutcome::Completed(vec![Delivery::Delivered(self.converted_name.clone())])),
            Ok(None) => Ok(BatchOutcome::Cancelled),
            Err(e) => Err(e),
        };

        self.status.settle(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::pdf::testing::{page_widths, sample_pdf};
    use crate::pipeline::{BatchProgress, NoProgress};
    use crate::render::encode_image;
    use crate::sink::MemorySink;
    use image::{DynamicImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 128])));
        encode_image(&img, ImageFormat::Png, 90).unwrap()
    }

    #[tokio::test]
    async fn test_render_pages_names_by_page_number() {
        let options = RenderOptions::new(30, ImageFormat::Jpeg, 80);
        let rendered = render_pages(
            &PageRasterizer::new(),
            &sample_pdf(3),
            &[3, 1],
            options,
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .into_completed()
        .unwrap();

        let names: Vec<&str> = rendered.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["page_3.jpeg", "page_1.jpeg"]);
        assert_eq!(image::load_from_memory(&rendered[0].data).unwrap().width(), 30);
    }

    #[tokio::test]
    async fn test_render_failure_aborts() {
        let options = RenderOptions::new(30, ImageFormat::Png, 80);
        let err = render_pages(
            &PageRasterizer::new(),
            &sample_pdf(2),
            &[1, 5, 2],
            options,
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PagecraftError::Render(RenderError::InvalidPage(5))));
    }

    #[tokio::test]
    async fn test_images_to_pdf_sizes_pages_to_images() {
        let lib = LopdfLibrary::new();
        let images = vec![png(40, 30), png(25, 60)];
        let mut reported = Vec::new();
        let mut progress = |p: BatchProgress| reported.push(p.percent());

        let pdf = images_to_pdf(&lib, &images, 90, &mut progress, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(page_widths(&pdf), vec![40, 25]);
        assert_eq!(reported, vec![50, 100]);
    }

    #[tokio::test]
    async fn test_images_to_pdf_rejects_undecodable_image() {
        let lib = LopdfLibrary::new();
        let images = vec![png(4, 4), b"not an image".to_vec()];
        let err = images_to_pdf(&lib, &images, 90, &mut NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PagecraftError::Render(RenderError::Decode(_))));
    }

    #[test]
    fn test_pdf_file_sets_full_range() {
        let mut converter = Converter::new();
        assert_eq!(converter.set_pdf_file("a.pdf", sample_pdf(5)).unwrap(), 5);
        assert_eq!(converter.range_input(), "1-5");

        converter.set_pdf_file("b.pdf", sample_pdf(1)).unwrap();
        assert_eq!(converter.range_input(), "1");

        converter.set_range_input("2, 1-3, end");
        converter.set_pdf_file("c.pdf", sample_pdf(4)).unwrap();
        converter.set_range_input("3-4, 1-3");
        assert_eq!(converter.pages_to_render(), vec![1, 2, 3, 4]);
    }

    #[cfg(feature = "archive")]
    #[tokio::test]
    async fn test_session_pdf_to_images_archive() {
        use std::io::Cursor;

        let mut converter = Converter::new();
        converter.set_pdf_file("report.pdf", sample_pdf(3)).unwrap();
        converter.set_image_width(20);
        converter.set_range_input("2-end");

        let mut sink = MemorySink::new();
        converter.convert(&mut sink, &mut NoProgress).await.unwrap();

        assert_eq!(sink.filenames(), vec!["report_images.zip"]);
        assert_eq!(sink.delivered[0].mime, ZIP_MIME);

        let mut archive = zip::ZipArchive::new(Cursor::new(sink.delivered[0].data.clone())).unwrap();
        assert_eq!(archive.len(), 2);
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "page_2.png");
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    }

    #[tokio::test]
    async fn test_session_images_to_pdf() {
        let mut converter = Converter::new();
        converter.set_mode(ConvertMode::ImagesToPdf);
        converter.set_image_files(vec![ImageFile::new("a.png", png(10, 10))]);

        let mut sink = MemorySink::new();
        let outcome = converter.convert(&mut sink, &mut NoProgress).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![Delivery::Delivered("converted.pdf".to_string())])
        );
        assert_eq!(sink.delivered[0].mime, PDF_MIME);
        assert_eq!(converter.status().progress, 100);
    }

    #[tokio::test]
    async fn test_session_without_inputs_reports_error() {
        let mut converter = Converter::new();
        converter.set_mode(ConvertMode::ImagesToPdf);
        let err = converter
            .convert(&mut MemorySink::new(), &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No images selected");

        converter.set_mode(ConvertMode::PdfToImages);
        assert_eq!(converter.status().error, None);
    }
}
