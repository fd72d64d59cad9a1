//! Page rasterization.
//!
//! [`RasterEngine`] turns one page of a PDF into an encoded image.
//! [`PageRasterizer`] is a lightweight pure-Rust engine: it draws the page's
//! embedded image (scanned documents) or a blank sheet of the page's
//! proportions, applies the page rotation, and scales to the requested width.
//! With the `pdfium` feature, [`PdfiumRasterizer`] draws text and vector
//! content through a PDFium library bound at runtime.

use std::future::Future;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::RenderError;
use crate::pdf::{inherited_attribute, media_box_size};

#[cfg(feature = "pdfium")]
mod pdfium;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Encoded output format of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

/// Target size and encoding of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Output width in pixels; height follows the page aspect ratio.
    pub width: u32,
    pub format: ImageFormat,
    /// Encoder quality, 1-100. Only JPEG uses it.
    pub quality: u8,
}

impl RenderOptions {
    pub fn new(width: u32, format: ImageFormat, quality: u8) -> Self {
        Self {
            width: width.max(1),
            format,
            quality: quality.clamp(1, 100),
        }
    }
}

/// Renders single PDF pages to encoded images.
///
/// Calls are independent of each other and may run concurrently.
pub trait RasterEngine {
    /// Render 1-indexed `page_number` of the PDF in `source`.
    fn render_page(
        &self,
        source: &[u8],
        page_number: u32,
        options: RenderOptions,
    ) -> impl Future<Output = Result<Vec<u8>>>;
}

/// Pure-Rust raster engine built on lopdf and image.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRasterizer;

impl PageRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous render used by the async trait method.
    pub fn render_sync(
        &self,
        source: &[u8],
        page_number: u32,
        options: RenderOptions,
    ) -> Result<Vec<u8>> {
        let doc = Document::load_mem(source).map_err(|e| RenderError::Decode(e.to_string()))?;
        let page_id = *doc
            .get_pages()
            .get(&page_number)
            .ok_or(RenderError::InvalidPage(page_number))?;

        let (page_w, page_h) = media_box_size(&doc, page_id);
        let base = match first_page_image(&doc, page_id) {
            Some(img) => img,
            None => blank_page(page_w, page_h),
        };

        let rotated = match page_rotation(&doc, page_id) {
            90 => base.rotate90(),
            180 => base.rotate180(),
            270 => base.rotate270(),
            _ => base,
        };

        let height = scaled_height(rotated.width(), rotated.height(), options.width);
        let scaled = rotated.resize_exact(options.width, height, FilterType::Triangle);
        trace!(
            "Rendered page {} at {}x{} as {:?}",
            page_number, options.width, height, options.format
        );

        encode_image(&scaled, options.format, options.quality)
    }
}

impl RasterEngine for PageRasterizer {
    async fn render_page(
        &self,
        source: &[u8],
        page_number: u32,
        options: RenderOptions,
    ) -> Result<Vec<u8>> {
        self.render_sync(source, page_number, options)
    }
}

/// Encode a bitmap in `format`.
pub fn encode_image(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match format {
        ImageFormat::Png => img
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?,
        ImageFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100));
            encoder
                .encode_image(&img.to_rgb8())
                .map_err(|e| RenderError::Encode(e.to_string()))?;
        }
        ImageFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::WebP)
            .map_err(|e| RenderError::Encode(e.to_string()))?,
    }
    Ok(data)
}

/// An image ready to be placed on a PDF page.
#[derive(Debug, Clone)]
pub struct EmbeddableImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode any supported image, composite it onto white and re-encode as JPEG.
pub fn flatten_to_jpeg(data: &[u8], quality: u8) -> Result<EmbeddableImage> {
    let img = image::load_from_memory(data).map_err(|e| RenderError::Decode(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let flattened: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as u16;
        let over_white = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    });

    let jpeg = encode_image(&DynamicImage::ImageRgb8(flattened), ImageFormat::Jpeg, quality)?;
    debug!("Flattened {}x{} image to {} JPEG bytes", width, height, jpeg.len());
    Ok(EmbeddableImage {
        jpeg,
        width,
        height,
    })
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return target_width;
    }
    let h = (height as f64 * target_width as f64 / width as f64).round() as u32;
    h.max(1)
}

fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .map(|r| r.rem_euclid(360))
        .unwrap_or(0)
}

/// White sheet with the page's aspect ratio, at one pixel per point.
fn blank_page(width_pt: f32, height_pt: f32) -> DynamicImage {
    let w = (width_pt.round() as u32).max(1);
    let h = (height_pt.round() as u32).max(1);
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
}

/// First decodable image XObject in the page's resources.
fn first_page_image(doc: &Document, page_id: ObjectId) -> Option<DynamicImage> {
    let resources = inherited_attribute(doc, page_id, b"Resources")?;
    let (_, resources) = doc.dereference(&resources).ok()?;
    let xobjects = resources.as_dict().ok()?.get(b"XObject").ok()?;
    let (_, xobjects) = doc.dereference(xobjects).ok()?;

    xobjects.as_dict().ok()?.iter().find_map(|(_name, obj_ref)| {
        let (_, obj) = doc.dereference(obj_ref).ok()?;
        decode_image_xobject(doc, obj)
    })
}

fn decode_image_xobject(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("Found image XObject: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };
        match filter_name {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Skipping unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");
    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    let pixels = usize::try_from(width).ok()?.checked_mul(usize::try_from(height).ok()?)?;
    let rgb_len = pixels.checked_mul(3)?;
    match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= rgb_len => {
            RgbImage::from_raw(width, height, data[..rgb_len].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            image::GrayImage::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
        }
        _ => None,
    }
}
