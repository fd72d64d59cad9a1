//! Raster engine backed by PDFium.

use std::path::Path;

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::{debug, trace};

use super::{RasterEngine, RenderOptions, Result, encode_image};
use crate::error::RenderError;

fn backend_error(e: PdfiumError) -> RenderError {
    RenderError::Backend(e.to_string())
}

/// Draws every page element, text and vector art included.
///
/// The PDFium shared library is bound when the rasterizer is built, not at
/// compile time, so hosts without it can fall back to
/// [`PageRasterizer`](super::PageRasterizer).
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind to the PDFium library on the system search path.
    pub fn from_system_library() -> Result<Self> {
        let bindings = Pdfium::bind_to_system_library().map_err(backend_error)?;
        debug!("Bound system PDFium library");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Bind to the PDFium library stored in `dir`.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let path = Pdfium::pdfium_platform_library_name_at_path(dir.as_ref());
        let bindings = Pdfium::bind_to_library(&path).map_err(backend_error)?;
        debug!("Bound PDFium library at {}", path.display());
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    pub fn render_sync(
        &self,
        source: &[u8],
        page_number: u32,
        options: RenderOptions,
    ) -> Result<Vec<u8>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(source, None)
            .map_err(|e| RenderError::Decode(e.to_string()))?;
        let pages = document.pages();
        let index = page_number
            .checked_sub(1)
            .and_then(|i| PdfPageIndex::try_from(i).ok())
            .filter(|&i| i < pages.len())
            .ok_or(RenderError::InvalidPage(page_number))?;
        let page = pages.get(index).map_err(backend_error)?;

        let target_width = Pixels::try_from(options.width)
            .map_err(|_| RenderError::Encode(format!("width {} too large", options.width)))?;
        let config = PdfRenderConfig::new().set_target_width(target_width);
        let bitmap = page.render_with_config(&config).map_err(backend_error)?;

        let width = u32::try_from(bitmap.width()).map_err(|e| RenderError::Backend(e.to_string()))?;
        let height = u32::try_from(bitmap.height()).map_err(|e| RenderError::Backend(e.to_string()))?;
        let pixels = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| RenderError::Backend("bitmap size mismatch".to_string()))?;
        trace!("PDFium rendered page {} at {}x{}", page_number, width, height);

        encode_image(&DynamicImage::ImageRgba8(pixels), options.format, options.quality)
    }
}

impl RasterEngine for PdfiumRasterizer {
    async fn render_page(
        &self,
        source: &[u8],
        page_number: u32,
        options: RenderOptions,
    ) -> Result<Vec<u8>> {
        self.render_sync(source, page_number, options)
    }
}
