//! Error types for the pagecraft-core library.
//!
//! Input problems (malformed range text, chunk sizes below one) never show up
//! here: they are absorbed where they occur. Everything below is a
//! collaborator failure that is scoped to a single operation.

use thiserror::Error;

/// Main error type for the pagecraft library.
#[derive(Error, Debug)]
pub enum PagecraftError {
    /// PDF document error.
    #[error("PDF error: {0}")]
    Document(#[from] DocumentError),

    /// Page rendering error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// ZIP archive error.
    #[cfg(feature = "archive")]
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested operation has nothing to work on.
    #[error("{0}")]
    NothingToDo(String),
}

/// Errors raised by the document library.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The bytes could not be decoded as a PDF.
    #[error("failed to decode PDF: {0}")]
    Decode(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// A 0-based page index outside the document was requested.
    #[error("page index {index} out of range (document has {count} pages)")]
    InvalidPage { index: usize, count: usize },

    /// Serializing the document failed.
    #[error("failed to save PDF: {0}")]
    Save(String),

    /// An image could not be embedded as a page.
    #[error("failed to embed image: {0}")]
    Image(String),
}

/// Errors raised by the raster engine.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The 1-indexed page number does not exist.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The source could not be decoded.
    #[error("failed to decode source: {0}")]
    Decode(String),

    /// The rendered bitmap could not be encoded.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The rendering library could not be loaded or failed internally.
    #[error("render backend error: {0}")]
    Backend(String),
}

/// Result type for the pagecraft library.
pub type Result<T> = std::result::Result<T, PagecraftError>;
