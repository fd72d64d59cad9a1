//! Core library for client-side PDF page operations.
//!
//! This crate provides:
//! - Page range parsing (`"1, 3-5, 10-end"`)
//! - Split plans: explicit ranges, burst and fixed-size chunks
//! - A page arrangement model for reordering, rotating and deleting pages
//! - A sequential batch pipeline with progress and cooperative cancellation
//! - Merge, split, organize and convert sessions on top of lopdf and image

pub mod arrangement;
pub mod error;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod plan;
pub mod range;
pub mod render;
pub mod sink;
pub mod workflow;

pub use arrangement::{
    PageArrangement, PageEntry, PageId, RenderRequest, RotateDirection, Rotation, SavePlan,
    ThumbnailLedger, render_thumbnails,
};
pub use error::{DocumentError, PagecraftError, RenderError, Result};
pub use models::config::PagecraftConfig;
pub use pdf::{DocumentLibrary, LopdfLibrary, PDF_MIME};
pub use pipeline::{
    BatchOutcome, BatchProgress, CancellationToken, NoProgress, ProgressSink, UnitProcessor,
};
pub use plan::{OutputSpec, SelectionMode, SplitKind, SplitMode, build_plan};
pub use range::{PageInterval, RangeParser, RangeSet, parse_ranges};
pub use render::{ImageFormat, PageRasterizer, RasterEngine, RenderOptions};
#[cfg(feature = "pdfium")]
pub use render::PdfiumRasterizer;
pub use sink::{Delivery, DirectorySink, FileSink, MemorySink, deliver_batch, save_or_deliver};
pub use workflow::{ConvertMode, Converter, Merger, Organizer, SessionStatus, Splitter};
