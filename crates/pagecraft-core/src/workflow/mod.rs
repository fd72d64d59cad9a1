//! End-to-end document operations.
//!
//! Each session owns the inputs and settings of one tool (merge, split,
//! organize, convert) and drives the batch pipeline against the document
//! library. Sessions track status the way a UI shows it: whether a run is in
//! progress, its percentage, and the last error. The free functions next to
//! them run the same operations without any session state.

mod convert;
mod merge;
mod organize;
mod split;

pub use convert::{ConvertMode, Converter, ImageFile, RenderedPage, images_to_pdf, render_pages};
#[cfg(feature = "archive")]
pub use convert::{ZIP_MIME, bundle_images};
pub use merge::{Merger, merge_documents};
pub use organize::{Organizer, organize_document};
pub use split::{SplitOutput, Splitter, split_document};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::{BatchOutcome, BatchProgress, ProgressSink};
use crate::pdf::DocumentLibrary;

/// Opaque handle of a file added to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(u64);

impl FileId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A PDF loaded into a session.
#[derive(Debug, Clone)]
pub struct SourceFile {
    id: FileId,
    name: String,
    data: Vec<u8>,
    page_count: usize,
}

impl SourceFile {
    /// Decode `data` once to learn its page count.
    pub fn load<L: DocumentLibrary>(
        library: &L,
        id: FileId,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self> {
        let doc = library.load(&data)?;
        let page_count = library.page_count(&doc);
        Ok(Self {
            id,
            name: name.into(),
            data,
            page_count,
        })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without a trailing `.pdf`.
    pub fn stem(&self) -> String {
        file_stem(&self.name)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }
}

impl AsRef<[u8]> for SourceFile {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Final path component of `name` with a `.pdf` extension removed.
pub fn file_stem(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);
    match base.len().checked_sub(4) {
        Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".pdf") => {
            base[..cut].to_string()
        }
        _ => base.to_string(),
    }
}

/// Processing state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_processing: bool,
    /// Percent of the current or last run.
    pub progress: u8,
    /// Message of the last failure, until cleared.
    pub error: Option<String>,
}

impl SessionStatus {
    pub(crate) fn begin(&mut self) {
        self.is_processing = true;
        self.progress = 0;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.is_processing = false;
        self.error = Some(message.into());
    }

    /// Record how a run ended.
    pub(crate) fn settle<T>(&mut self, result: &Result<BatchOutcome<T>>) {
        self.is_processing = false;
        match result {
            Ok(BatchOutcome::Completed(_)) => self.progress = 100,
            Ok(BatchOutcome::Cancelled) => self.progress = 0,
            Err(e) => {
                self.progress = 0;
                self.error = Some(e.to_string());
            }
        }
    }
}

/// Forwards progress to a caller's sink while mirroring it into a status.
pub(crate) struct StatusProgress<'a, P: ?Sized> {
    pub status: &'a mut SessionStatus,
    pub inner: &'a mut P,
}

impl<P: ProgressSink + ?Sized> ProgressSink for StatusProgress<'_, P> {
    fn report(&mut self, progress: BatchProgress) {
        self.status.progress = progress.percent();
        self.inner.report(progress);
    }
}

/// Keeps the entries whose id is named, in the named order, followed by the
/// rest in their current order. Unknown ids are ignored, repeats count once.
pub(crate) fn reorder_by_id<T, K: PartialEq + Copy>(
    items: &mut Vec<T>,
    order: &[K],
    key: impl Fn(&T) -> K,
) {
    let mut remaining: Vec<Option<T>> = std::mem::take(items).into_iter().map(Some).collect();
    let mut reordered = Vec::with_capacity(remaining.len());

    for id in order {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|item| key(item) == *id))
        {
            reordered.extend(slot.take());
        }
    }
    reordered.extend(remaining.into_iter().flatten());
    *items = reordered;
}
