//! Merging several PDFs into one.

use tracing::{debug, info};

use super::{FileId, SessionStatus, SourceFile, StatusProgress, reorder_by_id};
use crate::error::{PagecraftError, Result};
use crate::pdf::{DocumentLibrary, LopdfLibrary, PDF_MIME};
use crate::pipeline::{self, BatchOutcome, CancellationToken, ProgressSink, UnitProcessor};
use crate::sink::{Delivery, FileSink, save_or_deliver};

/// Copies every page of each source into one accumulator document.
struct AppendAll<'a, L: DocumentLibrary> {
    library: &'a L,
    merged: &'a mut L::Document,
}

impl<L: DocumentLibrary, I: AsRef<[u8]>> UnitProcessor<I> for AppendAll<'_, L> {
    type Output = usize;
    type Error = PagecraftError;

    async fn process(&mut self, item: &I, index: usize) -> Result<usize> {
        let src = self.library.load(item.as_ref())?;
        let indices: Vec<usize> = (0..self.library.page_count(&src)).collect();
        let pages = self.library.copy_pages(self.merged, &src, &indices)?;
        for page in pages {
            self.library.add_page(self.merged, page)?;
        }
        debug!("Appended {} pages from source {}", indices.len(), index + 1);
        Ok(indices.len())
    }
}

/// Merge `sources` in order. Returns `None` if the run was cancelled.
pub async fn merge_documents<L, I, P>(
    library: &L,
    sources: &[I],
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>>
where
    L: DocumentLibrary,
    I: AsRef<[u8]>,
    P: ProgressSink + ?Sized,
{
    let mut merged = library.create();
    let mut units = AppendAll {
        library,
        merged: &mut merged,
    };

    match pipeline::run(sources, &mut units, progress, cancel).await? {
        BatchOutcome::Completed(counts) => {
            let total: usize = counts.iter().sum();
            let bytes = library.save(&mut merged)?;
            info!("Merged {} files into {} pages", sources.len(), total);
            Ok(Some(bytes))
        }
        BatchOutcome::Cancelled => Ok(None),
    }
}

/// Ordered list of PDFs to merge.
pub struct Merger<L: DocumentLibrary = LopdfLibrary> {
    library: L,
    files: Vec<SourceFile>,
    next_id: u64,
    output_name: String,
    status: SessionStatus,
    cancel: CancellationToken,
}

impl Merger<LopdfLibrary> {
    pub fn new() -> Self {
        Self::with_library(LopdfLibrary::new())
    }
}

impl Default for Merger<LopdfLibrary> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: DocumentLibrary> Merger<L> {
    pub fn with_library(library: L) -> Self {
        Self {
            library,
            files: Vec::new(),
            next_id: 0,
            output_name: "merged.pdf".to_string(),
            status: SessionStatus::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Name of the merged file.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Load and append a file. An unreadable file leaves the list untouched.
    pub fn add_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<FileId> {
        let id = FileId(self.next_id);
        let file = SourceFile::load(&self.library, id, name, data)?;
        self.next_id += 1;
        debug!("Added {} ({} pages)", file.name(), file.page_count());
        self.files.push(file);
        Ok(id)
    }

    pub fn remove_file(&mut self, id: FileId) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id() != id);
        self.files.len() != before
    }

    /// Put the named files first, in the given order.
    pub fn reorder_files(&mut self, order: &[FileId]) {
        reorder_by_id(&mut self.files, order, SourceFile::id);
    }

    /// Remove every file and any pending error.
    pub fn clear(&mut self) {
        self.files.clear();
        self.status.error = None;
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_pages(&self) -> usize {
        self.files.iter().map(SourceFile::page_count).sum()
    }

    pub fn total_size(&self) -> usize {
        self.files.iter().map(SourceFile::size).sum()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Token that cancels a running merge between files.
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

    /// Merge all files and save or deliver the result.
    pub async fn merge<S, P>(&mut self, sink: &mut S, progress: &mut P) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        if self.files.len() < 2 {
            let message = "Please add at least 2 PDF files to merge";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        }

        self.status.begin();
        self.cancel.reset();

        let mut reporter = StatusProgress {
            status: &mut self.status,
            inner: progress,
        };
        let result = match merge_documents(&self.library, &self.files, &mut reporter, &self.cancel).await {
            Ok(Some(bytes)) => save_or_deliver(sink, &bytes, &self.output_name, PDF_MIME)
                .map(|delivery| BatchOutcome::Completed(vec![delivery])),
            Ok(None) => Ok(BatchOutcome::Cancelled),
            Err(e) => Err(e),
        };

        self.status.settle(&result);
        result
    }
}
