//! Reordering, rotating and deleting the pages of one PDF.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{FileId, SessionStatus, SourceFile, StatusProgress};
use crate::arrangement::{self, PageArrangement, Rotation, SavePlan};
use crate::error::{PagecraftError, Result};
use crate::pdf::{DocumentLibrary, LopdfLibrary, PDF_MIME};
use crate::pipeline::{self, BatchOutcome, CancellationToken, ProgressSink, UnitProcessor};
use crate::render::{RasterEngine, RenderOptions};
use crate::sink::{Delivery, FileSink, save_or_deliver};

/// Appends pre-copied pages one by one, rotating those that need it.
struct PlacePages<'a, L: DocumentLibrary> {
    library: &'a L,
    dest: &'a mut L::Document,
    pages: Vec<Option<L::Page>>,
    rotations: &'a BTreeMap<usize, Rotation>,
}

impl<L: DocumentLibrary> UnitProcessor<usize> for PlacePages<'_, L> {
    type Output = ();
    type Error = PagecraftError;

    async fn process(&mut self, original_index: &usize, index: usize) -> Result<()> {
        let Some(mut page) = self.pages.get_mut(index).and_then(Option::take) else {
            return Err(PagecraftError::NothingToDo(format!(
                "page {} was not copied",
                original_index + 1
            )));
        };
        if let Some(rotation) = self.rotations.get(original_index) {
            self.library
                .set_rotation(&mut page, i32::from(rotation.degrees()));
        }
        self.library.add_page(self.dest, page)?;
        Ok(())
    }
}

/// Write the pages of `source` in `plan` order with its rotations applied on
/// top of each page's own rotation. Returns `None` if cancelled.
pub async fn organize_document<L, P>(
    library: &L,
    source: &[u8],
    plan: &SavePlan,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>>
where
    L: DocumentLibrary,
    P: ProgressSink + ?Sized,
{
    if plan.page_order.is_empty() {
        return Err(PagecraftError::NothingToDo("No pages to save".to_string()));
    }

    let src = library.load(source)?;
    let mut dest = library.create();
    let pages = library.copy_pages(&mut dest, &src, &plan.page_order)?;
    let outcome = {
        let mut units = PlacePages {
            library,
            dest: &mut dest,
            pages: pages.into_iter().map(Some).collect(),
            rotations: &plan.rotations,
        };
        pipeline::run(&plan.page_order, &mut units, progress, cancel).await?
    };

    match outcome {
        BatchOutcome::Completed(_) => {
            let bytes = library.save(&mut dest)?;
            info!(
                "Organized {} pages ({} rotated)",
                plan.page_order.len(),
                plan.rotations.len()
            );
            Ok(Some(bytes))
        }
        BatchOutcome::Cancelled => Ok(None),
    }
}

/// Page editor for one loaded PDF.
pub struct Organizer<L: DocumentLibrary = LopdfLibrary> {
    library: L,
    file: Option<SourceFile>,
    next_id: u64,
    arrangement: Mutex<PageArrangement>,
    organized_suffix: String,
    status: SessionStatus,
    cancel: CancellationToken,
}

impl Organizer<LopdfLibrary> {
    pub fn new() -> Self {
        Self::with_library(LopdfLibrary::new())
    }
}

impl Default for Organizer<LopdfLibrary> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: DocumentLibrary> Organizer<L> {
    pub fn with_library(library: L) -> Self {
        Self {
            library,
            file: None,
            next_id: 0,
            arrangement: Mutex::new(PageArrangement::new()),
            organized_suffix: "_organized".to_string(),
            status: SessionStatus::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_organized_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.organized_suffix = suffix.into();
        self
    }

    /// Load a file and lay out one entry per page.
    ///
    /// On failure the current file and arrangement are kept.
    pub fn set_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<usize> {
        let file = SourceFile::load(&self.library, FileId(self.next_id), name, data)?;
        self.next_id += 1;
        let pages = file.page_count();
        self.arrangement_mut().load(pages);
        debug!("Organizing {} ({} pages)", file.name(), pages);
        self.file = Some(file);
        Ok(pages)
    }

    /// Drop the file and release every thumbnail.
    pub fn clear_file(&mut self) {
        self.arrangement_mut().clear();
        self.file = None;
    }

    pub fn file(&self) -> Option<&SourceFile> {
        self.file.as_ref()
    }

    /// Shared access to the arrangement, e.g. while thumbnails render.
    pub fn arrangement(&self) -> MutexGuard<'_, PageArrangement> {
        self.arrangement.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn arrangement_mut(&mut self) -> &mut PageArrangement {
        self.arrangement
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Suggested name of the saved document.
    pub fn output_name(&self) -> Option<String> {
        self.file
            .as_ref()
            .map(|f| format!("{}{}.pdf", f.stem(), self.organized_suffix))
    }

    /// Replace every thumbnail with a fresh render at `options.width`.
    ///
    /// Returns the number of thumbnails applied.
    pub async fn render_thumbnails<R: RasterEngine>(&self, engine: &R, options: RenderOptions) -> usize {
        match &self.file {
            Some(file) => {
                arrangement::render_thumbnails(&self.arrangement, engine, file.data(), options).await
            }
            None => 0,
        }
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

    /// Write the arranged document to a location picked through `sink`, or
    /// deliver it when no location is chosen.
    pub async fn save<S, P>(&mut self, sink: &mut S, progress: &mut P) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let (Some(file), Some(filename)) = (&self.file, self.output_name()) else {
            let message = "No PDF file loaded";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        };

        self.status.begin();
        self.cancel.reset();
        let plan = self.arrangement().save_plan();

        let mut reporter = StatusProgress {
            status: &mut self.status,
            inner: progress,
        };
        let result = match organize_document(&self.library, file.data(), &plan, &mut reporter, &self.cancel).await {
            Ok(Some(bytes)) => save_or_deliver(sink, &bytes, &filename, PDF_MIME)
                .map(|delivery| BatchOutcome::Completed(vec![delivery])),
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
    use crate::arrangement::RotateDirection;
    use crate::pdf::testing::{page_rotations, page_widths, sample_pdf};
    use crate::pipeline::NoProgress;
    use crate::render::{ImageFormat, PageRasterizer};
    use crate::sink::MemorySink;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_organize_document_order_and_rotation() {
        let lib = LopdfLibrary::new();
        let plan = SavePlan {
            page_order: vec![2, 0],
            rotations: BTreeMap::from([(2, Rotation::Deg270)]),
        };

        let bytes = organize_document(&lib, &sample_pdf(3), &plan, &mut NoProgress, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(page_widths(&bytes), vec![102, 100]);
        assert_eq!(page_rotations(&bytes), vec![270, 0]);
    }

    #[tokio::test]
    async fn test_organize_document_rejects_empty_plan() {
        let lib = LopdfLibrary::new();
        let err = organize_document(&lib, &sample_pdf(1), &SavePlan::default(), &mut NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PagecraftError::NothingToDo(_)));
    }

    #[tokio::test]
    async fn test_session_select_rotate_delete_save() {
        let mut organizer = Organizer::new();
        assert_eq!(organizer.set_file("scan.pdf", sample_pdf(3)).unwrap(), 3);

        let arrangement = organizer.arrangement_mut();
        let second = arrangement.entries()[1].id();
        arrangement.toggle_selection(second);
        arrangement.rotate_selected(RotateDirection::Clockwise);
        arrangement.deselect_all();
        let first = arrangement.entries()[0].id();
        arrangement.toggle_selection(first);
        arrangement.delete_selected();

        let mut sink = MemorySink::new();
        let outcome = organizer.save(&mut sink, &mut NoProgress).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![Delivery::Delivered("scan_organized.pdf".to_string())])
        );
        let saved = &sink.delivered[0].data;
        assert_eq!(page_widths(saved), vec![101, 102]);
        assert_eq!(page_rotations(saved), vec![90, 0]);
    }

    #[tokio::test]
    async fn test_session_writes_to_picked_location() {
        let mut organizer = Organizer::new();
        organizer.set_file("scan.pdf", sample_pdf(2)).unwrap();

        let mut sink = MemorySink::with_save_location("/out/picked.pdf");
        let outcome = organizer.save(&mut sink, &mut NoProgress).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![Delivery::Written(PathBuf::from("/out/picked.pdf"))])
        );
        assert_eq!(page_widths(&sink.written[0].1), vec![100, 101]);
    }

    #[tokio::test]
    async fn test_session_thumbnails_are_released_on_clear() {
        let mut organizer = Organizer::new();
        organizer.set_file("scan.pdf", sample_pdf(4)).unwrap();

        let options = RenderOptions::new(40, ImageFormat::Jpeg, 80);
        let applied = organizer.render_thumbnails(&PageRasterizer::new(), options).await;
        assert_eq!(applied, 4);

        let ledger = organizer.arrangement().ledger().clone();
        assert_eq!(ledger.live(), 4);

        organizer.clear_file();
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.acquired(), ledger.released());
    }

    #[tokio::test]
    async fn test_save_without_file_is_reported() {
        let mut organizer = Organizer::new();
        let err = organizer.save(&mut MemorySink::new(), &mut NoProgress).await.unwrap_err();
        assert_eq!(err.to_string(), "No PDF file loaded");
        assert!(organizer.status().error.is_some());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_arrangement() {
        let mut organizer = Organizer::new();
        organizer.set_file("scan.pdf", sample_pdf(3)).unwrap();
        let arrangement = organizer.arrangement_mut();
        let second = arrangement.entries()[1].id();
        arrangement.toggle_selection(second);
        arrangement.rotate_selected(RotateDirection::Clockwise);

        let options = RenderOptions::new(40, ImageFormat::Png, 80);
        assert_eq!(organizer.render_thumbnails(&PageRasterizer::new(), options).await, 3);

        let snapshot = |organizer: &Organizer| {
            organizer
                .arrangement()
                .entries()
                .iter()
                .map(|e| (e.id(), e.rotation(), e.is_selected(), e.thumbnail().is_pending()))
                .collect::<Vec<_>>()
        };
        let before = snapshot(&organizer);
        let live = organizer.arrangement().ledger().live();

        assert!(organizer.set_file("bad.pdf", b"garbage".to_vec()).is_err());

        assert_eq!(snapshot(&organizer), before);
        assert_eq!(organizer.arrangement().selected_count(), 1);
        assert_eq!(organizer.arrangement().ledger().live(), live);
        assert_eq!(organizer.file().map(|f| f.name()), Some("scan.pdf"));
        assert_eq!(organizer.output_name().as_deref(), Some("scan_organized.pdf"));
    }
}
