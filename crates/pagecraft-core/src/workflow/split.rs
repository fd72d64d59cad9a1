//! Splitting one PDF into several.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FileId, SessionStatus, SourceFile, StatusProgress};
use crate::error::{DocumentError, PagecraftError, Result};
use crate::pdf::{DocumentLibrary, LopdfLibrary, PDF_MIME};
use crate::pipeline::{self, BatchOutcome, CancellationToken, ProgressSink, UnitProcessor};
use crate::plan::{OutputSpec, SplitKind, SplitMode};
use crate::range::{PageInterval, RangeParser};
use crate::sink::{Delivery, FileSink, deliver_batch};

/// One produced file of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOutput {
    pub filename: String,
    pub pages: PageInterval,
    pub data: Vec<u8>,
}

/// Builds one new document per output spec.
struct ExtractInterval<'a, L: DocumentLibrary> {
    library: &'a L,
    source: &'a L::Document,
}

impl<L: DocumentLibrary> UnitProcessor<OutputSpec> for ExtractInterval<'_, L> {
    type Output = SplitOutput;
    type Error = PagecraftError;

    async fn process(&mut self, spec: &OutputSpec, _index: usize) -> Result<SplitOutput> {
        let mut doc = self.library.create();
        let pages = self
            .library
            .copy_pages(&mut doc, self.source, &spec.pages.indices())?;
        for page in pages {
            self.library.add_page(&mut doc, page)?;
        }
        let data = self.library.save(&mut doc)?;
        debug!("Built {} ({} bytes)", spec.filename, data.len());

        Ok(SplitOutput {
            filename: spec.filename.clone(),
            pages: spec.pages,
            data,
        })
    }
}

/// Produce every file of `plan` from the PDF in `source`.
///
/// All outputs are returned together once the last one is built; a failure
/// on any of them discards the rest. A plan naming pages past the end of the
/// document is rejected before anything is built.
pub async fn split_document<L, P>(
    library: &L,
    source: &[u8],
    plan: &[OutputSpec],
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<BatchOutcome<SplitOutput>>
where
    L: DocumentLibrary,
    P: ProgressSink + ?Sized,
{
    let source = library.load(source)?;
    let count = library.page_count(&source);
    if let Some(spec) = plan.iter().find(|s| s.pages.end() as usize > count) {
        return Err(DocumentError::InvalidPage {
            index: spec.pages.end() as usize - 1,
            count,
        }
        .into());
    }
    let mut units = ExtractInterval {
        library,
        source: &source,
    };
    let outcome = pipeline::run(plan, &mut units, progress, cancel).await?;
    if !outcome.is_cancelled() {
        info!("Split into {} files", plan.len());
    }
    Ok(outcome)
}

/// Split settings for one loaded PDF.
pub struct Splitter<L: DocumentLibrary = LopdfLibrary> {
    library: L,
    parser: RangeParser,
    file: Option<SourceFile>,
    next_id: u64,
    mode: SplitKind,
    range_input: String,
    fixed_size: u32,
    prefix: String,
    default_prefix: String,
    status: SessionStatus,
    cancel: CancellationToken,
}

impl Splitter<LopdfLibrary> {
    pub fn new() -> Self {
        Self::with_library(LopdfLibrary::new())
    }
}

impl Default for Splitter<LopdfLibrary> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: DocumentLibrary> Splitter<L> {
    pub fn with_library(library: L) -> Self {
        Self {
            library,
            parser: RangeParser::new(),
            file: None,
            next_id: 0,
            mode: SplitKind::Ranges,
            range_input: "1".to_string(),
            fixed_size: 1,
            prefix: "split".to_string(),
            default_prefix: "split".to_string(),
            status: SessionStatus::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Parser used for the range text.
    pub fn with_parser(mut self, parser: RangeParser) -> Self {
        self.parser = parser;
        self
    }

    /// Prefix used when a file name has no stem.
    pub fn with_default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = prefix.into();
        self.prefix = self.default_prefix.clone();
        self
    }

    /// Load the file to split. The prefix becomes the file's stem.
    ///
    /// On failure the previous file and settings stay as they were.
    pub fn set_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let file = SourceFile::load(&self.library, FileId(self.next_id), name, data)?;
        self.next_id += 1;
        let stem = file.stem();
        self.prefix = if stem.is_empty() {
            self.default_prefix.clone()
        } else {
            stem
        };
        debug!("Splitting {} ({} pages)", file.name(), file.page_count());
        self.file = Some(file);
        Ok(())
    }

    pub fn clear_file(&mut self) {
        self.file = None;
        self.range_input = "1".to_string();
    }

    pub fn file(&self) -> Option<&SourceFile> {
        self.file.as_ref()
    }

    pub fn set_mode(&mut self, mode: SplitKind) {
        self.mode = mode;
    }

    pub fn mode(&self) -> SplitKind {
        self.mode
    }

    pub fn set_range_input(&mut self, input: impl Into<String>) {
        self.range_input = input.into();
    }

    pub fn range_input(&self) -> &str {
        &self.range_input
    }

    pub fn set_fixed_size(&mut self, size: u32) {
        self.fixed_size = size;
    }

    pub fn fixed_size(&self) -> u32 {
        self.fixed_size
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
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

    /// Current settings as a split mode.
    pub fn split_mode(&self) -> SplitMode {
        let total = self.file.as_ref().map_or(0, |f| f.page_count() as u32);
        match self.mode {
            SplitKind::Ranges => SplitMode::Ranges {
                ranges: self.parser.parse(&self.range_input, total),
            },
            SplitKind::Burst => SplitMode::Burst,
            SplitKind::Fixed => SplitMode::Fixed {
                chunk_size: self.fixed_size,
            },
        }
    }

    /// Files the current settings would produce.
    pub fn plan(&self) -> Vec<OutputSpec> {
        match &self.file {
            Some(file) => self
                .split_mode()
                .plan(file.page_count() as u32, &self.prefix),
            None => Vec::new(),
        }
    }

    /// Split the file and deliver every output.
    pub async fn split<S, P>(&mut self, sink: &mut S, progress: &mut P) -> Result<BatchOutcome<Delivery>>
    where
        S: FileSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let Some(file) = &self.file else {
            let message = "No PDF file loaded";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        };

        self.status.begin();
        let plan = self.plan();
        if plan.is_empty() {
            let message = "No valid page ranges specified";
            self.status.fail(message);
            return Err(PagecraftError::NothingToDo(message.to_string()));
        }

        self.cancel.reset();
        let mut reporter = StatusProgress {
            status: &mut self.status,
            inner: progress,
        };
        let result = split_document(&self.library, file.data(), &plan, &mut reporter, &self.cancel)
            .await
            .and_then(|outcome| match outcome {
                BatchOutcome::Completed(outputs) => {
                    let files = outputs.iter().map(|o| (o.filename.as_str(), o.data.as_slice()));
                    deliver_batch(sink, files, PDF_MIME).map(BatchOutcome::Completed)
                }
                BatchOutcome::Cancelled => Ok(BatchOutcome::Cancelled),
            });

        self.status.settle(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{page_widths, sample_pdf};
    use crate::pipeline::{BatchProgress, NoProgress};
    use crate::sink::MemorySink;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};

    /// Keeps files in memory but refuses the delivery numbered `fail_at`.
    struct FlakySink {
        inner: MemorySink,
        fail_at: usize,
        attempts: usize,
    }

    impl FileSink for FlakySink {
        fn deliver(&mut self, data: &[u8], filename: &str, mime: &str) -> Result<()> {
            self.attempts += 1;
            if self.attempts == self.fail_at {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.deliver(data, filename, mime)
        }

        fn pick_save_location(&mut self, _suggested: &str) -> Option<PathBuf> {
            None
        }

        fn write_to(&mut self, path: &Path, data: &[u8]) -> Result<()> {
            self.inner.write_to(path, data)
        }

        fn retract(&mut self, filename: &str) -> Result<()> {
            self.inner.retract(filename)
        }
    }

    #[tokio::test]
    async fn test_split_document_fixed_chunks() {
        let lib = LopdfLibrary::new();
        let plan = SplitMode::Fixed { chunk_size: 4 }.plan(10, "doc");

        let outputs = split_document(&lib, &sample_pdf(10), &plan, &mut NoProgress, &CancellationToken::new())
            .await
            .unwrap()
            .into_completed()
            .unwrap();

        let names: Vec<&str> = outputs.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(names, vec!["doc_p1-p4.pdf", "doc_p5-p8.pdf", "doc_p9-p10.pdf"]);
        assert_eq!(page_widths(&outputs[2].data), vec![108, 109]);
    }

    #[tokio::test]
    async fn test_session_uses_file_stem_and_ranges() {
        let mut splitter = Splitter::new();
        splitter.set_file("report.pdf", sample_pdf(12)).unwrap();
        assert_eq!(splitter.prefix(), "report");

        splitter.set_range_input("1, 3-5, 10-end");
        let mut sink = MemorySink::new();
        let mut reported = Vec::new();
        let mut progress = |p: BatchProgress| reported.push(p.percent());
        splitter.split(&mut sink, &mut progress).await.unwrap();

        assert_eq!(
            sink.filenames(),
            vec!["report_p1-p1.pdf", "report_p3-p5.pdf", "report_p10-p12.pdf"]
        );
        assert_eq!(page_widths(&sink.delivered[1].data), vec![102, 103, 104]);
        assert_eq!(reported, vec![33, 67, 100]);
        assert_eq!(splitter.status().progress, 100);
    }

    #[tokio::test]
    async fn test_session_burst() {
        let mut splitter = Splitter::new();
        splitter.set_file("a.pdf", sample_pdf(3)).unwrap();
        splitter.set_mode(SplitKind::Burst);

        let mut sink = MemorySink::new();
        splitter.split(&mut sink, &mut NoProgress).await.unwrap();
        assert_eq!(sink.filenames(), vec!["a_p1.pdf", "a_p2.pdf", "a_p3.pdf"]);
    }

    #[tokio::test]
    async fn test_session_reports_empty_plan() {
        let mut splitter = Splitter::new();
        splitter.set_file("a.pdf", sample_pdf(3)).unwrap();
        splitter.set_range_input("7-9, x");

        let mut sink = MemorySink::new();
        let err = splitter.split(&mut sink, &mut NoProgress).await.unwrap_err();

        assert_eq!(err.to_string(), "No valid page ranges specified");
        assert_eq!(
            splitter.status().error.as_deref(),
            Some("No valid page ranges specified")
        );
        assert!(!splitter.status().is_processing);
        assert!(sink.delivered.is_empty());

        splitter.clear_error();
        assert_eq!(splitter.status().error, None);
    }

    #[test]
    fn test_failed_load_keeps_previous_file() {
        let mut splitter = Splitter::new();
        splitter.set_file("keep.pdf", sample_pdf(2)).unwrap();
        assert!(splitter.set_file("bad.pdf", b"%PDF-broken".to_vec()).is_err());

        assert_eq!(splitter.file().map(|f| f.name()), Some("keep.pdf"));
        assert_eq!(splitter.prefix(), "keep");
    }

    #[test]
    fn test_clear_file_resets_range_text() {
        let mut splitter = Splitter::new();
        splitter.set_file("a.pdf", sample_pdf(2)).unwrap();
        splitter.set_range_input("2");
        splitter.clear_file();

        assert!(splitter.file().is_none());
        assert_eq!(splitter.range_input(), "1");
        assert!(splitter.plan().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_split_delivers_nothing() {
        let mut splitter = Splitter::new();
        splitter.set_file("a.pdf", sample_pdf(4)).unwrap();
        splitter.set_mode(SplitKind::Burst);

        let token = splitter.cancellation_token();
        let mut progress = |_p: BatchProgress| token.cancel();
        let mut sink = MemorySink::new();
        let outcome = splitter.split(&mut sink, &mut progress).await.unwrap();

        assert!(outcome.is_cancelled());
        assert!(sink.delivered.is_empty());
    }

    #[tokio::test]
    async fn test_split_document_rejects_pages_past_the_end() {
        let lib = LopdfLibrary::new();
        let plan: Vec<OutputSpec> =
            serde_json::from_str(r#"[{"filename":"x.pdf","pages":{"start":2,"end":4}}]"#).unwrap();

        let err = split_document(&lib, &sample_pdf(3), &plan, &mut NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PagecraftError::Document(DocumentError::InvalidPage { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_reversed_plan_interval_does_not_deserialize() {
        let parsed: serde_json::Result<Vec<OutputSpec>> =
            serde_json::from_str(r#"[{"filename":"x.pdf","pages":{"start":5,"end":2}}]"#);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_failed_delivery_retracts_earlier_files() {
        let mut splitter = Splitter::new();
        splitter.set_file("a.pdf", sample_pdf(3)).unwrap();
        splitter.set_mode(SplitKind::Burst);

        let mut sink = FlakySink {
            inner: MemorySink::new(),
            fail_at: 2,
            attempts: 0,
        };
        let err = splitter.split(&mut sink, &mut NoProgress).await.unwrap_err();

        assert!(matches!(err, PagecraftError::Io(_)));
        assert!(sink.inner.delivered.is_empty());
        assert_eq!(splitter.status().progress, 0);
        assert!(!splitter.status().is_processing);
        assert!(splitter.status().error.as_deref().unwrap().contains("disk full"));
    }
}
