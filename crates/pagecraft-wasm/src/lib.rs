//! WASM bindings for client-side PDF page operations.
//!
//! This crate exposes range parsing, split plans, the page arrangement and
//! the merge/split/organize/convert pipelines to browsers. Every file stays
//! in the page: inputs arrive as `Uint8Array`s and outputs leave the same way.
//!
//! Long-running calls return a `Promise` and accept an optional
//! [`CancelHandle`]. A cancelled call resolves to `null`; failures reject.

use std::fmt::Display;
use std::future::Future;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use pagecraft_core::workflow as flow;
use pagecraft_core::{
    BatchProgress, CancellationToken, DocumentLibrary, ImageFormat, LopdfLibrary,
    OutputSpec, PageArrangement, PageId, PageRasterizer, ProgressSink, RenderOptions,
    RotateDirection, SavePlan, SplitKind, SplitMode, parse_ranges as parse_range_set,
};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn js_error(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Forwards progress percentages to an optional JS callback.
struct JsProgress(Option<Function>);

impl ProgressSink for JsProgress {
    fn report(&mut self, progress: BatchProgress) {
        if let Some(callback) = &self.0 {
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from(progress.percent())) {
                web_sys::console::warn_2(&"progress callback failed".into(), &e);
            }
        }
    }
}

/// Stops a running call between pages or files.
///
/// Pass the same handle to a call and keep it to cancel later, e.g. from the
/// progress callback or a button. `reset` makes it reusable.
#[wasm_bindgen]
#[derive(Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

#[wasm_bindgen]
impl CancelHandle {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    #[wasm_bindgen]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[wasm_bindgen(getter, js_name = isCancelled)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[wasm_bindgen]
    pub fn reset(&self) {
        self.token.reset();
    }
}

fn token_of(cancel: Option<&CancelHandle>) -> CancellationToken {
    cancel.map_or_else(CancellationToken::new, |handle| handle.token.clone())
}

/// Run `work` as a promise; `None` resolves to `null`.
fn spawn<F>(work: F) -> Promise
where
    F: Future<Output = Result<Option<JsValue>, JsValue>> + 'static,
{
    future_to_promise(async move { Ok(work.await?.unwrap_or(JsValue::NULL)) })
}

fn bytes_of(values: &Array) -> Vec<Vec<u8>> {
    values.iter().map(|v| Uint8Array::new(&v).to_vec()).collect()
}

/// `{ filename, data }` with `data` as a `Uint8Array`.
fn named_file(filename: &str, data: &[u8]) -> Result<JsValue, JsValue> {
    let file = Object::new();
    Reflect::set(&file, &"filename".into(), &filename.into())?;
    Reflect::set(&file, &"data".into(), &Uint8Array::from(data))?;
    Ok(file.into())
}

/// Parse a range expression into `[{ start, end }]`, 1-indexed and inclusive.
#[wasm_bindgen]
pub fn parse_ranges(input: &str, max_pages: u32) -> Result<JsValue, JsValue> {
    let ranges = parse_range_set(input, max_pages);
    serde_wasm_bindgen::to_value(&ranges).map_err(js_error)
}

/// Number of pages in a PDF.
#[wasm_bindgen]
pub fn page_count(data: &[u8]) -> Result<usize, JsValue> {
    let library = LopdfLibrary::new();
    let doc = library.load(data).map_err(js_error)?;
    Ok(library.page_count(&doc))
}

fn split_mode(mode: &str, ranges: &str, chunk_size: u32, total_pages: u32) -> Result<SplitMode, JsValue> {
    let kind: SplitKind = mode.parse().map_err(js_error)?;
    Ok(match kind {
        SplitKind::Ranges => SplitMode::Ranges {
            ranges: parse_range_set(ranges, total_pages),
        },
        SplitKind::Burst => SplitMode::Burst,
        SplitKind::Fixed => SplitMode::Fixed { chunk_size },
    })
}

/// Build the list of files a split would produce.
///
/// `mode` is `"ranges"`, `"burst"` or `"fixed"`; `ranges` is only read in
/// ranges mode and `chunk_size` only in fixed mode.
#[wasm_bindgen]
pub fn build_split_plan(
    mode: &str,
    ranges: &str,
    chunk_size: u32,
    total_pages: u32,
    prefix: &str,
) -> Result<JsValue, JsValue> {
    let plan = split_mode(mode, ranges, chunk_size, total_pages)?.plan(total_pages, prefix);
    serde_wasm_bindgen::to_value(&plan).map_err(js_error)
}

/// Split `data` by a plan from [`build_split_plan`].
///
/// Resolves to `[{ filename, data }]` in plan order. Plans naming pages past
/// the end of the document are rejected.
#[wasm_bindgen]
pub fn split_pdf(
    data: Vec<u8>,
    plan: JsValue,
    on_progress: Option<Function>,
    cancel: Option<&CancelHandle>,
) -> Promise {
    let token = token_of(cancel);
    spawn(async move {
        let plan: Vec<OutputSpec> = serde_wasm_bindgen::from_value(plan)?;
        if plan.is_empty() {
            return Err(JsValue::from_str("No valid page ranges specified"));
        }

        let library = LopdfLibrary::new();
        let outcome = flow::split_document(&library, &data, &plan, &mut JsProgress(on_progress), &token)
            .await
            .map_err(js_error)?;

        let Some(outputs) = outcome.into_completed() else {
            return Ok(None);
        };
        let files = Array::new();
        for output in outputs {
            files.push(&named_file(&output.filename, &output.data)?);
        }
        Ok(Some(files.into()))
    })
}

/// Merge an array of PDFs, in array order. Resolves to a `Uint8Array`.
#[wasm_bindgen]
pub fn merge_pdfs(files: Array, on_progress: Option<Function>, cancel: Option<&CancelHandle>) -> Promise {
    let token = token_of(cancel);
    let sources = bytes_of(&files);
    spawn(async move {
        if sources.len() < 2 {
            return Err(JsValue::from_str("Please add at least 2 PDF files to merge"));
        }

        let library = LopdfLibrary::new();
        let merged = flow::merge_documents(&library, &sources, &mut JsProgress(on_progress), &token)
            .await
            .map_err(js_error)?;
        Ok(merged.map(|bytes| Uint8Array::from(bytes.as_slice()).into()))
    })
}

/// Rebuild `data` following a plan from [`Arrangement::save_plan`].
#[wasm_bindgen]
pub fn organize_pdf(
    data: Vec<u8>,
    plan: JsValue,
    on_progress: Option<Function>,
    cancel: Option<&CancelHandle>,
) -> Promise {
    let token = token_of(cancel);
    spawn(async move {
        let plan: SavePlan = serde_wasm_bindgen::from_value(plan)?;

        let library = LopdfLibrary::new();
        let organized = flow::organize_document(&library, &data, &plan, &mut JsProgress(on_progress), &token)
            .await
            .map_err(js_error)?;
        Ok(organized.map(|bytes| Uint8Array::from(bytes.as_slice()).into()))
    })
}

/// Render the pages named by `ranges` and pack them into a ZIP archive.
///
/// `format` is a file extension (`"png"`, `"jpg"`, `"webp"`). Each page is
/// rendered once even if the ranges repeat it.
#[wasm_bindgen]
pub fn pdf_to_images(
    data: Vec<u8>,
    ranges: String,
    format: String,
    width: u32,
    quality: u8,
    on_progress: Option<Function>,
    cancel: Option<&CancelHandle>,
) -> Promise {
    let token = token_of(cancel);
    spawn(async move {
        let format = ImageFormat::from_extension(&format)
            .ok_or_else(|| JsValue::from_str(&format!("Unsupported image format: {format}")))?;
        let total = page_count(&data)? as u32;

        let mut pages: Vec<u32> = Vec::new();
        for interval in parse_range_set(&ranges, total).iter() {
            for page in interval.pages() {
                if !pages.contains(&page) {
                    pages.push(page);
                }
            }
        }
        if pages.is_empty() {
            return Err(JsValue::from_str("No valid page ranges specified"));
        }

        let outcome = flow::render_pages(
            &PageRasterizer::new(),
            &data,
            &pages,
            RenderOptions::new(width, format, quality),
            &mut JsProgress(on_progress),
            &token,
        )
        .await
        .map_err(js_error)?;

        let Some(rendered) = outcome.into_completed() else {
            return Ok(None);
        };
        let archive = flow::bundle_images(&rendered).map_err(js_error)?;
        Ok(Some(Uint8Array::from(archive.as_slice()).into()))
    })
}

/// Build a PDF with one page per image, in array order.
#[wasm_bindgen]
pub fn images_to_pdf(
    images: Array,
    quality: u8,
    on_progress: Option<Function>,
    cancel: Option<&CancelHandle>,
) -> Promise {
    let token = token_of(cancel);
    let sources = bytes_of(&images);
    spawn(async move {
        if sources.is_empty() {
            return Err(JsValue::from_str("No images selected"));
        }

        let library = LopdfLibrary::new();
        let pdf = flow::images_to_pdf(&library, &sources, quality, &mut JsProgress(on_progress), &token)
            .await
            .map_err(js_error)?;
        Ok(pdf.map(|bytes| Uint8Array::from(bytes.as_slice()).into()))
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryView {
    id: f64,
    position: u32,
    source_page: u32,
    rotation: u16,
    selected: bool,
    thumbnail_ready: bool,
}

/// Ids cross into JS as numbers; every id fits well inside the exact range
/// of an `f64`.
fn page_id(id: f64) -> PageId {
    PageId::from(id as u64)
}

/// Page arrangement of one open document.
///
/// Ids are plain numbers; they stay valid until the next `load` or `clear`.
#[wasm_bindgen]
pub struct Arrangement {
    inner: Rc<Mutex<PageArrangement>>,
}

impl Arrangement {
    fn lock(&self) -> MutexGuard<'_, PageArrangement> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[wasm_bindgen]
impl Arrangement {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Mutex::new(PageArrangement::new())),
        }
    }

    /// Replace the entries with pages `1..=total_pages` in order.
    #[wasm_bindgen]
    pub fn load(&self, total_pages: usize) {
        self.lock().load(total_pages);
    }

    /// Drop every entry and release its thumbnail.
    #[wasm_bindgen]
    pub fn clear(&self) {
        self.lock().clear();
    }

    #[wasm_bindgen(getter)]
    pub fn length(&self) -> usize {
        self.lock().len()
    }

    #[wasm_bindgen(getter, js_name = selectedCount)]
    pub fn selected_count(&self) -> usize {
        self.lock().selected_count()
    }

    /// `[{ id, position, sourcePage, rotation, selected, thumbnailReady }]`
    /// in display order.
    #[wasm_bindgen]
    pub fn entries(&self) -> Result<JsValue, JsValue> {
        let view: Vec<EntryView> = self
            .lock()
            .entries()
            .iter()
            .map(|e| EntryView {
                id: e.id().as_u64() as f64,
                position: e.display_position(),
                source_page: e.source_page_number(),
                rotation: e.rotation().degrees(),
                selected: e.is_selected(),
                thumbnail_ready: !e.thumbnail().is_pending(),
            })
            .collect();
        serde_wasm_bindgen::to_value(&view).map_err(js_error)
    }

    /// Encoded thumbnail of an entry, once rendered.
    #[wasm_bindgen]
    pub fn thumbnail(&self, id: f64) -> Option<Uint8Array> {
        let guard = self.lock();
        let entry = guard.entry(page_id(id))?;
        entry.thumbnail().thumbnail().map(|t| Uint8Array::from(t.data()))
    }

    /// Render a PNG thumbnail `width` pixels wide for every entry of the PDF
    /// in `data`. Resolves to the number of thumbnails applied; renders
    /// overtaken by a later call or a `load` are dropped.
    #[wasm_bindgen(js_name = renderThumbnails)]
    pub fn render_thumbnails(&self, data: Vec<u8>, width: u32) -> Promise {
        let inner = Rc::clone(&self.inner);
        spawn(async move {
            let options = RenderOptions::new(width, ImageFormat::Png, 80);
            let applied = pagecraft_core::render_thumbnails(&inner, &PageRasterizer::new(), &data, options).await;
            Ok(Some(JsValue::from(applied as u32)))
        })
    }

    #[wasm_bindgen]
    pub fn toggle(&self, id: f64) {
        self.lock().toggle_selection(page_id(id));
    }

    #[wasm_bindgen(js_name = selectAll)]
    pub fn select_all(&self) {
        self.lock().select_all();
    }

    #[wasm_bindgen(js_name = deselectAll)]
    pub fn deselect_all(&self) {
        self.lock().deselect_all();
    }

    /// Rotate the selected pages a quarter turn.
    #[wasm_bindgen]
    pub fn rotate(&self, clockwise: bool) {
        let direction = if clockwise {
            RotateDirection::Clockwise
        } else {
            RotateDirection::CounterClockwise
        };
        self.lock().rotate_selected(direction);
    }

    /// Delete the selected pages; returns how many were removed.
    #[wasm_bindgen(js_name = deleteSelected)]
    pub fn delete_selected(&self) -> usize {
        self.lock().delete_selected()
    }

    /// Put the named entries first, in the given order.
    #[wasm_bindgen]
    pub fn reorder(&self, ids: Vec<f64>) {
        let ids: Vec<PageId> = ids.into_iter().map(page_id).collect();
        self.lock().reorder(&ids);
    }

    #[wasm_bindgen(js_name = movePage)]
    pub fn move_page(&self, id: f64, to_index: usize) -> bool {
        self.lock().move_entry(page_id(id), to_index)
    }

    /// Plan for [`organize_pdf`].
    #[wasm_bindgen(js_name = savePlan)]
    pub fn save_plan(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.lock().save_plan()).map_err(js_error)
    }
}

impl Default for Arrangement {
    fn default() -> Self {
        Self::new()
    }
}
