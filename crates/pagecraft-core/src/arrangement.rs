//! Live page arrangement for the single-document editor.
//!
//! The arrangement holds one entry per page of the open document: its place
//! in the current order, the source page it came from, a rotation delta, a
//! selection flag and an owned thumbnail. Operations replace the entry list
//! with a freshly computed one, so positions are always contiguous `1..=N`.
//!
//! Thumbnails are rendered concurrently. Every render request carries the
//! generation it was issued under; a result whose generation no longer
//! matches its entry is stale and is dropped instead of applied.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::render::{RasterEngine, RenderOptions};

/// Opaque, stable identifier of an arrangement entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(u64);

impl PageId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

/// Clockwise rotation applied on top of the source page's own rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Normalize any multiple of 90 into `0..360`; other values are rejected.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Rotate by one quarter turn in `direction`.
    pub fn turned(self, direction: RotateDirection) -> Self {
        let degrees = ((self.degrees() as i32 + direction.delta()) % 360 + 360) % 360;
        Self::from_degrees(degrees).unwrap_or_default()
    }

    pub fn is_zero(self) -> bool {
        self == Rotation::Deg0
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Rotation::from_degrees(value as i32).ok_or_else(|| format!("invalid rotation: {value}"))
    }
}

/// Quarter-turn direction for [`PageArrangement::rotate_selected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDirection {
    /// +90 degrees.
    Clockwise,
    /// -90 degrees.
    CounterClockwise,
}

impl RotateDirection {
    pub fn delta(self) -> i32 {
        match self {
            RotateDirection::Clockwise => 90,
            RotateDirection::CounterClockwise => -90,
        }
    }

    /// Map a `+90`/`-90` delta to a direction.
    pub fn from_delta(delta: i32) -> Option<Self> {
        match delta {
            90 => Some(RotateDirection::Clockwise),
            -90 => Some(RotateDirection::CounterClockwise),
            _ => None,
        }
    }
}

/// Counts thumbnails handed out and given back by an arrangement.
#[derive(Debug, Default)]
pub struct ThumbnailLedger {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ThumbnailLedger {
    /// Thumbnails currently alive.
    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// A rendered page thumbnail owned by an arrangement entry.
///
/// The underlying resource is released when the thumbnail is dropped.
pub struct Thumbnail {
    data: Vec<u8>,
    width: u32,
    ledger: Arc<ThumbnailLedger>,
}

impl Thumbnail {
    fn acquire(data: Vec<u8>, width: u32, ledger: &Arc<ThumbnailLedger>) -> Self {
        ledger.acquired.fetch_add(1, Ordering::SeqCst);
        Self {
            data,
            width,
            ledger: Arc::clone(ledger),
        }
    }

    /// Encoded image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Width the thumbnail was requested at.
    pub fn width(&self) -> u32 {
        self.width
    }
}

impl Drop for Thumbnail {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .finish()
    }
}

/// Thumbnail slot of an entry.
#[derive(Debug, Default)]
pub enum ThumbnailState {
    /// Not rendered yet, or a render is in flight.
    #[default]
    Pending,
    /// Rendered and owned by the entry.
    Ready(Thumbnail),
}

impl ThumbnailState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ThumbnailState::Pending)
    }

    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        match self {
            ThumbnailState::Ready(t) => Some(t),
            ThumbnailState::Pending => None,
        }
    }
}

/// Editing state of one page.
#[derive(Debug)]
pub struct PageEntry {
    id: PageId,
    display_position: u32,
    original_index: usize,
    rotation: Rotation,
    selected: bool,
    thumbnail: ThumbnailState,
    render_generation: u64,
}

impl PageEntry {
    pub fn id(&self) -> PageId {
        self.id
    }

    /// 1-indexed place in the current order.
    pub fn display_position(&self) -> u32 {
        self.display_position
    }

    /// 0-indexed page of the source document.
    pub fn original_index(&self) -> usize {
        self.original_index
    }

    /// 1-indexed page number of the source document.
    pub fn source_page_number(&self) -> u32 {
        self.original_index as u32 + 1
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn thumbnail(&self) -> &ThumbnailState {
        &self.thumbnail
    }
}

/// A thumbnail render issued by [`PageArrangement::request_thumbnails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    /// Entry the result belongs to.
    pub id: PageId,
    /// 1-indexed source page to render.
    pub page_number: u32,
    /// Target width in pixels.
    pub width: u32,
    generation: u64,
}

impl RenderRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything needed to write the arranged document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePlan {
    /// 0-indexed source pages in output order.
    pub page_order: Vec<usize>,
    /// Non-zero rotation deltas keyed by 0-indexed source page.
    pub rotations: BTreeMap<usize, Rotation>,
}

/// Reorderable, rotatable, selectable page list of one open document.
#[derive(Debug)]
pub struct PageArrangement {
    entries: Vec<PageEntry>,
    next_id: u64,
    generation: u64,
    ledger: Arc<ThumbnailLedger>,
}

impl PageArrangement {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            generation: 0,
            ledger: Arc::new(ThumbnailLedger::default()),
        }
    }

    /// Replace all entries with `total_pages` fresh ones.
    pub fn load(&mut self, total_pages: usize) {
        self.clear();
        let first_id = self.next_id;
        self.next_id += total_pages as u64;
        self.entries = (0..total_pages)
            .map(|index| PageEntry {
                id: PageId(first_id + index as u64),
                display_position: index as u32 + 1,
                original_index: index,
                rotation: Rotation::Deg0,
                selected: false,
                thumbnail: ThumbnailState::Pending,
                render_generation: 0,
            })
            .collect();
        debug!("Arrangement loaded with {} pages", total_pages);
    }

    /// Drop every entry and release its thumbnail.
    pub fn clear(&mut self) {
        let old = std::mem::take(&mut self.entries);
        let released = release_all(old);
        if released > 0 {
            debug!("Released {} thumbnails on clear", released);
        }
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[PageEntry] {
        &self.entries
    }

    pub fn entry(&self, id: PageId) -> Option<&PageEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.selected).count()
    }

    pub fn selected_ids(&self) -> Vec<PageId> {
        self.entries.iter().filter(|e| e.selected).map(|e| e.id).collect()
    }

    /// Thumbnail accounting shared with every thumbnail this arrangement owns.
    pub fn ledger(&self) -> &Arc<ThumbnailLedger> {
        &self.ledger
    }

    /// Put entries in the order given by `ids`.
    ///
    /// Unknown ids are ignored and repeated ids count once. Entries missing
    /// from `ids` follow the named ones in their current relative order.
    pub fn reorder(&mut self, ids: &[PageId]) {
        let mut remaining: Vec<Option<PageEntry>> =
            std::mem::take(&mut self.entries).into_iter().map(Some).collect();
        let slots: HashMap<PageId, usize> = remaining
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (e.id, i)))
            .collect();

        let mut ordered = Vec::with_capacity(remaining.len());
        for id in ids {
            if let Some(entry) = slots.get(id).and_then(|&slot| remaining[slot].take()) {
                ordered.push(entry);
            }
        }
        ordered.extend(remaining.into_iter().flatten());

        self.entries = renumber(ordered);
    }

    /// Move one entry to a 0-indexed slot, shifting the entries in between.
    pub fn move_entry(&mut self, id: PageId, to_index: usize) -> bool {
        let Some(from) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let mut ordered = std::mem::take(&mut self.entries);
        let entry = ordered.remove(from);
        ordered.insert(to_index.min(ordered.len()), entry);
        self.entries = renumber(ordered);
        true
    }

    pub fn toggle_selection(&mut self, id: PageId) {
        self.map_entries(|mut e| {
            if e.id == id {
                e.selected = !e.selected;
            }
            e
        });
    }

    pub fn select_all(&mut self) {
        self.map_entries(|mut e| {
            e.selected = true;
            e
        });
    }

    pub fn deselect_all(&mut self) {
        self.map_entries(|mut e| {
            e.selected = false;
            e
        });
    }

    /// Rotate every selected entry by a quarter turn.
    pub fn rotate_selected(&mut self, direction: RotateDirection) {
        self.map_entries(|mut e| {
            if e.selected {
                e.rotation = e.rotation.turned(direction);
            }
            e
        });
    }

    /// Remove selected entries and renumber the survivors.
    pub fn delete_selected(&mut self) -> usize {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.selected);
        let count = removed.len();
        let released = release_all(removed);
        self.entries = renumber(kept);
        debug!("Deleted {} pages, released {} thumbnails", count, released);
        count
    }

    /// Release every thumbnail, mark all entries pending and issue one render
    /// request per entry under a new generation.
    pub fn request_thumbnails(&mut self, width: u32) -> Vec<RenderRequest> {
        self.generation += 1;
        let generation = self.generation;

        let mut released = 0;
        self.map_entries(|mut e| {
            if let ThumbnailState::Ready(old) = std::mem::take(&mut e.thumbnail) {
                drop(old);
                released += 1;
            }
            e.render_generation = generation;
            e
        });
        debug!(
            "Requested {} thumbnails at width {} (generation {}, released {})",
            self.entries.len(),
            width,
            generation,
            released
        );

        self.entries
            .iter()
            .map(|e| RenderRequest {
                id: e.id,
                page_number: e.source_page_number(),
                width,
                generation,
            })
            .collect()
    }

    /// Apply a finished render. Returns `false` when the result is stale or
    /// its entry is gone; the data is dropped in that case.
    pub fn apply_thumbnail(&mut self, request: &RenderRequest, data: Vec<u8>) -> bool {
        let ledger = Arc::clone(&self.ledger);
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == request.id) else {
            debug!("Discarding thumbnail for removed {}", request.id);
            return false;
        };
        if entry.render_generation != request.generation {
            debug!(
                "Discarding stale thumbnail for {} (generation {} != {})",
                request.id, request.generation, entry.render_generation
            );
            return false;
        }
        entry.thumbnail = ThumbnailState::Ready(Thumbnail::acquire(data, request.width, &ledger));
        true
    }

    /// Source page order and rotation deltas for writing the document.
    pub fn save_plan(&self) -> SavePlan {
        SavePlan {
            page_order: self.entries.iter().map(|e| e.original_index).collect(),
            rotations: self
                .entries
                .iter()
                .filter(|e| !e.rotation.is_zero())
                .map(|e| (e.original_index, e.rotation))
                .collect(),
        }
    }

    fn map_entries(&mut self, f: impl FnMut(PageEntry) -> PageEntry) {
        self.entries = std::mem::take(&mut self.entries).into_iter().map(f).collect();
    }
}

impl Default for PageArrangement {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageArrangement {
    fn drop(&mut self) {
        self.clear();
    }
}

fn renumber(entries: Vec<PageEntry>) -> Vec<PageEntry> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, mut e)| {
            e.display_position = i as u32 + 1;
            e
        })
        .collect()
}

fn release_all(entries: Vec<PageEntry>) -> usize {
    entries
        .into_iter()
        .filter_map(|e| match e.thumbnail {
            ThumbnailState::Ready(t) => Some(t),
            ThumbnailState::Pending => None,
        })
        .map(drop)
        .count()
}

/// Render thumbnails for every entry of a shared arrangement at `options.width`.
///
/// Requests run concurrently and results are applied as they complete, in
/// any order. The lock is only held while issuing requests and while
/// applying a single result, so the arrangement stays editable throughout.
/// Returns the number of thumbnails applied.
pub async fn render_thumbnails<R: RasterEngine>(
    arrangement: &Mutex<PageArrangement>,
    engine: &R,
    source: &[u8],
    options: RenderOptions,
) -> usize {
    let requests = arrangement
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .request_thumbnails(options.width);
    let total = requests.len();

    let mut in_flight: FuturesUnordered<_> = requests
        .into_iter()
        .map(|request| async move {
            let result = engine.render_page(source, request.page_number, options).await;
            (request, result)
        })
        .collect();

    let mut applied = 0;
    while let Some((request, result)) = in_flight.next().await {
        match result {
            Ok(data) => {
                let mut guard = arrangement.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.apply_thumbnail(&request, data) {
                    applied += 1;
                }
            }
            Err(e) => warn!("Thumbnail for page {} failed: {}", request.page_number, e),
        }
    }

    debug!("Applied {} of {} thumbnails", applied, total);
    applied
}
