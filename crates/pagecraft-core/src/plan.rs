//! Output plans for splitting a document.
//!
//! A plan is the ordered list of files a split produces. Each selection mode
//! decides which page intervals to cut and how each output file is named.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::range::{PageInterval, RangeSet};

/// One output file of a split: its name and the pages it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// File name, derived from the prefix and the interval bounds.
    pub filename: String,
    /// Pages copied into the file.
    pub pages: PageInterval,
}

/// Strategy that selects page intervals from a document.
pub trait SelectionMode {
    /// Intervals to produce, in output order.
    fn intervals(&self, total_pages: u32) -> Vec<PageInterval>;

    /// File name for one interval.
    fn filename(&self, prefix: &str, interval: &PageInterval) -> String {
        format!("{}_p{}-p{}.pdf", prefix, interval.start(), interval.end())
    }
}

/// One output per interval of a user-supplied range set.
#[derive(Debug, Clone)]
pub struct ExplicitRanges {
    ranges: RangeSet,
}

impl ExplicitRanges {
    pub fn new(ranges: RangeSet) -> Self {
        Self { ranges }
    }
}

impl SelectionMode for ExplicitRanges {
    fn intervals(&self, total_pages: u32) -> Vec<PageInterval> {
        self.ranges
            .iter()
            .filter(|i| i.end() <= total_pages)
            .copied()
            .collect()
    }
}

/// One output per page.
#[derive(Debug, Clone, Copy, Default)]
pub struct Burst;

impl SelectionMode for Burst {
    fn intervals(&self, total_pages: u32) -> Vec<PageInterval> {
        (1..=total_pages)
            .filter_map(|page| PageInterval::single(page, total_pages))
            .collect()
    }

    fn filename(&self, prefix: &str, interval: &PageInterval) -> String {
        format!("{}_p{}.pdf", prefix, interval.start())
    }
}

/// Consecutive chunks of a fixed number of pages; the last chunk may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct FixedSize {
    chunk_size: u32,
}

impl FixedSize {
    /// Chunk sizes below one are clamped to one.
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }
}

impl SelectionMode for FixedSize {
    fn intervals(&self, total_pages: u32) -> Vec<PageInterval> {
        let mut intervals = Vec::new();
        let mut start = 1u32;
        while start <= total_pages {
            let end = start.saturating_add(self.chunk_size - 1).min(total_pages);
            if let Some(interval) = PageInterval::new(start, end, total_pages) {
                intervals.push(interval);
            }
            start = match end.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        intervals
    }
}

/// Split mode as selected by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitMode {
    /// Explicit range expression.
    Ranges { ranges: RangeSet },
    /// One file per page.
    Burst,
    /// Fixed-size chunks.
    Fixed { chunk_size: u32 },
}

impl SplitMode {
    fn selection(&self) -> Box<dyn SelectionMode + '_> {
        match self {
            SplitMode::Ranges { ranges } => Box::new(ExplicitRanges::new(ranges.clone())),
            SplitMode::Burst => Box::new(Burst),
            SplitMode::Fixed { chunk_size } => Box::new(FixedSize::new(*chunk_size)),
        }
    }

    /// Build the output plan for this mode.
    pub fn plan(&self, total_pages: u32, prefix: &str) -> Vec<OutputSpec> {
        build_plan(self.selection().as_ref(), total_pages, prefix)
    }

    pub fn kind(&self) -> SplitKind {
        match self {
            SplitMode::Ranges { .. } => SplitKind::Ranges,
            SplitMode::Burst => SplitKind::Burst,
            SplitMode::Fixed { .. } => SplitKind::Fixed,
        }
    }
}

/// A split mode without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    #[default]
    Ranges,
    Burst,
    Fixed,
}

impl std::str::FromStr for SplitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ranges" | "range" => Ok(SplitKind::Ranges),
            "burst" => Ok(SplitKind::Burst),
            "fixed" => Ok(SplitKind::Fixed),
            other => Err(format!("unknown split mode: {other}")),
        }
    }
}

/// Build the ordered list of output files for a selection mode.
///
/// An empty result means there is nothing to do; it is not an error.
pub fn build_plan(mode: &dyn SelectionMode, total_pages: u32, prefix: &str) -> Vec<OutputSpec> {
    let plan: Vec<OutputSpec> = mode
        .intervals(total_pages)
        .into_iter()
        .map(|pages| OutputSpec {
            filename: mode.filename(prefix, &pages),
            pages,
        })
        .collect();

    debug!("Built plan with {} outputs for {} pages", plan.len(), total_pages);
    plan
}
