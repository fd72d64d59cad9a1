//! Batch execution pipeline.
//!
//! Runs a sequence of work units one after another, in input order, through a
//! [`UnitProcessor`]. Progress is reported after every finished unit, a shared
//! [`CancellationToken`] is checked between units, and the first failing unit
//! aborts the whole run: outputs produced so far are dropped and the unit's
//! own error is returned unchanged.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Units completed out of the units in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// Completion rounded to the nearest percent; exactly 100 once every unit
    /// is done.
    pub fn percent(&self) -> u8 {
        if self.total == 0 || self.completed >= self.total {
            return 100;
        }
        // Integer rounding, half up.
        ((self.completed * 200 + self.total) / (self.total * 2)) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Receives progress updates from a run.
pub trait ProgressSink {
    fn report(&mut self, progress: BatchProgress);
}

impl<F: FnMut(BatchProgress)> ProgressSink for F {
    fn report(&mut self, progress: BatchProgress) {
        self(progress)
    }
}

/// Progress sink that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: BatchProgress) {}
}

/// Shared, cooperative cancellation flag.
///
/// Clones share the same flag. The pipeline only looks at it between units,
/// so a unit that has started always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can drive another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Terminal state of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome<T> {
    /// Every unit finished; outputs are in input order.
    Completed(Vec<T>),
    /// The run was cancelled between units.
    Cancelled,
}

impl<T> BatchOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchOutcome::Cancelled)
    }

    /// Outputs of a completed run.
    pub fn into_completed(self) -> Option<Vec<T>> {
        match self {
            BatchOutcome::Completed(outputs) => Some(outputs),
            BatchOutcome::Cancelled => None,
        }
    }
}

/// The per-unit operation of a run.
///
/// A processor may keep state across units, e.g. a merged document that every
/// unit appends to.
pub trait UnitProcessor<I> {
    type Output;
    type Error: std::fmt::Display;

    /// Process the unit at `index`.
    fn process(
        &mut self,
        item: &I,
        index: usize,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>>;
}

/// Run `items` through `processor` strictly in order.
///
/// Each unit is awaited before progress is reported and before the next unit
/// starts. Returns [`BatchOutcome::Cancelled`] if `cancel` is set before any
/// unit starts; the first unit error aborts the run.
pub async fn run<I, P, S>(
    items: &[I],
    processor: &mut P,
    progress: &mut S,
    cancel: &CancellationToken,
) -> Result<BatchOutcome<P::Output>, P::Error>
where
    P: UnitProcessor<I>,
    S: ProgressSink + ?Sized,
{
    let total = items.len();
    info!("Starting batch run of {} units", total);

    let mut outputs = Vec::with_capacity(total);
    for (index, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Batch cancelled after {} of {} units", index, total);
            return Ok(BatchOutcome::Cancelled);
        }

        match processor.process(item, index).await {
            Ok(output) => outputs.push(output),
            Err(e) => {
                warn!("Unit {} of {} failed, aborting batch: {}", index + 1, total, e);
                return Err(e);
            }
        }

        let update = BatchProgress::new(index + 1, total);
        debug!("Unit {}/{} done ({}%)", index + 1, total, update.percent());
        progress.report(update);
    }

    info!("Batch run of {} units completed", total);
    Ok(BatchOutcome::Completed(outputs))
}
