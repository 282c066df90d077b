//! A segment of the list and its single-flight load.
//!
//! Loading is split in two halves so the directory never holds its lock across
//! an await: [`Chunk::load`] hands out a shared future (starting the fetch only
//! when none is in flight), and [`Chunk::finish_load`] applies the outcome once
//! it resolves. Every started fetch carries a ticket; an outcome whose ticket no
//! longer matches the in-flight one (because the segment was unloaded meanwhile)
//! is ignored.

use crate::client::data_row::DataRow;
use crate::client::document::Surface;
use crate::client::geometry::Span;
use crate::source::ChunkSource;
use crate::telemetry::PerfGuard;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("segment {index} failed to load: {reason}")]
    Source { index: usize, reason: String },
    #[error("segment {index} does not exist")]
    OutOfRange { index: usize },
    #[error("segment {index} was unloaded before its load settled")]
    Evicted { index: usize },
}

pub type LoadOutcome = Result<Arc<[String]>, LoadError>;
pub type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Empty,
    Loading { ticket: u64, future: SharedLoad },
    Loaded,
}

/// Result of asking a segment to load.
pub enum LoadStep {
    Ready,
    Pending(PendingLoad),
}

pub struct PendingLoad {
    pub index: usize,
    pub ticket: u64,
    pub future: SharedLoad,
}

pub struct Chunk {
    index: usize,
    state: LoadState,
    rows: Vec<DataRow>,
    next_ticket: u64,
}

impl Chunk {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: LoadState::Empty,
            rows: Vec::new(),
            next_ticket: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading { .. })
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [DataRow] {
        &mut self.rows
    }

    /// Starts the fetch if the segment is empty, otherwise joins the fetch in
    /// flight. A loaded segment needs no fetch at all.
    pub fn load(&mut self, source: &Arc<dyn ChunkSource>) -> LoadStep {
        match &self.state {
            LoadState::Loaded => LoadStep::Ready,
            LoadState::Loading { ticket, future } => LoadStep::Pending(PendingLoad {
                index: self.index,
                ticket: *ticket,
                future: future.clone(),
            }),
            LoadState::Empty => {
                self.next_ticket += 1;
                let ticket = self.next_ticket;
                let future = fetch(self.index, Arc::clone(source));
                debug!(target = "pager::chunk", index = self.index, ticket, "segment load started");
                self.state = LoadState::Loading {
                    ticket,
                    future: future.clone(),
                };
                LoadStep::Pending(PendingLoad {
                    index: self.index,
                    ticket,
                    future,
                })
            }
        }
    }

    /// Applies a resolved load. Returns whether the outcome was applied.
    pub fn finish_load(&mut self, ticket: u64, outcome: &LoadOutcome, surface: &mut dyn Surface) -> bool {
        match &self.state {
            LoadState::Loading { ticket: current, .. } if *current == ticket => {}
            _ => return false,
        }
        match outcome {
            Ok(records) => {
                self.rows = records
                    .iter()
                    .enumerate()
                    .map(|(idx, text)| DataRow::attach(idx, text, self.index, surface))
                    .collect();
                surface.set_segment_extent(self.index, None);
                self.state = LoadState::Loaded;
                debug!(
                    target = "pager::chunk",
                    index = self.index,
                    records = self.rows.len(),
                    "segment loaded"
                );
            }
            Err(err) => {
                self.state = LoadState::Empty;
                warn!(target = "pager::chunk", index = self.index, error = %err, "segment load failed");
            }
        }
        true
    }

    /// Drops every record and returns the segment to a placeholder of
    /// `placeholder_extent`.
    pub fn unload(&mut self, surface: &mut dyn Surface, placeholder_extent: u64) {
        for row in &mut self.rows {
            row.remove(surface);
        }
        self.rows.clear();
        self.state = LoadState::Empty;
        surface.set_segment_extent(self.index, Some(placeholder_extent));
    }

    pub fn position(&self, surface: &dyn Surface) -> Span {
        surface.segment_span(self.index)
    }

    pub fn height(&self, surface: &dyn Surface) -> u64 {
        self.position(surface).extent()
    }

    /// Assigns the placeholder extent. Ignored while loaded.
    pub fn set_height(&self, height: u64, surface: &mut dyn Surface) -> bool {
        if self.is_loaded() {
            return false;
        }
        surface.set_segment_extent(self.index, Some(height));
        true
    }

    /// Index of the row whose range contains `position`.
    pub fn get_by_position(&self, position: u64, surface: &dyn Surface) -> Option<usize> {
        self.rows.iter().position(|row| {
            row.position(surface)
                .is_some_and(|span| span.contains(position))
        })
    }
}

fn fetch(index: usize, source: Arc<dyn ChunkSource>) -> SharedLoad {
    async move {
        let _perf = PerfGuard::new("segment_load");
        source
            .fetch_segment(index)
            .await
            .map(Arc::<[String]>::from)
            .map_err(|err| LoadError::Source {
                index,
                reason: err.to_string(),
            })
    }
    .boxed()
    .shared()
}
