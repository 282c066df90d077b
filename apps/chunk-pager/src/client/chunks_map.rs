//! Directory of all segments plus the current selection.
//!
//! All state sits behind one mutex that is only ever taken for synchronous
//! bookkeeping. Loads are awaited with the lock released and applied once they
//! resolve, so any number of navigation tasks can be in flight while input and
//! rendering continue.

use crate::client::busy::BusyIndicator;
use crate::client::chunk::{Chunk, LoadError, LoadOutcome, LoadStep};
use crate::client::data_row::LEADING_OFFSET;
use crate::client::document::{RowView, Surface};
use crate::client::geometry::{GeometrySnapshot, Span, shifted};
use crate::client::keys::NavKey;
use crate::client::viewport::Viewport;
use crate::source::ChunkSource;
use crate::telemetry;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// How often a load is re-issued when its segment is evicted before the
/// caller gets to use it.
const LOAD_ATTEMPTS: usize = 3;

#[derive(Clone, Copy, Debug)]
pub struct MapOptions {
    pub segment_count: usize,
    pub placeholder_extent: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Selection {
    pub chunk: usize,
    pub row: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("no record found for position {position} after visiting {hops} segments")]
    SearchExhausted { position: u64, hops: usize },
    #[error("segment {chunk} covers position {position} but no record does")]
    Geometry { chunk: usize, position: u64 },
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("no segments configured")]
    NoSegments,
    #[error("failed to load the first segment: {0}")]
    RootLoad(#[source] LoadError),
}

enum Landing {
    Found,
    Before(u64),
    After(u64),
    Hole(u64),
}

enum NextMove {
    Edge(usize, SearchDirection),
    Done,
}

struct MapState {
    chunks: Vec<Chunk>,
    surface: Box<dyn Surface>,
    selection: Option<Selection>,
    placeholder_extent: u64,
}

impl MapState {
    fn sync_extent(&self, viewport: &Viewport) {
        viewport.set_document_extent(self.surface.total_extent());
    }

    fn chunk_at(&self, position: u64) -> Option<usize> {
        let surface = self.surface.as_ref();
        let index = self
            .chunks
            .partition_point(|chunk| chunk.position(surface).end <= position);
        let chunk = self.chunks.get(index)?;
        chunk.position(surface).contains(position).then_some(index)
    }

    fn row_span(&self, selection: Selection) -> Option<Span> {
        self.chunks
            .get(selection.chunk)?
            .rows()
            .get(selection.row)?
            .position(self.surface.as_ref())
    }

    fn apply_load(&mut self, index: usize, ticket: u64, outcome: &LoadOutcome, viewport: &Viewport) {
        let MapState {
            chunks, surface, ..
        } = self;
        if chunks[index].finish_load(ticket, outcome, surface.as_mut()) {
            self.sync_extent(viewport);
        }
    }

    /// Moves the selection to `target`, keeping the record at the same
    /// on-screen offset if eviction reflowed the document.
    fn select(&mut self, target: Selection, viewport: &Viewport) -> bool {
        let MapState {
            chunks,
            surface,
            selection,
            ..
        } = self;
        if chunks
            .get(target.chunk)
            .and_then(|chunk| chunk.rows().get(target.row))
            .is_none()
        {
            return false;
        }
        if let Some(previous) = selection.take() {
            if let Some(row) = chunks
                .get_mut(previous.chunk)
                .and_then(|chunk| chunk.rows_mut().get_mut(previous.row))
            {
                row.set_selected(false, surface.as_mut(), viewport);
            }
        }
        let row = &mut chunks[target.chunk].rows_mut()[target.row];
        row.set_selected(true, surface.as_mut(), viewport);
        *selection = Some(target);
        trace!(target = "pager::nav", chunk = target.chunk, row = target.row, "selected");

        let Some(span) = self.row_span(target) else {
            return true;
        };
        let offset = span.start as i64 - viewport.top() as i64;
        if self.evict(viewport) {
            if let Some(span) = self.row_span(target) {
                let position = shifted(span.start, -offset);
                if viewport.top() != position {
                    viewport.scroll_to(position);
                }
            }
        }
        true
    }

    /// Unloads every loaded segment lying entirely in the far range.
    fn evict(&mut self, viewport: &Viewport) -> bool {
        let far = viewport.to_unload_positions();
        if far.top.is_none() && far.bottom.is_none() {
            return false;
        }
        let surface = self.surface.as_ref();
        let doomed: Vec<usize> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.is_loaded())
            .filter(|chunk| {
                let span = chunk.position(surface);
                far.top.is_some_and(|top| span.end <= top)
                    || far.bottom.is_some_and(|bottom| span.start >= bottom)
            })
            .map(Chunk::index)
            .collect();
        if doomed.is_empty() {
            return false;
        }
        if let Some(selection) = self.selection {
            if doomed.contains(&selection.chunk) {
                self.selection = None;
            }
        }
        for &index in &doomed {
            self.chunks[index].unload(self.surface.as_mut(), self.placeholder_extent);
        }
        debug!(target = "pager::chunk", evicted = ?doomed, "evicted far segments");
        self.sync_extent(viewport);
        true
    }

    fn loaded_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.is_loaded()).count()
    }
}

struct Inner {
    state: Mutex<MapState>,
    source: Arc<dyn ChunkSource>,
    viewport: Arc<Viewport>,
    busy: Arc<dyn BusyIndicator>,
    segment_count: usize,
}

#[derive(Clone)]
pub struct ChunksMap {
    inner: Arc<Inner>,
}

impl ChunksMap {
    pub fn new(
        source: Arc<dyn ChunkSource>,
        surface: Box<dyn Surface>,
        viewport: Arc<Viewport>,
        busy: Arc<dyn BusyIndicator>,
        options: MapOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MapState {
                    chunks: Vec::with_capacity(options.segment_count),
                    surface,
                    selection: None,
                    placeholder_extent: options.placeholder_extent,
                }),
                source,
                viewport,
                busy,
                segment_count: options.segment_count,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MapState> {
        self.inner.state.lock()
    }

    pub fn viewport(&self) -> &Arc<Viewport> {
        &self.inner.viewport
    }

    pub fn segment_count(&self) -> usize {
        self.inner.segment_count
    }

    /// Creates the segment containers, loads segment 0 and reserves the
    /// placeholder extent for every other segment.
    pub async fn init(&self) -> Result<(), InitError> {
        if self.inner.segment_count == 0 {
            return Err(InitError::NoSegments);
        }
        {
            let mut state = self.state();
            if state.chunks.is_empty() {
                for _ in 0..self.inner.segment_count {
                    let index = state.surface.create_segment();
                    state.chunks.push(Chunk::new(index));
                }
            }
        }

        self.inner.busy.show();
        let loaded = self.load_chunk(0).await;
        self.inner.busy.hide();
        loaded.map_err(InitError::RootLoad)?;

        {
            let mut state = self.state();
            let MapState {
                chunks,
                surface,
                placeholder_extent,
                ..
            } = &mut *state;
            for chunk in chunks.iter().filter(|chunk| !chunk.is_loaded()) {
                chunk.set_height(*placeholder_extent, surface.as_mut());
            }
            state.sync_extent(&self.inner.viewport);
            info!(
                target = "pager::chunk",
                segments = state.chunks.len(),
                extent = state.surface.total_extent(),
                "directory initialized"
            );
        }
        Ok(())
    }

    /// Loads segment `index` if needed. Concurrent callers share one fetch.
    pub async fn load_chunk(&self, index: usize) -> Result<(), LoadError> {
        self.with_loaded(index, |_| ()).await
    }

    /// Loads segment `index` and runs `apply` under the lock while it is
    /// guaranteed to be loaded.
    async fn with_loaded<R>(
        &self,
        index: usize,
        mut apply: impl FnMut(&mut MapState) -> R,
    ) -> Result<R, LoadError> {
        let viewport = &self.inner.viewport;
        for _ in 0..LOAD_ATTEMPTS {
            let step = {
                let mut state = self.state();
                let chunk = state
                    .chunks
                    .get_mut(index)
                    .ok_or(LoadError::OutOfRange { index })?;
                chunk.load(&self.inner.source)
            };
            let settled = match step {
                LoadStep::Ready => None,
                LoadStep::Pending(pending) => Some((pending.ticket, pending.future.await)),
            };
            {
                let mut state = self.state();
                if let Some((ticket, outcome)) = &settled {
                    state.apply_load(index, *ticket, outcome, viewport);
                }
                if state.chunks[index].is_loaded() {
                    return Ok(apply(&mut *state));
                }
            }
            if let Some((_, Err(err))) = settled {
                return Err(err);
            }
            debug!(target = "pager::chunk", index, "segment unloaded while loading; retrying");
        }
        Err(LoadError::Evicted { index })
    }

    pub async fn first(&self) -> Result<(), NavError> {
        self.select_edge(0, SearchDirection::Forward).await
    }

    pub async fn last(&self) -> Result<(), NavError> {
        match self.inner.segment_count.checked_sub(1) {
            Some(index) => self.select_edge(index, SearchDirection::Backward).await,
            None => Ok(()),
        }
    }

    pub async fn next(&self) -> Result<(), NavError> {
        let step = {
            let mut state = self.state();
            let selection = state.selection;
            match selection {
                None => NextMove::Edge(0, SearchDirection::Forward),
                Some(current) if current.row + 1 < state.chunks[current.chunk].rows().len() => {
                    let target = Selection {
                        chunk: current.chunk,
                        row: current.row + 1,
                    };
                    state.select(target, &self.inner.viewport);
                    NextMove::Done
                }
                Some(current) if current.chunk + 1 < self.inner.segment_count => {
                    NextMove::Edge(current.chunk + 1, SearchDirection::Forward)
                }
                Some(_) => NextMove::Done,
            }
        };
        match step {
            NextMove::Edge(index, direction) => self.select_edge(index, direction).await,
            NextMove::Done => Ok(()),
        }
    }

    pub async fn prev(&self) -> Result<(), NavError> {
        let step = {
            let mut state = self.state();
            let selection = state.selection;
            match selection {
                None => match self.inner.segment_count.checked_sub(1) {
                    Some(last) => NextMove::Edge(last, SearchDirection::Backward),
                    None => NextMove::Done,
                },
                Some(current) if current.row > 0 => {
                    let target = Selection {
                        chunk: current.chunk,
                        row: current.row - 1,
                    };
                    state.select(target, &self.inner.viewport);
                    NextMove::Done
                }
                Some(current) if current.chunk > 0 => {
                    NextMove::Edge(current.chunk - 1, SearchDirection::Backward)
                }
                Some(_) => NextMove::Done,
            }
        };
        match step {
            NextMove::Edge(index, direction) => self.select_edge(index, direction).await,
            NextMove::Done => Ok(()),
        }
    }

    /// Selects the first (forward) or last (backward) record found starting
    /// at segment `start`, skipping segments that loaded without records.
    async fn select_edge(&self, start: usize, direction: SearchDirection) -> Result<(), NavError> {
        let viewport = Arc::clone(&self.inner.viewport);
        let mut index = start;
        loop {
            let selected = self
                .with_loaded(index, |state| {
                    let rows = state.chunks[index].rows().len();
                    if rows == 0 {
                        return false;
                    }
                    let row = match direction {
                        SearchDirection::Forward => 0,
                        SearchDirection::Backward => rows - 1,
                    };
                    state.select(Selection { chunk: index, row }, &viewport)
                })
                .await?;
            if selected {
                return Ok(());
            }
            debug!(target = "pager::nav", index, "skipping segment without records");
            index = match direction {
                SearchDirection::Forward if index + 1 < self.inner.segment_count => index + 1,
                SearchDirection::Backward if index > 0 => index - 1,
                _ => return Ok(()),
            };
        }
    }

    /// Selects the record ending the next page.
    pub async fn next_page(&self) -> Result<(), NavError> {
        let target = self.inner.viewport.next_page_position().saturating_sub(1);
        self.seek(target, SearchDirection::Forward).await
    }

    /// Selects the record starting the previous page.
    pub async fn prev_page(&self) -> Result<(), NavError> {
        let target = self.inner.viewport.prev_page_position() + 1;
        self.seek(target, SearchDirection::Backward).await
    }

    async fn seek(&self, target: u64, direction: SearchDirection) -> Result<(), NavError> {
        match self.get_chunk_by_position(target) {
            Some(chunk) => self.try_get_row_in_chunk(target, chunk, direction).await,
            None => {
                debug!(target = "pager::nav", position = target, "page target outside document");
                Ok(())
            }
        }
    }

    /// Loads `chunk` and selects the record at `position`, correcting the
    /// position for whatever the load (or any load racing it) did to the
    /// layout. Hops to neighbouring segments when the corrected position
    /// falls outside `chunk`.
    pub async fn try_get_row_in_chunk(
        &self,
        position: u64,
        chunk: usize,
        direction: SearchDirection,
    ) -> Result<(), NavError> {
        let viewport = Arc::clone(&self.inner.viewport);
        let count = self.inner.segment_count;
        let mut position = position;
        let mut chunk = chunk;

        for _ in 0..count {
            let snapshot = {
                let state = self.state();
                let candidate = state
                    .chunks
                    .get(chunk)
                    .ok_or(LoadError::OutOfRange { index: chunk })?;
                GeometrySnapshot::capture(candidate.position(state.surface.as_ref()))
            };
            let landing = self
                .with_loaded(chunk, |state| {
                    let after = state.chunks[chunk].position(state.surface.as_ref());
                    let mut target = shifted(position, snapshot.start_shift(after));
                    if direction == SearchDirection::Backward {
                        let growth = snapshot.extent_shift(after);
                        if growth != 0 {
                            viewport.scroll_by(growth);
                            target = shifted(target, growth);
                        }
                    }
                    match state.chunks[chunk].get_by_position(target, state.surface.as_ref()) {
                        Some(row) => {
                            state.select(Selection { chunk, row }, &viewport);
                            Landing::Found
                        }
                        None if target < after.start => Landing::Before(target),
                        None if target >= after.end => Landing::After(target),
                        None => Landing::Hole(target),
                    }
                })
                .await?;

            match landing {
                Landing::Found => return Ok(()),
                Landing::Before(target) if chunk > 0 => {
                    position = target;
                    chunk -= 1;
                }
                Landing::After(target) if chunk + 1 < count => {
                    position = target;
                    chunk += 1;
                }
                Landing::Before(target) | Landing::After(target) => {
                    return Err(NavError::SearchExhausted {
                        position: target,
                        hops: count,
                    });
                }
                Landing::Hole(target) => {
                    error!(
                        target = "pager::nav",
                        chunk,
                        position = target,
                        "segment covers position but no record matches"
                    );
                    return Err(NavError::Geometry {
                        chunk,
                        position: target,
                    });
                }
            }
        }
        Err(NavError::SearchExhausted {
            position,
            hops: count,
        })
    }

    pub async fn navigate(&self, key: NavKey) -> Result<(), NavError> {
        match key {
            NavKey::Previous => self.prev().await,
            NavKey::Next => self.next().await,
            NavKey::PageBack => self.prev_page().await,
            NavKey::PageForward => self.next_page().await,
            NavKey::First => self.first().await,
            NavKey::Last => self.last().await,
        }
    }

    pub fn get_chunk_by_position(&self, position: u64) -> Option<usize> {
        self.state().chunk_at(position)
    }

    /// Selects the record at document `position` if its segment is loaded.
    pub fn select_at(&self, position: u64) -> bool {
        let mut state = self.state();
        let Some(chunk) = state.chunk_at(position) else {
            return false;
        };
        let Some(row) = state.chunks[chunk].get_by_position(position, state.surface.as_ref()) else {
            return false;
        };
        state.select(Selection { chunk, row }, &self.inner.viewport)
    }

    pub fn unload_unvisible(&self) -> bool {
        self.state().evict(&self.inner.viewport)
    }

    /// Runs after the viewport settles: evicts what is far away, loads what is
    /// visible, prefetches one page in each direction and keeps the viewport
    /// anchored to the segment it was looking at.
    pub async fn prefetch_visible(&self) {
        let viewport = &self.inner.viewport;
        let top = viewport.top().max(LEADING_OFFSET);
        let current = {
            let state = self.state();
            state.chunk_at(top).map(|index| {
                let span = state.chunks[index].position(state.surface.as_ref());
                (index, span.start, top - span.start, state.chunks[index].is_loaded())
            })
        };
        let Some((current, mut anchor, offset, was_loaded)) = current else {
            return;
        };

        let mut fetched = Vec::new();
        let blocking = !was_loaded;
        if blocking {
            self.inner.busy.show();
            fetched.push(current);
        }
        if self.unload_unvisible() {
            // Evicting above the viewport reflows everything below it.
            if let Some(span) = self.chunk_position(current) {
                if span.start != anchor {
                    viewport.scroll_to(span.start + offset);
                }
                anchor = span.start;
            }
        }

        if let Err(err) = self.load_chunk(current).await {
            warn!(target = "pager::chunk", index = current, error = %err, "visible segment failed to load");
            if blocking {
                self.inner.busy.hide();
            }
            return;
        }
        self.prefetch_at(viewport.bottom(), &mut fetched).await;
        if blocking {
            self.inner.busy.hide();
        }
        self.prefetch_at(viewport.next_page_position(), &mut fetched).await;
        self.prefetch_at(viewport.prev_page_position(), &mut fetched).await;

        let (start, loaded) = {
            let state = self.state();
            let start = state.chunks[current].position(state.surface.as_ref()).start;
            (start, state.loaded_count())
        };
        telemetry::record_gauge("loaded_segments", loaded as u64);
        if !fetched.is_empty() && start != anchor {
            trace!(target = "pager::viewport", from = anchor, to = start, "re-anchoring viewport");
            viewport.scroll_to(start + offset);
        }
    }

    async fn prefetch_at(&self, position: u64, fetched: &mut Vec<usize>) {
        if position == 0 {
            return;
        }
        let candidate = {
            let state = self.state();
            state
                .chunk_at(position)
                .filter(|index| !state.chunks[*index].is_loaded())
        };
        let Some(index) = candidate else {
            return;
        };
        if fetched.contains(&index) {
            return;
        }
        fetched.push(index);
        if let Err(err) = self.load_chunk(index).await {
            warn!(target = "pager::chunk", index, error = %err, "prefetch failed");
        }
    }

    pub fn selected(&self) -> Option<Selection> {
        self.state().selection
    }

    pub fn selected_text(&self) -> Option<String> {
        let state = self.state();
        let selection = state.selection?;
        state
            .chunks
            .get(selection.chunk)?
            .rows()
            .get(selection.row)
            .map(|row| row.text().to_owned())
    }

    pub fn selected_position(&self) -> Option<Span> {
        let state = self.state();
        state.row_span(state.selection?)
    }

    pub fn loaded_chunks(&self) -> Vec<usize> {
        self.state()
            .chunks
            .iter()
            .filter(|chunk| chunk.is_loaded())
            .map(Chunk::index)
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.state().loaded_count()
    }

    pub fn chunk_position(&self, index: usize) -> Option<Span> {
        let state = self.state();
        state
            .chunks
            .get(index)
            .map(|chunk| chunk.position(state.surface.as_ref()))
    }

    pub fn total_extent(&self) -> u64 {
        self.state().surface.total_extent()
    }

    /// Content of `count` terminal rows from the viewport top.
    pub fn visible_rows(&self, count: usize) -> Vec<RowView> {
        let top = self.inner.viewport.top();
        self.state().surface.rows(top, count)
    }
}
