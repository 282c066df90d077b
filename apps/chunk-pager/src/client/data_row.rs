use crate::client::document::{NodeId, RECORD_GAP, Surface};
use crate::client::geometry::Span;
use crate::client::viewport::Viewport;

/// Pulled back from a record's rendered start so that consecutive record
/// ranges tile the segment without holes.
pub const LEADING_OFFSET: u64 = RECORD_GAP;

/// One record of a loaded segment and its container on the surface.
#[derive(Debug)]
pub struct DataRow {
    index: usize,
    text: String,
    chunk: Option<usize>,
    node: Option<NodeId>,
    selected: bool,
}

impl DataRow {
    /// Appends the record's container at the end of segment `chunk`.
    pub fn attach(index: usize, text: &str, chunk: usize, surface: &mut dyn Surface) -> Self {
        let node = surface.append_record(chunk, text);
        Self {
            index,
            text: text.to_owned(),
            chunk: Some(chunk),
            node: Some(node),
            selected: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Owning segment; `None` once removed.
    pub fn chunk(&self) -> Option<usize> {
        self.chunk
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn position(&self, surface: &dyn Surface) -> Option<Span> {
        let rendered = surface.record_box(self.node?)?;
        Some(Span::new(
            rendered.start.saturating_sub(LEADING_OFFSET),
            rendered.end,
        ))
    }

    /// Toggles the selected marker. Selecting scrolls the viewport by the
    /// least amount that brings the whole record into view.
    pub fn set_selected(&mut self, selected: bool, surface: &mut dyn Surface, viewport: &Viewport) {
        self.selected = selected;
        let Some(node) = self.node else {
            return;
        };
        surface.set_selected(node, selected);
        if !selected {
            return;
        }
        let Some(span) = self.position(surface) else {
            return;
        };
        if span.start < viewport.top() {
            viewport.scroll_to(span.start);
        } else if span.end > viewport.bottom() {
            viewport.scroll_to(span.end.saturating_sub(viewport.height()));
        }
    }

    /// Detaches the container and severs the link to the owning segment.
    pub fn remove(&mut self, surface: &mut dyn Surface) {
        if let Some(node) = self.node.take() {
            surface.remove_record(node);
        }
        self.chunk = None;
        self.selected = false;
    }
}
