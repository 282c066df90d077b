//! Block layout that stands in for the render surface.
//!
//! The document is a vertical stack of segment containers. A segment container
//! either carries an explicit extent (a placeholder for content that is not
//! loaded) or takes the natural extent of the record containers appended to it.
//! Every record is preceded by a fixed gap and occupies one line extent per
//! text line. Geometry is always read live, so every mutation shifts whatever
//! sits below it exactly like a reflow would.

use crate::client::geometry::Span;
use std::collections::HashMap;

/// Layout units per terminal row.
pub const UNITS_PER_ROW: u64 = 10;
/// Extent of a single text line of a record.
pub const LINE_EXTENT: u64 = UNITS_PER_ROW;
/// Gap placed in front of every record container.
pub const RECORD_GAP: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

/// What a single terminal row of the window shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowView {
    Text { text: String, selected: bool },
    Gap,
    Placeholder { segment: usize },
    Blank,
}

/// Operations the engine needs from whatever renders the list.
pub trait Surface: Send {
    /// Creates the next segment container, in document order.
    fn create_segment(&mut self) -> usize;
    fn segment_count(&self) -> usize;
    /// Appends a record container at the end of `segment`'s container.
    fn append_record(&mut self, segment: usize, text: &str) -> NodeId;
    fn remove_record(&mut self, node: NodeId);
    /// Sets (`Some`) or clears (`None`) the explicit extent of a segment container.
    fn set_segment_extent(&mut self, segment: usize, extent: Option<u64>);
    fn set_selected(&mut self, node: NodeId, selected: bool);
    fn segment_span(&self, segment: usize) -> Span;
    /// Rendered box of a record container, excluding its leading gap.
    fn record_box(&self, node: NodeId) -> Option<Span>;
    fn total_extent(&self) -> u64;
    /// Content of `count` terminal rows starting at document position `top`.
    fn rows(&self, top: u64, count: usize) -> Vec<RowView>;
}

struct RecordBox {
    node: NodeId,
    lines: Vec<String>,
    selected: bool,
}

impl RecordBox {
    fn extent(&self) -> u64 {
        RECORD_GAP + self.lines.len().max(1) as u64 * LINE_EXTENT
    }
}

#[derive(Default)]
struct SegmentBox {
    records: Vec<RecordBox>,
    explicit_extent: Option<u64>,
}

impl SegmentBox {
    fn extent(&self) -> u64 {
        self.explicit_extent
            .unwrap_or_else(|| self.records.iter().map(RecordBox::extent).sum())
    }
}

pub struct Document {
    segments: Vec<SegmentBox>,
    // offsets[i] is the start of segment i; the last entry is the total extent.
    offsets: Vec<u64>,
    owners: HashMap<NodeId, usize>,
    next_node: u64,
}

impl Document {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            offsets: vec![0],
            owners: HashMap::new(),
            next_node: 1,
        }
    }

    fn relayout_from(&mut self, segment: usize) {
        for idx in segment..self.segments.len() {
            self.offsets[idx + 1] = self.offsets[idx] + self.segments[idx].extent();
        }
    }

    fn segment_at(&self, position: u64) -> Option<usize> {
        if position >= self.total_extent() {
            return None;
        }
        let idx = self.offsets[1..].partition_point(|&end| end <= position);
        (idx < self.segments.len()).then_some(idx)
    }

    fn row_at(&self, position: u64) -> RowView {
        let Some(segment) = self.segment_at(position) else {
            return RowView::Blank;
        };
        let container = &self.segments[segment];
        if container.records.is_empty() {
            return if container.explicit_extent.is_some() {
                RowView::Placeholder { segment }
            } else {
                RowView::Blank
            };
        }
        let mut cursor = self.offsets[segment];
        for record in &container.records {
            let end = cursor + record.extent();
            if position < end {
                let body = cursor + RECORD_GAP;
                if position < body {
                    return RowView::Gap;
                }
                let line = ((position - body) / LINE_EXTENT) as usize;
                return RowView::Text {
                    text: record.lines.get(line).cloned().unwrap_or_default(),
                    selected: record.selected,
                };
            }
            cursor = end;
        }
        // An explicit extent larger than the records leaves blank space below them.
        RowView::Blank
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for Document {
    fn create_segment(&mut self) -> usize {
        let total = self.total_extent();
        self.segments.push(SegmentBox::default());
        self.offsets.push(total);
        self.segments.len() - 1
    }

    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn append_record(&mut self, segment: usize, text: &str) -> NodeId {
        let node = NodeId(self.next_node);
        self.next_node += 1;
        let Some(container) = self.segments.get_mut(segment) else {
            return node;
        };
        container.records.push(RecordBox {
            node,
            lines: text.split('\n').map(str::to_owned).collect(),
            selected: false,
        });
        self.owners.insert(node, segment);
        self.relayout_from(segment);
        node
    }

    fn remove_record(&mut self, node: NodeId) {
        if let Some(segment) = self.owners.remove(&node) {
            self.segments[segment]
                .records
                .retain(|record| record.node != node);
            self.relayout_from(segment);
        }
    }

    fn set_segment_extent(&mut self, segment: usize, extent: Option<u64>) {
        if let Some(container) = self.segments.get_mut(segment) {
            container.explicit_extent = extent;
            self.relayout_from(segment);
        }
    }

    fn set_selected(&mut self, node: NodeId, selected: bool) {
        if let Some(&segment) = self.owners.get(&node) {
            if let Some(record) = self.segments[segment]
                .records
                .iter_mut()
                .find(|record| record.node == node)
            {
                record.selected = selected;
            }
        }
    }

    fn segment_span(&self, segment: usize) -> Span {
        if segment >= self.segments.len() {
            let total = self.total_extent();
            return Span::new(total, total);
        }
        Span::new(self.offsets[segment], self.offsets[segment + 1])
    }

    fn record_box(&self, node: NodeId) -> Option<Span> {
        let segment = *self.owners.get(&node)?;
        let mut cursor = self.offsets[segment];
        for record in &self.segments[segment].records {
            if record.node == node {
                return Some(Span::new(cursor + RECORD_GAP, cursor + record.extent()));
            }
            cursor += record.extent();
        }
        None
    }

    fn total_extent(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn rows(&self, top: u64, count: usize) -> Vec<RowView> {
        (0..count as u64)
            .map(|row| self.row_at(top + row * UNITS_PER_ROW))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_with(segments: usize) -> Document {
        let mut doc = Document::new();
        for _ in 0..segments {
            doc.create_segment();
        }
        doc
    }

    #[test]
    fn empty_segments_take_no_space() {
        let doc = document_with(3);
        assert_eq!(doc.total_extent(), 0);
        assert_eq!(doc.segment_span(2), Span::new(0, 0));
    }

    #[test]
    fn records_reflow_following_segments() {
        let mut doc = document_with(3);
        doc.set_segment_extent(1, Some(500));
        doc.set_segment_extent(2, Some(500));
        assert_eq!(doc.segment_span(2), Span::new(500, 1000));

        let first = doc.append_record(0, "one");
        let second = doc.append_record(0, "two\nlines");
        assert_eq!(doc.record_box(first), Some(Span::new(10, 20)));
        assert_eq!(doc.record_box(second), Some(Span::new(30, 50)));
        assert_eq!(doc.segment_span(0), Span::new(0, 50));
        assert_eq!(doc.segment_span(2), Span::new(550, 1050));

        doc.remove_record(first);
        assert_eq!(doc.record_box(first), None);
        assert_eq!(doc.record_box(second), Some(Span::new(10, 30)));
        assert_eq!(doc.total_extent(), 1030);
    }

    #[test]
    fn explicit_extent_overrides_natural_extent() {
        let mut doc = document_with(2);
        doc.append_record(0, "a");
        doc.set_segment_extent(0, Some(300));
        assert_eq!(doc.segment_span(0).extent(), 300);
        doc.set_segment_extent(0, None);
        assert_eq!(doc.segment_span(0).extent(), 20);
    }

    #[test]
    fn rows_show_text_gaps_and_placeholders() {
        let mut doc = document_with(2);
        let node = doc.append_record(0, "alpha\nbeta");
        doc.set_selected(node, true);
        doc.set_segment_extent(1, Some(20));

        let rows = doc.rows(0, 6);
        assert_eq!(
            rows,
            vec![
                RowView::Gap,
                RowView::Text {
                    text: "alpha".into(),
                    selected: true
                },
                RowView::Text {
                    text: "beta".into(),
                    selected: true
                },
                RowView::Placeholder { segment: 1 },
                RowView::Placeholder { segment: 1 },
                RowView::Blank,
            ]
        );
    }
}
