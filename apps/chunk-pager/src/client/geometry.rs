/// Half-open range `[start, end)` along the document axis, in layout units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn extent(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }
}

/// Geometry of a segment captured before an async step that may re-layout the
/// document. After the step, the snapshot yields the deltas that have to be
/// applied to any position computed against the old layout.
#[derive(Clone, Copy, Debug)]
pub struct GeometrySnapshot {
    before: Span,
}

impl GeometrySnapshot {
    pub fn capture(span: Span) -> Self {
        Self { before: span }
    }

    pub fn before(&self) -> Span {
        self.before
    }

    /// How far the segment's start moved.
    pub fn start_shift(&self, after: Span) -> i64 {
        after.start as i64 - self.before.start as i64
    }

    /// How much the segment grew (positive) or shrank (negative).
    pub fn extent_shift(&self, after: Span) -> i64 {
        after.extent() as i64 - self.before.extent() as i64
    }
}

pub fn shifted(position: u64, delta: i64) -> u64 {
    position.saturating_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_is_half_open() {
        let span = Span::new(10, 30);
        assert!(span.contains(10));
        assert!(span.contains(29));
        assert!(!span.contains(30));
        assert_eq!(span.extent(), 20);
        assert!(!Span::new(5, 5).contains(5));
    }

    #[test]
    fn snapshot_reports_start_and_extent_deltas() {
        let snapshot = GeometrySnapshot::capture(Span::new(100, 4600));
        let after = Span::new(140, 1140);
        assert_eq!(snapshot.start_shift(after), 40);
        assert_eq!(snapshot.extent_shift(after), -3500);
        assert_eq!(shifted(500, snapshot.start_shift(after)), 540);
        assert_eq!(shifted(10, -50), 0);
    }
}
