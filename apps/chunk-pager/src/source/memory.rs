use super::{ChunkSource, SourceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

enum Content {
    Fixed(Vec<Vec<String>>),
    Synthetic { segments: usize, per_segment: usize },
}

/// In-process source used by the demo mode and by tests. Segment contents are
/// either fixed or generated on request, and every request is counted.
pub struct MemoryChunkSource {
    content: Content,
    delay: Option<Duration>,
    requests: Mutex<HashMap<usize, usize>>,
    failing: Mutex<HashSet<usize>>,
    gates: Mutex<HashMap<usize, Arc<Notify>>>,
}

impl MemoryChunkSource {
    pub fn new(segments: Vec<Vec<String>>) -> Self {
        Self::with_content(Content::Fixed(segments))
    }

    /// `segments` segments of `per_segment` records each. Record `i` of a
    /// segment spans `i % 3 + 1` lines so extents vary after load.
    pub fn synthetic(segments: usize, per_segment: usize) -> Self {
        Self::with_content(Content::Synthetic {
            segments,
            per_segment,
        })
    }

    fn with_content(content: Content) -> Self {
        Self {
            content,
            delay: None,
            requests: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn segment_count(&self) -> usize {
        match &self.content {
            Content::Fixed(segments) => segments.len(),
            Content::Synthetic { segments, .. } => *segments,
        }
    }

    /// Makes every following request for `index` fail until [`heal`] is called.
    ///
    /// [`heal`]: Self::heal
    pub fn fail(&self, index: usize) {
        self.failing.lock().insert(index);
    }

    pub fn heal(&self, index: usize) {
        self.failing.lock().remove(&index);
    }

    /// Holds requests for `index` until the returned handle is notified.
    pub fn gate(&self, index: usize) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(index)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn requests(&self, index: usize) -> usize {
        self.requests.lock().get(&index).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }

    fn records(&self, index: usize) -> Option<Vec<String>> {
        match &self.content {
            Content::Fixed(segments) => segments.get(index).cloned(),
            Content::Synthetic {
                segments,
                per_segment,
            } => (index < *segments).then(|| {
                (0..*per_segment)
                    .map(|row| synthetic_record(index, row))
                    .collect()
            }),
        }
    }
}

fn synthetic_record(segment: usize, row: usize) -> String {
    let mut text = format!("record {segment}.{row}");
    for line in 1..=(row % 3) {
        text.push_str(&format!("\n  detail {line} of record {segment}.{row}"));
    }
    text
}

#[async_trait]
impl ChunkSource for MemoryChunkSource {
    async fn fetch_segment(&self, index: usize) -> Result<Vec<String>, SourceError> {
        *self.requests.lock().entry(index).or_insert(0) += 1;
        let gate = self.gates.lock().get(&index).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&index) {
            return Err(SourceError::Unavailable(index));
        }
        self.records(index).ok_or(SourceError::Unavailable(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_requests_and_injects_failures() {
        let source = MemoryChunkSource::new(vec![vec!["a".into()], vec![]]);
        assert_eq!(source.fetch_segment(0).await.unwrap(), vec!["a".to_string()]);
        assert!(source.fetch_segment(1).await.unwrap().is_empty());
        assert!(matches!(
            source.fetch_segment(2).await,
            Err(SourceError::Unavailable(2))
        ));

        source.fail(0);
        assert!(source.fetch_segment(0).await.is_err());
        source.heal(0);
        assert!(source.fetch_segment(0).await.is_ok());

        assert_eq!(source.requests(0), 3);
        assert_eq!(source.total_requests(), 5);
    }

    #[tokio::test]
    async fn synthetic_records_vary_in_height() {
        let source = MemoryChunkSource::synthetic(4, 3);
        let records = source.fetch_segment(2).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], "record 2.0");
        assert_eq!(records[2].lines().count(), 3);
        assert!(source.fetch_segment(4).await.is_err());
    }
}
