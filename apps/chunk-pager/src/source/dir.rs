use super::{ChunkSource, SourceError, check_template, render_template, split_records};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Reads segments from files in a local directory, one file per segment.
pub struct DirChunkSource {
    root: PathBuf,
    template: String,
}

impl DirChunkSource {
    pub fn new(root: impl Into<PathBuf>, template: impl Into<String>) -> Result<Self, SourceError> {
        let template = template.into();
        check_template(&template)?;
        Ok(Self {
            root: root.into(),
            template,
        })
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.root.join(render_template(&self.template, index))
    }
}

#[async_trait]
impl ChunkSource for DirChunkSource {
    async fn fetch_segment(&self, index: usize) -> Result<Vec<String>, SourceError> {
        let path = self.path_for(index);
        debug!(target = "pager::source", index, path = %path.display(), "reading segment");
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| SourceError::Io { path, source })?;
        Ok(split_records(&String::from_utf8_lossy(&raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_and_frames_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chunk_3.txt"), "x\ny\n\nz\n").unwrap();
        let source = DirChunkSource::new(dir.path(), "chunk_{index}.txt").unwrap();

        let records = source.fetch_segment(3).await.unwrap();
        assert_eq!(records, vec!["x\ny".to_string(), "z".to_string()]);

        let err = source.fetch_segment(4).await.unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
