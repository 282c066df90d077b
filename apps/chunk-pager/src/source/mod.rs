//! Where segment contents come from.
//!
//! A source is addressed by segment index alone and returns the ordered
//! record texts of that segment. Record framing is shared by every backend:
//! consecutive non-blank lines form one record, blank lines end it.

mod dir;
mod http;
mod memory;

pub use dir::DirChunkSource;
pub use http::HttpChunkSource;
pub use memory::MemoryChunkSource;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Placeholder replaced by the segment index in URL and file name templates.
pub const INDEX_PLACEHOLDER: &str = "{index}";

#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn fetch_segment(&self, index: usize) -> Result<Vec<String>, SourceError>;
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {status} for segment {index}")]
    HttpStatus { index: usize, status: StatusCode },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("segment {0} is not available")]
    Unavailable(usize),
}

pub(crate) fn render_template(template: &str, index: usize) -> String {
    template.replace(INDEX_PLACEHOLDER, &index.to_string())
}

pub(crate) fn check_template(template: &str) -> Result<(), SourceError> {
    if template.contains(INDEX_PLACEHOLDER) {
        Ok(())
    } else {
        Err(SourceError::InvalidConfig(format!(
            "template '{template}' must contain {INDEX_PLACEHOLDER}"
        )))
    }
}

/// Splits a segment body into records.
pub fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_delimit_records() {
        assert_eq!(
            split_records("a\nb\n\nc\n\nd\ne\n"),
            vec!["a\nb".to_string(), "c".to_string(), "d\ne".to_string()]
        );
    }

    #[test]
    fn runs_of_blank_lines_and_crlf_collapse() {
        assert_eq!(
            split_records("\r\n\r\nfirst\r\nline\r\n\r\n\r\n\nsecond"),
            vec!["first\nline".to_string(), "second".to_string()]
        );
        assert!(split_records("").is_empty());
        assert!(split_records("\n\n").is_empty());
    }

    #[test]
    fn templates_need_an_index_placeholder() {
        assert!(check_template("chunk_{index}.txt").is_ok());
        assert!(matches!(
            check_template("chunk.txt"),
            Err(SourceError::InvalidConfig(_))
        ));
        assert_eq!(render_template("chunk_{index}.txt", 42), "chunk_42.txt");
    }
}
