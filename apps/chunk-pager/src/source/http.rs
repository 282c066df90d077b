use super::{ChunkSource, SourceError, check_template, render_template, split_records};
use crate::telemetry;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetches segments with a GET per segment. The URL is built from a template
/// such as `https://host/doc_list_chunk_{index}.txt`.
pub struct HttpChunkSource {
    client: reqwest::Client,
    template: String,
}

impl HttpChunkSource {
    pub fn new(template: impl Into<String>) -> Result<Self, SourceError> {
        let template = template.into().trim().to_string();
        check_template(&template)?;
        Url::parse(&render_template(&template, 0))
            .map_err(|err| SourceError::InvalidConfig(format!("invalid segment url: {err}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client, template })
    }

    pub fn url_for(&self, index: usize) -> Result<Url, SourceError> {
        Url::parse(&render_template(&self.template, index)).map_err(|err| {
            SourceError::InvalidConfig(format!("invalid url for segment {index}: {err}"))
        })
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn fetch_segment(&self, index: usize) -> Result<Vec<String>, SourceError> {
        let url = self.url_for(index)?;
        debug!(target = "pager::source", index, %url, "fetching segment");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus { index, status });
        }
        let body = response.bytes().await?;
        telemetry::record_bytes("segment_fetch_bytes", body.len());
        Ok(split_records(&String::from_utf8_lossy(&body)))
    }
}
