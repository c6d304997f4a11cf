//! Collector transport.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Content type of every event POST.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One event POST, fully addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    /// `{collector}/projects/{project_id}/events/{collection}`.
    pub url: Url,
    /// Raw write key, sent as the `Authorization` header.
    pub authorization: String,
    pub content_type: &'static str,
    /// The event payload, sent verbatim.
    pub body: String,
}

/// Performs one network attempt for an event.
///
/// `Ok(())` means the collector accepted the event; any error counts as a
/// failed attempt and sends the event to the cache.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: PostRequest) -> OutboxResult<()>;
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// [`Transport`] over HTTPS using reqwest.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: TransportConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: PostRequest) -> OutboxResult<()> {
        debug!(url = %request.url, bytes = request.body.len(), "Posting event");

        let response = self
            .client
            .post(request.url)
            .header(AUTHORIZATION, request.authorization)
            .header(CONTENT_TYPE, request.content_type)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutboxError::Transport {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Build `{collector}/projects/{project_id}/events/{collection}`.
///
/// The project id and collection are percent-encoded as single path segments.
pub fn event_url(collector: &Url, project_id: &str, collection: &str) -> OutboxResult<Url> {
    let mut url = collector.clone();
    url.path_segments_mut()
        .map_err(|_| OutboxError::Config(format!("collector url cannot be a base: {collector}")))?
        .pop_if_empty()
        .extend(["projects", project_id, "events", collection]);
    Ok(url)
}
