use crate::error::Result;
use crate::types::ChatMessage;
use async_trait::async_trait;

/// A text-generation backend reachable over HTTP.
///
/// Implementations adapt the normalized message list to their own wire
/// schema. A successful return is guaranteed non-empty; an empty candidate
/// is reported as `LlmError::EmptyCompletion` so callers can advance to the
/// next provider in their fallback chain.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short identifier used in logs and fallback reporting.
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(%e, "reqwest client build failed; falling back to default client");
            reqwest::Client::new()
        })
}
