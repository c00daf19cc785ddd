//! OpenAI-compatible embedding provider.
//!
//! One API call per batch; batching and retry policy live in the
//! application-layer batcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::EmbeddingProvider;

/// HTTP client for `/embeddings` endpoints in the OpenAI wire format.
#[derive(Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Create a provider for a base URL, key and model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMissing`] when no API key is configured.
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::ConfigMissing("openai_api_key".to_owned()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|err| Error::embedding(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| Error::embedding(format!("invalid response body: {err}")))?;

        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        if rows.len() != texts.len() {
            return Err(Error::embedding(format!(
                "embedding API returned {} vectors for {} inputs",
                rows.len(),
                texts.len()
            )));
        }
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
