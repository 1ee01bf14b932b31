//! Embeddings client for an OpenAI-compatible `/embeddings` endpoint.

use adsignal_core::AppConfig;
use adsignal_engine::{EmbeddingService, EngineError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::http::{build_http_client, endpoint};
use crate::retry::retry_with_backoff;

const SERVICE: &str = "embeddings";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl EmbeddingClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for a zero dimensionality, or
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        dim: usize,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        if dim == 0 {
            return Err(ClientError::Config("embedding dimension must be > 0".to_owned()));
        }
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.to_owned(),
            model: model.to_owned(),
            api_key: api_key.map(str::to_owned),
            dim,
            max_retries: 0,
            backoff_base_ms: 0,
        })
    }

    /// # Errors
    ///
    /// See [`EmbeddingClient::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            &config.embedding_url,
            &config.embedding_model,
            config.openai_api_key.as_deref(),
            config.embedding_dim,
            config.external_timeout_secs,
        )?
        .with_retry(config.max_retries, config.retry_backoff_base_ms))
    }

    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed `text`. Blank input yields the zero vector without a request.
    ///
    /// # Errors
    ///
    /// [`ClientError::Http`] after retries are exhausted,
    /// [`ClientError::InvalidResponse`] for an empty `data` array and
    /// [`ClientError::Dimension`] for a vector of the wrong length.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let input = text.replace(['\n', '\r'], " ");
        if input.trim().is_empty() {
            return Ok(vec![0.0; self.dim]);
        }
        let input = input.as_str();
        let vector = retry_with_backoff(SERVICE, self.max_retries, self.backoff_base_ms, move || {
            self.request(input)
        })
        .await?;

        if vector.len() != self.dim {
            return Err(ClientError::Dimension {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>, ClientError> {
        let mut request = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .json(&EmbedRequest {
                model: &self.model,
                input,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: EmbedResponse = request.send().await?.error_for_status()?.json().await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ClientError::InvalidResponse {
                service: SERVICE,
                reason: "empty data array".to_owned(),
            })
    }
}

#[async_trait]
impl EmbeddingService for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        self.embed_text(text)
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))
    }
}
