//! Chat-completions client that turns a week of signals into prose.

use adsignal_core::AppConfig;
use adsignal_engine::{EngineError, NarrativeSynthesizer};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::http::{build_http_client, endpoint};
use crate::retry::retry_with_backoff;

const SERVICE: &str = "narrative";

pub const SYSTEM_PROMPT: &str = "Analyze these recent ad deconstructions and summarize the week's strategic landscape.\n\
Identify:\n\
1. Dominant Psychological Triggers.\n\
2. Creative Convergence (where competitors are doing the same thing).\n\
3. Outliers (who is breaking the mold).\n\
Format as professional, concise markdown.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct NarrativeClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl NarrativeClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.to_owned(),
            model: model.to_owned(),
            api_key: api_key.map(str::to_owned),
            max_retries: 0,
            backoff_base_ms: 0,
        })
    }

    /// # Errors
    ///
    /// See [`NarrativeClient::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            &config.narrative_url,
            &config.narrative_model,
            config.openai_api_key.as_deref(),
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

    /// # Errors
    ///
    /// [`ClientError::Http`] after retries are exhausted, or
    /// [`ClientError::InvalidResponse`] when no non-empty message comes back.
    pub async fn complete(&self, context: &str) -> Result<String, ClientError> {
        retry_with_backoff(SERVICE, self.max_retries, self.backoff_base_ms, move || {
            self.request(context)
        })
        .await
    }

    async fn request(&self, context: &str) -> Result<String, ClientError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
        };
        let mut request = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClientError::InvalidResponse {
                service: SERVICE,
                reason: "no message content".to_owned(),
            })
    }
}

#[async_trait]
impl NarrativeSynthesizer for NarrativeClient {
    async fn synthesize(&self, context: &str) -> Result<String, EngineError> {
        self.complete(context)
            .await
            .map_err(|e| EngineError::Narrative(e.to_string()))
    }
}
