//! Outbound HTTP collaborators of the signal engine: embeddings, narrative
//! synthesis and webhook delivery.

pub mod embeddings;
pub mod error;
pub mod http;
pub mod narrative;
pub(crate) mod retry;
pub mod webhook;

pub use embeddings::EmbeddingClient;
pub use error::ClientError;
pub use http::build_http_client;
pub use narrative::{NarrativeClient, SYSTEM_PROMPT};
pub use webhook::{deliver, deliver_all, WebhookDispatcher, EVENT_HEADER, SECRET_HEADER};
