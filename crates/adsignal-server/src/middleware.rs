use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

const API_KEYS_VAR: &str = "ADSIGNAL_API_KEYS";
const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Request id carried in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer tokens accepted on protected routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `ADSIGNAL_API_KEYS` (comma-separated).
    ///
    /// # Errors
    ///
    /// Fails when no key is configured outside development.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// # Errors
    ///
    /// Fails when `raw` holds no key and `is_development` is false.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys: Vec<String> = Vec::new();
        for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_owned());
            }
        }

        match (keys.is_empty(), is_development) {
            (false, _) => Ok(Self {
                api_keys: Arc::new(keys),
                enabled: true,
            }),
            (true, true) => {
                tracing::warn!("{API_KEYS_VAR} is empty; bearer auth disabled for development");
                Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                })
            }
            (true, false) => anyhow::bail!(
                "{API_KEYS_VAR} must list at least one bearer token outside development"
            ),
        }
    }

    /// Every configured key is compared, each in constant time.
    fn allows(&self, token: &str) -> bool {
        let hit = self.api_keys.iter().fold(0u8, |acc, key| {
            acc | key.as_bytes().ct_eq(token.as_bytes()).unwrap_u8()
        });
        hit == 1
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request budget per client.
///
/// Clients are keyed by bearer token, then by the first `x-forwarded-for`
/// hop, then share one anonymous bucket. Windows idle for longer than one
/// period are dropped on the next check, so the map stays bounded by the
/// number of clients active in the last period.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

/// Outcome of charging one request against a client's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn admit(&self, client: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock().await;
        clients.retain(|_, w| now.saturating_duration_since(w.started_at) < self.window);

        let entry = clients.entry(client.to_owned()).or_insert(ClientWindow {
            started_at: now,
            count: 0,
        });
        if entry.count >= self.max_requests {
            let elapsed = now.saturating_duration_since(entry.started_at);
            return Admission::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }
        entry.count += 1;
        Admission::Allowed
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[derive(Debug, Serialize)]
struct RejectionBody {
    error: Rejection,
}

#[derive(Debug, Serialize)]
struct Rejection {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(RejectionBody {
            error: Rejection { code, message },
        }),
    )
        .into_response()
}

/// Reuses an incoming `x-request-id` or mints a `UUIDv4`, stores it as a
/// [`RequestId`] extension and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }
    match bearer_token(req.headers()) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(req.headers());
    match rate_limit.admit(&client, Instant::now()).await {
        Admission::Allowed => next.run(req).await,
        Admission::Limited { retry_after } => {
            tracing::debug!(client = %client, "rate limit exceeded");
            let mut res = reject(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "rate limit exceeded",
            );
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
            res
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn client_key(headers: &HeaderMap) -> String {
    if let Some(token) = bearer_token(headers) {
        return format!("token:{token}");
    }
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| "anonymous".to_string(), |ip| format!("ip:{ip}"))
}
