//! JSON-RPC 2.0 over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use keyway_core::{BundlerError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::metrics::record_rpc_latency;

/// Relay request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-success bodies are cut to this many bytes before they are kept in errors.
const MAX_ERROR_BODY: usize = 1024;

/// Sends one JSON-RPC request and returns its `result`.
#[async_trait]
pub trait BundlerTransport: Send + Sync {
    /// Calls `method` with `params`. Relay-level errors come back as
    /// [`BundlerError::Rpc`].
    async fn request(&self, method: &str, params: Value) -> Result<Value, BundlerError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(flatten)]
    result: JsonRpcResult,
}

// `Error` goes first: a missing `result` member deserializes as `null`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRpcResult {
    Error { error: JsonRpcError },
    Success { result: Value },
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// [`BundlerTransport`] backed by `reqwest`.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Transport with the default request timeout.
    pub fn new(url: Url) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Transport whose requests fail after `timeout`.
    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, next_id: AtomicU64::new(1) })
    }

    /// The relay endpoint.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    async fn send(&self, method: &str, params: &Value) -> Result<Value, BundlerError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let transport_error = |err: reqwest::Error| BundlerError::Transport {
            method: method.to_string(),
            params: params.clone(),
            kind: transport_kind(&err),
            message: err.to_string(),
        };

        let response =
            self.client.post(self.url.clone()).json(&request).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(BundlerError::Http {
                method: method.to_string(),
                params: params.clone(),
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let response: JsonRpcResponse =
            serde_json::from_str(&body).map_err(|err| BundlerError::InvalidResponse {
                method: method.to_string(),
                params: params.clone(),
                message: format!("{err}: {}", truncate(body.clone(), MAX_ERROR_BODY)),
            })?;

        match response.result {
            JsonRpcResult::Success { result } => Ok(result),
            JsonRpcResult::Error { error } => Err(BundlerError::Rpc {
                method: method.to_string(),
                params: params.clone(),
                code: error.code,
                message: error.message,
                data: error.data,
            }),
        }
    }
}

#[async_trait]
impl BundlerTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, BundlerError> {
        debug!(method, url = %self.url, "sending relay request");
        let start = Instant::now();
        let result = self.send(method, &params).await;
        record_rpc_latency(method, start.elapsed());
        result
    }
}

fn transport_kind(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
