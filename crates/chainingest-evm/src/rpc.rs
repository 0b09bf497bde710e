//! JSON-RPC 2.0 wire types and an HTTP transport backed by `reqwest`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use chainingest_core::error::IngestError;

// ─── Wire types ───────────────────────────────────────────────────────────────

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value (`Null` if absent) or the node's error.
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(err) => Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Errors raised by the HTTP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<TransportError> for IngestError {
    fn from(e: TransportError) -> Self {
        IngestError::Rpc(e.to_string())
    }
}

// ─── HTTP transport ───────────────────────────────────────────────────────────

/// Configuration for [`HttpTransport`].
///
/// Only HTTP-level failures are retried here. A node that answers with a
/// JSON-RPC error gets no second try; the engine's own tick loop decides
/// what happens to that height.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Tries per request, the first one included. `1` disables retry.
    pub attempts: u32,
    /// Pause after the first failed try. The n-th failure waits `n` steps.
    pub retry_step: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            attempts: 4,
            retry_step: Duration::from_millis(250),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpClientConfig {
    /// Pause before the next try after `failed` failures, `None` once the
    /// tries are used up.
    pub fn pause_after(&self, failed: u32) -> Option<Duration> {
        (failed > 0 && failed < self.attempts).then(|| self.retry_step * failed)
    }
}

/// HTTP JSON-RPC transport with retry on transient failures.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    config: HttpClientConfig,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<R, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<R>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    async fn with_retry<R, F, Fut>(&self, method: &str, op: F) -> Result<R, TransportError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R, TransportError>>,
    {
        let mut failed = 0u32;
        loop {
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };
            failed += 1;
            let Some(pause) = self.config.pause_after(failed) else {
                tracing::error!(failed, method, error = %err, url = %self.url, "node unreachable, giving up");
                return Err(err);
            };
            tracing::warn!(
                failed,
                method,
                pause_ms = pause.as_millis() as u64,
                error = %err,
                "node request failed, retrying"
            );
            tokio::time::sleep(pause).await;
        }
    }

    /// Call `method` and return the raw `result` value.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(self.id(), method, params);
        self.with_retry(method, || async {
            self.post::<_, JsonRpcResponse>(&req).await?.into_result()
        })
        .await
    }

    /// Send all requests as one JSON array and return results in request order.
    pub async fn call_batch(
        &self,
        method: &str,
        params: Vec<Vec<Value>>,
    ) -> Result<Vec<Value>, TransportError> {
        if params.is_empty() {
            return Ok(Vec::new());
        }
        let reqs: Vec<JsonRpcRequest> = params
            .into_iter()
            .map(|p| JsonRpcRequest::new(self.id(), method, p))
            .collect();

        let responses = self
            .with_retry(method, || self.post::<_, Vec<JsonRpcResponse>>(&reqs))
            .await?;
        order_batch(&reqs, responses)
    }
}

/// Batch responses may arrive in any order; match them back by id.
pub fn order_batch(
    reqs: &[JsonRpcRequest],
    responses: Vec<JsonRpcResponse>,
) -> Result<Vec<Value>, TransportError> {
    let mut by_id: std::collections::HashMap<u64, JsonRpcResponse> = responses
        .into_iter()
        .filter_map(|r| r.id.as_u64().map(|id| (id, r)))
        .collect();
    reqs.iter()
        .map(|req| {
            by_id
                .remove(&req.id)
                .ok_or_else(|| TransportError::Http(format!("missing batch response for id {}", req.id)))?
                .into_result()
        })
        .collect()
}
