//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! A deliberately plain transport: one POST per call, a per-request
//! timeout, and no retry loop. A failed call surfaces to the caller, which
//! decides whether it is fatal (chain head) or isolated (per-address logs).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use dripboard_core::error::SyncError;

use crate::fetcher::{parse_hex_u64, EvmRpcClient, RawLog};

// ─── Wire types ──────────────────────────────────────────────────────────────

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
    /// Unwrap the result value or return the node's error.
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(err) => Err(TransportError::Rpc(err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while talking to a JSON-RPC endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failure or non-2xx status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Error object returned by the node (e.g. "block range too large").
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response body or result had an unexpected shape.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        SyncError::Rpc(e.to_string())
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// JSON-RPC client for a single HTTP endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
            request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and return its `result` value.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        tracing::trace!(method, url = %self.url, "rpc call ok");
        decode_response(&body)
    }
}

/// Parse a 2xx response body. A body that is not a JSON-RPC envelope is a
/// [`TransportError::Deserialization`], not a transport failure.
fn decode_response(body: &[u8]) -> Result<Value, TransportError> {
    serde_json::from_slice::<JsonRpcResponse>(body)?.into_result()
}

#[async_trait]
impl EvmRpcClient for HttpRpcClient {
    async fn get_block_number(&self) -> Result<u64, SyncError> {
        let v = self.call("eth_blockNumber", vec![]).await?;
        let s = v
            .as_str()
            .ok_or_else(|| SyncError::Rpc(format!("eth_blockNumber returned {v}")))?;
        parse_hex_u64(s).ok_or_else(|| SyncError::Rpc(format!("invalid block number '{s}'")))
    }

    async fn get_logs(&self, address: &str, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
        let filter = json!({
            "address": address,
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        let v = self.call("eth_getLogs", vec![filter]).await?;
        let logs: Vec<RawLog> = serde_json::from_value(v).map_err(TransportError::from)?;
        Ok(logs)
    }
}
