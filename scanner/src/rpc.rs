//! JSON-RPC transport
//!
//! Only the three methods the scanner needs are modelled. A response with an
//! `error` member, a non-2xx status or no `result` is a failed attempt.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DecodeError, RpcError};
use crate::health::ProviderEndpoint;

/// Sends one JSON-RPC request to one provider and returns its `result`
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        endpoint: &ProviderEndpoint,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP transport; request timeouts are enforced by the executor
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: std::sync::Arc<AtomicU64>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stealth-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RpcError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            next_id: Default::default(),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        endpoint: &ProviderEndpoint,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(endpoint.request_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body: JsonRpcResponse = response.json().await?;
        into_result(body)
    }
}

fn into_result(body: JsonRpcResponse) -> Result<Value, RpcError> {
    if let Some(err) = body.error {
        return Err(RpcError::Remote {
            code: err.code,
            message: err.message,
        });
    }
    match body.result {
        Some(Value::Null) | None => Err(RpcError::MissingResult),
        Some(result) => Ok(result),
    }
}

/// Parse a raw JSON-RPC response body
pub fn parse_response(raw: &str) -> Result<Value, RpcError> {
    let body: JsonRpcResponse =
        serde_json::from_str(raw).map_err(|e| DecodeError::Json(e.to_string()))?;
    into_result(body)
}

/// Log entry as returned by `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub block_number: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<String>,
}

/// Filter params for one `eth_getLogs` sub-range
pub fn get_logs_params(contract: Address, from_block: u64, to_block: u64, topic: B256) -> Value {
    json!([{
        "address": contract,
        "fromBlock": block_tag(from_block),
        "toBlock": block_tag(to_block),
        "topics": [topic],
    }])
}

pub fn get_balance_params(address: Address) -> Value {
    json!([address, "latest"])
}

pub fn block_tag(block_number: u64) -> String {
    format!("0x{block_number:x}")
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a hex quantity such as `0x1a2b`
pub fn parse_quantity(field: &'static str, s: &str) -> Result<u64, DecodeError> {
    let digits = strip_0x(s.trim());
    if digits.is_empty() {
        return Err(DecodeError::Hex {
            field,
            reason: "empty quantity".into(),
        });
    }
    u64::from_str_radix(digits, 16).map_err(|e| DecodeError::Hex {
        field,
        reason: e.to_string(),
    })
}

pub fn parse_u256(field: &'static str, s: &str) -> Result<U256, DecodeError> {
    let digits = strip_0x(s.trim());
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| DecodeError::Hex {
        field,
        reason: e.to_string(),
    })
}

pub fn parse_bytes(field: &'static str, s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(strip_0x(s.trim())).map_err(|e| DecodeError::Hex {
        field,
        reason: e.to_string(),
    })
}

/// Parse a `result` that must be a hex string
pub fn expect_hex_string(field: &'static str, value: &Value) -> Result<String, DecodeError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::Hex {
            field,
            reason: format!("expected hex string, got {value}"),
        })
}
