//! JSON-RPC client for Ethereum nodes
//!
//! Provides the concrete `ChainReader` over HTTP JSON-RPC. Requests walk an
//! ordered endpoint list: the first endpoint that produces a JSON-RPC response
//! wins. JSON-RPC error objects (reverts included) are final and do not move
//! on to the next endpoint.

use crate::error::ChainCallError;
use crate::reader::ChainReader;
use crate::types::{parse_hex_bytes, parse_hex_u64, ContractCall, Log, LogFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// `endpoints` are tried in order; every HTTP request is bounded by `timeout`.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        if endpoints.is_empty() {
            anyhow::bail!("At least one RPC endpoint is required");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, endpoints })
    }

    /// Configured endpoints, in priority order.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// POST a JSON-RPC body, falling through endpoints on transport failure.
    async fn post(&self, body: &Value) -> Result<Value, ChainCallError> {
        let mut last_err = ChainCallError::Transport("no endpoint attempted".to_string());

        for url in &self.endpoints {
            let response = match self.client.post(url).json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("RPC endpoint {} unreachable: {}", url, e);
                    last_err = e.into();
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                warn!("RPC endpoint {} returned HTTP {}", url, status);
                last_err = ChainCallError::Transport(format!("HTTP {} from {}", status, url));
                continue;
            }

            match response.json::<Value>().await {
                Ok(json) => return Ok(json),
                Err(e) => {
                    warn!("RPC endpoint {} sent an unreadable body: {}", url, e);
                    last_err = e.into();
                }
            }
        }

        Err(last_err)
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainCallError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let json = self.post(&request).await?;
        extract_result(&json)
    }

    /// Make several JSON-RPC calls in one batch request.
    ///
    /// Each element of the output corresponds to the request at the same position.
    async fn call_batch(&self, requests: Vec<(&str, Value)>) -> Vec<Result<Value, ChainCallError>> {
        if requests.is_empty() {
            return Vec::new();
        }

        let len = requests.len();
        let body: Vec<Value> = requests
            .into_iter()
            .enumerate()
            .map(|(id, (method, params))| {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": method,
                    "params": params
                })
            })
            .collect();

        match self.post(&Value::Array(body)).await {
            Ok(response) => align_batch_response(response, len),
            Err(e) => vec![Err(e); len],
        }
    }

    /// Chain ID reported by the node.
    pub async fn chain_id(&self) -> Result<u64, ChainCallError> {
        let result = self.call("eth_chainId", json!([])).await?;
        let s = result
            .as_str()
            .ok_or_else(|| ChainCallError::Malformed("chain id is not a string".to_string()))?;
        parse_hex_u64(s).map_err(ChainCallError::Malformed)
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn read_one(&self, call: &ContractCall) -> Result<Vec<u8>, ChainCallError> {
        let result = self.call("eth_call", call.to_params()).await?;
        decode_bytes_result(result)
    }

    async fn read_batch(&self, calls: &[ContractCall]) -> Vec<Result<Vec<u8>, ChainCallError>> {
        let requests = calls
            .iter()
            .map(|call| ("eth_call", call.to_params()))
            .collect();

        self.call_batch(requests)
            .await
            .into_iter()
            .map(|result| result.and_then(decode_bytes_result))
            .collect()
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainCallError> {
        let result = self.call("eth_getLogs", filter.to_params()).await?;
        let logs: Vec<Log> = serde_json::from_value(result)
            .map_err(|e| ChainCallError::Malformed(format!("Failed to deserialize logs: {}", e)))?;
        debug!(
            "eth_getLogs {}..={} returned {} logs",
            filter.from_block,
            filter.to_block,
            logs.len()
        );
        Ok(logs)
    }

    async fn current_block_height(&self) -> Result<u64, ChainCallError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let s = result
            .as_str()
            .ok_or_else(|| ChainCallError::Malformed("block number is not a string".to_string()))?;
        parse_hex_u64(s).map_err(ChainCallError::Malformed)
    }
}

/// Pull `result` out of a JSON-RPC response, mapping `error` to `ChainCallError::Rpc`.
fn extract_result(json: &Value) -> Result<Value, ChainCallError> {
    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ChainCallError::Rpc { code, message });
    }

    json.get("result")
        .cloned()
        .ok_or_else(|| ChainCallError::Malformed("RPC response missing 'result' field".to_string()))
}

/// Re-order a batch response by request id.
///
/// Servers may answer batch elements in any order. A non-array answer (a
/// single error object from a node that rejects batches) is reported on
/// every element.
fn align_batch_response(response: Value, len: usize) -> Vec<Result<Value, ChainCallError>> {
    let items = match response {
        Value::Array(items) => items,
        other => {
            let err = match extract_result(&other) {
                Err(e) => e,
                Ok(_) => ChainCallError::Malformed("batch response is not an array".to_string()),
            };
            return vec![Err(err); len];
        }
    };

    let mut slots: Vec<Option<Result<Value, ChainCallError>>> = vec![None; len];
    for item in items {
        let id = item.get("id").and_then(Value::as_u64).map(|id| id as usize);
        match id {
            Some(id) if id < len => slots[id] = Some(extract_result(&item)),
            _ => warn!("Ignoring batch response element with unexpected id: {}", item),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                Err(ChainCallError::Malformed(format!(
                    "no response for batch element {}",
                    i
                )))
            })
        })
        .collect()
}

fn decode_bytes_result(result: Value) -> Result<Vec<u8>, ChainCallError> {
    let s = result
        .as_str()
        .ok_or_else(|| ChainCallError::Malformed("call result is not a string".to_string()))?;
    parse_hex_bytes(s).map_err(ChainCallError::Malformed)
}
