//! RPC endpoint health probes
//!
//! Measures `eth_blockNumber` round-trip latency per endpoint and buckets it
//! into Good / Fair / Poor, so operators can see which fallback endpoints are
//! worth keeping.

use crate::types::parse_hex_u64;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Latency above which an endpoint is Fair.
const FAIR_AFTER_MS: u64 = 500;
/// Latency above which an endpoint is Poor.
const POOR_AFTER_MS: u64 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    Good,
    Fair,
    Poor,
}

impl Health {
    pub fn from_latency(latency_ms: u64) -> Self {
        if latency_ms > POOR_AFTER_MS {
            Health::Poor
        } else if latency_ms > FAIR_AFTER_MS {
            Health::Fair
        } else {
            Health::Good
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub url: String,
    pub latency_ms: u64,
    pub block_height: u64,
    pub status: Health,
}

impl EndpointStatus {
    fn unreachable(url: &str) -> Self {
        Self {
            url: url.to_string(),
            latency_ms: 0,
            block_height: 0,
            status: Health::Poor,
        }
    }
}

async fn fetch_block_number(client: &reqwest::Client, url: &str) -> Result<u64, String> {
    let request = json!({
        "jsonrpc": "2.0",
        "method": "eth_blockNumber",
        "params": [],
        "id": 1,
    });

    let response = client
        .post(url)
        .timeout(PROBE_TIMEOUT)
        .json(&request)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let body: Value = response.json().await.map_err(|e| e.to_string())?;
    let height = body
        .get("result")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing result".to_string())?;
    parse_hex_u64(height)
}

/// Probe one endpoint. Never fails: an unreachable endpoint reports Poor with zeros.
pub async fn probe_endpoint(client: &reqwest::Client, url: &str) -> EndpointStatus {
    let url = url.trim().trim_end_matches('/');
    let start = Instant::now();

    match fetch_block_number(client, url).await {
        Ok(block_height) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            EndpointStatus {
                url: url.to_string(),
                latency_ms,
                block_height,
                status: Health::from_latency(latency_ms),
            }
        }
        Err(e) => {
            debug!("RPC probe of {} failed: {}", url, e);
            EndpointStatus::unreachable(url)
        }
    }
}

/// Probe every endpoint concurrently, preserving input order.
pub async fn probe_all(client: &reqwest::Client, urls: &[String]) -> Vec<EndpointStatus> {
    join_all(urls.iter().map(|url| probe_endpoint(client, url))).await
}
