//! Ethereum JSON-RPC types
//!
//! Wire types for the handful of JSON-RPC shapes the chain reader touches:
//! call descriptors, log filters and log entries, plus the hex helpers used
//! to decode quantities and byte strings.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// A read-only contract call: `selector || args` sent to `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Contract being called
    pub address: Address,
    /// 4-byte function selector
    pub selector: [u8; 4],
    /// ABI-encoded static arguments, one 32-byte word each
    pub args: Vec<B256>,
}

impl ContractCall {
    pub fn new(address: Address, selector: [u8; 4], args: Vec<B256>) -> Self {
        Self {
            address,
            selector,
            args,
        }
    }

    /// Full calldata for `eth_call`.
    pub fn calldata(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32 * self.args.len());
        data.extend_from_slice(&self.selector);
        for word in &self.args {
            data.extend_from_slice(word.as_slice());
        }
        data
    }

    /// `eth_call` params against the latest block.
    pub fn to_params(&self) -> Value {
        json!([
            {
                "to": format!("0x{:x}", self.address),
                "data": format!("0x{}", hex::encode(self.calldata())),
            },
            "latest"
        ])
    }
}

/// Filter for a single `eth_getLogs` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract
    pub address: Address,
    /// Event signature hash (topic0)
    pub topic0: B256,
    /// First block, inclusive
    pub from_block: u64,
    /// Last block, inclusive
    pub to_block: u64,
}

impl LogFilter {
    pub fn to_params(&self) -> Value {
        json!([{
            "address": format!("0x{:x}", self.address),
            "topics": [format!("0x{:x}", self.topic0)],
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        }])
    }
}

/// Log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(rename = "topics", default, deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data
    #[serde(rename = "data", deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    /// Block the log was emitted in (null for pending logs)
    #[serde(rename = "blockNumber", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub block_number: Option<u64>,

    /// Position of the log within its block
    #[serde(rename = "logIndex", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub log_index: Option<u64>,

    /// Set when the log was dropped by a reorg
    #[serde(rename = "removed", default)]
    pub removed: bool,
}

impl Log {
    /// Ordering key for replay: (block, index within block).
    pub fn position(&self) -> (u64, u64) {
        (
            self.block_number.unwrap_or(u64::MAX),
            self.log_index.unwrap_or(u64::MAX),
        )
    }
}

// Hex helpers

/// Pad an odd-length hex string with a leading zero.
/// RPC quantities are not zero-padded ("0x1").
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a hex quantity ("0x1a") into a u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Err("empty hex quantity".to_string());
    }
    u64::from_str_radix(s, 16).map_err(|e| format!("invalid hex quantity {:?}: {}", s, e))
}

/// Parse hex data ("0x" prefixed, possibly empty) into bytes.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(pad_hex_string(s)).map_err(|e| format!("invalid hex data: {}", e))
}

fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_u64(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_bytes(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = parse_hex_bytes(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "Expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| {
            let bytes = parse_hex_bytes(s).map_err(serde::de::Error::custom)?;
            if bytes.len() != 32 {
                return Err(serde::de::Error::custom(format!(
                    "Expected 32 bytes for topic, got {}",
                    bytes.len()
                )));
            }
            Ok(B256::from_slice(&bytes))
        })
        .collect()
}
