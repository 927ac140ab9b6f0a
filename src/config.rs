//! Configuration
//!
//! Command-line flags (with environment fallbacks) and the RPC endpoint list
//! file. `Args::into_settings` validates everything once at startup so the
//! rest of the service works with typed values only.

use crate::enumeration::{
    EnumerationParams, DEFAULT_BALANCE_BATCH_SIZE, DEFAULT_MAX_INDEX, DEFAULT_PAGE_SIZE,
};
use crate::leaderboard::DEFAULT_TOP_N;
use crate::reconstruct::Strategy;
use crate::replay::{
    LogReplayParams, DEFAULT_CHUNK_BLOCKS, DEFAULT_LOG_CONCURRENCY, DEFAULT_WINDOW_BLOCKS,
};
use crate::service::ServiceSettings;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Public Sei EVM endpoints, tried in order after any configured ones.
pub const DEFAULT_RPC_ENDPOINTS: &[&str] = &[
    "https://evm-rpc.sei-apis.com",
    "https://sei.api.pocket.network",
    "https://sei-evm-rpc.stakeme.pro",
];

/// Sei EVM mainnet
pub const DEFAULT_CHAIN_ID: u64 = 1329;

/// Upper bound on reads bundled into one JSON-RPC batch; public nodes cap batches well below this.
pub const MAX_BATCH_SIZE: usize = 1_000;

const DEFAULT_VAULT: &str = "0xf61Bd4a5D34BCEeFdcB1534f17eFafe7B9c2F92B";
const DEFAULT_STAKING_TOKEN: &str = "0x65856bb190955c72d4fd9b1b5700b29067018492";

/// Staking leaderboard server
#[derive(Parser, Debug)]
#[command(name = "stakeboard")]
#[command(about = "Serve a cached top-stakers leaderboard reconstructed from a staking vault")]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Preferred RPC endpoint, tried before any other
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// File with additional RPC endpoints (one URL per line)
    #[arg(long)]
    pub rpc_endpoints_file: Option<PathBuf>,

    /// Expected chain id; a mismatch is logged at startup
    #[arg(long, env = "CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Staking vault contract
    #[arg(long, env = "VAULT_CONTRACT_ADDRESS", default_value = DEFAULT_VAULT)]
    pub vault_address: String,

    /// Token the vault stakes, reported alongside amounts
    #[arg(long, env = "STAKING_TOKEN_ADDRESS", default_value = DEFAULT_STAKING_TOKEN)]
    pub staking_token_address: String,

    /// Shared secret required for `force=true` refreshes
    #[arg(long, env = "CACHE_SECRET", hide_env_values = true)]
    pub admin_secret: Option<String>,

    /// Upstash REST URL (falls back to KV_REST_API_URL)
    #[arg(long, env = "UPSTASH_REDIS_REST_URL")]
    pub kv_url: Option<String>,

    /// Upstash REST token (falls back to KV_REST_API_TOKEN)
    #[arg(long, env = "UPSTASH_REDIS_REST_TOKEN", hide_env_values = true)]
    pub kv_token: Option<String>,

    /// Use an in-process cache when no Upstash credentials are configured
    #[arg(long)]
    pub memory_cache: bool,

    /// Cache key; bump the version suffix to invalidate old snapshots
    #[arg(long, default_value = crate::cache::DEFAULT_CACHE_KEY)]
    pub cache_key: String,

    #[arg(long, default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// How balances are reconstructed
    #[arg(long, value_enum, default_value_t = Strategy::Enumeration)]
    pub strategy: Strategy,

    /// Staker index reads per round trip
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// Highest staker index offset to enumerate
    #[arg(long, default_value_t = DEFAULT_MAX_INDEX)]
    pub max_index: u64,

    /// Stake reads per round trip
    #[arg(long, default_value_t = DEFAULT_BALANCE_BATCH_SIZE)]
    pub balance_batch_size: usize,

    /// Blocks behind the head that log replay covers (0 = from genesis)
    #[arg(long, default_value_t = DEFAULT_WINDOW_BLOCKS)]
    pub log_window_blocks: u64,

    /// Block span of one eth_getLogs query
    #[arg(long, default_value_t = DEFAULT_CHUNK_BLOCKS)]
    pub log_chunk_blocks: u64,

    /// Concurrent eth_getLogs queries per event stream
    #[arg(long, default_value_t = DEFAULT_LOG_CONCURRENCY)]
    pub log_concurrency: usize,

    #[arg(long, default_value_t = 10)]
    pub rpc_timeout_secs: u64,

    /// Upper bound on one reconstruction pass
    #[arg(long, default_value_t = 60)]
    pub reconstruct_timeout_secs: u64,

    /// Number of stakers in the leaderboard
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top_n: usize,
}

/// Where snapshots are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChoice {
    Upstash { url: String, token: String },
    Memory,
    Disabled,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub endpoints: Vec<String>,
    pub chain_id: u64,
    pub rpc_timeout: Duration,
    pub strategy: Strategy,
    pub enumeration: EnumerationParams,
    pub replay: LogReplayParams,
    pub staking_token: Address,
    pub top_n: usize,
    pub cache: CacheChoice,
    pub service: ServiceSettings,
}

impl Args {
    pub fn into_settings(self) -> Result<Settings> {
        self.resolve(|var| std::env::var(var).ok())
    }

    /// Resolve against `env` for the variables clap cannot express
    /// (second-choice names for the cache credentials).
    fn resolve(self, env: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        check_batch_size("--page-size", usize::try_from(self.page_size).unwrap_or(usize::MAX))?;
        check_batch_size("--balance-batch-size", self.balance_batch_size)?;

        let vault = parse_address(&self.vault_address).context("Invalid vault address")?;
        let staking_token = parse_address(&self.staking_token_address)
            .context("Invalid staking token address")?;

        let extra = match &self.rpc_endpoints_file {
            Some(path) => load_endpoint_list(path)?,
            None => Vec::new(),
        };
        let endpoints = merge_endpoints(self.rpc_url.as_deref(), &extra);

        let kv_url = non_empty(self.kv_url).or_else(|| non_empty(env("KV_REST_API_URL")));
        let kv_token = non_empty(self.kv_token).or_else(|| non_empty(env("KV_REST_API_TOKEN")));
        let cache = match (kv_url, kv_token) {
            (Some(url), Some(token)) => CacheChoice::Upstash { url, token },
            _ if self.memory_cache => CacheChoice::Memory,
            _ => CacheChoice::Disabled,
        };

        let enumeration = EnumerationParams {
            vault,
            page_size: self.page_size,
            max_index: self.max_index,
            balance_batch_size: self.balance_batch_size,
        };
        let replay = LogReplayParams {
            vault,
            window_blocks: self.log_window_blocks,
            chunk_blocks: self.log_chunk_blocks,
            concurrency: self.log_concurrency,
        };
        let service = ServiceSettings {
            cache_key: self.cache_key,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            admin_secret: non_empty(self.admin_secret),
            reconstruct_timeout: Duration::from_secs(self.reconstruct_timeout_secs),
        };

        Ok(Settings {
            listen: self.listen,
            endpoints,
            chain_id: self.chain_id,
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            strategy: self.strategy,
            enumeration,
            replay,
            staking_token,
            top_n: self.top_n,
            cache,
            service,
        })
    }
}

fn check_batch_size(flag: &str, size: usize) -> Result<()> {
    if size == 0 || size > MAX_BATCH_SIZE {
        anyhow::bail!("{} must be between 1 and {}, got {}", flag, MAX_BATCH_SIZE, size);
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Override first, then the file's endpoints, then the built-in defaults; duplicates dropped.
fn merge_endpoints(override_url: Option<&str>, extra: &[String]) -> Vec<String> {
    let mut merged = IndexSet::new();
    let configured = override_url
        .into_iter()
        .chain(extra.iter().map(String::as_str))
        .chain(DEFAULT_RPC_ENDPOINTS.iter().copied());
    for url in configured {
        let url = normalize_url(url);
        if !url.is_empty() {
            merged.insert(url);
        }
    }
    merged.into_iter().collect()
}

/// Load RPC endpoints from a file.
///
/// One http(s) URL per line. Empty lines and lines starting with '#' are ignored.
///
/// # Example file format:
/// ```text
/// https://evm-rpc.sei-apis.com
/// # private node
/// http://10.0.0.4:8545
/// ```
pub fn load_endpoint_list(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read endpoint file: {:?}", path))?;

    let mut endpoints = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if !(line.starts_with("http://") || line.starts_with("https://")) {
            anyhow::bail!("Invalid endpoint on line {}: {}", line_num + 1, line);
        }

        endpoints.push(normalize_url(line));
    }

    if endpoints.is_empty() {
        anyhow::bail!("Endpoint file {:?} is empty (no URLs found)", path);
    }

    Ok(endpoints)
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any letter case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}
