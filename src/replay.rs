//! Event replay strategy
//!
//! Rebuilds balances from `TokensStaked` / `TokensWithdrawn` events over a
//! trailing block window, without touching the vault's index. Stakers whose
//! last event predates the window are invisible to this strategy, so results
//! from a truncated window are always flagged incomplete.
//!
//! A failed event stream is replayed as empty: the leaderboard under-counts
//! rather than going blank.

use crate::abi::{self, decode_topic_address, decode_u256};
use crate::error::{ChainCallError, ReconstructionFailure};
use crate::reader::ChainReader;
use crate::reconstruct::{Reconstruction, Reconstructor};
use crate::types::{Log, LogFilter};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

pub const DEFAULT_WINDOW_BLOCKS: u64 = 200_000;
pub const DEFAULT_CHUNK_BLOCKS: u64 = 10_000;
pub const DEFAULT_LOG_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct LogReplayParams {
    /// Vault contract emitting the events
    pub vault: Address,
    /// How far back from the current height to replay; 0 replays from genesis
    pub window_blocks: u64,
    /// Widest block range a single `eth_getLogs` may span
    pub chunk_blocks: u64,
    /// Log queries in flight per stream
    pub concurrency: usize,
}

impl LogReplayParams {
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            window_blocks: DEFAULT_WINDOW_BLOCKS,
            chunk_blocks: DEFAULT_CHUNK_BLOCKS,
            concurrency: DEFAULT_LOG_CONCURRENCY,
        }
    }
}

pub struct LogReplayReconstructor {
    params: LogReplayParams,
}

/// Split `from..=to` into inclusive ranges of at most `chunk` blocks.
pub fn block_ranges(from: u64, to: u64, chunk: u64) -> Vec<(u64, u64)> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(chunk - 1).min(to);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

impl LogReplayReconstructor {
    pub fn new(params: LogReplayParams) -> Self {
        Self { params }
    }

    /// Fetch one event stream across the window; any failed chunk fails the stream.
    async fn fetch_stream(
        &self,
        chain: &dyn ChainReader,
        topic0: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, ChainCallError> {
        let vault = self.params.vault;
        let chunks: Vec<Vec<Log>> = stream::iter(block_ranges(from, to, self.params.chunk_blocks))
            .map(move |(from_block, to_block)| {
                let filter = LogFilter {
                    address: vault,
                    topic0,
                    from_block,
                    to_block,
                };
                async move { chain.query_logs(&filter).await }
            })
            .buffered(self.params.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }
}

/// Decode `(staker, amount)` from a stake event log.
fn decode_stake_event(log: &Log) -> Option<(Address, U256)> {
    let staker = decode_topic_address(&log.topics, 1);
    let amount = decode_u256(&log.data, 0);
    match (staker, amount) {
        (Ok(staker), Ok(amount)) => Some((staker, amount)),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Skipping malformed stake event at {:?}: {}", log.position(), e);
            None
        }
    }
}

/// Fold increase and decrease events into net balances.
///
/// Events are applied in chain order. Every address starts at zero when first
/// seen; only addresses whose net total ends above zero are returned, in
/// first-seen order.
pub fn replay(increases: &[Log], decreases: &[Log]) -> IndexMap<Address, U256> {
    let mut events: Vec<(&Log, bool)> = increases
        .iter()
        .map(|log| (log, true))
        .chain(decreases.iter().map(|log| (log, false)))
        .filter(|(log, _)| !log.removed)
        .collect();
    events.sort_by_key(|(log, _)| log.position());

    // (credited, debited) per address
    let mut totals: IndexMap<Address, (U256, U256)> = IndexMap::new();
    for (log, increase) in events {
        let Some((staker, amount)) = decode_stake_event(log) else {
            continue;
        };
        let entry = totals.entry(staker).or_insert((U256::ZERO, U256::ZERO));
        if increase {
            entry.0 = entry.0.saturating_add(amount);
        } else {
            entry.1 = entry.1.saturating_add(amount);
        }
    }

    totals
        .into_iter()
        .filter(|(_, (credited, debited))| credited > debited)
        .map(|(staker, (credited, debited))| (staker, credited - debited))
        .collect()
}

#[async_trait]
impl Reconstructor for LogReplayReconstructor {
    fn name(&self) -> &'static str {
        "log-replay"
    }

    async fn reconstruct(
        &self,
        chain: &dyn ChainReader,
    ) -> Result<Reconstruction, ReconstructionFailure> {
        let height = chain
            .current_block_height()
            .await
            .map_err(ReconstructionFailure::ChainUnavailable)?;
        let from = match self.params.window_blocks {
            0 => 0,
            window => height.saturating_sub(window),
        };
        debug!("Replaying stake events over blocks {}..={}", from, height);

        let (staked, withdrawn) = tokio::join!(
            self.fetch_stream(chain, abi::event_topic(abi::TOKENS_STAKED), from, height),
            self.fetch_stream(chain, abi::event_topic(abi::TOKENS_WITHDRAWN), from, height),
        );

        // A window that starts after genesis can miss long-idle stakers
        let mut complete = from == 0;
        if let (Err(a), Err(b)) = (&staked, &withdrawn) {
            warn!("Both stake event streams failed: {}; {}", a, b);
            return Err(ReconstructionFailure::LogsUnavailable);
        }
        let staked = staked.unwrap_or_else(|e| {
            warn!("TokensStaked query failed, replaying without it: {}", e);
            complete = false;
            Vec::new()
        });
        let withdrawn = withdrawn.unwrap_or_else(|e| {
            warn!("TokensWithdrawn query failed, replaying without it: {}", e);
            complete = false;
            Vec::new()
        });

        let balances = replay(&staked, &withdrawn);
        info!(
            "Replayed {} stake and {} withdraw events into {} balances (complete: {})",
            staked.len(),
            withdrawn.len(),
            balances.len(),
            complete
        );

        Ok(Reconstruction { balances, complete })
    }
}
