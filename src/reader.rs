//! Chain read capability
//!
//! The I/O boundary between the aggregation engine and the chain. Implementors
//! report failures as `ChainCallError` and never retry or cache.

use crate::error::ChainCallError;
use crate::types::{ContractCall, Log, LogFilter};
use async_trait::async_trait;

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Execute one read-only call and return its raw return data.
    async fn read_one(&self, call: &ContractCall) -> Result<Vec<u8>, ChainCallError>;

    /// Execute many independent calls in one round trip.
    ///
    /// The output is aligned with `calls`. One element failing must not fail
    /// the others; a failed round trip is reported on every element.
    async fn read_batch(&self, calls: &[ContractCall]) -> Vec<Result<Vec<u8>, ChainCallError>>;

    /// Fetch logs matching `filter` over its inclusive block range.
    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainCallError>;

    /// Latest block number.
    async fn current_block_height(&self) -> Result<u64, ChainCallError>;
}
