//! Balance reconstruction strategies
//!
//! A `Reconstructor` turns chain reads into the current set of non-zero stake
//! balances. Two independent strategies exist (index enumeration and event
//! replay); `FallbackReconstructor` chains them behind the same trait.

use crate::enumeration::{EnumerationParams, EnumerationReconstructor};
use crate::error::ReconstructionFailure;
use crate::reader::ChainReader;
use crate::replay::{LogReplayParams, LogReplayReconstructor};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::warn;

/// Result of one reconstruction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// Non-zero balances, in the order participants were discovered
    pub balances: IndexMap<Address, U256>,
    /// False when the pass knowingly missed part of the participant set
    pub complete: bool,
}

#[async_trait]
pub trait Reconstructor: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    async fn reconstruct(
        &self,
        chain: &dyn ChainReader,
    ) -> Result<Reconstruction, ReconstructionFailure>;
}

/// Which strategy (or combination) the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    /// Walk the vault's staker index and batch-read each stake
    Enumeration,
    /// Replay stake/withdraw events over a recent block window
    LogReplay,
    /// Enumeration, falling back to log replay when the index is unreadable
    EnumerationThenLogs,
}

pub fn build_reconstructor(
    strategy: Strategy,
    enumeration: EnumerationParams,
    replay: LogReplayParams,
) -> Arc<dyn Reconstructor> {
    match strategy {
        Strategy::Enumeration => Arc::new(EnumerationReconstructor::new(enumeration)),
        Strategy::LogReplay => Arc::new(LogReplayReconstructor::new(replay)),
        Strategy::EnumerationThenLogs => Arc::new(FallbackReconstructor::new(
            Arc::new(EnumerationReconstructor::new(enumeration)),
            Arc::new(LogReplayReconstructor::new(replay)),
        )),
    }
}

/// Runs `primary`, and `secondary` only if `primary` fails outright.
pub struct FallbackReconstructor {
    primary: Arc<dyn Reconstructor>,
    secondary: Arc<dyn Reconstructor>,
}

impl FallbackReconstructor {
    pub fn new(primary: Arc<dyn Reconstructor>, secondary: Arc<dyn Reconstructor>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Reconstructor for FallbackReconstructor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn reconstruct(
        &self,
        chain: &dyn ChainReader,
    ) -> Result<Reconstruction, ReconstructionFailure> {
        match self.primary.reconstruct(chain).await {
            Ok(reconstruction) => Ok(reconstruction),
            Err(e) => {
                warn!(
                    "{} reconstruction failed ({}), trying {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
                self.secondary
                    .reconstruct(chain)
                    .await
                    .map_err(|e| ReconstructionFailure::Exhausted(Box::new(e)))
            }
        }
    }
}
