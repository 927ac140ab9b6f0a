//! Stakeboard - staking vault leaderboard
//!
//! This library reconstructs current stake balances for a staking vault
//! contract, either by walking the vault's staker index or by replaying its
//! stake/withdraw events, and ranks them into cached leaderboard snapshots.

pub mod abi;
pub mod error;
pub mod reader;
pub mod rpc;
pub mod types;

// Reconstruction strategies
pub mod enumeration;
pub mod reconstruct;
pub mod replay;

// Serving
pub mod cache;
pub mod config;
pub mod leaderboard;
pub mod server;
pub mod service;
pub mod status;

#[cfg(test)]
mod testing;

// Re-export the main types for convenience
pub use error::{CacheUnavailableError, ChainCallError, ReconstructionFailure, UnauthorizedRefreshError};
pub use leaderboard::{LeaderboardBuilder, LeaderboardEntry, LeaderboardSnapshot};
pub use reader::ChainReader;
pub use reconstruct::{Reconstruction, Reconstructor, Strategy};
pub use service::{LeaderboardRequest, LeaderboardService};
