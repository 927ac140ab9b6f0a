//! Leaderboard snapshots
//!
//! Ranks reconstructed balances and freezes them into an immutable,
//! timestamped snapshot. Amounts travel as decimal strings so 256-bit values
//! survive JSON clients that parse numbers as doubles.

use crate::reconstruct::Reconstruction;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_TOP_N: usize = 5;

/// Basis points in 100%.
const BPS: u64 = 10_000;

/// One ranked participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub address: Address,
    #[serde(with = "decimal_u256")]
    pub amount: U256,
    /// Share of `total_staked`, in basis points (rounded down)
    pub share_bps: u32,
}

/// Immutable leaderboard result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    /// Top participants, highest stake first
    pub entries: Vec<LeaderboardEntry>,
    /// Sum over every non-zero participant, not just `entries`
    #[serde(with = "decimal_u256")]
    pub total_staked: U256,
    /// Number of non-zero participants
    pub participant_count: usize,
    /// False when the reconstruction knowingly missed participants
    pub complete: bool,
    /// Token the amounts are denominated in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_token: Option<Address>,
    /// Unix epoch milliseconds
    pub generated_at: u64,
}

impl LeaderboardSnapshot {
    /// The "no data yet" snapshot served when nothing better is available.
    pub fn empty(generated_at: u64) -> Self {
        Self {
            entries: Vec::new(),
            total_staked: U256::ZERO,
            participant_count: 0,
            complete: false,
            staking_token: None,
            generated_at,
        }
    }
}

/// Current time as Unix epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn share_bps(amount: U256, total: U256) -> u32 {
    if total.is_zero() {
        return 0;
    }
    let bps = match amount.checked_mul(U256::from(BPS)) {
        Some(scaled) => scaled / total,
        // amount is close to U256::MAX, so total / BPS cannot be zero
        None => amount / (total / U256::from(BPS)),
    };
    if bps > U256::from(BPS) {
        BPS as u32
    } else {
        bps.as_limbs()[0] as u32
    }
}

/// Builds snapshots from reconstructed balances.
#[derive(Debug, Clone)]
pub struct LeaderboardBuilder {
    top_n: usize,
    staking_token: Option<Address>,
}

impl Default for LeaderboardBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl LeaderboardBuilder {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            staking_token: None,
        }
    }

    pub fn with_staking_token(mut self, token: Address) -> Self {
        self.staking_token = Some(token);
        self
    }

    /// The "no data yet" snapshot, carrying the same staking token as built ones.
    pub fn empty(&self, generated_at: u64) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            staking_token: self.staking_token,
            ..LeaderboardSnapshot::empty(generated_at)
        }
    }

    /// Rank `reconstruction` into a snapshot stamped with `generated_at`.
    ///
    /// Sorted by amount descending. Equal amounts keep discovery order (the
    /// sort is stable), so the same input always ranks the same way.
    pub fn build(&self, reconstruction: &Reconstruction, generated_at: u64) -> LeaderboardSnapshot {
        let mut ranked: Vec<(Address, U256)> = reconstruction
            .balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(address, amount)| (*address, *amount))
            .collect();

        let total_staked = ranked
            .iter()
            .fold(U256::ZERO, |acc, (_, amount)| acc.saturating_add(*amount));
        let participant_count = ranked.len();

        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.top_n);

        let entries = ranked
            .into_iter()
            .map(|(address, amount)| LeaderboardEntry {
                address,
                amount,
                share_bps: share_bps(amount, total_staked),
            })
            .collect();

        LeaderboardSnapshot {
            entries,
            total_staked,
            participant_count,
            complete: reconstruction.complete,
            staking_token: self.staking_token,
            generated_at,
        }
    }
}

/// Serialize U256 as a decimal string ("1500"), accepting decimal or 0x-hex on input.
mod decimal_u256 {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<U256>().map_err(serde::de::Error::custom)
    }
}
