//! In-memory `ChainReader` for tests
//!
//! Simulates the vault's staker index, stake table and stake events, and
//! counts every call so tests can assert that no chain I/O happened.

use crate::abi::{self, address_word, u256_word};
use crate::error::ChainCallError;
use crate::reader::ChainReader;
use crate::types::{ContractCall, Log, LogFilter};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn addr(n: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    Address::from_slice(&bytes)
}

fn revert() -> ChainCallError {
    ChainCallError::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
    }
}

#[derive(Default)]
pub struct MockChain {
    /// Contents of `stakersArray`
    pub index: Vec<Address>,
    /// When set, every index returns an address (`addr(i + 1)`)
    pub endless_index: bool,
    /// `getStakeInfo` tokensStaked per address
    pub stakes: HashMap<Address, U256>,
    /// Addresses whose `getStakeInfo` read fails
    pub failing_stakes: HashSet<Address>,
    /// Index reads at or past this offset fail with a transport error
    pub index_transport_failure_from: Option<u64>,
    pub staked_events: Vec<(Address, U256)>,
    pub withdrawn_events: Vec<(Address, U256)>,
    pub fail_staked_logs: bool,
    pub fail_withdrawn_logs: bool,
    /// Every call fails with a transport error
    pub unreachable: bool,
    /// `getStakeInfo` reads time out; switchable after construction
    pub stakes_unreachable: AtomicBool,
    /// Batch requests come back as one JSON-RPC error object, like a node without batch support
    pub reject_batches: bool,
    pub height: u64,
    calls: AtomicUsize,
    log_queries: AtomicUsize,
}

impl MockChain {
    pub fn with_stakers(stakers: &[(Address, u64)]) -> Self {
        let mut chain = MockChain::default();
        for (address, amount) in stakers {
            chain.index.push(*address);
            chain.stakes.insert(*address, U256::from(*amount));
        }
        chain
    }

    pub fn unreachable() -> Self {
        MockChain {
            unreachable: true,
            ..MockChain::default()
        }
    }

    /// Total number of logical reads (each batch element counts once).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log_queries(&self) -> usize {
        self.log_queries.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &ContractCall) -> Result<Vec<u8>, ChainCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ChainCallError::Transport("connection refused".to_string()));
        }

        let arg = call.args.first().copied().unwrap_or(B256::ZERO);
        if call.selector == abi::selector(abi::STAKERS_ARRAY) {
            let i = abi::decode_u256(arg.as_slice(), 0)
                .map_err(|e| ChainCallError::Malformed(e.to_string()))?;
            let i: u64 = i.as_limbs()[0];
            if let Some(from) = self.index_transport_failure_from {
                if i >= from {
                    return Err(ChainCallError::Timeout);
                }
            }
            if self.endless_index {
                return Ok(address_word(addr(i + 1)).to_vec());
            }
            return self
                .index
                .get(i as usize)
                .map(|a| address_word(*a).to_vec())
                .ok_or_else(revert);
        }

        if call.selector == abi::selector(abi::GET_STAKE_INFO) {
            let staker = abi::decode_address(arg.as_slice(), 0)
                .map_err(|e| ChainCallError::Malformed(e.to_string()))?;
            if self.stakes_unreachable.load(Ordering::SeqCst) {
                return Err(ChainCallError::Timeout);
            }
            if self.failing_stakes.contains(&staker) {
                return Err(revert());
            }
            let staked = self.stakes.get(&staker).copied().unwrap_or(U256::ZERO);
            let mut out = u256_word(staked).to_vec();
            out.extend_from_slice(u256_word(U256::ZERO).as_slice());
            return Ok(out);
        }

        Err(revert())
    }
}

fn stake_log(topic0: B256, staker: Address, amount: U256, position: usize) -> Log {
    Log {
        address: Address::ZERO,
        topics: vec![topic0, address_word(staker)],
        data: u256_word(amount).to_vec(),
        block_number: Some(position as u64 + 1),
        log_index: Some(0),
        removed: false,
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn read_one(&self, call: &ContractCall) -> Result<Vec<u8>, ChainCallError> {
        self.answer(call)
    }

    async fn read_batch(&self, calls: &[ContractCall]) -> Vec<Result<Vec<u8>, ChainCallError>> {
        if self.reject_batches {
            self.calls.fetch_add(calls.len(), Ordering::SeqCst);
            let rejected = ChainCallError::Rpc {
                code: -32600,
                message: "batch requests are not supported".to_string(),
            };
            return vec![Err(rejected); calls.len()];
        }
        calls.iter().map(|call| self.answer(call)).collect()
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ChainCallError::Transport("connection refused".to_string()));
        }

        let (events, failing) = if filter.topic0 == abi::event_topic(abi::TOKENS_STAKED) {
            (&self.staked_events, self.fail_staked_logs)
        } else if filter.topic0 == abi::event_topic(abi::TOKENS_WITHDRAWN) {
            (&self.withdrawn_events, self.fail_withdrawn_logs)
        } else {
            return Ok(Vec::new());
        };
        if failing {
            return Err(ChainCallError::Timeout);
        }

        // Event i lives in block i + 1
        Ok(events
            .iter()
            .enumerate()
            .map(|(i, (staker, amount))| stake_log(filter.topic0, *staker, *amount, i))
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= filter.from_block && block <= filter.to_block
            })
            .collect())
    }

    async fn current_block_height(&self) -> Result<u64, ChainCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ChainCallError::Transport("connection refused".to_string()));
        }
        Ok(self.height)
    }
}
