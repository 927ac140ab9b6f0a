//! Index enumeration strategy
//!
//! Walks the vault's `stakersArray` from offset 0 in fixed-size pages until a
//! page comes back short, then batch-reads `getStakeInfo` for every distinct
//! staker. Reads past the end of the array revert, and that is how the end is
//! detected.

use crate::abi::{self, u256_word};
use crate::error::{ChainCallError, ReconstructionFailure};
use crate::reader::ChainReader;
use crate::reconstruct::{Reconstruction, Reconstructor};
use crate::types::ContractCall;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const DEFAULT_MAX_INDEX: u64 = 5000;
pub const DEFAULT_BALANCE_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct EnumerationParams {
    /// Vault contract
    pub vault: Address,
    /// Index reads per round trip
    pub page_size: u64,
    /// Stop (and flag the result incomplete) once the next offset passes this
    pub max_index: u64,
    /// `getStakeInfo` reads per round trip
    pub balance_batch_size: usize,
}

impl EnumerationParams {
    pub fn new(vault: Address) -> Self {
        Self {
            vault,
            page_size: DEFAULT_PAGE_SIZE,
            max_index: DEFAULT_MAX_INDEX,
            balance_batch_size: DEFAULT_BALANCE_BATCH_SIZE,
        }
    }
}

pub struct EnumerationReconstructor {
    params: EnumerationParams,
}

/// Addresses found in the index, deduplicated in first-seen order.
struct Discovery {
    stakers: IndexSet<Address>,
    complete: bool,
}

/// Outcome of reading every discovered staker's stake.
struct StakeReads {
    balances: IndexMap<Address, U256>,
    /// Reads that failed for any reason (counted as zero)
    failed: usize,
    /// Reads that never reached the contract, with the first such error
    unreachable: usize,
    first_unreachable: Option<ChainCallError>,
}

impl EnumerationReconstructor {
    pub fn new(params: EnumerationParams) -> Self {
        Self { params }
    }

    fn index_call(&self, offset: u64) -> ContractCall {
        ContractCall::new(
            self.params.vault,
            abi::selector(abi::STAKERS_ARRAY),
            vec![u256_word(U256::from(offset))],
        )
    }

    fn stake_call(&self, staker: Address) -> ContractCall {
        ContractCall::new(
            self.params.vault,
            abi::selector(abi::GET_STAKE_INFO),
            vec![abi::address_word(staker)],
        )
    }

    async fn discover(&self, chain: &dyn ChainReader) -> Result<Discovery, ReconstructionFailure> {
        let page_size = self.params.page_size.max(1);
        let mut stakers = IndexSet::new();
        let mut complete = true;
        let mut index = 0u64;

        loop {
            let calls: Vec<ContractCall> = (index..index.saturating_add(page_size))
                .map(|offset| self.index_call(offset))
                .collect();
            let results = chain.read_batch(&calls).await;

            let mut found = 0u64;
            let mut unreachable: Option<ChainCallError> = None;
            for result in results {
                let decoded = result.and_then(|data| {
                    abi::decode_address(&data, 0)
                        .map_err(|e| ChainCallError::Malformed(e.to_string()))
                });
                match decoded {
                    Ok(staker) => {
                        found += 1;
                        stakers.insert(staker);
                    }
                    // Reverts mark the end of the array
                    Err(e) if e.is_rejection() => {}
                    Err(e) => {
                        unreachable.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = unreachable {
                if index == 0 && found == 0 {
                    return Err(ReconstructionFailure::IndexUnavailable(e));
                }
                warn!(
                    "Staker index page at offset {} partially unreadable ({}); treating as end",
                    index, e
                );
                complete = false;
            }

            debug!("Index page at offset {}: {} addresses", index, found);
            if found < page_size {
                break;
            }

            index = index.saturating_add(page_size);
            if index > self.params.max_index {
                warn!(
                    "Staker index still full at offset {}; stopping at max index {}",
                    index, self.params.max_index
                );
                complete = false;
                break;
            }
        }

        Ok(Discovery { stakers, complete })
    }

    /// Read current stake for every staker; failed reads count as zero.
    async fn read_stakes(&self, chain: &dyn ChainReader, stakers: &IndexSet<Address>) -> StakeReads {
        let stakers: Vec<Address> = stakers.iter().copied().collect();
        let batch_size = self.params.balance_batch_size.max(1);

        let chunks = stakers.chunks(batch_size).map(move |chunk| async move {
            let calls: Vec<ContractCall> = chunk.iter().map(|s| self.stake_call(*s)).collect();
            let results = chain.read_batch(&calls).await;
            chunk
                .iter()
                .copied()
                .zip(results)
                .map(|(staker, result)| {
                    let amount = result.and_then(|data| {
                        abi::decode_u256(&data, 0)
                            .map_err(|e| ChainCallError::Malformed(e.to_string()))
                    });
                    (staker, amount)
                })
                .collect::<Vec<_>>()
        });

        let mut reads = StakeReads {
            balances: IndexMap::new(),
            failed: 0,
            unreachable: 0,
            first_unreachable: None,
        };
        for (staker, amount) in join_all(chunks).await.into_iter().flatten() {
            let amount = match amount {
                Ok(amount) => amount,
                Err(e) => {
                    debug!("getStakeInfo({:?}) failed: {}", staker, e);
                    reads.failed += 1;
                    if !e.is_rejection() {
                        reads.unreachable += 1;
                        reads.first_unreachable.get_or_insert(e);
                    }
                    U256::ZERO
                }
            };
            if amount > U256::ZERO {
                reads.balances.insert(staker, amount);
            }
        }

        if reads.failed > 0 {
            warn!(
                "{} of {} stake reads failed and were counted as zero",
                reads.failed,
                stakers.len()
            );
        }
        reads
    }
}

#[async_trait]
impl Reconstructor for EnumerationReconstructor {
    fn name(&self) -> &'static str {
        "enumeration"
    }

    async fn reconstruct(
        &self,
        chain: &dyn ChainReader,
    ) -> Result<Reconstruction, ReconstructionFailure> {
        let discovery = self.discover(chain).await?;
        let reads = self.read_stakes(chain, &discovery.stakers).await;

        // No stake read reached the contract, so no balance is known
        if reads.unreachable > 0 && reads.unreachable == discovery.stakers.len() {
            if let Some(e) = reads.first_unreachable {
                return Err(ReconstructionFailure::StakesUnavailable(e));
            }
        }

        let complete = discovery.complete && reads.failed == 0;
        info!(
            "Enumerated {} stakers, {} with non-zero stake (complete: {})",
            discovery.stakers.len(),
            reads.balances.len(),
            complete
        );

        Ok(Reconstruction {
            balances: reads.balances,
            complete,
        })
    }
}
