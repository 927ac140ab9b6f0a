//! Minimal ABI helpers for the vault contract
//!
//! The vault surface we read is tiny and fully static (addresses and uint256s),
//! so encoding is just 32-byte words and decoding is slicing.

use alloy_primitives::{keccak256, Address, B256, U256};
use thiserror::Error;

/// `stakersArray(uint256) returns (address)`
pub const STAKERS_ARRAY: &str = "stakersArray(uint256)";
/// `getStakeInfo(address) returns (uint256 _tokensStaked, uint256 _rewards)`
pub const GET_STAKE_INFO: &str = "getStakeInfo(address)";
/// `event TokensStaked(address indexed staker, uint256 amount)`
pub const TOKENS_STAKED: &str = "TokensStaked(address,uint256)";
/// `event TokensWithdrawn(address indexed staker, uint256 amount)`
pub const TOKENS_WITHDRAWN: &str = "TokensWithdrawn(address,uint256)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("return data too short: need word {index}, got {len} bytes")]
    ShortData { index: usize, len: usize },

    #[error("word is not a left-padded address")]
    NotAnAddress,

    #[error("log is missing indexed topic {0}")]
    MissingTopic(usize),
}

/// First four bytes of keccak256(signature).
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// keccak256(signature), used as topic0.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

pub fn address_word(addr: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    B256::from(word)
}

pub fn u256_word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

fn word(data: &[u8], index: usize) -> Result<&[u8], AbiError> {
    let start = index * 32;
    data.get(start..start + 32).ok_or(AbiError::ShortData {
        index,
        len: data.len(),
    })
}

/// Decode the `index`-th return word as uint256.
pub fn decode_u256(data: &[u8], index: usize) -> Result<U256, AbiError> {
    Ok(U256::from_be_slice(word(data, index)?))
}

/// Decode the `index`-th return word as an address.
///
/// The upper 12 bytes must be zero.
pub fn decode_address(data: &[u8], index: usize) -> Result<Address, AbiError> {
    address_from_word(word(data, index)?)
}

fn address_from_word(word: &[u8]) -> Result<Address, AbiError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::NotAnAddress);
    }
    Ok(Address::from_slice(&word[12..]))
}

/// Decode an indexed address topic (`topics[position]`).
pub fn decode_topic_address(topics: &[B256], position: usize) -> Result<Address, AbiError> {
    let topic = topics.get(position).ok_or(AbiError::MissingTopic(position))?;
    address_from_word(topic.as_slice())
}
