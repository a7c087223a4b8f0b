//! Block template for mining
//!
//! A block template contains all the information needed to mine a new block,
//! except for the nonce and mix_hash which are found through PoW.

use alloy_consensus::{BlockBody, Header};
use alloy_primitives::{Address, B256, Bytes, U256};
use liberty_consensus::{SealBlock, compute_seal_hash, difficulty_to_target};

/// Block template for mining
///
/// Contains all block data except nonce/mix_hash which are found by mining.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Parent block hash
    pub parent_hash: B256,
    /// Block number
    pub number: u64,
    /// Timestamp (seconds since epoch)
    pub timestamp: u64,
    /// Miner address (coinbase)
    pub beneficiary: Address,
    /// State root after transactions
    pub state_root: B256,
    /// Difficulty
    pub difficulty: U256,
    /// Gas limit
    pub gas_limit: u64,
    /// Extra data (max 32 bytes)
    pub extra_data: Bytes,
}

impl BlockTemplate {
    /// Create a new block template
    pub fn new(
        parent_hash: B256,
        number: u64,
        timestamp: u64,
        beneficiary: Address,
        difficulty: U256,
    ) -> Self {
        Self {
            parent_hash,
            number,
            timestamp,
            beneficiary,
            state_root: B256::ZERO,
            difficulty,
            gas_limit: 30_000_000,
            extra_data: Bytes::from_static(b"liberty"),
        }
    }

    /// Create the template for the child of `parent`
    pub fn child_of(parent: &Header, timestamp: u64, beneficiary: Address) -> Self {
        Self {
            gas_limit: parent.gas_limit,
            ..Self::new(parent.hash_slow(), parent.number + 1, timestamp, beneficiary, parent.difficulty)
        }
    }

    /// Convert template to a header (without nonce/mix_hash)
    pub fn to_header(&self) -> Header {
        Header {
            parent_hash: self.parent_hash,
            beneficiary: self.beneficiary,
            state_root: self.state_root,
            difficulty: self.difficulty,
            number: self.number,
            gas_limit: self.gas_limit,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            ..Default::default()
        }
    }

    /// Convert template to an empty block ready for sealing
    pub fn into_block(self) -> SealBlock {
        SealBlock::new(
            self.to_header(),
            BlockBody { transactions: Vec::new(), ommers: Vec::new(), withdrawals: None },
        )
    }

    /// Compute the seal hash for this template
    pub fn seal_hash(&self) -> B256 {
        compute_seal_hash(&self.to_header())
    }

    /// Get the target value from difficulty
    pub fn target(&self) -> U256 {
        difficulty_to_target(self.difficulty)
    }
}
