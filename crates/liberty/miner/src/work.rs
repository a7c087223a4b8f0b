//! Work packages published to remote miners

use alloy_consensus::Header;
use alloy_primitives::{B256, U256};
use liberty_consensus::{compute_seal_hash, difficulty_to_target, seed_hash};
use serde::{Serialize, Serializer};

/// Compact description of a sealing task.
///
/// On the wire this is a four element array of hex strings:
///
/// - `[0]` 32 bytes, header seal hash
/// - `[1]` 32 bytes, seed hash
/// - `[2]` 32 bytes, boundary condition ("target"), `2^256 / difficulty`
/// - `[3]` block number, minimal hex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPackage {
    /// Header hash excluding nonce and mix digest
    pub seal_hash: B256,
    /// Seed hash of the block's epoch
    pub seed_hash: B256,
    /// Highest digest accepted for this header
    pub target: U256,
    /// Block number
    pub number: u64,
}

impl WorkPackage {
    /// Derive the package for a candidate header
    pub fn new(header: &Header) -> Self {
        Self {
            seal_hash: compute_seal_hash(header),
            seed_hash: seed_hash(header.number),
            target: difficulty_to_target(header.difficulty),
            number: header.number,
        }
    }

    /// Wire representation
    pub fn to_hex(&self) -> [String; 4] {
        [
            format!("{:#x}", self.seal_hash),
            format!("{:#x}", self.seed_hash),
            format!("{:#x}", B256::from(self.target.to_be_bytes::<32>())),
            format!("{:#x}", self.number),
        ]
    }
}

impl Serialize for WorkPackage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hex().serialize(serializer)
    }
}
