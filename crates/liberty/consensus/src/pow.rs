//! Liberty Proof-of-Work Algorithm
//!
//! Sequential Blake3 hash chain over the header seal hash:
//!
//!   1. digest = BLAKE3(seal_hash || nonce_be)
//!   2. repeat HASH_ROUNDS times: digest = BLAKE3(digest)
//!   3. valid iff uint256_be(digest) <= floor(2^256 / difficulty)
//!
//! There is no DAG. Resistance comes from the chain being strictly
//! sequential: every round depends on the previous 32-byte output, so one
//! evaluation cannot be parallelised, only many nonces side by side.
//!
//! The final digest doubles as the header mix digest.

use alloy_consensus::Header;
use alloy_primitives::{B256, U256};
use sha3::{Digest, Keccak256};

/// Hash applications after the initial hash, production chains.
pub const HASH_ROUNDS: u32 = 312_688;

/// Hash applications after the initial hash, test and dev chains.
pub const TEST_HASH_ROUNDS: u32 = 64;

/// Blocks per seed epoch
pub const EPOCH_LENGTH: u64 = 30_000;

/// Run the hash chain for one nonce.
pub fn hash_chain(seal_hash: &B256, nonce: u64, rounds: u32) -> B256 {
    let mut input = [0u8; 40];
    input[..32].copy_from_slice(seal_hash.as_slice());
    input[32..].copy_from_slice(&nonce.to_be_bytes());

    let mut digest = *blake3::hash(&input).as_bytes();
    for _ in 0..rounds {
        digest = *blake3::hash(&digest).as_bytes();
    }
    B256::from(digest)
}

/// Whether `digest`, read as a big-endian integer, is at most `target`.
pub fn meets_target(digest: &B256, target: U256) -> bool {
    U256::from_be_bytes(digest.0) <= target
}

/// Compute seal hash (header hash without nonce/mix_hash)
pub fn compute_seal_hash(header: &Header) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(header.parent_hash.as_slice());
    hasher.update(header.ommers_hash.as_slice());
    hasher.update(header.beneficiary.as_slice());
    hasher.update(header.state_root.as_slice());
    hasher.update(header.transactions_root.as_slice());
    hasher.update(header.receipts_root.as_slice());
    hasher.update(header.logs_bloom.as_slice());
    hasher.update(header.difficulty.to_be_bytes::<32>());
    hasher.update(header.number.to_be_bytes());
    hasher.update(header.gas_limit.to_be_bytes());
    hasher.update(header.gas_used.to_be_bytes());
    hasher.update(header.timestamp.to_be_bytes());
    hasher.update(&header.extra_data);
    if let Some(base_fee) = header.base_fee_per_gas {
        hasher.update(base_fee.to_be_bytes());
    }

    B256::from_slice(&hasher.finalize())
}

/// Seed hash published with work for `block_number`.
///
/// Keccak-256 applied once per elapsed epoch to 32 zero bytes.
pub fn seed_hash(block_number: u64) -> B256 {
    let mut seed = [0u8; 32];
    for _ in 0..block_number / EPOCH_LENGTH {
        seed = Keccak256::digest(seed).into();
    }
    B256::from(seed)
}

/// Convert difficulty to target, `floor(2^256 / difficulty)`.
///
/// Difficulty 1 (and the invalid 0) saturate to `U256::MAX`, which every
/// digest meets.
pub fn difficulty_to_target(difficulty: U256) -> U256 {
    if difficulty <= U256::from(1u64) {
        return U256::MAX;
    }
    // 2^256 = MAX + 1, so the quotient gains one exactly when MAX leaves a
    // remainder of difficulty - 1.
    let quotient = U256::MAX / difficulty;
    let remainder = U256::MAX % difficulty;
    if remainder == difficulty - U256::from(1u64) { quotient + U256::from(1u64) } else { quotient }
}
