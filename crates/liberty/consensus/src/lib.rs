//! Liberty Consensus Implementation
//!
//! This crate provides the proof-of-work rules shared by the sealer and the
//! verifier:
//! - Blake3 hash chain: sequential-latency PoW over the header seal hash
//! - Target arithmetic: `floor(2^256 / difficulty)`
//! - Seal verification for submitted or imported headers

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod pow;

pub use pow::{compute_seal_hash, difficulty_to_target, meets_target, seed_hash};

use alloy_consensus::{Block, Header, TxEnvelope};
use alloy_primitives::{B64, B256, U256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Maximum depth of an acceptable stale but valid solution.
///
/// Work for block `n` is dropped once the tip reaches `n + STALE_THRESHOLD`.
pub const STALE_THRESHOLD: u64 = 7;

/// Block type the sealer operates on.
pub type SealBlock = Block<TxEnvelope>;

/// Returns a copy of `block` carrying the given sealed header.
pub fn with_seal(block: &SealBlock, header: Header) -> SealBlock {
    Block::new(header, block.body.clone())
}

/// Returns a copy of `header` with nonce and mix digest filled in.
pub fn seal_header(header: &Header, nonce: u64, mix_digest: B256) -> Header {
    let mut sealed = header.clone();
    sealed.nonce = B64::from(nonce.to_be_bytes());
    sealed.mix_hash = mix_digest;
    sealed
}

/// Read access to the chain the sealer builds on.
pub trait ChainHeaderReader: Send + Sync {
    /// Returns the current canonical head, if any.
    fn current_header(&self) -> Option<Header>;
}

/// Proof-of-work operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowMode {
    /// Full hash chain, production rules
    #[default]
    Normal,
    /// Shortened hash chain for tests and dev chains
    Test,
    /// Seal with a zero nonce, accept every seal
    Fake,
    /// Like `Fake`, and the header checks are skipped by the importer too
    FullFake,
}

impl PowMode {
    /// Whether sealing is skipped entirely in this mode
    pub const fn is_fake(&self) -> bool {
        matches!(self, Self::Fake | Self::FullFake)
    }
}

impl fmt::Display for PowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Test => "test",
            Self::Fake => "fake",
            Self::FullFake => "full-fake",
        };
        f.write_str(s)
    }
}

impl FromStr for PowMode {
    type Err = PowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "test" => Ok(Self::Test),
            "fake" => Ok(Self::Fake),
            "full-fake" | "fullfake" => Ok(Self::FullFake),
            other => Err(PowError::UnknownMode(other.to_string())),
        }
    }
}

/// Proof-of-work engine parameterised by mode.
///
/// The sealer and the verifier must share a mode, since the mode fixes the
/// hash chain length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pow {
    mode: PowMode,
}

impl Pow {
    /// Create an engine for the given mode
    pub const fn new(mode: PowMode) -> Self {
        Self { mode }
    }

    /// The configured mode
    pub const fn mode(&self) -> PowMode {
        self.mode
    }

    /// Number of extra hash applications after the initial hash
    pub const fn rounds(&self) -> u32 {
        match self.mode {
            PowMode::Test => pow::TEST_HASH_ROUNDS,
            _ => pow::HASH_ROUNDS,
        }
    }

    /// Evaluate the hash chain for `(seal_hash, nonce)`
    pub fn evaluate(&self, seal_hash: &B256, nonce: u64) -> B256 {
        pow::hash_chain(seal_hash, nonce, self.rounds())
    }

    /// Verify that the header's nonce and mix digest satisfy its difficulty.
    pub fn verify_seal(&self, header: &Header) -> Result<(), PowError> {
        if self.mode.is_fake() {
            return Ok(());
        }
        if header.difficulty.is_zero() {
            return Err(PowError::ZeroDifficulty);
        }

        let seal_hash = compute_seal_hash(header);
        let nonce = u64::from_be_bytes(header.nonce.0);
        let digest = self.evaluate(&seal_hash, nonce);

        if digest != header.mix_hash {
            return Err(PowError::InvalidMixDigest { expected: digest, got: header.mix_hash });
        }
        if !meets_target(&digest, difficulty_to_target(header.difficulty)) {
            return Err(PowError::InvalidProofOfWork { difficulty: header.difficulty });
        }
        Ok(())
    }
}

/// Liberty proof-of-work errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowError {
    /// Header carries a zero difficulty
    #[error("non-positive difficulty")]
    ZeroDifficulty,
    /// Mix digest does not match the recomputed digest
    #[error("invalid mix digest: expected {expected}, got {got}")]
    InvalidMixDigest {
        /// Digest recomputed from the seal hash and nonce
        expected: B256,
        /// Digest carried by the header
        got: B256,
    },
    /// Digest is above the difficulty target
    #[error("invalid proof-of-work for difficulty {difficulty}")]
    InvalidProofOfWork {
        /// Header difficulty
        difficulty: U256,
    },
    /// Unrecognised PoW mode name
    #[error("unknown pow mode: {0}")]
    UnknownMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn header(difficulty: u64) -> Header {
        Header { number: 100, difficulty: U256::from(difficulty), ..Default::default() }
    }

    fn solve(pow: &Pow, header: &Header) -> Header {
        let seal_hash = compute_seal_hash(header);
        let target = difficulty_to_target(header.difficulty);
        (0u64..)
            .find_map(|nonce| {
                let digest = pow.evaluate(&seal_hash, nonce);
                meets_target(&digest, target).then(|| seal_header(header, nonce, digest))
            })
            .unwrap()
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [PowMode::Normal, PowMode::Test, PowMode::Fake, PowMode::FullFake] {
            assert_eq!(mode.to_string().parse::<PowMode>().unwrap(), mode);
        }
        assert_matches!("ethash".parse::<PowMode>(), Err(PowError::UnknownMode(_)));
    }

    #[test]
    fn test_verify_solved_header() {
        let pow = Pow::new(PowMode::Test);
        let sealed = solve(&pow, &header(4));
        assert_eq!(pow.verify_seal(&sealed), Ok(()));
    }

    #[test]
    fn test_verify_rejects_wrong_mix() {
        let pow = Pow::new(PowMode::Test);
        let mut sealed = solve(&pow, &header(4));
        sealed.mix_hash = B256::repeat_byte(0xab);
        assert_matches!(pow.verify_seal(&sealed), Err(PowError::InvalidMixDigest { .. }));
    }

    #[test]
    fn test_verify_rejects_digest_above_target() {
        let pow = Pow::new(PowMode::Test);
        let unsealed = header(1 << 40);
        let seal_hash = compute_seal_hash(&unsealed);
        // With 2^40 difficulty a digest meeting the target among the first
        // few nonces is astronomically unlikely.
        let nonce = (0u64..16)
            .find(|n| {
                let digest = pow.evaluate(&seal_hash, *n);
                !meets_target(&digest, difficulty_to_target(unsealed.difficulty))
            })
            .unwrap();
        let sealed = seal_header(&unsealed, nonce, pow.evaluate(&seal_hash, nonce));
        assert_matches!(pow.verify_seal(&sealed), Err(PowError::InvalidProofOfWork { .. }));
    }

    #[test]
    fn test_verify_zero_difficulty() {
        let pow = Pow::new(PowMode::Test);
        assert_eq!(pow.verify_seal(&header(0)), Err(PowError::ZeroDifficulty));
    }

    #[test]
    fn test_fake_mode_accepts_anything() {
        let pow = Pow::new(PowMode::Fake);
        assert_eq!(pow.verify_seal(&header(1 << 40)), Ok(()));
    }

    #[test]
    fn test_test_mode_is_shorter() {
        assert!(Pow::new(PowMode::Test).rounds() < Pow::new(PowMode::Normal).rounds());
        assert_eq!(Pow::default().rounds(), pow::HASH_ROUNDS);
    }
}
