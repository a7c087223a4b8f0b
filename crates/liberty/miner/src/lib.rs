//! Liberty Sealing Engine
//!
//! This crate seals blocks for the Liberty network using the Blake3
//! hash-chain proof-of-work, either on local CPU threads or by handing work
//! out to remote miners.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        LIBERTY SEALER                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  Sealer::seal                                            │   │
//! │   │  • fake / shared / search dispatch                       │   │
//! │   │  • restarts the search when the thread count changes     │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! │                 │                              │                │
//! │   ┌──────────────────────────┐   ┌──────────────────────────┐   │
//! │   │  Nonce search threads     │   │  Remote sealer task       │   │
//! │   │  • one sub-range each     │   │  • work packages          │   │
//! │   │  • first solution wins    │   │  • submitted solutions    │   │
//! │   │  • abort on stop          │   │  • hash rates, cleanup    │   │
//! │   └──────────────────────────┘   └──────────────────────────┘   │
//! │                 │                              │                │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  Results sink (single slot, dropped when full)           │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod api;
pub mod config;
pub mod hashrate;
pub mod notify;
pub mod remote;
pub mod sealer;
pub mod template;
pub mod work;
pub mod worker;

pub use api::{WorkApi, WorkApiError};
pub use config::SealerConfig;
pub use hashrate::Meter;
pub use remote::{RemoteSealer, RemoteSealerHandle, Solution};
pub use sealer::{SealTask, Sealer};
pub use template::BlockTemplate;
pub use work::WorkPackage;

use alloy_primitives::B256;
use liberty_consensus::PowError;
use thiserror::Error;

/// Errors starting a sealing attempt
#[derive(Debug, Error)]
pub enum SealError {
    /// The OS random source could not seed the nonce generator
    #[error("random seed unavailable: {0}")]
    RandomSeedUnavailable(#[source] rand::Error),

    /// The search coordinator thread could not be started
    #[error("failed to spawn sealing thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Remote sealer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteSealerError {
    /// No block has been pushed yet
    #[error("no mining work available yet")]
    NoMiningWork,

    /// Submitted seal hash has no pending work
    #[error("no pending work for seal hash {0}")]
    NoMatchingWork(B256),

    /// Submitted solution failed verification
    #[error("invalid proof-of-work solution: {0}")]
    InvalidSolution(#[from] PowError),

    /// The mailbox is full, the request was not queued
    #[error("remote sealer mailbox is full")]
    MailboxFull,

    /// The remote sealer has shut down
    #[error("remote sealer stopped")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_messages() {
        assert_eq!(RemoteSealerError::NoMiningWork.to_string(), "no mining work available yet");
        let err = RemoteSealerError::from(PowError::ZeroDifficulty);
        assert!(err.to_string().contains("non-positive difficulty"));
    }
}
