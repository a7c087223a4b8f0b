//! Miner-facing work API
//!
//! Hex-string adapter over [`RemoteSealerHandle`] carrying the get-work,
//! submit-work and submit-hashrate calls remote miners speak.

use crate::{RemoteSealerError, RemoteSealerHandle, Solution};
use alloy_primitives::{Address, B64, B256, U64};
use std::str::FromStr;
use thiserror::Error;

/// Errors reported to remote miners
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkApiError {
    /// No block has been pushed yet
    #[error("no mining work available yet")]
    NoMiningWork,

    /// Unknown work or failed verification
    #[error("invalid or stale proof-of-work solution")]
    InvalidSealResult,

    /// A parameter could not be decoded
    #[error("invalid {field}: {value:?}")]
    InvalidArgument {
        /// Parameter name
        field: &'static str,
        /// Value as received
        value: String,
    },

    /// The remote sealer is not accepting requests
    #[error("remote sealer unavailable")]
    Unavailable,
}

impl From<RemoteSealerError> for WorkApiError {
    fn from(err: RemoteSealerError) -> Self {
        match err {
            RemoteSealerError::NoMiningWork => Self::NoMiningWork,
            RemoteSealerError::NoMatchingWork(_) | RemoteSealerError::InvalidSolution(_) => {
                Self::InvalidSealResult
            }
            RemoteSealerError::MailboxFull | RemoteSealerError::Closed => Self::Unavailable,
        }
    }
}

/// Work API served to remote miners
#[derive(Debug, Clone)]
pub struct WorkApi {
    remote: RemoteSealerHandle,
}

impl WorkApi {
    /// Serve the work of `remote`
    pub const fn new(remote: RemoteSealerHandle) -> Self {
        Self { remote }
    }

    /// Current work as `[seal_hash, seed_hash, target, number]`
    pub async fn get_work(&self) -> Result<[String; 4], WorkApiError> {
        Ok(self.remote.fetch_work().await?.to_hex())
    }

    /// Submit a solution. `Ok(false)` means the solution was valid but too
    /// old to be used.
    pub async fn submit_work(
        &self,
        nonce: &str,
        mix_digest: &str,
        seal_hash: &str,
        miner: &str,
    ) -> Result<bool, WorkApiError> {
        let solution = Solution {
            nonce: parse::<B64>("nonce", nonce)?,
            mix_digest: parse::<B256>("mix digest", mix_digest)?,
            seal_hash: parse::<B256>("seal hash", seal_hash)?,
            miner: parse::<Address>("miner", miner)?,
        };
        Ok(self.remote.submit_work(solution).await?)
    }

    /// Report the hash rate of miner `id`. `rate` is a hex quantity.
    pub async fn submit_hashrate(&self, rate: &str, id: &str) -> Result<bool, WorkApiError> {
        let rate = parse_quantity(rate).ok_or_else(|| WorkApiError::InvalidArgument {
            field: "rate",
            value: rate.to_string(),
        })?;
        let id = parse::<B256>("id", id)?;
        self.remote.submit_hashrate(id, rate).await?;
        Ok(true)
    }
}

fn parse<T: FromStr>(field: &'static str, value: &str) -> Result<T, WorkApiError> {
    value.parse().map_err(|_| WorkApiError::InvalidArgument { field, value: value.to_string() })
}

/// Decode a `0x`-prefixed hex quantity
fn parse_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    value.parse::<U64>().ok().map(|quantity| quantity.to::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockTemplate, RemoteSealer, SealerConfig};
    use alloy_primitives::U256;
    use assert_matches::assert_matches;
    use liberty_consensus::{
        Pow, PowMode, SealBlock, compute_seal_hash, difficulty_to_target, meets_target,
    };
    use tokio::sync::mpsc;

    const POW: Pow = Pow::new(PowMode::Test);

    fn api() -> WorkApi {
        WorkApi::new(RemoteSealer::spawn(POW, &SealerConfig::default().with_mode(PowMode::Test)))
    }

    fn block() -> SealBlock {
        BlockTemplate::new(B256::ZERO, 100, 1000, Address::ZERO, U256::from(4u64)).into_block()
    }

    fn solve(block: &SealBlock) -> (u64, B256) {
        let seal_hash = compute_seal_hash(&block.header);
        let target = difficulty_to_target(block.header.difficulty);
        (0u64..)
            .map(|nonce| (nonce, POW.evaluate(&seal_hash, nonce)))
            .find(|(_, digest)| meets_target(digest, target))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_work_before_push() {
        let err = api().get_work().await.unwrap_err();
        assert_eq!(err, WorkApiError::NoMiningWork);
        assert_eq!(err.to_string(), "no mining work available yet");
    }

    #[tokio::test]
    async fn test_get_and_submit_work() {
        let api = api();
        let (results, mut sealed) = mpsc::channel(1);
        let block = block();
        api.remote.push_work(block.clone(), results).unwrap();

        let [seal_hash, _, target, number] = api.get_work().await.unwrap();
        assert_eq!(seal_hash, format!("{:#x}", compute_seal_hash(&block.header)));
        assert_eq!(target, format!("0x40{}", "0".repeat(62)));
        assert_eq!(number, "0x64");

        let (nonce, digest) = solve(&block);
        let accepted = api
            .submit_work(
                &format!("{:#018x}", nonce),
                &format!("{digest:#x}"),
                &seal_hash,
                "0x1111111111111111111111111111111111111111",
            )
            .await;
        assert_eq!(accepted, Ok(true));
        assert_eq!(sealed.try_recv().unwrap().header.nonce, B64::from(nonce.to_be_bytes()));
    }

    #[tokio::test]
    async fn test_submit_invalid_solution() {
        let api = api();
        let (results, _sealed) = mpsc::channel(1);
        let block = block();
        api.remote.push_work(block.clone(), results).unwrap();
        let seal_hash = format!("{:#x}", compute_seal_hash(&block.header));
        let miner = format!("{:#x}", Address::ZERO);
        let (nonce, _) = solve(&block);
        let nonce = format!("{:#018x}", nonce);

        let wrong_mix = format!("{:#x}", B256::repeat_byte(0xab));
        let err = api.submit_work(&nonce, &wrong_mix, &seal_hash, &miner).await.unwrap_err();
        assert_eq!(err, WorkApiError::InvalidSealResult);
        assert_eq!(err.to_string(), "invalid or stale proof-of-work solution");

        let unknown = format!("{:#x}", B256::repeat_byte(0xcd));
        assert_eq!(
            api.submit_work(&nonce, &wrong_mix, &unknown, &miner).await,
            Err(WorkApiError::InvalidSealResult)
        );
    }

    #[tokio::test]
    async fn test_submit_malformed_arguments() {
        let api = api();
        let hash = format!("{:#x}", B256::ZERO);
        let miner = format!("{:#x}", Address::ZERO);

        assert_matches!(
            api.submit_work("0x12", &hash, &hash, &miner).await,
            Err(WorkApiError::InvalidArgument { field: "nonce", .. })
        );
        assert_matches!(
            api.submit_work("0x0000000000000001", &hash, &hash, "miner").await,
            Err(WorkApiError::InvalidArgument { field: "miner", .. })
        );
    }

    #[tokio::test]
    async fn test_submit_hashrate() {
        let api = api();
        let id = format!("{:#x}", B256::repeat_byte(1));

        assert_eq!(api.submit_hashrate("0x1f4", &id).await, Ok(true));
        assert_eq!(api.remote.hashrate().await, Ok(500));
        assert_matches!(
            api.submit_hashrate("500", &id).await,
            Err(WorkApiError::InvalidArgument { field: "rate", .. })
        );
    }

    #[tokio::test]
    async fn test_stopped_sealer() {
        let api = api();
        api.remote.shutdown().await.unwrap();
        assert_eq!(api.get_work().await, Err(WorkApiError::Unavailable));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("0xffffffffffffffff"), Some(u64::MAX));
        assert_eq!(parse_quantity("0x1ffffffffffffffff"), None);
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("12"), None);
    }
}
