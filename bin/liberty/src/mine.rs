//! Mining command for Liberty
//!
//! Seals a chain of empty blocks on top of an in-memory genesis, one block at
//! a time, while the remote sealer serves the same work to external miners.

use alloy_consensus::Header;
use alloy_primitives::{Address, B256, U256};
use clap::Parser;
use crossbeam_channel::bounded;
use eyre::{WrapErr, bail};
use liberty_consensus::{ChainHeaderReader, PowMode};
use liberty_miner::{BlockTemplate, Sealer, SealerConfig};
use parking_lot::RwLock;
use std::{
    path::PathBuf,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Liberty CPU miner
#[derive(Debug, Parser)]
#[command(name = "liberty-mine")]
#[command(about = "Seal blocks with the Liberty Blake3 hash-chain proof-of-work")]
pub(crate) struct MineArgs {
    /// TOML sealer configuration, overridden by the flags below
    #[arg(long, short = 'c', env = "LIBERTY_SEALER_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Proof-of-work mode: normal, test, fake or full-fake
    #[arg(long)]
    pub(crate) mode: Option<PowMode>,

    /// Number of search threads (0 = remote miners only)
    #[arg(long, short = 't', allow_negative_numbers = true)]
    pub(crate) threads: Option<i64>,

    /// Endpoints notified of new work
    #[arg(long, value_delimiter = ',')]
    pub(crate) notify: Vec<String>,

    /// Send full headers to notify endpoints
    #[arg(long)]
    pub(crate) notify_full: bool,

    /// Disable the remote sealer
    #[arg(long)]
    pub(crate) no_remote: bool,

    /// Miner address to receive rewards
    #[arg(long, default_value = "0x0000000000000000000000000000000000000001")]
    pub(crate) miner: Address,

    /// Block difficulty
    #[arg(long, short = 'd', default_value = "1000")]
    pub(crate) difficulty: u64,

    /// Number of blocks to mine
    #[arg(long, short = 'n', default_value = "1")]
    pub(crate) blocks: u64,

    /// Timeout per block in seconds
    #[arg(long, default_value = "300")]
    pub(crate) timeout: u64,
}

impl MineArgs {
    /// Resolve the sealer configuration from the config file and flags.
    pub(crate) fn sealer_config(&self) -> eyre::Result<SealerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                parse_config(&text)?
            }
            None => SealerConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.pow_mode = mode;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if !self.notify.is_empty() {
            config.notify = self.notify.clone();
        }
        config.notify_full |= self.notify_full;
        if self.no_remote {
            config.remote = false;
        }
        Ok(config)
    }

    /// Run the miner
    pub(crate) async fn run(&self) -> eyre::Result<()> {
        let config = self.sealer_config()?;
        info!(
            target: "liberty::mine",
            miner = %self.miner,
            mode = %config.pow_mode,
            threads = config.threads,
            difficulty = self.difficulty,
            remote = config.remote,
            "Starting Liberty sealer"
        );

        let sealer = Sealer::new(config);
        let genesis =
            BlockTemplate::new(B256::ZERO, 0, now(), self.miner, U256::from(self.difficulty));
        let chain = MemoryChain::new(genesis.to_header());
        let timeout = Duration::from_secs(self.timeout);
        let start = Instant::now();

        for _ in 0..self.blocks {
            let head = chain.head();
            let block = BlockTemplate::child_of(&head, now(), self.miner).into_block();
            let number = block.header.number;
            info!(target: "liberty::mine", block = number, parent = %head.hash_slow(), "Mining block");

            let (results, mut sealed) = mpsc::channel(1);
            let (stop, stop_rx) = bounded(1);
            let task = sealer.seal(&chain, block, results, stop_rx)?;

            let outcome = tokio::time::timeout(timeout, sealed.recv()).await;
            let _ = stop.send(());
            tokio::task::spawn_blocking(move || task.join()).await?;

            let block = match outcome {
                Ok(Some(block)) => block,
                Ok(None) => bail!("sealing of block {number} ended without a result"),
                Err(_) => {
                    warn!(target: "liberty::mine", block = number, "Sealing timed out");
                    bail!("no seal found for block {number} within {timeout:?}");
                }
            };
            sealer.pow().verify_seal(&block.header)?;

            info!(
                target: "liberty::mine",
                block = number,
                nonce = %block.header.nonce,
                mix_hash = %block.header.mix_hash,
                hash = %block.header.hash_slow(),
                "Block sealed"
            );
            chain.set_head(block.header);
        }

        info!(
            target: "liberty::mine",
            blocks = self.blocks,
            head = chain.head().number,
            elapsed_secs = start.elapsed().as_secs(),
            hashrate = %format!("{:.2} H/s", sealer.hashrate().await),
            "Mining complete"
        );
        sealer.close().await;
        Ok(())
    }
}

fn parse_config(text: &str) -> eyre::Result<SealerConfig> {
    toml::from_str(text).wrap_err("invalid sealer configuration")
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Chain made of the last sealed header
#[derive(Debug)]
struct MemoryChain {
    head: RwLock<Header>,
}

impl MemoryChain {
    fn new(genesis: Header) -> Self {
        Self { head: RwLock::new(genesis) }
    }

    fn head(&self) -> Header {
        self.head.read().clone()
    }

    fn set_head(&self, header: Header) {
        *self.head.write() = header;
    }
}

impl ChainHeaderReader for MemoryChain {
    fn current_header(&self) -> Option<Header> {
        Some(self.head())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> MineArgs {
        MineArgs::parse_from(["liberty-mine"].iter().chain(extra))
    }

    #[test]
    fn test_parse_config_file() {
        let config = parse_config(
            r#"
            pow-mode = "test"
            threads = 2
            notify = ["http://127.0.0.1:3000"]
            "#,
        )
        .unwrap();

        assert_eq!(config.pow_mode, PowMode::Test);
        assert_eq!(config.threads, 2);
        assert!(config.remote);
        assert!(!config.notify_full);
        assert!(parse_config("threads = \"many\"").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = args(&[
            "--mode",
            "fake",
            "--threads",
            "-1",
            "--notify",
            "http://a,http://b",
            "--notify-full",
            "--no-remote",
        ]);
        let config = args.sealer_config().unwrap();

        assert_eq!(config.pow_mode, PowMode::Fake);
        assert_eq!(config.threads, -1);
        assert_eq!(config.notify, vec!["http://a".to_string(), "http://b".to_string()]);
        assert!(config.notify_full);
        assert!(!config.remote);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(MineArgs::try_parse_from(["liberty-mine", "--mode", "ethash"]).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mine_blocks() {
        let args = args(&["--mode", "test", "--threads", "2", "--difficulty", "8", "--blocks", "3"]);
        args.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_mine_fake_blocks() {
        let args = args(&["--mode", "fake", "--blocks", "2", "--no-remote"]);
        args.run().await.unwrap();
    }
}
