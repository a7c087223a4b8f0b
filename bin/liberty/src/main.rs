//! Liberty standalone sealer
//!
//! Seals a chain of synthetic blocks with the Liberty sealing engine.
//!
//! Usage:
//!   liberty-mine --difficulty 1000 --blocks 5
//!   liberty-mine --config sealer.toml --notify http://127.0.0.1:8080

#![allow(missing_docs)]

mod mine;

use clap::Parser;
use mine::MineArgs;
use tracing_subscriber::EnvFilter;

fn main() -> eyre::Result<()> {
    let args = MineArgs::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(args.run())
}
