//! Remote sealer
//!
//! A single task owns the pending work, the published work package and the
//! submitted hash rates. Remote miners reach it only through
//! [`RemoteSealerHandle`], so every request is applied in arrival order
//! without locks.

use crate::{RemoteSealerError, SealerConfig, WorkPackage, notify::Notifier};
use alloy_primitives::{Address, B64, B256};
use liberty_consensus::{Pow, STALE_THRESHOLD, SealBlock, with_seal};
use std::{collections::HashMap, ops::ControlFlow, time::Duration};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, trace, warn};

/// Interval between stale work and hash rate sweeps
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Hash rate samples older than this are dropped
pub const HASHRATE_EXPIRY: Duration = Duration::from_secs(10);

const MAILBOX_CAPACITY: usize = 64;

/// Proof-of-work solution submitted by a remote miner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    /// Nonce found by the miner
    pub nonce: B64,
    /// Digest the nonce produces
    pub mix_digest: B256,
    /// Seal hash of the work the solution is for
    pub seal_hash: B256,
    /// Address reported by the miner
    pub miner: Address,
}

#[derive(Debug)]
enum Request {
    PushWork { block: Box<SealBlock>, results: mpsc::Sender<SealBlock> },
    FetchWork(oneshot::Sender<Result<WorkPackage, RemoteSealerError>>),
    SubmitWork { solution: Solution, reply: oneshot::Sender<Result<bool, RemoteSealerError>> },
    SubmitHashrate { id: B256, rate: u64, done: oneshot::Sender<()> },
    FetchHashrate(oneshot::Sender<u64>),
    Exit(oneshot::Sender<()>),
}

/// Handle to a running [`RemoteSealer`]
#[derive(Debug, Clone)]
pub struct RemoteSealerHandle {
    tx: mpsc::Sender<Request>,
}

impl RemoteSealerHandle {
    /// Queue `block` as the new current work without waiting.
    ///
    /// Accepted solutions for it are published on `results`.
    pub fn push_work(
        &self,
        block: SealBlock,
        results: mpsc::Sender<SealBlock>,
    ) -> Result<(), RemoteSealerError> {
        self.tx.try_send(Request::PushWork { block: Box::new(block), results }).map_err(
            |err| match err {
                TrySendError::Full(_) => RemoteSealerError::MailboxFull,
                TrySendError::Closed(_) => RemoteSealerError::Closed,
            },
        )
    }

    /// The current work package
    pub async fn fetch_work(&self) -> Result<WorkPackage, RemoteSealerError> {
        self.request(Request::FetchWork).await?
    }

    /// Submit a solution. Returns `false` when the solution is valid but stale.
    pub async fn submit_work(&self, solution: Solution) -> Result<bool, RemoteSealerError> {
        self.request(|reply| Request::SubmitWork { solution, reply }).await?
    }

    /// Record the hash rate reported by miner `id`
    pub async fn submit_hashrate(&self, id: B256, rate: u64) -> Result<(), RemoteSealerError> {
        self.request(|done| Request::SubmitHashrate { id, rate, done }).await
    }

    /// Sum of all live hash rate samples
    pub async fn hashrate(&self) -> Result<u64, RemoteSealerError> {
        self.request(Request::FetchHashrate).await
    }

    /// Stop the remote sealer and wait until in-flight notifications finish.
    pub async fn shutdown(&self) -> Result<(), RemoteSealerError> {
        self.request(Request::Exit).await
    }

    /// Whether the remote sealer has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, RemoteSealerError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(request(tx)).await.map_err(|_| RemoteSealerError::Closed)?;
        rx.await.map_err(|_| RemoteSealerError::Closed)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateSample {
    rate: u64,
    ping: Instant,
}

/// Serves work to remote miners and validates their solutions
#[derive(Debug)]
pub struct RemoteSealer {
    pow: Pow,
    noverify: bool,
    rx: mpsc::Receiver<Request>,
    notifier: Notifier,
    /// Pending work by seal hash
    works: HashMap<B256, SealBlock>,
    rates: HashMap<B256, RateSample>,
    /// Package of the most recently pushed block
    current: Option<WorkPackage>,
    results: Option<mpsc::Sender<SealBlock>>,
}

impl RemoteSealer {
    /// Spawn the remote sealer on the current tokio runtime.
    pub fn spawn(pow: Pow, config: &SealerConfig) -> RemoteSealerHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let sealer = Self {
            pow,
            noverify: config.noverify,
            rx,
            notifier: Notifier::new(config.notify.clone(), config.notify_full),
            works: HashMap::new(),
            rates: HashMap::new(),
            current: None,
            results: None,
        };
        tokio::spawn(sealer.run());
        RemoteSealerHandle { tx }
    }

    async fn run(mut self) {
        let mut cleanup = interval_at(Instant::now() + CLEANUP_INTERVAL, CLEANUP_INTERVAL);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let done = loop {
            tokio::select! {
                request = self.rx.recv() => {
                    let Some(request) = request else { break None };
                    if let ControlFlow::Break(done) = self.handle(request) {
                        break Some(done);
                    }
                }
                _ = cleanup.tick() => self.cleanup(),
                Some(()) = self.notifier.join_next(), if self.notifier.pending() > 0 => {}
            }
        };

        trace!(target: "liberty::remote", "Remote sealer is exiting");
        self.rx.close();
        self.notifier.shutdown().await;
        self.works.clear();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn handle(&mut self, request: Request) -> ControlFlow<oneshot::Sender<()>> {
        match request {
            Request::PushWork { block, results } => {
                self.results = Some(results);
                self.push_work(*block);
            }
            Request::FetchWork(reply) => {
                let _ = reply.send(self.current.ok_or(RemoteSealerError::NoMiningWork));
            }
            Request::SubmitWork { solution, reply } => {
                let _ = reply.send(self.submit_work(solution));
            }
            Request::SubmitHashrate { id, rate, done } => {
                self.rates.insert(id, RateSample { rate, ping: Instant::now() });
                let _ = done.send(());
            }
            Request::FetchHashrate(reply) => {
                let total = self.rates.values().fold(0u64, |acc, s| acc.saturating_add(s.rate));
                let _ = reply.send(total);
            }
            Request::Exit(done) => return ControlFlow::Break(done),
        }
        ControlFlow::Continue(())
    }

    fn push_work(&mut self, block: SealBlock) {
        let work = WorkPackage::new(&block.header);
        debug!(
            target: "liberty::remote",
            number = work.number,
            seal_hash = %work.seal_hash,
            "New mining work"
        );

        self.notifier.notify(&work, &block.header);
        self.works.insert(work.seal_hash, block);
        self.current = Some(work);
    }

    fn submit_work(&self, solution: Solution) -> Result<bool, RemoteSealerError> {
        let tip = self.current.map(|work| work.number).unwrap_or_default();
        let Some(block) = self.works.get(&solution.seal_hash) else {
            warn!(
                target: "liberty::remote",
                seal_hash = %solution.seal_hash,
                tip,
                "Work submitted but none pending"
            );
            return Err(RemoteSealerError::NoMatchingWork(solution.seal_hash));
        };

        let mut header = block.header.clone();
        header.nonce = solution.nonce;
        header.mix_hash = solution.mix_digest;

        if !self.noverify {
            let start = Instant::now();
            if let Err(err) = self.pow.verify_seal(&header) {
                warn!(
                    target: "liberty::remote",
                    seal_hash = %solution.seal_hash,
                    miner = %solution.miner,
                    elapsed = ?start.elapsed(),
                    %err,
                    "Invalid proof-of-work submitted"
                );
                return Err(err.into());
            }
        }

        let number = header.number;
        if number.saturating_add(STALE_THRESHOLD) <= tip {
            warn!(
                target: "liberty::remote",
                number,
                tip,
                seal_hash = %solution.seal_hash,
                "Work submitted is too old"
            );
            return Ok(false);
        }

        let sealed = with_seal(block, header);
        match self.results.as_ref().map(|results| results.try_send(sealed)) {
            Some(Ok(())) => info!(
                target: "liberty::remote",
                number,
                seal_hash = %solution.seal_hash,
                miner = %solution.miner,
                "Work submitted is acceptable"
            ),
            _ => warn!(
                target: "liberty::remote",
                mode = "remote",
                seal_hash = %solution.seal_hash,
                "Sealing result is not read by miner"
            ),
        }
        Ok(true)
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.rates.retain(|id, sample| {
            let live = now.saturating_duration_since(sample.ping) <= HASHRATE_EXPIRY;
            if !live {
                trace!(target: "liberty::remote", %id, "Dropped expired hash rate");
            }
            live
        });

        if let Some(tip) = self.current.map(|work| work.number) {
            self.works.retain(|_, block| block.header.number.saturating_add(STALE_THRESHOLD) > tip);
        }
    }
}
