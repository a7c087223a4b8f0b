//! Seal orchestration
//!
//! [`Sealer::seal`] picks how a block gets sealed: fake modes seal at once,
//! a shared sealer takes the whole call, and otherwise the block is handed
//! to the remote sealer while local threads search for a nonce.

use crate::{
    Meter, RemoteSealer, RemoteSealerHandle, SealError, SealerConfig, WorkApi,
    worker::{mine, start_nonce},
};
use alloy_primitives::B256;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use liberty_consensus::{
    ChainHeaderReader, Pow, PowMode, SealBlock, compute_seal_hash, seal_header, with_seal,
};
use parking_lot::Mutex;
use rand::{
    RngCore, SeedableRng,
    rngs::{OsRng, StdRng},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    thread::{self, JoinHandle},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Proof-of-work sealer
#[derive(Debug)]
pub struct Sealer {
    config: SealerConfig,
    pow: Pow,
    threads: Arc<AtomicI64>,
    rng: Arc<Mutex<Option<StdRng>>>,
    update_tx: Sender<()>,
    update_rx: Receiver<()>,
    hashrate: Arc<Meter>,
    remote: Option<RemoteSealerHandle>,
    shared: Option<Arc<Sealer>>,
}

impl Sealer {
    /// Create a sealer.
    ///
    /// The remote sealer is started on the current tokio runtime when
    /// enabled and the mode is not fake. Without a runtime it is skipped.
    pub fn new(config: SealerConfig) -> Self {
        let pow = Pow::new(config.pow_mode);
        let remote = if config.remote && !config.pow_mode.is_fake() {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => Some(RemoteSealer::spawn(pow, &config)),
                Err(err) => {
                    warn!(target: "liberty::miner", %err, "No runtime, remote sealer disabled");
                    None
                }
            }
        } else {
            None
        };
        let (update_tx, update_rx) = bounded(1);

        Self {
            threads: Arc::new(AtomicI64::new(config.threads)),
            config,
            pow,
            rng: Arc::new(Mutex::new(None)),
            update_tx,
            update_rx,
            hashrate: Arc::new(Meter::new()),
            remote,
            shared: None,
        }
    }

    /// Create a sealer that delegates every call to `shared`
    pub fn shared(shared: Arc<Self>) -> Self {
        let mut sealer = Self::new(shared.config.clone().local_only());
        sealer.shared = Some(shared);
        sealer
    }

    /// Use `rng` for nonce seeds instead of seeding from the OS.
    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.rng.lock() = Some(rng);
        self
    }

    /// The proof-of-work engine
    pub const fn pow(&self) -> Pow {
        self.pow
    }

    /// Handle to the remote sealer, if running
    pub fn remote(&self) -> Option<&RemoteSealerHandle> {
        match &self.shared {
            Some(shared) => shared.remote(),
            None => self.remote.as_ref(),
        }
    }

    /// Miner-facing API, if the remote sealer is running
    pub fn work_api(&self) -> Option<WorkApi> {
        self.remote().cloned().map(WorkApi::new)
    }

    /// Configured number of search threads
    pub fn threads(&self) -> i64 {
        match &self.shared {
            Some(shared) => shared.threads(),
            None => self.threads.load(Ordering::Relaxed),
        }
    }

    /// Update the number of search threads. A running search restarts with
    /// the new count. Zero or a negative count disables local search.
    pub fn set_threads(&self, threads: i64) {
        if let Some(shared) = &self.shared {
            return shared.set_threads(threads);
        }
        self.threads.store(threads, Ordering::Relaxed);
        let _ = self.update_tx.try_send(());
    }

    /// Start sealing `block`.
    ///
    /// Returns once the search is running. At most one sealed block is
    /// published on `results`, and only if it can be sent without waiting.
    /// A message on `stop`, or dropping its sender, aborts the search.
    pub fn seal<C: ChainHeaderReader + ?Sized>(
        &self,
        chain: &C,
        block: SealBlock,
        results: mpsc::Sender<SealBlock>,
        stop: Receiver<()>,
    ) -> Result<SealTask, SealError> {
        if self.pow.mode().is_fake() {
            let header = seal_header(&block.header, 0, B256::ZERO);
            if results.try_send(with_seal(&block, header)).is_err() {
                warn!(
                    target: "liberty::miner",
                    mode = "fake",
                    seal_hash = %compute_seal_hash(&block.header),
                    "Sealing result is not read by miner"
                );
            }
            return Ok(SealTask { handle: None });
        }
        if let Some(shared) = &self.shared {
            return shared.seal(chain, block, results, stop);
        }

        let base = next_seed(&self.rng)?;
        if let Some(head) = chain.current_header() {
            trace!(
                target: "liberty::miner",
                head = head.number,
                number = block.header.number,
                "Sealing on chain head"
            );
        }

        if let Some(remote) = &self.remote &&
            let Err(err) = remote.push_work(block.clone(), results.clone())
        {
            warn!(target: "liberty::miner", %err, "Failed to push work to remote sealer");
        }

        let search = Search {
            pow: self.pow,
            threads: Arc::clone(&self.threads),
            rng: Arc::clone(&self.rng),
            meter: Arc::clone(&self.hashrate),
            update: self.update_rx.clone(),
        };
        let handle = thread::Builder::new()
            .name("liberty-seal".to_string())
            .spawn(move || search.run(block, results, stop, base))
            .map_err(SealError::Spawn)?;

        Ok(SealTask { handle: Some(handle) })
    }

    /// Current hash rate: the local one-minute rate plus, outside the fake
    /// modes, the total reported by remote miners.
    pub async fn hashrate(&self) -> f64 {
        if let Some(shared) = &self.shared {
            return Box::pin(shared.hashrate()).await;
        }
        let mut rate = self.hashrate.rate1();
        if matches!(self.pow.mode(), PowMode::Normal | PowMode::Test) &&
            let Some(remote) = &self.remote &&
            let Ok(total) = remote.hashrate().await
        {
            rate += total as f64;
        }
        rate
    }

    /// Stop the remote sealer and wait for it to exit.
    pub async fn close(&self) {
        if let Some(remote) = &self.remote &&
            let Err(err) = remote.shutdown().await
        {
            debug!(target: "liberty::miner", %err, "Remote sealer already stopped");
        }
    }
}

/// Background sealing attempt started by [`Sealer::seal`]
#[derive(Debug)]
pub struct SealTask {
    handle: Option<JoinHandle<()>>,
}

impl SealTask {
    /// Whether the attempt and all its search threads have finished
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Block until the attempt has finished.
    pub fn join(self) {
        if let Some(handle) = self.handle &&
            handle.join().is_err()
        {
            error!(target: "liberty::miner", "Sealing thread panicked");
        }
    }
}

/// Search threads to start for a configured thread count
fn worker_count(threads: i64) -> usize {
    usize::try_from(threads).unwrap_or(0)
}

/// Draw a base nonce, seeding the generator from the OS on first use.
fn next_seed(rng: &Mutex<Option<StdRng>>) -> Result<u64, SealError> {
    let mut slot = rng.lock();
    let mut rng = match slot.take() {
        Some(rng) => rng,
        None => StdRng::from_rng(OsRng).map_err(SealError::RandomSeedUnavailable)?,
    };
    let seed = rng.next_u64();
    *slot = Some(rng);
    Ok(seed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stopped,
    Sealed,
    Restart,
}

/// State moved onto the sealing thread
#[derive(Debug)]
struct Search {
    pow: Pow,
    threads: Arc<AtomicI64>,
    rng: Arc<Mutex<Option<StdRng>>>,
    meter: Arc<Meter>,
    update: Receiver<()>,
}

impl Search {
    fn run(self, block: SealBlock, results: mpsc::Sender<SealBlock>, stop: Receiver<()>, seed: u64) {
        let seal_hash = compute_seal_hash(&block.header);
        let mut base = seed;
        let mut attempt = 0u64;

        loop {
            let workers = worker_count(self.threads.load(Ordering::Relaxed));
            debug!(
                target: "liberty::miner",
                number = block.header.number,
                %seal_hash,
                workers,
                attempt,
                "Starting nonce search"
            );

            match self.attempt(&block, workers, base, &results, &stop) {
                Outcome::Restart => {}
                Outcome::Sealed | Outcome::Stopped => return,
            }

            attempt += 1;
            base = match next_seed(&self.rng) {
                Ok(base) => base,
                Err(err) => {
                    error!(target: "liberty::miner", %err, "Failed to restart sealing after update");
                    return;
                }
            };
            info!(target: "liberty::miner", attempt, "Thread count changed, restarting search");
        }
    }

    /// Run one round of search threads and wait for all of them to exit.
    fn attempt(
        &self,
        block: &SealBlock,
        workers: usize,
        base: u64,
        results: &mpsc::Sender<SealBlock>,
        stop: &Receiver<()>,
    ) -> Outcome {
        let (abort_tx, abort_rx) = bounded::<()>(0);
        let (found_tx, found_rx) = bounded::<SealBlock>(0);
        let (pow, meter) = (&self.pow, &*self.meter);

        thread::scope(|s| {
            for id in 0..workers {
                let seed = start_nonce(base, id, workers);
                let (abort, found) = (&abort_rx, &found_tx);
                let spawned = thread::Builder::new()
                    .name(format!("liberty-miner-{id}"))
                    .spawn_scoped(s, move || mine(pow, block, id, seed, meter, abort, found));
                if let Err(err) = spawned {
                    warn!(target: "liberty::miner", miner = id, %err, "Failed to start search thread");
                }
            }

            let outcome = select! {
                recv(stop) -> _ => Outcome::Stopped,
                recv(found_rx) -> sealed => match sealed {
                    Ok(sealed) => {
                        if results.try_send(sealed).is_err() {
                            warn!(
                                target: "liberty::miner",
                                mode = "local",
                                seal_hash = %compute_seal_hash(&block.header),
                                "Sealing result is not read by miner"
                            );
                        }
                        Outcome::Sealed
                    }
                    Err(_) => Outcome::Stopped,
                },
                recv(self.update) -> msg => {
                    if msg.is_ok() { Outcome::Restart } else { Outcome::Stopped }
                }
            };

            // Closing the abort channel releases every search thread.
            drop(abort_tx);
            outcome
        })
    }
}
