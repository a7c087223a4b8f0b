//! Mining worker implementation
//!
//! Handles parallel nonce search using the Blake3 hash chain. Each worker owns
//! a starting nonce and walks forward from it until it either finds a
//! solution or sees the abort signal.

use crate::Meter;
use crossbeam_channel::{Receiver, Sender, TryRecvError, select};
use liberty_consensus::{
    Pow, SealBlock, compute_seal_hash, difficulty_to_target, meets_target, seal_header, with_seal,
};
use tracing::{debug, trace};

/// Attempts between meter flushes
pub const METER_FLUSH_INTERVAL: u64 = 1 << 15;

/// Starting nonce for worker `id` out of `workers`, spread evenly across the
/// nonce space from `base`.
pub fn start_nonce(base: u64, id: usize, workers: usize) -> u64 {
    let stride = u64::MAX / workers.max(1) as u64;
    base.wrapping_add(stride.wrapping_mul(id as u64))
}

/// Search for a nonce sealing `block`, starting at `seed`.
///
/// Any message on `abort`, or its disconnection, stops the search. A found
/// block is handed to `found`; the hand-off blocks until it is taken or the
/// search is aborted.
pub fn mine(
    pow: &Pow,
    block: &SealBlock,
    id: usize,
    seed: u64,
    meter: &Meter,
    abort: &Receiver<()>,
    found: &Sender<SealBlock>,
) {
    let header = &block.header;
    let seal_hash = compute_seal_hash(header);
    let target = difficulty_to_target(header.difficulty);
    let mut attempts = 0u64;
    let mut nonce = seed;

    trace!(target: "liberty::miner", miner = id, seed, "Started nonce search");

    loop {
        if !matches!(abort.try_recv(), Err(TryRecvError::Empty)) {
            trace!(
                target: "liberty::miner",
                miner = id,
                attempts = nonce.wrapping_sub(seed),
                "Nonce search aborted"
            );
            meter.mark(attempts);
            return;
        }

        attempts += 1;
        if attempts % METER_FLUSH_INTERVAL == 0 {
            meter.mark(attempts);
            attempts = 0;
        }

        let digest = pow.evaluate(&seal_hash, nonce);
        if meets_target(&digest, target) {
            meter.mark(attempts);
            let sealed = with_seal(block, seal_header(header, nonce, digest));

            debug!(
                target: "liberty::miner",
                miner = id,
                nonce,
                mix_digest = %digest,
                seal_hash = %seal_hash,
                "Found valid nonce"
            );

            select! {
                send(found, sealed) -> res => {
                    if res.is_ok() {
                        trace!(target: "liberty::miner", miner = id, nonce, "Nonce found and reported");
                    } else {
                        trace!(target: "liberty::miner", miner = id, nonce, "Nonce found but discarded");
                    }
                }
                recv(abort) -> _ => {
                    trace!(target: "liberty::miner", miner = id, nonce, "Nonce found but discarded");
                }
            }
            return;
        }

        nonce = nonce.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockTemplate;
    use alloy_primitives::{Address, B256, U256};
    use crossbeam_channel::bounded;
    use liberty_consensus::PowMode;
    use std::{thread, time::Duration};

    fn block(difficulty: u64) -> SealBlock {
        BlockTemplate::new(B256::ZERO, 1, 1000, Address::ZERO, U256::from(difficulty)).into_block()
    }

    #[test]
    fn test_start_nonces_distinct() {
        let nonces: Vec<_> = (0..4).map(|id| start_nonce(u64::MAX - 1, id, 4)).collect();
        for (i, a) in nonces.iter().enumerate() {
            for b in &nonces[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(start_nonce(7, 0, 0), 7);
    }

    #[test]
    fn test_mine_easy_difficulty() {
        let pow = Pow::new(PowMode::Test);
        let block = block(16);
        let meter = Meter::new();
        let (_abort_tx, abort_rx) = bounded::<()>(0);
        let (found_tx, found_rx) = bounded(0);

        thread::scope(|s| {
            s.spawn(|| mine(&pow, &block, 0, 42, &meter, &abort_rx, &found_tx));
            let sealed = found_rx.recv_timeout(Duration::from_secs(30)).unwrap();

            assert_eq!(pow.verify_seal(&sealed.header), Ok(()));
            assert_eq!(sealed.header.number, block.header.number);
            assert_eq!(compute_seal_hash(&sealed.header), compute_seal_hash(&block.header));
        });
        assert!(meter.count() > 0);
    }

    #[test]
    fn test_abort_stops_search() {
        let pow = Pow::new(PowMode::Test);
        let block = block(u64::MAX);
        let meter = Meter::new();
        let (abort_tx, abort_rx) = bounded::<()>(0);
        let (found_tx, found_rx) = bounded(0);

        thread::scope(|s| {
            let worker = s.spawn(|| mine(&pow, &block, 0, 0, &meter, &abort_rx, &found_tx));
            thread::sleep(Duration::from_millis(20));
            drop(abort_tx);
            worker.join().unwrap();
        });
        assert!(found_rx.try_recv().is_err());
    }

    #[test]
    fn test_pending_abort_wins_over_easy_block() {
        let pow = Pow::new(PowMode::Test);
        let block = block(1);
        let meter = Meter::new();
        let (abort_tx, abort_rx) = bounded::<()>(1);
        let (found_tx, found_rx) = bounded(0);

        // Difficulty 1 succeeds on the first nonce, abort is checked first.
        abort_tx.send(()).unwrap();
        mine(&pow, &block, 0, 0, &meter, &abort_rx, &found_tx);
        assert!(found_rx.try_recv().is_err());
    }
}
