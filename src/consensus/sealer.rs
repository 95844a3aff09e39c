use super::pow::{pow_digest, target, Pow};
use crate::blockchain::Block;
use crate::signal::Quit;
use crossbeam_channel::{bounded, select, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use tracing::{debug, trace};

enum Outcome {
    Sealed(Block),
    Stopped,
    Restart,
}

/// Run the nonce search until a seal is found or `stop` fires. A thread-count
/// update aborts the current round and starts a fresh one.
pub(super) fn seal(pow: &Pow, block: &Block, stop: &Quit) -> Option<Block> {
    // Notifications sent before this call are already reflected in the count.
    while pow.update_rx.try_recv().is_ok() {}

    let mut restarts: u32 = 0;
    loop {
        if stop.is_fired() {
            return None;
        }
        let threads = pow.resolved_threads();
        let seeds: Vec<u64> = {
            let mut rand = pow.rand.lock();
            let rng = rand.get_or_insert_with(StdRng::from_entropy);
            (0..threads).map(|_| rng.gen()).collect()
        };
        let abort = Quit::new();
        let (found_tx, found_rx) = bounded::<Block>(1);

        let outcome = thread::scope(|s| {
            for (id, seed) in seeds.into_iter().enumerate() {
                let abort = abort.clone();
                let found = found_tx.clone();
                s.spawn(move || mine(block, id, seed, &abort, &found));
            }
            let outcome = select! {
                recv(stop.receiver()) -> _ => Outcome::Stopped,
                recv(found_rx) -> sealed => match sealed {
                    Ok(sealed) => Outcome::Sealed(sealed),
                    Err(_) => Outcome::Stopped,
                },
                recv(pow.update_rx) -> _ => Outcome::Restart,
            };
            abort.fire();
            outcome
        });

        match outcome {
            Outcome::Sealed(sealed) => return Some(sealed),
            Outcome::Stopped => return None,
            Outcome::Restart => {
                restarts += 1;
                debug!(restarts, threads = pow.resolved_threads(), "Restarting nonce search");
            }
        }
    }
}

/// Scan nonces upward from `seed` until one satisfies the block's target.
fn mine(block: &Block, id: usize, seed: u64, abort: &Quit, found: &Sender<Block>) {
    let header = &block.header;
    let Some(target) = target(header.difficulty) else {
        return;
    };
    let hash = header.seal_hash();

    let mut nonce = seed;
    let mut attempts: u64 = 0;
    trace!(miner = id, seed, "Started nonce search");
    loop {
        if abort.is_fired() {
            trace!(miner = id, attempts, "Nonce search aborted");
            return;
        }
        if pow_digest(&hash, nonce) <= target {
            let mut sealed = header.clone();
            sealed.nonce = nonce;
            select! {
                send(found, block.with_seal(sealed)) -> _ => {
                    trace!(miner = id, attempts, nonce, "Nonce found and reported");
                }
                recv(abort.receiver()) -> _ => {
                    trace!(miner = id, attempts, nonce, "Nonce found but discarded");
                }
            }
            return;
        }
        nonce = nonce.wrapping_add(1);
        attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{unix_time, BlockHeader};
    use crate::consensus::pow::verify_seal;
    use crate::consensus::{Engine, FixedDifficulty};
    use std::time::{Duration, Instant};

    fn block(difficulty: u64) -> Block {
        Block::new(
            BlockHeader {
                parent_hash: [8; 32],
                number: 3,
                timestamp: unix_time(),
                difficulty,
                nonce: 0,
                coinbase: [6; 32],
                extra: b"seal".to_vec(),
                tx_root: [0; 32],
            },
            vec![],
        )
    }

    #[test]
    fn test_single_thread_seal_terminates() {
        let pow = Pow::new(FixedDifficulty(64));
        pow.set_threads(1);
        let candidate = block(64);
        let sealed = pow
            .seal(&candidate, &Quit::new())
            .unwrap()
            .expect("seal should be found");
        assert!(verify_seal(&sealed.header).is_ok());
        assert_eq!(sealed.header.seal_hash(), candidate.header.seal_hash());
        assert_eq!(sealed.transactions, candidate.transactions);
    }

    #[test]
    fn test_prefired_stop_returns_none() {
        let pow = Pow::new(FixedDifficulty(1));
        pow.set_threads(2);
        let stop = Quit::new();
        stop.fire();
        assert_eq!(pow.seal(&block(1), &stop).unwrap(), None);
    }

    #[test]
    fn test_stop_interrupts_hopeless_search() {
        let pow = Pow::new(FixedDifficulty(u64::MAX));
        pow.set_threads(2);
        let stop = Quit::new();
        let remote = stop.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.fire();
        });
        let started = Instant::now();
        assert_eq!(pow.seal(&block(u64::MAX), &stop).unwrap(), None);
        assert!(started.elapsed() < Duration::from_secs(10));
        stopper.join().unwrap();
    }

    #[test]
    fn test_thread_update_restarts_search() {
        let pow = std::sync::Arc::new(Pow::new(FixedDifficulty(1 << 12)));
        // No workers: the search can only finish after an update.
        pow.set_threads(-1);
        let updater = {
            let pow = pow.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                pow.set_threads(1);
            })
        };
        let sealed = pow.seal(&block(1 << 12), &Quit::new()).unwrap();
        assert!(sealed.is_some());
        updater.join().unwrap();
    }

    #[test]
    fn test_zero_difficulty_rejected() {
        let pow = Pow::new(FixedDifficulty(1));
        assert!(pow.seal(&block(0), &Quit::new()).is_err());
    }
}
