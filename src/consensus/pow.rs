//! Proof-of-work engine.
//!
//! A header is sealed when `sha256(seal_hash || nonce_le)`, read as a 256-bit
//! big-endian integer, is at most `2^256 / difficulty`.

use super::difficulty::{DifficultyPolicy, FixedDifficulty, ParentAdjusted};
use super::reorder::spawn_ordered;
use super::{sealer, ChainReader, Engine};
use crate::blockchain::{unix_time, Block, BlockHeader, Sha256Hash, MAXIMUM_EXTRA_DATA_SIZE};
use crate::config::ConsensusConfig;
use crate::crypto::{short_hash, Address};
use crate::error::{ChainError, ConsensusError, Result};
use crate::signal::Quit;
use crate::transaction::Transaction;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Seconds a header timestamp may run ahead of local time.
pub const ALLOWED_FUTURE_BLOCK_TIME: u64 = 15;

pub const INITIAL_BLOCK_REWARD: u64 = 50;
pub const HALVING_INTERVAL: u64 = 210_000;

/// Mining reward for the block at `number`, halving every [`HALVING_INTERVAL`].
pub fn block_reward(number: u64) -> u64 {
    let halvings = number / HALVING_INTERVAL;
    if halvings >= 64 {
        0
    } else {
        INITIAL_BLOCK_REWARD >> halvings
    }
}

/// `2^256 / difficulty` as big-endian bytes. `None` for a zero difficulty.
pub fn target(difficulty: u64) -> Option<[u8; 32]> {
    match difficulty {
        0 => None,
        1 => Some([0xff; 32]),
        d => {
            let d = d as u128;
            // The leading limb of 2^256 is 1, and 1 / d leaves remainder 1.
            let mut rem: u128 = 1;
            let mut out = [0u8; 32];
            for chunk in out.chunks_exact_mut(8) {
                let cur = rem << 64;
                chunk.copy_from_slice(&((cur / d) as u64).to_be_bytes());
                rem = cur % d;
            }
            Some(out)
        }
    }
}

/// The proof-of-work digest for a seal hash and nonce.
pub fn pow_digest(seal_hash: &Sha256Hash, nonce: u64) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(seal_hash);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

pub fn verify_seal(header: &BlockHeader) -> Result<()> {
    let target = target(header.difficulty).ok_or(ConsensusError::InvalidDifficulty)?;
    if pow_digest(&header.seal_hash(), header.nonce) > target {
        return Err(ConsensusError::InvalidPoW.into());
    }
    Ok(())
}

/// The stateless part of header verification, cheap to clone into workers.
#[derive(Clone)]
struct HeaderRules {
    policy: Arc<dyn DifficultyPolicy>,
    allowed_future_block_time: u64,
}

impl HeaderRules {
    fn verify_header_with_parent(&self, header: &BlockHeader, parent: &BlockHeader, seal: bool) -> Result<()> {
        if header.extra.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(ConsensusError::ExtraDataTooLong {
                len: header.extra.len(),
                max: MAXIMUM_EXTRA_DATA_SIZE,
            }
            .into());
        }
        if header.timestamp > unix_time() + self.allowed_future_block_time {
            return Err(ConsensusError::FutureBlock.into());
        }
        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::ZeroBlockTime.into());
        }
        let expected = self.policy.calc_difficulty(header.timestamp, parent);
        if header.difficulty != expected {
            return Err(ConsensusError::DifficultyMismatch {
                have: header.difficulty,
                want: expected,
            }
            .into());
        }
        if header.number != parent.number + 1 {
            return Err(ConsensusError::InvalidNumber.into());
        }
        if seal {
            verify_seal(header)?;
        }
        Ok(())
    }
}

/// Proof-of-work consensus engine.
///
/// Holds the mining thread count and the nonce seed source; both are only
/// touched through their own locks, so a `Pow` is shared behind an `Arc`.
pub struct Pow {
    rules: HeaderRules,
    threads: Mutex<i32>,
    pub(super) rand: Mutex<Option<StdRng>>,
    update_tx: Sender<()>,
    pub(super) update_rx: Receiver<()>,
}

impl Pow {
    pub fn new(policy: impl DifficultyPolicy + 'static) -> Self {
        let (update_tx, update_rx) = bounded(1);
        Self {
            rules: HeaderRules {
                policy: Arc::new(policy),
                allowed_future_block_time: ALLOWED_FUTURE_BLOCK_TIME,
            },
            threads: Mutex::new(0),
            rand: Mutex::new(None),
            update_tx,
            update_rx,
        }
    }

    pub fn from_config(config: &ConsensusConfig) -> Self {
        let pow = match config.fixed_difficulty {
            Some(difficulty) => Pow::new(FixedDifficulty(difficulty)),
            None => Pow::new(ParentAdjusted {
                target_block_time: config.target_block_time,
                bound_divisor: config.bound_divisor,
                min_difficulty: config.min_difficulty,
            }),
        };
        pow.with_allowed_future_block_time(config.allowed_future_block_time)
    }

    pub fn with_allowed_future_block_time(mut self, seconds: u64) -> Self {
        self.rules.allowed_future_block_time = seconds;
        self
    }

    pub fn allowed_future_block_time(&self) -> u64 {
        self.rules.allowed_future_block_time
    }

    pub fn threads(&self) -> i32 {
        *self.threads.lock()
    }

    /// Update the mining thread count. Zero means one per processor, a
    /// negative count disables the search. A running seal restarts with the
    /// new count.
    pub fn set_threads(&self, threads: i32) {
        let mut current = self.threads.lock();
        *current = threads;
        // A pending notification already covers this change.
        let _ = self.update_tx.try_send(());
        debug!(threads, "Updated mining thread count");
    }

    pub(super) fn resolved_threads(&self) -> usize {
        match *self.threads.lock() {
            0 => num_cpus::get(),
            n if n < 0 => 0,
            n => n as usize,
        }
    }

    fn accumulate_rewards(&self, header: &BlockHeader) {
        let reward = block_reward(header.number);
        debug!(
            number = header.number,
            coinbase = %short_hash(&header.coinbase),
            reward,
            "Accumulated block reward"
        );
    }
}

impl Engine for Pow {
    fn author(&self, header: &BlockHeader) -> Address {
        header.coinbase
    }

    fn verify_header(&self, chain: &dyn ChainReader, header: &BlockHeader, seal: bool) -> Result<()> {
        if chain.get_header(&header.hash(), header.number)?.is_some() {
            return Ok(());
        }
        let parent = match header.number.checked_sub(1) {
            Some(number) => chain.get_header(&header.parent_hash, number)?,
            None => None,
        };
        let parent = parent.ok_or(ConsensusError::UnknownAncestor)?;
        self.rules.verify_header_with_parent(header, &parent, seal)
    }

    fn verify_headers(
        &self,
        chain: &dyn ChainReader,
        headers: Vec<BlockHeader>,
        seals: Vec<bool>,
    ) -> (Quit, Receiver<Result<()>>) {
        let abort = Quit::new();

        // Everything that needs the chain is resolved here, so the workers
        // only own plain data.
        let first_parent: Result<Option<BlockHeader>> = match headers.first() {
            Some(first) if first.number > 0 => chain.get_header(&first.parent_hash, first.number - 1),
            _ => Ok(None),
        };
        let known: Vec<Result<bool>> = headers
            .iter()
            .map(|h| chain.get_header(&h.hash(), h.number).map(|found| found.is_some()))
            .collect();

        let len = headers.len();
        let workers = num_cpus::get().min(len);
        let rules = self.rules.clone();
        let results = spawn_ordered(len, workers, abort.clone(), move |index| -> Result<()> {
            if known[index].clone()? {
                return Ok(());
            }
            let header = &headers[index];
            let parent = if index == 0 {
                first_parent.clone()?
            } else if headers[index - 1].hash() == header.parent_hash {
                Some(headers[index - 1].clone())
            } else {
                None
            };
            let parent = parent.ok_or(ConsensusError::UnknownAncestor)?;
            let seal = seals.get(index).copied().unwrap_or(true);
            rules.verify_header_with_parent(header, &parent, seal)
        });
        (abort, results)
    }

    fn calc_difficulty(&self, time: u64, parent: &BlockHeader) -> u64 {
        self.rules.policy.calc_difficulty(time, parent)
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut BlockHeader) -> Result<()> {
        let parent = match header.number.checked_sub(1) {
            Some(number) => chain.get_header(&header.parent_hash, number)?,
            None => None,
        };
        let parent = parent.ok_or(ConsensusError::UnknownAncestor)?;
        header.difficulty = self.calc_difficulty(header.timestamp, &parent);
        Ok(())
    }

    fn finalize(&self, header: BlockHeader, transactions: Vec<Transaction>) -> Result<Block> {
        self.accumulate_rewards(&header);
        Ok(Block::new(header, transactions))
    }

    fn seal(&self, block: &Block, stop: &Quit) -> Result<Option<Block>> {
        if block.header.difficulty == 0 {
            return Err(ChainError::Consensus(ConsensusError::InvalidDifficulty));
        }
        let sealed = sealer::seal(self, block, stop);
        if let Some(sealed) = &sealed {
            info!(
                number = sealed.number(),
                nonce = sealed.header.nonce,
                hash = %short_hash(&sealed.hash()),
                "Found proof-of-work"
            );
        }
        Ok(sealed)
    }

    fn verify_seal(&self, header: &BlockHeader) -> Result<()> {
        verify_seal(header)
    }
}
