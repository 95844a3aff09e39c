//! Mining front end.
//!
//! [`Miner`] is the handle the node holds; the assembly and sealing
//! machinery lives in [`worker`].

pub mod unconfirmed;
pub mod worker;

pub use unconfirmed::{Confirmation, UnconfirmedBlock, UnconfirmedBlocks};
pub use worker::{MinerState, Worker};

use crate::blockchain::{Block, BlockChain, MAXIMUM_EXTRA_DATA_SIZE};
use crate::config::MinerConfig;
use crate::consensus::Engine;
use crate::crypto::{short_hash, Address};
use crate::error::{ChainError, Result};
use crate::mempool::TransactionSource;
use std::sync::Arc;
use tracing::info;

/// Creates blocks and searches for proof-of-work values.
pub struct Miner {
    worker: Worker,
}

impl Miner {
    pub fn new(
        chain: Arc<BlockChain>,
        engine: Arc<dyn Engine>,
        source: Arc<dyn TransactionSource>,
        config: &MinerConfig,
    ) -> Result<Self> {
        if config.extra.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(extra_too_long(config.extra.len()));
        }
        Ok(Self {
            worker: Worker::new(chain, engine, source, config)?,
        })
    }

    /// Start mining, crediting `coinbase`.
    pub fn start(&self, coinbase: Address) {
        self.worker.set_coinbase(coinbase);
        info!(coinbase = %short_hash(&coinbase), "Starting mining operation");
        self.worker.start();
    }

    pub fn stop(&self) {
        self.worker.stop();
        info!("Mining stopped");
    }

    /// Stop mining for good and join the worker threads.
    pub fn close(&self) {
        self.worker.close();
    }

    pub fn is_mining(&self) -> bool {
        self.worker.is_running()
    }

    pub fn state(&self) -> MinerState {
        self.worker.state()
    }

    pub fn set_extra(&self, extra: Vec<u8>) -> Result<()> {
        if extra.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(extra_too_long(extra.len()));
        }
        self.worker.set_extra(extra);
        Ok(())
    }

    pub fn set_coinbase(&self, coinbase: Address) {
        self.worker.set_coinbase(coinbase);
    }

    pub fn coinbase(&self) -> Address {
        self.worker.coinbase()
    }

    pub fn pending_block(&self) -> Option<Block> {
        self.worker.pending_block()
    }
}

fn extra_too_long(len: usize) -> ChainError {
    ChainError::MiningError(format!(
        "Extra exceeds max length. {} > {}",
        len, MAXIMUM_EXTRA_DATA_SIZE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::genesis::{setup_genesis_block, Genesis};
    use crate::blockchain::unix_time;
    use crate::config::ChainConfig;
    use crate::consensus::{FixedDifficulty, Pow};
    use crate::crypto::ZERO_ADDRESS;
    use crate::mempool::Mempool;
    use crate::persistence::{MemoryStore, Store};
    use crate::transaction::Transaction;
    use std::thread;
    use std::time::{Duration, Instant};

    struct Setup {
        chain: Arc<BlockChain>,
        mempool: Arc<Mempool>,
        miner: Miner,
    }

    fn setup() -> Setup {
        let db: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let genesis = Genesis {
            nonce: 0,
            timestamp: unix_time() - 1_000,
            extra_data: vec![],
            difficulty: Some(1),
            coinbase: [0; 32],
            number: 0,
            parent_hash: [0; 32],
        };
        setup_genesis_block(db.as_ref(), Some(&genesis)).unwrap();
        let engine = Arc::new(Pow::new(FixedDifficulty(1)));
        engine.set_threads(1);
        let chain = BlockChain::new(db, engine.clone(), ChainConfig::default()).unwrap();
        let mempool = Arc::new(Mempool::new());
        let config = MinerConfig {
            recommit_interval_ms: 200,
            ..MinerConfig::default()
        };
        let miner = Miner::new(chain.clone(), engine, mempool.clone(), &config).unwrap();
        Setup { chain, mempool, miner }
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        done()
    }

    #[test]
    fn test_mines_blocks_on_top_of_each_other() {
        let s = setup();
        s.mempool.add_transaction(Transaction::new(b"hello".to_vec())).unwrap();
        s.miner.start([7; 32]);
        assert!(s.miner.is_mining());

        assert!(wait_for(Duration::from_secs(20), || s.chain.current_block().number() >= 3));
        s.miner.stop();
        s.miner.close();

        let head = s.chain.current_block();
        for number in 1..=3 {
            let block = s.chain.get_block_by_number(number).unwrap().unwrap();
            assert_eq!(block.header.coinbase, [7; 32]);
            let parent = s.chain.get_block_by_number(number - 1).unwrap().unwrap();
            assert_eq!(block.parent_hash(), parent.hash());
            assert!(block.timestamp() > parent.timestamp());
        }
        let first = s.chain.get_block_by_number(1).unwrap().unwrap();
        assert_eq!(first.transactions, vec![Transaction::new(b"hello".to_vec())]);
        assert!(head.number() >= 3);
        s.chain.stop();
    }

    #[test]
    fn test_refuses_zero_coinbase() {
        let s = setup();
        s.miner.start(ZERO_ADDRESS);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(s.chain.current_block().number(), 0);
        assert!(s.miner.pending_block().is_none());
        s.miner.close();
        assert_eq!(s.miner.state(), MinerState::Idle);
        s.chain.stop();
    }

    #[test]
    fn test_set_extra_limit() {
        let s = setup();
        assert!(s.miner.set_extra(vec![0; MAXIMUM_EXTRA_DATA_SIZE]).is_ok());
        assert!(matches!(
            s.miner.set_extra(vec![0; MAXIMUM_EXTRA_DATA_SIZE + 1]),
            Err(ChainError::MiningError(_))
        ));
        s.miner.set_coinbase([3; 32]);
        assert_eq!(s.miner.coinbase(), [3; 32]);
        s.miner.close();
        s.chain.stop();
    }
}
