//! Node wiring: store, genesis, engine, chain, mempool and miner.

use crate::blockchain::{setup_genesis_block, BlockChain, Genesis};
use crate::config::Config;
use crate::consensus::{Engine, Pow};
use crate::crypto::short_hash;
use crate::error::Result;
use crate::mempool::{Mempool, TransactionSource};
use crate::miner::Miner;
use crate::persistence::{MemoryStore, SqliteStore, Store};
use crate::signal::Quit;
use crossbeam_channel::{select, tick};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Interval between head reports in [`Node::run`].
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
    Stopping,
}

pub struct Node {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub engine: Arc<Pow>,
    pub chain: Arc<BlockChain>,
    pub mempool: Arc<Mempool>,
    pub miner: Miner,
    state: RwLock<NodeState>,
    quit: Quit,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Open the store, install the genesis block and bring up the chain and
    /// miner. Nothing runs until [`Node::start`].
    pub fn init(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = if config.database.in_memory {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            if let Some(parent) = Path::new(&config.database.path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            info!(path = %config.database.path, "Opening database");
            Arc::new(SqliteStore::open(&config.database.path)?)
        };

        let genesis = match &config.genesis.file {
            Some(file) => Some(Genesis::from_json_file(file)?),
            None => None,
        };
        let genesis_hash = setup_genesis_block(store.as_ref(), genesis.as_ref())?;
        info!(hash = %short_hash(&genesis_hash), "Genesis block ready");

        let engine = Arc::new(Pow::from_config(&config.consensus));
        engine.set_threads(config.miner.threads);
        let chain = BlockChain::new(store.clone(), engine.clone() as Arc<dyn Engine>, config.chain.clone())?;
        let mempool = Arc::new(Mempool::new());
        let miner = Miner::new(
            chain.clone(),
            engine.clone() as Arc<dyn Engine>,
            mempool.clone() as Arc<dyn TransactionSource>,
            &config.miner,
        )?;

        let head = chain.current_block();
        info!(number = head.number(), hash = %short_hash(&head.hash()), "Chain loaded");

        Ok(Self {
            config,
            store,
            engine,
            chain,
            mempool,
            miner,
            state: RwLock::new(NodeState::Booting),
            quit: Quit::new(),
            pruner: Mutex::new(None),
        })
    }

    /// Start background work: mempool pruning and, if enabled, mining.
    pub fn start(&self) -> Result<()> {
        let heads = self.chain.subscribe_chain_head();
        let mempool = self.mempool.clone();
        let quit = self.quit.clone();
        let handle = thread::Builder::new().name("mempool-pruner".into()).spawn(move || loop {
            select! {
                recv(heads) -> ev => match ev {
                    Ok(ev) => {
                        mempool.remove_included(&ev.block);
                    }
                    Err(_) => return,
                },
                recv(quit.receiver()) -> _ => return,
            }
        })?;
        *self.pruner.lock() = Some(handle);

        if self.config.miner.enabled {
            self.miner.start(self.config.miner.coinbase_address()?);
        }
        *self.state.write() = NodeState::Ready;
        info!(mining = self.miner.is_mining(), "Node started");
        Ok(())
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// Handle that makes [`Node::run`] return when fired.
    pub fn quit_handle(&self) -> Quit {
        self.quit.clone()
    }

    /// Block until the quit signal fires, reporting the head periodically.
    pub fn run(&self) {
        let status = tick(STATUS_INTERVAL);
        loop {
            select! {
                recv(status) -> _ => {
                    let head = self.chain.current_block();
                    info!(
                        number = head.number(),
                        hash = %short_hash(&head.hash()),
                        difficulty = head.header.difficulty,
                        pending_txs = self.mempool.len(),
                        miner = ?self.miner.state(),
                        "Node running"
                    );
                }
                recv(self.quit.receiver()) -> _ => return,
            }
        }
    }

    /// Stop the miner, the pruner and the chain, in that order.
    pub fn shutdown(&self) {
        *self.state.write() = NodeState::Stopping;
        self.quit.fire();
        self.miner.close();
        if let Some(handle) = self.pruner.lock().take() {
            if handle.join().is_err() {
                warn!("Mempool pruner panicked");
            }
        }
        self.chain.stop();
        info!("Node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use std::time::Instant;

    fn config(in_memory: bool) -> Config {
        let mut config = Config::default();
        config.database.in_memory = in_memory;
        config.consensus.fixed_difficulty = Some(1);
        config.miner.threads = 1;
        config.miner.recommit_interval_ms = 200;
        config
    }

    #[test]
    fn test_init_in_memory_starts_at_genesis() {
        let node = Node::init(config(true)).unwrap();
        assert_eq!(node.state(), NodeState::Booting);
        assert_eq!(node.chain.current_block().number(), 0);
        node.start().unwrap();
        assert_eq!(node.state(), NodeState::Ready);
        assert!(!node.miner.is_mining());
        node.shutdown();
        assert_eq!(node.state(), NodeState::Stopping);
    }

    #[test]
    fn test_mined_transactions_leave_the_pool() {
        let mut config = config(true);
        config.miner.enabled = true;
        config.miner.coinbase = hex::encode([5u8; 32]);
        let node = Node::init(config).unwrap();
        node.mempool.add_transaction(Transaction::new(b"pay".to_vec())).unwrap();
        node.start().unwrap();

        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(20) && !node.mempool.is_empty() {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(node.mempool.is_empty());
        assert!(node.chain.current_block().number() >= 1);
        node.shutdown();
    }

    #[test]
    fn test_sqlite_node_reopens_same_chain() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(false);
        config.database.path = dir.path().join("data").join("chain.db").to_string_lossy().into_owned();

        let node = Node::init(config.clone()).unwrap();
        let genesis = node.chain.genesis().hash();
        node.shutdown();
        drop(node);

        let node = Node::init(config).unwrap();
        assert_eq!(node.chain.genesis().hash(), genesis);
        node.shutdown();
    }
}
