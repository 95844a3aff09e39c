//! Canonical chain management.
//!
//! [`BlockChain`] owns the head of the canonical chain and everything needed
//! to move it: batch import with concurrent header verification, deferral of
//! blocks that arrive early, quarantine of bad blocks and explicit rewinds.

use super::events::{ChainHeadEvent, ChainHeadFeed};
use super::types::{unix_time, Block, BlockHeader, Body, Sha256Hash};
use super::validation::{BlockValidator, Validator};
use crate::cache::{CacheStats, ChainCaches};
use crate::config::ChainConfig;
use crate::consensus::{ChainReader, Engine};
use crate::crypto::short_hash;
use crate::error::{ChainError, ConsensusError, Result};
use crate::persistence::accessors;
use crate::persistence::Store;
use crate::signal::Quit;
use crossbeam_channel::{select, tick, Receiver};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Seconds ahead of local time past which a block is refused outright
/// instead of being deferred.
pub const MAX_TIME_FUTURE_BLOCKS: u64 = 30;

/// Counters reported after each imported segment.
#[derive(Debug, Default, Clone, Copy)]
struct InsertStats {
    processed: usize,
    queued: usize,
    ignored: usize,
}

pub struct BlockChain {
    config: ChainConfig,
    db: Arc<dyn Store>,
    engine: Arc<dyn Engine>,
    genesis_block: Block,

    current_block: RwLock<Block>,
    current_header: RwLock<BlockHeader>,
    validator: RwLock<Arc<dyn Validator>>,
    caches: ChainCaches,
    chain_head_feed: ChainHeadFeed,

    /// Serializes whole-batch insertion.
    chain_mu: Mutex<()>,
    /// Serializes head writes.
    mu: Mutex<()>,

    quit: Quit,
    update_loop: Mutex<Option<JoinHandle<()>>>,
}

impl BlockChain {
    /// Open the chain stored in `db`. The store must already contain a
    /// genesis block (see [`super::genesis::setup_genesis_block`]).
    pub fn new(db: Arc<dyn Store>, engine: Arc<dyn Engine>, config: ChainConfig) -> Result<Arc<Self>> {
        let genesis_block = match accessors::read_canonical_hash(db.as_ref(), 0)? {
            Some(hash) => accessors::read_block(db.as_ref(), &hash, 0)?,
            None => None,
        }
        .ok_or(ChainError::NoGenesis)?;

        let caches = ChainCaches::new(
            config.header_cache_limit,
            config.body_cache_limit,
            config.block_cache_limit,
            config.max_future_blocks,
            config.bad_block_limit,
        );
        let chain = BlockChain {
            current_block: RwLock::new(genesis_block.clone()),
            current_header: RwLock::new(genesis_block.header.clone()),
            validator: RwLock::new(Arc::new(BlockValidator::new())),
            caches,
            chain_head_feed: ChainHeadFeed::new(),
            chain_mu: Mutex::new(()),
            mu: Mutex::new(()),
            quit: Quit::new(),
            update_loop: Mutex::new(None),
            genesis_block,
            config,
            db,
            engine,
        };
        chain.load_last_state()?;

        let chain = Arc::new(chain);
        let interval = Duration::from_millis(chain.config.future_block_interval_ms.max(1));
        let weak = Arc::downgrade(&chain);
        let quit = chain.quit.clone();
        let handle = thread::Builder::new()
            .name("chain-update".into())
            .spawn(move || update_loop(weak, quit, interval))?;
        *chain.update_loop.lock() = Some(handle);
        Ok(chain)
    }

    fn load_last_state(&self) -> Result<()> {
        let head = match accessors::read_head_block_hash(self.db.as_ref())? {
            Some(head) => head,
            None => {
                warn!("Empty database, resetting chain");
                return self.reset();
            }
        };
        let current = match self.get_block_by_hash(&head)? {
            Some(block) => block,
            None => {
                warn!(hash = %short_hash(&head), "Head block missing, resetting chain");
                return self.reset();
            }
        };

        let header = match accessors::read_head_header_hash(self.db.as_ref())? {
            Some(hash) => self.get_header_by_hash(&hash)?,
            None => None,
        }
        .unwrap_or_else(|| current.header.clone());

        info!(number = header.number, hash = %short_hash(&header.hash()), "Loaded most recent local header");
        info!(number = current.number(), hash = %short_hash(&current.hash()), "Loaded most recent local full block");
        *self.current_header.write() = header;
        *self.current_block.write() = current;
        Ok(())
    }

    /// Purge the whole chain and restart from the genesis block.
    pub fn reset(&self) -> Result<()> {
        self.reset_with_genesis_block(self.genesis_block.clone())
    }

    fn reset_with_genesis_block(&self, genesis: Block) -> Result<()> {
        self.set_head(0)?;

        let _guard = self.mu.lock();
        let db = self.db.as_ref();
        let hash = genesis.hash();
        accessors::write_block(db, &genesis)?;
        accessors::write_canonical_hash(db, &hash, 0)?;
        accessors::write_head_block_hash(db, &hash)?;
        accessors::write_head_header_hash(db, &hash)?;

        *self.current_header.write() = genesis.header.clone();
        *self.current_block.write() = genesis;
        Ok(())
    }

    /// Rewind the canonical chain to the nearest complete block at or below
    /// `target`, deleting everything above it and emptying all caches.
    pub fn set_head(&self, target: u64) -> Result<()> {
        warn!(target, "Rewinding blockchain");
        let _guard = self.mu.lock();
        let db = self.db.as_ref();

        let head = self.current_header();
        let top = head.number.max(self.current_block().number());

        let mut cursor = Some(head);
        while let Some(header) = cursor.filter(|h| h.number > target) {
            accessors::delete_block(db, &header.hash(), header.number)?;
            cursor = accessors::read_header(db, &header.parent_hash, header.number - 1)?;
        }

        // Bodies may be missing below the target; settle on the first
        // complete block.
        let mut number = target.min(top);
        let block = loop {
            if let Some(hash) = accessors::read_canonical_hash(db, number)? {
                if let Some(block) = accessors::read_block(db, &hash, number)? {
                    break block;
                }
            }
            if number == 0 {
                break self.genesis_block.clone();
            }
            number -= 1;
        };
        for stale in (block.number() + 1)..=top {
            accessors::delete_canonical_hash(db, stale)?;
        }

        self.caches.purge();
        let hash = block.hash();
        accessors::write_head_block_hash(db, &hash)?;
        accessors::write_head_header_hash(db, &hash)?;

        info!(number = block.number(), hash = %short_hash(&hash), "Rewound chain head");
        *self.current_header.write() = block.header.clone();
        *self.current_block.write() = block;
        Ok(())
    }

    /// Persist `block` and make it the head if it is at least as high as the
    /// current one. Returns whether the head moved.
    pub fn write_block(&self, block: &Block) -> Result<bool> {
        let canonical = {
            let _guard = self.mu.lock();
            self.write_block_locked(block)?
        };
        if canonical {
            self.post_chain_head(block.clone());
        }
        Ok(canonical)
    }

    fn write_block_locked(&self, block: &Block) -> Result<bool> {
        accessors::write_block(self.db.as_ref(), block)?;
        let hash = block.hash();
        self.caches.future.remove(&hash);

        if block.number() < self.current_block().number() {
            return Ok(false);
        }
        self.insert(block)?;
        self.caches.bad.remove(&hash);
        Ok(true)
    }

    /// Make `block` the head, rewriting canonical mappings of any ancestors
    /// that were on a side chain. Callers hold `mu`.
    fn insert(&self, block: &Block) -> Result<()> {
        let db = self.db.as_ref();
        let hash = block.hash();

        // Resolve the whole side-chain ancestry before touching any mapping.
        let mut rewrites: Vec<(Sha256Hash, u64)> = Vec::new();
        let mut ancestor = block.header.clone();
        while ancestor.number > 0 {
            let parent_number = ancestor.number - 1;
            if accessors::read_canonical_hash(db, parent_number)? == Some(ancestor.parent_hash) {
                break;
            }
            let parent = self.get_header(&ancestor.parent_hash, parent_number)?.ok_or_else(|| {
                ChainError::MissingBlock(format!("ancestor #{} [{}]", parent_number, short_hash(&ancestor.parent_hash)))
            })?;
            rewrites.push((ancestor.parent_hash, parent_number));
            ancestor = parent;
        }

        accessors::write_canonical_hash(db, &hash, block.number())?;
        for (ancestor_hash, number) in &rewrites {
            accessors::write_canonical_hash(db, ancestor_hash, *number)?;
        }
        let reorged = rewrites.len();
        if reorged > 0 {
            info!(number = block.number(), hash = %short_hash(&hash), depth = reorged, "Chain reorganised");
        }

        accessors::write_head_block_hash(db, &hash)?;
        accessors::write_head_header_hash(db, &hash)?;
        *self.current_header.write() = block.header.clone();
        *self.current_block.write() = block.clone();
        Ok(())
    }

    /// Import a contiguous run of blocks.
    ///
    /// Returns the number of blocks processed and `Ok`, or the index of the
    /// failing block and its error. Blocks before a failure stay committed.
    pub fn insert_chain(&self, chain: &[Block]) -> (usize, Result<()>) {
        if chain.is_empty() {
            return (0, Ok(()));
        }
        for i in 1..chain.len() {
            let (prev, next) = (&chain[i - 1], &chain[i]);
            if next.number() != prev.number() + 1 || next.parent_hash() != prev.hash() {
                error!(
                    number = next.number(),
                    hash = %short_hash(&next.hash()),
                    parent = %short_hash(&next.parent_hash()),
                    prev_number = prev.number(),
                    prev_hash = %short_hash(&prev.hash()),
                    "Non contiguous block insert"
                );
                return (
                    0,
                    Err(ChainError::NonContiguousInsert(format!(
                        "item {} is #{} [{}], item {} is #{} [{}] (parent [{}])",
                        i - 1,
                        prev.number(),
                        short_hash(&prev.hash()),
                        i,
                        next.number(),
                        short_hash(&next.hash()),
                        short_hash(&next.parent_hash()),
                    ))),
                );
            }
        }

        let _batch = self.chain_mu.lock();
        let started = Instant::now();

        let headers = chain.iter().map(|b| b.header.clone()).collect();
        let (abort, results) = self.engine.verify_headers(self, headers, vec![true; chain.len()]);
        let _abort = abort.fire_on_drop();

        let validator = self.validator();
        let mut stats = InsertStats::default();
        let mut last_canon: Option<&Block> = None;
        let mut outcome = (chain.len(), Ok(()));

        for (i, block) in chain.iter().enumerate() {
            if self.quit.is_fired() {
                debug!("Premature abort during blocks processing");
                outcome = (i, Ok(()));
                break;
            }
            let verified = results
                .recv()
                .unwrap_or(Err(ChainError::VerificationInterrupted))
                .and_then(|()| validator.validate_body(self, block));

            match verified {
                Ok(()) => {}
                Err(ChainError::KnownBlock) if self.current_block().number() >= block.number() => {
                    stats.ignored += 1;
                    continue;
                }
                // Known but ahead of a rewound head: write it again.
                Err(ChainError::KnownBlock) => {}
                Err(ChainError::Consensus(ConsensusError::FutureBlock)) => {
                    let max = unix_time() + self.config.max_time_future_blocks;
                    if block.timestamp() > max {
                        outcome = (
                            i,
                            Err(ChainError::FutureBlockTooFar {
                                time: block.timestamp(),
                                max,
                            }),
                        );
                        break;
                    }
                    self.caches.future.put(block.hash(), block.clone());
                    stats.queued += 1;
                    continue;
                }
                Err(ChainError::Consensus(ConsensusError::UnknownAncestor))
                    if self.caches.future.contains(&block.parent_hash()) =>
                {
                    self.caches.future.put(block.hash(), block.clone());
                    stats.queued += 1;
                    continue;
                }
                Err(err) => {
                    self.report_block(block, &err);
                    outcome = (i, Err(err));
                    break;
                }
            }

            let written = {
                let _guard = self.mu.lock();
                self.write_block_locked(block)
            };
            match written {
                Ok(true) => {
                    debug!(number = block.number(), hash = %short_hash(&block.hash()), txs = block.transactions.len(), "Inserted new block");
                    last_canon = Some(block);
                }
                Ok(false) => {
                    debug!(number = block.number(), hash = %short_hash(&block.hash()), "Inserted forked block");
                }
                Err(err) => {
                    outcome = (i, Err(err));
                    break;
                }
            }
            stats.processed += 1;
        }

        if let Some(block) = last_canon {
            if self.current_block().hash() == block.hash() {
                self.post_chain_head(block.clone());
            }
        }
        if stats.processed > 0 || stats.queued > 0 {
            let head = self.current_block();
            info!(
                blocks = stats.processed,
                queued = stats.queued,
                ignored = stats.ignored,
                elapsed_ms = started.elapsed().as_millis() as u64,
                number = head.number(),
                hash = %short_hash(&head.hash()),
                "Imported new chain segment"
            );
        }
        outcome
    }

    fn report_block(&self, block: &Block, err: &ChainError) {
        self.caches.bad.put(block.hash(), block.clone());
        error!(
            number = block.number(),
            hash = %short_hash(&block.hash()),
            parent = %short_hash(&block.parent_hash()),
            error = %err,
            "Bad block"
        );
    }

    /// Retry deferred blocks, lowest number first.
    pub fn proc_future_blocks(&self) {
        let mut blocks = self.caches.future.values();
        if blocks.is_empty() {
            return;
        }
        blocks.sort_by_key(|b| b.number());
        debug!(count = blocks.len(), "Retrying future blocks");
        for block in blocks {
            // Still-early blocks are queued again by insert_chain.
            self.caches.future.remove(&block.hash());
            if let (_, Err(err)) = self.insert_chain(std::slice::from_ref(&block)) {
                debug!(number = block.number(), hash = %short_hash(&block.hash()), error = %err, "Future block rejected");
            }
        }
    }

    fn post_chain_head(&self, block: Block) {
        self.chain_head_feed.send(ChainHeadEvent { block });
    }

    pub fn subscribe_chain_head(&self) -> Receiver<ChainHeadEvent> {
        self.chain_head_feed.subscribe()
    }

    pub fn current_block(&self) -> Block {
        self.current_block.read().clone()
    }

    pub fn current_header(&self) -> BlockHeader {
        self.current_header.read().clone()
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis_block
    }

    pub fn validator(&self) -> Arc<dyn Validator> {
        Arc::clone(&self.validator.read())
    }

    pub fn set_validator(&self, validator: Arc<dyn Validator>) {
        *self.validator.write() = validator;
    }

    pub fn get_header(&self, hash: &Sha256Hash, number: u64) -> Result<Option<BlockHeader>> {
        if let Some(header) = self.caches.headers.get(hash) {
            return Ok(Some(header));
        }
        let header = accessors::read_header(self.db.as_ref(), hash, number)?;
        if let Some(header) = &header {
            self.caches.headers.put(*hash, header.clone());
        }
        Ok(header)
    }

    pub fn get_header_by_hash(&self, hash: &Sha256Hash) -> Result<Option<BlockHeader>> {
        if let Some(header) = self.caches.headers.get(hash) {
            return Ok(Some(header));
        }
        match accessors::read_header_number(self.db.as_ref(), hash)? {
            Some(number) => self.get_header(hash, number),
            None => Ok(None),
        }
    }

    pub fn get_header_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
        match accessors::read_canonical_hash(self.db.as_ref(), number)? {
            Some(hash) => self.get_header(&hash, number),
            None => Ok(None),
        }
    }

    pub fn get_body(&self, hash: &Sha256Hash) -> Result<Option<Body>> {
        if let Some(body) = self.caches.bodies.get(hash) {
            return Ok(Some(body));
        }
        let number = match accessors::read_header_number(self.db.as_ref(), hash)? {
            Some(number) => number,
            None => return Ok(None),
        };
        let body = accessors::read_body(self.db.as_ref(), hash, number)?;
        if let Some(body) = &body {
            self.caches.bodies.put(*hash, body.clone());
        }
        Ok(body)
    }

    pub fn get_block(&self, hash: &Sha256Hash, number: u64) -> Result<Option<Block>> {
        if let Some(block) = self.caches.blocks.get(hash) {
            return Ok(Some(block));
        }
        let block = accessors::read_block(self.db.as_ref(), hash, number)?;
        if let Some(block) = &block {
            self.caches.blocks.put(*hash, block.clone());
        }
        Ok(block)
    }

    pub fn get_block_by_hash(&self, hash: &Sha256Hash) -> Result<Option<Block>> {
        if let Some(block) = self.caches.blocks.get(hash) {
            return Ok(Some(block));
        }
        match accessors::read_header_number(self.db.as_ref(), hash)? {
            Some(number) => self.get_block(hash, number),
            None => Ok(None),
        }
    }

    pub fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        match accessors::read_canonical_hash(self.db.as_ref(), number)? {
            Some(hash) => self.get_block(&hash, number),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Sha256Hash, number: u64) -> Result<bool> {
        if self.caches.blocks.contains(hash) {
            return Ok(true);
        }
        accessors::has_body(self.db.as_ref(), hash, number)
    }

    /// Recently rejected blocks, newest first.
    pub fn bad_blocks(&self) -> Vec<Block> {
        self.caches.bad.values()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.caches.stats()
    }

    /// Stop the background loop and wait for it to exit.
    pub fn stop(&self) {
        self.quit.fire();
        if let Some(handle) = self.update_loop.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Chain update loop panicked");
            }
        }
        info!("Blockchain manager stopped");
    }
}

impl Drop for BlockChain {
    fn drop(&mut self) {
        self.quit.fire();
    }
}

fn update_loop(chain: Weak<BlockChain>, quit: Quit, interval: Duration) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => match chain.upgrade() {
                Some(chain) => chain.proc_future_blocks(),
                None => return,
            },
            recv(quit.receiver()) -> _ => return,
        }
    }
}

impl ChainReader for BlockChain {
    fn current_header(&self) -> BlockHeader {
        BlockChain::current_header(self)
    }

    fn get_header(&self, hash: &Sha256Hash, number: u64) -> Result<Option<BlockHeader>> {
        BlockChain::get_header(self, hash, number)
    }

    fn get_header_by_number(&self, number: u64) -> Result<Option<BlockHeader>> {
        BlockChain::get_header_by_number(self, number)
    }

    fn get_block(&self, hash: &Sha256Hash, number: u64) -> Result<Option<Block>> {
        BlockChain::get_block(self, hash, number)
    }

    fn has_block(&self, hash: &Sha256Hash, number: u64) -> Result<bool> {
        BlockChain::has_block(self, hash, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::genesis::{setup_genesis_block, Genesis};
    use crate::consensus::{FixedDifficulty, Pow};
    use crate::persistence::MemoryStore;
    use crate::transaction::Transaction;

    fn genesis() -> Genesis {
        Genesis {
            nonce: 0,
            timestamp: unix_time() - 10_000,
            extra_data: vec![],
            difficulty: Some(1),
            coinbase: [0; 32],
            number: 0,
            parent_hash: [0; 32],
        }
    }

    fn new_chain() -> (Arc<dyn Store>, Arc<BlockChain>) {
        let db: Arc<dyn Store> = Arc::new(MemoryStore::new());
        setup_genesis_block(db.as_ref(), Some(&genesis())).unwrap();
        let engine = Arc::new(Pow::new(FixedDifficulty(1)));
        let chain = BlockChain::new(db.clone(), engine, ChainConfig::default()).unwrap();
        (db, chain)
    }

    fn child(parent: &Block, tag: u8) -> Block {
        Block::new(
            BlockHeader {
                parent_hash: parent.hash(),
                number: parent.number() + 1,
                timestamp: parent.timestamp() + 10,
                difficulty: 1,
                nonce: 0,
                coinbase: [tag; 32],
                extra: vec![tag],
                tx_root: [0; 32],
            },
            vec![Transaction::new(vec![tag, parent.number() as u8])],
        )
    }

    fn extend(from: &Block, n: usize, tag: u8) -> Vec<Block> {
        let mut out: Vec<Block> = Vec::with_capacity(n);
        for _ in 0..n {
            let parent = out.last().unwrap_or(from).clone();
            out.push(child(&parent, tag));
        }
        out
    }

    #[test]
    fn test_new_requires_genesis() {
        let db: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let engine = Arc::new(Pow::new(FixedDifficulty(1)));
        let err = BlockChain::new(db, engine, ChainConfig::default()).err();
        assert_eq!(err, Some(ChainError::NoGenesis));
    }

    #[test]
    fn test_empty_batch() {
        let (_, chain) = new_chain();
        assert_eq!(chain.insert_chain(&[]), (0, Ok(())));
    }

    #[test]
    fn test_write_block_moves_head_and_notifies() {
        let (_, chain) = new_chain();
        let events = chain.subscribe_chain_head();
        let block = child(chain.genesis(), 1);

        assert!(chain.write_block(&block).unwrap());
        assert_eq!(chain.current_block(), block);
        assert_eq!(chain.current_header(), block.header);
        assert_eq!(events.try_recv().unwrap().block, block);

        // A lower block is stored but leaves the head alone.
        let second = child(&block, 1);
        chain.write_block(&second).unwrap();
        let side = child(chain.genesis(), 2);
        assert!(!chain.write_block(&side).unwrap());
        assert_eq!(chain.current_block(), second);
        assert!(chain.has_block(&side.hash(), 1).unwrap());
    }

    #[test]
    fn test_reorg_rewrites_canonical_ancestors() {
        let (_, chain) = new_chain();
        let main = extend(chain.genesis(), 2, 1);
        assert_eq!(chain.insert_chain(&main), (2, Ok(())));

        let fork = extend(chain.genesis(), 3, 2);
        // The fork's first two blocks are side blocks; the third overtakes.
        assert_eq!(chain.insert_chain(&fork), (3, Ok(())));
        assert_eq!(chain.current_block(), fork[2]);
        for block in &fork {
            assert_eq!(
                chain.get_block_by_number(block.number()).unwrap(),
                Some(block.clone())
            );
        }
    }

    #[test]
    fn test_accessors_fill_caches() {
        let (_, chain) = new_chain();
        let blocks = extend(chain.genesis(), 3, 1);
        assert_eq!(chain.insert_chain(&blocks), (3, Ok(())));
        chain.caches.purge();

        let target = &blocks[1];
        assert_eq!(chain.get_block(&target.hash(), 2).unwrap(), Some(target.clone()));
        assert_eq!(chain.get_body(&target.hash()).unwrap(), Some(target.body()));
        assert_eq!(
            chain.get_header_by_hash(&target.hash()).unwrap(),
            Some(target.header.clone())
        );
        let stats = chain.cache_stats();
        assert_eq!((stats.blocks, stats.bodies, stats.headers), (1, 1, 1));
        assert_eq!(chain.get_block_by_hash(&[9u8; 32]).unwrap(), None);
    }

    #[test]
    fn test_known_blocks_are_skipped() {
        let (_, chain) = new_chain();
        let blocks = extend(chain.genesis(), 3, 1);
        assert_eq!(chain.insert_chain(&blocks), (3, Ok(())));
        assert_eq!(chain.insert_chain(&blocks), (3, Ok(())));
        assert_eq!(chain.current_block(), blocks[2]);
        assert!(chain.bad_blocks().is_empty());
    }

    #[test]
    fn test_bad_block_quarantined_and_batch_aborted() {
        let (_, chain) = new_chain();
        let mut blocks = extend(chain.genesis(), 3, 1);
        // Break the body of the middle block while keeping ancestry intact.
        blocks[1].transactions.push(Transaction::new(b"smuggled".to_vec()));

        let (index, result) = chain.insert_chain(&blocks);
        assert_eq!(index, 1);
        assert!(matches!(result, Err(ChainError::TxRootMismatch { .. })));
        assert_eq!(chain.current_block(), blocks[0]);
        assert_eq!(chain.bad_blocks(), vec![blocks[1].clone()]);
    }

    #[test]
    fn test_far_future_block_refused() {
        let (_, chain) = new_chain();
        let mut block = child(chain.genesis(), 1);
        block.header.timestamp = unix_time() + MAX_TIME_FUTURE_BLOCKS + 60;
        let (index, result) = chain.insert_chain(&[block]);
        assert_eq!(index, 0);
        assert!(matches!(result, Err(ChainError::FutureBlockTooFar { .. })));
        assert_eq!(chain.cache_stats().future, 0);
    }

    #[test]
    fn test_mild_future_blocks_queued_with_children() {
        let (_, chain) = new_chain();
        let mut early = child(chain.genesis(), 1);
        early.header.timestamp = unix_time() + 20;
        let mut late = child(&early, 1);
        late.header.timestamp = early.timestamp() + 1;

        assert_eq!(chain.insert_chain(&[early.clone(), late]), (2, Ok(())));
        assert_eq!(chain.cache_stats().future, 2);
        assert_eq!(chain.current_block(), *chain.genesis());
    }

    #[test]
    fn test_set_head_rewinds_and_purges() {
        let (db, chain) = new_chain();
        let blocks = extend(chain.genesis(), 5, 1);
        assert_eq!(chain.insert_chain(&blocks), (5, Ok(())));

        chain.set_head(2).unwrap();
        assert_eq!(chain.current_block(), blocks[1]);
        assert_eq!(chain.current_header(), blocks[1].header);
        assert_eq!(chain.cache_stats(), CacheStats::default());
        assert_eq!(accessors::read_canonical_hash(db.as_ref(), 3).unwrap(), None);
        assert!(!chain.has_block(&blocks[4].hash(), 5).unwrap());
        assert_eq!(
            accessors::read_head_block_hash(db.as_ref()).unwrap(),
            Some(blocks[1].hash())
        );

        // The rewound segment can be imported again.
        assert_eq!(chain.insert_chain(&blocks[2..]), (3, Ok(())));
        assert_eq!(chain.current_block(), blocks[4]);
    }

    #[test]
    fn test_orphan_write_leaves_canonical_mapping_untouched() {
        let (_db, chain) = new_chain();
        let a1 = child(chain.genesis(), 1);
        assert!(chain.write_block(&a1).unwrap());
        let gap = extend(&a1, 2, 1);

        let result = chain.write_block(&gap[1]);
        assert!(matches!(result, Err(ChainError::MissingBlock(_))));
        assert_eq!(chain.current_block(), a1);
        assert_eq!(chain.get_header_by_number(1).unwrap(), Some(a1.header.clone()));
        assert_eq!(chain.get_header_by_number(2).unwrap(), None);
        assert_eq!(chain.get_header_by_number(3).unwrap(), None);
        assert_eq!(chain.get_block_by_number(3).unwrap(), None);
        chain.stop();
    }

    #[test]
    fn test_orphan_is_quarantined_not_deferred() {
        let (_db, chain) = new_chain();
        let blocks = extend(chain.genesis(), 2, 1);

        let (index, result) = chain.insert_chain(&blocks[1..]);
        assert_eq!(index, 0);
        assert_eq!(result, Err(ConsensusError::UnknownAncestor.into()));
        assert_eq!(chain.cache_stats().future, 0);
        assert_eq!(chain.bad_blocks(), vec![blocks[1].clone()]);

        // The parent arriving later does not revive the orphan.
        assert_eq!(chain.insert_chain(&blocks[..1]), (1, Ok(())));
        chain.proc_future_blocks();
        assert_eq!(chain.current_block(), blocks[0]);
        chain.stop();
    }

    #[test]
    fn test_reinserting_genesis_is_a_no_op() {
        let (_db, chain) = new_chain();
        let genesis = chain.genesis().clone();
        assert_eq!(chain.insert_chain(std::slice::from_ref(&genesis)), (1, Ok(())));
        assert_eq!(chain.current_block(), genesis);
        assert!(chain.bad_blocks().is_empty());
        chain.stop();
    }

    #[test]
    fn test_reopen_restores_head() {
        let (db, chain) = new_chain();
        let blocks = extend(chain.genesis(), 2, 1);
        assert_eq!(chain.insert_chain(&blocks), (2, Ok(())));
        chain.stop();
        drop(chain);

        let engine = Arc::new(Pow::new(FixedDifficulty(1)));
        let reopened = BlockChain::new(db, engine, ChainConfig::default()).unwrap();
        assert_eq!(reopened.current_block(), blocks[1]);
    }

    #[test]
    fn test_missing_head_block_resets_to_genesis() {
        let (db, chain) = new_chain();
        let genesis = chain.genesis().clone();
        chain.stop();
        drop(chain);
        accessors::write_head_block_hash(db.as_ref(), &[0xee; 32]).unwrap();

        let engine = Arc::new(Pow::new(FixedDifficulty(1)));
        let reopened = BlockChain::new(db.clone(), engine, ChainConfig::default()).unwrap();
        assert_eq!(reopened.current_block(), genesis);
        assert_eq!(
            accessors::read_head_block_hash(db.as_ref()).unwrap(),
            Some(genesis.hash())
        );
    }
}
