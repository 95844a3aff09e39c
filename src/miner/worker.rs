//! Block assembly and sealing pipeline.
//!
//! Four long-lived threads cooperate over crossbeam channels:
//!
//! * `new_work_loop` turns head events, explicit starts and the recommit
//!   timer into assembly requests,
//! * `main_loop` assembles a candidate on top of the current head,
//! * `task_loop` hands candidates to the engine, cancelling the previous seal,
//! * `result_loop` commits sealed blocks that still extend the head.

use super::unconfirmed::UnconfirmedBlocks;
use crate::blockchain::{unix_time, Block, BlockChain, BlockHeader, ChainHeadEvent, Sha256Hash};
use crate::config::MinerConfig;
use crate::consensus::Engine;
use crate::crypto::{short_hash, Address, ZERO_ADDRESS};
use crate::error::Result;
use crate::mempool::TransactionSource;
use crate::signal::Quit;
use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Capacity of the sealed-result queue.
pub const RESULT_QUEUE_SIZE: usize = 10;

/// Where the worker currently is in its assemble/seal/commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MinerState {
    Idle = 0,
    Assembling = 1,
    Sealing = 2,
    Committing = 3,
}

impl MinerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MinerState::Assembling,
            2 => MinerState::Sealing,
            3 => MinerState::Committing,
            _ => MinerState::Idle,
        }
    }
}

struct Task {
    block: Block,
    created_at: Instant,
}

/// Why assembly was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Start,
    Head,
    Recommit,
}

enum TaskMsg {
    Seal(Task),
    Cancel,
}

struct Shared {
    chain: Arc<BlockChain>,
    engine: Arc<dyn Engine>,
    source: Arc<dyn TransactionSource>,
    recommit: Duration,

    running: AtomicBool,
    state: AtomicU8,
    coinbase: RwLock<Address>,
    extra: RwLock<Vec<u8>>,
    pending_block: Mutex<Option<Block>>,
    unconfirmed: Mutex<UnconfirmedBlocks>,

    start_tx: Sender<()>,
    new_work_tx: Sender<()>,
    task_tx: Sender<TaskMsg>,
    result_tx: Sender<Block>,
    exit: Quit,
}

pub struct Worker {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(
        chain: Arc<BlockChain>,
        engine: Arc<dyn Engine>,
        source: Arc<dyn TransactionSource>,
        config: &MinerConfig,
    ) -> Result<Self> {
        let (start_tx, start_rx) = bounded(1);
        let (new_work_tx, new_work_rx) = bounded(1);
        let (task_tx, task_rx) = unbounded();
        let (result_tx, result_rx) = bounded(RESULT_QUEUE_SIZE);
        let heads = chain.subscribe_chain_head();

        let shared = Arc::new(Shared {
            chain,
            engine,
            source,
            recommit: Duration::from_millis(config.recommit_interval_ms.max(1)),
            running: AtomicBool::new(false),
            state: AtomicU8::new(MinerState::Idle as u8),
            coinbase: RwLock::new(config.coinbase_address()?),
            extra: RwLock::new(config.extra.as_bytes().to_vec()),
            pending_block: Mutex::new(None),
            unconfirmed: Mutex::new(UnconfirmedBlocks::new(config.confirmation_depth)),
            start_tx,
            new_work_tx,
            task_tx,
            result_tx,
            exit: Quit::new(),
        });

        let mut handles = Vec::with_capacity(4);
        let s = Arc::clone(&shared);
        handles.push(spawn("miner-new-work", move || s.new_work_loop(start_rx, heads))?);
        let s = Arc::clone(&shared);
        handles.push(spawn("miner-main", move || s.main_loop(new_work_rx))?);
        let s = Arc::clone(&shared);
        handles.push(spawn("miner-task", move || s.task_loop(task_rx))?);
        let s = Arc::clone(&shared);
        handles.push(spawn("miner-result", move || s.result_loop(result_rx))?);

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
        })
    }

    pub fn start(&self) {
        self.shared.running.store(true, Ordering::SeqCst);
        // A queued start already triggers assembly.
        let _ = self.shared.start_tx.try_send(());
    }

    /// Stop sealing; the current candidate is abandoned.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.shared.task_tx.send(TaskMsg::Cancel);
        self.shared.set_state(MinerState::Idle);
    }

    /// Terminate every worker thread and wait for them.
    pub fn close(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.exit.fire();
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Miner thread panicked");
            }
        }
        self.shared.set_state(MinerState::Idle);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MinerState {
        MinerState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn set_coinbase(&self, coinbase: Address) {
        *self.shared.coinbase.write() = coinbase;
    }

    pub fn coinbase(&self) -> Address {
        *self.shared.coinbase.read()
    }

    pub fn set_extra(&self, extra: Vec<u8>) {
        *self.shared.extra.write() = extra;
    }

    /// Last assembled candidate, sealed or not.
    pub fn pending_block(&self) -> Option<Block> {
        self.shared.pending_block.lock().clone()
    }

    pub fn unconfirmed_len(&self) -> usize {
        self.shared.unconfirmed.lock().len()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.exit.fire();
    }
}

fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    Ok(thread::Builder::new().name(name.into()).spawn(f)?)
}

impl Shared {
    fn set_state(&self, state: MinerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn request_work(&self) {
        // One queued request is enough; assembly always reads the latest head.
        let _ = self.new_work_tx.try_send(());
    }

    fn new_work_loop(&self, start: Receiver<()>, heads: Receiver<ChainHeadEvent>) {
        let mut timer = never();
        loop {
            let trigger = select! {
                recv(start) -> msg => msg.ok().map(|()| Trigger::Start),
                recv(heads) -> ev => ev.ok().map(|ev| {
                    debug!(number = ev.block.number(), "New chain head, reassembling");
                    Trigger::Head
                }),
                recv(timer) -> _ => Some(Trigger::Recommit),
                recv(self.exit.receiver()) -> _ => None,
            };
            let Some(trigger) = trigger else {
                return;
            };
            if trigger != Trigger::Recommit || self.is_running() {
                self.request_work();
            }
            timer = after(self.recommit);
        }
    }

    fn main_loop(&self, new_work: Receiver<()>) {
        loop {
            select! {
                recv(new_work) -> msg => {
                    if msg.is_err() {
                        return;
                    }
                    if let Err(err) = self.commit_new_work() {
                        error!(error = %err, "Failed to assemble mining work");
                        self.set_state(MinerState::Idle);
                    }
                }
                recv(self.exit.receiver()) -> _ => return,
            }
        }
    }

    fn task_loop(&self, tasks: Receiver<TaskMsg>) {
        let mut stop: Option<Quit> = None;
        let mut prev: Option<Sha256Hash> = None;
        let mut sealers: Vec<JoinHandle<()>> = Vec::new();

        let interrupt = |stop: &mut Option<Quit>| {
            if let Some(stop) = stop.take() {
                stop.fire();
            }
        };

        loop {
            let msg = select! {
                recv(tasks) -> msg => msg.ok(),
                recv(self.exit.receiver()) -> _ => None,
            };
            match msg {
                Some(TaskMsg::Seal(task)) => {
                    let seal_hash = task.block.header.seal_hash();
                    if prev == Some(seal_hash) {
                        continue;
                    }
                    interrupt(&mut stop);
                    prev = Some(seal_hash);

                    let quit = Quit::new();
                    stop = Some(quit.clone());
                    let engine = Arc::clone(&self.engine);
                    let results = self.result_tx.clone();
                    let exit = self.exit.clone();
                    sealers.retain(|h| !h.is_finished());
                    match spawn("miner-seal", move || seal(engine, task, quit, results, exit)) {
                        Ok(handle) => sealers.push(handle),
                        Err(err) => error!(error = %err, "Failed to start sealer"),
                    }
                }
                Some(TaskMsg::Cancel) => {
                    interrupt(&mut stop);
                    prev = None;
                }
                None => break,
            }
        }
        interrupt(&mut stop);
        for handle in sealers {
            let _ = handle.join();
        }
    }

    fn result_loop(&self, results: Receiver<Block>) {
        loop {
            select! {
                recv(results) -> msg => match msg {
                    Ok(block) => {
                        if let Err(err) = self.commit_result(&block) {
                            error!(number = block.number(), hash = %short_hash(&block.hash()), error = %err, "Failed writing block to chain");
                            self.set_state(MinerState::Idle);
                        }
                    }
                    Err(_) => return,
                },
                recv(self.exit.receiver()) -> _ => return,
            }
        }
    }

    /// Write a sealed block if it still extends the head. Returns whether it
    /// was committed.
    fn commit_result(&self, block: &Block) -> Result<bool> {
        let hash = block.hash();
        if self.chain.get_block(&hash, block.number())?.is_some() {
            return Ok(false);
        }
        let head = self.chain.current_block();
        if block.parent_hash() != head.hash() {
            debug!(
                number = block.number(),
                hash = %short_hash(&hash),
                head = head.number(),
                "Discarding stale sealing result"
            );
            return Ok(false);
        }

        self.set_state(MinerState::Committing);
        self.chain.write_block(block)?;
        self.unconfirmed.lock().insert(self.chain.as_ref(), block.number(), hash);
        self.set_state(MinerState::Idle);
        Ok(true)
    }

    fn commit_new_work(&self) -> Result<()> {
        let started = Instant::now();
        self.set_state(MinerState::Assembling);

        let parent = self.chain.current_block();
        let now = unix_time();
        let timestamp = now.max(parent.timestamp() + 1);
        if timestamp > now + 1 {
            let wait = Duration::from_secs(timestamp - now);
            info!(wait_secs = wait.as_secs(), "Mining too far in the future");
            if self.exit.wait_timeout(wait) {
                return Ok(());
            }
        }

        let mut header = BlockHeader {
            parent_hash: parent.hash(),
            number: parent.number() + 1,
            timestamp,
            difficulty: 0,
            nonce: 0,
            coinbase: ZERO_ADDRESS,
            extra: self.extra.read().clone(),
            tx_root: [0; 32],
        };
        let running = self.is_running();
        if running {
            let coinbase = *self.coinbase.read();
            if coinbase == ZERO_ADDRESS {
                error!("Refusing to mine without coinbase");
                self.set_state(MinerState::Idle);
                return Ok(());
            }
            header.coinbase = coinbase;
        }
        self.engine.prepare(self.chain.as_ref(), &mut header)?;

        let transactions = self.source.pending()?;
        let block = self.engine.finalize(header, transactions)?;
        *self.pending_block.lock() = Some(block.clone());

        if !running {
            self.set_state(MinerState::Idle);
            return Ok(());
        }
        self.unconfirmed
            .lock()
            .shift(self.chain.as_ref(), block.number().saturating_sub(1));
        info!(
            number = block.number(),
            difficulty = block.header.difficulty,
            txs = block.transactions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Commit new mining work"
        );
        self.set_state(MinerState::Sealing);
        let _ = self.task_tx.send(TaskMsg::Seal(Task {
            block,
            created_at: started,
        }));
        Ok(())
    }
}

fn seal(engine: Arc<dyn Engine>, task: Task, stop: Quit, results: Sender<Block>, exit: Quit) {
    match engine.seal(&task.block, &stop) {
        Ok(Some(block)) => {
            info!(
                number = block.number(),
                hash = %short_hash(&block.hash()),
                elapsed_ms = task.created_at.elapsed().as_millis() as u64,
                "Successfully sealed new block"
            );
            select! {
                send(results, block) -> _ => {}
                recv(exit.receiver()) -> _ => {}
            }
        }
        Ok(None) => debug!(number = task.block.number(), "Sealing interrupted"),
        Err(err) => warn!(number = task.block.number(), error = %err, "Block sealing failed"),
    }
}
