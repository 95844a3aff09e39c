//! Pending transaction pool.
//!
//! The miner pulls candidate transactions through [`TransactionSource`]; the
//! node prunes transactions once a block including them becomes the head.

use crate::blockchain::{Block, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_MAX_POOL_SIZE: usize = 4096;

/// Supplier of transactions for the next block.
pub trait TransactionSource: Send + Sync {
    /// Transactions to include in full, in inclusion order.
    fn pending(&self) -> Result<Vec<Transaction>>;
}

#[derive(Default)]
struct MempoolInner {
    ordered: Vec<Transaction>,
    by_hash: HashSet<Sha256Hash>,
}

/// Insertion-ordered pool with duplicate suppression and a size cap.
pub struct Mempool {
    inner: RwLock<MempoolInner>,
    max_size: usize,
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_POOL_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(MempoolInner::default()),
            max_size,
        }
    }

    /// Add a transaction. Returns `false` if it was already pooled.
    pub fn add_transaction(&self, tx: Transaction) -> Result<bool> {
        tx.validate_size()?;
        let mut inner = self.inner.write();
        if inner.by_hash.contains(&tx.hash()) {
            return Ok(false);
        }
        if inner.ordered.len() >= self.max_size {
            return Err(ChainError::InvalidTransaction(format!(
                "Mempool full ({} transactions)",
                self.max_size
            )));
        }
        inner.by_hash.insert(tx.hash());
        inner.ordered.push(tx);
        Ok(true)
    }

    pub fn remove_transaction(&self, hash: &Sha256Hash) -> bool {
        let mut inner = self.inner.write();
        if !inner.by_hash.remove(hash) {
            return false;
        }
        inner.ordered.retain(|tx| tx.hash() != *hash);
        true
    }

    /// Drop every pooled transaction that `block` includes.
    pub fn remove_included(&self, block: &Block) -> usize {
        let included: HashSet<Sha256Hash> = block.transactions.iter().map(|tx| tx.hash()).collect();
        let mut inner = self.inner.write();
        let before = inner.ordered.len();
        inner.ordered.retain(|tx| !included.contains(&tx.hash()));
        inner.by_hash.retain(|hash| !included.contains(hash));
        let removed = before - inner.ordered.len();
        if removed > 0 {
            debug!(number = block.number(), removed, remaining = inner.ordered.len(), "Pruned included transactions");
        }
        removed
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.inner.read().by_hash.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().ordered.is_empty()
    }

    pub fn get_transactions(&self) -> Vec<Transaction> {
        self.inner.read().ordered.clone()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSource for Mempool {
    fn pending(&self) -> Result<Vec<Transaction>> {
        Ok(self.get_transactions())
    }
}
