//! Consensus engine abstraction.
//!
//! The chain store hands headers to an [`Engine`] for verification and the
//! miner asks it to prepare, finalize and seal candidate blocks. Engines only
//! see the chain through the read-only [`ChainReader`] view.

pub mod difficulty;
pub mod pow;
pub mod reorder;
mod sealer;

pub use difficulty::{DifficultyPolicy, FixedDifficulty, ParentAdjusted};
pub use pow::Pow;

use crate::blockchain::{Block, BlockHeader, Sha256Hash};
use crate::crypto::Address;
use crate::error::Result;
use crate::signal::Quit;
use crate::transaction::Transaction;
use crossbeam_channel::Receiver;

/// Read-only chain access needed during header verification and block
/// assembly.
pub trait ChainReader: Send + Sync {
    fn current_header(&self) -> BlockHeader;
    fn get_header(&self, hash: &Sha256Hash, number: u64) -> Result<Option<BlockHeader>>;
    fn get_header_by_number(&self, number: u64) -> Result<Option<BlockHeader>>;
    fn get_block(&self, hash: &Sha256Hash, number: u64) -> Result<Option<Block>>;
    fn has_block(&self, hash: &Sha256Hash, number: u64) -> Result<bool>;
}

pub trait Engine: Send + Sync {
    /// Address credited with mining the block.
    fn author(&self, header: &BlockHeader) -> Address;

    /// Check a header against the rules of the engine, looking its parent up
    /// in `chain`. The seal is only checked when `seal` is set.
    fn verify_header(&self, chain: &dyn ChainReader, header: &BlockHeader, seal: bool) -> Result<()>;

    /// Verify a batch of headers concurrently. Results arrive on the returned
    /// channel in input order; firing the returned signal abandons the rest.
    fn verify_headers(
        &self,
        chain: &dyn ChainReader,
        headers: Vec<BlockHeader>,
        seals: Vec<bool>,
    ) -> (Quit, Receiver<Result<()>>);

    fn calc_difficulty(&self, time: u64, parent: &BlockHeader) -> u64;

    /// Fill the consensus fields of a header about to be mined on.
    fn prepare(&self, chain: &dyn ChainReader, header: &mut BlockHeader) -> Result<()>;

    /// Assemble the final block from a prepared header and its transactions.
    fn finalize(&self, header: BlockHeader, transactions: Vec<Transaction>) -> Result<Block>;

    /// Search for a valid seal. Returns `Ok(None)` if `stop` fired first.
    fn seal(&self, block: &Block, stop: &Quit) -> Result<Option<Block>>;

    fn verify_seal(&self, header: &BlockHeader) -> Result<()>;
}
