use super::types::Block;
use crate::consensus::ChainReader;
use crate::error::{ChainError, ConsensusError};
use std::collections::HashMap;

/// Body checks run after a block's header passed consensus verification.
pub trait Validator: Send + Sync {
    fn validate_body(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ChainError>;
}

/// Default body validator: rejects known blocks and blocks whose parent is
/// missing, then checks the transactions against the header.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockValidator;

impl BlockValidator {
    pub fn new() -> Self {
        BlockValidator
    }
}

impl Validator for BlockValidator {
    fn validate_body(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ChainError> {
        if chain.has_block(&block.hash(), block.number())? {
            return Err(ChainError::KnownBlock);
        }
        let parent_known = match block.number().checked_sub(1) {
            Some(number) => chain.has_block(&block.parent_hash(), number)?,
            None => false,
        };
        if !parent_known {
            return Err(ConsensusError::UnknownAncestor.into());
        }

        let tx_root = Block::calculate_tx_root(&block.transactions);
        if tx_root != block.header.tx_root {
            return Err(ChainError::TxRootMismatch {
                have: tx_root,
                want: block.header.tx_root,
            });
        }
        validate_transactions(block)
    }
}

/// Reject oversized and duplicated transactions.
pub fn validate_transactions(block: &Block) -> Result<(), ChainError> {
    let mut seen = HashMap::new();
    for (index, tx) in block.transactions.iter().enumerate() {
        tx.validate_size()?;
        if let Some(first) = seen.insert(tx.hash(), index) {
            return Err(ChainError::InvalidTransaction(format!(
                "Duplicate transaction {} at positions {} and {}",
                tx.hash_str(),
                first,
                index
            )));
        }
    }
    Ok(())
}
