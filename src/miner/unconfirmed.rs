use crate::blockchain::Sha256Hash;
use crate::consensus::ChainReader;
use crate::crypto::short_hash;
use std::collections::VecDeque;
use tracing::{info, warn};

/// Blocks this node mined that are not yet buried deep enough to be
/// considered settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedBlock {
    pub index: u64,
    pub hash: Sha256Hash,
}

/// Where a tracked block ended up once its confirmation depth passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Canonical,
    SideFork,
    Missing,
}

#[derive(Debug)]
pub struct UnconfirmedBlocks {
    depth: u64,
    blocks: VecDeque<UnconfirmedBlock>,
}

impl UnconfirmedBlocks {
    pub fn new(depth: u64) -> Self {
        Self {
            depth,
            blocks: VecDeque::new(),
        }
    }

    /// Track a freshly mined block, settling anything already deep enough.
    pub fn insert(&mut self, chain: &dyn ChainReader, index: u64, hash: Sha256Hash) {
        self.shift(chain, index);
        self.blocks.push_back(UnconfirmedBlock { index, hash });
        info!(number = index, hash = %short_hash(&hash), "🔨 mined potential block");
    }

    /// Settle every tracked block at least `depth` below `height`, reporting
    /// where each ended up.
    pub fn shift(&mut self, chain: &dyn ChainReader, height: u64) -> Vec<(UnconfirmedBlock, Confirmation)> {
        let mut settled = Vec::new();
        while let Some(next) = self.blocks.front() {
            if next.index + self.depth > height {
                break;
            }
            let outcome = match chain.get_header_by_number(next.index) {
                Ok(Some(header)) if header.hash() == next.hash => {
                    info!(number = next.index, hash = %short_hash(&next.hash), "🔗 block reached canonical chain");
                    Confirmation::Canonical
                }
                Ok(Some(_)) => {
                    info!(number = next.index, hash = %short_hash(&next.hash), "⑂ block became a side fork");
                    Confirmation::SideFork
                }
                Ok(None) => {
                    warn!(number = next.index, hash = %short_hash(&next.hash), "Failed to retrieve header of mined block");
                    Confirmation::Missing
                }
                Err(err) => {
                    warn!(number = next.index, hash = %short_hash(&next.hash), error = %err, "Failed to retrieve header of mined block");
                    Confirmation::Missing
                }
            };
            if let Some(block) = self.blocks.pop_front() {
                settled.push((block, outcome));
            }
        }
        settled
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
