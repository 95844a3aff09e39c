use crate::crypto::Address;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// Maximum size extra data may be after genesis.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_time() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub parent_hash: Sha256Hash,
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub difficulty: u64,
    pub nonce: u64,
    pub coinbase: Address,
    pub extra: Vec<u8>,
    pub tx_root: Sha256Hash,
}

impl BlockHeader {
    fn hash_fields(&self, hasher: &mut Sha256) {
        hasher.update(self.parent_hash);
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.coinbase);
        hasher.update((self.extra.len() as u64).to_le_bytes());
        hasher.update(&self.extra);
        hasher.update(self.tx_root);
    }

    /// Canonical block identity, covering every field including the nonce.
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        self.hash_fields(&mut hasher);
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }

    /// Hash of the header without the nonce; the input to the PoW search.
    pub fn seal_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        self.hash_fields(&mut hasher);
        hasher.finalize().into()
    }
}

/// Transactions of a block, stored separately from its header.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block, committing the header to the given transactions.
    pub fn new(mut header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        header.tx_root = Block::calculate_tx_root(&transactions);
        Block {
            header,
            transactions,
        }
    }

    /// Rebuild a block from stored parts without touching the header.
    pub fn from_parts(header: BlockHeader, body: Body) -> Self {
        Block {
            header,
            transactions: body.transactions,
        }
    }

    /// Returns a copy of the block with the sealed header swapped in.
    pub fn with_seal(&self, header: BlockHeader) -> Self {
        Block {
            header,
            transactions: self.transactions.clone(),
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Sha256Hash {
        self.header.parent_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    pub fn body(&self) -> Body {
        Body {
            transactions: self.transactions.clone(),
        }
    }

    pub fn calculate_tx_root(transactions: &[Transaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash());
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            parent_hash: [1; 32],
            number: 7,
            timestamp: 1_700_000_000,
            difficulty: 100,
            nonce: 0,
            coinbase: [2; 32],
            extra: b"extra".to_vec(),
            tx_root: [0; 32],
        }
    }

    #[test]
    fn test_seal_hash_ignores_nonce() {
        let a = header();
        let mut b = header();
        b.nonce = 42;
        assert_eq!(a.seal_hash(), b.seal_hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_block_new_commits_to_transactions() {
        let txs = vec![Transaction::new(b"a".to_vec()), Transaction::new(b"b".to_vec())];
        let block = Block::new(header(), txs.clone());
        assert_eq!(block.header.tx_root, Block::calculate_tx_root(&txs));

        let reordered = vec![txs[1].clone(), txs[0].clone()];
        assert_ne!(block.header.tx_root, Block::calculate_tx_root(&reordered));
    }

    #[test]
    fn test_with_seal_keeps_body() {
        let block = Block::new(header(), vec![Transaction::new(b"tx".to_vec())]);
        let mut sealed_header = block.header.clone();
        sealed_header.nonce = 99;
        let sealed = block.with_seal(sealed_header);
        assert_eq!(sealed.transactions, block.transactions);
        assert_eq!(sealed.header.seal_hash(), block.header.seal_hash());
        assert_ne!(sealed.hash(), block.hash());
    }
}
