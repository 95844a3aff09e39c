use super::types::{Block, BlockHeader, Sha256Hash};
use crate::consensus::difficulty::GENESIS_DIFFICULTY;
use crate::crypto::{short_hash, Address, ZERO_ADDRESS};
use crate::error::{ChainError, Result};
use crate::persistence::accessors;
use crate::persistence::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Timestamp of the built-in genesis block (2023-01-01T00:00:00Z).
pub const DEFAULT_GENESIS_TIMESTAMP: u64 = 1_672_531_200;
const DEFAULT_GENESIS_EXTRA: &str = "f7f480febb057fb7176fabad3fc28b602052a4e76043a5d7cffe066a62daa84b";
const DEFAULT_GENESIS_NONCE: u64 = 2505;

/// Parameters of block zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, with = "hex_bytes")]
    pub extra_data: Vec<u8>,
    /// Falls back to [`GENESIS_DIFFICULTY`] when absent.
    #[serde(default)]
    pub difficulty: Option<u64>,
    #[serde(default = "zero_address", with = "hex_array")]
    pub coinbase: Address,
    #[serde(default)]
    pub number: u64,
    #[serde(default = "zero_address", with = "hex_array")]
    pub parent_hash: Sha256Hash,
}

fn zero_address() -> Address {
    ZERO_ADDRESS
}

impl Genesis {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_block(&self) -> Block {
        let header = BlockHeader {
            parent_hash: self.parent_hash,
            number: self.number,
            timestamp: self.timestamp,
            difficulty: self.difficulty.unwrap_or(GENESIS_DIFFICULTY),
            nonce: self.nonce,
            coinbase: self.coinbase,
            extra: self.extra_data.clone(),
            tx_root: [0; 32],
        };
        Block::new(header, Vec::new())
    }

    /// Write the genesis block and point every head marker at it.
    pub fn commit(&self, db: &dyn Store) -> Result<Block> {
        if self.number != 0 {
            return Err(ChainError::GenesisNonZeroNumber);
        }
        let block = self.to_block();
        let hash = block.hash();
        accessors::write_block(db, &block)?;
        accessors::write_canonical_hash(db, &hash, 0)?;
        accessors::write_head_block_hash(db, &hash)?;
        accessors::write_head_header_hash(db, &hash)?;
        Ok(block)
    }
}

pub fn default_genesis() -> Genesis {
    Genesis {
        nonce: DEFAULT_GENESIS_NONCE,
        timestamp: DEFAULT_GENESIS_TIMESTAMP,
        // The constant is valid hex; an empty fallback is never taken.
        extra_data: hex::decode(DEFAULT_GENESIS_EXTRA).unwrap_or_default(),
        difficulty: Some(GENESIS_DIFFICULTY),
        coinbase: ZERO_ADDRESS,
        number: 0,
        parent_hash: [0; 32],
    }
}

/// Ensure the store holds a genesis block and return its hash.
///
/// An empty store gets `genesis` (or the default one) committed. A populated
/// store is only accepted if its genesis hash equals the supplied one.
pub fn setup_genesis_block(db: &dyn Store, genesis: Option<&Genesis>) -> Result<Sha256Hash> {
    let stored = accessors::read_canonical_hash(db, 0)?;
    match (stored, genesis) {
        (None, genesis) => {
            let genesis = match genesis {
                Some(genesis) => {
                    info!("Writing custom genesis block");
                    genesis.clone()
                }
                None => {
                    info!("Writing default genesis block");
                    default_genesis()
                }
            };
            let block = genesis.commit(db)?;
            info!(hash = %short_hash(&block.hash()), "Committed genesis block");
            Ok(block.hash())
        }
        (Some(stored), Some(genesis)) => {
            let new = genesis.to_block().hash();
            if new != stored {
                return Err(ChainError::GenesisMismatch { stored, new });
            }
            Ok(stored)
        }
        (Some(stored), None) => Ok(stored),
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.strip_prefix("0x").unwrap_or(&raw)).map_err(serde::de::Error::custom)
    }
}

mod hex_array {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        super::hex_bytes::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let bytes = super::hex_bytes::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| serde::de::Error::custom(format!("expected 32 bytes, got {}", b.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[test]
    fn test_default_genesis_is_stable() {
        let a = default_genesis().to_block();
        let b = default_genesis().to_block();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.header.difficulty, GENESIS_DIFFICULTY);
        assert_eq!(a.header.extra.len(), 32);
    }

    #[test]
    fn test_setup_writes_then_accepts_same_genesis() {
        let db = MemoryStore::new();
        let genesis = default_genesis();
        let hash = setup_genesis_block(&db, Some(&genesis)).unwrap();
        assert_eq!(accessors::read_canonical_hash(&db, 0).unwrap(), Some(hash));
        assert_eq!(accessors::read_head_block_hash(&db).unwrap(), Some(hash));

        assert_eq!(setup_genesis_block(&db, Some(&genesis)).unwrap(), hash);
        assert_eq!(setup_genesis_block(&db, None).unwrap(), hash);
    }

    #[test]
    fn test_setup_detects_mismatch() {
        let db = MemoryStore::new();
        let stored = setup_genesis_block(&db, None).unwrap();

        let other = Genesis {
            nonce: 1,
            ..default_genesis()
        };
        let err = setup_genesis_block(&db, Some(&other)).unwrap_err();
        assert_eq!(
            err,
            ChainError::GenesisMismatch {
                stored,
                new: other.to_block().hash(),
            }
        );
    }

    #[test]
    fn test_commit_rejects_nonzero_number() {
        let db = MemoryStore::new();
        let genesis = Genesis {
            number: 1,
            ..default_genesis()
        };
        assert_eq!(genesis.commit(&db), Err(ChainError::GenesisNonZeroNumber));
        assert!(db.is_empty());
    }

    #[test]
    fn test_json_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(
            &path,
            r#"{ "nonce": 7, "timestamp": 1700000000, "extraData": "0x0102" }"#,
        )
        .unwrap();

        let genesis = Genesis::from_json_file(&path).unwrap();
        assert_eq!(genesis.nonce, 7);
        assert_eq!(genesis.extra_data, vec![1, 2]);
        assert_eq!(genesis.difficulty, None);
        assert_eq!(genesis.to_block().header.difficulty, GENESIS_DIFFICULTY);
        assert_eq!(genesis.coinbase, ZERO_ADDRESS);
    }
}
