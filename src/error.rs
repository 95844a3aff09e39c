//! Error types for powchain

use crate::blockchain::Sha256Hash;
use thiserror::Error;

/// Short hex rendering used in error messages (first 8 bytes).
fn short(hash: &Sha256Hash) -> String {
    hex::encode(&hash[..8])
}

/// Header-level consensus rule violations reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("unknown ancestor")]
    UnknownAncestor,
    #[error("block in the future")]
    FutureBlock,
    #[error("timestamp equals parent's")]
    ZeroBlockTime,
    #[error("invalid block number")]
    InvalidNumber,
    #[error("invalid difficulty: have {have}, want {want}")]
    DifficultyMismatch { have: u64, want: u64 },
    #[error("extra-data too long: {len} > {max}")]
    ExtraDataTooLong { len: usize, max: usize },
    #[error("non-positive difficulty")]
    InvalidDifficulty,
    #[error("invalid proof-of-work")]
    InvalidPoW,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("non contiguous insert: {0}")]
    NonContiguousInsert(String),
    #[error("block already known")]
    KnownBlock,
    #[error("future block: {time} > {max}")]
    FutureBlockTooFar { time: u64, max: u64 },
    #[error("transaction root hash mismatch: have {}, want {}", hex::encode(.have), hex::encode(.want))]
    TxRootMismatch { have: Sha256Hash, want: Sha256Hash },
    #[error("genesis not found in chain")]
    NoGenesis,
    #[error("database already contains an incompatible genesis block (have {}, new {})", short(.stored), short(.new))]
    GenesisMismatch { stored: Sha256Hash, new: Sha256Hash },
    #[error("can't commit genesis block with number > 0")]
    GenesisNonZeroNumber,
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("header verification interrupted")]
    VerificationInterrupted,
    #[error("non existent block: {0}")]
    MissingBlock(String),
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Bincode error: {0}")]
    BincodeError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Mining error: {0}")]
    MiningError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::BincodeError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
