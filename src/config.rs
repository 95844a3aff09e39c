//! Configuration management for powchain

use crate::cache::{BAD_BLOCK_LIMIT, BLOCK_CACHE_LIMIT, BODY_CACHE_LIMIT, HEADER_CACHE_LIMIT, MAX_FUTURE_BLOCKS};
use crate::crypto::{address_from_hex, Address, ZERO_ADDRESS};
use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub genesis: GenesisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Keep everything in memory; `path` is ignored.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_header_cache_limit")]
    pub header_cache_limit: usize,
    #[serde(default = "default_body_cache_limit")]
    pub body_cache_limit: usize,
    #[serde(default = "default_block_cache_limit")]
    pub block_cache_limit: usize,
    #[serde(default = "default_max_future_blocks")]
    pub max_future_blocks: usize,
    #[serde(default = "default_bad_block_limit")]
    pub bad_block_limit: usize,
    /// Seconds ahead of local time a block may be and still be deferred.
    #[serde(default = "default_max_time_future_blocks")]
    pub max_time_future_blocks: u64,
    #[serde(default = "default_future_block_interval_ms")]
    pub future_block_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            header_cache_limit: default_header_cache_limit(),
            body_cache_limit: default_body_cache_limit(),
            block_cache_limit: default_block_cache_limit(),
            max_future_blocks: default_max_future_blocks(),
            bad_block_limit: default_bad_block_limit(),
            max_time_future_blocks: default_max_time_future_blocks(),
            future_block_interval_ms: default_future_block_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsensusConfig {
    /// When set, every block must carry exactly this difficulty.
    #[serde(default)]
    pub fixed_difficulty: Option<u64>,
    #[serde(default = "default_target_block_time")]
    pub target_block_time: u64,
    #[serde(default = "default_bound_divisor")]
    pub bound_divisor: u64,
    #[serde(default = "default_min_difficulty")]
    pub min_difficulty: u64,
    #[serde(default = "default_allowed_future_block_time")]
    pub allowed_future_block_time: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            fixed_difficulty: None,
            target_block_time: default_target_block_time(),
            bound_divisor: default_bound_divisor(),
            min_difficulty: default_min_difficulty(),
            allowed_future_block_time: default_allowed_future_block_time(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MinerConfig {
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
    /// Zero uses every processor, negative disables the nonce search.
    #[serde(default)]
    pub threads: i32,
    /// Hex-encoded coinbase address.
    #[serde(default)]
    pub coinbase: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default = "default_recommit_interval_ms")]
    pub recommit_interval_ms: u64,
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: default_mining_enabled(),
            threads: 0,
            coinbase: String::new(),
            extra: String::new(),
            recommit_interval_ms: default_recommit_interval_ms(),
            confirmation_depth: default_confirmation_depth(),
        }
    }
}

impl MinerConfig {
    pub fn coinbase_address(&self) -> Result<Address> {
        if self.coinbase.is_empty() {
            return Ok(ZERO_ADDRESS);
        }
        address_from_hex(&self.coinbase)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GenesisConfig {
    /// JSON genesis description; the built-in genesis is used when unset.
    #[serde(default)]
    pub file: Option<String>,
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let config: Config = match fs::read_to_string(path.as_ref()) {
        Ok(raw) => toml::from_str(&raw)?,
        Err(e) if e.kind() == ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };
    validate(&config)?;
    Ok(config)
}

/// Validate critical values
pub fn validate(config: &Config) -> Result<()> {
    if !config.database.in_memory && config.database.path.is_empty() {
        return Err(ChainError::ConfigError("database.path must be set".to_string()));
    }
    if config.chain.future_block_interval_ms == 0 {
        return Err(ChainError::ConfigError(
            "chain.future_block_interval_ms must be positive".to_string(),
        ));
    }
    if config.consensus.fixed_difficulty == Some(0) {
        return Err(ChainError::ConfigError(
            "consensus.fixed_difficulty must be positive".to_string(),
        ));
    }
    if config.miner.extra.len() > crate::blockchain::MAXIMUM_EXTRA_DATA_SIZE {
        return Err(ChainError::ConfigError(format!(
            "miner.extra exceeds {} bytes",
            crate::blockchain::MAXIMUM_EXTRA_DATA_SIZE
        )));
    }
    let coinbase = config.miner.coinbase_address()?;
    if config.miner.enabled && coinbase == ZERO_ADDRESS {
        return Err(ChainError::ConfigError(
            "miner.coinbase must be set when mining is enabled".to_string(),
        ));
    }
    Ok(())
}

fn default_db_path() -> String {
    "./data/chain.db".to_string()
}

fn default_header_cache_limit() -> usize {
    HEADER_CACHE_LIMIT
}

fn default_body_cache_limit() -> usize {
    BODY_CACHE_LIMIT
}

fn default_block_cache_limit() -> usize {
    BLOCK_CACHE_LIMIT
}

fn default_max_future_blocks() -> usize {
    MAX_FUTURE_BLOCKS
}

fn default_bad_block_limit() -> usize {
    BAD_BLOCK_LIMIT
}

fn default_max_time_future_blocks() -> u64 {
    crate::blockchain::MAX_TIME_FUTURE_BLOCKS
}

fn default_future_block_interval_ms() -> u64 {
    5_000
}

fn default_target_block_time() -> u64 {
    crate::consensus::difficulty::TARGET_BLOCK_TIME
}

fn default_bound_divisor() -> u64 {
    crate::consensus::difficulty::DIFFICULTY_BOUND_DIVISOR
}

fn default_min_difficulty() -> u64 {
    crate::consensus::difficulty::MINIMUM_DIFFICULTY
}

fn default_allowed_future_block_time() -> u64 {
    crate::consensus::pow::ALLOWED_FUTURE_BLOCK_TIME
}

fn default_mining_enabled() -> bool {
    false
}

fn default_recommit_interval_ms() -> u64 {
    3_000
}

fn default_confirmation_depth() -> u64 {
    5
}
