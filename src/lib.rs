//! powchain - chain-state engine for a proof-of-work node
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Canonical chain store, genesis, validation, head events
//! - [`transaction`] - Opaque transaction payloads
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus & Mining
//! - [`consensus`] - Engine trait, proof-of-work, difficulty policies
//! - [`miner`] - Block assembly, sealing and commit pipeline
//!
//! ## Storage
//! - [`persistence`] - Key/value store (SQLite, in-memory) and typed accessors
//! - [`cache`] - Bounded LRU caches
//!
//! ## Node & Utilities
//! - [`node`] - Component wiring
//! - [`config`] - Configuration management
//! - [`crypto`] - Hashing and addresses
//! - [`signal`] - One-shot cancellation
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Storage
// ============================================================================
pub mod cache;
pub mod persistence;

// ============================================================================
// Node & Utilities
// ============================================================================
pub mod config;
pub mod crypto;
pub mod error;
pub mod node;
pub mod signal;
