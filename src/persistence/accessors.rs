//! Typed reads and writes over a [`Store`], and the key schema they use.
//!
//! | key                         | value                 |
//! |-----------------------------|-----------------------|
//! | `h` + num (BE) + hash       | header                |
//! | `h` + num (BE) + `n`        | canonical hash at num |
//! | `H` + hash                  | block number          |
//! | `b` + num (BE) + hash       | body                  |
//! | `LastBlock` / `LastHeader`  | head hashes           |

use super::Store;
use crate::blockchain::{Block, BlockHeader, Body, Sha256Hash};
use crate::error::{ChainError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const HEADER_PREFIX: &[u8] = b"h";
const CANONICAL_SUFFIX: &[u8] = b"n";
const NUMBER_PREFIX: &[u8] = b"H";
const BODY_PREFIX: &[u8] = b"b";
pub const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
pub const HEAD_HEADER_KEY: &[u8] = b"LastHeader";

pub fn header_key(number: u64, hash: &Sha256Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 32);
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key.extend_from_slice(hash);
    key
}

pub fn canonical_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 1);
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key.extend_from_slice(CANONICAL_SUFFIX);
    key
}

pub fn number_key(hash: &Sha256Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.extend_from_slice(NUMBER_PREFIX);
    key.extend_from_slice(hash);
    key
}

pub fn body_key(number: u64, hash: &Sha256Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 32);
    key.extend_from_slice(BODY_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key.extend_from_slice(hash);
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn to_hash(bytes: Vec<u8>) -> Result<Sha256Hash> {
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ChainError::DatabaseError(format!("corrupt hash entry of {} bytes", b.len())))
}

fn read_hash(db: &dyn Store, key: &[u8]) -> Result<Option<Sha256Hash>> {
    db.get(key)?.map(to_hash).transpose()
}

pub fn read_canonical_hash(db: &dyn Store, number: u64) -> Result<Option<Sha256Hash>> {
    read_hash(db, &canonical_key(number))
}

pub fn write_canonical_hash(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<()> {
    db.put(&canonical_key(number), hash)
}

pub fn delete_canonical_hash(db: &dyn Store, number: u64) -> Result<()> {
    db.delete(&canonical_key(number))
}

pub fn read_header_number(db: &dyn Store, hash: &Sha256Hash) -> Result<Option<u64>> {
    match db.get(&number_key(hash))? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                ChainError::DatabaseError(format!("corrupt number entry of {} bytes", bytes.len()))
            })?;
            Ok(Some(u64::from_be_bytes(raw)))
        }
        None => Ok(None),
    }
}

pub fn read_head_block_hash(db: &dyn Store) -> Result<Option<Sha256Hash>> {
    read_hash(db, HEAD_BLOCK_KEY)
}

pub fn write_head_block_hash(db: &dyn Store, hash: &Sha256Hash) -> Result<()> {
    db.put(HEAD_BLOCK_KEY, hash)
}

pub fn read_head_header_hash(db: &dyn Store) -> Result<Option<Sha256Hash>> {
    read_hash(db, HEAD_HEADER_KEY)
}

pub fn write_head_header_hash(db: &dyn Store, hash: &Sha256Hash) -> Result<()> {
    db.put(HEAD_HEADER_KEY, hash)
}

pub fn read_header(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<Option<BlockHeader>> {
    db.get(&header_key(number, hash))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

/// Store a header together with its hash-to-number index entry.
pub fn write_header(db: &dyn Store, header: &BlockHeader) -> Result<()> {
    let hash = header.hash();
    db.put(&number_key(&hash), &header.number.to_be_bytes())?;
    db.put(&header_key(header.number, &hash), &encode(header)?)
}

pub fn delete_header(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<()> {
    db.delete(&header_key(number, hash))?;
    db.delete(&number_key(hash))
}

pub fn has_body(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<bool> {
    db.has(&body_key(number, hash))
}

pub fn read_body(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<Option<Body>> {
    db.get(&body_key(number, hash))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

pub fn write_body(db: &dyn Store, hash: &Sha256Hash, number: u64, body: &Body) -> Result<()> {
    db.put(&body_key(number, hash), &encode(body)?)
}

pub fn delete_body(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<()> {
    db.delete(&body_key(number, hash))
}

/// Reassemble a block; `None` unless both header and body are present.
pub fn read_block(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<Option<Block>> {
    let header = match read_header(db, hash, number)? {
        Some(header) => header,
        None => return Ok(None),
    };
    let body = match read_body(db, hash, number)? {
        Some(body) => body,
        None => return Ok(None),
    };
    Ok(Some(Block::from_parts(header, body)))
}

pub fn write_block(db: &dyn Store, block: &Block) -> Result<()> {
    write_body(db, &block.hash(), block.number(), &block.body())?;
    write_header(db, &block.header)
}

pub fn delete_block(db: &dyn Store, hash: &Sha256Hash, number: u64) -> Result<()> {
    delete_body(db, hash, number)?;
    delete_header(db, hash, number)
}
