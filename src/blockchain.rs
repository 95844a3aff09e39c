// Thin re-export module: implementation is in `blockchain/core.rs` to allow
// progressive decomposition of chain responsibilities (types, validation,
// genesis, chain management, notifications).

pub mod core;
pub use self::core::*;
