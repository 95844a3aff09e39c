// core.rs splits chain responsibilities into submodules: data types, chain
// management, body validation, genesis bootstrap and head notifications.
pub mod chain;
pub mod events;
pub mod genesis;
pub mod types;
pub mod validation;

pub use chain::*;
pub use events::*;
pub use genesis::*;
pub use types::*;
pub use validation::*;
