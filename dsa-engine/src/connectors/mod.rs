//! Reference connectors shipped with the engine.

pub mod basic;
pub mod flash;
pub mod vault;

pub use basic::BasicConnector;
pub use flash::{FlashBorrowConnector, PooledLiquidity};
pub use vault::VaultConnector;
