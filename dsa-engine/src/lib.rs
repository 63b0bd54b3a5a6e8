//! Spell execution engine.
//!
//! Resolves spells through the [`registry::ModuleRegistry`], drives them as one atomic unit with
//! the [`executor::CastExecutor`] and ships the reference connectors, the flash-borrow bridge
//! included.

pub mod account;
pub mod config;
pub mod connectors;
pub mod context;
pub mod executor;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod traits;

pub use account::{Account, AccountError};
pub use config::ExecutorConfig;
pub use context::AccountContext;
pub use executor::CastExecutor;
pub use registry::{ModuleHandle, ModuleRegistry};
pub use traits::{Connector, LiquiditySource};
