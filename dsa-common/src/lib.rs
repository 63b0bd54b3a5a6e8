//! Shared building blocks of the DSA spell engine.
//!
//! This crate contains everything that does not depend on how modules are resolved or executed:
//!
//! - **models**: identities, spells, arguments, registry records and execution records
//! - **codec**: spell payload encoding, selector derivation and result decoding
//! - **relay**: the transaction-scoped `getId`/`setId` value register
//! - **ledger**: journaled balances and keyed storage with checkpoint/revert support
//! - **errors**: the error taxonomy shared by the engine and its modules

pub mod codec;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod relay;

pub use alloy_primitives::{Address, Bytes, U256};
