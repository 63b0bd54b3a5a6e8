pub mod records;
pub mod registry;
pub mod spell;

use alloy_primitives::{address, Address};

pub use records::{
    AccessKind, CastReceipt, DiagnosticEvent, ExecutionRecord, FrameRecord, RelayAccess,
    SpellRecord,
};
pub use registry::{ModuleRegistration, RegistryEvent};
pub use spell::{Argument, Spell};

/// Identity of an account, module, lender or asset.
pub type Identity = Address;

/// Key of a relay slot. `0` is reserved and means "not used".
pub type RelayId = u64;

/// Key literal type of the per-owner storage.
pub type StorageKey = String;

/// Relay id sentinel: a spell passing it neither reads nor writes the relay register.
pub const UNUSED_RELAY_ID: RelayId = 0;

/// Pseudo address used for the chain's native currency.
pub const NATIVE_ASSET: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");
