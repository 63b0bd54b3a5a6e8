use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Registry record of a named module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRegistration {
    /// Unique key the module is resolved by.
    pub name: String,
    /// Identity of the deployed executable currently behind the name.
    pub address: Address,
    /// Deregistered modules stay in the registry but no longer resolve.
    pub enabled: bool,
    /// Starts at 1 and increments on every update or re-registration.
    pub version: u32,
}

impl ModuleRegistration {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self { name: name.into(), address, enabled: true, version: 1 }
    }
}

/// Audit event emitted by every registry mutation, for off-chain indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered { name: String, address: Address, version: u32 },
    Updated { name: String, old: Address, new: Address, version: u32 },
    Deregistered { name: String, address: Address },
    AuthorityToggled { identity: Address, enabled: bool },
    MasterTransferred { old: Address, new: Address },
}
