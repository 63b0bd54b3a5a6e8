//! Spells and their encoded arguments.

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// One encoded argument of a spell.
///
/// Arguments know their ABI type name, which is used to derive the operation signature and
/// selector a spell targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Argument {
    Uint(U256),
    Address(Address),
    Bool(bool),
    Bytes(Bytes),
    String(String),
}

impl Argument {
    /// ABI type name of the argument, e.g. `uint256`.
    pub fn abi_type(&self) -> &'static str {
        match self {
            Argument::Uint(_) => "uint256",
            Argument::Address(_) => "address",
            Argument::Bool(_) => "bool",
            Argument::Bytes(_) => "bytes",
            Argument::String(_) => "string",
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Argument::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Argument::Address(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Argument::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Argument::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Uint(value) => write!(f, "{value}"),
            Argument::Address(value) => write!(f, "{value}"),
            Argument::Bool(value) => write!(f, "{value}"),
            Argument::Bytes(value) => write!(f, "{value}"),
            Argument::String(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<U256> for Argument {
    fn from(value: U256) -> Self {
        Argument::Uint(value)
    }
}

impl From<u64> for Argument {
    fn from(value: u64) -> Self {
        Argument::Uint(U256::from(value))
    }
}

impl From<Address> for Argument {
    fn from(value: Address) -> Self {
        Argument::Address(value)
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Argument::Bool(value)
    }
}

impl From<Bytes> for Argument {
    fn from(value: Bytes) -> Self {
        Argument::Bytes(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::String(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::String(value)
    }
}

/// A single instruction of a batch: call `operation` on the module registered as `module`.
///
/// Spells are immutable once constructed. A batch is an ordered list of spells; the list order
/// is the execution order and duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    module: String,
    operation: String,
    #[serde(default)]
    arguments: Vec<Argument>,
}

impl Spell {
    pub fn new(
        module: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Self { module: module.into(), operation: operation.into(), arguments }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }
}

impl fmt::Display for Spell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.module, self.operation)?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{argument}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spell_display() {
        let spell = Spell::new(
            "BASIC-A",
            "withdraw",
            vec![Argument::from(Address::ZERO), Argument::from(10u64), Argument::from("memo")],
        );

        assert_eq!(
            spell.to_string(),
            "BASIC-A.withdraw(0x0000000000000000000000000000000000000000, 10, \"memo\")"
        );
    }

    #[test]
    fn test_argument_accessors_reject_other_kinds() {
        let argument = Argument::from(7u64);

        assert_eq!(argument.as_uint(), Some(U256::from(7)));
        assert_eq!(argument.as_address(), None);
        assert_eq!(argument.as_bool(), None);
        assert_eq!(argument.abi_type(), "uint256");
    }
}
