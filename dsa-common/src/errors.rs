//! Error types shared by the engine, the registry and modules.

use std::fmt;

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::models::{spell::Spell, RelayId};

/// Failure of a single spell.
///
/// Every variant is fatal to the frame the spell runs in and, transitively, to every ancestor
/// frame. There is no local recovery: retries are up to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpellError {
    /// The module name does not resolve to an enabled registration.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// The encoded operation is not an entry point of the resolved module.
    #[error("Bad signature: {signature} is not exposed by {module}")]
    BadSignature { module: String, signature: String },

    /// A relay slot was read before any write in the current or an ancestor frame.
    #[error("Relay slot {0} read before write")]
    SlotEmpty(RelayId),

    /// Business failure reported by the module, e.g. insufficient balance or slippage.
    #[error("Module execution failed: {0}")]
    ModuleExecutionFailed(String),

    /// A flash borrow could not be repaid from the account's funds.
    #[error("Repayment shortfall: required {required}, available {available}")]
    RepaymentShortfall { required: U256, available: U256 },

    #[error("Unauthorized: {0}")]
    Unauthorized(Address),

    /// A nested frame spawned by this spell failed.
    #[error("Nested cast failed: {0}")]
    NestedCastFailed(Box<CastError>),

    #[error("Maximum cast depth {0} exceeded")]
    DepthExceeded(usize),

    #[error("Cannot cast an empty batch")]
    EmptyBatch,

    /// First-success casting found no candidate that succeeds.
    #[error("All {} candidates failed", .0.len())]
    AllCandidatesFailed(Vec<CastError>),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<LedgerError> for SpellError {
    fn from(error: LedgerError) -> Self {
        SpellError::ModuleExecutionFailed(error.to_string())
    }
}

/// The spell a frame failed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSpell {
    pub index: usize,
    pub module: String,
    pub operation: String,
}

/// Failure of an execution frame, attributed to the frame depth and the failing spell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastError {
    pub depth: usize,
    /// `None` when the frame failed before any spell ran, e.g. for an empty batch.
    pub spell: Option<FailedSpell>,
    pub error: SpellError,
}

impl CastError {
    /// A frame-level failure not attributable to a single spell.
    pub fn frame(depth: usize, error: SpellError) -> Self {
        Self { depth, spell: None, error }
    }

    pub fn spell(depth: usize, index: usize, spell: &Spell, error: SpellError) -> Self {
        Self {
            depth,
            spell: Some(FailedSpell {
                index,
                module: spell.module().to_string(),
                operation: spell.operation().to_string(),
            }),
            error,
        }
    }

    pub fn failing_index(&self) -> Option<usize> {
        self.spell
            .as_ref()
            .map(|spell| spell.index)
    }

    /// Human readable reason of the failure.
    pub fn reason(&self) -> String {
        self.error.to_string()
    }

    /// The innermost failure, following nested frames down to the spell that failed first.
    pub fn root_cause(&self) -> &CastError {
        match &self.error {
            SpellError::NestedCastFailed(inner) => inner.root_cause(),
            _ => self,
        }
    }
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.spell {
            Some(spell) => write!(
                f,
                "spell {} ({}.{}) at depth {} failed: {}",
                spell.index, spell.module, spell.operation, self.depth, self.error
            ),
            None => write!(f, "cast at depth {} failed: {}", self.depth, self.error),
        }
    }
}

impl std::error::Error for CastError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode {0}: {1}")]
    Encode(&'static str, String),

    #[error("Failed to decode {0}: {1}")]
    Decode(&'static str, String),

    #[error("Argument {index}: expected {expected}")]
    UnexpectedArgument { index: usize, expected: &'static str },

    #[error("Argument {index}: value out of range for {expected}")]
    OutOfRange { index: usize, expected: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance of {asset} for {holder}: required {required}, available {available}")]
    InsufficientBalance { holder: Address, asset: Address, required: U256, available: U256 },

    #[error("Balance overflow of {asset} for {holder}")]
    Overflow { holder: Address, asset: Address },

    #[error("Insufficient allowance of {asset} from {owner} to {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        asset: Address,
        required: U256,
        available: U256,
    },
}

/// Errors of the registry admin surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(Address),

    #[error("Invalid module name: {0:?}")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spell::Argument;

    #[test]
    fn test_root_cause_follows_nested_failures() {
        let inner_spell = Spell::new("VAULT-A", "withdraw", vec![Argument::from(1u64)]);
        let outer_spell = Spell::new("FLASH-A", "flashBorrowAndCast", vec![]);
        let inner = CastError::spell(
            1,
            2,
            &inner_spell,
            SpellError::ModuleExecutionFailed("insufficient supplied".to_string()),
        );
        let outer =
            CastError::spell(0, 0, &outer_spell, SpellError::NestedCastFailed(Box::new(inner.clone())));

        assert_eq!(outer.root_cause(), &inner);
        assert_eq!(outer.failing_index(), Some(0));
        assert_eq!(
            outer.to_string(),
            "spell 0 (FLASH-A.flashBorrowAndCast) at depth 0 failed: Nested cast failed: spell 2 \
             (VAULT-A.withdraw) at depth 1 failed: Module execution failed: insufficient supplied"
        );
    }

    #[test]
    fn test_frame_error_display() {
        let error = CastError::frame(1, SpellError::EmptyBatch);

        assert_eq!(error.failing_index(), None);
        assert_eq!(error.to_string(), "cast at depth 1 failed: Cannot cast an empty batch");
    }
}
