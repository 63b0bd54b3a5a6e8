//! Spell codec.
//!
//! Encodes `(module, operation, arguments)` triples into invocable [`Payload`]s and decodes the
//! raw results modules return into advisory diagnostics plus functional return values.
//!
//! The codec has no visibility into modules: it derives the operation signature from the
//! argument types and leaves it to the executor to check the selector against the entry points
//! of the resolved module.

use std::fmt;

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};
use tracing::warn;

use crate::{
    errors::CodecError,
    models::{
        records::DiagnosticEvent,
        spell::{Argument, Spell},
        RelayId,
    },
};

/// First four bytes of the keccak-256 hash of an operation signature.
pub type Selector = FixedBytes<4>;

/// An encoded, invocable spell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub module: String,
    pub operation: String,
    /// Canonical signature, e.g. `deposit(address,uint256,uint256,uint256)`.
    pub signature: String,
    pub selector: Selector,
    pub arguments: Vec<Argument>,
}

impl Payload {
    pub fn reader(&self) -> ArgumentReader<'_> {
        ArgumentReader { arguments: &self.arguments }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} [0x{}]", self.module, self.signature, hex::encode(self.selector))
    }
}

/// Builds the canonical signature of `operation` called with `arguments`.
pub fn signature(operation: &str, arguments: &[Argument]) -> String {
    let types = arguments
        .iter()
        .map(Argument::abi_type)
        .collect::<Vec<_>>()
        .join(",");
    format!("{operation}({types})")
}

/// Derives the selector of a canonical signature.
pub fn selector(signature: &str) -> Selector {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    Selector::from_slice(&hash[..4])
}

pub fn encode(module: &str, operation: &str, arguments: &[Argument]) -> Payload {
    let signature = signature(operation, arguments);
    Payload {
        module: module.to_string(),
        operation: operation.to_string(),
        selector: selector(&signature),
        signature,
        arguments: arguments.to_vec(),
    }
}

pub fn encode_spell(spell: &Spell) -> Payload {
    encode(spell.module(), spell.operation(), spell.arguments())
}

/// What a module hands back from a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    /// Name of the advisory event, empty if the module emits none.
    pub event_name: String,
    /// Encoded event parameters, see [`encode_arguments`].
    pub event_params: Bytes,
    /// Functional return values.
    pub returned: Vec<Argument>,
}

impl RawResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn event(name: &str, params: &[Argument]) -> Result<Self, CodecError> {
        Ok(Self {
            event_name: name.to_string(),
            event_params: encode_arguments(params)?,
            returned: Vec::new(),
        })
    }

    pub fn with_returned(mut self, returned: Vec<Argument>) -> Self {
        self.returned = returned;
        self
    }
}

/// Decoded module result. The diagnostic part is advisory and never drives control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub diagnostic: Option<DiagnosticEvent>,
    pub returned: Vec<Argument>,
}

pub fn decode(raw: &RawResult) -> Outcome {
    let diagnostic = if raw.event_name.is_empty() {
        None
    } else {
        match decode_arguments(&raw.event_params) {
            Ok(params) => Some(DiagnosticEvent { name: raw.event_name.clone(), params }),
            Err(err) => {
                warn!(event = %raw.event_name, error = %err, "Dropping undecodable diagnostic event");
                None
            }
        }
    };
    Outcome { diagnostic, returned: raw.returned.clone() }
}

pub fn encode_arguments(arguments: &[Argument]) -> Result<Bytes, CodecError> {
    if arguments.is_empty() {
        return Ok(Bytes::new());
    }
    serde_json::to_vec(arguments)
        .map(Bytes::from)
        .map_err(|err| CodecError::Encode("arguments", err.to_string()))
}

pub fn decode_arguments(data: &[u8]) -> Result<Vec<Argument>, CodecError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(data).map_err(|err| CodecError::Decode("arguments", err.to_string()))
}

/// Encodes a spell list so it can travel as a `bytes` argument, e.g. into a flash borrow.
pub fn encode_batch(spells: &[Spell]) -> Result<Bytes, CodecError> {
    serde_json::to_vec(spells)
        .map(Bytes::from)
        .map_err(|err| CodecError::Encode("batch", err.to_string()))
}

pub fn decode_batch(data: &[u8]) -> Result<Vec<Spell>, CodecError> {
    serde_json::from_slice(data).map_err(|err| CodecError::Decode("batch", err.to_string()))
}

/// Positional, typed access to payload arguments.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentReader<'a> {
    arguments: &'a [Argument],
}

impl<'a> ArgumentReader<'a> {
    pub fn new(arguments: &'a [Argument]) -> Self {
        Self { arguments }
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn uint(&self, index: usize) -> Result<U256, CodecError> {
        self.arguments
            .get(index)
            .and_then(Argument::as_uint)
            .ok_or(CodecError::UnexpectedArgument { index, expected: "uint256" })
    }

    pub fn address(&self, index: usize) -> Result<Address, CodecError> {
        self.arguments
            .get(index)
            .and_then(Argument::as_address)
            .ok_or(CodecError::UnexpectedArgument { index, expected: "address" })
    }

    pub fn boolean(&self, index: usize) -> Result<bool, CodecError> {
        self.arguments
            .get(index)
            .and_then(Argument::as_bool)
            .ok_or(CodecError::UnexpectedArgument { index, expected: "bool" })
    }

    pub fn bytes(&self, index: usize) -> Result<&'a Bytes, CodecError> {
        self.arguments
            .get(index)
            .and_then(Argument::as_bytes)
            .ok_or(CodecError::UnexpectedArgument { index, expected: "bytes" })
    }

    pub fn string(&self, index: usize) -> Result<&'a str, CodecError> {
        self.arguments
            .get(index)
            .and_then(Argument::as_str)
            .ok_or(CodecError::UnexpectedArgument { index, expected: "string" })
    }

    /// Reads a `uint256` argument that must fit in 64 bits, e.g. a route id.
    pub fn small_uint(&self, index: usize) -> Result<u64, CodecError> {
        self.narrow(index, "uint64")
    }

    /// Reads a `uint256` argument as a relay id.
    pub fn relay_id(&self, index: usize) -> Result<RelayId, CodecError> {
        self.narrow(index, "relay id")
    }

    fn narrow(&self, index: usize, expected: &'static str) -> Result<u64, CodecError> {
        let value = self.uint(index)?;
        let limbs = value.as_limbs();
        if limbs[1..].iter().any(|limb| *limb != 0) {
            return Err(CodecError::OutOfRange { index, expected });
        }
        Ok(limbs[0])
    }

    /// Reads the trailing `(getId, setId)` pair every module operation ends with.
    pub fn relay_ids(&self) -> Result<(RelayId, RelayId), CodecError> {
        let len = self.arguments.len();
        if len < 2 {
            return Err(CodecError::UnexpectedArgument { index: len, expected: "uint256" });
        }
        Ok((self.relay_id(len - 2)?, self.relay_id(len - 1)?))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::transfer("transfer(address,uint256)", "a9059cbb")]
    #[case::approve("approve(address,uint256)", "095ea7b3")]
    #[case::balance_of("balanceOf(address)", "70a08231")]
    fn test_selector_matches_keccak(#[case] signature: &str, #[case] expected: &str) {
        assert_eq!(hex::encode(selector(signature)), expected);
    }

    #[test]
    fn test_encode_derives_signature_from_argument_types() {
        let payload = encode(
            "BASIC-A",
            "deposit",
            &[Argument::from(Address::ZERO), Argument::from(5u64), 0u64.into(), 1u64.into()],
        );

        assert_eq!(payload.signature, "deposit(address,uint256,uint256,uint256)");
        assert_eq!(payload.selector, selector("deposit(address,uint256,uint256,uint256)"));
    }

    #[test]
    fn test_decode_splits_diagnostic_from_returned_values() {
        let raw = RawResult::event("LogDeposit", &[Argument::from(5u64)])
            .unwrap()
            .with_returned(vec![Argument::from(true)]);

        let outcome = decode(&raw);

        assert_eq!(
            outcome.diagnostic,
            Some(DiagnosticEvent {
                name: "LogDeposit".to_string(),
                params: vec![Argument::from(5u64)]
            })
        );
        assert_eq!(outcome.returned, vec![Argument::from(true)]);
    }

    #[test]
    fn test_decode_drops_malformed_event_params() {
        let raw = RawResult {
            event_name: "LogBroken".to_string(),
            event_params: Bytes::from(vec![0xde, 0xad]),
            returned: vec![],
        };

        assert_eq!(decode(&raw), Outcome::default());
    }

    #[test]
    fn test_batch_survives_bytes_transport() {
        let batch = vec![
            Spell::new("BASIC-A", "withdraw", vec![Address::ZERO.into(), U256::MAX.into()]),
            Spell::new("VAULT-A", "deposit", vec![Bytes::from(vec![1, 2]).into(), "x".into()]),
        ];

        let encoded = encode_batch(&batch).unwrap();

        assert_eq!(decode_batch(&encoded).unwrap(), batch);
    }

    #[test]
    fn test_relay_ids_are_read_from_trailing_arguments() {
        let arguments = vec![Argument::from(Address::ZERO), 3u64.into(), 7u64.into()];
        let reader = ArgumentReader::new(&arguments);

        assert_eq!(reader.relay_ids().unwrap(), (3, 7));
        assert_eq!(
            reader.address(1),
            Err(CodecError::UnexpectedArgument { index: 1, expected: "address" })
        );
    }

    #[test]
    fn test_relay_id_out_of_range() {
        let arguments = vec![Argument::from(U256::MAX), 0u64.into()];
        let reader = ArgumentReader::new(&arguments);

        assert_eq!(
            reader.relay_ids(),
            Err(CodecError::OutOfRange { index: 0, expected: "relay id" })
        );
    }
}
