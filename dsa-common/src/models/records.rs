//! Observability records produced while casting.
//!
//! None of these records is ever read back by the engine; they exist so callers and indexers can
//! reconstruct what a cast did.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::{
    codec::Selector,
    models::{spell::Argument, RelayId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// A non-sentinel access to the relay register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAccess {
    pub id: RelayId,
    pub kind: AccessKind,
    pub value: U256,
}

/// Advisory event a module emits from a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub name: String,
    pub params: Vec<Argument>,
}

/// Record of one successfully invoked spell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellRecord {
    /// Nesting depth of the frame the spell ran in, `0` for the top-level frame.
    pub depth: usize,
    /// Position of the spell in its frame.
    pub index: usize,
    pub module: String,
    pub operation: String,
    pub selector: Selector,
    /// Relay slots touched by this spell, in access order.
    pub relay: Vec<RelayAccess>,
    pub diagnostic: Option<DiagnosticEvent>,
}

impl SpellRecord {
    pub fn relay_ids(&self) -> Vec<RelayId> {
        self.relay
            .iter()
            .map(|access| access.id)
            .collect()
    }
}

/// Aggregate record of one execution frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub cast_id: Uuid,
    pub depth: usize,
    pub origin: Address,
    pub spell_count: usize,
    pub success: bool,
    pub failing_index: Option<usize>,
    /// Names of the modules invoked by this frame, in order.
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionRecord {
    Spell(SpellRecord),
    Frame(FrameRecord),
}

/// Result of a committed top-level cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReceipt {
    pub cast_id: Uuid,
    pub account: Address,
    pub origin: Address,
    /// Records of every frame in the cast tree. Nested frames appear before the spell that
    /// spawned them.
    pub records: Vec<ExecutionRecord>,
}

impl CastReceipt {
    pub fn spells(&self) -> impl Iterator<Item = &SpellRecord> {
        self.records
            .iter()
            .filter_map(|record| match record {
                ExecutionRecord::Spell(spell) => Some(spell),
                ExecutionRecord::Frame(_) => None,
            })
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameRecord> {
        self.records
            .iter()
            .filter_map(|record| match record {
                ExecutionRecord::Frame(frame) => Some(frame),
                ExecutionRecord::Spell(_) => None,
            })
    }

    /// The top-level frame record. Every committed cast has exactly one.
    pub fn root_frame(&self) -> Option<&FrameRecord> {
        self.frames()
            .find(|frame| frame.depth == 0)
    }

    /// Module names invoked by the top-level frame, in order.
    pub fn modules(&self) -> Vec<String> {
        self.root_frame()
            .map(|frame| frame.modules.clone())
            .unwrap_or_default()
    }
}
