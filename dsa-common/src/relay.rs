//! Transaction-scoped value relay register.
//!
//! Modules read a value written by an earlier spell through `getId` and publish their own result
//! through `setId`. The register lives for exactly one top-level cast. Nested frames push a scope
//! of their own: they can read every slot written by their ancestors, and their own writes are
//! dropped when they return.

use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::trace;

use crate::{
    errors::SpellError,
    models::{
        records::{AccessKind, RelayAccess},
        RelayId, UNUSED_RELAY_ID,
    },
};

#[derive(Debug, Clone, Default)]
struct Scope {
    slots: HashMap<RelayId, U256>,
    accesses: Vec<RelayAccess>,
}

/// Saved state of the innermost scope, see [`RelayRegister::snapshot`].
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    depth: usize,
    scope: Scope,
}

#[derive(Debug, Clone)]
pub struct RelayRegister {
    /// Innermost scope last. Never empty.
    scopes: Vec<Scope>,
}

impl Default for RelayRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayRegister {
    pub fn new() -> Self {
        Self { scopes: vec![Scope::default()] }
    }

    /// Stores `value` at `id` in the current scope. No-op for the sentinel id.
    pub fn write(&mut self, id: RelayId, value: U256) {
        if id == UNUSED_RELAY_ID {
            return;
        }
        trace!(id, %value, "relay write");
        let scope = self.current_mut();
        scope.slots.insert(id, value);
        scope
            .accesses
            .push(RelayAccess { id, kind: AccessKind::Write, value });
    }

    /// Reads slot `id`, searching the current scope first and then its ancestors.
    ///
    /// Returns zero for the sentinel id; callers are expected to fall back to their literal
    /// argument in that case, see [`RelayRegister::get_uint`].
    pub fn read(&mut self, id: RelayId) -> Result<U256, SpellError> {
        if id == UNUSED_RELAY_ID {
            return Ok(U256::ZERO);
        }
        let value = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.slots.get(&id).copied())
            .ok_or(SpellError::SlotEmpty(id))?;
        trace!(id, %value, "relay read");
        self.current_mut()
            .accesses
            .push(RelayAccess { id, kind: AccessKind::Read, value });
        Ok(value)
    }

    /// The relayed value of `get_id`, or `literal` if `get_id` is the sentinel.
    pub fn get_uint(&mut self, get_id: RelayId, literal: U256) -> Result<U256, SpellError> {
        if get_id == UNUSED_RELAY_ID {
            return Ok(literal);
        }
        self.read(get_id)
    }

    pub fn set_uint(&mut self, set_id: RelayId, value: U256) {
        self.write(set_id, value);
    }

    /// Number of scopes, `1` while running the top-level frame.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Drops the innermost scope with all of its writes. The root scope is never dropped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Captures the innermost scope so a failed attempt can be undone with
    /// [`RelayRegister::restore`].
    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot { depth: self.scopes.len(), scope: self.current().clone() }
    }

    pub fn restore(&mut self, snapshot: RelaySnapshot) {
        self.scopes
            .truncate(snapshot.depth.max(1));
        if let Some(scope) = self.scopes.last_mut() {
            *scope = snapshot.scope;
        }
    }

    /// Drains the accesses recorded in the current scope.
    pub fn take_accesses(&mut self) -> Vec<RelayAccess> {
        std::mem::take(&mut self.current_mut().accesses)
    }

    fn current(&self) -> &Scope {
        // `scopes` always holds the root scope.
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_sentinel_is_passthrough() {
        let mut relay = RelayRegister::new();

        relay.write(UNUSED_RELAY_ID, U256::from(42));

        assert_eq!(relay.read(UNUSED_RELAY_ID), Ok(U256::ZERO));
        assert_eq!(relay.get_uint(UNUSED_RELAY_ID, U256::from(9)), Ok(U256::from(9)));
        assert!(relay.take_accesses().is_empty());
    }

    #[test]
    fn test_read_before_write_fails() {
        let mut relay = RelayRegister::new();

        assert_eq!(relay.read(3), Err(SpellError::SlotEmpty(3)));
    }

    #[test]
    fn test_write_overwrites_and_records_accesses() {
        let mut relay = RelayRegister::new();

        relay.write(1, U256::from(10));
        relay.write(1, U256::from(11));
        let value = relay.read(1).unwrap();

        assert_eq!(value, U256::from(11));
        assert_eq!(
            relay.take_accesses(),
            vec![
                RelayAccess { id: 1, kind: AccessKind::Write, value: U256::from(10) },
                RelayAccess { id: 1, kind: AccessKind::Write, value: U256::from(11) },
                RelayAccess { id: 1, kind: AccessKind::Read, value: U256::from(11) },
            ]
        );
        assert!(relay.take_accesses().is_empty());
    }

    #[test]
    fn test_nested_scope_reads_ancestors_and_discards_own_writes() {
        let mut relay = RelayRegister::new();
        relay.write(1, U256::from(100));

        relay.push_scope();
        assert_eq!(relay.read(1), Ok(U256::from(100)));
        relay.write(1, U256::from(5));
        relay.write(2, U256::from(6));
        assert_eq!(relay.read(1), Ok(U256::from(5)));
        relay.pop_scope();

        assert_eq!(relay.read(1), Ok(U256::from(100)));
        assert_eq!(relay.read(2), Err(SpellError::SlotEmpty(2)));
    }

    #[test]
    fn test_restore_discards_writes_since_snapshot() {
        let mut relay = RelayRegister::new();
        relay.write(1, U256::from(1));
        let snapshot = relay.snapshot();

        relay.write(1, U256::from(2));
        relay.write(4, U256::from(3));
        relay.push_scope();
        relay.restore(snapshot);

        assert_eq!(relay.depth(), 1);
        assert_eq!(relay.read(1), Ok(U256::from(1)));
        assert_eq!(relay.read(4), Err(SpellError::SlotEmpty(4)));
    }

    #[test]
    fn test_root_scope_is_never_popped() {
        let mut relay = RelayRegister::new();
        relay.write(8, U256::from(1));

        relay.pop_scope();

        assert_eq!(relay.depth(), 1);
        assert_eq!(relay.read(8), Ok(U256::from(1)));
    }
}
