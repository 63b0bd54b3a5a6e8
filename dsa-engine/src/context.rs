//! The account context threaded through every invocation of a cast.
//!
//! All modules invoked in one cast tree act on the same account identity, the same ledger and the
//! same relay register. The context is the single mutable handle to those; modules never own
//! state of their own.

use alloy_primitives::{Address, U256};
use dsa_common::{
    errors::{CastError, LedgerError, SpellError},
    ledger::{Checkpoint, Ledger},
    models::{ExecutionRecord, FrameRecord, Spell},
    relay::RelayRegister,
};
use tracing::debug;
use uuid::Uuid;

use crate::executor::CastExecutor;

/// Rollback boundary of one frame or one first-success candidate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameCheckpoint {
    ledger: Checkpoint,
    records: usize,
}

pub struct AccountContext<'a> {
    executor: &'a CastExecutor<'a>,
    ledger: &'a mut Ledger,
    relay: &'a mut RelayRegister,
    records: &'a mut Vec<ExecutionRecord>,
    account: Address,
    origin: Address,
    cast_id: Uuid,
    depth: usize,
}

impl<'a> AccountContext<'a> {
    pub(crate) fn new(
        executor: &'a CastExecutor<'a>,
        ledger: &'a mut Ledger,
        relay: &'a mut RelayRegister,
        records: &'a mut Vec<ExecutionRecord>,
        account: Address,
        origin: Address,
        cast_id: Uuid,
    ) -> Self {
        Self { executor, ledger, relay, records, account, origin, cast_id, depth: 0 }
    }

    /// Identity of the account the cast runs as.
    pub fn account(&self) -> Address {
        self.account
    }

    /// Identity the batch was submitted for. Attribution only, never used for authorization.
    pub fn origin(&self) -> Address {
        self.origin
    }

    pub fn cast_id(&self) -> Uuid {
        self.cast_id
    }

    /// Nesting depth of the current frame, `0` for the top-level frame.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn ledger(&self) -> &Ledger {
        &*self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut *self.ledger
    }

    pub fn relay(&mut self) -> &mut RelayRegister {
        &mut *self.relay
    }

    /// Balance of `asset` held by the account.
    pub fn balance(&self, asset: &Address) -> U256 {
        self.ledger
            .balance_of(&self.account, asset)
    }

    /// Moves `amount` of `asset` from the account to `to`.
    pub fn pay(&mut self, asset: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        self.ledger
            .transfer(asset, self.account, to, amount)
    }

    /// Moves `amount` of `asset` from `from` to the account.
    pub fn receive(
        &mut self,
        asset: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.ledger
            .transfer(asset, from, self.account, amount)
    }

    /// Pulls `amount` of `asset` from `from` into the account, limited by the allowance `from`
    /// granted to the account.
    pub fn pull(&mut self, asset: Address, from: Address, amount: U256) -> Result<(), LedgerError> {
        self.ledger
            .transfer_from(asset, from, self.account, amount)
    }

    /// Reads a value from the account's own storage.
    pub fn load(&self, key: &str) -> U256 {
        self.ledger.load(&self.account, key)
    }

    pub fn store(&mut self, key: impl Into<String>, value: U256) {
        self.ledger
            .store(self.account, key, value);
    }

    /// Drives `spells` as a nested frame at `depth + 1` through the same executor.
    ///
    /// The nested frame sees the relay slots of its ancestors; its own writes are dropped when
    /// it returns. On failure the nested frame has already undone its own effects, and the error
    /// must be propagated so the enclosing frame unwinds as well.
    pub fn cast_nested(&mut self, spells: &[Spell]) -> Result<FrameRecord, CastError> {
        let executor = self.executor;
        let depth = self.depth + 1;
        let max_depth = executor.config().max_depth;
        if depth > max_depth {
            return Err(CastError::frame(depth, SpellError::DepthExceeded(max_depth)));
        }
        debug!(cast_id = %self.cast_id, depth, spells = spells.len(), "Entering nested frame");

        self.relay.push_scope();
        let result = {
            let mut nested = AccountContext {
                executor,
                ledger: &mut *self.ledger,
                relay: &mut *self.relay,
                records: &mut *self.records,
                account: self.account,
                origin: self.origin,
                cast_id: self.cast_id,
                depth,
            };
            executor.run_frame(&mut nested, spells)
        };
        self.relay.pop_scope();
        result
    }

    pub(crate) fn checkpoint(&mut self) -> FrameCheckpoint {
        FrameCheckpoint { ledger: self.ledger.checkpoint(), records: self.records.len() }
    }

    pub(crate) fn commit(&mut self, checkpoint: FrameCheckpoint) {
        self.ledger.commit(checkpoint.ledger);
    }

    pub(crate) fn rollback(&mut self, checkpoint: FrameCheckpoint) {
        self.ledger
            .revert_to(checkpoint.ledger);
        self.records
            .truncate(checkpoint.records);
    }

    pub(crate) fn push_record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }
}
