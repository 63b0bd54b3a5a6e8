//! Journaled account state.
//!
//! The ledger holds token balances per `(holder, asset)` and keyed storage per owner. Every
//! mutation appends the previous value to a journal, so any sequence of mutations can be undone
//! back to a [`Checkpoint`]. Execution frames take a checkpoint when they start and revert to it
//! when they fail; nested frames take their own checkpoints on top, so reverting an outer frame
//! also undoes everything its nested frames did.
//!
//! Mutations made while no checkpoint is open are permanent and not journaled. Once the outermost
//! open checkpoint is committed or reverted the journal is empty again.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use tracing::trace;

use crate::{errors::LedgerError, models::StorageKey};

/// Position in the journal a ledger can be reverted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

/// Observable contents of the ledger. Zero balances and zero storage values are not stored, so
/// two states compare equal whenever they are observably equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    balances: BTreeMap<(Address, Address), U256>,
    storage: BTreeMap<(Address, StorageKey), U256>,
}

impl LedgerState {
    /// Non-zero balances as `((holder, asset), amount)`.
    pub fn balances(&self) -> impl Iterator<Item = (&(Address, Address), &U256)> {
        self.balances.iter()
    }

    pub fn storage(&self) -> impl Iterator<Item = (&(Address, StorageKey), &U256)> {
        self.storage.iter()
    }
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Balance { holder: Address, asset: Address, previous: Option<U256> },
    Storage { owner: Address, key: StorageKey, previous: Option<U256> },
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    state: LedgerState,
    journal: Vec<JournalEntry>,
    open: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn balance_of(&self, holder: &Address, asset: &Address) -> U256 {
        self.state
            .balances
            .get(&(*holder, *asset))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_balance(&mut self, holder: Address, asset: Address, amount: U256) {
        let key = (holder, asset);
        let previous = if amount.is_zero() {
            self.state.balances.remove(&key)
        } else {
            self.state
                .balances
                .insert(key, amount)
        };
        self.record(JournalEntry::Balance { holder, asset, previous });
    }

    pub fn credit(
        &mut self,
        holder: Address,
        asset: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let balance = self
            .balance_of(&holder, &asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { holder, asset })?;
        self.set_balance(holder, asset, balance);
        Ok(())
    }

    pub fn debit(
        &mut self,
        holder: Address,
        asset: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let available = self.balance_of(&holder, &asset);
        let balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                holder,
                asset,
                required: amount,
                available,
            })?;
        self.set_balance(holder, asset, balance);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        trace!(%asset, %from, %to, %amount, "ledger transfer");
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    /// Amount of `asset` `spender` may still pull from `owner`.
    pub fn allowance(&self, owner: &Address, spender: &Address, asset: &Address) -> U256 {
        self.load(owner, &allowance_key(spender, asset))
    }

    /// Lets `spender` pull up to `amount` of `asset` from `owner`. `U256::MAX` is never consumed.
    pub fn approve(&mut self, owner: Address, spender: Address, asset: Address, amount: U256) {
        trace!(%owner, %spender, %asset, %amount, "ledger approve");
        self.store(owner, allowance_key(&spender, &asset), amount);
    }

    /// Moves `amount` of `asset` from `owner` to `spender` against the allowance `owner` granted.
    pub fn transfer_from(
        &mut self,
        asset: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(&owner, &spender, &asset);
        if allowance != U256::MAX {
            let remaining = allowance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientAllowance {
                    owner,
                    spender,
                    asset,
                    required: amount,
                    available: allowance,
                })?;
            self.store(owner, allowance_key(&spender, &asset), remaining);
        }
        self.transfer(asset, owner, spender, amount)
    }

    pub fn load(&self, owner: &Address, key: &str) -> U256 {
        self.state
            .storage
            .get(&(*owner, key.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn store(&mut self, owner: Address, key: impl Into<StorageKey>, value: U256) {
        let key = key.into();
        let slot = (owner, key.clone());
        let previous = if value.is_zero() {
            self.state.storage.remove(&slot)
        } else {
            self.state
                .storage
                .insert(slot, value)
        };
        self.record(JournalEntry::Storage { owner, key, previous });
    }

    /// Opens a checkpoint. Every checkpoint must be closed with [`Ledger::commit`] or
    /// [`Ledger::revert_to`], innermost first.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.open += 1;
        Checkpoint(self.journal.len())
    }

    /// Undoes every mutation made since `checkpoint`, newest first.
    pub fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.0 {
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::Balance { holder, asset, previous } => {
                    let key = (holder, asset);
                    match previous {
                        Some(amount) => self.state.balances.insert(key, amount),
                        None => self.state.balances.remove(&key),
                    };
                }
                JournalEntry::Storage { owner, key, previous } => {
                    let slot = (owner, key);
                    match previous {
                        Some(value) => self.state.storage.insert(slot, value),
                        None => self.state.storage.remove(&slot),
                    };
                }
            }
        }
        self.close();
    }

    /// Makes the mutations since `checkpoint` permanent. The journal is only discarded once the
    /// outermost checkpoint closes, inner commits keep it so an outer revert still works.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        trace!(position = checkpoint.0, open = self.open, "ledger commit");
        self.close();
    }

    fn close(&mut self) {
        self.open = self.open.saturating_sub(1);
        if self.open == 0 {
            self.journal.clear();
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        if self.open > 0 {
            self.journal.push(entry);
        }
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }
}

fn allowance_key(spender: &Address, asset: &Address) -> StorageKey {
    format!("allowance:{spender}:{asset}")
}
