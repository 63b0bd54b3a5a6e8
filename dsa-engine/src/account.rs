//! The smart-contract account ("DSA") casts are issued by.

use std::collections::BTreeSet;

use alloy_primitives::Address;
use dsa_common::{
    errors::{CastError, SpellError},
    ledger::Ledger,
    models::{CastReceipt, Spell},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::executor::CastExecutor;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Unauthorized: {0} is not an owner")]
    Unauthorized(Address),
    #[error("Cannot remove the last owner {0}")]
    LastOwner(Address),
    #[error("{0} is not an owner")]
    NotOwner(Address),
}

/// An account identity together with the set of identities allowed to cast on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    address: Address,
    owners: BTreeSet<Address>,
}

impl Account {
    pub fn new(address: Address, owner: Address) -> Self {
        Self { address, owners: BTreeSet::from([owner]) }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owners(&self) -> impl Iterator<Item = &Address> {
        self.owners.iter()
    }

    pub fn is_owner(&self, identity: &Address) -> bool {
        self.owners.contains(identity)
    }

    /// Adds `owner`. Returns `false` if it already was one.
    pub fn add_owner(&mut self, caller: &Address, owner: Address) -> Result<bool, AccountError> {
        self.ensure_owner(caller)?;
        let added = self.owners.insert(owner);
        if added {
            info!(account = %self.address, %owner, "Owner added");
        }
        Ok(added)
    }

    pub fn remove_owner(&mut self, caller: &Address, owner: &Address) -> Result<(), AccountError> {
        self.ensure_owner(caller)?;
        if !self.owners.contains(owner) {
            return Err(AccountError::NotOwner(*owner));
        }
        if self.owners.len() == 1 {
            return Err(AccountError::LastOwner(*owner));
        }
        self.owners.remove(owner);
        info!(account = %self.address, %owner, "Owner removed");
        Ok(())
    }

    /// Casts `spells` as this account on behalf of `sender`, who must be an owner.
    pub fn cast(
        &self,
        executor: &CastExecutor<'_>,
        ledger: &mut Ledger,
        sender: &Address,
        spells: &[Spell],
        origin: Address,
    ) -> Result<CastReceipt, CastError> {
        self.authorize(sender)?;
        executor.cast(ledger, self.address, spells, origin)
    }

    pub fn cast_first_success(
        &self,
        executor: &CastExecutor<'_>,
        ledger: &mut Ledger,
        sender: &Address,
        candidates: &[Spell],
        origin: Address,
    ) -> Result<CastReceipt, CastError> {
        self.authorize(sender)?;
        executor.cast_first_success(ledger, self.address, candidates, origin)
    }

    fn authorize(&self, sender: &Address) -> Result<(), CastError> {
        if !self.is_owner(sender) {
            warn!(account = %self.address, %sender, "Rejected cast from non-owner");
            return Err(CastError::frame(0, SpellError::Unauthorized(*sender)));
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), AccountError> {
        if !self.is_owner(caller) {
            return Err(AccountError::Unauthorized(*caller));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dsa_common::models::Argument;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        registry::ModuleRegistry,
        testing::{admin, dsa, outsider, owner},
    };

    #[test]
    fn test_non_owner_cannot_cast() {
        let registry = ModuleRegistry::new(admin());
        let executor = CastExecutor::new(&registry);
        let account = Account::new(dsa(), owner());
        let mut ledger = Ledger::new();
        let spells = vec![Spell::new("BASIC-A", "deposit", vec![Argument::from(1u64)])];

        let err = account
            .cast(&executor, &mut ledger, &outsider(), &spells, outsider())
            .unwrap_err();

        assert_eq!(err, CastError::frame(0, SpellError::Unauthorized(outsider())));
        assert_eq!(ledger.journal_len(), 0);
    }

    #[test]
    fn test_owner_management() {
        let mut account = Account::new(dsa(), owner());

        assert_eq!(account.add_owner(&outsider(), outsider()), Err(AccountError::Unauthorized(outsider())));
        assert_eq!(account.remove_owner(&owner(), &owner()), Err(AccountError::LastOwner(owner())));
        assert_eq!(account.add_owner(&owner(), outsider()), Ok(true));
        assert_eq!(account.add_owner(&owner(), outsider()), Ok(false));

        account
            .remove_owner(&outsider(), &owner())
            .unwrap();

        assert!(!account.is_owner(&owner()));
        assert_eq!(account.owners().collect::<Vec<_>>(), vec![&outsider()]);
        assert_eq!(account.remove_owner(&outsider(), &owner()), Err(AccountError::NotOwner(owner())));
    }
}
