use core::fmt::Debug;

use alloy_primitives::{Address, U256};
use dsa_common::{
    codec::{self, Payload, RawResult, Selector},
    errors::SpellError,
};

use crate::context::AccountContext;

/// A module ("connector") the executor can resolve through the registry and invoke.
///
/// Connectors hold no state of their own between invocations: everything they change goes
/// through the [`AccountContext`], which acts on the calling account's own ledger entries. This
/// is what lets spells of different modules share balances and relay slots inside one cast.
///
/// Every operation a connector exposes ends with a `(getId, setId)` pair of relay ids, where `0`
/// means "not used".
pub trait Connector: Debug + Send + Sync {
    /// Human readable name of the implementation, e.g. `Basic-v1`.
    fn name(&self) -> &str;

    /// Canonical signatures of the operations this connector exposes.
    fn entry_points(&self) -> &[&'static str];

    /// Executes `payload` in the caller's context.
    ///
    /// Only called for payloads whose selector matches one of the entry points.
    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError>;

    /// Whether `selector` belongs to one of the entry points.
    fn supports(&self, selector: &Selector) -> bool {
        self.entry_points()
            .iter()
            .any(|signature| codec::selector(signature) == *selector)
    }
}

/// A source of flash liquidity, selected by route id in a flash-borrow spell.
///
/// Lent funds move from [`LiquiditySource::lender`] to the borrowing account and must come back
/// together with the fee before the flash spell returns.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait LiquiditySource: Debug + Send + Sync {
    /// Ledger identity holding the lendable funds.
    fn lender(&self) -> Address;

    /// Fee charged on top of the principal for borrowing `amount` of `asset`.
    fn fee(&self, asset: &Address, amount: U256) -> Result<U256, SpellError>;
}
