use alloy_primitives::{Address, U256};
use dsa_common::{
    codec::{Payload, RawResult},
    errors::SpellError,
    models::Argument,
};
use tracing::debug;

use crate::{context::AccountContext, traits::Connector};

const DEPOSIT: &str = "deposit(address,uint256,uint256,uint256)";
const WITHDRAW: &str = "withdraw(address,uint256,address,uint256,uint256)";

/// Token custody: moves funds between the account and outside identities.
///
/// An amount of `U256::MAX` stands for the whole available balance.
#[derive(Debug, Default, Clone)]
pub struct BasicConnector;

impl BasicConnector {
    pub fn new() -> Self {
        Self
    }

    /// `deposit(token, amount, getId, setId)`: pulls `amount` of `token` from the origin into the
    /// account. The origin must have approved the account for at least `amount`.
    fn deposit(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let args = payload.reader();
        let token = args.address(0)?;
        let (get_id, set_id) = args.relay_ids()?;
        let mut amount = ctx
            .relay()
            .get_uint(get_id, args.uint(1)?)?;
        let origin = ctx.origin();
        if amount == U256::MAX {
            let ledger = ctx.ledger();
            amount = ledger
                .balance_of(&origin, &token)
                .min(ledger.allowance(&origin, &ctx.account(), &token));
        }

        ctx.pull(token, origin, amount)?;
        ctx.relay().set_uint(set_id, amount);
        debug!(%token, %amount, %origin, "Deposited into account");

        Ok(RawResult::event(
            "LogDeposit",
            &[token.into(), amount.into(), get_id.into(), set_id.into()],
        )?)
    }

    /// `withdraw(token, amount, to, getId, setId)`: sends `amount` of `token` from the account to
    /// `to`.
    fn withdraw(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let args = payload.reader();
        let token = args.address(0)?;
        let to = args.address(2)?;
        let (get_id, set_id) = args.relay_ids()?;
        let mut amount = ctx
            .relay()
            .get_uint(get_id, args.uint(1)?)?;
        if amount == U256::MAX {
            amount = ctx.balance(&token);
        }

        ctx.pay(token, to, amount)?;
        ctx.relay().set_uint(set_id, amount);
        debug!(%token, %amount, %to, "Withdrawn from account");

        Ok(RawResult::event(
            "LogWithdraw",
            &[token.into(), amount.into(), to.into(), get_id.into(), set_id.into()],
        )?)
    }
}

impl Connector for BasicConnector {
    fn name(&self) -> &str {
        "Basic-v1"
    }

    fn entry_points(&self) -> &[&'static str] {
        &[DEPOSIT, WITHDRAW]
    }

    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        match payload.signature.as_str() {
            DEPOSIT => self.deposit(payload, ctx),
            WITHDRAW => self.withdraw(payload, ctx),
            _ => Err(SpellError::BadSignature {
                module: payload.module.clone(),
                signature: payload.signature.clone(),
            }),
        }
    }
}

/// Arguments of a `deposit` spell.
pub fn deposit_args(
    token: Address,
    amount: U256,
    get_id: u64,
    set_id: u64,
) -> Vec<Argument> {
    vec![token.into(), amount.into(), get_id.into(), set_id.into()]
}

/// Arguments of a `withdraw` spell.
pub fn withdraw_args(
    token: Address,
    amount: U256,
    to: Address,
    get_id: u64,
    set_id: u64,
) -> Vec<Argument> {
    vec![token.into(), amount.into(), to.into(), get_id.into(), set_id.into()]
}
