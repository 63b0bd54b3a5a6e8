use alloy_primitives::{Address, U256};
use dsa_common::{
    codec::{Payload, RawResult},
    errors::SpellError,
};
use tracing::debug;

use crate::{context::AccountContext, traits::Connector};

const DEPOSIT: &str = "deposit(address,uint256,uint256,uint256)";
const WITHDRAW: &str = "withdraw(address,uint256,uint256,uint256)";
const BORROW: &str = "borrow(address,uint256,uint256,uint256)";
const PAYBACK: &str = "payback(address,uint256,uint256,uint256)";

const BPS: u64 = 10_000;

/// Minimal pooled lending market.
///
/// Funds sit with the `pool` identity. Positions are kept in the pool's storage, keyed by account
/// and token. Debt of a token may not exceed `ltv_bps` of the amount supplied of the same token.
#[derive(Debug, Clone)]
pub struct VaultConnector {
    pool: Address,
    ltv_bps: u64,
}

impl VaultConnector {
    pub fn new(pool: Address, ltv_bps: u64) -> Self {
        Self { pool, ltv_bps: ltv_bps.min(BPS) }
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    pub fn supplied(&self, ctx: &AccountContext<'_>, token: &Address) -> U256 {
        ctx.ledger()
            .load(&self.pool, &supplied_key(&ctx.account(), token))
    }

    pub fn debt(&self, ctx: &AccountContext<'_>, token: &Address) -> U256 {
        ctx.ledger()
            .load(&self.pool, &debt_key(&ctx.account(), token))
    }

    fn deposit(
        &self,
        ctx: &mut AccountContext<'_>,
        token: Address,
        amount: U256,
    ) -> Result<U256, SpellError> {
        let amount = if amount == U256::MAX { ctx.balance(&token) } else { amount };
        ctx.pay(token, self.pool, amount)?;
        let supplied = self
            .supplied(ctx, &token)
            .checked_add(amount)
            .ok_or_else(|| failed("supplied amount overflow"))?;
        let key = supplied_key(&ctx.account(), &token);
        self.set_position(ctx, key, supplied);
        Ok(amount)
    }

    fn withdraw(
        &self,
        ctx: &mut AccountContext<'_>,
        token: Address,
        amount: U256,
    ) -> Result<U256, SpellError> {
        let supplied = self.supplied(ctx, &token);
        let amount = if amount == U256::MAX { supplied } else { amount };
        let remaining = supplied
            .checked_sub(amount)
            .ok_or_else(|| failed("insufficient supplied"))?;
        self.ensure_healthy(remaining, self.debt(ctx, &token))?;
        let key = supplied_key(&ctx.account(), &token);
        self.set_position(ctx, key, remaining);
        ctx.receive(token, self.pool, amount)?;
        Ok(amount)
    }

    fn borrow(
        &self,
        ctx: &mut AccountContext<'_>,
        token: Address,
        amount: U256,
    ) -> Result<U256, SpellError> {
        let debt = self
            .debt(ctx, &token)
            .checked_add(amount)
            .ok_or_else(|| failed("debt overflow"))?;
        self.ensure_healthy(self.supplied(ctx, &token), debt)?;
        let key = debt_key(&ctx.account(), &token);
        self.set_position(ctx, key, debt);
        ctx.receive(token, self.pool, amount)?;
        Ok(amount)
    }

    fn payback(
        &self,
        ctx: &mut AccountContext<'_>,
        token: Address,
        amount: U256,
    ) -> Result<U256, SpellError> {
        let debt = self.debt(ctx, &token);
        let amount = if amount == U256::MAX { debt } else { amount };
        let remaining = debt
            .checked_sub(amount)
            .ok_or_else(|| failed("payback exceeds debt"))?;
        ctx.pay(token, self.pool, amount)?;
        let key = debt_key(&ctx.account(), &token);
        self.set_position(ctx, key, remaining);
        Ok(amount)
    }

    fn ensure_healthy(&self, supplied: U256, debt: U256) -> Result<(), SpellError> {
        let limit = supplied
            .checked_mul(U256::from(self.ltv_bps))
            .ok_or_else(|| failed("collateral value overflow"))?
            / U256::from(BPS);
        if debt > limit {
            return Err(failed("position would be undercollateralized"));
        }
        Ok(())
    }

    fn set_position(&self, ctx: &mut AccountContext<'_>, key: String, value: U256) {
        ctx.ledger_mut()
            .store(self.pool, key, value);
    }
}

impl Connector for VaultConnector {
    fn name(&self) -> &str {
        "Vault-v1"
    }

    fn entry_points(&self) -> &[&'static str] {
        &[DEPOSIT, WITHDRAW, BORROW, PAYBACK]
    }

    /// Every operation is `(token, amount, getId, setId)` and publishes the effective amount.
    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let args = payload.reader();
        let token = args.address(0)?;
        let (get_id, set_id) = args.relay_ids()?;
        let amount = ctx
            .relay()
            .get_uint(get_id, args.uint(1)?)?;

        let (event, amount) = match payload.signature.as_str() {
            DEPOSIT => ("LogDeposit", self.deposit(ctx, token, amount)?),
            WITHDRAW => ("LogWithdraw", self.withdraw(ctx, token, amount)?),
            BORROW => ("LogBorrow", self.borrow(ctx, token, amount)?),
            PAYBACK => ("LogPayback", self.payback(ctx, token, amount)?),
            _ => {
                return Err(SpellError::BadSignature {
                    module: payload.module.clone(),
                    signature: payload.signature.clone(),
                })
            }
        };
        ctx.relay().set_uint(set_id, amount);
        debug!(operation = %payload.operation, %token, %amount, pool = %self.pool, "Vault position changed");

        Ok(RawResult::event(event, &[token.into(), amount.into(), get_id.into(), set_id.into()])?)
    }
}

fn supplied_key(account: &Address, token: &Address) -> String {
    format!("supplied:{account}:{token}")
}

fn debt_key(account: &Address, token: &Address) -> String {
    format!("debt:{account}:{token}")
}

fn failed(reason: &str) -> SpellError {
    SpellError::ModuleExecutionFailed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::pool_a;

    #[test]
    fn test_health_check_bounds_debt_by_ltv() {
        let vault = VaultConnector::new(pool_a(), 7500);

        assert_eq!(vault.ensure_healthy(U256::from(1000), U256::from(750)), Ok(()));
        assert_eq!(
            vault.ensure_healthy(U256::from(1000), U256::from(751)),
            Err(failed("position would be undercollateralized"))
        );
    }

    #[test]
    fn test_health_check_overflow_is_an_error() {
        let vault = VaultConnector::new(pool_a(), 7500);

        assert_eq!(
            vault.ensure_healthy(U256::MAX, U256::from(1)),
            Err(failed("collateral value overflow"))
        );
    }
}
