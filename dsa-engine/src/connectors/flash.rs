//! Flash-borrow bridge.
//!
//! `flashBorrowAndCast` lends funds to the account, drives a pre-encoded batch of spells as a
//! nested frame while the loan is outstanding and takes principal plus fee back before the spell
//! returns. The loan never outlives the spell: either the nested batch and the repayment both
//! succeed, or the outer frame unwinds together with everything the nested batch did.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, Bytes, U256};
use dsa_common::{
    codec::{self, Payload, RawResult},
    errors::SpellError,
    models::{Argument, Spell},
};
use tracing::{debug, info};

use crate::{context::AccountContext, traits::{Connector, LiquiditySource}};

const FLASH_BORROW_AND_CAST: &str =
    "flashBorrowAndCast(address,uint256,uint256,bytes,uint256,uint256)";

const BPS: u64 = 10_000;

/// Liquidity held by a single lender identity, charging a flat fee in basis points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledLiquidity {
    lender: Address,
    fee_bps: u64,
}

impl PooledLiquidity {
    pub fn new(lender: Address, fee_bps: u64) -> Self {
        Self { lender, fee_bps }
    }
}

impl LiquiditySource for PooledLiquidity {
    fn lender(&self) -> Address {
        self.lender
    }

    /// `amount * fee_bps / 10_000`, rounded down.
    fn fee(&self, _asset: &Address, amount: U256) -> Result<U256, SpellError> {
        amount
            .checked_mul(U256::from(self.fee_bps))
            .map(|scaled| scaled / U256::from(BPS))
            .ok_or_else(|| SpellError::ModuleExecutionFailed(format!("fee overflow for {amount}")))
    }
}

#[derive(Debug, Default, Clone)]
pub struct FlashBorrowConnector {
    routes: BTreeMap<u64, Arc<dyn LiquiditySource>>,
}

impl FlashBorrowConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `source` selectable as `route`. A later call for the same route replaces it.
    pub fn with_route(mut self, route: u64, source: Arc<dyn LiquiditySource>) -> Self {
        self.routes.insert(route, source);
        self
    }

    pub fn routes(&self) -> impl Iterator<Item = u64> + '_ {
        self.routes.keys().copied()
    }

    fn flash_borrow_and_cast(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let args = payload.reader();
        let token = args.address(0)?;
        let route = args.small_uint(2)?;
        let (get_id, set_id) = args.relay_ids()?;
        let amount = ctx
            .relay()
            .get_uint(get_id, args.uint(1)?)?;

        let source = self
            .routes
            .get(&route)
            .ok_or_else(|| SpellError::ModuleExecutionFailed(format!("unknown route {route}")))?;
        let spells = codec::decode_batch(args.bytes(3)?)?;
        let lender = source.lender();
        let liquidity = ctx.ledger().balance_of(&lender, &token);
        if liquidity < amount {
            return Err(SpellError::ModuleExecutionFailed(format!(
                "insufficient liquidity on route {route}: requested {amount}, available {liquidity}"
            )));
        }
        let fee = source.fee(&token, amount)?;
        let required = amount
            .checked_add(fee)
            .ok_or_else(|| SpellError::ModuleExecutionFailed("repayment overflow".to_string()))?;

        debug!(%token, %amount, route, %lender, "Flash loan granted");
        ctx.receive(token, lender, amount)?;
        ctx.cast_nested(&spells)
            .map_err(|err| SpellError::NestedCastFailed(Box::new(err)))?;

        let available = ctx.balance(&token);
        if available < required {
            return Err(SpellError::RepaymentShortfall { required, available });
        }
        ctx.pay(token, lender, required)?;
        ctx.relay().set_uint(set_id, required);
        info!(%token, %amount, %fee, route, "Flash loan repaid");

        Ok(RawResult::event(
            "LogFlashBorrow",
            &[token.into(), amount.into(), route.into(), fee.into()],
        )?)
    }
}

impl Connector for FlashBorrowConnector {
    fn name(&self) -> &str {
        "Flash-v1"
    }

    fn entry_points(&self) -> &[&'static str] {
        &[FLASH_BORROW_AND_CAST]
    }

    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        match payload.signature.as_str() {
            FLASH_BORROW_AND_CAST => self.flash_borrow_and_cast(payload, ctx),
            _ => Err(SpellError::BadSignature {
                module: payload.module.clone(),
                signature: payload.signature.clone(),
            }),
        }
    }
}

/// Arguments of a `flashBorrowAndCast` spell carrying `spells` as the nested batch.
pub fn flash_args(
    token: Address,
    amount: U256,
    route: u64,
    spells: &[Spell],
    get_id: u64,
    set_id: u64,
) -> Result<Vec<Argument>, SpellError> {
    let data: Bytes = codec::encode_batch(spells)?;
    Ok(vec![token.into(), amount.into(), route.into(), data.into(), get_id.into(), set_id.into()])
}
