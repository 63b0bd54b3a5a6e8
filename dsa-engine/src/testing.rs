//! Identities, fixtures and test connectors shared by unit and integration tests.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use dsa_common::{
    codec::{Payload, RawResult},
    errors::SpellError,
    ledger::Ledger,
    models::{Argument, Spell},
};

use crate::{
    connectors::{BasicConnector, FlashBorrowConnector, PooledLiquidity, VaultConnector},
    context::AccountContext,
    registry::{ModuleHandle, ModuleRegistry},
    traits::Connector,
};

pub const BASIC: &str = "BASIC-A";
pub const VAULT_A: &str = "VAULT-A";
pub const VAULT_B: &str = "VAULT-B";
pub const FLASH: &str = "FLASH-A";
pub const PROBE: &str = "PROBE-A";
pub const FAIL: &str = "FAIL-A";

/// Route id of the reference flash liquidity.
pub const FLASH_ROUTE: u64 = 1;
/// Fee of the reference flash liquidity, in basis points.
pub const FLASH_FEE_BPS: u64 = 9;
pub const VAULT_LTV_BPS: u64 = 7_500;

pub const ORIGIN_FUNDS: u64 = 1_000;
pub const ACCOUNT_FUNDS: u64 = 500;
pub const LENDER_FUNDS: u64 = 1_000_000;
pub const POOL_FUNDS: u64 = 10_000;

pub fn admin() -> Address {
    Address::repeat_byte(0xad)
}

pub fn outsider() -> Address {
    Address::repeat_byte(0x0e)
}

pub fn owner() -> Address {
    Address::repeat_byte(0x01)
}

pub fn dsa() -> Address {
    Address::repeat_byte(0xd5)
}

pub fn token() -> Address {
    Address::repeat_byte(0x70)
}

pub fn lender() -> Address {
    Address::repeat_byte(0x1e)
}

pub fn pool_a() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn pool_b() -> Address {
    Address::repeat_byte(0xb2)
}

/// Deployment address of a test module, all zero but the last byte.
pub fn module_address(byte: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Address::from(bytes)
}

/// A ledger with funds for the owner, the account, the flash lender and both vault pools. The
/// owner has approved the account for all of its funds.
pub fn funded_ledger() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.set_balance(owner(), token(), U256::from(ORIGIN_FUNDS));
    ledger.approve(owner(), dsa(), token(), U256::from(ORIGIN_FUNDS));
    ledger.set_balance(dsa(), token(), U256::from(ACCOUNT_FUNDS));
    ledger.set_balance(lender(), token(), U256::from(LENDER_FUNDS));
    ledger.set_balance(pool_a(), token(), U256::from(POOL_FUNDS));
    ledger.set_balance(pool_b(), token(), U256::from(POOL_FUNDS));
    ledger
}

/// A registry with one instance of every reference and test connector, administered by
/// [`admin`].
pub fn reference_registry() -> ModuleRegistry {
    let flash = FlashBorrowConnector::new()
        .with_route(FLASH_ROUTE, Arc::new(PooledLiquidity::new(lender(), FLASH_FEE_BPS)));
    let modules: Vec<(&str, Arc<dyn Connector>)> = vec![
        (BASIC, Arc::new(BasicConnector::new())),
        (VAULT_A, Arc::new(VaultConnector::new(pool_a(), VAULT_LTV_BPS))),
        (VAULT_B, Arc::new(VaultConnector::new(pool_b(), VAULT_LTV_BPS))),
        (FLASH, Arc::new(flash)),
        (PROBE, Arc::new(RelayProbeConnector)),
        (FAIL, Arc::new(FailingConnector::new("boom"))),
    ];
    let mut registry = ModuleRegistry::new(admin());
    registry
        .register_many(
            &admin(),
            modules
                .into_iter()
                .enumerate()
                .map(|(i, (name, module))| {
                    (name.to_string(), ModuleHandle::new(module_address(i as u8 + 1), module))
                })
                .collect(),
        )
        .expect("reference modules must register");
    registry
}

/// `PROBE-A.record(value, getId, setId)`
pub fn record_spell(value: u64, get_id: u64, set_id: u64) -> Spell {
    Spell::new(PROBE, "record", vec![value.into(), get_id.into(), set_id.into()])
}

/// `PROBE-A.mint(token, amount, getId, setId)`
pub fn mint_spell(amount: u64, get_id: u64, set_id: u64) -> Spell {
    Spell::new(PROBE, "mint", vec![token().into(), amount.into(), get_id.into(), set_id.into()])
}

/// `PROBE-A.burn(token, amount, getId, setId)`
pub fn burn_spell(amount: u64, get_id: u64, set_id: u64) -> Spell {
    Spell::new(PROBE, "burn", vec![token().into(), amount.into(), get_id.into(), set_id.into()])
}

/// `FAIL-A.fail(getId, setId)`
pub fn fail_spell() -> Spell {
    Spell::new(FAIL, "fail", vec![0u64.into(), 7u64.into()])
}

/// Always fails, after having touched account storage, balances and the relay register.
#[derive(Debug, Clone)]
pub struct FailingConnector {
    reason: String,
}

impl FailingConnector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Connector for FailingConnector {
    fn name(&self) -> &str {
        "Fail-v1"
    }

    fn entry_points(&self) -> &[&'static str] {
        &["fail(uint256,uint256)"]
    }

    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let (_, set_id) = payload.reader().relay_ids()?;
        ctx.store("failing:touched", U256::from(1));
        let account = ctx.account();
        ctx.ledger_mut()
            .credit(account, token(), U256::from(1))?;
        ctx.relay().set_uint(set_id, U256::from(1));
        Err(SpellError::ModuleExecutionFailed(self.reason.clone()))
    }
}

/// Exercises the relay register and account balances without any business logic.
///
/// - `record(value, getId, setId)` republishes its (possibly relayed) input;
/// - `mint(token, amount, getId, setId)` credits the account out of thin air;
/// - `burn(token, amount, getId, setId)` destroys account funds.
#[derive(Debug, Clone, Default)]
pub struct RelayProbeConnector;

const RECORD: &str = "record(uint256,uint256,uint256)";
const MINT: &str = "mint(address,uint256,uint256,uint256)";
const BURN: &str = "burn(address,uint256,uint256,uint256)";

impl Connector for RelayProbeConnector {
    fn name(&self) -> &str {
        "Probe-v1"
    }

    fn entry_points(&self) -> &[&'static str] {
        &[RECORD, MINT, BURN]
    }

    fn invoke(
        &self,
        payload: &Payload,
        ctx: &mut AccountContext<'_>,
    ) -> Result<RawResult, SpellError> {
        let args = payload.reader();
        let (get_id, set_id) = args.relay_ids()?;
        let account = ctx.account();
        let value = match payload.signature.as_str() {
            RECORD => ctx
                .relay()
                .get_uint(get_id, args.uint(0)?)?,
            MINT => {
                let amount = ctx
                    .relay()
                    .get_uint(get_id, args.uint(1)?)?;
                ctx.ledger_mut()
                    .credit(account, args.address(0)?, amount)?;
                amount
            }
            BURN => {
                let amount = ctx
                    .relay()
                    .get_uint(get_id, args.uint(1)?)?;
                ctx.ledger_mut()
                    .debit(account, args.address(0)?, amount)?;
                amount
            }
            _ => {
                return Err(SpellError::BadSignature {
                    module: payload.module.clone(),
                    signature: payload.signature.clone(),
                })
            }
        };
        ctx.relay().set_uint(set_id, value);
        Ok(RawResult::event("LogProbe", &[Argument::from(value)])?.with_returned(vec![value.into()]))
    }
}
