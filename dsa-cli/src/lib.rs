pub mod cli;
pub mod config;

use std::io::Write;

use alloy_primitives::{Address, U256};
use anyhow::Context;
use dsa_common::{codec, models::CastReceipt};
use dsa_engine::CastExecutor;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    cli::{BatchArgs, Command, GlobalArgs},
    config::{BatchConfig, ScenarioConfig},
};

/// What `cast` and `cast-first` print: the receipt plus the ledger balances after the cast.
#[derive(Debug, Serialize)]
pub struct CastReport {
    pub receipt: CastReceipt,
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceEntry {
    pub holder: Address,
    pub asset: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedSpell {
    pub module: String,
    pub signature: String,
    pub selector: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    AllOrNothing,
    FirstSuccess,
}

/// Runs `command` against the scenario named in `args` and writes JSON to `out`.
pub fn run(args: &GlobalArgs, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    let scenario = ScenarioConfig::from_yaml(&args.scenario)?;
    let value = match command {
        Command::Cast(batch) => serde_json::to_value(cast(&scenario, &batch, Mode::AllOrNothing)?)?,
        Command::CastFirst(batch) => {
            serde_json::to_value(cast(&scenario, &batch, Mode::FirstSuccess)?)?
        }
        Command::Modules => {
            let scenario = scenario.build()?;
            serde_json::to_value(scenario.registry.registrations())?
        }
        Command::Encode(batch) => serde_json::to_value(encode(&batch)?)?,
    };
    serde_json::to_writer_pretty(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}

fn cast(config: &ScenarioConfig, args: &BatchArgs, mode: Mode) -> anyhow::Result<CastReport> {
    let mut scenario = config.build()?;
    let batch = BatchConfig::from_yaml(&args.batch)?;
    let spells = batch.spells()?;
    let account = scenario
        .account(&batch.account)?
        .clone();
    let executor = CastExecutor::with_config(&scenario.registry, scenario.executor.clone());
    info!(account = %batch.account, sender = %batch.sender, spells = spells.len(), ?mode, "Casting batch");

    let result = match mode {
        Mode::AllOrNothing => account.cast(
            &executor,
            &mut scenario.ledger,
            &batch.sender,
            &spells,
            batch.origin(),
        ),
        Mode::FirstSuccess => account.cast_first_success(
            &executor,
            &mut scenario.ledger,
            &batch.sender,
            &spells,
            batch.origin(),
        ),
    };
    let receipt = result
        .map_err(|err| {
            error!(root_cause = %err.root_cause(), "Cast failed");
            err
        })
        .with_context(|| format!("casting {}", args.batch))?;

    let balances = scenario
        .ledger
        .state()
        .balances()
        .map(|((holder, asset), amount)| BalanceEntry { holder: *holder, asset: *asset, amount: *amount })
        .collect();
    Ok(CastReport { receipt, balances })
}

fn encode(args: &BatchArgs) -> anyhow::Result<Vec<EncodedSpell>> {
    let batch = BatchConfig::from_yaml(&args.batch)?;
    Ok(batch
        .spells()?
        .iter()
        .map(|spell| {
            let payload = codec::encode_spell(spell);
            EncodedSpell {
                module: payload.module,
                signature: payload.signature,
                selector: payload.selector.to_string(),
            }
        })
        .collect())
}
