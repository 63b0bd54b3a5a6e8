use std::path::PathBuf;

use alloy_primitives::{Address, U256};
use dsa_cli::{
    cli::{BatchArgs, Command, GlobalArgs},
    run,
};
use pretty_assertions::assert_eq;
use serde_json::Value;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
        .display()
        .to_string()
}

fn global_args() -> GlobalArgs {
    GlobalArgs { scenario: fixture("scenario.yaml"), verbose: false }
}

fn run_json(command: Command) -> anyhow::Result<Value> {
    let mut out = Vec::new();
    run(&global_args(), command, &mut out)?;
    Ok(serde_json::from_slice(&out)?)
}

fn balance(report: &Value, holder: Address) -> Option<U256> {
    report["balances"]
        .as_array()?
        .iter()
        .find(|entry| entry["holder"] == serde_json::to_value(holder).unwrap())
        .map(|entry| serde_json::from_value(entry["amount"].clone()).unwrap())
}

#[test_log::test]
fn test_cast_leverage_batch() {
    let report = run_json(Command::Cast(BatchArgs { batch: fixture("leverage.yaml") })).unwrap();

    assert_eq!(balance(&report, Address::repeat_byte(0x1e)), Some(U256::from(1_000_001)));
    assert_eq!(balance(&report, Address::repeat_byte(0xa1)), Some(U256::from(10_999)));
    assert_eq!(balance(&report, Address::repeat_byte(0xd5)), None);
    let records = report["receipt"]["records"]
        .as_array()
        .unwrap();
    // 2 nested spells + nested frame + 2 top-level spells + top-level frame
    assert_eq!(records.len(), 6);
}

#[test_log::test]
fn test_cast_shortfall_reports_reason() {
    let err = run_json(Command::Cast(BatchArgs { batch: fixture("shortfall.yaml") })).unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Repayment shortfall"), "{message}");
}

#[test_log::test]
fn test_encode_prints_selectors() {
    let encoded = run_json(Command::Encode(BatchArgs { batch: fixture("leverage.yaml") })).unwrap();

    let signatures: Vec<_> = encoded
        .as_array()
        .unwrap()
        .iter()
        .map(|spell| spell["signature"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        signatures,
        vec![
            "deposit(address,uint256,uint256,uint256)",
            "flashBorrowAndCast(address,uint256,uint256,bytes,uint256,uint256)",
        ]
    );
}

#[test_log::test]
fn test_modules_lists_registrations() {
    let modules = run_json(Command::Modules).unwrap();

    let names: Vec<_> = modules
        .as_array()
        .unwrap()
        .iter()
        .map(|module| module["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["BASIC-A", "FLASH-A", "VAULT-A"]);
}
