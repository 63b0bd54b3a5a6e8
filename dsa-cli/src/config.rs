//! YAML scenario and batch files.

use std::{collections::BTreeSet, fs, path::Path, sync::Arc};

use alloy_primitives::{Address, U256};
use dsa_common::{
    codec,
    errors::{CodecError, RegistryError},
    ledger::Ledger,
    models::{Argument, Spell},
};
use dsa_engine::{
    connectors::{BasicConnector, FlashBorrowConnector, PooledLiquidity, VaultConnector},
    Account, AccountError, Connector, ExecutorConfig, ModuleHandle, ModuleRegistry,
};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Failed to parse {0}: {1}")]
    Yaml(String, serde_yaml::Error),
    #[error("Registry setup failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("Invalid batch: {0}")]
    Codec(#[from] CodecError),
    #[error("Account {0} is declared twice")]
    DuplicateAccount(Address),
    #[error("Unknown account {0}")]
    UnknownAccount(Address),
    #[error("Account {0} has no owners")]
    NoOwners(Address),
    #[error(transparent)]
    Account(#[from] AccountError),
}

fn from_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(display.clone(), err))?;
    serde_yaml::from_str(&contents).map_err(|err| ConfigError::Yaml(display, err))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub balances: Vec<BalanceConfig>,
    #[serde(default)]
    pub allowances: Vec<AllowanceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    pub master: Address,
    /// Additional authorities besides the master.
    #[serde(default)]
    pub authorities: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub address: Address,
    #[serde(flatten)]
    pub connector: ConnectorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectorConfig {
    Basic,
    Vault { pool: Address, ltv_bps: u64 },
    Flash { routes: Vec<RouteConfig> },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub id: u64,
    pub lender: Address,
    pub fee_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    pub address: Address,
    pub owners: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BalanceConfig {
    pub holder: Address,
    pub asset: Address,
    pub amount: U256,
}

/// `owner` lets `spender` pull up to `amount` of `asset`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllowanceConfig {
    pub owner: Address,
    pub spender: Address,
    pub asset: Address,
    pub amount: U256,
}

impl ScenarioConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        from_yaml(path)
    }

    /// Builds registry, ledger and accounts described by this config.
    pub fn build(&self) -> Result<Scenario, ConfigError> {
        let master = self.registry.master;
        let mut registry = ModuleRegistry::new(master);
        for authority in self
            .registry
            .authorities
            .iter()
            .filter(|authority| **authority != master)
        {
            if !registry.is_authority(authority) {
                registry.toggle_authority(&master, *authority)?;
            }
        }

        let modules = self
            .modules
            .iter()
            .map(|module| {
                let handle = ModuleHandle::new(module.address, module.connector.instantiate());
                (module.name.clone(), handle)
            })
            .collect();
        registry.register_many(&master, modules)?;

        let mut ledger = Ledger::new();
        for balance in &self.balances {
            ledger.set_balance(balance.holder, balance.asset, balance.amount);
        }
        for allowance in &self.allowances {
            ledger.approve(allowance.owner, allowance.spender, allowance.asset, allowance.amount);
        }

        let mut accounts = Vec::with_capacity(self.accounts.len());
        let mut seen = BTreeSet::new();
        for config in &self.accounts {
            if !seen.insert(config.address) {
                return Err(ConfigError::DuplicateAccount(config.address));
            }
            accounts.push(config.instantiate()?);
        }

        info!(
            modules = self.modules.len(),
            accounts = accounts.len(),
            balances = self.balances.len(),
            "Scenario loaded"
        );
        Ok(Scenario { executor: self.executor.clone(), registry, ledger, accounts })
    }
}

impl ConnectorConfig {
    fn instantiate(&self) -> Arc<dyn Connector> {
        match self {
            ConnectorConfig::Basic => Arc::new(BasicConnector::new()),
            ConnectorConfig::Vault { pool, ltv_bps } => Arc::new(VaultConnector::new(*pool, *ltv_bps)),
            ConnectorConfig::Flash { routes } => Arc::new(routes.iter().fold(
                FlashBorrowConnector::new(),
                |connector, route| {
                    connector.with_route(
                        route.id,
                        Arc::new(PooledLiquidity::new(route.lender, route.fee_bps)),
                    )
                },
            )),
        }
    }
}

impl AccountConfig {
    fn instantiate(&self) -> Result<Account, ConfigError> {
        let (first, rest) = self
            .owners
            .split_first()
            .ok_or(ConfigError::NoOwners(self.address))?;
        let mut account = Account::new(self.address, *first);
        for owner in rest {
            account.add_owner(first, *owner)?;
        }
        Ok(account)
    }
}

/// Runtime state built from a [`ScenarioConfig`].
#[derive(Debug)]
pub struct Scenario {
    pub executor: ExecutorConfig,
    pub registry: ModuleRegistry,
    pub ledger: Ledger,
    pub accounts: Vec<Account>,
}

impl Scenario {
    pub fn account(&self, address: &Address) -> Result<&Account, ConfigError> {
        self.accounts
            .iter()
            .find(|account| account.address() == *address)
            .ok_or(ConfigError::UnknownAccount(*address))
    }
}

/// A batch to cast: who casts, as which account, and the spells.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchConfig {
    pub account: Address,
    pub sender: Address,
    /// Defaults to the sender.
    #[serde(default)]
    pub origin: Option<Address>,
    pub spells: Vec<SpellConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpellConfig {
    pub module: String,
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentConfig>,
}

/// A literal argument, or a nested batch passed on as encoded `bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ArgumentConfig {
    Batch { batch: Vec<SpellConfig> },
    Value(Argument),
}

impl BatchConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        from_yaml(path)
    }

    pub fn origin(&self) -> Address {
        self.origin.unwrap_or(self.sender)
    }

    pub fn spells(&self) -> Result<Vec<Spell>, ConfigError> {
        self.spells
            .iter()
            .map(SpellConfig::to_spell)
            .collect()
    }
}

impl SpellConfig {
    pub fn to_spell(&self) -> Result<Spell, ConfigError> {
        let arguments = self
            .arguments
            .iter()
            .map(|argument| match argument {
                ArgumentConfig::Value(value) => Ok(value.clone()),
                ArgumentConfig::Batch { batch } => {
                    let spells = batch
                        .iter()
                        .map(SpellConfig::to_spell)
                        .collect::<Result<Vec<_>, _>>()?;
                    debug!(module = %self.module, nested = spells.len(), "Encoding nested batch");
                    Ok(Argument::Bytes(codec::encode_batch(&spells)?))
                }
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Spell::new(self.module.clone(), self.operation.clone(), arguments))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SCENARIO: &str = r#"
executor:
  max_depth: 2
registry:
  master: "0xadadadadadadadadadadadadadadadadadadadad"
  authorities:
    - "0x0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e"
modules:
  - name: BASIC-A
    address: "0x0000000000000000000000000000000000000001"
    kind: basic
  - name: VAULT-A
    address: "0x0000000000000000000000000000000000000002"
    kind: vault
    pool: "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
    ltv_bps: 7500
  - name: FLASH-A
    address: "0x0000000000000000000000000000000000000003"
    kind: flash
    routes:
      - id: 1
        lender: "0x1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e"
        fee_bps: 9
accounts:
  - address: "0xd5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5"
    owners: ["0x0101010101010101010101010101010101010101"]
balances:
  - holder: "0x1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e"
    asset: "0x7070707070707070707070707070707070707070"
    amount: "1000000"
allowances:
  - owner: "0x0101010101010101010101010101010101010101"
    spender: "0xd5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5"
    asset: "0x7070707070707070707070707070707070707070"
    amount: "250"
"#;

    const BATCH: &str = r#"
account: "0xd5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5d5"
sender: "0x0101010101010101010101010101010101010101"
spells:
  - module: FLASH-A
    operation: flashBorrowAndCast
    arguments:
      - address: "0x7070707070707070707070707070707070707070"
      - uint: "1000"
      - uint: "1"
      - batch:
          - module: BASIC-A
            operation: withdraw
            arguments:
              - address: "0x7070707070707070707070707070707070707070"
              - uint: "1"
              - address: "0x0101010101010101010101010101010101010101"
              - uint: "0"
              - uint: "0"
      - uint: "0"
      - uint: "0"
"#;

    #[test]
    fn test_parse_scenario() {
        let config: ScenarioConfig = serde_yaml::from_str(SCENARIO).unwrap();

        assert_eq!(config.executor, ExecutorConfig::with_max_depth(2));
        assert_eq!(config.modules.len(), 3);
        assert_eq!(
            config.modules[1].connector,
            ConnectorConfig::Vault { pool: Address::repeat_byte(0xa1), ltv_bps: 7500 }
        );
        assert_eq!(
            config.modules[2].connector,
            ConnectorConfig::Flash {
                routes: vec![RouteConfig { id: 1, lender: Address::repeat_byte(0x1e), fee_bps: 9 }]
            }
        );
        assert_eq!(config.balances[0].amount, U256::from(1_000_000));
    }

    #[test]
    fn test_build_scenario() {
        let config: ScenarioConfig = serde_yaml::from_str(SCENARIO).unwrap();

        let scenario = config.build().unwrap();

        let (registered, _) = scenario
            .registry
            .is_registered(&["BASIC-A", "VAULT-A", "FLASH-A"]);
        assert!(registered);
        assert!(scenario
            .registry
            .is_authority(&Address::repeat_byte(0x0e)));
        assert_eq!(
            scenario
                .ledger
                .balance_of(&Address::repeat_byte(0x1e), &Address::repeat_byte(0x70)),
            U256::from(1_000_000)
        );
        assert_eq!(
            scenario.ledger.allowance(
                &Address::repeat_byte(0x01),
                &Address::repeat_byte(0xd5),
                &Address::repeat_byte(0x70)
            ),
            U256::from(250)
        );
        assert_eq!(scenario.ledger.journal_len(), 0);
        let account = scenario
            .account(&Address::repeat_byte(0xd5))
            .unwrap();
        assert!(account.is_owner(&Address::repeat_byte(0x01)));
    }

    #[test]
    fn test_duplicate_accounts_are_rejected() {
        let mut config: ScenarioConfig = serde_yaml::from_str(SCENARIO).unwrap();
        config
            .accounts
            .push(config.accounts[0].clone());

        let err = config.build().unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateAccount(address) if address == Address::repeat_byte(0xd5)));
    }

    #[test]
    fn test_nested_batch_is_encoded_as_bytes() {
        let batch: BatchConfig = serde_yaml::from_str(BATCH).unwrap();

        let spells = batch.spells().unwrap();

        assert_eq!(batch.origin(), Address::repeat_byte(0x01));
        assert_eq!(
            codec::encode_spell(&spells[0]).signature,
            "flashBorrowAndCast(address,uint256,uint256,bytes,uint256,uint256)"
        );
        let nested = codec::decode_batch(spells[0].arguments()[3].as_bytes().unwrap()).unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].module(), "BASIC-A");
        assert_eq!(nested[0].arguments()[1], Argument::from(1u64));
    }
}
