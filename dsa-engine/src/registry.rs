//! Name → module resolution table with admin-gated mutation.
//!
//! The registry is the only indirection between a spell and the code it runs: upgrading a module
//! replaces the table entry, never the spells that name it. Mutations are restricted to a small
//! set of authorities, headed by a single master identity.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use alloy_primitives::Address;
use dsa_common::{
    errors::RegistryError,
    models::{ModuleRegistration, RegistryEvent},
};
use tracing::{debug, info, warn};

use crate::traits::Connector;

/// A deployed module: its identity plus the code behind it.
#[derive(Clone)]
pub struct ModuleHandle {
    address: Address,
    module: Arc<dyn Connector>,
}

impl ModuleHandle {
    pub fn new(address: Address, module: Arc<dyn Connector>) -> Self {
        Self { address, module }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn module(&self) -> &Arc<dyn Connector> {
        &self.module
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("address", &self.address)
            .field("module", &self.module.name())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    registration: ModuleRegistration,
    handle: ModuleHandle,
}

#[derive(Debug)]
pub struct ModuleRegistry {
    master: Address,
    authorities: BTreeSet<Address>,
    entries: HashMap<String, RegistryEntry>,
    events: Vec<RegistryEvent>,
}

impl ModuleRegistry {
    /// Creates an empty registry administered by `master`.
    pub fn new(master: Address) -> Self {
        Self {
            master,
            authorities: BTreeSet::from([master]),
            entries: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn master(&self) -> Address {
        self.master
    }

    pub fn is_authority(&self, identity: &Address) -> bool {
        self.authorities.contains(identity)
    }

    pub fn authorities(&self) -> impl Iterator<Item = &Address> {
        self.authorities.iter()
    }

    /// Resolves `name` to its module. Unknown and deregistered names are `NotFound`.
    pub fn resolve(&self, name: &str) -> Result<&ModuleHandle, RegistryError> {
        self.entries
            .get(name)
            .filter(|entry| entry.registration.enabled)
            .map(|entry| &entry.handle)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn registration(&self, name: &str) -> Option<&ModuleRegistration> {
        self.entries
            .get(name)
            .map(|entry| &entry.registration)
    }

    /// All registrations, enabled or not, sorted by name.
    pub fn registrations(&self) -> Vec<&ModuleRegistration> {
        let mut registrations: Vec<_> = self
            .entries
            .values()
            .map(|entry| &entry.registration)
            .collect();
        registrations.sort_by(|a, b| a.name.cmp(&b.name));
        registrations
    }

    /// Checks whether every name resolves. Also returns the address behind each name.
    pub fn is_registered(&self, names: &[&str]) -> (bool, Vec<Option<Address>>) {
        let addresses: Vec<_> = names
            .iter()
            .map(|name| {
                self.resolve(name)
                    .ok()
                    .map(ModuleHandle::address)
            })
            .collect();
        (addresses.iter().all(Option::is_some), addresses)
    }

    /// Adds a new module under `name`.
    ///
    /// Fails with `AlreadyRegistered` if an enabled module holds the name. A deregistered name
    /// can be registered again; it comes back with a bumped version.
    pub fn register(
        &mut self,
        caller: &Address,
        name: &str,
        handle: ModuleHandle,
    ) -> Result<(), RegistryError> {
        self.register_many(caller, vec![(name.to_string(), handle)])
    }

    /// Registers several modules at once. Nothing is registered unless every name is free.
    pub fn register_many(
        &mut self,
        caller: &Address,
        modules: Vec<(String, ModuleHandle)>,
    ) -> Result<(), RegistryError> {
        self.ensure_authority(caller)?;
        let mut seen = BTreeSet::new();
        for (name, _) in &modules {
            validate_name(name)?;
            if self.resolve(name).is_ok() || !seen.insert(name.as_str()) {
                return Err(RegistryError::AlreadyRegistered(name.clone()));
            }
        }
        for (name, handle) in modules {
            let version = self
                .entries
                .get(&name)
                .map(|entry| entry.registration.version + 1)
                .unwrap_or(1);
            let registration = ModuleRegistration {
                name: name.clone(),
                address: handle.address(),
                enabled: true,
                version,
            };
            info!(name = %name, address = %handle.address(), version, "Module registered");
            self.events
                .push(RegistryEvent::Registered { name: name.clone(), address: handle.address(), version });
            self.entries
                .insert(name, RegistryEntry { registration, handle });
        }
        Ok(())
    }

    /// Points an existing module name at a new deployment.
    pub fn update(
        &mut self,
        caller: &Address,
        name: &str,
        handle: ModuleHandle,
    ) -> Result<(), RegistryError> {
        self.update_many(caller, vec![(name.to_string(), handle)])
    }

    pub fn update_many(
        &mut self,
        caller: &Address,
        modules: Vec<(String, ModuleHandle)>,
    ) -> Result<(), RegistryError> {
        self.ensure_authority(caller)?;
        for (name, _) in &modules {
            self.ensure_enabled(name)?;
        }
        for (name, handle) in modules {
            let Some(entry) = self.entries.get_mut(&name) else {
                return Err(RegistryError::UnknownModule(name));
            };
            let old = entry.registration.address;
            entry.registration.address = handle.address();
            entry.registration.version += 1;
            entry.handle = handle;
            let (new, version) = (entry.registration.address, entry.registration.version);
            info!(name = %name, %old, %new, version, "Module updated");
            self.events
                .push(RegistryEvent::Updated { name, old, new, version });
        }
        Ok(())
    }

    /// Disables `name`. Casts already holding the module are unaffected, later resolutions fail.
    pub fn deregister(&mut self, caller: &Address, name: &str) -> Result<(), RegistryError> {
        self.deregister_many(caller, &[name])
    }

    pub fn deregister_many(&mut self, caller: &Address, names: &[&str]) -> Result<(), RegistryError> {
        self.ensure_authority(caller)?;
        let mut seen = BTreeSet::new();
        for name in names {
            self.ensure_enabled(name)?;
            if !seen.insert(*name) {
                return Err(RegistryError::UnknownModule(name.to_string()));
            }
        }
        for name in names {
            if let Some(entry) = self.entries.get_mut(*name) {
                entry.registration.enabled = false;
                let address = entry.registration.address;
                info!(name = %name, %address, "Module deregistered");
                self.events
                    .push(RegistryEvent::Deregistered { name: name.to_string(), address });
            }
        }
        Ok(())
    }

    /// Grants or revokes authority for `identity`. Master only; the master itself cannot lose
    /// authority this way.
    pub fn toggle_authority(
        &mut self,
        caller: &Address,
        identity: Address,
    ) -> Result<bool, RegistryError> {
        self.ensure_master(caller)?;
        if identity == self.master {
            return Err(RegistryError::Unauthorized(identity));
        }
        let enabled = if self.authorities.remove(&identity) {
            false
        } else {
            self.authorities.insert(identity);
            true
        };
        debug!(%identity, enabled, "Authority toggled");
        self.events
            .push(RegistryEvent::AuthorityToggled { identity, enabled });
        Ok(enabled)
    }

    pub fn transfer_master(&mut self, caller: &Address, new: Address) -> Result<(), RegistryError> {
        self.ensure_master(caller)?;
        let old = self.master;
        self.authorities.remove(&old);
        self.authorities.insert(new);
        self.master = new;
        info!(%old, %new, "Registry master transferred");
        self.events
            .push(RegistryEvent::MasterTransferred { old, new });
        Ok(())
    }

    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    fn ensure_authority(&self, caller: &Address) -> Result<(), RegistryError> {
        if !self.is_authority(caller) {
            warn!(%caller, "Rejected registry mutation from non-authority");
            return Err(RegistryError::Unauthorized(*caller));
        }
        Ok(())
    }

    fn ensure_master(&self, caller: &Address) -> Result<(), RegistryError> {
        if *caller != self.master {
            warn!(%caller, "Rejected master-only registry call");
            return Err(RegistryError::Unauthorized(*caller));
        }
        Ok(())
    }

    fn ensure_enabled(&self, name: &str) -> Result<(), RegistryError> {
        self.resolve(name)
            .map(|_| ())
            .map_err(|_| RegistryError::UnknownModule(name.to_string()))
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{admin, module_address, outsider, FailingConnector};

    fn handle(byte: u8) -> ModuleHandle {
        ModuleHandle::new(module_address(byte), Arc::new(FailingConnector::new("boom")))
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ModuleRegistry::new(admin());

        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();

        assert_eq!(
            registry
                .resolve("FAIL-A")
                .unwrap()
                .address(),
            module_address(1)
        );
        assert_eq!(registry.registration("FAIL-A"), Some(&ModuleRegistration::new("FAIL-A", module_address(1))));
    }

    #[test]
    fn test_register_taken_name_fails() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();

        let err = registry
            .register(&admin(), "FAIL-A", handle(2))
            .unwrap_err();

        assert_eq!(err, RegistryError::AlreadyRegistered("FAIL-A".to_string()));
        assert_eq!(registry.resolve("FAIL-A").unwrap().address(), module_address(1));
    }

    #[test]
    fn test_register_many_is_all_or_nothing() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-B", handle(2))
            .unwrap();

        let err = registry
            .register_many(
                &admin(),
                vec![("FAIL-A".to_string(), handle(1)), ("FAIL-B".to_string(), handle(3))],
            )
            .unwrap_err();

        assert_eq!(err, RegistryError::AlreadyRegistered("FAIL-B".to_string()));
        assert!(registry.resolve("FAIL-A").is_err());
    }

    #[test]
    fn test_update_replaces_address_and_emits_old_and_new() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();

        registry
            .update(&admin(), "FAIL-A", handle(2))
            .unwrap();

        let registration = registry.registration("FAIL-A").unwrap();
        assert_eq!(registration.address, module_address(2));
        assert_eq!(registration.version, 2);
        assert_eq!(
            registry.events().last(),
            Some(&RegistryEvent::Updated {
                name: "FAIL-A".to_string(),
                old: module_address(1),
                new: module_address(2),
                version: 2,
            })
        );
    }

    #[test]
    fn test_update_unknown_module_fails() {
        let mut registry = ModuleRegistry::new(admin());

        let err = registry
            .update(&admin(), "FAIL-A", handle(1))
            .unwrap_err();

        assert_eq!(err, RegistryError::UnknownModule("FAIL-A".to_string()));
    }

    #[test]
    fn test_deregister_disables_resolution() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();

        registry
            .deregister(&admin(), "FAIL-A")
            .unwrap();

        assert_eq!(registry.resolve("FAIL-A").unwrap_err(), RegistryError::NotFound("FAIL-A".to_string()));
        assert!(!registry.registration("FAIL-A").unwrap().enabled);
        assert_eq!(
            registry.deregister(&admin(), "FAIL-A"),
            Err(RegistryError::UnknownModule("FAIL-A".to_string()))
        );
    }

    #[test]
    fn test_deregister_many_rejects_repeated_names() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();
        registry
            .register(&admin(), "FAIL-B", handle(2))
            .unwrap();
        let registered = registry.events().len();

        let err = registry
            .deregister_many(&admin(), &["FAIL-A", "FAIL-B", "FAIL-A"])
            .unwrap_err();

        assert_eq!(err, RegistryError::UnknownModule("FAIL-A".to_string()));
        assert_eq!(registry.events().len(), registered);
        assert!(registry.resolve("FAIL-A").is_ok());
        assert!(registry.resolve("FAIL-B").is_ok());
    }

    #[test]
    fn test_reregister_bumps_version() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();
        registry
            .deregister(&admin(), "FAIL-A")
            .unwrap();

        registry
            .register(&admin(), "FAIL-A", handle(4))
            .unwrap();

        let registration = registry.registration("FAIL-A").unwrap();
        assert!(registration.enabled);
        assert_eq!(registration.version, 2);
        assert_eq!(registration.address, module_address(4));
    }

    #[test]
    fn test_mutations_require_authority() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();
        let unauthorized = Err(RegistryError::Unauthorized(outsider()));

        assert_eq!(registry.register(&outsider(), "FAIL-B", handle(2)), unauthorized);
        assert_eq!(registry.update(&outsider(), "FAIL-A", handle(2)), unauthorized);
        assert_eq!(registry.deregister(&outsider(), "FAIL-A"), unauthorized);
        assert_eq!(registry.events().len(), 1);
    }

    #[test]
    fn test_toggled_authority_can_register() {
        let mut registry = ModuleRegistry::new(admin());

        assert_eq!(registry.toggle_authority(&admin(), outsider()), Ok(true));
        registry
            .register(&outsider(), "FAIL-A", handle(1))
            .unwrap();
        assert_eq!(registry.toggle_authority(&admin(), outsider()), Ok(false));

        assert!(!registry.is_authority(&outsider()));
        assert_eq!(
            registry.toggle_authority(&outsider(), admin()),
            Err(RegistryError::Unauthorized(outsider()))
        );
    }

    #[test]
    fn test_transfer_master() {
        let mut registry = ModuleRegistry::new(admin());

        registry
            .transfer_master(&admin(), outsider())
            .unwrap();

        assert_eq!(registry.master(), outsider());
        assert!(!registry.is_authority(&admin()));
        assert_eq!(
            registry.register(&admin(), "FAIL-A", handle(1)),
            Err(RegistryError::Unauthorized(admin()))
        );
    }

    #[test]
    fn test_is_registered_reports_addresses() {
        let mut registry = ModuleRegistry::new(admin());
        registry
            .register(&admin(), "FAIL-A", handle(1))
            .unwrap();

        let (ok, addresses) = registry.is_registered(&["FAIL-A", "MISSING"]);

        assert!(!ok);
        assert_eq!(addresses, vec![Some(module_address(1)), None]);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut registry = ModuleRegistry::new(admin());

        assert_eq!(
            registry.register(&admin(), "", handle(1)),
            Err(RegistryError::InvalidName(String::new()))
        );
        assert_eq!(
            registry.register(&admin(), "FAIL A", handle(1)),
            Err(RegistryError::InvalidName("FAIL A".to_string()))
        );
    }
}
