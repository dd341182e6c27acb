//! The FIO registry: namespace name to provider.
//!
//! Populated once during startup and then handed to the root dispatcher,
//! which only ever reads it. Since nothing mutates it while the filesystem
//! is serving, no locking is involved.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Fio, Path, RegistryError};

/// Mapping from namespace name to the provider mounted there.
#[derive(Default, Clone)]
pub struct Registry {
    providers: BTreeMap<String, Arc<dyn Fio>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own namespace name.
    ///
    /// Fails if the name is taken or is not a single path component.
    pub fn register(&mut self, provider: Arc<dyn Fio>) -> Result<(), RegistryError> {
        let name = provider.namespace().to_string();

        let valid = Path::parse(&name).map(|p| p.len() == 1).unwrap_or(false);
        if !valid {
            return Err(RegistryError::InvalidNamespace { name });
        }

        if self.providers.contains_key(&name) {
            return Err(RegistryError::DuplicateNamespace { name });
        }

        tracing::debug!(namespace = %name, "registered FIO");
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Provider owning `name`, matched exactly and case-sensitively.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Fio>> {
        self.providers.get(name)
    }

    /// All registered namespace names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// The full mapping, for enumeration.
    pub fn all(&self) -> &BTreeMap<String, Arc<dyn Fio>> {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
