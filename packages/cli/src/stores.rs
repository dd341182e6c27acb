//! Selecting the active store.

use std::sync::Arc;

use secretsfs_core::SecretStore;
use secretsfs_json_store::JsonStore;
use secretsfs_vault::VaultStore;

use crate::config::Config;
use crate::Error;

/// Names of the stores this binary can run with.
pub const AVAILABLE_STORES: &[&str] = &[secretsfs_vault::STORE_NAME, secretsfs_json_store::STORE_NAME];

/// Build the store named by `store.enabled`.
pub fn build_store(config: &Config) -> Result<Arc<dyn SecretStore>, Error> {
    let substitute = config.general.substitution_char;
    let store: Arc<dyn SecretStore> = match config.store.enabled.as_str() {
        secretsfs_vault::STORE_NAME => {
            Arc::new(VaultStore::new(config.store.vault.clone(), substitute)?)
        }
        secretsfs_json_store::STORE_NAME => {
            Arc::new(JsonStore::from_config(&config.store.json, substitute)?)
        }
        other => {
            return Err(Error::UnknownStore {
                name: other.to_string(),
            })
        }
    };
    tracing::info!(store = store.describe(), "store enabled");
    Ok(store)
}

/// The configuration section of the active store.
pub fn store_section(config: &Config) -> Result<String, Error> {
    let section = match config.store.enabled.as_str() {
        secretsfs_vault::STORE_NAME => Config::section_toml(&config.store.vault)?,
        secretsfs_json_store::STORE_NAME => Config::section_toml(&config.store.json)?,
        other => {
            return Err(Error::UnknownStore {
                name: other.to_string(),
            })
        }
    };
    Ok(section)
}
