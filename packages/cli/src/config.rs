//! The configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use secretsfs_fio::FioConfig;
use secretsfs_json_store::JsonStoreConfig;
use secretsfs_vault::VaultConfig;

/// The defaults, as a configuration file.
pub const DEFAULT_CONFIG: &str = r#"[general]
# Replaces '/' inside secret key names.
substitution_char = "_"

[fio]
enabled = ["secrets", "templates"]

[fio.templates]
path = "/etc/secretsfs/templates/"

[store]
enabled = "vault"

[store.vault]
addr = "http://127.0.0.1:8200"
metadata_prefix = "secret/metadata/"
data_prefix = "secret/data/"
login_path = "auth/approle/login"
timeout_secs = 10

[store.vault.role_id]
# $HOME is the home directory of the reading user.
file = "$HOME/.vault-roleid"

# username = "/path/to/roleid"; replaces `file` for that user.
[store.vault.role_id.user_override]

[store.vault.tls]
# ca_cert = "/etc/ssl/vault-ca.pem"
# ca_path = "/etc/ssl/vault-cas/"
# client_cert = "/etc/secretsfs/client.pem"
# client_key = "/etc/secretsfs/client.key"
# server_name = "vault.internal"
insecure = false

[store.json]
path = "/etc/secretsfs/secrets.json"
"#;

const FILE_NAME: &str = "secretsfs.toml";
const SYSTEM_DIR: &str = "/etc/secretsfs";
const USER_DIR: &str = ".secretsfs";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub fio: FioConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub substitution_char: char,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            substitution_char: '_',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the active store.
    pub enabled: String,
    pub vault: VaultConfig,
    pub json: JsonStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: secretsfs_vault::STORE_NAME.to_string(),
            vault: VaultConfig::default(),
            json: JsonStoreConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }

    /// Settings taken from the environment win over the file.
    pub fn apply_env(&mut self, vault_addr: Option<String>) {
        if let Some(addr) = vault_addr.filter(|a| !a.is_empty()) {
            tracing::debug!(%addr, "address taken from VAULT_ADDR");
            self.store.vault.addr = addr;
        }
    }

    /// Render one section, for introspection.
    pub fn section_toml<T: Serialize>(section: &T) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(section)?)
    }
}

/// Where a configuration file is looked for when none is given.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(USER_DIR).join(FILE_NAME));
    }
    paths.push(Path::new(SYSTEM_DIR).join(FILE_NAME));
    paths
}

/// Load the configuration.
///
/// An explicit path must be readable. Otherwise the first existing file of
/// `candidates` is used, or the defaults if there is none. `VAULT_ADDR` is
/// applied last.
pub fn load(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => candidates.iter().find(|p| p.is_file()).cloned(),
    };

    let mut config = match &source {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env(std::env::var("VAULT_ADDR").ok());
    Ok((config, source))
}
