//! Configuration for the KV backend.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Connection and layout of the KV secret engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Address of the backend, `http://` or `https://`.
    pub addr: String,

    /// Prefix below `/v1/` for metadata (listing) requests.
    pub metadata_prefix: String,

    /// Prefix below `/v1/` for data (read) requests.
    pub data_prefix: String,

    /// Path below `/v1/` of the role-id login endpoint.
    pub login_path: String,

    /// Upper bound for every backend request.
    pub timeout_secs: u64,

    pub role_id: RoleIdConfig,

    pub tls: TlsConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:8200".to_string(),
            metadata_prefix: "secret/metadata/".to_string(),
            data_prefix: "secret/data/".to_string(),
            login_path: "auth/approle/login".to_string(),
            timeout_secs: 10,
            role_id: RoleIdConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Where each caller's role identifier is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleIdConfig {
    /// Default location. `$HOME` is replaced by the caller's home directory.
    pub file: String,

    /// Per-username locations. An entry here replaces `file` for that user
    /// entirely; there is no fallback.
    pub user_override: BTreeMap<String, String>,
}

impl Default for RoleIdConfig {
    fn default() -> Self {
        Self {
            file: "$HOME/.vault-roleid".to_string(),
            user_override: BTreeMap::new(),
        }
    }
}

/// TLS material for talking to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM-encoded CA bundle.
    pub ca_cert: Option<PathBuf>,

    /// Directory of PEM-encoded CA files.
    pub ca_path: Option<PathBuf>,

    /// Client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,

    /// Private key (PKCS#8 PEM) for `client_cert`.
    pub client_key: Option<PathBuf>,

    /// Host name to send as SNI and verify the server certificate against.
    pub server_name: Option<String>,

    /// Disable certificate verification.
    pub insecure: bool,
}
