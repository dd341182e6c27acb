//! # secretsfs-vault
//!
//! A [`SecretStore`](secretsfs_core::SecretStore) backed by a KV (version 2)
//! secret engine reached over HTTP.
//!
//! Every call runs as the calling user. The user's role identifier is read
//! from a file it owns (by default `$HOME/.vault-roleid`) and exchanged for a
//! session token, which is cached per uid in memory.
//!
//! ```ignore
//! use secretsfs_vault::{VaultConfig, VaultStore};
//!
//! let store = VaultStore::new(VaultConfig::default(), '_')?;
//! let caller = Caller::new(1000, 1000, "alice", "/home/alice");
//! let password = store.open(&Path::parse("db/password")?, OpenFlags::READ_ONLY, &caller)?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod roleid;
pub mod session;

mod store;

pub use client::VaultClient;
pub use config::{RoleIdConfig, TlsConfig, VaultConfig};
pub use error::Error;
pub use session::{Session, SessionCache};
pub use store::{VaultStore, STORE_NAME};
