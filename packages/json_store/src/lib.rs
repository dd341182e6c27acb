//! # secretsfs-json-store
//!
//! A [`SecretStore`] backed by a JSON document on local disk.
//!
//! The document maps secret paths to key/value maps, optionally restricted to
//! a list of readers:
//!
//! ```json
//! {
//!   "secrets": {
//!     "db": {"data": {"username": "admin", "password": "hunter2"}},
//!     "app/web": {"data": {"tls/key": "..."}, "readers": ["www"]}
//!   }
//! }
//! ```
//!
//! The tree follows the same rules as the KV backend: `db` and `app/web` are
//! directories of key files, `app` is an intermediate directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path as FsPath, PathBuf};

use serde::{Deserialize, Serialize};

use secretsfs_core::kv::{self, SecretData};
use secretsfs_core::{
    Attributes, Bytes, Caller, DirEntry, FsError, OpenFlags, Path, PathError, SecretStore,
};

pub const STORE_NAME: &str = "json";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid secret path: {0}")]
    Path(#[from] PathError),
}

/// Configuration for the JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonStoreConfig {
    pub path: PathBuf,
}

impl Default for JsonStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/secretsfs/secrets.json"),
        }
    }
}

/// On-disk document layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretEntry>,
}

/// One secret: its key/value map and who may read it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretEntry {
    #[serde(default)]
    pub data: SecretData,

    /// Usernames allowed to read the data. `None` means everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readers: Option<Vec<String>>,
}

impl SecretEntry {
    fn readable_by(&self, caller: &Caller) -> bool {
        self.readers
            .as_ref()
            .map_or(true, |readers| readers.iter().any(|r| r == &caller.username))
    }
}

/// Secrets held in memory, loaded from a JSON document.
///
/// # Example
///
/// ```rust
/// use secretsfs_json_store::JsonStore;
/// use secretsfs_core::{Caller, SecretStore, OpenFlags, path};
///
/// let mut store = JsonStore::new('_');
/// store
///     .insert("db", serde_json::json!({"username": "admin"}), None)
///     .unwrap();
///
/// let caller = Caller::new(1000, 1000, "alice", "/home/alice");
/// let value = store
///     .open(&path!("db/username"), OpenFlags::READ_ONLY, &caller)
///     .unwrap();
/// assert_eq!(&value[..], b"admin");
/// ```
pub struct JsonStore {
    secrets: BTreeMap<Path, SecretEntry>,
    substitute: char,
}

impl JsonStore {
    /// Create an empty store.
    pub fn new(substitute: char) -> Self {
        Self {
            secrets: BTreeMap::new(),
            substitute,
        }
    }

    /// Load a store from a parsed document.
    pub fn from_document(document: Document, substitute: char) -> Result<Self, Error> {
        let mut store = Self::new(substitute);
        for (path, entry) in document.secrets {
            store.secrets.insert(Path::parse(&path)?, entry);
        }
        Ok(store)
    }

    /// Load a store from a JSON file.
    pub fn from_file(path: &FsPath, substitute: char) -> Result<Self, Error> {
        tracing::debug!(path = %path.display(), "loading JSON secrets");
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Document = serde_json::from_str(&text)?;
        Self::from_document(document, substitute)
    }

    /// Load a store as configured.
    pub fn from_config(config: &JsonStoreConfig, substitute: char) -> Result<Self, Error> {
        Self::from_file(&config.path, substitute)
    }

    /// Add or replace the secret at `path`.
    ///
    /// `data` must be a JSON object; anything else stores an empty secret.
    pub fn insert(
        &mut self,
        path: &str,
        data: serde_json::Value,
        readers: Option<Vec<String>>,
    ) -> Result<(), Error> {
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => SecretData::new(),
        };
        self.secrets
            .insert(Path::parse(path)?, SecretEntry { data, readers });
        Ok(())
    }

    /// The secret at `path`, if the caller may read it.
    fn secret(&self, path: &Path, caller: &Caller) -> Result<Option<&SecretData>, FsError> {
        match self.secrets.get(path) {
            Some(entry) if entry.readable_by(caller) => Ok(Some(&entry.data)),
            Some(_) => {
                tracing::warn!(%path, user = %caller.username, "caller is not a reader");
                Err(FsError::PermissionDenied)
            }
            None => Ok(None),
        }
    }

    /// Names of the sub-directories directly below `path`.
    fn folders(&self, path: &Path) -> Option<BTreeSet<String>> {
        let children: BTreeSet<String> = self
            .secrets
            .keys()
            .filter(|p| p.len() > path.len() && p.has_prefix(path))
            .map(|p| p[path.len()].clone())
            .collect();
        if children.is_empty() {
            None
        } else {
            Some(children)
        }
    }
}

impl SecretStore for JsonStore {
    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        if path.is_empty() || self.secrets.contains_key(path) || self.folders(path).is_some() {
            return Ok(Attributes::directory());
        }

        let (parent, name) = path.split_last().ok_or(FsError::NotFound)?;
        let data = self.secret(&parent, caller)?.ok_or(FsError::NotFound)?;
        let value = kv::find_key(data, name, self.substitute).ok_or(FsError::NotFound)?;
        Ok(Attributes::file(kv::value_bytes(value).len() as u64))
    }

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        let folders = self.folders(path);
        let keys = if path.is_empty() {
            None
        } else {
            self.secret(path, caller)?
        };

        if folders.is_none() && keys.is_none() {
            if path.is_empty() {
                return Ok(Vec::new());
            }
            return match self.attributes(path, caller) {
                Ok(_) => Err(FsError::NotDirectory),
                Err(e) => Err(e),
            };
        }

        let folder_entries = folders
            .into_iter()
            .flatten()
            .map(DirEntry::directory);
        let key_entries = keys
            .into_iter()
            .flat_map(|data| kv::key_entries(data, self.substitute));
        Ok(kv::merge_entries(folder_entries.chain(key_entries)))
    }

    fn open(&self, path: &Path, _flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        if path.is_empty() {
            return Err(FsError::IsDirectory);
        }

        let (parent, name) = path.split_last().ok_or(FsError::IsDirectory)?;
        if let Some(data) = self.secret(&parent, caller)? {
            if let Some(value) = kv::find_key(data, name, self.substitute) {
                return Ok(kv::value_bytes(value));
            }
        }

        if self.secrets.contains_key(path) || self.folders(path).is_some() {
            Err(FsError::IsDirectory)
        } else {
            Err(FsError::NotFound)
        }
    }

    fn describe(&self) -> &str {
        STORE_NAME
    }
}
