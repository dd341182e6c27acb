//! SecretsFS core: the dispatch layer.
//!
//! Secrets held in a remote secret-management backend are exposed as a
//! read-only file tree. This crate holds everything that does not depend on
//! a particular backend or kernel transport:
//! - `Caller`: the identity a call runs as, resolved per request
//! - `Path`: validated slash-separated paths
//! - `SecretStore`: a backend seen as a directory tree
//! - `Fio`: a provider owning one top-level namespace
//! - `Registry` and `SecretsFs`: namespace registration and routing
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use secretsfs_core::{new_filesystem, Registry, SecretStore, Caller, path};
//!
//! fn root_names(store: Arc<dyn SecretStore>) -> Vec<String> {
//!     let fs = new_filesystem(Registry::new(), store);
//!     let caller = Caller::new(1000, 1000, "alice", "/home/alice");
//!     fs.list(&path!(""), &caller)
//!         .unwrap()
//!         .into_iter()
//!         .map(|e| e.name)
//!         .collect()
//! }
//! ```

pub use bytes::Bytes;

mod attrs;
mod error;
mod filesystem;
mod identity;
pub mod kv;
mod path;
mod registry;
mod traits;

pub use attrs::{Attributes, DirEntry, FileKind, OpenFlags, DIR_PERMISSIONS, FILE_PERMISSIONS};
pub use error::{FsError, RegistryError};
pub use filesystem::{new_filesystem, SecretsFs};
pub use identity::{Caller, PasswdDirectory, UserDirectory};
pub use path::{Path, PathError};
pub use registry::Registry;
pub use traits::{expose_key, Fio, SecretStore};
