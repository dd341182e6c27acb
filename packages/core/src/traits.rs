//! Core traits: SecretStore, Fio.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Attributes, Caller, DirEntry, FsError, OpenFlags, Path};

/// A secret-management backend, seen as a directory tree.
///
/// Secrets are directories whose entries are the secret's keys; the keys are
/// regular files holding the values. Intermediate path components are
/// directories. Every call is made on behalf of `caller` and must be
/// authorized as that identity.
///
/// Exactly one store is active per process. Implementations are shared
/// across concurrently served calls, hence `&self`.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn SecretStore>`.
pub trait SecretStore: Send + Sync {
    /// Attributes of the node at `path`.
    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError>;

    /// Entries of the directory at `path`.
    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError>;

    /// Full content of the secret key at `path`.
    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError>;

    /// Short name of the backend, as used in configuration.
    fn describe(&self) -> &str;
}

/// A file-I/O provider owning one top-level namespace.
///
/// Paths handed to a FIO are relative to its namespace root; the empty path
/// is the namespace directory itself.
pub trait Fio: Send + Sync {
    /// The name this provider is mounted under, below the filesystem root.
    fn namespace(&self) -> &str;

    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError>;

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError>;

    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError>;
}

/// Replace every character that cannot appear in a file name.
///
/// Backend key names may contain `/`; each occurrence becomes `substitute`.
/// This is applied on exposure only and is not reversible: lookups compare
/// the exposed form.
pub fn expose_key(key: &str, substitute: char) -> String {
    key.chars()
        .map(|c| if c == '/' { substitute } else { c })
        .collect()
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        self.as_ref().attributes(path, caller)
    }

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        self.as_ref().list(path, caller)
    }

    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        self.as_ref().open(path, flags, caller)
    }

    fn describe(&self) -> &str {
        self.as_ref().describe()
    }
}

impl<T: Fio + ?Sized> Fio for Box<T> {
    fn namespace(&self) -> &str {
        self.as_ref().namespace()
    }

    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        self.as_ref().attributes(path, caller)
    }

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        self.as_ref().list(path, caller)
    }

    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        self.as_ref().open(path, flags, caller)
    }
}
