//! The filesystem root: namespace listing and routing to FIOs.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Attributes, Caller, DirEntry, Fio, FsError, OpenFlags, Path, Registry, SecretStore};

/// The root of the mounted tree.
///
/// The root directory lists one entry per registered namespace. Every other
/// path is routed to the FIO owning its first component, which receives the
/// remainder. Routing is an exact, case-sensitive match on that component.
pub struct SecretsFs {
    registry: Registry,
    store: Arc<dyn SecretStore>,
}

/// Build the filesystem root from a populated registry and the active store.
pub fn new_filesystem(registry: Registry, store: Arc<dyn SecretStore>) -> SecretsFs {
    SecretsFs { registry, store }
}

impl SecretsFs {
    /// The active store.
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn route<'a>(&'a self, path: &Path) -> Result<(&'a Arc<dyn Fio>, Path), FsError> {
        let (namespace, rest) = path.split_first().ok_or(FsError::IsDirectory)?;
        match self.registry.get(namespace) {
            Some(fio) => Ok((fio, rest)),
            None => {
                tracing::debug!(%path, namespace, "no FIO registered for namespace");
                Err(FsError::NotFound)
            }
        }
    }

    pub fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        tracing::debug!(%path, uid = caller.uid, "attributes");
        if path.is_empty() {
            return Ok(Attributes::directory());
        }
        let (fio, rest) = self.route(path)?;
        fio.attributes(&rest, caller)
    }

    pub fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        tracing::debug!(%path, uid = caller.uid, "list");
        if path.is_empty() {
            return Ok(self.registry.names().map(DirEntry::directory).collect());
        }
        let (fio, rest) = self.route(path)?;
        fio.list(&rest, caller)
    }

    /// Materialize the full content of the file at `path`.
    ///
    /// The root and the namespace directories are not readable as files.
    pub fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        tracing::debug!(%path, uid = caller.uid, flags = flags.bits(), "open");
        let (fio, rest) = self.route(path)?;
        if rest.is_empty() {
            return Err(FsError::IsDirectory);
        }
        fio.open(&rest, flags, caller)
    }
}
