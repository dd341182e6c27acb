//! The `secrets` namespace: the store's tree, unchanged.

use std::sync::Arc;

use secretsfs_core::{
    Attributes, Bytes, Caller, DirEntry, Fio, FsError, OpenFlags, Path, SecretStore,
};

pub const SECRETS_NAMESPACE: &str = "secrets";

/// Forwards every call to the active store.
pub struct SecretsFio {
    store: Arc<dyn SecretStore>,
}

impl SecretsFio {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

impl Fio for SecretsFio {
    fn namespace(&self) -> &str {
        SECRETS_NAMESPACE
    }

    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        self.store.attributes(path, caller)
    }

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        self.store.list(path, caller)
    }

    /// Empty content is not a readable secret here.
    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        let content = self.store.open(path, flags, caller)?;
        if content.is_empty() {
            tracing::debug!(%path, "store returned no content");
            return Err(FsError::IsDirectory);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secretsfs_core::path;

    struct FixedStore;

    impl SecretStore for FixedStore {
        fn attributes(&self, path: &Path, _: &Caller) -> Result<Attributes, FsError> {
            match path.to_string().as_str() {
                "" | "db" => Ok(Attributes::directory()),
                "db/password" => Ok(Attributes::file(6)),
                _ => Err(FsError::NotFound),
            }
        }

        fn list(&self, path: &Path, _: &Caller) -> Result<Vec<DirEntry>, FsError> {
            match path.to_string().as_str() {
                "db" => Ok(vec![DirEntry::file("password"), DirEntry::file("empty")]),
                _ => Err(FsError::NotFound),
            }
        }

        fn open(&self, path: &Path, _: OpenFlags, _: &Caller) -> Result<Bytes, FsError> {
            match path.to_string().as_str() {
                "db/password" => Ok(Bytes::from_static(b"s3cret")),
                "db/empty" => Ok(Bytes::new()),
                "db/hidden" => Err(FsError::PermissionDenied),
                _ => Err(FsError::NotFound),
            }
        }

        fn describe(&self) -> &str {
            "fixed"
        }
    }

    fn caller() -> Caller {
        Caller::new(1000, 1000, "alice", "/home/alice")
    }

    #[test]
    fn forwards_to_store() {
        let fio = SecretsFio::new(Arc::new(FixedStore));
        assert_eq!(fio.namespace(), "secrets");
        assert!(fio.attributes(&path!(""), &caller()).unwrap().is_dir());
        assert_eq!(fio.list(&path!("db"), &caller()).unwrap().len(), 2);
        assert_eq!(
            &fio.open(&path!("db/password"), OpenFlags::READ_ONLY, &caller()).unwrap()[..],
            b"s3cret"
        );
        assert_eq!(
            fio.open(&path!("db/hidden"), OpenFlags::READ_ONLY, &caller()),
            Err(FsError::PermissionDenied)
        );
    }

    #[test]
    fn empty_content_is_not_a_file() {
        let fio = SecretsFio::new(Arc::new(FixedStore));
        assert_eq!(
            fio.open(&path!("db/empty"), OpenFlags::READ_ONLY, &caller()),
            Err(FsError::IsDirectory)
        );
    }
}
