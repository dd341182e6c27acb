//! # secretsfs-fio
//!
//! The file-I/O providers mounted below the SecretsFS root.
//!
//! - [`SecretsFio`] (`secrets/`): the active store's tree as-is
//! - [`TemplatesFio`] (`templates/`): local template files rendered with
//!   secrets fetched as the reading user
//!
//! Providers are registered explicitly at startup:
//!
//! ```ignore
//! let mut registry = Registry::new();
//! secretsfs_fio::register_builtin(&mut registry, &FioConfig::default(), store.clone())?;
//! let fs = new_filesystem(registry, store);
//! ```

use std::sync::Arc;

use secretsfs_core::{Fio, Registry, RegistryError, SecretStore};

pub mod config;
pub mod template;

mod secrets;
mod templates;

pub use config::{FioConfig, TemplatesConfig};
pub use secrets::{SecretsFio, SECRETS_NAMESPACE};
pub use template::{RenderError, SecretSource, Template, TemplateError};
pub use templates::{TemplateContext, TemplatesFio, TEMPLATES_NAMESPACE};

/// Names of the providers this crate can build.
pub const AVAILABLE_FIOS: &[&str] = &[SECRETS_NAMESPACE, TEMPLATES_NAMESPACE];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown FIO '{name}' (available: {})", AVAILABLE_FIOS.join(", "))]
    UnknownFio { name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Construct the provider called `name`.
pub fn build_fio(
    name: &str,
    config: &FioConfig,
    store: Arc<dyn SecretStore>,
) -> Result<Arc<dyn Fio>, Error> {
    match name {
        SECRETS_NAMESPACE => Ok(Arc::new(SecretsFio::new(store))),
        TEMPLATES_NAMESPACE => Ok(Arc::new(TemplatesFio::from_config(
            &config.templates,
            store,
        ))),
        _ => Err(Error::UnknownFio {
            name: name.to_string(),
        }),
    }
}

/// Register every provider enabled in `config`.
pub fn register_builtin(
    registry: &mut Registry,
    config: &FioConfig,
    store: Arc<dyn SecretStore>,
) -> Result<(), Error> {
    for name in &config.enabled {
        let fio = build_fio(name, config, Arc::clone(&store))?;
        registry.register(fio)?;
        tracing::info!(namespace = %name, "enabled FIO");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secretsfs_core::{Attributes, Bytes, Caller, DirEntry, FsError, OpenFlags, Path};

    struct NoStore;

    impl SecretStore for NoStore {
        fn attributes(&self, _: &Path, _: &Caller) -> Result<Attributes, FsError> {
            Err(FsError::NotFound)
        }

        fn list(&self, _: &Path, _: &Caller) -> Result<Vec<DirEntry>, FsError> {
            Err(FsError::NotFound)
        }

        fn open(&self, _: &Path, _: OpenFlags, _: &Caller) -> Result<Bytes, FsError> {
            Err(FsError::NotFound)
        }

        fn describe(&self) -> &str {
            "none"
        }
    }

    #[test]
    fn registers_enabled_fios() {
        let mut registry = Registry::new();
        register_builtin(&mut registry, &FioConfig::default(), Arc::new(NoStore)).unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["secrets", "templates"]
        );
    }

    #[test]
    fn unknown_fio_is_rejected() {
        let config = FioConfig {
            enabled: vec!["secrets".to_string(), "ssh".to_string()],
            ..Default::default()
        };
        let err = register_builtin(&mut Registry::new(), &config, Arc::new(NoStore)).unwrap_err();
        assert!(matches!(err, Error::UnknownFio { ref name } if name == "ssh"));
        assert!(err.to_string().contains("secrets, templates"));
    }

    #[test]
    fn duplicate_fio_is_rejected() {
        let config = FioConfig {
            enabled: vec!["secrets".to_string(), "secrets".to_string()],
            ..Default::default()
        };
        let err = register_builtin(&mut Registry::new(), &config, Arc::new(NoStore)).unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::DuplicateNamespace { .. })
        ));
    }
}
