//! The `templates` namespace: local template files, rendered on open.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use secretsfs_core::{
    Attributes, Bytes, Caller, DirEntry, Fio, FsError, OpenFlags, Path, SecretStore,
};

use crate::config::TemplatesConfig;
use crate::template::{SecretSource, Template};

pub const TEMPLATES_NAMESPACE: &str = "templates";

/// Exposes a local directory of templates; each file reads as its rendered
/// output.
///
/// Secrets are fetched from the store as the caller who opens the file, so
/// two users reading the same template may see different content, or an
/// error.
pub struct TemplatesFio {
    base_dir: PathBuf,
    store: Arc<dyn SecretStore>,
}

/// Per-open rendering context: `.Get` runs as the opening caller, with the
/// flags of that open.
pub struct TemplateContext<'a> {
    store: &'a dyn SecretStore,
    caller: &'a Caller,
    flags: OpenFlags,
}

impl<'a> TemplateContext<'a> {
    pub fn new(store: &'a dyn SecretStore, caller: &'a Caller, flags: OpenFlags) -> Self {
        Self {
            store,
            caller,
            flags,
        }
    }
}

impl SecretSource for TemplateContext<'_> {
    fn get(&self, path: &str) -> Result<Bytes, FsError> {
        let path = Path::parse(path)?;
        self.store.open(&path, self.flags, self.caller)
    }
}

fn stat_error(error: io::Error) -> FsError {
    match error.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENOTDIR) => FsError::NotFound,
        _ => FsError::ResourceBusy,
    }
}

impl TemplatesFio {
    pub fn new(base_dir: impl Into<PathBuf>, store: Arc<dyn SecretStore>) -> Self {
        Self {
            base_dir: base_dir.into(),
            store,
        }
    }

    pub fn from_config(config: &TemplatesConfig, store: Arc<dyn SecretStore>) -> Self {
        Self::new(&config.path, store)
    }

    fn local_path(&self, path: &Path) -> PathBuf {
        let mut local = self.base_dir.clone();
        local.extend(path.iter());
        local
    }

    fn metadata(&self, path: &Path) -> Result<(PathBuf, fs::Metadata), FsError> {
        let local = self.local_path(path);
        match fs::metadata(&local) {
            Ok(metadata) => Ok((local, metadata)),
            Err(e) => {
                let error = stat_error(e);
                if error == FsError::ResourceBusy {
                    tracing::warn!(path = %local.display(), "cannot stat template");
                }
                Err(error)
            }
        }
    }
}

impl Fio for TemplatesFio {
    fn namespace(&self) -> &str {
        TEMPLATES_NAMESPACE
    }

    fn attributes(&self, path: &Path, _caller: &Caller) -> Result<Attributes, FsError> {
        if path.is_empty() {
            return Ok(Attributes::directory());
        }

        let (_, metadata) = self.metadata(path)?;
        if metadata.is_dir() {
            Ok(Attributes::directory())
        } else if metadata.is_file() {
            Ok(Attributes::on_demand_file())
        } else {
            Err(FsError::InvalidArgument)
        }
    }

    fn list(&self, path: &Path, _caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        let (local, metadata) = self.metadata(path)?;
        if !metadata.is_dir() {
            return Err(FsError::NotDirectory);
        }

        let entries = fs::read_dir(&local).map_err(|e| {
            tracing::warn!(path = %local.display(), error = %e, "cannot list templates");
            FsError::ResourceBusy
        })?;

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                tracing::warn!(path = %local.display(), error = %e, "cannot list templates");
                FsError::ResourceBusy
            })?;
            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 name");
                continue;
            };
            match fs::metadata(entry.path()) {
                Ok(m) if m.is_dir() => listing.push(DirEntry::directory(name)),
                Ok(m) if m.is_file() => listing.push(DirEntry::file(name)),
                _ => {}
            }
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn open(&self, path: &Path, flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        let (local, metadata) = self.metadata(path)?;
        if metadata.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if !metadata.is_file() {
            return Err(FsError::InvalidArgument);
        }

        let source = fs::read(&local).map_err(|e| {
            tracing::warn!(path = %local.display(), error = %e, "cannot read template");
            FsError::ResourceBusy
        })?;

        let template = Template::parse_bytes(&source).map_err(|e| {
            tracing::warn!(path = %local.display(), error = %e, "cannot parse template");
            FsError::RemoteIo
        })?;

        tracing::debug!(
            path = %local.display(),
            uid = caller.uid,
            secrets = ?template.secret_paths().collect::<Vec<_>>(),
            "rendering template"
        );
        let context = TemplateContext::new(self.store.as_ref(), caller, flags);
        let rendered = template.render(&context).map_err(|e| {
            tracing::warn!(
                path = %local.display(),
                uid = caller.uid,
                error = %e,
                "cannot render template"
            );
            e.fs_error()
        })?;

        Ok(Bytes::from(rendered))
    }
}
