//! Locating and reading a caller's role identifier.
//!
//! The file is provisioned by the caller, not by the daemon. A file in the
//! caller's home has to be owned by the caller. Only locations an
//! administrator configured per user may be owned by root. The last path
//! component is never followed as a symlink, so a link in a home directory
//! cannot make the daemon read somebody else's credential.

use std::fs::{File, Metadata, OpenOptions};
use std::io::Read;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::PathBuf;

use secretsfs_core::Caller;

use crate::config::RoleIdConfig;
use crate::error::Error;

const HOME_VARIABLE: &str = "$HOME";

/// A role id location and who may own the file there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleIdFile {
    pub path: PathBuf,

    /// Set for administrator-configured overrides, which root may own.
    pub managed: bool,
}

impl RoleIdFile {
    /// A file in the caller's own space.
    pub fn user(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            managed: false,
        }
    }

    /// A file an administrator configured for the caller.
    pub fn managed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            managed: true,
        }
    }
}

/// Where the role id of `caller` is expected.
pub fn locate(config: &RoleIdConfig, caller: &Caller) -> RoleIdFile {
    let home = caller.home.to_string_lossy();
    match config.user_override.get(&caller.username) {
        Some(template) => RoleIdFile::managed(template.replace(HOME_VARIABLE, &home)),
        None => RoleIdFile::user(config.file.replace(HOME_VARIABLE, &home)),
    }
}

/// Read the role id in `file` on behalf of `caller`.
pub fn read_role_id(file: &RoleIdFile, caller: &Caller) -> Result<String, Error> {
    let fail = |message: String| Error::RoleId {
        path: file.path.clone(),
        message,
    };

    // O_NONBLOCK keeps a FIFO from stalling the open; it is rejected below.
    let mut handle = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(&file.path)
        .map_err(|e| match e.raw_os_error() {
            Some(libc::ELOOP) => fail("is a symbolic link".to_string()),
            _ => fail(e.to_string()),
        })?;

    let metadata = handle.metadata().map_err(|e| fail(e.to_string()))?;
    check(&metadata, file, caller).map_err(fail)?;

    let role_id = read_trimmed(&mut handle).map_err(|e| fail(e.to_string()))?;
    if role_id.is_empty() {
        return Err(fail("empty role id".to_string()));
    }
    Ok(role_id)
}

fn check(metadata: &Metadata, file: &RoleIdFile, caller: &Caller) -> Result<(), String> {
    if !metadata.is_file() {
        return Err("not a regular file".to_string());
    }

    let owner = metadata.uid();
    if owner != caller.uid && !(file.managed && owner == 0) {
        let expected = if file.managed {
            format!("{} or root", caller.uid)
        } else {
            caller.uid.to_string()
        };
        return Err(format!("owned by uid {}, expected {}", owner, expected));
    }

    if !readable_by(metadata, caller) {
        return Err(format!(
            "mode {:o} is not readable by uid {}",
            metadata.mode() & 0o777,
            caller.uid
        ));
    }
    Ok(())
}

/// Whether the permission bits let `caller` read the file.
fn readable_by(metadata: &Metadata, caller: &Caller) -> bool {
    let mode = metadata.mode();
    if metadata.uid() == caller.uid {
        mode & 0o400 != 0
    } else if metadata.gid() == caller.gid {
        mode & 0o040 != 0
    } else {
        mode & 0o004 != 0
    }
}

fn read_trimmed(handle: &mut File) -> std::io::Result<String> {
    let mut content = String::new();
    handle.read_to_string(&mut content)?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs::{self, Permissions};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn caller_owning(path: &Path) -> Caller {
        let metadata = fs::metadata(path).unwrap();
        Caller::new(metadata.uid(), metadata.gid(), "alice", "/home/alice")
    }

    fn role_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(".vault-roleid");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn default_location_substitutes_home() {
        let config = RoleIdConfig::default();
        let caller = Caller::new(1000, 1000, "alice", "/home/alice");
        assert_eq!(
            locate(&config, &caller),
            RoleIdFile::user("/home/alice/.vault-roleid")
        );
    }

    #[test]
    fn override_takes_precedence() {
        let config = RoleIdConfig {
            file: "$HOME/.vault-roleid".to_string(),
            user_override: BTreeMap::from([(
                "svc".to_string(),
                "/etc/secretsfs/roles/svc".to_string(),
            )]),
        };
        let svc = Caller::new(990, 990, "svc", "/var/lib/svc");
        let alice = Caller::new(1000, 1000, "alice", "/home/alice");
        assert_eq!(
            locate(&config, &svc),
            RoleIdFile::managed("/etc/secretsfs/roles/svc")
        );
        assert_eq!(
            locate(&config, &alice),
            RoleIdFile::user("/home/alice/.vault-roleid")
        );
    }

    #[test]
    fn reads_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "  3c5e-role\n");

        let role_id = read_role_id(&RoleIdFile::user(&path), &caller_owning(&path)).unwrap();
        assert_eq!(role_id, "3c5e-role");
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller_owning(dir.path());
        let err = read_role_id(&RoleIdFile::user(dir.path().join("absent")), &caller).unwrap_err();
        assert!(matches!(err, Error::RoleId { .. }));
    }

    #[test]
    fn empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "\n");
        assert!(read_role_id(&RoleIdFile::user(&path), &caller_owning(&path)).is_err());
    }

    #[test]
    fn directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller_owning(dir.path());
        assert!(read_role_id(&RoleIdFile::user(dir.path()), &caller).is_err());
    }

    #[test]
    fn symlink_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("svc-roleid");
        fs::write(&target, "svc-privileged-role").unwrap();
        let link = dir.path().join(".vault-roleid");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let caller = caller_owning(&target);
        for file in [RoleIdFile::user(&link), RoleIdFile::managed(&link)] {
            let err = read_role_id(&file, &caller).unwrap_err();
            assert!(err.to_string().contains("symbolic link"), "{}", err);
        }
    }

    #[test]
    fn foreign_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "role");

        let owner = fs::metadata(&path).unwrap().uid();
        let other = Caller::new(owner + 1, 0, "mallory", "/home/mallory");
        let err = read_role_id(&RoleIdFile::user(&path), &other).unwrap_err();
        assert!(err.to_string().contains("owned by uid"), "{}", err);

        if owner != 0 {
            let err = read_role_id(&RoleIdFile::managed(&path), &other).unwrap_err();
            assert!(err.to_string().contains("owned by uid"), "{}", err);
        }
    }

    #[test]
    fn root_owned_file_needs_an_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "svc-role");
        let metadata = fs::metadata(&path).unwrap();
        if metadata.uid() != 0 {
            // Only root can create a root-owned file.
            return;
        }
        fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();
        let svc = Caller::new(990, metadata.gid(), "svc", "/var/lib/svc");

        let err = read_role_id(&RoleIdFile::user(&path), &svc).unwrap_err();
        assert!(err.to_string().contains("owned by uid 0"), "{}", err);

        let role_id = read_role_id(&RoleIdFile::managed(&path), &svc).unwrap();
        assert_eq!(role_id, "svc-role");
    }

    #[test]
    fn root_owned_file_must_be_readable_by_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "svc-role");
        if fs::metadata(&path).unwrap().uid() != 0 {
            return;
        }
        fs::set_permissions(&path, Permissions::from_mode(0o600)).unwrap();
        let mallory = Caller::new(1000, 1000, "mallory", "/home/mallory");

        let err = read_role_id(&RoleIdFile::managed(&path), &mallory).unwrap_err();
        assert!(err.to_string().contains("not readable"), "{}", err);
    }

    #[test]
    fn unreadable_mode_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = role_file(dir.path(), "role");
        fs::set_permissions(&path, Permissions::from_mode(0o200)).unwrap();

        // Unprivileged test runs already fail to open; root gets past that.
        let err = read_role_id(&RoleIdFile::user(&path), &caller_owning(&path)).unwrap_err();
        assert!(matches!(err, Error::RoleId { .. }));
    }
}
