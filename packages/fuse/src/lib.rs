//! # secretsfs-fuse
//!
//! Mounts a [`SecretsFs`] through FUSE.
//!
//! The mount is read-only. Every request is answered as the user that
//! issued it: the uid the kernel hands over is resolved through the system
//! user database and passed down as the [`Caller`](secretsfs_core::Caller).

use std::io;
use std::path::Path as FsPath;

use fuser::MountOption;
use tokio::runtime::Handle;

use secretsfs_core::{PasswdDirectory, SecretsFs};

mod adapter;
pub mod inodes;

pub use adapter::SecretsFuse;

pub const FS_NAME: &str = "secretsfs";

/// Translate a `-o` option into a mount option.
pub fn mount_option(option: &str) -> MountOption {
    match option {
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "nosuid" => MountOption::NoSuid,
        "nodev" => MountOption::NoDev,
        "noexec" => MountOption::NoExec,
        other => MountOption::CUSTOM(other.to_string()),
    }
}

/// All options for a mount, the fixed ones first.
pub fn mount_options(extra: &[String]) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName(FS_NAME.to_string()),
        MountOption::Subtype(FS_NAME.to_string()),
    ];
    options.extend(
        extra
            .iter()
            .flat_map(|o| o.split(','))
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(mount_option),
    );
    options
}

/// Serve `fs` at `mountpoint` until it is unmounted.
///
/// Requests are executed on the blocking pool of `runtime`.
pub fn mount(
    fs: SecretsFs,
    mountpoint: &FsPath,
    extra_options: &[String],
    runtime: Handle,
) -> io::Result<()> {
    let options = mount_options(extra_options);
    tracing::info!(
        mountpoint = %mountpoint.display(),
        store = fs.store().describe(),
        namespaces = ?fs.registry(),
        "mounting"
    );
    let filesystem = SecretsFuse::new(fs, Box::new(PasswdDirectory), runtime);
    fuser::mount2(filesystem, mountpoint, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_is_always_set() {
        let options = mount_options(&[]);
        assert!(options.contains(&MountOption::RO));
        assert!(options.contains(&MountOption::FSName("secretsfs".to_string())));
    }

    #[test]
    fn extra_options_are_split() {
        let options = mount_options(&["allow_other, max_read=4096".to_string()]);
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::CUSTOM("max_read=4096".to_string())));
    }
}
