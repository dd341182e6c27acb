//! Caller identity, resolved once per filesystem call.

use std::ffi::CStr;
use std::io;
use std::path::PathBuf;

/// The operating-system user on whose behalf a call runs.
///
/// Built by the transport for every request from the uid the kernel hands
/// over. Never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    pub home: PathBuf,
}

impl Caller {
    pub fn new(uid: u32, gid: u32, username: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            uid,
            gid,
            username: username.into(),
            home: home.into(),
        }
    }
}

/// Resolves a numeric uid into a [`Caller`].
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, uid: u32, gid: u32) -> io::Result<Caller>;
}

/// The system user database, via `getpwuid_r(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PasswdDirectory;

const INITIAL_PASSWD_BUFFER: usize = 1024;
const MAX_PASSWD_BUFFER: usize = 1 << 20;

impl UserDirectory for PasswdDirectory {
    fn resolve(&self, uid: u32, gid: u32) -> io::Result<Caller> {
        let mut buffer: Vec<libc::c_char> = vec![0; INITIAL_PASSWD_BUFFER];

        loop {
            // SAFETY: passwd is a plain C struct; an all-zero value is valid
            // input for getpwuid_r, which fills it in.
            let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::passwd = std::ptr::null_mut();

            // SAFETY: every pointer refers to live, correctly sized storage
            // owned by this frame.
            let rc = unsafe {
                libc::getpwuid_r(
                    uid,
                    &mut entry,
                    buffer.as_mut_ptr(),
                    buffer.len(),
                    &mut result,
                )
            };

            if rc == libc::ERANGE && buffer.len() < MAX_PASSWD_BUFFER {
                buffer.resize(buffer.len() * 2, 0);
                continue;
            }
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            if result.is_null() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no passwd entry for uid {}", uid),
                ));
            }

            // SAFETY: on success pw_name and pw_dir point to NUL-terminated
            // strings inside `buffer`, which outlives these borrows.
            let (username, home) = unsafe {
                (
                    CStr::from_ptr(entry.pw_name).to_string_lossy().into_owned(),
                    CStr::from_ptr(entry.pw_dir).to_string_lossy().into_owned(),
                )
            };

            return Ok(Caller::new(uid, gid, username, home));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_root() {
        let caller = PasswdDirectory.resolve(0, 0).unwrap();
        assert_eq!(caller.uid, 0);
        assert_eq!(caller.username, "root");
        assert!(caller.home.is_absolute());
    }

    #[test]
    fn unknown_uid_is_not_found() {
        let err = PasswdDirectory.resolve(u32::MAX - 7, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
