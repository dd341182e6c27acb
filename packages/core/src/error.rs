//! Error types shared by the dispatcher, FIOs and stores.

use crate::path::PathError;

/// Per-call errors, as reported to the kernel transport.
///
/// Every component maps library and backend failures into exactly one of
/// these at the point of first detection. The variants carry no detail on
/// purpose: raw backend text goes to the log, never to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FsError {
    /// Path or secret absent.
    #[error("no such file or directory")]
    NotFound,

    /// Caller lacks rights, or its credential file is unreadable.
    #[error("permission denied")]
    PermissionDenied,

    /// A file operation hit a directory.
    #[error("is a directory")]
    IsDirectory,

    /// A directory operation hit a file.
    #[error("not a directory")]
    NotDirectory,

    /// Unrecognized file-mode category or malformed path.
    #[error("invalid argument")]
    InvalidArgument,

    /// Local I/O failure while reading a directory or template.
    #[error("resource busy")]
    ResourceBusy,

    /// Backend unreachable, malformed response, or a failed render.
    #[error("remote I/O error")]
    RemoteIo,
}

impl FsError {
    /// The POSIX status code returned to the transport.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EACCES,
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::ResourceBusy => libc::EBUSY,
            FsError::RemoteIo => libc::EREMOTEIO,
        }
    }
}

impl From<PathError> for FsError {
    fn from(_: PathError) -> Self {
        FsError::InvalidArgument
    }
}

/// Startup-time registry errors. These are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("namespace '{name}' is already registered")]
    DuplicateNamespace { name: String },

    #[error("invalid namespace name '{name}'")]
    InvalidNamespace { name: String },
}
