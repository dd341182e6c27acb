use std::path::PathBuf;

use secretsfs_core::FsError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("cannot load TLS material {path}: {message}")]
    Tls { path: PathBuf, message: String },

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("login rejected with HTTP {status}: {body}")]
    LoginRejected { status: u16, body: String },

    #[error("malformed backend response: {message}")]
    Malformed { message: String },

    #[error("role id file {path}: {message}")]
    RoleId { path: PathBuf, message: String },

    #[error("{0}")]
    Fs(#[from] FsError),
}

impl Error {
    /// Whether the backend refused the session token or its rights.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Error::Status { status: 401 | 403, .. })
    }

    /// The one taxonomy member this failure is reported as.
    pub fn to_fs_error(&self) -> FsError {
        match self {
            Error::Status { status: 404, .. } => FsError::NotFound,
            Error::Status {
                status: 401 | 403, ..
            } => FsError::PermissionDenied,
            Error::LoginRejected { .. } | Error::RoleId { .. } => FsError::PermissionDenied,
            Error::Fs(e) => *e,
            Error::Status { .. }
            | Error::Http(_)
            | Error::UrlParse(_)
            | Error::InvalidUrl { .. }
            | Error::Tls { .. }
            | Error::Malformed { .. } => FsError::RemoteIo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> Error {
        Error::Status {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status(404).to_fs_error(), FsError::NotFound);
        assert_eq!(status(403).to_fs_error(), FsError::PermissionDenied);
        assert_eq!(status(401).to_fs_error(), FsError::PermissionDenied);
        assert_eq!(status(500).to_fs_error(), FsError::RemoteIo);
        assert_eq!(status(503).to_fs_error(), FsError::RemoteIo);
    }

    #[test]
    fn auth_rejection() {
        assert!(status(403).is_auth_rejection());
        assert!(status(401).is_auth_rejection());
        assert!(!status(404).is_auth_rejection());
        assert!(!Error::LoginRejected {
            status: 400,
            body: String::new()
        }
        .is_auth_rejection());
    }

    #[test]
    fn credential_failures_are_permission_denied() {
        let e = Error::RoleId {
            path: PathBuf::from("/home/alice/.vault-roleid"),
            message: "missing".to_string(),
        };
        assert_eq!(e.to_fs_error(), FsError::PermissionDenied);
        assert!(e.to_string().contains(".vault-roleid"));
    }

    #[test]
    fn malformed_is_remote_io() {
        let e = Error::Malformed {
            message: "no data".to_string(),
        };
        assert_eq!(e.to_fs_error(), FsError::RemoteIo);
    }

    #[test]
    fn semantic_errors_pass_through() {
        assert_eq!(
            Error::from(FsError::IsDirectory).to_fs_error(),
            FsError::IsDirectory
        );
    }
}
