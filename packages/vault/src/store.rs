//! The KV backend as a [`SecretStore`].

use secretsfs_core::kv::{self, SecretData};
use secretsfs_core::{Attributes, Bytes, Caller, DirEntry, FsError, OpenFlags, Path, SecretStore};

use crate::client::VaultClient;
use crate::config::VaultConfig;
use crate::error::Error;
use crate::roleid;
use crate::session::SessionCache;

pub const STORE_NAME: &str = "vault";

/// Outcome of asking the backend whether something exists at a path.
///
/// Probing a path as the wrong kind of node (a key as a secret, a secret as
/// a folder) commonly hits a policy boundary, so a refusal only becomes an
/// error when no probe found anything.
enum Probe<T> {
    Found(T),
    Absent,
    Denied,
}

impl<T> Probe<T> {
    fn from_result(result: Result<Option<T>, Error>) -> Result<Self, Error> {
        match result {
            Ok(Some(value)) => Ok(Probe::Found(value)),
            Ok(None) => Ok(Probe::Absent),
            Err(e) if e.is_auth_rejection() => Ok(Probe::Denied),
            Err(e) => Err(e),
        }
    }

    fn found(self) -> Option<T> {
        match self {
            Probe::Found(value) => Some(value),
            _ => None,
        }
    }

    fn is_found(&self) -> bool {
        matches!(self, Probe::Found(_))
    }

    fn is_denied(&self) -> bool {
        matches!(self, Probe::Denied)
    }
}

fn denied() -> Error {
    Error::Status {
        status: 403,
        body: "permission denied".to_string(),
    }
}

/// Secrets from a KV secret engine, fetched per call as the calling user.
///
/// Each caller authenticates with the role id found in a file it owns; the
/// resulting session token is cached per uid and refreshed when the backend
/// reports it invalid.
pub struct VaultStore {
    client: VaultClient,
    sessions: SessionCache,
    config: VaultConfig,
    substitute: char,
}

impl VaultStore {
    pub fn new(config: VaultConfig, substitute: char) -> Result<Self, Error> {
        let client = VaultClient::new(&config)?;
        tracing::info!(addr = %client.base_url(), "using KV backend");
        Ok(Self {
            client,
            sessions: SessionCache::new(),
            config,
            substitute,
        })
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Run `op` with the caller's session token.
    ///
    /// If `op` is refused and the backend confirms the token is no longer
    /// valid, the session is refreshed once and `op` re-run.
    fn with_session<T>(
        &self,
        caller: &Caller,
        path: &Path,
        op: impl Fn(&str) -> Result<T, Error>,
    ) -> Result<T, FsError> {
        let role_file = roleid::locate(&self.config.role_id, caller);
        let role_id =
            roleid::read_role_id(&role_file, caller).map_err(|e| self.report(caller, path, e))?;

        let login = || self.client.login(&self.config.login_path, &role_id);

        let session = self
            .sessions
            .session(caller.uid, &role_id, login)
            .map_err(|e| self.report(caller, path, e))?;

        match op(&session.token) {
            Err(e) if e.is_auth_rejection() => {
                let valid = self
                    .client
                    .token_valid(&session.token)
                    .map_err(|e| self.report(caller, path, e))?;
                if valid {
                    return Err(self.report(caller, path, e));
                }

                self.sessions.invalidate(caller.uid, session.generation);
                let session = self
                    .sessions
                    .session(caller.uid, &role_id, login)
                    .map_err(|e| self.report(caller, path, e))?;
                op(&session.token).map_err(|e| self.report(caller, path, e))
            }
            result => result.map_err(|e| self.report(caller, path, e)),
        }
    }

    /// Classify a failure, logging the detail the caller will not see.
    fn report(&self, caller: &Caller, path: &Path, error: Error) -> FsError {
        let fs_error = error.to_fs_error();
        match fs_error {
            FsError::NotFound | FsError::IsDirectory | FsError::NotDirectory => {
                tracing::debug!(%path, uid = caller.uid, %error, "backend lookup failed");
            }
            _ => {
                tracing::warn!(%path, uid = caller.uid, %error, "backend request failed");
            }
        }
        fs_error
    }

    fn read_secret(&self, token: &str, path: &Path) -> Result<Probe<SecretData>, Error> {
        if path.is_empty() {
            return Ok(Probe::Absent);
        }
        Probe::from_result(self.client.read(token, &self.config.data_prefix, path))
    }

    fn list_folder(&self, token: &str, path: &Path) -> Result<Probe<Vec<String>>, Error> {
        Probe::from_result(self.client.list(token, &self.config.metadata_prefix, path))
    }

    /// The value of the key `path` names inside its parent secret.
    fn read_key(&self, token: &str, path: &Path) -> Result<Probe<Bytes>, Error> {
        let Some((parent, name)) = path.split_last() else {
            return Ok(Probe::Absent);
        };
        Ok(match self.read_secret(token, &parent)? {
            Probe::Found(data) => match kv::find_key(&data, name, self.substitute) {
                Some(value) => Probe::Found(kv::value_bytes(value)),
                None => Probe::Absent,
            },
            Probe::Denied => Probe::Denied,
            Probe::Absent => Probe::Absent,
        })
    }

    /// Whether `path` is a secret or a folder.
    fn probe_directory(&self, token: &str, path: &Path) -> Result<Probe<()>, Error> {
        let secret = self.read_secret(token, path)?;
        if secret.is_found() {
            return Ok(Probe::Found(()));
        }
        let folder = self.list_folder(token, path)?;
        if folder.is_found() {
            return Ok(Probe::Found(()));
        }
        if secret.is_denied() || folder.is_denied() {
            Ok(Probe::Denied)
        } else {
            Ok(Probe::Absent)
        }
    }
}

impl SecretStore for VaultStore {
    fn attributes(&self, path: &Path, caller: &Caller) -> Result<Attributes, FsError> {
        if path.is_empty() {
            return Ok(Attributes::directory());
        }

        self.with_session(caller, path, |token| {
            let key = self.read_key(token, path)?;
            let key_denied = key.is_denied();
            if let Some(value) = key.found() {
                return Ok(Attributes::file(value.len() as u64));
            }

            match self.probe_directory(token, path)? {
                Probe::Found(()) => Ok(Attributes::directory()),
                Probe::Denied => Err(denied()),
                Probe::Absent if key_denied => Err(denied()),
                Probe::Absent => Err(FsError::NotFound.into()),
            }
        })
    }

    fn list(&self, path: &Path, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        self.with_session(caller, path, |token| {
            let folder = self.list_folder(token, path)?;
            let secret = self.read_secret(token, path)?;
            let denied_somewhere = folder.is_denied() || secret.is_denied();

            if folder.is_found() || secret.is_found() {
                // Folders carry a trailing slash; both kinds list as directories.
                let folder_entries = folder
                    .found()
                    .into_iter()
                    .flatten()
                    .map(|key| DirEntry::directory(key.trim_end_matches('/')));
                let key_entries = secret
                    .found()
                    .map(|data| kv::key_entries(&data, self.substitute).collect::<Vec<_>>())
                    .unwrap_or_default();
                return Ok(kv::merge_entries(folder_entries.chain(key_entries)));
            }

            if path.is_empty() {
                return if denied_somewhere {
                    Err(denied())
                } else {
                    Ok(Vec::new())
                };
            }

            match self.read_key(token, path)? {
                Probe::Found(_) => Err(FsError::NotDirectory.into()),
                Probe::Denied => Err(denied()),
                Probe::Absent if denied_somewhere => Err(denied()),
                Probe::Absent => Err(FsError::NotFound.into()),
            }
        })
    }

    fn open(&self, path: &Path, _flags: OpenFlags, caller: &Caller) -> Result<Bytes, FsError> {
        if path.is_empty() {
            return Err(FsError::IsDirectory);
        }

        self.with_session(caller, path, |token| {
            let key = self.read_key(token, path)?;
            let key_denied = key.is_denied();
            if let Some(value) = key.found() {
                return Ok(value);
            }

            match self.probe_directory(token, path)? {
                Probe::Found(()) => Err(FsError::IsDirectory.into()),
                Probe::Denied => Err(denied()),
                Probe::Absent if key_denied => Err(denied()),
                Probe::Absent => Err(FsError::NotFound.into()),
            }
        })
    }

    fn describe(&self) -> &str {
        STORE_NAME
    }
}
