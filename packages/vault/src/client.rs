//! Blocking HTTP client for the KV secret engine API.

use std::fs;
use std::net::ToSocketAddrs;
use std::path::Path as FsPath;
use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::{Certificate, Identity};
use serde::Deserialize;
use url::Url;

use secretsfs_core::kv::SecretData;
use secretsfs_core::Path;

use crate::config::{TlsConfig, VaultConfig};
use crate::error::Error;

const TOKEN_HEADER: &str = "X-Vault-Token";
const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: ReadData,
}

#[derive(Deserialize)]
struct ReadData {
    data: Option<SecretData>,
}

/// HTTP client bound to one backend address.
///
/// Every request is bounded by the configured timeout. Nothing is retried
/// here.
pub struct VaultClient {
    http: Client,
    base_url: Url,
}

impl VaultClient {
    /// Build a client from the connection settings.
    pub fn new(config: &VaultConfig) -> Result<Self, Error> {
        let mut base_url = Url::parse(&config.addr)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                message: format!("'{}' cannot be used as a base address", config.addr),
            });
        }

        let mut builder = apply_tls(Client::builder(), &config.tls)?
            .timeout(Duration::from_secs(config.timeout_secs));

        if let Some(server_name) = &config.tls.server_name {
            builder = pin_server_name(builder, &mut base_url, server_name)?;
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// The address requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<addr>/v1/<prefix>/<path>`.
    fn url(&self, prefix: &str, path: &Path, trailing_slash: bool) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::InvalidUrl {
                message: format!("'{}' cannot be used as a base address", self.base_url),
            })?;
            segments.pop_if_empty().push("v1");
            segments.extend(prefix.split('/').filter(|s| !s.is_empty()));
            segments.extend(path.iter());
            if trailing_slash {
                segments.push("");
            }
        }
        Ok(url)
    }

    /// Exchange a role identifier for a session token.
    pub fn login(&self, login_path: &str, role_id: &str) -> Result<String, Error> {
        let url = self.url(login_path, &Path::root(), false)?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "role_id": role_id }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            if status.is_client_error() {
                return Err(Error::LoginRejected {
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().map_err(|e| Error::Malformed {
            message: format!("login response: {}", e),
        })?;
        Ok(login.auth.client_token)
    }

    /// Whether the backend still accepts `token`.
    pub fn token_valid(&self, token: &str) -> Result<bool, Error> {
        let url = self.url(LOOKUP_SELF_PATH, &Path::root(), false)?;
        let response = self.http.get(url).header(TOKEN_HEADER, token).send()?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            status => Err(Error::Status {
                status,
                body: response.text().unwrap_or_default(),
            }),
        }
    }

    /// Keys below a metadata path. Sub-folders end in `/`.
    ///
    /// `Ok(None)` when nothing is stored below `path`.
    pub fn list(&self, token: &str, prefix: &str, path: &Path) -> Result<Option<Vec<String>>, Error> {
        let mut url = self.url(prefix, path, true)?;
        url.query_pairs_mut().append_pair("list", "true");

        let Some(response) = self.get(url, token)? else {
            return Ok(None);
        };
        let list: ListResponse = response.json().map_err(|e| Error::Malformed {
            message: format!("list response for '{}': {}", path, e),
        })?;
        Ok(Some(list.data.keys))
    }

    /// The key/value map of the secret at `path`.
    ///
    /// `Ok(None)` when there is no secret there, including a secret whose
    /// current version is deleted.
    pub fn read(&self, token: &str, prefix: &str, path: &Path) -> Result<Option<SecretData>, Error> {
        let url = self.url(prefix, path, false)?;

        let Some(response) = self.get(url, token)? else {
            return Ok(None);
        };
        let read: ReadResponse = response.json().map_err(|e| Error::Malformed {
            message: format!("read response for '{}': {}", path, e),
        })?;
        Ok(read.data.data)
    }

    fn get(&self, url: Url, token: &str) -> Result<Option<Response>, Error> {
        tracing::trace!(%url, "GET");
        let response = self.http.get(url).header(TOKEN_HEADER, token).send()?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(Some(response))
    }
}

fn read_material(path: &FsPath) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| Error::Tls {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn certificate(path: &FsPath) -> Result<Certificate, Error> {
    Certificate::from_pem(&read_material(path)?).map_err(|e| Error::Tls {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn apply_tls(mut builder: ClientBuilder, tls: &TlsConfig) -> Result<ClientBuilder, Error> {
    if let Some(ca_cert) = &tls.ca_cert {
        builder = builder.add_root_certificate(certificate(ca_cert)?);
    }

    if let Some(ca_path) = &tls.ca_path {
        let entries = fs::read_dir(ca_path).map_err(|e| Error::Tls {
            path: ca_path.clone(),
            message: e.to_string(),
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                builder = builder.add_root_certificate(certificate(&path)?);
            }
        }
    }

    match (&tls.client_cert, &tls.client_key) {
        (Some(cert), Some(key)) => {
            let identity = Identity::from_pkcs8_pem(&read_material(cert)?, &read_material(key)?)
                .map_err(|e| Error::Tls {
                    path: cert.clone(),
                    message: e.to_string(),
                })?;
            builder = builder.identity(identity);
        }
        (Some(path), None) | (None, Some(path)) => {
            return Err(Error::Tls {
                path: path.clone(),
                message: "client certificate and key must be configured together".to_string(),
            });
        }
        (None, None) => {}
    }

    if tls.insecure {
        tracing::warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}

/// Connect to the configured address while presenting `server_name`.
///
/// The URL host becomes `server_name` (so it is sent as SNI and verified),
/// and name resolution for it is pinned to the configured address.
fn pin_server_name(
    builder: ClientBuilder,
    base_url: &mut Url,
    server_name: &str,
) -> Result<ClientBuilder, Error> {
    let host = base_url.host_str().ok_or_else(|| Error::InvalidUrl {
        message: format!("'{}' has no host", base_url),
    })?;
    let port = base_url.port_or_known_default().unwrap_or(443);

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::InvalidUrl {
            message: format!("cannot resolve '{}': {}", host, e),
        })?
        .next()
        .ok_or_else(|| Error::InvalidUrl {
            message: format!("'{}' resolved to no address", host),
        })?;

    base_url.set_host(Some(server_name))?;
    Ok(builder.resolve(server_name, addr))
}
