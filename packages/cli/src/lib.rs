//! # secretsfs
//!
//! Mounts secrets from a secret-management backend as a read-only
//! filesystem.
//!
//! ```bash
//! # Mount with the configuration from ~/.secretsfs or /etc/secretsfs
//! secretsfs /run/secrets -o allow_other
//!
//! cat /run/secrets/secrets/db/password
//! cat /run/secrets/templates/app.conf
//!
//! # Introspection
//! secretsfs --print-defaults
//! secretsfs --print-fios
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use secretsfs_core::{new_filesystem, Registry};

pub mod config;
pub mod stores;

pub use config::{Config, ConfigError, DEFAULT_CONFIG};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown store '{name}' (available: {})", stores::AVAILABLE_STORES.join(", "))]
    UnknownStore { name: String },

    #[error("vault store: {0}")]
    Vault(#[from] secretsfs_vault::Error),

    #[error("json store: {0}")]
    JsonStore(#[from] secretsfs_json_store::Error),

    #[error(transparent)]
    Fio(#[from] secretsfs_fio::Error),

    #[error("no mountpoint given")]
    MissingMountpoint,

    #[error("cannot start worker threads: {0}")]
    Runtime(std::io::Error),

    #[error("cannot mount {path}: {source}")]
    Mount {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// SecretsFS - secrets as files
#[derive(Parser, Debug)]
#[command(name = "secretsfs")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Where to mount the filesystem
    pub mountpoint: Option<PathBuf>,

    /// Additional mount options, comma separated
    #[arg(short = 'o', value_name = "OPTIONS")]
    pub options: Vec<String>,

    /// Configuration file (default: ~/.secretsfs/secretsfs.toml, then
    /// /etc/secretsfs/secretsfs.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Print the default configuration and exit
    #[arg(long)]
    pub print_defaults: bool,

    /// Print the available stores and exit
    #[arg(long)]
    pub print_stores: bool,

    /// Print the available FIOs and exit
    #[arg(long)]
    pub print_fios: bool,

    /// Print the active store and its configuration and exit
    #[arg(long)]
    pub print_store: bool,
}

impl Args {
    /// Whether only information is requested, without mounting.
    pub fn introspection(&self) -> bool {
        self.print_defaults || self.print_stores || self.print_fios || self.print_store
    }
}

/// Install the log subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Answer the `--print-*` flags.
pub fn print_info(args: &Args, config: &Config) -> Result<String, Error> {
    let mut out = String::new();
    if args.print_defaults {
        out.push_str(DEFAULT_CONFIG);
    }
    if args.print_stores {
        for name in stores::AVAILABLE_STORES {
            let marker = if *name == config.store.enabled { " (enabled)" } else { "" };
            out.push_str(&format!("{}{}\n", name, marker));
        }
    }
    if args.print_fios {
        for name in secretsfs_fio::AVAILABLE_FIOS {
            let marker = if config.fio.enabled.iter().any(|e| e == *name) {
                " (enabled)"
            } else {
                ""
            };
            out.push_str(&format!("{}{}\n", name, marker));
        }
    }
    if args.print_store {
        out.push_str(&format!("[store.{}]\n", config.store.enabled));
        out.push_str(&stores::store_section(config)?);
    }
    Ok(out)
}

/// Load the configuration and either print what was asked for or mount.
pub fn run(args: Args) -> Result<(), Error> {
    let (config, source) = config::load(args.config.as_deref(), &config::search_paths())?;
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        None => tracing::info!("no configuration file, using defaults"),
    }

    if args.introspection() {
        print!("{}", print_info(&args, &config)?);
        return Ok(());
    }

    let mountpoint = args.mountpoint.ok_or(Error::MissingMountpoint)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("secretsfs-worker")
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;

    let store = stores::build_store(&config)?;
    let mut registry = Registry::new();
    secretsfs_fio::register_builtin(&mut registry, &config.fio, Arc::clone(&store))?;
    let fs = new_filesystem(registry, store);

    secretsfs_fuse::mount(fs, &mountpoint, &args.options, runtime.handle().clone()).map_err(
        |source| Error::Mount {
            path: mountpoint.clone(),
            source,
        },
    )?;
    tracing::info!(mountpoint = %mountpoint.display(), "unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_mount_invocation() {
        let a = args(&["secretsfs", "/run/secrets", "-o", "allow_other,nodev"]);
        assert_eq!(a.mountpoint, Some(PathBuf::from("/run/secrets")));
        assert_eq!(a.options, vec!["allow_other,nodev".to_string()]);
        assert_eq!(a.log_level, "info");
        assert!(!a.introspection());
    }

    #[test]
    fn print_flags_are_introspection() {
        assert!(args(&["secretsfs", "--print-defaults"]).introspection());
        assert!(args(&["secretsfs", "--print-store"]).introspection());
    }

    #[test]
    fn prints_enabled_markers() {
        let config = Config::default();
        let out = print_info(&args(&["secretsfs", "--print-stores", "--print-fios"]), &config)
            .unwrap();
        assert!(out.contains("vault (enabled)\n"));
        assert!(out.contains("json\n"));
        assert!(out.contains("secrets (enabled)\n"));
        assert!(out.contains("templates (enabled)\n"));
    }

    #[test]
    fn prints_active_store() {
        let out = print_info(&args(&["secretsfs", "--print-store"]), &Config::default()).unwrap();
        assert!(out.starts_with("[store.vault]\n"));
        assert!(out.contains("timeout_secs = 10"));
    }

    #[test]
    fn prints_defaults() {
        let out = print_info(&args(&["secretsfs", "--print-defaults"]), &Config::default()).unwrap();
        assert_eq!(out, DEFAULT_CONFIG);
    }
}
