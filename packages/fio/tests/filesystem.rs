use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use secretsfs_core::{new_filesystem, Caller, FsError, OpenFlags, Path, Registry, SecretsFs};
use secretsfs_fio::{register_builtin, FioConfig, TemplatesConfig};
use secretsfs_json_store::JsonStore;

fn p(s: &str) -> Path {
    Path::parse(s).unwrap()
}

fn alice() -> Caller {
    Caller::new(1000, 1000, "alice", "/home/alice")
}

fn bob() -> Caller {
    Caller::new(1001, 1001, "bob", "/home/bob")
}

/// Secrets in a JSON store, templates in a temporary directory, both
/// namespaces registered.
fn mounted() -> (TempDir, SecretsFs) {
    let templates = tempfile::tempdir().unwrap();
    fs::write(
        templates.path().join("app.conf"),
        "user={{.Get \"db/username\"}}",
    )
    .unwrap();
    fs::write(
        templates.path().join("ops.conf"),
        "{{/* root only */}}token={{ .Get \"ops/root/token\" }}\n",
    )
    .unwrap();
    fs::write(
        templates.path().join("certs.conf"),
        "{{- .Get `app/web/tls_key` -}}\n",
    )
    .unwrap();

    let mut store = JsonStore::new('_');
    store
        .insert(
            "db",
            json!({"username": "admin", "password": "s3cret"}),
            None,
        )
        .unwrap();
    store
        .insert("ops/root", json!({"token": "t0k"}), Some(vec!["root".to_string()]))
        .unwrap();
    store
        .insert(
            "app/web",
            json!({"tls/key": "KEY"}),
            Some(vec!["alice".to_string()]),
        )
        .unwrap();
    let store = Arc::new(store);

    let config = FioConfig {
        templates: TemplatesConfig {
            path: templates.path().to_path_buf(),
        },
        ..Default::default()
    };
    let mut registry = Registry::new();
    register_builtin(&mut registry, &config, store.clone()).unwrap();

    (templates, new_filesystem(registry, store))
}

#[test]
fn root_lists_namespaces() {
    let (_t, fs) = mounted();
    let mut names: Vec<String> = fs
        .list(&Path::root(), &alice())
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["secrets", "templates"]);
}

#[test]
fn secrets_are_readable() {
    let (_t, fs) = mounted();
    let password = fs
        .open(&p("secrets/db/password"), OpenFlags::READ_ONLY, &alice())
        .unwrap();
    assert_eq!(&password[..], b"s3cret");
}

#[test]
fn template_renders_secret() {
    let (_t, fs) = mounted();
    let rendered = fs
        .open(&p("templates/app.conf"), OpenFlags::READ_ONLY, &alice())
        .unwrap();
    assert_eq!(&rendered[..], b"user=admin");
}

#[test]
fn template_uses_substituted_key_names() {
    let (_t, fs) = mounted();
    let rendered = fs
        .open(&p("templates/certs.conf"), OpenFlags::READ_ONLY, &alice())
        .unwrap();
    assert_eq!(&rendered[..], b"KEY");
}

#[test]
fn denied_secret_fails_template_with_permission_denied() {
    let (_t, fs) = mounted();
    assert_eq!(
        fs.open(&p("templates/ops.conf"), OpenFlags::READ_ONLY, &alice()),
        Err(FsError::PermissionDenied)
    );
    assert_eq!(
        fs.open(&p("templates/certs.conf"), OpenFlags::READ_ONLY, &bob()),
        Err(FsError::PermissionDenied)
    );
}

#[test]
fn unknown_namespace_is_not_found() {
    let (_t, fs) = mounted();
    let path = p("ssh/id_rsa");
    assert_eq!(fs.attributes(&path, &alice()), Err(FsError::NotFound));
    assert_eq!(fs.list(&path, &alice()), Err(FsError::NotFound));
    assert_eq!(
        fs.open(&path, OpenFlags::READ_ONLY, &alice()),
        Err(FsError::NotFound)
    );
}

#[test]
fn attributes_are_stable() {
    let (_t, fs) = mounted();
    for path in ["secrets/db", "secrets/db/username", "templates/app.conf"] {
        let first = fs.attributes(&p(path), &alice());
        let second = fs.attributes(&p(path), &alice());
        assert!(first.is_ok(), "{path}");
        assert_eq!(first, second);
    }
}
