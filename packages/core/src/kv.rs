//! Key/value secrets exposed as directories of files.
//!
//! Shared by every store whose backend holds flat key/value maps: a secret
//! becomes a directory, each key a file, each value the file content.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use crate::{expose_key, DirEntry};

/// The key/value map stored at one secret path.
pub type SecretData = serde_json::Map<String, Value>;

/// File content for a secret value.
///
/// Strings are exposed verbatim; anything else as compact JSON text.
pub fn value_bytes(value: &Value) -> Bytes {
    match value {
        Value::String(s) => Bytes::copy_from_slice(s.as_bytes()),
        other => Bytes::from(other.to_string()),
    }
}

/// Find the value whose exposed key name equals `name`.
pub fn find_key<'a>(data: &'a SecretData, name: &str, substitute: char) -> Option<&'a Value> {
    if name.contains('/') {
        return None;
    }
    data.get(name).or_else(|| {
        data.iter()
            .find(|(key, _)| expose_key(key, substitute) == name)
            .map(|(_, value)| value)
    })
}

/// One file entry per key.
pub fn key_entries(data: &SecretData, substitute: char) -> impl Iterator<Item = DirEntry> + '_ {
    data.keys()
        .map(move |key| DirEntry::file(expose_key(key, substitute)))
}

/// Merge listings, keeping the first entry seen for each name.
///
/// A backend path can be both a folder and a secret; the folder wins so that
/// the sub-tree stays reachable.
pub fn merge_entries(entries: impl IntoIterator<Item = DirEntry>) -> Vec<DirEntry> {
    let mut merged: BTreeMap<String, DirEntry> = BTreeMap::new();
    for entry in entries {
        merged.entry(entry.name.clone()).or_insert(entry);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> SecretData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn string_values_are_verbatim() {
        assert_eq!(&value_bytes(&json!("admin"))[..], b"admin");
        assert_eq!(&value_bytes(&json!("line\n"))[..], b"line\n");
    }

    #[test]
    fn other_values_are_json() {
        assert_eq!(&value_bytes(&json!(5432))[..], b"5432");
        assert_eq!(&value_bytes(&json!(true))[..], b"true");
        assert_eq!(&value_bytes(&json!({"a": 1}))[..], b"{\"a\":1}");
    }

    #[test]
    fn find_key_by_exposed_name() {
        let d = data(json!({"password": "x", "ssl/cert": "pem", "plain_name": "y"}));
        assert_eq!(find_key(&d, "password", '_'), Some(&json!("x")));
        assert_eq!(find_key(&d, "ssl_cert", '_'), Some(&json!("pem")));
        assert_eq!(find_key(&d, "plain_name", '_'), Some(&json!("y")));
        assert_eq!(find_key(&d, "ssl/cert", '_'), None);
        assert_eq!(find_key(&d, "missing", '_'), None);
    }

    #[test]
    fn entries_are_substituted() {
        let d = data(json!({"a/b": "1", "c": "2"}));
        let names: Vec<String> = key_entries(&d, '§').map(|e| e.name).collect();
        assert_eq!(names, vec!["a§b".to_string(), "c".to_string()]);
    }

    #[test]
    fn merge_prefers_first() {
        let merged = merge_entries(vec![
            DirEntry::directory("db"),
            DirEntry::file("db"),
            DirEntry::file("api"),
        ]);
        assert_eq!(merged, vec![DirEntry::file("api"), DirEntry::directory("db")]);
    }
}
