use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{SECRETS_NAMESPACE, TEMPLATES_NAMESPACE};

/// Which FIOs are mounted, and their settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FioConfig {
    /// Namespaces to register, by name.
    pub enabled: Vec<String>,

    pub templates: TemplatesConfig,
}

impl Default for FioConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                SECRETS_NAMESPACE.to_string(),
                TEMPLATES_NAMESPACE.to_string(),
            ],
            templates: TemplatesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Local directory holding the template files.
    pub path: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/secretsfs/templates/"),
        }
    }
}
