use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DotKitError, Result};

const CONFIG_FILE: &str = "config.toml";

/// Namespace used in `<plugin>@<namespace>` keys when none is configured
pub const DEFAULT_NAMESPACE: &str = "dot-kit";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# dot-kit configuration file
# Location: ~/.dot-kit/config.toml

[source]
# Root of the plugin source tree (contains plugins/ and profiles.toml)
# Example: root = "~/src/agent-kit"
# root = ""

# Namespace recorded in the enabled-plugin registry as <plugin>@<namespace>
namespace = "dot-kit"

[global]
# Base directory of the global scope
# Default: ~/.claude
# host_dir = "~/.claude"

# Service registry shared with the host application
# Default: ~/.claude.json
# service_registry = "~/.claude.json"
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub global: GlobalConfig,
}

/// Source tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: None,
            namespace: default_namespace(),
        }
    }
}

/// Global-scope locations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_registry: Option<PathBuf>,
}

/// Fully resolved global-scope paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Base directory of the global scope (e.g. ~/.claude)
    pub host_dir: PathBuf,
    /// Global service registry document
    pub service_registry: PathBuf,
    /// Namespace for enabled-plugin keys and the reference cache
    pub namespace: String,
}

impl HostPaths {
    pub fn new(host_dir: PathBuf, service_registry: PathBuf, namespace: impl Into<String>) -> Self {
        Self {
            host_dir,
            service_registry,
            namespace: namespace.into(),
        }
    }

    /// Root of every plugin cache: `<host>/plugins/cache`
    pub fn cache_root(&self) -> PathBuf {
        self.host_dir.join("plugins").join("cache")
    }

    /// Versioned reference tree owned by this namespace
    pub fn namespace_dir(&self) -> PathBuf {
        self.cache_root().join(&self.namespace)
    }

    pub fn settings(&self) -> PathBuf {
        self.host_dir.join("settings.json")
    }

    pub fn service_manifest(&self) -> PathBuf {
        self.namespace_dir().join(".dot-kit-services.json")
    }

    /// Key used in the enabled-plugin registry
    pub fn enabled_key(&self, plugin: &str) -> String {
        format!("{}@{}", plugin, self.namespace)
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| DotKitError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self).map_err(|e| DotKitError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "source.root" => Some(display_opt(&self.source.root)),
            "source.namespace" => Some(self.source.namespace.clone()),
            "global.host_dir" => Some(display_opt(&self.global.host_dir)),
            "global.service_registry" => Some(display_opt(&self.global.service_registry)),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "source.root" => self.source.root = parse_path(value),
            "source.namespace" => {
                self.source.namespace = if value.is_empty() {
                    default_namespace()
                } else {
                    value.to_string()
                }
            }
            "global.host_dir" => self.global.host_dir = parse_path(value),
            "global.service_registry" => self.global.service_registry = parse_path(value),
            _ => {
                return Err(DotKitError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "source.root",
            "source.namespace",
            "global.host_dir",
            "global.service_registry",
        ]
        .iter()
        .map(|key| (key.to_string(), self.get(key).unwrap_or_default()))
        .collect()
    }

    /// Source root with `~` expanded
    pub fn source_root(&self) -> Result<Option<PathBuf>> {
        self.source.root.as_deref().map(expand_home).transpose()
    }

    /// Resolve global-scope paths, applying defaults under the home directory
    pub fn host_paths(&self, host_dir_override: Option<&Path>) -> Result<HostPaths> {
        let home = dirs::home_dir().ok_or(DotKitError::HomeNotFound)?;

        let host_dir = match host_dir_override.or(self.global.host_dir.as_deref()) {
            Some(dir) => expand_home(dir)?,
            None => home.join(".claude"),
        };
        let service_registry = match self.global.service_registry.as_deref() {
            Some(path) => expand_home(path)?,
            None => home.join(".claude.json"),
        };

        Ok(HostPaths::new(
            host_dir,
            service_registry,
            self.source.namespace.clone(),
        ))
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(DotKitError::HomeNotFound)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

fn parse_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim_matches('"').trim_matches('\'');
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}
