//! Plugin manifest parsing for .claude-plugin/plugin.json
//!
//! Only the fields the engine needs are typed; everything else in the manifest
//! is ignored.

use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{DotKitError, Result};

const PLUGIN_DIR: &str = ".claude-plugin";
const PLUGIN_JSON: &str = "plugin.json";
const FILTER_FILE: &str = ".dot-kit.toml";

/// Version used when the manifest omits one
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Plugin manifest structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Plugin name (required)
    pub name: String,

    /// Plugin version
    #[serde(default)]
    pub version: Option<String>,

    /// Plugin description
    #[serde(default)]
    pub description: Option<String>,
}

impl PluginManifest {
    /// Path of the manifest inside a plugin directory
    pub fn path(plugin_dir: &Path) -> PathBuf {
        plugin_dir.join(PLUGIN_DIR).join(PLUGIN_JSON)
    }

    /// Load the manifest; a missing file is an error the caller reports per plugin
    pub fn load(plugin_dir: &Path) -> Result<Self> {
        let manifest_path = Self::path(plugin_dir);
        if !manifest_path.exists() {
            return Err(DotKitError::ManifestMissing {
                path: manifest_path,
            });
        }

        let content = fs::read_to_string(&manifest_path)?;
        let manifest: PluginManifest =
            serde_json::from_str(&content).map_err(|e| DotKitError::ManifestInvalid {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;

        if manifest.name.trim().is_empty() {
            return Err(DotKitError::ManifestInvalid {
                path: manifest_path,
                message: "name must not be empty".to_string(),
            });
        }

        let version = manifest.version_or_default();
        if !is_single_segment(version) {
            return Err(DotKitError::ManifestInvalid {
                path: manifest_path,
                message: format!("version '{}' must be a single path segment", version),
            });
        }

        Ok(manifest)
    }

    /// Version segment used in versioned layouts
    pub fn version_or_default(&self) -> &str {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION)
    }
}

/// The version names a directory in versioned layouts
fn is_single_segment(version: &str) -> bool {
    let mut components = Path::new(version).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Filter configuration for include/exclude patterns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Patterns to include; empty means everything
    #[serde(default)]
    pub include: Vec<String>,

    /// Patterns to exclude
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FilterConfig {
    /// Load filter config from .dot-kit.toml
    pub fn load(plugin_dir: &Path) -> Result<Option<Self>> {
        let toml_path = plugin_dir.join(FILTER_FILE);
        if !toml_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&toml_path)?;
        let value: toml::Value = toml::from_str(&content)?;

        if let Some(filter) = value.get("filter") {
            let config: FilterConfig = filter.clone().try_into()?;
            return Ok(Some(config));
        }

        Ok(None)
    }

    /// Whether a component path passes both pattern lists
    pub fn admits(&self, path: &Path) -> bool {
        (self.include.is_empty() || self.matches_include(path)) && !self.matches_exclude(path)
    }

    pub fn matches_include(&self, path: &Path) -> bool {
        matches_any(&self.include, path)
    }

    /// Check if path matches any exclude pattern
    pub fn matches_exclude(&self, path: &Path) -> bool {
        matches_any(&self.exclude, path)
    }
}

fn matches_any(patterns: &[String], path: &Path) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let path_str = path.to_string_lossy();
    patterns
        .iter()
        .filter_map(|pattern| Pattern::new(pattern).ok())
        .any(|glob| glob.matches(&path_str))
}
