//! Service-endpoint registry merging (`mcpServers`).
//!
//! Keys are merged individually. A key defined by the user always wins; at
//! project scope a key the global registry already defines is skipped.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::write_json_atomic;
use crate::error::{DotKitError, Result};
use crate::hooks::substitute_placeholder;
use crate::tagged::{is_owned_by, is_tagged, owner_of, TaggedEntry};

const SERVICES_KEY: &str = "mcpServers";

/// Connection descriptor for a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceDescriptor {
    /// Local process speaking over stdio
    Local {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        env: Map<String, Value>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Remote endpoint
    Remote {
        url: String,
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        transport: Option<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        headers: Map<String, Value>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

/// A plugin's .mcp.json, with placeholders resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceFragment {
    services: Vec<(String, ServiceDescriptor)>,
}

impl ServiceFragment {
    pub fn load(path: &Path, plugin_root: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, plugin_root, path)
    }

    /// Accepts either `{"mcpServers": {...}}` or a bare name-to-descriptor map
    pub fn parse(content: &str, plugin_root: &Path, path: &Path) -> Result<Self> {
        let invalid = |message: String| DotKitError::FragmentInvalid {
            path: path.to_path_buf(),
            message,
        };

        let mut value: Value = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        substitute_placeholder(&mut value, &plugin_root.to_string_lossy());

        let map = match value {
            Value::Object(mut root) => match root.shift_remove(SERVICES_KEY) {
                Some(Value::Object(servers)) => servers,
                Some(_) => return Err(invalid(format!("\"{}\" must be an object", SERVICES_KEY))),
                None => root,
            },
            _ => return Err(invalid("top level must be an object".to_string())),
        };

        let mut services = Vec::with_capacity(map.len());
        for (name, descriptor) in map {
            let descriptor: ServiceDescriptor = serde_json::from_value(descriptor).map_err(|_| {
                invalid(format!(
                    "service '{}' needs either \"command\" or \"url\"",
                    name
                ))
            })?;
            services.push((name, descriptor));
        }
        Ok(Self { services })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Scope-specific merge rules
#[derive(Debug, Clone, Copy)]
pub enum ServicePolicy<'a> {
    Global,
    /// Skip keys the global registry already defines
    Project { global_keys: &'a BTreeSet<String> },
}

/// Per-key outcome of merging one fragment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceMerge {
    /// Keys added or refreshed
    pub added: Vec<String>,
    /// Keys skipped because the global scope already defines them
    pub skipped_global: Vec<String>,
    /// Keys left alone because someone else owns them
    pub kept: Vec<String>,
    /// The plugin's own keys it no longer ships
    pub removed: Vec<String>,
}

pub fn merge_services(
    doc: &mut Value,
    plugin: &str,
    fragment: &ServiceFragment,
    policy: ServicePolicy<'_>,
    doc_path: &Path,
) -> Result<ServiceMerge> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| shape(doc_path, "top level must be an object"))?;
    let created = !root.contains_key(SERVICES_KEY);
    let servers = root
        .entry(SERVICES_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| shape(doc_path, &format!("\"{}\" must be an object", SERVICES_KEY)))?;

    let mut merge = ServiceMerge::default();
    let shipped: BTreeSet<&str> = fragment.names().collect();
    merge.removed = servers
        .iter()
        .filter(|(name, entry)| !shipped.contains(name.as_str()) && is_owned_by(entry, plugin))
        .map(|(name, _)| name.clone())
        .collect();
    for name in &merge.removed {
        servers.shift_remove(name);
    }

    for (name, descriptor) in &fragment.services {
        if let ServicePolicy::Project { global_keys } = policy {
            if global_keys.contains(name) {
                if servers.get(name).is_some_and(|e| is_owned_by(e, plugin)) {
                    servers.shift_remove(name);
                }
                merge.skipped_global.push(name.clone());
                continue;
            }
        }

        match servers.get(name) {
            None => {}
            Some(existing) if is_owned_by(existing, plugin) => {}
            Some(_) => {
                merge.kept.push(name.clone());
                continue;
            }
        }

        let entry = TaggedEntry::new(plugin, descriptor.clone()).to_json()?;
        servers.insert(name.clone(), entry);
        merge.added.push(name.clone());
    }

    if servers.is_empty() && (created || !merge.removed.is_empty()) {
        root.shift_remove(SERVICES_KEY);
    }
    Ok(merge)
}

/// Every service key defined in a registry document, tagged or not
pub fn service_keys(doc: &Value) -> BTreeSet<String> {
    doc.get(SERVICES_KEY)
        .and_then(Value::as_object)
        .map(|servers| servers.keys().cloned().collect())
        .unwrap_or_default()
}

/// Keys among `keys` whose entries still carry the provenance tag
pub fn tagged_service_keys(doc: &Value, keys: &BTreeSet<String>) -> Vec<String> {
    doc.get(SERVICES_KEY)
        .and_then(Value::as_object)
        .map(|servers| {
            keys.iter()
                .filter(|key| servers.get(key.as_str()).is_some_and(is_tagged))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

pub fn count_tagged_services(doc: &Value) -> usize {
    doc.get(SERVICES_KEY)
        .and_then(Value::as_object)
        .map(|servers| servers.values().filter(|v| owner_of(v).is_some()).count())
        .unwrap_or(0)
}

/// Remove the listed keys, but only where the entry is still tagged
pub fn remove_services(doc: &mut Value, keys: &BTreeSet<String>) -> Vec<String> {
    let Some(servers) = doc.get_mut(SERVICES_KEY).and_then(Value::as_object_mut) else {
        return Vec::new();
    };

    let mut removed = Vec::new();
    for key in keys {
        if servers.get(key.as_str()).is_some_and(is_tagged) {
            servers.shift_remove(key.as_str());
            removed.push(key.clone());
        }
    }
    removed
}

/// Service keys dot-kit added to the global registry, kept for safe removal
#[derive(Debug, Clone)]
pub struct ServiceManifest {
    path: PathBuf,
}

impl ServiceManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let keys: Vec<String> =
            serde_json::from_str(&content).map_err(|e| DotKitError::DocumentParse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        Ok(keys.into_iter().collect())
    }

    /// Add keys to the manifest
    pub fn record<I: IntoIterator<Item = String>>(&self, keys: I) -> Result<()> {
        let mut all = self.load()?;
        let before = all.len();
        all.extend(keys);
        if all.len() == before && self.path.exists() {
            return Ok(());
        }
        let list: Vec<&String> = all.iter().collect();
        write_json_atomic(&self.path, &list)
    }

    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn shape(path: &Path, message: &str) -> DotKitError {
    DotKitError::DocumentShape {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
