//! Enabled-plugin registry (`enabledPlugins` in the global settings.json).
//!
//! ```json
//! { "enabledPlugins": { "core@dot-kit": true, "other@marketplace": false } }
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{DotKitError, Result};

const ENABLED_KEY: &str = "enabledPlugins";

/// A `<plugin>@<namespace>` key set to `true`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledPlugin {
    pub name: String,
    pub namespace: String,
}

impl EnabledPlugin {
    pub fn parse(key: &str) -> Option<Self> {
        let (name, namespace) = key.rsplit_once('@')?;
        if name.is_empty() || namespace.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

/// Mark `key` as enabled; returns false when it already was
pub fn enable_plugin(doc: &mut Value, key: &str, doc_path: &Path) -> Result<bool> {
    let root = doc.as_object_mut().ok_or_else(|| DotKitError::DocumentShape {
        path: doc_path.to_path_buf(),
        message: "top level must be an object".to_string(),
    })?;
    let enabled = root
        .entry(ENABLED_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| DotKitError::DocumentShape {
            path: doc_path.to_path_buf(),
            message: format!("\"{}\" must be an object", ENABLED_KEY),
        })?;

    if enabled.get(key) == Some(&Value::Bool(true)) {
        return Ok(false);
    }
    enabled.insert(key.to_string(), Value::Bool(true));
    Ok(true)
}

/// Every plugin enabled in the document, in document order
pub fn enabled_plugins(doc: &Value) -> Vec<EnabledPlugin> {
    doc.get(ENABLED_KEY)
        .and_then(Value::as_object)
        .map(|enabled| {
            enabled
                .iter()
                .filter(|(_, on)| on.as_bool() == Some(true))
                .filter_map(|(key, _)| EnabledPlugin::parse(key))
                .collect()
        })
        .unwrap_or_default()
}

/// Keys registered under `namespace`, enabled or not
pub fn namespace_keys(doc: &Value, namespace: &str) -> Vec<String> {
    let suffix = format!("@{}", namespace);
    doc.get(ENABLED_KEY)
        .and_then(Value::as_object)
        .map(|enabled| {
            enabled
                .keys()
                .filter(|key| key.ends_with(&suffix))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Remove every key under `namespace`
pub fn prune_namespace(doc: &mut Value, namespace: &str) -> Vec<String> {
    let keys = namespace_keys(doc, namespace);
    if keys.is_empty() {
        return keys;
    }

    if let Some(root) = doc.as_object_mut() {
        let emptied = match root.get_mut(ENABLED_KEY).and_then(Value::as_object_mut) {
            Some(enabled) => {
                for key in &keys {
                    enabled.shift_remove(key);
                }
                enabled.is_empty()
            }
            None => false,
        };
        if emptied {
            root.shift_remove(ENABLED_KEY);
        }
    }
    keys
}
