//! Event-keyed hook registry merging.
//!
//! ```json
//! {
//!   "hooks": {
//!     "Stop": [
//!       {"matcher": "", "hooks": [{"type": "command", "command": "..."}]},
//!       {"matcher": "", "hooks": [...], "_dot_kit": "core"}
//!     ]
//!   }
//! }
//! ```
//!
//! Hook groups without the provenance field are never touched.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{DotKitError, Result};
use crate::tagged::{is_owned_by, is_tagged, TaggedEntry};

const HOOKS_KEY: &str = "hooks";

/// Placeholder replaced by the plugin's absolute directory
pub const PLUGIN_ROOT_PLACEHOLDER: &str = "${CLAUDE_PLUGIN_ROOT}";

/// A plugin's hooks/hooks.json, with placeholders resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookFragment {
    events: Map<String, Value>,
}

impl HookFragment {
    pub fn load(path: &Path, plugin_root: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, plugin_root, path)
    }

    pub fn parse(content: &str, plugin_root: &Path, path: &Path) -> Result<Self> {
        let invalid = |message: String| DotKitError::FragmentInvalid {
            path: path.to_path_buf(),
            message,
        };

        let mut value: Value = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        substitute_placeholder(&mut value, &plugin_root.to_string_lossy());

        let events = match value.get_mut(HOOKS_KEY).map(Value::take) {
            Some(Value::Object(events)) => events,
            Some(_) => return Err(invalid("\"hooks\" must be an object".to_string())),
            None => return Err(invalid("missing \"hooks\" object".to_string())),
        };

        for (event, entries) in &events {
            let entries = entries
                .as_array()
                .ok_or_else(|| invalid(format!("hooks.{} must be an array", event)))?;
            if entries.iter().any(|e| !e.is_object()) {
                return Err(invalid(format!("hooks.{} entries must be objects", event)));
            }
        }

        Ok(Self { events })
    }

    /// Event names in fragment order
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn entry_count(&self) -> usize {
        self.events
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .sum()
    }
}

/// Replace the plugin-root placeholder in every string of `value`
pub fn substitute_placeholder(value: &mut Value, plugin_root: &str) {
    match value {
        Value::String(s) if s.contains(PLUGIN_ROOT_PLACEHOLDER) => {
            *s = s.replace(PLUGIN_ROOT_PLACEHOLDER, plugin_root);
        }
        Value::Array(items) => {
            for item in items {
                substitute_placeholder(item, plugin_root);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_placeholder(item, plugin_root);
            }
        }
        _ => {}
    }
}

/// Replace `plugin`'s tagged hook groups with the fragment's, returning how many were added.
///
/// Groups owned by the plugin are first removed from every event, so an event
/// dropped between plugin versions does not leave a stale entry behind. Events
/// refilled by the fragment keep their position in the document.
pub fn merge_hooks(
    doc: &mut Value,
    plugin: &str,
    fragment: &HookFragment,
    doc_path: &Path,
) -> Result<usize> {
    let emptied = strip_hooks(doc, doc_path, |entry| is_owned_by(entry, plugin))?;

    let mut added = 0;
    if fragment.entry_count() > 0 {
        let hooks =
            hooks_object(doc, doc_path, true)?.ok_or_else(|| shape(doc_path, "no hooks"))?;
        for (event, entries) in &fragment.events {
            let entries = entries.as_array().map(Vec::as_slice).unwrap_or_default();
            if entries.is_empty() {
                continue;
            }
            let list = hooks
                .entry(event.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
                .ok_or_else(|| shape(doc_path, &format!("hooks.{} must be an array", event)))?;
            for entry in entries {
                list.push(TaggedEntry::new(plugin, entry.clone()).to_json()?);
                added += 1;
            }
        }
    }

    drop_emptied(doc, &emptied.events);
    Ok(added)
}

/// Remove every tagged hook group regardless of event or plugin
pub fn strip_tagged_hooks(doc: &mut Value, doc_path: &Path) -> Result<usize> {
    let stripped = strip_hooks(doc, doc_path, is_tagged)?;
    drop_emptied(doc, &stripped.events);
    Ok(stripped.removed)
}

/// Count tagged hook groups
pub fn count_tagged_hooks(doc: &Value) -> usize {
    doc.get(HOOKS_KEY)
        .and_then(Value::as_object)
        .map(|events| {
            events
                .values()
                .filter_map(Value::as_array)
                .flat_map(|entries| entries.iter())
                .filter(|entry| is_tagged(entry))
                .count()
        })
        .unwrap_or(0)
}

struct Stripped {
    removed: usize,
    /// Events left empty by the removal
    events: Vec<String>,
}

fn strip_hooks(
    doc: &mut Value,
    doc_path: &Path,
    remove: impl Fn(&Value) -> bool,
) -> Result<Stripped> {
    let mut stripped = Stripped {
        removed: 0,
        events: Vec::new(),
    };
    let Some(hooks) = hooks_object(doc, doc_path, false)? else {
        return Ok(stripped);
    };

    for (event, entries) in hooks.iter_mut() {
        // Non-array values under an event are someone else's business
        let Some(list) = entries.as_array_mut() else {
            continue;
        };
        let before = list.len();
        list.retain(|entry| !remove(entry));
        let gone = before - list.len();
        if gone > 0 && list.is_empty() {
            stripped.events.push(event.clone());
        }
        stripped.removed += gone;
    }
    Ok(stripped)
}

/// Drop events emptied by a strip that are still empty, then `hooks` if nothing is left
fn drop_emptied(doc: &mut Value, emptied: &[String]) {
    if emptied.is_empty() {
        return;
    }
    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let now_empty = match root.get_mut(HOOKS_KEY).and_then(Value::as_object_mut) {
        Some(hooks) => {
            for event in emptied {
                if hooks.get(event).and_then(Value::as_array).is_some_and(Vec::is_empty) {
                    hooks.shift_remove(event);
                }
            }
            hooks.is_empty()
        }
        None => false,
    };
    if now_empty {
        root.shift_remove(HOOKS_KEY);
    }
}

fn hooks_object<'a>(
    doc: &'a mut Value,
    doc_path: &Path,
    create: bool,
) -> Result<Option<&'a mut Map<String, Value>>> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| shape(doc_path, "top level must be an object"))?;
    if !root.contains_key(HOOKS_KEY) {
        if !create {
            return Ok(None);
        }
        root.insert(HOOKS_KEY.to_string(), Value::Object(Map::new()));
    }
    root.get_mut(HOOKS_KEY)
        .map(|hooks| {
            hooks
                .as_object_mut()
                .ok_or_else(|| shape(doc_path, "\"hooks\" must be an object"))
        })
        .transpose()
}

fn shape(path: &Path, message: &str) -> DotKitError {
    DotKitError::DocumentShape {
        path: PathBuf::from(path),
        message: message.to_string(),
    }
}
