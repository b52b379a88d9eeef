//! Provenance-tagged entries in shared JSON documents.
//!
//! Every object dot-kit writes into a shared document carries a
//! [`PROVENANCE_FIELD`] whose value names the contributing plugin. Objects
//! without the field belong to someone else and are never modified.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DotKitError, Result};

/// Marker field; its presence identifies an entry owned by dot-kit
pub const PROVENANCE_FIELD: &str = "_dot_kit";

/// A value owned by dot-kit on behalf of a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEntry<T> {
    owner: String,
    value: T,
}

impl<T> TaggedEntry<T> {
    pub fn new(owner: impl Into<String>, value: T) -> Self {
        Self {
            owner: owner.into(),
            value,
        }
    }

    /// Plugin that contributed this entry
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Serialize> TaggedEntry<T> {
    /// Serialize into a JSON object carrying the provenance field
    pub fn to_json(&self) -> Result<Value> {
        let mut map = match serde_json::to_value(&self.value)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        map.remove(PROVENANCE_FIELD);
        map.insert(
            PROVENANCE_FIELD.to_string(),
            Value::String(self.owner.clone()),
        );
        Ok(Value::Object(map))
    }
}

impl<T: DeserializeOwned> TaggedEntry<T> {
    /// Parse a tagged JSON object; `Ok(None)` for entries dot-kit does not own
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        let Some(owner) = owner_of(value) else {
            return Ok(None);
        };
        let mut map = value.as_object().cloned().unwrap_or_default();
        map.remove(PROVENANCE_FIELD);
        let inner = serde_json::from_value(Value::Object(map)).map_err(DotKitError::from)?;
        Ok(Some(Self::new(owner, inner)))
    }
}

/// Owning plugin of a JSON entry, if dot-kit owns it
pub fn owner_of(value: &Value) -> Option<&str> {
    value
        .as_object()
        .and_then(|map| map.get(PROVENANCE_FIELD))
        .and_then(Value::as_str)
}

pub fn is_tagged(value: &Value) -> bool {
    owner_of(value).is_some()
}

pub fn is_owned_by(value: &Value, plugin: &str) -> bool {
    owner_of(value) == Some(plugin)
}
