//! Layered run context (global scope + write-once history scope)
//!
//! Lookup priority for a path: history (first segment = member id, the rest
//! descends into that member's recorded output), then global under the plain
//! key. Missing paths are omitted, never an error.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SprinklerError};
use crate::path::KeyPath;
use crate::schema::type_name;

/// Key/value store threaded through one run
///
/// `Clone` is a deep copy: containers clone their template before each run
/// and Groups clone the working context once per member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Values shared by the entire run (last write wins)
    global: IndexMap<String, Value>,
    /// Member id → recorded output (write once)
    history: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose global scope holds the given mapping
    pub fn from_global(mapping: Value) -> Result<Self> {
        let mut ctx = Self::new();
        ctx.add_global(mapping)?;
        Ok(ctx)
    }

    /// Look up every path; paths found nowhere are simply absent from the result
    pub fn query<'k, I>(&self, keys: I) -> IndexMap<KeyPath, Value>
    where
        I: IntoIterator<Item = &'k KeyPath>,
    {
        keys.into_iter()
            .filter_map(|key| self.lookup(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }

    /// Resolve a single path (history first, then global)
    pub fn lookup(&self, path: &KeyPath) -> Option<&Value> {
        let id = path.head()?;

        if let Some(recorded) = self.history.get(id) {
            if let Some(value) = crate::path::descend(recorded, path.tail()) {
                return Some(value);
            }
        }

        self.global.get(&path.joined())
    }

    /// Merge a mapping into the global scope
    pub fn add_global(&mut self, mapping: Value) -> Result<()> {
        match mapping {
            Value::Object(map) => {
                self.global.extend(map);
                Ok(())
            }
            other => Err(SprinklerError::NotAMapping {
                found: type_name(&other).to_string(),
            }),
        }
    }

    /// Set one global value
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.global.insert(key.into(), value.into());
    }

    /// Record a member's output; each id can be recorded once
    pub fn add_history(&mut self, output: Value, id: &str) -> Result<()> {
        if self.history.contains_key(id) {
            return Err(SprinklerError::DuplicateRecord { id: id.to_string() });
        }
        self.history.insert(id.to_string(), output);
        Ok(())
    }

    /// Union `other` into this context
    ///
    /// Globals from `other` win; history stays write-once, so an id present in
    /// both fails with `DuplicateRecord` and leaves `self` unchanged.
    pub fn merge(&mut self, other: &Context) -> Result<()> {
        if let Some(id) = other.history.keys().find(|id| self.history.contains_key(*id)) {
            return Err(SprinklerError::DuplicateRecord { id: id.clone() });
        }

        self.global
            .extend(other.global.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.history
            .extend(other.history.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    /// Copy of `self` with `overlay` merged on top (used at run start)
    pub fn layered(&self, overlay: &Context) -> Result<Context> {
        let mut working = self.clone();
        working.merge(overlay)?;
        Ok(working)
    }

    pub fn global(&self, key: &str) -> Option<&Value> {
        self.global.get(key)
    }

    pub fn history(&self, id: &str) -> Option<&Value> {
        self.history.get(id)
    }

    /// Recorded ids in recording order
    pub fn history_ids(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.history.is_empty()
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            global: map.into_iter().collect(),
            history: IndexMap::new(),
        }
    }
}

impl TryFrom<Value> for Context {
    type Error = SprinklerError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_global(value)
    }
}
