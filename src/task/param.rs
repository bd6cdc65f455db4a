//! Parameter declarations
//!
//! A [`ParameterSpec`] says where a parameter's value comes from:
//! - context-sourced: looked up in the run [`Context`](crate::Context) under
//!   `lookup_path` (or the parameter's own name when the path is empty)
//! - otherwise: a positional argument, a keyword argument, or the previous
//!   step's output (the whole value, or `lookup_path` inside it)

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::path::KeyPath;
use crate::schema::{FieldRule, FieldValidator, ValueType};

#[derive(Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub is_context_sourced: bool,
    pub lookup_path: KeyPath,
    pub ty: ValueType,
    pub default: Option<Value>,
    pub validator: Option<FieldValidator>,
}

impl ParameterSpec {
    /// Positional / previous-output parameter
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            is_context_sourced: false,
            lookup_path: KeyPath::empty(),
            ty,
            default: None,
            validator: None,
        }
    }

    /// Context-sourced parameter looked up under its own name
    pub fn context(name: impl Into<String>, ty: ValueType) -> Self {
        Self::new(name, ty).from_context()
    }

    pub fn from_context(mut self) -> Self {
        self.is_context_sourced = true;
        self
    }

    /// Explicit lookup path, e.g. `"a.t2"` or `"items[0]"`
    pub fn lookup(mut self, path: impl Into<KeyPath>) -> Self {
        self.lookup_path = path.into();
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn validator<F>(mut self, check: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(check));
        self
    }

    /// Path used for lookups: the explicit one, else the parameter name
    pub fn effective_path(&self) -> KeyPath {
        if self.lookup_path.is_empty() {
            KeyPath::single(self.name.as_str())
        } else {
            self.lookup_path.clone()
        }
    }

    pub fn has_explicit_path(&self) -> bool {
        !self.lookup_path.is_empty()
    }

    /// Validator-table entry for this parameter
    pub(crate) fn rule(&self) -> FieldRule {
        FieldRule {
            ty: self.ty.clone(),
            default: self.default.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("name", &self.name)
            .field("is_context_sourced", &self.is_context_sourced)
            .field("lookup_path", &self.lookup_path)
            .field("ty", &self.ty)
            .field("default", &self.default)
            .finish()
    }
}
