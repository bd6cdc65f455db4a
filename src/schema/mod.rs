//! Schema validator tables
//!
//! A [`Schema`] is built once per task (one for inputs, one for the output)
//! and maps each field name to its declared type, optional default and an
//! optional extra validator. Validation is a pure function of the input map.

mod types;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::FieldError;

pub use types::{type_name, CompiledSchema, OutputShape, ValueType};

/// Field key used to wrap non-record return values
pub const OUTPUT_KEY: &str = "output";

/// Extra per-field check run after type coercion
pub type FieldValidator = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// One entry of a validator table
#[derive(Clone)]
pub struct FieldRule {
    pub ty: ValueType,
    pub default: Option<Value>,
    pub validator: Option<FieldValidator>,
}

impl FieldRule {
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            default: None,
            validator: None,
        }
    }

    /// Coerce to the declared type, then run the extra validator
    pub fn apply(&self, value: Value) -> Result<Value, String> {
        let coerced = self.ty.coerce(value)?;
        match &self.validator {
            Some(check) => check(coerced),
            None => Ok(coerced),
        }
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Name → rule table
#[derive(Debug, Clone)]
pub struct Schema {
    fields: IndexMap<String, FieldRule>,
    /// Reject names without a rule (drop them when false)
    strict: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            fields: IndexMap::new(),
            strict: true,
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field schema wrapping a return type under [`OUTPUT_KEY`]
    pub fn wrapped(ty: ValueType) -> Self {
        let mut schema = Self::new();
        schema.insert(OUTPUT_KEY, FieldRule::new(ty));
        schema
    }

    /// Schema whose fields are the fields of a record type (extra keys dropped)
    pub fn from_record(fields: &[(String, ValueType)]) -> Self {
        let mut schema = Self {
            strict: false,
            ..Self::default()
        };
        for (name, ty) in fields {
            let mut rule = FieldRule::new(ty.clone());
            if ty.is_optional() {
                rule.default = Some(Value::Null);
            }
            schema.insert(name.clone(), rule);
        }
        schema
    }

    /// Insert a rule; returns false if the name was already present
    pub fn insert(&mut self, name: impl Into<String>, rule: FieldRule) -> bool {
        self.fields.insert(name.into(), rule).is_none()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a value map against the table
    ///
    /// Unknown names and missing names without default are errors; defaults
    /// are inserted as declared. All failures are reported together.
    pub fn validate(
        &self,
        mut values: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut validated = IndexMap::with_capacity(self.fields.len());

        for (name, rule) in &self.fields {
            match values.shift_remove(name) {
                Some(value) => match rule.apply(value) {
                    Ok(v) => {
                        validated.insert(name.clone(), v);
                    }
                    Err(message) => errors.push(FieldError::new(name.as_str(), message)),
                },
                None => match &rule.default {
                    Some(default) => {
                        validated.insert(name.clone(), default.clone());
                    }
                    None => errors.push(FieldError::new(name.as_str(), "missing required value")),
                },
            }
        }

        if self.strict {
            for name in values.keys() {
                errors.push(FieldError::new(name.as_str(), "unexpected argument"));
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }
}
