//! Declared value types and their coercion rules
//!
//! Coercion is lax in the numeric direction (strings/floats → int when
//! lossless) and strict for strings (an int is never a str).

use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Result, SprinklerError};

/// Shape of a runnable's output, used when it feeds the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputShape {
    Scalar,
    OrderedSequence,
    KeyedRecord,
}

impl OutputShape {
    /// Shape of a concrete value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::OrderedSequence,
            Value::Object(_) => Self::KeyedRecord,
            _ => Self::Scalar,
        }
    }
}

/// JSON Schema compiled once at declaration
#[derive(Clone)]
pub struct CompiledSchema {
    document: Value,
    validator: Arc<Validator>,
}

impl CompiledSchema {
    pub fn compile(document: Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SprinklerError::InvalidSchema {
                details: e.to_string(),
            })?;
        Ok(Self {
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn check(&self, value: &Value) -> std::result::Result<(), String> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledSchema").field(&self.document).finish()
    }
}

impl PartialEq for CompiledSchema {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

/// Declared type of a parameter or return value
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    List(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Map(Box<ValueType>),
    Record(Vec<(String, ValueType)>),
    Optional(Box<ValueType>),
    Union(Vec<ValueType>),
    JsonSchema(CompiledSchema),
}

impl ValueType {
    pub fn list(item: ValueType) -> Self {
        Self::List(Box::new(item))
    }

    pub fn map(value: ValueType) -> Self {
        Self::Map(Box::new(value))
    }

    pub fn optional(inner: ValueType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn tuple(items: impl IntoIterator<Item = ValueType>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    pub fn union(members: impl IntoIterator<Item = ValueType>) -> Self {
        Self::Union(members.into_iter().collect())
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, ValueType)>,
        S: Into<String>,
    {
        Self::Record(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    /// Type checked by a JSON Schema document
    pub fn json_schema(document: Value) -> Result<Self> {
        Ok(Self::JsonSchema(CompiledSchema::compile(document)?))
    }

    /// Output shape implied by the declaration, if the type fixes one
    pub fn shape(&self) -> Option<OutputShape> {
        match self {
            Self::Null | Self::Bool | Self::Int | Self::Float | Self::Str => {
                Some(OutputShape::Scalar)
            }
            Self::List(_) | Self::Tuple(_) => Some(OutputShape::OrderedSequence),
            Self::Map(_) | Self::Record(_) => Some(OutputShape::KeyedRecord),
            Self::Any | Self::Optional(_) | Self::Union(_) | Self::JsonSchema(_) => None,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_) | Self::Any | Self::Null)
    }

    /// Check `value` against this type, returning the coerced value
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (Self::Any, v) => Ok(v),

            (Self::Null, Value::Null) => Ok(Value::Null),

            (Self::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::Bool, Value::Number(n)) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
            (Self::Bool, Value::Number(n)) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
            (Self::Bool, Value::String(s)) if parse_bool(&s).is_some() => {
                Ok(Value::Bool(parse_bool(&s).unwrap_or_default()))
            }

            (Self::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            (Self::Int, Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(mismatch(self, &Value::Number(n))),
            },
            (Self::Int, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::from(i)),
                Err(_) => Err(mismatch(self, &Value::String(s))),
            },

            (Self::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(self, &Value::Number(n))),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(self, &Value::String(s))),

            (Self::Str, Value::String(s)) => Ok(Value::String(s)),

            (Self::List(item), Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| item.coerce(v).map_err(|e| format!("[{i}]: {e}")))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),

            (Self::Tuple(types), Value::Array(items)) => {
                if items.len() != types.len() {
                    return Err(format!(
                        "expected tuple of {} items, got {}",
                        types.len(),
                        items.len()
                    ));
                }
                types
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(i, (t, v))| t.coerce(v).map_err(|e| format!("[{i}]: {e}")))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::Array)
            }

            (Self::Map(inner), Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| match inner.coerce(v) {
                    Ok(v) => Ok((k, v)),
                    Err(e) => Err(format!("[{k}]: {e}")),
                })
                .collect::<std::result::Result<Map<_, _>, _>>()
                .map(Value::Object),

            (Self::Record(fields), Value::Object(mut map)) => {
                let mut out = Map::new();
                for (name, ty) in fields {
                    match map.remove(name) {
                        Some(v) => {
                            out.insert(name.clone(), ty.coerce(v).map_err(|e| format!("{name}: {e}"))?);
                        }
                        None if ty.is_optional() => {
                            out.insert(name.clone(), Value::Null);
                        }
                        None => return Err(format!("{name}: missing field")),
                    }
                }
                Ok(Value::Object(out))
            }

            (Self::Optional(_), Value::Null) => Ok(Value::Null),
            (Self::Optional(inner), v) => inner.coerce(v),

            (Self::Union(members), v) => {
                let mut failures = Vec::with_capacity(members.len());
                for member in members {
                    match member.coerce(v.clone()) {
                        Ok(coerced) => return Ok(coerced),
                        Err(e) => failures.push(e),
                    }
                }
                Err(format!("no union member matched ({})", failures.join(" | ")))
            }

            (Self::JsonSchema(schema), v) => schema.check(&v).map(|()| v),

            (expected, v) => Err(mismatch(expected, &v)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Null => f.write_str("null"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::List(item) => write!(f, "list[{item}]"),
            Self::Tuple(items) => write!(f, "tuple[{}]", join(items)),
            Self::Map(value) => write!(f, "map[str, {value}]"),
            Self::Record(fields) => {
                let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "record{{{}}}", names.join(", "))
            }
            Self::Optional(inner) => write!(f, "optional[{inner}]"),
            Self::Union(members) => write!(f, "union[{}]", join(members)),
            Self::JsonSchema(_) => f.write_str("json-schema"),
        }
    }
}

fn join(types: &[ValueType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn mismatch(expected: &ValueType, got: &Value) -> String {
    let mut shown = got.to_string();
    if shown.chars().count() > 40 {
        shown = shown.chars().take(37).chain("...".chars()).collect();
    }
    format!("expected {expected}, got {} {shown}", type_name(got))
}

/// Short JSON type name for messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_coercion() {
        assert_eq!(ValueType::Int.coerce(json!(5)), Ok(json!(5)));
        assert_eq!(ValueType::Int.coerce(json!("12")), Ok(json!(12)));
        assert_eq!(ValueType::Int.coerce(json!(3.0)), Ok(json!(3)));
        assert!(ValueType::Int.coerce(json!(3.5)).is_err());
        assert!(ValueType::Int.coerce(json!("hello")).is_err());
        assert!(ValueType::Int.coerce(json!(null)).is_err());
    }

    #[test]
    fn str_is_strict() {
        assert_eq!(ValueType::Str.coerce(json!("a")), Ok(json!("a")));
        let err = ValueType::Str.coerce(json!(5)).unwrap_err();
        assert_eq!(err, "expected str, got int 5");
    }

    #[test]
    fn float_and_bool() {
        let widened = ValueType::Float.coerce(json!(2)).unwrap();
        assert_eq!(widened, json!(2.0));
        assert!(widened.is_f64());
        assert_eq!(ValueType::Float.coerce(json!("2.5")), Ok(json!(2.5)));
        assert_eq!(ValueType::Bool.coerce(json!("yes")), Ok(json!(true)));
        assert_eq!(ValueType::Bool.coerce(json!(0)), Ok(json!(false)));
        assert!(ValueType::Bool.coerce(json!(2)).is_err());
    }

    #[test]
    fn map_coerces_values() {
        let ty = ValueType::map(ValueType::Int);
        assert_eq!(ty.coerce(json!({"a": "1"})), Ok(json!({"a": 1})));
    }

    #[test]
    fn tuple_requires_exact_length() {
        let ty = ValueType::tuple([ValueType::Int, ValueType::Int]);
        assert_eq!(ty.coerce(json!([3, "5"])), Ok(json!([3, 5])));
        assert!(ty.coerce(json!([3])).unwrap_err().contains("tuple of 2"));
    }

    #[test]
    fn nested_error_paths() {
        let ty = ValueType::list(ValueType::Int);
        let err = ty.coerce(json!([1, 2, "x"])).unwrap_err();
        assert!(err.starts_with("[2]:"), "{err}");
    }

    #[test]
    fn record_fields() {
        let ty = ValueType::record([
            ("a", ValueType::Int),
            ("b", ValueType::optional(ValueType::Str)),
        ]);
        assert_eq!(
            ty.coerce(json!({"a": "1", "extra": true})),
            Ok(json!({"a": 1, "b": null}))
        );
        assert!(ty.coerce(json!({"b": "x"})).unwrap_err().contains("a: missing"));
    }

    #[test]
    fn union_first_match_wins() {
        let ty = ValueType::union([ValueType::Int, ValueType::Str]);
        assert_eq!(ty.coerce(json!("7")), Ok(json!(7)));
        assert_eq!(ty.coerce(json!("seven")), Ok(json!("seven")));
        assert!(ty.coerce(json!([1])).is_err());
    }

    #[test]
    fn optional_accepts_null() {
        let ty = ValueType::optional(ValueType::Int);
        assert_eq!(ty.coerce(json!(null)), Ok(json!(null)));
        assert_eq!(ty.coerce(json!(4)), Ok(json!(4)));
    }

    #[test]
    fn json_schema_type() {
        let ty = ValueType::json_schema(json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        }))
        .unwrap();
        assert!(ty.coerce(json!({"name": "x"})).is_ok());
        assert!(ty.coerce(json!({"name": 1})).is_err());
        assert!(ty.coerce(json!({})).is_err());
    }

    #[test]
    fn invalid_json_schema_fails_at_declaration() {
        let err = ValueType::json_schema(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, SprinklerError::InvalidSchema { .. }));
    }

    #[test]
    fn declared_shapes() {
        assert_eq!(ValueType::Int.shape(), Some(OutputShape::Scalar));
        assert_eq!(
            ValueType::list(ValueType::Any).shape(),
            Some(OutputShape::OrderedSequence)
        );
        assert_eq!(
            ValueType::map(ValueType::Any).shape(),
            Some(OutputShape::KeyedRecord)
        );
        assert_eq!(ValueType::Any.shape(), None);
    }

    #[test]
    fn value_shapes() {
        assert_eq!(OutputShape::of(&json!([1])), OutputShape::OrderedSequence);
        assert_eq!(OutputShape::of(&json!({})), OutputShape::KeyedRecord);
        assert_eq!(OutputShape::of(&json!("abc")), OutputShape::Scalar);
    }
}
