//! Runnable - common invocation capability of Task, Pipeline and Group
//!
//! Every runnable is called with a borrowed caller [`Context`] and an owned
//! [`Invocation`] describing the inputs. `run`/`arun` start from an empty
//! caller context.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Result, SprinklerError};
use crate::group::Executor;
use crate::schema::OutputShape;

#[async_trait]
pub trait Runnable: Send + Sync + fmt::Debug {
    /// Id unique within the container holding this runnable
    fn id(&self) -> &str;

    /// Shape of `output` as seen by the next pipeline step
    fn output_shape(&self, output: &Value) -> OutputShape;

    fn run_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value>;

    async fn arun_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value>;

    fn run(&self, invocation: Invocation) -> Result<Value> {
        self.run_with_context(&Context::new(), invocation)
    }

    async fn arun(&self, invocation: Invocation) -> Result<Value> {
        let context = Context::new();
        self.arun_with_context(&context, invocation).await
    }
}

/// Output of the previous pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub value: Value,
    pub shape: OutputShape,
}

impl Upstream {
    pub fn new(value: Value, shape: OutputShape) -> Self {
        Self { value, shape }
    }

    /// Upstream whose shape is read from the value itself
    pub fn of(value: Value) -> Self {
        let shape = OutputShape::of(&value);
        Self { value, shape }
    }
}

/// Inputs of one call
///
/// Tasks read `args`, `kwargs` and `upstream`. Groups read `kwargs` as
/// per-member inputs keyed by member id, with `default_input` (or else the
/// upstream value) as fallback.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Invocation {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
    pub upstream: Option<Upstream>,
    pub default_input: Option<Value>,
    #[serde(skip)]
    pub executor: Option<Arc<dyn Executor>>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Keyword arguments from a JSON object
    pub fn kwargs(mut self, mapping: Value) -> Result<Self> {
        match mapping {
            Value::Object(map) => {
                self.kwargs.extend(map);
                Ok(self)
            }
            other => Err(SprinklerError::NotAMapping {
                found: crate::schema::type_name(&other).to_string(),
            }),
        }
    }

    pub fn upstream(mut self, upstream: Upstream) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn default_input(mut self, value: impl Into<Value>) -> Self {
        self.default_input = Some(value.into());
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Invocation for a step fed by a previous output
    pub(crate) fn forwarded(upstream: Upstream, executor: Option<Arc<dyn Executor>>) -> Self {
        Self {
            upstream: Some(upstream),
            executor,
            ..Self::default()
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("upstream", &self.upstream)
            .field("default_input", &self.default_input)
            .field("executor", &self.executor.as_ref().map(|e| e.kind()))
            .finish()
    }
}

/// Validate a runnable id
///
/// Ids must be non-empty, without surrounding whitespace, and without dots
/// (dots separate path segments in history lookups).
pub fn validate_id(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        "cannot be empty"
    } else if id.trim() != id {
        "cannot start or end with whitespace"
    } else if id.contains('.') {
        "cannot contain '.' (reserved for lookup paths)"
    } else {
        return Ok(());
    };

    Err(SprinklerError::InvalidId {
        id: id.to_string(),
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_inputs() {
        let inv = Invocation::new()
            .args([json!(3), json!(2)])
            .kwarg("c", "x")
            .default_input(json!(0));
        assert_eq!(inv.args, vec![json!(3), json!(2)]);
        assert_eq!(inv.kwargs["c"], json!("x"));
        assert_eq!(inv.default_input, Some(json!(0)));
        assert!(inv.upstream.is_none());
    }

    #[test]
    fn kwargs_from_object() {
        let inv = Invocation::new().kwargs(json!({"t1": 4, "t2": 4})).unwrap();
        assert_eq!(inv.kwargs.len(), 2);
        assert!(Invocation::new().kwargs(json!([1])).is_err());
    }

    #[test]
    fn upstream_shape_from_value() {
        assert_eq!(Upstream::of(json!([1])).shape, OutputShape::OrderedSequence);
        assert_eq!(Upstream::of(json!({"a": 1})).shape, OutputShape::KeyedRecord);
        assert_eq!(Upstream::of(json!("s")).shape, OutputShape::Scalar);
    }

    #[test]
    fn id_rules() {
        assert!(validate_id("t1").is_ok());
        assert!(validate_id("sum_and_concat").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id(" t").is_err());
        assert!(validate_id("a.b").is_err());
    }
}
