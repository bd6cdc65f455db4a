//! Wrapped operations and their bound arguments

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BoxError, Result, SprinklerError};

/// Why an operation produced no value
#[derive(Debug)]
pub enum OperationError {
    /// The wrapped function returned an error
    Failed(BoxError),
    /// The returned value has no JSON representation
    Encode(serde_json::Error),
}

/// Result type returned by wrapped operations
pub type OperationResult = std::result::Result<Value, OperationError>;

type SyncFn = dyn Fn(Arguments) -> OperationResult + Send + Sync;
type AsyncFn = dyn Fn(Arguments) -> BoxFuture<'static, OperationResult> + Send + Sync;

/// A callable with a fixed argument table, either blocking or async
#[derive(Clone)]
pub enum Operation {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Operation {
    /// Wrap a blocking function; its return value is serialized to JSON
    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn(Arguments) -> std::result::Result<R, BoxError> + Send + Sync + 'static,
        R: Serialize,
    {
        Self::Sync(Arc::new(move |args| {
            f(args).map_err(OperationError::Failed).and_then(encode)
        }))
    }

    /// Wrap an async function; its return value is serialized to JSON
    pub fn from_async<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
        R: Serialize,
    {
        Self::Async(Arc::new(move |args| {
            let fut = f(args);
            Box::pin(async move { fut.await.map_err(OperationError::Failed).and_then(encode) })
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

fn encode<R: Serialize>(value: R) -> OperationResult {
    serde_json::to_value(value).map_err(OperationError::Encode)
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Operation::Sync"),
            Self::Async(_) => f.write_str("Operation::Async"),
        }
    }
}

/// Validated arguments handed to an operation (name → value, declaration order)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(IndexMap<String, Value>);

impl Arguments {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self(values)
    }

    /// Raw value of an argument
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Deserialize an argument into a concrete type
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.0.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| SprinklerError::ArgumentDecode {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
            details: e.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}
