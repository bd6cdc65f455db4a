//! Task - a single unit of work
//!
//! A task wraps an [`Operation`] with its parameter table and return type.
//! Calling it is two-phase:
//! - `bind`: resolve arguments from context / inputs and validate them
//! - `invoke` / `ainvoke`: run the operation and validate its output
//!
//! ```text
//! Context + Invocation ─▶ bind ─▶ Arguments ─▶ invoke ─▶ validate_output ─▶ Value
//! ```

mod binding;
mod operation;
mod param;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::context::Context;
use crate::error::{BoxError, FieldError, Result, SprinklerError};
use crate::runnable::{validate_id, Invocation, Runnable};
use crate::schema::{OutputShape, Schema, ValueType, OUTPUT_KEY};

pub use operation::{Arguments, Operation, OperationError, OperationResult};
pub use param::ParameterSpec;

/// Immutable, cheaply clonable task handle
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: String,
    params: Vec<ParameterSpec>,
    input_schema: Schema,
    output_type: ValueType,
    output_schema: Schema,
    operation: Operation,
    template: Context,
}

impl Task {
    pub fn builder(id: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(id)
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.inner.params
    }

    pub fn output_type(&self) -> &ValueType {
        &self.inner.output_type
    }

    pub fn is_async(&self) -> bool {
        self.inner.operation.is_async()
    }

    /// Task-level static context (merged under the caller's context)
    pub fn template(&self) -> &Context {
        &self.inner.template
    }

    /// Resolve and validate the arguments of one call
    pub fn bind(&self, context: &Context, invocation: &Invocation) -> Result<Arguments> {
        let working = self.inner.template.layered(context)?;

        let assembled = binding::assemble(&self.inner.params, &working, invocation)
            .map_err(|e| self.input_error(vec![e]))?;
        let validated = self
            .inner
            .input_schema
            .validate(assembled)
            .map_err(|errors| self.input_error(errors))?;

        debug!(task_id = %self.inner.id, args = validated.len(), "arguments bound");
        Ok(Arguments::new(validated))
    }

    /// Run the operation (blocking) and validate its output
    ///
    /// An async operation is driven to completion on a dedicated thread with
    /// its own runtime, so this never re-enters the caller's runtime.
    pub fn invoke(&self, args: Arguments) -> Result<Value> {
        let raw = match &self.inner.operation {
            Operation::Sync(f) => f(args),
            Operation::Async(f) => self.block_on(f(args))?,
        };
        self.validate_output(raw.map_err(|e| self.operation_error(e))?)
    }

    /// Run the operation (async) and validate its output
    ///
    /// A blocking operation runs inline.
    pub async fn ainvoke(&self, args: Arguments) -> Result<Value> {
        let raw = match &self.inner.operation {
            Operation::Sync(f) => f(args),
            Operation::Async(f) => f(args).await,
        };
        self.validate_output(raw.map_err(|e| self.operation_error(e))?)
    }

    /// Check a produced value against the declared return type
    ///
    /// Record return types are validated field by field; anything else is
    /// wrapped under a single field and unwrapped again.
    pub fn validate_output(&self, value: Value) -> Result<Value> {
        let schema = &self.inner.output_schema;

        match (&self.inner.output_type, value) {
            (ValueType::Record(_), Value::Object(map)) => schema
                .validate(map.into_iter().collect())
                .map(|fields| Value::Object(fields.into_iter().collect()))
                .map_err(|errors| self.output_error(errors)),
            (ty @ ValueType::Record(_), other) => {
                let message = ty.coerce(other).err().unwrap_or_default();
                Err(self.output_error(vec![FieldError::new(OUTPUT_KEY, message)]))
            }
            (_, value) => {
                let mut wrapped = IndexMap::with_capacity(1);
                wrapped.insert(OUTPUT_KEY.to_string(), value);
                let mut fields = schema
                    .validate(wrapped)
                    .map_err(|errors| self.output_error(errors))?;
                Ok(fields.shift_remove(OUTPUT_KEY).unwrap_or(Value::Null))
            }
        }
    }

    fn block_on<F>(&self, fut: F) -> Result<OperationResult>
    where
        F: Future<Output = OperationResult> + Send,
    {
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| SprinklerError::RuntimeBridge {
                            task_id: self.inner.id.clone(),
                            details: e.to_string(),
                        })?;
                    Ok(runtime.block_on(fut))
                })
                .join()
                .map_err(|panic| SprinklerError::MemberPanicked {
                    member_id: self.inner.id.clone(),
                    details: panic_message(panic.as_ref()),
                })?
        })
    }

    fn input_error(&self, errors: Vec<FieldError>) -> SprinklerError {
        SprinklerError::InputValidation {
            task_id: self.inner.id.clone(),
            errors,
        }
    }

    fn output_error(&self, errors: Vec<FieldError>) -> SprinklerError {
        SprinklerError::OutputValidation {
            task_id: self.inner.id.clone(),
            errors,
        }
    }

    fn operation_error(&self, error: OperationError) -> SprinklerError {
        let task_id = self.inner.id.clone();
        match error {
            OperationError::Failed(source) => SprinklerError::OperationFailed { task_id, source },
            OperationError::Encode(e) => SprinklerError::OutputEncode {
                task_id,
                details: e.to_string(),
            },
        }
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Runnable for Task {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn output_shape(&self, output: &Value) -> OutputShape {
        self.inner
            .output_type
            .shape()
            .unwrap_or_else(|| OutputShape::of(output))
    }

    #[instrument(name = "task", skip_all, fields(task_id = %self.inner.id))]
    fn run_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        let args = self.bind(context, &invocation)?;
        self.invoke(args)
    }

    #[instrument(name = "task", skip_all, fields(task_id = %self.inner.id))]
    async fn arun_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        let args = self.bind(context, &invocation)?;
        self.ainvoke(args).await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("params", &self.inner.params)
            .field("output_type", &self.inner.output_type)
            .field("operation", &self.inner.operation)
            .finish()
    }
}

// ═══════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════

/// Builder for [`Task`]
///
/// ```
/// use serde_json::json;
/// use sprinkler::{Arguments, ParameterSpec, Task, ValueType};
///
/// let add = Task::builder("add")
///     .param(ParameterSpec::new("a", ValueType::Int))
///     .param(ParameterSpec::new("b", ValueType::Int))
///     .returns(ValueType::Int)
///     .operation(|args: Arguments| Ok(args.get::<i64>("a")? + args.get::<i64>("b")?))
///     .build()
///     .unwrap();
/// assert_eq!(add.params().len(), 2);
/// ```
pub struct TaskBuilder {
    id: String,
    params: Vec<ParameterSpec>,
    output_type: ValueType,
    template: Context,
    operation: Option<Operation>,
}

impl TaskBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: Vec::new(),
            output_type: ValueType::Any,
            template: Context::new(),
            operation: None,
        }
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(mut self, specs: impl IntoIterator<Item = ParameterSpec>) -> Self {
        self.params.extend(specs);
        self
    }

    /// Declared return type (defaults to `Any`)
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.output_type = ty;
        self
    }

    /// Task-level global, overridable by the caller's context
    pub fn global(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template.set_global(key, value);
        self
    }

    pub fn operation<F, R>(mut self, f: F) -> Self
    where
        F: Fn(Arguments) -> std::result::Result<R, BoxError> + Send + Sync + 'static,
        R: Serialize,
    {
        self.operation = Some(Operation::from_fn(f));
        self
    }

    pub fn async_operation<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
        R: Serialize,
    {
        self.operation = Some(Operation::from_async(f));
        self
    }

    pub fn build(self) -> Result<Task> {
        validate_id(&self.id)?;

        let operation = self.operation.ok_or_else(|| SprinklerError::MissingOperation {
            task_id: self.id.clone(),
        })?;

        let mut input_schema = Schema::new();
        for param in &self.params {
            if !input_schema.insert(param.name.clone(), param.rule()) {
                return Err(SprinklerError::DuplicateParameter {
                    task_id: self.id,
                    name: param.name.clone(),
                });
            }
        }

        let output_schema = match &self.output_type {
            ValueType::Record(fields) => Schema::from_record(fields),
            other => Schema::wrapped(other.clone()),
        };

        Ok(Task {
            inner: Arc::new(TaskInner {
                id: self.id,
                params: self.params,
                input_schema,
                output_type: self.output_type,
                output_schema,
                operation,
                template: self.template,
            }),
        })
    }
}
