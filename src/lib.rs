//! Sprinkler - task / pipeline / group orchestration engine
//!
//! Units of work ([`Task`]) declare where each parameter comes from: the
//! layered run [`Context`] or the previous step's output. They compose into
//! sequential [`Pipeline`]s and concurrent [`Group`]s, all sharing the
//! [`Runnable`] capability (`run`, `run_with_context`, `arun`,
//! `arun_with_context`).
//!
//! ```
//! use serde_json::json;
//! use sprinkler::{Arguments, Invocation, ParameterSpec, Pipeline, Runnable, Task, ValueType};
//!
//! let add = Task::builder("t1")
//!     .params([
//!         ParameterSpec::new("a", ValueType::Int),
//!         ParameterSpec::new("b", ValueType::Int),
//!     ])
//!     .returns(ValueType::Int)
//!     .operation(|args: Arguments| Ok(args.get::<i64>("a")? + args.get::<i64>("b")?))
//!     .build()?;
//! let square = Task::builder("t2")
//!     .param(ParameterSpec::new("a", ValueType::Int))
//!     .returns(ValueType::Int)
//!     .operation(|args: Arguments| Ok(args.get::<i64>("a")?.pow(2)))
//!     .build()?;
//!
//! let p = Pipeline::new("p")?.add(add)?.add(square)?;
//! assert_eq!(p.run(Invocation::new().args([3, 2]))?, json!(25));
//! # Ok::<(), sprinkler::SprinklerError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod path;
pub mod pipeline;
pub mod runnable;
pub mod schema;
pub mod task;

pub use config::EngineConfig;
pub use context::Context;
pub use error::{BoxError, FieldError, FixSuggestion, Result, SprinklerError};
pub use group::{
    Executor, ExecutorKind, Group, IsolatedExecutor, MemberOutcome, ThreadPoolExecutor,
};
pub use path::KeyPath;
pub use pipeline::{Pipeline, RunRecord};
pub use runnable::{Invocation, Runnable, Upstream};
pub use schema::{OutputShape, Schema, ValueType};
pub use task::{Arguments, Operation, OperationError, ParameterSpec, Task, TaskBuilder};
