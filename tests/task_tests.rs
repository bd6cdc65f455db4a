//! # Task Tests
//!
//! - binding from context, keyword overrides, positional args, previous output
//! - shared-key distribution (zip vs whole value)
//! - input / output validation errors name the task
//! - two-phase bind / invoke

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sprinkler::{
    Arguments, Context, Invocation, OutputShape, ParameterSpec, Runnable, SprinklerError, Task,
    Upstream, ValueType,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Task echoing its bound arguments as a record
fn echo(id: &str, params: Vec<ParameterSpec>) -> Task {
    Task::builder(id)
        .params(params)
        .operation(|args: Arguments| Ok(args.into_inner()))
        .build()
        .unwrap()
}

fn field_names(err: &SprinklerError) -> Vec<String> {
    match err {
        SprinklerError::InputValidation { errors, .. }
        | SprinklerError::OutputValidation { errors, .. } => {
            errors.iter().map(|e| e.field.clone()).collect()
        }
        _ => Vec::new(),
    }
}

// ============================================================================
// SHARED-KEY DISTRIBUTION
// ============================================================================

#[test]
fn shared_key_zips_into_destinations() {
    let task = echo(
        "pairwise",
        vec![
            ParameterSpec::context("a", ValueType::Int).lookup("pair"),
            ParameterSpec::context("b", ValueType::Int).lookup("pair"),
        ],
    );
    let ctx = Context::from_global(json!({"pair": [1, 2]})).unwrap();

    let out = task.run_with_context(&ctx, Invocation::new()).unwrap();
    assert_eq!(out, json!({"a": 1, "b": 2}));
}

#[test]
fn single_destination_gets_whole_value() {
    let task = echo(
        "whole",
        vec![ParameterSpec::context("both", ValueType::list(ValueType::Int)).lookup("pair")],
    );
    let ctx = Context::from_global(json!({"pair": [1, 2]})).unwrap();

    let out = task.run_with_context(&ctx, Invocation::new()).unwrap();
    assert_eq!(out, json!({"both": [1, 2]}));
}

#[test]
fn shared_key_truncates_to_shorter_side() {
    let task = echo(
        "short",
        vec![
            ParameterSpec::context("a", ValueType::Int).lookup("pair"),
            ParameterSpec::context("b", ValueType::Int).lookup("pair"),
            ParameterSpec::context("c", ValueType::Int).lookup("pair").default(json!(0)),
        ],
    );
    let ctx = Context::from_global(json!({"pair": [7, 8]})).unwrap();

    let out = task.run_with_context(&ctx, Invocation::new()).unwrap();
    assert_eq!(out, json!({"a": 7, "b": 8, "c": 0}));
}

#[test]
fn shared_string_is_copied_not_split() {
    let task = echo(
        "copies",
        vec![
            ParameterSpec::context("x", ValueType::Str).lookup("word"),
            ParameterSpec::context("y", ValueType::Str).lookup("word"),
        ],
    );
    let ctx = Context::from_global(json!({"word": "ab"})).unwrap();

    let out = task.run_with_context(&ctx, Invocation::new()).unwrap();
    assert_eq!(out, json!({"x": "ab", "y": "ab"}));
}

// ============================================================================
// CONTEXT AND KEYWORD BINDING
// ============================================================================

#[test]
fn falsy_context_value_is_present() {
    let task = echo(
        "falsy",
        vec![
            ParameterSpec::context("n", ValueType::Int).default(json!(9)),
            ParameterSpec::context("s", ValueType::Str).default(json!("fallback")),
        ],
    );
    let ctx = Context::from_global(json!({"n": 0, "s": ""})).unwrap();

    let out = task.run_with_context(&ctx, Invocation::new()).unwrap();
    assert_eq!(out, json!({"n": 0, "s": ""}));
}

#[test]
fn keyword_overrides_context() {
    let task = echo("kw", vec![ParameterSpec::context("level", ValueType::Int)]);
    let ctx = Context::from_global(json!({"level": 1})).unwrap();

    let out = task
        .run_with_context(&ctx, Invocation::new().kwarg("level", 5))
        .unwrap();
    assert_eq!(out, json!({"level": 5}));
}

#[test]
fn history_takes_priority_over_global() {
    let task = echo(
        "hist",
        vec![ParameterSpec::context("value", ValueType::Int).lookup("prev.count")],
    );
    let mut ctx = Context::from_global(json!({"prev.count": 1})).unwrap();
    ctx.add_history(json!({"count": 2}), "prev").unwrap();

    assert_eq!(
        task.run_with_context(&ctx, Invocation::new()).unwrap(),
        json!({"value": 2})
    );
}

#[test]
fn task_globals_yield_to_caller() {
    let task = Task::builder("greet")
        .global("greeting", "hello")
        .param(ParameterSpec::context("greeting", ValueType::Str))
        .param(ParameterSpec::new("name", ValueType::Str))
        .returns(ValueType::Str)
        .operation(|args: Arguments| {
            Ok(format!("{} {}", args.get::<String>("greeting")?, args.get::<String>("name")?))
        })
        .build()
        .unwrap();

    assert_eq!(task.run(Invocation::new().arg("ada")).unwrap(), json!("hello ada"));

    let caller = Context::from_global(json!({"greeting": "hi"})).unwrap();
    assert_eq!(
        task.run_with_context(&caller, Invocation::new().arg("ada")).unwrap(),
        json!("hi ada")
    );
}

#[test]
fn defaults_fill_unbound_params() {
    let task = echo(
        "defaults",
        vec![
            ParameterSpec::new("a", ValueType::Int),
            ParameterSpec::new("b", ValueType::Int).default(json!(10)),
        ],
    );
    assert_eq!(task.run(Invocation::new().arg(1)).unwrap(), json!({"a": 1, "b": 10}));
}

// ============================================================================
// PREVIOUS OUTPUT
// ============================================================================

#[test]
fn previous_record_binds_by_name() {
    let task = echo(
        "by_name",
        vec![
            ParameterSpec::new("x", ValueType::Int),
            ParameterSpec::new("y", ValueType::Int),
        ],
    );
    let upstream = Upstream::new(json!({"y": 2, "x": 1, "z": 3}), OutputShape::KeyedRecord);

    let out = task.run(Invocation::new().upstream(upstream)).unwrap();
    assert_eq!(out, json!({"x": 1, "y": 2}));
}

#[test]
fn previous_sequence_binds_positionally() {
    let task = echo(
        "by_position",
        vec![
            ParameterSpec::new("x", ValueType::Int),
            ParameterSpec::new("y", ValueType::Int),
        ],
    );
    let out = task
        .run(Invocation::new().upstream(Upstream::of(json!([4, 5, 6]))))
        .unwrap();
    assert_eq!(out, json!({"x": 4, "y": 5}));
}

#[test]
fn explicit_path_reads_inside_previous_output() {
    let task = echo(
        "nested",
        vec![ParameterSpec::new("name", ValueType::Str).lookup("user.name")],
    );
    let out = task
        .run(Invocation::new().upstream(Upstream::of(json!({"user": {"name": "ada"}}))))
        .unwrap();
    assert_eq!(out, json!({"name": "ada"}));
}

#[test]
fn positional_args_with_previous_output_rejected() {
    let task = echo("mixed", vec![ParameterSpec::new("x", ValueType::Int)]);
    let err = task
        .run(Invocation::new().arg(1).upstream(Upstream::of(json!(2))))
        .unwrap_err();

    assert!(matches!(err, SprinklerError::InputValidation { ref task_id, .. } if task_id == "mixed"));
    assert_eq!(field_names(&err), ["args"]);
}

// ============================================================================
// INPUT VALIDATION
// ============================================================================

#[test]
fn too_many_positional_args_rejected() {
    let task = echo("one", vec![ParameterSpec::new("x", ValueType::Int)]);
    let err = task.run(Invocation::new().args([1, 2])).unwrap_err();
    assert!(matches!(err, SprinklerError::InputValidation { .. }));
}

#[test]
fn unknown_keyword_rejected() {
    let task = echo("strict", vec![ParameterSpec::new("x", ValueType::Int)]);
    let err = task
        .run(Invocation::new().kwarg("x", 1).kwarg("nope", 2))
        .unwrap_err();
    assert_eq!(field_names(&err), ["nope"]);
}

#[test]
fn missing_and_mistyped_reported_together() {
    let task = echo(
        "both",
        vec![
            ParameterSpec::new("a", ValueType::Int),
            ParameterSpec::new("b", ValueType::Int),
        ],
    );
    let err = task.run(Invocation::new().kwarg("a", "seven")).unwrap_err();

    assert_eq!(field_names(&err), ["a", "b"]);
    let message = err.to_string();
    assert!(message.contains("[SPR-020]"));
    assert!(message.contains("'both'"));
}

#[test]
fn lax_coercion_on_inputs() {
    let task = echo(
        "coerce",
        vec![
            ParameterSpec::new("n", ValueType::Int),
            ParameterSpec::new("f", ValueType::Bool),
        ],
    );
    let out = task
        .run(Invocation::new().kwarg("n", "42").kwarg("f", "yes"))
        .unwrap();
    assert_eq!(out, json!({"n": 42, "f": true}));
}

#[test]
fn custom_validator_runs_after_coercion() {
    let task = echo(
        "positive",
        vec![ParameterSpec::new("n", ValueType::Int).validator(|v| match v.as_i64() {
            Some(n) if n > 0 => Ok(v),
            _ => Err("must be positive".to_string()),
        })],
    );

    assert_eq!(task.run(Invocation::new().kwarg("n", "3")).unwrap(), json!({"n": 3}));
    let err = task.run(Invocation::new().kwarg("n", -1)).unwrap_err();
    assert!(err.to_string().contains("must be positive"));
}

#[test]
fn json_schema_parameter() {
    let ty = ValueType::json_schema(json!({
        "type": "object",
        "required": ["id"],
        "properties": {"id": {"type": "integer"}}
    }))
    .unwrap();
    let task = echo("doc", vec![ParameterSpec::new("doc", ty)]);

    assert!(task.run(Invocation::new().kwarg("doc", json!({"id": 1}))).is_ok());
    assert!(task.run(Invocation::new().kwarg("doc", json!({"id": "x"}))).is_err());
}

// ============================================================================
// OUTPUT VALIDATION
// ============================================================================

#[test]
fn str_return_with_int_output_fails() {
    let task = Task::builder("liar")
        .returns(ValueType::Str)
        .operation(|_| Ok(5))
        .build()
        .unwrap();

    let err = task.run(Invocation::new()).unwrap_err();
    assert!(matches!(err, SprinklerError::OutputValidation { ref task_id, .. } if task_id == "liar"));
    assert!(err.to_string().contains("liar"));
}

#[test]
fn record_return_drops_extra_and_requires_fields() {
    let ty = ValueType::record([
        ("name", ValueType::Str),
        ("age", ValueType::Int),
        ("nick", ValueType::optional(ValueType::Str)),
    ]);
    let ok = Task::builder("person")
        .returns(ty.clone())
        .operation(|_| Ok(json!({"age": "30", "name": "ada", "extra": true})))
        .build()
        .unwrap();
    assert_eq!(
        ok.run(Invocation::new()).unwrap(),
        json!({"name": "ada", "age": 30, "nick": null})
    );

    let missing = Task::builder("partial")
        .returns(ty.clone())
        .operation(|_| Ok(json!({"name": "ada"})))
        .build()
        .unwrap();
    assert_eq!(field_names(&missing.run(Invocation::new()).unwrap_err()), ["age"]);

    let scalar = Task::builder("scalar")
        .returns(ty)
        .operation(|_| Ok(1))
        .build()
        .unwrap();
    assert!(matches!(
        scalar.run(Invocation::new()),
        Err(SprinklerError::OutputValidation { .. })
    ));
}

#[test]
fn output_shape_follows_declaration() {
    let listed = Task::builder("listed")
        .returns(ValueType::list(ValueType::Int))
        .operation(|_| Ok(vec![1, 2]))
        .build()
        .unwrap();
    let untyped = Task::builder("untyped").operation(|_| Ok(1)).build().unwrap();

    assert_eq!(listed.output_shape(&json!({"a": 1})), OutputShape::OrderedSequence);
    assert_eq!(untyped.output_shape(&json!({"a": 1})), OutputShape::KeyedRecord);
    assert_eq!(untyped.output_shape(&json!("s")), OutputShape::Scalar);
}

// ============================================================================
// TWO-PHASE CALL
// ============================================================================

#[test]
fn bind_then_invoke_is_idempotent() {
    let task = Task::builder("sum")
        .params([
            ParameterSpec::new("a", ValueType::Int),
            ParameterSpec::new("b", ValueType::Int),
        ])
        .returns(ValueType::Int)
        .operation(|args: Arguments| Ok(args.get::<i64>("a")? + args.get::<i64>("b")?))
        .build()
        .unwrap();

    let args = task
        .bind(&Context::new(), &Invocation::new().args([3, 4]))
        .unwrap();
    assert_eq!(args.value("a"), Some(&json!(3)));

    let first = task.invoke(args.clone()).unwrap();
    let second = task.invoke(args).unwrap();
    assert_eq!(first, json!(7));
    assert_eq!(first, second);
}

#[test]
fn operation_error_is_propagated() {
    let task = Task::builder("flaky")
        .operation(|_| Err::<Value, sprinkler::BoxError>("service unavailable".into()))
        .build()
        .unwrap();

    let err = task.run(Invocation::new()).unwrap_err();
    assert!(matches!(err, SprinklerError::OperationFailed { ref task_id, .. } if task_id == "flaky"));
    assert!(err.to_string().contains("service unavailable"));
}

#[test]
fn unencodable_return_is_output_error() {
    let task = Task::builder("pairs")
        .operation(|_| Ok(HashMap::from([((1, 2), 3)])))
        .build()
        .unwrap();

    let err = task.run(Invocation::new()).unwrap_err();
    assert!(matches!(err, SprinklerError::OutputEncode { ref task_id, .. } if task_id == "pairs"));
    assert!(err.to_string().contains("[SPR-031]"));
}

#[tokio::test]
async fn unencodable_async_return_is_output_error() {
    let task = Task::builder("pairs")
        .async_operation(|_| async { Ok::<_, sprinkler::BoxError>(HashMap::from([((1, 2), 3)])) })
        .build()
        .unwrap();

    let err = task.arun(Invocation::new()).await.unwrap_err();
    assert!(matches!(err, SprinklerError::OutputEncode { .. }));
}

#[test]
fn float_type_widens_integers() {
    let task = Task::builder("half")
        .param(ParameterSpec::new("x", ValueType::Float))
        .returns(ValueType::Float)
        .operation(|args: Arguments| Ok(args.value("x").cloned().unwrap_or(Value::Null)))
        .build()
        .unwrap();

    let out = task.run(Invocation::new().arg(2)).unwrap();
    assert_eq!(out, json!(2.0));
    assert!(out.is_f64());
}

#[test]
fn argument_decode_names_argument() {
    let task = Task::builder("decode")
        .param(ParameterSpec::new("x", ValueType::Any))
        .operation(|args: Arguments| Ok(args.get::<i64>("x")?))
        .build()
        .unwrap();

    let err = task.run(Invocation::new().arg("not a number")).unwrap_err();
    match err {
        SprinklerError::OperationFailed { source, .. } => {
            assert!(source.to_string().contains("'x'"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn construction_errors() {
    assert!(matches!(
        Task::builder("no_op").build(),
        Err(SprinklerError::MissingOperation { .. })
    ));
    assert!(matches!(
        Task::builder(" padded").operation(|_| Ok(1)).build(),
        Err(SprinklerError::InvalidId { .. })
    ));
    assert!(matches!(
        Task::builder("dup")
            .param(ParameterSpec::new("a", ValueType::Int))
            .param(ParameterSpec::new("a", ValueType::Str))
            .operation(|_| Ok(1))
            .build(),
        Err(SprinklerError::DuplicateParameter { .. })
    ));
}
