//! Sprinkler demo - pipeline of groups, run blocking and async

use std::sync::Arc;

use colored::Colorize;
use serde_json::json;
use tracing::info;

use sprinkler::{
    Arguments, EngineConfig, FixSuggestion, Group, Invocation, ParameterSpec, Pipeline, Runnable,
    SprinklerError, Task, ValueType,
};

const DEMO_ID: &str = "demo";

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SprinklerError> {
    let config = EngineConfig::from_env()?;
    info!(executor = %config.executor, max_workers = ?config.max_workers, "engine config");

    let pipeline = Arc::new(build(config)?);
    let inputs = Invocation::new()
        .kwarg("sum", json!([1, 2]))
        .kwarg("concat", json!(["hello", "world"]));

    // Blocking run off the async workers
    let blocking = {
        let pipeline = Arc::clone(&pipeline);
        let inputs = inputs.clone();
        tokio::task::spawn_blocking(move || pipeline.run(inputs))
            .await
            .map_err(|e| SprinklerError::MemberPanicked {
                member_id: DEMO_ID.to_string(),
                details: e.to_string(),
            })??
    };
    println!("{} {}", "run  →".cyan(), blocking);

    let awaited = pipeline.arun(inputs).await?;
    println!("{} {}", "arun →".cyan(), awaited);

    Ok(())
}

/// `demo = [first: {sum, concat}] → [second: {repeat, label}]`
fn build(config: EngineConfig) -> Result<Pipeline, SprinklerError> {
    let sum = Task::builder("sum")
        .params([
            ParameterSpec::new("a", ValueType::Int),
            ParameterSpec::new("b", ValueType::Int),
        ])
        .returns(ValueType::Int)
        .operation(|args: Arguments| Ok(args.get::<i64>("a")? + args.get::<i64>("b")?))
        .build()?;

    let concat = Task::builder("concat")
        .params([
            ParameterSpec::new("a", ValueType::Str),
            ParameterSpec::new("b", ValueType::Str),
        ])
        .returns(ValueType::Str)
        .async_operation(|args: Arguments| async move {
            Ok::<_, sprinkler::BoxError>(args.get::<String>("a")? + &args.get::<String>("b")?)
        })
        .build()?;

    let repeat = Task::builder("repeat")
        .params([
            ParameterSpec::new("concat", ValueType::Str),
            ParameterSpec::new("sum", ValueType::Int),
        ])
        .returns(ValueType::Str)
        .operation(|args: Arguments| {
            Ok(args.get::<String>("concat")?.repeat(args.get::<usize>("sum")?))
        })
        .build()?;

    let label = Task::builder("label")
        .params([
            ParameterSpec::context("text", ValueType::Str).lookup("first.concat"),
            ParameterSpec::context("separator", ValueType::Str),
            ParameterSpec::new("total", ValueType::Int).lookup("sum"),
        ])
        .returns(ValueType::Str)
        .operation(|args: Arguments| {
            Ok(format!(
                "{}{}{}",
                args.get::<String>("text")?,
                args.get::<String>("separator")?,
                args.get::<i64>("total")?
            ))
        })
        .build()?;

    let first = Group::new("first")?
        .with_config(config)
        .add(sum)?
        .add(concat)?;
    let second = Group::new("second")?
        .with_config(config)
        .add(repeat)?
        .add(label)?;

    Pipeline::new(DEMO_ID)?
        .add_global(json!({"separator": "-"}))?
        .add(first)?
        .add(second)
}
