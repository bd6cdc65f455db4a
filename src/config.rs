//! Engine configuration
//!
//! Read from the environment (a `.env` file is loaded first by the binary):
//! - `SPRINKLER_EXECUTOR`: `thread` (default) or `isolated`
//! - `SPRINKLER_MAX_WORKERS`: positive worker count (default: rayon's choice)

use std::env;

use crate::error::{Result, SprinklerError};
use crate::group::ExecutorKind;

pub const EXECUTOR_VAR: &str = "SPRINKLER_EXECUTOR";
pub const MAX_WORKERS_VAR: &str = "SPRINKLER_MAX_WORKERS";

/// Executor settings used by Groups that are not handed an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub executor: ExecutorKind,
    pub max_workers: Option<usize>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = read_var(EXECUTOR_VAR)? {
            config.executor = raw.parse()?;
        }
        if let Some(raw) = read_var(MAX_WORKERS_VAR)? {
            config.max_workers = Some(parse_workers(&raw)?);
        }

        Ok(config)
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }
}

/// Unset and empty are the same; non-unicode is an error
fn read_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(SprinklerError::ConfigError {
            reason: format!("{name}: {e}"),
        }),
    }
}

fn parse_workers(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SprinklerError::ConfigError {
            reason: format!("{MAX_WORKERS_VAR} must be a positive integer, got '{raw}'"),
        }),
    }
}
