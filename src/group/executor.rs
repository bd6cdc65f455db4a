//! Executors - worker pools used by the blocking Group fan-out
//!
//! - [`ThreadPoolExecutor`]: members run on a rayon pool, sharing memory
//! - [`IsolatedExecutor`]: same pool, but each member's context and input are
//!   serialized before dispatch and its output serialized back, so nothing
//!   but plain data crosses the boundary
//!
//! Every job is submitted before any result is read; outcomes come back in
//! job order, one per member. A panicking member becomes a `MemberPanicked`
//! outcome without affecting its siblings.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, SprinklerError};
use crate::runnable::{Invocation, Runnable};
use crate::task::panic_message;

/// Executor flavour, selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    #[serde(rename = "thread")]
    ThreadPool,
    Isolated,
}

impl FromStr for ExecutorKind {
    type Err = SprinklerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" | "threads" | "thread_pool" => Ok(Self::ThreadPool),
            "isolated" | "process" => Ok(Self::Isolated),
            other => Err(SprinklerError::ConfigError {
                reason: format!("unknown executor '{other}' (expected thread or isolated)"),
            }),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadPool => f.write_str("thread"),
            Self::Isolated => f.write_str("isolated"),
        }
    }
}

/// One member call handed to an executor
#[derive(Debug)]
pub struct MemberJob {
    pub member: Arc<dyn Runnable>,
    pub context: Context,
    pub invocation: Invocation,
}

/// Result of one member call
#[derive(Debug)]
pub struct MemberOutcome {
    pub member_id: String,
    pub result: Result<Value>,
}

pub trait Executor: Send + Sync + fmt::Debug {
    fn kind(&self) -> ExecutorKind;

    /// Run every job and return one outcome per job, in job order
    fn execute(&self, jobs: Vec<MemberJob>) -> Vec<MemberOutcome>;
}

/// Build an executor for one Group call
pub fn create(kind: ExecutorKind, max_workers: Option<usize>) -> Result<Arc<dyn Executor>> {
    Ok(match kind {
        ExecutorKind::ThreadPool => Arc::new(ThreadPoolExecutor::new(max_workers)?),
        ExecutorKind::Isolated => Arc::new(IsolatedExecutor::new(max_workers)?),
    })
}

fn build_pool(max_workers: Option<usize>, prefix: &'static str) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));
    if let Some(n) = max_workers {
        builder = builder.num_threads(n);
    }
    builder.build().map_err(|e| SprinklerError::PoolBuild {
        details: e.to_string(),
    })
}

fn guarded<F>(member_id: &str, call: F) -> Result<Value>
where
    F: FnOnce() -> Result<Value>,
{
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| {
        Err(SprinklerError::MemberPanicked {
            member_id: member_id.to_string(),
            details: panic_message(panic.as_ref()),
        })
    })
}

// ═══════════════════════════════════════════
// THREAD POOL
// ═══════════════════════════════════════════

pub struct ThreadPoolExecutor {
    pool: ThreadPool,
}

impl ThreadPoolExecutor {
    /// `None` lets rayon pick the worker count
    pub fn new(max_workers: Option<usize>) -> Result<Self> {
        Ok(Self {
            pool: build_pool(max_workers, "sprinkler-worker")?,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for ThreadPoolExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::ThreadPool
    }

    fn execute(&self, jobs: Vec<MemberJob>) -> Vec<MemberOutcome> {
        debug!(jobs = jobs.len(), workers = self.workers(), "dispatching to thread pool");
        self.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let member_id = job.member.id().to_string();
                    let result = guarded(&member_id, || {
                        job.member.run_with_context(&job.context, job.invocation)
                    });
                    MemberOutcome { member_id, result }
                })
                .collect()
        })
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("workers", &self.workers())
            .finish()
    }
}

// ═══════════════════════════════════════════
// ISOLATED
// ═══════════════════════════════════════════

/// Serialized form of a member call
struct Envelope {
    member: Arc<dyn Runnable>,
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    context: Context,
    invocation: Invocation,
}

pub struct IsolatedExecutor {
    pool: ThreadPool,
}

impl IsolatedExecutor {
    pub fn new(max_workers: Option<usize>) -> Result<Self> {
        Ok(Self {
            pool: build_pool(max_workers, "sprinkler-isolated")?,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn seal(job: MemberJob) -> std::result::Result<Envelope, MemberOutcome> {
        let MemberJob {
            member,
            context,
            invocation,
        } = job;
        match serde_json::to_vec(&Payload {
            context,
            invocation,
        }) {
            Ok(payload) => Ok(Envelope { member, payload }),
            Err(e) => Err(MemberOutcome {
                member_id: member.id().to_string(),
                result: Err(executor_error(member.id(), "encode input", e)),
            }),
        }
    }

    fn open(envelope: Envelope) -> MemberOutcome {
        let member_id = envelope.member.id().to_string();
        let result = guarded(&member_id, || {
            let Payload {
                context,
                invocation,
            } = serde_json::from_slice(&envelope.payload)
                .map_err(|e| executor_error(&member_id, "decode input", e))?;

            let output = envelope.member.run_with_context(&context, invocation)?;

            let bytes = serde_json::to_vec(&output)
                .map_err(|e| executor_error(&member_id, "encode output", e))?;
            serde_json::from_slice(&bytes).map_err(|e| executor_error(&member_id, "decode output", e))
        });
        MemberOutcome { member_id, result }
    }
}

fn executor_error(member_id: &str, stage: &str, e: serde_json::Error) -> SprinklerError {
    SprinklerError::Executor {
        member_id: member_id.to_string(),
        details: format!("{stage}: {e}"),
    }
}

impl Executor for IsolatedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Isolated
    }

    fn execute(&self, jobs: Vec<MemberJob>) -> Vec<MemberOutcome> {
        debug!(jobs = jobs.len(), workers = self.workers(), "dispatching to isolated pool");
        let sealed: Vec<_> = jobs.into_iter().map(Self::seal).collect();
        self.pool.install(|| {
            sealed
                .into_par_iter()
                .map(|job| match job {
                    Ok(envelope) => Self::open(envelope),
                    Err(outcome) => outcome,
                })
                .collect()
        })
    }
}

impl fmt::Debug for IsolatedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedExecutor")
            .field("workers", &self.workers())
            .finish()
    }
}
