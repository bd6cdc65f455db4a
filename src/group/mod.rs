//! Group - concurrent fan-out / fan-in of runnables
//!
//! Every member runs against its own deep copy of the working context and
//! receives its own input:
//! 1. the keyword input named after the member id
//! 2. else the invocation's default input
//! 3. else the previous output (when the group is a pipeline step)
//! 4. else nothing
//!
//! Results are collected into `{member_id: output}`.
//!
//! Blocking runs go through an [`Executor`] (caller-supplied, or created
//! from the group's [`EngineConfig`] for the duration of one call). Async
//! runs use a tokio `JoinSet` and fail fast on the first member error.

mod executor;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{FieldError, Result, SprinklerError};
use crate::runnable::{validate_id, Invocation, Runnable, Upstream};
use crate::schema::OutputShape;
use crate::task::panic_message;

pub use executor::{
    create as create_executor, Executor, ExecutorKind, IsolatedExecutor, MemberJob, MemberOutcome,
    ThreadPoolExecutor,
};

#[derive(Debug, Clone)]
pub struct Group {
    id: String,
    members: IndexMap<String, Arc<dyn Runnable>>,
    template: Context,
    config: EngineConfig,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            id,
            members: IndexMap::new(),
            template: Context::new(),
            config: EngineConfig::default(),
        })
    }

    /// Executor settings used when no executor is passed in
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor_kind(mut self, kind: ExecutorKind) -> Self {
        self.config.executor = kind;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = Some(max_workers);
        self
    }

    pub fn add(self, member: impl Runnable + 'static) -> Result<Self> {
        self.add_shared(Arc::new(member))
    }

    pub fn add_shared(mut self, member: Arc<dyn Runnable>) -> Result<Self> {
        let member_id = member.id().to_string();
        if self.members.contains_key(&member_id) {
            return Err(SprinklerError::DuplicateMember {
                container_id: self.id,
                member_id,
            });
        }
        self.members.insert(member_id, member);
        Ok(self)
    }

    pub fn add_all<I>(self, members: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Runnable>>,
    {
        members.into_iter().try_fold(self, Self::add_shared)
    }

    /// Merge globals into the group's static context
    pub fn add_global(mut self, mapping: Value) -> Result<Self> {
        self.template.add_global(mapping)?;
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn members(&self) -> impl Iterator<Item = &Arc<dyn Runnable>> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run every member (blocking) and return each member's own result
    ///
    /// Nothing is recorded and no member failure aborts the call, so sibling
    /// results stay available when one member fails. `Err` only reports
    /// problems preventing dispatch (bad inputs, context merge, pool build).
    #[instrument(name = "group", skip_all, fields(group_id = %self.id, run_id = %Uuid::new_v4()))]
    pub fn run_outcomes(
        &self,
        context: &Context,
        invocation: Invocation,
    ) -> Result<Vec<MemberOutcome>> {
        let working = self.template.layered(context)?;
        self.dispatch(&working, invocation)
    }

    fn dispatch(&self, working: &Context, invocation: Invocation) -> Result<Vec<MemberOutcome>> {
        self.check_inputs(&invocation)?;
        let jobs = self.jobs(working, &invocation);
        info!(members = jobs.len(), "group started");

        Ok(match &invocation.executor {
            Some(executor) => executor.execute(jobs),
            None => {
                // Pool lives for this call only
                let executor = create_executor(self.config.executor, self.config.max_workers)?;
                executor.execute(jobs)
            }
        })
    }

    fn check_inputs(&self, invocation: &Invocation) -> Result<()> {
        if !invocation.args.is_empty() {
            return Err(SprinklerError::InputValidation {
                task_id: self.id.clone(),
                errors: vec![FieldError::new(
                    "args",
                    "groups take inputs keyed by member id, not positional arguments",
                )],
            });
        }
        for name in invocation.kwargs.keys() {
            if !self.members.contains_key(name) {
                warn!(group_id = %self.id, input = %name, "input names no member, ignored");
            }
        }
        Ok(())
    }

    fn member_invocation(&self, member_id: &str, invocation: &Invocation) -> Invocation {
        let input = invocation
            .kwargs
            .get(member_id)
            .or(invocation.default_input.as_ref());
        let upstream = match input {
            Some(value) => Some(Upstream::of(value.clone())),
            None => invocation.upstream.clone(),
        };
        Invocation {
            upstream,
            executor: invocation.executor.clone(),
            ..Invocation::default()
        }
    }

    fn jobs(&self, working: &Context, invocation: &Invocation) -> Vec<MemberJob> {
        self.members
            .iter()
            .map(|(id, member)| MemberJob {
                member: Arc::clone(member),
                context: working.clone(),
                invocation: self.member_invocation(id, invocation),
            })
            .collect()
    }

    /// Fan in outcomes in member order; the first failure aborts the call
    fn collect(&self, working: &mut Context, outcomes: Vec<MemberOutcome>) -> Result<Value> {
        let mut output = Map::with_capacity(outcomes.len());
        for MemberOutcome { member_id, result } in outcomes {
            let value = result?;
            working.add_history(value.clone(), &member_id)?;
            debug!(member_id = %member_id, "member output recorded");
            output.insert(member_id, value);
        }
        Ok(Value::Object(output))
    }
}

#[async_trait]
impl Runnable for Group {
    fn id(&self) -> &str {
        &self.id
    }

    fn output_shape(&self, _output: &Value) -> OutputShape {
        OutputShape::KeyedRecord
    }

    #[instrument(name = "group", skip_all, fields(group_id = %self.id, run_id = %Uuid::new_v4()))]
    fn run_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        let mut working = self.template.layered(context)?;
        let outcomes = self.dispatch(&working, invocation)?;
        let output = self.collect(&mut working, outcomes)?;
        info!("group completed");
        Ok(output)
    }

    #[instrument(name = "group", skip_all, fields(group_id = %self.id, run_id = %Uuid::new_v4()))]
    async fn arun_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        self.check_inputs(&invocation)?;
        let mut working = self.template.layered(context)?;
        let jobs = self.jobs(&working, &invocation);
        info!(members = jobs.len(), "group started");

        let mut set = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            set.spawn(async move {
                let MemberJob {
                    member,
                    context,
                    invocation,
                } = job;
                let result = AssertUnwindSafe(member.arun_with_context(&context, invocation))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(SprinklerError::MemberPanicked {
                            member_id: member.id().to_string(),
                            details: panic_message(panic.as_ref()),
                        })
                    });
                (index, member.id().to_string(), result)
            });
        }

        // Fail fast: returning early drops the set and aborts the rest
        let mut slots: Vec<Option<MemberOutcome>> = (0..set.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (index, member_id, result) = joined.map_err(|e| SprinklerError::MemberPanicked {
                member_id: self.id.clone(),
                details: e.to_string(),
            })?;
            let value = result?;
            slots[index] = Some(MemberOutcome {
                member_id,
                result: Ok(value),
            });
        }

        let output = self.collect(&mut working, slots.into_iter().flatten().collect())?;
        info!("group completed");
        Ok(output)
    }
}
