//! Pipeline - sequential composition of runnables
//!
//! ```text
//! caller inputs ─▶ member[0] ─▶ member[1] ─▶ … ─▶ member[n-1] ─▶ output
//!                     │            │                 │
//!                     └── history ─┴──── history ────┘   (working context)
//! ```
//!
//! The first member receives the caller's invocation; every later member
//! receives the previous output as its upstream value. Each output is
//! recorded under the member id before the next member is bound.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::context::Context;
use crate::error::{Result, SprinklerError};
use crate::runnable::{validate_id, Invocation, Runnable, Upstream};
use crate::schema::OutputShape;

/// Final output plus the working context of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub output: Value,
    pub context: Context,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    members: IndexMap<String, Arc<dyn Runnable>>,
    template: Context,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            id,
            members: IndexMap::new(),
            template: Context::new(),
        })
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

    /// Merge globals into the pipeline's static context
    pub fn add_global(mut self, mapping: Value) -> Result<Self> {
        self.template.add_global(mapping)?;
        Ok(self)
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

    /// Run and keep the working context for inspection
    #[instrument(name = "pipeline", skip_all, fields(pipeline_id = %self.id, run_id = %Uuid::new_v4()))]
    pub fn run_with_history(&self, context: &Context, invocation: Invocation) -> Result<RunRecord> {
        let mut working = self.template.layered(context)?;
        let mut steps = Steps::new(invocation);
        info!(members = self.members.len(), "pipeline started");

        for member in self.members.values() {
            let step = steps.next_invocation();
            let output = member.run_with_context(&working, step)?;
            steps.record(member.as_ref(), &mut working, output)?;
        }

        info!("pipeline completed");
        Ok(RunRecord {
            output: steps.finish(),
            context: working,
        })
    }

    #[instrument(name = "pipeline", skip_all, fields(pipeline_id = %self.id, run_id = %Uuid::new_v4()))]
    pub async fn arun_with_history(
        &self,
        context: &Context,
        invocation: Invocation,
    ) -> Result<RunRecord> {
        let mut working = self.template.layered(context)?;
        let mut steps = Steps::new(invocation);
        info!(members = self.members.len(), "pipeline started");

        for member in self.members.values() {
            let step = steps.next_invocation();
            let output = member.arun_with_context(&working, step).await?;
            steps.record(member.as_ref(), &mut working, output)?;
        }

        info!("pipeline completed");
        Ok(RunRecord {
            output: steps.finish(),
            context: working,
        })
    }
}

/// Threads the previous output from one member to the next
struct Steps {
    first: Option<Invocation>,
    previous: Option<Upstream>,
    executor: Option<Arc<dyn crate::group::Executor>>,
}

impl Steps {
    fn new(invocation: Invocation) -> Self {
        Self {
            executor: invocation.executor.clone(),
            first: Some(invocation),
            previous: None,
        }
    }

    fn next_invocation(&mut self) -> Invocation {
        match (self.first.take(), self.previous.take()) {
            (Some(first), _) => first,
            (None, Some(upstream)) => Invocation::forwarded(upstream, self.executor.clone()),
            (None, None) => Invocation::default(),
        }
    }

    fn record(&mut self, member: &dyn Runnable, working: &mut Context, output: Value) -> Result<()> {
        working.add_history(output.clone(), member.id())?;
        debug!(member_id = member.id(), "member output recorded");
        let shape = member.output_shape(&output);
        self.previous = Some(Upstream::new(output, shape));
        Ok(())
    }

    fn finish(self) -> Value {
        self.previous.map(|u| u.value).unwrap_or(Value::Null)
    }
}

#[async_trait]
impl Runnable for Pipeline {
    fn id(&self) -> &str {
        &self.id
    }

    fn output_shape(&self, output: &Value) -> OutputShape {
        match self.members.last() {
            Some((_, member)) => member.output_shape(output),
            None => OutputShape::of(output),
        }
    }

    fn run_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        self.run_with_history(context, invocation).map(|r| r.output)
    }

    async fn arun_with_context(&self, context: &Context, invocation: Invocation) -> Result<Value> {
        self.arun_with_history(context, invocation)
            .await
            .map(|r| r.output)
    }
}
