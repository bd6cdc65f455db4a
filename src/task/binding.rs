//! Argument binding
//!
//! Resolution order for one call:
//! 1. context-sourced parameters, grouped by lookup path (shared keys fan out)
//! 2. keyword overrides
//! 3. previous output (explicit paths first, then whole / by name / by position)
//! 4. positional arguments when there is no previous output
//!
//! Anything still unbound is left to the schema (default or "missing").

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::FieldError;
use crate::path::KeyPath;
use crate::runnable::{Invocation, Upstream};
use crate::schema::OutputShape;

use super::param::ParameterSpec;

/// Assemble the unvalidated argument map for `params`
pub(crate) fn assemble(
    params: &[ParameterSpec],
    context: &Context,
    invocation: &Invocation,
) -> Result<IndexMap<String, Value>, FieldError> {
    let mut bound = IndexMap::new();

    // Context-sourced
    let shared = group_by_path(params.iter().filter(|p| p.is_context_sourced));
    let found = context.query(shared.keys());
    for (path, destinations) in &shared {
        if let Some(value) = found.get(path) {
            debug!(path = %path, destinations = destinations.len(), "bound from context");
            distribute(value, destinations, &mut bound);
        }
    }

    for (name, value) in &invocation.kwargs {
        bound.insert(name.clone(), value.clone());
    }

    match &invocation.upstream {
        Some(upstream) => {
            if !invocation.args.is_empty() {
                return Err(FieldError::new(
                    "args",
                    "positional arguments cannot be combined with a previous output",
                ));
            }
            bind_upstream(params, upstream, &mut bound);
        }
        None => bind_positional(params, &invocation.args, &mut bound)?,
    }

    Ok(bound)
}

/// Parameters grouped by effective lookup path, declaration order kept
fn group_by_path<'p>(
    params: impl Iterator<Item = &'p ParameterSpec>,
) -> IndexMap<KeyPath, Vec<&'p str>> {
    let mut groups: IndexMap<KeyPath, Vec<&str>> = IndexMap::new();
    for param in params {
        groups
            .entry(param.effective_path())
            .or_default()
            .push(param.name.as_str());
    }
    groups
}

/// Assign one resolved value to its destination parameters
///
/// One destination gets the whole value. Several destinations and an array
/// zip pairwise, truncated to the shorter side. Otherwise every destination
/// gets the same value.
fn distribute(value: &Value, destinations: &[&str], out: &mut IndexMap<String, Value>) {
    match (destinations, value) {
        ([single], _) => {
            out.insert((*single).to_string(), value.clone());
        }
        (many, Value::Array(items)) => {
            for (name, item) in many.iter().zip(items) {
                out.insert((*name).to_string(), item.clone());
            }
        }
        (many, _) => {
            for name in many {
                out.insert((*name).to_string(), value.clone());
            }
        }
    }
}

fn bind_upstream(params: &[ParameterSpec], upstream: &Upstream, bound: &mut IndexMap<String, Value>) {
    let unbound = |p: &&ParameterSpec| !p.is_context_sourced && !bound.contains_key(&p.name);

    // Explicit paths inside the previous output
    let explicit = group_by_path(params.iter().filter(unbound).filter(|p| p.has_explicit_path()));
    let mut from_paths = IndexMap::new();
    for (path, destinations) in &explicit {
        if let Some(value) = path.resolve(&upstream.value) {
            distribute(value, destinations, &mut from_paths);
        }
    }

    let remaining: Vec<&str> = params
        .iter()
        .filter(unbound)
        .filter(|p| !p.has_explicit_path())
        .map(|p| p.name.as_str())
        .collect();
    bound.extend(from_paths);

    match (remaining.as_slice(), upstream.shape, &upstream.value) {
        ([], _, _) => {}
        ([single], _, value) => {
            bound.insert((*single).to_string(), value.clone());
        }
        (names, OutputShape::KeyedRecord, Value::Object(record)) => {
            for name in names {
                if let Some(value) = record.get(*name) {
                    bound.insert((*name).to_string(), value.clone());
                }
            }
        }
        (names, OutputShape::OrderedSequence, Value::Array(items)) if items.len() >= names.len() => {
            for (name, item) in names.iter().zip(items) {
                bound.insert((*name).to_string(), item.clone());
            }
        }
        (names, shape, _) => {
            debug!(?shape, remaining = names.len(), "previous output left parameters unbound");
        }
    }
}

fn bind_positional(
    params: &[ParameterSpec],
    args: &[Value],
    bound: &mut IndexMap<String, Value>,
) -> Result<(), FieldError> {
    let remaining: Vec<&str> = params
        .iter()
        .filter(|p| !p.is_context_sourced && !bound.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();

    if args.len() > remaining.len() {
        return Err(FieldError::new(
            "args",
            format!(
                "expected at most {} positional arguments, got {}",
                remaining.len(),
                args.len()
            ),
        ));
    }

    for (name, value) in remaining.into_iter().zip(args) {
        bound.insert(name.to_string(), value.clone());
    }
    Ok(())
}
