//! Error types with fix suggestions
//!
//! Error code ranges:
//! - SPR-000-009: Construction errors (ids, operations, members)
//! - SPR-010-019: Context errors
//! - SPR-020-029: Input binding/validation errors
//! - SPR-030-039: Output validation errors
//! - SPR-040-049: Execution errors
//! - SPR-050-059: Executor errors
//! - SPR-060-069: Configuration errors

use std::fmt;

use thiserror::Error;

/// Boxed error returned by wrapped operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, SprinklerError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// A single field failure inside one schema validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    match errors {
        [] => "no errors".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} errors: {}",
            many.len(),
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum SprinklerError {
    // ═══════════════════════════════════════════
    // CONSTRUCTION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[SPR-001] Invalid runnable id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("[SPR-002] Task '{task_id}' has no operation")]
    MissingOperation { task_id: String },

    #[error("[SPR-003] Runnable '{member_id}' already exists in '{container_id}'")]
    DuplicateMember {
        container_id: String,
        member_id: String,
    },

    #[error("[SPR-004] Task '{task_id}' declares parameter '{name}' twice")]
    DuplicateParameter { task_id: String, name: String },

    #[error("[SPR-005] Invalid JSON schema: {details}")]
    InvalidSchema { details: String },

    // ═══════════════════════════════════════════
    // CONTEXT ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[SPR-010] Context values must be a mapping, got {found}")]
    NotAMapping { found: String },

    #[error("[SPR-011] '{id}' is already recorded in history context")]
    DuplicateRecord { id: String },

    // ═══════════════════════════════════════════
    // INPUT ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[SPR-020] Task '{task_id}' input: {}", format_field_errors(.errors))]
    InputValidation {
        task_id: String,
        errors: Vec<FieldError>,
    },

    #[error("[SPR-021] Argument '{name}' cannot be read as {expected}: {details}")]
    ArgumentDecode {
        name: String,
        expected: &'static str,
        details: String,
    },

    // ═══════════════════════════════════════════
    // OUTPUT ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[SPR-030] Task '{task_id}' output: {}", format_field_errors(.errors))]
    OutputValidation {
        task_id: String,
        errors: Vec<FieldError>,
    },

    #[error("[SPR-031] Task '{task_id}' output cannot be serialized: {details}")]
    OutputEncode { task_id: String, details: String },

    // ═══════════════════════════════════════════
    // EXECUTION ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[SPR-040] Task '{task_id}' operation failed: {source}")]
    OperationFailed {
        task_id: String,
        #[source]
        source: BoxError,
    },

    #[error("[SPR-041] Member '{member_id}' panicked: {details}")]
    MemberPanicked { member_id: String, details: String },

    #[error("[SPR-042] Failed to start runtime for async operation of '{task_id}': {details}")]
    RuntimeBridge { task_id: String, details: String },

    // ═══════════════════════════════════════════
    // EXECUTOR ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[SPR-050] Executor error for member '{member_id}': {details}")]
    Executor { member_id: String, details: String },

    #[error("[SPR-051] Failed to build worker pool: {details}")]
    PoolBuild { details: String },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[SPR-060] Configuration error: {reason}")]
    ConfigError { reason: String },
}

impl SprinklerError {
    /// Id of the runnable the error is attributed to, when there is one
    pub fn runnable_id(&self) -> Option<&str> {
        match self {
            Self::InvalidId { id, .. } => Some(id),
            Self::MissingOperation { task_id }
            | Self::DuplicateParameter { task_id, .. }
            | Self::InputValidation { task_id, .. }
            | Self::OutputValidation { task_id, .. }
            | Self::OutputEncode { task_id, .. }
            | Self::OperationFailed { task_id, .. }
            | Self::RuntimeBridge { task_id, .. } => Some(task_id),
            Self::DuplicateMember { container_id, .. } => Some(container_id),
            Self::DuplicateRecord { id } => Some(id),
            Self::MemberPanicked { member_id, .. } | Self::Executor { member_id, .. } => {
                Some(member_id)
            }
            Self::InvalidSchema { .. }
            | Self::NotAMapping { .. }
            | Self::ArgumentDecode { .. }
            | Self::PoolBuild { .. }
            | Self::ConfigError { .. } => None,
        }
    }

    /// True for the construction-time range (SPR-000-009)
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. }
                | Self::MissingOperation { .. }
                | Self::DuplicateMember { .. }
                | Self::DuplicateParameter { .. }
                | Self::InvalidSchema { .. }
        )
    }
}

impl FixSuggestion for SprinklerError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidId { .. } => Some("Use a non-empty id without surrounding whitespace"),
            Self::MissingOperation { .. } => {
                Some("Call .operation(..) or .async_operation(..) before .build()")
            }
            Self::DuplicateMember { .. } => Some("Give every member of a container a unique id"),
            Self::DuplicateParameter { .. } => Some("Remove the repeated parameter declaration"),
            Self::InvalidSchema { .. } => Some("Check the JSON Schema document is well-formed"),
            Self::NotAMapping { .. } => Some("Pass a JSON object (mapping) of key/value pairs"),
            Self::DuplicateRecord { .. } => {
                Some("History is write-once: each id can be recorded once per run")
            }
            Self::InputValidation { .. } => {
                Some("Check argument names, types and that required values are supplied")
            }
            Self::ArgumentDecode { .. } => {
                Some("Declare the parameter with a type matching the one read by the operation")
            }
            Self::OutputValidation { .. } => {
                Some("Fix the operation result to match its declared return type")
            }
            Self::OutputEncode { .. } => Some("Return a value that serializes to JSON"),
            Self::OperationFailed { .. } => {
                Some("The wrapped operation returned an error; retries are the operation's job")
            }
            Self::MemberPanicked { .. } => Some("A member panicked; check its operation"),
            Self::RuntimeBridge { .. } => Some("Check the process can spawn threads"),
            Self::Executor { .. } => {
                Some("Inputs crossing an isolated executor must survive JSON serialization")
            }
            Self::PoolBuild { .. } => Some("Lower max_workers or check thread limits"),
            Self::ConfigError { .. } => {
                Some("Check SPRINKLER_EXECUTOR (thread|isolated) and SPRINKLER_MAX_WORKERS (>0)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_mentions_task_and_fields() {
        let err = SprinklerError::InputValidation {
            task_id: "task1".to_string(),
            errors: vec![
                FieldError::new("a", "missing required argument"),
                FieldError::new("c", "unexpected argument"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("SPR-020"));
        assert!(msg.contains("task1"));
        assert!(msg.contains("input"));
        assert!(msg.contains("2 errors"));
        assert!(msg.contains("c: unexpected argument"));
    }

    #[test]
    fn output_error_single_field() {
        let err = SprinklerError::OutputValidation {
            task_id: "t".to_string(),
            errors: vec![FieldError::new("output", "expected str, got int 5")],
        };
        assert_eq!(
            err.to_string(),
            "[SPR-030] Task 't' output: output: expected str, got int 5"
        );
        assert_eq!(err.runnable_id(), Some("t"));
    }

    #[test]
    fn every_variant_has_suggestion() {
        let samples = vec![
            SprinklerError::DuplicateRecord { id: "x".into() },
            SprinklerError::NotAMapping { found: "int".into() },
            SprinklerError::ConfigError { reason: "bad".into() },
            SprinklerError::MissingOperation { task_id: "t".into() },
        ];
        for err in samples {
            assert!(err.fix_suggestion().is_some(), "{err}");
        }
    }

    #[test]
    fn construction_range() {
        assert!(SprinklerError::DuplicateMember {
            container_id: "p".into(),
            member_id: "t".into()
        }
        .is_construction());
        assert!(!SprinklerError::DuplicateRecord { id: "t".into() }.is_construction());
    }
}
