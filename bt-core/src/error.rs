//! Error taxonomy for the decision runtime.
//!
//! `CompileError` and `InternalInvariant` are typed and surfaced to callers
//! (or panicked on, for invariants no caller could recover from). Everything
//! else — runtime errors at leaves, validation errors on planner/VLA
//! requests, budget overruns, cancellation — is represented as an ordinary
//! value on the type it annotates (`Status`, `PlannerResult`, `JobInfo`,
//! trace payloads) rather than as an error type, because a tick must never
//! abort on them.

use thiserror::Error;

/// Where in a tree description a compile error occurred, when known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpan {
    pub node_path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileErrorKind {
    Syntax,
    Arity,
    UnknownKeyword,
    MissingKey,
    InvalidLiteral,
}

/// A fatal, reportable failure to compile a tree description.
#[derive(Debug, Error)]
#[error("compile error ({kind:?}) at {span}: {message}", span = span_display(.span))]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Option<SourceSpan>,
    pub message: String,
}

fn span_display(span: &Option<SourceSpan>) -> String {
    match span {
        Some(s) => s.node_path.clone(),
        None => "<root>".to_string(),
    }
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self { kind, span: None, message: message.into() }
    }

    pub fn at(kind: CompileErrorKind, node_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: Some(SourceSpan { node_path: node_path.into() }),
            message: message.into(),
        }
    }
}

/// Compiled-tree corruption: a node id reference into the void, a decorator
/// with the wrong child count surviving verification, etc. The engine is
/// entitled to panic on this rather than thread a `Result` through every
/// dispatch call, since no caller can recover from a corrupt tree.
#[derive(Debug, Error)]
#[error("internal invariant violated: {0}")]
pub struct InternalInvariant(pub String);

impl InternalInvariant {
    pub fn panic(msg: impl Into<String>) -> ! {
        panic!("{}", InternalInvariant(msg.into()));
    }
}

/// The runtime-error kind recorded alongside a leaf's `failure` status and
/// the matching `error` log entry. Not propagated as a `Result` — the tick
/// continues after recording it.
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeErrorKind {
    CallbackMissing { name: String },
    CallbackPanicked { name: String, message: String },
    BlackboardTypeMismatch { key: String },
    IntegerOverflow,
}

/// Request validation failure for the planner or VLA services. Not fatal:
/// the planner returns `PlannerStatus::Error`; VLA returns an immediate
/// `:error` poll result.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
