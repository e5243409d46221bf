//! Internal error channel of the evaluator.
//!
//! Two kinds of abrupt completion travel through `Result::Err`:
//! * guest-visible throws (`Raise` for engine-detected errors, `Throw` for
//!   values thrown by guest code), recoverable by `try`/`catch`;
//! * uncatchable engine failures (resource limits, cancellation), which
//!   unwind through every guest handler and surface to the host.
//!
//! `break`/`continue`/`return` do not use this channel; they are carried by
//! the `Completion` values statement evaluation returns.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    exception::{CodeLoc, Exception, StackFrame},
    intern::{Interns, StringId},
    span::SourceSpan,
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// The error taxonomy surfaced to guest code.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The string representation matches
/// the constructor name exactly (e.g., `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Plain `Error` - the base constructor.
    Error,
    /// Non-callable calls, const assignment, nullish property reads,
    /// iterator protocol violations, private-name brand mismatches.
    TypeError,
    /// Numeric out-of-range failures (typed-array indexing, invalid lengths).
    RangeError,
    /// Unresolved identifiers, TDZ reads, `super` misuse.
    ReferenceError,
    /// Duplicate lexical declarations, strict-mode violations, unsupported syntax.
    SyntaxError,
    /// Engine failures that guest code cannot catch: call-depth ceiling,
    /// cancellation, resource limits.
    InternalError,
}

/// One frame of a best-effort guest stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawStackFrame {
    pub span: SourceSpan,
    /// Name of the function the frame executes in, if it has one.
    pub function: Option<StringId>,
}

impl RawStackFrame {
    pub fn new(span: SourceSpan) -> Self {
        Self { span, function: None }
    }

    pub fn with_function(span: SourceSpan, function: Option<StringId>) -> Self {
        Self { span, function }
    }
}

/// An engine-detected error that has not yet been materialized into a guest
/// `Error` object.
///
/// Materialization is deferred until guest code actually observes the value
/// (at a `catch` binding): the realm's error constructors are looked up by
/// name at that point, and when the realm does not provide them a plain
/// string value is thrown instead.
#[derive(Debug, Clone)]
pub(crate) struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub frames: Vec<RawStackFrame>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn with_span(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: vec![RawStackFrame::new(span)],
        }
    }
}

/// A value thrown by guest code (`throw expr`), plus the unwind trace.
#[derive(Debug, Clone)]
pub(crate) struct ThrowValue {
    pub value: Value,
    pub frames: Vec<RawStackFrame>,
}

/// Internal error type carried through evaluator `Result`s.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    /// Internal interpreter error - indicates a bug in skiff, not guest code.
    Internal(Cow<'static, str>),
    /// Catchable engine-raised error (TypeError, ReferenceError, ...).
    Raise(Box<EngineError>),
    /// Catchable guest-thrown value.
    Throw(Box<ThrowValue>),
    /// Uncatchable engine failure from resource limits or cancellation.
    ///
    /// These display with proper stack traces like normal errors, but cannot
    /// be intercepted by guest `try`/`catch`. This prevents untrusted code
    /// from suppressing limit violations.
    Uncatchable(Box<EngineError>),
}

impl RunError {
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn raise(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Raise(Box::new(EngineError::new(kind, message)))
    }

    pub fn raise_at(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self::Raise(Box::new(EngineError::with_span(kind, message, span)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::ReferenceError, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::SyntaxError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::RangeError, message)
    }

    pub fn throw(value: Value) -> Self {
        Self::Throw(Box::new(ThrowValue {
            value,
            frames: Vec::new(),
        }))
    }

    /// Whether a guest `catch` clause recovers this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Raise(_) | Self::Throw(_))
    }

    /// Appends an unwind frame; called by the call machinery as an error
    /// propagates out of a function invocation.
    pub fn push_frame(&mut self, frame: RawStackFrame) {
        match self {
            Self::Raise(err) | Self::Uncatchable(err) => err.frames.push(frame),
            Self::Throw(thrown) => thrown.frames.push(frame),
            Self::Internal(_) => {}
        }
    }

    /// Converts a non-`Throw` error to a public `Exception`.
    ///
    /// `Throw` values need heap access to stringify and are converted by the
    /// runner instead.
    pub fn into_exception(self, interns: &Interns, source: &str) -> Exception {
        match self {
            Self::Raise(err) | Self::Uncatchable(err) => engine_error_to_exception(&err, interns, source),
            Self::Internal(msg) => Exception::new(
                ErrorKind::InternalError.to_string(),
                format!("internal error in skiff: {msg}"),
                Vec::new(),
            ),
            Self::Throw(thrown) => Exception::new(
                ErrorKind::Error.to_string(),
                "uncaught value".to_owned(),
                frames_to_public(&thrown.frames, interns, source),
            ),
        }
    }
}

pub(crate) fn engine_error_to_exception(err: &EngineError, interns: &Interns, source: &str) -> Exception {
    Exception::new(
        err.kind.to_string(),
        err.message.clone(),
        frames_to_public(&err.frames, interns, source),
    )
}

pub(crate) fn frames_to_public(frames: &[RawStackFrame], interns: &Interns, source: &str) -> Vec<StackFrame> {
    frames
        .iter()
        .map(|frame| {
            let start = frame.span.start();
            StackFrame {
                script_name: interns.get_str(frame.span.file).to_owned(),
                loc: CodeLoc {
                    line: start.line + 1,
                    column: start.column + 1,
                },
                function: frame.function.map(|id| interns.get_str(id).to_owned()),
                preview: frame.span.snippet(source).map(str::to_owned),
            }
        })
        .collect()
}
