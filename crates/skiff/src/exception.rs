//! Public exception type returned by the runner.

use std::fmt;

/// A line/column pair in a public stack frame, 1-indexed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

/// One frame of a guest stack trace, with a short source preview when the
/// original source is available.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StackFrame {
    /// Script name as passed to `Runner::new`.
    pub script_name: String,
    pub loc: CodeLoc,
    /// Name of the enclosing function, if any.
    pub function: Option<String>,
    /// Up to 50 characters of the offending source line.
    pub preview: Option<String>,
}

/// An error escaping guest execution, as seen by the host.
///
/// Carries the constructor name (`TypeError`, `ReferenceError`, ...), the
/// message, and a best-effort stack trace. `Display` renders the familiar
/// `Name: message` line followed by ` at script:line:column` frames.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Exception {
    name: String,
    message: String,
    frames: Vec<StackFrame>,
}

impl Exception {
    pub(crate) fn new(name: String, message: String, frames: Vec<StackFrame>) -> Self {
        Self { name, message, frames }
    }

    /// Builds a bare exception with no stack trace, used for host-side
    /// failures (invalid inputs, serialization problems).
    #[must_use]
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_owned(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// True when the exception carries the given constructor name.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)?;
        } else {
            write!(f, "{}: {}", self.name, self.message)?;
        }
        for frame in &self.frames {
            write!(f, "\n    at ")?;
            if let Some(function) = &frame.function {
                write!(f, "{function} (")?;
            }
            write!(f, "{}:{}:{}", frame.script_name, frame.loc.line, frame.loc.column)?;
            if frame.function.is_some() {
                write!(f, ")")?;
            }
            if let Some(preview) = &frame.preview {
                write!(f, "\n        {preview}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}
