//! Console output sinks.
//!
//! Guest code has no ambient I/O; `console.log` and friends write through a
//! host-provided [`ConsoleWriter`]. Tests use [`CollectStringConsole`] to
//! observe output ordering.

use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use crate::exception::Exception;

/// Trait for handling output from the `console` builtin.
pub trait ConsoleWriter {
    /// Called once per `console.log`/`console.error` invocation with the
    /// fully formatted line (arguments joined by single spaces, no trailing
    /// newline).
    fn write_line(&mut self, line: Cow<'_, str>) -> Result<(), Exception>;
}

/// Default `ConsoleWriter` that writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl ConsoleWriter for StdConsole {
    fn write_line(&mut self, line: Cow<'_, str>) -> Result<(), Exception> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(line.as_bytes())
            .and_then(|()| stdout.write_all(b"\n"))
            .map_err(|e| Exception::runtime_error(format!("console write failed: {e}")))
    }
}

/// A `ConsoleWriter` that drops all output.
#[derive(Debug, Default)]
pub struct NoConsole;

impl ConsoleWriter for NoConsole {
    fn write_line(&mut self, _line: Cow<'_, str>) -> Result<(), Exception> {
        Ok(())
    }
}

/// A `ConsoleWriter` that collects all output lines into memory.
#[derive(Debug, Default)]
pub struct CollectStringConsole {
    lines: Vec<String>,
}

impl CollectStringConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the collected output joined with newlines.
    #[must_use]
    pub fn into_output(self) -> String {
        self.lines.join("\n")
    }
}

impl ConsoleWriter for CollectStringConsole {
    fn write_line(&mut self, line: Cow<'_, str>) -> Result<(), Exception> {
        self.lines.push(line.into_owned());
        Ok(())
    }
}
