//! Execution tracing infrastructure.
//!
//! Provides a trait-based tracing system for the evaluator with zero-cost
//! abstraction. With [`NoopTracer`] every hook compiles away entirely via
//! monomorphization, the same way [`NoLimitTracker`](crate::resource::NoLimitTracker)
//! eliminates resource checking overhead.
//!
//! Tracing is purely observational: the evaluator behaves identically no
//! matter which tracer is installed.

/// Trace event emitted during evaluation.
///
/// Used by [`RecordingTracer`] to capture an execution trace for post-mortem
/// analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A statement was dispatched at the given source line (0-indexed).
    Statement { line: u32 },
    /// A guest function call pushed a frame.
    Call { depth: usize },
    /// A guest function call popped its frame.
    Return { depth: usize },
    /// A scope frame was pushed.
    ScopePush,
    /// A scope frame was popped.
    ScopePop,
    /// Execution suspended at a `yield`.
    Yield,
    /// Execution suspended at an `await`.
    Await,
}

/// Trait for evaluator tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
pub trait EvalTracer {
    fn on_statement(&mut self, _line: u32) {}
    fn on_call(&mut self, _depth: usize) {}
    fn on_return(&mut self, _depth: usize) {}
    fn on_scope_push(&mut self) {}
    fn on_scope_pop(&mut self) {}
    fn on_yield(&mut self) {}
    fn on_await(&mut self) {}
}

/// Zero-cost no-op tracer (production default).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Tracer that records every event for inspection after the run.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}

impl EvalTracer for RecordingTracer {
    fn on_statement(&mut self, line: u32) {
        self.events.push(TraceEvent::Statement { line });
    }

    fn on_call(&mut self, depth: usize) {
        self.events.push(TraceEvent::Call { depth });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }

    fn on_scope_push(&mut self) {
        self.events.push(TraceEvent::ScopePush);
    }

    fn on_scope_pop(&mut self) {
        self.events.push(TraceEvent::ScopePop);
    }

    fn on_yield(&mut self) {
        self.events.push(TraceEvent::Yield);
    }

    fn on_await(&mut self) {
        self.events.push(TraceEvent::Await);
    }
}
