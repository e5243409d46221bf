//! Resource limits and cancellation for sandboxed execution.
//!
//! Every run goes through a [`ResourceTracker`]. The tracker is consulted on
//! each heap allocation, at every statement boundary and loop iteration (time
//! budget and cancellation), and before every guest function call (call-depth
//! ceiling). Limit violations become uncatchable errors: guest `try`/`catch`
//! cannot intercept them.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::error::{EngineError, ErrorKind, RunError};

/// Default ceiling for nested guest calls.
///
/// The evaluator is recursive, so each guest frame consumes native stack;
/// the ceiling exists to turn runaway recursion into a reportable error
/// instead of a native stack overflow. Applies even with `NoLimitTracker`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 500;

/// Error returned when a resource limit is exceeded during execution.
///
/// This allows the sandbox to enforce strict limits on allocation count,
/// execution time, memory usage, call depth, and host-driven cancellation.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum statement operations exceeded.
    Operation { limit: u64, count: u64 },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Call-depth ceiling exceeded.
    CallDepth { limit: usize },
    /// The host requested cancellation.
    Cancelled,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::CallDepth { limit } => {
                write!(f, "maximum call depth of {limit} exceeded")
            }
            Self::Cancelled => write!(f, "execution cancelled by host"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        // Every limit failure maps to an uncatchable InternalError: a guest
        // must not be able to suppress its own sandbox.
        Self::Uncatchable(Box::new(EngineError::new(ErrorKind::InternalError, err.to_string())))
    }
}

/// Trait for tracking resource usage during a run.
///
/// Implementations can enforce limits on allocations, time, memory and call
/// depth. All hooks are monomorphized; with [`NoLimitTracker`] they compile
/// down to the bare call-depth comparison.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or
    /// `Err(ResourceError)` if a limit would be exceeded.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when heap memory is released back (end of run bookkeeping).
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Called at every statement boundary and before each loop iteration.
    ///
    /// Checks the time budget, the operation budget and the cancellation
    /// flag. Returning an error aborts the run uncatchably.
    fn check_statement(&mut self) -> Result<(), ResourceError>;

    /// Called before pushing a guest call frame.
    ///
    /// # Arguments
    /// * `current_depth` - call stack depth before the new frame is pushed
    fn check_call_depth(&self, current_depth: usize) -> Result<(), ResourceError>;
}

/// Tracker that enforces only the call-depth ceiling.
///
/// Used for trusted scripts where timing overhead matters. The ceiling stays
/// in place because the recursive evaluator must never overflow the native
/// stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}

    #[inline]
    fn check_statement(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_call_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_CALL_DEPTH {
            Err(ResourceError::CallDepth {
                limit: DEFAULT_MAX_CALL_DEPTH,
            })
        } else {
            Ok(())
        }
    }
}

/// Limits enforced by [`LimitedTracker`].
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    /// Maximum number of heap allocations, if any.
    pub max_allocations: Option<usize>,
    /// Maximum resident guest memory in bytes, if any.
    pub max_memory: Option<usize>,
    /// Wall-clock budget for the whole run, if any.
    pub max_duration: Option<Duration>,
    /// Maximum number of executed statements, if any.
    pub max_operations: Option<u64>,
    /// Call-depth ceiling; `None` uses [`DEFAULT_MAX_CALL_DEPTH`].
    pub max_call_depth: Option<usize>,
    /// Cooperative cancellation flag, checked at statement boundaries.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Tracker that enforces [`ResourceLimits`].
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    allocation_count: usize,
    memory_used: usize,
    operation_count: u64,
    started: Instant,
    /// Time checks are amortized: the clock is read once every
    /// `TIME_CHECK_INTERVAL` statements.
    statements_since_time_check: u32,
}

const TIME_CHECK_INTERVAL: u32 = 64;

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            memory_used: 0,
            operation_count: 0,
            started: Instant::now(),
            statements_since_time_check: 0,
        }
    }

    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    fn max_call_depth(&self) -> usize {
        self.limits.max_call_depth.unwrap_or(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        self.allocation_count += 1;
        if let Some(limit) = self.limits.max_allocations
            && self.allocation_count > limit
        {
            return Err(ResourceError::Allocation {
                limit,
                count: self.allocation_count,
            });
        }
        let size = get_size();
        self.memory_used += size;
        if let Some(limit) = self.limits.max_memory
            && self.memory_used > limit
        {
            return Err(ResourceError::Memory {
                limit,
                used: self.memory_used,
            });
        }
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.memory_used = self.memory_used.saturating_sub(get_size());
    }

    fn check_statement(&mut self) -> Result<(), ResourceError> {
        if let Some(cancel) = &self.limits.cancel
            && cancel.load(Ordering::Relaxed)
        {
            return Err(ResourceError::Cancelled);
        }
        self.operation_count += 1;
        if let Some(limit) = self.limits.max_operations
            && self.operation_count > limit
        {
            return Err(ResourceError::Operation {
                limit,
                count: self.operation_count,
            });
        }
        if let Some(limit) = self.limits.max_duration {
            self.statements_since_time_check += 1;
            if self.statements_since_time_check >= TIME_CHECK_INTERVAL {
                self.statements_since_time_check = 0;
                let elapsed = self.started.elapsed();
                if elapsed > limit {
                    return Err(ResourceError::Time { limit, elapsed });
                }
            }
        }
        Ok(())
    }

    fn check_call_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        let limit = self.max_call_depth();
        if current_depth >= limit {
            Err(ResourceError::CallDepth { limit })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_tracker_counts_allocations() {
        let mut tracker = LimitedTracker::new(ResourceLimits {
            max_allocations: Some(2),
            ..ResourceLimits::default()
        });
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(matches!(
            tracker.on_allocate(|| 8),
            Err(ResourceError::Allocation { limit: 2, count: 3 })
        ));
    }

    #[test]
    fn cancellation_is_seen_at_statement_boundary() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut tracker = LimitedTracker::new(ResourceLimits {
            cancel: Some(cancel.clone()),
            ..ResourceLimits::default()
        });
        assert!(tracker.check_statement().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(tracker.check_statement(), Err(ResourceError::Cancelled)));
    }
}
