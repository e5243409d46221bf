//! The promise adapter.
//!
//! The evaluator only touches promises through four operations — create
//! resolved, create rejected, `then`, and the promise-like predicate — plus
//! the microtask scheduling they imply. The bundled realm's `Promise`
//! builtin is a thin guest-facing wrapper over the same state.

use crate::{
    context::Job,
    error::RunResult,
    generator::GenResume,
    heap::{HeapData, HeapId},
    interp::Interp,
    io::ConsoleWriter,
    object::{JsObject, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

/// A promise: settled state or the queue of pending reactions.
#[derive(Debug, Clone)]
pub(crate) struct PromiseState {
    pub obj: JsObject,
    pub inner: PromiseInner,
}

#[derive(Debug, Clone)]
pub(crate) enum PromiseInner {
    Pending { reactions: Vec<Reaction> },
    Fulfilled(Value),
    Rejected(Value),
}

/// One registered reaction pair.
#[derive(Debug, Clone)]
pub(crate) struct Reaction {
    pub on_fulfilled: ReactionHandler,
    pub on_rejected: ReactionHandler,
    /// Promise settled with the handler outcome (`then` chains).
    pub derived: Option<HeapId>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ReactionHandler {
    /// Pass the settlement through to the derived promise.
    Identity,
    /// Invoke a guest callable with the settlement value.
    Callable(Value),
    /// Resume a suspended generator/async body: fulfillments resume with
    /// `next(value)`, rejections with `throw(reason)`.
    Resume(HeapId),
}

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    /// Allocates a fresh pending promise.
    pub fn new_promise(&mut self) -> RunResult<HeapId> {
        Ok(self.heap.allocate(HeapData::Promise(PromiseState {
            obj: JsObject::new(Some(self.realm.promise_proto)),
            inner: PromiseInner::Pending { reactions: Vec::new() },
        }))?)
    }

    /// The adapter's `createResolved(v)`.
    pub fn promise_resolved(&mut self, value: Value) -> RunResult<Value> {
        if let Value::Ref(id) = value
            && matches!(self.heap.get(id), HeapData::Promise(_))
        {
            return Ok(value);
        }
        let promise = self.new_promise()?;
        self.resolve_promise(promise, value)?;
        Ok(Value::Ref(promise))
    }

    /// The adapter's `createRejected(v)`.
    pub fn promise_rejected(&mut self, reason: Value) -> RunResult<Value> {
        let promise = self.new_promise()?;
        self.reject_promise(promise, reason)?;
        Ok(Value::Ref(promise))
    }

    /// The adapter's `isPromiseLike(v)`: anything exposing a callable
    /// `then`.
    pub fn is_promise_like(&mut self, value: Value) -> RunResult<bool> {
        if let Value::Ref(id) = value {
            if matches!(self.heap.get(id), HeapData::Promise(_)) {
                return Ok(true);
            }
            if self.heap.object(id).is_some() {
                let then = self.get_property(value, PropertyKeyRef::String("then"), SourceSpan::default())?;
                return Ok(then.is_callable(self.heap));
            }
        }
        Ok(false)
    }

    /// The promise resolution procedure: settling with a promise adopts its
    /// state; settling with a foreign thenable defers to its `then`.
    pub fn resolve_promise(&mut self, promise: HeapId, value: Value) -> RunResult<()> {
        if let Value::Ref(inner_id) = value {
            if inner_id == promise {
                let reason_str = self.heap.alloc_string("Chaining cycle detected for promise".to_owned())?;
                return self.reject_promise(promise, reason_str);
            }
            if matches!(self.heap.get(inner_id), HeapData::Promise(_)) {
                return self.add_reaction(
                    inner_id,
                    Reaction {
                        on_fulfilled: ReactionHandler::Identity,
                        on_rejected: ReactionHandler::Identity,
                        derived: Some(promise),
                    },
                );
            }
            if self.heap.object(inner_id).is_some() {
                let then = self.get_property(value, PropertyKeyRef::String("then"), SourceSpan::default())?;
                if then.is_callable(self.heap) {
                    let resolve = Value::Native(crate::builtins::NativeFn::PromiseResolveSlot(promise));
                    let reject = Value::Native(crate::builtins::NativeFn::PromiseRejectSlot(promise));
                    match self.call_value(then, value, vec![resolve, reject], None, SourceSpan::default()) {
                        Ok(_) => return Ok(()),
                        Err(err) if err.is_catchable() => {
                            let reason = self.error_to_value(err)?;
                            return self.reject_promise(promise, reason);
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        self.fulfill_promise(promise, value)
    }

    pub fn fulfill_promise(&mut self, promise: HeapId, value: Value) -> RunResult<()> {
        let HeapData::Promise(state) = self.heap.get_mut(promise) else {
            return Err(crate::error::RunError::internal("settling a non-promise"));
        };
        let PromiseInner::Pending { reactions } = &mut state.inner else {
            // Settling twice is a no-op.
            return Ok(());
        };
        let reactions = std::mem::take(reactions);
        state.inner = PromiseInner::Fulfilled(value);
        for reaction in reactions {
            self.schedule_handler(reaction.on_fulfilled, value, reaction.derived, false);
        }
        Ok(())
    }

    pub fn reject_promise(&mut self, promise: HeapId, reason: Value) -> RunResult<()> {
        let HeapData::Promise(state) = self.heap.get_mut(promise) else {
            return Err(crate::error::RunError::internal("settling a non-promise"));
        };
        let PromiseInner::Pending { reactions } = &mut state.inner else {
            return Ok(());
        };
        let reactions = std::mem::take(reactions);
        state.inner = PromiseInner::Rejected(reason);
        for reaction in reactions {
            self.schedule_handler(reaction.on_rejected, reason, reaction.derived, true);
        }
        Ok(())
    }

    /// The adapter's `then(p, onFulfilled, onRejected)` for any registered
    /// reaction shape; settled promises schedule immediately, pending ones
    /// queue.
    pub fn add_reaction(&mut self, promise: HeapId, reaction: Reaction) -> RunResult<()> {
        let HeapData::Promise(state) = self.heap.get_mut(promise) else {
            return Err(crate::error::RunError::internal("reaction on a non-promise"));
        };
        match &mut state.inner {
            PromiseInner::Pending { reactions } => {
                reactions.push(reaction);
            }
            PromiseInner::Fulfilled(value) => {
                let value = *value;
                self.schedule_handler(reaction.on_fulfilled, value, reaction.derived, false);
            }
            PromiseInner::Rejected(reason) => {
                let reason = *reason;
                self.schedule_handler(reaction.on_rejected, reason, reaction.derived, true);
            }
        }
        Ok(())
    }

    fn schedule_handler(&mut self, handler: ReactionHandler, arg: Value, derived: Option<HeapId>, is_rejection: bool) {
        match handler {
            ReactionHandler::Identity => self.ctx.enqueue(Job::PromiseReaction {
                handler: None,
                arg,
                derived,
                is_rejection,
            }),
            ReactionHandler::Callable(callable) => self.ctx.enqueue(Job::PromiseReaction {
                handler: Some(callable),
                arg,
                derived,
                is_rejection,
            }),
            ReactionHandler::Resume(generator) => self.ctx.enqueue(Job::ResumeGenerator {
                generator,
                resume: if is_rejection {
                    GenResume::Throw(arg)
                } else {
                    GenResume::Next(arg)
                },
            }),
        }
    }

    /// Executes one queued promise reaction.
    pub fn run_reaction_job(
        &mut self,
        handler: Option<Value>,
        arg: Value,
        derived: Option<HeapId>,
        is_rejection: bool,
    ) -> RunResult<()> {
        match handler {
            None => match derived {
                Some(derived) => {
                    if is_rejection {
                        self.reject_promise(derived, arg)
                    } else {
                        self.resolve_promise(derived, arg)
                    }
                }
                None => Ok(()),
            },
            Some(callable) => {
                match self.call_value(callable, Value::Undefined, vec![arg], None, SourceSpan::default()) {
                    Ok(result) => match derived {
                        Some(derived) => self.resolve_promise(derived, result),
                        None => Ok(()),
                    },
                    Err(err) if err.is_catchable() => {
                        let reason = self.error_to_value(err)?;
                        match derived {
                            Some(derived) => self.reject_promise(derived, reason),
                            None => Ok(()),
                        }
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Awaits a value: promise-likes resume the suspended body when they
    /// settle; plain values resume on the next microtask tick to preserve
    /// ordering.
    pub fn await_value(&mut self, value: Value, generator: HeapId) -> RunResult<()> {
        let promise = self.promise_resolved(value)?;
        let Value::Ref(promise_id) = promise else {
            return Err(crate::error::RunError::internal("await target is not a promise"));
        };
        self.add_reaction(
            promise_id,
            Reaction {
                on_fulfilled: ReactionHandler::Resume(generator),
                on_rejected: ReactionHandler::Resume(generator),
                derived: None,
            },
        )
    }
}
