//! The guest-facing `Promise` surface, a thin wrapper over the promise
//! adapter in `crate::promise`.

use crate::{
    builtins::NativeFn,
    error::{ErrorKind, RunError, RunResult},
    heap::HeapData,
    interp::Interp,
    io::ConsoleWriter,
    promise::{Reaction, ReactionHandler},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

pub(super) fn invoke<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    this: Value,
    args: Vec<Value>,
    new_target: Option<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    match func {
        NativeFn::PromiseCtor => {
            if new_target.is_none() {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    "Promise constructor cannot be invoked without 'new'",
                    span,
                ));
            }
            let executor = args.first().copied().unwrap_or(Value::Undefined);
            if !executor.is_callable(interp.heap) {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    "Promise resolver is not a function",
                    span,
                ));
            }
            let promise = interp.new_promise()?;
            let resolve = Value::Native(NativeFn::PromiseResolveSlot(promise));
            let reject = Value::Native(NativeFn::PromiseRejectSlot(promise));
            match interp.call_value(executor, Value::Undefined, vec![resolve, reject], None, span) {
                Ok(_) => {}
                Err(err) if err.is_catchable() => {
                    let reason = interp.error_to_value(err)?;
                    interp.reject_promise(promise, reason)?;
                }
                Err(err) => return Err(err),
            }
            Ok(Value::Ref(promise))
        }
        NativeFn::PromiseResolve => interp.promise_resolved(args.first().copied().unwrap_or(Value::Undefined)),
        NativeFn::PromiseReject => interp.promise_rejected(args.first().copied().unwrap_or(Value::Undefined)),
        NativeFn::PromiseProtoThen => {
            let on_fulfilled = args.first().copied().unwrap_or(Value::Undefined);
            let on_rejected = args.get(1).copied().unwrap_or(Value::Undefined);
            then(interp, this, on_fulfilled, on_rejected, span)
        }
        NativeFn::PromiseProtoCatch => {
            let on_rejected = args.first().copied().unwrap_or(Value::Undefined);
            then(interp, this, Value::Undefined, on_rejected, span)
        }
        NativeFn::PromiseResolveSlot(promise) => {
            interp.resolve_promise(promise, args.first().copied().unwrap_or(Value::Undefined))?;
            Ok(Value::Undefined)
        }
        NativeFn::PromiseRejectSlot(promise) => {
            interp.reject_promise(promise, args.first().copied().unwrap_or(Value::Undefined))?;
            Ok(Value::Undefined)
        }
        _ => unreachable!("routed by dispatch"),
    }
}

/// `Promise.prototype.then`: registers the reaction pair and returns the
/// derived promise.
fn then<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    this: Value,
    on_fulfilled: Value,
    on_rejected: Value,
    span: SourceSpan,
) -> RunResult<Value> {
    let Value::Ref(promise) = this else {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Promise.prototype.then called on a non-promise",
            span,
        ));
    };
    if !matches!(interp.heap.get(promise), HeapData::Promise(_)) {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Promise.prototype.then called on a non-promise",
            span,
        ));
    }
    let derived = interp.new_promise()?;
    let fulfilled_handler = if on_fulfilled.is_callable(interp.heap) {
        ReactionHandler::Callable(on_fulfilled)
    } else {
        ReactionHandler::Identity
    };
    let rejected_handler = if on_rejected.is_callable(interp.heap) {
        ReactionHandler::Callable(on_rejected)
    } else {
        ReactionHandler::Identity
    };
    interp.add_reaction(
        promise,
        Reaction {
            on_fulfilled: fulfilled_handler,
            on_rejected: rejected_handler,
            derived: Some(derived),
        },
    )?;
    Ok(Value::Ref(derived))
}
