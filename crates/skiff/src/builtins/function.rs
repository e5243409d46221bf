//! `Function.prototype` methods: call, apply, bind.

use crate::{
    builtins::NativeFn,
    error::{ErrorKind, RunError, RunResult},
    heap::HeapData,
    interp::Interp,
    io::ConsoleWriter,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

pub(super) fn invoke<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    this: Value,
    mut args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    if !this.is_callable(interp.heap) {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Function.prototype method called on a non-callable receiver",
            span,
        ));
    }
    match func {
        NativeFn::FunctionProtoCall => {
            let this_arg = if args.is_empty() {
                Value::Undefined
            } else {
                args.remove(0)
            };
            interp.call_value(this, this_arg, args, None, span)
        }
        NativeFn::FunctionProtoApply => {
            let this_arg = args.first().copied().unwrap_or(Value::Undefined);
            let call_args = match args.get(1) {
                None | Some(Value::Undefined | Value::Null) => Vec::new(),
                Some(Value::Ref(id)) => match interp.heap.get(*id) {
                    HeapData::Array(arr) => arr
                        .elements
                        .iter()
                        .map(|element| element.unwrap_or(Value::Undefined))
                        .collect(),
                    _ => {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            "CreateListFromArrayLike called on non-object",
                            span,
                        ));
                    }
                },
                Some(_) => {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        "CreateListFromArrayLike called on non-object",
                        span,
                    ));
                }
            };
            interp.call_value(this, this_arg, call_args, None, span)
        }
        NativeFn::FunctionProtoBind => {
            let this_arg = if args.is_empty() {
                Value::Undefined
            } else {
                args.remove(0)
            };
            interp.bind_function(this, this_arg, args)
        }
        _ => unreachable!("routed by dispatch"),
    }
}
