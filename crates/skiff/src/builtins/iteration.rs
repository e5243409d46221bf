//! Engine iterator objects and the generator prototype methods.

use crate::{
    builtins::{NativeFn, object::alloc_array},
    error::{ErrorKind, RunError, RunResult},
    generator::{GenResume, generator_step, iter_result},
    heap::{HeapData, NativeIterKind},
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
    args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    match func {
        // `[Symbol.iterator]() { return this; }`
        NativeFn::IterSelf => Ok(this),
        NativeFn::NativeIterNext => native_iter_next(interp, this, span),
        NativeFn::GeneratorNext => {
            let generator = expect_generator(interp, this, span)?;
            generator_step(
                interp,
                generator,
                GenResume::Next(args.first().copied().unwrap_or(Value::Undefined)),
                span,
            )
        }
        NativeFn::GeneratorReturn => {
            let generator = expect_generator(interp, this, span)?;
            generator_step(
                interp,
                generator,
                GenResume::Return(args.first().copied().unwrap_or(Value::Undefined)),
                span,
            )
        }
        NativeFn::GeneratorThrow => {
            let generator = expect_generator(interp, this, span)?;
            generator_step(
                interp,
                generator,
                GenResume::Throw(args.first().copied().unwrap_or(Value::Undefined)),
                span,
            )
        }
        _ => unreachable!("routed by dispatch"),
    }
}

fn expect_generator<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    this: Value,
    span: SourceSpan,
) -> RunResult<crate::heap::HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Generator(_)) => Ok(id),
        _ => Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Generator method called on a non-generator receiver",
            span,
        )),
    }
}

fn native_iter_next<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    this: Value,
    span: SourceSpan,
) -> RunResult<Value> {
    let Value::Ref(iter_id) = this else {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Iterator method called on a non-iterator receiver",
            span,
        ));
    };
    let (kind, index, done) = match interp.heap.get(iter_id) {
        HeapData::NativeIter(state) => (state.kind, state.index, state.done),
        _ => {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Iterator method called on a non-iterator receiver",
                span,
            ));
        }
    };
    if done {
        return iter_result(interp, Value::Undefined, true);
    }

    let step = match kind {
        NativeIterKind::ArrayValues(arr) | NativeIterKind::ArrayKeys(arr) | NativeIterKind::ArrayEntries(arr) => {
            let (len, element) = match interp.heap.get(arr) {
                HeapData::Array(array) => (
                    array.elements.len() as u32,
                    array.elements.get(index as usize).copied().flatten(),
                ),
                _ => (0, None),
            };
            if index >= len {
                None
            } else {
                let value = element.unwrap_or(Value::Undefined);
                Some(match kind {
                    NativeIterKind::ArrayValues(_) => value,
                    NativeIterKind::ArrayKeys(_) => Value::Number(f64::from(index)),
                    _ => {
                        let index_value = Value::Number(f64::from(index));
                        alloc_array(interp, vec![Some(index_value), Some(value)])?
                    }
                })
            }
        }
        NativeIterKind::StringChars(text_id) | NativeIterKind::KeyList(text_id) => {
            enum Step {
                Char(char),
                Value(Value),
                Exhausted,
            }
            let step = match interp.heap.get(text_id) {
                HeapData::Str(s) => s.chars().nth(index as usize).map_or(Step::Exhausted, Step::Char),
                HeapData::Array(array) => array
                    .elements
                    .get(index as usize)
                    .map_or(Step::Exhausted, |element| {
                        Step::Value(element.unwrap_or(Value::Undefined))
                    }),
                _ => Step::Exhausted,
            };
            match step {
                Step::Char(c) => Some(interp.heap.alloc_string(c.to_string())?),
                Step::Value(value) => Some(value),
                Step::Exhausted => None,
            }
        }
    };

    match step {
        Some(value) => {
            if let HeapData::NativeIter(state) = interp.heap.get_mut(iter_id) {
                state.index += 1;
            }
            iter_result(interp, value, false)
        }
        None => {
            if let HeapData::NativeIter(state) = interp.heap.get_mut(iter_id) {
                state.done = true;
            }
            iter_result(interp, Value::Undefined, true)
        }
    }
}
