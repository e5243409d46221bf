//! The `Array` constructor and prototype methods.

use crate::{
    builtins::{NativeFn, object::alloc_array},
    error::{ErrorKind, RunError, RunResult},
    heap::{HeapData, HeapId, NativeIterKind, NativeIterState},
    interp::Interp,
    io::ConsoleWriter,
    object::JsObject,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::{Value, to_uint32},
};

pub(super) fn invoke<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    this: Value,
    args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    match func {
        NativeFn::ArrayCtor => {
            if args.len() == 1
                && let Some(n) = args[0].as_number()
            {
                let len = to_uint32(n);
                if f64::from(len) != n {
                    return Err(RunError::raise_at(ErrorKind::RangeError, "Invalid array length", span));
                }
                return alloc_array(interp, vec![None; len as usize]);
            }
            alloc_array(interp, args.into_iter().map(Some).collect())
        }
        NativeFn::ArrayOf => alloc_array(interp, args.into_iter().map(Some).collect()),
        NativeFn::ArrayIsArray => Ok(Value::Bool(matches!(
            args.first(),
            Some(Value::Ref(id)) if matches!(interp.heap.get(*id), HeapData::Array(_))
        ))),
        _ => {
            let id = expect_array(interp, this, span)?;
            prototype_method(interp, func, id, this, args, span)
        }
    }
}

fn expect_array<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    this: Value,
    span: SourceSpan,
) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Array(_)) => Ok(id),
        _ => Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Array method called on a non-array receiver",
            span,
        )),
    }
}

fn elements<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    id: HeapId,
) -> Vec<Option<Value>> {
    match interp.heap.get(id) {
        HeapData::Array(arr) => arr.elements.clone(),
        _ => Vec::new(),
    }
}

fn prototype_method<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    id: HeapId,
    this: Value,
    args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    match func {
        NativeFn::ArrayProtoPush => {
            let HeapData::Array(arr) = interp.heap.get_mut(id) else {
                unreachable!("checked by caller");
            };
            for arg in args {
                arr.elements.push(Some(arg));
            }
            Ok(Value::Number(f64::from(arr.length())))
        }
        NativeFn::ArrayProtoPop => {
            let HeapData::Array(arr) = interp.heap.get_mut(id) else {
                unreachable!("checked by caller");
            };
            Ok(arr.elements.pop().flatten().unwrap_or(Value::Undefined))
        }
        NativeFn::ArrayProtoShift => {
            let HeapData::Array(arr) = interp.heap.get_mut(id) else {
                unreachable!("checked by caller");
            };
            if arr.elements.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(arr.elements.remove(0).unwrap_or(Value::Undefined))
            }
        }
        NativeFn::ArrayProtoSlice => {
            let source = elements(interp, id);
            let len = source.len() as i64;
            let start = relative_index(args.first(), 0, len, interp, span)?;
            let end = relative_index(args.get(1), len, len, interp, span)?;
            let out: Vec<Option<Value>> = source
                .into_iter()
                .skip(start as usize)
                .take((end - start).max(0) as usize)
                .collect();
            alloc_array(interp, out)
        }
        NativeFn::ArrayProtoJoin => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_owned(),
                Some(value) => interp.to_string_rust(*value, span)?,
            };
            let source = elements(interp, id);
            let mut parts = Vec::with_capacity(source.len());
            for element in source {
                match element {
                    None | Some(Value::Undefined | Value::Null) => parts.push(String::new()),
                    Some(value) => parts.push(interp.to_string_rust(value, span)?),
                }
            }
            Ok(interp.heap.alloc_string(parts.join(&separator))?)
        }
        NativeFn::ArrayProtoIndexOf => {
            let needle = args.first().copied().unwrap_or(Value::Undefined);
            let source = elements(interp, id);
            for (index, element) in source.iter().enumerate() {
                if let Some(value) = element
                    && value.strict_eq(needle, interp.heap, interp.interns)
                {
                    return Ok(Value::Number(index as f64));
                }
            }
            Ok(Value::Number(-1.0))
        }
        NativeFn::ArrayProtoIncludes => {
            let needle = args.first().copied().unwrap_or(Value::Undefined);
            let source = elements(interp, id);
            let found = source.iter().any(|element| {
                let value = element.unwrap_or(Value::Undefined);
                value.same_value(needle, interp.heap, interp.interns)
                    || (value.as_number().is_some_and(f64::is_nan) && needle.as_number().is_some_and(f64::is_nan))
            });
            Ok(Value::Bool(found))
        }
        NativeFn::ArrayProtoForEach => {
            let callback = args.first().copied().unwrap_or(Value::Undefined);
            let this_arg = args.get(1).copied().unwrap_or(Value::Undefined);
            let len = elements(interp, id).len();
            for index in 0..len {
                let element = match interp.heap.get(id) {
                    HeapData::Array(arr) => arr.elements.get(index).copied().flatten(),
                    _ => None,
                };
                if let Some(value) = element {
                    interp.call_value(
                        callback,
                        this_arg,
                        vec![value, Value::Number(index as f64), this],
                        None,
                        span,
                    )?;
                }
            }
            Ok(Value::Undefined)
        }
        NativeFn::ArrayProtoMap => {
            let callback = args.first().copied().unwrap_or(Value::Undefined);
            let this_arg = args.get(1).copied().unwrap_or(Value::Undefined);
            let len = elements(interp, id).len();
            let mut out = Vec::with_capacity(len);
            for index in 0..len {
                let element = match interp.heap.get(id) {
                    HeapData::Array(arr) => arr.elements.get(index).copied().flatten(),
                    _ => None,
                };
                match element {
                    Some(value) => {
                        let mapped = interp.call_value(
                            callback,
                            this_arg,
                            vec![value, Value::Number(index as f64), this],
                            None,
                            span,
                        )?;
                        out.push(Some(mapped));
                    }
                    None => out.push(None),
                }
            }
            alloc_array(interp, out)
        }
        NativeFn::ArrayProtoFilter => {
            let callback = args.first().copied().unwrap_or(Value::Undefined);
            let this_arg = args.get(1).copied().unwrap_or(Value::Undefined);
            let len = elements(interp, id).len();
            let mut out = Vec::new();
            for index in 0..len {
                let element = match interp.heap.get(id) {
                    HeapData::Array(arr) => arr.elements.get(index).copied().flatten(),
                    _ => None,
                };
                if let Some(value) = element {
                    let keep = interp.call_value(
                        callback,
                        this_arg,
                        vec![value, Value::Number(index as f64), this],
                        None,
                        span,
                    )?;
                    if keep.truthy(interp.heap, interp.interns) {
                        out.push(Some(value));
                    }
                }
            }
            alloc_array(interp, out)
        }
        NativeFn::ArrayProtoConcat => {
            let mut out = elements(interp, id);
            for arg in args {
                match arg {
                    Value::Ref(other) if matches!(interp.heap.get(other), HeapData::Array(_)) => {
                        out.extend(elements(interp, other));
                    }
                    other => out.push(Some(other)),
                }
            }
            alloc_array(interp, out)
        }
        NativeFn::ArrayProtoKeys => array_iter(interp, NativeIterKind::ArrayKeys(id)),
        NativeFn::ArrayProtoValues => array_iter(interp, NativeIterKind::ArrayValues(id)),
        NativeFn::ArrayProtoEntries => array_iter(interp, NativeIterKind::ArrayEntries(id)),
        _ => unreachable!("routed by dispatch"),
    }
}

fn relative_index<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    arg: Option<&Value>,
    default: i64,
    len: i64,
    interp: &mut Interp<'_, '_, T, C, Tr>,
    span: SourceSpan,
) -> RunResult<i64> {
    let index = match arg {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = interp.to_number(*value, span)?;
            if n.is_nan() { 0 } else { n.trunc() as i64 }
        }
    };
    Ok(if index < 0 {
        (len + index).max(0)
    } else {
        index.min(len)
    })
}

pub(super) fn array_iter<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    kind: NativeIterKind,
) -> RunResult<Value> {
    let iter = NativeIterState {
        obj: JsObject::new(Some(interp.realm.iter_proto)),
        kind,
        index: 0,
        done: false,
    };
    Ok(Value::Ref(interp.heap.allocate(HeapData::NativeIter(iter))?))
}
