//! `String.prototype` methods operating on primitive string receivers.

use crate::{
    builtins::{NativeFn, array::array_iter, object::alloc_array},
    error::{ErrorKind, RunError, RunResult},
    heap::NativeIterKind,
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
    if func == NativeFn::StringCtor {
        let arg = args.first().copied();
        return match arg {
            None => Ok(interp.heap.alloc_string(String::new())?),
            Some(Value::Symbol(sym)) => {
                let text = interp
                    .ctx
                    .symbol_description(sym)
                    .map_or_else(|| "Symbol()".to_owned(), |d| format!("Symbol({d})"));
                Ok(interp.heap.alloc_string(text)?)
            }
            Some(value) => interp.to_string_value(value, span),
        };
    }

    let Some(content) = this.string_content(interp.heap, interp.interns).map(str::to_owned) else {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "String method called on a non-string receiver",
            span,
        ));
    };
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len() as i64;

    match func {
        NativeFn::StringProtoSlice => {
            let start = relative_index(interp, args.first(), 0, len, span)?;
            let end = relative_index(interp, args.get(1), len, len, span)?;
            let out: String = chars
                .iter()
                .skip(start as usize)
                .take((end - start).max(0) as usize)
                .collect();
            Ok(interp.heap.alloc_string(out)?)
        }
        NativeFn::StringProtoIndexOf => {
            let needle = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
            match content.find(&needle) {
                Some(byte_index) => {
                    let char_index = content[..byte_index].chars().count();
                    Ok(Value::Number(char_index as f64))
                }
                None => Ok(Value::Number(-1.0)),
            }
        }
        NativeFn::StringProtoIncludes => {
            let needle = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
            Ok(Value::Bool(content.contains(&needle)))
        }
        NativeFn::StringProtoCharAt => {
            let index = relative_index(interp, args.first(), 0, len, span)?;
            let out: String = chars.get(index as usize).map(|c| c.to_string()).unwrap_or_default();
            Ok(interp.heap.alloc_string(out)?)
        }
        NativeFn::StringProtoCharCodeAt => {
            let index = relative_index(interp, args.first(), 0, len, span)?;
            match chars.get(index as usize) {
                Some(c) => {
                    let mut units = [0u16; 2];
                    let encoded = c.encode_utf16(&mut units);
                    Ok(Value::Number(f64::from(encoded[0])))
                }
                None => Ok(Value::Number(f64::NAN)),
            }
        }
        NativeFn::StringProtoToUpperCase => Ok(interp.heap.alloc_string(content.to_uppercase())?),
        NativeFn::StringProtoToLowerCase => Ok(interp.heap.alloc_string(content.to_lowercase())?),
        NativeFn::StringProtoSplit => {
            let separator = args.first().copied().unwrap_or(Value::Undefined);
            if separator.is_undefined() {
                let whole = interp.heap.alloc_string(content)?;
                return alloc_array(interp, vec![Some(whole)]);
            }
            let separator = interp.to_string_rust(separator, span)?;
            let parts: Vec<String> = if separator.is_empty() {
                chars.iter().map(|c| c.to_string()).collect()
            } else {
                content.split(&separator).map(str::to_owned).collect()
            };
            let mut elements = Vec::with_capacity(parts.len());
            for part in parts {
                elements.push(Some(interp.heap.alloc_string(part)?));
            }
            alloc_array(interp, elements)
        }
        NativeFn::StringProtoTrim => Ok(interp.heap.alloc_string(content.trim().to_owned())?),
        NativeFn::StringProtoRepeat => {
            let count = interp.to_number(args.first().copied().unwrap_or(Value::Undefined), span)?;
            if count < 0.0 || !count.is_finite() {
                return Err(RunError::raise_at(ErrorKind::RangeError, "Invalid count value", span));
            }
            Ok(interp.heap.alloc_string(content.repeat(count as usize))?)
        }
        NativeFn::StringProtoStartsWith => {
            let needle = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
            Ok(Value::Bool(content.starts_with(&needle)))
        }
        NativeFn::StringProtoEndsWith => {
            let needle = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
            Ok(Value::Bool(content.ends_with(&needle)))
        }
        NativeFn::StringProtoIterator => {
            // The iterator needs a heap-stable copy of the receiver.
            let Value::Ref(id) = interp.heap.alloc_string(content)? else {
                return Err(RunError::internal("string allocation returned a non-ref"));
            };
            array_iter(interp, NativeIterKind::StringChars(id))
        }
        _ => unreachable!("routed by dispatch"),
    }
}

fn relative_index<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    arg: Option<&Value>,
    default: i64,
    len: i64,
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
