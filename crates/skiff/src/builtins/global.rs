//! Global functions: number parsing and coercion helpers, the console
//! sink, and the regex constructor stub.

use crate::{
    builtins::NativeFn,
    error::RunResult,
    heap::{HeapData, RegexObject},
    interp::Interp,
    io::ConsoleWriter,
    object::JsObject,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

pub(super) fn console_write<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
) -> RunResult<Value> {
    let line = args
        .iter()
        .map(|arg| interp.display_value(*arg, true, 0))
        .collect::<Vec<_>>()
        .join(" ");
    interp
        .console
        .write_line(line.into())
        .map_err(|e| crate::error::RunError::internal(e.to_string()))?;
    Ok(Value::Undefined)
}

pub(super) fn parse_int<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let text = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
    let radix = match args.get(1) {
        None | Some(Value::Undefined) => 10,
        Some(value) => {
            let r = interp.to_number(*value, span)?;
            let r = crate::value::to_int32(r);
            if r == 0 { 10 } else { r.clamp(2, 36) as u32 }
        }
    };
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1..]),
        Some(b'+') => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let mut value: f64 = 0.0;
    let mut seen = false;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(digit) => {
                seen = true;
                value = value * f64::from(radix) + f64::from(digit);
            }
            None => break,
        }
    }
    Ok(Value::Number(if seen { sign * value } else { f64::NAN }))
}

pub(super) fn parse_float<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let text = interp.to_string_rust(args.first().copied().unwrap_or(Value::Undefined), span)?;
    let trimmed = text.trim_start();
    // Longest numeric prefix.
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let b = bytes[end];
        let ok = b.is_ascii_digit()
            || (b == b'.' && !seen_dot && !seen_exp)
            || ((b == b'e' || b == b'E') && !seen_exp && end > 0)
            || ((b == b'+' || b == b'-') && (end == 0 || matches!(bytes[end - 1], b'e' | b'E')));
        if !ok {
            break;
        }
        if b == b'.' {
            seen_dot = true;
        }
        if b == b'e' || b == b'E' {
            seen_exp = true;
        }
        end += 1;
    }
    Ok(Value::Number(trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)))
}

pub(super) fn is_nan<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let n = interp.to_number(args.first().copied().unwrap_or(Value::Undefined), span)?;
    Ok(Value::Bool(n.is_nan()))
}

pub(super) fn is_finite<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let n = interp.to_number(args.first().copied().unwrap_or(Value::Undefined), span)?;
    Ok(Value::Bool(n.is_finite()))
}

pub(super) fn number_invoke<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Undefined);
    match func {
        NativeFn::NumberCtor => {
            if args.is_empty() {
                Ok(Value::Number(0.0))
            } else {
                Ok(Value::Number(interp.to_number(arg, span)?))
            }
        }
        // Number.isNaN / isFinite / isInteger do not coerce.
        NativeFn::NumberIsNaN => Ok(Value::Bool(matches!(arg, Value::Number(n) if n.is_nan()))),
        NativeFn::NumberIsFinite => Ok(Value::Bool(matches!(arg, Value::Number(n) if n.is_finite()))),
        NativeFn::NumberIsInteger => Ok(Value::Bool(
            matches!(arg, Value::Number(n) if n.is_finite() && n.trunc() == n),
        )),
        NativeFn::BooleanCtor => Ok(Value::Bool(arg.truthy(interp.heap, interp.interns))),
        _ => unreachable!("routed by dispatch"),
    }
}

/// `new RegExp(pattern, flags)`: builds an inert pattern object; matching
/// is out of scope.
pub(super) fn regexp_ctor<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let source = match args.first() {
        None | Some(Value::Undefined) => "(?:)".to_owned(),
        Some(value) => interp.to_string_rust(*value, span)?,
    };
    let flags = match args.get(1) {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => interp.to_string_rust(*value, span)?,
    };
    let regex = RegexObject {
        obj: JsObject::new(Some(interp.realm.regexp_proto)),
        source,
        flags,
    };
    Ok(Value::Ref(interp.heap.allocate(HeapData::Regex(regex))?))
}
