//! Typed array constructors with bounds-checked numeric indexing.

use crate::{
    builtins::NativeFn,
    error::{ErrorKind, RunError, RunResult},
    heap::{HeapData, TypedArrayKind, TypedArrayObject},
    interp::Interp,
    io::ConsoleWriter,
    object::JsObject,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::{Value, to_uint32},
};

pub(super) fn construct<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let kind = match func {
        NativeFn::Float64ArrayCtor => TypedArrayKind::Float64,
        NativeFn::Int32ArrayCtor => TypedArrayKind::Int32,
        NativeFn::Uint8ArrayCtor => TypedArrayKind::Uint8,
        _ => unreachable!("routed by dispatch"),
    };
    let data = match args.first() {
        None | Some(Value::Undefined) => Vec::new(),
        Some(Value::Number(n)) => {
            let len = to_uint32(*n);
            if f64::from(len) != *n {
                return Err(RunError::raise_at(
                    ErrorKind::RangeError,
                    "Invalid typed array length",
                    span,
                ));
            }
            vec![0.0; len as usize]
        }
        Some(Value::Ref(id)) if matches!(interp.heap.get(*id), HeapData::Array(_)) => {
            let elements = match interp.heap.get(*id) {
                HeapData::Array(arr) => arr.elements.clone(),
                _ => Vec::new(),
            };
            let mut data = Vec::with_capacity(elements.len());
            for element in elements {
                let n = interp.to_number(element.unwrap_or(Value::Undefined), span)?;
                data.push(kind.clamp(n));
            }
            data
        }
        Some(other) => {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("Cannot construct a typed array from {}", other.type_of(interp.heap)),
                span,
            ));
        }
    };
    let typed = TypedArrayObject {
        obj: JsObject::new(Some(interp.realm.typed_array_proto)),
        kind,
        data,
    };
    Ok(Value::Ref(interp.heap.allocate(HeapData::TypedArray(typed))?))
}
