//! The `Error` constructor hierarchy.

use crate::{
    error::{ErrorKind, RunResult},
    heap::HeapData,
    interp::Interp,
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PropertyKey, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

/// `new TypeError(message)` (also callable without `new`).
pub(super) fn construct_error<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    kind: ErrorKind,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let mut obj = JsObject::new(Some(interp.realm.error_proto_for(kind)));
    match args.first() {
        None | Some(Value::Undefined) => {}
        Some(message) => {
            let message = interp.to_string_value(*message, span)?;
            obj.insert(PropertyKey::String("message".into()), Descriptor::method(message));
        }
    }
    Ok(Value::Ref(interp.heap.allocate(HeapData::Object(obj))?))
}

/// `Error.prototype.toString`: `Name: message` (or just the name).
pub(super) fn error_to_string<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    this: Value,
    span: SourceSpan,
) -> RunResult<Value> {
    let name = interp.get_property(this, PropertyKeyRef::String("name"), span)?;
    let name = if name.is_undefined() {
        "Error".to_owned()
    } else {
        interp.to_string_rust(name, span)?
    };
    let message = interp.get_property(this, PropertyKeyRef::String("message"), span)?;
    let message = if message.is_undefined() {
        String::new()
    } else {
        interp.to_string_rust(message, span)?
    };
    let text = if message.is_empty() {
        name
    } else {
        format!("{name}: {message}")
    };
    Ok(interp.heap.alloc_string(text)?)
}
