//! The `Object` constructor, its statics, and `Object.prototype` methods.

use crate::{
    builtins::NativeFn,
    error::{ErrorKind, RunError, RunResult},
    heap::{HeapData, JsArray},
    interp::Interp,
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PropertyKey, PropertyKeyRef},
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
    let first = args.first().copied().unwrap_or(Value::Undefined);
    match func {
        NativeFn::ObjectCtor => match first {
            Value::Ref(_) => Ok(first),
            _ => Ok(Value::Ref(interp.alloc_object()?)),
        },
        NativeFn::ObjectKeys => {
            let keys = own_enumerable_keys(interp, first);
            let elements = keys
                .into_iter()
                .map(|key| interp.key_to_value(&key).map(Some))
                .collect::<RunResult<Vec<_>>>()?;
            alloc_array(interp, elements)
        }
        NativeFn::ObjectValues => {
            let keys = own_enumerable_keys(interp, first);
            let mut elements = Vec::with_capacity(keys.len());
            for key in keys {
                elements.push(Some(interp.get_property(first, key.as_ref(), span)?));
            }
            alloc_array(interp, elements)
        }
        NativeFn::ObjectEntries => {
            let keys = own_enumerable_keys(interp, first);
            let mut elements = Vec::with_capacity(keys.len());
            for key in keys {
                let key_value = interp.key_to_value(&key)?;
                let value = interp.get_property(first, key.as_ref(), span)?;
                let pair = alloc_array(interp, vec![Some(key_value), Some(value)])?;
                elements.push(Some(pair));
            }
            alloc_array(interp, elements)
        }
        NativeFn::ObjectFreeze => {
            if let Value::Ref(id) = first
                && let Some(obj) = interp.heap.object_mut(id)
            {
                obj.freeze();
            }
            Ok(first)
        }
        NativeFn::ObjectIsFrozen => {
            let frozen = match first {
                Value::Ref(id) => interp.heap.object(id).is_none_or(JsObject::is_frozen),
                _ => true,
            };
            Ok(Value::Bool(frozen))
        }
        NativeFn::ObjectGetPrototypeOf => {
            let Value::Ref(id) = first else {
                return Ok(Value::Null);
            };
            Ok(match interp.heap.proto_of(id) {
                Some(proto) => Value::Ref(proto),
                None => Value::Null,
            })
        }
        NativeFn::ObjectDefineProperty => define_property(interp, &args, span),
        NativeFn::ObjectGetOwnPropertyNames => {
            let keys = match first {
                Value::Ref(id) => {
                    let mut keys = Vec::new();
                    if let HeapData::Array(arr) = interp.heap.get(id) {
                        for (index, element) in arr.elements.iter().enumerate() {
                            if element.is_some() {
                                keys.push(PropertyKey::Index(index as u32));
                            }
                        }
                    }
                    if let Some(obj) = interp.heap.object(id) {
                        keys.extend(
                            obj.own_keys()
                                .into_iter()
                                .filter(|key| !matches!(key, PropertyKey::Symbol(_))),
                        );
                    }
                    keys
                }
                _ => Vec::new(),
            };
            let elements = keys
                .into_iter()
                .map(|key| interp.key_to_value(&key).map(Some))
                .collect::<RunResult<Vec<_>>>()?;
            alloc_array(interp, elements)
        }
        NativeFn::ObjectCreate => {
            let proto = match first {
                Value::Ref(id) => Some(id),
                Value::Null => None,
                _ => {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        "Object prototype may only be an Object or null",
                        span,
                    ));
                }
            };
            Ok(Value::Ref(
                interp.heap.allocate(HeapData::Object(JsObject::new(proto)))?,
            ))
        }
        NativeFn::ObjectAssign => {
            let Value::Ref(target_id) = first else {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    "Cannot convert undefined or null to object",
                    span,
                ));
            };
            for source in args.iter().skip(1) {
                interp.copy_data_properties(target_id, *source, span)?;
            }
            Ok(first)
        }
        NativeFn::ObjectProtoHasOwnProperty => {
            let key = interp.to_property_key(first, span)?;
            let has = match this {
                Value::Ref(id) => {
                    let array_hit = match (interp.heap.get(id), &key) {
                        (HeapData::Array(arr), PropertyKey::Index(i)) => {
                            arr.elements.get(*i as usize).is_some_and(Option::is_some)
                        }
                        _ => false,
                    };
                    array_hit || interp.heap.object(id).is_some_and(|obj| obj.has_own(&key.as_ref()))
                }
                _ => false,
            };
            Ok(Value::Bool(has))
        }
        NativeFn::ObjectProtoToString => {
            let tag = match this {
                Value::Undefined => "Undefined",
                Value::Null => "Null",
                Value::Ref(id) => match interp.heap.get(id) {
                    HeapData::Array(_) => "Array",
                    HeapData::Function(_) | HeapData::Bound(_) | HeapData::NativeFunc(_) => "Function",
                    HeapData::Str(_) => "String",
                    HeapData::Arguments(_) => "Arguments",
                    HeapData::Regex(_) => "RegExp",
                    HeapData::Promise(_) => "Promise",
                    _ => "Object",
                },
                Value::Number(_) => "Number",
                Value::Bool(_) => "Boolean",
                Value::InternString(_) => "String",
                _ => "Object",
            };
            Ok(interp.heap.alloc_string(format!("[object {tag}]"))?)
        }
        NativeFn::ObjectProtoValueOf => Ok(this),
        _ => unreachable!("routed by dispatch"),
    }
}

fn define_property<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    let Value::Ref(target_id) = target else {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Object.defineProperty called on non-object",
            span,
        ));
    };
    let key_value = args.get(1).copied().unwrap_or(Value::Undefined);
    let key = interp.to_property_key(key_value, span)?;
    let attributes = args.get(2).copied().unwrap_or(Value::Undefined);

    let get = interp.get_property(attributes, PropertyKeyRef::String("get"), span)?;
    let set = interp.get_property(attributes, PropertyKeyRef::String("set"), span)?;
    let descriptor = if !get.is_nullish() || !set.is_nullish() {
        let enumerable = interp.get_property(attributes, PropertyKeyRef::String("enumerable"), span)?;
        let configurable = interp.get_property(attributes, PropertyKeyRef::String("configurable"), span)?;
        Descriptor::Accessor {
            get: (!get.is_nullish()).then_some(get),
            set: (!set.is_nullish()).then_some(set),
            enumerable: enumerable.truthy(interp.heap, interp.interns),
            configurable: configurable.truthy(interp.heap, interp.interns),
        }
    } else {
        let value = interp.get_property(attributes, PropertyKeyRef::String("value"), span)?;
        let writable = interp.get_property(attributes, PropertyKeyRef::String("writable"), span)?;
        let enumerable = interp.get_property(attributes, PropertyKeyRef::String("enumerable"), span)?;
        let configurable = interp.get_property(attributes, PropertyKeyRef::String("configurable"), span)?;
        Descriptor::Data {
            value,
            writable: writable.truthy(interp.heap, interp.interns),
            enumerable: enumerable.truthy(interp.heap, interp.interns),
            configurable: configurable.truthy(interp.heap, interp.interns),
        }
    };

    let Some(obj) = interp.heap.object_mut(target_id) else {
        return Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Object.defineProperty called on non-object",
            span,
        ));
    };
    obj.define_property(key, descriptor).map_err(|_| {
        RunError::raise_at(ErrorKind::TypeError, "Cannot redefine property", span)
    })?;
    Ok(target)
}

fn own_enumerable_keys<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    value: Value,
) -> Vec<PropertyKey> {
    match value {
        Value::Ref(id) => {
            let mut keys = Vec::new();
            if let HeapData::Array(arr) = interp.heap.get(id) {
                for (index, element) in arr.elements.iter().enumerate() {
                    if element.is_some() {
                        keys.push(PropertyKey::Index(index as u32));
                    }
                }
            }
            if let Some(obj) = interp.heap.object(id) {
                keys.extend(obj.enumerable_keys());
            }
            keys
        }
        _ => Vec::new(),
    }
}

pub(super) fn alloc_array<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    elements: Vec<Option<Value>>,
) -> RunResult<Value> {
    let array = JsArray::new(Some(interp.realm.array_proto), elements);
    Ok(Value::Ref(interp.heap.allocate(HeapData::Array(array))?))
}
