//! Host-facing values and the host-callable protocol.
//!
//! `HostValue` is the owned, heap-independent type that crosses the
//! embedding boundary in both directions. Host callables are registered by
//! name at parse time and dispatched through [`HostDispatch`] at run time.

use crate::{
    context::EvalContext,
    error::{RunError, RunResult},
    heap::{Heap, HeapData},
    intern::Interns,
    object::{Descriptor, PropertyKey},
    realm::Realm,
    resource::ResourceTracker,
    value::{Value, number_to_string},
};

/// A value passed to or returned from the evaluator.
///
/// Owns all its data; can be freely cloned, serialized and stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// An array; holes surface as `Undefined`.
    List(Vec<HostValue>),
    /// An object's own enumerable data properties, in enumeration order.
    Object(Vec<(String, HostValue)>),
}

impl HostValue {
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }
}

/// Error returned by a host function.
#[derive(Debug, Clone)]
pub struct HostCallError {
    message: String,
}

impl HostCallError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Dispatcher for host functions registered by name.
///
/// A value is callable from the guest when the host exposes it here; the
/// guest sees it as an ordinary function value.
pub trait HostDispatch {
    fn call(&mut self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostCallError>;
}

impl<F> HostDispatch for F
where
    F: FnMut(&str, Vec<HostValue>) -> Result<HostValue, HostCallError>,
{
    fn call(&mut self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostCallError> {
        self(name, args)
    }
}

const MAX_CONVERSION_DEPTH: usize = 64;

/// Converts a guest value into an owned host value.
///
/// Functions, symbols and exotic objects render as strings; cyclic graphs
/// are cut off by a depth ceiling.
pub(crate) fn to_host_value(
    value: Value,
    heap: &Heap<impl ResourceTracker>,
    interns: &Interns,
    ctx: &EvalContext,
) -> RunResult<HostValue> {
    to_host_value_depth(value, heap, interns, ctx, 0)
}

fn to_host_value_depth(
    value: Value,
    heap: &Heap<impl ResourceTracker>,
    interns: &Interns,
    ctx: &EvalContext,
    depth: usize,
) -> RunResult<HostValue> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(RunError::internal("value graph too deep to convert"));
    }
    Ok(match value {
        Value::Undefined => HostValue::Undefined,
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(b),
        Value::Number(n) => HostValue::Number(n),
        Value::InternString(id) => HostValue::String(interns.get_str(id).to_owned()),
        Value::Symbol(sym) => HostValue::String(
            ctx.symbol_description(sym)
                .map_or_else(|| "Symbol()".to_owned(), |d| format!("Symbol({d})")),
        ),
        Value::Native(_) | Value::ExtFunction(_) => HostValue::String("[function]".to_owned()),
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => HostValue::String(s.clone()),
            HeapData::Array(arr) => {
                let mut out = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    out.push(to_host_value_depth(
                        element.unwrap_or(Value::Undefined),
                        heap,
                        interns,
                        ctx,
                        depth + 1,
                    )?);
                }
                HostValue::List(out)
            }
            HeapData::TypedArray(ta) => HostValue::List(ta.data.iter().map(|n| HostValue::Number(*n)).collect()),
            HeapData::Function(_) | HeapData::Bound(_) | HeapData::NativeFunc(_) => {
                HostValue::String("[function]".to_owned())
            }
            HeapData::Regex(r) => HostValue::String(format!("/{}/{}", r.source, r.flags)),
            _ => {
                // Ordinary objects (and exotic ones): own enumerable data
                // properties, accessors skipped.
                let mut out = Vec::new();
                if let Some(obj) = heap.object(id) {
                    for key in obj.enumerable_keys() {
                        if let Some(Descriptor::Data { value, .. }) = obj.get_own(&key.as_ref()) {
                            out.push((
                                key_display(&key),
                                to_host_value_depth(*value, heap, interns, ctx, depth + 1)?,
                            ));
                        }
                    }
                }
                HostValue::Object(out)
            }
        },
    })
}

fn key_display(key: &PropertyKey) -> String {
    match key {
        PropertyKey::Index(i) => i.to_string(),
        PropertyKey::String(s) => s.to_string(),
        PropertyKey::Symbol(_) => String::new(),
    }
}

/// Converts a host value into a guest value, allocating containers on the
/// heap.
pub(crate) fn from_host_value(
    value: &HostValue,
    heap: &mut Heap<impl ResourceTracker>,
    realm: Realm,
) -> RunResult<Value> {
    Ok(match value {
        HostValue::Undefined => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Number(n) => Value::Number(*n),
        HostValue::String(s) => heap.alloc_string(s.clone())?,
        HostValue::List(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(Some(from_host_value(item, heap, realm)?));
            }
            let array = crate::heap::JsArray::new(Some(realm.array_proto), elements);
            Value::Ref(heap.allocate(HeapData::Array(array))?)
        }
        HostValue::Object(entries) => {
            let obj = crate::object::JsObject::new(Some(realm.object_proto));
            let id = heap.allocate(HeapData::Object(obj))?;
            for (key, entry) in entries {
                let key = PropertyKey::from_str(key);
                let value = from_host_value(entry, heap, realm)?;
                if let Some(target) = heap.object_mut(id) {
                    target.insert_value(key, value);
                }
            }
            Value::Ref(id)
        }
    })
}

/// The display form used for uncaught thrown values surfaced to the host.
pub(crate) fn thrown_to_parts(
    value: Value,
    heap: &Heap<impl ResourceTracker>,
    interns: &Interns,
) -> (String, String) {
    match value {
        Value::Ref(id) => {
            if heap.object(id).is_some() {
                let read = |key: &str| -> Option<String> {
                    let mut cursor = Some(id);
                    while let Some(current) = cursor {
                        let obj = heap.object(current)?;
                        if let Some(Descriptor::Data { value, .. }) =
                            obj.get_own(&crate::object::PropertyKeyRef::String(key))
                        {
                            return value.string_content(heap, interns).map(str::to_owned);
                        }
                        cursor = obj.proto;
                    }
                    None
                };
                let name = read("name").unwrap_or_else(|| "Error".to_owned());
                let message = read("message").unwrap_or_default();
                return (name, message);
            }
            ("Error".to_owned(), String::new())
        }
        Value::InternString(s) => ("Error".to_owned(), interns.get_str(s).to_owned()),
        other => (
            "Error".to_owned(),
            match other {
                Value::Number(n) => number_to_string(n),
                Value::Bool(b) => b.to_string(),
                Value::Undefined => "undefined".to_owned(),
                Value::Null => "null".to_owned(),
                _ => "uncaught value".to_owned(),
            },
        ),
    }
}
