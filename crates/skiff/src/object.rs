//! Ordinary objects: property descriptors, prototype links, extensibility,
//! and private-name storage.
//!
//! Property maps are insertion-ordered (`IndexMap`); own-key iteration
//! produces integer-like keys in ascending numeric order first, then string
//! keys in insertion order, then symbols, which is the enumeration order the
//! language guarantees.

use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use indexmap::{Equivalent, IndexMap};
use smallvec::SmallVec;

use crate::{
    heap::HeapId,
    intern::{Interns, StringId, SymbolId},
    value::Value,
};

/// Opaque token for one `#name` of one class body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PrivateNameId(u32);

impl PrivateNameId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

/// Identity of one class body, used as the private brand stamped onto
/// instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ClassBrandId(u32);

impl ClassBrandId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

/// An owned property key.
///
/// Canonical numeric strings (`"0"`, `"7"`, ...) normalize to `Index` so that
/// array indices and plain objects share one ordering rule.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum PropertyKey {
    Index(u32),
    String(Box<str>),
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Builds a key from string content, normalizing canonical array indices.
    pub fn from_str(s: &str) -> Self {
        match canonical_index(s) {
            Some(index) => Self::Index(index),
            None => Self::String(s.into()),
        }
    }

    pub fn from_string_id(id: StringId, interns: &Interns) -> Self {
        Self::from_str(interns.get_str(id))
    }

    pub fn as_ref(&self) -> PropertyKeyRef<'_> {
        match self {
            Self::Index(i) => PropertyKeyRef::Index(*i),
            Self::String(s) => PropertyKeyRef::String(s),
            Self::Symbol(sym) => PropertyKeyRef::Symbol(*sym),
        }
    }

    /// Key text for error messages; symbols render their description form.
    pub fn display(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::String(s) => s.to_string(),
            Self::Symbol(sym) => sym
                .well_known_description()
                .map_or_else(|| "Symbol()".to_owned(), str::to_owned),
        }
    }
}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state);
    }
}

/// A borrowed property key for map lookups without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyKeyRef<'a> {
    Index(u32),
    String(&'a str),
    Symbol(SymbolId),
}

impl<'a> PropertyKeyRef<'a> {
    pub fn to_owned_key(self) -> PropertyKey {
        match self {
            Self::Index(i) => PropertyKey::Index(i),
            Self::String(s) => PropertyKey::String(s.into()),
            Self::Symbol(sym) => PropertyKey::Symbol(sym),
        }
    }

    /// Builds a lookup key from string content, normalizing array indices.
    pub fn from_str(s: &'a str) -> Self {
        match canonical_index(s) {
            Some(index) => Self::Index(index),
            None => Self::String(s),
        }
    }

    pub fn display(self) -> String {
        self.to_owned_key().display()
    }
}

impl Hash for PropertyKeyRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Index(i) => {
                state.write_u8(0);
                i.hash(state);
            }
            Self::String(s) => {
                state.write_u8(1);
                s.hash(state);
            }
            Self::Symbol(sym) => {
                state.write_u8(2);
                sym.hash(state);
            }
        }
    }
}

impl Equivalent<PropertyKey> for PropertyKeyRef<'_> {
    fn equivalent(&self, key: &PropertyKey) -> bool {
        match (self, key) {
            (Self::Index(a), PropertyKey::Index(b)) => a == b,
            (Self::String(a), PropertyKey::String(b)) => *a == &**b,
            (Self::Symbol(a), PropertyKey::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

/// Returns the index for a canonical array-index string (no leading zeros,
/// fits in u32, not `4294967295`).
fn canonical_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = s.parse().ok()?;
    if value == u32::MAX { None } else { Some(value) }
}

/// A property descriptor: data or accessor.
#[derive(Debug, Clone)]
pub(crate) enum Descriptor {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
        enumerable: bool,
        configurable: bool,
    },
}

impl Descriptor {
    /// Plain data property with all attributes set, the shape ordinary
    /// assignment creates.
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Data property with method-like attributes (non-enumerable).
    pub fn method(value: Value) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Frozen data property (`length` of arrays is handled separately).
    pub fn frozen(value: Value) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }
}

/// Outcome of `delete obj.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Property exists but is non-configurable.
    Sealed,
}

/// What a `#name` resolves to on an instance.
#[derive(Debug, Clone)]
pub(crate) enum PrivateEntry {
    Field(Value),
    Method(Value),
    Accessor { get: Option<Value>, set: Option<Value> },
}

/// An ordinary object.
#[derive(Debug, Clone)]
pub(crate) struct JsObject {
    pub proto: Option<HeapId>,
    pub extensible: bool,
    props: IndexMap<PropertyKey, Descriptor>,
    /// Private fields/methods installed by class machinery.
    pub private: AHashMap<PrivateNameId, PrivateEntry>,
    /// Class brands stamped on instances when private members install.
    pub brands: SmallVec<[ClassBrandId; 1]>,
}

impl JsObject {
    pub fn new(proto: Option<HeapId>) -> Self {
        Self {
            proto,
            extensible: true,
            props: IndexMap::new(),
            private: AHashMap::new(),
            brands: SmallVec::new(),
        }
    }

    pub fn get_own(&self, key: &PropertyKeyRef<'_>) -> Option<&Descriptor> {
        self.props.get(key)
    }

    pub fn get_own_mut(&mut self, key: &PropertyKeyRef<'_>) -> Option<&mut Descriptor> {
        self.props.get_mut(key)
    }

    pub fn has_own(&self, key: &PropertyKeyRef<'_>) -> bool {
        self.props.contains_key(key)
    }

    /// Unchecked insert used by literals and internal setup, bypassing
    /// extensibility and descriptor validation.
    pub fn insert(&mut self, key: PropertyKey, desc: Descriptor) {
        self.props.insert(key, desc);
    }

    pub fn insert_value(&mut self, key: PropertyKey, value: Value) {
        self.props.insert(key, Descriptor::data(value));
    }

    /// `ValidateAndApplyPropertyDescriptor` for the transitions the evaluator
    /// performs: rejects redefinition of non-configurable properties (other
    /// than writable→non-writable value updates on writable data properties)
    /// and additions to non-extensible objects.
    pub fn define_property(&mut self, key: PropertyKey, desc: Descriptor) -> Result<(), DefineFailure> {
        match self.props.get(&key.as_ref()) {
            None => {
                if !self.extensible {
                    return Err(DefineFailure::NotExtensible);
                }
                self.props.insert(key, desc);
                Ok(())
            }
            Some(existing) => {
                if existing.is_configurable() {
                    self.props.insert(key, desc);
                    return Ok(());
                }
                // Non-configurable: only a same-shape value update on a
                // writable data property is allowed.
                match (existing, &desc) {
                    (
                        Descriptor::Data {
                            writable: true,
                            enumerable,
                            ..
                        },
                        Descriptor::Data {
                            enumerable: new_enumerable,
                            configurable: false,
                            ..
                        },
                    ) if enumerable == new_enumerable => {
                        self.props.insert(key, desc);
                        Ok(())
                    }
                    _ => Err(DefineFailure::NotConfigurable),
                }
            }
        }
    }

    /// Writes a data value through an existing own property, respecting
    /// writability. Returns `None` when the key is absent or an accessor.
    pub fn try_write_own(&mut self, key: &PropertyKeyRef<'_>, value: Value) -> Option<Result<(), WriteFailure>> {
        match self.props.get_mut(key) {
            Some(Descriptor::Data {
                value: slot, writable, ..
            }) => {
                if *writable {
                    *slot = value;
                    Some(Ok(()))
                } else {
                    Some(Err(WriteFailure::ReadOnly))
                }
            }
            Some(Descriptor::Accessor { .. }) => None,
            None => None,
        }
    }

    pub fn delete(&mut self, key: &PropertyKeyRef<'_>) -> DeleteOutcome {
        match self.props.get(key) {
            None => DeleteOutcome::NotFound,
            Some(desc) if !desc.is_configurable() => DeleteOutcome::Sealed,
            Some(_) => {
                self.props.shift_remove(key);
                DeleteOutcome::Deleted
            }
        }
    }

    /// Own keys in enumeration order: integer-like ascending, then strings
    /// in insertion order, then symbols in insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut strings: Vec<PropertyKey> = Vec::new();
        let mut symbols: Vec<PropertyKey> = Vec::new();
        for key in self.props.keys() {
            match key {
                PropertyKey::Index(i) => indices.push(*i),
                PropertyKey::String(_) => strings.push(key.clone()),
                PropertyKey::Symbol(_) => symbols.push(key.clone()),
            }
        }
        indices.sort_unstable();
        let mut out = Vec::with_capacity(self.props.len());
        out.extend(indices.into_iter().map(PropertyKey::Index));
        out.append(&mut strings);
        out.append(&mut symbols);
        out
    }

    /// Enumerable own string/index keys in enumeration order, for `for…in`,
    /// `Object.keys` and object spread.
    pub fn enumerable_keys(&self) -> Vec<PropertyKey> {
        self.own_keys()
            .into_iter()
            .filter(|key| {
                !matches!(key, PropertyKey::Symbol(_))
                    && self.props.get(&key.as_ref()).is_some_and(Descriptor::is_enumerable)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn freeze(&mut self) {
        self.extensible = false;
        for desc in self.props.values_mut() {
            match desc {
                Descriptor::Data {
                    writable, configurable, ..
                } => {
                    *writable = false;
                    *configurable = false;
                }
                Descriptor::Accessor { configurable, .. } => *configurable = false,
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        !self.extensible
            && self.props.values().all(|desc| match desc {
                Descriptor::Data {
                    writable, configurable, ..
                } => !writable && !configurable,
                Descriptor::Accessor { configurable, .. } => !configurable,
            })
    }

    pub fn has_brand(&self, brand: ClassBrandId) -> bool {
        self.brands.contains(&brand)
    }

    pub fn add_brand(&mut self, brand: ClassBrandId) {
        if !self.brands.contains(&brand) {
            self.brands.push(brand);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefineFailure {
    NotExtensible,
    NotConfigurable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteFailure {
    ReadOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_indices_normalize() {
        assert_eq!(PropertyKey::from_str("3"), PropertyKey::Index(3));
        assert_eq!(PropertyKey::from_str("03"), PropertyKey::String("03".into()));
        assert_eq!(PropertyKey::from_str("-1"), PropertyKey::String("-1".into()));
        assert_eq!(PropertyKey::from_str("x"), PropertyKey::String("x".into()));
    }

    #[test]
    fn own_keys_are_integer_first() {
        let mut obj = JsObject::new(None);
        obj.insert_value(PropertyKey::from_str("b"), Value::Null);
        obj.insert_value(PropertyKey::from_str("2"), Value::Null);
        obj.insert_value(PropertyKey::from_str("a"), Value::Null);
        obj.insert_value(PropertyKey::from_str("0"), Value::Null);
        let keys: Vec<String> = obj.own_keys().iter().map(PropertyKey::display).collect();
        assert_eq!(keys, ["0", "2", "b", "a"]);
    }

    #[test]
    fn non_configurable_rejects_redefine() {
        let mut obj = JsObject::new(None);
        obj.insert(PropertyKey::from_str("k"), Descriptor::frozen(Value::Null));
        let err = obj.define_property(PropertyKey::from_str("k"), Descriptor::data(Value::Undefined));
        assert_eq!(err, Err(DefineFailure::NotConfigurable));
    }
}
