//! The guest heap: an arena of object-like values addressed by `HeapId`.
//!
//! The arena is append-only for the duration of a run; nothing is freed
//! until the heap drops with the run. Peak footprint is bounded by the
//! resource tracker rather than by collection, which keeps every `HeapId`
//! stable and lets closures, generators and promises hold plain indices.

use std::rc::Rc;

use crate::{
    ast::CtorKind,
    context::PrivateScope,
    environment::EnvId,
    generator::GeneratorState,
    intern::{FunctionId, StringId},
    object::{ClassBrandId, JsObject, PrivateNameId, PropertyKey},
    promise::PromiseState,
    resource::{ResourceError, ResourceTracker},
    span::SourceSpan,
    value::Value,
};

/// Index of a value in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct HeapId(u32);

impl HeapId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An array: dense element storage plus an ordinary object for everything
/// else (non-index properties and the prototype link).
#[derive(Debug, Clone)]
pub(crate) struct JsArray {
    pub obj: JsObject,
    /// `None` entries are holes.
    pub elements: Vec<Option<Value>>,
}

impl JsArray {
    pub fn new(proto: Option<HeapId>, elements: Vec<Option<Value>>) -> Self {
        Self {
            obj: JsObject::new(proto),
            elements,
        }
    }

    pub fn length(&self) -> u32 {
        u32::try_from(self.elements.len()).unwrap_or(u32::MAX)
    }

    /// Sets `length`, truncating or growing with holes.
    pub fn set_length(&mut self, len: u32) {
        self.elements.resize(len as usize, None);
    }
}

/// How one class field initializes on a fresh instance.
#[derive(Debug, Clone)]
pub(crate) enum FieldKey {
    Prop(PropertyKey),
    Private(PrivateNameId),
}

/// An instance field initializer recorded on a class constructor. Runs after
/// `super()` returns for derived classes, before the constructor body for
/// base classes.
#[derive(Debug, Clone)]
pub(crate) struct FieldInitializer {
    pub key: FieldKey,
    /// `None` initializes to `undefined`.
    pub init: Option<crate::ast::ExprLoc>,
    pub span: SourceSpan,
}

/// A guest function value: the definition plus everything the definition
/// site captured.
#[derive(Debug, Clone)]
pub(crate) struct JsFunction {
    pub obj: JsObject,
    pub def: FunctionId,
    /// Closure environment captured at the definition site. Arrows resolve
    /// `this`/`super`/`new.target` lexically through this chain.
    pub env: EnvId,
    /// Object the method was defined on, for `super.x` dispatch.
    pub home_object: Option<HeapId>,
    pub ctor_kind: CtorKind,
    /// Private-name scope active at the definition site, re-entered when the
    /// body runs.
    pub private_scope: Option<Rc<PrivateScope>>,
    /// Brand checked on receivers of this class's private members, and
    /// stamped onto instances the constructor creates.
    pub brand: Option<ClassBrandId>,
    /// Instance field initializers, present on class constructors only.
    pub field_inits: Option<Rc<Vec<FieldInitializer>>>,
    /// Instance private methods/accessors installed when the constructor
    /// brands a fresh instance.
    pub private_methods: Option<Rc<Vec<(PrivateNameId, crate::object::PrivateEntry)>>>,
    /// Overrides the definition name, e.g. `obj.method` names or inferred
    /// names of anonymous function expressions.
    pub name_override: Option<StringId>,
}

impl JsFunction {
    pub fn new(proto: Option<HeapId>, def: FunctionId, env: EnvId) -> Self {
        Self {
            obj: JsObject::new(proto),
            def,
            env,
            home_object: None,
            ctor_kind: CtorKind::None,
            private_scope: None,
            brand: None,
            field_inits: None,
            private_methods: None,
            name_override: None,
        }
    }
}

/// Result of `Function.prototype.bind`.
#[derive(Debug, Clone)]
pub(crate) struct BoundFunction {
    pub obj: JsObject,
    pub target: Value,
    pub bound_this: Value,
    pub bound_args: Vec<Value>,
}

/// An inert regex object: pattern and flags with no matching support.
#[derive(Debug, Clone)]
pub(crate) struct RegexObject {
    pub obj: JsObject,
    pub source: String,
    pub flags: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypedArrayKind {
    Float64,
    Int32,
    Uint8,
}

impl TypedArrayKind {
    /// Conversion applied when storing an element.
    pub fn clamp(self, n: f64) -> f64 {
        match self {
            Self::Float64 => n,
            Self::Int32 => f64::from(crate::value::to_int32(n)),
            Self::Uint8 => f64::from(crate::value::to_uint32(n) as u8),
        }
    }
}

/// A typed array with bounds-checked numeric indexing.
#[derive(Debug, Clone)]
pub(crate) struct TypedArrayObject {
    pub obj: JsObject,
    pub kind: TypedArrayKind,
    pub data: Vec<f64>,
}

/// The `arguments` object of a call with a simple parameter list in sloppy
/// mode: index slots alias the parameter bindings.
#[derive(Debug, Clone)]
pub(crate) struct ArgumentsObject {
    pub obj: JsObject,
    /// Environment holding the parameter bindings.
    pub env: EnvId,
    /// Parameter name per index while the alias is live; `None` once the
    /// index was deleted or for extra arguments beyond the parameter list.
    pub mapped_names: Vec<Option<StringId>>,
    /// Argument values for indices without a live alias.
    pub values: Vec<Value>,
}

/// State of an engine-provided iterator (arrays, strings, `arguments`).
#[derive(Debug, Clone)]
pub(crate) struct NativeIterState {
    pub obj: JsObject,
    pub kind: NativeIterKind,
    pub index: u32,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeIterKind {
    ArrayValues(HeapId),
    ArrayKeys(HeapId),
    ArrayEntries(HeapId),
    /// Iterates UTF-16-ish code points of a string value.
    StringChars(HeapId),
    /// Iterates the enumerable keys captured for `for…in`.
    KeyList(HeapId),
}

/// A builtin callable that carries properties (constructors with statics
/// and a `prototype`).
#[derive(Debug, Clone)]
pub(crate) struct NativeFuncObj {
    pub obj: JsObject,
    pub func: crate::builtins::NativeFn,
}

/// Heap-allocated guest data.
#[derive(Debug, Clone)]
pub(crate) enum HeapData {
    /// A computed string (literals stay interned).
    Str(String),
    Object(JsObject),
    Array(JsArray),
    Function(JsFunction),
    Bound(BoundFunction),
    NativeFunc(NativeFuncObj),
    Arguments(ArgumentsObject),
    Generator(GeneratorState),
    Promise(PromiseState),
    NativeIter(NativeIterState),
    Regex(RegexObject),
    TypedArray(TypedArrayObject),
}

impl HeapData {
    /// Rough size estimate fed to the resource tracker.
    fn estimate_size(&self) -> usize {
        match self {
            Self::Str(s) => std::mem::size_of::<Self>() + s.len(),
            Self::Array(arr) => std::mem::size_of::<Self>() + arr.elements.len() * std::mem::size_of::<Value>(),
            Self::TypedArray(ta) => std::mem::size_of::<Self>() + ta.data.len() * 8,
            _ => std::mem::size_of::<Self>() + 64,
        }
    }

    /// The embedded ordinary object, for every variant that has one.
    pub fn object(&self) -> Option<&JsObject> {
        match self {
            Self::Str(_) => None,
            Self::Object(obj) => Some(obj),
            Self::Array(arr) => Some(&arr.obj),
            Self::Function(f) => Some(&f.obj),
            Self::Bound(b) => Some(&b.obj),
            Self::NativeFunc(f) => Some(&f.obj),
            Self::Arguments(a) => Some(&a.obj),
            Self::Generator(g) => Some(&g.obj),
            Self::Promise(p) => Some(&p.obj),
            Self::NativeIter(it) => Some(&it.obj),
            Self::Regex(r) => Some(&r.obj),
            Self::TypedArray(ta) => Some(&ta.obj),
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut JsObject> {
        match self {
            Self::Str(_) => None,
            Self::Object(obj) => Some(obj),
            Self::Array(arr) => Some(&mut arr.obj),
            Self::Function(f) => Some(&mut f.obj),
            Self::Bound(b) => Some(&mut b.obj),
            Self::NativeFunc(f) => Some(&mut f.obj),
            Self::Arguments(a) => Some(&mut a.obj),
            Self::Generator(g) => Some(&mut g.obj),
            Self::Promise(p) => Some(&mut p.obj),
            Self::NativeIter(it) => Some(&mut it.obj),
            Self::Regex(r) => Some(&mut r.obj),
            Self::TypedArray(ta) => Some(&mut ta.obj),
        }
    }
}

/// The arena of heap values for one run.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<HeapData>,
    tracker: T,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            tracker,
        }
    }

    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;
        let id = HeapId(u32::try_from(self.entries.len()).expect("heap arena exceeds u32"));
        self.entries.push(data);
        Ok(id)
    }

    pub fn alloc_string(&mut self, s: String) -> Result<Value, ResourceError> {
        Ok(Value::Ref(self.allocate(HeapData::Str(s))?))
    }

    /// # Panics
    /// Panics on an id from another heap, which indicates a bug.
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entries[id.index()]
    }

    /// The embedded ordinary object of a heap value, if it has one.
    pub fn object(&self, id: HeapId) -> Option<&JsObject> {
        self.get(id).object()
    }

    pub fn object_mut(&mut self, id: HeapId) -> Option<&mut JsObject> {
        self.get_mut(id).object_mut()
    }

    /// The prototype link of a heap value.
    pub fn proto_of(&self, id: HeapId) -> Option<HeapId> {
        self.object(id).and_then(|obj| obj.proto)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }
}
