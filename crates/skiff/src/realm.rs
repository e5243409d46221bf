//! The bundled realm: intrinsic prototypes and the global environment.
//!
//! Only the surface needed to exercise the evaluator ships here. Every
//! global installs as an ordinary binding in the program scope, so guest
//! code (or the host) can shadow or replace any of them; the evaluator
//! looks up constructors by name, never by pointer.

use crate::{
    builtins::NativeFn,
    environment::{Binding, EnvId, Environments, ScopeKind, ScopeMode, ThisSlot},
    error::ErrorKind,
    heap::{Heap, HeapData, HeapId, NativeFuncObj},
    intern::{StaticStrings, SymbolId},
    object::{Descriptor, JsObject, PropertyKey},
    resource::{ResourceError, ResourceTracker},
    value::Value,
};

/// Handles to the realm's intrinsics plus the global scope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Realm {
    pub global_env: EnvId,
    pub global_this: HeapId,
    pub object_proto: HeapId,
    pub function_proto: HeapId,
    pub array_proto: HeapId,
    pub string_proto: HeapId,
    pub iter_proto: HeapId,
    pub generator_proto: HeapId,
    pub async_generator_proto: HeapId,
    pub promise_proto: HeapId,
    pub regexp_proto: HeapId,
    pub typed_array_proto: HeapId,
    pub error_proto: HeapId,
    pub type_error_proto: HeapId,
    pub range_error_proto: HeapId,
    pub reference_error_proto: HeapId,
    pub syntax_error_proto: HeapId,
    pub internal_error_proto: HeapId,
}

impl Realm {
    pub fn error_proto_for(&self, kind: ErrorKind) -> HeapId {
        match kind {
            ErrorKind::Error => self.error_proto,
            ErrorKind::TypeError => self.type_error_proto,
            ErrorKind::RangeError => self.range_error_proto,
            ErrorKind::ReferenceError => self.reference_error_proto,
            ErrorKind::SyntaxError => self.syntax_error_proto,
            ErrorKind::InternalError => self.internal_error_proto,
        }
    }

    /// Builds the intrinsics and the global environment for one run.
    pub fn install<T: ResourceTracker>(
        heap: &mut Heap<T>,
        envs: &mut Environments,
        strict: bool,
    ) -> Result<Self, ResourceError> {
        let object_proto = heap.allocate(HeapData::Object(JsObject::new(None)))?;
        let function_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let array_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let string_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let iter_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let generator_proto = heap.allocate(HeapData::Object(JsObject::new(Some(iter_proto))))?;
        let async_generator_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let promise_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let regexp_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let typed_array_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;
        let type_error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(error_proto))))?;
        let range_error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(error_proto))))?;
        let reference_error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(error_proto))))?;
        let syntax_error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(error_proto))))?;
        let internal_error_proto = heap.allocate(HeapData::Object(JsObject::new(Some(error_proto))))?;
        let global_this = heap.allocate(HeapData::Object(JsObject::new(Some(object_proto))))?;

        let global_env = envs.push(
            None,
            ScopeKind::Program,
            if strict { ScopeMode::Strict } else { ScopeMode::Sloppy },
        );
        envs.scope_mut(global_env).this_slot = Some(ThisSlot {
            value: Value::Ref(global_this),
            initialized: true,
        });

        let realm = Self {
            global_env,
            global_this,
            object_proto,
            function_proto,
            array_proto,
            string_proto,
            iter_proto,
            generator_proto,
            async_generator_proto,
            promise_proto,
            regexp_proto,
            typed_array_proto,
            error_proto,
            type_error_proto,
            range_error_proto,
            reference_error_proto,
            syntax_error_proto,
            internal_error_proto,
        };
        realm.populate(heap, envs)?;
        Ok(realm)
    }

    fn populate<T: ResourceTracker>(&self, heap: &mut Heap<T>, envs: &mut Environments) -> Result<(), ResourceError> {
        use NativeFn as N;
        use StaticStrings as S;

        let method = |obj: &mut JsObject, name: S, f: N| {
            obj.insert(PropertyKey::from_str(name.as_str()), Descriptor::method(Value::Native(f)));
        };
        let sym_method = |obj: &mut JsObject, sym: SymbolId, f: N| {
            obj.insert(PropertyKey::Symbol(sym), Descriptor::method(Value::Native(f)));
        };

        // Object.prototype
        {
            let obj = expect_obj(heap, self.object_proto);
            method(obj, S::HasOwnProperty, N::ObjectProtoHasOwnProperty);
            method(obj, S::ToString, N::ObjectProtoToString);
            method(obj, S::ValueOf, N::ObjectProtoValueOf);
        }
        // Function.prototype
        {
            let obj = expect_obj(heap, self.function_proto);
            method(obj, S::Call, N::FunctionProtoCall);
            method(obj, S::Apply, N::FunctionProtoApply);
            method(obj, S::Bind, N::FunctionProtoBind);
        }
        // Array.prototype
        {
            let obj = expect_obj(heap, self.array_proto);
            method(obj, S::Push, N::ArrayProtoPush);
            method(obj, S::Pop, N::ArrayProtoPop);
            method(obj, S::Shift, N::ArrayProtoShift);
            method(obj, S::Slice, N::ArrayProtoSlice);
            method(obj, S::Join, N::ArrayProtoJoin);
            method(obj, S::IndexOf, N::ArrayProtoIndexOf);
            method(obj, S::Includes, N::ArrayProtoIncludes);
            method(obj, S::ForEach, N::ArrayProtoForEach);
            method(obj, S::Map, N::ArrayProtoMap);
            method(obj, S::Filter, N::ArrayProtoFilter);
            method(obj, S::Concat, N::ArrayProtoConcat);
            method(obj, S::Keys, N::ArrayProtoKeys);
            method(obj, S::Values, N::ArrayProtoValues);
            method(obj, S::Entries, N::ArrayProtoEntries);
            // Array#toString is join with the default separator.
            method(obj, S::ToString, N::ArrayProtoJoin);
            sym_method(obj, SymbolId::ITERATOR, N::ArrayProtoValues);
        }
        // String.prototype
        {
            let obj = expect_obj(heap, self.string_proto);
            method(obj, S::Slice, N::StringProtoSlice);
            method(obj, S::IndexOf, N::StringProtoIndexOf);
            method(obj, S::Includes, N::StringProtoIncludes);
            method(obj, S::CharAt, N::StringProtoCharAt);
            method(obj, S::CharCodeAt, N::StringProtoCharCodeAt);
            method(obj, S::ToUpperCase, N::StringProtoToUpperCase);
            method(obj, S::ToLowerCase, N::StringProtoToLowerCase);
            method(obj, S::Split, N::StringProtoSplit);
            method(obj, S::Trim, N::StringProtoTrim);
            method(obj, S::Repeat, N::StringProtoRepeat);
            method(obj, S::StartsWith, N::StringProtoStartsWith);
            method(obj, S::EndsWith, N::StringProtoEndsWith);
            sym_method(obj, SymbolId::ITERATOR, N::StringProtoIterator);
        }
        // Engine iterator prototype
        {
            let obj = expect_obj(heap, self.iter_proto);
            method(obj, S::Next, N::NativeIterNext);
            sym_method(obj, SymbolId::ITERATOR, N::IterSelf);
        }
        // Generator prototypes
        {
            let obj = expect_obj(heap, self.generator_proto);
            method(obj, S::Next, N::GeneratorNext);
            method(obj, S::Return, N::GeneratorReturn);
            method(obj, S::Throw, N::GeneratorThrow);
            sym_method(obj, SymbolId::ITERATOR, N::IterSelf);
        }
        {
            let obj = expect_obj(heap, self.async_generator_proto);
            method(obj, S::Next, N::GeneratorNext);
            method(obj, S::Return, N::GeneratorReturn);
            method(obj, S::Throw, N::GeneratorThrow);
            sym_method(obj, SymbolId::ASYNC_ITERATOR, N::IterSelf);
        }
        // Promise.prototype
        {
            let obj = expect_obj(heap, self.promise_proto);
            method(obj, S::Then, N::PromiseProtoThen);
            method(obj, S::Catch, N::PromiseProtoCatch);
        }
        // Error prototypes
        for (proto, kind) in [
            (self.error_proto, ErrorKind::Error),
            (self.type_error_proto, ErrorKind::TypeError),
            (self.range_error_proto, ErrorKind::RangeError),
            (self.reference_error_proto, ErrorKind::ReferenceError),
            (self.syntax_error_proto, ErrorKind::SyntaxError),
            (self.internal_error_proto, ErrorKind::InternalError),
        ] {
            let name = heap.alloc_string(kind.to_string())?;
            let obj = expect_obj(heap, proto);
            obj.insert(PropertyKey::from_str("name"), Descriptor::method(name));
            obj.insert(
                PropertyKey::from_str("message"),
                Descriptor::method(Value::InternString(S::EmptyString.into())),
            );
            method(obj, S::ToString, N::ErrorProtoToString);
        }

        // Globals: simple value bindings.
        let define = |envs: &mut Environments, name: S, value: Value| {
            envs.define_unchecked(
                self.global_env,
                name.into(),
                Binding {
                    value,
                    is_lexical: false,
                    is_const: false,
                    initialized: true,
                    is_function_scoped: false,
                    blocks_function_scope: false,
                },
            );
        };
        envs.define_unchecked(
            self.global_env,
            S::Undefined.into(),
            Binding {
                value: Value::Undefined,
                is_lexical: true,
                is_const: true,
                initialized: true,
                is_function_scoped: false,
                blocks_function_scope: false,
            },
        );
        define(envs, S::NaN, Value::Number(f64::NAN));
        define(envs, S::Infinity, Value::Number(f64::INFINITY));
        define(envs, S::GlobalThis, Value::Ref(self.global_this));
        define(envs, S::ParseInt, Value::Native(N::ParseInt));
        define(envs, S::ParseFloat, Value::Native(N::ParseFloat));
        define(envs, S::IsNaN, Value::Native(N::GlobalIsNaN));
        define(envs, S::IsFinite, Value::Native(N::GlobalIsFinite));
        define(envs, S::Eval, Value::Native(N::EvalStub));
        define(envs, S::AwaitHelper, Value::Native(N::AwaitHelper));

        // console
        {
            let mut console = JsObject::new(Some(self.object_proto));
            method(&mut console, S::Log, N::ConsoleLog);
            method(&mut console, S::ErrorMethod, N::ConsoleError);
            method(&mut console, S::Warn, N::ConsoleLog);
            let console_id = heap.allocate(HeapData::Object(console))?;
            define(envs, S::Console, Value::Ref(console_id));
        }

        // Constructors with statics.
        let object_ctor = self.ctor(heap, N::ObjectCtor, Some(self.object_proto), |obj| {
            method(obj, S::Keys, N::ObjectKeys);
            method(obj, S::Values, N::ObjectValues);
            method(obj, S::Entries, N::ObjectEntries);
            method(obj, S::Freeze, N::ObjectFreeze);
            method(obj, S::IsFrozen, N::ObjectIsFrozen);
            method(obj, S::GetPrototypeOf, N::ObjectGetPrototypeOf);
            method(obj, S::DefineProperty, N::ObjectDefineProperty);
            method(obj, S::GetOwnPropertyNames, N::ObjectGetOwnPropertyNames);
            method(obj, S::Create, N::ObjectCreate);
            method(obj, S::Assign, N::ObjectAssign);
        })?;
        define(envs, S::ObjectCtor, object_ctor);
        self.link_constructor(heap, object_ctor, self.object_proto);

        let array_ctor = self.ctor(heap, N::ArrayCtor, Some(self.array_proto), |obj| {
            method(obj, S::IsArray, N::ArrayIsArray);
            method(obj, S::Of, N::ArrayOf);
        })?;
        define(envs, S::ArrayCtor, array_ctor);
        self.link_constructor(heap, array_ctor, self.array_proto);

        let string_ctor = self.ctor(heap, N::StringCtor, Some(self.string_proto), |_| {})?;
        define(envs, S::StringCtor, string_ctor);
        self.link_constructor(heap, string_ctor, self.string_proto);

        let number_ctor = self.ctor(heap, N::NumberCtor, None, |obj| {
            method(obj, S::IsNaN, N::NumberIsNaN);
            method(obj, S::IsFinite, N::NumberIsFinite);
            method(obj, S::IsInteger, N::NumberIsInteger);
            obj.insert(
                PropertyKey::from_str(S::MaxSafeInteger.as_str()),
                Descriptor::frozen(Value::Number(9_007_199_254_740_991.0)),
            );
            obj.insert(
                PropertyKey::from_str(S::Epsilon.as_str()),
                Descriptor::frozen(Value::Number(f64::EPSILON)),
            );
        })?;
        define(envs, S::NumberCtor, number_ctor);

        let boolean_ctor = self.ctor(heap, N::BooleanCtor, None, |_| {})?;
        define(envs, S::BooleanCtor, boolean_ctor);

        let symbol_ctor = self.ctor(heap, N::SymbolCtor, None, |obj| {
            obj.insert(
                PropertyKey::from_str(S::Iterator.as_str()),
                Descriptor::frozen(Value::Symbol(SymbolId::ITERATOR)),
            );
            obj.insert(
                PropertyKey::from_str(S::AsyncIterator.as_str()),
                Descriptor::frozen(Value::Symbol(SymbolId::ASYNC_ITERATOR)),
            );
            obj.insert(
                PropertyKey::from_str(S::HasInstance.as_str()),
                Descriptor::frozen(Value::Symbol(SymbolId::HAS_INSTANCE)),
            );
            obj.insert(
                PropertyKey::from_str(S::ToPrimitive.as_str()),
                Descriptor::frozen(Value::Symbol(SymbolId::TO_PRIMITIVE)),
            );
        })?;
        define(envs, S::SymbolCtor, symbol_ctor);

        let promise_ctor = self.ctor(heap, N::PromiseCtor, Some(self.promise_proto), |obj| {
            method(obj, S::Resolve, N::PromiseResolve);
            method(obj, S::Reject, N::PromiseReject);
        })?;
        define(envs, S::PromiseCtor, promise_ctor);
        self.link_constructor(heap, promise_ctor, self.promise_proto);

        // Math namespace
        {
            let mut math = JsObject::new(Some(self.object_proto));
            method(&mut math, S::Floor, N::MathFloor);
            method(&mut math, S::Ceil, N::MathCeil);
            method(&mut math, S::Round, N::MathRound);
            method(&mut math, S::Abs, N::MathAbs);
            method(&mut math, S::Max, N::MathMax);
            method(&mut math, S::Min, N::MathMin);
            method(&mut math, S::Pow, N::MathPow);
            method(&mut math, S::Sqrt, N::MathSqrt);
            method(&mut math, S::Trunc, N::MathTrunc);
            method(&mut math, S::Sign, N::MathSign);
            math.insert(
                PropertyKey::from_str(S::Pi.as_str()),
                Descriptor::frozen(Value::Number(std::f64::consts::PI)),
            );
            math.insert(
                PropertyKey::from_str(S::Euler.as_str()),
                Descriptor::frozen(Value::Number(std::f64::consts::E)),
            );
            let math_id = heap.allocate(HeapData::Object(math))?;
            define(envs, S::MathNs, Value::Ref(math_id));
        }

        // Error constructors
        for (name, kind, proto) in [
            (S::Error, ErrorKind::Error, self.error_proto),
            (S::TypeError, ErrorKind::TypeError, self.type_error_proto),
            (S::RangeError, ErrorKind::RangeError, self.range_error_proto),
            (S::ReferenceError, ErrorKind::ReferenceError, self.reference_error_proto),
            (S::SyntaxError, ErrorKind::SyntaxError, self.syntax_error_proto),
            (S::InternalError, ErrorKind::InternalError, self.internal_error_proto),
        ] {
            let ctor = self.ctor(heap, N::ErrorCtor(kind), Some(proto), |_| {})?;
            define(envs, name, ctor);
            self.link_constructor(heap, ctor, proto);
        }

        let regexp_ctor = self.ctor(heap, N::RegExpCtor, Some(self.regexp_proto), |_| {})?;
        define(envs, S::RegExpCtor, regexp_ctor);

        for (name, func) in [
            (S::Float64ArrayCtor, N::Float64ArrayCtor),
            (S::Int32ArrayCtor, N::Int32ArrayCtor),
            (S::Uint8ArrayCtor, N::Uint8ArrayCtor),
        ] {
            let ctor = self.ctor(heap, func, Some(self.typed_array_proto), |_| {})?;
            define(envs, name, ctor);
        }

        // globalThis mirrors itself.
        if let Some(obj) = heap.object_mut(self.global_this) {
            obj.insert_value(PropertyKey::from_str("globalThis"), Value::Ref(self.global_this));
        }

        Ok(())
    }

    /// Allocates a property-bearing native constructor.
    fn ctor<T: ResourceTracker>(
        &self,
        heap: &mut Heap<T>,
        func: NativeFn,
        prototype: Option<HeapId>,
        fill: impl FnOnce(&mut JsObject),
    ) -> Result<Value, ResourceError> {
        let mut obj = JsObject::new(Some(self.function_proto));
        if let Some(prototype) = prototype {
            obj.insert(
                PropertyKey::from_str("prototype"),
                Descriptor::frozen(Value::Ref(prototype)),
            );
        }
        fill(&mut obj);
        let id = heap.allocate(HeapData::NativeFunc(NativeFuncObj { obj, func }))?;
        Ok(Value::Ref(id))
    }

    /// Sets `prototype.constructor` back to the constructor.
    fn link_constructor<T: ResourceTracker>(&self, heap: &mut Heap<T>, ctor: Value, proto: HeapId) {
        if let Some(obj) = heap.object_mut(proto) {
            obj.insert(PropertyKey::from_str("constructor"), Descriptor::method(ctor));
        }
    }
}

fn expect_obj<T: ResourceTracker>(heap: &mut Heap<T>, id: HeapId) -> &mut JsObject {
    heap.object_mut(id).expect("intrinsic is an object")
}
