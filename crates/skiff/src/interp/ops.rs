//! Abstract operations: coercions, the property access protocol, operator
//! semantics and error materialization.

use std::borrow::Cow;

use crate::{
    ast::BinaryOp,
    environment::BindingError,
    error::{EngineError, ErrorKind, RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, StringId, SymbolId},
    interp::Interp,
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PropertyKey, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::{Value, number_to_string, to_int32, to_uint32},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveHint {
    Default,
    Number,
    String,
}

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    // ==========================
    // Errors

    /// Converts an environment-level failure into the guest error it means.
    pub fn binding_error(&self, err: BindingError, span: SourceSpan) -> RunError {
        match err {
            BindingError::NotFound(name) => RunError::raise_at(
                ErrorKind::ReferenceError,
                format!("{} is not defined", self.interns.get_str(name)),
                span,
            ),
            BindingError::Tdz(name) => RunError::raise_at(
                ErrorKind::ReferenceError,
                format!("Cannot access '{}' before initialization", self.interns.get_str(name)),
                span,
            ),
            BindingError::ConstAssign(name) => RunError::raise_at(
                ErrorKind::TypeError,
                format!("Assignment to constant variable '{}'", self.interns.get_str(name)),
                span,
            ),
            BindingError::DuplicateLexical(name) => RunError::raise_at(
                ErrorKind::SyntaxError,
                format!("Identifier '{}' has already been declared", self.interns.get_str(name)),
                span,
            ),
        }
    }

    /// Builds the guest `Error` object for an engine-raised error.
    ///
    /// The constructor is looked up *by name* in the global environment so a
    /// host-replaced constructor wins; when the realm carries none, the bare
    /// message string is thrown instead.
    pub fn materialize_error(&mut self, err: &EngineError) -> RunResult<Value> {
        let ctor_name: StringId = match err.kind {
            ErrorKind::Error => StaticStrings::Error,
            ErrorKind::TypeError => StaticStrings::TypeError,
            ErrorKind::RangeError => StaticStrings::RangeError,
            ErrorKind::ReferenceError => StaticStrings::ReferenceError,
            ErrorKind::SyntaxError => StaticStrings::SyntaxError,
            ErrorKind::InternalError => StaticStrings::InternalError,
        }
        .into();
        let message = self.heap.alloc_string(err.message.clone())?;
        match self.envs.get(self.realm.global_env, ctor_name) {
            Ok(ctor) if ctor.is_callable(self.heap) => {
                let error_value = self.construct(ctor, vec![message], SourceSpan::default())?;
                if let Value::Ref(id) = error_value
                    && let Some(frame) = err.frames.first()
                {
                    let start = frame.span.start();
                    let stack = format!(
                        "{}: {}\n    at {}:{}:{}",
                        err.kind,
                        err.message,
                        self.interns.get_str(frame.span.file),
                        start.line + 1,
                        start.column + 1
                    );
                    let stack_value = self.heap.alloc_string(stack)?;
                    if let Some(obj) = self.heap.object_mut(id) {
                        obj.insert(
                            PropertyKey::String("stack".into()),
                            Descriptor::method(stack_value),
                        );
                    }
                }
                Ok(error_value)
            }
            _ => Ok(message),
        }
    }

    /// Turns a catchable error into the value a `catch` binding observes.
    pub fn error_to_value(&mut self, err: RunError) -> RunResult<Value> {
        match err {
            RunError::Throw(thrown) => Ok(thrown.value),
            RunError::Raise(engine_err) => self.materialize_error(&engine_err),
            other => Err(other),
        }
    }

    // ==========================
    // Coercions

    pub fn to_primitive(&mut self, value: Value, hint: PrimitiveHint, span: SourceSpan) -> RunResult<Value> {
        let Value::Ref(id) = value else {
            return Ok(value);
        };
        if matches!(self.heap.get(id), HeapData::Str(_)) {
            return Ok(value);
        }
        // @@toPrimitive wins when present.
        if let Some(exotic) = self.get_method(value, PropertyKeyRef::Symbol(SymbolId::TO_PRIMITIVE), span)? {
            let hint_str = match hint {
                PrimitiveHint::Default => "default",
                PrimitiveHint::Number => "number",
                PrimitiveHint::String => "string",
            };
            let hint_value = self.heap.alloc_string(hint_str.to_owned())?;
            let result = self.call_value(exotic, value, vec![hint_value], None, span)?;
            if !matches!(result, Value::Ref(r) if !matches!(self.heap.get(r), HeapData::Str(_))) {
                return Ok(result);
            }
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot convert object to primitive value",
                span,
            ));
        }
        let methods: [StaticStrings; 2] = match hint {
            PrimitiveHint::String => [StaticStrings::ToString, StaticStrings::ValueOf],
            _ => [StaticStrings::ValueOf, StaticStrings::ToString],
        };
        for method_name in methods {
            let method = self.get_property(value, PropertyKeyRef::String(method_name.as_str()), span)?;
            if method.is_callable(self.heap) {
                let result = self.call_value(method, value, vec![], None, span)?;
                let is_object = matches!(result, Value::Ref(r) if !matches!(self.heap.get(r), HeapData::Str(_)));
                if !is_object {
                    return Ok(result);
                }
            }
        }
        Err(RunError::raise_at(
            ErrorKind::TypeError,
            "Cannot convert object to primitive value",
            span,
        ))
    }

    pub fn to_number(&mut self, value: Value, span: SourceSpan) -> RunResult<f64> {
        if let Some(n) = value.to_number_primitive(self.heap, self.interns) {
            return Ok(n);
        }
        match value {
            Value::Symbol(_) => Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot convert a Symbol value to a number",
                span,
            )),
            Value::Native(_) | Value::ExtFunction(_) => Ok(f64::NAN),
            _ => {
                let primitive = self.to_primitive(value, PrimitiveHint::Number, span)?;
                primitive.to_number_primitive(self.heap, self.interns).ok_or_else(|| {
                    RunError::raise_at(ErrorKind::TypeError, "Cannot convert value to a number", span)
                })
            }
        }
    }

    pub fn to_string_rust(&mut self, value: Value, span: SourceSpan) -> RunResult<String> {
        match value {
            Value::Undefined => Ok("undefined".to_owned()),
            Value::Null => Ok("null".to_owned()),
            Value::Bool(b) => Ok(if b { "true" } else { "false" }.to_owned()),
            Value::Number(n) => Ok(number_to_string(n)),
            Value::InternString(id) => Ok(self.interns.get_str(id).to_owned()),
            Value::Symbol(_) => Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot convert a Symbol value to a string",
                span,
            )),
            Value::Native(_) | Value::ExtFunction(_) => Ok("function () { [native code] }".to_owned()),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Ok(s.clone()),
                _ => {
                    let primitive = self.to_primitive(value, PrimitiveHint::String, span)?;
                    self.to_string_rust(primitive, span)
                }
            },
        }
    }

    pub fn to_string_value(&mut self, value: Value, span: SourceSpan) -> RunResult<Value> {
        match value {
            Value::InternString(_) => Ok(value),
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Str(_)) => Ok(value),
            _ => {
                let s = self.to_string_rust(value, span)?;
                Ok(self.heap.alloc_string(s)?)
            }
        }
    }

    pub fn to_property_key(&mut self, value: Value, span: SourceSpan) -> RunResult<PropertyKey> {
        match value {
            Value::Symbol(sym) => Ok(PropertyKey::Symbol(sym)),
            _ => {
                let primitive = self.to_primitive(value, PrimitiveHint::String, span)?;
                if let Value::Symbol(sym) = primitive {
                    return Ok(PropertyKey::Symbol(sym));
                }
                let s = self.to_string_rust(primitive, span)?;
                Ok(PropertyKey::from_str(&s))
            }
        }
    }

    // ==========================
    // Property access

    /// `[[Get]]` with the full prototype walk and accessor invocation.
    pub fn get_property(&mut self, target: Value, key: PropertyKeyRef<'_>, span: SourceSpan) -> RunResult<Value> {
        match target {
            Value::Undefined | Value::Null => Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    if target.is_undefined() { "undefined" } else { "null" },
                    key.display()
                ),
                span,
            )),
            Value::InternString(id) => {
                let content = self.interns.get_str(id).to_owned();
                self.string_property(&content, target, key, span)
            }
            Value::Bool(_) | Value::Number(_) => self.walk_get(Some(self.realm.object_proto), target, key, span),
            Value::Symbol(sym) => {
                if let PropertyKeyRef::String("description") = key {
                    let description = self
                        .ctx
                        .symbol_description(sym)
                        .map(str::to_owned)
                        .unwrap_or_default();
                    return Ok(self.heap.alloc_string(description)?);
                }
                self.walk_get(Some(self.realm.object_proto), target, key, span)
            }
            Value::Native(_) | Value::ExtFunction(_) => {
                self.walk_get(Some(self.realm.function_proto), target, key, span)
            }
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => {
                    let content = s.clone();
                    self.string_property(&content, target, key, span)
                }
                HeapData::Array(arr) => {
                    if let PropertyKeyRef::Index(i) = key {
                        let i = i as usize;
                        if i < arr.elements.len() {
                            return Ok(arr.elements[i].unwrap_or(Value::Undefined));
                        }
                    }
                    if let PropertyKeyRef::String("length") = key {
                        return Ok(Value::Number(f64::from(arr.length())));
                    }
                    self.walk_get(Some(id), target, key, span)
                }
                HeapData::TypedArray(ta) => {
                    if let PropertyKeyRef::Index(i) = key {
                        let i = i as usize;
                        return if i < ta.data.len() {
                            Ok(Value::Number(ta.data[i]))
                        } else {
                            Err(RunError::raise_at(
                                ErrorKind::RangeError,
                                format!("index {i} is out of bounds"),
                                span,
                            ))
                        };
                    }
                    if let PropertyKeyRef::String("length") = key {
                        return Ok(Value::Number(ta.data.len() as f64));
                    }
                    self.walk_get(Some(id), target, key, span)
                }
                HeapData::Arguments(args) => {
                    if let PropertyKeyRef::Index(i) = key {
                        let i = i as usize;
                        if let Some(Some(name)) = args.mapped_names.get(i) {
                            let env = args.env;
                            let name = *name;
                            return self.envs.get(env, name).map_err(|e| self.binding_error(e, span));
                        }
                        if let Some(value) = args.values.get(i) {
                            return Ok(*value);
                        }
                    }
                    if let PropertyKeyRef::String("length") = key {
                        return Ok(Value::Number(args.values.len() as f64));
                    }
                    self.walk_get(Some(id), target, key, span)
                }
                _ => self.walk_get(Some(id), target, key, span),
            },
        }
    }

    fn walk_get(
        &mut self,
        start: Option<HeapId>,
        receiver: Value,
        key: PropertyKeyRef<'_>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let mut cursor = start;
        while let Some(id) = cursor {
            let Some(obj) = self.heap.object(id) else {
                break;
            };
            if let Some(desc) = obj.get_own(&key) {
                return match desc {
                    Descriptor::Data { value, .. } => Ok(*value),
                    Descriptor::Accessor { get: Some(getter), .. } => {
                        let getter = *getter;
                        self.call_value(getter, receiver, vec![], None, span)
                    }
                    Descriptor::Accessor { get: None, .. } => Ok(Value::Undefined),
                };
            }
            // Arrays on the prototype chain still answer index reads.
            if let (PropertyKeyRef::Index(i), HeapData::Array(arr)) = (key, self.heap.get(id)) {
                if let Some(Some(value)) = arr.elements.get(i as usize) {
                    return Ok(*value);
                }
            }
            cursor = self.heap.proto_of(id);
        }
        Ok(Value::Undefined)
    }

    fn string_property(
        &mut self,
        content: &str,
        receiver: Value,
        key: PropertyKeyRef<'_>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        match key {
            PropertyKeyRef::String("length") => Ok(Value::Number(content.encode_utf16().count() as f64)),
            PropertyKeyRef::Index(i) => match content.chars().nth(i as usize) {
                Some(c) => Ok(self.heap.alloc_string(c.to_string())?),
                None => Ok(Value::Undefined),
            },
            _ => self.walk_get(Some(self.realm.string_proto), receiver, key, span),
        }
    }

    /// `[[Set]]`: setter dispatch, writability checks and receiver-side
    /// creation of data properties.
    pub fn set_property(
        &mut self,
        target: Value,
        key: PropertyKeyRef<'_>,
        value: Value,
        strict: bool,
        span: SourceSpan,
    ) -> RunResult<()> {
        let id = match target {
            Value::Undefined | Value::Null => {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    format!(
                        "Cannot set properties of {} (setting '{}')",
                        if target.is_undefined() { "undefined" } else { "null" },
                        key.display()
                    ),
                    span,
                ));
            }
            Value::Ref(id) => id,
            _ => {
                // Property writes on primitives evaporate in sloppy mode.
                if strict {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        format!("Cannot create property '{}' on a primitive", key.display()),
                        span,
                    ));
                }
                return Ok(());
            }
        };

        match self.heap.get_mut(id) {
            HeapData::Str(_) => {
                if strict {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        format!("Cannot create property '{}' on a string", key.display()),
                        span,
                    ));
                }
                return Ok(());
            }
            HeapData::Array(arr) => match key {
                PropertyKeyRef::Index(i) => {
                    let i = i as usize;
                    if i < arr.elements.len() {
                        arr.elements[i] = Some(value);
                    } else {
                        arr.elements.resize(i, None);
                        arr.elements.push(Some(value));
                    }
                    return Ok(());
                }
                PropertyKeyRef::String("length") => {
                    let Some(n) = value.as_number() else {
                        return Err(RunError::raise_at(ErrorKind::RangeError, "Invalid array length", span));
                    };
                    let len = to_uint32(n);
                    if f64::from(len) != n {
                        return Err(RunError::raise_at(ErrorKind::RangeError, "Invalid array length", span));
                    }
                    arr.set_length(len);
                    return Ok(());
                }
                _ => {}
            },
            HeapData::TypedArray(ta) => {
                if let PropertyKeyRef::Index(i) = key {
                    let i = i as usize;
                    if i >= ta.data.len() {
                        return Err(RunError::raise_at(
                            ErrorKind::RangeError,
                            format!("index {i} is out of bounds"),
                            span,
                        ));
                    }
                    let Some(n) = value.as_number() else {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            "typed array elements must be numbers",
                            span,
                        ));
                    };
                    ta.data[i] = ta.kind.clamp(n);
                    return Ok(());
                }
            }
            HeapData::Arguments(args) => {
                if let PropertyKeyRef::Index(i) = key {
                    let i = i as usize;
                    if let Some(Some(name)) = args.mapped_names.get(i) {
                        let env = args.env;
                        let name = *name;
                        return self
                            .envs
                            .assign(env, name, value)
                            .map_err(|e| self.binding_error(e, span));
                    }
                    if i < args.values.len() {
                        args.values[i] = value;
                        return Ok(());
                    }
                }
            }
            _ => {}
        }

        // Ordinary path: find a setter or a blocking descriptor on the chain.
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(obj) = self.heap.object(current) else {
                break;
            };
            match obj.get_own(&key) {
                Some(Descriptor::Accessor { set: Some(setter), .. }) => {
                    let setter = *setter;
                    self.call_value(setter, target, vec![value], None, span)?;
                    return Ok(());
                }
                Some(Descriptor::Accessor { set: None, .. }) => {
                    if strict {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            format!("Cannot set property '{}' which has only a getter", key.display()),
                            span,
                        ));
                    }
                    return Ok(());
                }
                Some(Descriptor::Data { writable: false, .. }) => {
                    if strict {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            format!("Cannot assign to read only property '{}'", key.display()),
                            span,
                        ));
                    }
                    return Ok(());
                }
                Some(Descriptor::Data { .. }) if current == id => {
                    let obj = self.heap.object_mut(id).expect("receiver is an object");
                    obj.try_write_own(&key, value);
                    return Ok(());
                }
                Some(Descriptor::Data { .. }) => break,
                None => cursor = self.heap.proto_of(current),
            }
        }

        let obj = self.heap.object_mut(id).expect("receiver is an object");
        if !obj.extensible {
            if strict {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    format!("Cannot add property '{}', object is not extensible", key.display()),
                    span,
                ));
            }
            return Ok(());
        }
        obj.insert_value(key.to_owned_key(), value);
        Ok(())
    }

    pub fn has_property(&self, target: Value, key: &PropertyKeyRef<'_>) -> bool {
        let mut cursor = match target {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => return string_has(s, key),
                HeapData::Array(arr) => {
                    if let PropertyKeyRef::Index(i) = key {
                        if arr.elements.get(*i as usize).is_some_and(Option::is_some) {
                            return true;
                        }
                    }
                    if matches!(key, PropertyKeyRef::String("length")) {
                        return true;
                    }
                    Some(id)
                }
                _ => Some(id),
            },
            Value::InternString(id) => return string_has(self.interns.get_str(id), key),
            _ => return false,
        };
        while let Some(id) = cursor {
            if let Some(obj) = self.heap.object(id) {
                if obj.has_own(key) {
                    return true;
                }
                if let (PropertyKeyRef::Index(i), HeapData::Array(arr)) = (key, self.heap.get(id))
                    && arr.elements.get(*i as usize).is_some_and(Option::is_some)
                {
                    return true;
                }
                cursor = obj.proto;
            } else {
                break;
            }
        }
        false
    }

    pub fn delete_property(
        &mut self,
        target: Value,
        key: PropertyKeyRef<'_>,
        strict: bool,
        span: SourceSpan,
    ) -> RunResult<bool> {
        let Value::Ref(id) = target else {
            return Ok(true);
        };
        if let (HeapData::Array(arr), PropertyKeyRef::Index(i)) = (self.heap.get_mut(id), key) {
            let i = i as usize;
            if i < arr.elements.len() {
                arr.elements[i] = None;
            }
            return Ok(true);
        }
        let Some(obj) = self.heap.object_mut(id) else {
            return Ok(true);
        };
        match obj.delete(&key) {
            crate::object::DeleteOutcome::Deleted | crate::object::DeleteOutcome::NotFound => Ok(true),
            crate::object::DeleteOutcome::Sealed => {
                if strict {
                    Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        format!("Cannot delete property '{}'", key.display()),
                        span,
                    ))
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// GetMethod: undefined/null count as absent, anything else must be
    /// callable.
    pub fn get_method(&mut self, value: Value, key: PropertyKeyRef<'_>, span: SourceSpan) -> RunResult<Option<Value>> {
        if value.is_nullish() {
            return Ok(None);
        }
        let method = self.get_property(value, key, span)?;
        if method.is_nullish() {
            return Ok(None);
        }
        if !method.is_callable(self.heap) {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("'{}' is not a function", key.display()),
                span,
            ));
        }
        Ok(Some(method))
    }

    // ==========================
    // Operators

    pub fn binary_op(&mut self, op: BinaryOp, left: Value, right: Value, span: SourceSpan) -> RunResult<Value> {
        use BinaryOp::{
            Add, BitAnd, BitOr, BitXor, Div, Eq, Exp, Gt, GtE, In, InstanceOf, Lt, LtE, Mul, NotEq, Rem, ShiftLeft,
            ShiftRight, ShiftRightZero, StrictEq, StrictNotEq, Sub,
        };
        match op {
            Add => {
                let left_primitive = self.to_primitive(left, PrimitiveHint::Default, span)?;
                let right_primitive = self.to_primitive(right, PrimitiveHint::Default, span)?;
                let left_is_string = left_primitive.string_content(self.heap, self.interns).is_some();
                let right_is_string = right_primitive.string_content(self.heap, self.interns).is_some();
                if left_is_string || right_is_string {
                    let mut combined = self.to_string_rust(left_primitive, span)?;
                    combined.push_str(&self.to_string_rust(right_primitive, span)?);
                    Ok(self.heap.alloc_string(combined)?)
                } else {
                    let a = self.to_number(left_primitive, span)?;
                    let b = self.to_number(right_primitive, span)?;
                    Ok(Value::Number(a + b))
                }
            }
            Sub => self.numeric_op(left, right, span, |a, b| a - b),
            Mul => self.numeric_op(left, right, span, |a, b| a * b),
            Div => self.numeric_op(left, right, span, |a, b| a / b),
            Rem => self.numeric_op(left, right, span, crate::fold::js_remainder),
            Exp => self.numeric_op(left, right, span, f64::powf),
            ShiftLeft => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_int32(a) << (to_uint32(b) & 31))))
            }
            ShiftRight => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_int32(a) >> (to_uint32(b) & 31))))
            }
            ShiftRightZero => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_uint32(a) >> (to_uint32(b) & 31))))
            }
            BitAnd => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_int32(a) & to_int32(b))))
            }
            BitOr => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_int32(a) | to_int32(b))))
            }
            BitXor => {
                let (a, b) = (self.to_number(left, span)?, self.to_number(right, span)?);
                Ok(Value::Number(f64::from(to_int32(a) ^ to_int32(b))))
            }
            Lt | LtE | Gt | GtE => {
                let a = self.to_primitive(left, PrimitiveHint::Number, span)?;
                let b = self.to_primitive(right, PrimitiveHint::Number, span)?;
                let result = match (
                    a.string_content(self.heap, self.interns),
                    b.string_content(self.heap, self.interns),
                ) {
                    (Some(sa), Some(sb)) => match op {
                        Lt => sa < sb,
                        LtE => sa <= sb,
                        Gt => sa > sb,
                        _ => sa >= sb,
                    },
                    _ => {
                        let (na, nb) = (self.to_number(a, span)?, self.to_number(b, span)?);
                        if na.is_nan() || nb.is_nan() {
                            false
                        } else {
                            match op {
                                Lt => na < nb,
                                LtE => na <= nb,
                                Gt => na > nb,
                                _ => na >= nb,
                            }
                        }
                    }
                };
                Ok(Value::Bool(result))
            }
            Eq => Ok(Value::Bool(self.loose_eq(left, right, span)?)),
            NotEq => Ok(Value::Bool(!self.loose_eq(left, right, span)?)),
            StrictEq => Ok(Value::Bool(left.strict_eq(right, self.heap, self.interns))),
            StrictNotEq => Ok(Value::Bool(!left.strict_eq(right, self.heap, self.interns))),
            In => {
                if !matches!(right, Value::Ref(id) if self.heap.object(id).is_some()) {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        "Cannot use 'in' operator on a non-object",
                        span,
                    ));
                }
                let key = self.to_property_key(left, span)?;
                Ok(Value::Bool(self.has_property(right, &key.as_ref())))
            }
            InstanceOf => Ok(Value::Bool(self.instance_of(left, right, span)?)),
        }
    }

    fn numeric_op(
        &mut self,
        left: Value,
        right: Value,
        span: SourceSpan,
        f: impl FnOnce(f64, f64) -> f64,
    ) -> RunResult<Value> {
        let a = self.to_number(left, span)?;
        let b = self.to_number(right, span)?;
        Ok(Value::Number(f(a, b)))
    }

    pub fn loose_eq(&mut self, left: Value, right: Value, span: SourceSpan) -> RunResult<bool> {
        match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Number(_), Value::Number(_)) => Ok(left.strict_eq(right, self.heap, self.interns)),
            (Value::Bool(b), other) => self.loose_eq(Value::Number(if b { 1.0 } else { 0.0 }), other, span),
            (other, Value::Bool(b)) => self.loose_eq(other, Value::Number(if b { 1.0 } else { 0.0 }), span),
            (Value::Number(n), other) if other.string_content(self.heap, self.interns).is_some() => {
                let m = self.to_number(other, span)?;
                Ok(Value::Number(n).strict_eq(Value::Number(m), self.heap, self.interns))
            }
            (other, Value::Number(n)) if other.string_content(self.heap, self.interns).is_some() => {
                let m = self.to_number(other, span)?;
                Ok(Value::Number(m).strict_eq(Value::Number(n), self.heap, self.interns))
            }
            (Value::Ref(id), other)
                if !matches!(self.heap.get(id), HeapData::Str(_))
                    && matches!(
                        other,
                        Value::Number(_) | Value::InternString(_) | Value::Symbol(_)
                    )
                    || matches!(other, Value::Ref(o) if matches!(self.heap.get(o), HeapData::Str(_)))
                        && !matches!(self.heap.get(id), HeapData::Str(_)) =>
            {
                let primitive = self.to_primitive(left, PrimitiveHint::Default, span)?;
                self.loose_eq(primitive, other, span)
            }
            (other, Value::Ref(id))
                if !matches!(self.heap.get(id), HeapData::Str(_))
                    && (matches!(
                        other,
                        Value::Number(_) | Value::InternString(_) | Value::Symbol(_)
                    ) || matches!(other, Value::Ref(o) if matches!(self.heap.get(o), HeapData::Str(_)))) =>
            {
                let primitive = self.to_primitive(right, PrimitiveHint::Default, span)?;
                self.loose_eq(other, primitive, span)
            }
            _ => Ok(left.strict_eq(right, self.heap, self.interns)),
        }
    }

    pub fn instance_of(&mut self, value: Value, target: Value, span: SourceSpan) -> RunResult<bool> {
        if !target.is_callable(self.heap) {
            // @@hasInstance can make non-callables work.
            if let Some(has_instance) =
                self.get_method(target, PropertyKeyRef::Symbol(SymbolId::HAS_INSTANCE), span)?
            {
                let result = self.call_value(has_instance, target, vec![value], None, span)?;
                return Ok(result.truthy(self.heap, self.interns));
            }
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Right-hand side of 'instanceof' is not callable",
                span,
            ));
        }
        if let Some(has_instance) = self.get_method(target, PropertyKeyRef::Symbol(SymbolId::HAS_INSTANCE), span)? {
            let result = self.call_value(has_instance, target, vec![value], None, span)?;
            return Ok(result.truthy(self.heap, self.interns));
        }
        let prototype = self.get_property(target, PropertyKeyRef::String("prototype"), span)?;
        let Value::Ref(proto_id) = prototype else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Function has non-object prototype in instanceof check",
                span,
            ));
        };
        let Value::Ref(mut cursor) = value else {
            return Ok(false);
        };
        while let Some(parent) = self.heap.proto_of(cursor) {
            if parent == proto_id {
                return Ok(true);
            }
            cursor = parent;
        }
        Ok(false)
    }

    // ==========================
    // for-in support

    /// Enumerable string-keyed properties of the object and its prototype
    /// chain, shadowed names excluded.
    pub fn for_in_keys(&self, target: Value) -> Vec<PropertyKey> {
        let mut seen: Vec<PropertyKey> = Vec::new();
        let mut keys = Vec::new();
        let Value::Ref(mut id) = target else {
            return keys;
        };
        loop {
            if let HeapData::Array(arr) = self.heap.get(id) {
                for (index, element) in arr.elements.iter().enumerate() {
                    if element.is_some() {
                        let key = PropertyKey::Index(index as u32);
                        if !seen.contains(&key) {
                            seen.push(key.clone());
                            keys.push(key);
                        }
                    }
                }
            }
            if let Some(obj) = self.heap.object(id) {
                for key in obj.enumerable_keys() {
                    if !seen.contains(&key) {
                        seen.push(key.clone());
                        keys.push(key);
                    }
                }
                // Shadowing: non-enumerable own keys still hide proto keys.
                for key in obj.own_keys() {
                    if !seen.contains(&key) {
                        seen.push(key);
                    }
                }
                match obj.proto {
                    Some(parent) => id = parent,
                    None => break,
                }
            } else {
                break;
            }
        }
        keys
    }

    pub fn key_to_value(&mut self, key: &PropertyKey) -> RunResult<Value> {
        Ok(match key {
            PropertyKey::Index(i) => self.heap.alloc_string(i.to_string())?,
            PropertyKey::String(s) => self.heap.alloc_string(s.to_string())?,
            PropertyKey::Symbol(sym) => Value::Symbol(*sym),
        })
    }

    // ==========================
    // Display (console / diagnostics)

    /// Console-style rendering: strings print raw at top level and quoted
    /// when nested; containers render shallowly with a depth limit.
    pub fn display_value(&self, value: Value, top_level: bool, depth: usize) -> String {
        match value {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => if b { "true" } else { "false" }.to_owned(),
            Value::Number(n) => number_to_string(n),
            Value::InternString(id) => {
                let s = self.interns.get_str(id);
                if top_level { s.to_owned() } else { format!("'{s}'") }
            }
            Value::Symbol(sym) => {
                let description: Cow<'_, str> = match self.ctx.symbol_description(sym) {
                    Some(d) => d.into(),
                    None => "".into(),
                };
                format!("Symbol({description})")
            }
            Value::Native(_) | Value::ExtFunction(_) => "[Function (native)]".to_owned(),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => {
                    if top_level {
                        s.clone()
                    } else {
                        format!("'{s}'")
                    }
                }
                HeapData::Array(arr) => {
                    if depth >= 3 {
                        return "[Array]".to_owned();
                    }
                    let parts: Vec<String> = arr
                        .elements
                        .iter()
                        .map(|element| match element {
                            Some(v) => self.display_value(*v, false, depth + 1),
                            None => "<empty>".to_owned(),
                        })
                        .collect();
                    format!("[ {} ]", parts.join(", "))
                }
                HeapData::Function(f) => {
                    let def = self.interns.get_function(f.def);
                    let name = f
                        .name_override
                        .or(def.name)
                        .map(|id| self.interns.get_str(id).to_owned());
                    match name {
                        Some(name) => format!("[Function: {name}]"),
                        None => "[Function (anonymous)]".to_owned(),
                    }
                }
                HeapData::Bound(_) => "[Function (bound)]".to_owned(),
                HeapData::NativeFunc(_) => "[Function (native)]".to_owned(),
                HeapData::Promise(_) => "Promise { <state> }".to_owned(),
                HeapData::Generator(_) => "Object [Generator] {}".to_owned(),
                HeapData::Regex(r) => format!("/{}/{}", r.source, r.flags),
                HeapData::TypedArray(ta) => {
                    let parts: Vec<String> = ta.data.iter().map(|n| number_to_string(*n)).collect();
                    format!("[ {} ]", parts.join(", "))
                }
                HeapData::NativeIter(_) => "Object [Iterator] {}".to_owned(),
                HeapData::Arguments(args) => format!("[Arguments] {{ length: {} }}", args.values.len()),
                HeapData::Object(obj) => {
                    if depth >= 3 {
                        return "[Object]".to_owned();
                    }
                    let mut parts = Vec::new();
                    for key in obj.enumerable_keys() {
                        if let Some(Descriptor::Data { value, .. }) = obj.get_own(&key.as_ref()) {
                            parts.push(format!("{}: {}", key.display(), self.display_value(*value, false, depth + 1)));
                        } else {
                            parts.push(format!("{}: [Getter]", key.display()));
                        }
                    }
                    if parts.is_empty() {
                        "{}".to_owned()
                    } else {
                        format!("{{ {} }}", parts.join(", "))
                    }
                }
            },
        }
    }

    /// Allocates an ordinary object with the realm's `Object.prototype`.
    pub fn alloc_object(&mut self) -> RunResult<HeapId> {
        Ok(self
            .heap
            .allocate(HeapData::Object(JsObject::new(Some(self.realm.object_proto))))?)
    }
}

fn string_has(s: &str, key: &PropertyKeyRef<'_>) -> bool {
    match key {
        PropertyKeyRef::String("length") => true,
        PropertyKeyRef::Index(i) => (*i as usize) < s.chars().count(),
        _ => false,
    }
}
