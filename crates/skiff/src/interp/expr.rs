//! Expression dispatch.

use crate::{
    ast::{
        Argument, ArrayElement, AssignOp, Expr, ExprLoc, Literal, LogicalOp, MemberKey, ObjectProp, Pattern,
        PropName, UnaryOp, UpdateOp,
    },
    environment::EnvId,
    error::{ErrorKind, RunError, RunResult},
    heap::{HeapData, HeapId, JsArray, RegexObject},
    intern::StringId,
    interp::{BindMode, Interp},
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PrivateEntry, PropertyKey, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    pub fn eval_expr(&mut self, env: EnvId, expr_loc: &ExprLoc) -> RunResult<Value> {
        let span = expr_loc.span;
        match &expr_loc.expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(id) => Value::InternString(*id),
            }),
            Expr::Ident(name) => self.resolve_ident(env, *name, span),
            Expr::This => self.resolve_this(env, span),
            Expr::NewTarget => {
                let this_env = self.envs.this_env(env);
                Ok(this_env
                    .and_then(|e| self.envs.scope(e).new_target)
                    .unwrap_or(Value::Undefined))
            }
            Expr::SuperCall(args) => self.eval_super_call(env, args, span),
            Expr::SuperMember { key } => {
                let this = self.resolve_this(env, span)?;
                self.eval_super_member(env, key, this, span)
            }
            Expr::Array { elements } => self.eval_array_literal(env, elements),
            Expr::Object { props } => self.eval_object_literal(env, props, span),
            Expr::Function(def_id) => self.create_function_value(*def_id, env),
            Expr::Class(class) => self.eval_class(env, class, span),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    out.push_str(self.interns.get_str(*quasi));
                    if let Some(e) = exprs.get(index) {
                        let value = self.eval_expr(env, e)?;
                        let value_str = self.to_string_rust(value, e.span)?;
                        out.push_str(&value_str);
                    }
                }
                Ok(self.heap.alloc_string(out)?)
            }
            Expr::TaggedTemplate { tag, quasis, exprs } => self.eval_tagged_template(env, tag, quasis, exprs, span),
            Expr::Unary { op, arg } => self.eval_unary(env, *op, arg, span),
            Expr::Update { op, prefix, target } => self.eval_update(env, *op, *prefix, target, span),
            Expr::Binary { op, left, right } => {
                let a = self.eval_expr(env, left)?;
                let b = self.eval_expr(env, right)?;
                self.binary_op(*op, a, b, span)
            }
            Expr::Logical { op, left, right } => {
                let a = self.eval_expr(env, left)?;
                let take_left = match op {
                    LogicalOp::And => !a.truthy(self.heap, self.interns),
                    LogicalOp::Or => a.truthy(self.heap, self.interns),
                    LogicalOp::Nullish => !a.is_nullish(),
                };
                if take_left { Ok(a) } else { self.eval_expr(env, right) }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test_value = self.eval_expr(env, test)?;
                if test_value.truthy(self.heap, self.interns) {
                    self.eval_expr(env, consequent)
                } else {
                    self.eval_expr(env, alternate)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(env, *op, target, value, span),
            Expr::Sequence { exprs } => {
                let mut result = Value::Undefined;
                for e in exprs {
                    result = self.eval_expr(env, e)?;
                }
                Ok(result)
            }
            Expr::Call {
                callee,
                args,
                optional: _,
            } => self.eval_call(env, callee, args, span),
            Expr::New { callee, args } => {
                let callee_value = self.eval_expr(env, callee)?;
                let arg_values = self.eval_call_arguments(env, args)?;
                self.construct(callee_value, arg_values, span)
            }
            Expr::Member {
                object,
                key,
                optional: _,
            } => {
                let target = self.eval_expr(env, object)?;
                self.eval_member_get(env, target, key, span)
            }
            Expr::Chain(inner) => Ok(self.eval_chain(env, inner)?.unwrap_or(Value::Undefined)),
            Expr::PrivateIn { name, object } => {
                let target = self.eval_expr(env, object)?;
                let private_id = self.lookup_private_name(*name, span)?;
                let present = matches!(
                    target,
                    Value::Ref(id) if self
                        .heap
                        .object(id)
                        .is_some_and(|obj| obj.private.contains_key(&private_id))
                );
                Ok(Value::Bool(present))
            }
            Expr::Yield { .. } => Err(RunError::internal("yield reached the direct evaluator")),
            Expr::Await(_) => Err(RunError::internal("await reached the direct evaluator")),
            Expr::Regex { source, flags } => {
                let regex = RegexObject {
                    obj: JsObject::new(Some(self.realm.regexp_proto)),
                    source: self.interns.get_str(*source).to_owned(),
                    flags: self.interns.get_str(*flags).to_owned(),
                };
                Ok(Value::Ref(self.heap.allocate(HeapData::Regex(regex))?))
            }
            Expr::TempSlot(index) => self
                .ctx
                .plan_temps
                .last()
                .and_then(|temps| temps.get(*index as usize).copied())
                .ok_or_else(|| RunError::internal("temp slot read outside a plan frame")),
            Expr::ForInKeys(index) => {
                let target = self
                    .ctx
                    .plan_temps
                    .last()
                    .and_then(|temps| temps.get(*index as usize).copied())
                    .ok_or_else(|| RunError::internal("temp slot read outside a plan frame"))?;
                if target.is_nullish() {
                    let empty = JsArray::new(Some(self.realm.array_proto), Vec::new());
                    return Ok(Value::Ref(self.heap.allocate(HeapData::Array(empty))?));
                }
                let keys = self.for_in_keys(target);
                let mut elements = Vec::with_capacity(keys.len());
                for key in &keys {
                    elements.push(Some(self.key_to_value(key)?));
                }
                let array = JsArray::new(Some(self.realm.array_proto), elements);
                Ok(Value::Ref(self.heap.allocate(HeapData::Array(array))?))
            }
        }
    }

    // ==========================
    // Identifier resolution

    /// Environment `Get`, with `with`-object interception and TDZ checks.
    pub fn resolve_ident(&mut self, env: EnvId, name: StringId, span: SourceSpan) -> RunResult<Value> {
        let mut cursor = Some(env);
        while let Some(current) = cursor {
            let (binding, with_object, parent) = {
                let scope = self.envs.scope(current);
                (scope.get(name).copied(), scope.with_object, scope.parent)
            };
            if let Some(binding) = binding {
                if !binding.initialized {
                    return Err(self.binding_error(crate::environment::BindingError::Tdz(name), span));
                }
                return Ok(binding.value);
            }
            if let Some(with_id) = with_object {
                let content = self.interns.get_str(name).to_owned();
                let key = PropertyKeyRef::from_str(&content);
                if self.has_property(Value::Ref(with_id), &key) {
                    return self.get_property(Value::Ref(with_id), key, span);
                }
            }
            cursor = parent;
        }
        Err(self.binding_error(crate::environment::BindingError::NotFound(name), span))
    }

    /// Environment `Assign`: TDZ and const checks, `with` interception, and
    /// the sloppy-mode auto-global.
    pub fn assign_ident(&mut self, env: EnvId, name: StringId, value: Value, span: SourceSpan) -> RunResult<()> {
        let strict = self.envs.mode(env).is_strict();
        let mut cursor = Some(env);
        while let Some(current) = cursor {
            let (has_binding, with_object, parent) = {
                let scope = self.envs.scope(current);
                (scope.has(name), scope.with_object, scope.parent)
            };
            if has_binding {
                return self
                    .envs
                    .assign(current, name, value)
                    .map_err(|e| self.binding_error(e, span));
            }
            if let Some(with_id) = with_object {
                let content = self.interns.get_str(name).to_owned();
                let key = PropertyKeyRef::from_str(&content);
                if self.has_property(Value::Ref(with_id), &key) {
                    return self.set_property(Value::Ref(with_id), key, value, strict, span);
                }
            }
            cursor = parent;
        }
        if strict {
            return Err(self.binding_error(crate::environment::BindingError::NotFound(name), span));
        }
        // Sloppy assignment to an unknown name creates a global.
        self.envs.define_unchecked(
            self.realm.global_env,
            name,
            crate::environment::Binding {
                value,
                is_lexical: false,
                is_const: false,
                initialized: true,
                is_function_scoped: false,
                blocks_function_scope: false,
            },
        );
        Ok(())
    }

    fn resolve_this(&mut self, env: EnvId, span: SourceSpan) -> RunResult<Value> {
        let Some(this_env) = self.envs.this_env(env) else {
            return Ok(Value::Undefined);
        };
        let slot = self.envs.scope(this_env).this_slot.expect("this_env has a slot");
        if !slot.initialized {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "Must call super constructor in derived class before accessing 'this'",
                span,
            ));
        }
        Ok(slot.value)
    }

    // ==========================
    // super

    fn eval_super_call(&mut self, env: EnvId, args: &[Argument], span: SourceSpan) -> RunResult<Value> {
        let Some(this_env) = self.envs.this_env(env) else {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "'super' keyword unexpected here",
                span,
            ));
        };
        let Some(active_fn) = self.envs.scope(this_env).active_function else {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "'super' keyword unexpected here",
                span,
            ));
        };
        let slot = self.envs.scope(this_env).this_slot.expect("this_env has a slot");
        if slot.initialized {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "Super constructor may only be called once.",
                span,
            ));
        }
        let Some(super_ctor_id) = self.heap.proto_of(active_fn) else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Super constructor is not a constructor",
                span,
            ));
        };
        let super_ctor = Value::Ref(super_ctor_id);
        if !super_ctor.is_callable(self.heap) {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Super constructor is not a constructor",
                span,
            ));
        }
        let arg_values = self.eval_call_arguments(env, args)?;
        let instance = self.construct(super_ctor, arg_values, span)?;

        // Bind `this`; only one super() may win.
        let scope = self.envs.scope_mut(this_env);
        let slot = scope.this_slot.as_mut().expect("this_env has a slot");
        if slot.initialized {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "Super constructor may only be called once.",
                span,
            ));
        }
        slot.value = instance;
        slot.initialized = true;

        // Stamp the brand and run the pending instance field initializers of
        // the derived class.
        let (brand, field_inits) = match self.heap.get(active_fn) {
            HeapData::Function(f) => (f.brand, f.field_inits.clone()),
            _ => (None, None),
        };
        if let Some(brand) = brand
            && let Value::Ref(instance_id) = instance
            && let Some(obj) = self.heap.object_mut(instance_id)
        {
            obj.add_brand(brand);
        }
        if let Some(inits) = field_inits {
            self.run_field_initializers(instance, active_fn, &inits, span)?;
        }
        Ok(instance)
    }

    fn eval_super_member(
        &mut self,
        env: EnvId,
        key: &MemberKey,
        this: Value,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let Some(active_env) = self.envs.active_function_env(env) else {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "'super' keyword unexpected here",
                span,
            ));
        };
        let active_fn = self
            .envs
            .scope(active_env)
            .active_function
            .expect("active function env has a function");
        let home = match self.heap.get(active_fn) {
            HeapData::Function(f) => f.home_object,
            _ => None,
        };
        let Some(home) = home else {
            return Err(RunError::raise_at(
                ErrorKind::ReferenceError,
                "'super' keyword unexpected here",
                span,
            ));
        };
        let Some(super_proto) = self.heap.proto_of(home) else {
            return Ok(Value::Undefined);
        };
        let key = match key {
            MemberKey::Static(name) => PropertyKey::from_string_id(*name, self.interns),
            MemberKey::Computed(e) => {
                let value = self.eval_expr(env, e)?;
                self.to_property_key(value, span)?
            }
            MemberKey::Private(_) => {
                return Err(RunError::raise_at(
                    ErrorKind::SyntaxError,
                    "Private fields cannot be accessed on super",
                    span,
                ));
            }
        };
        // Dispatch through the home object's prototype with the current
        // `this` as receiver.
        self.get_property_with_receiver(super_proto, key.as_ref(), this, span)
    }

    fn get_property_with_receiver(
        &mut self,
        start: HeapId,
        key: PropertyKeyRef<'_>,
        receiver: Value,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let mut cursor = Some(start);
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
            cursor = self.heap.proto_of(id);
        }
        Ok(Value::Undefined)
    }

    // ==========================
    // Literals

    fn eval_array_literal(&mut self, env: EnvId, elements: &[ArrayElement]) -> RunResult<Value> {
        let mut out: Vec<Option<Value>> = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Hole => out.push(None),
                ArrayElement::Item(e) => {
                    let value = self.eval_expr(env, e)?;
                    out.push(Some(value));
                }
                ArrayElement::Spread(e) => {
                    let iterable = self.eval_expr(env, e)?;
                    let record = self.get_iterator(iterable, false, e.span)?;
                    loop {
                        let (value, done) = self.iterator_next(&record, None, e.span)?;
                        if done {
                            break;
                        }
                        out.push(Some(value));
                    }
                }
            }
        }
        let array = JsArray::new(Some(self.realm.array_proto), out);
        Ok(Value::Ref(self.heap.allocate(HeapData::Array(array))?))
    }

    fn eval_object_literal(&mut self, env: EnvId, props: &[ObjectProp], span: SourceSpan) -> RunResult<Value> {
        let object_id = self.alloc_object()?;
        for prop in props {
            match prop {
                ObjectProp::Init { key, value } => {
                    let prop_key = self.resolve_prop_name(env, key, span)?;
                    let mut prop_value = self.eval_expr(env, value)?;
                    // Methods get this literal as their home object; plain
                    // anonymous functions get the key as their name.
                    if let Value::Ref(fn_id) = prop_value
                        && let HeapData::Function(function) = self.heap.get_mut(fn_id)
                    {
                        if self.interns.get_function(function.def).is_method {
                            function.home_object = Some(object_id);
                        }
                        if let PropName::Ident(name) = key {
                            prop_value = self.name_function_value(prop_value, *name);
                        }
                    }
                    if let Some(obj) = self.heap.object_mut(object_id) {
                        obj.insert_value(prop_key, prop_value);
                    }
                }
                ObjectProp::Getter { key, func } => {
                    let prop_key = self.resolve_prop_name(env, key, span)?;
                    let getter = self.create_function_value(*func, env)?;
                    if let Value::Ref(fn_id) = getter
                        && let HeapData::Function(function) = self.heap.get_mut(fn_id)
                    {
                        function.home_object = Some(object_id);
                    }
                    self.install_accessor(object_id, prop_key, Some(getter), None);
                }
                ObjectProp::Setter { key, func } => {
                    let prop_key = self.resolve_prop_name(env, key, span)?;
                    let setter = self.create_function_value(*func, env)?;
                    if let Value::Ref(fn_id) = setter
                        && let HeapData::Function(function) = self.heap.get_mut(fn_id)
                    {
                        function.home_object = Some(object_id);
                    }
                    self.install_accessor(object_id, prop_key, None, Some(setter));
                }
                ObjectProp::Spread(e) => {
                    let source = self.eval_expr(env, e)?;
                    self.copy_data_properties(object_id, source, e.span)?;
                }
            }
        }
        Ok(Value::Ref(object_id))
    }

    /// Merges a getter or setter into an existing accessor descriptor.
    pub(crate) fn install_accessor(
        &mut self,
        object_id: HeapId,
        key: PropertyKey,
        get: Option<Value>,
        set: Option<Value>,
    ) {
        let Some(obj) = self.heap.object_mut(object_id) else {
            return;
        };
        let merged = match obj.get_own(&key.as_ref()) {
            Some(Descriptor::Accessor {
                get: old_get,
                set: old_set,
                ..
            }) => Descriptor::Accessor {
                get: get.or(*old_get),
                set: set.or(*old_set),
                enumerable: true,
                configurable: true,
            },
            _ => Descriptor::Accessor {
                get,
                set,
                enumerable: true,
                configurable: true,
            },
        };
        obj.insert(key, merged);
    }

    /// `CopyDataProperties`: own enumerable keys of the source, integer keys
    /// first then insertion order, read through `[[Get]]`.
    pub(crate) fn copy_data_properties(&mut self, target_id: HeapId, source: Value, span: SourceSpan) -> RunResult<()> {
        if source.is_nullish() {
            return Ok(());
        }
        if let Value::Ref(source_id) = source {
            if let HeapData::Array(arr) = self.heap.get(source_id) {
                let len = arr.elements.len();
                for index in 0..len {
                    let HeapData::Array(arr) = self.heap.get(source_id) else {
                        break;
                    };
                    let Some(value) = arr.elements[index] else { continue };
                    if let Some(obj) = self.heap.object_mut(target_id) {
                        obj.insert_value(PropertyKey::Index(index as u32), value);
                    }
                }
            }
            let keys = self
                .heap
                .object(source_id)
                .map(JsObject::enumerable_keys)
                .unwrap_or_default();
            for key in keys {
                let value = self.get_property(source, key.as_ref(), span)?;
                if let Some(obj) = self.heap.object_mut(target_id) {
                    obj.insert_value(key, value);
                }
            }
        }
        Ok(())
    }

    fn eval_tagged_template(
        &mut self,
        env: EnvId,
        tag: &ExprLoc,
        quasis: &[crate::ast::TemplateQuasi],
        exprs: &[ExprLoc],
        span: SourceSpan,
    ) -> RunResult<Value> {
        // The callee (and its `this` for member tags) evaluates first.
        let (tag_value, this) = match &tag.expr {
            Expr::Member { object, key, .. } => {
                let target = self.eval_expr(env, object)?;
                let method = self.eval_member_get(env, target, key, tag.span)?;
                (method, target)
            }
            _ => (self.eval_expr(env, tag)?, Value::Undefined),
        };

        // Build the frozen strings array with its frozen `raw` twin.
        let raw_elements: Vec<Option<Value>> = quasis
            .iter()
            .map(|q| Some(Value::InternString(q.raw)))
            .collect();
        let mut raw_array = JsArray::new(Some(self.realm.array_proto), raw_elements);
        raw_array.obj.freeze();
        let raw_id = self.heap.allocate(HeapData::Array(raw_array))?;

        let cooked_elements: Vec<Option<Value>> = quasis
            .iter()
            .map(|q| Some(q.cooked.map_or(Value::Undefined, Value::InternString)))
            .collect();
        let mut strings_array = JsArray::new(Some(self.realm.array_proto), cooked_elements);
        strings_array
            .obj
            .insert(PropertyKey::String("raw".into()), Descriptor::frozen(Value::Ref(raw_id)));
        strings_array.obj.freeze();
        let strings_id = self.heap.allocate(HeapData::Array(strings_array))?;

        let mut args = vec![Value::Ref(strings_id)];
        for e in exprs {
            args.push(self.eval_expr(env, e)?);
        }
        self.call_value(tag_value, this, args, None, span)
    }

    // ==========================
    // Unary / update

    fn eval_unary(&mut self, env: EnvId, op: UnaryOp, arg: &ExprLoc, span: SourceSpan) -> RunResult<Value> {
        match op {
            UnaryOp::TypeOf => {
                // typeof never throws on unresolved identifiers.
                if let Expr::Ident(name) = &arg.expr {
                    match self.resolve_ident(env, *name, span) {
                        Ok(value) => return Ok(Value::InternString(self.intern_static_typeof(value))),
                        Err(err) if err.is_catchable() => {
                            return Ok(Value::InternString(crate::intern::StaticStrings::Undefined.into()));
                        }
                        Err(err) => return Err(err),
                    }
                }
                let value = self.eval_expr(env, arg)?;
                Ok(Value::InternString(self.intern_static_typeof(value)))
            }
            UnaryOp::Delete => self.eval_delete(env, arg, span),
            UnaryOp::Void => {
                self.eval_expr(env, arg)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Not => {
                let value = self.eval_expr(env, arg)?;
                Ok(Value::Bool(!value.truthy(self.heap, self.interns)))
            }
            UnaryOp::Minus => {
                let value = self.eval_expr(env, arg)?;
                let n = self.to_number(value, span)?;
                Ok(Value::Number(-n))
            }
            UnaryOp::Plus => {
                let value = self.eval_expr(env, arg)?;
                let n = self.to_number(value, span)?;
                Ok(Value::Number(n))
            }
            UnaryOp::BitNot => {
                let value = self.eval_expr(env, arg)?;
                let n = self.to_number(value, span)?;
                Ok(Value::Number(f64::from(!crate::value::to_int32(n))))
            }
        }
    }

    fn intern_static_typeof(&self, value: Value) -> StringId {
        use crate::intern::StaticStrings;
        match value.type_of(self.heap) {
            "undefined" => StaticStrings::Undefined.into(),
            "object" => StaticStrings::TypeofObject.into(),
            "boolean" => StaticStrings::TypeofBoolean.into(),
            "number" => StaticStrings::TypeofNumber.into(),
            "string" => StaticStrings::TypeofString.into(),
            "symbol" => StaticStrings::TypeofSymbol.into(),
            _ => StaticStrings::TypeofFunction.into(),
        }
    }

    fn eval_delete(&mut self, env: EnvId, arg: &ExprLoc, span: SourceSpan) -> RunResult<Value> {
        let strict = self.envs.mode(env).is_strict();
        match &arg.expr {
            Expr::Ident(name) => {
                if strict {
                    return Err(RunError::raise_at(
                        ErrorKind::SyntaxError,
                        "Delete of an unqualified identifier in strict mode.",
                        span,
                    ));
                }
                match self.envs.delete_binding(env, *name) {
                    crate::environment::DeleteBinding::Deleted => Ok(Value::Bool(true)),
                    crate::environment::DeleteBinding::NotFound => Ok(Value::Bool(true)),
                    crate::environment::DeleteBinding::Sealed => Ok(Value::Bool(false)),
                }
            }
            Expr::Member { object, key, .. } => {
                let target = self.eval_expr(env, object)?;
                let deleted = match key {
                    MemberKey::Static(name) => {
                        let content = self.interns.get_str(*name).to_owned();
                        self.delete_property(target, PropertyKeyRef::from_str(&content), strict, span)?
                    }
                    MemberKey::Computed(e) => {
                        let key_value = self.eval_expr(env, e)?;
                        let key = self.to_property_key(key_value, span)?;
                        self.delete_property(target, key.as_ref(), strict, span)?
                    }
                    MemberKey::Private(_) => {
                        return Err(RunError::raise_at(
                            ErrorKind::SyntaxError,
                            "Private fields can not be deleted",
                            span,
                        ));
                    }
                };
                Ok(Value::Bool(deleted))
            }
            Expr::Chain(inner) => self.eval_delete(env, inner, span),
            _ => {
                self.eval_expr(env, arg)?;
                Ok(Value::Bool(true))
            }
        }
    }

    fn eval_update(
        &mut self,
        env: EnvId,
        op: UpdateOp,
        prefix: bool,
        target: &Pattern,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let delta = match op {
            UpdateOp::Inc => 1.0,
            UpdateOp::Dec => -1.0,
        };
        match target {
            Pattern::Identifier { name, .. } => {
                let old = self.resolve_ident(env, *name, span)?;
                let old_n = self.to_number(old, span)?;
                let new_n = old_n + delta;
                self.assign_ident(env, *name, Value::Number(new_n), span)?;
                Ok(Value::Number(if prefix { new_n } else { old_n }))
            }
            Pattern::Member { object, key, .. } => {
                // Read-once: object and key evaluate a single time.
                let strict = self.envs.mode(env).is_strict();
                let target_value = self.eval_expr(env, object)?;
                let key = match key {
                    MemberKey::Static(name) => PropertyKey::from_string_id(*name, self.interns),
                    MemberKey::Computed(e) => {
                        let key_value = self.eval_expr(env, e)?;
                        self.to_property_key(key_value, span)?
                    }
                    MemberKey::Private(name) => {
                        let old = self.private_get(target_value, *name, span)?;
                        let old_n = self.to_number(old, span)?;
                        let new_n = old_n + delta;
                        self.private_set(target_value, *name, Value::Number(new_n), span)?;
                        return Ok(Value::Number(if prefix { new_n } else { old_n }));
                    }
                };
                let old = self.get_property(target_value, key.as_ref(), span)?;
                let old_n = self.to_number(old, span)?;
                let new_n = old_n + delta;
                self.set_property(target_value, key.as_ref(), Value::Number(new_n), strict, span)?;
                Ok(Value::Number(if prefix { new_n } else { old_n }))
            }
            _ => Err(RunError::internal("invalid update target")),
        }
    }

    // ==========================
    // Assignment

    fn eval_assign(
        &mut self,
        env: EnvId,
        op: AssignOp,
        target: &Pattern,
        value: &ExprLoc,
        span: SourceSpan,
    ) -> RunResult<Value> {
        match op {
            AssignOp::Assign => {
                let mut result = self.eval_expr(env, value)?;
                if let Pattern::Identifier { name, .. } = target {
                    result = self.name_function_value(result, *name);
                    // Strict mode forbids assigning to eval/arguments.
                    if self.envs.mode(env).is_strict() {
                        let text = self.interns.get_str(*name);
                        if text == "eval" || text == "arguments" {
                            return Err(RunError::raise_at(
                                ErrorKind::SyntaxError,
                                format!("Unexpected {text} assignment in strict mode"),
                                span,
                            ));
                        }
                    }
                }
                self.bind_pattern(env, target, result, BindMode::Assign, span)?;
                Ok(result)
            }
            AssignOp::Logical(op) => {
                let current = self.read_assign_target(env, target, span)?;
                let skip = match op {
                    LogicalOp::And => !current.truthy(self.heap, self.interns),
                    LogicalOp::Or => current.truthy(self.heap, self.interns),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if skip {
                    return Ok(current);
                }
                let result = self.eval_expr(env, value)?;
                self.bind_pattern(env, target, result, BindMode::Assign, span)?;
                Ok(result)
            }
            AssignOp::Op(op) => {
                let current = self.read_assign_target(env, target, span)?;
                let rhs = self.eval_expr(env, value)?;
                let result = self.binary_op(op, current, rhs, span)?;
                self.bind_pattern(env, target, result, BindMode::Assign, span)?;
                Ok(result)
            }
        }
    }

    fn read_assign_target(&mut self, env: EnvId, target: &Pattern, span: SourceSpan) -> RunResult<Value> {
        match target {
            Pattern::Identifier { name, .. } => self.resolve_ident(env, *name, span),
            Pattern::Member { object, key, .. } => {
                let target_value = self.eval_expr(env, object)?;
                self.eval_member_get(env, target_value, key, span)
            }
            _ => Err(RunError::internal("compound assignment to a destructuring pattern")),
        }
    }

    // ==========================
    // Member access / calls / chains

    pub(crate) fn eval_member_get(
        &mut self,
        env: EnvId,
        target: Value,
        key: &MemberKey,
        span: SourceSpan,
    ) -> RunResult<Value> {
        match key {
            MemberKey::Static(name) => {
                let content = self.interns.get_str(*name).to_owned();
                self.get_property(target, PropertyKeyRef::from_str(&content), span)
            }
            MemberKey::Computed(e) => {
                let key_value = self.eval_expr(env, e)?;
                let key = self.to_property_key(key_value, span)?;
                self.get_property(target, key.as_ref(), span)
            }
            MemberKey::Private(name) => self.private_get(target, *name, span),
        }
    }

    /// `#name` read with the brand check.
    pub(crate) fn private_get(&mut self, target: Value, name: StringId, span: SourceSpan) -> RunResult<Value> {
        let private_id = self.lookup_private_name(name, span)?;
        let entry = match target {
            Value::Ref(id) => self
                .heap
                .object(id)
                .and_then(|obj| obj.private.get(&private_id).cloned()),
            _ => None,
        };
        match entry {
            Some(PrivateEntry::Field(value) | PrivateEntry::Method(value)) => Ok(value),
            Some(PrivateEntry::Accessor { get: Some(getter), .. }) => {
                self.call_value(getter, target, vec![], None, span)
            }
            Some(PrivateEntry::Accessor { get: None, .. }) => Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot read from a private member with only a setter",
                span,
            )),
            None => Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "Cannot read private member #{} from an object whose class did not declare it",
                    self.interns.get_str(name)
                ),
                span,
            )),
        }
    }

    fn eval_call(&mut self, env: EnvId, callee: &ExprLoc, args: &[Argument], span: SourceSpan) -> RunResult<Value> {
        // Member callees pass their base object as `this`.
        let (callee_value, this) = match &callee.expr {
            Expr::Member { object, key, .. } => {
                let target = self.eval_expr(env, object)?;
                let method = self.eval_member_get(env, target, key, callee.span)?;
                (method, target)
            }
            Expr::SuperMember { key } => {
                let this = self.resolve_this(env, callee.span)?;
                let method = self.eval_super_member(env, key, this, callee.span)?;
                (method, this)
            }
            _ => (self.eval_expr(env, callee)?, Value::Undefined),
        };
        let arg_values = self.eval_call_arguments(env, args)?;
        self.call_value(callee_value, this, arg_values, None, span)
    }

    /// Evaluates a call argument list left-to-right, spreading iterables.
    pub(crate) fn eval_call_arguments(&mut self, env: EnvId, args: &[Argument]) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Expr(e) => out.push(self.eval_expr(env, e)?),
                Argument::Spread(e) => {
                    let iterable = self.eval_expr(env, e)?;
                    let record = self.get_iterator(iterable, false, e.span)?;
                    loop {
                        let (value, done) = self.iterator_next(&record, None, e.span)?;
                        if done {
                            break;
                        }
                        out.push(value);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Optional-chain evaluation: `None` means a nullish short-circuit
    /// happened somewhere in the chain.
    fn eval_chain(&mut self, env: EnvId, expr_loc: &ExprLoc) -> RunResult<Option<Value>> {
        match &expr_loc.expr {
            Expr::Member { object, key, optional } => {
                let Some(target) = self.eval_chain(env, object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                self.eval_member_get(env, target, key, expr_loc.span).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                // Member callees keep their base as `this` through the chain.
                let (callee_value, this) = match &callee.expr {
                    Expr::Member {
                        object,
                        key,
                        optional: member_optional,
                    } => {
                        let Some(target) = self.eval_chain(env, object)? else {
                            return Ok(None);
                        };
                        if *member_optional && target.is_nullish() {
                            return Ok(None);
                        }
                        let method = self.eval_member_get(env, target, key, callee.span)?;
                        (method, target)
                    }
                    _ => {
                        let Some(value) = self.eval_chain(env, callee)? else {
                            return Ok(None);
                        };
                        (value, Value::Undefined)
                    }
                };
                if *optional && callee_value.is_nullish() {
                    return Ok(None);
                }
                let arg_values = self.eval_call_arguments(env, args)?;
                self.call_value(callee_value, this, arg_values, None, expr_loc.span)
                    .map(Some)
            }
            _ => self.eval_expr(env, expr_loc).map(Some),
        }
    }
}
