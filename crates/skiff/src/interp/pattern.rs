//! Pattern binding: declarations, destructuring and assignment targets.
//!
//! Array patterns drive the iterator protocol (with `IteratorClose` on every
//! abrupt path), object patterns use `[[Get]]` per property, defaults
//! evaluate only against `undefined`, and member targets perform ordinary
//! `[[Set]]`.

use crate::{
    ast::{MemberKey, Pattern, PropName},
    environment::EnvId,
    error::{ErrorKind, RunError, RunResult},
    heap::{HeapData, JsArray},
    interp::Interp,
    io::ConsoleWriter,
    object::{PropertyKey, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::{Value, number_to_string},
};

/// How a pattern's bound names receive their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindMode {
    /// Assign into the hoisted `var` binding.
    Var,
    /// Initialize the pre-declared lexical binding, ending its TDZ.
    Lexical,
    /// Initialize a catch-scope binding.
    CatchParam,
    /// Resolve as an ordinary reference and assign (destructuring
    /// assignment expressions; may hit member targets and auto-globals).
    Assign,
}

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    pub fn bind_pattern(
        &mut self,
        env: EnvId,
        pattern: &Pattern,
        value: Value,
        mode: BindMode,
        span: SourceSpan,
    ) -> RunResult<()> {
        match pattern {
            Pattern::Identifier { name, span: id_span } => self.bind_name(env, *name, value, mode, *id_span),
            Pattern::Default { target, default } => {
                let value = if value.is_undefined() {
                    let mut default_value = self.eval_expr(env, default)?;
                    if let Pattern::Identifier { name, .. } = target.as_ref() {
                        default_value = self.name_function_value(default_value, *name);
                    }
                    default_value
                } else {
                    value
                };
                self.bind_pattern(env, target, value, mode, span)
            }
            Pattern::Array { elements, rest, span } => self.bind_array_pattern(env, elements, rest.as_deref(), value, mode, *span),
            Pattern::Object {
                props,
                rest,
                span,
            } => self.bind_object_pattern(env, props, rest.as_deref(), value, mode, *span),
            Pattern::Member { object, key, span } => {
                debug_assert_eq!(mode, BindMode::Assign, "member patterns only appear in assignments");
                let target = self.eval_expr(env, object)?;
                let strict = self.envs.mode(env).is_strict();
                match key {
                    MemberKey::Static(name) => {
                        let content = self.interns.get_str(*name).to_owned();
                        self.set_property(target, PropertyKeyRef::from_str(&content), value, strict, *span)
                    }
                    MemberKey::Computed(key_expr) => {
                        let key_value = self.eval_expr(env, key_expr)?;
                        let key = self.to_property_key(key_value, *span)?;
                        self.set_property(target, key.as_ref(), value, strict, *span)
                    }
                    MemberKey::Private(name) => self.private_set(target, *name, value, *span),
                }
            }
        }
    }

    fn bind_name(&mut self, env: EnvId, name: crate::intern::StringId, value: Value, mode: BindMode, span: SourceSpan) -> RunResult<()> {
        match mode {
            BindMode::Var => {
                if self.envs.assign(env, name, value).is_err() {
                    // A var that somehow escaped hoisting (e.g. synthesized
                    // bindings) lands in the var-environment.
                    let var_env = self.envs.function_scope(env);
                    self.envs
                        .define(var_env, name, crate::environment::Binding::var(value))
                        .map_err(|e| self.binding_error(e, span))?;
                }
                Ok(())
            }
            BindMode::Lexical | BindMode::CatchParam => {
                self.envs.initialize(env, name, value);
                Ok(())
            }
            BindMode::Assign => self.assign_ident(env, name, value, span),
        }
    }

    fn bind_array_pattern(
        &mut self,
        env: EnvId,
        elements: &[Option<Pattern>],
        rest: Option<&Pattern>,
        value: Value,
        mode: BindMode,
        span: SourceSpan,
    ) -> RunResult<()> {
        let record = self.get_iterator(value, false, span)?;
        let mut exhausted = false;

        let result: RunResult<()> = (|| {
            for element in elements {
                let step_value = if exhausted {
                    Value::Undefined
                } else {
                    let (step_value, done) = self.iterator_next(&record, None, span)?;
                    if done {
                        exhausted = true;
                        Value::Undefined
                    } else {
                        step_value
                    }
                };
                // Elisions advance the iterator and discard the value.
                if let Some(pattern) = element {
                    self.bind_pattern(env, pattern, step_value, mode, span)?;
                }
            }
            if let Some(rest_pattern) = rest {
                let mut collected = Vec::new();
                while !exhausted {
                    let (step_value, done) = self.iterator_next(&record, None, span)?;
                    if done {
                        exhausted = true;
                    } else {
                        collected.push(Some(step_value));
                    }
                }
                let array = self
                    .heap
                    .allocate(HeapData::Array(JsArray::new(Some(self.realm.array_proto), collected)))?;
                self.bind_pattern(env, rest_pattern, Value::Ref(array), mode, span)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                if !exhausted {
                    self.iterator_close(&record, span)?;
                }
                Ok(())
            }
            Err(err) => Err(self.close_iterator_on_error(&record, err, span)),
        }
    }

    fn bind_object_pattern(
        &mut self,
        env: EnvId,
        props: &[crate::ast::ObjectPatternProp],
        rest: Option<&Pattern>,
        value: Value,
        mode: BindMode,
        span: SourceSpan,
    ) -> RunResult<()> {
        if value.is_nullish() {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "Cannot destructure {}",
                    if value.is_undefined() { "'undefined'" } else { "'null'" }
                ),
                span,
            ));
        }
        let mut used_keys: Vec<PropertyKey> = Vec::new();
        for prop in props {
            let key = self.resolve_prop_name(env, &prop.key, span)?;
            let prop_value = self.get_property(value, key.as_ref(), span)?;
            used_keys.push(key);
            self.bind_pattern(env, &prop.value, prop_value, mode, span)?;
        }
        if let Some(rest_pattern) = rest {
            let rest_obj = self.alloc_object()?;
            if let Value::Ref(source_id) = value {
                let keys = self
                    .heap
                    .object(source_id)
                    .map(crate::object::JsObject::enumerable_keys)
                    .unwrap_or_default();
                for key in keys {
                    if used_keys.contains(&key) {
                        continue;
                    }
                    let prop_value = self.get_property(value, key.as_ref(), span)?;
                    if let Some(obj) = self.heap.object_mut(rest_obj) {
                        obj.insert_value(key, prop_value);
                    }
                }
            }
            self.bind_pattern(env, rest_pattern, Value::Ref(rest_obj), mode, span)?;
        }
        Ok(())
    }

    /// Resolves a property-name position to a concrete key; computed keys
    /// evaluate now and coerce via `ToPropertyKey`.
    pub fn resolve_prop_name(&mut self, env: EnvId, name: &PropName, span: SourceSpan) -> RunResult<PropertyKey> {
        match name {
            PropName::Ident(id) => Ok(PropertyKey::from_string_id(*id, self.interns)),
            PropName::Num(n) => Ok(PropertyKey::from_str(&number_to_string(*n))),
            PropName::Computed(expr) => {
                let value = self.eval_expr(env, expr)?;
                self.to_property_key(value, span)
            }
            PropName::Private(_) => Err(RunError::internal("private name in a public key position")),
        }
    }

    /// Names an anonymous function value bound to an identifier, matching
    /// the inferred-name behavior of definitions like `const f = () => {}`.
    pub fn name_function_value(&mut self, value: Value, name: crate::intern::StringId) -> Value {
        if let Value::Ref(id) = value
            && let HeapData::Function(function) = self.heap.get_mut(id)
        {
            let def_name = self.interns.get_function(function.def).name;
            if def_name.is_none() && function.name_override.is_none() {
                function.name_override = Some(name);
                function.obj.insert(
                    PropertyKey::String("name".into()),
                    crate::object::Descriptor::Data {
                        value: Value::InternString(name),
                        writable: false,
                        enumerable: false,
                        configurable: true,
                    },
                );
            }
        }
        value
    }

    /// `#name` store on a receiver, shared by member patterns and
    /// assignment expressions.
    pub fn private_set(&mut self, target: Value, name: crate::intern::StringId, value: Value, span: SourceSpan) -> RunResult<()> {
        let private_id = self.lookup_private_name(name, span)?;
        let Value::Ref(id) = target else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot write private member to a non-object",
                span,
            ));
        };
        let Some(obj) = self.heap.object_mut(id) else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot write private member to a non-object",
                span,
            ));
        };
        match obj.private.get_mut(&private_id) {
            Some(crate::object::PrivateEntry::Field(slot)) => {
                *slot = value;
                Ok(())
            }
            Some(crate::object::PrivateEntry::Accessor { set: Some(setter), .. }) => {
                let setter = *setter;
                self.call_value(setter, target, vec![value], None, span)?;
                Ok(())
            }
            Some(crate::object::PrivateEntry::Accessor { set: None, .. }) => Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot write to a private member with only a getter",
                span,
            )),
            Some(crate::object::PrivateEntry::Method(_)) => Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Cannot assign to a private method",
                span,
            )),
            None => Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "Cannot write private member #{} to an object whose class did not declare it",
                    self.interns.get_str(name)
                ),
                span,
            )),
        }
    }

    /// Resolves a `#name` through the active private-name scope stack.
    pub fn lookup_private_name(
        &self,
        name: crate::intern::StringId,
        span: SourceSpan,
    ) -> RunResult<crate::object::PrivateNameId> {
        self.ctx
            .active_private_scope()
            .and_then(|scope| scope.lookup(name))
            .ok_or_else(|| {
                RunError::raise_at(
                    ErrorKind::SyntaxError,
                    format!(
                        "Private field '#{}' must be declared in an enclosing class",
                        self.interns.get_str(name)
                    ),
                    span,
                )
            })
    }
}
