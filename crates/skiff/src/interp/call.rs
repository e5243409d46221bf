//! The call protocol: function values, environment wiring for invocations,
//! parameter binding, the `arguments` object, `new`, and host dispatch.

use std::rc::Rc;

use crate::{
    ast::{CtorKind, StmtLoc},
    builtins,
    environment::{Binding, EnvId, ScopeKind, ScopeMode, ThisSlot},
    error::{ErrorKind, RawStackFrame, RunError, RunResult},
    heap::{ArgumentsObject, BoundFunction, HeapData, HeapId, JsFunction},
    intern::{FunctionId, StaticStrings, StringId},
    interp::{Completion, Interp},
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PropertyKey},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    // ==========================
    // Function values

    /// Creates a function value closing over `env`.
    pub fn create_function_value(&mut self, def_id: FunctionId, env: EnvId) -> RunResult<Value> {
        let def = self.interns.get_function(def_id);
        let is_arrow = def.is_arrow;
        let is_generator = def.is_generator;
        let is_async = def.is_async;
        let is_method = def.is_method;
        let name = def.name;
        let arity = def.arity();
        let ctor_kind = def.ctor_kind;

        let mut function = JsFunction::new(Some(self.realm.function_proto), def_id, env);
        function.ctor_kind = ctor_kind;
        function.private_scope = self.ctx.active_private_scope().cloned();

        let name_value = Value::InternString(name.unwrap_or_else(|| StaticStrings::EmptyString.into()));
        function.obj.insert(
            PropertyKey::String("name".into()),
            Descriptor::Data {
                value: name_value,
                writable: false,
                enumerable: false,
                configurable: true,
            },
        );
        function.obj.insert(
            PropertyKey::String("length".into()),
            Descriptor::Data {
                value: Value::Number(arity as f64),
                writable: false,
                enumerable: false,
                configurable: true,
            },
        );

        let function_id = self.heap.allocate(HeapData::Function(function))?;

        // Ordinary functions and generators carry a `prototype` object;
        // arrows, methods and async functions do not construct.
        if !is_arrow && !is_method && !is_async {
            let proto_of_prototype = if is_generator {
                self.realm.generator_proto
            } else {
                self.realm.object_proto
            };
            let mut prototype = JsObject::new(Some(proto_of_prototype));
            if !is_generator {
                prototype.insert(
                    PropertyKey::String("constructor".into()),
                    Descriptor::method(Value::Ref(function_id)),
                );
            }
            let prototype_id = self.heap.allocate(HeapData::Object(prototype))?;
            if let Some(obj) = self.heap.object_mut(function_id) {
                obj.insert(
                    PropertyKey::String("prototype".into()),
                    Descriptor::Data {
                        value: Value::Ref(prototype_id),
                        writable: !is_generator,
                        enumerable: false,
                        configurable: false,
                    },
                );
            }
        }
        Ok(Value::Ref(function_id))
    }

    // ==========================
    // Calls

    /// Invokes any callable value.
    pub fn call_value(
        &mut self,
        callee: Value,
        this: Value,
        args: Vec<Value>,
        new_target: Option<Value>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        self.heap.tracker().check_call_depth(self.ctx.call_depth)?;
        match callee {
            Value::Native(native) => builtins::invoke_native(self, native, this, args, new_target, span),
            Value::ExtFunction(ext) => self.invoke_external(ext, args, span),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Function(_) => self.call_function(id, this, args, new_target, span),
                HeapData::NativeFunc(native) => {
                    let func = native.func;
                    builtins::invoke_native(self, func, this, args, new_target, span)
                }
                HeapData::Bound(bound) => {
                    let target = bound.target;
                    let bound_this = bound.bound_this;
                    let mut full_args = bound.bound_args.clone();
                    full_args.extend(args);
                    self.call_value(target, bound_this, full_args, new_target, span)
                }
                _ => Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    format!("{} is not a function", self.display_value(callee, false, 2)),
                    span,
                )),
            },
            _ => Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("{} is not a function", self.display_value(callee, false, 2)),
                span,
            )),
        }
    }

    fn call_function(
        &mut self,
        function_id: HeapId,
        this: Value,
        args: Vec<Value>,
        new_target: Option<Value>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let HeapData::Function(function) = self.heap.get(function_id) else {
            unreachable!("checked by caller");
        };
        let def_id = function.def;
        let ctor_kind = function.ctor_kind;
        let def = self.interns.get_function(def_id);
        let function_name = function.name_override.or(def.name);

        if ctor_kind != CtorKind::None && new_target.is_none() {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    function_name.map_or("(anonymous)", |n| self.interns.get_str(n))
                ),
                span,
            ));
        }

        if def.is_generator {
            return crate::generator::create_generator(self, function_id, this, args, span);
        }
        if def.is_async {
            return self.call_async_function(function_id, this, args, span);
        }

        self.enter_call(function_name, span)?;
        let result = self.call_sync_body(function_id, this, args, new_target, false, span);
        self.exit_call();
        result.map(|(value, _)| value)
    }

    /// Async call: the CPS-lowered body runs synchronously and returns its
    /// promise; other bodies run on the suspend-and-resume plan. Either way,
    /// a synchronous throw (including during default-parameter evaluation)
    /// becomes a rejected promise rather than an exception.
    fn call_async_function(
        &mut self,
        function_id: HeapId,
        this: Value,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let HeapData::Function(function) = self.heap.get(function_id) else {
            unreachable!("checked by caller");
        };
        let def = self.interns.get_function(function.def);
        let function_name = function.name_override.or(def.name);
        let has_cps = def.cps_body.is_some();

        if has_cps {
            self.enter_call(function_name, span)?;
            let result = self.call_sync_body(function_id, this, args, None, true, span);
            self.exit_call();
            match result {
                Ok((value, _)) => Ok(value),
                Err(err) if err.is_catchable() => {
                    let reason = self.error_to_value(err)?;
                    self.promise_rejected(reason)
                }
                Err(err) => Err(err),
            }
        } else {
            crate::generator::call_async_plan(self, function_id, this, args, span)
        }
    }

    pub(crate) fn enter_call(&mut self, _name: Option<StringId>, _span: SourceSpan) -> RunResult<()> {
        self.heap.tracker().check_call_depth(self.ctx.call_depth)?;
        self.ctx.call_depth += 1;
        self.tracer.on_call(self.ctx.call_depth);
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.ctx.call_depth -= 1;
        self.tracer.on_return(self.ctx.call_depth);
    }

    /// Runs a non-generator body to completion. Returns the call result plus
    /// the `this` the frame ended with (constructors need it).
    fn call_sync_body(
        &mut self,
        function_id: HeapId,
        this: Value,
        args: Vec<Value>,
        new_target: Option<Value>,
        use_cps_body: bool,
        span: SourceSpan,
    ) -> RunResult<(Value, Value)> {
        let frame = self.prepare_call_env(function_id, this, args, new_target, span)?;
        let def = self.interns.get_function(frame.def);
        let body: &[StmtLoc] = if use_cps_body {
            def.cps_body.as_deref().expect("checked by caller")
        } else {
            &def.body
        };

        // Re-enter the captured private-name scope for the body.
        let private_depth = self.push_private_scope(function_id);
        let completion = self.eval_stmts(frame.body_env, body);
        self.pop_private_scope(private_depth);

        let completion = completion.map_err(|mut err| {
            err.push_frame(RawStackFrame::with_function(span, def.name));
            err
        })?;
        let result = match completion {
            Completion::Return(value) => value,
            Completion::Normal(_) => Value::Undefined,
            Completion::Break(_) | Completion::Continue(_) => {
                return Err(RunError::internal("loop completion escaped a function body"));
            }
        };
        let final_this = self
            .envs
            .scope(frame.fn_env)
            .this_slot
            .map_or(Value::Undefined, |slot| slot.value);
        Ok((result, final_this))
    }

    fn push_private_scope(&mut self, function_id: HeapId) -> bool {
        let HeapData::Function(function) = self.heap.get(function_id) else {
            return false;
        };
        if let Some(scope) = &function.private_scope {
            self.ctx.private_scopes.push(Rc::clone(scope));
            true
        } else {
            false
        }
    }

    fn pop_private_scope(&mut self, pushed: bool) {
        if pushed {
            self.ctx.private_scopes.pop();
        }
    }

    // ==========================
    // Frame construction

    /// Builds the environment chain for one invocation: function scope
    /// (var-env, `this`, `new.target`), optional parameter scope, optional
    /// body scope, parameter binding, `arguments`, and body hoisting.
    pub(crate) fn prepare_call_env(
        &mut self,
        function_id: HeapId,
        this: Value,
        args: Vec<Value>,
        new_target: Option<Value>,
        span: SourceSpan,
    ) -> RunResult<CallFrame> {
        let HeapData::Function(function) = self.heap.get(function_id) else {
            return Err(RunError::internal("callee is not a function"));
        };
        let def_id = function.def;
        let closure_env = function.env;
        let ctor_kind = function.ctor_kind;
        let def = self.interns.get_function(def_id);
        let mode = if def.is_strict {
            ScopeMode::Strict
        } else {
            ScopeMode::SloppyAnnexB
        };
        let is_arrow = def.is_arrow;
        let simple = def.simple_params && !def.has_direct_eval_in_params;

        let fn_env = self.envs.push(Some(closure_env), ScopeKind::Function, mode);
        self.tracer.on_scope_push();
        {
            let scope = self.envs.scope_mut(fn_env);
            scope.active_function = Some(function_id);
            if !is_arrow {
                let this_value = if def.is_strict {
                    this
                } else if this.is_nullish() {
                    Value::Ref(self.realm.global_this)
                } else {
                    this
                };
                scope.this_slot = Some(ThisSlot {
                    value: this_value,
                    // Derived constructors leave `this` in its dead zone
                    // until super() runs.
                    initialized: ctor_kind != CtorKind::Derived,
                });
                scope.new_target = Some(new_target.unwrap_or(Value::Undefined));
            }
        }

        // Parameter environment, when the parameter list has expressions. A
        // direct eval in a parameter initializer promotes it to a var-env.
        let param_env = if simple {
            fn_env
        } else {
            let param_env = self.envs.push(Some(fn_env), ScopeKind::Parameter, mode);
            if self.interns.get_function(def_id).has_direct_eval_in_params {
                self.envs.scope_mut(param_env).is_var_env = true;
            }
            param_env
        };

        // Parameters are fresh bindings with a dead zone until bound, so a
        // default can see earlier parameters but not later ones.
        let interns = self.interns;
        let def = interns.get_function(def_id);
        let param_names = &def.param_names;
        for &name in param_names {
            self.envs.define_unchecked(
                param_env,
                name,
                Binding {
                    value: Value::Undefined,
                    is_lexical: false,
                    is_const: false,
                    initialized: false,
                    is_function_scoped: true,
                    blocks_function_scope: false,
                },
            );
        }
        for (index, param) in def.params.iter().enumerate() {
            let value = args.get(index).copied().unwrap_or(Value::Undefined);
            self.bind_pattern(param_env, &param.pattern, value, crate::interp::BindMode::Lexical, span)?;
        }
        if let Some(rest_pattern) = &def.rest {
            let remaining: Vec<Option<Value>> = args
                .iter()
                .skip(def.params.len())
                .map(|v| Some(*v))
                .collect();
            let array = self.heap.allocate(HeapData::Array(crate::heap::JsArray::new(
                Some(self.realm.array_proto),
                remaining,
            )))?;
            self.bind_pattern(
                param_env,
                rest_pattern,
                Value::Ref(array),
                crate::interp::BindMode::Lexical,
                span,
            )?;
        }

        // `arguments`: mapped (index aliases parameter bindings) for simple
        // parameter lists in sloppy mode, unmapped otherwise. Arrows inherit
        // the outer binding instead.
        let arguments_name: StringId = StaticStrings::Arguments.into();
        if !is_arrow && !param_names.contains(&arguments_name) && !def.lexical_names.contains(&arguments_name) {
            let mapped = simple && !def.is_strict;
            let mapped_names: Vec<Option<StringId>> = if mapped {
                (0..args.len())
                    .map(|i| param_names.get(i).copied())
                    .collect()
            } else {
                vec![None; args.len()]
            };
            let mut arguments = ArgumentsObject {
                obj: JsObject::new(Some(self.realm.object_proto)),
                env: param_env,
                mapped_names,
                values: args.clone(),
            };
            arguments.obj.insert(
                PropertyKey::String("length".into()),
                Descriptor::method(Value::Number(args.len() as f64)),
            );
            let arguments_id = self.heap.allocate(HeapData::Arguments(arguments))?;
            self.envs
                .define_unchecked(param_env, arguments_name, Binding::var(Value::Ref(arguments_id)));
        }

        // Body environment under the parameter environment.
        let body_env = if simple {
            fn_env
        } else {
            self.envs.push(Some(param_env), ScopeKind::Body, mode)
        };

        // Hoisting inside the body: functions install into the var-env but
        // close over the body scope; vars pre-declare as undefined; body
        // lexicals open their TDZ.
        let var_env = self.envs.function_scope(body_env);
        for statement in &def.body {
            let crate::ast::Stmt::FunctionDecl(func) = &statement.stmt else {
                continue;
            };
            let Some(name) = interns.get_function(*func).name else {
                continue;
            };
            let value = self.create_function_value(*func, body_env)?;
            self.envs.define_unchecked(var_env, name, Binding::var(value));
        }
        for &name in &def.var_names {
            self.envs
                .declare_var(var_env, name)
                .map_err(|e| self.binding_error(e, span))?;
        }
        self.predeclare_lexicals_for_body(body_env, &def.body)?;

        Ok(CallFrame {
            def: def_id,
            fn_env,
            body_env,
        })
    }

    fn predeclare_lexicals_for_body(&mut self, env: EnvId, stmts: &[StmtLoc]) -> RunResult<()> {
        for statement in stmts {
            match &statement.stmt {
                crate::ast::Stmt::VarDecl(decl) if decl.kind != crate::ast::DeclKind::Var => {
                    let is_const = decl.kind == crate::ast::DeclKind::Const;
                    let mut names = Vec::new();
                    for declarator in &decl.declarators {
                        declarator.target.bound_names(&mut names);
                    }
                    for name in names {
                        self.envs
                            .define(env, name, Binding::lexical(is_const))
                            .map_err(|e| self.binding_error(e, statement.span))?;
                    }
                }
                crate::ast::Stmt::ClassDecl(class) => {
                    let name = class.name.expect("class declaration has a name");
                    self.envs
                        .define(env, name, Binding::lexical(false))
                        .map_err(|e| self.binding_error(e, statement.span))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ==========================
    // new / construct

    /// The `new` protocol: allocate `this` from the constructor's
    /// `prototype`, run the body, prefer an explicit object return.
    pub fn construct(&mut self, callee: Value, args: Vec<Value>, span: SourceSpan) -> RunResult<Value> {
        match callee {
            Value::Native(native) => {
                return builtins::invoke_native(self, native, Value::Undefined, args, Some(callee), span);
            }
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Bound(bound) => {
                    let target = bound.target;
                    let mut full_args = bound.bound_args.clone();
                    full_args.extend(args);
                    return self.construct(target, full_args, span);
                }
                HeapData::NativeFunc(native) => {
                    let func = native.func;
                    return builtins::invoke_native(self, func, Value::Undefined, args, Some(callee), span);
                }
                _ => {}
            },
            _ => {}
        }
        let Value::Ref(function_id) = callee else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("{} is not a constructor", self.display_value(callee, false, 2)),
                span,
            ));
        };
        let HeapData::Function(function) = self.heap.get(function_id) else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("{} is not a constructor", self.display_value(callee, false, 2)),
                span,
            ));
        };
        let ctor_kind = function.ctor_kind;
        let field_inits = function.field_inits.clone();
        let brand = function.brand;
        let def = self.interns.get_function(function.def);
        let function_name = def.name;
        if def.is_arrow || def.is_async || def.is_generator || (def.is_method && ctor_kind == CtorKind::None) {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!(
                    "{} is not a constructor",
                    function_name.map_or("(anonymous)", |n| self.interns.get_str(n))
                ),
                span,
            ));
        }

        // Derived constructors do not allocate `this`; the base constructor
        // reached through super() does.
        let this = if ctor_kind == CtorKind::Derived {
            Value::Undefined
        } else {
            let prototype = self.get_property(callee, crate::object::PropertyKeyRef::String("prototype"), span)?;
            let proto_id = match prototype {
                Value::Ref(id) if self.heap.object(id).is_some() => Some(id),
                _ => Some(self.realm.object_proto),
            };
            let instance = self.heap.allocate(HeapData::Object(JsObject::new(proto_id)))?;
            if let Some(brand) = brand
                && let Some(obj) = self.heap.object_mut(instance)
            {
                obj.add_brand(brand);
            }
            Value::Ref(instance)
        };

        // Base-class field initializers run before the constructor body.
        if ctor_kind != CtorKind::Derived
            && let Some(inits) = &field_inits
        {
            let inits = Rc::clone(inits);
            self.run_field_initializers(this, function_id, &inits, span)?;
        }

        self.enter_call(function_name, span)?;
        let result = self.call_sync_body(function_id, this, args, Some(callee), false, span);
        self.exit_call();
        let (result, final_this) = result?;

        match result {
            Value::Ref(id) if self.heap.object(id).is_some() => Ok(result),
            _ => {
                if ctor_kind == CtorKind::Derived {
                    if final_this.is_undefined() {
                        return Err(RunError::raise_at(
                            ErrorKind::ReferenceError,
                            "Must call super constructor in derived class before returning from derived constructor",
                            span,
                        ));
                    }
                    Ok(final_this)
                } else {
                    Ok(final_this)
                }
            }
        }
    }

    // ==========================
    // Host dispatch

    fn invoke_external(
        &mut self,
        ext: crate::intern::ExtFunctionId,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> RunResult<Value> {
        let name = self.interns.get_external_function_name(ext).to_owned();
        let host_args: Vec<crate::host::HostValue> = args
            .iter()
            .map(|arg| crate::host::to_host_value(*arg, self.heap, self.interns, self.ctx))
            .collect::<RunResult<Vec<_>>>()?;
        let Some(externals) = self.externals.as_deref_mut() else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("external function '{name}' is not available in this run"),
                span,
            ));
        };
        match externals.call(&name, host_args) {
            Ok(result) => crate::host::from_host_value(&result, self.heap, self.realm),
            Err(err) => Err(RunError::raise_at(
                ErrorKind::Error,
                format!("external function '{name}' failed: {}", err.message()),
                span,
            )),
        }
    }

    // ==========================
    // Misc call support

    /// `Function.prototype.bind`.
    pub fn bind_function(&mut self, target: Value, this: Value, args: Vec<Value>) -> RunResult<Value> {
        let bound = BoundFunction {
            obj: JsObject::new(Some(self.realm.function_proto)),
            target,
            bound_this: this,
            bound_args: args,
        };
        Ok(Value::Ref(self.heap.allocate(HeapData::Bound(bound))?))
    }
}

/// The environments of one prepared invocation.
pub(crate) struct CallFrame {
    pub def: FunctionId,
    pub fn_env: EnvId,
    pub body_env: EnvId,
}
