//! The class runtime: constructor/prototype wiring, super binding, member
//! installation, private-name scopes, field initializers and static blocks.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ast::{ClassDef, ClassMember, MethodKind, PropName, StmtLoc},
    context::PrivateScope,
    environment::{Binding, EnvId, ScopeKind, ScopeMode, ThisSlot},
    error::{ErrorKind, RunError, RunResult},
    heap::{FieldInitializer, FieldKey, HeapData, HeapId},
    interp::Interp,
    io::ConsoleWriter,
    object::{Descriptor, JsObject, PrivateEntry, PrivateNameId, PropertyKey},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    /// Evaluates a class definition to its constructor value.
    pub fn eval_class(&mut self, env: EnvId, class: &ClassDef, span: SourceSpan) -> RunResult<Value> {
        // The class body runs in a strict class scope that binds the class
        // name for TDZ-protected self-reference.
        let class_env = self.envs.push(Some(env), ScopeKind::Class, ScopeMode::Strict);
        if let Some(name) = class.name {
            self.envs
                .define(class_env, name, Binding::lexical(true))
                .map_err(|e| self.binding_error(e, span))?;
        }

        // Private-name scope: one opaque token per `#name`, chained to the
        // enclosing class body, sharing one brand for the whole class.
        let brand = self.ctx.alloc_brand();
        let mut private_names = AHashMap::new();
        for &name in &class.private_names {
            let token = self.ctx.alloc_private_name();
            private_names.entry(name).or_insert(token);
        }
        let private_scope = Rc::new(PrivateScope {
            names: private_names,
            parent: self.ctx.active_private_scope().cloned(),
            brand,
        });
        self.ctx.private_scopes.push(Rc::clone(&private_scope));

        let result = self.eval_class_body(class_env, class, brand, span);
        self.ctx.private_scopes.pop();
        result
    }

    fn eval_class_body(
        &mut self,
        class_env: EnvId,
        class: &ClassDef,
        brand: crate::object::ClassBrandId,
        span: SourceSpan,
    ) -> RunResult<Value> {
        // Resolve the heritage first.
        let (proto_parent, ctor_parent) = match &class.super_class {
            None => (Some(self.realm.object_proto), self.realm.function_proto),
            Some(superclass) => {
                let super_value = self.eval_expr(class_env, superclass)?;
                match super_value {
                    Value::Null => (None, self.realm.function_proto),
                    Value::Ref(super_id) if super_value.is_callable(self.heap) => {
                        let super_proto =
                            self.get_property(super_value, crate::object::PropertyKeyRef::String("prototype"), span)?;
                        let proto_parent = match super_proto {
                            Value::Ref(id) if self.heap.object(id).is_some() => Some(id),
                            Value::Null => None,
                            _ => {
                                return Err(RunError::raise_at(
                                    ErrorKind::TypeError,
                                    "Class extends value does not have valid prototype property",
                                    superclass.span,
                                ));
                            }
                        };
                        (proto_parent, super_id)
                    }
                    _ => {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            "Class extends value is not a constructor",
                            superclass.span,
                        ));
                    }
                }
            }
        };

        // Fresh prototype object inheriting from the superclass prototype.
        let proto_id = self
            .heap
            .allocate(HeapData::Object(JsObject::new(proto_parent)))?;

        // The constructor function itself.
        let ctor_def = class.ctor.expect("builder synthesizes missing constructors");
        let ctor_value = self.create_function_value(ctor_def, class_env)?;
        let Value::Ref(ctor_id) = ctor_value else {
            return Err(RunError::internal("constructor is not a heap function"));
        };
        {
            let HeapData::Function(function) = self.heap.get_mut(ctor_id) else {
                return Err(RunError::internal("constructor is not a heap function"));
            };
            function.obj.proto = Some(ctor_parent);
            function.home_object = Some(proto_id);
            function.brand = Some(brand);
            if let Some(name) = class.name {
                function.name_override = Some(name);
                function.obj.insert(
                    PropertyKey::String("name".into()),
                    Descriptor::Data {
                        value: Value::InternString(name),
                        writable: false,
                        enumerable: false,
                        configurable: true,
                    },
                );
            }
            function.obj.insert(
                PropertyKey::String("prototype".into()),
                Descriptor::frozen(Value::Ref(proto_id)),
            );
        }
        if let Some(proto_obj) = self.heap.object_mut(proto_id) {
            proto_obj.insert(
                PropertyKey::String("constructor".into()),
                Descriptor::method(ctor_value),
            );
        }
        // The class's own name becomes readable as soon as the constructor
        // exists, so member initializers and static blocks can use it.
        if let Some(name) = class.name {
            self.envs.initialize(class_env, name, ctor_value);
        }

        // First pass: install methods and collect instance fields and
        // private methods. Computed names resolve now, in order.
        let mut field_inits: Vec<FieldInitializer> = Vec::new();
        let mut private_methods: Vec<(PrivateNameId, PrivateEntry)> = Vec::new();
        for member in &class.members {
            match member {
                ClassMember::Method {
                    key,
                    func,
                    kind,
                    is_static,
                } => {
                    let home = if *is_static { ctor_id } else { proto_id };
                    let method_value = self.create_function_value(*func, class_env)?;
                    if let Value::Ref(fn_id) = method_value
                        && let HeapData::Function(function) = self.heap.get_mut(fn_id)
                    {
                        function.home_object = Some(home);
                        function.brand = Some(brand);
                    }
                    match key {
                        PropName::Private(name) => {
                            let token = self.lookup_private_name(*name, span)?;
                            let entry = match kind {
                                MethodKind::Method => PrivateEntry::Method(method_value),
                                MethodKind::Getter => PrivateEntry::Accessor {
                                    get: Some(method_value),
                                    set: None,
                                },
                                MethodKind::Setter => PrivateEntry::Accessor {
                                    get: None,
                                    set: Some(method_value),
                                },
                            };
                            if *is_static {
                                install_private(self.heap.object_mut(ctor_id), token, entry);
                            } else {
                                merge_private_accessor(&mut private_methods, token, entry);
                            }
                        }
                        _ => {
                            let prop_key = self.resolve_prop_name(class_env, key, span)?;
                            let target = if *is_static { ctor_id } else { proto_id };
                            match kind {
                                MethodKind::Method => {
                                    if let Some(obj) = self.heap.object_mut(target) {
                                        obj.insert(prop_key, Descriptor::method(method_value));
                                    }
                                }
                                MethodKind::Getter => {
                                    self.install_class_accessor(target, prop_key, Some(method_value), None);
                                }
                                MethodKind::Setter => {
                                    self.install_class_accessor(target, prop_key, None, Some(method_value));
                                }
                            }
                        }
                    }
                }
                ClassMember::Field {
                    key,
                    value,
                    is_static: false,
                    span: field_span,
                } => {
                    let field_key = match key {
                        PropName::Private(name) => FieldKey::Private(self.lookup_private_name(*name, span)?),
                        _ => FieldKey::Prop(self.resolve_prop_name(class_env, key, span)?),
                    };
                    field_inits.push(FieldInitializer {
                        key: field_key,
                        init: value.clone(),
                        span: *field_span,
                    });
                }
                ClassMember::Field { is_static: true, .. } | ClassMember::StaticBlock(_) => {}
            }
        }

        {
            let HeapData::Function(function) = self.heap.get_mut(ctor_id) else {
                return Err(RunError::internal("constructor is not a heap function"));
            };
            function.field_inits = Some(Rc::new(field_inits));
            function.private_methods = Some(Rc::new(private_methods));
        }

        // Second pass: static fields and static blocks run in declaration
        // order with `this` bound to the constructor.
        for member in &class.members {
            match member {
                ClassMember::Field {
                    key,
                    value,
                    is_static: true,
                    span: field_span,
                } => {
                    let static_env = self.class_element_env(class_env, ctor_value, ctor_id);
                    let field_value = match value {
                        Some(init) => self.eval_expr(static_env, init)?,
                        None => Value::Undefined,
                    };
                    match key {
                        PropName::Private(name) => {
                            let token = self.lookup_private_name(*name, *field_span)?;
                            install_private(self.heap.object_mut(ctor_id), token, PrivateEntry::Field(field_value));
                        }
                        _ => {
                            let prop_key = self.resolve_prop_name(class_env, key, *field_span)?;
                            if let Some(obj) = self.heap.object_mut(ctor_id) {
                                obj.insert_value(prop_key, field_value);
                            }
                        }
                    }
                }
                ClassMember::StaticBlock(stmts) => {
                    self.run_static_block(class_env, ctor_value, ctor_id, stmts)?;
                }
                _ => {}
            }
        }

        Ok(ctor_value)
    }

    /// A fresh strict scope for a class element evaluation (static field or
    /// block) with `this` bound to the constructor.
    fn class_element_env(&mut self, class_env: EnvId, this: Value, active: HeapId) -> EnvId {
        let element_env = self.envs.push(Some(class_env), ScopeKind::Function, ScopeMode::Strict);
        let scope = self.envs.scope_mut(element_env);
        scope.this_slot = Some(ThisSlot {
            value: this,
            initialized: true,
        });
        scope.new_target = Some(Value::Undefined);
        scope.active_function = Some(active);
        element_env
    }

    fn run_static_block(
        &mut self,
        class_env: EnvId,
        ctor_value: Value,
        ctor_id: HeapId,
        stmts: &[StmtLoc],
    ) -> RunResult<()> {
        let block_env = self.class_element_env(class_env, ctor_value, ctor_id);
        match self.eval_stmts(block_env, stmts)? {
            crate::interp::Completion::Normal(_) => Ok(()),
            _ => Err(RunError::internal("abrupt completion escaped a static block")),
        }
    }

    fn install_class_accessor(&mut self, target: HeapId, key: PropertyKey, get: Option<Value>, set: Option<Value>) {
        let Some(obj) = self.heap.object_mut(target) else {
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
                enumerable: false,
                configurable: true,
            },
            _ => Descriptor::Accessor {
                get,
                set,
                enumerable: false,
                configurable: true,
            },
        };
        obj.insert(key, merged);
    }

    /// Installs private methods and runs the instance field initializers on
    /// a fresh instance. Base constructors run this before their body,
    /// derived constructors when `super()` returns.
    pub fn run_field_initializers(
        &mut self,
        this: Value,
        ctor_id: HeapId,
        inits: &[FieldInitializer],
        span: SourceSpan,
    ) -> RunResult<()> {
        let (ctor_env, private_scope, private_methods) = match self.heap.get(ctor_id) {
            HeapData::Function(f) => (f.env, f.private_scope.clone(), f.private_methods.clone()),
            _ => return Err(RunError::internal("field initializers without a constructor")),
        };

        if let Value::Ref(instance_id) = this
            && let Some(methods) = &private_methods
            && let Some(obj) = self.heap.object_mut(instance_id)
        {
            for (token, entry) in methods.iter() {
                obj.private.insert(*token, entry.clone());
            }
        }

        if inits.is_empty() {
            return Ok(());
        }

        let pushed = if let Some(scope) = private_scope {
            self.ctx.private_scopes.push(scope);
            true
        } else {
            false
        };
        let result = (|| {
            for init in inits {
                let field_env = self.class_element_env(ctor_env, this, ctor_id);
                let value = match &init.init {
                    Some(expr) => self.eval_expr(field_env, expr)?,
                    None => Value::Undefined,
                };
                match (&init.key, this) {
                    (FieldKey::Prop(key), _) => {
                        let strict = true;
                        self.set_property(this, key.as_ref(), value, strict, init.span)?;
                    }
                    (FieldKey::Private(token), Value::Ref(instance_id)) => {
                        if let Some(obj) = self.heap.object_mut(instance_id) {
                            obj.private.insert(*token, PrivateEntry::Field(value));
                        }
                    }
                    (FieldKey::Private(_), _) => {
                        return Err(RunError::raise_at(
                            ErrorKind::TypeError,
                            "Cannot initialize private field on a non-object",
                            span,
                        ));
                    }
                }
            }
            Ok(())
        })();
        if pushed {
            self.ctx.private_scopes.pop();
        }
        result
    }
}

fn install_private(obj: Option<&mut JsObject>, token: PrivateNameId, entry: PrivateEntry) {
    if let Some(obj) = obj {
        match (obj.private.get_mut(&token), entry) {
            (
                Some(PrivateEntry::Accessor { get, set }),
                PrivateEntry::Accessor {
                    get: new_get,
                    set: new_set,
                },
            ) => {
                if new_get.is_some() {
                    *get = new_get;
                }
                if new_set.is_some() {
                    *set = new_set;
                }
            }
            (_, entry) => {
                obj.private.insert(token, entry);
            }
        }
    }
}

fn merge_private_accessor(
    methods: &mut Vec<(PrivateNameId, PrivateEntry)>,
    token: PrivateNameId,
    entry: PrivateEntry,
) {
    if let PrivateEntry::Accessor {
        get: new_get,
        set: new_set,
    } = &entry
    {
        for (existing_token, existing) in methods.iter_mut() {
            if *existing_token == token
                && let PrivateEntry::Accessor { get, set } = existing
            {
                if new_get.is_some() {
                    *get = *new_get;
                }
                if new_set.is_some() {
                    *set = *new_set;
                }
                return;
            }
        }
    }
    methods.push((token, entry));
}
