//! Lexical environments.
//!
//! All scope frames live in one arena owned by the run; frames reference
//! their parent by `EnvId` and closures capture the `EnvId` of their
//! definition site, never copies of bindings. Frames are not freed mid-run
//! (closure capture makes lifetimes observable); the resource tracker bounds
//! growth instead.
//!
//! Binding rules implemented here:
//! * `const` bindings reject re-assignment.
//! * lexical bindings are uninitialized until their declarator runs; reads
//!   and writes before that fail (temporal dead zone).
//! * duplicate lexical declarations in one frame are rejected.
//! * `var` hoists to the nearest var-environment and may coexist with a
//!   same-named catch parameter (the Annex-B exemption) but not with other
//!   lexicals.

use indexmap::IndexMap;

use crate::{
    heap::HeapId,
    intern::StringId,
    value::Value,
};

/// Index of a scope frame in the environment arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EnvId(u32);

impl EnvId {
    /// The program scope; always the first frame pushed in a run. Used as a
    /// placeholder by state that is about to be overwritten.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Program,
    Function,
    /// Separate parameter environment, created when the parameter list
    /// contains expressions (defaults or destructuring).
    Parameter,
    /// Function body environment under a parameter environment.
    Body,
    Block,
    Catch,
    With,
    Class,
}

/// Strictness mode of a scope, derived from the enclosing scope plus the
/// scope's own directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeMode {
    Strict,
    Sloppy,
    /// Sloppy scope where Annex-B block-level function promotion applies.
    SloppyAnnexB,
}

impl ScopeMode {
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// One name binding in a frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding {
    pub value: Value,
    /// `let`/`const`/`class` (subject to TDZ and redeclaration rules).
    pub is_lexical: bool,
    pub is_const: bool,
    /// False while in the temporal dead zone.
    pub initialized: bool,
    /// `var`-created or parameter binding.
    pub is_function_scoped: bool,
    /// Blocks Annex-B function promotion past this frame (catch parameters).
    pub blocks_function_scope: bool,
}

impl Binding {
    pub fn var(value: Value) -> Self {
        Self {
            value,
            is_lexical: false,
            is_const: false,
            initialized: true,
            is_function_scoped: true,
            blocks_function_scope: false,
        }
    }

    /// An uninitialized `let`/`const`/`class` binding (in its TDZ).
    pub fn lexical(is_const: bool) -> Self {
        Self {
            value: Value::Undefined,
            is_lexical: true,
            is_const,
            initialized: false,
            is_function_scoped: false,
            blocks_function_scope: false,
        }
    }

    pub fn catch_param(value: Value) -> Self {
        Self {
            value,
            is_lexical: true,
            is_const: false,
            initialized: true,
            is_function_scoped: false,
            blocks_function_scope: true,
        }
    }
}

/// `this` slot of a function-boundary frame.
///
/// Derived constructors leave the slot uninitialized until `super()` runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ThisSlot {
    pub value: Value,
    pub initialized: bool,
}

/// A scope frame.
#[derive(Debug)]
pub(crate) struct Scope {
    pub parent: Option<EnvId>,
    pub kind: ScopeKind,
    pub mode: ScopeMode,
    bindings: IndexMap<StringId, Binding>,
    /// True for frames `var` declarations land in. Function and program
    /// frames always; parameter frames when promoted by a direct `eval` in
    /// the parameter list.
    pub is_var_env: bool,
    /// Set on function-boundary frames; absent on arrow frames so lexical
    /// resolution reaches the enclosing function.
    pub this_slot: Option<ThisSlot>,
    pub new_target: Option<Value>,
    /// The function being executed in this frame, used to resolve the super
    /// constructor and `super.x` dispatch.
    pub active_function: Option<HeapId>,
    /// Binding object of a `with` frame.
    pub with_object: Option<HeapId>,
}

impl Scope {
    pub fn get(&self, name: StringId) -> Option<&Binding> {
        self.bindings.get(&name)
    }

    pub fn get_mut(&mut self, name: StringId) -> Option<&mut Binding> {
        self.bindings.get_mut(&name)
    }

    pub fn has(&self, name: StringId) -> bool {
        self.bindings.contains_key(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = StringId> + '_ {
        self.bindings.keys().copied()
    }
}

/// Failure modes of binding operations; the evaluator turns these into the
/// matching guest errors with source spans attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingError {
    NotFound(StringId),
    /// Read or write of an uninitialized lexical binding.
    Tdz(StringId),
    ConstAssign(StringId),
    DuplicateLexical(StringId),
}

/// Outcome of deleting a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteBinding {
    Deleted,
    NotFound,
    Sealed,
}

/// Arena of every scope frame of a run.
#[derive(Debug, Default)]
pub(crate) struct Environments {
    scopes: Vec<Scope>,
}

impl Environments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: Option<EnvId>, kind: ScopeKind, mode: ScopeMode) -> EnvId {
        let id = EnvId(u32::try_from(self.scopes.len()).expect("environment arena exceeds u32"));
        let is_var_env = matches!(kind, ScopeKind::Program | ScopeKind::Function);
        self.scopes.push(Scope {
            parent,
            kind,
            mode,
            bindings: IndexMap::new(),
            is_var_env,
            this_slot: None,
            new_target: None,
            active_function: None,
            with_object: None,
        });
        id
    }

    pub fn scope(&self, id: EnvId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: EnvId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn parent(&self, id: EnvId) -> Option<EnvId> {
        self.scopes[id.index()].parent
    }

    pub fn mode(&self, id: EnvId) -> ScopeMode {
        self.scopes[id.index()].mode
    }

    /// Defines a binding in the given frame.
    ///
    /// Rejects duplicate declarations where either side is lexical; `var`
    /// over `var` (and function over function) re-declaration is permitted
    /// and keeps the existing slot. The Annex-B catch-parameter exemption is
    /// applied by the caller before calling this.
    pub fn define(&mut self, env: EnvId, name: StringId, binding: Binding) -> Result<(), BindingError> {
        let scope = self.scope_mut(env);
        if let Some(existing) = scope.bindings.get(&name) {
            if existing.is_lexical || binding.is_lexical {
                return Err(BindingError::DuplicateLexical(name));
            }
            // var-over-var: keep the existing initialized value unless the
            // new binding carries one.
            if !binding.value.is_undefined() || !existing.initialized {
                scope.bindings.insert(name, binding);
            }
            return Ok(());
        }
        scope.bindings.insert(name, binding);
        Ok(())
    }

    /// Defines or overwrites without any checks; used by hoisting passes and
    /// internal setup.
    pub fn define_unchecked(&mut self, env: EnvId, name: StringId, binding: Binding) {
        self.scope_mut(env).bindings.insert(name, binding);
    }

    /// Pre-declares a hoisted `var` as `undefined` unless the name already
    /// has a function-scoped binding in the frame.
    pub fn declare_var(&mut self, env: EnvId, name: StringId) -> Result<(), BindingError> {
        let scope = self.scope_mut(env);
        match scope.bindings.get(&name) {
            Some(existing) if existing.is_lexical && !existing.blocks_function_scope => {
                Err(BindingError::DuplicateLexical(name))
            }
            Some(_) => Ok(()),
            None => {
                scope.bindings.insert(name, Binding::var(Value::Undefined));
                Ok(())
            }
        }
    }

    /// Initializes a lexical binding, ending its TDZ.
    pub fn initialize(&mut self, env: EnvId, name: StringId, value: Value) {
        if let Some(binding) = self.scope_mut(env).get_mut(name) {
            binding.value = value;
            binding.initialized = true;
        }
    }

    /// Finds the frame declaring `name`, walking outward. `with` frames are
    /// transparent here; the evaluator checks their binding objects during
    /// identifier resolution.
    pub fn find_binding(&self, mut env: EnvId, name: StringId) -> Option<(EnvId, &Binding)> {
        loop {
            let scope = self.scope(env);
            if let Some(binding) = scope.bindings.get(&name) {
                return Some((env, binding));
            }
            env = scope.parent?;
        }
    }

    /// Reads a binding, enforcing the TDZ.
    pub fn get(&self, env: EnvId, name: StringId) -> Result<Value, BindingError> {
        match self.find_binding(env, name) {
            Some((_, binding)) if !binding.initialized => Err(BindingError::Tdz(name)),
            Some((_, binding)) => Ok(binding.value),
            None => Err(BindingError::NotFound(name)),
        }
    }

    /// Assigns to a binding, enforcing TDZ and `const`.
    pub fn assign(&mut self, env: EnvId, name: StringId, value: Value) -> Result<(), BindingError> {
        let Some((frame, binding)) = self.find_binding(env, name) else {
            return Err(BindingError::NotFound(name));
        };
        if !binding.initialized {
            return Err(BindingError::Tdz(name));
        }
        if binding.is_const {
            return Err(BindingError::ConstAssign(name));
        }
        let binding = self
            .scope_mut(frame)
            .get_mut(name)
            .expect("binding vanished during assign");
        binding.value = value;
        Ok(())
    }

    /// `delete name`: only sloppy-mode, configurable-ish bindings go away.
    /// Lexical and function-scoped declarations are sealed.
    pub fn delete_binding(&mut self, env: EnvId, name: StringId) -> DeleteBinding {
        let Some((frame, binding)) = self.find_binding(env, name) else {
            return DeleteBinding::NotFound;
        };
        // Only implicitly-created globals are deletable.
        if binding.is_lexical || binding.is_function_scoped {
            return DeleteBinding::Sealed;
        }
        self.scope_mut(frame).bindings.shift_remove(&name);
        DeleteBinding::Deleted
    }

    /// The nearest enclosing var-environment: skips blocks, catches, classes
    /// and (unpromoted) parameter frames.
    pub fn function_scope(&self, mut env: EnvId) -> EnvId {
        loop {
            let scope = self.scope(env);
            if scope.is_var_env {
                return env;
            }
            env = scope.parent.expect("no var-environment above frame");
        }
    }

    /// True when any frame between `env` (inclusive) and the var-environment
    /// (exclusive) declares `name` as a binding that blocks Annex-B function
    /// promotion (a lexical or a catch parameter).
    pub fn blocks_annex_b_promotion(&self, mut env: EnvId, name: StringId) -> bool {
        loop {
            let scope = self.scope(env);
            if scope.is_var_env {
                // A same-named lexical in the var-env itself also blocks.
                return scope.bindings.get(&name).is_some_and(|b| b.is_lexical);
            }
            if let Some(binding) = scope.bindings.get(&name)
                && (binding.is_lexical || binding.blocks_function_scope)
            {
                return true;
            }
            match scope.parent {
                Some(parent) => env = parent,
                None => return false,
            }
        }
    }

    pub fn has_own_lexical(&self, env: EnvId, name: StringId) -> bool {
        self.scope(env).bindings.get(&name).is_some_and(|b| b.is_lexical)
    }

    pub fn has_function_scoped_binding(&self, env: EnvId, name: StringId) -> bool {
        self.scope(self.function_scope(env))
            .bindings
            .get(&name)
            .is_some_and(|b| b.is_function_scoped)
    }

    /// Late-initializes a class-scope inner binding (the class's own name
    /// becomes readable once the class value exists).
    pub fn try_assign_blocked_binding(&mut self, env: EnvId, name: StringId, value: Value) -> bool {
        match self.scope_mut(env).get_mut(name) {
            Some(binding) if !binding.initialized => {
                binding.value = value;
                binding.initialized = true;
                true
            }
            _ => false,
        }
    }

    /// Copies the listed bindings from one frame into another; used for the
    /// per-iteration environments of `for (let …)` loops.
    pub fn copy_bindings(&mut self, from: EnvId, to: EnvId, names: &[StringId]) {
        for &name in names {
            if let Some(binding) = self.scope(from).get(name).copied() {
                self.scope_mut(to).bindings.insert(name, binding);
            }
        }
    }

    /// Finds the frame carrying the `this` slot for the given environment,
    /// skipping arrow frames (which have none).
    pub fn this_env(&self, mut env: EnvId) -> Option<EnvId> {
        loop {
            let scope = self.scope(env);
            if scope.this_slot.is_some() {
                return Some(env);
            }
            env = scope.parent?;
        }
    }

    /// Finds the nearest frame with an active function (for `super`
    /// resolution), skipping arrow frames transparently is not needed since
    /// arrows never set `active_function`.
    pub fn active_function_env(&self, mut env: EnvId) -> Option<EnvId> {
        loop {
            let scope = self.scope(env);
            if scope.active_function.is_some() {
                return Some(env);
            }
            env = scope.parent?;
        }
    }

    pub fn size(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (StringId, StringId) {
        (StringId::from_ascii(b'x'), StringId::from_ascii(b'y'))
    }

    #[test]
    fn tdz_read_fails_until_initialized() {
        let (x, _) = ids();
        let mut envs = Environments::new();
        let program = envs.push(None, ScopeKind::Program, ScopeMode::Sloppy);
        envs.define(program, x, Binding::lexical(false)).unwrap();
        assert_eq!(envs.get(program, x), Err(BindingError::Tdz(x)));
        envs.initialize(program, x, Value::Bool(true));
        assert!(matches!(envs.get(program, x), Ok(Value::Bool(true))));
    }

    #[test]
    fn const_assign_fails() {
        let (x, _) = ids();
        let mut envs = Environments::new();
        let program = envs.push(None, ScopeKind::Program, ScopeMode::Strict);
        envs.define(program, x, Binding::lexical(true)).unwrap();
        envs.initialize(program, x, Value::Number(1.0));
        assert_eq!(
            envs.assign(program, x, Value::Number(2.0)),
            Err(BindingError::ConstAssign(x))
        );
    }

    #[test]
    fn duplicate_lexical_rejected() {
        let (x, _) = ids();
        let mut envs = Environments::new();
        let program = envs.push(None, ScopeKind::Program, ScopeMode::Sloppy);
        envs.define(program, x, Binding::var(Value::Undefined)).unwrap();
        assert_eq!(
            envs.define(program, x, Binding::lexical(false)),
            Err(BindingError::DuplicateLexical(x))
        );
    }

    #[test]
    fn catch_param_blocks_promotion_but_not_var() {
        let (x, y) = ids();
        let mut envs = Environments::new();
        let program = envs.push(None, ScopeKind::Program, ScopeMode::Sloppy);
        let catch = envs.push(Some(program), ScopeKind::Catch, ScopeMode::Sloppy);
        envs.define(catch, x, Binding::catch_param(Value::Null)).unwrap();
        let block = envs.push(Some(catch), ScopeKind::Block, ScopeMode::SloppyAnnexB);
        assert!(envs.blocks_annex_b_promotion(block, x));
        assert!(!envs.blocks_annex_b_promotion(block, y));
        // The Annex-B exemption: a var of the catch parameter's name may
        // still be declared in the var-env.
        assert!(envs.declare_var(program, x).is_ok());
    }
}
