//! The tree-walking evaluator.
//!
//! `Interp` borrows every piece of run state (heap, environments, context,
//! console, tracer) and walks the typed AST. Expressions return
//! `RunResult<Value>`; statements return `RunResult<Completion>` where the
//! completion carries `return`/`break`/`continue` and throws travel through
//! the error channel. `try`/`catch`/`finally` and loops are the only places
//! that recover abrupt completions.
//!
//! Submodules split the implementation the way the concerns split: operator
//! and coercion machinery in `ops`, the call protocol in `call`, pattern
//! binding in `pattern`, the class runtime in `class`, expression dispatch
//! in `expr`.

mod call;
mod class;
mod expr;
mod ops;
mod pattern;

use crate::{
    ast::{
        Block, DeclKind, ForTarget, LoopInit, LoopPlan, Program, Stmt, StmtLoc, SwitchStmt, TryStmt, VarDeclStmt,
    },
    builder::collect_var_names,
    context::{EvalContext, Job},
    environment::{Binding, EnvId, Environments, ScopeKind, ScopeMode},
    error::{ErrorKind, RunError, RunResult},
    heap::{Heap, HeapData},
    host::HostDispatch,
    intern::{Interns, StringId},
    io::ConsoleWriter,
    iterator::IteratorRecord,
    realm::Realm,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

pub(crate) use pattern::BindMode;

/// Statement completion: the non-throw abrupt exits plus the normal value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Completion {
    /// Normal completion; `None` when the statement produced no value.
    Normal(Option<Value>),
    Return(Value),
    Break(Option<StringId>),
    Continue(Option<StringId>),
}

impl Completion {
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal(_))
    }
}

/// The evaluator for one run.
pub(crate) struct Interp<'a, 'b, T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> {
    pub heap: &'a mut Heap<T>,
    pub envs: &'a mut Environments,
    pub interns: &'a Interns,
    pub ctx: &'a mut EvalContext,
    pub console: &'a mut C,
    pub tracer: &'a mut Tr,
    pub externals: Option<&'b mut dyn HostDispatch>,
    pub realm: Realm,
}

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    /// Evaluates a whole script against the realm's global environment and
    /// returns the script completion value (`undefined` when the last
    /// statement produced none).
    pub fn run_program(&mut self, program: &Program) -> RunResult<Value> {
        let env = self.realm.global_env;
        self.hoist_var_scope(env, &program.body, &collect_top_level_var_names(program))?;
        self.predeclare_lexicals(env, &program.body)?;
        let completion = self.eval_stmts(env, &program.body)?;
        let value = match completion {
            Completion::Normal(value) => value.unwrap_or(Value::Undefined),
            Completion::Return(_) | Completion::Break(_) | Completion::Continue(_) => {
                return Err(RunError::internal("abrupt completion escaped the script body"));
            }
        };
        self.run_jobs()?;
        Ok(value)
    }

    /// Drains the microtask queue to quiescence.
    pub fn run_jobs(&mut self) -> RunResult<()> {
        while let Some(job) = self.ctx.jobs.pop_front() {
            match job {
                Job::PromiseReaction {
                    handler,
                    arg,
                    derived,
                    is_rejection,
                } => self.run_reaction_job(handler, arg, derived, is_rejection)?,
                Job::ResumeGenerator { generator, resume } => {
                    crate::generator::resume_job(self, generator, resume)?;
                }
            }
        }
        Ok(())
    }

    // ==========================
    // Statement dispatch

    pub fn eval_stmts(&mut self, env: EnvId, stmts: &[StmtLoc]) -> RunResult<Completion> {
        let mut value = None;
        for statement in stmts {
            match self.eval_stmt(env, statement)? {
                Completion::Normal(v) => value = v.or(value),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(value))
    }

    pub fn eval_stmt(&mut self, env: EnvId, statement: &StmtLoc) -> RunResult<Completion> {
        self.heap.tracker_mut().check_statement()?;
        self.tracer.on_statement(statement.span.start().line);
        match &statement.stmt {
            Stmt::Empty => Ok(Completion::Normal(None)),
            Stmt::Expr(e) => {
                let value = self.eval_expr(env, e)?;
                Ok(Completion::Normal(Some(value)))
            }
            Stmt::VarDecl(decl) => {
                self.eval_var_decl(env, decl)?;
                Ok(Completion::Normal(None))
            }
            // The callable was installed during hoisting; positional
            // execution is a no-op.
            Stmt::FunctionDecl(_) => Ok(Completion::Normal(None)),
            Stmt::ClassDecl(class) => {
                let value = self.eval_class(env, class, statement.span)?;
                let name = class.name.expect("class declaration has a name");
                if !self.envs.try_assign_blocked_binding(env, name, value) {
                    self.envs.initialize(env, name, value);
                }
                Ok(Completion::Normal(None))
            }
            Stmt::Return(argument) => {
                let value = match argument {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test_value = self.eval_expr(env, test)?;
                if test_value.truthy(self.heap, self.interns) {
                    self.eval_stmt(env, consequent)
                } else if let Some(alternate) = alternate {
                    self.eval_stmt(env, alternate)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            Stmt::Block(block) => self.eval_block(env, block),
            Stmt::Loop(plan) => self.eval_loop(env, plan, &[]),
            Stmt::ForIn(st) => self.eval_for_in(env, st, &[]),
            Stmt::ForOf(st) => self.eval_for_of(env, st, &[]),
            Stmt::Break { label } => Ok(Completion::Break(*label)),
            Stmt::Continue { label } => Ok(Completion::Continue(*label)),
            Stmt::Labeled { label, body } => self.eval_labeled(env, *label, body),
            Stmt::Throw(e) => {
                let value = self.eval_expr(env, e)?;
                let mut err = RunError::throw(value);
                err.push_frame(crate::error::RawStackFrame::new(statement.span));
                Err(err)
            }
            Stmt::Try(st) => self.eval_try(env, st),
            Stmt::Switch(st) => self.eval_switch(env, st),
            Stmt::With(st) => {
                let object = self.eval_expr(env, &st.object)?;
                let Value::Ref(id) = object else {
                    return Err(RunError::raise_at(
                        ErrorKind::TypeError,
                        "'with' requires an object",
                        st.object.span,
                    ));
                };
                let mode = self.envs.mode(env);
                let with_env = self.envs.push(Some(env), ScopeKind::With, mode);
                self.envs.scope_mut(with_env).with_object = Some(id);
                self.tracer.on_scope_push();
                let result = self.eval_stmt(with_env, &st.body);
                self.tracer.on_scope_pop();
                result
            }
        }
    }

    fn eval_var_decl(&mut self, env: EnvId, decl: &VarDeclStmt) -> RunResult<()> {
        for declarator in &decl.declarators {
            match &declarator.init {
                Some(init) => {
                    let mut value = self.eval_expr(env, init)?;
                    if let crate::ast::Pattern::Identifier { name, .. } = &declarator.target {
                        value = self.name_function_value(value, *name);
                    }
                    let mode = match decl.kind {
                        DeclKind::Var => BindMode::Var,
                        DeclKind::Let | DeclKind::Const => BindMode::Lexical,
                    };
                    self.bind_pattern(env, &declarator.target, value, mode, declarator.span)?;
                }
                None => {
                    // `var x;` keeps the hoisted value; `let x;` initializes
                    // to undefined, ending the TDZ.
                    if decl.kind != DeclKind::Var {
                        self.bind_pattern(
                            env,
                            &declarator.target,
                            Value::Undefined,
                            BindMode::Lexical,
                            declarator.span,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    // ==========================
    // Blocks and hoisting

    pub fn eval_block(&mut self, env: EnvId, block: &Block) -> RunResult<Completion> {
        let block_env = self.enter_block_scope(env, &block.stmts)?;
        self.tracer.on_scope_push();
        let result = self.eval_stmts(block_env, &block.stmts);
        self.tracer.on_scope_pop();
        result
    }

    /// Pushes a block scope and runs the two hoisting passes over it:
    /// functions first (with Annex-B promotion in sloppy mode), then the
    /// lexical pre-declarations that open the TDZ.
    pub fn enter_block_scope(&mut self, parent: EnvId, stmts: &[StmtLoc]) -> RunResult<EnvId> {
        let mode = self.envs.mode(parent);
        let block_env = self.envs.push(Some(parent), ScopeKind::Block, mode);
        self.predeclare_lexicals(block_env, stmts)?;
        self.install_block_functions(block_env, stmts, mode)?;
        Ok(block_env)
    }

    /// Declares every top-level `let`/`const`/`class` of the statement list
    /// as uninitialized, which both opens the TDZ and surfaces duplicate
    /// declarations.
    fn predeclare_lexicals(&mut self, env: EnvId, stmts: &[StmtLoc]) -> RunResult<()> {
        for statement in stmts {
            match &statement.stmt {
                Stmt::VarDecl(decl) if decl.kind != DeclKind::Var => {
                    let is_const = decl.kind == DeclKind::Const;
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
                Stmt::ClassDecl(class) => {
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

    /// Function-declarations pass for a block: installs the hoisted
    /// callables in the block scope and, in sloppy mode, promotes them to
    /// the nearest var-environment unless a lexical, catch parameter or
    /// parameter name blocks the promotion.
    fn install_block_functions(&mut self, block_env: EnvId, stmts: &[StmtLoc], mode: ScopeMode) -> RunResult<()> {
        for statement in stmts {
            let Stmt::FunctionDecl(func) = &statement.stmt else {
                continue;
            };
            let def = self.interns.get_function(*func);
            let Some(name) = def.name else { continue };
            let value = self.create_function_value(*func, block_env)?;
            self.envs.define_unchecked(block_env, name, Binding::var(value));

            if !mode.is_strict() {
                self.annex_b_promote(block_env, name, value);
            }
        }
        Ok(())
    }

    /// The Annex-B block-function instantiation step: assign the hoisted
    /// callable through to the enclosing var-environment when nothing blocks
    /// it.
    fn annex_b_promote(&mut self, block_env: EnvId, name: StringId, value: Value) {
        let Some(parent) = self.envs.parent(block_env) else {
            return;
        };
        if self.envs.blocks_annex_b_promotion(parent, name) {
            return;
        }
        let var_env = self.envs.function_scope(block_env);
        // Parameter names also block promotion.
        if let Some(active) = self.envs.scope(var_env).active_function {
            let HeapData::Function(function) = self.heap.get(active) else {
                return;
            };
            let def = self.interns.get_function(function.def);
            if def.param_names.contains(&name) {
                return;
            }
        }
        if self.envs.declare_var(var_env, name).is_ok() {
            let _ = self.envs.assign(var_env, name, value);
        }
    }

    /// Hoisting for a var-environment (program body or function body): the
    /// functions pass installs top-level function declarations, the vars
    /// pass pre-declares every `var` name as `undefined`.
    pub fn hoist_var_scope(&mut self, env: EnvId, stmts: &[StmtLoc], var_names: &[StringId]) -> RunResult<()> {
        for statement in stmts {
            let Stmt::FunctionDecl(func) = &statement.stmt else {
                continue;
            };
            let def = self.interns.get_function(*func);
            let Some(name) = def.name else { continue };
            let value = self.create_function_value(*func, env)?;
            self.envs
                .define(env, name, Binding::var(value))
                .map_err(|e| self.binding_error(e, statement.span))?;
        }
        for &name in var_names {
            self.envs
                .declare_var(env, name)
                .map_err(|e| self.binding_error(e, SourceSpan::default()))?;
        }
        Ok(())
    }

    // ==========================
    // Loops

    fn eval_labeled(&mut self, env: EnvId, label: StringId, body: &StmtLoc) -> RunResult<Completion> {
        // Collect a chain of labels so `a: b: for(...)` targets correctly.
        let mut labels = vec![label];
        let mut inner = body;
        while let Stmt::Labeled { label, body } = &inner.stmt {
            labels.push(*label);
            inner = body;
        }
        let completion = match &inner.stmt {
            Stmt::Loop(plan) => self.eval_loop(env, plan, &labels)?,
            Stmt::ForIn(st) => self.eval_for_in(env, st, &labels)?,
            Stmt::ForOf(st) => self.eval_for_of(env, st, &labels)?,
            _ => self.eval_stmt(env, inner)?,
        };
        match completion {
            Completion::Break(Some(l)) if labels.contains(&l) => Ok(Completion::Normal(None)),
            other => Ok(other),
        }
    }

    fn eval_loop(&mut self, env: EnvId, plan: &LoopPlan, labels: &[StringId]) -> RunResult<Completion> {
        // The loop head gets its own scope when the initializer declares
        // lexical bindings.
        let mode = self.envs.mode(env);
        let head_env = if plan.per_iteration.is_empty() {
            env
        } else {
            self.envs.push(Some(env), ScopeKind::Block, mode)
        };
        match &plan.init {
            Some(LoopInit::Decl(decl)) => {
                if decl.kind != DeclKind::Var {
                    let is_const = decl.kind == DeclKind::Const;
                    let mut names = Vec::new();
                    for declarator in &decl.declarators {
                        declarator.target.bound_names(&mut names);
                    }
                    for name in names {
                        self.envs
                            .define(head_env, name, Binding::lexical(is_const))
                            .map_err(|e| self.binding_error(e, declarator_span(decl)))?;
                    }
                }
                self.eval_var_decl(head_env, decl)?;
            }
            Some(LoopInit::Expr(e)) => {
                self.eval_expr(head_env, e)?;
            }
            None => {}
        }

        let mut iter_env = if plan.per_iteration.is_empty() {
            head_env
        } else {
            let fresh = self.envs.push(Some(env), ScopeKind::Block, mode);
            self.envs.copy_bindings(head_env, fresh, &plan.per_iteration);
            fresh
        };

        let mut first = true;
        let mut value = None;
        loop {
            self.heap.tracker_mut().check_statement()?;
            if !(first && plan.post_test)
                && let Some(test) = &plan.test
            {
                let test_value = self.eval_expr(iter_env, test)?;
                if !test_value.truthy(self.heap, self.interns) {
                    break;
                }
            }
            first = false;

            match self.eval_stmt(iter_env, &plan.body)? {
                Completion::Normal(v) => value = v.or(value),
                Completion::Break(None) => break,
                Completion::Break(Some(l)) if labels.contains(&l) => break,
                Completion::Continue(None) => {}
                Completion::Continue(Some(l)) if labels.contains(&l) => {}
                abrupt => return Ok(abrupt),
            }

            if !plan.per_iteration.is_empty() {
                let fresh = self.envs.push(Some(env), ScopeKind::Block, mode);
                self.envs.copy_bindings(iter_env, fresh, &plan.per_iteration);
                iter_env = fresh;
            }
            if let Some(update) = &plan.update {
                self.eval_expr(iter_env, update)?;
            }
        }
        Ok(Completion::Normal(value))
    }

    fn eval_for_in(
        &mut self,
        env: EnvId,
        st: &crate::ast::ForInStmt,
        labels: &[StringId],
    ) -> RunResult<Completion> {
        let object = self.eval_expr(env, &st.right)?;
        if object.is_nullish() {
            return Ok(Completion::Normal(None));
        }
        let keys = self.for_in_keys(object);
        let mut value = None;
        for key in keys {
            self.heap.tracker_mut().check_statement()?;
            let key_value = self.key_to_value(&key)?;
            let iter_env = self.bind_for_target(env, &st.left, key_value, st.right.span)?;
            match self.eval_stmt(iter_env, &st.body)? {
                Completion::Normal(v) => value = v.or(value),
                Completion::Break(None) => break,
                Completion::Break(Some(l)) if labels.contains(&l) => break,
                Completion::Continue(None) => {}
                Completion::Continue(Some(l)) if labels.contains(&l) => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(value))
    }

    pub(crate) fn eval_for_of(
        &mut self,
        env: EnvId,
        st: &crate::ast::ForOfStmt,
        labels: &[StringId],
    ) -> RunResult<Completion> {
        if st.is_await {
            // `for await…of` only occurs inside async bodies, which execute
            // on the suspend-and-resume plan; reaching it here is a bug.
            return Err(RunError::internal("for-await reached the direct evaluator"));
        }
        let iterable = self.eval_expr(env, &st.right)?;
        let record = self.get_iterator(iterable, false, st.right.span)?;
        let mut value = None;
        loop {
            self.heap.tracker_mut().check_statement()?;
            let (step_value, done) = self.iterator_next(&record, None, st.right.span)?;
            if done {
                break;
            }
            let iter_env = match self.bind_for_target(env, &st.left, step_value, st.right.span) {
                Ok(iter_env) => iter_env,
                Err(err) => return Err(self.close_iterator_on_error(&record, err, st.right.span)),
            };
            let completion = match self.eval_stmt(iter_env, &st.body) {
                Ok(completion) => completion,
                Err(err) => return Err(self.close_iterator_on_error(&record, err, st.right.span)),
            };
            match completion {
                Completion::Normal(v) => value = v.or(value),
                Completion::Break(None) => {
                    self.iterator_close(&record, st.right.span)?;
                    break;
                }
                Completion::Break(Some(l)) if labels.contains(&l) => {
                    self.iterator_close(&record, st.right.span)?;
                    break;
                }
                Completion::Continue(None) => {}
                Completion::Continue(Some(l)) if labels.contains(&l) => {}
                abrupt => {
                    self.iterator_close(&record, st.right.span)?;
                    return Ok(abrupt);
                }
            }
        }
        Ok(Completion::Normal(value))
    }

    /// Closes an iterator because of an error, preserving the original error
    /// over any failure from `return()`.
    pub(crate) fn close_iterator_on_error(
        &mut self,
        record: &IteratorRecord,
        err: RunError,
        span: SourceSpan,
    ) -> RunError {
        if err.is_catchable() {
            let _ = self.iterator_close(record, span);
        }
        err
    }

    /// Binds the loop target for one iteration, creating a fresh scope for
    /// lexical declarations.
    fn bind_for_target(
        &mut self,
        env: EnvId,
        target: &ForTarget,
        value: Value,
        span: SourceSpan,
    ) -> RunResult<EnvId> {
        match target {
            ForTarget::Decl { kind, pattern } => match kind {
                DeclKind::Var => {
                    self.bind_pattern(env, pattern, value, BindMode::Var, span)?;
                    Ok(env)
                }
                DeclKind::Let | DeclKind::Const => {
                    let mode = self.envs.mode(env);
                    let iter_env = self.envs.push(Some(env), ScopeKind::Block, mode);
                    let mut names = Vec::new();
                    pattern.bound_names(&mut names);
                    for name in names {
                        self.envs
                            .define(iter_env, name, Binding::lexical(*kind == DeclKind::Const))
                            .map_err(|e| self.binding_error(e, span))?;
                    }
                    self.bind_pattern(iter_env, pattern, value, BindMode::Lexical, span)?;
                    Ok(iter_env)
                }
            },
            ForTarget::Pattern(pattern) => {
                self.bind_pattern(env, pattern, value, BindMode::Assign, span)?;
                Ok(env)
            }
        }
    }

    // ==========================
    // try / switch

    fn eval_try(&mut self, env: EnvId, st: &TryStmt) -> RunResult<Completion> {
        let mut result = self.eval_block(env, &st.block);

        if let Err(err) = &result
            && err.is_catchable()
            && let Some(catch) = &st.catch
        {
            let thrown = match result.unwrap_err() {
                RunError::Throw(thrown) => thrown.value,
                RunError::Raise(engine_err) => self.materialize_error(&engine_err)?,
                _ => unreachable!("only catchable errors reach the catch binding"),
            };
            let mode = self.envs.mode(env);
            let catch_env = self.envs.push(Some(env), ScopeKind::Catch, mode);
            self.tracer.on_scope_push();
            result = (|| {
                if let Some(param) = &catch.param {
                    let mut names = Vec::new();
                    param.bound_names(&mut names);
                    for name in names {
                        self.envs.define_unchecked(catch_env, name, Binding::catch_param(Value::Undefined));
                    }
                    self.bind_pattern(catch_env, param, thrown, BindMode::CatchParam, param.span())?;
                }
                self.eval_block(catch_env, &catch.body)
            })();
            self.tracer.on_scope_pop();
        }

        if let Some(finally) = &st.finally {
            let finally_result = self.eval_block(env, finally);
            match finally_result {
                // A normal finally keeps the pending try/catch completion.
                Ok(Completion::Normal(_)) => {}
                // An abrupt finally supersedes it.
                other => result = other,
            }
        }
        result
    }

    fn eval_switch(&mut self, env: EnvId, st: &SwitchStmt) -> RunResult<Completion> {
        let discriminant = self.eval_expr(env, &st.discriminant)?;

        // The whole case list shares one block scope.
        let mode = self.envs.mode(env);
        let switch_env = self.envs.push(Some(env), ScopeKind::Block, mode);
        for case in &st.cases {
            self.predeclare_lexicals(switch_env, &case.body)?;
            self.install_block_functions(switch_env, &case.body, mode)?;
        }

        let mut matched = None;
        for (index, case) in st.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_value = self.eval_expr(switch_env, test)?;
                if discriminant.strict_eq(test_value, self.heap, self.interns) {
                    matched = Some(index);
                    break;
                }
            }
        }
        let start = match matched {
            Some(index) => index,
            None => match st.cases.iter().position(|case| case.test.is_none()) {
                Some(default_index) => default_index,
                None => return Ok(Completion::Normal(None)),
            },
        };

        let mut value = None;
        for case in &st.cases[start..] {
            match self.eval_stmts(switch_env, &case.body)? {
                Completion::Normal(v) => value = v.or(value),
                Completion::Break(None) => return Ok(Completion::Normal(value)),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(value))
    }
}

/// Span of the first declarator of a declaration, for diagnostics.
fn declarator_span(decl: &VarDeclStmt) -> SourceSpan {
    decl.declarators.first().map_or_else(SourceSpan::default, |d| d.span)
}

/// All `var` names of the top level of a script.
fn collect_top_level_var_names(program: &Program) -> Vec<StringId> {
    let mut names = Vec::new();
    collect_var_names(&program.body, &mut names);
    names
}
