//! Lowering of suspendable function bodies into linear plans.
//!
//! Generator and (non-CPS) async bodies cannot run on the recursive
//! evaluator because they suspend mid-expression. This pass compiles such a
//! body into a flat list of [`PlanStep`]s with explicit jumps, scope/loop
//! blocks and handler ranges. Statements without a suspension point stay
//! whole (`PlanStep::Stmt`) and run on the normal tree walker; statements
//! containing `yield`/`await` are decomposed, extracting every suspending
//! subexpression into a temp slot - the `expr(yield X)` form becomes
//! "evaluate `yield X` into a temp, then evaluate `expr(temp)`".

use crate::{
    ast::{
        Argument, ArrayElement, DeclKind, Expr, ExprLoc, ForTarget, Literal, LogicalOp, MemberKey, ObjectProp,
        Pattern, PropName, Stmt, StmtLoc, VarDeclStmt,
    },
    intern::{FunctionId, StringId},
    span::SourceSpan,
};

/// A compiled, linear form of one function body.
#[derive(Debug)]
pub(crate) struct Plan {
    pub steps: Vec<PlanStep>,
    pub temp_count: u16,
}

/// Iterator temps of a lowered `for…of`, used for `IteratorClose` during
/// unwinding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IterTemps {
    pub iterator: u16,
    pub next_method: u16,
}

#[derive(Debug)]
pub(crate) enum PlanStep {
    /// A statement without suspension points; runs on the tree walker.
    Stmt(StmtLoc),
    /// Evaluate a suspension-free expression into a temp slot.
    EvalTemp { temp: u16, expr: ExprLoc },
    /// Evaluate for effect only.
    EvalDrop { expr: ExprLoc },
    /// Bind a pattern from a temp slot.
    Bind {
        kind: Option<DeclKind>,
        pattern: Pattern,
        temp: u16,
        span: SourceSpan,
    },
    Jump(usize),
    JumpIfFalse { expr: ExprLoc, target: usize },
    /// Enter a block scope, declaring its lexicals and hoisted functions.
    PushScope {
        lexicals: Vec<(StringId, bool)>,
        functions: Vec<FunctionId>,
    },
    /// Enter a `with` scope over the object in a temp.
    PushWith { temp: u16, span: SourceSpan },
    /// Enter a loop: its own head scope plus break/continue routing.
    PushLoop {
        labels: Vec<StringId>,
        continue_ip: usize,
        break_ip: usize,
        head_lexicals: Vec<(StringId, bool)>,
        per_iteration: Vec<StringId>,
        iterator: Option<IterTemps>,
    },
    /// Enter a switch or bare labeled region (break only).
    PushBreakable { labels: Vec<StringId>, break_ip: usize },
    /// Pop the innermost block, restoring its saved environment.
    PopBlock,
    /// Replace the loop head scope with a fresh per-iteration copy.
    FreshIteration,
    /// Enter a protected region.
    PushHandler {
        catch_ip: Option<usize>,
        finally_ip: Option<usize>,
    },
    /// Leave a protected region normally (without running its finally).
    PopHandler,
    /// First step of catch code: bind the pending thrown value.
    CatchBind { param: Option<Pattern>, span: SourceSpan },
    /// Last step of finally code: resume the pending completion.
    EndFinally,
    /// Suspend, yielding the value of a temp (or undefined).
    Yield { value: Option<u16>, resume_temp: u16 },
    /// Await the value of a temp; resume with the settlement.
    Await { value: u16, resume_temp: u16 },
    /// `yield*`: delegate to the iterable in a temp until exhaustion.
    Delegate { iterable: u16, resume_temp: u16, span: SourceSpan },
    /// Break/continue that must unwind through plan blocks.
    Unwind { kind: UnwindKind },
    /// Return with the value of a temp (or undefined), running finallys.
    ReturnTemp { temp: Option<u16> },
    /// Throw the value of a temp.
    ThrowTemp { temp: u16, span: SourceSpan },
    /// Acquire an iterator from a temp for a lowered `for…of`.
    GetIterator {
        from: u16,
        iter: IterTemps,
        is_async: bool,
        span: SourceSpan,
    },
    /// Call `next()`; stores the raw step-result object.
    IterNext {
        iter: IterTemps,
        out: u16,
        span: SourceSpan,
    },
    /// Unpack a step result; jumps to `done_target` when exhausted.
    IterUnpack {
        result: u16,
        value_out: u16,
        done_target: usize,
        span: SourceSpan,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum UnwindKind {
    Break(Option<StringId>),
    Continue(Option<StringId>),
}

/// Compiles a suspendable body into a plan.
pub(crate) fn compile(body: &[StmtLoc]) -> Plan {
    let mut compiler = PlanCompiler {
        steps: Vec::new(),
        next_temp: 0,
        max_temp: 0,
    };
    for statement in body {
        compiler.stmt(statement);
    }
    compiler.steps.push(PlanStep::ReturnTemp { temp: None });
    Plan {
        steps: compiler.steps,
        temp_count: compiler.max_temp,
    }
}

struct PlanCompiler {
    steps: Vec<PlanStep>,
    next_temp: u16,
    max_temp: u16,
}

impl PlanCompiler {
    fn ip(&self) -> usize {
        self.steps.len()
    }

    fn emit(&mut self, step: PlanStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    fn temp(&mut self) -> u16 {
        let t = self.next_temp;
        self.next_temp += 1;
        if self.next_temp > self.max_temp {
            self.max_temp = self.next_temp;
        }
        t
    }

    /// Releases temps allocated inside a statement; slots are reused
    /// between statements since nothing lives across one.
    fn reset_temps(&mut self, mark: u16) {
        self.next_temp = mark;
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        match &mut self.steps[at] {
            PlanStep::Jump(t) => *t = target,
            PlanStep::JumpIfFalse { target: t, .. } => *t = target,
            PlanStep::IterUnpack { done_target, .. } => *done_target = target,
            _ => unreachable!("patching a non-jump step"),
        }
    }

    // ==========================
    // Statements

    fn stmt(&mut self, statement: &StmtLoc) {
        if !stmt_suspends(&statement.stmt) {
            self.emit(PlanStep::Stmt(statement.clone()));
            return;
        }
        let mark = self.next_temp;
        match &statement.stmt {
            Stmt::Expr(e) => {
                self.expr_to_temp(e);
            }
            Stmt::Return(argument) => {
                let temp = argument.as_ref().map(|e| self.expr_to_temp(e));
                self.emit(PlanStep::ReturnTemp { temp });
            }
            Stmt::Throw(e) => {
                let temp = self.expr_to_temp(e);
                self.emit(PlanStep::ThrowTemp {
                    temp,
                    span: statement.span,
                });
            }
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test_expr = self.expr_inline(test);
                let jump_else = self.emit(PlanStep::JumpIfFalse {
                    expr: test_expr,
                    target: 0,
                });
                self.stmt(consequent);
                match alternate {
                    Some(alternate) => {
                        let jump_end = self.emit(PlanStep::Jump(0));
                        let else_ip = self.ip();
                        self.patch_jump(jump_else, else_ip);
                        self.stmt(alternate);
                        let end = self.ip();
                        self.patch_jump(jump_end, end);
                    }
                    None => {
                        let end = self.ip();
                        self.patch_jump(jump_else, end);
                    }
                }
            }
            Stmt::Block(block) => {
                self.emit(PlanStep::PushScope {
                    lexicals: block_lexicals(&block.stmts),
                    functions: block_functions(&block.stmts),
                });
                for inner in &block.stmts {
                    self.stmt(inner);
                }
                self.emit(PlanStep::PopBlock);
            }
            Stmt::Loop(plan) => self.lower_loop(plan, Vec::new()),
            Stmt::ForOf(st) => self.lower_for_of(st, Vec::new()),
            Stmt::ForIn(st) => self.lower_for_in(st, Vec::new(), statement.span),
            Stmt::Labeled { label, body } => {
                let mut labels = vec![*label];
                let mut inner = body.as_ref();
                while let Stmt::Labeled { label, body } = &inner.stmt {
                    labels.push(*label);
                    inner = body;
                }
                match &inner.stmt {
                    Stmt::Loop(plan) => self.lower_loop(plan, labels),
                    Stmt::ForOf(st) => self.lower_for_of(st, labels),
                    Stmt::ForIn(st) => self.lower_for_in(st, labels, inner.span),
                    _ => {
                        let push = self.emit(PlanStep::PushBreakable {
                            labels,
                            break_ip: 0,
                        });
                        self.stmt(inner);
                        self.emit(PlanStep::PopBlock);
                        let after = self.ip();
                        if let PlanStep::PushBreakable { break_ip, .. } = &mut self.steps[push] {
                            *break_ip = after;
                        }
                    }
                }
            }
            Stmt::Break { label } => {
                self.emit(PlanStep::Unwind {
                    kind: UnwindKind::Break(*label),
                });
            }
            Stmt::Continue { label } => {
                self.emit(PlanStep::Unwind {
                    kind: UnwindKind::Continue(*label),
                });
            }
            Stmt::Try(st) => self.lower_try(st),
            Stmt::Switch(st) => self.lower_switch(st),
            Stmt::With(st) => {
                let temp = self.expr_to_temp(&st.object);
                self.emit(PlanStep::PushWith {
                    temp,
                    span: st.object.span,
                });
                self.stmt(&st.body);
                self.emit(PlanStep::PopBlock);
            }
            // These cannot contain suspension points in their executable
            // position (nested function bodies are separate plans).
            Stmt::Empty | Stmt::FunctionDecl(_) | Stmt::ClassDecl(_) => {
                self.emit(PlanStep::Stmt(statement.clone()));
            }
        }
        self.reset_temps(mark);
    }

    fn var_decl(&mut self, decl: &VarDeclStmt) {
        for declarator in &decl.declarators {
            match &declarator.init {
                Some(init) if expr_suspends(&init.expr) => {
                    let temp = self.expr_to_temp(init);
                    self.emit(PlanStep::Bind {
                        kind: Some(decl.kind),
                        pattern: declarator.target.clone(),
                        temp,
                        span: declarator.span,
                    });
                }
                _ => {
                    self.emit(PlanStep::Stmt(StmtLoc::new(
                        declarator.span,
                        Stmt::VarDecl(VarDeclStmt {
                            kind: decl.kind,
                            declarators: vec![declarator.clone()],
                        }),
                    )));
                }
            }
        }
    }

    fn lower_loop(&mut self, plan: &crate::ast::LoopPlan, labels: Vec<StringId>) {
        let head_lexicals = match &plan.init {
            Some(crate::ast::LoopInit::Decl(decl)) if decl.kind != DeclKind::Var => {
                let mut names = Vec::new();
                for declarator in &decl.declarators {
                    declarator.target.bound_names(&mut names);
                }
                let is_const = decl.kind == DeclKind::Const;
                names.into_iter().map(|n| (n, is_const)).collect()
            }
            _ => Vec::new(),
        };

        let push = self.emit(PlanStep::PushLoop {
            labels,
            continue_ip: 0,
            break_ip: 0,
            head_lexicals,
            per_iteration: plan.per_iteration.clone(),
            iterator: None,
        });
        match &plan.init {
            Some(crate::ast::LoopInit::Decl(decl)) => self.var_decl(decl),
            Some(crate::ast::LoopInit::Expr(e)) => {
                if expr_suspends(&e.expr) {
                    self.expr_to_temp(e);
                } else {
                    self.emit(PlanStep::EvalDrop { expr: e.clone() });
                }
            }
            None => {}
        }

        let start = self.ip();
        let mut exit_jumps = Vec::new();
        if !plan.post_test
            && let Some(test) = &plan.test
        {
            let test_expr = self.expr_inline(test);
            exit_jumps.push(self.emit(PlanStep::JumpIfFalse {
                expr: test_expr,
                target: 0,
            }));
        }
        self.stmt(&plan.body);

        let continue_ip = self.ip();
        if !plan.per_iteration.is_empty() {
            self.emit(PlanStep::FreshIteration);
        }
        if let Some(update) = &plan.update {
            if expr_suspends(&update.expr) {
                self.expr_to_temp(update);
            } else {
                self.emit(PlanStep::EvalDrop { expr: update.clone() });
            }
        }
        if plan.post_test
            && let Some(test) = &plan.test
        {
            let test_expr = self.expr_inline(test);
            exit_jumps.push(self.emit(PlanStep::JumpIfFalse {
                expr: test_expr,
                target: 0,
            }));
        }
        self.emit(PlanStep::Jump(start));

        let exit = self.ip();
        self.emit(PlanStep::PopBlock);
        let after = self.ip();
        for jump in exit_jumps {
            self.patch_jump(jump, exit);
        }
        if let PlanStep::PushLoop {
            continue_ip: c,
            break_ip: b,
            ..
        } = &mut self.steps[push]
        {
            *c = continue_ip;
            *b = after;
        }
    }

    fn lower_for_of(&mut self, st: &crate::ast::ForOfStmt, labels: Vec<StringId>) {
        let span = st.right.span;
        let src = self.expr_to_temp(&st.right);
        let iter = IterTemps {
            iterator: self.temp(),
            next_method: self.temp(),
        };
        self.emit(PlanStep::GetIterator {
            from: src,
            iter,
            is_async: st.is_await,
            span,
        });

        let push = self.emit(PlanStep::PushLoop {
            labels,
            continue_ip: 0,
            break_ip: 0,
            head_lexicals: Vec::new(),
            per_iteration: Vec::new(),
            iterator: Some(iter),
        });

        let start = self.ip();
        let result = self.temp();
        self.emit(PlanStep::IterNext {
            iter,
            out: result,
            span,
        });
        if st.is_await {
            self.emit(PlanStep::Await {
                value: result,
                resume_temp: result,
            });
        }
        let value = self.temp();
        let unpack = self.emit(PlanStep::IterUnpack {
            result,
            value_out: value,
            done_target: 0,
            span,
        });
        if st.is_await {
            // The sync-iterator fallback produces raw iteration values which
            // must themselves be awaited.
            self.emit(PlanStep::Await {
                value,
                resume_temp: value,
            });
        }

        // Per-iteration binding scope for lexical targets.
        let (bind_kind, pattern, scoped) = match &st.left {
            ForTarget::Decl { kind, pattern } => (
                Some(*kind),
                pattern.clone(),
                *kind != DeclKind::Var,
            ),
            ForTarget::Pattern(pattern) => (None, pattern.clone(), false),
        };
        if scoped {
            let mut names = Vec::new();
            pattern.bound_names(&mut names);
            let is_const = bind_kind == Some(DeclKind::Const);
            self.emit(PlanStep::PushScope {
                lexicals: names.into_iter().map(|n| (n, is_const)).collect(),
                functions: Vec::new(),
            });
        }
        self.emit(PlanStep::Bind {
            kind: bind_kind,
            pattern,
            temp: value,
            span,
        });
        self.stmt(&st.body);
        if scoped {
            self.emit(PlanStep::PopBlock);
        }
        self.emit(PlanStep::Jump(start));

        let exit = self.ip();
        self.emit(PlanStep::PopBlock);
        let after = self.ip();
        self.patch_jump(unpack, exit);
        if let PlanStep::PushLoop {
            continue_ip: c,
            break_ip: b,
            ..
        } = &mut self.steps[push]
        {
            *c = start;
            *b = after;
        }
    }

    /// `for…in` lowers through a snapshot of the key list; the snapshot
    /// array is iterated by index with synthesized temp expressions.
    fn lower_for_in(&mut self, st: &crate::ast::ForInStmt, labels: Vec<StringId>, span: SourceSpan) {
        let src = self.expr_to_temp(&st.right);
        let keys = self.temp();
        // A synthesized `for…of`-style walk over the key snapshot: build the
        // key array with the normal statement machinery.
        self.emit(PlanStep::EvalTemp {
            temp: keys,
            expr: ExprLoc::new(span, Expr::ForInKeys(src)),
        });
        let index = self.temp();
        self.emit(PlanStep::EvalTemp {
            temp: index,
            expr: ExprLoc::new(span, Expr::Literal(Literal::Number(0.0))),
        });

        let push = self.emit(PlanStep::PushLoop {
            labels,
            continue_ip: 0,
            break_ip: 0,
            head_lexicals: Vec::new(),
            per_iteration: Vec::new(),
            iterator: None,
        });
        let start = self.ip();
        let test = ExprLoc::new(
            span,
            Expr::Binary {
                op: crate::ast::BinaryOp::Lt,
                left: Box::new(ExprLoc::new(span, Expr::TempSlot(index))),
                right: Box::new(ExprLoc::new(
                    span,
                    Expr::Member {
                        object: Box::new(ExprLoc::new(span, Expr::TempSlot(keys))),
                        key: MemberKey::Static(crate::intern::StaticStrings::Length.into()),
                        optional: false,
                    },
                )),
            },
        );
        let exit_jump = self.emit(PlanStep::JumpIfFalse { expr: test, target: 0 });

        let key_value = self.temp();
        self.emit(PlanStep::EvalTemp {
            temp: key_value,
            expr: ExprLoc::new(
                span,
                Expr::Member {
                    object: Box::new(ExprLoc::new(span, Expr::TempSlot(keys))),
                    key: MemberKey::Computed(Box::new(ExprLoc::new(span, Expr::TempSlot(index)))),
                    optional: false,
                },
            ),
        });
        let (bind_kind, pattern, scoped) = match &st.left {
            ForTarget::Decl { kind, pattern } => (Some(*kind), pattern.clone(), *kind != DeclKind::Var),
            ForTarget::Pattern(pattern) => (None, pattern.clone(), false),
        };
        if scoped {
            let mut names = Vec::new();
            pattern.bound_names(&mut names);
            let is_const = bind_kind == Some(DeclKind::Const);
            self.emit(PlanStep::PushScope {
                lexicals: names.into_iter().map(|n| (n, is_const)).collect(),
                functions: Vec::new(),
            });
        }
        self.emit(PlanStep::Bind {
            kind: bind_kind,
            pattern,
            temp: key_value,
            span,
        });
        self.stmt(&st.body);
        if scoped {
            self.emit(PlanStep::PopBlock);
        }
        let continue_ip = self.ip();
        self.emit(PlanStep::EvalTemp {
            temp: index,
            expr: ExprLoc::new(
                span,
                Expr::Binary {
                    op: crate::ast::BinaryOp::Add,
                    left: Box::new(ExprLoc::new(span, Expr::TempSlot(index))),
                    right: Box::new(ExprLoc::new(span, Expr::Literal(Literal::Number(1.0)))),
                },
            ),
        });
        self.emit(PlanStep::Jump(start));
        let exit = self.ip();
        self.emit(PlanStep::PopBlock);
        let after = self.ip();
        self.patch_jump(exit_jump, exit);
        if let PlanStep::PushLoop {
            continue_ip: c,
            break_ip: b,
            ..
        } = &mut self.steps[push]
        {
            *c = continue_ip;
            *b = after;
        }
    }

    fn lower_try(&mut self, st: &crate::ast::TryStmt) {
        let has_catch = st.catch.is_some();
        let has_finally = st.finally.is_some();
        let push_handler = self.emit(PlanStep::PushHandler {
            catch_ip: None,
            finally_ip: None,
        });

        // Protected try block.
        self.emit(PlanStep::PushScope {
            lexicals: block_lexicals(&st.block.stmts),
            functions: block_functions(&st.block.stmts),
        });
        for inner in &st.block.stmts {
            self.stmt(inner);
        }
        self.emit(PlanStep::PopBlock);
        self.emit(PlanStep::PopHandler);
        let jump_after_try = self.emit(PlanStep::Jump(0));

        // Catch code.
        let catch_ip = if let Some(catch) = &st.catch {
            let ip = self.ip();
            // Catch body throws still reach the finally.
            let catch_handler = if has_finally {
                Some(self.emit(PlanStep::PushHandler {
                    catch_ip: None,
                    finally_ip: None,
                }))
            } else {
                None
            };
            self.emit(PlanStep::CatchBind {
                param: catch.param.clone(),
                span: catch.param.as_ref().map_or_else(SourceSpan::default, Pattern::span),
            });
            for inner in &catch.body.stmts {
                self.stmt(inner);
            }
            self.emit(PlanStep::PopBlock);
            if catch_handler.is_some() {
                self.emit(PlanStep::PopHandler);
            }
            Some((ip, catch_handler))
        } else {
            None
        };
        let jump_after_catch = if has_catch { Some(self.emit(PlanStep::Jump(0))) } else { None };

        // Finally code.
        let finally_ip = if let Some(finally) = &st.finally {
            let ip = self.ip();
            self.emit(PlanStep::PushScope {
                lexicals: block_lexicals(&finally.stmts),
                functions: block_functions(&finally.stmts),
            });
            for inner in &finally.stmts {
                self.stmt(inner);
            }
            self.emit(PlanStep::PopBlock);
            self.emit(PlanStep::EndFinally);
            Some(ip)
        } else {
            None
        };

        let end = self.ip();
        // Normal try completion: fall to the finally (or past everything).
        self.patch_jump(jump_after_try, finally_ip.unwrap_or(end));
        if let Some(jump) = jump_after_catch {
            self.patch_jump(jump, finally_ip.unwrap_or(end));
        }
        if let PlanStep::PushHandler {
            catch_ip: c,
            finally_ip: f,
        } = &mut self.steps[push_handler]
        {
            *c = catch_ip.map(|(ip, _)| ip);
            *f = finally_ip;
        }
        if let Some((_, Some(catch_handler))) = catch_ip
            && let PlanStep::PushHandler { finally_ip: f, .. } = &mut self.steps[catch_handler]
        {
            *f = finally_ip;
        }
    }

    fn lower_switch(&mut self, st: &crate::ast::SwitchStmt) {
        let discriminant = self.expr_to_temp(&st.discriminant);
        let push = self.emit(PlanStep::PushBreakable {
            labels: Vec::new(),
            break_ip: 0,
        });
        let mut case_lexicals = Vec::new();
        let mut case_functions = Vec::new();
        for case in &st.cases {
            case_lexicals.extend(block_lexicals(&case.body));
            case_functions.extend(block_functions(&case.body));
        }
        self.emit(PlanStep::PushScope {
            lexicals: case_lexicals,
            functions: case_functions,
        });

        // Comparison chain, then a default jump.
        let mut body_jumps = Vec::new();
        for (index, case) in st.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_temp = self.expr_to_temp(test);
                let matches = ExprLoc::new(
                    test.span,
                    Expr::Binary {
                        op: crate::ast::BinaryOp::StrictEq,
                        left: Box::new(ExprLoc::new(test.span, Expr::TempSlot(discriminant))),
                        right: Box::new(ExprLoc::new(test.span, Expr::TempSlot(test_temp))),
                    },
                );
                let skip = self.emit(PlanStep::JumpIfFalse {
                    expr: matches,
                    target: 0,
                });
                body_jumps.push((index, self.emit(PlanStep::Jump(0))));
                let next_test = self.ip();
                self.patch_jump(skip, next_test);
            }
        }
        let default_jump = st
            .cases
            .iter()
            .position(|case| case.test.is_none())
            .map(|index| (index, self.emit(PlanStep::Jump(0))));
        let no_match_jump = self.emit(PlanStep::Jump(0));

        // Case bodies with fallthrough.
        let mut body_ips = Vec::with_capacity(st.cases.len());
        for case in &st.cases {
            body_ips.push(self.ip());
            for inner in &case.body {
                self.stmt(inner);
            }
        }
        let exit = self.ip();
        self.emit(PlanStep::PopBlock);
        self.emit(PlanStep::PopBlock);
        let after = self.ip();

        for (index, jump) in body_jumps {
            self.patch_jump(jump, body_ips[index]);
        }
        if let Some((index, jump)) = default_jump {
            self.patch_jump(jump, body_ips[index]);
        }
        self.patch_jump(no_match_jump, exit);
        if let PlanStep::PushBreakable { break_ip, .. } = &mut self.steps[push] {
            *break_ip = after;
        }
    }

    // ==========================
    // Expressions

    /// Expression for an inline position (test of a jump): decomposed to a
    /// temp first when it suspends.
    fn expr_inline(&mut self, e: &ExprLoc) -> ExprLoc {
        if expr_suspends(&e.expr) {
            let temp = self.expr_to_temp(e);
            ExprLoc::new(e.span, Expr::TempSlot(temp))
        } else {
            e.clone()
        }
    }

    /// Compiles an expression into a temp slot, extracting suspension
    /// points.
    fn expr_to_temp(&mut self, e: &ExprLoc) -> u16 {
        if !expr_suspends(&e.expr) {
            let temp = self.temp();
            self.emit(PlanStep::EvalTemp { temp, expr: e.clone() });
            return temp;
        }
        let span = e.span;
        match &e.expr {
            Expr::Yield { arg, delegate } => {
                let out = self.temp();
                if *delegate {
                    let iterable = match arg {
                        Some(arg) => self.expr_to_temp(arg),
                        None => {
                            let t = self.temp();
                            self.emit(PlanStep::EvalTemp {
                                temp: t,
                                expr: ExprLoc::new(span, Expr::Literal(Literal::Null)),
                            });
                            t
                        }
                    };
                    self.emit(PlanStep::Delegate {
                        iterable,
                        resume_temp: out,
                        span,
                    });
                } else {
                    let value = arg.as_ref().map(|arg| self.expr_to_temp(arg));
                    self.emit(PlanStep::Yield {
                        value,
                        resume_temp: out,
                    });
                }
                out
            }
            Expr::Await(arg) => {
                let value = self.expr_to_temp(arg);
                let out = self.temp();
                self.emit(PlanStep::Await {
                    value,
                    resume_temp: out,
                });
                out
            }
            Expr::Binary { op, left, right } => {
                let l = self.force(left);
                let r = self.force(right);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Binary {
                            op: *op,
                            left: Box::new(l),
                            right: Box::new(r),
                        },
                    ),
                });
                out
            }
            Expr::Logical { op, left, right } => {
                let out = self.temp();
                let l = self.force(left);
                self.emit(PlanStep::EvalTemp { temp: out, expr: l });
                // The jump condition is arranged so "skip the right side"
                // corresponds to the condition being falsy:
                //   && : skip when the left is falsy        -> test `left`
                //   || : skip when the left is truthy       -> test `!left`
                //   ?? : skip when the left is not nullish  -> test `left == null`
                let condition = ExprLoc::new(
                    span,
                    match op {
                        LogicalOp::And => Expr::TempSlot(out),
                        LogicalOp::Or => Expr::Unary {
                            op: crate::ast::UnaryOp::Not,
                            arg: Box::new(ExprLoc::new(span, Expr::TempSlot(out))),
                        },
                        LogicalOp::Nullish => Expr::Binary {
                            op: crate::ast::BinaryOp::Eq,
                            left: Box::new(ExprLoc::new(span, Expr::TempSlot(out))),
                            right: Box::new(ExprLoc::new(span, Expr::Literal(Literal::Null))),
                        },
                    },
                );
                let skip = self.emit(PlanStep::JumpIfFalse {
                    expr: condition,
                    target: 0,
                });
                let r = self.force(right);
                self.emit(PlanStep::EvalTemp { temp: out, expr: r });
                let end = self.ip();
                self.patch_jump(skip, end);
                out
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test_expr = self.expr_inline(test);
                let out = self.temp();
                let jump_else = self.emit(PlanStep::JumpIfFalse {
                    expr: test_expr,
                    target: 0,
                });
                let cons = self.force(consequent);
                self.emit(PlanStep::EvalTemp { temp: out, expr: cons });
                let jump_end = self.emit(PlanStep::Jump(0));
                let else_ip = self.ip();
                self.patch_jump(jump_else, else_ip);
                let alt = self.force(alternate);
                self.emit(PlanStep::EvalTemp { temp: out, expr: alt });
                let end = self.ip();
                self.patch_jump(jump_end, end);
                out
            }
            Expr::Sequence { exprs } => {
                let out = self.temp();
                for (index, sub) in exprs.iter().enumerate() {
                    let value = self.force(sub);
                    if index + 1 == exprs.len() {
                        self.emit(PlanStep::EvalTemp { temp: out, expr: value });
                    } else {
                        self.emit(PlanStep::EvalDrop { expr: value });
                    }
                }
                out
            }
            Expr::Call { callee, args, optional } => {
                let callee_rebuilt = self.force_callee(callee);
                let rebuilt_args = self.force_args(args);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Call {
                            callee: Box::new(callee_rebuilt),
                            args: rebuilt_args,
                            optional: *optional,
                        },
                    ),
                });
                out
            }
            Expr::New { callee, args } => {
                let callee_rebuilt = self.force(callee);
                let rebuilt_args = self.force_args(args);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::New {
                            callee: Box::new(callee_rebuilt),
                            args: rebuilt_args,
                        },
                    ),
                });
                out
            }
            Expr::SuperCall(args) => {
                let rebuilt_args = self.force_args(args);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(span, Expr::SuperCall(rebuilt_args)),
                });
                out
            }
            Expr::Member { object, key, optional } => {
                let object_rebuilt = self.force(object);
                let key_rebuilt = self.force_member_key(key);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Member {
                            object: Box::new(object_rebuilt),
                            key: key_rebuilt,
                            optional: *optional,
                        },
                    ),
                });
                out
            }
            Expr::Array { elements } => {
                let rebuilt: Vec<ArrayElement> = elements
                    .iter()
                    .map(|element| match element {
                        ArrayElement::Hole => ArrayElement::Hole,
                        ArrayElement::Item(item) => ArrayElement::Item(self.force(item)),
                        ArrayElement::Spread(item) => ArrayElement::Spread(self.force(item)),
                    })
                    .collect();
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(span, Expr::Array { elements: rebuilt }),
                });
                out
            }
            Expr::Object { props } => {
                let rebuilt: Vec<ObjectProp> = props
                    .iter()
                    .map(|prop| match prop {
                        ObjectProp::Init { key, value } => ObjectProp::Init {
                            key: self.force_prop_name(key),
                            value: self.force(value),
                        },
                        ObjectProp::Spread(value) => ObjectProp::Spread(self.force(value)),
                        other => other.clone(),
                    })
                    .collect();
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(span, Expr::Object { props: rebuilt }),
                });
                out
            }
            Expr::Template { quasis, exprs } => {
                let rebuilt: Vec<ExprLoc> = exprs.iter().map(|sub| self.force(sub)).collect();
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Template {
                            quasis: quasis.clone(),
                            exprs: rebuilt,
                        },
                    ),
                });
                out
            }
            Expr::Unary { op, arg } => {
                let rebuilt = self.force(arg);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Unary {
                            op: *op,
                            arg: Box::new(rebuilt),
                        },
                    ),
                });
                out
            }
            Expr::Assign { op, target, value } => {
                let rebuilt_value = self.force(value);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(
                        span,
                        Expr::Assign {
                            op: *op,
                            target: target.clone(),
                            value: Box::new(rebuilt_value),
                        },
                    ),
                });
                out
            }
            Expr::Chain(inner) => {
                // Conservative: the chain re-evaluates with its suspending
                // parts extracted first.
                let rebuilt = self.force(inner);
                let out = self.temp();
                self.emit(PlanStep::EvalTemp {
                    temp: out,
                    expr: ExprLoc::new(span, Expr::Chain(Box::new(rebuilt))),
                });
                out
            }
            _ => {
                let temp = self.temp();
                self.emit(PlanStep::EvalTemp { temp, expr: e.clone() });
                temp
            }
        }
    }

    /// Extracts a subexpression into a temp and returns the temp read.
    ///
    /// Every sibling of a suspending subtree is forced too, so extracted
    /// steps keep the source's left-to-right evaluation order.
    fn force(&mut self, e: &ExprLoc) -> ExprLoc {
        let temp = self.expr_to_temp(e);
        ExprLoc::new(e.span, Expr::TempSlot(temp))
    }

    fn force_prop_name(&mut self, name: &PropName) -> PropName {
        match name {
            PropName::Computed(e) => PropName::Computed(Box::new(self.force(e))),
            other => other.clone(),
        }
    }

    fn force_callee(&mut self, callee: &ExprLoc) -> ExprLoc {
        // Member callees keep their member shape so the call still passes
        // the base object as `this`.
        if let Expr::Member { object, key, optional } = &callee.expr {
            let object_rebuilt = self.force(object);
            let key_rebuilt = self.force_member_key(key);
            return ExprLoc::new(
                callee.span,
                Expr::Member {
                    object: Box::new(object_rebuilt),
                    key: key_rebuilt,
                    optional: *optional,
                },
            );
        }
        self.force(callee)
    }

    fn force_member_key(&mut self, key: &MemberKey) -> MemberKey {
        match key {
            MemberKey::Computed(e) => MemberKey::Computed(Box::new(self.force(e))),
            other => other.clone(),
        }
    }

    fn force_args(&mut self, args: &[Argument]) -> Vec<Argument> {
        args.iter()
            .map(|arg| match arg {
                Argument::Expr(e) => Argument::Expr(self.force(e)),
                Argument::Spread(e) => Argument::Spread(self.force(e)),
            })
            .collect()
    }
}

fn block_lexicals(stmts: &[StmtLoc]) -> Vec<(StringId, bool)> {
    let mut out = Vec::new();
    for statement in stmts {
        match &statement.stmt {
            Stmt::VarDecl(decl) if decl.kind != DeclKind::Var => {
                let is_const = decl.kind == DeclKind::Const;
                let mut names = Vec::new();
                for declarator in &decl.declarators {
                    declarator.target.bound_names(&mut names);
                }
                out.extend(names.into_iter().map(|n| (n, is_const)));
            }
            Stmt::ClassDecl(class) => {
                if let Some(name) = class.name {
                    out.push((name, false));
                }
            }
            _ => {}
        }
    }
    out
}

fn block_functions(stmts: &[StmtLoc]) -> Vec<FunctionId> {
    stmts
        .iter()
        .filter_map(|statement| match &statement.stmt {
            Stmt::FunctionDecl(func) => Some(*func),
            _ => None,
        })
        .collect()
}

// ==========================
// Suspension analysis

pub(crate) fn stmt_suspends(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(e) | Stmt::Throw(e) => expr_suspends(&e.expr),
        Stmt::Return(argument) => argument.as_ref().is_some_and(|e| expr_suspends(&e.expr)),
        Stmt::VarDecl(decl) => decl
            .declarators
            .iter()
            .any(|d| d.init.as_ref().is_some_and(|e| expr_suspends(&e.expr)) || pattern_suspends(&d.target)),
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            expr_suspends(&test.expr)
                || stmt_suspends(&consequent.stmt)
                || alternate.as_ref().is_some_and(|s| stmt_suspends(&s.stmt))
        }
        Stmt::Block(block) => block.stmts.iter().any(|s| stmt_suspends(&s.stmt)),
        Stmt::Loop(plan) => {
            let init = match &plan.init {
                Some(crate::ast::LoopInit::Decl(decl)) => decl
                    .declarators
                    .iter()
                    .any(|d| d.init.as_ref().is_some_and(|e| expr_suspends(&e.expr))),
                Some(crate::ast::LoopInit::Expr(e)) => expr_suspends(&e.expr),
                None => false,
            };
            init || plan.test.as_ref().is_some_and(|e| expr_suspends(&e.expr))
                || plan.update.as_ref().is_some_and(|e| expr_suspends(&e.expr))
                || stmt_suspends(&plan.body.stmt)
        }
        Stmt::ForIn(st) => expr_suspends(&st.right.expr) || stmt_suspends(&st.body.stmt),
        Stmt::ForOf(st) => st.is_await || expr_suspends(&st.right.expr) || stmt_suspends(&st.body.stmt),
        Stmt::Labeled { body, .. } => stmt_suspends(&body.stmt),
        Stmt::Try(st) => {
            st.block.stmts.iter().any(|s| stmt_suspends(&s.stmt))
                || st
                    .catch
                    .as_ref()
                    .is_some_and(|c| c.body.stmts.iter().any(|s| stmt_suspends(&s.stmt)))
                || st
                    .finally
                    .as_ref()
                    .is_some_and(|f| f.stmts.iter().any(|s| stmt_suspends(&s.stmt)))
        }
        Stmt::Switch(st) => {
            expr_suspends(&st.discriminant.expr)
                || st.cases.iter().any(|case| {
                    case.test.as_ref().is_some_and(|e| expr_suspends(&e.expr))
                        || case.body.iter().any(|s| stmt_suspends(&s.stmt))
                })
        }
        Stmt::With(st) => expr_suspends(&st.object.expr) || stmt_suspends(&st.body.stmt),
        Stmt::Empty | Stmt::FunctionDecl(_) | Stmt::ClassDecl(_) | Stmt::Break { .. } | Stmt::Continue { .. } => false,
    }
}

pub(crate) fn expr_suspends(expr: &Expr) -> bool {
    match expr {
        Expr::Yield { .. } | Expr::Await(_) => true,
        Expr::Unary { arg, .. } | Expr::Chain(arg) => expr_suspends(&arg.expr),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            expr_suspends(&left.expr) || expr_suspends(&right.expr)
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => expr_suspends(&test.expr) || expr_suspends(&consequent.expr) || expr_suspends(&alternate.expr),
        Expr::Assign { target, value, .. } => pattern_suspends(target) || expr_suspends(&value.expr),
        Expr::Update { target, .. } => pattern_suspends(target),
        Expr::Sequence { exprs } => exprs.iter().any(|e| expr_suspends(&e.expr)),
        Expr::Call { callee, args, .. } => {
            expr_suspends(&callee.expr) || args.iter().any(|arg| argument_suspends(arg))
        }
        Expr::New { callee, args } => expr_suspends(&callee.expr) || args.iter().any(argument_suspends),
        Expr::SuperCall(args) => args.iter().any(argument_suspends),
        Expr::Member { object, key, .. } => {
            expr_suspends(&object.expr) || matches!(key, MemberKey::Computed(e) if expr_suspends(&e.expr))
        }
        Expr::SuperMember { key } => matches!(key, MemberKey::Computed(e) if expr_suspends(&e.expr)),
        Expr::Array { elements } => elements.iter().any(|element| match element {
            ArrayElement::Item(e) | ArrayElement::Spread(e) => expr_suspends(&e.expr),
            ArrayElement::Hole => false,
        }),
        Expr::Object { props } => props.iter().any(|prop| match prop {
            ObjectProp::Init { key, value } => prop_name_suspends(key) || expr_suspends(&value.expr),
            ObjectProp::Spread(e) => expr_suspends(&e.expr),
            ObjectProp::Getter { key, .. } | ObjectProp::Setter { key, .. } => prop_name_suspends(key),
        }),
        Expr::Template { exprs, .. } => exprs.iter().any(|e| expr_suspends(&e.expr)),
        Expr::TaggedTemplate { tag, exprs, .. } => {
            expr_suspends(&tag.expr) || exprs.iter().any(|e| expr_suspends(&e.expr))
        }
        Expr::PrivateIn { object, .. } => expr_suspends(&object.expr),
        _ => false,
    }
}

fn argument_suspends(arg: &Argument) -> bool {
    match arg {
        Argument::Expr(e) | Argument::Spread(e) => expr_suspends(&e.expr),
    }
}

fn pattern_suspends(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Identifier { .. } => false,
        Pattern::Array { elements, rest, .. } => {
            elements.iter().flatten().any(pattern_suspends) || rest.as_deref().is_some_and(pattern_suspends)
        }
        Pattern::Object { props, rest, .. } => {
            props
                .iter()
                .any(|p| prop_name_suspends(&p.key) || pattern_suspends(&p.value))
                || rest.as_deref().is_some_and(pattern_suspends)
        }
        Pattern::Default { target, default } => pattern_suspends(target) || expr_suspends(&default.expr),
        Pattern::Member { object, key, .. } => {
            expr_suspends(&object.expr) || matches!(key, MemberKey::Computed(e) if expr_suspends(&e.expr))
        }
    }
}

fn prop_name_suspends(name: &PropName) -> bool {
    matches!(name, PropName::Computed(e) if expr_suspends(&e.expr))
}
