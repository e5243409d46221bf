//! Continuation-passing lowering for async functions.
//!
//! Eligible async bodies rewrite into a plain body that builds and returns a
//! promise:
//!
//! ```text
//! return new Promise((__resolve, __reject) => {
//!     try { …rewritten body… } catch (__error) { __reject(__error); }
//! });
//! ```
//!
//! Each `await e` extracts into `return __awaitHelper(e).then(__value =>
//! { …continuation… }, __reject);`. Only bodies whose control flow is
//! expressible this way are rewritten - awaits must sit in statement
//! positions (expression statement, single-declarator initializer, simple
//! assignment, return) with no `try`, loop, branch or switch around them.
//! Everything else keeps `cps_body = None` and runs on the
//! suspend-and-resume plan instead.

use crate::{
    ast::{
        Argument, Block, CatchClause, CtorKind, Expr, ExprLoc, FunctionDef, MemberKey, ParamDef, Pattern, Stmt,
        StmtLoc, TryStmt, VarDeclStmt,
    },
    builder::{collect_lexical_names, collect_var_names},
    genplan::{expr_suspends, stmt_suspends},
    intern::{FunctionId, StaticStrings, StringId},
    span::SourceSpan,
};

/// Rewrites every eligible async function in the table, appending the
/// synthesized executor/continuation functions.
pub(crate) fn rewrite_async_functions(functions: &mut Vec<FunctionDef>) {
    for index in 0..functions.len() {
        let def = &functions[index];
        if !def.is_async || def.is_generator || def.cps_body.is_some() {
            continue;
        }
        if !body_eligible(&def.body) {
            continue;
        }
        let span = def.span;
        let is_strict = def.is_strict;
        let body = def.body.clone();
        let lowered = Rewriter {
            functions,
            span,
            is_strict,
        }
        .lower(body);
        functions[index].cps_body = Some(lowered);
    }
}

/// True when every `await` sits in a directly rewritable statement position.
fn body_eligible(body: &[StmtLoc]) -> bool {
    body.iter().all(|statement| stmt_eligible(&statement.stmt))
}

fn stmt_eligible(stmt: &Stmt) -> bool {
    if !stmt_suspends(stmt) {
        return true;
    }
    match stmt {
        Stmt::Expr(e) => matches!(&e.expr, Expr::Await(arg) if !expr_suspends(&arg.expr))
            || matches!(
                &e.expr,
                Expr::Assign { op: crate::ast::AssignOp::Assign, target, value }
                    if matches!(target.as_ref(), Pattern::Identifier { .. })
                        && matches!(&value.expr, Expr::Await(arg) if !expr_suspends(&arg.expr))
            ),
        Stmt::VarDecl(decl) => {
            decl.declarators.len() == 1
                && matches!(decl.declarators[0].target, Pattern::Identifier { .. })
                && matches!(
                    decl.declarators[0].init.as_ref().map(|e| &e.expr),
                    Some(Expr::Await(arg)) if !expr_suspends(&arg.expr)
                )
        }
        Stmt::Return(Some(e)) => matches!(&e.expr, Expr::Await(arg) if !expr_suspends(&arg.expr)),
        _ => false,
    }
}

struct Rewriter<'f> {
    functions: &'f mut Vec<FunctionDef>,
    span: SourceSpan,
    is_strict: bool,
}

impl Rewriter<'_> {
    /// Produces the replacement body:
    /// `return new Promise((__resolve, __reject) => { try … });`
    fn lower(mut self, body: Vec<StmtLoc>) -> Vec<StmtLoc> {
        let span = self.span;
        let rewritten = self.chain(body);
        let executor_body = vec![StmtLoc::new(
            span,
            Stmt::Try(Box::new(TryStmt {
                block: Block { stmts: rewritten },
                catch: Some(CatchClause {
                    param: Some(self.ident_pattern(StaticStrings::CpsError.into())),
                    body: Block {
                        stmts: vec![StmtLoc::new(
                            span,
                            Stmt::Expr(self.call_ident(
                                StaticStrings::CpsReject.into(),
                                vec![self.ident(StaticStrings::CpsError.into())],
                            )),
                        )],
                    },
                }),
                finally: None,
            })),
        )];
        let executor = self.make_arrow(
            vec![StaticStrings::CpsResolve.into(), StaticStrings::CpsReject.into()],
            executor_body,
        );
        let new_promise = ExprLoc::new(
            span,
            Expr::New {
                callee: Box::new(self.ident(StaticStrings::PromiseCtor.into())),
                args: vec![Argument::Expr(ExprLoc::new(span, Expr::Function(executor)))],
            },
        );
        vec![StmtLoc::new(span, Stmt::Return(Some(new_promise)))]
    }

    /// Rewrites a statement list: everything up to the first await stays,
    /// the await becomes a `then` chain carrying the rest as continuation.
    fn chain(&mut self, stmts: Vec<StmtLoc>) -> Vec<StmtLoc> {
        let span = self.span;
        let mut out = Vec::new();
        let mut iter = stmts.into_iter();
        while let Some(statement) = iter.next() {
            if !stmt_suspends(&statement.stmt) {
                // Plain returns resolve the promise.
                if let Stmt::Return(argument) = statement.stmt {
                    let value = argument.unwrap_or_else(|| self.undefined_expr());
                    out.push(StmtLoc::new(
                        statement.span,
                        Stmt::Expr(self.call_ident(StaticStrings::CpsResolve.into(), vec![value])),
                    ));
                    out.push(StmtLoc::new(statement.span, Stmt::Return(None)));
                    return out;
                }
                out.push(statement);
                continue;
            }

            // The await-bearing statement: extract the awaited expression
            // and how its settlement binds.
            let (awaited, binding) = match statement.stmt {
                Stmt::Expr(e) => match e.expr {
                    Expr::Await(arg) => (*arg, AwaitBinding::Drop),
                    Expr::Assign { target, value, .. } => match (*target, value.expr) {
                        (Pattern::Identifier { name, .. }, Expr::Await(arg)) => {
                            (*arg, AwaitBinding::Assign(name))
                        }
                        _ => unreachable!("checked by eligibility"),
                    },
                    _ => unreachable!("checked by eligibility"),
                },
                Stmt::VarDecl(decl) => {
                    let VarDeclStmt { mut declarators, .. } = decl;
                    let declarator = declarators.remove(0);
                    let Pattern::Identifier { name, .. } = declarator.target else {
                        unreachable!("checked by eligibility");
                    };
                    let Some(init) = declarator.init else {
                        unreachable!("checked by eligibility");
                    };
                    let Expr::Await(arg) = init.expr else {
                        unreachable!("checked by eligibility");
                    };
                    (*arg, AwaitBinding::Declare(name))
                }
                Stmt::Return(Some(e)) => match e.expr {
                    Expr::Await(arg) => (*arg, AwaitBinding::Resolve),
                    _ => unreachable!("checked by eligibility"),
                },
                _ => unreachable!("checked by eligibility"),
            };

            // Build the continuation from everything after the await.
            let rest: Vec<StmtLoc> = iter.collect();
            let (param, mut continuation_body) = match binding {
                AwaitBinding::Drop => (StaticStrings::CpsValue.into(), Vec::new()),
                AwaitBinding::Declare(name) => (name, Vec::new()),
                AwaitBinding::Assign(name) => {
                    let assign = StmtLoc::new(
                        span,
                        Stmt::Expr(ExprLoc::new(
                            span,
                            Expr::Assign {
                                op: crate::ast::AssignOp::Assign,
                                target: Box::new(Pattern::Identifier { name, span }),
                                value: Box::new(self.ident(StaticStrings::CpsValue.into())),
                            },
                        )),
                    );
                    (StaticStrings::CpsValue.into(), vec![assign])
                }
                AwaitBinding::Resolve => {
                    let resolve = StmtLoc::new(
                        span,
                        Stmt::Expr(self.call_ident(
                            StaticStrings::CpsResolve.into(),
                            vec![self.ident(StaticStrings::CpsValue.into())],
                        )),
                    );
                    (StaticStrings::CpsValue.into(), vec![resolve])
                }
            };
            continuation_body.extend(self.chain(rest));
            let continuation = self.make_arrow(vec![param], continuation_body);

            // return __awaitHelper(awaited).then(continuation, __reject);
            let helper_call = self.call_ident(StaticStrings::AwaitHelper.into(), vec![awaited]);
            let then_call = ExprLoc::new(
                span,
                Expr::Call {
                    callee: Box::new(ExprLoc::new(
                        span,
                        Expr::Member {
                            object: Box::new(helper_call),
                            key: MemberKey::Static(StaticStrings::Then.into()),
                            optional: false,
                        },
                    )),
                    args: vec![
                        Argument::Expr(ExprLoc::new(span, Expr::Function(continuation))),
                        Argument::Expr(self.ident(StaticStrings::CpsReject.into())),
                    ],
                    optional: false,
                },
            );
            out.push(StmtLoc::new(span, Stmt::Return(Some(then_call))));
            return out;
        }

        // Fell off the end without a return: resolve with undefined.
        out.push(StmtLoc::new(
            span,
            Stmt::Expr(self.call_ident(StaticStrings::CpsResolve.into(), vec![self.undefined_expr()])),
        ));
        out
    }

    // ==========================
    // Synthesis helpers

    fn make_arrow(&mut self, params: Vec<StringId>, body: Vec<StmtLoc>) -> FunctionId {
        let span = self.span;
        let lexical_names = collect_lexical_names(&body);
        let mut var_names = Vec::new();
        collect_var_names(&body, &mut var_names);
        let def = FunctionDef {
            name: None,
            span,
            params: params
                .iter()
                .map(|&name| ParamDef {
                    pattern: Pattern::Identifier { name, span },
                    span,
                })
                .collect(),
            rest: None,
            body,
            is_arrow: true,
            is_async: false,
            is_generator: false,
            is_strict: self.is_strict,
            is_method: false,
            ctor_kind: CtorKind::None,
            simple_params: true,
            param_names: params,
            lexical_names,
            var_names,
            has_direct_eval_in_params: false,
            cps_body: None,
        };
        let id = FunctionId::new(self.functions.len());
        self.functions.push(def);
        id
    }

    fn ident(&self, name: StringId) -> ExprLoc {
        ExprLoc::new(self.span, Expr::Ident(name))
    }

    fn ident_pattern(&self, name: StringId) -> Pattern {
        Pattern::Identifier { name, span: self.span }
    }

    fn undefined_expr(&self) -> ExprLoc {
        ExprLoc::new(self.span, Expr::Ident(StaticStrings::Undefined.into()))
    }

    fn call_ident(&self, name: StringId, args: Vec<ExprLoc>) -> ExprLoc {
        ExprLoc::new(
            self.span,
            Expr::Call {
                callee: Box::new(self.ident(name)),
                args: args.into_iter().map(Argument::Expr).collect(),
                optional: false,
            },
        )
    }
}

/// How the settled value of one `await` binds into the continuation.
enum AwaitBinding {
    /// `await e;` - value discarded.
    Drop,
    /// `let x = await e;` - the continuation parameter is named `x`.
    Declare(StringId),
    /// `x = await e;` - assigned into the enclosing scope.
    Assign(StringId),
    /// `return await e;` - resolves the promise.
    Resolve,
}
