//! Conversion from the oxc parse tree into the typed AST.
//!
//! Parsing itself is oxc's job; this module walks the parsed program and
//! produces the evaluator's own tree: interned names, flat function table,
//! normalized loops, and per-function metadata (bound-name sets, the
//! simple-parameter flag, direct-eval detection in parameter lists).
//!
//! The conversion is strict: any form the evaluator does not implement
//! (modules, TypeScript-only syntax, JSX, `using` declarations, BigInt)
//! fails with a `SyntaxError` diagnostic instead of producing a partial
//! tree.

use oxc_allocator::Allocator;
use oxc_ast::ast;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

use crate::{
    ast::{
        Argument, ArrayElement, AssignOp, BinaryOp, Block, CatchClause, ClassDef, ClassMember, CtorKind, DeclKind,
        Declarator, Expr, ExprLoc, ForInStmt, ForOfStmt, ForTarget, FunctionDef, Literal, LogicalOp, LoopInit,
        LoopPlan, MemberKey, MethodKind, ObjectPatternProp, ObjectProp, ParamDef, Pattern, PropName, Program, Stmt,
        StmtLoc, SwitchCase, SwitchStmt, TemplateQuasi, TryStmt, UnaryOp, UpdateOp, VarDeclStmt, WithStmt,
    },
    exception::{CodeLoc, Exception, StackFrame},
    intern::{FunctionId, InternerBuilder, StaticStrings, StringId},
    span::{LineCol, SourceSpan},
};

/// Output of a successful build.
#[derive(Debug)]
pub(crate) struct BuildOutput {
    pub program: Program,
    pub functions: Vec<FunctionDef>,
    pub interner: InternerBuilder,
}

/// Parses and converts a script.
pub(crate) fn parse_and_build(source: &str, script_name: &str) -> Result<BuildOutput, Exception> {
    let allocator = Allocator::default();
    let parser_return = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(first) = parser_return.errors.first() {
        return Err(Exception::new(
            "SyntaxError".to_owned(),
            first.to_string(),
            Vec::new(),
        ));
    }
    let program = &parser_return.program;

    let mut builder = AstBuilder::new(source, script_name);
    let strict = program
        .directives
        .iter()
        .any(|d| d.directive.as_str() == "use strict");
    builder.strict = strict;
    let body = match builder.stmt_list(&program.body) {
        Ok(body) => body,
        Err(err) => return Err(builder.into_exception(err)),
    };
    Ok(BuildOutput {
        program: Program { body, strict },
        functions: builder.functions,
        interner: builder.interner,
    })
}

/// A conversion failure with the offending source range.
#[derive(Debug)]
pub(crate) struct BuildError {
    message: String,
    span: Span,
}

impl BuildError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    fn unsupported(what: &str, span: Span) -> Self {
        Self::new(format!("{what} is not supported"), span)
    }
}

struct AstBuilder<'s> {
    source: &'s str,
    script_name: String,
    file: StringId,
    interner: InternerBuilder,
    functions: Vec<FunctionDef>,
    /// Byte offset of each line start, for span conversion.
    line_starts: Vec<u32>,
    /// Strictness of the code currently being converted.
    strict: bool,
    /// Current expression nesting depth, bounded to keep deeply nested
    /// input from overflowing the native stack during conversion.
    depth: u16,
}

/// Maximum nesting depth for AST structures during conversion.
const MAX_NESTING_DEPTH: u16 = 200;

impl<'s> AstBuilder<'s> {
    fn new(source: &'s str, script_name: &str) -> Self {
        let mut interner = InternerBuilder::new();
        let file = interner.intern(script_name);
        let mut line_starts = vec![0u32];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset as u32 + 1);
            }
        }
        Self {
            source,
            script_name: script_name.to_owned(),
            file,
            interner,
            functions: Vec::new(),
            line_starts,
            strict: false,
            depth: 0,
        }
    }

    fn into_exception(self, err: BuildError) -> Exception {
        let span = self.span(err.span);
        let start = span.start();
        Exception::new(
            "SyntaxError".to_owned(),
            err.message,
            vec![StackFrame {
                script_name: self.script_name,
                loc: CodeLoc {
                    line: start.line + 1,
                    column: start.column + 1,
                },
                function: None,
                preview: span.snippet(self.source).map(str::to_owned),
            }],
        )
    }

    fn line_col(&self, offset: u32) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insertion) => insertion - 1,
        };
        LineCol::new(line as u32, offset - self.line_starts[line])
    }

    fn span(&self, span: Span) -> SourceSpan {
        SourceSpan::new(
            self.file,
            self.line_col(span.start),
            self.line_col(span.end),
            span.start,
            span.end,
        )
    }

    fn intern(&mut self, s: &str) -> StringId {
        self.interner.intern(s)
    }

    // ==========================
    // Statements

    fn stmt_list(&mut self, stmts: &[ast::Statement<'_>]) -> Result<Vec<StmtLoc>, BuildError> {
        stmts.iter().map(|st| self.stmt(st)).collect()
    }

    fn stmt(&mut self, st: &ast::Statement<'_>) -> Result<StmtLoc, BuildError> {
        let span = self.span(st.span());
        let stmt = match st {
            ast::Statement::EmptyStatement(_) | ast::Statement::DebuggerStatement(_) => Stmt::Empty,
            ast::Statement::ExpressionStatement(es) => Stmt::Expr(self.expr(&es.expression)?),
            ast::Statement::BlockStatement(block) => Stmt::Block(Block {
                stmts: self.stmt_list(&block.body)?,
            }),
            ast::Statement::VariableDeclaration(decl) => Stmt::VarDecl(self.var_decl(decl)?),
            ast::Statement::FunctionDeclaration(func) => {
                let id = self.function(func, false, CtorKind::None)?;
                Stmt::FunctionDecl(id)
            }
            ast::Statement::ClassDeclaration(class) => Stmt::ClassDecl(Box::new(self.class(class)?)),
            ast::Statement::ReturnStatement(ret) => {
                Stmt::Return(ret.argument.as_ref().map(|arg| self.expr(arg)).transpose()?)
            }
            ast::Statement::IfStatement(st) => Stmt::If {
                test: self.expr(&st.test)?,
                consequent: Box::new(self.stmt(&st.consequent)?),
                alternate: st.alternate.as_ref().map(|alt| self.stmt(alt)).transpose()?.map(Box::new),
            },
            ast::Statement::WhileStatement(st) => Stmt::Loop(Box::new(LoopPlan {
                init: None,
                test: Some(self.expr(&st.test)?),
                update: None,
                body: self.stmt(&st.body)?,
                per_iteration: Vec::new(),
                post_test: false,
            })),
            ast::Statement::DoWhileStatement(st) => Stmt::Loop(Box::new(LoopPlan {
                init: None,
                test: Some(self.expr(&st.test)?),
                update: None,
                body: self.stmt(&st.body)?,
                per_iteration: Vec::new(),
                post_test: true,
            })),
            ast::Statement::ForStatement(st) => self.for_stmt(st)?,
            ast::Statement::ForInStatement(st) => {
                let left = self.for_target(&st.left)?;
                Stmt::ForIn(Box::new(ForInStmt {
                    left,
                    right: self.expr(&st.right)?,
                    body: self.stmt(&st.body)?,
                }))
            }
            ast::Statement::ForOfStatement(st) => {
                let left = self.for_target(&st.left)?;
                Stmt::ForOf(Box::new(ForOfStmt {
                    left,
                    right: self.expr(&st.right)?,
                    body: self.stmt(&st.body)?,
                    is_await: st.r#await,
                }))
            }
            ast::Statement::BreakStatement(st) => Stmt::Break {
                label: st.label.as_ref().map(|l| self.intern(l.name.as_str())),
            },
            ast::Statement::ContinueStatement(st) => Stmt::Continue {
                label: st.label.as_ref().map(|l| self.intern(l.name.as_str())),
            },
            ast::Statement::LabeledStatement(st) => Stmt::Labeled {
                label: self.intern(st.label.name.as_str()),
                body: Box::new(self.stmt(&st.body)?),
            },
            ast::Statement::ThrowStatement(st) => Stmt::Throw(self.expr(&st.argument)?),
            ast::Statement::TryStatement(st) => {
                let block = Block {
                    stmts: self.stmt_list(&st.block.body)?,
                };
                let catch = st
                    .handler
                    .as_ref()
                    .map(|handler| {
                        Ok::<_, BuildError>(CatchClause {
                            param: handler
                                .param
                                .as_ref()
                                .map(|param| self.binding_pattern(&param.pattern))
                                .transpose()?,
                            body: Block {
                                stmts: self.stmt_list(&handler.body.body)?,
                            },
                        })
                    })
                    .transpose()?;
                let finally = st
                    .finalizer
                    .as_ref()
                    .map(|finalizer| {
                        Ok::<_, BuildError>(Block {
                            stmts: self.stmt_list(&finalizer.body)?,
                        })
                    })
                    .transpose()?;
                Stmt::Try(Box::new(TryStmt { block, catch, finally }))
            }
            ast::Statement::SwitchStatement(st) => {
                let discriminant = self.expr(&st.discriminant)?;
                let cases = st
                    .cases
                    .iter()
                    .map(|case| {
                        Ok(SwitchCase {
                            test: case.test.as_ref().map(|t| self.expr(t)).transpose()?,
                            body: self.stmt_list(&case.consequent)?,
                        })
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                Stmt::Switch(Box::new(SwitchStmt { discriminant, cases }))
            }
            ast::Statement::WithStatement(st) => {
                if self.strict {
                    return Err(BuildError::new("'with' statements are not allowed in strict mode", st.span));
                }
                Stmt::With(Box::new(WithStmt {
                    object: self.expr(&st.object)?,
                    body: self.stmt(&st.body)?,
                }))
            }
            ast::Statement::ImportDeclaration(st) => {
                return Err(BuildError::unsupported("module import", st.span));
            }
            ast::Statement::ExportAllDeclaration(st) => {
                return Err(BuildError::unsupported("module export", st.span));
            }
            ast::Statement::ExportDefaultDeclaration(st) => {
                return Err(BuildError::unsupported("module export", st.span));
            }
            ast::Statement::ExportNamedDeclaration(st) => {
                return Err(BuildError::unsupported("module export", st.span));
            }
            other => {
                return Err(BuildError::unsupported("this statement form", other.span()));
            }
        };
        Ok(StmtLoc::new(span, stmt))
    }

    fn var_decl(&mut self, decl: &ast::VariableDeclaration<'_>) -> Result<VarDeclStmt, BuildError> {
        let kind = match decl.kind {
            ast::VariableDeclarationKind::Var => DeclKind::Var,
            ast::VariableDeclarationKind::Let => DeclKind::Let,
            ast::VariableDeclarationKind::Const => DeclKind::Const,
            _ => return Err(BuildError::unsupported("'using' declaration", decl.span)),
        };
        let declarators = decl
            .declarations
            .iter()
            .map(|declarator| {
                Ok(Declarator {
                    span: self.span(declarator.span),
                    target: self.binding_pattern(&declarator.id)?,
                    init: declarator.init.as_ref().map(|init| self.expr(init)).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(VarDeclStmt { kind, declarators })
    }

    fn for_stmt(&mut self, st: &ast::ForStatement<'_>) -> Result<Stmt, BuildError> {
        let (init, per_iteration) = match &st.init {
            None => (None, Vec::new()),
            Some(ast::ForStatementInit::VariableDeclaration(decl)) => {
                let converted = self.var_decl(decl)?;
                let mut per_iteration = Vec::new();
                if converted.kind != DeclKind::Var {
                    for declarator in &converted.declarators {
                        declarator.target.bound_names(&mut per_iteration);
                    }
                }
                (Some(LoopInit::Decl(converted)), per_iteration)
            }
            Some(other) => {
                let expression = other
                    .as_expression()
                    .ok_or_else(|| BuildError::unsupported("this loop initializer", st.span))?;
                (Some(LoopInit::Expr(self.expr(expression)?)), Vec::new())
            }
        };
        Ok(Stmt::Loop(Box::new(LoopPlan {
            init,
            test: st.test.as_ref().map(|t| self.expr(t)).transpose()?,
            update: st.update.as_ref().map(|u| self.expr(u)).transpose()?,
            body: self.stmt(&st.body)?,
            per_iteration,
            post_test: false,
        })))
    }

    fn for_target(&mut self, left: &ast::ForStatementLeft<'_>) -> Result<ForTarget, BuildError> {
        match left {
            ast::ForStatementLeft::VariableDeclaration(decl) => {
                let kind = match decl.kind {
                    ast::VariableDeclarationKind::Var => DeclKind::Var,
                    ast::VariableDeclarationKind::Let => DeclKind::Let,
                    ast::VariableDeclarationKind::Const => DeclKind::Const,
                    _ => return Err(BuildError::unsupported("'using' declaration", decl.span)),
                };
                let declarator = decl
                    .declarations
                    .first()
                    .ok_or_else(|| BuildError::new("missing loop binding", decl.span))?;
                Ok(ForTarget::Decl {
                    kind,
                    pattern: self.binding_pattern(&declarator.id)?,
                })
            }
            other => {
                let target = other
                    .as_assignment_target()
                    .ok_or_else(|| BuildError::unsupported("this loop target", other.span()))?;
                Ok(ForTarget::Pattern(self.assignment_target(target)?))
            }
        }
    }

    // ==========================
    // Patterns

    fn binding_pattern(&mut self, pattern: &ast::BindingPattern<'_>) -> Result<Pattern, BuildError> {
        let span = self.span(pattern.span());
        match &pattern.kind {
            ast::BindingPatternKind::BindingIdentifier(ident) => Ok(Pattern::Identifier {
                name: self.intern(ident.name.as_str()),
                span,
            }),
            ast::BindingPatternKind::ObjectPattern(obj) => {
                let props = obj
                    .properties
                    .iter()
                    .map(|prop| {
                        Ok(ObjectPatternProp {
                            key: self.prop_name(&prop.key)?,
                            value: self.binding_pattern(&prop.value)?,
                        })
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let rest = obj
                    .rest
                    .as_ref()
                    .map(|rest| self.binding_pattern(&rest.argument))
                    .transpose()?
                    .map(Box::new);
                Ok(Pattern::Object { props, rest, span })
            }
            ast::BindingPatternKind::ArrayPattern(arr) => {
                let elements = arr
                    .elements
                    .iter()
                    .map(|element| element.as_ref().map(|e| self.binding_pattern(e)).transpose())
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let rest = arr
                    .rest
                    .as_ref()
                    .map(|rest| self.binding_pattern(&rest.argument))
                    .transpose()?
                    .map(Box::new);
                Ok(Pattern::Array { elements, rest, span })
            }
            ast::BindingPatternKind::AssignmentPattern(assign) => Ok(Pattern::Default {
                target: Box::new(self.binding_pattern(&assign.left)?),
                default: Box::new(self.expr(&assign.right)?),
            }),
        }
    }

    fn assignment_target(&mut self, target: &ast::AssignmentTarget<'_>) -> Result<Pattern, BuildError> {
        if let Some(simple) = target.as_simple_assignment_target() {
            return self.simple_assignment_target(simple);
        }
        match target
            .as_assignment_target_pattern()
            .expect("assignment target is simple or pattern")
        {
            ast::AssignmentTargetPattern::ArrayAssignmentTarget(arr) => {
                let span = self.span(arr.span);
                let elements = arr
                    .elements
                    .iter()
                    .map(|element| {
                        element
                            .as_ref()
                            .map(|e| self.assignment_target_maybe_default(e))
                            .transpose()
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let rest = arr
                    .rest
                    .as_ref()
                    .map(|rest| self.assignment_target(&rest.target))
                    .transpose()?
                    .map(Box::new);
                Ok(Pattern::Array { elements, rest, span })
            }
            ast::AssignmentTargetPattern::ObjectAssignmentTarget(obj) => {
                let span = self.span(obj.span);
                let props = obj
                    .properties
                    .iter()
                    .map(|prop| self.assignment_target_prop(prop))
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let rest = obj
                    .rest
                    .as_ref()
                    .map(|rest| self.assignment_target(&rest.target))
                    .transpose()?
                    .map(Box::new);
                Ok(Pattern::Object { props, rest, span })
            }
        }
    }

    fn assignment_target_maybe_default(
        &mut self,
        target: &ast::AssignmentTargetMaybeDefault<'_>,
    ) -> Result<Pattern, BuildError> {
        match target {
            ast::AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => Ok(Pattern::Default {
                target: Box::new(self.assignment_target(&with_default.binding)?),
                default: Box::new(self.expr(&with_default.init)?),
            }),
            other => {
                let target = other
                    .as_assignment_target()
                    .expect("assignment element is default or target");
                self.assignment_target(target)
            }
        }
    }

    fn assignment_target_prop(
        &mut self,
        prop: &ast::AssignmentTargetProperty<'_>,
    ) -> Result<ObjectPatternProp, BuildError> {
        match prop {
            ast::AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                let span = self.span(p.span);
                let name = self.intern(p.binding.name.as_str());
                let target = Pattern::Identifier { name, span };
                let value = match &p.init {
                    Some(init) => Pattern::Default {
                        target: Box::new(target),
                        default: Box::new(self.expr(init)?),
                    },
                    None => target,
                };
                Ok(ObjectPatternProp {
                    key: PropName::Ident(name),
                    value,
                })
            }
            ast::AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => Ok(ObjectPatternProp {
                key: self.prop_name(&p.name)?,
                value: self.assignment_target_maybe_default(&p.binding)?,
            }),
        }
    }

    fn simple_assignment_target(&mut self, target: &ast::SimpleAssignmentTarget<'_>) -> Result<Pattern, BuildError> {
        match target {
            ast::SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => Ok(Pattern::Identifier {
                name: self.intern(ident.name.as_str()),
                span: self.span(ident.span),
            }),
            other => {
                let member = other
                    .as_member_expression()
                    .ok_or_else(|| BuildError::unsupported("this assignment target", other.span()))?;
                self.member_target(member)
            }
        }
    }

    fn member_target(&mut self, member: &ast::MemberExpression<'_>) -> Result<Pattern, BuildError> {
        let span = self.span(member.span());
        match member {
            ast::MemberExpression::StaticMemberExpression(e) => Ok(Pattern::Member {
                object: Box::new(self.expr(&e.object)?),
                key: MemberKey::Static(self.intern(e.property.name.as_str())),
                span,
            }),
            ast::MemberExpression::ComputedMemberExpression(e) => Ok(Pattern::Member {
                object: Box::new(self.expr(&e.object)?),
                key: MemberKey::Computed(Box::new(self.expr(&e.expression)?)),
                span,
            }),
            ast::MemberExpression::PrivateFieldExpression(e) => Ok(Pattern::Member {
                object: Box::new(self.expr(&e.object)?),
                key: MemberKey::Private(self.intern(e.field.name.as_str())),
                span,
            }),
        }
    }

    // ==========================
    // Expressions

    fn expr(&mut self, expression: &ast::Expression<'_>) -> Result<ExprLoc, BuildError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(BuildError::new("expression nesting is too deep", expression.span()));
        }
        let result = self.expr_inner(expression);
        self.depth -= 1;
        result
    }

    fn expr_inner(&mut self, expression: &ast::Expression<'_>) -> Result<ExprLoc, BuildError> {
        let span = self.span(expression.span());
        let expr = match expression {
            ast::Expression::NullLiteral(_) => Expr::Literal(Literal::Null),
            ast::Expression::BooleanLiteral(lit) => Expr::Literal(Literal::Bool(lit.value)),
            ast::Expression::NumericLiteral(lit) => Expr::Literal(Literal::Number(lit.value)),
            ast::Expression::StringLiteral(lit) => {
                Expr::Literal(Literal::String(self.intern(lit.value.as_str())))
            }
            ast::Expression::BigIntLiteral(lit) => {
                return Err(BuildError::unsupported("BigInt", lit.span));
            }
            ast::Expression::RegExpLiteral(lit) => self.regex_literal(lit.span)?,
            ast::Expression::TemplateLiteral(lit) => self.template(lit)?,
            ast::Expression::TaggedTemplateExpression(tagged) => {
                let tag = Box::new(self.expr(&tagged.tag)?);
                let quasis = tagged
                    .quasi
                    .quasis
                    .iter()
                    .map(|quasi| TemplateQuasi {
                        cooked: quasi.value.cooked.as_ref().map(|c| self.interner.intern(c.as_str())),
                        raw: self.interner.intern(quasi.value.raw.as_str()),
                    })
                    .collect();
                let exprs = tagged
                    .quasi
                    .expressions
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, BuildError>>()?;
                Expr::TaggedTemplate { tag, quasis, exprs }
            }
            ast::Expression::Identifier(ident) => Expr::Ident(self.intern(ident.name.as_str())),
            ast::Expression::ThisExpression(_) => Expr::This,
            ast::Expression::MetaProperty(meta) => {
                if meta.meta.name == "new" && meta.property.name == "target" {
                    Expr::NewTarget
                } else {
                    return Err(BuildError::unsupported("import.meta", meta.span));
                }
            }
            ast::Expression::ArrayExpression(arr) => {
                let elements = arr
                    .elements
                    .iter()
                    .map(|element| match element {
                        ast::ArrayExpressionElement::Elision(_) => Ok(ArrayElement::Hole),
                        ast::ArrayExpressionElement::SpreadElement(spread) => {
                            Ok(ArrayElement::Spread(self.expr(&spread.argument)?))
                        }
                        other => {
                            let e = other.as_expression().expect("array element is an expression");
                            Ok(ArrayElement::Item(self.expr(e)?))
                        }
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                Expr::Array { elements }
            }
            ast::Expression::ObjectExpression(obj) => {
                let props = obj
                    .properties
                    .iter()
                    .map(|prop| self.object_prop(prop))
                    .collect::<Result<Vec<_>, BuildError>>()?;
                Expr::Object { props }
            }
            ast::Expression::FunctionExpression(func) => {
                Expr::Function(self.function(func, false, CtorKind::None)?)
            }
            ast::Expression::ArrowFunctionExpression(arrow) => Expr::Function(self.arrow(arrow)?),
            ast::Expression::ClassExpression(class) => Expr::Class(Box::new(self.class(class)?)),
            ast::Expression::UnaryExpression(unary) => {
                let op = match unary.operator {
                    ast::UnaryOperator::UnaryNegation => UnaryOp::Minus,
                    ast::UnaryOperator::UnaryPlus => UnaryOp::Plus,
                    ast::UnaryOperator::LogicalNot => UnaryOp::Not,
                    ast::UnaryOperator::BitwiseNot => UnaryOp::BitNot,
                    ast::UnaryOperator::Typeof => UnaryOp::TypeOf,
                    ast::UnaryOperator::Void => UnaryOp::Void,
                    ast::UnaryOperator::Delete => UnaryOp::Delete,
                };
                Expr::Unary {
                    op,
                    arg: Box::new(self.expr(&unary.argument)?),
                }
            }
            ast::Expression::UpdateExpression(update) => {
                let op = match update.operator {
                    ast::UpdateOperator::Increment => UpdateOp::Inc,
                    ast::UpdateOperator::Decrement => UpdateOp::Dec,
                };
                Expr::Update {
                    op,
                    prefix: update.prefix,
                    target: Box::new(self.simple_assignment_target(&update.argument)?),
                }
            }
            ast::Expression::BinaryExpression(binary) => Expr::Binary {
                op: binary_op(binary.operator),
                left: Box::new(self.expr(&binary.left)?),
                right: Box::new(self.expr(&binary.right)?),
            },
            ast::Expression::LogicalExpression(logical) => Expr::Logical {
                op: match logical.operator {
                    ast::LogicalOperator::And => LogicalOp::And,
                    ast::LogicalOperator::Or => LogicalOp::Or,
                    ast::LogicalOperator::Coalesce => LogicalOp::Nullish,
                },
                left: Box::new(self.expr(&logical.left)?),
                right: Box::new(self.expr(&logical.right)?),
            },
            ast::Expression::ConditionalExpression(cond) => Expr::Conditional {
                test: Box::new(self.expr(&cond.test)?),
                consequent: Box::new(self.expr(&cond.consequent)?),
                alternate: Box::new(self.expr(&cond.alternate)?),
            },
            ast::Expression::AssignmentExpression(assign) => {
                let op = assignment_op(assign.operator)
                    .ok_or_else(|| BuildError::unsupported("this assignment operator", assign.span))?;
                Expr::Assign {
                    op,
                    target: Box::new(self.assignment_target(&assign.left)?),
                    value: Box::new(self.expr(&assign.right)?),
                }
            }
            ast::Expression::SequenceExpression(seq) => Expr::Sequence {
                exprs: seq
                    .expressions
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, BuildError>>()?,
            },
            ast::Expression::CallExpression(call) => self.call(call)?,
            ast::Expression::NewExpression(new) => Expr::New {
                callee: Box::new(self.expr(&new.callee)?),
                args: self.arguments(&new.arguments)?,
            },
            ast::Expression::StaticMemberExpression(member) => {
                let key = MemberKey::Static(self.intern(member.property.name.as_str()));
                self.member(&member.object, key, member.optional)?
            }
            ast::Expression::ComputedMemberExpression(member) => {
                let key = MemberKey::Computed(Box::new(self.expr(&member.expression)?));
                self.member(&member.object, key, member.optional)?
            }
            ast::Expression::PrivateFieldExpression(member) => {
                let key = MemberKey::Private(self.intern(member.field.name.as_str()));
                self.member(&member.object, key, member.optional)?
            }
            ast::Expression::ChainExpression(chain) => {
                let inner = self.chain_element(&chain.expression)?;
                Expr::Chain(Box::new(inner))
            }
            ast::Expression::ParenthesizedExpression(paren) => return self.expr(&paren.expression),
            ast::Expression::AwaitExpression(await_expr) => {
                Expr::Await(Box::new(self.expr(&await_expr.argument)?))
            }
            ast::Expression::YieldExpression(yield_expr) => Expr::Yield {
                arg: yield_expr
                    .argument
                    .as_ref()
                    .map(|arg| self.expr(arg))
                    .transpose()?
                    .map(Box::new),
                delegate: yield_expr.delegate,
            },
            ast::Expression::PrivateInExpression(private_in) => Expr::PrivateIn {
                name: self.intern(private_in.left.name.as_str()),
                object: Box::new(self.expr(&private_in.right)?),
            },
            ast::Expression::Super(sup) => {
                return Err(BuildError::new("'super' is only valid in calls and member access", sup.span));
            }
            other => {
                return Err(BuildError::unsupported("this expression form", other.span()));
            }
        };
        Ok(ExprLoc::new(span, expr))
    }

    /// Regex literals are sliced out of the source text (`/pattern/flags`)
    /// so no regex parsing happens here; the realm builds an inert object.
    fn regex_literal(&mut self, span: Span) -> Result<Expr, BuildError> {
        let raw = &self.source[span.start as usize..span.end as usize];
        let close = raw
            .rfind('/')
            .ok_or_else(|| BuildError::new("malformed regex literal", span))?;
        let source = self.interner.intern(&raw[1..close]);
        let flags = self.interner.intern(&raw[close + 1..]);
        Ok(Expr::Regex { source, flags })
    }

    fn template(&mut self, lit: &ast::TemplateLiteral<'_>) -> Result<Expr, BuildError> {
        let quasis = lit
            .quasis
            .iter()
            .map(|quasi| {
                let cooked = quasi
                    .value
                    .cooked
                    .as_ref()
                    .ok_or_else(|| BuildError::new("invalid escape sequence in template literal", quasi.span))?;
                Ok(self.interner.intern(cooked.as_str()))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        let exprs = lit
            .expressions
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Expr::Template { quasis, exprs })
    }

    fn member(
        &mut self,
        object: &ast::Expression<'_>,
        key: MemberKey,
        optional: bool,
    ) -> Result<Expr, BuildError> {
        if matches!(object, ast::Expression::Super(_)) {
            if optional {
                return Err(BuildError::new("'super' cannot be used with optional chaining", object.span()));
            }
            return Ok(Expr::SuperMember { key });
        }
        Ok(Expr::Member {
            object: Box::new(self.expr(object)?),
            key,
            optional,
        })
    }

    fn call(&mut self, call: &ast::CallExpression<'_>) -> Result<Expr, BuildError> {
        if matches!(&call.callee, ast::Expression::Super(_)) {
            if call.optional {
                return Err(BuildError::new("'super' cannot be used with optional chaining", call.span));
            }
            return Ok(Expr::SuperCall(self.arguments(&call.arguments)?));
        }
        Ok(Expr::Call {
            callee: Box::new(self.expr(&call.callee)?),
            args: self.arguments(&call.arguments)?,
            optional: call.optional,
        })
    }

    fn chain_element(&mut self, element: &ast::ChainElement<'_>) -> Result<ExprLoc, BuildError> {
        let span = self.span(element.span());
        let expr = match element {
            ast::ChainElement::CallExpression(call) => self.call(call)?,
            ast::ChainElement::TSNonNullExpression(e) => return self.expr(&e.expression),
            other => {
                let member = other.as_member_expression().expect("chain element is call or member");
                match member {
                    ast::MemberExpression::StaticMemberExpression(e) => {
                        let key = MemberKey::Static(self.intern(e.property.name.as_str()));
                        self.member(&e.object, key, e.optional)?
                    }
                    ast::MemberExpression::ComputedMemberExpression(e) => {
                        let key = MemberKey::Computed(Box::new(self.expr(&e.expression)?));
                        self.member(&e.object, key, e.optional)?
                    }
                    ast::MemberExpression::PrivateFieldExpression(e) => {
                        let key = MemberKey::Private(self.intern(e.field.name.as_str()));
                        self.member(&e.object, key, e.optional)?
                    }
                }
            }
        };
        Ok(ExprLoc::new(span, expr))
    }

    fn arguments(&mut self, args: &[ast::Argument<'_>]) -> Result<Vec<Argument>, BuildError> {
        args.iter()
            .map(|arg| match arg {
                ast::Argument::SpreadElement(spread) => Ok(Argument::Spread(self.expr(&spread.argument)?)),
                other => {
                    let e = other.as_expression().expect("argument is an expression");
                    Ok(Argument::Expr(self.expr(e)?))
                }
            })
            .collect()
    }

    fn object_prop(&mut self, prop: &ast::ObjectPropertyKind<'_>) -> Result<ObjectProp, BuildError> {
        match prop {
            ast::ObjectPropertyKind::SpreadProperty(spread) => Ok(ObjectProp::Spread(self.expr(&spread.argument)?)),
            ast::ObjectPropertyKind::ObjectProperty(p) => {
                let key = self.prop_name(&p.key)?;
                match p.kind {
                    ast::PropertyKind::Init => {
                        let value = if p.method {
                            let func = match &p.value {
                                ast::Expression::FunctionExpression(func) => {
                                    self.function(func, true, CtorKind::None)?
                                }
                                other => {
                                    return Err(BuildError::new("method value must be a function", other.span()));
                                }
                            };
                            ExprLoc::new(self.span(p.value.span()), Expr::Function(func))
                        } else {
                            self.expr(&p.value)?
                        };
                        Ok(ObjectProp::Init { key, value })
                    }
                    ast::PropertyKind::Get => {
                        let func = self.accessor_function(&p.value)?;
                        Ok(ObjectProp::Getter { key, func })
                    }
                    ast::PropertyKind::Set => {
                        let func = self.accessor_function(&p.value)?;
                        Ok(ObjectProp::Setter { key, func })
                    }
                }
            }
        }
    }

    fn accessor_function(&mut self, value: &ast::Expression<'_>) -> Result<FunctionId, BuildError> {
        match value {
            ast::Expression::FunctionExpression(func) => self.function(func, true, CtorKind::None),
            other => Err(BuildError::new("accessor value must be a function", other.span())),
        }
    }

    fn prop_name(&mut self, key: &ast::PropertyKey<'_>) -> Result<PropName, BuildError> {
        match key {
            ast::PropertyKey::StaticIdentifier(ident) => Ok(PropName::Ident(self.intern(ident.name.as_str()))),
            ast::PropertyKey::PrivateIdentifier(ident) => Ok(PropName::Private(self.intern(ident.name.as_str()))),
            other => {
                let e = other.as_expression().expect("property key is an expression");
                match e {
                    ast::Expression::StringLiteral(lit) => Ok(PropName::Ident(self.intern(lit.value.as_str()))),
                    ast::Expression::NumericLiteral(lit) => Ok(PropName::Num(lit.value)),
                    _ => Ok(PropName::Computed(Box::new(self.expr(e)?))),
                }
            }
        }
    }

    // ==========================
    // Functions and classes

    fn function(
        &mut self,
        func: &ast::Function<'_>,
        is_method: bool,
        ctor_kind: CtorKind,
    ) -> Result<FunctionId, BuildError> {
        let body = func
            .body
            .as_ref()
            .ok_or_else(|| BuildError::unsupported("function declaration without body", func.span))?;
        let is_strict = self.strict || body.has_use_strict_directive();
        let name = func.id.as_ref().map(|ident| self.intern(ident.name.as_str()));

        let outer_strict = std::mem::replace(&mut self.strict, is_strict);
        let result = self.finish_function(FunctionParts {
            name,
            span: func.span,
            params: &func.params,
            body: &body.statements,
            is_arrow: false,
            is_async: func.r#async,
            is_generator: func.generator,
            is_strict,
            is_method,
            ctor_kind,
            expression_body: false,
        });
        self.strict = outer_strict;
        result
    }

    fn arrow(&mut self, arrow: &ast::ArrowFunctionExpression<'_>) -> Result<FunctionId, BuildError> {
        let is_strict = self.strict || arrow.body.has_use_strict_directive();
        let outer_strict = std::mem::replace(&mut self.strict, is_strict);
        let result = self.finish_function(FunctionParts {
            name: None,
            span: arrow.span,
            params: &arrow.params,
            body: &arrow.body.statements,
            is_arrow: true,
            is_async: arrow.r#async,
            is_generator: false,
            is_strict,
            is_method: false,
            ctor_kind: CtorKind::None,
            expression_body: arrow.expression,
        });
        self.strict = outer_strict;
        result
    }

    fn finish_function(&mut self, parts: FunctionParts<'_, '_>) -> Result<FunctionId, BuildError> {
        let mut params = Vec::with_capacity(parts.params.items.len());
        let mut param_names = Vec::new();
        let mut simple_params = true;
        for item in &parts.params.items {
            let pattern = self.binding_pattern(&item.pattern)?;
            if !matches!(pattern, Pattern::Identifier { .. }) {
                simple_params = false;
            }
            pattern.bound_names(&mut param_names);
            params.push(ParamDef {
                pattern,
                span: self.span(item.span),
            });
        }
        let rest = parts
            .params
            .rest
            .as_ref()
            .map(|rest| self.binding_pattern(&rest.argument))
            .transpose()?;
        if rest.is_some() {
            simple_params = false;
            if let Some(rest) = &rest {
                rest.bound_names(&mut param_names);
            }
        }

        let body = if parts.expression_body {
            // Concise arrow body: a single expression statement becomes the
            // return value.
            let statement = parts
                .body
                .first()
                .ok_or_else(|| BuildError::new("empty arrow body", parts.span))?;
            match statement {
                ast::Statement::ExpressionStatement(es) => {
                    let value = self.expr(&es.expression)?;
                    let span = value.span;
                    vec![StmtLoc::new(span, Stmt::Return(Some(value)))]
                }
                other => return Err(BuildError::new("malformed arrow body", other.span())),
            }
        } else {
            self.stmt_list(parts.body)?
        };

        let lexical_names = collect_lexical_names(&body);
        let mut var_names = Vec::new();
        collect_var_names(&body, &mut var_names);
        let has_direct_eval_in_params = params
            .iter()
            .any(|p| pattern_contains_direct_eval(&p.pattern))
            || rest.as_ref().is_some_and(pattern_contains_direct_eval);

        let def = FunctionDef {
            name: parts.name,
            span: self.span(parts.span),
            params,
            rest,
            body,
            is_arrow: parts.is_arrow,
            is_async: parts.is_async,
            is_generator: parts.is_generator,
            is_strict: parts.is_strict,
            is_method: parts.is_method,
            ctor_kind: parts.ctor_kind,
            simple_params,
            param_names,
            lexical_names,
            var_names,
            has_direct_eval_in_params,
            cps_body: None,
        };
        let id = FunctionId::new(self.functions.len());
        self.functions.push(def);
        Ok(id)
    }

    fn class(&mut self, class: &ast::Class<'_>) -> Result<ClassDef, BuildError> {
        // Class bodies are always strict.
        let outer_strict = std::mem::replace(&mut self.strict, true);
        let result = self.class_inner(class);
        self.strict = outer_strict;
        result
    }

    fn class_inner(&mut self, class: &ast::Class<'_>) -> Result<ClassDef, BuildError> {
        let name = class.id.as_ref().map(|ident| self.intern(ident.name.as_str()));
        let super_class = class
            .super_class
            .as_ref()
            .map(|superclass| self.expr(superclass))
            .transpose()?;
        let ctor_kind = if super_class.is_some() {
            CtorKind::Derived
        } else {
            CtorKind::Base
        };

        let mut ctor = None;
        let mut members = Vec::new();
        let mut private_names = Vec::new();
        for element in &class.body.body {
            match element {
                ast::ClassElement::StaticBlock(static_block) => {
                    members.push(ClassMember::StaticBlock(self.stmt_list(&static_block.body)?));
                }
                ast::ClassElement::MethodDefinition(method) => {
                    let key = self.prop_name(&method.key)?;
                    if let PropName::Private(name) = &key {
                        private_names.push(*name);
                    }
                    match method.kind {
                        ast::MethodDefinitionKind::Constructor => {
                            ctor = Some(self.function(&method.value, true, ctor_kind)?);
                        }
                        ast::MethodDefinitionKind::Method => {
                            members.push(ClassMember::Method {
                                key,
                                func: self.function(&method.value, true, CtorKind::None)?,
                                kind: MethodKind::Method,
                                is_static: method.r#static,
                            });
                        }
                        ast::MethodDefinitionKind::Get => {
                            members.push(ClassMember::Method {
                                key,
                                func: self.function(&method.value, true, CtorKind::None)?,
                                kind: MethodKind::Getter,
                                is_static: method.r#static,
                            });
                        }
                        ast::MethodDefinitionKind::Set => {
                            members.push(ClassMember::Method {
                                key,
                                func: self.function(&method.value, true, CtorKind::None)?,
                                kind: MethodKind::Setter,
                                is_static: method.r#static,
                            });
                        }
                    }
                }
                ast::ClassElement::PropertyDefinition(field) => {
                    let key = self.prop_name(&field.key)?;
                    if let PropName::Private(name) = &key {
                        private_names.push(*name);
                    }
                    members.push(ClassMember::Field {
                        key,
                        value: field.value.as_ref().map(|v| self.expr(v)).transpose()?,
                        is_static: field.r#static,
                        span: self.span(field.span),
                    });
                }
                other => {
                    return Err(BuildError::unsupported("this class member", other.span()));
                }
            }
        }

        let ctor = match ctor {
            Some(ctor) => ctor,
            None => self.default_constructor(name, ctor_kind, class.span),
        };

        Ok(ClassDef {
            name,
            span: self.span(class.span),
            super_class,
            ctor: Some(ctor),
            members,
            private_names,
        })
    }

    /// Synthesizes the implicit constructor of a class without one:
    /// `constructor() {}` for base classes, `constructor(...args) {
    /// super(...args); }` for derived classes.
    fn default_constructor(&mut self, name: Option<StringId>, ctor_kind: CtorKind, span: Span) -> FunctionId {
        let source_span = self.span(span);
        let (rest, body, param_names) = if ctor_kind == CtorKind::Derived {
            let args_name = self.interner.intern("args");
            let args_ident = ExprLoc::new(source_span, Expr::Ident(args_name));
            let super_call = ExprLoc::new(source_span, Expr::SuperCall(vec![Argument::Spread(args_ident)]));
            (
                Some(Pattern::Identifier {
                    name: args_name,
                    span: source_span,
                }),
                vec![StmtLoc::new(source_span, Stmt::Expr(super_call))],
                vec![args_name],
            )
        } else {
            (None, Vec::new(), Vec::new())
        };
        let def = FunctionDef {
            name,
            span: source_span,
            params: Vec::new(),
            rest,
            body,
            is_arrow: false,
            is_async: false,
            is_generator: false,
            is_strict: true,
            is_method: true,
            ctor_kind,
            simple_params: ctor_kind != CtorKind::Derived,
            param_names,
            lexical_names: Vec::new(),
            var_names: Vec::new(),
            has_direct_eval_in_params: false,
            cps_body: None,
        };
        let id = FunctionId::new(self.functions.len());
        self.functions.push(def);
        id
    }
}

/// Bundled arguments for `finish_function`, covering plain functions,
/// methods and arrows.
struct FunctionParts<'a, 'b> {
    name: Option<StringId>,
    span: Span,
    params: &'a ast::FormalParameters<'b>,
    body: &'a [ast::Statement<'b>],
    is_arrow: bool,
    is_async: bool,
    is_generator: bool,
    is_strict: bool,
    is_method: bool,
    ctor_kind: CtorKind,
    expression_body: bool,
}

fn binary_op(op: ast::BinaryOperator) -> BinaryOp {
    match op {
        ast::BinaryOperator::Equality => BinaryOp::Eq,
        ast::BinaryOperator::Inequality => BinaryOp::NotEq,
        ast::BinaryOperator::StrictEquality => BinaryOp::StrictEq,
        ast::BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
        ast::BinaryOperator::LessThan => BinaryOp::Lt,
        ast::BinaryOperator::LessEqualThan => BinaryOp::LtE,
        ast::BinaryOperator::GreaterThan => BinaryOp::Gt,
        ast::BinaryOperator::GreaterEqualThan => BinaryOp::GtE,
        ast::BinaryOperator::ShiftLeft => BinaryOp::ShiftLeft,
        ast::BinaryOperator::ShiftRight => BinaryOp::ShiftRight,
        ast::BinaryOperator::ShiftRightZeroFill => BinaryOp::ShiftRightZero,
        ast::BinaryOperator::Addition => BinaryOp::Add,
        ast::BinaryOperator::Subtraction => BinaryOp::Sub,
        ast::BinaryOperator::Multiplication => BinaryOp::Mul,
        ast::BinaryOperator::Division => BinaryOp::Div,
        ast::BinaryOperator::Remainder => BinaryOp::Rem,
        ast::BinaryOperator::BitwiseOR => BinaryOp::BitOr,
        ast::BinaryOperator::BitwiseXOR => BinaryOp::BitXor,
        ast::BinaryOperator::BitwiseAnd => BinaryOp::BitAnd,
        ast::BinaryOperator::In => BinaryOp::In,
        ast::BinaryOperator::Instanceof => BinaryOp::InstanceOf,
        ast::BinaryOperator::Exponential => BinaryOp::Exp,
    }
}

fn assignment_op(op: ast::AssignmentOperator) -> Option<AssignOp> {
    Some(match op {
        ast::AssignmentOperator::Assign => AssignOp::Assign,
        ast::AssignmentOperator::Addition => AssignOp::Op(BinaryOp::Add),
        ast::AssignmentOperator::Subtraction => AssignOp::Op(BinaryOp::Sub),
        ast::AssignmentOperator::Multiplication => AssignOp::Op(BinaryOp::Mul),
        ast::AssignmentOperator::Division => AssignOp::Op(BinaryOp::Div),
        ast::AssignmentOperator::Remainder => AssignOp::Op(BinaryOp::Rem),
        ast::AssignmentOperator::Exponential => AssignOp::Op(BinaryOp::Exp),
        ast::AssignmentOperator::ShiftLeft => AssignOp::Op(BinaryOp::ShiftLeft),
        ast::AssignmentOperator::ShiftRight => AssignOp::Op(BinaryOp::ShiftRight),
        ast::AssignmentOperator::ShiftRightZeroFill => AssignOp::Op(BinaryOp::ShiftRightZero),
        ast::AssignmentOperator::BitwiseOR => AssignOp::Op(BinaryOp::BitOr),
        ast::AssignmentOperator::BitwiseXOR => AssignOp::Op(BinaryOp::BitXor),
        ast::AssignmentOperator::BitwiseAnd => AssignOp::Op(BinaryOp::BitAnd),
        ast::AssignmentOperator::LogicalAnd => AssignOp::Logical(LogicalOp::And),
        ast::AssignmentOperator::LogicalOr => AssignOp::Logical(LogicalOp::Or),
        ast::AssignmentOperator::LogicalNullish => AssignOp::Logical(LogicalOp::Nullish),
    })
}

/// Top-level `let`/`const`/`class` names of a statement list.
pub(crate) fn collect_lexical_names(stmts: &[StmtLoc]) -> Vec<StringId> {
    let mut names = Vec::new();
    for statement in stmts {
        match &statement.stmt {
            Stmt::VarDecl(decl) if decl.kind != DeclKind::Var => {
                for declarator in &decl.declarators {
                    declarator.target.bound_names(&mut names);
                }
            }
            Stmt::ClassDecl(class) => {
                if let Some(name) = class.name {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// `var`-declared names of a statement list, recursing through nested
/// statements but never into nested functions.
pub(crate) fn collect_var_names(stmts: &[StmtLoc], out: &mut Vec<StringId>) {
    for statement in stmts {
        collect_var_names_stmt(&statement.stmt, out);
    }
}

fn collect_var_names_stmt(stmt: &Stmt, out: &mut Vec<StringId>) {
    match stmt {
        Stmt::VarDecl(decl) => {
            if decl.kind == DeclKind::Var {
                for declarator in &decl.declarators {
                    declarator.target.bound_names(out);
                }
            }
        }
        Stmt::Block(block) => collect_var_names(&block.stmts, out),
        Stmt::If {
            consequent, alternate, ..
        } => {
            collect_var_names_stmt(&consequent.stmt, out);
            if let Some(alternate) = alternate {
                collect_var_names_stmt(&alternate.stmt, out);
            }
        }
        Stmt::Loop(plan) => {
            if let Some(LoopInit::Decl(decl)) = &plan.init
                && decl.kind == DeclKind::Var
            {
                for declarator in &decl.declarators {
                    declarator.target.bound_names(out);
                }
            }
            collect_var_names_stmt(&plan.body.stmt, out);
        }
        Stmt::ForIn(st) => {
            if let ForTarget::Decl {
                kind: DeclKind::Var,
                pattern,
            } = &st.left
            {
                pattern.bound_names(out);
            }
            collect_var_names_stmt(&st.body.stmt, out);
        }
        Stmt::ForOf(st) => {
            if let ForTarget::Decl {
                kind: DeclKind::Var,
                pattern,
            } = &st.left
            {
                pattern.bound_names(out);
            }
            collect_var_names_stmt(&st.body.stmt, out);
        }
        Stmt::Labeled { body, .. } => collect_var_names_stmt(&body.stmt, out),
        Stmt::With(st) => collect_var_names_stmt(&st.body.stmt, out),
        Stmt::Try(st) => {
            collect_var_names(&st.block.stmts, out);
            if let Some(catch) = &st.catch {
                collect_var_names(&catch.body.stmts, out);
            }
            if let Some(finally) = &st.finally {
                collect_var_names(&finally.stmts, out);
            }
        }
        Stmt::Switch(st) => {
            for case in &st.cases {
                collect_var_names(&case.body, out);
            }
        }
        _ => {}
    }
}

/// Detects a syntactic direct `eval(...)` call inside a parameter pattern's
/// default expressions.
fn pattern_contains_direct_eval(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Identifier { .. } | Pattern::Member { .. } => false,
        Pattern::Array { elements, rest, .. } => {
            elements
                .iter()
                .flatten()
                .any(pattern_contains_direct_eval)
                || rest.as_deref().is_some_and(pattern_contains_direct_eval)
        }
        Pattern::Object { props, rest, .. } => {
            props.iter().any(|p| pattern_contains_direct_eval(&p.value))
                || rest.as_deref().is_some_and(pattern_contains_direct_eval)
        }
        Pattern::Default { target, default } => {
            pattern_contains_direct_eval(target) || expr_contains_direct_eval(&default.expr)
        }
    }
}

fn expr_contains_direct_eval(expr: &Expr) -> bool {
    let eval_name: StringId = StaticStrings::Eval.into();
    match expr {
        Expr::Call { callee, args, .. } => {
            if matches!(&callee.expr, Expr::Ident(name) if *name == eval_name) {
                return true;
            }
            expr_contains_direct_eval(&callee.expr)
                || args.iter().any(|arg| match arg {
                    Argument::Expr(e) | Argument::Spread(e) => expr_contains_direct_eval(&e.expr),
                })
        }
        Expr::Unary { arg, .. } | Expr::Await(arg) | Expr::Chain(arg) => expr_contains_direct_eval(&arg.expr),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            expr_contains_direct_eval(&left.expr) || expr_contains_direct_eval(&right.expr)
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            expr_contains_direct_eval(&test.expr)
                || expr_contains_direct_eval(&consequent.expr)
                || expr_contains_direct_eval(&alternate.expr)
        }
        Expr::Assign { value, .. } => expr_contains_direct_eval(&value.expr),
        Expr::Sequence { exprs } => exprs.iter().any(|e| expr_contains_direct_eval(&e.expr)),
        Expr::Member { object, key, .. } => {
            expr_contains_direct_eval(&object.expr)
                || matches!(key, MemberKey::Computed(e) if expr_contains_direct_eval(&e.expr))
        }
        Expr::New { callee, args } => {
            expr_contains_direct_eval(&callee.expr)
                || args.iter().any(|arg| match arg {
                    Argument::Expr(e) | Argument::Spread(e) => expr_contains_direct_eval(&e.expr),
                })
        }
        Expr::Array { elements } => elements.iter().any(|element| match element {
            ArrayElement::Item(e) | ArrayElement::Spread(e) => expr_contains_direct_eval(&e.expr),
            ArrayElement::Hole => false,
        }),
        Expr::Object { props } => props.iter().any(|prop| match prop {
            ObjectProp::Init { value, .. } => expr_contains_direct_eval(&value.expr),
            ObjectProp::Spread(e) => expr_contains_direct_eval(&e.expr),
            ObjectProp::Getter { .. } | ObjectProp::Setter { .. } => false,
        }),
        Expr::Template { exprs, .. } => exprs.iter().any(|e| expr_contains_direct_eval(&e.expr)),
        _ => false,
    }
}
