//! Constant folding: a pure rewrite over the typed AST that collapses
//! literal-only subexpressions before the program snapshot is taken.
//!
//! Folding is behavior-preserving: only operand combinations whose result is
//! fully defined by the literals themselves are folded (numeric arithmetic,
//! string concatenation, literal comparisons, short-circuits on literal
//! left-hand sides, literal ternary tests). Everything with observable
//! evaluation order or coercion through objects is left alone.

use crate::{
    ast::{
        Argument, ArrayElement, BinaryOp, Expr, ExprLoc, ForTarget, FunctionDef, Literal, LogicalOp, LoopInit,
        MemberKey, ObjectProp, Pattern, Program, PropName, Stmt, StmtLoc, UnaryOp,
    },
    intern::InternerBuilder,
    value::{number_to_string, parse_js_number, to_int32, to_uint32},
};

/// Folds the whole program and every function body in place.
pub(crate) fn fold(program: &mut Program, functions: &mut [FunctionDef], interner: &mut InternerBuilder) {
    let mut folder = Folder { interner };
    folder.stmts(&mut program.body);
    for def in functions.iter_mut() {
        folder.stmts(&mut def.body);
        for param in &mut def.params {
            folder.pattern(&mut param.pattern);
        }
        if let Some(rest) = &mut def.rest {
            folder.pattern(rest);
        }
    }
}

struct Folder<'a> {
    interner: &'a mut InternerBuilder,
}

impl Folder<'_> {
    fn stmts(&mut self, stmts: &mut [StmtLoc]) {
        for statement in stmts {
            self.stmt(&mut statement.stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr(e) | Stmt::Throw(e) => self.expr(e),
            Stmt::Return(Some(e)) => self.expr(e),
            Stmt::VarDecl(decl) => {
                for declarator in &mut decl.declarators {
                    self.pattern(&mut declarator.target);
                    if let Some(init) = &mut declarator.init {
                        self.expr(init);
                    }
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.stmt(&mut consequent.stmt);
                if let Some(alternate) = alternate {
                    self.stmt(&mut alternate.stmt);
                }
            }
            Stmt::Block(block) => self.stmts(&mut block.stmts),
            Stmt::Loop(plan) => {
                match &mut plan.init {
                    Some(LoopInit::Decl(decl)) => {
                        for declarator in &mut decl.declarators {
                            self.pattern(&mut declarator.target);
                            if let Some(init) = &mut declarator.init {
                                self.expr(init);
                            }
                        }
                    }
                    Some(LoopInit::Expr(e)) => self.expr(e),
                    None => {}
                }
                if let Some(test) = &mut plan.test {
                    self.expr(test);
                }
                if let Some(update) = &mut plan.update {
                    self.expr(update);
                }
                self.stmt(&mut plan.body.stmt);
            }
            Stmt::ForIn(st) => {
                self.for_target(&mut st.left);
                self.expr(&mut st.right);
                self.stmt(&mut st.body.stmt);
            }
            Stmt::ForOf(st) => {
                self.for_target(&mut st.left);
                self.expr(&mut st.right);
                self.stmt(&mut st.body.stmt);
            }
            Stmt::Labeled { body, .. } => self.stmt(&mut body.stmt),
            Stmt::Try(st) => {
                self.stmts(&mut st.block.stmts);
                if let Some(catch) = &mut st.catch {
                    if let Some(param) = &mut catch.param {
                        self.pattern(param);
                    }
                    self.stmts(&mut catch.body.stmts);
                }
                if let Some(finally) = &mut st.finally {
                    self.stmts(&mut finally.stmts);
                }
            }
            Stmt::Switch(st) => {
                self.expr(&mut st.discriminant);
                for case in &mut st.cases {
                    if let Some(test) = &mut case.test {
                        self.expr(test);
                    }
                    self.stmts(&mut case.body);
                }
            }
            Stmt::With(st) => {
                self.expr(&mut st.object);
                self.stmt(&mut st.body.stmt);
            }
            Stmt::ClassDecl(class) => self.class(class),
            Stmt::Empty | Stmt::FunctionDecl(_) | Stmt::Return(None) | Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn class(&mut self, class: &mut crate::ast::ClassDef) {
        if let Some(superclass) = &mut class.super_class {
            self.expr(superclass);
        }
        for member in &mut class.members {
            match member {
                crate::ast::ClassMember::Field { key, value, .. } => {
                    if let PropName::Computed(e) = key {
                        self.expr(e);
                    }
                    if let Some(value) = value {
                        self.expr(value);
                    }
                }
                crate::ast::ClassMember::Method { key, .. } => {
                    if let PropName::Computed(e) = key {
                        self.expr(e);
                    }
                }
                crate::ast::ClassMember::StaticBlock(stmts) => self.stmts(stmts),
            }
        }
    }

    fn for_target(&mut self, target: &mut ForTarget) {
        match target {
            ForTarget::Decl { pattern, .. } | ForTarget::Pattern(pattern) => self.pattern(pattern),
        }
    }

    fn pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Identifier { .. } => {}
            Pattern::Array { elements, rest, .. } => {
                for element in elements.iter_mut().flatten() {
                    self.pattern(element);
                }
                if let Some(rest) = rest {
                    self.pattern(rest);
                }
            }
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    if let PropName::Computed(e) = &mut prop.key {
                        self.expr(e);
                    }
                    self.pattern(&mut prop.value);
                }
                if let Some(rest) = rest {
                    self.pattern(rest);
                }
            }
            Pattern::Default { target, default } => {
                self.pattern(target);
                self.expr(default);
            }
            Pattern::Member { object, key, .. } => {
                self.expr(object);
                if let MemberKey::Computed(e) = key {
                    self.expr(e);
                }
            }
        }
    }

    fn expr(&mut self, expr_loc: &mut ExprLoc) {
        // Fold children first, then try to collapse this node.
        match &mut expr_loc.expr {
            Expr::Unary { arg, .. } | Expr::Await(arg) | Expr::Chain(arg) => self.expr(arg),
            Expr::Update { target, .. } => self.pattern(target),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Assign { target, value, .. } => {
                self.pattern(target);
                self.expr(value);
            }
            Expr::Sequence { exprs } => {
                for e in exprs {
                    self.expr(e);
                }
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                self.args(args);
            }
            Expr::New { callee, args } => {
                self.expr(callee);
                self.args(args);
            }
            Expr::SuperCall(args) => self.args(args),
            Expr::Member { object, key, .. } => {
                self.expr(object);
                if let MemberKey::Computed(e) = key {
                    self.expr(e);
                }
            }
            Expr::SuperMember { key } => {
                if let MemberKey::Computed(e) = key {
                    self.expr(e);
                }
            }
            Expr::Array { elements } => {
                for element in elements {
                    match element {
                        ArrayElement::Item(e) | ArrayElement::Spread(e) => self.expr(e),
                        ArrayElement::Hole => {}
                    }
                }
            }
            Expr::Object { props } => {
                for prop in props {
                    match prop {
                        ObjectProp::Init { key, value } => {
                            if let PropName::Computed(e) = key {
                                self.expr(e);
                            }
                            self.expr(value);
                        }
                        ObjectProp::Getter { key, .. } | ObjectProp::Setter { key, .. } => {
                            if let PropName::Computed(e) = key {
                                self.expr(e);
                            }
                        }
                        ObjectProp::Spread(e) => self.expr(e),
                    }
                }
            }
            Expr::Template { exprs, .. } | Expr::TaggedTemplate { exprs, .. } => {
                for e in exprs {
                    self.expr(e);
                }
            }
            Expr::Yield { arg: Some(arg), .. } => self.expr(arg),
            Expr::PrivateIn { object, .. } => self.expr(object),
            Expr::Class(class) => self.class(class),
            _ => {}
        }

        if let Some(folded) = self.try_fold(&expr_loc.expr) {
            expr_loc.expr = folded;
        }
    }

    fn args(&mut self, args: &mut [Argument]) {
        for arg in args {
            match arg {
                Argument::Expr(e) | Argument::Spread(e) => self.expr(e),
            }
        }
    }

    fn try_fold(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            Expr::Unary { op, arg } => {
                let lit = as_literal(&arg.expr)?;
                self.fold_unary(*op, lit)
            }
            Expr::Binary { op, left, right } => {
                let left = as_literal(&left.expr)?;
                let right = as_literal(&right.expr)?;
                self.fold_binary(*op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let lhs = as_literal(&left.expr)?;
                let pick_left = match op {
                    LogicalOp::And => !self.literal_truthy(lhs),
                    LogicalOp::Or => self.literal_truthy(lhs),
                    LogicalOp::Nullish => !matches!(lhs, Literal::Null),
                };
                Some(if pick_left {
                    Expr::Literal(lhs)
                } else {
                    right.expr.clone()
                })
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = as_literal(&test.expr)?;
                Some(if self.literal_truthy(test) {
                    consequent.expr.clone()
                } else {
                    alternate.expr.clone()
                })
            }
            Expr::Template { quasis, exprs } if exprs.is_empty() && quasis.len() == 1 => {
                Some(Expr::Literal(Literal::String(quasis[0])))
            }
            _ => None,
        }
    }

    fn fold_unary(&mut self, op: UnaryOp, lit: Literal) -> Option<Expr> {
        let result = match op {
            UnaryOp::Minus => Literal::Number(-self.literal_to_number(lit)?),
            UnaryOp::Plus => Literal::Number(self.literal_to_number(lit)?),
            UnaryOp::Not => Literal::Bool(!self.literal_truthy(lit)),
            UnaryOp::BitNot => Literal::Number(f64::from(!to_int32(self.literal_to_number(lit)?))),
            // There is no undefined literal, so `void x` stays unfolded.
            UnaryOp::Void | UnaryOp::TypeOf | UnaryOp::Delete => return None,
        };
        Some(Expr::Literal(result))
    }

    fn fold_binary(&mut self, op: BinaryOp, left: Literal, right: Literal) -> Option<Expr> {
        use BinaryOp::{
            Add, BitAnd, BitOr, BitXor, Div, Eq, Exp, Gt, GtE, Lt, LtE, Mul, NotEq, Rem, ShiftLeft, ShiftRight,
            ShiftRightZero, StrictEq, StrictNotEq, Sub,
        };
        let result = match op {
            Add => match (left, right) {
                (Literal::String(a), Literal::String(b)) => {
                    let combined = format!("{}{}", self.interner.get_str(a), self.interner.get_str(b));
                    Literal::String(self.interner.intern(&combined))
                }
                (Literal::String(a), Literal::Number(n)) => {
                    let combined = format!("{}{}", self.interner.get_str(a), number_to_string(n));
                    Literal::String(self.interner.intern(&combined))
                }
                (Literal::Number(n), Literal::String(b)) => {
                    let combined = format!("{}{}", number_to_string(n), self.interner.get_str(b));
                    Literal::String(self.interner.intern(&combined))
                }
                (Literal::Number(a), Literal::Number(b)) => Literal::Number(a + b),
                _ => return None,
            },
            Sub => Literal::Number(self.literal_to_number(left)? - self.literal_to_number(right)?),
            Mul => Literal::Number(self.literal_to_number(left)? * self.literal_to_number(right)?),
            Div => Literal::Number(self.literal_to_number(left)? / self.literal_to_number(right)?),
            Rem => {
                let (a, b) = (self.literal_to_number(left)?, self.literal_to_number(right)?);
                Literal::Number(js_remainder(a, b))
            }
            Exp => Literal::Number(self.literal_to_number(left)?.powf(self.literal_to_number(right)?)),
            ShiftLeft => {
                let shift = to_uint32(self.literal_to_number(right)?) & 31;
                Literal::Number(f64::from(to_int32(self.literal_to_number(left)?) << shift))
            }
            ShiftRight => {
                let shift = to_uint32(self.literal_to_number(right)?) & 31;
                Literal::Number(f64::from(to_int32(self.literal_to_number(left)?) >> shift))
            }
            ShiftRightZero => {
                let shift = to_uint32(self.literal_to_number(right)?) & 31;
                Literal::Number(f64::from(to_uint32(self.literal_to_number(left)?) >> shift))
            }
            BitAnd => Literal::Number(f64::from(
                to_int32(self.literal_to_number(left)?) & to_int32(self.literal_to_number(right)?),
            )),
            BitOr => Literal::Number(f64::from(
                to_int32(self.literal_to_number(left)?) | to_int32(self.literal_to_number(right)?),
            )),
            BitXor => Literal::Number(f64::from(
                to_int32(self.literal_to_number(left)?) ^ to_int32(self.literal_to_number(right)?),
            )),
            Lt | LtE | Gt | GtE => {
                let outcome = match (left, right) {
                    (Literal::Number(a), Literal::Number(b)) => {
                        if a.is_nan() || b.is_nan() {
                            Some(false)
                        } else {
                            Some(match op {
                                Lt => a < b,
                                LtE => a <= b,
                                Gt => a > b,
                                _ => a >= b,
                            })
                        }
                    }
                    (Literal::String(a), Literal::String(b)) => {
                        let (a, b) = (self.interner.get_str(a), self.interner.get_str(b));
                        Some(match op {
                            Lt => a < b,
                            LtE => a <= b,
                            Gt => a > b,
                            _ => a >= b,
                        })
                    }
                    _ => None,
                }?;
                Literal::Bool(outcome)
            }
            StrictEq | StrictNotEq | Eq | NotEq => {
                let equal = match (left, right) {
                    (Literal::Number(a), Literal::Number(b)) => a == b,
                    (Literal::Bool(a), Literal::Bool(b)) => a == b,
                    (Literal::Null, Literal::Null) => true,
                    (Literal::String(a), Literal::String(b)) => {
                        a == b || self.interner.get_str(a) == self.interner.get_str(b)
                    }
                    // Mixed literal types go through runtime coercion rules;
                    // leave them unfolded.
                    _ => return None,
                };
                Literal::Bool(match op {
                    StrictEq | Eq => equal,
                    _ => !equal,
                })
            }
            _ => return None,
        };
        Some(Expr::Literal(result))
    }

    fn literal_truthy(&self, lit: Literal) -> bool {
        match lit {
            Literal::Null => false,
            Literal::Bool(b) => b,
            Literal::Number(n) => !(n == 0.0 || n.is_nan()),
            Literal::String(id) => !self.interner.get_str(id).is_empty(),
        }
    }

    fn literal_to_number(&self, lit: Literal) -> Option<f64> {
        match lit {
            Literal::Number(n) => Some(n),
            Literal::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Literal::Null => Some(0.0),
            Literal::String(id) => Some(parse_js_number(self.interner.get_str(id))),
        }
    }
}

/// ECMAScript `%` keeps the dividend's sign, unlike `f64::rem_euclid`.
pub(crate) fn js_remainder(a: f64, b: f64) -> f64 {
    a % b
}

fn as_literal(expr: &Expr) -> Option<Literal> {
    match expr {
        Expr::Literal(lit) => Some(*lit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceSpan;

    fn expr_loc(expr: Expr) -> ExprLoc {
        ExprLoc::new(SourceSpan::default(), expr)
    }

    fn fold_one(expr: Expr) -> Expr {
        let mut interner = InternerBuilder::new();
        let mut folder = Folder {
            interner: &mut interner,
        };
        let mut loc = expr_loc(expr);
        folder.expr(&mut loc);
        loc.expr
    }

    #[test]
    fn folds_numeric_arithmetic() {
        let folded = fold_one(Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(expr_loc(Expr::Literal(Literal::Number(1.0)))),
            right: Box::new(expr_loc(Expr::Literal(Literal::Number(2.0)))),
        });
        assert!(matches!(folded, Expr::Literal(Literal::Number(n)) if n == 3.0));
    }

    #[test]
    fn folds_nested_subtrees() {
        // (1 + 2) * 3
        let folded = fold_one(Expr::Binary {
            op: BinaryOp::Mul,
            left: Box::new(expr_loc(Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(expr_loc(Expr::Literal(Literal::Number(1.0)))),
                right: Box::new(expr_loc(Expr::Literal(Literal::Number(2.0)))),
            })),
            right: Box::new(expr_loc(Expr::Literal(Literal::Number(3.0)))),
        });
        assert!(matches!(folded, Expr::Literal(Literal::Number(n)) if n == 9.0));
    }

    #[test]
    fn string_concat_folds_through_interner() {
        let mut interner = InternerBuilder::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        let mut folder = Folder {
            interner: &mut interner,
        };
        let mut loc = expr_loc(Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(expr_loc(Expr::Literal(Literal::String(a)))),
            right: Box::new(expr_loc(Expr::Literal(Literal::String(b)))),
        });
        folder.expr(&mut loc);
        let Expr::Literal(Literal::String(id)) = loc.expr else {
            panic!("expected folded string literal");
        };
        assert_eq!(interner.get_str(id), "foobar");
    }

    #[test]
    fn division_by_zero_folds_to_infinity() {
        let folded = fold_one(Expr::Binary {
            op: BinaryOp::Div,
            left: Box::new(expr_loc(Expr::Literal(Literal::Number(1.0)))),
            right: Box::new(expr_loc(Expr::Literal(Literal::Number(0.0)))),
        });
        assert!(matches!(folded, Expr::Literal(Literal::Number(n)) if n == f64::INFINITY));
    }
}
