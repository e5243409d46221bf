//! The typed AST consumed by the evaluator.
//!
//! Produced by `builder` from the oxc parse tree, then rewritten by the
//! constant folder and (for eligible async functions) the CPS lowering.
//! Every node is serializable so a prepared script can be snapshotted with
//! postcard and executed later without re-parsing.
//!
//! Function bodies do not nest: each function definition is hoisted into a
//! flat table owned by `Interns` and referenced by `FunctionId`. Classical
//! loops are already normalized into [`LoopPlan`] by the builder, so the
//! evaluator sees a single loop shape.

use crate::{
    intern::{FunctionId, StringId},
    span::SourceSpan,
};

/// A whole script, plus its top-level strictness.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Program {
    pub body: Vec<StmtLoc>,
    /// True when the script starts with a `"use strict"` directive.
    pub strict: bool,
}

/// A statement with its source location.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct StmtLoc {
    pub span: SourceSpan,
    pub stmt: Stmt,
}

impl StmtLoc {
    pub fn new(span: SourceSpan, stmt: Stmt) -> Self {
        Self { span, stmt }
    }
}

/// An expression with its source location.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ExprLoc {
    pub span: SourceSpan,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(span: SourceSpan, expr: Expr) -> Self {
        Self { span, expr }
    }
}

/// Statement kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum Stmt {
    /// Empty statement (`;`) and `debugger`, both no-ops here.
    Empty,
    Expr(ExprLoc),
    VarDecl(VarDeclStmt),
    /// Function declaration; the callable installs during hoisting, and the
    /// statement re-assigns the same binding when executed positionally.
    FunctionDecl(FunctionId),
    ClassDecl(Box<ClassDef>),
    Return(Option<ExprLoc>),
    If {
        test: ExprLoc,
        consequent: Box<StmtLoc>,
        alternate: Option<Box<StmtLoc>>,
    },
    Block(Block),
    /// All of `while`/`do-while`/`for` normalize to this one shape.
    Loop(Box<LoopPlan>),
    ForIn(Box<ForInStmt>),
    ForOf(Box<ForOfStmt>),
    Break {
        label: Option<StringId>,
    },
    Continue {
        label: Option<StringId>,
    },
    Labeled {
        label: StringId,
        body: Box<StmtLoc>,
    },
    Throw(ExprLoc),
    Try(Box<TryStmt>),
    Switch(Box<SwitchStmt>),
    With(Box<WithStmt>),
}

/// A braced statement list evaluated in a fresh block scope.
///
/// Hoisting metadata is recomputed on entry (two passes over the statement
/// list) rather than cached, matching the per-block hoisting order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Block {
    pub stmts: Vec<StmtLoc>,
}

/// `var`/`let`/`const` declaration statement.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct VarDeclStmt {
    pub kind: DeclKind,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Declarator {
    pub span: SourceSpan,
    pub target: Pattern,
    pub init: Option<ExprLoc>,
}

/// Binding / assignment target patterns.
///
/// The same shape covers declarations (`let [a, b] = x`), assignment
/// expressions (`[a.b, c] = x`) and `for` targets. `Member` only appears in
/// assignment positions; the pattern binder rejects it for declarations.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum Pattern {
    Identifier {
        name: StringId,
        span: SourceSpan,
    },
    Array {
        /// `None` entries are elisions: the iterator still advances, the
        /// value is discarded.
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
        span: SourceSpan,
    },
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
        span: SourceSpan,
    },
    /// `target = default`: the default evaluates only when the incoming
    /// value is `undefined`.
    Default {
        target: Box<Pattern>,
        default: Box<ExprLoc>,
    },
    /// Property assignment target (`obj.key = v` inside a destructuring).
    Member {
        object: Box<ExprLoc>,
        key: MemberKey,
        span: SourceSpan,
    },
}

impl Pattern {
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Identifier { span, .. }
            | Self::Array { span, .. }
            | Self::Object { span, .. }
            | Self::Member { span, .. } => *span,
            Self::Default { target, .. } => target.span(),
        }
    }

    /// Collects every identifier this pattern binds, in source order.
    pub fn bound_names(&self, out: &mut Vec<StringId>) {
        match self {
            Self::Identifier { name, .. } => out.push(*name),
            Self::Array { elements, rest, .. } => {
                for element in elements.iter().flatten() {
                    element.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Self::Object { props, rest, .. } => {
                for prop in props {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Self::Default { target, .. } => target.bound_names(out),
            Self::Member { .. } => {}
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ObjectPatternProp {
    pub key: PropName,
    pub value: Pattern,
}

/// Property name position in object literals, patterns and class members.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum PropName {
    /// Identifier or string-literal key, already interned.
    Ident(StringId),
    /// Numeric-literal key.
    Num(f64),
    /// `[expr]` - resolved when the surrounding definition evaluates.
    Computed(Box<ExprLoc>),
    /// `#name` - resolved through the active private-name scope.
    Private(StringId),
}

/// The normalized shape of every classical loop.
///
/// `for (let i = 0; …; …)` keeps `per_iteration` non-empty: each iteration
/// runs in a fresh block scope seeded from the previous one, so closures
/// capture iteration-local bindings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct LoopPlan {
    pub init: Option<LoopInit>,
    /// `None` means `true` (bare `for(;;)`).
    pub test: Option<ExprLoc>,
    pub update: Option<ExprLoc>,
    pub body: StmtLoc,
    /// Lexical loop-head bindings copied into a fresh scope per iteration.
    pub per_iteration: Vec<StringId>,
    /// True for `do-while`: the body runs once before the first test.
    pub post_test: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum LoopInit {
    Decl(VarDeclStmt),
    Expr(ExprLoc),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ForInStmt {
    pub left: ForTarget,
    pub right: ExprLoc,
    pub body: StmtLoc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ForOfStmt {
    pub left: ForTarget,
    pub right: ExprLoc,
    pub body: StmtLoc,
    /// True for `for await…of`.
    pub is_await: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum ForTarget {
    Decl { kind: DeclKind, pattern: Pattern },
    Pattern(Pattern),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct TryStmt {
    pub block: Block,
    pub catch: Option<CatchClause>,
    pub finally: Option<Block>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct CatchClause {
    /// `None` for `catch {}` without a binding.
    pub param: Option<Pattern>,
    pub body: Block,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct SwitchStmt {
    pub discriminant: ExprLoc,
    pub cases: Vec<SwitchCase>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct SwitchCase {
    /// `None` for the `default` clause.
    pub test: Option<ExprLoc>,
    pub body: Vec<StmtLoc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct WithStmt {
    pub object: ExprLoc,
    pub body: StmtLoc,
}

/// Expression kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum Expr {
    Literal(Literal),
    Ident(StringId),
    This,
    NewTarget,
    /// `super(args)` in a derived constructor.
    SuperCall(Vec<Argument>),
    /// `super.key` / `super[key]` in a method with a home object.
    SuperMember {
        key: MemberKey,
    },
    Array {
        elements: Vec<ArrayElement>,
    },
    Object {
        props: Vec<ObjectProp>,
    },
    Function(FunctionId),
    Class(Box<ClassDef>),
    Template {
        quasis: Vec<StringId>,
        exprs: Vec<ExprLoc>,
    },
    TaggedTemplate {
        tag: Box<ExprLoc>,
        quasis: Vec<TemplateQuasi>,
        exprs: Vec<ExprLoc>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<ExprLoc>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Pattern>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Logical {
        op: LogicalOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Conditional {
        test: Box<ExprLoc>,
        consequent: Box<ExprLoc>,
        alternate: Box<ExprLoc>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<ExprLoc>,
    },
    Sequence {
        exprs: Vec<ExprLoc>,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<Argument>,
        /// `?.()`: short-circuits when the callee is nullish.
        optional: bool,
    },
    New {
        callee: Box<ExprLoc>,
        args: Vec<Argument>,
    },
    Member {
        object: Box<ExprLoc>,
        key: MemberKey,
        /// `?.`: short-circuits when the object is nullish.
        optional: bool,
    },
    /// Wrapper marking the extent of an optional chain: a nullish
    /// short-circuit inside stops at this boundary with `undefined`.
    Chain(Box<ExprLoc>),
    /// `#name in obj`
    PrivateIn {
        name: StringId,
        object: Box<ExprLoc>,
    },
    Yield {
        arg: Option<Box<ExprLoc>>,
        delegate: bool,
    },
    Await(Box<ExprLoc>),
    /// Regex literal; builds an inert pattern object through the realm.
    Regex {
        source: StringId,
        flags: StringId,
    },
    /// Synthetic slot reference emitted by the generator lowering when a
    /// `yield`/`await` is extracted out of a larger expression.
    TempSlot(u16),
    /// Synthetic node emitted by the `for…in` lowering: snapshots the
    /// enumerable keys of the object in the given temp slot as an array.
    ForInKeys(u16),
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(StringId),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum ArrayElement {
    /// Elision (`[, 1]`) - produces a hole.
    Hole,
    Item(ExprLoc),
    Spread(ExprLoc),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum ObjectProp {
    /// `key: value`, shorthand, or method definition.
    Init { key: PropName, value: ExprLoc },
    Getter { key: PropName, func: FunctionId },
    Setter { key: PropName, func: FunctionId },
    Spread(ExprLoc),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum MemberKey {
    Static(StringId),
    Computed(Box<ExprLoc>),
    Private(StringId),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum Argument {
    Expr(ExprLoc),
    Spread(ExprLoc),
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct TemplateQuasi {
    /// `None` for invalid escape sequences in tagged templates.
    pub cooked: Option<StringId>,
    pub raw: StringId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    ShiftLeft,
    ShiftRight,
    ShiftRightZero,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum AssignOp {
    Assign,
    Op(BinaryOp),
    Logical(LogicalOp),
}

/// Which kind of class constructor a function value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub(crate) enum CtorKind {
    #[default]
    None,
    Base,
    Derived,
}

/// One function parameter.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ParamDef {
    pub pattern: Pattern,
    pub span: SourceSpan,
}

/// A function definition, stored in the flat function table.
///
/// Carries the metadata the call machinery needs without re-walking the
/// body: bound names for hoisting, the simple-parameter-list flag that
/// decides mapped vs unmapped `arguments`, and the direct-eval flag that
/// promotes the parameter scope to a full var environment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct FunctionDef {
    pub name: Option<StringId>,
    pub span: SourceSpan,
    pub params: Vec<ParamDef>,
    pub rest: Option<Pattern>,
    pub body: Vec<StmtLoc>,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_strict: bool,
    /// True for methods and accessors: enables `super.x` via the home object.
    pub is_method: bool,
    pub ctor_kind: CtorKind,
    /// True when every parameter is a plain identifier and there is no rest
    /// element; selects the mapped `arguments` object.
    pub simple_params: bool,
    /// Every name bound by the parameter list, in order.
    pub param_names: Vec<StringId>,
    /// `let`/`const`/`class` names declared at body top level.
    pub lexical_names: Vec<StringId>,
    /// `var`-declared names anywhere in the body (not crossing nested
    /// function boundaries).
    pub var_names: Vec<StringId>,
    /// Direct `eval(...)` call syntactically inside a parameter initializer.
    pub has_direct_eval_in_params: bool,
    /// CPS-lowered body for eligible async functions: a plain body that
    /// builds and returns a promise. `None` for ineligible bodies, which run
    /// on the suspend-and-resume path instead.
    pub cps_body: Option<Vec<StmtLoc>>,
}

impl FunctionDef {
    /// Number of declared parameters before the first default/rest, i.e. the
    /// function's `length` property.
    pub fn arity(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| matches!(p.pattern, Pattern::Identifier { .. }))
            .count()
    }
}

/// A class definition (declaration or expression).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ClassDef {
    pub name: Option<StringId>,
    pub span: SourceSpan,
    pub super_class: Option<ExprLoc>,
    /// Explicit constructor, if the class body declares one.
    pub ctor: Option<FunctionId>,
    pub members: Vec<ClassMember>,
    /// Every `#name` declared in the class body, methods and fields alike.
    pub private_names: Vec<StringId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) enum MethodKind {
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) enum ClassMember {
    Method {
        key: PropName,
        func: FunctionId,
        kind: MethodKind,
        is_static: bool,
    },
    Field {
        key: PropName,
        value: Option<ExprLoc>,
        is_static: bool,
        span: SourceSpan,
    },
    StaticBlock(Vec<StmtLoc>),
}
