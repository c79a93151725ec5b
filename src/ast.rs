use crate::error::Span;

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Declaration flavor. `make` is a compile-time constant; in the tree-walker
/// it is evaluated once at the declaration and bound const, same as `const`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeclKind {
    Let,
    Const,
    Make,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Declaration {
        kind: DeclKind,
        name: String,
        ty: Option<String>,
        value: Expr,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Include {
        path: String,
        span: Span,
    },
    StructDef {
        name: String,
        fields: Vec<String>,
        span: Span,
    },
    /// `define Type.name(...) { ... }`, bound under the key `Type.name`.
    MethodDef {
        type_name: String,
        name: String,
        function: Expr,
        span: Span,
    },
    EnumDef {
        name: String,
        variants: Vec<String>,
        span: Span,
    },
    Expression {
        expr: Expr,
        span: Span,
    },
    Block {
        statements: Vec<Stmt>,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Declaration { span, .. } => span,
            Stmt::Return { span, .. } => span,
            Stmt::Include { span, .. } => span,
            Stmt::StructDef { span, .. } => span,
            Stmt::MethodDef { span, .. } => span,
            Stmt::EnumDef { span, .. } => span,
            Stmt::Expression { span, .. } => span,
            Stmt::Block { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Option<String>,
    pub span: Span,
}

/// Array literal element; spreads are flattened at evaluation time.
#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Stmt,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntegerLit {
        value: i64,
        span: Span,
    },
    FloatLit {
        value: f64,
        span: Span,
    },
    /// Raw string contents; escapes and `${...}` spans are processed when the
    /// literal is evaluated.
    StringLit {
        value: String,
        span: Span,
    },
    CharLit {
        value: char,
        span: Span,
    },
    BoolLit {
        value: bool,
        span: Span,
    },
    NullLit {
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
        span: Span,
    },
    Postfix {
        op: IncDecOp,
        operand: Box<Expr>,
        span: Span,
    },
    Infix {
        left: Box<Expr>,
        op: InfixOp,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
        span: Span,
    },
    Assign {
        name: String,
        value: Box<Expr>,
        span: Span,
    },
    CompoundAssign {
        name: String,
        op: InfixOp,
        value: Box<Expr>,
        span: Span,
    },
    Dot {
        object: Box<Expr>,
        property: String,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        span: Span,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        span: Span,
    },
    ArrayLit {
        elements: Vec<ArrayElement>,
        span: Span,
    },
    MapLit {
        pairs: Vec<(Expr, Expr)>,
        span: Span,
    },
    StructLit {
        name: String,
        fields: Vec<(String, Expr)>,
        span: Span,
    },
    FunctionLit {
        params: Vec<Param>,
        ret: Option<String>,
        body: Box<Stmt>,
        span: Span,
    },
    ArrowFunction {
        params: Vec<Param>,
        body: Box<Stmt>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        condition: Box<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    /// C-style loop; init and update are full statements, so any statement
    /// form (including declarations) is allowed there.
    ForC {
        init: Option<Box<Stmt>>,
        condition: Option<Box<Expr>>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
        span: Span,
    },
    /// `for item in iter` or `for index, item in iter`.
    ForIn {
        index: Option<String>,
        item: String,
        iterable: Box<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    Switch {
        subject: Box<Expr>,
        cases: Vec<SwitchCase>,
        default: Option<Box<Stmt>>,
        span: Span,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    TryCatch {
        try_block: Box<Stmt>,
        err_name: String,
        catch_block: Box<Stmt>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::IntegerLit { span, .. } => span,
            Expr::FloatLit { span, .. } => span,
            Expr::StringLit { span, .. } => span,
            Expr::CharLit { span, .. } => span,
            Expr::BoolLit { span, .. } => span,
            Expr::NullLit { span } => span,
            Expr::Identifier { span, .. } => span,
            Expr::Prefix { span, .. } => span,
            Expr::Postfix { span, .. } => span,
            Expr::Infix { span, .. } => span,
            Expr::Logical { span, .. } => span,
            Expr::Assign { span, .. } => span,
            Expr::CompoundAssign { span, .. } => span,
            Expr::Dot { span, .. } => span,
            Expr::Call { span, .. } => span,
            Expr::Index { span, .. } => span,
            Expr::Slice { span, .. } => span,
            Expr::Range { span, .. } => span,
            Expr::ArrayLit { span, .. } => span,
            Expr::MapLit { span, .. } => span,
            Expr::StructLit { span, .. } => span,
            Expr::FunctionLit { span, .. } => span,
            Expr::ArrowFunction { span, .. } => span,
            Expr::If { span, .. } => span,
            Expr::While { span, .. } => span,
            Expr::ForC { span, .. } => span,
            Expr::ForIn { span, .. } => span,
            Expr::Switch { span, .. } => span,
            Expr::Ternary { span, .. } => span,
            Expr::TryCatch { span, .. } => span,
            Expr::Break { span } => span,
            Expr::Continue { span } => span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrefixOp {
    Negate,
    Not,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfixOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl InfixOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Subtract => "-",
            InfixOp::Multiply => "*",
            InfixOp::Divide => "/",
            InfixOp::Modulo => "%",
            InfixOp::Equal => "==",
            InfixOp::NotEqual => "!=",
            InfixOp::Less => "<",
            InfixOp::LessEqual => "<=",
            InfixOp::Greater => ">",
            InfixOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}
