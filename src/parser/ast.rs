//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - one parsed document part
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Spanned<Node>>,
}

/// A piece of template content
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw document markup copied to the output untouched
    Text(String),
    /// `{{ expr }}`
    Output(Spanned<Expr>),
    /// `{% if %} ... {% elif %} ... {% else %} ... {% endif %}`
    If(IfBlock),
    /// `{% for name in expr %} ... {% else %} ... {% endfor %}`
    For(ForBlock),
    /// `{% set name = expr %}`
    Set(SetDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    /// The `if` branch followed by every `elif`, in source order
    pub branches: Vec<IfBranch>,
    pub otherwise: Option<Vec<Spanned<Node>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Spanned<Expr>,
    pub body: Vec<Spanned<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    pub variable: Spanned<Identifier>,
    pub iterable: Spanned<Expr>,
    pub body: Vec<Spanned<Node>>,
    /// Rendered instead of the body when the iterable is empty
    pub otherwise: Option<Vec<Spanned<Node>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDecl {
    pub name: Spanned<Identifier>,
    pub value: Spanned<Expr>,
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    None,
}

/// Expression inside a tag
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// `[a, b, c]`
    List(Vec<Spanned<Expr>>),
    /// Bare name looked up in the render context
    Variable(Identifier),
    /// `target.name`
    Attribute {
        target: Box<Spanned<Expr>>,
        name: Identifier,
    },
    /// `target[index]`
    Index {
        target: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
    /// `name(args)` - only built-in functions are callable
    Call {
        function: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
    },
    /// `target | name(args)`
    Filter {
        target: Box<Spanned<Expr>>,
        name: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
    },
    /// `target is [not] name(args)`
    Test {
        target: Box<Spanned<Expr>>,
        name: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
        negated: bool,
    },
    /// `-operand`
    Neg(Box<Spanned<Expr>>),
    /// `not operand`
    Not(Box<Spanned<Expr>>),
    Binary {
        op: BinaryOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    /// `then if condition else otherwise`
    Conditional {
        then: Box<Spanned<Expr>>,
        condition: Box<Spanned<Expr>>,
        otherwise: Option<Box<Spanned<Expr>>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    /// `~` string concatenation
    Concat,
    Add,
    Sub,
    Mul,
    /// `/`, always yields a float
    Div,
    /// `//`
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Concat => "~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::FloorDiv
                | BinaryOp::Mod
        )
    }
}

/// Combined span of two spanned nodes
pub fn join_spans(a: &Span, b: &Span) -> Span {
    a.start.min(b.start)..a.end.max(b.end)
}
