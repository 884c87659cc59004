use crate::trim::TrimRule;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Field(Box<Expr>, String),     // user.name
    Index(Box<Expr>, Box<Expr>),  // ids[0], map['key']
    List(Vec<Expr>),              // [1, 2] or {1, 2}
    Call(String, Vec<Expr>),      // list(1, 2)
    Method(Box<Expr>, String, Vec<Expr>), // name.trim()
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Dotted rendering of a variable path, used in error messages.
    pub fn path(&self) -> String {
        match self {
            Expr::Var(name) => name.clone(),
            Expr::Field(base, field) => format!("{}.{}", base.path(), field),
            Expr::Index(base, _) => format!("{}[..]", base.path()),
            Expr::Method(base, name, _) => format!("{}.{}()", base.path(), name),
            Expr::Call(name, _) => format!("{name}()"),
            _ => "<expression>".to_string(),
        }
    }
}

/// A compiled expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub source: String,
    pub ast: Expr,
}

/// `#{expr, jdbcType=VARCHAR}`: a bind point in the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub expression: Expression,
    pub options: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
    /// `${expr}`: inlined as text.
    Substitution(Expression),
}

/// One normalized text fragment split at its placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub segments: Vec<Segment>,
}

impl Fragment {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Literal(text.into())],
        }
    }

    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub test: Expression,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub collection: Expression,
    pub item: Option<String>,
    pub index: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub separator: Option<String>,
    pub nullable: Option<bool>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(Fragment),
    Conditional(Branch),
    Choice {
        branches: Vec<Branch>, // first truthy wins
        otherwise: Option<Vec<Node>>,
    },
    Loop(Box<Loop>),
    Bind {
        name: String,
        value: Expression,
    },
    TrimWrapper {
        rule: TrimRule,
        body: Vec<Node>,
    },
}

impl Node {
    /// Whether rendering can depend on the parameter context.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Node::Text(fragment) => !fragment.is_static(),
            _ => true,
        }
    }
}

/// A compiled template. Immutable; safe to share across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub source: String,
    pub nodes: Vec<Node>,
}

impl Template {
    /// `false` when the output never depends on parameters.
    pub fn is_dynamic(&self) -> bool {
        self.nodes.iter().any(Node::is_dynamic)
    }
}
