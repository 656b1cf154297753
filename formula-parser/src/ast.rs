//! FILENAME: formula-parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for metric formulas.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser converts
//! those tokens into this tree structure. Every name is classified while
//! parsing, so the evaluator never has to rediscover a token's role.
//!
//! SUPPORTED EXPRESSIONS:
//! - Number literals
//! - Field references (a per-row numeric vector)
//! - Metric references (the scalar result of an earlier metric)
//! - Binary operations: +, -, *, /, ^
//! - Unary operations: - (negation), + (identity)
//! - Reducer calls: SUM(price), AVG(price * qty)

/// Represents a parsed formula expression.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A numeric literal.
    Number(f64),

    /// A reference to a column (or a field slot bound to a column).
    Field(String),

    /// A reference to a metric slot; resolves to a single number.
    Metric(String),

    /// A reducer applied to one or more arguments.
    Call { func: Reducer, args: Vec<Expression> },

    /// A binary operation: left op right.
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// A unary operation: op operand.
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
}

/// Built-in reducers collapsing a vector to a number.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Reducer {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Reducer {
    /// Looks up a reducer by name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Reducer> {
        match name.to_uppercase().as_str() {
            "SUM" => Some(Reducer::Sum),
            "AVG" | "AVERAGE" => Some(Reducer::Avg),
            "COUNT" => Some(Reducer::Count),
            "MIN" => Some(Reducer::Min),
            "MAX" => Some(Reducer::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Sum => "SUM",
            Reducer::Avg => "AVG",
            Reducer::Count => "COUNT",
            Reducer::Min => "MIN",
            Reducer::Max => "MAX",
        }
    }
}

/// Binary operators for expressions, lowest precedence first.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Power,    // ^
}

/// Unary operators.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Negate, // -
    Plus,   // +
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Subtract => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
            BinaryOperator::Power => write!(f, "^"),
        }
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
        }
    }
}

impl std::fmt::Display for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Renders the expression back to a fully parenthesised formula.
impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{}", n),
            Expression::Field(name) | Expression::Metric(name) => write!(f, "[{}]", name),
            Expression::Call { func, args } => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expression::UnaryOp { op, operand } => write!(f, "{}{}", op, operand),
        }
    }
}
