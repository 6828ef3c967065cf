//! Syntax tree shared by all execution backends.
//!
//! The parser builds these nodes once; the interpreter walks them directly
//! while the VM and wasm backends lower them into their own code.

use std::fmt;

use serde::Serialize;

#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Sequence {
    pub statements: Vec<Statement>,
}

impl Sequence {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// The implicit `else` branch of an `if` without one.
    pub fn skip() -> Self {
        Self::new(vec![Statement::Skip])
    }
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Statement {
    Assignment {
        name: String,
        value: Expression,
    },
    Skip,
    While {
        head: Expression,
        body: Sequence,
    },
    If {
        condition: Expression,
        consequence: Sequence,
        alternative: Sequence,
    },
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Expression {
    Comparison {
        left: Box<Expression>,
        op: Comparator,
        right: Box<Expression>,
    },
    BinaryLow {
        left: Box<Expression>,
        op: LowOperator,
        right: Box<Expression>,
    },
    BinaryHigh {
        left: Box<Expression>,
        op: HighOperator,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    Number(i64),
    Identifier(String),
    Boolean(bool),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Comparator {
    LessEqual,
    GreaterEqual,
    NotEqual,
    Less,
    Greater,
    Equal,
}

impl Comparator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "<=" => Comparator::LessEqual,
            ">=" => Comparator::GreaterEqual,
            "<>" => Comparator::NotEqual,
            "<" => Comparator::Less,
            ">" => Comparator::Greater,
            "=" => Comparator::Equal,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::LessEqual => "<=",
            Comparator::GreaterEqual => ">=",
            Comparator::NotEqual => "<>",
            Comparator::Less => "<",
            Comparator::Greater => ">",
            Comparator::Equal => "=",
        }
    }

    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Comparator::LessEqual => left <= right,
            Comparator::GreaterEqual => left >= right,
            Comparator::NotEqual => left != right,
            Comparator::Less => left < right,
            Comparator::Greater => left > right,
            Comparator::Equal => left == right,
        }
    }
}

/// Operators binding at `Expression` level: `+`, `-` and logical `|`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum LowOperator {
    Add,
    Sub,
    Or,
}

impl LowOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => LowOperator::Add,
            "-" => LowOperator::Sub,
            "|" => LowOperator::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LowOperator::Add => "+",
            LowOperator::Sub => "-",
            LowOperator::Or => "|",
        }
    }
}

/// Operators binding at `Term` level: `*`, `/` and logical `&`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum HighOperator {
    Mul,
    Div,
    And,
}

impl HighOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "*" => HighOperator::Mul,
            "/" => HighOperator::Div,
            "&" => HighOperator::And,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            HighOperator::Mul => "*",
            HighOperator::Div => "/",
            HighOperator::And => "&",
        }
    }
}

/// Borrowed view over any tree node, for generic traversal and rendering.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Sequence(&'a Sequence),
    Statement(&'a Statement),
    Expression(&'a Expression),
}

impl<'a> Node<'a> {
    pub fn children(self) -> Vec<Node<'a>> {
        match self {
            Node::Sequence(sequence) => sequence.statements.iter().map(Node::Statement).collect(),
            Node::Statement(statement) => match statement {
                Statement::Assignment { value, .. } => vec![Node::Expression(value)],
                Statement::Skip => vec![],
                Statement::While { head, body } => {
                    vec![Node::Expression(head), Node::Sequence(body)]
                }
                Statement::If {
                    condition,
                    consequence,
                    alternative,
                } => vec![
                    Node::Expression(condition),
                    Node::Sequence(consequence),
                    Node::Sequence(alternative),
                ],
            },
            Node::Expression(expression) => match expression {
                Expression::Comparison { left, right, .. }
                | Expression::BinaryLow { left, right, .. }
                | Expression::BinaryHigh { left, right, .. } => {
                    vec![Node::Expression(left), Node::Expression(right)]
                }
                Expression::Not(operand) | Expression::Parenthesized(operand) => {
                    vec![Node::Expression(operand)]
                }
                Expression::Number(_) | Expression::Identifier(_) | Expression::Boolean(_) => {
                    vec![]
                }
            },
        }
    }

    /// Short one-line description of the node itself, without its children.
    pub fn label(self) -> String {
        match self {
            Node::Sequence(_) => "sequence".to_string(),
            Node::Statement(statement) => match statement {
                Statement::Assignment { name, .. } => format!("assignment {name} :="),
                Statement::Skip => "skip".to_string(),
                Statement::While { .. } => "while".to_string(),
                Statement::If { .. } => "if".to_string(),
            },
            Node::Expression(expression) => match expression {
                Expression::Comparison { op, .. } => op.symbol().to_string(),
                Expression::BinaryLow { op, .. } => op.symbol().to_string(),
                Expression::BinaryHigh { op, .. } => op.symbol().to_string(),
                Expression::Not(_) => "!".to_string(),
                Expression::Number(value) => value.to_string(),
                Expression::Identifier(name) => name.clone(),
                Expression::Boolean(value) => value.to_string(),
                Expression::Parenthesized(_) => "( )".to_string(),
            },
        }
    }
}

/// Indented tree rendering, one node per line.
impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(node: Node<'_>, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "{:indent$}{}", "", node.label(), indent = depth * 2)?;
            for child in node.children() {
                render(child, depth + 1, f)?;
            }
            Ok(())
        }
        render(*self, 0, f)
    }
}
