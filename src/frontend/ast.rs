//! Chainlang syntax tree. Nodes are plain owned trees with no back references;
//! lowering matches on them exhaustively.

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let {
        name: String,
        value: Expression,
    },
    Assign {
        name: String,
        value: Expression,
    },
    Output(Expression),
    If {
        condition: Expression,
        positive: Block,
        negative: Block,
    },
    While {
        condition: Expression,
        body: Block,
    },
    /// Counts from `start` to `end` inclusive
    For {
        variable: String,
        start: i32,
        end: i32,
        body: Block,
    },
    FunctionDeclaration {
        name: String,
        parameters: Vec<String>,
        body: Block,
    },
    Return(Expression),
    TryCatch {
        body: Block,
        handler: Block,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    IntLiteral(i32),
    FloatLiteral(f32),
    Variable(String),
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperatorKind,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn binary(lhs: Expression, operator: BinaryOperatorKind, rhs: Expression) -> Self {
        Self::Binary {
            lhs: Box::new(lhs),
            operator,
            rhs: Box::new(rhs),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Comparison,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide => {
                BinaryOperatorClass::Arithmetic
            }
            Self::Equals
            | Self::NotEquals
            | Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Comparison,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

impl core::fmt::Display for BinaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqualTo => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        };

        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    LogicalNot, // !
}

impl core::fmt::Display for UnaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogicalNot => write!(f, "!"),
        }
    }
}
