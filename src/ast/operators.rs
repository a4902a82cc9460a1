use std::fmt;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Logical / bitwise
    /// Bitwise AND on integers, logical AND on booleans (`&`)
    And,
    /// Bitwise OR on integers, logical OR on booleans (`|`)
    Or,
    /// Bitwise XOR on integers, logical XOR on booleans (`^`)
    Xor,

    // Comparison
    /// Equal (`==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,
    /// Regex search (`=~`)
    Matches,

    // Arithmetic
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Multiplication, or string repetition with an integer (`*`)
    Multiply,
    /// Exact division (`/`)
    Divide,
    /// Floor division (`//`)
    FloorDivide,
    /// Remainder (`%`)
    Modulo,
    /// Exponentiation (`**`), right-associative
    Power,
}

impl BinOp {
    /// Binding tier; higher binds tighter. Unary prefixes sit at
    /// [`UnaryOp::PRECEDENCE`], between [`BinOp::Modulo`]'s tier and
    /// [`BinOp::Power`].
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::And | BinOp::Or | BinOp::Xor => 0,
            BinOp::Equal
            | BinOp::NotEqual
            | BinOp::LessThan
            | BinOp::GreaterThan
            | BinOp::LessEqual
            | BinOp::GreaterEqual
            | BinOp::Matches => 1,
            BinOp::Add | BinOp::Subtract => 2,
            BinOp::Multiply | BinOp::Divide | BinOp::FloorDivide | BinOp::Modulo => 3,
            BinOp::Power => 5,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::LessThan => "<",
            BinOp::GreaterThan => ">",
            BinOp::LessEqual => "<=",
            BinOp::GreaterEqual => ">=",
            BinOp::Matches => "=~",
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::FloorDivide => "//",
            BinOp::Modulo => "%",
            BinOp::Power => "**",
        }
    }

    /// Every binary operator, in precedence order.
    pub const ALL: [BinOp; 17] = [
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Equal,
        BinOp::NotEqual,
        BinOp::LessThan,
        BinOp::GreaterThan,
        BinOp::LessEqual,
        BinOp::GreaterEqual,
        BinOp::Matches,
        BinOp::Add,
        BinOp::Subtract,
        BinOp::Multiply,
        BinOp::Divide,
        BinOp::FloorDivide,
        BinOp::Modulo,
        BinOp::Power,
    ];
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation (`-`)
    Negate,
    /// Numeric identity; turns booleans into integers (`+`)
    Plus,
    /// Logical negation by truthiness (`not`)
    Not,
}

impl UnaryOp {
    /// Binding tier of every prefix operator, on the [`BinOp::precedence`] scale.
    pub const PRECEDENCE: u8 = 4;
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "not",
        })
    }
}
