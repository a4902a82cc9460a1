use std::fmt;

use regex::Regex;

use crate::value::Value;

/// A compiled regular expression that compares by its source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Lexical tokens produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Integer literal, decimal or hex
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 0x1f
    /// ```
    Integer(i64),

    /// Floating-point literal, including the `NaN` and `Infinity` constants
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// .5
    /// 1e3
    /// Infinity
    /// ```
    Float(f64),

    /// Backtick-quoted string
    ///
    /// A backslash escapes a backtick; `\n`, `\r` and `\t` become control
    /// characters and any other backslash pair is kept as written.
    ///
    /// # Examples
    /// ```text
    /// `hello world`
    /// `a\`b`
    /// ```
    String(String),

    /// Bare word: a function name, or a key/string when not followed by `(`
    ///
    /// # Examples
    /// ```text
    /// foo
    /// s_len
    /// _private
    /// ```
    Identifier(String),

    /// JSON literal introduced by `` j`...` ``
    ///
    /// # Examples
    /// ```text
    /// j`[1, 2, {"a": null}]`
    /// ```
    Json(Value),

    /// Regex literal introduced by `` g`...` ``
    ///
    /// # Examples
    /// ```text
    /// g`^ba[rz]$`
    /// ```
    Regex(Pattern),

    /// `null`
    Null,

    /// `true` / `false`
    Boolean(bool),

    /// Current value reference (`@`)
    At,

    // Operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `//`
    DoubleSlash,
    /// `%`
    Percent,
    /// `**`
    DoubleStar,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `=~`
    Tilde,
    /// `&`
    Ampersand,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `not` keyword
    Not,
    /// `!` before an indexer, selecting everything it does not name
    Bang,
    /// `->` map operator
    Arrow,
    /// `=` assignment
    Assign,

    // Delimiters
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,

    /// End of input
    Eof,
}

/// A token with the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Integer(n) => return write!(f, "{}", n),
            Token::Float(n) => return write!(f, "{}", crate::output::format_float(*n)),
            Token::String(s) => return write!(f, "`{}`", s),
            Token::Identifier(s) => return f.write_str(s),
            Token::Json(v) => return write!(f, "j`{}`", crate::output::to_json(v)),
            Token::Regex(p) => return write!(f, "g`{}`", p.as_str()),
            Token::Null => "null",
            Token::Boolean(true) => "true",
            Token::Boolean(false) => "false",
            Token::At => "@",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::DoubleStar => "**",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Tilde => "=~",
            Token::Ampersand => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Not => "not",
            Token::Bang => "!",
            Token::Arrow => "->",
            Token::Assign => "=",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Eof => "end of input",
        };
        f.write_str(text)
    }
}
