use std::fmt;

use crate::{
    ast::{Pattern, Spanned, Token},
    convert::{json_to_value, ConvertOptions},
};

/// A malformed token, an unbalanced bracket or a misplaced `=`.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl LexError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        LexError {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    /// Whether the last token ends a value, which makes a following `.`
    /// an accessor instead of the start of a float like `.5`.
    after_value: bool,
    /// Whether the last token was a `.`, after which digits form a key.
    after_dot: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            after_value: false,
            after_dot: false,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Reads a backtick-delimited body starting at the opening backtick.
    ///
    /// `raw` bodies (JSON and regex literals) keep every backslash pair
    /// except the escaped backtick, so `\d` reaches the regex engine intact.
    fn read_backtick(&mut self, raw: bool) -> Result<String, LexError> {
        let start = self.position;
        let mut result = String::new();
        self.advance();

        while let Some(ch) = self.current_char() {
            match ch {
                '`' => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    self.advance();
                    match self.current_char() {
                        Some('`') => result.push('`'),
                        Some('n') if !raw => result.push('\n'),
                        Some('r') if !raw => result.push('\r'),
                        Some('t') if !raw => result.push('\t'),
                        Some(other) => {
                            result.push('\\');
                            result.push(other);
                        }
                        None => return Err(LexError::new("unterminated string", start)),
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError::new("unterminated string", start))
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current_char().filter(char::is_ascii_digit) {
            text.push(ch);
            self.advance();
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;

        if self.current_char() == Some('0')
            && matches!(self.peek_char(1), Some('x' | 'X'))
            && self.peek_char(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(ch) = self.current_char().filter(char::is_ascii_hexdigit) {
                digits.push(ch);
                self.advance();
            }
            return i64::from_str_radix(&digits, 16)
                .map(Token::Integer)
                .map_err(|_| LexError::new("hex literal out of range", start));
        }

        let mut number = String::new();
        let mut is_float = false;

        if self.current_char() == Some('0') {
            number.push('0');
            self.advance();
        } else {
            self.read_digits(&mut number);
        }

        // digits right after a `.` accessor are an object key like `.0`
        if self.after_dot {
            return number
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| LexError::new("integer literal out of range", start));
        }

        if self.current_char() == Some('.') && self.starts_fraction(1) {
            is_float = true;
            number.push('.');
            self.advance();
            self.read_digits(&mut number);
            if self.current_char() == Some('.')
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                return Err(LexError::new("number has two decimal points", start));
            }
        }

        if matches!(self.current_char(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_char(1), Some('+' | '-')));
            if self.peek_char(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..=sign {
                    number.push(self.current_char().unwrap_or('e'));
                    self.advance();
                }
                self.read_digits(&mut number);
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| LexError::new(format!("invalid number '{}'", number), start))
        } else {
            number
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| LexError::new("integer literal out of range", start))
        }
    }

    /// A `.` after an integer starts a fraction unless what follows it reads
    /// as an accessor (`1.foo`, `1..x`, `1.*`).
    fn starts_fraction(&self, offset: usize) -> bool {
        match self.peek_char(offset) {
            Some(c) if c.is_ascii_digit() => true,
            Some(c) => !(c.is_alphabetic() || matches!(c, '_' | '.' | '*' | '`' | '[')),
            None => true,
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// One-or-two character operator: `second` completes `long`, else `short`.
    fn pair(&mut self, second: char, long: Token, short: Token) -> Token {
        if self.peek_char(1) == Some(second) {
            self.advance();
            self.advance();
            long
        } else {
            self.advance();
            short
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_whitespace();
        let position = self.position;

        let token = match self.current_char() {
            None => Token::Eof,
            Some('@') => self.single(Token::At),
            Some('.') => {
                if !self.after_value && self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) {
                    let mut number = String::from("0.");
                    self.advance();
                    self.read_digits(&mut number);
                    if self.current_char() == Some('.')
                        && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
                    {
                        return Err(LexError::new("number has two decimal points", position));
                    }
                    number
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| LexError::new("invalid number", position))?
                } else {
                    self.single(Token::Dot)
                }
            }
            Some(',') => self.single(Token::Comma),
            Some(':') => self.single(Token::Colon),
            Some('+') => self.single(Token::Plus),
            Some('-') => self.pair('>', Token::Arrow, Token::Minus),
            Some('*') => self.pair('*', Token::DoubleStar, Token::Star),
            Some('/') => self.pair('/', Token::DoubleSlash, Token::Slash),
            Some('%') => self.single(Token::Percent),
            Some('&') => self.single(Token::Ampersand),
            Some('|') => self.single(Token::Pipe),
            Some('^') => self.single(Token::Caret),
            Some('=') => match self.peek_char(1) {
                Some('=') => self.pair('=', Token::EqEq, Token::Assign),
                Some('~') => self.pair('~', Token::Tilde, Token::Assign),
                _ => self.single(Token::Assign),
            },
            Some('!') => self.pair('=', Token::NotEq, Token::Bang),
            Some('<') => self.pair('=', Token::LtEq, Token::Lt),
            Some('>') => self.pair('=', Token::GtEq, Token::Gt),
            Some('(') => self.single(Token::LParen),
            Some(')') => self.single(Token::RParen),
            Some('[') => self.single(Token::LBracket),
            Some(']') => self.single(Token::RBracket),
            Some('{') => self.single(Token::LBrace),
            Some('}') => self.single(Token::RBrace),
            Some('`') => Token::String(self.read_backtick(false)?),
            Some(prefix @ ('j' | 'g')) if self.peek_char(1) == Some('`') => {
                self.advance();
                let body = self.read_backtick(true)?;
                if prefix == 'j' {
                    let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                        LexError::new(format!("invalid JSON literal: {}", e), position)
                    })?;
                    Token::Json(json_to_value(json, &ConvertOptions::default()))
                } else {
                    Token::Regex(Pattern::new(&body).map_err(|e| {
                        LexError::new(format!("invalid regex literal: {}", e), position)
                    })?)
                }
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();

                match ident.as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    "NaN" => Token::Float(f64::NAN),
                    "Infinity" => Token::Float(f64::INFINITY),
                    "not" => Token::Not,
                    _ => Token::Identifier(ident),
                }
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) => {
                return Err(LexError::new(
                    format!("unexpected character '{}'", ch),
                    position,
                ));
            }
        };

        self.after_dot = token == Token::Dot;
        self.after_value = matches!(
            token,
            Token::At
                | Token::Identifier(_)
                | Token::String(_)
                | Token::Json(_)
                | Token::Integer(_)
                | Token::Float(_)
                | Token::RBracket
                | Token::RParen
                | Token::RBrace
        );
        Ok(Spanned { token, position })
    }
}

fn closer(open: &Token) -> Token {
    match open {
        Token::LParen => Token::RParen,
        Token::LBracket => Token::RBracket,
        _ => Token::RBrace,
    }
}

/// Splits query text into tokens ending with [`Token::Eof`], and reports
/// whether the query is an assignment.
///
/// Brackets must balance, and at most one `=` may appear with something on
/// both sides of it.
///
/// # Examples
///
/// ```
/// use mace_lang::{ast::Token, lexer::tokenize};
///
/// let (tokens, is_assignment) = tokenize("@.a = 1").unwrap();
/// assert!(is_assignment);
/// assert_eq!(tokens[1].token, Token::Dot);
///
/// assert!(tokenize("@.a[0").is_err());
/// ```
pub fn tokenize(input: &str) -> Result<(Vec<Spanned>, bool), LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    let mut open: Vec<(Token, usize)> = Vec::new();
    let mut assignment: Option<usize> = None;

    loop {
        let spanned = lexer.next_token()?;
        match &spanned.token {
            Token::LParen | Token::LBracket | Token::LBrace => {
                open.push((spanned.token.clone(), spanned.position));
            }
            Token::RParen | Token::RBracket | Token::RBrace => match open.pop() {
                Some((opener, _)) if closer(&opener) == spanned.token => {}
                _ => {
                    return Err(LexError::new(
                        format!("unmatched '{}'", spanned.token),
                        spanned.position,
                    ));
                }
            },
            Token::Assign => {
                if assignment.is_some() {
                    return Err(LexError::new(
                        "a query may contain only one assignment",
                        spanned.position,
                    ));
                }
                if tokens.is_empty() {
                    return Err(LexError::new(
                        "assignment has no left-hand side",
                        spanned.position,
                    ));
                }
                assignment = Some(spanned.position);
            }
            Token::Eof => {
                if let Some((opener, position)) = open.pop() {
                    return Err(LexError::new(format!("unclosed '{}'", opener), position));
                }
                if let Some(position) = assignment {
                    if tokens.last().is_some_and(|t: &Spanned| t.token == Token::Assign) {
                        return Err(LexError::new("assignment has no right-hand side", position));
                    }
                }
                tokens.push(spanned);
                break;
            }
            _ => {}
        }
        tokens.push(spanned);
    }

    Ok((tokens, assignment.is_some()))
}
