use std::fmt;

use crate::{
    ast::{
        BinOp, Expr, KeySelector, PositionSelector, Projection, SliceSpec, Spanned, Step, Token,
        UnaryOp,
    },
    functions,
    lexer::{tokenize, LexError},
    value::Value,
};

/// Settings that shape how a query compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Deepest expression nesting the parser accepts before giving up.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { max_depth: 512 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Lex(LexError),
    UnexpectedToken {
        found: Token,
        expected: &'static str,
        position: usize,
    },
    UnexpectedEof {
        expected: &'static str,
        position: usize,
    },
    TooDeep {
        limit: usize,
        position: usize,
    },
    Invalid {
        message: String,
        position: usize,
    },
}

impl ParseError {
    /// Character offset the error points at.
    pub fn position(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.position,
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position, .. }
            | ParseError::TooDeep { position, .. }
            | ParseError::Invalid { position, .. } => *position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "Syntax error: {}", e),
            ParseError::UnexpectedToken {
                found,
                expected,
                position,
            } => write!(
                f,
                "Syntax error: expected {}, found '{}' at position {}",
                expected, found, position
            ),
            ParseError::UnexpectedEof { expected, position } => write!(
                f,
                "Syntax error: expected {}, found end of input at position {}",
                expected, position
            ),
            ParseError::TooDeep { limit, position } => write!(
                f,
                "Syntax error: expression nested deeper than {} levels at position {}",
                limit, position
            ),
            ParseError::Invalid { message, position } => {
                write!(f, "Syntax error: {} at position {}", message, position)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Lex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

/// Shape of the tokens between a `[` and its `]`.
enum BracketKind {
    Star,
    Positions,
    Keys,
    Filter,
}

/// An operator still waiting for its right-hand operand.
enum Pending {
    Unary(UnaryOp),
    Binary(BinOp, Expr),
}

/// The construct that opened a nesting level; it receives the level's
/// expression once the closing token arrives.
enum Frame {
    Group,
    Call {
        name: String,
        args: Vec<Option<Expr>>,
    },
    Filter {
        target: Expr,
        steps: Vec<Step>,
    },
    Projection {
        target: Expr,
        steps: Vec<Step>,
        entries: Projection,
        key: Option<String>,
    },
    Map {
        target: Expr,
        steps: Vec<Step>,
    },
}

/// An open frame along with the operators its level was holding.
struct Enclosing {
    frame: Frame,
    pending: Vec<Pending>,
}

/// Heap-allocated parse stack, so nesting depth never grows the call stack.
#[derive(Default)]
struct Nesting {
    pending: Vec<Pending>,
    frames: Vec<Enclosing>,
}

/// Where the expression loop stands.
enum State {
    /// An operand is required next
    Operand,
    /// A base value has been read; indexer steps may follow
    Postfix(Expr, Vec<Step>),
    /// A whole operand has been read
    Complete(Expr),
    Done(Expr),
}

fn binary_operator(token: &Token) -> Option<BinOp> {
    let op = match token {
        Token::Ampersand => BinOp::And,
        Token::Pipe => BinOp::Or,
        Token::Caret => BinOp::Xor,
        Token::EqEq => BinOp::Equal,
        Token::NotEq => BinOp::NotEqual,
        Token::Lt => BinOp::LessThan,
        Token::Gt => BinOp::GreaterThan,
        Token::LtEq => BinOp::LessEqual,
        Token::GtEq => BinOp::GreaterEqual,
        Token::Tilde => BinOp::Matches,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Subtract,
        Token::Star => BinOp::Multiply,
        Token::Slash => BinOp::Divide,
        Token::DoubleSlash => BinOp::FloorDivide,
        Token::Percent => BinOp::Modulo,
        Token::DoubleStar => BinOp::Power,
        _ => return None,
    };
    Some(op)
}


pub struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, options: &CompileOptions) -> Self {
        Parser {
            tokens,
            index: 0,
            depth: 0,
            max_depth: options.max_depth,
        }
    }

    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn peek(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.index + offset)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.position)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.current() {
            Token::Eof => ParseError::UnexpectedEof {
                expected,
                position: self.position(),
            },
            found => ParseError::UnexpectedToken {
                found: found.clone(),
                expected,
                position: self.position(),
            },
        }
    }

    fn invalid(&self, message: impl Into<String>) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            position: self.position(),
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        if !self.check(&expected) {
            return Err(self.unexpected(what));
        }
        self.advance();
        Ok(())
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
                position: self.position(),
            });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Parses a whole query: one expression, or `lhs = rhs`.
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;

        if self.check(&Token::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            self.expect(Token::Eof, "end of query")?;
            return Ok(Expr::Assign {
                target: Box::new(expr),
                value: Box::new(value),
            });
        }

        self.expect(Token::Eof, "end of query")?;
        Ok(expr)
    }

    /// Parses one expression, stopping at the first token that cannot
    /// continue it.
    ///
    /// Nested groups, calls, filters, projections and maps are tracked on
    /// an explicit stack, so the nesting limit is the only bound on depth.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let mut nest = Nesting::default();
        let mut state = State::Operand;

        loop {
            state = match state {
                State::Operand => self.parse_operand(&mut nest)?,
                State::Postfix(target, steps) => self.parse_postfix(&mut nest, target, steps)?,
                State::Complete(operand) => self.complete(&mut nest, operand)?,
                State::Done(expr) => {
                    self.ascend();
                    return Ok(expr);
                }
            };
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn open(&mut self, nest: &mut Nesting, frame: Frame) -> Result<(), ParseError> {
        self.descend()?;
        let pending = std::mem::take(&mut nest.pending);
        nest.frames.push(Enclosing { frame, pending });
        Ok(())
    }

    /// Pops the innermost frame and hands it the finished expression.
    fn close(&mut self, nest: &mut Nesting, value: Option<Expr>) -> Result<State, ParseError> {
        let Some(Enclosing { frame, pending }) = nest.frames.pop() else {
            return Err(self.invalid("unbalanced delimiters"));
        };
        self.ascend();
        nest.pending = pending;

        let state = match (frame, value) {
            (Frame::Call { name, args }, _) => State::Postfix(Expr::Call { name, args }, Vec::new()),
            (
                Frame::Projection {
                    target,
                    mut steps,
                    entries,
                    ..
                },
                _,
            ) => {
                steps.push(Step::Projection(entries));
                State::Postfix(target, steps)
            }
            (Frame::Group, Some(expr)) => State::Postfix(expr, Vec::new()),
            (Frame::Filter { target, mut steps }, Some(expr)) => {
                steps.push(Step::Filter(Box::new(expr)));
                State::Postfix(target, steps)
            }
            (Frame::Map { target, mut steps }, Some(expr)) => {
                steps.push(Step::Map(Box::new(expr)));
                State::Postfix(target, steps)
            }
            (_, None) => return Err(self.unexpected("a value")),
        };
        Ok(state)
    }

    /// Folds every pending operator binding at least as tightly as
    /// `min_precedence` into `operand`.
    fn reduce(&mut self, nest: &mut Nesting, mut operand: Expr, min_precedence: u8) -> Expr {
        while let Some(pending) = nest.pending.pop() {
            let precedence = match &pending {
                Pending::Unary(_) => UnaryOp::PRECEDENCE,
                Pending::Binary(op, _) => op.precedence(),
            };
            if precedence < min_precedence {
                nest.pending.push(pending);
                break;
            }
            operand = match pending {
                Pending::Unary(op) => {
                    self.ascend();
                    Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    }
                }
                Pending::Binary(BinOp::Power, base) => {
                    self.ascend();
                    Self::binary(BinOp::Power, base, operand)
                }
                Pending::Binary(op, left) => Self::binary(op, left, operand),
            };
        }
        operand
    }

    /// Prefix operators, literals, `@`, `(`, and the head of a call.
    fn parse_operand(&mut self, nest: &mut Nesting) -> Result<State, ParseError> {
        let prefix = match self.current() {
            Token::Minus => Some(UnaryOp::Negate),
            Token::Plus => Some(UnaryOp::Plus),
            Token::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = prefix {
            self.advance();
            self.descend()?;
            nest.pending.push(Pending::Unary(op));
            return Ok(State::Operand);
        }

        let position = self.position();
        let base = match self.advance() {
            Token::Integer(n) => Expr::Literal(Value::Integer(n)),
            Token::Float(n) => Expr::Literal(Value::Float(n)),
            Token::String(s) => Expr::Literal(Value::String(s)),
            Token::Boolean(b) => Expr::Literal(Value::Boolean(b)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Json(v) => Expr::Literal(v),
            Token::Regex(p) => Expr::Regex(p),
            Token::At => Expr::Current,
            Token::LParen => {
                self.open(nest, Frame::Group)?;
                return Ok(State::Operand);
            }
            Token::Identifier(name) if self.check(&Token::LParen) => {
                if functions::lookup(&name).is_none() {
                    return Err(ParseError::Invalid {
                        message: format!("unknown function '{}'", name),
                        position,
                    });
                }
                self.advance();
                self.open(
                    nest,
                    Frame::Call {
                        name,
                        args: Vec::new(),
                    },
                )?;
                if self.check(&Token::RParen) {
                    self.advance();
                    return self.close(nest, None);
                }
                return self.begin_argument(nest);
            }
            Token::Identifier(name) => Expr::Literal(Value::String(name)),
            _ => {
                self.index -= 1;
                return Err(self.unexpected("a value"));
            }
        };
        Ok(State::Postfix(base, Vec::new()))
    }

    /// Indexer steps after a base value. A filter, projection or map body
    /// opens a new level instead of recursing.
    fn parse_postfix(
        &mut self,
        nest: &mut Nesting,
        target: Expr,
        mut steps: Vec<Step>,
    ) -> Result<State, ParseError> {
        loop {
            let negated = self.check(&Token::Bang);
            if negated {
                self.advance();
                if !matches!(self.current(), Token::Dot | Token::LBracket) {
                    return Err(self.unexpected("'.' or '[' after '!'"));
                }
            }

            match self.current() {
                Token::Dot => {
                    self.advance();
                    steps.push(self.parse_dot_step(negated)?);
                }
                Token::LBracket => {
                    self.advance();
                    match self.parse_bracket(negated)? {
                        Some(step) => steps.push(step),
                        None => {
                            self.open(nest, Frame::Filter { target, steps })?;
                            return Ok(State::Operand);
                        }
                    }
                }
                Token::LBrace => {
                    self.advance();
                    let labelled = self.at_projection_label();
                    let key = self.projection_key(labelled)?;
                    let entries = if labelled {
                        Projection::Object(Vec::new())
                    } else {
                        Projection::Array(Vec::new())
                    };
                    self.open(
                        nest,
                        Frame::Projection {
                            target,
                            steps,
                            entries,
                            key,
                        },
                    )?;
                    return Ok(State::Operand);
                }
                Token::Arrow => {
                    self.advance();
                    self.open(nest, Frame::Map { target, steps })?;
                    return Ok(State::Operand);
                }
                _ => break,
            }
        }

        if steps.is_empty() {
            return Ok(State::Complete(target));
        }
        Ok(State::Complete(Expr::Indexed {
            target: Box::new(target),
            steps,
        }))
    }

    /// Continues after a whole operand: either another operator follows,
    /// or the current level ends and its frame takes the expression.
    fn complete(&mut self, nest: &mut Nesting, operand: Expr) -> Result<State, ParseError> {
        // a map body is a single unary operand, so only `**` extends it
        let in_map = matches!(
            nest.frames.last(),
            Some(Enclosing {
                frame: Frame::Map { .. },
                ..
            })
        );

        if let Some(op) = binary_operator(self.current()) {
            if op == BinOp::Power {
                self.advance();
                self.descend()?;
                nest.pending.push(Pending::Binary(op, operand));
                return Ok(State::Operand);
            }
            if !in_map {
                self.advance();
                let left = self.reduce(nest, operand, op.precedence());
                nest.pending.push(Pending::Binary(op, left));
                return Ok(State::Operand);
            }
        }

        let expr = self.reduce(nest, operand, 0);
        let Some(enclosing) = nest.frames.last_mut() else {
            return Ok(State::Done(expr));
        };
        match &mut enclosing.frame {
            Frame::Group => {
                self.expect(Token::RParen, "')'")?;
                self.close(nest, Some(expr))
            }
            Frame::Filter { .. } => {
                self.expect(Token::RBracket, "']'")?;
                self.close(nest, Some(expr))
            }
            Frame::Map { .. } => self.close(nest, Some(expr)),
            Frame::Call { .. } => match self.end_argument(nest, Some(expr))? {
                Some(state) => Ok(state),
                None => self.begin_argument(nest),
            },
            Frame::Projection { entries, key, .. } => {
                let labelled = match entries {
                    Projection::Object(pairs) => {
                        pairs.push((key.take().unwrap_or_default(), expr));
                        true
                    }
                    Projection::Array(items) => {
                        items.push(expr);
                        false
                    }
                };
                match self.advance() {
                    Token::Comma => {
                        *key = self.projection_key(labelled)?;
                        Ok(State::Operand)
                    }
                    Token::RBrace => self.close(nest, None),
                    _ => {
                        self.index -= 1;
                        Err(self.unexpected("',' or '}'"))
                    }
                }
            }
        }
    }

    /// Starts the next call argument. Empty slots and slice literals are
    /// taken here; anything else is an expression.
    fn begin_argument(&mut self, nest: &mut Nesting) -> Result<State, ParseError> {
        loop {
            let arg = match self.current() {
                Token::Comma | Token::RParen => None,
                _ if self.at_slice_argument() => match self.parse_position()? {
                    PositionSelector::Slice(spec) => Some(Expr::Slice(spec)),
                    PositionSelector::Index(n) => Some(Expr::Literal(Value::Integer(n))),
                },
                _ => return Ok(State::Operand),
            };
            if let Some(state) = self.end_argument(nest, arg)? {
                return Ok(state);
            }
        }
    }

    /// Records an argument, then closes the call on `)`. Returns `None`
    /// when a `,` announces another argument.
    fn end_argument(
        &mut self,
        nest: &mut Nesting,
        arg: Option<Expr>,
    ) -> Result<Option<State>, ParseError> {
        if let Some(Enclosing {
            frame: Frame::Call { args, .. },
            ..
        }) = nest.frames.last_mut()
        {
            args.push(arg);
        }
        match self.advance() {
            Token::Comma => Ok(None),
            Token::RParen => self.close(nest, None).map(Some),
            _ => {
                self.index -= 1;
                Err(self.unexpected("',' or ')'"))
            }
        }
    }

    /// A key written after `.`; numbers and keywords are keys here too.
    fn key_after_dot(&mut self) -> Option<KeySelector> {
        let name = match self.current() {
            Token::Identifier(s) | Token::String(s) => s.clone(),
            Token::Integer(n) => n.to_string(),
            Token::Not => "not".to_string(),
            Token::Null => "null".to_string(),
            Token::Boolean(b) => b.to_string(),
            Token::Regex(p) => {
                let p = p.clone();
                self.advance();
                return Some(KeySelector::Pattern(p));
            }
            _ => return None,
        };
        self.advance();
        Some(KeySelector::Name(name))
    }

    /// Whatever follows a `.`: a key, `*`, or a second `.` for recursive search.
    fn parse_dot_step(&mut self, negated: bool) -> Result<Step, ParseError> {
        match self.current() {
            Token::Star if !negated => {
                self.advance();
                Ok(Step::Star)
            }
            Token::Dot if !negated => {
                self.advance();
                match self.current() {
                    Token::Star => {
                        self.advance();
                        Ok(Step::Descend(None))
                    }
                    Token::LBracket => {
                        self.advance();
                        let keys = self.parse_key_list()?;
                        Ok(Step::Descend(Some(keys)))
                    }
                    _ => match self.key_after_dot() {
                        Some(key) => Ok(Step::Descend(Some(vec![key]))),
                        None => Err(self.unexpected("key, regex, '[' or '*' after '..'")),
                    },
                }
            }
            _ => match self.key_after_dot() {
                Some(key) => Ok(Step::Keys {
                    selectors: vec![key],
                    negated,
                }),
                None => Err(self.unexpected("key or regex after '.'")),
            },
        }
    }

    /// Classifies a bracket body by scanning ahead to its closing `]`.
    fn classify_bracket(&self) -> Result<BracketKind, ParseError> {
        if self.check(&Token::Star) && self.peek(1) == &Token::RBracket {
            return Ok(BracketKind::Star);
        }
        let mut positional = false;
        let mut keyed = false;
        let mut offset = 0;
        loop {
            match self.peek(offset) {
                Token::RBracket | Token::Eof => break,
                Token::Integer(_) | Token::Minus | Token::Colon => positional = true,
                Token::Identifier(_) | Token::String(_) | Token::Regex(_) => keyed = true,
                Token::Comma => {}
                _ => return Ok(BracketKind::Filter),
            }
            offset += 1;
        }
        match (positional, keyed) {
            (true, true) => Err(self.invalid("cannot mix keys and positions in one indexer")),
            (true, false) => Ok(BracketKind::Positions),
            (false, true) => Ok(BracketKind::Keys),
            (false, false) => Err(self.unexpected("index, key or expression inside '[]'")),
        }
    }

    /// Body of `[...]` or `![...]`, after the `[`. A filter body is left
    /// to the caller, signalled by `None`.
    fn parse_bracket(&mut self, negated: bool) -> Result<Option<Step>, ParseError> {
        let step = match self.classify_bracket()? {
            BracketKind::Filter if !negated => return Ok(None),
            BracketKind::Star if !negated => {
                self.advance();
                self.expect(Token::RBracket, "']'")?;
                Step::Star
            }
            BracketKind::Keys => Step::Keys {
                selectors: self.parse_key_list()?,
                negated,
            },
            BracketKind::Positions => {
                let mut selectors = vec![self.parse_position()?];
                while self.check(&Token::Comma) {
                    self.advance();
                    selectors.push(self.parse_position()?);
                }
                self.expect(Token::RBracket, "',' or ']'")?;
                Step::Positions { selectors, negated }
            }
            _ => return Err(self.invalid("'!' needs keys or positions to exclude")),
        };
        Ok(Some(step))
    }

    /// `a, `b`, g`c`]`, consuming the closing `]`.
    fn parse_key_list(&mut self) -> Result<Vec<KeySelector>, ParseError> {
        let mut keys = Vec::new();
        loop {
            let key = match self.advance() {
                Token::Identifier(s) | Token::String(s) => KeySelector::Name(s),
                Token::Regex(p) => KeySelector::Pattern(p),
                _ => {
                    self.index -= 1;
                    return Err(self.unexpected("key or regex"));
                }
            };
            keys.push(key);
            match self.advance() {
                Token::Comma => continue,
                Token::RBracket => return Ok(keys),
                _ => {
                    self.index -= 1;
                    return Err(self.unexpected("',' or ']'"));
                }
            }
        }
    }

    fn parse_signed_int(&mut self) -> Result<Option<i64>, ParseError> {
        let negative = self.check(&Token::Minus);
        let offset = usize::from(negative);
        match self.peek(offset) {
            Token::Integer(n) => {
                let n = *n;
                self.index += offset + 1;
                Ok(Some(if negative { -n } else { n }))
            }
            _ if negative => {
                self.advance();
                Err(self.unexpected("integer after '-'"))
            }
            _ => Ok(None),
        }
    }

    /// `n` or `start:stop:step` with optional parts.
    fn parse_position(&mut self) -> Result<PositionSelector, ParseError> {
        let start = self.parse_signed_int()?;
        if !self.check(&Token::Colon) {
            return match start {
                Some(n) => Ok(PositionSelector::Index(n)),
                None => Err(self.unexpected("index or slice")),
            };
        }
        self.advance();
        let stop = self.parse_signed_int()?;
        let step = if self.check(&Token::Colon) {
            self.advance();
            self.parse_signed_int()?
        } else {
            None
        };
        Ok(PositionSelector::Slice(SliceSpec { start, stop, step }))
    }

    fn at_projection_label(&self) -> bool {
        matches!(
            (self.current(), self.peek(1)),
            (Token::Identifier(_) | Token::String(_), Token::Colon)
        )
    }

    /// Reads `key:` before a labelled projection entry. Every entry of a
    /// projection must agree on whether it is labelled.
    fn projection_key(&mut self, labelled: bool) -> Result<Option<String>, ParseError> {
        if self.at_projection_label() != labelled {
            return Err(self.invalid("cannot mix labelled and unlabelled projection entries"));
        }
        if !labelled {
            return Ok(None);
        }
        let key = match self.advance() {
            Token::Identifier(s) | Token::String(s) => s,
            _ => return Err(self.invalid("projection key")),
        };
        self.advance();
        Ok(Some(key))
    }

    /// Looks ahead for an argument written as a slice (`:2`, `1:`, `-3::-1`).
    fn at_slice_argument(&self) -> bool {
        let mut offset = 0;
        if self.peek(offset) == &Token::Minus {
            offset += 1;
        }
        if matches!(self.peek(offset), Token::Integer(_)) {
            offset += 1;
        } else if offset > 0 {
            return false;
        }
        self.peek(offset) == &Token::Colon
    }
}

/// Lexes and parses query text into an expression tree.
///
/// # Examples
///
/// ```
/// use mace_lang::{ast::Expr, parser::{parse, CompileOptions}};
///
/// let tree = parse("@.foo[0] = 1", &CompileOptions::default()).unwrap();
/// assert!(matches!(tree, Expr::Assign { .. }));
/// ```
pub fn parse(input: &str, options: &CompileOptions) -> Result<Expr, ParseError> {
    let (tokens, _) = tokenize(input)?;
    Parser::new(tokens, options).parse()
}
