//! Compiled query handles.

use std::sync::Arc;

use tracing::debug;

use crate::{
    ast::Expr,
    evaluator::{self, EvalError, Thunk},
    lexer,
    parser::{CompileOptions, ParseError, Parser},
    transform::Assignment,
    value::Value,
};

/// Errors from compiling or running a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The text is not a valid query
    Syntax(ParseError),

    /// The query failed while compiling its functions or evaluating
    Eval(EvalError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Syntax(e) => write!(f, "{}", e),
            QueryError::Eval(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Syntax(e) => Some(e),
            QueryError::Eval(e) => Some(e),
        }
    }
}

impl From<ParseError> for QueryError {
    fn from(e: ParseError) -> Self {
        QueryError::Syntax(e)
    }
}

impl From<EvalError> for QueryError {
    fn from(e: EvalError) -> Self {
        QueryError::Eval(e)
    }
}

enum Plan {
    Read(Thunk),
    Assign(Assignment),
}

/// A query compiled once and run against any number of documents.
///
/// Compiled queries hold no per-run state, so one handle can be shared
/// between threads; each run supplies its own document.
///
/// # Examples
///
/// ```
/// use mace_lang::{Query, Value, convert::parse_json};
///
/// let doc = parse_json(r#"{"foo": [[0, 1, 2], [3, 4, 5], [6, 7, 8]]}"#, &Default::default()).unwrap();
///
/// let query = Query::compile("@.foo[-2:]").unwrap();
/// assert_eq!(query.search(&doc).unwrap().to_string(), "[[3,4,5],[6,7,8]]");
///
/// let mut doc = parse_json(r#"{"foo": [-1, 2, 3]}"#, &Default::default()).unwrap();
/// let bump = Query::compile("@.foo[@ < 0] = @ + 1").unwrap();
/// assert!(bump.is_assignment());
/// bump.mutate(&mut doc).unwrap();
/// assert_eq!(doc.to_string(), r#"{"foo":[0,2,3]}"#);
/// ```
#[derive(Clone)]
pub struct Query {
    text: Arc<str>,
    plan: Arc<Plan>,
}

impl Query {
    /// Compiles `text` with the default options.
    pub fn compile(text: &str) -> Result<Self, QueryError> {
        Self::compile_with(text, &CompileOptions::default())
    }

    pub fn compile_with(text: &str, options: &CompileOptions) -> Result<Self, QueryError> {
        let (tokens, is_assignment) = lexer::tokenize(text).map_err(ParseError::from)?;
        let token_count = tokens.len();
        let expr = Parser::new(tokens, options).parse()?;

        let plan = match &expr {
            Expr::Assign { target, value } => Plan::Assign(Assignment::compile(target, value)?),
            other => Plan::Read(evaluator::compile(other)?),
        };
        debug!(
            tokens = token_count,
            assignment = is_assignment,
            depth = depth(&expr),
            "compiled query"
        );
        Ok(Query {
            text: text.into(),
            plan: Arc::new(plan),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_assignment(&self) -> bool {
        matches!(*self.plan, Plan::Assign(_))
    }

    /// Evaluates a read-only query against `root`.
    ///
    /// Assignment queries are refused here; use [`Query::mutate`].
    pub fn search(&self, root: &Value) -> Result<Value, QueryError> {
        match &*self.plan {
            Plan::Read(thunk) => Ok(thunk(root)?),
            Plan::Assign(_) => Err(QueryError::Eval(EvalError::TypeError(
                "assignment queries modify their input; use mutate".into(),
            ))),
        }
    }

    /// Runs the query against `root`, rewriting it in place for an
    /// assignment. Returns the assigned values, or the query result for a
    /// read-only query.
    pub fn mutate(&self, root: &mut Value) -> Result<Value, QueryError> {
        match &*self.plan {
            Plan::Read(thunk) => Ok(thunk(root)?),
            Plan::Assign(assignment) => Ok(assignment.apply(root)?),
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("assignment", &self.is_assignment())
            .finish()
    }
}

/// Height of the expression tree.
fn depth(expr: &Expr) -> usize {
    use crate::ast::{Projection, Step};

    let step_depth = |step: &Step| match step {
        Step::Filter(e) | Step::Map(e) => depth(e),
        Step::Projection(Projection::Object(entries)) => {
            entries.iter().map(|(_, e)| depth(e)).max().unwrap_or(0)
        }
        Step::Projection(Projection::Array(entries)) => entries.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    };
    1 + match expr {
        Expr::Literal(_) | Expr::Current | Expr::Regex(_) | Expr::Slice(_) => 0,
        Expr::Unary { operand, .. } => depth(operand),
        Expr::Binary { left, right, .. } | Expr::Assign { target: left, value: right } => {
            depth(left).max(depth(right))
        }
        Expr::Indexed { target, steps } => steps
            .iter()
            .map(step_depth)
            .max()
            .unwrap_or(0)
            .max(depth(target)),
        Expr::Call { args, .. } => args.iter().flatten().map(depth).max().unwrap_or(0),
    }
}
