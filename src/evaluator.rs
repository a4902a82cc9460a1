use std::{collections::HashSet, sync::Arc};

use tracing::trace;

use crate::{
    ast::{BinOp, Expr, KeySelector, PositionSelector, Projection, Step},
    functions::{self, Arg, FunctionSpec},
    ops,
    transform::{PathSegment, resolve},
    value::{Map, Value},
};

/// A compiled sub-expression: called with the value `@` stands for.
pub type Thunk = Arc<dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync>;

/// Errors that can occur during query evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Operand kinds an operator or step is not defined for
    TypeError(String),

    /// A function called with the wrong number or kind of arguments
    ///
    /// `position` is 0-based.
    ArgumentError {
        function: String,
        position: usize,
        message: String,
    },

    /// Out-of-range access where a hard failure is intended
    IndexError(String),

    /// Missing key where a hard failure is intended
    KeyError(String),

    /// Assignment to something that is not a location in the input
    NotAddressable(String),

    /// A pattern that does not compile
    InvalidRegex(String),

    /// Division or modulo by zero, or integer overflow
    Arithmetic(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::TypeError(msg) => write!(f, "Type error: {}", msg),
            EvalError::ArgumentError {
                function,
                position,
                message,
            } => write!(
                f,
                "Argument error: {}() argument {}: {}",
                function, position, message
            ),
            EvalError::IndexError(msg) => write!(f, "Index error: {}", msg),
            EvalError::KeyError(msg) => write!(f, "Key error: {}", msg),
            EvalError::NotAddressable(msg) => write!(f, "Not addressable: {}", msg),
            EvalError::InvalidRegex(msg) => write!(f, "Invalid regex: {}", msg),
            EvalError::Arithmetic(msg) => write!(f, "Arithmetic error: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

/// One compiled link of an indexer chain.
pub(crate) struct Indexer {
    kind: IndexerKind,
    /// Yields the picked child itself instead of a collection
    single: bool,
}

enum IndexerKind {
    Keys {
        selectors: Vec<KeySelector>,
        negated: bool,
    },
    Positions {
        selectors: Vec<PositionSelector>,
        negated: bool,
    },
    Star,
    Filter(Thunk),
    Descend(Option<Vec<KeySelector>>),
    ProjectObject(Vec<(String, Thunk)>),
    ProjectArray(Vec<Thunk>),
    Map(Thunk),
}

/// What an indexer picks out of the value it is applied to.
pub(crate) enum Picked {
    /// Array positions, in selection order
    Elements(Vec<usize>),
    /// Object entry indices, in selection order
    Entries(Vec<usize>),
    /// The value as a whole
    Itself,
    /// Nothing, from a false boolean index on a scalar
    Nothing,
    /// Paths to matches of a recursive search
    Descendants(Vec<Vec<PathSegment>>),
    /// A value built from the input rather than found in it
    Computed(Value),
}

impl Indexer {
    pub(crate) fn is_single(&self) -> bool {
        self.single
    }

    pub(crate) fn name(&self) -> &'static str {
        match self.kind {
            IndexerKind::Keys { .. } => "key selection",
            IndexerKind::Positions { .. } => "index selection",
            IndexerKind::Star => "star",
            IndexerKind::Filter(_) => "boolean index",
            IndexerKind::Descend(_) => "recursive search",
            IndexerKind::ProjectObject(_) | IndexerKind::ProjectArray(_) => "projection",
            IndexerKind::Map(_) => "map",
        }
    }

    pub(crate) fn pick(&self, value: &Value) -> Result<Picked, EvalError> {
        match &self.kind {
            IndexerKind::Keys { selectors, negated } => {
                let Value::Object(obj) = value else {
                    return Err(EvalError::TypeError(format!(
                        "cannot select keys from {}",
                        value.type_name()
                    )));
                };
                let mut picked = Vec::new();
                let mut seen = HashSet::new();
                for selector in selectors {
                    match selector {
                        KeySelector::Name(name) => {
                            if let Some(i) = obj.get_index_of(name) {
                                push_unique(&mut picked, &mut seen, i);
                            }
                        }
                        KeySelector::Pattern(pattern) => {
                            for (i, key) in obj.keys().enumerate() {
                                if pattern.regex().is_match(key) {
                                    push_unique(&mut picked, &mut seen, i);
                                }
                            }
                        }
                    }
                }
                if *negated {
                    picked = complement(&picked, obj.len());
                }
                Ok(Picked::Entries(picked))
            }
            IndexerKind::Positions { selectors, negated } => {
                let Value::Array(items) = value else {
                    return Err(EvalError::TypeError(format!(
                        "cannot index {} by position",
                        value.type_name()
                    )));
                };
                let mut picked = Vec::new();
                for selector in selectors {
                    match selector {
                        PositionSelector::Index(i) => {
                            picked.extend(functions::wrap_index(*i, items.len()));
                        }
                        PositionSelector::Slice(slice) => picked.extend(slice.indices(items.len())),
                    }
                }
                if *negated {
                    picked = complement(&picked, items.len());
                }
                Ok(Picked::Elements(picked))
            }
            IndexerKind::Star => match value {
                Value::Array(items) => Ok(Picked::Elements((0..items.len()).collect())),
                Value::Object(obj) => Ok(Picked::Entries((0..obj.len()).collect())),
                other => Err(EvalError::TypeError(format!(
                    "cannot take every child of {}",
                    other.type_name()
                ))),
            },
            IndexerKind::Filter(mask) => filter(value, &mask(value)?),
            IndexerKind::Descend(selectors) => {
                let mut found = Vec::new();
                descend(value, selectors.as_deref(), &mut Vec::new(), &mut found);
                Ok(Picked::Descendants(found))
            }
            IndexerKind::ProjectObject(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, thunk) in entries {
                    out.insert(key.clone(), thunk(value)?);
                }
                Ok(Picked::Computed(Value::Object(out)))
            }
            IndexerKind::ProjectArray(entries) => entries
                .iter()
                .map(|thunk| thunk(value))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Picked::Computed(Value::Array(items))),
            IndexerKind::Map(thunk) => thunk(value).map(Picked::Computed),
        }
    }
}

fn push_unique(picked: &mut Vec<usize>, seen: &mut HashSet<usize>, i: usize) {
    if seen.insert(i) {
        picked.push(i);
    }
}

/// Indices below `len` that are not in `picked`, ascending.
fn complement(picked: &[usize], len: usize) -> Vec<usize> {
    let excluded: HashSet<usize> = picked.iter().copied().collect();
    (0..len).filter(|i| !excluded.contains(i)).collect()
}

fn filter(value: &Value, mask: &Value) -> Result<Picked, EvalError> {
    let not_bool = |v: &Value| {
        EvalError::TypeError(format!(
            "boolean index must hold booleans, found {}",
            v.type_name()
        ))
    };
    match (value, mask) {
        (Value::Array(items), Value::Boolean(keep)) => Ok(Picked::Elements(if *keep {
            (0..items.len()).collect()
        } else {
            Vec::new()
        })),
        (Value::Object(_), Value::Boolean(false)) => Ok(Picked::Entries(Vec::new())),
        (_, Value::Boolean(true)) => Ok(Picked::Itself),
        (_, Value::Boolean(false)) => Ok(Picked::Nothing),
        (Value::Array(items), Value::Array(flags)) if items.len() == flags.len() => {
            let mut picked = Vec::new();
            for (i, flag) in flags.iter().enumerate() {
                match flag {
                    Value::Boolean(true) => picked.push(i),
                    Value::Boolean(false) => {}
                    other => return Err(not_bool(other)),
                }
            }
            Ok(Picked::Elements(picked))
        }
        (Value::Object(obj), Value::Object(flags)) if obj.len() == flags.len() => {
            let mut picked = Vec::new();
            for (i, key) in obj.keys().enumerate() {
                match flags.get(key) {
                    Some(Value::Boolean(true)) => picked.push(i),
                    Some(Value::Boolean(false)) => {}
                    Some(other) => return Err(not_bool(other)),
                    None => {
                        return Err(EvalError::TypeError(format!(
                            "boolean index has no entry for key '{}'",
                            key
                        )));
                    }
                }
            }
            Ok(Picked::Entries(picked))
        }
        _ => Err(EvalError::TypeError(format!(
            "boolean index on {} must be a boolean or a mask of the same shape, got {}",
            value.type_name(),
            mask.type_name()
        ))),
    }
}

/// Depth-first pre-order search. A key match is collected and not searched
/// further; without selectors every scalar leaf is collected.
fn descend(
    value: &Value,
    selectors: Option<&[KeySelector]>,
    path: &mut Vec<PathSegment>,
    found: &mut Vec<Vec<PathSegment>>,
) {
    match value {
        Value::Object(obj) => {
            for (i, (key, child)) in obj.iter().enumerate() {
                path.push(PathSegment::Key(i));
                let hit = match selectors {
                    Some(selectors) => selectors.iter().any(|s| match s {
                        KeySelector::Name(name) => name == key,
                        KeySelector::Pattern(pattern) => pattern.regex().is_match(key),
                    }),
                    None => child.is_scalar(),
                };
                if hit {
                    found.push(path.clone());
                } else {
                    descend(child, selectors, path, found);
                }
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                if selectors.is_none() && child.is_scalar() {
                    found.push(path.clone());
                } else {
                    descend(child, selectors, path, found);
                }
                path.pop();
            }
        }
        _ => {}
    }
}

/// Applies an indexer chain to `value`.
///
/// A step that picks one child passes it straight on; a step that picks
/// several applies the rest of the chain to each and collects the results,
/// dropping any that came back empty.
pub(crate) fn apply_chain(value: &Value, steps: &[Indexer]) -> Result<Value, EvalError> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(value.clone());
    };
    trace!(step = step.name(), kind = value.type_name(), "applying indexer");

    let keep = |result: &Value| rest.is_empty() || !result.is_empty_container();
    match step.pick(value)? {
        Picked::Computed(computed) => apply_chain(&computed, rest),
        Picked::Itself => apply_chain(value, rest),
        Picked::Nothing => Ok(Value::Array(Vec::new())),
        Picked::Elements(picked) => {
            let items = match value {
                Value::Array(items) => items.as_slice(),
                _ => &[],
            };
            if step.is_single() {
                return match picked.first().and_then(|&i| items.get(i)) {
                    Some(child) => apply_chain(child, rest),
                    None => Ok(Value::Array(Vec::new())),
                };
            }
            let mut out = Vec::with_capacity(picked.len());
            for i in picked {
                let result = apply_chain(&items[i], rest)?;
                if keep(&result) {
                    out.push(result);
                }
            }
            Ok(Value::Array(out))
        }
        Picked::Entries(picked) => {
            let Value::Object(obj) = value else {
                return Ok(Value::Object(Map::new()));
            };
            if step.is_single() {
                return match picked.first().and_then(|&i| obj.get_index(i)) {
                    Some((_, child)) => apply_chain(child, rest),
                    None => Ok(Value::Object(Map::new())),
                };
            }
            let mut out = Map::with_capacity(picked.len());
            for (key, child) in picked.into_iter().filter_map(|i| obj.get_index(i)) {
                let result = apply_chain(child, rest)?;
                if keep(&result) {
                    out.insert(key.clone(), result);
                }
            }
            Ok(Value::Object(out))
        }
        Picked::Descendants(paths) => {
            let mut out = Vec::with_capacity(paths.len());
            for path in paths {
                if let Some(child) = resolve(value, &path) {
                    let result = apply_chain(child, rest)?;
                    if keep(&result) {
                        out.push(result);
                    }
                }
            }
            Ok(Value::Array(out))
        }
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compiles an expression into a closure over the current value.
///
/// Function arity, literal argument kinds and regex arguments are checked
/// here, so a query that compiles only fails later on the data it meets.
///
/// # Examples
///
/// ```
/// use mace_lang::{evaluator::compile, parser::{parse, CompileOptions}, Value};
///
/// let expr = parse("@ * 2 + 1", &CompileOptions::default()).unwrap();
/// let thunk = compile(&expr).unwrap();
/// assert_eq!(thunk(&Value::Integer(4)).unwrap(), Value::Integer(9));
/// assert_eq!(thunk(&Value::Integer(5)).unwrap(), Value::Integer(11));
/// ```
pub fn compile(expr: &Expr) -> Result<Thunk, EvalError> {
    match expr {
        Expr::Literal(value) => {
            let value = value.clone();
            Ok(Arc::new(move |_| Ok(value.clone())))
        }
        Expr::Current => Ok(Arc::new(|current| Ok(current.clone()))),
        Expr::Regex(pattern) => Err(EvalError::TypeError(format!(
            "regex g`{}` can only be a pattern for '=~' or a function argument",
            pattern.as_str()
        ))),
        Expr::Slice(_) => Err(EvalError::TypeError(
            "a slice can only be a function argument".into(),
        )),
        Expr::Unary { op, operand } => {
            let op = *op;
            let operand = compile(operand)?;
            Ok(Arc::new(move |current| ops::unary(op, &operand(current)?)))
        }
        Expr::Binary { op, left, right } => {
            let op = *op;
            let left = compile(left)?;
            if let (BinOp::Matches, Expr::Regex(pattern)) = (op, right.as_ref()) {
                let re = pattern.regex().clone();
                return Ok(Arc::new(move |current| {
                    ops::map_scalars(&left(current)?, &|v| match v {
                        Value::String(s) => Ok(Value::Boolean(re.is_match(s))),
                        other => Err(EvalError::TypeError(format!(
                            "'=~' is not defined for {} and regex",
                            other.type_name()
                        ))),
                    })
                }));
            }
            let right = compile(right)?;
            Ok(Arc::new(move |current| {
                ops::binary(op, &left(current)?, &right(current)?)
            }))
        }
        Expr::Indexed { target, steps } => {
            let target = compile(target)?;
            let steps = compile_steps(steps)?;
            Ok(Arc::new(move |current| apply_chain(&target(current)?, &steps)))
        }
        Expr::Call { name, args } => compile_call(name, args),
        Expr::Assign { .. } => Err(EvalError::NotAddressable(
            "an assignment can only be the whole query".into(),
        )),
    }
}

pub(crate) fn compile_steps(steps: &[Step]) -> Result<Vec<Indexer>, EvalError> {
    steps.iter().map(compile_step).collect()
}

fn compile_step(step: &Step) -> Result<Indexer, EvalError> {
    let kind = match step {
        Step::Keys { selectors, negated } => IndexerKind::Keys {
            selectors: selectors.clone(),
            negated: *negated,
        },
        Step::Positions { selectors, negated } => IndexerKind::Positions {
            selectors: selectors.clone(),
            negated: *negated,
        },
        Step::Star => IndexerKind::Star,
        Step::Filter(expr) => IndexerKind::Filter(compile(expr)?),
        Step::Descend(selectors) => IndexerKind::Descend(selectors.clone()),
        Step::Projection(Projection::Object(entries)) => IndexerKind::ProjectObject(
            entries
                .iter()
                .map(|(key, expr)| Ok((key.clone(), compile(expr)?)))
                .collect::<Result<_, EvalError>>()?,
        ),
        Step::Projection(Projection::Array(entries)) => IndexerKind::ProjectArray(
            entries.iter().map(compile).collect::<Result<_, _>>()?,
        ),
        Step::Map(expr) => IndexerKind::Map(compile(expr)?),
    };
    Ok(Indexer {
        kind,
        single: step.is_single(),
    })
}

/// A function argument after compilation.
enum CompiledArg {
    Value(Thunk),
    Pattern(regex::Regex),
    Slice(crate::ast::SliceSpec),
    Function(Thunk),
    Missing,
}

impl CompiledArg {
    fn eval(&self, current: &Value) -> Result<Arg, EvalError> {
        Ok(match self {
            CompiledArg::Value(thunk) => Arg::Value(thunk(current)?),
            CompiledArg::Pattern(re) => Arg::Pattern(re.clone()),
            CompiledArg::Slice(slice) => Arg::Slice(*slice),
            CompiledArg::Function(thunk) => Arg::Function(thunk.clone()),
            CompiledArg::Missing => Arg::Missing,
        })
    }
}

fn compile_arg(
    spec: &'static FunctionSpec,
    position: usize,
    arg: Option<&Expr>,
) -> Result<CompiledArg, EvalError> {
    let kind = spec.kind(position);
    let wrong = |found: &str| {
        functions::argument(
            spec.name,
            position,
            format!("expected {}, got {}", kind.describe(), found),
        )
    };
    match arg {
        None if position < spec.min_args => Err(functions::argument(
            spec.name,
            position,
            "argument is required",
        )),
        None => Ok(CompiledArg::Missing),
        Some(Expr::Regex(pattern)) if kind.accepts_pattern() => {
            Ok(CompiledArg::Pattern(pattern.regex().clone()))
        }
        Some(Expr::Regex(_)) => Err(wrong("regex")),
        Some(Expr::Slice(slice)) if kind.accepts_slice() => Ok(CompiledArg::Slice(*slice)),
        Some(Expr::Slice(_)) => Err(wrong("slice")),
        Some(expr) if kind.accepts_function() && position > 0 && expr.uses_current() => {
            Ok(CompiledArg::Function(compile(expr)?))
        }
        Some(Expr::Literal(value)) if !spec.vectorized && !kind.accepts(value) => {
            Err(wrong(value.type_name()))
        }
        Some(expr) => Ok(CompiledArg::Value(compile(expr)?)),
    }
}

fn compile_call(name: &str, args: &[Option<Expr>]) -> Result<Thunk, EvalError> {
    let spec = functions::lookup(name)
        .ok_or_else(|| EvalError::TypeError(format!("unknown function '{}'", name)))?;
    spec.check_arity(args.len())?;
    let compiled = args
        .iter()
        .enumerate()
        .map(|(i, arg)| compile_arg(spec, i, arg.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    if spec.name == "ifelse" {
        return Ok(compile_ifelse(spec, compiled));
    }
    Ok(Arc::new(move |current| {
        let args = compiled
            .iter()
            .map(|arg| arg.eval(current))
            .collect::<Result<Vec<_>, _>>()?;
        spec.call(&args)
    }))
}

/// `ifelse` with a scalar condition evaluates only the branch it returns.
fn compile_ifelse(spec: &'static FunctionSpec, compiled: Vec<CompiledArg>) -> Thunk {
    Arc::new(move |current| {
        let cond = match compiled.first() {
            Some(arg) => arg.eval(current)?,
            None => Arg::Missing,
        };
        if let Arg::Value(cond) = &cond {
            if cond.is_scalar() {
                let branch = if cond.is_truthy() { 1 } else { 2 };
                return match compiled.get(branch) {
                    Some(arg) => match arg.eval(current)? {
                        Arg::Value(v) => Ok(v),
                        _ => Ok(Value::Null),
                    },
                    None => Ok(Value::Null),
                };
            }
        }
        let mut args = vec![cond];
        for arg in compiled.iter().skip(1) {
            args.push(arg.eval(current)?);
        }
        spec.call(&args)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        convert::parse_json,
        output::to_json,
        parser::{CompileOptions, parse},
    };

    fn eval(query: &str, input: &str) -> Result<Value, EvalError> {
        let expr = parse(query, &CompileOptions::default()).expect("query parses");
        let root = parse_json(input, &Default::default()).expect("input parses");
        compile(&expr)?(&root)
    }

    #[test]
    fn test_single_and_multi_steps() {
        let input = r#"{"a": {"b": [1, 2, 3]}, "c": 4}"#;
        let test_cases = vec![
            ("@.a.b[0]", "1"),
            ("@.a.b[1:]", "[2,3]"),
            ("@[a, c]", r#"{"a":{"b":[1,2,3]},"c":4}"#),
            ("@.zz", "{}"),
            ("@.a.b[10]", "[]"),
            ("@.a.b[0, 10]", "[1]"),
            ("@!.a", r#"{"c":4}"#),
        ];
        for (query, expected) in test_cases {
            let result = eval(query, input).unwrap();
            assert_eq!(to_json(&result), expected, "query: {}", query);
        }
    }

    #[test]
    fn test_fan_out_drops_empty_results() {
        let input = r#"[{"a": 1}, {"b": 2}, {"a": 3}]"#;
        assert_eq!(to_json(&eval("@[:].a", input).unwrap()), "[1,3]");
    }

    #[test]
    fn test_filter_mask_errors() {
        assert!(matches!(
            eval("@[@ + 1]", "[1, 2]"),
            Err(EvalError::TypeError(_))
        ));
        assert!(matches!(
            eval("@[j`[true]`]", "[1, 2]"),
            Err(EvalError::TypeError(_))
        ));
    }

    #[test]
    fn test_ifelse_skips_unused_branch() {
        // the untaken branch would fail
        let result = eval("ifelse(@ > 0, @, s_len(@))", "3").unwrap();
        assert_eq!(result, Value::Integer(3));
    }

    #[test]
    fn test_bad_literal_argument_fails_at_compile() {
        let expr = parse("sum(`abc`)", &CompileOptions::default()).unwrap();
        assert!(matches!(
            compile(&expr),
            Err(EvalError::ArgumentError { position: 0, .. })
        ));
    }
}
