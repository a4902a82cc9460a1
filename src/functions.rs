//! Built-in function table.
//!
//! Every function declares its arity, the kind of value each argument
//! position accepts, and whether it is *vectorized*. A vectorized function
//! called with an array or object as its first argument runs once per
//! element and returns a container of the same shape; the others always see
//! their arguments whole.

use std::{
    cmp::Ordering,
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
};

use regex::Regex;
use rust_decimal::{prelude::FromPrimitive, prelude::ToPrimitive, Decimal, RoundingStrategy};

use crate::{
    ast::SliceSpec,
    evaluator::{EvalError, Thunk},
    ops,
    output::to_json,
    value::{Map, Value},
};

/// What an argument position accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Any,
    Bool,
    Int,
    Number,
    String,
    Array,
    Object,
    /// Array or object
    Iterable,
    /// A string matched literally, or a regex
    StrOrRegex,
    /// A regex, or a string compiled as one
    Regex,
    /// An integer index or a slice literal
    IntOrSlice,
    /// An integer index, a string key, or an expression of `@`
    Key,
}

impl ArgKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ArgKind::Any => true,
            ArgKind::Bool => matches!(value, Value::Boolean(_)),
            ArgKind::Int | ArgKind::IntOrSlice => matches!(value, Value::Integer(_)),
            ArgKind::Number => value.is_number(),
            ArgKind::String | ArgKind::StrOrRegex | ArgKind::Regex => {
                matches!(value, Value::String(_))
            }
            ArgKind::Array => matches!(value, Value::Array(_)),
            ArgKind::Object => matches!(value, Value::Object(_)),
            ArgKind::Iterable => value.is_container(),
            ArgKind::Key => matches!(value, Value::Integer(_) | Value::String(_)),
        }
    }

    pub fn accepts_pattern(self) -> bool {
        matches!(self, ArgKind::StrOrRegex | ArgKind::Regex)
    }

    pub fn accepts_slice(self) -> bool {
        self == ArgKind::IntOrSlice
    }

    pub fn accepts_function(self) -> bool {
        self == ArgKind::Key
    }

    /// Whether a same-shaped container passed here is split up alongside a
    /// vectorized first argument.
    fn zips(self) -> bool {
        !matches!(self, ArgKind::Array | ArgKind::Object | ArgKind::Iterable)
    }

    pub fn describe(self) -> &'static str {
        match self {
            ArgKind::Any => "anything",
            ArgKind::Bool => "a boolean",
            ArgKind::Int => "an integer",
            ArgKind::Number => "a number",
            ArgKind::String => "a string",
            ArgKind::Array => "an array",
            ArgKind::Object => "an object",
            ArgKind::Iterable => "an array or object",
            ArgKind::StrOrRegex => "a string or regex",
            ArgKind::Regex => "a regex",
            ArgKind::IntOrSlice => "an integer or slice",
            ArgKind::Key => "an integer, string or expression",
        }
    }
}

/// An evaluated argument.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Pattern(Regex),
    Slice(SliceSpec),
    /// An expression of `@`, called once per element
    Function(Thunk),
    /// An empty slot such as the second argument of `range(3,)`
    Missing,
}

impl Arg {
    fn value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Arg::Value(v) => v.type_name(),
            Arg::Pattern(_) => "regex",
            Arg::Slice(_) => "slice",
            Arg::Function(_) => "expression",
            Arg::Missing => "nothing",
        }
    }
}

type Apply = fn(&str, &[Arg]) -> Result<Value, EvalError>;

pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// Kinds by position; the last entry covers any further arguments.
    pub arg_kinds: &'static [ArgKind],
    pub vectorized: bool,
    /// One-line description shown by `mace functions`.
    pub summary: &'static str,
    apply: Apply,
}

impl FunctionSpec {
    pub fn kind(&self, position: usize) -> ArgKind {
        self.arg_kinds
            .get(position)
            .or_else(|| self.arg_kinds.last())
            .copied()
            .unwrap_or(ArgKind::Any)
    }

    pub fn check_arity(&self, count: usize) -> Result<(), EvalError> {
        if count < self.min_args {
            return Err(argument(
                self.name,
                count,
                format!("expected at least {} argument(s), got {}", self.min_args, count),
            ));
        }
        if count > self.max_args {
            return Err(argument(
                self.name,
                self.max_args,
                format!("expected at most {} argument(s), got {}", self.max_args, count),
            ));
        }
        Ok(())
    }

    fn check_kinds(&self, args: &[Arg]) -> Result<(), EvalError> {
        for (position, arg) in args.iter().enumerate() {
            let kind = self.kind(position);
            let ok = match arg {
                Arg::Value(v) => kind.accepts(v),
                Arg::Pattern(_) => kind.accepts_pattern(),
                Arg::Slice(_) => kind.accepts_slice(),
                Arg::Function(_) => kind.accepts_function(),
                Arg::Missing => position >= self.min_args,
            };
            if !ok {
                return Err(argument(
                    self.name,
                    position,
                    format!("expected {}, got {}", kind.describe(), arg.describe()),
                ));
            }
        }
        Ok(())
    }

    /// Calls the function, broadcasting a vectorized function over a
    /// container first argument.
    pub fn call(&self, args: &[Arg]) -> Result<Value, EvalError> {
        self.check_arity(args.len())?;
        if self.vectorized {
            match args.first().and_then(Arg::value) {
                Some(Value::Array(items)) => {
                    return items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            self.call_one(item, args, |v| match v {
                                Value::Array(other) if other.len() == items.len() => {
                                    other.get(i).cloned()
                                }
                                _ => None,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Array);
                }
                Some(Value::Object(obj)) => {
                    let mut out = Map::with_capacity(obj.len());
                    for (key, item) in obj {
                        let result = self.call_one(item, args, |v| match v {
                            Value::Object(other) if other.len() == obj.len() => {
                                other.get(key).cloned()
                            }
                            _ => None,
                        })?;
                        out.insert(key.clone(), result);
                    }
                    return Ok(Value::Object(out));
                }
                _ => {}
            }
        }
        self.check_kinds(args)?;
        (self.apply)(self.name, args)
    }

    /// One element of a vectorized call; `pick` splits same-shaped
    /// containers passed in later positions.
    fn call_one(
        &self,
        item: &Value,
        args: &[Arg],
        pick: impl Fn(&Value) -> Option<Value>,
    ) -> Result<Value, EvalError> {
        let mut element_args = Vec::with_capacity(args.len());
        element_args.push(Arg::Value(item.clone()));
        for (position, arg) in args.iter().enumerate().skip(1) {
            let split = match arg {
                Arg::Value(v) if self.kind(position).zips() => pick(v),
                _ => None,
            };
            element_args.push(split.map_or_else(|| arg.clone(), Arg::Value));
        }
        self.check_kinds(&element_args)?;
        (self.apply)(self.name, &element_args)
    }
}

pub(crate) fn argument(function: &str, position: usize, message: impl Into<String>) -> EvalError {
    EvalError::ArgumentError {
        function: function.to_string(),
        position,
        message: message.into(),
    }
}

/// Looks a function up by name.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// Every built-in, sorted by name.
pub fn all() -> &'static [FunctionSpec] {
    FUNCTIONS
}

const MANY: usize = usize::MAX;

macro_rules! function {
    ($name:literal, $min:expr, $max:expr, [$($kind:ident),*], $vectorized:expr, $apply:expr, $summary:literal) => {
        FunctionSpec {
            name: $name,
            min_args: $min,
            max_args: $max,
            arg_kinds: &[$(ArgKind::$kind),*],
            vectorized: $vectorized,
            summary: $summary,
            apply: $apply,
        }
    };
}

static FUNCTIONS: &[FunctionSpec] = &[
    function!("abs", 1, 1, [Number], true, abs, "absolute value"),
    function!("add_items", 3, MANY, [Object, String, Any], false, add_items, "copy of an object with key/value pairs added"),
    function!("all", 1, 1, [Array], false, all_true, "true if every boolean in the array is true"),
    function!("any", 1, 1, [Array], false, any_true, "true if some boolean in the array is true"),
    function!("append", 2, MANY, [Array, Any], false, append, "copy of an array with values added to the end"),
    function!("avg", 1, 1, [Array], false, mean, "arithmetic mean of an array of numbers"),
    function!("concat", 2, MANY, [Iterable], false, concat, "joins arrays, or merges objects with later keys winning"),
    function!("dict", 1, 1, [Array], false, dict, "object from an array of [key, value] pairs"),
    function!("flatten", 1, 2, [Array, Int], false, flatten, "flattens nested arrays up to a depth (default 1)"),
    function!("float", 1, 1, [Any], true, to_float, "converts to a float"),
    function!("group_by", 2, 2, [Array, Key], false, group_by, "groups records by a key, index or expression"),
    function!("ifelse", 3, 3, [Any, Any, Any], true, ifelse, "second argument if the first is truthy, else the third"),
    function!("in", 2, 2, [Any, Iterable], true, contains, "whether a value is in an array or a key is in an object"),
    function!("index", 2, 3, [Iterable, Any, Bool], false, index_of, "position of the first (or last) occurrence of a value"),
    function!("int", 1, 1, [Any], true, to_int, "converts to an integer, truncating"),
    function!("is_expr", 1, 1, [Any], true, is_expr, "whether a value is an array or object"),
    function!("is_num", 1, 1, [Any], true, is_num, "whether a value is a number"),
    function!("is_str", 1, 1, [Any], true, is_str, "whether a value is a string"),
    function!("isna", 1, 1, [Any], true, is_na, "whether a value is NaN"),
    function!("isnull", 1, 1, [Any], true, is_null, "whether a value is null"),
    function!("items", 1, 1, [Object], false, items, "array of [key, value] pairs"),
    function!("keys", 1, 1, [Object], false, keys, "array of an object's keys"),
    function!("len", 1, 1, [Iterable], false, len, "number of elements or entries"),
    function!("log", 1, 2, [Number, Number], true, log, "logarithm, natural unless a base is given"),
    function!("log2", 1, 1, [Number], true, log2, "base-2 logarithm"),
    function!("max", 1, 1, [Array], false, max, "largest number in an array (-Infinity if empty)"),
    function!("max_by", 2, 2, [Array, Key], false, max_by, "element whose key is largest"),
    function!("mean", 1, 1, [Array], false, mean, "arithmetic mean of an array of numbers"),
    function!("min", 1, 1, [Array], false, min, "smallest number in an array (Infinity if empty)"),
    function!("min_by", 2, 2, [Array, Key], false, min_by, "element whose key is smallest"),
    function!("pivot", 3, MANY, [Array, Key], false, pivot, "reshapes long records into columns"),
    function!("quantile", 2, 2, [Array, Number], false, quantile, "linearly interpolated quantile of an array of numbers"),
    function!("range", 1, 3, [Int, Int, Int], false, range, "integers from start to stop (exclusive) by step"),
    function!("round", 1, 2, [Number, Int], true, round, "rounds half away from zero, to an integer or to n digits"),
    function!("s_count", 2, 2, [String, StrOrRegex], true, s_count, "non-overlapping occurrences of a substring or regex"),
    function!("s_find", 2, 2, [String, Regex], true, s_find, "every match of a regex"),
    function!("s_join", 2, 2, [String, Array], false, s_join, "joins an array of strings with a separator"),
    function!("s_len", 1, 1, [String], true, s_len, "number of characters"),
    function!("s_lower", 1, 1, [String], true, s_lower, "lower-cased string"),
    function!("s_mul", 2, 2, [String, Int], true, s_mul, "string repeated n times"),
    function!("s_slice", 2, 2, [String, IntOrSlice], true, s_slice, "character at an index, or characters in a slice"),
    function!("s_split", 1, 2, [String, StrOrRegex], true, s_split, "splits on a separator or regex (default whitespace)"),
    function!("s_strip", 1, 1, [String], true, s_strip, "string without surrounding whitespace"),
    function!("s_sub", 3, 3, [String, StrOrRegex, String], true, s_sub, "replaces every match; regex replacements may use $1"),
    function!("s_upper", 1, 1, [String], true, s_upper, "upper-cased string"),
    function!("sort_by", 2, 3, [Array, Key, Bool], false, sort_by, "records sorted by a key, index or expression"),
    function!("sorted", 1, 2, [Array, Bool], false, sorted, "sorted copy of an array"),
    function!("str", 1, 1, [Any], true, to_str, "converts to a string"),
    function!("sum", 1, 1, [Array], false, sum, "sum of an array of numbers"),
    function!("to_records", 1, 2, [Iterable, String], false, to_records, "table of flat records (strategy d, r, n or s)"),
    function!("unique", 1, 2, [Array, Bool], false, unique, "distinct elements, optionally sorted"),
    function!("value_counts", 1, 2, [Array, Bool], false, value_counts, "[value, count] pairs, optionally by descending count"),
    function!("values", 1, 1, [Object], false, values, "array of an object's values"),
    function!("zip", 2, MANY, [Array], false, zip, "arrays of corresponding elements"),
];

// ============================================================================
// Argument access
// ============================================================================

fn arg<'a>(args: &'a [Arg], position: usize) -> Option<&'a Value> {
    args.get(position).and_then(Arg::value)
}

fn array<'a>(name: &str, args: &'a [Arg], position: usize) -> Result<&'a [Value], EvalError> {
    match arg(args, position) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(argument(name, position, "expected an array")),
    }
}

fn object<'a>(name: &str, args: &'a [Arg], position: usize) -> Result<&'a Map, EvalError> {
    match arg(args, position) {
        Some(Value::Object(obj)) => Ok(obj),
        _ => Err(argument(name, position, "expected an object")),
    }
}

fn string<'a>(name: &str, args: &'a [Arg], position: usize) -> Result<&'a str, EvalError> {
    match arg(args, position) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(argument(name, position, "expected a string")),
    }
}

fn number(name: &str, args: &[Arg], position: usize) -> Result<f64, EvalError> {
    arg(args, position)
        .and_then(Value::as_f64)
        .ok_or_else(|| argument(name, position, "expected a number"))
}

fn optional_int(args: &[Arg], position: usize) -> Option<i64> {
    match arg(args, position) {
        Some(Value::Integer(n)) => Some(*n),
        _ => None,
    }
}

fn flag(args: &[Arg], position: usize) -> bool {
    matches!(arg(args, position), Some(Value::Boolean(true)))
}

/// A pattern argument: a regex as given, or a string compiled as one.
fn regex(name: &str, args: &[Arg], position: usize) -> Result<Regex, EvalError> {
    match args.get(position) {
        Some(Arg::Pattern(re)) => Ok(re.clone()),
        Some(Arg::Value(Value::String(s))) => {
            Regex::new(s).map_err(|e| EvalError::InvalidRegex(e.to_string()))
        }
        _ => Err(argument(name, position, "expected a regex")),
    }
}

fn numbers(name: &str, items: &[Value]) -> Result<Vec<f64>, EvalError> {
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| argument(name, 0, format!("expected numbers, found {}", v.type_name())))
        })
        .collect()
}

fn ordering(name: &str, a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    a.compare(b).ok_or_else(|| {
        EvalError::TypeError(format!(
            "{} cannot order {} and {}",
            name,
            a.type_name(),
            b.type_name()
        ))
    })
}

/// Stable sort that reports the first pair it cannot order.
fn sort_values<T>(name: &str, items: &mut [T], key: impl Fn(&T) -> &Value) -> Result<(), EvalError> {
    let mut failure = None;
    items.sort_by(|a, b| match ordering(name, key(a), key(b)) {
        Ok(o) => o,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Text used when a value becomes an object key.
fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => to_json(other),
    }
}

/// Resolves a `Key` argument against one element.
fn key_of(name: &str, key: &Arg, item: &Value) -> Result<Value, EvalError> {
    match (key, item) {
        (Arg::Function(f), _) => f(item),
        (Arg::Value(Value::String(k)), Value::Object(obj)) => obj
            .get(k)
            .cloned()
            .ok_or_else(|| EvalError::KeyError(format!("{}: no key '{}'", name, k))),
        (Arg::Value(Value::Integer(i)), Value::Array(items)) => wrap_index(*i, items.len())
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| EvalError::IndexError(format!("{}: index {} out of range", name, i))),
        _ => Err(EvalError::TypeError(format!(
            "{} cannot take a {} key of {}",
            name,
            key.describe(),
            item.type_name()
        ))),
    }
}

pub(crate) fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

// ============================================================================
// Aggregates
// ============================================================================

fn len(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    match arg(args, 0) {
        Some(Value::Array(items)) => Ok(Value::Integer(items.len() as i64)),
        Some(Value::Object(obj)) => Ok(Value::Integer(obj.len() as i64)),
        _ => Err(argument(name, 0, "expected an array or object")),
    }
}

fn sum(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let nums = numbers(name, array(name, args, 0)?)?;
    Ok(Value::Float(nums.iter().sum()))
}

fn mean(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let nums = numbers(name, array(name, args, 0)?)?;
    Ok(Value::Float(nums.iter().sum::<f64>() / nums.len() as f64))
}

fn min(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let nums = numbers(name, array(name, args, 0)?)?;
    Ok(Value::Float(nums.into_iter().fold(f64::INFINITY, f64::min)))
}

fn max(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let nums = numbers(name, array(name, args, 0)?)?;
    Ok(Value::Float(nums.into_iter().fold(f64::NEG_INFINITY, f64::max)))
}

fn quantile(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut nums = numbers(name, array(name, args, 0)?)?;
    let q = number(name, args, 1)?;
    if !(0.0..=1.0).contains(&q) {
        return Err(argument(name, 1, "quantile must be between 0 and 1"));
    }
    if nums.is_empty() {
        return Err(argument(name, 0, "cannot take a quantile of an empty array"));
    }
    nums.sort_by(f64::total_cmp);
    let position = q * (nums.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let value = nums[lo] + (nums[hi] - nums[lo]) * (position - lo as f64);
    Ok(Value::Float(value))
}

fn all_true(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    booleans(name, args).map(|b| Value::Boolean(b.iter().all(|x| *x)))
}

fn any_true(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    booleans(name, args).map(|b| Value::Boolean(b.iter().any(|x| *x)))
}

fn booleans(name: &str, args: &[Arg]) -> Result<Vec<bool>, EvalError> {
    array(name, args, 0)?
        .iter()
        .map(|v| match v {
            Value::Boolean(b) => Ok(*b),
            other => Err(argument(
                name,
                0,
                format!("expected booleans, found {}", other.type_name()),
            )),
        })
        .collect()
}

fn unique(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut out: Vec<Value> = Vec::new();
    let mut distinct = Distinct::default();
    for item in array(name, args, 0)? {
        if distinct.position(&out, item).is_none() {
            out.push(item.clone());
        }
    }
    if flag(args, 1) {
        sort_values(name, &mut out, |v| v)?;
    }
    Ok(Value::Array(out))
}

fn value_counts(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut values: Vec<Value> = Vec::new();
    let mut counts: Vec<i64> = Vec::new();
    let mut distinct = Distinct::default();
    for item in array(name, args, 0)? {
        match distinct.position(&values, item) {
            Some(i) => counts[i] += 1,
            None => {
                values.push(item.clone());
                counts.push(1);
            }
        }
    }
    let mut pairs: Vec<(Value, i64)> = values.into_iter().zip(counts).collect();
    if flag(args, 1) {
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
    }
    Ok(Value::Array(
        pairs
            .into_iter()
            .map(|(v, n)| Value::Array(vec![v, Value::Integer(n)]))
            .collect(),
    ))
}

/// Hash buckets over a growing list of values. Values that are `==` always
/// share a bucket, so only a bucket's members need the full comparison.
#[derive(Default)]
struct Distinct {
    buckets: HashMap<u64, Vec<usize>>,
}

impl Distinct {
    /// Index of the entry of `seen` equal to `item`. When there is none,
    /// `item` is recorded as the next entry and the caller must push it.
    fn position(&mut self, seen: &[Value], item: &Value) -> Option<usize> {
        let bucket = self.buckets.entry(bucket_of(item)).or_default();
        let found = bucket.iter().copied().find(|&i| seen[i] == *item);
        if found.is_none() {
            bucket.push(seen.len());
        }
        found
    }
}

fn bucket_of(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    match value {
        Value::Null => 0u8.hash(&mut hasher),
        Value::String(s) => s.hash(&mut hasher),
        Value::Date(d) => d.hash(&mut hasher),
        Value::DateTime(t) => t.hash(&mut hasher),
        Value::Array(items) => items.len().hash(&mut hasher),
        Value::Object(map) => map.len().hash(&mut hasher),
        // `+ 0.0` folds -0.0 into 0.0
        number => (number.as_f64().unwrap_or(0.0) + 0.0).to_bits().hash(&mut hasher),
    }
    hasher.finish()
}

fn sorted(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut items = array(name, args, 0)?.to_vec();
    sort_values(name, &mut items, |v| v)?;
    if flag(args, 1) {
        items.reverse();
    }
    Ok(Value::Array(items))
}

fn keyed<'a>(name: &str, args: &'a [Arg]) -> Result<Vec<(Value, &'a Value)>, EvalError> {
    let Some(key) = args.get(1) else {
        return Err(argument(name, 1, "expected a key"));
    };
    array(name, args, 0)?
        .iter()
        .map(|item| Ok((key_of(name, key, item)?, item)))
        .collect()
}

fn sort_by(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut pairs = keyed(name, args)?;
    sort_values(name, &mut pairs, |(k, _)| k)?;
    let mut items: Vec<Value> = pairs.into_iter().map(|(_, v)| v.clone()).collect();
    if flag(args, 2) {
        items.reverse();
    }
    Ok(Value::Array(items))
}

fn extreme_by(name: &str, args: &[Arg], wanted: Ordering) -> Result<Value, EvalError> {
    let mut best: Option<(Value, &Value)> = None;
    for (key, item) in keyed(name, args)? {
        let replace = match &best {
            None => true,
            Some((best_key, _)) => ordering(name, &key, best_key)? == wanted,
        };
        if replace {
            best = Some((key, item));
        }
    }
    best.map(|(_, item)| item.clone())
        .ok_or_else(|| argument(name, 0, "array is empty"))
}

fn min_by(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    extreme_by(name, args, Ordering::Less)
}

fn max_by(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    extreme_by(name, args, Ordering::Greater)
}

fn group_by(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut groups = Map::new();
    for (key, item) in keyed(name, args)? {
        let slot = groups
            .entry(key_text(&key))
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(members) = slot {
            members.push(item.clone());
        }
    }
    Ok(Value::Object(groups))
}

// ============================================================================
// Builders and reshapers
// ============================================================================

fn range(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let first = optional_int(args, 0).ok_or_else(|| argument(name, 0, "expected an integer"))?;
    let (start, stop) = match optional_int(args, 1) {
        Some(stop) => (first, stop),
        None => (0, first),
    };
    let step = optional_int(args, 2).unwrap_or(1);
    if step == 0 {
        return Err(argument(name, 2, "step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Integer(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::Array(out))
}

fn zip(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let arrays = (0..args.len())
        .map(|i| array(name, args, i))
        .collect::<Result<Vec<_>, _>>()?;
    let len = arrays.first().map_or(0, |a| a.len());
    if let Some(position) = arrays.iter().position(|a| a.len() != len) {
        return Err(argument(name, position, "arrays must all have the same length"));
    }
    Ok(Value::Array(
        (0..len)
            .map(|i| Value::Array(arrays.iter().map(|a| a[i].clone()).collect()))
            .collect(),
    ))
}

fn dict(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut out = Map::new();
    for pair in array(name, args, 0)? {
        match pair {
            Value::Array(kv) if kv.len() == 2 => match &kv[0] {
                Value::String(k) => {
                    out.insert(k.clone(), kv[1].clone());
                }
                other => {
                    return Err(argument(
                        name,
                        0,
                        format!("keys must be strings, found {}", other.type_name()),
                    ));
                }
            },
            _ => return Err(argument(name, 0, "expected an array of [key, value] pairs")),
        }
    }
    Ok(Value::Object(out))
}

fn items(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Array(
        object(name, args, 0)?
            .iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
            .collect(),
    ))
}

fn keys(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Array(
        object(name, args, 0)?
            .keys()
            .map(|k| Value::String(k.clone()))
            .collect(),
    ))
}

fn values(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Array(object(name, args, 0)?.values().cloned().collect()))
}

fn concat(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    match arg(args, 0) {
        Some(Value::Array(_)) => {
            let mut out = Vec::new();
            for i in 0..args.len() {
                out.extend(array(name, args, i)?.iter().cloned());
            }
            Ok(Value::Array(out))
        }
        Some(Value::Object(_)) => {
            let mut out = Map::new();
            for i in 0..args.len() {
                for (k, v) in object(name, args, i)? {
                    out.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Object(out))
        }
        _ => Err(argument(name, 0, "expected an array or object")),
    }
}

fn append(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let mut out = array(name, args, 0)?.to_vec();
    out.extend(args[1..].iter().filter_map(Arg::value).cloned());
    Ok(Value::Array(out))
}

fn add_items(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    if args.len() % 2 == 0 {
        return Err(argument(name, args.len() - 1, "expected key/value pairs"));
    }
    let mut out = object(name, args, 0)?.clone();
    for position in (1..args.len()).step_by(2) {
        let key = string(name, args, position)?;
        let value = arg(args, position + 1).cloned().unwrap_or(Value::Null);
        out.insert(key.to_string(), value);
    }
    Ok(Value::Object(out))
}

fn flatten_into(items: &[Value], depth: i64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

fn flatten(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let depth = optional_int(args, 1).unwrap_or(1);
    let mut out = Vec::new();
    flatten_into(array(name, args, 0)?, depth, &mut out);
    Ok(Value::Array(out))
}

fn column<'a>(name: &str, row: &'a Value, key: &Value, position: usize) -> Result<&'a Value, EvalError> {
    let found = match (row, key) {
        (Value::Array(cells), Value::Integer(i)) => wrap_index(*i, cells.len()).and_then(|i| cells.get(i)),
        (Value::Object(obj), Value::String(k)) => obj.get(k),
        _ => None,
    };
    found.ok_or_else(|| argument(name, position, format!("no column {} in {}", to_json(key), to_json(row))))
}

fn pivot(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let rows = array(name, args, 0)?;
    let by = arg(args, 1).ok_or_else(|| argument(name, 1, "expected a column"))?;
    let val = arg(args, 2).ok_or_else(|| argument(name, 2, "expected a column"))?;

    let mut out = Map::new();
    for row in rows {
        let key = key_text(column(name, row, by, 1)?);
        let cell = column(name, row, val, 2)?.clone();
        if let Value::Array(members) = out.entry(key).or_insert_with(|| Value::Array(Vec::new())) {
            members.push(cell);
        }
    }

    // each index column keeps one value per group of pivoted rows
    let stride = out.len().max(1);
    for position in 3..args.len() {
        let idx = arg(args, position).ok_or_else(|| argument(name, position, "expected a column"))?;
        let cells = rows
            .iter()
            .step_by(stride)
            .map(|row| column(name, row, idx, position).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(key_text(idx), Value::Array(cells));
    }
    Ok(Value::Object(out))
}

fn index_of(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let target = arg(args, 1).ok_or_else(|| argument(name, 1, "expected a value"))?;
    let from_end = flag(args, 2);
    let found = match arg(args, 0) {
        Some(Value::Array(items)) => {
            let hit = if from_end {
                items.iter().rposition(|v| v == target)
            } else {
                items.iter().position(|v| v == target)
            };
            hit.map(|i| Value::Integer(i as i64))
        }
        Some(Value::Object(obj)) => {
            let mut entries = obj.iter();
            let hit = if from_end {
                entries.rfind(|(_, v)| *v == target)
            } else {
                entries.find(|(_, v)| *v == target)
            };
            hit.map(|(k, _)| Value::String(k.clone()))
        }
        _ => return Err(argument(name, 0, "expected an array or object")),
    };
    found.ok_or_else(|| EvalError::KeyError(format!("{}: {} not found", name, to_json(target))))
}

fn flatten_record(prefix: &str, value: &Value, arrays: bool, out: &mut Map) {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) if arrays => items
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("col{}", i + 1), v))
            .collect(),
        other => {
            out.insert(prefix.to_string(), other.clone());
            return;
        }
    };
    for (key, child) in children {
        let path = if prefix.is_empty() { key } else { format!("{}.{}", prefix, key) };
        flatten_record(&path, child, arrays, out);
    }
}

fn to_records(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let strategy = match arg(args, 1) {
        Some(Value::String(s)) => s.chars().next().unwrap_or('d'),
        _ => 'd',
    };
    if !matches!(strategy, 'd' | 'r' | 'n' | 's') {
        return Err(argument(name, 1, "strategy must be one of d, r, n, s"));
    }

    // an object of equal-length columns becomes one record per row
    let rows: Vec<Value> = match arg(args, 0) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(columns)) => {
            let height = columns.values().map(|c| match c {
                Value::Array(cells) => cells.len(),
                _ => 1,
            });
            let height = height.max().unwrap_or(0);
            (0..height)
                .map(|i| {
                    Value::Object(
                        columns
                            .iter()
                            .map(|(k, c)| {
                                let cell = match c {
                                    Value::Array(cells) => cells.get(i).cloned().unwrap_or(Value::Null),
                                    scalar => scalar.clone(),
                                };
                                (k.clone(), cell)
                            })
                            .collect(),
                    )
                })
                .collect()
        }
        _ => return Err(argument(name, 0, "expected an array or object")),
    };

    let records = rows
        .iter()
        .map(|row| {
            let mut record = Map::new();
            let cells: Vec<(String, &Value)> = match row {
                Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v)).collect(),
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (format!("col{}", i + 1), v))
                    .collect(),
                scalar => vec![("col1".to_string(), scalar)],
            };
            for (key, cell) in cells {
                match (strategy, cell) {
                    ('s', c) if c.is_container() => {
                        record.insert(key, Value::String(to_json(c)));
                    }
                    ('d', c) => flatten_record(&key, c, false, &mut record),
                    ('r', c) => flatten_record(&key, c, true, &mut record),
                    (_, c) => {
                        record.insert(key, c.clone());
                    }
                }
            }
            Value::Object(record)
        })
        .collect();
    Ok(Value::Array(records))
}

// ============================================================================
// Vectorized scalar functions
// ============================================================================

fn abs(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    match arg(args, 0) {
        Some(Value::Boolean(b)) => Ok(Value::Integer(*b as i64)),
        Some(Value::Integer(n)) => n
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| EvalError::Arithmetic("integer overflow in abs".into())),
        Some(Value::Rational(r)) => {
            let (n, d) = r.parts();
            crate::rational::Rational::collapse(n.abs(), d)
        }
        _ => number(name, args, 0).map(|f| Value::Float(f.abs())),
    }
}

fn to_float(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    match arg(args, 0) {
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| argument(name, 0, format!("cannot parse '{}' as a float", s))),
        _ => number(name, args, 0).map(Value::Float),
    }
}

fn to_int(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let truncate = |f: f64| {
        if f.is_finite() && f.abs() < 9.2e18 {
            Ok(Value::Integer(f.trunc() as i64))
        } else {
            Err(argument(name, 0, format!("{} does not fit in an integer", f)))
        }
    };
    match arg(args, 0) {
        Some(Value::Integer(n)) => Ok(Value::Integer(*n)),
        Some(Value::Boolean(b)) => Ok(Value::Integer(*b as i64)),
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(n) => Ok(Value::Integer(n)),
            Err(_) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| argument(name, 0, format!("cannot parse '{}' as an integer", s)))
                .and_then(truncate),
        },
        _ => truncate(number(name, args, 0)?),
    }
}

fn to_str(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(arg(args, 0).map(Value::to_string).unwrap_or_default()))
}

fn is_expr(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(arg(args, 0).is_some_and(Value::is_container)))
}

fn is_num(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(arg(args, 0).is_some_and(|v| {
        matches!(v, Value::Integer(_) | Value::Float(_) | Value::Rational(_))
    })))
}

fn is_str(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(matches!(arg(args, 0), Some(Value::String(_)))))
}

fn is_na(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(matches!(arg(args, 0), Some(Value::Float(f)) if f.is_nan())))
}

fn is_null(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Boolean(matches!(arg(args, 0), Some(Value::Null))))
}

fn contains(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let needle = arg(args, 0).ok_or_else(|| argument(name, 0, "expected a value"))?;
    match arg(args, 1) {
        Some(Value::Array(items)) => Ok(Value::Boolean(items.contains(needle))),
        Some(Value::Object(obj)) => Ok(Value::Boolean(
            needle.as_str().is_some_and(|k| obj.contains_key(k)),
        )),
        _ => Err(argument(name, 1, "expected an array or object")),
    }
}

fn ifelse(_: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let chosen = if arg(args, 0).is_some_and(Value::is_truthy) { 1 } else { 2 };
    Ok(arg(args, chosen).cloned().unwrap_or(Value::Null))
}

fn log(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(name, args, 0)?;
    Ok(Value::Float(match arg(args, 1) {
        Some(_) => x.log(number(name, args, 1)?),
        None => x.ln(),
    }))
}

fn log2(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    number(name, args, 0).map(|x| Value::Float(x.log2()))
}

fn round(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let x = number(name, args, 0)?;
    match optional_int(args, 1) {
        None => {
            let r = x.round();
            if r.is_finite() && r.abs() < 9.2e18 {
                Ok(Value::Integer(r as i64))
            } else {
                Ok(Value::Float(r))
            }
        }
        Some(digits) => {
            let digits = u32::try_from(digits)
                .map_err(|_| argument(name, 1, "digits must not be negative"))?;
            let rounded = Decimal::from_f64(x)
                .map(|d| d.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero))
                .and_then(|d| d.to_f64());
            // NaN, infinities and huge magnitudes have no decimal form
            Ok(Value::Float(rounded.unwrap_or(x)))
        }
    }
}

fn s_len(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::Integer(string(name, args, 0)?.chars().count() as i64))
}

fn s_lower(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(string(name, args, 0)?.to_lowercase()))
}

fn s_upper(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(string(name, args, 0)?.to_uppercase()))
}

fn s_strip(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    Ok(Value::String(string(name, args, 0)?.trim().to_string()))
}

fn s_mul(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let s = string(name, args, 0)?;
    let n = optional_int(args, 1).unwrap_or(0);
    ops::repeat(s, n)
        .map(Value::String)
        .ok_or_else(|| argument(name, 1, format!("{} repetitions make too long a string", n)))
}

fn s_count(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let s = string(name, args, 0)?;
    let count = match args.get(1) {
        Some(Arg::Pattern(re)) => re.find_iter(s).count(),
        _ => {
            let needle = string(name, args, 1)?;
            if needle.is_empty() {
                return Err(argument(name, 1, "substring must not be empty"));
            }
            s.matches(needle).count()
        }
    };
    Ok(Value::Integer(count as i64))
}

fn s_find(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let s = string(name, args, 0)?;
    let re = regex(name, args, 1)?;
    Ok(Value::Array(
        re.find_iter(s)
            .map(|m| Value::String(m.as_str().to_string()))
            .collect(),
    ))
}

fn s_split(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let s = string(name, args, 0)?;
    let parts: Vec<Value> = match args.get(1) {
        None | Some(Arg::Missing) => s.split_whitespace().map(Value::from).collect(),
        Some(Arg::Pattern(re)) => re.split(s).map(Value::from).collect(),
        _ => {
            let sep = string(name, args, 1)?;
            if sep.is_empty() {
                return Err(argument(name, 1, "separator must not be empty"));
            }
            s.split(sep).map(Value::from).collect()
        }
    };
    Ok(Value::Array(parts))
}

fn s_sub(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let s = string(name, args, 0)?;
    let replacement = string(name, args, 2)?;
    match args.get(1) {
        Some(Arg::Pattern(re)) => Ok(Value::String(re.replace_all(s, replacement).into_owned())),
        _ => Ok(Value::String(s.replace(string(name, args, 1)?, replacement))),
    }
}

fn s_slice(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let chars: Vec<char> = string(name, args, 0)?.chars().collect();
    match args.get(1) {
        Some(Arg::Slice(spec)) => Ok(Value::String(
            spec.indices(chars.len()).into_iter().map(|i| chars[i]).collect(),
        )),
        Some(Arg::Value(Value::Integer(i))) => wrap_index(*i, chars.len())
            .map(|i| Value::String(chars[i].to_string()))
            .ok_or_else(|| {
                EvalError::IndexError(format!("{}: index {} out of range for length {}", name, i, chars.len()))
            }),
        _ => Err(argument(name, 1, "expected an integer or slice")),
    }
}

fn s_join(name: &str, args: &[Arg]) -> Result<Value, EvalError> {
    let sep = string(name, args, 0)?;
    let parts = array(name, args, 1)?
        .iter()
        .map(|v| {
            v.as_str().ok_or_else(|| {
                argument(name, 1, format!("expected strings, found {}", v.type_name()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(sep)))
}
