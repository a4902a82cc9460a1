//! Assignment: locating addressable slots and rewriting them in place.

use tracing::debug;

use crate::{
    ast::Expr,
    evaluator::{self, EvalError, Indexer, Picked, Thunk},
    value::{Map, Value},
};

/// One step from a value to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    /// Entry of an object, by position in its key order
    Key(usize),

    /// Element of an array
    Index(usize),
}

/// A navigation path from the root to a slot.
///
/// For `{"a": [10, 20]}` the slot holding `20` is
/// `[PathSegment::Key(0), PathSegment::Index(1)]`.
pub type Path = Vec<PathSegment>;

/// Follows `path` from `value`.
pub fn resolve<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match (current, segment) {
        (Value::Object(obj), PathSegment::Key(i)) => obj.get_index(*i).map(|(_, v)| v),
        (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
        _ => None,
    })
}

/// Follows `path` from `value`, mutably.
pub fn resolve_mut<'a>(value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |current, segment| match (current, segment) {
        (Value::Object(obj), PathSegment::Key(i)) => obj.get_index_mut(*i).map(|(_, v)| v),
        (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i),
        _ => None,
    })
}

/// The shape of what an assignment target selects, with slots at the leaves.
#[derive(Debug)]
enum Located {
    Slot(Path),
    Array(Vec<Located>),
    Object(Vec<(String, Located)>),
}

impl Located {
    fn is_empty(&self) -> bool {
        match self {
            Located::Slot(_) => false,
            Located::Array(items) => items.is_empty(),
            Located::Object(entries) => entries.is_empty(),
        }
    }

    fn slots<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Located::Slot(path) => out.push(path),
            Located::Array(items) => items.iter().for_each(|l| l.slots(out)),
            Located::Object(entries) => entries.iter().for_each(|(_, l)| l.slots(out)),
        }
    }

    /// Rebuilds the selection from the values now in `root`.
    fn render(&self, root: &Value) -> Value {
        match self {
            Located::Slot(path) => resolve(root, path).cloned().unwrap_or(Value::Null),
            Located::Array(items) => Value::Array(items.iter().map(|l| l.render(root)).collect()),
            Located::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, l)| (k.clone(), l.render(root)))
                    .collect::<Map>(),
            ),
        }
    }
}

fn locate(value: &Value, steps: &[Indexer], prefix: &mut Path) -> Result<Located, EvalError> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(Located::Slot(prefix.clone()));
    };
    let keep = |l: &Located| rest.is_empty() || !l.is_empty();

    match step.pick(value)? {
        Picked::Computed(_) => Err(EvalError::NotAddressable(format!(
            "a {} builds a new value, which cannot be assigned to",
            step.name()
        ))),
        Picked::Itself => locate(value, rest, prefix),
        Picked::Nothing => Ok(Located::Array(Vec::new())),
        Picked::Elements(picked) => {
            let Value::Array(items) = value else {
                return Ok(Located::Array(Vec::new()));
            };
            if step.is_single() {
                return match picked.first() {
                    Some(&i) => locate_child(PathSegment::Index(i), &items[i], rest, prefix),
                    None => Ok(Located::Array(Vec::new())),
                };
            }
            let mut out = Vec::with_capacity(picked.len());
            for i in picked {
                let located = locate_child(PathSegment::Index(i), &items[i], rest, prefix)?;
                if keep(&located) {
                    out.push(located);
                }
            }
            Ok(Located::Array(out))
        }
        Picked::Entries(picked) => {
            let Value::Object(obj) = value else {
                return Ok(Located::Object(Vec::new()));
            };
            if step.is_single() {
                return match picked.first().and_then(|&i| obj.get_index(i).map(|e| (i, e))) {
                    Some((i, (_, next))) => locate_child(PathSegment::Key(i), next, rest, prefix),
                    None => Ok(Located::Object(Vec::new())),
                };
            }
            let mut out = Vec::with_capacity(picked.len());
            for i in picked {
                if let Some((key, next)) = obj.get_index(i) {
                    let located = locate_child(PathSegment::Key(i), next, rest, prefix)?;
                    if keep(&located) {
                        out.push((key.clone(), located));
                    }
                }
            }
            Ok(Located::Object(out))
        }
        Picked::Descendants(paths) => {
            let mut out = Vec::with_capacity(paths.len());
            for path in paths {
                if let Some(next) = resolve(value, &path) {
                    let depth = prefix.len();
                    prefix.extend(path);
                    let located = locate(next, rest, prefix);
                    prefix.truncate(depth);
                    let located = located?;
                    if keep(&located) {
                        out.push(located);
                    }
                }
            }
            Ok(Located::Array(out))
        }
    }
}

fn locate_child(
    segment: PathSegment,
    next: &Value,
    rest: &[Indexer],
    prefix: &mut Path,
) -> Result<Located, EvalError> {
    prefix.push(segment);
    let located = locate(next, rest, prefix);
    prefix.pop();
    located
}

/// A compiled `target = value` query.
///
/// The target must be `@` followed by indexers that pick existing slots;
/// the value is evaluated once per slot with `@` bound to the slot's old
/// value. Nothing is written until every new value has been computed and
/// checked, so a failing assignment leaves the root untouched.
pub struct Assignment {
    steps: Vec<Indexer>,
    value: Thunk,
}

impl Assignment {
    pub fn compile(target: &Expr, value: &Expr) -> Result<Self, EvalError> {
        let mut steps = Vec::new();
        collect_target(target, &mut steps)?;
        Ok(Assignment {
            steps,
            value: evaluator::compile(value)?,
        })
    }

    /// Rewrites the selected slots of `root`.
    ///
    /// Returns the selection as it reads after the write. When the target
    /// picks a single container, its children are the slots, so `@ = @ * 2`
    /// doubles every element of an array root.
    pub fn apply(&self, root: &mut Value) -> Result<Value, EvalError> {
        let located = locate(root, &self.steps, &mut Vec::new())?;

        let mut targets: Vec<Path> = Vec::new();
        match &located {
            Located::Slot(path) => match resolve(root, path) {
                Some(Value::Array(items)) => targets.extend((0..items.len()).map(|i| {
                    let mut child = path.clone();
                    child.push(PathSegment::Index(i));
                    child
                })),
                Some(Value::Object(obj)) => targets.extend((0..obj.len()).map(|i| {
                    let mut child = path.clone();
                    child.push(PathSegment::Key(i));
                    child
                })),
                _ => targets.push(path.clone()),
            },
            other => {
                let mut slots = Vec::new();
                other.slots(&mut slots);
                targets.extend(slots.into_iter().cloned());
            }
        }

        let mut updates = Vec::with_capacity(targets.len());
        for path in &targets {
            let Some(old) = resolve(root, path) else {
                continue;
            };
            let new = (self.value)(old)?;
            if old.is_scalar() != new.is_scalar() {
                return Err(EvalError::TypeError(format!(
                    "cannot replace {} with {} in an assignment",
                    old.type_name(),
                    new.type_name()
                )));
            }
            updates.push(new);
        }

        debug!(locations = updates.len(), "committing assignment");
        for (path, new) in targets.iter().zip(updates) {
            if let Some(slot) = resolve_mut(root, path) {
                *slot = new;
            }
        }
        Ok(located.render(root))
    }
}

/// Flattens `@.a[0]`, `(@.a)[0]` and bare `@` into one indexer chain.
fn collect_target(target: &Expr, steps: &mut Vec<Indexer>) -> Result<(), EvalError> {
    match target {
        Expr::Current => Ok(()),
        Expr::Indexed { target, steps: own } => {
            collect_target(target, steps)?;
            steps.extend(evaluator::compile_steps(own)?);
            Ok(())
        }
        _ => Err(EvalError::NotAddressable(
            "the left side of '=' must be '@' followed by indexers".into(),
        )),
    }
}
