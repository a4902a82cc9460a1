use crate::{
    ast::{BinOp, Pattern, UnaryOp},
    value::Value,
};

/// Abstract Syntax Tree node representing a parsed expression.
///
/// A compiled query owns its tree; nothing here borrows from an input
/// document, so one tree can be evaluated against any number of roots.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value: numbers, backtick strings, bare words, constants
    /// and `` j`...` `` JSON literals
    ///
    /// # Example
    /// ```text
    /// 42
    /// `hello`
    /// j`{"a": [1, 2]}`
    /// ```
    Literal(Value),

    /// Current value reference (`@`)
    ///
    /// The query root at top level; rebound inside filters, projections,
    /// map steps and assignment right-hand sides.
    Current,

    /// Regex literal (`` g`...` ``)
    ///
    /// Only meaningful as the pattern of `=~` or as a function argument;
    /// inside indexers regexes become [`KeySelector::Pattern`].
    Regex(Pattern),

    /// Slice literal passed as a function argument
    ///
    /// # Example
    /// ```text
    /// s_slice(@, ::-1)
    /// ```
    Slice(SliceSpec),

    /// Prefix operation
    ///
    /// # Example
    /// ```text
    /// -@.price
    /// not is_str(@)
    /// ```
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation, broadcast over arrays and objects
    ///
    /// # Example
    /// ```text
    /// @.foo[0] + 1
    /// @ =~ g`^a`
    /// ```
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// A target followed by a chain of indexers, projections and map steps
    ///
    /// The whole chain is kept together because a step that fans out over
    /// several results applies the rest of the chain to each of them.
    ///
    /// # Example
    /// ```text
    /// @.foo[:2][@ > 1]
    /// @..name
    /// @.rows[:]{id: @[0], total: sum(@[1:])}
    /// ```
    Indexed { target: Box<Expr>, steps: Vec<Step> },

    /// Built-in function call; an empty argument slot is `None`
    ///
    /// # Example
    /// ```text
    /// range(3, 10, 2)
    /// range(3,)
    /// ```
    Call { name: String, args: Vec<Option<Expr>> },

    /// Top-level assignment (`target = value`)
    ///
    /// # Example
    /// ```text
    /// @.foo[@ < 0] = @ + 1
    /// ```
    Assign { target: Box<Expr>, value: Box<Expr> },
}

/// One link of an indexer chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Object keys by name or pattern: `.a`, `[a, b]`, `.g`^x``, `![a]`
    Keys {
        selectors: Vec<KeySelector>,
        negated: bool,
    },

    /// Array positions: `[0]`, `[1:3, -1]`, `![0]`
    Positions {
        selectors: Vec<PositionSelector>,
        negated: bool,
    },

    /// Every child: `.*` or `[*]`
    Star,

    /// Boolean index: `[@ > 2]`
    Filter(Box<Expr>),

    /// Recursive descent: `..key`, `..[a, g`b`]`, `..*` (`None` selects every scalar)
    Descend(Option<Vec<KeySelector>>),

    /// Builds a new object or array from the current value: `{a: @[0], b: @[1]}`
    Projection(Projection),

    /// Evaluates an expression with `@` bound to the current value: `-> len(@)`
    Map(Box<Expr>),
}

impl Step {
    /// True when the step picks out at most one child and so yields the child
    /// itself rather than a collection.
    pub fn is_single(&self) -> bool {
        match self {
            Step::Keys {
                selectors,
                negated: false,
            } => matches!(selectors.as_slice(), [KeySelector::Name(_)]),
            Step::Positions {
                selectors,
                negated: false,
            } => matches!(selectors.as_slice(), [PositionSelector::Index(_)]),
            Step::Map(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeySelector {
    Name(String),
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionSelector {
    Index(i64),
    Slice(SliceSpec),
}

/// `start:stop:step` with every part optional; negatives count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// Positions selected from a sequence of `len` items, in visiting order.
    ///
    /// A zero step selects nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use mace_lang::ast::SliceSpec;
    ///
    /// let last_two = SliceSpec { start: Some(-2), ..Default::default() };
    /// assert_eq!(last_two.indices(5), vec![3, 4]);
    ///
    /// let reversed = SliceSpec { step: Some(-1), ..Default::default() };
    /// assert_eq!(reversed.indices(3), vec![2, 1, 0]);
    /// ```
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Vec::new();
        }
        let resolve = |bound: i64, lo: i64, hi: i64| {
            let b = if bound < 0 { bound + len } else { bound };
            b.clamp(lo, hi)
        };
        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map_or(0, |s| resolve(s, 0, len));
            let stop = self.stop.map_or(len, |s| resolve(s, 0, len));
            let mut next = Some(start);
            while let Some(i) = next.filter(|&i| i < stop) {
                out.push(i as usize);
                next = i.checked_add(step);
            }
        } else {
            let start = self.start.map_or(len - 1, |s| resolve(s, -1, len - 1));
            let stop = self.stop.map_or(-1, |s| resolve(s, -1, len - 1));
            let mut next = Some(start);
            while let Some(i) = next.filter(|&i| i > stop) {
                out.push(i as usize);
                next = i.checked_add(step);
            }
        }
        out
    }
}

/// Entries of a `{...}` projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `{key: expr, ...}` builds an object
    Object(Vec<(String, Expr)>),
    /// `{expr, ...}` builds an array
    Array(Vec<Expr>),
}

impl Expr {
    /// Whether evaluating this expression reads `@`.
    ///
    /// Nested filters, projections and map steps rebind `@`, but they still
    /// read the value they are applied to, so a chain counts as reading `@`
    /// exactly when its target does.
    pub fn uses_current(&self) -> bool {
        match self {
            Expr::Current => true,
            Expr::Literal(_) | Expr::Regex(_) | Expr::Slice(_) => false,
            Expr::Unary { operand, .. } => operand.uses_current(),
            Expr::Binary { left, right, .. } => left.uses_current() || right.uses_current(),
            Expr::Indexed { target, .. } => target.uses_current(),
            Expr::Call { args, .. } => args.iter().flatten().any(Expr::uses_current),
            Expr::Assign { target, value } => target.uses_current() || value.uses_current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> SliceSpec {
        SliceSpec { start, stop, step }
    }

    #[test]
    fn test_slice_matches_negative_offsets() {
        assert_eq!(slice(Some(-3), None, None).indices(5), vec![2, 3, 4]);
        assert_eq!(slice(None, Some(-3), None).indices(5), vec![0, 1]);
        assert_eq!(slice(None, None, Some(-1)).indices(4), vec![3, 2, 1, 0]);
        assert_eq!(slice(None, Some(3), Some(2)).indices(3), vec![0, 2]);
        assert_eq!(slice(Some(10), None, None).indices(3), Vec::<usize>::new());
        assert_eq!(slice(Some(-10), Some(2), None).indices(3), vec![0, 1]);
        assert_eq!(slice(Some(1), Some(-10), Some(-1)).indices(3), vec![1, 0]);
        assert_eq!(slice(None, None, Some(0)).indices(3), Vec::<usize>::new());
        assert_eq!(slice(None, None, Some(-1)).indices(0), Vec::<usize>::new());
    }

    #[test]
    fn test_huge_steps_stop_after_one_index() {
        assert_eq!(slice(Some(1), None, Some(i64::MAX)).indices(3), vec![1]);
        assert_eq!(slice(None, None, Some(i64::MIN)).indices(3), vec![2]);
        assert_eq!(slice(Some(i64::MIN), Some(i64::MAX), Some(i64::MAX)).indices(3), vec![0]);
    }

    #[test]
    fn test_is_single() {
        let key = Step::Keys {
            selectors: vec![KeySelector::Name("a".into())],
            negated: false,
        };
        assert!(key.is_single());
        let negated = Step::Keys {
            selectors: vec![KeySelector::Name("a".into())],
            negated: true,
        };
        assert!(!negated.is_single());
        let two = Step::Positions {
            selectors: vec![PositionSelector::Index(0), PositionSelector::Index(1)],
            negated: false,
        };
        assert!(!two.is_single());
        assert!(!Step::Star.is_single());
    }

    #[test]
    fn test_uses_current() {
        let lit = Expr::Literal(Value::Integer(1));
        assert!(!lit.uses_current());
        let call = Expr::Call {
            name: "s_len".into(),
            args: vec![Some(Expr::Current)],
        };
        assert!(call.uses_current());
        let projected = Expr::Indexed {
            target: Box::new(lit),
            steps: vec![Step::Map(Box::new(Expr::Current))],
        };
        assert!(!projected.uses_current());
    }
}
