//! # Mace Query Language - Abstract Syntax Tree
//!
//! This module defines the syntax tree for Mace, a path query language for
//! selecting, transforming, aggregating and mutating JSON documents.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes, indexer steps, slices and projections
//! - **[operators]** - Binary and prefix operators with their binding tiers
//!
//! ## Quick Start
//!
//! ```text
//! @.orders[@.total > 100]{id: @.id, items: len(@.items)}
//! ```
//!
//! This query keeps the orders whose total exceeds 100 and reshapes each
//! into an object with its id and item count.
//!
//! ## Core Concepts
//!
//! ### The Current Value
//!
//! `@` is the value being evaluated against. At the top level it is the
//! document; inside a boolean index, a projection, a map step or the right
//! side of an assignment it is rebound to the value the step works on.
//!
//! ### Indexer Chains
//!
//! A target followed by steps reads left to right:
//!
//! - `.key`, `[a, b]`, `.g`re`` select object entries
//! - `[0]`, `[1:3]`, `[::-1, 0]` select array elements
//! - `.*` and `[*]` select every child
//! - `[@ > 2]` keeps what a boolean mask marks
//! - `..key` searches every descendant
//! - `{a: @[0]}` and `{@[0], @[1]}` build new values
//! - `-> expr` maps the current value through an expression
//!
//! A step that picks exactly one child yields the child itself; any other
//! selection yields an object (key selections) or an array.
//!
//! ### Broadcasting
//!
//! Operators and vectorized functions apply element by element across
//! arrays and objects, so `@.prices * 1.1` scales every price.
//!
//! ## Examples
//!
//! ### Slicing
//!
//! ```text
//! @.foo[-2:]
//! ```
//!
//! ### Recursive Search
//!
//! ```text
//! @..name
//! ```
//!
//! ### Assignment
//!
//! ```text
//! @.scores[@ < 0] = 0
//! ```
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Expr, KeySelector, PositionSelector, Projection, SliceSpec, Step};
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Pattern, Spanned, Token};
