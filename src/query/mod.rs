//! Boolean queries over an index.
//!
//! An [`Expr`] tree of keys combined with AND, OR and NOT is evaluated
//! against a [`Gix`](crate::Gix). Negation is carried as a flag on each
//! intermediate result, meaning "every item except these", and resolved by
//! the parent combinator through set differences, so the universe of items
//! is never materialized.

mod eval;
mod expr;

pub use expr::Expr;
