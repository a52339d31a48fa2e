//! Pushdown safety analysis: per-expression classification and the
//! clause partitioner built on top of it.

pub mod classify;
pub mod safety;

pub use classify::{ClausePartition, conditions_classify};
pub use safety::{CollationState, UnsafeReason, expr_pushdown_is_safe};
