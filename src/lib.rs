//! Pushdown safety classification and SQL deparsing for remote PostgreSQL
//! tables.
//!
//! Given restriction clauses over a foreign table, the classifier decides
//! per clause whether remote evaluation is provably equivalent to local
//! evaluation, tracking collation provenance through the expression tree.
//! The deparser renders accepted clauses, and the handful of statements
//! built from them, back into portable SQL text. The crate performs no
//! I/O: catalog metadata comes in through the [`catalog::SystemCatalog`]
//! trait and generated text goes out as plain strings.

pub mod catalog;
pub mod deparse;
pub mod expr;
pub mod pushdown;
pub mod result;

pub use catalog::{MemoryCatalog, SystemCatalog};
pub use deparse::{DeparseError, DeparseResult, ExprDeparser};
pub use pushdown::{ClausePartition, UnsafeReason, conditions_classify, expr_pushdown_is_safe};
