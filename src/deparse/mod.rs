//! SQL text generation for accepted expression trees and the statement
//! builders composed from them.
//!
//! Deparsing is defined over exactly the grammar the classifier accepts.
//! The only failures left at this stage are internal-consistency ones,
//! catalog ids the classifier already validated failing to resolve, so
//! they surface as `Report`s rather than being swallowed into invalid SQL.

use error_set::error_set;
use postgres_protocol::escape;
use rootcause::Report;

use crate::catalog::CatalogError;

pub mod expr;
pub mod statement;

pub use expr::ExprDeparser;
pub use statement::{
    analyze_sample_sql_deparse, analyze_size_sql_deparse, simple_select_deparse,
    where_clause_append,
};

error_set! {
    DeparseError = {
        #[display("malformed expression node: {detail}")]
        MalformedNode { detail: &'static str },
        CatalogLookup(CatalogError),
    };
}

pub type DeparseResult<T> = Result<T, Report<DeparseError>>;

/// Quote a table, schema, column, or function name. Always quotes rather
/// than relying on the remote server's case-folding or reserved-word rules.
pub fn identifier_deparse(name: &str) -> String {
    escape::escape_identifier(name)
}

/// Render a string literal: quotes doubled, `E` introducer when the value
/// contains a backslash.
pub fn string_literal_deparse(value: &str) -> String {
    let escaped = escape::escape_literal(value);
    // escape_literal prefixes E'...' with a space so it can follow another
    // token; the deparser manages its own spacing.
    match escaped.strip_prefix(' ') {
        Some(stripped) => stripped.to_owned(),
        None => escaped,
    }
}
