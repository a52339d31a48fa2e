//! Statement builders: the handful of complete statements composed from
//! deparsed fragments. Each builder renders into a scratch buffer and only
//! appends to the caller's buffer on success, so a failed build never
//! leaves a syntactically open fragment behind.

use std::collections::BTreeSet;
use std::fmt::Write;

use tracing::trace;

use crate::catalog::{ForeignTableMetadata, SystemCatalog};
use crate::deparse::expr::ExprDeparser;
use crate::deparse::{DeparseResult, identifier_deparse, string_literal_deparse};
use crate::expr::{AttrNumber, ColumnRef, Expr, Oid, WHOLE_ROW_ATTNO};
use crate::result::{MapIntoReport, ReportExt};

/// Block size of the local server, used for the relation size estimate.
/// Deliberately not queried from the remote side.
const LOCAL_BLOCK_SIZE: i64 = 8192;

/// Restores the catalog's constant-output transmission modes when dropped,
/// on every exit path.
struct TransmissionModes<'a, C: SystemCatalog> {
    catalog: &'a C,
    token: i32,
}

impl<'a, C: SystemCatalog> TransmissionModes<'a, C> {
    fn set(catalog: &'a C) -> Self {
        let token = catalog.transmission_modes_set();
        TransmissionModes { catalog, token }
    }
}

impl<C: SystemCatalog> Drop for TransmissionModes<'_, C> {
    fn drop(&mut self) {
        self.catalog.transmission_modes_reset(self.token);
    }
}

/// Append `schema.table`, preferring the table's explicit name options over
/// the catalog-derived names.
fn relation_deparse(
    buf: &mut String,
    table: &ForeignTableMetadata,
    catalog: &impl SystemCatalog,
) -> DeparseResult<()> {
    let schema = match &table.options.schema_name {
        Some(name) => name.clone(),
        None => catalog.namespace_name(table.namespace_oid).map_into_report()?,
    };
    let name = table.options.table_name.as_ref().unwrap_or(&table.name);
    buf.push_str(&identifier_deparse(&schema));
    buf.push('.');
    buf.push_str(&identifier_deparse(name));
    Ok(())
}

/// Attnos of `relation_oid` columns referenced anywhere in `exprs`.
fn expr_attributes_collect(exprs: &[Expr], relation_oid: Oid) -> BTreeSet<AttrNumber> {
    exprs
        .iter()
        .flat_map(|expr| expr.nodes::<ColumnRef>())
        .filter(|col| col.relation_oid == relation_oid && col.levelsup == 0)
        .map(|col| col.attno)
        .collect()
}

/// Build `SELECT <items> FROM <relation>` for a simple scan. One item per
/// non-dropped attribute in ordinal order: the real column when it is
/// needed by the projection or by locally evaluated clauses, a NULL
/// placeholder otherwise, so positional result mapping stays aligned.
/// Returns the attnos actually retrieved, in select-list order.
pub fn simple_select_deparse(
    buf: &mut String,
    relation_oid: Oid,
    targets: &[Expr],
    local_clauses: &[Expr],
    catalog: &impl SystemCatalog,
) -> DeparseResult<Vec<AttrNumber>> {
    let table = catalog.table_lookup(relation_oid).map_into_report()?;

    let mut needed = expr_attributes_collect(targets, relation_oid);
    needed.extend(expr_attributes_collect(local_clauses, relation_oid));
    let have_wholerow = needed.contains(&WHOLE_ROW_ATTNO);

    let mut out = String::new();
    let mut retrieved = Vec::new();
    out.push_str("SELECT ");
    let mut first = true;
    for column in table.attributes_ordered() {
        if column.is_dropped {
            continue;
        }
        if !first {
            out.push_str(", ");
        }
        first = false;
        if have_wholerow || needed.contains(&column.position) {
            out.push_str(&identifier_deparse(column.remote_name()));
            retrieved.push(column.position);
        } else {
            out.push_str("NULL");
        }
    }
    // A zero-column select list is invalid syntax.
    if first {
        out.push_str("NULL");
    }
    out.push_str(" FROM ");
    relation_deparse(&mut out, table, catalog).attach_loc("rendering scan relation")?;

    trace!(sql = %out, "built simple scan statement");
    buf.push_str(&out);
    Ok(retrieved)
}

/// Append ` WHERE (c1) AND (c2) ...` for clauses already accepted as
/// remote-safe; `is_first` is false when a WHERE keyword was already
/// emitted upstream. Constant output is forced into its portable form for
/// the duration of the call.
pub fn where_clause_append(
    buf: &mut String,
    clauses: &[Expr],
    is_first: bool,
    catalog: &impl SystemCatalog,
) -> DeparseResult<()> {
    let _modes = TransmissionModes::set(catalog);
    let deparser = ExprDeparser::new(catalog);

    let mut out = String::new();
    let mut first = is_first;
    for clause in clauses {
        out.push_str(if first { " WHERE " } else { " AND " });
        out.push('(');
        deparser
            .expr_deparse(&mut out, clause)
            .attach_loc("rendering where clause")?;
        out.push(')');
        first = false;
    }

    buf.push_str(&out);
    Ok(())
}

/// Build the remote relation-size estimate query. Divides by the local
/// block size so the result reads as a page count on this side.
pub fn analyze_size_sql_deparse(
    buf: &mut String,
    relation_oid: Oid,
    catalog: &impl SystemCatalog,
) -> DeparseResult<()> {
    let table = catalog.table_lookup(relation_oid).map_into_report()?;

    let mut relname = String::new();
    relation_deparse(&mut relname, table, catalog)?;

    let mut out = String::new();
    out.push_str("SELECT pg_catalog.pg_relation_size(");
    out.push_str(&string_literal_deparse(&relname));
    let _ = write!(out, "::pg_catalog.regclass) / {LOCAL_BLOCK_SIZE}");

    buf.push_str(&out);
    Ok(())
}

/// Build the row-sampling query: every non-dropped column by its remote
/// name, a lone NULL for a zero-column relation. Returns the attnos
/// retrieved, in select-list order.
pub fn analyze_sample_sql_deparse(
    buf: &mut String,
    relation_oid: Oid,
    catalog: &impl SystemCatalog,
) -> DeparseResult<Vec<AttrNumber>> {
    let table = catalog.table_lookup(relation_oid).map_into_report()?;

    let mut out = String::new();
    let mut retrieved = Vec::new();
    out.push_str("SELECT ");
    let mut first = true;
    for column in table.attributes_ordered() {
        if column.is_dropped {
            continue;
        }
        if !first {
            out.push_str(", ");
        }
        first = false;
        out.push_str(&identifier_deparse(column.remote_name()));
        retrieved.push(column.position);
    }
    if first {
        out.push_str("NULL");
    }
    out.push_str(" FROM ");
    relation_deparse(&mut out, table, catalog)?;

    trace!(sql = %out, "built sampling statement");
    buf.push_str(&out);
    Ok(retrieved)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use iddqd::BiHashMap;
    use postgres_types::Type;

    use super::*;
    use crate::catalog::{
        CatalogResult, ColumnMetadata, FunctionMetadata, MemoryCatalog, OperatorKind,
        OperatorMetadata, PG_CATALOG_NAMESPACE, TableOptions, Volatility,
    };
    use crate::expr::{Constant, Datum, NO_COLLATION, OpCall};

    const REL: Oid = 40_000;

    fn test_column(name: &str, position: AttrNumber, dropped: bool) -> ColumnMetadata {
        ColumnMetadata {
            name: name.into(),
            position,
            type_oid: Type::INT4.oid(),
            typmod: -1,
            is_dropped: dropped,
            name_option: None,
        }
    }

    fn test_catalog(options: TableOptions) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.namespace_register(2200, "public");
        catalog.function_register(FunctionMetadata {
            oid: 65,
            name: "int4eq".into(),
            namespace_oid: PG_CATALOG_NAMESPACE,
            volatility: Volatility::Immutable,
        });
        catalog.operator_register(OperatorMetadata {
            oid: 96,
            name: "=".into(),
            namespace_oid: PG_CATALOG_NAMESPACE,
            kind: OperatorKind::Infix,
            function_oid: 65,
        });

        let mut columns = BiHashMap::new();
        columns.insert_unique(test_column("col1", 1, false)).unwrap();
        columns.insert_unique(test_column("col2", 2, false)).unwrap();
        columns.insert_unique(test_column("col3", 3, true)).unwrap();
        catalog.table_register(ForeignTableMetadata {
            relation_oid: REL,
            name: "t".into(),
            namespace_oid: 2200,
            options,
            columns,
        });
        catalog
    }

    fn column_ref(attno: AttrNumber) -> Expr {
        Expr::Column(ColumnRef {
            relation_oid: REL,
            attno,
            levelsup: 0,
            type_oid: Type::INT4.oid(),
            collation: NO_COLLATION,
        })
    }

    #[test]
    fn test_select_unreferenced_columns_become_null_placeholders() {
        let catalog = test_catalog(TableOptions::default());
        let targets = vec![column_ref(2)];
        let mut buf = String::new();
        let retrieved =
            simple_select_deparse(&mut buf, REL, &targets, &[], &catalog).unwrap();
        assert_eq!(buf, "SELECT NULL, \"col2\" FROM \"public\".\"t\"");
        assert_eq!(retrieved, vec![2]);
    }

    #[test]
    fn test_select_local_clause_columns_still_fetched() {
        let catalog = test_catalog(TableOptions::default());
        let local = vec![column_ref(1)];
        let mut buf = String::new();
        let retrieved =
            simple_select_deparse(&mut buf, REL, &[], &local, &catalog).unwrap();
        assert_eq!(buf, "SELECT \"col1\", NULL FROM \"public\".\"t\"");
        assert_eq!(retrieved, vec![1]);
    }

    #[test]
    fn test_select_whole_row_fetches_everything() {
        let catalog = test_catalog(TableOptions::default());
        let targets = vec![column_ref(WHOLE_ROW_ATTNO)];
        let mut buf = String::new();
        let retrieved =
            simple_select_deparse(&mut buf, REL, &targets, &[], &catalog).unwrap();
        assert_eq!(buf, "SELECT \"col1\", \"col2\" FROM \"public\".\"t\"");
        assert_eq!(retrieved, vec![1, 2]);
    }

    #[test]
    fn test_select_zero_surviving_columns_emits_lone_null() {
        let mut catalog = MemoryCatalog::new();
        catalog.namespace_register(2200, "public");
        let mut columns = BiHashMap::new();
        columns.insert_unique(test_column("gone", 1, true)).unwrap();
        catalog.table_register(ForeignTableMetadata {
            relation_oid: REL,
            name: "empty".into(),
            namespace_oid: 2200,
            options: TableOptions::default(),
            columns,
        });
        let mut buf = String::new();
        simple_select_deparse(&mut buf, REL, &[], &[], &catalog).unwrap();
        assert_eq!(buf, "SELECT NULL FROM \"public\".\"empty\"");
    }

    #[test]
    fn test_table_name_options_override_catalog_names() {
        let catalog = test_catalog(TableOptions {
            schema_name: Some("remote_schema".into()),
            table_name: Some("remote_table".into()),
        });
        let mut buf = String::new();
        simple_select_deparse(&mut buf, REL, &[], &[], &catalog).unwrap();
        assert_eq!(
            buf,
            "SELECT NULL, NULL FROM \"remote_schema\".\"remote_table\""
        );
    }

    #[test]
    fn test_where_clause_connectives_and_parens() {
        let catalog = test_catalog(TableOptions::default());
        let eq = |attno, value| {
            Expr::Op(OpCall {
                op_oid: 96,
                args: vec![
                    column_ref(attno),
                    Expr::Constant(Constant {
                        type_oid: Type::INT4.oid(),
                        typmod: -1,
                        collation: NO_COLLATION,
                        value: Some(Datum::Int4(value)),
                    }),
                ],
                result_type: Type::BOOL.oid(),
                input_collation: NO_COLLATION,
                collation: NO_COLLATION,
            })
        };
        let mut buf = String::from("SELECT ...");
        where_clause_append(&mut buf, &[eq(1, 5), eq(2, 7)], true, &catalog).unwrap();
        assert_eq!(
            buf,
            "SELECT ... WHERE ((\"col1\" = 5)) AND ((\"col2\" = 7))"
        );
    }

    #[test]
    fn test_where_clause_restores_transmission_modes() {
        struct ModeProbe {
            inner: MemoryCatalog,
            depth: Cell<i32>,
        }

        impl SystemCatalog for ModeProbe {
            fn type_lookup(&self, oid: Oid) -> CatalogResult<crate::catalog::TypeMetadata> {
                self.inner.type_lookup(oid)
            }
            fn function_lookup(&self, oid: Oid) -> CatalogResult<FunctionMetadata> {
                self.inner.function_lookup(oid)
            }
            fn operator_lookup(&self, oid: Oid) -> CatalogResult<OperatorMetadata> {
                self.inner.operator_lookup(oid)
            }
            fn namespace_name(&self, oid: Oid) -> CatalogResult<ecow::EcoString> {
                self.inner.namespace_name(oid)
            }
            fn table_lookup(&self, oid: Oid) -> CatalogResult<&ForeignTableMetadata> {
                self.inner.table_lookup(oid)
            }
            fn format_type(&self, oid: Oid, typmod: i32) -> CatalogResult<String> {
                self.inner.format_type(oid, typmod)
            }
            fn datum_output(&self, type_oid: Oid, value: &Datum) -> CatalogResult<String> {
                self.inner.datum_output(type_oid, value)
            }
            fn transmission_modes_set(&self) -> i32 {
                self.depth.set(self.depth.get() + 1);
                self.depth.get()
            }
            fn transmission_modes_reset(&self, _token: i32) {
                self.depth.set(self.depth.get() - 1);
            }
        }

        let probe = ModeProbe {
            inner: test_catalog(TableOptions::default()),
            depth: Cell::new(0),
        };
        // A clause referencing a missing operator makes deparsing fail;
        // the mode must be restored anyway.
        let bad = Expr::Op(OpCall {
            op_oid: 9999,
            args: vec![column_ref(1), column_ref(2)],
            result_type: Type::BOOL.oid(),
            input_collation: NO_COLLATION,
            collation: NO_COLLATION,
        });
        let mut buf = String::new();
        assert!(where_clause_append(&mut buf, &[bad], true, &probe).is_err());
        assert_eq!(probe.depth.get(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_analyze_size_sql() {
        let catalog = test_catalog(TableOptions::default());
        let mut buf = String::new();
        analyze_size_sql_deparse(&mut buf, REL, &catalog).unwrap();
        assert_eq!(
            buf,
            "SELECT pg_catalog.pg_relation_size('\"public\".\"t\"'::pg_catalog.regclass) / 8192"
        );
    }

    #[test]
    fn test_analyze_sample_sql_skips_dropped_columns() {
        let catalog = test_catalog(TableOptions::default());
        let mut buf = String::new();
        let retrieved = analyze_sample_sql_deparse(&mut buf, REL, &catalog).unwrap();
        assert_eq!(buf, "SELECT \"col1\", \"col2\" FROM \"public\".\"t\"");
        assert_eq!(retrieved, vec![1, 2]);
    }
}
