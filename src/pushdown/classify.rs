//! Clause partitioner: buckets independent restriction clauses by where
//! they can be evaluated.

use tracing::debug;

use crate::catalog::SystemCatalog;
use crate::expr::{Expr, Oid};
use crate::pushdown::safety::expr_pushdown_is_safe;

/// Result of partitioning one restriction list. Clauses keep their input
/// order within each bucket; each clause lands in exactly one bucket.
#[derive(Debug, Default)]
pub struct ClausePartition {
    /// Remote-safe, parameter-free.
    pub remote: Vec<Expr>,
    /// Remote-safe but referencing external parameters.
    pub remote_param: Vec<Expr>,
    /// Rejected; evaluated locally.
    pub local: Vec<Expr>,
    /// Union of parameter ids across `remote_param`, deduplicated in order
    /// of first appearance.
    pub param_ids: Vec<i32>,
}

/// Classify each clause independently. Clauses are assumed independently
/// AND-combinable; relationships between them are never inspected.
pub fn conditions_classify(
    clauses: Vec<Expr>,
    foreign_relation: Oid,
    catalog: &impl SystemCatalog,
) -> ClausePartition {
    let mut partition = ClausePartition::default();

    for clause in clauses {
        match expr_pushdown_is_safe(&clause, foreign_relation, catalog) {
            Ok(params) if params.is_empty() => {
                debug!(?clause, "clause is remote safe");
                partition.remote.push(clause);
            }
            Ok(params) => {
                debug!(?clause, ?params, "clause is remote safe with parameters");
                for id in params {
                    if !partition.param_ids.contains(&id) {
                        partition.param_ids.push(id);
                    }
                }
                partition.remote_param.push(clause);
            }
            Err(reason) => {
                debug!(?clause, %reason, "clause kept local");
                partition.local.push(clause);
            }
        }
    }

    partition
}

#[cfg(test)]
mod tests {
    use postgres_types::Type;

    use super::*;
    use crate::catalog::{
        FunctionMetadata, MemoryCatalog, OperatorKind, OperatorMetadata, PG_CATALOG_NAMESPACE,
        Volatility,
    };
    use crate::expr::{ColumnRef, Constant, Datum, NO_COLLATION, OpCall, ParamKind, Parameter};

    const REL: Oid = 40_000;
    const OTHER_REL: Oid = 40_001;

    fn test_catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
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
        catalog
    }

    fn column(relation_oid: Oid, attno: i16) -> Expr {
        Expr::Column(ColumnRef {
            relation_oid,
            attno,
            levelsup: 0,
            type_oid: Type::INT4.oid(),
            collation: NO_COLLATION,
        })
    }

    fn param(id: i32) -> Expr {
        Expr::Parameter(Parameter {
            kind: ParamKind::External,
            id,
            type_oid: Type::INT4.oid(),
            typmod: -1,
            collation: NO_COLLATION,
        })
    }

    fn eq(left: Expr, right: Expr) -> Expr {
        Expr::Op(OpCall {
            op_oid: 96,
            args: vec![left, right],
            result_type: Type::BOOL.oid(),
            input_collation: NO_COLLATION,
            collation: NO_COLLATION,
        })
    }

    fn five() -> Expr {
        Expr::Constant(Constant {
            type_oid: Type::INT4.oid(),
            typmod: -1,
            collation: NO_COLLATION,
            value: Some(Datum::Int4(5)),
        })
    }

    #[test]
    fn test_clauses_land_in_one_bucket_each() {
        let catalog = test_catalog();
        let clauses = vec![
            eq(column(REL, 1), five()),
            eq(column(REL, 1), param(2)),
            eq(column(REL, 1), column(OTHER_REL, 1)),
        ];
        let partition = conditions_classify(clauses, REL, &catalog);
        assert_eq!(partition.remote.len(), 1);
        assert_eq!(partition.remote_param.len(), 1);
        assert_eq!(partition.local.len(), 1);
        assert_eq!(partition.param_ids, vec![2]);
    }

    #[test]
    fn test_param_ids_deduplicated_in_first_appearance_order() {
        let catalog = test_catalog();
        let clauses = vec![
            eq(column(REL, 1), param(3)),
            eq(column(REL, 2), param(1)),
            eq(column(REL, 3), param(3)),
        ];
        let partition = conditions_classify(clauses, REL, &catalog);
        assert_eq!(partition.remote_param.len(), 3);
        assert_eq!(partition.param_ids, vec![3, 1]);
    }

    #[test]
    fn test_empty_input_yields_empty_partition() {
        let catalog = test_catalog();
        let partition = conditions_classify(vec![], REL, &catalog);
        assert!(partition.remote.is_empty());
        assert!(partition.remote_param.is_empty());
        assert!(partition.local.is_empty());
        assert!(partition.param_ids.is_empty());
    }
}
