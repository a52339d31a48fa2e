//! End-to-end scenarios: classify a restriction list against a foreign
//! table, then render the surviving statement pieces.

use iddqd::BiHashMap;
use postgres_types::Type;

use pgship::catalog::{
    ColumnMetadata, ForeignTableMetadata, FunctionMetadata, MemoryCatalog, OperatorKind,
    OperatorMetadata, PG_CATALOG_NAMESPACE, TableOptions, Volatility,
};
use pgship::deparse::{ExprDeparser, simple_select_deparse, where_clause_append};
use pgship::expr::{
    ArrayBuild, ColumnRef, Constant, Datum, Expr, FuncCall, NO_COLLATION, OpCall, ParamKind,
    Parameter,
};
use pgship::pushdown::conditions_classify;

const REL: pgship::expr::Oid = 40_000;
const OTHER_REL: pgship::expr::Oid = 40_001;
const EXT_FN: pgship::expr::Oid = 54_321;

fn fixture_catalog() -> MemoryCatalog {
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

    let column = |name: &str, position: i16, dropped: bool| ColumnMetadata {
        name: name.into(),
        position,
        type_oid: Type::INT4.oid(),
        typmod: -1,
        is_dropped: dropped,
        name_option: None,
    };
    let mut columns = BiHashMap::new();
    columns.insert_unique(column("remote_col", 1, false)).unwrap();
    columns.insert_unique(column("col2", 2, false)).unwrap();
    columns.insert_unique(column("col3", 3, true)).unwrap();
    catalog.table_register(ForeignTableMetadata {
        relation_oid: REL,
        name: "t".into(),
        namespace_oid: 2200,
        options: TableOptions::default(),
        columns,
    });
    catalog
}

fn column_ref(relation_oid: pgship::expr::Oid, attno: i16) -> Expr {
    Expr::Column(ColumnRef {
        relation_oid,
        attno,
        levelsup: 0,
        type_oid: Type::INT4.oid(),
        collation: NO_COLLATION,
    })
}

fn int4_eq(left: Expr, right: Expr) -> Expr {
    Expr::Op(OpCall {
        op_oid: 96,
        args: vec![left, right],
        result_type: Type::BOOL.oid(),
        input_collation: NO_COLLATION,
        collation: NO_COLLATION,
    })
}

fn int4_const(value: i32) -> Expr {
    Expr::Constant(Constant {
        type_oid: Type::INT4.oid(),
        typmod: -1,
        collation: NO_COLLATION,
        value: Some(Datum::Int4(value)),
    })
}

#[test]
fn test_constant_comparison_pushed_down_and_rendered() {
    let catalog = fixture_catalog();
    let clause = int4_eq(column_ref(REL, 1), int4_const(5));

    let partition = conditions_classify(vec![clause], REL, &catalog);
    assert_eq!(partition.remote.len(), 1);
    assert!(partition.remote_param.is_empty());
    assert!(partition.local.is_empty());
    assert!(partition.param_ids.is_empty());

    let deparser = ExprDeparser::new(&catalog);
    let mut buf = String::new();
    deparser.expr_deparse(&mut buf, &partition.remote[0]).unwrap();
    assert_eq!(buf, "(\"remote_col\" = 5)");
}

#[test]
fn test_parameter_comparison_lands_in_param_bucket() {
    let catalog = fixture_catalog();
    let param = Expr::Parameter(Parameter {
        kind: ParamKind::External,
        id: 1,
        type_oid: Type::INT4.oid(),
        typmod: -1,
        collation: NO_COLLATION,
    });
    let clause = int4_eq(param, column_ref(REL, 1));

    let partition = conditions_classify(vec![clause], REL, &catalog);
    assert_eq!(partition.remote_param.len(), 1);
    assert_eq!(partition.param_ids, vec![1]);

    let deparser = ExprDeparser::new(&catalog);
    let mut buf = String::new();
    deparser
        .expr_deparse(&mut buf, &partition.remote_param[0])
        .unwrap();
    assert_eq!(buf, "($1::integer = \"remote_col\")");
}

#[test]
fn test_join_condition_kept_local() {
    let catalog = fixture_catalog();
    let clause = int4_eq(column_ref(REL, 1), column_ref(OTHER_REL, 1));

    let partition = conditions_classify(vec![clause], REL, &catalog);
    assert!(partition.remote.is_empty());
    assert!(partition.remote_param.is_empty());
    assert_eq!(partition.local.len(), 1);
}

#[test]
fn test_extension_function_kept_local() {
    let catalog = fixture_catalog();
    let clause = Expr::Func(FuncCall {
        func_oid: EXT_FN,
        args: vec![column_ref(REL, 1)],
        coercion: pgship::expr::CoercionForm::Call,
        result_type: Type::BOOL.oid(),
        input_collation: NO_COLLATION,
        collation: NO_COLLATION,
    });

    let partition = conditions_classify(vec![clause], REL, &catalog);
    assert_eq!(partition.local.len(), 1);
}

#[test]
fn test_scan_select_preserves_column_positions() {
    let catalog = fixture_catalog();
    let targets = vec![column_ref(REL, 2)];
    let mut buf = String::new();
    let retrieved = simple_select_deparse(&mut buf, REL, &targets, &[], &catalog).unwrap();
    assert_eq!(buf, "SELECT NULL, \"col2\" FROM \"public\".\"t\"");
    assert_eq!(retrieved, vec![2]);
}

#[test]
fn test_empty_text_array_rendered_with_cast() {
    let catalog = fixture_catalog();
    let expr = Expr::Array(ArrayBuild {
        elements: vec![],
        array_type_oid: Type::TEXT_ARRAY.oid(),
        collation: NO_COLLATION,
    });
    let deparser = ExprDeparser::new(&catalog);
    let mut buf = String::new();
    deparser.expr_deparse(&mut buf, &expr).unwrap();
    assert_eq!(buf, "ARRAY[]::text[]");
}

#[test]
fn test_full_statement_from_partition() {
    let catalog = fixture_catalog();
    let clauses = vec![
        int4_eq(column_ref(REL, 1), int4_const(5)),
        int4_eq(column_ref(REL, 2), column_ref(OTHER_REL, 1)),
    ];
    let partition = conditions_classify(clauses, REL, &catalog);
    assert_eq!(partition.remote.len(), 1);
    assert_eq!(partition.local.len(), 1);

    let mut sql = String::new();
    // Local clause columns still need fetching.
    simple_select_deparse(&mut sql, REL, &[], &partition.local, &catalog).unwrap();
    where_clause_append(&mut sql, &partition.remote, true, &catalog).unwrap();
    assert_eq!(
        sql,
        "SELECT NULL, \"col2\" FROM \"public\".\"t\" WHERE ((\"remote_col\" = 5))"
    );
}
