//! Recursive pushdown safety classifier.
//!
//! Decides whether one expression subtree can be evaluated on the remote
//! server without any chance of disagreeing with local evaluation. The
//! walk computes a collation-provenance verdict bottom-up: a collation is
//! only trusted when it demonstrably came from a column of the remote
//! table itself. Rejections are the normal outcome for unsafe clauses and
//! never abort the surrounding analysis.

use error_set::error_set;

use crate::catalog::{DEFAULT_COLLATION_OID, SystemCatalog, Volatility, object_is_builtin};
use crate::expr::{Expr, FuncCall, NO_COLLATION, Oid, OpCall, ParamKind, ScalarArrayOp};

error_set! {
    /// Why a clause cannot be pushed down. Expected outcomes, not errors:
    /// the partitioner routes the clause to local evaluation.
    UnsafeReason = {
        #[display("column does not belong to the analyzed foreign relation")]
        ForeignRelationOnly,
        #[display("column references an upper query level")]
        UpperLevelReference,
        #[display("constant or parameter carries a non-default collation")]
        NondefaultCollation,
        #[display("parameter is not externally supplied")]
        InternalParameter,
        #[display("input collation does not match a remote-derived collation")]
        InputCollationMismatch,
        #[display("object {oid} is not built in")]
        NonBuiltinObject { oid: Oid },
        #[display("expression contains non-immutable functions")]
        MutableFunctions,
        #[display("catalog has no entry for object {oid}")]
        UnknownObject { oid: Oid },
    };
}

/// Collation provenance of a subtree, ranked. A higher state absorbs a
/// lower one when sibling verdicts merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CollationState {
    /// Result type is noncollatable.
    None,
    /// Collation derives from a column of the remote table.
    Safe,
    /// Collation derives from anything else.
    Unsafe,
}

/// Call-scoped context: fixed inputs plus the accumulating list of
/// external-parameter ids, duplicates included.
#[derive(Debug)]
struct GlobalContext {
    foreign_relation: Oid,
    param_ids: Vec<i32>,
}

/// Per-recursion-level collation accumulator, created fresh for each call
/// and folded into the caller's on return.
#[derive(Debug, Clone, Copy)]
struct LocalContext {
    collation: Oid,
    state: CollationState,
}

impl LocalContext {
    fn new() -> Self {
        LocalContext {
            collation: NO_COLLATION,
            state: CollationState::None,
        }
    }
}

/// Classify one clause. On acceptance, returns the external-parameter ids
/// referenced by the clause in traversal order, duplicates included.
pub fn expr_pushdown_is_safe(
    expr: &Expr,
    foreign_relation: Oid,
    catalog: &impl SystemCatalog,
) -> Result<Vec<i32>, UnsafeReason> {
    let mut glob = GlobalContext {
        foreign_relation,
        param_ids: Vec::new(),
    };
    let mut top = LocalContext::new();
    expr_walk(expr, &mut glob, &mut top, catalog)?;

    // An accepted restriction clause is boolean, hence noncollatable.
    debug_assert_eq!(top.state, CollationState::None);
    debug_assert_eq!(top.collation, NO_COLLATION);

    // Checked last: requires its own exhaustive subtree scan.
    mutable_functions_check(expr, catalog)?;

    Ok(glob.param_ids)
}

fn expr_walk(
    expr: &Expr,
    glob: &mut GlobalContext,
    outer: &mut LocalContext,
    catalog: &impl SystemCatalog,
) -> Result<(), UnsafeReason> {
    let mut inner = LocalContext::new();
    let collation;
    let state;
    let mut check_type = true;

    match expr {
        Expr::Column(col) => {
            if col.levelsup != 0 {
                return Err(UnsafeReason::UpperLevelReference);
            }
            if col.relation_oid != glob.foreign_relation {
                return Err(UnsafeReason::ForeignRelationOnly);
            }
            collation = col.collation;
            state = if collation == NO_COLLATION {
                CollationState::None
            } else {
                CollationState::Safe
            };
        }
        Expr::Constant(c) => {
            if c.collation != NO_COLLATION && c.collation != DEFAULT_COLLATION_OID {
                return Err(UnsafeReason::NondefaultCollation);
            }
            collation = NO_COLLATION;
            state = CollationState::None;
        }
        Expr::Parameter(p) => {
            if p.collation != NO_COLLATION && p.collation != DEFAULT_COLLATION_OID {
                return Err(UnsafeReason::NondefaultCollation);
            }
            if p.kind != ParamKind::External {
                return Err(UnsafeReason::InternalParameter);
            }
            glob.param_ids.push(p.id);
            collation = NO_COLLATION;
            state = CollationState::None;
        }
        Expr::Subscript(s) => {
            for index in s.upper.iter().chain(s.lower.iter()) {
                expr_walk(index, glob, &mut inner, catalog)?;
            }
            expr_walk(&s.subject, glob, &mut inner, catalog)?;
            (collation, state) = result_collation_state(s.collation, &inner);
        }
        Expr::Func(f) => {
            if !object_is_builtin(f.func_oid) {
                return Err(UnsafeReason::NonBuiltinObject { oid: f.func_oid });
            }
            for arg in &f.args {
                expr_walk(arg, glob, &mut inner, catalog)?;
            }
            input_collation_check(f.input_collation, &inner)?;
            (collation, state) = result_collation_state(f.collation, &inner);
        }
        Expr::Op(o) | Expr::Distinct(o) => {
            if !object_is_builtin(o.op_oid) {
                return Err(UnsafeReason::NonBuiltinObject { oid: o.op_oid });
            }
            for arg in &o.args {
                expr_walk(arg, glob, &mut inner, catalog)?;
            }
            input_collation_check(o.input_collation, &inner)?;
            (collation, state) = result_collation_state(o.collation, &inner);
        }
        Expr::ScalarArrayOp(s) => {
            if !object_is_builtin(s.op_oid) {
                return Err(UnsafeReason::NonBuiltinObject { oid: s.op_oid });
            }
            expr_walk(&s.left, glob, &mut inner, catalog)?;
            expr_walk(&s.right, glob, &mut inner, catalog)?;
            input_collation_check(s.input_collation, &inner)?;
            // Output is always boolean, hence noncollatable.
            collation = NO_COLLATION;
            state = CollationState::None;
        }
        Expr::Relabel(r) => {
            expr_walk(&r.arg, glob, &mut inner, catalog)?;
            // A relabel can introduce a collation unrelated to its input.
            (collation, state) = result_collation_state(r.collation, &inner);
        }
        Expr::Bool(b) => {
            for arg in &b.args {
                expr_walk(arg, glob, &mut inner, catalog)?;
            }
            collation = NO_COLLATION;
            state = CollationState::None;
        }
        Expr::NullTest(n) => {
            expr_walk(&n.arg, glob, &mut inner, catalog)?;
            collation = NO_COLLATION;
            state = CollationState::None;
        }
        Expr::Array(a) => {
            for element in &a.elements {
                expr_walk(element, glob, &mut inner, catalog)?;
            }
            (collation, state) = result_collation_state(a.collation, &inner);
        }
        Expr::List(items) => {
            for item in items {
                expr_walk(item, glob, &mut inner, catalog)?;
            }
            // Pass the children's verdict through; the wrapper has no
            // result type of its own.
            collation = inner.collation;
            state = inner.state;
            check_type = false;
        }
    }

    if check_type {
        // type_oid is Some for every variant except the list wrapper.
        if let Some(type_oid) = expr.type_oid() {
            if !object_is_builtin(type_oid) {
                return Err(UnsafeReason::NonBuiltinObject { oid: type_oid });
            }
        }
    }

    collation_merge(collation, state, outer);
    Ok(())
}

/// Verdict for a node whose result collation is declared on the node
/// itself: trusted only when it matches a remote-derived child collation.
fn result_collation_state(collation: Oid, inner: &LocalContext) -> (Oid, CollationState) {
    let state = if collation == NO_COLLATION {
        CollationState::None
    } else if inner.state == CollationState::Safe && collation == inner.collation {
        CollationState::Safe
    } else {
        CollationState::Unsafe
    };
    (collation, state)
}

/// A node that performs collation-sensitive work must have resolved its
/// input collation from a remote column, or not at all.
fn input_collation_check(input_collation: Oid, inner: &LocalContext) -> Result<(), UnsafeReason> {
    if input_collation == NO_COLLATION {
        return Ok(());
    }
    if inner.state != CollationState::Safe || input_collation != inner.collation {
        return Err(UnsafeReason::InputCollationMismatch);
    }
    Ok(())
}

/// Fold one sibling verdict into the accumulator. A higher-ranked state
/// replaces a lower one; on a Safe/Safe tie with differing collations, a
/// non-default collation beats a default one and two different non-default
/// collations leave the accumulator Unsafe. The conflict does not abort
/// the walk: the parent node may turn out not to care.
fn collation_merge(collation: Oid, state: CollationState, outer: &mut LocalContext) {
    if state > outer.state {
        outer.collation = collation;
        outer.state = state;
    } else if state == outer.state
        && state == CollationState::Safe
        && collation != outer.collation
    {
        if outer.collation == DEFAULT_COLLATION_OID {
            outer.collation = collation;
        } else if collation != DEFAULT_COLLATION_OID {
            outer.state = CollationState::Unsafe;
        }
    }
}

fn mutable_functions_check(
    expr: &Expr,
    catalog: &impl SystemCatalog,
) -> Result<(), UnsafeReason> {
    for func in expr.nodes::<FuncCall>() {
        function_immutable_check(func.func_oid, catalog)?;
    }
    for op in expr.nodes::<OpCall>() {
        operator_immutable_check(op.op_oid, catalog)?;
    }
    for op in expr.nodes::<ScalarArrayOp>() {
        operator_immutable_check(op.op_oid, catalog)?;
    }
    Ok(())
}

fn function_immutable_check(
    func_oid: Oid,
    catalog: &impl SystemCatalog,
) -> Result<(), UnsafeReason> {
    let function = catalog
        .function_lookup(func_oid)
        .map_err(|_| UnsafeReason::UnknownObject { oid: func_oid })?;
    if function.volatility != Volatility::Immutable {
        return Err(UnsafeReason::MutableFunctions);
    }
    Ok(())
}

fn operator_immutable_check(op_oid: Oid, catalog: &impl SystemCatalog) -> Result<(), UnsafeReason> {
    let operator = catalog
        .operator_lookup(op_oid)
        .map_err(|_| UnsafeReason::UnknownObject { oid: op_oid })?;
    function_immutable_check(operator.function_oid, catalog)
}
