//! Expression renderer. Produces SQL text a remote server parses back to
//! exactly the local semantics; everything outside the base catalog schema
//! is schema-qualified and all identifiers are quoted.

use std::fmt::Write;

use postgres_types::Type;

use crate::catalog::{CatalogError, OperatorKind, SystemCatalog};
use crate::deparse::{DeparseError, DeparseResult, identifier_deparse, string_literal_deparse};
use crate::expr::{
    ArrayBuild, BoolCall, BoolOp, ColumnRef, Constant, CoercionForm, Datum, Expr, FuncCall,
    NullTest, OpCall, Oid, Parameter, ScalarArrayOp, Subscript, WHOLE_ROW_ATTNO,
};
use crate::result::MapIntoReport;

/// Renders accepted expression trees into a caller-provided buffer.
pub struct ExprDeparser<'a, C: SystemCatalog> {
    catalog: &'a C,
}

impl<'a, C: SystemCatalog> ExprDeparser<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        ExprDeparser { catalog }
    }

    /// Append the SQL text of `expr` to `buf`. The match is exhaustive over
    /// the grammar, so classifier/deparser divergence cannot compile.
    pub fn expr_deparse(&self, buf: &mut String, expr: &Expr) -> DeparseResult<()> {
        match expr {
            Expr::Column(col) => self.column_deparse(buf, col),
            Expr::Constant(c) => self.constant_deparse(buf, c),
            Expr::Parameter(p) => self.parameter_deparse(buf, p),
            Expr::Subscript(s) => self.subscript_deparse(buf, s),
            Expr::Func(f) => self.func_deparse(buf, f),
            Expr::Op(o) => self.op_deparse(buf, o),
            Expr::Distinct(o) => self.distinct_deparse(buf, o),
            Expr::ScalarArrayOp(s) => self.scalar_array_op_deparse(buf, s),
            Expr::Relabel(r) => {
                self.expr_deparse(buf, &r.arg)?;
                if r.coercion != CoercionForm::ImplicitCast {
                    self.type_cast_append(buf, r.result_type, r.result_typmod)?;
                }
                Ok(())
            }
            Expr::Bool(b) => self.bool_deparse(buf, b),
            Expr::NullTest(n) => self.null_test_deparse(buf, n),
            Expr::Array(a) => self.array_deparse(buf, a),
            Expr::List(items) => self.expr_list_deparse(buf, items),
        }
    }

    fn expr_list_deparse(&self, buf: &mut String, items: &[Expr]) -> DeparseResult<()> {
        let mut first = true;
        for item in items {
            if !first {
                buf.push_str(", ");
            }
            self.expr_deparse(buf, item)?;
            first = false;
        }
        Ok(())
    }

    fn column_deparse(&self, buf: &mut String, col: &ColumnRef) -> DeparseResult<()> {
        let table = self.catalog.table_lookup(col.relation_oid).map_into_report()?;

        if col.attno == WHOLE_ROW_ATTNO {
            // Whole-row reference is spelled as a ROW(...) over the
            // surviving columns so the remote side needs no composite type.
            buf.push_str("ROW(");
            let mut first = true;
            for column in table.attributes_ordered() {
                if column.is_dropped {
                    continue;
                }
                if !first {
                    buf.push_str(", ");
                }
                buf.push_str(&identifier_deparse(column.remote_name()));
                first = false;
            }
            buf.push(')');
            return Ok(());
        }

        let column = table
            .column_by_attno(col.attno)
            .ok_or(CatalogError::AttributeNotFound {
                relation_oid: col.relation_oid,
                attno: col.attno,
            })
            .map_into_report()?;
        buf.push_str(&identifier_deparse(column.remote_name()));
        Ok(())
    }

    fn constant_deparse(&self, buf: &mut String, c: &Constant) -> DeparseResult<()> {
        let Some(value) = &c.value else {
            buf.push_str("NULL");
            self.type_cast_append(buf, c.type_oid, c.typmod)?;
            return Ok(());
        };

        let text = self
            .catalog
            .datum_output(c.type_oid, value)
            .map_into_report()?;

        // Tracks whether an unquoted numeric rendering would already be
        // parsed back as an unlabeled float/numeric.
        let mut looks_like_float = false;

        if type_is_numeric_family(c.type_oid) {
            // Unquoted unless the output carries a special value like NaN.
            if text
                .chars()
                .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | 'e' | 'E' | '.'))
            {
                if text.starts_with(['+', '-']) {
                    // Parenthesize so a leading sign is not misread as a
                    // unary operator applying to surrounding text.
                    buf.push('(');
                    buf.push_str(&text);
                    buf.push(')');
                } else {
                    buf.push_str(&text);
                }
                looks_like_float = text.contains(['e', 'E', '.']);
            } else {
                buf.push('\'');
                buf.push_str(&text);
                buf.push('\'');
            }
        } else if c.type_oid == Type::BIT.oid() || c.type_oid == Type::VARBIT.oid() {
            buf.push_str("B'");
            buf.push_str(&text);
            buf.push('\'');
        } else if c.type_oid == Type::BOOL.oid() {
            buf.push_str(if text == "t" { "true" } else { "false" });
        } else {
            buf.push_str(&string_literal_deparse(&text));
        }

        // Label unless the text already parses back to the right type:
        // bool, int4 and unknown are the parser's defaults, numeric only
        // when it reads as a float and carries no precision/scale.
        let needlabel = if c.type_oid == Type::BOOL.oid()
            || c.type_oid == Type::INT4.oid()
            || c.type_oid == Type::UNKNOWN.oid()
        {
            false
        } else if c.type_oid == Type::NUMERIC.oid() {
            !looks_like_float || c.typmod >= 0
        } else {
            true
        };
        if needlabel {
            self.type_cast_append(buf, c.type_oid, c.typmod)?;
        }
        Ok(())
    }

    fn parameter_deparse(&self, buf: &mut String, p: &Parameter) -> DeparseResult<()> {
        // The type label is mandatory: the remote server must not have to
        // guess, and only type names (never oids) are portable.
        let _ = write!(buf, "${}", p.id);
        self.type_cast_append(buf, p.type_oid, p.typmod)
    }

    fn subscript_deparse(&self, buf: &mut String, s: &Subscript) -> DeparseResult<()> {
        buf.push('(');

        // Parenthesize the subject unless it is a bare column, so a
        // trailing cast is not misread as subscript decoration.
        if matches!(s.subject.as_ref(), Expr::Column(_)) {
            self.expr_deparse(buf, &s.subject)?;
        } else {
            buf.push('(');
            self.expr_deparse(buf, &s.subject)?;
            buf.push(')');
        }

        for (i, upper) in s.upper.iter().enumerate() {
            buf.push('[');
            if let Some(lower) = s.lower.get(i) {
                self.expr_deparse(buf, lower)?;
                buf.push(':');
            }
            self.expr_deparse(buf, upper)?;
            buf.push(']');
        }

        buf.push(')');
        Ok(())
    }

    fn func_deparse(&self, buf: &mut String, f: &FuncCall) -> DeparseResult<()> {
        // An implicit cast is invisible in source SQL.
        if f.coercion == CoercionForm::ImplicitCast {
            let arg = f.args.first().ok_or(DeparseError::MalformedNode {
                detail: "cast call has no argument",
            })?;
            return self.expr_deparse(buf, arg);
        }

        // An explicit cast renders as arg::type, recovering the typmod when
        // the call is a length coercion.
        if f.coercion == CoercionForm::ExplicitCast {
            let arg = f.args.first().ok_or(DeparseError::MalformedNode {
                detail: "cast call has no argument",
            })?;
            self.expr_deparse(buf, arg)?;
            return self.type_cast_append(buf, f.result_type, length_coercion_typmod(f));
        }

        let function = self.catalog.function_lookup(f.func_oid).map_into_report()?;
        if function.namespace_oid != self.catalog.base_catalog_namespace() {
            let schema = self
                .catalog
                .namespace_name(function.namespace_oid)
                .map_into_report()?;
            buf.push_str(&identifier_deparse(&schema));
            buf.push('.');
        }
        buf.push_str(&identifier_deparse(&function.name));
        buf.push('(');
        self.expr_list_deparse(buf, &f.args)?;
        buf.push(')');
        Ok(())
    }

    fn op_deparse(&self, buf: &mut String, o: &OpCall) -> DeparseResult<()> {
        let operator = self.catalog.operator_lookup(o.op_oid).map_into_report()?;

        let arity_ok = match operator.kind {
            OperatorKind::Infix => o.args.len() == 2,
            OperatorKind::Prefix | OperatorKind::Postfix => o.args.len() == 1,
        };
        if !arity_ok {
            return Err(DeparseError::MalformedNode {
                detail: "operator argument count does not match its fixity",
            }
            .into());
        }

        buf.push('(');
        if operator.kind != OperatorKind::Prefix {
            self.expr_deparse(buf, &o.args[0])?;
            buf.push(' ');
        }
        self.operator_name_deparse(buf, &operator)?;
        if operator.kind != OperatorKind::Postfix {
            buf.push(' ');
            self.expr_deparse(buf, o.args.last().ok_or(DeparseError::MalformedNode {
                detail: "operator call has no arguments",
            })?)?;
        }
        buf.push(')');
        Ok(())
    }

    /// Operator names are not SQL identifiers and are never quoted; outside
    /// the base catalog schema the OPERATOR() decoration carries the schema.
    fn operator_name_deparse(
        &self,
        buf: &mut String,
        operator: &crate::catalog::OperatorMetadata,
    ) -> DeparseResult<()> {
        if operator.namespace_oid != self.catalog.base_catalog_namespace() {
            let schema = self
                .catalog
                .namespace_name(operator.namespace_oid)
                .map_into_report()?;
            let _ = write!(buf, "OPERATOR({}.{})", identifier_deparse(&schema), operator.name);
        } else {
            buf.push_str(&operator.name);
        }
        Ok(())
    }

    fn distinct_deparse(&self, buf: &mut String, o: &OpCall) -> DeparseResult<()> {
        let [left, right] = o.args.as_slice() else {
            return Err(DeparseError::MalformedNode {
                detail: "IS DISTINCT FROM requires exactly two operands",
            }
            .into());
        };
        buf.push('(');
        self.expr_deparse(buf, left)?;
        buf.push_str(" IS DISTINCT FROM ");
        self.expr_deparse(buf, right)?;
        buf.push(')');
        Ok(())
    }

    fn scalar_array_op_deparse(&self, buf: &mut String, s: &ScalarArrayOp) -> DeparseResult<()> {
        let operator = self.catalog.operator_lookup(s.op_oid).map_into_report()?;

        buf.push('(');
        self.expr_deparse(buf, &s.left)?;
        buf.push(' ');
        self.operator_name_deparse(buf, &operator)?;
        buf.push_str(if s.use_or { " ANY (" } else { " ALL (" });
        self.expr_deparse(buf, &s.right)?;
        buf.push(')');
        buf.push(')');
        Ok(())
    }

    fn bool_deparse(&self, buf: &mut String, b: &BoolCall) -> DeparseResult<()> {
        let connective = match b.op {
            BoolOp::Not => {
                let arg = b.args.first().ok_or(DeparseError::MalformedNode {
                    detail: "NOT requires an operand",
                })?;
                buf.push_str("(NOT ");
                self.expr_deparse(buf, arg)?;
                buf.push(')');
                return Ok(());
            }
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        };

        // Arguments render in the given order; no re-flattening.
        buf.push('(');
        let mut first = true;
        for arg in &b.args {
            if !first {
                buf.push_str(connective);
            }
            self.expr_deparse(buf, arg)?;
            first = false;
        }
        buf.push(')');
        Ok(())
    }

    fn null_test_deparse(&self, buf: &mut String, n: &NullTest) -> DeparseResult<()> {
        buf.push('(');
        self.expr_deparse(buf, &n.arg)?;
        buf.push_str(if n.negated { " IS NOT NULL" } else { " IS NULL" });
        buf.push(')');
        Ok(())
    }

    fn array_deparse(&self, buf: &mut String, a: &ArrayBuild) -> DeparseResult<()> {
        buf.push_str("ARRAY[");
        self.expr_list_deparse(buf, &a.elements)?;
        buf.push(']');

        // An untyped empty array literal is ambiguous.
        if a.elements.is_empty() {
            self.type_cast_append(buf, a.array_type_oid, -1)?;
        }
        Ok(())
    }

    fn type_cast_append(&self, buf: &mut String, type_oid: Oid, typmod: i32) -> DeparseResult<()> {
        let spelled = self.catalog.format_type(type_oid, typmod).map_into_report()?;
        buf.push_str("::");
        buf.push_str(&spelled);
        Ok(())
    }
}

/// Types whose output function produces plain numeric text.
fn type_is_numeric_family(oid: Oid) -> bool {
    [
        Type::INT2,
        Type::INT4,
        Type::INT8,
        Type::OID,
        Type::FLOAT4,
        Type::FLOAT8,
        Type::NUMERIC,
    ]
    .iter()
    .any(|ty| ty.oid() == oid)
}

/// Typmod applied by a length-coercion call, recovered from its second
/// argument; -1 when the call does not have that shape.
fn length_coercion_typmod(f: &FuncCall) -> i32 {
    match f.args.get(1) {
        Some(Expr::Constant(Constant {
            value: Some(Datum::Int4(typmod)),
            ..
        })) => *typmod,
        _ => -1,
    }
}
