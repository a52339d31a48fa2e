//! Expression tree for remote-evaluable predicates.
//!
//! This is a closed grammar: it contains exactly the node kinds the safety
//! classifier can vouch for and the deparser can render. Anything the planner
//! produces outside this set never reaches these types — the classifier
//! rejects the clause upstream and it stays local.

use std::any::Any;

use ecow::EcoString;
use ordered_float::OrderedFloat;
use postgres_types::Type;

/// PostgreSQL object identifier.
pub type Oid = u32;

/// 1-based column ordinal, matching PostgreSQL attnum.
pub type AttrNumber = i16;

/// Attnum of a whole-row reference.
pub const WHOLE_ROW_ATTNO: AttrNumber = 0;

/// The absence of a collation (InvalidOid in the catalog).
pub const NO_COLLATION: Oid = 0;

/// A constant's value, held opaquely until the catalog's output function
/// turns it into text at deparse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datum {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(OrderedFloat<f32>),
    Float8(OrderedFloat<f64>),
    /// Arbitrary-precision numeric in its text form (carries NaN too).
    Numeric(EcoString),
    Text(EcoString),
    /// Bit-string digits without the B'...' decoration.
    Bit(EcoString),
    /// Pre-stringified value of any other type.
    Other(EcoString),
}

/// Fully qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Relation the column belongs to.
    pub relation_oid: Oid,
    /// Column ordinal; [`WHOLE_ROW_ATTNO`] means the whole row.
    pub attno: AttrNumber,
    /// Query nesting levels up from the clause being analyzed. Anything
    /// other than zero is an outer reference and never pushdown-safe.
    pub levelsup: u32,
    /// Declared type of the column.
    pub type_oid: Oid,
    /// Collation of the column, [`NO_COLLATION`] for noncollatable types.
    pub collation: Oid,
}

/// Literal constant with its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
    /// `None` is SQL NULL.
    pub value: Option<Datum>,
}

/// How a parameter value reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Supplied by the calling environment ($n in the source query).
    External,
    /// Derived by the executor (subplan outputs and the like).
    Internal,
}

/// Placeholder for a value bound at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub kind: ParamKind,
    pub id: i32,
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
}

/// Array indexing or slicing. There is no write form: assignment targets
/// never appear in restriction clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscript {
    pub subject: Box<Expr>,
    /// Upper bound (or sole index) per dimension.
    pub upper: Vec<Expr>,
    /// Lower bounds, paired positionally with `upper`; empty for plain
    /// indexing rather than slicing.
    pub lower: Vec<Expr>,
    pub type_oid: Oid,
    pub collation: Oid,
}

/// Whether a function call is spelled as a call or as a cast in source SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoercionForm {
    /// Ordinary `f(x)` call.
    Call,
    /// `x::type` / `CAST(x AS type)`.
    ExplicitCast,
    /// Parser-inserted coercion, invisible in source text.
    ImplicitCast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub func_oid: Oid,
    pub args: Vec<Expr>,
    pub coercion: CoercionForm,
    pub result_type: Oid,
    /// Collation the function's inputs were resolved to.
    pub input_collation: Oid,
    /// Collation of the result.
    pub collation: Oid,
}

/// Operator invocation; one operand for prefix/postfix operators, two for
/// infix. Fixity lives in the operator's catalog entry, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct OpCall {
    pub op_oid: Oid,
    pub args: Vec<Expr>,
    pub result_type: Oid,
    pub input_collation: Oid,
    pub collation: Oid,
}

/// `scalar op ANY|ALL (array)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarArrayOp {
    pub op_oid: Oid,
    /// True for ANY, false for ALL.
    pub use_or: bool,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub input_collation: Oid,
}

/// Binary-compatible cast: same bits, different type label.
#[derive(Debug, Clone, PartialEq)]
pub struct Relabel {
    pub arg: Box<Expr>,
    pub result_type: Oid,
    pub result_typmod: i32,
    pub coercion: CoercionForm,
    pub collation: Oid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// Boolean combination. AND/OR arrive pre-flattened into N-ary form from the
/// planner; NOT always has exactly one argument.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolCall {
    pub op: BoolOp,
    pub args: Vec<Expr>,
}

/// `expr IS [NOT] NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct NullTest {
    pub arg: Box<Expr>,
    pub negated: bool,
}

/// `ARRAY[...]` constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBuild {
    pub elements: Vec<Expr>,
    pub array_type_oid: Oid,
    pub collation: Oid,
}

/// A remote-evaluable expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Constant(Constant),
    Parameter(Parameter),
    Subscript(Subscript),
    Func(FuncCall),
    Op(OpCall),
    /// IS DISTINCT FROM; structurally an operator call with two operands.
    Distinct(OpCall),
    ScalarArrayOp(ScalarArrayOp),
    Relabel(Relabel),
    Bool(BoolCall),
    NullTest(NullTest),
    Array(ArrayBuild),
    /// Ordered sibling group, used purely for recursing over child lists.
    List(Vec<Expr>),
}

impl Expr {
    /// Result type of this expression, `None` for the synthetic list
    /// wrapper which has no type of its own.
    pub fn type_oid(&self) -> Option<Oid> {
        match self {
            Expr::Column(col) => Some(col.type_oid),
            Expr::Constant(c) => Some(c.type_oid),
            Expr::Parameter(p) => Some(p.type_oid),
            Expr::Subscript(s) => Some(s.type_oid),
            Expr::Func(f) => Some(f.result_type),
            Expr::Op(o) | Expr::Distinct(o) => Some(o.result_type),
            Expr::ScalarArrayOp(_) | Expr::Bool(_) | Expr::NullTest(_) => {
                Some(Type::BOOL.oid())
            }
            Expr::Relabel(r) => Some(r.result_type),
            Expr::Array(a) => Some(a.array_type_oid),
            Expr::List(_) => None,
        }
    }

    /// Iterate over all nodes of type `N` in this subtree, this node included.
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children: Box<dyn Iterator<Item = &'_ N>> = match self {
            Expr::Column(col) => Box::new(col.nodes()),
            Expr::Constant(c) => Box::new(c.nodes()),
            Expr::Parameter(p) => Box::new(p.nodes()),
            Expr::Subscript(s) => Box::new(s.nodes()),
            Expr::Func(f) => Box::new(f.nodes()),
            Expr::Op(o) | Expr::Distinct(o) => Box::new(o.nodes()),
            Expr::ScalarArrayOp(s) => Box::new(s.nodes()),
            Expr::Relabel(r) => Box::new(r.nodes()),
            Expr::Bool(b) => Box::new(b.nodes()),
            Expr::NullTest(n) => Box::new(n.nodes()),
            Expr::Array(a) => Box::new(a.nodes()),
            Expr::List(items) => Box::new(items.iter().flat_map(|item| item.nodes())),
        };
        current.chain(children)
    }
}

impl ColumnRef {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        (self as &dyn Any).downcast_ref::<N>().into_iter()
    }
}

impl Constant {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        (self as &dyn Any).downcast_ref::<N>().into_iter()
    }
}

impl Parameter {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        (self as &dyn Any).downcast_ref::<N>().into_iter()
    }
}

impl Subscript {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self
            .subject
            .nodes()
            .chain(self.upper.iter().flat_map(|e| e.nodes()))
            .chain(self.lower.iter().flat_map(|e| e.nodes()));
        current.chain(children)
    }
}

impl FuncCall {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.args.iter().flat_map(|arg| arg.nodes());
        current.chain(children)
    }
}

impl OpCall {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.args.iter().flat_map(|arg| arg.nodes());
        current.chain(children)
    }
}

impl ScalarArrayOp {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.left.nodes().chain(self.right.nodes());
        current.chain(children)
    }
}

impl Relabel {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.arg.nodes();
        current.chain(children)
    }
}

impl BoolCall {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.args.iter().flat_map(|arg| arg.nodes());
        current.chain(children)
    }
}

impl NullTest {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.arg.nodes();
        current.chain(children)
    }
}

impl ArrayBuild {
    pub fn nodes<N: Any>(&self) -> impl Iterator<Item = &'_ N> {
        let current = (self as &dyn Any).downcast_ref::<N>().into_iter();
        let children = self.elements.iter().flat_map(|e| e.nodes());
        current.chain(children)
    }
}
