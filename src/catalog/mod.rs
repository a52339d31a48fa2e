//! System catalog access needed by the classifier and the deparser.
//!
//! The classifier only ever asks about volatility, namespaces and built-in
//! status; the deparser additionally needs names, type rendering and datum
//! output. Both go through [`SystemCatalog`] so tests and embedders can
//! supply their own metadata source.

use ecow::EcoString;
use error_set::error_set;
use iddqd::{BiHashItem, BiHashMap, bi_upcast};
use serde::Deserialize;

use crate::expr::{AttrNumber, Datum, Oid};

pub mod memory;

pub use memory::MemoryCatalog;

/// Oid of the database-default collation.
pub const DEFAULT_COLLATION_OID: Oid = 100;

/// Objects below this oid are assigned at schema bootstrap and exist
/// identically on every server of the same major version.
pub const FIRST_BOOTSTRAP_OBJECT_ID: Oid = 10_000;

/// Namespace oid of pg_catalog.
pub const PG_CATALOG_NAMESPACE: Oid = 11;

/// True for objects created during schema bootstrap. Such objects can be
/// assumed present and identical on any remote server.
pub fn object_is_builtin(oid: Oid) -> bool {
    oid < FIRST_BOOTSTRAP_OBJECT_ID
}

error_set! {
    CatalogError = {
        #[display("type not found: oid {oid}")]
        TypeNotFound { oid: Oid },
        #[display("function not found: oid {oid}")]
        FunctionNotFound { oid: Oid },
        #[display("operator not found: oid {oid}")]
        OperatorNotFound { oid: Oid },
        #[display("namespace not found: oid {oid}")]
        NamespaceNotFound { oid: Oid },
        #[display("relation not found: oid {oid}")]
        RelationNotFound { oid: Oid },
        #[display("attribute {attno} of relation {relation_oid} not found")]
        AttributeNotFound { relation_oid: Oid, attno: AttrNumber },
        #[display("no output function for type oid {oid}")]
        OutputFunctionNotFound { oid: Oid },
    };
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Function volatility class from pg_proc.provolatile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

/// Operator fixity from pg_operator.oprkind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Prefix,
    Postfix,
    Infix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub oid: Oid,
    pub name: EcoString,
    pub namespace_oid: Oid,
    pub volatility: Volatility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorMetadata {
    pub oid: Oid,
    pub name: EcoString,
    pub namespace_oid: Oid,
    pub kind: OperatorKind,
    /// Underlying pg_proc entry; volatility is checked through it.
    pub function_oid: Oid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMetadata {
    pub oid: Oid,
    pub name: EcoString,
    pub namespace_oid: Oid,
    /// Element type for array types, zero otherwise.
    pub element_oid: Oid,
}

/// Per-table name overrides from the foreign table's options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TableOptions {
    pub schema_name: Option<EcoString>,
    pub table_name: Option<EcoString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: EcoString,
    pub position: AttrNumber,
    pub type_oid: Oid,
    pub typmod: i32,
    pub is_dropped: bool,
    /// Remote name override from the column's options.
    pub name_option: Option<EcoString>,
}

impl ColumnMetadata {
    /// Name to use in remote SQL.
    pub fn remote_name(&self) -> &str {
        self.name_option.as_deref().unwrap_or(&self.name)
    }
}

impl BiHashItem for ColumnMetadata {
    type K1<'a> = &'a str;
    type K2<'a> = AttrNumber;

    fn key1(&self) -> Self::K1<'_> {
        &self.name
    }

    fn key2(&self) -> Self::K2<'_> {
        self.position
    }

    bi_upcast!();
}

#[derive(Debug, Clone)]
pub struct ForeignTableMetadata {
    pub relation_oid: Oid,
    pub name: EcoString,
    pub namespace_oid: Oid,
    pub options: TableOptions,
    pub columns: BiHashMap<ColumnMetadata>,
}

impl ForeignTableMetadata {
    pub fn column_by_attno(&self, attno: AttrNumber) -> Option<&ColumnMetadata> {
        self.columns.get2(&attno)
    }

    /// Columns in attnum order, dropped ones included.
    pub fn attributes_ordered(&self) -> Vec<&ColumnMetadata> {
        let mut cols: Vec<&ColumnMetadata> = self.columns.iter().collect();
        cols.sort_by_key(|col| col.position);
        cols
    }
}

impl BiHashItem for ForeignTableMetadata {
    type K1<'a> = Oid;
    type K2<'a> = (&'a str, Oid);

    fn key1(&self) -> Self::K1<'_> {
        self.relation_oid
    }

    fn key2(&self) -> Self::K2<'_> {
        (&self.name, self.namespace_oid)
    }

    bi_upcast!();
}

/// Metadata source for classification and deparsing.
pub trait SystemCatalog {
    fn type_lookup(&self, oid: Oid) -> CatalogResult<TypeMetadata>;

    fn function_lookup(&self, oid: Oid) -> CatalogResult<FunctionMetadata>;

    fn operator_lookup(&self, oid: Oid) -> CatalogResult<OperatorMetadata>;

    fn namespace_name(&self, oid: Oid) -> CatalogResult<EcoString>;

    fn table_lookup(&self, oid: Oid) -> CatalogResult<&ForeignTableMetadata>;

    /// SQL spelling of a type, suitable for a cast target. Uses the
    /// canonical keyword spellings for built-in scalar types and
    /// schema-qualifies anything outside pg_catalog.
    fn format_type(&self, oid: Oid, typmod: i32) -> CatalogResult<String>;

    /// Text-form output of a datum, as the type's output function would
    /// print it.
    fn datum_output(&self, type_oid: Oid, value: &Datum) -> CatalogResult<String>;

    /// Namespace whose objects never need schema qualification.
    fn base_catalog_namespace(&self) -> Oid {
        PG_CATALOG_NAMESPACE
    }

    /// Force datum output into a portable, locale-independent form.
    /// Returns an opaque token for [`Self::transmission_modes_reset`].
    fn transmission_modes_set(&self) -> i32 {
        0
    }

    fn transmission_modes_reset(&self, _token: i32) {}
}
