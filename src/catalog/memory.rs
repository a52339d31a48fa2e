//! In-memory [`SystemCatalog`] backed by hash maps. Embedders load it from
//! whatever metadata source they have; tests build it by hand.

use std::collections::HashMap;

use ecow::EcoString;
use iddqd::BiHashMap;
use postgres_types::Type;

use crate::catalog::{
    CatalogError, CatalogResult, ForeignTableMetadata, FunctionMetadata, OperatorMetadata,
    PG_CATALOG_NAMESPACE, SystemCatalog, TypeMetadata,
};
use crate::expr::{Datum, Oid};

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    namespaces: HashMap<Oid, EcoString>,
    types: HashMap<Oid, TypeMetadata>,
    functions: HashMap<Oid, FunctionMetadata>,
    operators: HashMap<Oid, OperatorMetadata>,
    tables: BiHashMap<ForeignTableMetadata>,
}

impl MemoryCatalog {
    /// Catalog preloaded with the pg_catalog namespace and the built-in
    /// scalar and array types the deparser knows canonical spellings for.
    pub fn new() -> Self {
        let mut catalog = MemoryCatalog::default();
        catalog.namespace_register(PG_CATALOG_NAMESPACE, "pg_catalog");

        let scalars = [
            (Type::BOOL, "bool"),
            (Type::BYTEA, "bytea"),
            (Type::INT8, "int8"),
            (Type::INT2, "int2"),
            (Type::INT4, "int4"),
            (Type::TEXT, "text"),
            (Type::OID, "oid"),
            (Type::FLOAT4, "float4"),
            (Type::FLOAT8, "float8"),
            (Type::UNKNOWN, "unknown"),
            (Type::BPCHAR, "bpchar"),
            (Type::VARCHAR, "varchar"),
            (Type::DATE, "date"),
            (Type::TIME, "time"),
            (Type::TIMESTAMP, "timestamp"),
            (Type::TIMESTAMPTZ, "timestamptz"),
            (Type::INTERVAL, "interval"),
            (Type::BIT, "bit"),
            (Type::VARBIT, "varbit"),
            (Type::NUMERIC, "numeric"),
            (Type::UUID, "uuid"),
        ];
        for (ty, name) in scalars {
            catalog.type_register(TypeMetadata {
                oid: ty.oid(),
                name: name.into(),
                namespace_oid: PG_CATALOG_NAMESPACE,
                element_oid: 0,
            });
        }

        let arrays = [
            (Type::BOOL_ARRAY, "_bool", Type::BOOL),
            (Type::INT8_ARRAY, "_int8", Type::INT8),
            (Type::INT2_ARRAY, "_int2", Type::INT2),
            (Type::INT4_ARRAY, "_int4", Type::INT4),
            (Type::TEXT_ARRAY, "_text", Type::TEXT),
            (Type::FLOAT4_ARRAY, "_float4", Type::FLOAT4),
            (Type::FLOAT8_ARRAY, "_float8", Type::FLOAT8),
            (Type::NUMERIC_ARRAY, "_numeric", Type::NUMERIC),
            (Type::VARCHAR_ARRAY, "_varchar", Type::VARCHAR),
        ];
        for (ty, name, element) in arrays {
            catalog.type_register(TypeMetadata {
                oid: ty.oid(),
                name: name.into(),
                namespace_oid: PG_CATALOG_NAMESPACE,
                element_oid: element.oid(),
            });
        }

        catalog
    }

    pub fn namespace_register(&mut self, oid: Oid, name: &str) {
        self.namespaces.insert(oid, name.into());
    }

    pub fn type_register(&mut self, metadata: TypeMetadata) {
        self.types.insert(metadata.oid, metadata);
    }

    pub fn function_register(&mut self, metadata: FunctionMetadata) {
        self.functions.insert(metadata.oid, metadata);
    }

    pub fn operator_register(&mut self, metadata: OperatorMetadata) {
        self.operators.insert(metadata.oid, metadata);
    }

    pub fn table_register(&mut self, metadata: ForeignTableMetadata) {
        self.tables
            .insert_overwrite(metadata);
    }
}

impl SystemCatalog for MemoryCatalog {
    fn type_lookup(&self, oid: Oid) -> CatalogResult<TypeMetadata> {
        self.types
            .get(&oid)
            .cloned()
            .ok_or(CatalogError::TypeNotFound { oid })
    }

    fn function_lookup(&self, oid: Oid) -> CatalogResult<FunctionMetadata> {
        self.functions
            .get(&oid)
            .cloned()
            .ok_or(CatalogError::FunctionNotFound { oid })
    }

    fn operator_lookup(&self, oid: Oid) -> CatalogResult<OperatorMetadata> {
        self.operators
            .get(&oid)
            .cloned()
            .ok_or(CatalogError::OperatorNotFound { oid })
    }

    fn namespace_name(&self, oid: Oid) -> CatalogResult<EcoString> {
        self.namespaces
            .get(&oid)
            .cloned()
            .ok_or(CatalogError::NamespaceNotFound { oid })
    }

    fn table_lookup(&self, oid: Oid) -> CatalogResult<&ForeignTableMetadata> {
        self.tables
            .get1(&oid)
            .ok_or(CatalogError::RelationNotFound { oid })
    }

    fn format_type(&self, oid: Oid, typmod: i32) -> CatalogResult<String> {
        // Canonical spellings for the bootstrap scalar types, matching what
        // format_type_with_typemod produces on the server.
        let rendered = match oid {
            16 => "boolean".into(),
            17 => "bytea".into(),
            20 => "bigint".into(),
            21 => "smallint".into(),
            23 => "integer".into(),
            25 => "text".into(),
            26 => "oid".into(),
            700 => "real".into(),
            701 => "double precision".into(),
            705 => "unknown".into(),
            1042 => bounded_type("character", typmod),
            1043 => bounded_type("character varying", typmod),
            1560 => bounded_type("bit", typmod),
            1562 => bounded_type("bit varying", typmod),
            1700 => {
                if typmod >= 4 {
                    let precision = (typmod - 4) >> 16;
                    let scale = (typmod - 4) & 0xffff;
                    format!("numeric({precision},{scale})")
                } else {
                    "numeric".into()
                }
            }
            _ => {
                let metadata = self.type_lookup(oid)?;
                if metadata.element_oid != 0 {
                    let mut inner = self.format_type(metadata.element_oid, typmod)?;
                    inner.push_str("[]");
                    return Ok(inner);
                }
                if metadata.namespace_oid == PG_CATALOG_NAMESPACE {
                    metadata.name.to_string()
                } else {
                    let schema = self.namespace_name(metadata.namespace_oid)?;
                    format!(
                        "{}.{}",
                        crate::deparse::identifier_deparse(&schema),
                        crate::deparse::identifier_deparse(&metadata.name)
                    )
                }
            }
        };
        Ok(rendered)
    }

    fn datum_output(&self, type_oid: Oid, value: &Datum) -> CatalogResult<String> {
        let rendered = match value {
            Datum::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            Datum::Int2(v) => v.to_string(),
            Datum::Int4(v) => v.to_string(),
            Datum::Int8(v) => v.to_string(),
            Datum::Float4(v) => float4_output(v.into_inner()),
            Datum::Float8(v) => float8_output(v.into_inner()),
            Datum::Numeric(text)
            | Datum::Text(text)
            | Datum::Bit(text)
            | Datum::Other(text) => text.to_string(),
        };
        // Types we hold no textual form for cannot be printed.
        if matches!(value, Datum::Other(_)) && self.type_lookup(type_oid).is_err() {
            return Err(CatalogError::OutputFunctionNotFound { oid: type_oid });
        }
        Ok(rendered)
    }
}

fn bounded_type(name: &str, typmod: i32) -> String {
    if typmod >= 4 && name.starts_with("character") {
        format!("{name}({})", typmod - 4)
    } else if typmod >= 0 && name.starts_with("bit") {
        format!("{name}({typmod})")
    } else {
        name.to_string()
    }
}

/// Matches float4out: shortest round-trip form at f32 width, Infinity/NaN
/// spelled out.
fn float4_output(value: f32) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

/// Matches float8out.
fn float8_output(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}
