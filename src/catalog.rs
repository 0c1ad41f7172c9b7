//! Declarative canonical-field catalog.
//!
//! The catalog is configuration, not logic: each [`FieldSpec`] names a storage column, lists the
//! header spellings (aliases) accepted for it in priority order, and declares its [`FieldType`]
//! and [`FieldDefault`]. Column resolution and record building are plain functions over a
//! [`Catalog`] and the upload's headers.
//!
//! Catalogs can be built in code ([`Catalog::sales`] is the built-in one) or loaded from TOML:
//!
//! ```toml
//! [[field]]
//! name = "client_name"
//! aliases = ["Cliente", "customer"]
//! type = "text"
//! identity = true
//! required = true
//!
//! [[field]]
//! name = "value"
//! aliases = ["Venta", "amount"]
//! type = "decimal"
//! default = 0.0
//!
//! [[field]]
//! name = "date"
//! aliases = ["Fecha"]
//! type = "timestamp"
//! default = "now"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CatalogError, ImportResult};
use crate::types::FieldType;

/// Value used when a field's header is absent or its cell cannot be coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// Store NULL.
    Null,
    /// Fixed text.
    Text(String),
    /// Fixed number.
    Decimal(f64),
    /// The import clock's current time.
    Now,
}

/// One canonical field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Storage column name.
    pub name: String,
    /// Accepted header spellings, highest priority first.
    pub aliases: Vec<String>,
    pub field_type: FieldType,
    pub default: FieldDefault,
    /// Rows whose identity field is missing are rejected.
    pub identity: bool,
    /// The import fails if no header resolves to this field.
    pub required: bool,
}

impl FieldSpec {
    /// A text field defaulting to NULL.
    pub fn text(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
            field_type: FieldType::Text,
            default: FieldDefault::Null,
            identity: false,
            required: false,
        }
    }

    /// A decimal field defaulting to NULL.
    pub fn decimal(name: &str, aliases: &[&str]) -> Self {
        Self {
            field_type: FieldType::Decimal,
            ..Self::text(name, aliases)
        }
    }

    /// A timestamp field defaulting to NULL.
    pub fn timestamp(name: &str, aliases: &[&str]) -> Self {
        Self {
            field_type: FieldType::Timestamp,
            ..Self::text(name, aliases)
        }
    }

    pub fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    /// Mark as the record's identity field (implies required).
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.required = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn default_matches_type(&self) -> bool {
        matches!(
            (&self.default, self.field_type),
            (FieldDefault::Null, _)
                | (FieldDefault::Text(_), FieldType::Text)
                | (FieldDefault::Decimal(_), FieldType::Decimal)
                | (FieldDefault::Now, FieldType::Timestamp)
        )
    }
}

/// Validated, ordered list of canonical fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    fields: Vec<FieldSpec>,
    identity: usize,
}

impl Catalog {
    /// Validate and build a catalog.
    ///
    /// Field names must be unique SQL identifiers, every field needs at least one alias, and
    /// exactly one text field without a default must be the identity field.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, CatalogError> {
        if fields.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for f in &fields {
            if !is_identifier(&f.name) {
                return Err(CatalogError::InvalidName(f.name.clone()));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(CatalogError::DuplicateField(f.name.clone()));
            }
            if f.aliases.iter().all(|a| a.trim().is_empty()) {
                return Err(CatalogError::NoAliases(f.name.clone()));
            }
            if !f.default_matches_type() {
                return Err(CatalogError::DefaultTypeMismatch {
                    field: f.name.clone(),
                });
            }
        }

        let identities: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.identity)
            .map(|(i, _)| i)
            .collect();
        let [identity] = identities.as_slice() else {
            return Err(CatalogError::IdentityCount(identities.len()));
        };
        let id_field = &fields[*identity];
        if id_field.field_type != FieldType::Text || id_field.default != FieldDefault::Null {
            return Err(CatalogError::InvalidIdentity(id_field.name.clone()));
        }

        Ok(Self {
            identity: *identity,
            fields,
        })
    }

    /// Built-in catalog for sales exports (Spanish and English header spellings).
    pub fn sales() -> Self {
        let not_specified = || FieldDefault::Text("No especificado".to_owned());
        let fields = vec![
            FieldSpec::text(
                "client_name",
                &["cliente", "client name", "client", "customer", "nombre cliente", "razon social"],
            )
            .identity(),
            FieldSpec::text(
                "client_type",
                &["tipo de cliente", "client type", "customer type", "segmento"],
            )
            .with_default(not_specified()),
            FieldSpec::text("executive", &["comercial", "ejecutivo", "executive", "vendedor", "sales rep"])
                .with_default(FieldDefault::Text("No asignado".to_owned())),
            FieldSpec::text("product", &["articulo", "artículo", "producto", "product", "item"])
                .with_default(not_specified()),
            FieldSpec::decimal("value", &["venta", "ventas", "value", "amount", "importe", "monto", "total"])
                .with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::timestamp("date", &["fecha", "date", "fecha venta", "fecha de venta"])
                .with_default(FieldDefault::Now),
            FieldSpec::text("category", &["categoria", "categoría", "category"])
                .with_default(FieldDefault::Text("General".to_owned())),
            FieldSpec::text("supercategory", &["supercategoria", "supercategory"]),
            FieldSpec::text("sale_type", &["tipo de venta", "sale type"]),
            FieldSpec::text("document", &["documento", "document"]),
            FieldSpec::text("invoice", &["factura", "invoice", "invoice number"]),
            FieldSpec::text("code", &["codigo", "código", "code"]),
            FieldSpec::text("sku", &["sku"]),
            FieldSpec::text("supplier", &["proveedor", "supplier", "vendor"]),
            FieldSpec::text("warehouse", &["almacen", "almacén", "warehouse"]),
            FieldSpec::text("unit", &["u.m.", "unit of measure"]),
            FieldSpec::decimal("quantity", &["cantidad", "quantity", "qty"])
                .with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::decimal("unit_price", &["p. venta", "precio venta", "unit price"])
                .with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::decimal("unit_cost", &["c. unit", "costo unitario", "unit cost"])
                .with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::decimal("cost", &["costo", "coste", "cost"]).with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::decimal("margin", &["mb", "margen", "margin", "gross margin"])
                .with_default(FieldDefault::Decimal(0.0)),
            FieldSpec::text("margin_percent", &["%mb", "margen %", "margin %"]),
            FieldSpec::text("company", &["sociedad", "company"]),
            FieldSpec::text("bc", &["bc"]),
            FieldSpec::text("bt", &["bt"]),
            FieldSpec::text("bu", &["bu"]),
            FieldSpec::text("bs", &["bs"]),
            // Kept apart from `client_type`: exports carry both columns.
            FieldSpec::text("customer_segment", &["tipo_cliente", "customer segment"]),
            FieldSpec::text("cruce", &["cruce"]),
        ];

        // Validity of this literal is covered by `sales_catalog_is_valid`.
        Self { fields, identity: 0 }
    }

    /// Parse a catalog from TOML (`[[field]]` tables).
    pub fn from_toml_str(s: &str) -> ImportResult<Self> {
        let file: CatalogFile = toml::from_str(s)?;
        let fields = file
            .field
            .into_iter()
            .map(FieldEntry::into_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(fields)?)
    }

    /// Read and parse a catalog TOML file.
    pub fn load(path: impl AsRef<Path>) -> ImportResult<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identity(&self) -> &FieldSpec {
        &self.fields[self.identity]
    }

    /// Names of the fields the catalog declares as required.
    pub fn required_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// `[a-z_][a-z0-9_]*`, so names can be used as SQL identifiers verbatim.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    field: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FieldTypeEntry {
    Text,
    Decimal,
    Timestamp,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefaultEntry {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    name: String,
    aliases: Vec<String>,
    #[serde(rename = "type")]
    field_type: FieldTypeEntry,
    default: Option<DefaultEntry>,
    #[serde(default)]
    identity: bool,
    #[serde(default)]
    required: bool,
}

impl FieldEntry {
    fn into_spec(self) -> Result<FieldSpec, CatalogError> {
        let field_type = match self.field_type {
            FieldTypeEntry::Text => FieldType::Text,
            FieldTypeEntry::Decimal => FieldType::Decimal,
            FieldTypeEntry::Timestamp => FieldType::Timestamp,
        };
        let default = match (self.default, field_type) {
            (None, _) => FieldDefault::Null,
            (Some(DefaultEntry::Text(s)), FieldType::Text) => FieldDefault::Text(s),
            (Some(DefaultEntry::Number(v)), FieldType::Decimal) => FieldDefault::Decimal(v),
            (Some(DefaultEntry::Text(s)), FieldType::Timestamp) if s.eq_ignore_ascii_case("now") => {
                FieldDefault::Now
            }
            _ => return Err(CatalogError::DefaultTypeMismatch { field: self.name }),
        };
        Ok(FieldSpec {
            name: self.name,
            aliases: self.aliases,
            field_type,
            default,
            identity: self.identity,
            required: self.required || self.identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImportError;

    #[test]
    fn sales_catalog_is_valid() {
        let fields = Catalog::sales().fields().to_vec();
        let rebuilt = Catalog::new(fields).unwrap();
        assert_eq!(rebuilt.identity().name, "client_name");
        assert_eq!(rebuilt.required_fields(), vec!["client_name".to_string()]);
        assert_eq!(rebuilt.field("value").unwrap().default, FieldDefault::Decimal(0.0));
    }

    #[test]
    fn rejects_two_identity_fields() {
        let err = Catalog::new(vec![
            FieldSpec::text("a", &["a"]).identity(),
            FieldSpec::text("b", &["b"]).identity(),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::IdentityCount(2));
    }

    #[test]
    fn rejects_identity_with_default() {
        let err = Catalog::new(vec![
            FieldSpec::text("a", &["a"])
                .identity()
                .with_default(FieldDefault::Text("Sin nombre".to_string())),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::InvalidIdentity("a".to_string()));
    }

    #[test]
    fn rejects_unsafe_column_names() {
        let err = Catalog::new(vec![FieldSpec::text("Client Name", &["cliente"]).identity()]).unwrap_err();
        assert_eq!(err, CatalogError::InvalidName("Client Name".to_string()));

        let err = Catalog::new(vec![
            FieldSpec::text("a", &["a"]).identity(),
            FieldSpec::text("a", &["b"]),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateField("a".to_string()));
    }

    #[test]
    fn rejects_mismatched_default() {
        let err = Catalog::new(vec![
            FieldSpec::text("a", &["a"]).identity(),
            FieldSpec::decimal("v", &["v"]).with_default(FieldDefault::Now),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DefaultTypeMismatch {
                field: "v".to_string()
            }
        );
    }

    #[test]
    fn loads_catalog_from_toml() {
        let toml = r#"
            [[field]]
            name = "client_name"
            aliases = ["Cliente"]
            type = "text"
            identity = true

            [[field]]
            name = "value"
            aliases = ["Venta"]
            type = "decimal"
            default = 0

            [[field]]
            name = "date"
            aliases = ["Fecha"]
            type = "timestamp"
            default = "now"
        "#;
        let c = Catalog::from_toml_str(toml).unwrap();
        assert_eq!(c.fields().len(), 3);
        assert!(c.identity().required);
        assert_eq!(c.field("value").unwrap().default, FieldDefault::Decimal(0.0));
        assert_eq!(c.field("date").unwrap().default, FieldDefault::Now);
    }

    #[test]
    fn toml_default_must_match_type() {
        let toml = r#"
            [[field]]
            name = "date"
            aliases = ["Fecha"]
            type = "timestamp"
            default = "yesterday"
        "#;
        let err = Catalog::from_toml_str(toml).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Catalog(CatalogError::DefaultTypeMismatch { .. })
        ));
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("client_name"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("x-y"));
        assert!(!is_identifier(""));
    }
}
