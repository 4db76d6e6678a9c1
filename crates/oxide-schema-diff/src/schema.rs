//! Schema entity types.
//!
//! These types describe one database schema state as it appears inside a
//! [`Snapshot`](crate::snapshot::Snapshot): tables with their columns,
//! indexes and constraints, plus enums and sequences. They are plain data;
//! the diff engine never mutates the caller's copies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL dialects the engine can generate statements for.
///
/// The set is closed: adding a dialect means adding a
/// [`SqlGenerator`](crate::dialect::SqlGenerator), not touching the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    Postgresql,
    /// MySQL.
    Mysql,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Returns the dialect name as used in snapshots.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the map key used for schema-scoped entities (`schema.name`, or
/// just `name` when no schema is set).
#[must_use]
pub fn qualified_key(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String literal default (quoted on render).
    String(String),
    /// Raw SQL expression (e.g., `now()`), rendered verbatim.
    Expression(String),
}

impl DefaultValue {
    /// Renders the default using the given boolean literals.
    #[must_use]
    pub fn to_sql(&self, true_literal: &str, false_literal: &str) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { true_literal } else { false_literal }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

/// Storage mode of a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedKind {
    /// Computed on write and stored.
    Stored,
    /// Computed on read.
    Virtual,
}

impl GeneratedKind {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Stored => "STORED",
            Self::Virtual => "VIRTUAL",
        }
    }
}

/// Generated column definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generated {
    /// Storage mode.
    #[serde(rename = "type")]
    pub kind: GeneratedKind,
    /// SQL expression computing the value.
    #[serde(rename = "as")]
    pub expression: String,
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type as written in DDL (`integer`, `varchar(50)`, enum name...).
    #[serde(rename = "type")]
    pub sql_type: String,
    /// Schema of a user-defined type (Postgres enums). `None` for built-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_schema: Option<String>,
    /// Whether the column is a single-column primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether the column rejects NULL.
    #[serde(default)]
    pub not_null: bool,
    /// Whether the column auto-increments (MySQL, SQLite).
    #[serde(default)]
    pub autoincrement: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// ON UPDATE expression (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
    /// Generated column definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<Generated>,
}

impl Column {
    /// Creates a nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            type_schema: None,
            primary_key: false,
            not_null: false,
            autoincrement: false,
            default: None,
            on_update: None,
            generated: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as primary key (implies NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Marks the column auto-incrementing.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the ON UPDATE expression.
    #[must_use]
    pub fn on_update(mut self, expr: impl Into<String>) -> Self {
        self.on_update = Some(expr.into());
        self
    }

    /// Makes this a generated column.
    #[must_use]
    pub fn generated(mut self, kind: GeneratedKind, expression: impl Into<String>) -> Self {
        self.generated = Some(Generated {
            kind,
            expression: expression.into(),
        });
        self
    }

    /// Types the column with a user-defined enum living in `schema`.
    #[must_use]
    pub fn enum_type(mut self, schema: impl Into<String>) -> Self {
        self.type_schema = Some(schema.into());
        self
    }

    /// Returns true if the column's type is the given enum.
    #[must_use]
    pub fn uses_enum(&self, schema: &str, name: &str) -> bool {
        self.type_schema.as_deref() == Some(schema) && self.sql_type == name
    }
}

/// One key part of an index: a column name or a raw expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexColumn {
    /// Column name, or SQL expression when `is_expression` is set.
    pub expression: String,
    /// Whether `expression` is raw SQL rather than a column reference.
    #[serde(default)]
    pub is_expression: bool,
    /// Ascending (true) or descending order.
    #[serde(default = "default_asc")]
    pub asc: bool,
}

fn default_asc() -> bool {
    true
}

impl IndexColumn {
    /// A plain ascending column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            expression: name.into(),
            is_expression: false,
            asc: true,
        }
    }

    /// A raw SQL expression key part.
    #[must_use]
    pub fn expression(sql: impl Into<String>) -> Self {
        Self {
            expression: sql.into(),
            is_expression: true,
            asc: true,
        }
    }

    /// Switches the key part to descending order.
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.asc = false;
        self
    }
}

/// MySQL `ALGORITHM=` index option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAlgorithm {
    /// Server default.
    Default,
    /// In-place build.
    Inplace,
    /// Table copy.
    Copy,
}

impl IndexAlgorithm {
    /// Returns the encoded name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Inplace => "inplace",
            Self::Copy => "copy",
        }
    }

    /// Parses an encoded name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(Self::Default),
            "inplace" => Some(Self::Inplace),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }
}

/// MySQL `LOCK=` index option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLock {
    /// Server default.
    Default,
    /// No lock.
    None,
    /// Shared lock.
    Shared,
    /// Exclusive lock.
    Exclusive,
}

impl IndexLock {
    /// Returns the encoded name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::None => "none",
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }

    /// Parses an encoded name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(Self::Default),
            "none" => Some(Self::None),
            "shared" => Some(Self::Shared),
            "exclusive" => Some(Self::Exclusive),
            _ => None,
        }
    }
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Key parts in order.
    pub columns: Vec<IndexColumn>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub is_unique: bool,
    /// Access method (`btree`, `hash`, `gin`...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Partial index predicate.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    /// Build without blocking writes (Postgres).
    #[serde(default)]
    pub concurrently: bool,
    /// Build algorithm (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<IndexAlgorithm>,
    /// Lock mode during build (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<IndexLock>,
}

impl Index {
    /// Creates a non-unique index over plain columns.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| IndexColumn::column(*c)).collect(),
            is_unique: false,
            method: None,
            where_clause: None,
            concurrently: false,
            algorithm: None,
            lock: None,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets a partial index predicate.
    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses the SQL representation (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// Composite primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name.
    pub name: String,
    /// Key columns in order.
    pub columns: Vec<String>,
}

/// Unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Treat NULLs as equal (Postgres 15+).
    #[serde(default)]
    pub nulls_not_distinct: bool,
}

/// Check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,
    /// Boolean SQL expression.
    pub value: String,
}

/// Foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referencing table.
    pub table_from: String,
    /// Referencing columns.
    pub columns_from: Vec<String>,
    /// Referenced table.
    pub table_to: String,
    /// Schema of the referenced table (empty for the default schema).
    #[serde(default)]
    pub schema_to: String,
    /// Referenced columns.
    pub columns_to: Vec<String>,
    /// ON UPDATE action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignKeyAction>,
    /// ON DELETE action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
}

/// A table and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Owning schema (empty for the default schema / schemaless dialects).
    #[serde(default)]
    pub schema: String,
    /// Columns keyed by name.
    #[serde(default)]
    pub columns: BTreeMap<String, Column>,
    /// Indexes keyed by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, Index>,
    /// Foreign keys keyed by constraint name.
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKey>,
    /// Composite primary keys keyed by constraint name.
    #[serde(default)]
    pub composite_primary_keys: BTreeMap<String, PrimaryKey>,
    /// Unique constraints keyed by constraint name.
    #[serde(default)]
    pub unique_constraints: BTreeMap<String, UniqueConstraint>,
    /// Check constraints keyed by constraint name.
    #[serde(default)]
    pub check_constraints: BTreeMap<String, CheckConstraint>,
}

impl Table {
    /// Creates an empty table in the default schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: String::new(),
            columns: BTreeMap::new(),
            indexes: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            composite_primary_keys: BTreeMap::new(),
            unique_constraints: BTreeMap::new(),
            check_constraints: BTreeMap::new(),
        }
    }

    /// Places the table in a schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Adds a foreign key. `table_from` is set to this table.
    #[must_use]
    pub fn foreign_key(mut self, mut fk: ForeignKey) -> Self {
        fk.table_from = self.name.clone();
        self.foreign_keys.insert(fk.name.clone(), fk);
        self
    }

    /// Adds a composite primary key.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        let pk = PrimaryKey {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        };
        self.composite_primary_keys.insert(pk.name.clone(), pk);
        self
    }

    /// Adds a unique constraint.
    #[must_use]
    pub fn unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        let uc = UniqueConstraint {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            nulls_not_distinct: false,
        };
        self.unique_constraints.insert(uc.name.clone(), uc);
        self
    }

    /// Adds a check constraint.
    #[must_use]
    pub fn check(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let cc = CheckConstraint {
            name: name.into(),
            value: value.into(),
        };
        self.check_constraints.insert(cc.name.clone(), cc);
        self
    }

    /// Returns the snapshot map key of this table.
    #[must_use]
    pub fn key(&self) -> String {
        qualified_key(&self.schema, &self.name)
    }
}

/// A user-defined enum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enum {
    /// Type name.
    pub name: String,
    /// Owning schema.
    #[serde(default)]
    pub schema: String,
    /// Values in declaration order.
    pub values: Vec<String>,
}

impl Enum {
    /// Creates an enum.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Returns the snapshot map key of this enum.
    #[must_use]
    pub fn key(&self) -> String {
        qualified_key(&self.schema, &self.name)
    }
}

/// A sequence generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// Owning schema.
    #[serde(default)]
    pub schema: String,
    /// INCREMENT BY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<String>,
    /// MINVALUE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    /// MAXVALUE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
    /// START WITH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_with: Option<String>,
    /// CACHE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Whether the sequence wraps around.
    #[serde(default)]
    pub cycle: bool,
}

impl Sequence {
    /// Creates a sequence with server defaults.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            increment: None,
            min_value: None,
            max_value: None,
            start_with: None,
            cache: None,
            cycle: false,
        }
    }

    /// Returns the snapshot map key of this sequence.
    #[must_use]
    pub fn key(&self) -> String {
        qualified_key(&self.schema, &self.name)
    }
}
