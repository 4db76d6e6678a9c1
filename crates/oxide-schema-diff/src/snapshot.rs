//! Versioned schema snapshots.
//!
//! A [`Snapshot`] is the full schema state at one point in time. Snapshots
//! form a linked history through `id`/`prevId`; the first snapshot points at
//! [`ORIGIN_ID`]. Identity generation is injected through [`IdGenerator`] so
//! diffs can be tested with fixed ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};
use crate::schema::{Dialect, Enum, Sequence, Table};

/// `prevId` of the very first snapshot in a history.
pub const ORIGIN_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Snapshot format version produced by this crate.
pub const SNAPSHOT_VERSION: &str = "7";

/// Snapshot format versions the engine accepts without an upgrade pass.
pub const SUPPORTED_VERSIONS: &[&str] = &["7"];

/// Human-readable rename bookkeeping stored alongside a snapshot.
///
/// Keys and values are quoted qualified names, e.g.
/// `"public"."users"` → `"public"."accounts"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Schema renames.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
    /// Table renames.
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
    /// Column renames.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl SnapshotMeta {
    /// Returns true if no renames are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.tables.is_empty() && self.columns.is_empty()
    }
}

/// Full schema state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version.
    pub version: String,
    /// Target dialect.
    pub dialect: Dialect,
    /// Unique id of this snapshot.
    pub id: String,
    /// Id of the snapshot this one was diffed against.
    #[serde(rename = "prevId")]
    pub prev_id: String,
    /// Tables keyed by `schema.name` (or `name`).
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
    /// Enums keyed by `schema.name`.
    #[serde(default)]
    pub enums: BTreeMap<String, Enum>,
    /// Schemas keyed by name.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
    /// Sequences keyed by `schema.name`.
    #[serde(default)]
    pub sequences: BTreeMap<String, Sequence>,
    /// Rename hints.
    #[serde(rename = "_meta", default)]
    pub meta: SnapshotMeta,
}

impl Snapshot {
    /// Creates an empty root snapshot for a dialect.
    #[must_use]
    pub fn empty(dialect: Dialect) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            dialect,
            id: ORIGIN_ID.to_string(),
            prev_id: ORIGIN_ID.to_string(),
            tables: BTreeMap::new(),
            enums: BTreeMap::new(),
            schemas: BTreeMap::new(),
            sequences: BTreeMap::new(),
            meta: SnapshotMeta::default(),
        }
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.insert(table.key(), table);
        self
    }

    /// Adds an enum.
    #[must_use]
    pub fn enum_type(mut self, value: Enum) -> Self {
        self.enums.insert(value.key(), value);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.insert(sequence.key(), sequence);
        self
    }

    /// Adds a schema.
    #[must_use]
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.schemas.insert(name.clone(), name);
        self
    }

    /// Parses and validates a snapshot document.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate("input")?;
        Ok(snapshot)
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns `cur` linked after `prev` with a freshly generated id.
    #[must_use]
    pub fn stamp_next(prev: &Self, mut cur: Self, ids: &mut dyn IdGenerator) -> Self {
        cur.prev_id = prev.id.clone();
        cur.id = ids.next_id();
        cur
    }

    /// Checks that `cur` was diffed against `prev`.
    pub fn validate_chain(prev: &Self, cur: &Self) -> Result<()> {
        if cur.prev_id != prev.id {
            return Err(DiffError::validation(
                "cur",
                format!(
                    "prevId '{}' does not match previous snapshot id '{}'",
                    cur.prev_id, prev.id
                ),
            ));
        }
        if cur.id == prev.id && cur.id != ORIGIN_ID {
            return Err(DiffError::validation(
                "cur",
                format!("id '{}' is reused from the previous snapshot", cur.id),
            ));
        }
        Ok(())
    }

    /// Structural validation. `label` names the snapshot in errors.
    pub fn validate(&self, label: &str) -> Result<()> {
        let fail = |message: String| Err(DiffError::validation(label, message));

        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return fail(format!("unsupported snapshot version '{}'", self.version));
        }

        for (key, name) in &self.schemas {
            if key != name {
                return fail(format!("schema key '{key}' does not match name '{name}'"));
            }
        }

        for (key, value) in &self.enums {
            if *key != value.key() {
                return fail(format!("enum key '{key}' does not match '{}'", value.key()));
            }
        }

        for (key, sequence) in &self.sequences {
            if *key != sequence.key() {
                return fail(format!(
                    "sequence key '{key}' does not match '{}'",
                    sequence.key()
                ));
            }
        }

        for (key, table) in &self.tables {
            if *key != table.key() {
                return fail(format!("table key '{key}' does not match '{}'", table.key()));
            }
            validate_table(table).or_else(|message| fail(message))?;
        }

        Ok(())
    }
}

fn validate_table(table: &Table) -> std::result::Result<(), String> {
    let has_column = |name: &str| table.columns.contains_key(name);

    for (key, column) in &table.columns {
        if *key != column.name {
            return Err(format!(
                "column key '{key}' in table '{}' does not match name '{}'",
                table.name, column.name
            ));
        }
        if column.generated.is_some() && (column.default.is_some() || column.on_update.is_some())
        {
            return Err(format!(
                "generated column '{}.{}' cannot also have a default or on-update value",
                table.name, column.name
            ));
        }
    }

    for (key, index) in &table.indexes {
        if *key != index.name {
            return Err(format!("index key '{key}' does not match name '{}'", index.name));
        }
        if index.columns.is_empty() {
            return Err(format!("index '{}' has no columns", index.name));
        }
    }

    for (key, pk) in &table.composite_primary_keys {
        if *key != pk.name {
            return Err(format!("primary key '{key}' does not match name '{}'", pk.name));
        }
        if let Some(missing) = pk.columns.iter().find(|c| !has_column(c)) {
            return Err(format!(
                "primary key '{}' references unknown column '{missing}'",
                pk.name
            ));
        }
    }

    for (key, uc) in &table.unique_constraints {
        if *key != uc.name {
            return Err(format!("unique constraint '{key}' does not match name '{}'", uc.name));
        }
        if let Some(missing) = uc.columns.iter().find(|c| !has_column(c)) {
            return Err(format!(
                "unique constraint '{}' references unknown column '{missing}'",
                uc.name
            ));
        }
    }

    for (key, check) in &table.check_constraints {
        if *key != check.name {
            return Err(format!("check constraint '{key}' does not match name '{}'", check.name));
        }
    }

    for (key, fk) in &table.foreign_keys {
        if *key != fk.name {
            return Err(format!("foreign key '{key}' does not match name '{}'", fk.name));
        }
        if fk.table_from != table.name {
            return Err(format!(
                "foreign key '{}' is declared on '{}' but names '{}' as its table",
                fk.name, table.name, fk.table_from
            ));
        }
        if fk.columns_from.len() != fk.columns_to.len() {
            return Err(format!(
                "foreign key '{}' maps {} columns onto {}",
                fk.name,
                fk.columns_from.len(),
                fk.columns_to.len()
            ));
        }
        if let Some(missing) = fk.columns_from.iter().find(|c| !has_column(c)) {
            return Err(format!(
                "foreign key '{}' references unknown column '{missing}'",
                fk.name
            ));
        }
    }

    Ok(())
}

/// Source of snapshot ids.
pub trait IdGenerator {
    /// Returns a new, globally unique id.
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic ids (`00000000-0000-0000-0000-000000000001`, ...) for tests
/// and reproducible pipelines.
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    counter: u64,
}

impl SequentialIds {
    /// Starts counting from 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("00000000-0000-0000-0000-{:012}", self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DefaultValue, GeneratedKind};

    fn users() -> Table {
        Table::new("users")
            .in_schema("public")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("name", "varchar(50)"))
    }

    #[test]
    fn test_empty_snapshot_is_root() {
        let snapshot = Snapshot::empty(Dialect::Postgresql);
        assert_eq!(snapshot.id, ORIGIN_ID);
        assert_eq!(snapshot.prev_id, ORIGIN_ID);
        assert!(snapshot.validate("prev").is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = Snapshot::empty(Dialect::Postgresql)
            .schema("public")
            .table(users());
        let json = snapshot.to_json_pretty().unwrap();
        assert!(json.contains("\"prevId\""));
        assert!(json.contains("\"_meta\""));

        let parsed = Snapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut snapshot = Snapshot::empty(Dialect::Sqlite);
        snapshot.version = "5".to_string();
        let err = snapshot.validate("prev").unwrap_err();
        assert!(matches!(err, DiffError::Validation { .. }));
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn test_mismatched_table_key_rejected() {
        let mut snapshot = Snapshot::empty(Dialect::Postgresql);
        snapshot.tables.insert("users".to_string(), users());
        assert!(snapshot.validate("cur").is_err());
    }

    #[test]
    fn test_generated_column_with_default_rejected() {
        let table = Table::new("t").column(
            Column::new("total", "integer")
                .generated(GeneratedKind::Stored, "a + b")
                .default(DefaultValue::Integer(0)),
        );
        let snapshot = Snapshot::empty(Dialect::Sqlite).table(table);
        let err = snapshot.validate("cur").unwrap_err();
        assert!(err.to_string().contains("generated column"));
    }

    #[test]
    fn test_primary_key_with_unknown_column_rejected() {
        let table = Table::new("t")
            .column(Column::new("a", "integer"))
            .primary_key("t_pk", &["a", "b"]);
        let snapshot = Snapshot::empty(Dialect::Sqlite).table(table);
        assert!(snapshot.validate("cur").is_err());
    }

    #[test]
    fn test_stamp_and_validate_chain() {
        let mut ids = SequentialIds::new();
        let prev = Snapshot::empty(Dialect::Mysql);
        let cur = Snapshot::stamp_next(&prev, Snapshot::empty(Dialect::Mysql), &mut ids);
        assert_eq!(cur.prev_id, ORIGIN_ID);
        assert_eq!(cur.id, "00000000-0000-0000-0000-000000000001");
        assert!(Snapshot::validate_chain(&prev, &cur).is_ok());

        let next = Snapshot::stamp_next(&cur, Snapshot::empty(Dialect::Mysql), &mut ids);
        assert_eq!(next.id, "00000000-0000-0000-0000-000000000002");
        assert!(Snapshot::validate_chain(&prev, &next).is_err());
    }

    #[test]
    fn test_uuid_generator_unique() {
        let mut ids = UuidGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
