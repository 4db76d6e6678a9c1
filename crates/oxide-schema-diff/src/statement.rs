//! Dialect-independent schema change statements.
//!
//! Each variant carries everything a [`SqlGenerator`](crate::dialect::SqlGenerator)
//! needs to render it, so rendering never looks back at the snapshots.

use serde::{Deserialize, Serialize};

use crate::schema::{
    qualified_key, CheckConstraint, Column, DefaultValue, ForeignKey, Generated, Index,
    PrimaryKey, Sequence, Table, UniqueConstraint,
};

/// A column whose type is an enum, recorded so the enum can be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumColumnRef {
    /// Table schema.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
}

/// What changed on an existing column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlterColumnChange {
    /// Data type changed.
    SetType {
        /// Previous type.
        from: String,
        /// New type.
        to: String,
    },
    /// Default added or changed.
    SetDefault {
        /// New default.
        value: DefaultValue,
    },
    /// Default removed.
    DropDefault,
    /// Column became NOT NULL.
    SetNotNull,
    /// Column became nullable.
    DropNotNull,
    /// Generated expression added, removed or changed.
    AlterGenerated {
        /// Generated definition before the change.
        previous: Option<Generated>,
    },
    /// ON UPDATE expression added, removed or changed.
    AlterOnUpdate,
    /// Autoincrement flag flipped.
    AlterAutoincrement,
    /// Column became the primary key.
    SetPrimaryKey,
    /// Column stopped being the primary key.
    DropPrimaryKey,
}

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// CREATE SCHEMA.
    CreateSchema {
        /// Schema name.
        name: String,
    },
    /// DROP SCHEMA.
    DropSchema {
        /// Schema name.
        name: String,
    },
    /// Schema rename.
    RenameSchema {
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// CREATE TYPE ... AS ENUM.
    CreateEnum {
        /// Schema.
        schema: String,
        /// Type name.
        name: String,
        /// Values in order.
        values: Vec<String>,
    },
    /// DROP TYPE.
    DropEnum {
        /// Schema.
        schema: String,
        /// Type name.
        name: String,
    },
    /// Enum rename within a schema.
    RenameEnum {
        /// Schema.
        schema: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Enum moved to another schema.
    MoveEnum {
        /// Type name.
        name: String,
        /// Old schema.
        schema_from: String,
        /// New schema.
        schema_to: String,
    },
    /// ALTER TYPE ... ADD VALUE.
    AddEnumValue {
        /// Schema.
        schema: String,
        /// Type name.
        name: String,
        /// Added value.
        value: String,
        /// Existing value the new one is inserted before, if not appended.
        before: Option<String>,
    },
    /// Values were removed or reordered: the type is rebuilt and every
    /// dependent column is converted through `text`.
    DropEnumValue {
        /// Schema.
        schema: String,
        /// Type name.
        name: String,
        /// Values no longer present.
        deleted_values: Vec<String>,
        /// Full new value list.
        new_values: Vec<String>,
        /// Columns typed with this enum.
        columns: Vec<EnumColumnRef>,
    },
    /// CREATE SEQUENCE.
    CreateSequence {
        /// The sequence.
        sequence: Sequence,
    },
    /// DROP SEQUENCE.
    DropSequence {
        /// Schema.
        schema: String,
        /// Name.
        name: String,
    },
    /// Sequence rename within a schema.
    RenameSequence {
        /// Schema.
        schema: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Sequence moved to another schema.
    MoveSequence {
        /// Name.
        name: String,
        /// Old schema.
        schema_from: String,
        /// New schema.
        schema_to: String,
    },
    /// ALTER SEQUENCE with the new options.
    AlterSequence {
        /// The sequence as it should be.
        sequence: Sequence,
    },
    /// CREATE TABLE with columns, composite primary keys, unique and check
    /// constraints. Indexes and foreign keys follow as separate statements.
    CreateTable {
        /// The table.
        table: Table,
    },
    /// DROP TABLE.
    DropTable {
        /// Schema.
        schema: String,
        /// Name.
        name: String,
    },
    /// Table rename within a schema.
    RenameTable {
        /// Schema.
        schema: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Table moved to another schema.
    MoveTable {
        /// Name.
        name: String,
        /// Old schema.
        schema_from: String,
        /// New schema.
        schema_to: String,
    },
    /// ADD COLUMN.
    AddColumn {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The new column.
        column: Column,
    },
    /// DROP COLUMN.
    DropColumn {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// RENAME COLUMN.
    RenameColumn {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// One attribute of an existing column changed.
    AlterColumn {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// Full new column definition.
        column: Column,
        /// The change.
        change: AlterColumnChange,
    },
    /// CREATE INDEX.
    CreateIndex {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The index.
        index: Index,
    },
    /// DROP INDEX.
    DropIndex {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The index as it was.
        index: Index,
    },
    /// Index rename. Carries the new definition for dialects that rebuild.
    RenameIndex {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// Old name.
        from: String,
        /// The index under its new name.
        index: Index,
    },
    /// ADD CONSTRAINT ... PRIMARY KEY.
    CreateCompositePk {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The key.
        pk: PrimaryKey,
    },
    /// Drop a composite primary key.
    DropCompositePk {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The key as it was.
        pk: PrimaryKey,
    },
    /// ADD CONSTRAINT ... UNIQUE.
    CreateUnique {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The constraint.
        unique: UniqueConstraint,
    },
    /// Drop a unique constraint.
    DropUnique {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The constraint as it was.
        unique: UniqueConstraint,
    },
    /// ADD CONSTRAINT ... CHECK.
    CreateCheck {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The constraint.
        check: CheckConstraint,
    },
    /// Drop a check constraint.
    DropCheck {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
        /// The constraint as it was.
        check: CheckConstraint,
    },
    /// ADD CONSTRAINT ... FOREIGN KEY.
    CreateReference {
        /// Schema of the referencing table.
        schema: String,
        /// The foreign key.
        fk: ForeignKey,
        /// Whether the referencing table is created in the same diff.
        table_is_new: bool,
    },
    /// Drop a foreign key.
    DropReference {
        /// Schema of the referencing table.
        schema: String,
        /// The foreign key as it was.
        fk: ForeignKey,
    },
}

impl Statement {
    /// Human-readable summary naming the entity and the operation.
    #[must_use]
    pub fn description(&self) -> String {
        let on = |schema: &str, table: &str| qualified_key(schema, table);
        match self {
            Self::CreateSchema { name } => format!("Create schema '{name}'"),
            Self::DropSchema { name } => format!("Drop schema '{name}'"),
            Self::RenameSchema { from, to } => format!("Rename schema '{from}' to '{to}'"),
            Self::CreateEnum { schema, name, .. } => format!("Create enum '{}'", on(schema, name)),
            Self::DropEnum { schema, name } => format!("Drop enum '{}'", on(schema, name)),
            Self::RenameEnum { schema, from, to } => {
                format!("Rename enum '{}' to '{to}'", on(schema, from))
            }
            Self::MoveEnum {
                name,
                schema_from,
                schema_to,
            } => format!("Move enum '{}' to schema '{schema_to}'", on(schema_from, name)),
            Self::AddEnumValue {
                schema, name, value, ..
            } => format!("Add value '{value}' to enum '{}'", on(schema, name)),
            Self::DropEnumValue {
                schema,
                name,
                deleted_values,
                ..
            } => format!(
                "Remove values [{}] from enum '{}'",
                deleted_values.join(", "),
                on(schema, name)
            ),
            Self::CreateSequence { sequence } => format!("Create sequence '{}'", sequence.key()),
            Self::DropSequence { schema, name } => format!("Drop sequence '{}'", on(schema, name)),
            Self::RenameSequence { schema, from, to } => {
                format!("Rename sequence '{}' to '{to}'", on(schema, from))
            }
            Self::MoveSequence {
                name,
                schema_from,
                schema_to,
            } => format!(
                "Move sequence '{}' to schema '{schema_to}'",
                on(schema_from, name)
            ),
            Self::AlterSequence { sequence } => format!("Alter sequence '{}'", sequence.key()),
            Self::CreateTable { table } => format!("Create table '{}'", table.key()),
            Self::DropTable { schema, name } => format!("Drop table '{}'", on(schema, name)),
            Self::RenameTable { schema, from, to } => {
                format!("Rename table '{}' to '{to}'", on(schema, from))
            }
            Self::MoveTable {
                name,
                schema_from,
                schema_to,
            } => format!("Move table '{}' to schema '{schema_to}'", on(schema_from, name)),
            Self::AddColumn {
                schema,
                table,
                column,
            } => format!("Add column '{}' to table '{}'", column.name, on(schema, table)),
            Self::DropColumn {
                schema,
                table,
                column,
            } => format!("Drop column '{column}' from table '{}'", on(schema, table)),
            Self::RenameColumn {
                schema,
                table,
                from,
                to,
            } => format!(
                "Rename column '{from}' to '{to}' in table '{}'",
                on(schema, table)
            ),
            Self::AlterColumn {
                schema,
                table,
                column,
                change,
            } => format!(
                "Alter column '{}' in table '{}' ({})",
                column.name,
                on(schema, table),
                change.label()
            ),
            Self::CreateIndex {
                schema,
                table,
                index,
            } => format!("Create index '{}' on table '{}'", index.name, on(schema, table)),
            Self::DropIndex {
                schema,
                table,
                index,
            } => format!("Drop index '{}' on table '{}'", index.name, on(schema, table)),
            Self::RenameIndex {
                schema,
                table,
                from,
                index,
            } => format!(
                "Rename index '{from}' to '{}' on table '{}'",
                index.name,
                on(schema, table)
            ),
            Self::CreateCompositePk { schema, table, pk } => format!(
                "Create primary key '{}' on table '{}'",
                pk.name,
                on(schema, table)
            ),
            Self::DropCompositePk { schema, table, pk } => format!(
                "Drop primary key '{}' on table '{}'",
                pk.name,
                on(schema, table)
            ),
            Self::CreateUnique {
                schema,
                table,
                unique,
            } => format!(
                "Create unique constraint '{}' on table '{}'",
                unique.name,
                on(schema, table)
            ),
            Self::DropUnique {
                schema,
                table,
                unique,
            } => format!(
                "Drop unique constraint '{}' on table '{}'",
                unique.name,
                on(schema, table)
            ),
            Self::CreateCheck {
                schema,
                table,
                check,
            } => format!(
                "Create check constraint '{}' on table '{}'",
                check.name,
                on(schema, table)
            ),
            Self::DropCheck {
                schema,
                table,
                check,
            } => format!(
                "Drop check constraint '{}' on table '{}'",
                check.name,
                on(schema, table)
            ),
            Self::CreateReference { schema, fk, .. } => format!(
                "Create foreign key '{}' on table '{}'",
                fk.name,
                on(schema, &fk.table_from)
            ),
            Self::DropReference { schema, fk } => format!(
                "Drop foreign key '{}' on table '{}'",
                fk.name,
                on(schema, &fk.table_from)
            ),
        }
    }

    /// Returns true for statements that remove structures.
    #[must_use]
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            Self::DropSchema { .. }
                | Self::DropEnum { .. }
                | Self::DropEnumValue { .. }
                | Self::DropSequence { .. }
                | Self::DropTable { .. }
                | Self::DropColumn { .. }
                | Self::DropIndex { .. }
                | Self::DropCompositePk { .. }
                | Self::DropUnique { .. }
                | Self::DropCheck { .. }
                | Self::DropReference { .. }
        )
    }
}

impl AlterColumnChange {
    /// Short label used in descriptions.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::SetType { from, to } => format!("type {from} -> {to}"),
            Self::SetDefault { .. } => "set default".to_string(),
            Self::DropDefault => "drop default".to_string(),
            Self::SetNotNull => "set not null".to_string(),
            Self::DropNotNull => "drop not null".to_string(),
            Self::AlterGenerated { .. } => "generated expression".to_string(),
            Self::AlterOnUpdate => "on update".to_string(),
            Self::AlterAutoincrement => "autoincrement".to_string(),
            Self::SetPrimaryKey => "set primary key".to_string(),
            Self::DropPrimaryKey => "drop primary key".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_names_entity_and_operation() {
        let stmt = Statement::AlterColumn {
            schema: "public".to_string(),
            table: "users".to_string(),
            column: Column::new("age", "bigint"),
            change: AlterColumnChange::SetType {
                from: "integer".to_string(),
                to: "bigint".to_string(),
            },
        };
        assert_eq!(
            stmt.description(),
            "Alter column 'age' in table 'public.users' (type integer -> bigint)"
        );
    }

    #[test]
    fn test_is_drop() {
        assert!(Statement::DropTable {
            schema: String::new(),
            name: "users".to_string()
        }
        .is_drop());
        assert!(!Statement::CreateSchema {
            name: "auth".to_string()
        }
        .is_drop());
    }

    #[test]
    fn test_serialized_tag() {
        let stmt = Statement::RenameColumn {
            schema: String::new(),
            table: "users".to_string(),
            from: "name".to_string(),
            to: "full_name".to_string(),
        };
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["type"], "rename_column");
        assert_eq!(json["to"], "full_name");
    }
}
