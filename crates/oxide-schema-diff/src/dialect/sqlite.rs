//! SQLite statement generator.
//!
//! SQLite has limited ALTER TABLE support: columns can be added, dropped
//! and renamed, but not altered, and constraints cannot be added to or
//! removed from an existing table. Those statements are rendering errors.
//! Foreign keys of new tables are declared inline and unique constraints
//! are expressed as unique indexes so they can be dropped later.

use super::SqlGenerator;
use crate::error::Result;
use crate::schema::{Column, DefaultValue, Dialect, GeneratedKind, Index, Table};
use crate::statement::Statement;

/// SQLite SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGenerator;

impl SqliteGenerator {
    /// Creates a new SQLite generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn default_sql(default: &DefaultValue) -> String {
        match default {
            DefaultValue::Expression(expr) => format!("({expr})"),
            other => other.to_sql("1", "0"),
        }
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&column.name), column.sql_type);
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
            if column.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&Self::default_sql(default));
        }
        if let Some(ref generated) = column.generated {
            sql.push_str(&format!(
                " GENERATED ALWAYS AS ({}) {}",
                generated.expression,
                generated.kind.as_sql()
            ));
        }
        sql
    }

    fn create_table(&self, table: &Table) -> Vec<String> {
        let mut lines: Vec<String> = table
            .columns
            .values()
            .map(|c| self.column_definition(c))
            .collect();
        for pk in table.composite_primary_keys.values() {
            lines.push(format!(
                "CONSTRAINT {} PRIMARY KEY({})",
                self.quote_identifier(&pk.name),
                self.column_list(&pk.columns)
            ));
        }
        for fk in table.foreign_keys.values() {
            lines.push(format!(
                "CONSTRAINT {} {}",
                self.quote_identifier(&fk.name),
                self.reference_clause(fk)
            ));
        }
        for check in table.check_constraints.values() {
            lines.push(format!(
                "CONSTRAINT {} CHECK ({})",
                self.quote_identifier(&check.name),
                check.value
            ));
        }

        let mut out = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            lines.join(",\n  ")
        )];
        for unique in table.unique_constraints.values() {
            out.push(self.unique_index(&table.name, &unique.name, &unique.columns));
        }
        out
    }

    fn unique_index(&self, table: &str, name: &str, columns: &[String]) -> String {
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(table),
            self.column_list(columns)
        )
    }

    fn create_index(&self, table: &str, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.is_unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str(&format!(
            "INDEX {} ON {} ({})",
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            self.index_key_list(&index.columns)
        ));
        if let Some(ref predicate) = index.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql
    }

    fn drop_index(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }
}

impl SqlGenerator for SqliteGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    /// SQLite has no schemas in the Postgres sense; names are never
    /// qualified.
    fn qualified(&self, _schema: &str, name: &str) -> String {
        self.quote_identifier(name)
    }

    fn truncate_sql(&self, schema: &str, table: &str) -> String {
        format!("DELETE FROM {}", self.qualified(schema, table))
    }

    fn generate_sql(&self, statement: &Statement) -> Result<Vec<String>> {
        let sql = match statement {
            Statement::CreateTable { table } => return Ok(self.create_table(table)),
            Statement::DropTable { name, .. } => {
                format!("DROP TABLE {}", self.quote_identifier(name))
            }
            Statement::RenameTable { from, to, .. } => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            Statement::AddColumn { table, column, .. } => {
                let stored = column
                    .generated
                    .as_ref()
                    .is_some_and(|g| g.kind == GeneratedKind::Stored);
                let needs_value = column.not_null
                    && column.default.is_none()
                    && column.generated.is_none();
                if column.primary_key || stored || needs_value {
                    return Err(self.unsupported(statement));
                }
                format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.quote_identifier(table),
                    self.column_definition(column)
                )
            }
            Statement::DropColumn { table, column, .. } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(column)
            ),
            Statement::RenameColumn {
                table, from, to, ..
            } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            Statement::CreateIndex { table, index, .. } => self.create_index(table, index),
            Statement::DropIndex { index, .. } => self.drop_index(&index.name),
            Statement::RenameIndex {
                table, from, index, ..
            } => {
                return Ok(vec![self.drop_index(from), self.create_index(table, index)]);
            }
            Statement::CreateUnique { table, unique, .. } => {
                self.unique_index(table, &unique.name, &unique.columns)
            }
            Statement::DropUnique { unique, .. } => self.drop_index(&unique.name),
            // Already declared inside CREATE TABLE.
            Statement::CreateReference {
                table_is_new: true, ..
            } => return Ok(Vec::new()),
            Statement::CreateSchema { .. }
            | Statement::DropSchema { .. }
            | Statement::RenameSchema { .. }
            | Statement::CreateEnum { .. }
            | Statement::DropEnum { .. }
            | Statement::RenameEnum { .. }
            | Statement::MoveEnum { .. }
            | Statement::AddEnumValue { .. }
            | Statement::DropEnumValue { .. }
            | Statement::CreateSequence { .. }
            | Statement::DropSequence { .. }
            | Statement::RenameSequence { .. }
            | Statement::MoveSequence { .. }
            | Statement::AlterSequence { .. }
            | Statement::MoveTable { .. }
            | Statement::AlterColumn { .. }
            | Statement::CreateCompositePk { .. }
            | Statement::DropCompositePk { .. }
            | Statement::CreateCheck { .. }
            | Statement::DropCheck { .. }
            | Statement::CreateReference { .. }
            | Statement::DropReference { .. } => return Err(self.unsupported(statement)),
        };
        Ok(vec![sql])
    }
}
