//! MySQL statement generator.
//!
//! MySQL has no standalone enum types (enums are spelled inline in the
//! column type) and no sequences. Column changes are rendered as
//! `MODIFY COLUMN` with the full new definition.

use super::SqlGenerator;
use crate::error::Result;
use crate::schema::{Column, DefaultValue, Dialect, Index, Table};
use crate::statement::{AlterColumnChange, Statement};

/// MySQL SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlGenerator;

impl MysqlGenerator {
    /// Creates a new MySQL generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn default_sql(default: &DefaultValue) -> String {
        match default {
            DefaultValue::Expression(expr) => format!("({expr})"),
            other => other.to_sql("true", "false"),
        }
    }

    /// Column definition. `inline_pk` controls whether a single-column
    /// primary key is declared on the column itself.
    fn column_definition(&self, column: &Column, inline_pk: bool) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&column.name), column.sql_type);
        if let Some(ref generated) = column.generated {
            sql.push_str(&format!(
                " GENERATED ALWAYS AS ({}) {}",
                generated.expression,
                generated.kind.as_sql()
            ));
        }
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&Self::default_sql(default));
        }
        if let Some(ref on_update) = column.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(on_update);
        }
        if column.autoincrement {
            sql.push_str(" AUTO_INCREMENT");
        }
        if inline_pk && column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }

    fn create_table(&self, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .values()
            .map(|c| format!("    {}", self.column_definition(c, true)))
            .collect();
        for pk in table.composite_primary_keys.values() {
            lines.push(format!(
                "    CONSTRAINT {} PRIMARY KEY({})",
                self.quote_identifier(&pk.name),
                self.column_list(&pk.columns)
            ));
        }
        for unique in table.unique_constraints.values() {
            lines.push(format!(
                "    CONSTRAINT {} UNIQUE({})",
                self.quote_identifier(&unique.name),
                self.column_list(&unique.columns)
            ));
        }
        for check in table.check_constraints.values() {
            lines.push(format!(
                "    CONSTRAINT {} CHECK ({})",
                self.quote_identifier(&check.name),
                check.value
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.qualified(&table.schema, &table.name),
            lines.join(",\n")
        )
    }

    fn index_key_parts(&self, index: &Index) -> String {
        index
            .columns
            .iter()
            .map(|c| {
                let mut part = if c.is_expression {
                    format!("({})", c.expression)
                } else {
                    self.quote_identifier(&c.expression)
                };
                if !c.asc {
                    part.push_str(" DESC");
                }
                part
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_index(&self, schema: &str, table: &str, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.is_unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str(&format!(
            "INDEX {} ON {} ({})",
            self.quote_identifier(&index.name),
            self.qualified(schema, table),
            self.index_key_parts(index)
        ));
        if let Some(ref method) = index.method {
            sql.push_str(" USING ");
            sql.push_str(&method.to_ascii_uppercase());
        }
        if let Some(algorithm) = index.algorithm {
            sql.push_str(" ALGORITHM=");
            sql.push_str(&algorithm.as_str().to_ascii_uppercase());
        }
        if let Some(lock) = index.lock {
            sql.push_str(" LOCK=");
            sql.push_str(&lock.as_str().to_ascii_uppercase());
        }
        sql
    }
}

impl SqlGenerator for MysqlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn truncate_sql(&self, schema: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualified(schema, table))
    }

    fn generate_sql(&self, statement: &Statement) -> Result<Vec<String>> {
        let sql = match statement {
            Statement::CreateEnum { .. }
            | Statement::DropEnum { .. }
            | Statement::RenameEnum { .. }
            | Statement::MoveEnum { .. }
            | Statement::AddEnumValue { .. }
            | Statement::DropEnumValue { .. } => return Ok(Vec::new()),
            Statement::CreateSchema { .. }
            | Statement::DropSchema { .. }
            | Statement::RenameSchema { .. }
            | Statement::CreateSequence { .. }
            | Statement::DropSequence { .. }
            | Statement::RenameSequence { .. }
            | Statement::MoveSequence { .. }
            | Statement::AlterSequence { .. } => return Err(self.unsupported(statement)),
            Statement::CreateIndex { index, .. } if index.where_clause.is_some() => {
                return Err(self.unsupported(statement));
            }
            Statement::CreateTable { table } => self.create_table(table),
            Statement::DropTable { schema, name } => {
                format!("DROP TABLE {}", self.qualified(schema, name))
            }
            Statement::RenameTable { schema, from, to } => format!(
                "RENAME TABLE {} TO {}",
                self.qualified(schema, from),
                self.qualified(schema, to)
            ),
            Statement::MoveTable {
                name,
                schema_from,
                schema_to,
            } => format!(
                "RENAME TABLE {} TO {}",
                self.qualified(schema_from, name),
                self.qualified(schema_to, name)
            ),
            Statement::AddColumn {
                schema,
                table,
                column,
            } => format!(
                "ALTER TABLE {} ADD {}",
                self.qualified(schema, table),
                self.column_definition(column, true)
            ),
            Statement::DropColumn {
                schema,
                table,
                column,
            } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.qualified(schema, table),
                self.quote_identifier(column)
            ),
            Statement::RenameColumn {
                schema,
                table,
                from,
                to,
            } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.qualified(schema, table),
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            Statement::AlterColumn {
                schema,
                table,
                column,
                change,
            } => {
                let target = self.qualified(schema, table);
                return Ok(match change {
                    AlterColumnChange::SetPrimaryKey => vec![format!(
                        "ALTER TABLE {target} ADD PRIMARY KEY ({})",
                        self.quote_identifier(&column.name)
                    )],
                    AlterColumnChange::DropPrimaryKey => {
                        vec![format!("ALTER TABLE {target} DROP PRIMARY KEY")]
                    }
                    AlterColumnChange::AlterGenerated { .. } if column.generated.is_some() => vec![
                        format!(
                            "ALTER TABLE {target} DROP COLUMN {}",
                            self.quote_identifier(&column.name)
                        ),
                        format!(
                            "ALTER TABLE {target} ADD {}",
                            self.column_definition(column, false)
                        ),
                    ],
                    _ => vec![format!(
                        "ALTER TABLE {target} MODIFY COLUMN {}",
                        self.column_definition(column, false)
                    )],
                });
            }
            Statement::CreateIndex {
                schema,
                table,
                index,
            } => self.create_index(schema, table, index),
            Statement::DropIndex {
                schema,
                table,
                index,
            } => format!(
                "DROP INDEX {} ON {}",
                self.quote_identifier(&index.name),
                self.qualified(schema, table)
            ),
            Statement::RenameIndex {
                schema,
                table,
                from,
                index,
            } => format!(
                "ALTER TABLE {} RENAME INDEX {} TO {}",
                self.qualified(schema, table),
                self.quote_identifier(from),
                self.quote_identifier(&index.name)
            ),
            Statement::CreateCompositePk { schema, table, pk } => format!(
                "ALTER TABLE {} ADD PRIMARY KEY({})",
                self.qualified(schema, table),
                self.column_list(&pk.columns)
            ),
            Statement::DropCompositePk { schema, table, .. } => format!(
                "ALTER TABLE {} DROP PRIMARY KEY",
                self.qualified(schema, table)
            ),
            Statement::CreateUnique {
                schema,
                table,
                unique,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE({})",
                self.qualified(schema, table),
                self.quote_identifier(&unique.name),
                self.column_list(&unique.columns)
            ),
            Statement::DropUnique {
                schema,
                table,
                unique,
            } => format!(
                "ALTER TABLE {} DROP INDEX {}",
                self.qualified(schema, table),
                self.quote_identifier(&unique.name)
            ),
            Statement::CreateCheck {
                schema,
                table,
                check,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                self.qualified(schema, table),
                self.quote_identifier(&check.name),
                check.value
            ),
            Statement::DropCheck {
                schema,
                table,
                check,
            } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(schema, table),
                self.quote_identifier(&check.name)
            ),
            Statement::CreateReference { schema, fk, .. } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                self.qualified(schema, &fk.table_from),
                self.quote_identifier(&fk.name),
                self.reference_clause(fk)
            ),
            Statement::DropReference { schema, fk } => format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                self.qualified(schema, &fk.table_from),
                self.quote_identifier(&fk.name)
            ),
        };
        Ok(vec![sql])
    }
}
