//! PostgreSQL statement generator.

use super::{quote_literal, SqlGenerator};
use crate::error::Result;
use crate::schema::{Column, Dialect, Index, Sequence, Table};
use crate::statement::{AlterColumnChange, Statement};

/// PostgreSQL SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGenerator;

impl PostgresGenerator {
    /// Creates a new PostgreSQL generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn column_type(&self, column: &Column) -> String {
        match column.type_schema.as_deref() {
            Some(schema) => self.qualified(schema, &column.sql_type),
            None => column.sql_type.clone(),
        }
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)
        );
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql("true", "false"));
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

    fn create_table(&self, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .values()
            .map(|c| format!("    {}", self.column_definition(c)))
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
                "    CONSTRAINT {} UNIQUE{}({})",
                self.quote_identifier(&unique.name),
                if unique.nulls_not_distinct {
                    " NULLS NOT DISTINCT"
                } else {
                    ""
                },
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

    fn create_index(&self, schema: &str, table: &str, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.is_unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if index.concurrently {
            sql.push_str("CONCURRENTLY ");
        }
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.qualified(schema, table));
        if let Some(ref method) = index.method {
            sql.push_str(" USING ");
            sql.push_str(method);
        }
        sql.push_str(&format!(" ({})", self.index_key_list(&index.columns)));
        if let Some(ref predicate) = index.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql
    }

    fn sequence_options(sequence: &Sequence, altering: bool) -> String {
        let mut sql = String::new();
        let options = [
            ("INCREMENT BY", &sequence.increment),
            ("MINVALUE", &sequence.min_value),
            ("MAXVALUE", &sequence.max_value),
            ("START WITH", &sequence.start_with),
            ("CACHE", &sequence.cache),
        ];
        for (keyword, value) in options {
            if let Some(value) = value {
                sql.push_str(&format!(" {keyword} {value}"));
            }
        }
        if sequence.cycle {
            sql.push_str(" CYCLE");
        } else if altering {
            sql.push_str(" NO CYCLE");
        }
        sql
    }

    fn alter_column(
        &self,
        schema: &str,
        table: &str,
        column: &Column,
        change: &AlterColumnChange,
        statement: &Statement,
    ) -> Result<Vec<String>> {
        let target = self.qualified(schema, table);
        let name = self.quote_identifier(&column.name);
        let alter = |action: &str| format!("ALTER TABLE {target} ALTER COLUMN {name} {action}");
        let sql = match change {
            AlterColumnChange::SetType { .. } => {
                vec![alter(&format!("SET DATA TYPE {}", self.column_type(column)))]
            }
            AlterColumnChange::SetDefault { value } => {
                vec![alter(&format!("SET DEFAULT {}", value.to_sql("true", "false")))]
            }
            AlterColumnChange::DropDefault => vec![alter("DROP DEFAULT")],
            AlterColumnChange::SetNotNull => vec![alter("SET NOT NULL")],
            AlterColumnChange::DropNotNull => vec![alter("DROP NOT NULL")],
            AlterColumnChange::AlterGenerated { .. } => {
                if column.generated.is_none() {
                    vec![alter("DROP EXPRESSION")]
                } else {
                    vec![
                        format!("ALTER TABLE {target} DROP COLUMN {name}"),
                        format!(
                            "ALTER TABLE {target} ADD COLUMN {}",
                            self.column_definition(column)
                        ),
                    ]
                }
            }
            AlterColumnChange::SetPrimaryKey => {
                vec![format!("ALTER TABLE {target} ADD PRIMARY KEY ({name})")]
            }
            AlterColumnChange::DropPrimaryKey => vec![format!(
                "ALTER TABLE {target} DROP CONSTRAINT {}",
                self.quote_identifier(&format!("{table}_pkey"))
            )],
            AlterColumnChange::AlterOnUpdate | AlterColumnChange::AlterAutoincrement => {
                return Err(self.unsupported(statement));
            }
        };
        Ok(sql)
    }
}

impl SqlGenerator for PostgresGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn truncate_sql(&self, schema: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {} CASCADE", self.qualified(schema, table))
    }

    fn generate_sql(&self, statement: &Statement) -> Result<Vec<String>> {
        let sql = match statement {
            Statement::CreateSchema { name } => {
                format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote_identifier(name))
            }
            Statement::DropSchema { name } => {
                format!("DROP SCHEMA {}", self.quote_identifier(name))
            }
            Statement::RenameSchema { from, to } => format!(
                "ALTER SCHEMA {} RENAME TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            Statement::CreateEnum {
                schema,
                name,
                values,
            } => format!(
                "CREATE TYPE {} AS ENUM({})",
                self.qualified(schema, name),
                values
                    .iter()
                    .map(|v| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Statement::DropEnum { schema, name } => {
                format!("DROP TYPE {}", self.qualified(schema, name))
            }
            Statement::RenameEnum { schema, from, to } => format!(
                "ALTER TYPE {} RENAME TO {}",
                self.qualified(schema, from),
                self.quote_identifier(to)
            ),
            Statement::MoveEnum {
                name,
                schema_from,
                schema_to,
            } => format!(
                "ALTER TYPE {} SET SCHEMA {}",
                self.qualified(schema_from, name),
                self.quote_identifier(schema_to)
            ),
            Statement::AddEnumValue {
                schema,
                name,
                value,
                before,
            } => {
                let mut sql = format!(
                    "ALTER TYPE {} ADD VALUE {}",
                    self.qualified(schema, name),
                    quote_literal(value)
                );
                if let Some(before) = before {
                    sql.push_str(" BEFORE ");
                    sql.push_str(&quote_literal(before));
                }
                sql
            }
            Statement::DropEnumValue {
                schema,
                name,
                new_values,
                columns,
                ..
            } => {
                let enum_name = self.qualified(schema, name);
                let mut out = Vec::new();
                for c in columns {
                    out.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE text",
                        self.qualified(&c.schema, &c.table),
                        self.quote_identifier(&c.column)
                    ));
                }
                out.push(format!("DROP TYPE {enum_name}"));
                out.push(format!(
                    "CREATE TYPE {enum_name} AS ENUM({})",
                    new_values
                        .iter()
                        .map(|v| quote_literal(v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                for c in columns {
                    let column = self.quote_identifier(&c.column);
                    out.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {column} SET DATA TYPE {enum_name} USING {column}::{enum_name}",
                        self.qualified(&c.schema, &c.table)
                    ));
                }
                return Ok(out);
            }
            Statement::CreateSequence { sequence } => format!(
                "CREATE SEQUENCE {}{}",
                self.qualified(&sequence.schema, &sequence.name),
                Self::sequence_options(sequence, false)
            ),
            Statement::DropSequence { schema, name } => {
                format!("DROP SEQUENCE {}", self.qualified(schema, name))
            }
            Statement::RenameSequence { schema, from, to } => format!(
                "ALTER SEQUENCE {} RENAME TO {}",
                self.qualified(schema, from),
                self.quote_identifier(to)
            ),
            Statement::MoveSequence {
                name,
                schema_from,
                schema_to,
            } => format!(
                "ALTER SEQUENCE {} SET SCHEMA {}",
                self.qualified(schema_from, name),
                self.quote_identifier(schema_to)
            ),
            Statement::AlterSequence { sequence } => format!(
                "ALTER SEQUENCE {}{}",
                self.qualified(&sequence.schema, &sequence.name),
                Self::sequence_options(sequence, true)
            ),
            Statement::CreateTable { table } => self.create_table(table),
            Statement::DropTable { schema, name } => {
                format!("DROP TABLE {} CASCADE", self.qualified(schema, name))
            }
            Statement::RenameTable { schema, from, to } => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.qualified(schema, from),
                self.quote_identifier(to)
            ),
            Statement::MoveTable {
                name,
                schema_from,
                schema_to,
            } => format!(
                "ALTER TABLE {} SET SCHEMA {}",
                self.qualified(schema_from, name),
                self.quote_identifier(schema_to)
            ),
            Statement::AddColumn {
                schema,
                table,
                column,
            } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualified(schema, table),
                self.column_definition(column)
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
            } => return self.alter_column(schema, table, column, change, statement),
            Statement::CreateIndex {
                schema,
                table,
                index,
            } => self.create_index(schema, table, index),
            Statement::DropIndex { schema, index, .. } => format!(
                "DROP INDEX {}{}",
                if index.concurrently { "CONCURRENTLY " } else { "" },
                self.qualified(schema, &index.name)
            ),
            Statement::RenameIndex {
                schema,
                from,
                index,
                ..
            } => format!(
                "ALTER INDEX {} RENAME TO {}",
                self.qualified(schema, from),
                self.quote_identifier(&index.name)
            ),
            Statement::CreateCompositePk { schema, table, pk } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY({})",
                self.qualified(schema, table),
                self.quote_identifier(&pk.name),
                self.column_list(&pk.columns)
            ),
            Statement::DropCompositePk { schema, table, pk } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(schema, table),
                self.quote_identifier(&pk.name)
            ),
            Statement::CreateUnique {
                schema,
                table,
                unique,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE{}({})",
                self.qualified(schema, table),
                self.quote_identifier(&unique.name),
                if unique.nulls_not_distinct {
                    " NULLS NOT DISTINCT"
                } else {
                    ""
                },
                self.column_list(&unique.columns)
            ),
            Statement::DropUnique {
                schema,
                table,
                unique,
            } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
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
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(schema, &fk.table_from),
                self.quote_identifier(&fk.name)
            ),
        };
        Ok(vec![sql])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, GeneratedKind, IndexColumn};
    use crate::statement::EnumColumnRef;

    fn generate(statement: Statement) -> Vec<String> {
        PostgresGenerator::new().generate_sql(&statement).unwrap()
    }

    #[test]
    fn test_create_table() {
        let table = Table::new("users")
            .in_schema("public")
            .column(Column::new("id", "serial").primary_key())
            .column(
                Column::new("role", "role")
                    .enum_type("auth")
                    .not_null()
                    .default(DefaultValue::String("user".to_string())),
            )
            .unique("users_role_unique", &["role"]);
        let sql = generate(Statement::CreateTable { table });
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS \"public\".\"users\" (\n    \"id\" serial PRIMARY KEY NOT NULL,\n    \"role\" \"auth\".\"role\" NOT NULL DEFAULT 'user',\n    CONSTRAINT \"users_role_unique\" UNIQUE(\"role\")\n)"
        );
    }

    #[test]
    fn test_create_schema_if_not_exists() {
        let sql = generate(Statement::CreateSchema {
            name: "auth".to_string(),
        });
        assert_eq!(sql, vec!["CREATE SCHEMA IF NOT EXISTS \"auth\""]);
    }

    #[test]
    fn test_generated_column() {
        let sql = generate(Statement::AddColumn {
            schema: String::new(),
            table: "t".to_string(),
            column: Column::new("total", "integer").generated(GeneratedKind::Stored, "a + b"),
        });
        assert_eq!(
            sql[0],
            "ALTER TABLE \"t\" ADD COLUMN \"total\" integer GENERATED ALWAYS AS (a + b) STORED"
        );
    }

    #[test]
    fn test_create_enum_and_add_value() {
        let sql = generate(Statement::CreateEnum {
            schema: "public".to_string(),
            name: "mood".to_string(),
            values: vec!["sad".to_string(), "ok".to_string()],
        });
        assert_eq!(sql[0], "CREATE TYPE \"public\".\"mood\" AS ENUM('sad', 'ok')");

        let sql = generate(Statement::AddEnumValue {
            schema: "public".to_string(),
            name: "mood".to_string(),
            value: "happy".to_string(),
            before: Some("ok".to_string()),
        });
        assert_eq!(
            sql[0],
            "ALTER TYPE \"public\".\"mood\" ADD VALUE 'happy' BEFORE 'ok'"
        );
    }

    #[test]
    fn test_drop_enum_value_rebuilds_type() {
        let sql = generate(Statement::DropEnumValue {
            schema: "public".to_string(),
            name: "mood".to_string(),
            deleted_values: vec!["meh".to_string()],
            new_values: vec!["sad".to_string(), "ok".to_string()],
            columns: vec![EnumColumnRef {
                schema: "public".to_string(),
                table: "users".to_string(),
                column: "mood".to_string(),
            }],
        });
        assert_eq!(sql.len(), 4);
        assert_eq!(
            sql[0],
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"mood\" SET DATA TYPE text"
        );
        assert_eq!(sql[1], "DROP TYPE \"public\".\"mood\"");
        assert!(sql[3].ends_with("USING \"mood\"::\"public\".\"mood\""));
    }

    #[test]
    fn test_alter_column_type() {
        let sql = generate(Statement::AlterColumn {
            schema: String::new(),
            table: "users".to_string(),
            column: Column::new("age", "bigint"),
            change: AlterColumnChange::SetType {
                from: "integer".to_string(),
                to: "bigint".to_string(),
            },
        });
        assert_eq!(
            sql[0],
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" SET DATA TYPE bigint"
        );
    }

    #[test]
    fn test_on_update_is_unsupported() {
        let statement = Statement::AlterColumn {
            schema: String::new(),
            table: "users".to_string(),
            column: Column::new("updated_at", "timestamp").on_update("now()"),
            change: AlterColumnChange::AlterOnUpdate,
        };
        let err = PostgresGenerator::new().generate_sql(&statement).unwrap_err();
        assert!(err.to_string().contains("updated_at"));
        assert!(err.to_string().contains("postgresql"));
    }

    #[test]
    fn test_create_index() {
        let mut index = Index::new("users_email_idx", &["email"])
            .unique()
            .using("btree")
            .where_clause("deleted_at IS NULL");
        index.columns.push(IndexColumn::expression("lower(name)").desc());
        let sql = generate(Statement::CreateIndex {
            schema: "public".to_string(),
            table: "users".to_string(),
            index,
        });
        assert_eq!(
            sql[0],
            "CREATE UNIQUE INDEX \"users_email_idx\" ON \"public\".\"users\" USING btree (\"email\", lower(name) DESC) WHERE deleted_at IS NULL"
        );
    }

    #[test]
    fn test_sequence_options() {
        let mut sequence = Sequence::new("public", "order_seq");
        sequence.increment = Some("2".to_string());
        sequence.start_with = Some("100".to_string());
        let sql = generate(Statement::CreateSequence {
            sequence: sequence.clone(),
        });
        assert_eq!(
            sql[0],
            "CREATE SEQUENCE \"public\".\"order_seq\" INCREMENT BY 2 START WITH 100"
        );
        let sql = generate(Statement::AlterSequence { sequence });
        assert!(sql[0].ends_with("NO CYCLE"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(
            PostgresGenerator::new().truncate_sql("public", "users"),
            "TRUNCATE TABLE \"public\".\"users\" CASCADE"
        );
    }
}
