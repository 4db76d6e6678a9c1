//! Dialect-specific SQL rendering.
//!
//! Each dialect implements [`SqlGenerator`] and turns [`Statement`]s into
//! literal SQL. Nothing outside this module branches on the dialect.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlGenerator;
pub use postgres::PostgresGenerator;
pub use sqlite::SqliteGenerator;

use crate::error::{DiffError, Result};
use crate::schema::{Dialect, ForeignKey, IndexColumn};
use crate::statement::Statement;

/// Trait for dialect-specific SQL generation.
pub trait SqlGenerator: Send + Sync {
    /// Returns the dialect this generator renders for.
    fn dialect(&self) -> Dialect;

    /// Generates the SQL for one statement. Some statements expand to
    /// several SQL commands; some render to none in a given dialect.
    fn generate_sql(&self, statement: &Statement) -> Result<Vec<String>>;

    /// SQL that empties a table.
    fn truncate_sql(&self, schema: &str, table: &str) -> String;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes a possibly schema-qualified name.
    fn qualified(&self, schema: &str, name: &str) -> String {
        if schema.is_empty() {
            self.quote_identifier(name)
        } else {
            format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(name)
            )
        }
    }

    /// Query returning the number of rows (as column `count`), optionally
    /// restricted by a predicate.
    fn count_rows_sql(&self, schema: &str, table: &str, filter: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT count(*) AS count FROM {}",
            self.qualified(schema, table)
        );
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql
    }

    /// Quotes and joins column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders index key parts.
    fn index_key_list(&self, columns: &[IndexColumn]) -> String {
        columns
            .iter()
            .map(|c| {
                let mut part = if c.is_expression {
                    c.expression.clone()
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

    /// Renders `FOREIGN KEY (...) REFERENCES ...` with its actions.
    fn reference_clause(&self, fk: &ForeignKey) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            self.column_list(&fk.columns_from),
            self.qualified(&fk.schema_to, &fk.table_to),
            self.column_list(&fk.columns_to)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.to_sql());
        }
        if let Some(action) = fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.to_sql());
        }
        sql
    }

    /// Builds the error for a statement this dialect cannot express.
    fn unsupported(&self, statement: &Statement) -> DiffError {
        DiffError::Unsupported {
            dialect: self.dialect(),
            operation: statement.description(),
        }
    }

    /// Renders a whole statement list, preserving order.
    fn generate_all(&self, statements: &[Statement]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for statement in statements {
            out.extend(self.generate_sql(statement)?);
        }
        Ok(out)
    }
}

/// Returns the generator for a dialect.
#[must_use]
pub fn generator_for(dialect: Dialect) -> Box<dyn SqlGenerator> {
    match dialect {
        Dialect::Postgresql => Box::new(PostgresGenerator::new()),
        Dialect::Mysql => Box::new(MysqlGenerator::new()),
        Dialect::Sqlite => Box::new(SqliteGenerator::new()),
    }
}

/// Single-quotes a string literal.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;

    #[test]
    fn test_generator_for_dialect() {
        for dialect in [Dialect::Postgresql, Dialect::Mysql, Dialect::Sqlite] {
            assert_eq!(generator_for(dialect).dialect(), dialect);
        }
    }

    #[test]
    fn test_reference_clause() {
        let fk = ForeignKey {
            name: "posts_author_fk".to_string(),
            table_from: "posts".to_string(),
            columns_from: vec!["author_id".to_string()],
            table_to: "users".to_string(),
            schema_to: "public".to_string(),
            columns_to: vec!["id".to_string()],
            on_update: None,
            on_delete: Some(ForeignKeyAction::Cascade),
        };
        assert_eq!(
            PostgresGenerator::new().reference_clause(&fk),
            "FOREIGN KEY (\"author_id\") REFERENCES \"public\".\"users\"(\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_count_rows_sql() {
        let sql = PostgresGenerator::new().count_rows_sql("", "users", Some("\"email\" IS NULL"));
        assert_eq!(
            sql,
            "SELECT count(*) AS count FROM \"users\" WHERE \"email\" IS NULL"
        );
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
