//! Data-loss classification.
//!
//! Runs over a finished statement list, flags the statements that can
//! destroy data and renders the SQL that should actually be executed. With
//! a [`LiveQuery`] capability, row-count probes can downgrade a risky
//! statement to safe (dropping an empty table loses nothing). Without one,
//! or when a probe fails, the statement stays risky.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::dialect::{quote_literal, SqlGenerator};
use crate::error::{QueryError, Result};
use crate::schema::qualified_key;
use crate::statement::{AlterColumnChange, Statement};

/// One result row, keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Minimal connection capability. The engine never opens or closes
/// connections; callers hand one in.
#[async_trait]
pub trait LiveQuery: Send + Sync {
    /// Runs a query and returns its rows.
    async fn query(&self, sql: &str, params: &[String]) -> std::result::Result<Vec<Row>, QueryError>;

    /// Executes a statement that returns no rows.
    async fn execute(&self, sql: &str) -> std::result::Result<(), QueryError>;
}

/// Risk attached to a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Cannot lose data.
    Safe,
    /// Can lose data; must not run without approval.
    RequiresApproval,
}

/// Classification of one potentially destructive statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Position of the statement in the input list.
    pub statement_index: usize,
    /// Outcome.
    pub risk: Risk,
    /// Human-readable warning naming the affected table/column.
    pub message: String,
    /// Rows at risk, when a probe could count them.
    pub rows: Option<u64>,
}

/// Output of [`DataLossClassifier::classify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedPlan {
    /// Whether any statement requires approval.
    pub should_ask_for_approve: bool,
    /// Rendered SQL in execution order (including inserted truncations).
    pub statements_to_execute: Vec<String>,
    /// Warnings for the statements that require approval.
    pub info_to_print: Vec<String>,
    /// Every risky statement that was examined, safe or not.
    pub findings: Vec<Finding>,
}

/// What can go wrong with a statement.
#[derive(Debug, Clone)]
enum Hazard {
    DropTable {
        table: String,
    },
    DropColumn {
        table: String,
        column: String,
    },
    DropSchema {
        name: String,
    },
    DropEnumValues {
        name: String,
        values: Vec<String>,
    },
    TypeChange {
        table: String,
        column: String,
        from: String,
        to: String,
    },
    SetNotNull {
        table: String,
        column: String,
    },
    AddNotNull {
        schema: String,
        table: String,
        column: String,
    },
}

impl Hazard {
    /// Risky no matter how many rows exist.
    fn is_unconditional(&self) -> bool {
        matches!(self, Self::DropSchema { .. })
    }

    fn message(&self, rows: Option<u64>) -> String {
        let items = match rows {
            Some(n) => format!("{n} items"),
            None => "an unknown number of items".to_string(),
        };
        match self {
            Self::DropTable { table } => {
                format!("You're about to delete {table} table with {items}")
            }
            Self::DropColumn { table, column } => {
                format!("You're about to delete {column} column in {table} table with {items}")
            }
            Self::DropSchema { name } => {
                format!("You're about to delete {name} schema with everything in it")
            }
            Self::DropEnumValues { name, values } => format!(
                "You're about to remove values [{}] from enum {name}, which are used by {items}",
                values.join(", ")
            ),
            Self::TypeChange {
                table,
                column,
                from,
                to,
            } => format!(
                "You're about to change {column} column type from {from} to {to} in {table} table with {items}"
            ),
            Self::SetNotNull { table, column } => format!(
                "You're about to set not-null constraint to {column} column in {table} table, which contains {items} with NULL"
            ),
            Self::AddNotNull { table, column, .. } => {
                let mut message = format!(
                    "You're about to add not-null {column} column without default value to {table} table, which contains {items}"
                );
                if rows.is_some_and(|n| n > 0) {
                    message.push_str("; the table will be truncated first");
                }
                message
            }
        }
    }
}

/// Flags data-loss statements and renders the final SQL list.
pub struct DataLossClassifier<'a> {
    generator: &'a dyn SqlGenerator,
    live: Option<&'a dyn LiveQuery>,
}

impl<'a> DataLossClassifier<'a> {
    /// Creates a classifier with no live connection: every risky
    /// statement requires approval.
    #[must_use]
    pub fn new(generator: &'a dyn SqlGenerator) -> Self {
        Self {
            generator,
            live: None,
        }
    }

    /// Enables row-count probing.
    #[must_use]
    pub fn with_live(mut self, live: &'a dyn LiveQuery) -> Self {
        self.live = Some(live);
        self
    }

    /// Classifies `statements`.
    ///
    /// Probes run concurrently and all complete before this returns. Probe
    /// failures never propagate; they leave the statement risky. Rendering
    /// errors do propagate.
    pub async fn classify(&self, statements: &[Statement]) -> Result<ClassifiedPlan> {
        let hazards: Vec<(usize, Hazard, Vec<String>)> = statements
            .iter()
            .enumerate()
            .filter_map(|(i, s)| self.hazard(s).map(|(h, probes)| (i, h, probes)))
            .collect();

        let counts = join_all(hazards.iter().map(|(_, _, probes)| self.count_all(probes))).await;

        let mut plan = ClassifiedPlan::default();
        let mut truncate: BTreeMap<usize, (String, String)> = BTreeMap::new();
        for ((index, hazard, _), rows) in hazards.into_iter().zip(counts) {
            let safe = !hazard.is_unconditional() && rows == Some(0);
            let risk = if safe {
                Risk::Safe
            } else {
                Risk::RequiresApproval
            };
            let message = hazard.message(rows);
            if risk == Risk::RequiresApproval {
                warn!(statement = index, rows, "{message}");
                plan.should_ask_for_approve = true;
                plan.info_to_print.push(message.clone());
            } else {
                debug!(statement = index, "Downgraded to safe: no rows affected");
            }
            if let Hazard::AddNotNull { schema, table, .. } = &hazard {
                if rows.is_some_and(|n| n > 0) {
                    truncate.insert(index, (schema.clone(), table.clone()));
                }
            }
            plan.findings.push(Finding {
                statement_index: index,
                risk,
                message,
                rows,
            });
        }

        let mut truncated = BTreeSet::new();
        for (index, statement) in statements.iter().enumerate() {
            if let Some((schema, table)) = truncate.get(&index) {
                if truncated.insert(qualified_key(schema, table)) {
                    plan.statements_to_execute
                        .push(self.generator.truncate_sql(schema, table));
                }
            }
            plan.statements_to_execute
                .extend(self.generator.generate_sql(statement)?);
        }
        Ok(plan)
    }

    /// Returns the hazard of a statement and the row-count probes that
    /// measure it.
    fn hazard(&self, statement: &Statement) -> Option<(Hazard, Vec<String>)> {
        let g = self.generator;
        match statement {
            Statement::DropTable { schema, name } => Some((
                Hazard::DropTable {
                    table: qualified_key(schema, name),
                },
                vec![g.count_rows_sql(schema, name, None)],
            )),
            Statement::DropColumn {
                schema,
                table,
                column,
            } => Some((
                Hazard::DropColumn {
                    table: qualified_key(schema, table),
                    column: column.clone(),
                },
                vec![g.count_rows_sql(
                    schema,
                    table,
                    Some(&format!("{} IS NOT NULL", g.quote_identifier(column))),
                )],
            )),
            Statement::DropSchema { name } => {
                Some((Hazard::DropSchema { name: name.clone() }, Vec::new()))
            }
            Statement::DropEnumValue {
                schema,
                name,
                deleted_values,
                columns,
                ..
            } => {
                let values = deleted_values
                    .iter()
                    .map(|v| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let probes = columns
                    .iter()
                    .map(|c| {
                        g.count_rows_sql(
                            &c.schema,
                            &c.table,
                            Some(&format!("{} IN ({values})", g.quote_identifier(&c.column))),
                        )
                    })
                    .collect();
                Some((
                    Hazard::DropEnumValues {
                        name: qualified_key(schema, name),
                        values: deleted_values.clone(),
                    },
                    probes,
                ))
            }
            Statement::AlterColumn {
                schema,
                table,
                column,
                change: AlterColumnChange::SetType { from, to },
            } if !is_widening(from, to) => Some((
                Hazard::TypeChange {
                    table: qualified_key(schema, table),
                    column: column.name.clone(),
                    from: from.clone(),
                    to: to.clone(),
                },
                vec![g.count_rows_sql(
                    schema,
                    table,
                    Some(&format!("{} IS NOT NULL", g.quote_identifier(&column.name))),
                )],
            )),
            Statement::AlterColumn {
                schema,
                table,
                column,
                change: AlterColumnChange::SetNotNull,
            } if column.default.is_none() => Some((
                Hazard::SetNotNull {
                    table: qualified_key(schema, table),
                    column: column.name.clone(),
                },
                vec![g.count_rows_sql(
                    schema,
                    table,
                    Some(&format!("{} IS NULL", g.quote_identifier(&column.name))),
                )],
            )),
            Statement::AddColumn {
                schema,
                table,
                column,
            } if column.not_null && column.default.is_none() && column.generated.is_none() => {
                Some((
                    Hazard::AddNotNull {
                        schema: schema.clone(),
                        table: table.clone(),
                        column: column.name.clone(),
                    },
                    vec![g.count_rows_sql(schema, table, None)],
                ))
            }
            _ => None,
        }
    }

    /// Sums the probes. `None` if any probe is unavailable.
    ///
    /// No probes gives `Some(0)`: the hazard has nothing to count, so no
    /// row can be affected. This happens for an enum value drop that no
    /// column uses, which stays safe even without a live connection.
    async fn count_all(&self, probes: &[String]) -> Option<u64> {
        let counts = join_all(probes.iter().map(|sql| self.count(sql))).await;
        counts.into_iter().sum()
    }

    async fn count(&self, sql: &str) -> Option<u64> {
        let live = self.live?;
        match live.query(sql, &[]).await {
            Ok(rows) => {
                let count = row_count(&rows);
                if count.is_none() {
                    warn!(sql, "Row-count probe returned no usable count");
                }
                count
            }
            Err(err) => {
                warn!(sql, error = %err, "Row-count probe failed");
                None
            }
        }
    }
}

fn row_count(rows: &[Row]) -> Option<u64> {
    let value = rows.first()?.get("count")?;
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

static SIZED_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z ]*?)\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)$").unwrap()
});

fn integer_rank(sql_type: &str) -> Option<u8> {
    match sql_type {
        "tinyint" => Some(0),
        "smallint" | "int2" | "smallserial" => Some(1),
        "mediumint" => Some(2),
        "integer" | "int" | "int4" | "serial" => Some(3),
        "bigint" | "int8" | "bigserial" => Some(4),
        _ => None,
    }
}

fn float_rank(sql_type: &str) -> Option<u8> {
    match sql_type {
        "real" | "float4" | "float" => Some(0),
        "double precision" | "float8" | "double" => Some(1),
        _ => None,
    }
}

fn is_text_like(base: &str) -> bool {
    matches!(base, "varchar" | "character varying" | "char" | "character")
}

/// Returns true if converting a column from `from` to `to` cannot truncate
/// or reject existing values.
#[must_use]
pub fn is_widening(from: &str, to: &str) -> bool {
    let from = from.trim().to_ascii_lowercase();
    let to = to.trim().to_ascii_lowercase();
    if from == to {
        return true;
    }
    if let (Some(a), Some(b)) = (integer_rank(&from), integer_rank(&to)) {
        return b >= a;
    }
    if let (Some(a), Some(b)) = (float_rank(&from), float_rank(&to)) {
        return b >= a;
    }

    let size = |caps: &regex::Captures<'_>, i: usize| -> Option<u64> {
        caps.get(i).and_then(|m| m.as_str().parse().ok())
    };
    match (SIZED_TYPE.captures(&from), SIZED_TYPE.captures(&to)) {
        (Some(a), Some(b)) if a[1] == b[1] => {
            let (Some(len_a), Some(len_b)) = (size(&a, 2), size(&b, 2)) else {
                return false;
            };
            let scale_a = size(&a, 3).unwrap_or(0);
            let scale_b = size(&b, 3).unwrap_or(0);
            len_b >= len_a && scale_b >= scale_a && len_b - scale_b >= len_a - scale_a
        }
        (Some(a), None) => is_text_like(&a[1]) && (to == "text" || to == a[1]),
        _ => false,
    }
}
