//! Applying classified plans.
//!
//! This module runs rendered SQL against a live connection, strictly in
//! order, and provides the `push` convenience that chains diffing,
//! classification and application. Statements are not wrapped in a
//! transaction; the caller decides the rollback policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, ValueRef};
use tracing::{debug, info};

use crate::classifier::{ClassifiedPlan, DataLossClassifier, LiveQuery, Row};
use crate::dialect::SqlGenerator;
use crate::diff::{apply_snapshots_diff, SnapshotDiff};
use crate::error::{DiffError, QueryError, Result};
use crate::resolver::Resolvers;
use crate::snapshot::Snapshot;

/// Options for [`apply`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Run data-loss statements without approval.
    pub force: bool,
}

impl ApplyOptions {
    /// Options that apply even when approval would be required.
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

/// Summary of a completed apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    /// When the first statement was sent.
    pub started_at: DateTime<Utc>,
    /// When the last statement was acknowledged.
    pub finished_at: DateTime<Utc>,
    /// Number of statements executed.
    pub executed: usize,
}

/// Executes a classified plan.
///
/// Refuses to run a plan that needs approval unless `options.force` is
/// set. Each statement starts only after the previous one succeeded; the
/// first failure halts the sequence.
pub async fn apply(
    plan: &ClassifiedPlan,
    live: &dyn LiveQuery,
    options: ApplyOptions,
) -> Result<ApplyReport> {
    if plan.should_ask_for_approve && !options.force {
        return Err(DiffError::ApprovalRequired {
            warnings: plan.info_to_print.clone(),
        });
    }

    let started_at = Utc::now();
    info!(
        statements = plan.statements_to_execute.len(),
        forced = options.force && plan.should_ask_for_approve,
        "Applying schema changes"
    );

    for (index, sql) in plan.statements_to_execute.iter().enumerate() {
        debug!(index, sql = %sql, "Executing SQL");
        live.execute(sql)
            .await
            .map_err(|source| DiffError::Execution {
                index,
                sql: sql.clone(),
                source,
            })?;
    }

    let report = ApplyReport {
        started_at,
        finished_at: Utc::now(),
        executed: plan.statements_to_execute.len(),
    };
    info!(executed = report.executed, "Schema changes applied");
    Ok(report)
}

/// Everything produced by [`push`].
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// The computed diff.
    pub diff: SnapshotDiff,
    /// Its classification.
    pub plan: ClassifiedPlan,
    /// The apply summary.
    pub report: ApplyReport,
}

/// Diffs `prev` against `cur`, classifies the result against `live` and
/// applies it.
///
/// Fails with [`DiffError::ApprovalRequired`] before executing anything if
/// the plan can lose data and `options.force` is not set.
pub async fn push(
    prev: &Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
    generator: &dyn SqlGenerator,
    live: &dyn LiveQuery,
    options: ApplyOptions,
) -> Result<PushOutcome> {
    if generator.dialect() != cur.dialect {
        return Err(DiffError::validation(
            "cur",
            format!(
                "snapshot dialect {} does not match generator dialect {}",
                cur.dialect,
                generator.dialect()
            ),
        ));
    }

    let diff = apply_snapshots_diff(prev, cur, resolvers).await?;
    let plan = DataLossClassifier::new(generator)
        .with_live(live)
        .classify(&diff.statements)
        .await?;
    let report = apply(&plan, live, options).await?;
    Ok(PushOutcome { diff, plan, report })
}

/// [`LiveQuery`] over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteLiveQuery {
    pool: SqlitePool,
}

impl SqliteLiveQuery {
    /// Wraps an existing pool. The pool stays owned by the caller's
    /// lifecycle; this adapter never closes it.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let i = column.ordinal();
            let is_null = row.try_get_raw(i).map_or(true, |raw| raw.is_null());
            let value = if is_null {
                serde_json::Value::Null
            } else if let Ok(n) = row.try_get::<i64, _>(i) {
                serde_json::Value::from(n)
            } else if let Ok(f) = row.try_get::<f64, _>(i) {
                serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, Into::into)
            } else if let Ok(s) = row.try_get::<String, _>(i) {
                serde_json::Value::String(s)
            } else {
                serde_json::Value::Null
            };
            (column.name().to_string(), value)
        })
        .collect()
}

#[async_trait]
impl LiveQuery for SqliteLiveQuery {
    async fn query(
        &self,
        sql: &str,
        params: &[String],
    ) -> std::result::Result<Vec<Row>, QueryError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, sql: &str) -> std::result::Result<(), QueryError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}
