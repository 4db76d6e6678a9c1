//! Integration tests for the snapshot diff engine.
//!
//! These tests build prev and cur snapshots, diff them with different
//! resolver policies, and check the resulting statements and SQL.

mod common;

use async_trait::async_trait;
use oxide_schema_diff::prelude::*;
use oxide_schema_diff::resolver::{ResolverInput, ResolverOutput};

use common::{pg_snapshot, posts, render, users};

/// Cancels as soon as it is asked anything.
struct Cancel;

#[async_trait]
impl<T: Send + Sync + 'static> Resolver<T> for Cancel {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        Err(input.scope.abort())
    }
}

// =============================================================================
// Convergence
// =============================================================================

#[tokio::test]
async fn test_identical_snapshots_produce_no_statements() {
    let snapshot = pg_snapshot(vec![users(), posts()]);
    let diff = apply_snapshots_diff(&snapshot, &snapshot, &Resolvers::no_renames())
        .await
        .unwrap();
    assert!(diff.is_empty());
    assert!(diff.meta.is_empty());
}

#[tokio::test]
async fn test_json_round_trip_converges() {
    let snapshot = pg_snapshot(vec![users(), posts()]);
    let reloaded = Snapshot::from_json(&snapshot.to_json_pretty().unwrap()).unwrap();
    let diff = apply_snapshots_diff(&snapshot, &reloaded, &Resolvers::no_renames())
        .await
        .unwrap();
    assert!(diff.is_empty());
}

#[tokio::test]
async fn test_dialect_mismatch_is_rejected() {
    let prev = pg_snapshot(vec![users()]);
    let cur = Snapshot::empty(Dialect::Mysql);
    let err = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap_err();
    assert!(matches!(err, DiffError::Validation { .. }));
}

// =============================================================================
// Rename vs recreate
// =============================================================================

fn t(name: &str) -> Table {
    Table::new(name)
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
}

#[tokio::test]
async fn test_table_rename_declined_becomes_create_and_drop() {
    let prev = pg_snapshot(vec![t("t1")]);
    let cur = pg_snapshot(vec![t("t2")]);
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();

    assert_eq!(diff.statements.len(), 2);
    assert!(matches!(
        &diff.statements[0],
        Statement::CreateTable { table } if table.name == "t2"
    ));
    assert!(matches!(
        &diff.statements[1],
        Statement::DropTable { name, .. } if name == "t1"
    ));
    assert!(diff.meta.is_empty());
}

#[tokio::test]
async fn test_table_rename_accepted_becomes_single_rename() {
    let prev = pg_snapshot(vec![t("t1")]);
    let cur = pg_snapshot(vec![t("t2")]);
    let resolver = ScriptedResolver::default().rule(RenameKind::Table, "public.t1", "public.t2");
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&resolver))
        .await
        .unwrap();

    assert_eq!(
        render(&cur, &diff.statements),
        vec!["ALTER TABLE \"public\".\"t1\" RENAME TO \"t2\""]
    );
    assert_eq!(
        diff.meta.tables.get("\"public\".\"t1\"").map(String::as_str),
        Some("\"public\".\"t2\"")
    );
}

#[tokio::test]
async fn test_column_rename_scenario() {
    let prev = pg_snapshot(vec![users()]);
    let cur = pg_snapshot(vec![Table::new("users")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("full_name", "text"))]);
    let resolver = ScriptedResolver::default().rule(
        RenameKind::Column,
        "public.users.name",
        "public.users.full_name",
    );
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&resolver))
        .await
        .unwrap();

    assert_eq!(diff.statements.len(), 1);
    assert_eq!(
        render(&cur, &diff.statements),
        vec!["ALTER TABLE \"public\".\"users\" RENAME COLUMN \"name\" TO \"full_name\""]
    );

    // Declining the rename loses the column's data instead.
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();
    assert_eq!(
        render(&cur, &diff.statements),
        vec![
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"full_name\" text",
            "ALTER TABLE \"public\".\"users\" DROP COLUMN \"name\"",
        ]
    );
}

#[tokio::test]
async fn test_column_rename_carries_indexes_and_references() {
    let prev = pg_snapshot(vec![users(), posts()]);
    let renamed = Table::new("posts")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("writer_id", "integer").not_null())
        .column(Column::new("title", "varchar(200)").not_null())
        .index(Index::new("posts_author_idx", &["writer_id"]))
        .foreign_key(ForeignKey {
            name: "posts_author_id_users_id_fk".to_string(),
            table_from: String::new(),
            columns_from: vec!["writer_id".to_string()],
            table_to: "users".to_string(),
            schema_to: "public".to_string(),
            columns_to: vec!["id".to_string()],
            on_update: None,
            on_delete: Some(ForeignKeyAction::Cascade),
        });
    let cur = pg_snapshot(vec![users(), renamed]);
    let resolver = ScriptedResolver::default().rule(
        RenameKind::Column,
        "public.posts.author_id",
        "public.posts.writer_id",
    );
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&resolver))
        .await
        .unwrap();

    assert_eq!(diff.statements.len(), 1, "{:?}", diff.statements);
    assert!(matches!(
        &diff.statements[0],
        Statement::RenameColumn { from, to, .. } if from == "author_id" && to == "writer_id"
    ));
}

#[tokio::test]
async fn test_meta_replays_the_same_decisions() {
    let prev = pg_snapshot(vec![t("t1")]);
    let cur = pg_snapshot(vec![t("t2")]);
    let resolver = ScriptedResolver::default().rule(RenameKind::Table, "public.t1", "public.t2");
    let first = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&resolver))
        .await
        .unwrap();

    let replay = ScriptedResolver::from_meta(&first.meta);
    let second = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&replay))
        .await
        .unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_enum_is_created_before_the_column_using_it() {
    let prev = pg_snapshot(vec![users()]);
    let cur = pg_snapshot(vec![users().column(Column::new("mood", "mood").enum_type("public"))])
        .enum_type(Enum::new("public", "mood", &["sad", "ok", "happy"]));
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();

    assert_eq!(
        render(&cur, &diff.statements),
        vec![
            "CREATE TYPE \"public\".\"mood\" AS ENUM('sad', 'ok', 'happy')",
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"mood\" \"public\".\"mood\"",
        ]
    );
}

#[tokio::test]
async fn test_new_tables_precede_their_references() {
    let prev = pg_snapshot(vec![]);
    let cur = pg_snapshot(vec![users(), posts()]);
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();

    let position = |pred: &dyn Fn(&Statement) -> bool| {
        diff.statements
            .iter()
            .position(|s| pred(s))
            .unwrap_or_else(|| panic!("statement missing from {:?}", diff.statements))
    };
    let create_users =
        position(&|s: &Statement| matches!(s, Statement::CreateTable { table } if table.name == "users"));
    let create_posts =
        position(&|s: &Statement| matches!(s, Statement::CreateTable { table } if table.name == "posts"));
    let index = position(&|s: &Statement| matches!(s, Statement::CreateIndex { .. }));
    let reference = position(&|s: &Statement| matches!(s, Statement::CreateReference { .. }));

    assert!(create_users < reference);
    assert!(create_posts < index);
    assert!(index < reference);
}

#[tokio::test]
async fn test_dropped_table_goes_before_enum_rebuild() {
    let moody = Table::new("moody")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("mood", "mood").enum_type("public"));
    let prev = pg_snapshot(vec![moody]).enum_type(Enum::new("public", "mood", &["sad", "ok"]));
    let cur = pg_snapshot(vec![]).enum_type(Enum::new("public", "mood", &["ok"]));
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();

    let drop_table = diff
        .statements
        .iter()
        .position(|s| matches!(s, Statement::DropTable { name, .. } if name == "moody"));
    let rebuild = diff
        .statements
        .iter()
        .position(|s| matches!(s, Statement::DropEnumValue { .. }));
    assert!(drop_table.unwrap() < rebuild.unwrap());

    assert_eq!(
        render(&cur, &diff.statements),
        vec![
            "DROP TABLE \"public\".\"moody\" CASCADE",
            "DROP TYPE \"public\".\"mood\"",
            "CREATE TYPE \"public\".\"mood\" AS ENUM('ok')",
        ]
    );
}

#[tokio::test]
async fn test_references_and_indexes_are_dropped_first() {
    let prev = pg_snapshot(vec![users(), posts()]);
    let cur = pg_snapshot(vec![Table::new("posts")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("title", "varchar(200)").not_null())]);
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();

    let position = |pred: &dyn Fn(&Statement) -> bool| {
        diff.statements
            .iter()
            .position(|s| pred(s))
            .unwrap_or_else(|| panic!("statement missing from {:?}", diff.statements))
    };
    let drop_reference = position(&|s: &Statement| matches!(s, Statement::DropReference { .. }));
    let drop_index = position(&|s: &Statement| matches!(s, Statement::DropIndex { .. }));
    let drop_column = position(
        &|s: &Statement| matches!(s, Statement::DropColumn { column, .. } if column == "author_id"),
    );
    let drop_users =
        position(&|s: &Statement| matches!(s, Statement::DropTable { name, .. } if name == "users"));

    assert_eq!(diff.statements.len(), 4);
    assert!(drop_reference < drop_column);
    assert!(drop_reference < drop_users);
    assert!(drop_index < drop_column);
    assert!(drop_index < drop_users);
}

#[tokio::test]
async fn test_diff_is_deterministic() {
    let prev = pg_snapshot(vec![users()]);
    let cur = pg_snapshot(vec![
        users().column(Column::new("email", "varchar(255)")),
        posts(),
        t("audit"),
    ]);
    let a = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();
    let b = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
        .await
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(render(&cur, &a.statements), render(&cur, &b.statements));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_resolver_abort_cancels_cleanly() {
    let prev = pg_snapshot(vec![t("t1")]);
    let cur = pg_snapshot(vec![t("t2")]);
    let err = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&Cancel))
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(err.to_string(), "Diff aborted while resolving tables");
}

#[tokio::test]
async fn test_resolver_not_consulted_without_ambiguity() {
    // Only additions: nothing to decide, so the aborting resolver is never asked.
    let prev = pg_snapshot(vec![users()]);
    let cur = pg_snapshot(vec![users(), t("audit")]);
    let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::uniform(&Cancel))
        .await
        .unwrap();
    assert_eq!(diff.statements.len(), 1);
}
