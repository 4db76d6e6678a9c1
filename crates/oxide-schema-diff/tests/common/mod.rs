#![allow(dead_code)]

use oxide_schema_diff::prelude::*;

/// `public.users` with an id and a nullable name.
pub fn users() -> Table {
    Table::new("users")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("name", "text"))
}

/// `public.posts`, referencing `public.users`.
pub fn posts() -> Table {
    Table::new("posts")
        .in_schema("public")
        .column(Column::new("id", "serial").primary_key())
        .column(Column::new("author_id", "integer").not_null())
        .column(Column::new("title", "varchar(200)").not_null())
        .index(Index::new("posts_author_idx", &["author_id"]))
        .foreign_key(ForeignKey {
            name: "posts_author_id_users_id_fk".to_string(),
            table_from: String::new(),
            columns_from: vec!["author_id".to_string()],
            table_to: "users".to_string(),
            schema_to: "public".to_string(),
            columns_to: vec!["id".to_string()],
            on_update: None,
            on_delete: Some(ForeignKeyAction::Cascade),
        })
}

/// A Postgres snapshot holding the `public` schema and `tables`.
pub fn pg_snapshot(tables: Vec<Table>) -> Snapshot {
    tables
        .into_iter()
        .fold(Snapshot::empty(Dialect::Postgresql).schema("public"), Snapshot::table)
}

/// A SQLite snapshot holding `tables`.
pub fn sqlite_snapshot(tables: Vec<Table>) -> Snapshot {
    tables
        .into_iter()
        .fold(Snapshot::empty(Dialect::Sqlite), Snapshot::table)
}

/// Renders a diff with the generator for its dialect.
pub fn render(snapshot: &Snapshot, statements: &[Statement]) -> Vec<String> {
    generator_for(snapshot.dialect)
        .generate_all(statements)
        .unwrap_or_else(|e| panic!("Failed to render statements: {e}"))
}
