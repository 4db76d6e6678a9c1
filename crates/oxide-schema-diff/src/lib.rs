//! Snapshot diffing and dialect-aware DDL generation for schema migrations.
//!
//! `oxide-schema-diff` compares two immutable schema snapshots and produces
//! the ordered DDL that turns a database matching the first into one
//! matching the second:
//! - Entities are matched by key, with ambiguous drop/create pairs handed
//!   to a pluggable [`Resolver`](resolver::Resolver) that decides renames
//! - Statements are emitted in dependency order (schemas, enums,
//!   sequences, tables, columns, then constraints)
//! - SQL generation is dialect-aware (PostgreSQL, MySQL, SQLite)
//! - Destructive statements are flagged before anything runs, optionally
//!   using live row counts
//!
//! # Architecture
//!
//! - **Squash** - Canonical single-string encodings of indexes and
//!   constraints, so equality is string equality
//! - **Matcher** - Created / deleted / altered sets over keyed maps
//! - **Resolver** - Rename decisions, interactive or automatic
//! - **Diff** - The orchestrator, [`apply_snapshots_diff`](diff::apply_snapshots_diff)
//! - **Dialect** - [`SqlGenerator`](dialect::SqlGenerator) per database
//! - **Classifier** - Data-loss findings and the final SQL list
//! - **Executor** - Strictly sequential apply, plus `push`
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_schema_diff::prelude::*;
//!
//! let prev = Snapshot::empty(Dialect::Postgresql);
//! let cur = Snapshot::empty(Dialect::Postgresql).table(
//!     Table::new("users")
//!         .in_schema("public")
//!         .column(Column::new("id", "serial").primary_key())
//!         .column(Column::new("email", "varchar(255)").not_null()),
//! );
//!
//! let diff = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames()).await?;
//! let generator = generator_for(cur.dialect);
//! let plan = DataLossClassifier::new(generator.as_ref())
//!     .classify(&diff.statements)
//!     .await?;
//! for sql in &plan.statements_to_execute {
//!     println!("{sql};");
//! }
//! ```

pub mod classifier;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod resolver;
pub mod schema;
pub mod snapshot;
pub mod squash;
pub mod statement;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::classifier::{ClassifiedPlan, DataLossClassifier, Finding, LiveQuery, Risk};
    pub use crate::dialect::{
        generator_for, MysqlGenerator, PostgresGenerator, SqlGenerator, SqliteGenerator,
    };
    pub use crate::diff::{apply_snapshots_diff, SnapshotDiff};
    pub use crate::error::{DiffError, QueryError, Result};
    pub use crate::executor::{apply, push, ApplyOptions, ApplyReport, SqliteLiveQuery};
    pub use crate::resolver::{
        NoRenames, RenameKind, RenameRule, Resolver, Resolvers, ScriptedResolver,
        SimilarityResolver,
    };
    pub use crate::schema::{
        CheckConstraint, Column, DefaultValue, Dialect, Enum, ForeignKey, ForeignKeyAction,
        Generated, GeneratedKind, Index, IndexColumn, PrimaryKey, Sequence, Table,
        UniqueConstraint,
    };
    pub use crate::snapshot::{Snapshot, SnapshotMeta, UuidGenerator};
    pub use crate::statement::Statement;
}
