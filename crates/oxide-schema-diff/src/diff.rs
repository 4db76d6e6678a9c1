//! Snapshot differencing.
//!
//! [`apply_snapshots_diff`] walks the entity categories in dependency order
//! (schemas, enums, sequences, tables, then each table's columns, indexes
//! and constraints). Every resolved rename is applied to a working copy of
//! the previous snapshot before the next category is compared, so nested
//! entities are always matched against the right identity. Statements are
//! collected into ordered slots: creations precede the structures that
//! depend on them and drops run in reverse dependency order.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{DiffError, Result};
use crate::matcher::diff_entities;
use crate::resolver::{meta_key, resolve_candidates, Rename, ResolveScope, Resolvers};
use crate::schema::{
    CheckConstraint, Column, Enum, ForeignKey, Index, PrimaryKey, Table, UniqueConstraint,
};
use crate::snapshot::{Snapshot, SnapshotMeta};
use crate::squash::{squash_table, Squash};
use crate::statement::{AlterColumnChange, EnumColumnRef, Statement};

/// Output of a diff: ordered statements plus rename bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// Statements in execution order.
    pub statements: Vec<Statement>,
    /// Renames decided while diffing, keyed by quoted qualified names.
    pub meta: SnapshotMeta,
}

impl SnapshotDiff {
    /// Returns true if the snapshots are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Statement slots, concatenated in field order.
#[derive(Default)]
struct Plan {
    create_schemas: Vec<Statement>,
    rename_schemas: Vec<Statement>,
    enums: Vec<Statement>,
    sequences: Vec<Statement>,
    rename_tables: Vec<Statement>,
    drop_references: Vec<Statement>,
    drop_indexes: Vec<Statement>,
    drop_constraints: Vec<Statement>,
    renames: Vec<Statement>,
    create_tables: Vec<Statement>,
    columns: Vec<Statement>,
    // Enum rebuilds only retype columns of surviving tables.
    drop_tables: Vec<Statement>,
    enum_rebuilds: Vec<Statement>,
    create_constraints: Vec<Statement>,
    create_indexes: Vec<Statement>,
    create_references: Vec<Statement>,
    drop_types: Vec<Statement>,
    drop_schemas: Vec<Statement>,
}

impl Plan {
    fn into_statements(self) -> Vec<Statement> {
        [
            self.create_schemas,
            self.rename_schemas,
            self.enums,
            self.sequences,
            self.rename_tables,
            self.drop_references,
            self.drop_indexes,
            self.drop_constraints,
            self.renames,
            self.create_tables,
            self.columns,
            self.drop_tables,
            self.enum_rebuilds,
            self.create_constraints,
            self.create_indexes,
            self.create_references,
            self.drop_types,
            self.drop_schemas,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Computes the statements that turn `prev` into `cur`.
///
/// Both snapshots are validated first and must target the same dialect.
/// Resolvers are consulted whenever a category has both deleted and
/// created entities; an abort from any of them cancels the diff with
/// [`DiffError::Aborted`] and no statements.
pub async fn apply_snapshots_diff(
    prev: &Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
) -> Result<SnapshotDiff> {
    prev.validate("prev")?;
    cur.validate("cur")?;
    if prev.dialect != cur.dialect {
        return Err(DiffError::validation(
            "cur",
            format!(
                "dialect '{}' does not match previous snapshot dialect '{}'",
                cur.dialect, prev.dialect
            ),
        ));
    }

    let mut working = prev.clone();
    let mut plan = Plan::default();
    let mut meta = SnapshotMeta::default();

    diff_schemas(&mut working, cur, resolvers, &mut plan, &mut meta).await?;
    diff_enums(&mut working, cur, resolvers, &mut plan).await?;
    diff_sequences(&mut working, cur, resolvers, &mut plan).await?;
    diff_tables(&mut working, cur, resolvers, &mut plan, &mut meta).await?;

    let statements = plan.into_statements();
    info!(
        dialect = %cur.dialect,
        statements = statements.len(),
        renamed_tables = meta.tables.len(),
        renamed_columns = meta.columns.len(),
        "Computed snapshot diff"
    );
    Ok(SnapshotDiff { statements, meta })
}

async fn diff_schemas(
    working: &mut Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
    meta: &mut SnapshotMeta,
) -> Result<()> {
    let matched = diff_entities(&working.schemas, &cur.schemas);
    let deleted: Vec<String> = matched.deleted.into_iter().cloned().collect();
    let created: Vec<String> = matched.created.into_iter().cloned().collect();
    let resolved =
        resolve_candidates(resolvers.schemas, ResolveScope::Schemas, deleted, created).await?;

    for Rename { from, to } in resolved.renamed {
        rename_schema(working, &from, &to);
        meta.schemas.insert(meta_key(&[&from]), meta_key(&[&to]));
        plan.rename_schemas.push(Statement::RenameSchema { from, to });
    }
    plan.create_schemas.extend(
        resolved
            .created
            .into_iter()
            .map(|name| Statement::CreateSchema { name }),
    );
    plan.drop_schemas.extend(
        resolved
            .deleted
            .into_iter()
            .map(|name| Statement::DropSchema { name }),
    );
    Ok(())
}

async fn diff_enums(
    working: &mut Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
) -> Result<()> {
    let matched = diff_entities(&working.enums, &cur.enums);
    let deleted: Vec<Enum> = matched.deleted.into_iter().cloned().collect();
    let created: Vec<Enum> = matched.created.into_iter().cloned().collect();
    let resolved =
        resolve_candidates(resolvers.enums, ResolveScope::Enums, deleted, created).await?;

    for Rename { from, to } in resolved.renamed {
        if from.schema != to.schema {
            plan.enums.push(Statement::MoveEnum {
                name: from.name.clone(),
                schema_from: from.schema.clone(),
                schema_to: to.schema.clone(),
            });
        }
        if from.name != to.name {
            plan.enums.push(Statement::RenameEnum {
                schema: to.schema.clone(),
                from: from.name.clone(),
                to: to.name.clone(),
            });
        }
        rekey_enum(working, &from, &to);
    }
    for value in resolved.created {
        plan.enums.push(Statement::CreateEnum {
            schema: value.schema,
            name: value.name,
            values: value.values,
        });
    }
    for value in resolved.deleted {
        plan.drop_types.push(Statement::DropEnum {
            schema: value.schema,
            name: value.name,
        });
    }

    let altered: Vec<(Enum, Enum)> = diff_entities(&working.enums, &cur.enums)
        .altered
        .into_iter()
        .map(|(before, after)| (before.clone(), after.clone()))
        .collect();
    for (before, after) in altered {
        enum_value_changes(&before, &after, cur, plan);
    }
    Ok(())
}

/// Appended or inserted values become `ADD VALUE`; anything else (removed
/// or reordered values) rebuilds the type.
fn enum_value_changes(before: &Enum, after: &Enum, cur: &Snapshot, plan: &mut Plan) {
    let kept: Vec<String> = after
        .values
        .iter()
        .filter(|v| before.values.contains(v))
        .cloned()
        .collect();

    if kept == before.values {
        for (i, value) in after.values.iter().enumerate() {
            if before.values.contains(value) {
                continue;
            }
            let next_existing = after.values[i + 1..]
                .iter()
                .find(|v| before.values.contains(v))
                .cloned();
            plan.enums.push(Statement::AddEnumValue {
                schema: after.schema.clone(),
                name: after.name.clone(),
                value: value.clone(),
                before: next_existing,
            });
        }
        return;
    }

    let columns = cur
        .tables
        .values()
        .flat_map(|table| {
            table
                .columns
                .values()
                .filter(|c| c.uses_enum(&after.schema, &after.name))
                .map(|c| EnumColumnRef {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    column: c.name.clone(),
                })
        })
        .collect();
    plan.enum_rebuilds.push(Statement::DropEnumValue {
        schema: after.schema.clone(),
        name: after.name.clone(),
        deleted_values: before
            .values
            .iter()
            .filter(|v| !after.values.contains(v))
            .cloned()
            .collect(),
        new_values: after.values.clone(),
        columns,
    });
}

async fn diff_sequences(
    working: &mut Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
) -> Result<()> {
    let matched = diff_entities(&working.sequences, &cur.sequences);
    let deleted = matched.deleted.into_iter().cloned().collect();
    let created = matched.created.into_iter().cloned().collect();
    let resolved =
        resolve_candidates(resolvers.sequences, ResolveScope::Sequences, deleted, created)
            .await?;

    for Rename { from, to } in resolved.renamed {
        if from.schema != to.schema {
            plan.sequences.push(Statement::MoveSequence {
                name: from.name.clone(),
                schema_from: from.schema.clone(),
                schema_to: to.schema.clone(),
            });
        }
        if from.name != to.name {
            plan.sequences.push(Statement::RenameSequence {
                schema: to.schema.clone(),
                from: from.name.clone(),
                to: to.name.clone(),
            });
        }
        if let Some(mut sequence) = working.sequences.remove(&from.key()) {
            sequence.schema = to.schema.clone();
            sequence.name = to.name.clone();
            working.sequences.insert(sequence.key(), sequence);
        }
    }
    for sequence in resolved.created {
        plan.sequences.push(Statement::CreateSequence { sequence });
    }
    for sequence in resolved.deleted {
        plan.drop_types.push(Statement::DropSequence {
            schema: sequence.schema,
            name: sequence.name,
        });
    }

    for (_, after) in diff_entities(&working.sequences, &cur.sequences).altered {
        plan.sequences.push(Statement::AlterSequence {
            sequence: after.clone(),
        });
    }
    Ok(())
}

async fn diff_tables(
    working: &mut Snapshot,
    cur: &Snapshot,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
    meta: &mut SnapshotMeta,
) -> Result<()> {
    let matched = diff_entities(&working.tables, &cur.tables);
    let deleted: Vec<Table> = matched.deleted.into_iter().cloned().collect();
    let created: Vec<Table> = matched.created.into_iter().cloned().collect();
    let resolved =
        resolve_candidates(resolvers.tables, ResolveScope::Tables, deleted, created).await?;

    for Rename { from, to } in resolved.renamed {
        if from.schema != to.schema {
            plan.rename_tables.push(Statement::MoveTable {
                name: from.name.clone(),
                schema_from: from.schema.clone(),
                schema_to: to.schema.clone(),
            });
        }
        if from.name != to.name {
            plan.rename_tables.push(Statement::RenameTable {
                schema: to.schema.clone(),
                from: from.name.clone(),
                to: to.name.clone(),
            });
        }
        meta.tables.insert(
            meta_key(&[&from.schema, &from.name]),
            meta_key(&[&to.schema, &to.name]),
        );
        rekey_table(working, &from.key(), &to.schema, &to.name);
    }

    for table in resolved.created {
        for index in table.indexes.values() {
            plan.create_indexes.push(Statement::CreateIndex {
                schema: table.schema.clone(),
                table: table.name.clone(),
                index: index.clone(),
            });
        }
        for fk in table.foreign_keys.values() {
            plan.create_references.push(Statement::CreateReference {
                schema: table.schema.clone(),
                fk: fk.clone(),
                table_is_new: true,
            });
        }
        plan.create_tables.push(Statement::CreateTable { table });
    }
    for table in resolved.deleted {
        plan.drop_tables.push(Statement::DropTable {
            schema: table.schema,
            name: table.name,
        });
    }

    let common: Vec<String> = cur
        .tables
        .keys()
        .filter(|key| working.tables.contains_key(*key))
        .cloned()
        .collect();
    for key in common {
        let Some(cur_table) = cur.tables.get(&key) else {
            continue;
        };
        diff_columns(working, &key, cur_table, resolvers, plan, meta).await?;
        let Some(prev_table) = working.tables.get(&key) else {
            continue;
        };
        diff_table_structures(prev_table, cur_table, resolvers, plan).await?;
    }
    Ok(())
}

async fn diff_columns(
    working: &mut Snapshot,
    key: &str,
    cur_table: &Table,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
    meta: &mut SnapshotMeta,
) -> Result<()> {
    let schema = &cur_table.schema;
    let table = &cur_table.name;
    let (deleted, created) = match working.tables.get(key) {
        Some(prev_table) => {
            let matched = diff_entities(&prev_table.columns, &cur_table.columns);
            let deleted: Vec<Column> = matched.deleted.into_iter().cloned().collect();
            let created: Vec<Column> = matched.created.into_iter().cloned().collect();
            (deleted, created)
        }
        None => return Ok(()),
    };
    let scope = ResolveScope::Columns {
        schema: schema.clone(),
        table: table.clone(),
    };
    let resolved = resolve_candidates(resolvers.columns, scope, deleted, created).await?;

    for Rename { from, to } in resolved.renamed {
        rename_column(working, key, &from.name, &to.name);
        meta.columns.insert(
            meta_key(&[schema, table, &from.name]),
            meta_key(&[schema, table, &to.name]),
        );
        plan.renames.push(Statement::RenameColumn {
            schema: schema.clone(),
            table: table.clone(),
            from: from.name,
            to: to.name,
        });
    }

    for column in resolved.created {
        plan.columns.push(Statement::AddColumn {
            schema: schema.clone(),
            table: table.clone(),
            column,
        });
    }
    if let Some(prev_table) = working.tables.get(key) {
        for (before, after) in diff_entities(&prev_table.columns, &cur_table.columns).altered {
            for change in column_changes(before, after) {
                plan.columns.push(Statement::AlterColumn {
                    schema: schema.clone(),
                    table: table.clone(),
                    column: after.clone(),
                    change,
                });
            }
        }
    }
    for column in resolved.deleted {
        plan.columns.push(Statement::DropColumn {
            schema: schema.clone(),
            table: table.clone(),
            column: column.name,
        });
    }
    Ok(())
}

fn column_changes(before: &Column, after: &Column) -> Vec<AlterColumnChange> {
    let mut changes = Vec::new();
    if before.sql_type != after.sql_type || before.type_schema != after.type_schema {
        changes.push(AlterColumnChange::SetType {
            from: before.sql_type.clone(),
            to: after.sql_type.clone(),
        });
    }
    if before.default != after.default {
        changes.push(match after.default {
            Some(ref value) => AlterColumnChange::SetDefault {
                value: value.clone(),
            },
            None => AlterColumnChange::DropDefault,
        });
    }
    if before.not_null != after.not_null {
        changes.push(if after.not_null {
            AlterColumnChange::SetNotNull
        } else {
            AlterColumnChange::DropNotNull
        });
    }
    if before.generated != after.generated {
        changes.push(AlterColumnChange::AlterGenerated {
            previous: before.generated.clone(),
        });
    }
    if before.on_update != after.on_update {
        changes.push(AlterColumnChange::AlterOnUpdate);
    }
    if before.autoincrement != after.autoincrement {
        changes.push(AlterColumnChange::AlterAutoincrement);
    }
    if before.primary_key != after.primary_key {
        changes.push(if after.primary_key {
            AlterColumnChange::SetPrimaryKey
        } else {
            AlterColumnChange::DropPrimaryKey
        });
    }
    changes
}

/// Indexes go through the resolver; constraints are matched by name only.
async fn diff_table_structures(
    prev_table: &Table,
    cur_table: &Table,
    resolvers: &Resolvers<'_>,
    plan: &mut Plan,
) -> Result<()> {
    let before = squash_table(prev_table);
    let after = squash_table(cur_table);
    let schema = &cur_table.schema;
    let table = &cur_table.name;

    let drop_index = |index: Index| Statement::DropIndex {
        schema: schema.clone(),
        table: table.clone(),
        index,
    };
    let create_index = |index: Index| Statement::CreateIndex {
        schema: schema.clone(),
        table: table.clone(),
        index,
    };

    let matched = diff_entities(&before.indexes, &after.indexes);
    let deleted = unsquash_all::<Index>(&matched.deleted)?;
    let created = unsquash_all::<Index>(&matched.created)?;
    for (old, new) in &matched.altered {
        plan.drop_indexes.push(drop_index(Index::unsquash(old)?));
        plan.create_indexes.push(create_index(Index::unsquash(new)?));
    }
    let scope = ResolveScope::Indexes {
        schema: schema.clone(),
        table: table.clone(),
    };
    let resolved = resolve_candidates(resolvers.indexes, scope, deleted, created).await?;
    for Rename { from, to } in resolved.renamed {
        let same_definition = Index {
            name: to.name.clone(),
            ..from.clone()
        } == to;
        if same_definition {
            plan.renames.push(Statement::RenameIndex {
                schema: schema.clone(),
                table: table.clone(),
                from: from.name,
                index: to,
            });
        } else {
            plan.drop_indexes.push(drop_index(from));
            plan.create_indexes.push(create_index(to));
        }
    }
    plan.create_indexes
        .extend(resolved.created.into_iter().map(create_index));
    plan.drop_indexes
        .extend(resolved.deleted.into_iter().map(drop_index));

    let (dropped, added) = constraint_changes::<PrimaryKey>(
        &before.composite_primary_keys,
        &after.composite_primary_keys,
    )?;
    plan.drop_constraints
        .extend(dropped.into_iter().map(|pk| Statement::DropCompositePk {
            schema: schema.clone(),
            table: table.clone(),
            pk,
        }));
    plan.create_constraints
        .extend(added.into_iter().map(|pk| Statement::CreateCompositePk {
            schema: schema.clone(),
            table: table.clone(),
            pk,
        }));

    let (dropped, added) = constraint_changes::<UniqueConstraint>(
        &before.unique_constraints,
        &after.unique_constraints,
    )?;
    plan.drop_constraints
        .extend(dropped.into_iter().map(|unique| Statement::DropUnique {
            schema: schema.clone(),
            table: table.clone(),
            unique,
        }));
    plan.create_constraints
        .extend(added.into_iter().map(|unique| Statement::CreateUnique {
            schema: schema.clone(),
            table: table.clone(),
            unique,
        }));

    let (dropped, added) =
        constraint_changes::<CheckConstraint>(&before.check_constraints, &after.check_constraints)?;
    plan.drop_constraints
        .extend(dropped.into_iter().map(|check| Statement::DropCheck {
            schema: schema.clone(),
            table: table.clone(),
            check,
        }));
    plan.create_constraints
        .extend(added.into_iter().map(|check| Statement::CreateCheck {
            schema: schema.clone(),
            table: table.clone(),
            check,
        }));

    let (dropped, added) =
        constraint_changes::<ForeignKey>(&before.foreign_keys, &after.foreign_keys)?;
    plan.drop_references
        .extend(dropped.into_iter().map(|fk| Statement::DropReference {
            schema: schema.clone(),
            fk,
        }));
    plan.create_references
        .extend(added.into_iter().map(|fk| Statement::CreateReference {
            schema: schema.clone(),
            fk,
            table_is_new: false,
        }));
    Ok(())
}

fn unsquash_all<T: Squash>(values: &[&String]) -> Result<Vec<T>> {
    values.iter().map(|v| T::unsquash(v)).collect()
}

/// Returns `(to_drop, to_create)`. A changed definition is both.
fn constraint_changes<T: Squash>(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> Result<(Vec<T>, Vec<T>)> {
    let matched = diff_entities(before, after);
    let mut dropped = unsquash_all::<T>(&matched.deleted)?;
    let mut added = unsquash_all::<T>(&matched.created)?;
    for (old, new) in matched.altered {
        dropped.push(T::unsquash(old)?);
        added.push(T::unsquash(new)?);
    }
    Ok((dropped, added))
}

fn rename_schema(working: &mut Snapshot, from: &str, to: &str) {
    working.schemas.remove(from);
    working.schemas.insert(to.to_string(), to.to_string());

    let tables = std::mem::take(&mut working.tables);
    working.tables = tables
        .into_values()
        .map(|mut table| {
            if table.schema == from {
                table.schema = to.to_string();
            }
            for fk in table.foreign_keys.values_mut() {
                if fk.schema_to == from {
                    fk.schema_to = to.to_string();
                }
            }
            for column in table.columns.values_mut() {
                if column.type_schema.as_deref() == Some(from) {
                    column.type_schema = Some(to.to_string());
                }
            }
            (table.key(), table)
        })
        .collect();

    let enums = std::mem::take(&mut working.enums);
    working.enums = enums
        .into_values()
        .map(|mut value| {
            if value.schema == from {
                value.schema = to.to_string();
            }
            (value.key(), value)
        })
        .collect();

    let sequences = std::mem::take(&mut working.sequences);
    working.sequences = sequences
        .into_values()
        .map(|mut sequence| {
            if sequence.schema == from {
                sequence.schema = to.to_string();
            }
            (sequence.key(), sequence)
        })
        .collect();
}

fn rekey_enum(working: &mut Snapshot, from: &Enum, to: &Enum) {
    if let Some(mut value) = working.enums.remove(&from.key()) {
        value.schema = to.schema.clone();
        value.name = to.name.clone();
        working.enums.insert(value.key(), value);
    }
    for table in working.tables.values_mut() {
        for column in table.columns.values_mut() {
            if column.uses_enum(&from.schema, &from.name) {
                column.type_schema = Some(to.schema.clone());
                column.sql_type = to.name.clone();
            }
        }
    }
}

fn rekey_table(working: &mut Snapshot, old_key: &str, schema: &str, name: &str) {
    let Some(mut table) = working.tables.remove(old_key) else {
        return;
    };
    let old_schema = std::mem::replace(&mut table.schema, schema.to_string());
    let old_name = std::mem::replace(&mut table.name, name.to_string());
    for fk in table.foreign_keys.values_mut() {
        fk.table_from = name.to_string();
    }
    working.tables.insert(table.key(), table);

    for table in working.tables.values_mut() {
        for fk in table.foreign_keys.values_mut() {
            if fk.schema_to == old_schema && fk.table_to == old_name {
                fk.schema_to = schema.to_string();
                fk.table_to = name.to_string();
            }
        }
    }
}

/// Renames a column and every reference to it: indexes, keys and foreign
/// keys on the table itself and incoming foreign keys from other tables.
fn rename_column(working: &mut Snapshot, table_key: &str, from: &str, to: &str) {
    let rename = |columns: &mut Vec<String>| {
        for column in columns.iter_mut() {
            if *column == from {
                *column = to.to_string();
            }
        }
    };

    let Some(table) = working.tables.get_mut(table_key) else {
        return;
    };
    if let Some(mut column) = table.columns.remove(from) {
        column.name = to.to_string();
        table.columns.insert(to.to_string(), column);
    }
    for index in table.indexes.values_mut() {
        for part in &mut index.columns {
            if !part.is_expression && part.expression == from {
                part.expression = to.to_string();
            }
        }
    }
    for pk in table.composite_primary_keys.values_mut() {
        rename(&mut pk.columns);
    }
    for unique in table.unique_constraints.values_mut() {
        rename(&mut unique.columns);
    }
    for fk in table.foreign_keys.values_mut() {
        rename(&mut fk.columns_from);
    }
    let (schema, name) = (table.schema.clone(), table.name.clone());

    for other in working.tables.values_mut() {
        for fk in other.foreign_keys.values_mut() {
            if fk.schema_to == schema && fk.table_to == name {
                rename(&mut fk.columns_to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{RenameKind, ScriptedResolver};
    use crate::schema::{Dialect, ForeignKeyAction};

    fn users() -> Table {
        Table::new("users")
            .in_schema("public")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("name", "varchar(50)"))
    }

    fn posts() -> Table {
        Table::new("posts")
            .in_schema("public")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("author_id", "integer").not_null())
            .index(Index::new("posts_author_idx", &["author_id"]))
            .foreign_key(ForeignKey {
                name: "posts_author_fk".to_string(),
                table_from: String::new(),
                columns_from: vec!["author_id".to_string()],
                table_to: "users".to_string(),
                schema_to: "public".to_string(),
                columns_to: vec!["id".to_string()],
                on_update: None,
                on_delete: Some(ForeignKeyAction::Cascade),
            })
    }

    fn pg() -> Snapshot {
        Snapshot::empty(Dialect::Postgresql).schema("public")
    }

    async fn diff(prev: &Snapshot, cur: &Snapshot, resolver: &ScriptedResolver) -> SnapshotDiff {
        apply_snapshots_diff(prev, cur, &Resolvers::uniform(resolver))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_table_emits_indexes_and_references_after_create() {
        let prev = pg().table(users());
        let cur = pg().table(users()).table(posts());
        let out = diff(&prev, &cur, &ScriptedResolver::default()).await;

        assert_eq!(out.statements.len(), 3);
        assert!(matches!(out.statements[0], Statement::CreateTable { .. }));
        assert!(matches!(out.statements[1], Statement::CreateIndex { .. }));
        assert!(matches!(
            out.statements[2],
            Statement::CreateReference {
                table_is_new: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_table_rename_rekeys_incoming_foreign_keys() {
        let prev = pg().table(users()).table(posts());
        let mut renamed_posts = posts();
        renamed_posts
            .foreign_keys
            .values_mut()
            .for_each(|fk| fk.table_to = "accounts".to_string());
        let mut accounts = users();
        accounts.name = "accounts".to_string();
        let cur = pg().table(accounts).table(renamed_posts);

        let resolver =
            ScriptedResolver::default().rule(RenameKind::Table, "public.users", "public.accounts");
        let out = diff(&prev, &cur, &resolver).await;

        assert_eq!(
            out.statements,
            vec![Statement::RenameTable {
                schema: "public".to_string(),
                from: "users".to_string(),
                to: "accounts".to_string(),
            }]
        );
        assert_eq!(
            out.meta.tables.get("\"public\".\"users\"").map(String::as_str),
            Some("\"public\".\"accounts\"")
        );
    }

    #[tokio::test]
    async fn test_column_rename_rekeys_index() {
        let prev = pg().table(users()).table(posts());
        let mut cur_posts = posts();
        cur_posts.columns.remove("author_id");
        cur_posts = cur_posts.column(Column::new("writer_id", "integer").not_null());
        cur_posts.indexes.clear();
        cur_posts = cur_posts.index(Index::new("posts_author_idx", &["writer_id"]));
        cur_posts
            .foreign_keys
            .values_mut()
            .for_each(|fk| fk.columns_from = vec!["writer_id".to_string()]);
        let cur = pg().table(users()).table(cur_posts);

        let resolver = ScriptedResolver::default().rule(
            RenameKind::Column,
            "public.posts.author_id",
            "public.posts.writer_id",
        );
        let out = diff(&prev, &cur, &resolver).await;
        assert_eq!(out.statements.len(), 1);
        assert!(matches!(out.statements[0], Statement::RenameColumn { .. }));
    }

    #[tokio::test]
    async fn test_enum_value_added_before_existing() {
        let prev = pg().enum_type(Enum::new("public", "mood", &["sad", "ok"]));
        let cur = pg().enum_type(Enum::new("public", "mood", &["sad", "meh", "ok", "happy"]));
        let out = diff(&prev, &cur, &ScriptedResolver::default()).await;
        assert_eq!(
            out.statements,
            vec![
                Statement::AddEnumValue {
                    schema: "public".to_string(),
                    name: "mood".to_string(),
                    value: "meh".to_string(),
                    before: Some("ok".to_string()),
                },
                Statement::AddEnumValue {
                    schema: "public".to_string(),
                    name: "mood".to_string(),
                    value: "happy".to_string(),
                    before: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_enum_value_removed_rebuilds() {
        let table = Table::new("users")
            .in_schema("public")
            .column(Column::new("mood", "mood").enum_type("public"));
        let prev = pg()
            .enum_type(Enum::new("public", "mood", &["sad", "ok"]))
            .table(table.clone());
        let cur = pg()
            .enum_type(Enum::new("public", "mood", &["ok"]))
            .table(table);
        let out = diff(&prev, &cur, &ScriptedResolver::default()).await;
        match &out.statements[..] {
            [Statement::DropEnumValue {
                deleted_values,
                columns,
                ..
            }] => {
                assert_eq!(deleted_values, &vec!["sad".to_string()]);
                assert_eq!(columns.len(), 1);
            }
            other => panic!("unexpected statements: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_column_alterations() {
        let prev = pg().table(users());
        let cur = pg().table(
            Table::new("users")
                .in_schema("public")
                .column(Column::new("id", "serial").primary_key())
                .column(Column::new("name", "varchar(100)").not_null()),
        );
        let out = diff(&prev, &cur, &ScriptedResolver::default()).await;
        let changes: Vec<_> = out
            .statements
            .iter()
            .map(|s| match s {
                Statement::AlterColumn { change, .. } => change.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                AlterColumnChange::SetType {
                    from: "varchar(50)".to_string(),
                    to: "varchar(100)".to_string(),
                },
                AlterColumnChange::SetNotNull,
            ]
        );
    }

    #[tokio::test]
    async fn test_changed_check_is_dropped_and_recreated() {
        let prev = pg().table(users().check("name_check", "length(name) > 0"));
        let cur = pg().table(users().check("name_check", "length(name) > 1"));
        let out = diff(&prev, &cur, &ScriptedResolver::default()).await;
        assert_eq!(out.statements.len(), 2);
        assert!(matches!(out.statements[0], Statement::DropCheck { .. }));
        assert!(matches!(out.statements[1], Statement::CreateCheck { .. }));
    }

    #[tokio::test]
    async fn test_dialect_mismatch_rejected() {
        let prev = Snapshot::empty(Dialect::Sqlite);
        let cur = Snapshot::empty(Dialect::Mysql);
        let err = apply_snapshots_diff(&prev, &cur, &Resolvers::no_renames())
            .await
            .unwrap_err();
        assert!(matches!(err, DiffError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_schema_rename_moves_tables_without_churn() {
        let prev = Snapshot::empty(Dialect::Postgresql)
            .schema("app")
            .table(users().in_schema("app"));
        let cur = Snapshot::empty(Dialect::Postgresql)
            .schema("core")
            .table(users().in_schema("core"));
        let resolver = ScriptedResolver::default().rule(RenameKind::Schema, "app", "core");
        let out = diff(&prev, &cur, &resolver).await;
        assert_eq!(
            out.statements,
            vec![Statement::RenameSchema {
                from: "app".to_string(),
                to: "core".to_string(),
            }]
        );
    }
}
