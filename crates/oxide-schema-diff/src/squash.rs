//! Canonical flat-string encodings of nested schema entities.
//!
//! Indexes and constraints are compared during diffing as single strings so
//! that set operations over them are cheap and order-stable. Fields are
//! separated by `;`, list items by `,`, and index key parts use `:` for their
//! sub-fields. Those three characters (and `%`) are percent-escaped inside
//! values, which keeps every encoding lossless: `unsquash(squash(v)) == v`.
//! Absent optional fields encode as the empty string.

use std::collections::BTreeMap;

use crate::error::{DiffError, Result};
use crate::schema::{
    CheckConstraint, Column, ForeignKey, ForeignKeyAction, Index, IndexAlgorithm, IndexColumn,
    IndexLock, PrimaryKey, Table, UniqueConstraint,
};

const FIELD_SEPARATOR: char = ';';
const LIST_SEPARATOR: char = ',';
const PART_SEPARATOR: char = ':';

/// Entities with a canonical string encoding.
pub trait Squash: Sized {
    /// Entity kind used in error messages.
    const KIND: &'static str;

    /// Encodes the entity.
    fn squash(&self) -> String;

    /// Decodes an encoding produced by [`Squash::squash`].
    fn unsquash(value: &str) -> Result<Self>;
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            ',' => out.push_str("%2C"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(kind: &'static str, raw: &str, value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        let decoded = match code.as_str() {
            "25" => '%',
            "3B" => ';',
            "2C" => ',',
            "3A" => ':',
            _ => return Err(malformed(kind, raw, format!("invalid escape '%{code}'"))),
        };
        out.push(decoded);
    }
    Ok(out)
}

fn malformed(kind: &'static str, raw: &str, reason: impl Into<String>) -> DiffError {
    DiffError::MalformedSquash {
        kind,
        value: raw.to_string(),
        reason: reason.into(),
    }
}

fn split_fields<'a>(kind: &'static str, raw: &'a str, expected: usize) -> Result<Vec<&'a str>> {
    let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
    if fields.len() != expected {
        return Err(malformed(
            kind,
            raw,
            format!("expected {expected} fields, found {}", fields.len()),
        ));
    }
    Ok(fields)
}

fn squash_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| escape(item))
        .collect::<Vec<_>>()
        .join(&LIST_SEPARATOR.to_string())
}

fn unsquash_list(kind: &'static str, raw: &str, field: &str) -> Result<Vec<String>> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field
        .split(LIST_SEPARATOR)
        .map(|item| unescape(kind, raw, item))
        .collect()
}

fn squash_opt(value: Option<&str>) -> String {
    value.map(escape).unwrap_or_default()
}

fn unsquash_opt(kind: &'static str, raw: &str, field: &str) -> Result<Option<String>> {
    if field.is_empty() {
        Ok(None)
    } else {
        unescape(kind, raw, field).map(Some)
    }
}

fn squash_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn unsquash_bool(kind: &'static str, raw: &str, field: &str) -> Result<bool> {
    match field {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(malformed(kind, raw, format!("invalid flag '{other}'"))),
    }
}

fn squash_action(action: Option<ForeignKeyAction>) -> String {
    action
        .map(|a| a.to_sql().to_ascii_lowercase())
        .unwrap_or_default()
}

fn unsquash_action(kind: &'static str, raw: &str, field: &str) -> Result<Option<ForeignKeyAction>> {
    if field.is_empty() {
        return Ok(None);
    }
    ForeignKeyAction::parse(field)
        .map(Some)
        .ok_or_else(|| malformed(kind, raw, format!("invalid action '{field}'")))
}

fn squash_index_column(column: &IndexColumn) -> String {
    format!(
        "{}{PART_SEPARATOR}{}{PART_SEPARATOR}{}",
        if column.is_expression { "e" } else { "c" },
        if column.asc { "asc" } else { "desc" },
        escape(&column.expression)
    )
}

fn unsquash_index_column(raw: &str, token: &str) -> Result<IndexColumn> {
    let parts: Vec<&str> = token.split(PART_SEPARATOR).collect();
    let [kind, order, expression] = parts.as_slice() else {
        return Err(malformed(
            Index::KIND,
            raw,
            format!("index key part '{token}' has {} parts", parts.len()),
        ));
    };
    let is_expression = match *kind {
        "e" => true,
        "c" => false,
        other => return Err(malformed(Index::KIND, raw, format!("invalid key kind '{other}'"))),
    };
    let asc = match *order {
        "asc" => true,
        "desc" => false,
        other => return Err(malformed(Index::KIND, raw, format!("invalid order '{other}'"))),
    };
    Ok(IndexColumn {
        expression: unescape(Index::KIND, raw, expression)?,
        is_expression,
        asc,
    })
}

impl Squash for Index {
    const KIND: &'static str = "index";

    fn squash(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(squash_index_column)
            .collect::<Vec<_>>()
            .join(&LIST_SEPARATOR.to_string());
        [
            escape(&self.name),
            columns,
            squash_bool(self.is_unique).to_string(),
            squash_opt(self.method.as_deref()),
            squash_opt(self.where_clause.as_deref()),
            squash_bool(self.concurrently).to_string(),
            self.algorithm.map(|a| a.as_str().to_string()).unwrap_or_default(),
            self.lock.map(|l| l.as_str().to_string()).unwrap_or_default(),
        ]
        .join(&FIELD_SEPARATOR.to_string())
    }

    fn unsquash(value: &str) -> Result<Self> {
        let f = split_fields(Self::KIND, value, 8)?;
        let columns = if f[1].is_empty() {
            Vec::new()
        } else {
            f[1].split(LIST_SEPARATOR)
                .map(|token| unsquash_index_column(value, token))
                .collect::<Result<Vec<_>>>()?
        };
        let algorithm = match f[6] {
            "" => None,
            a => Some(
                IndexAlgorithm::parse(a)
                    .ok_or_else(|| malformed(Self::KIND, value, format!("invalid algorithm '{a}'")))?,
            ),
        };
        let lock = match f[7] {
            "" => None,
            l => Some(
                IndexLock::parse(l)
                    .ok_or_else(|| malformed(Self::KIND, value, format!("invalid lock '{l}'")))?,
            ),
        };
        Ok(Self {
            name: unescape(Self::KIND, value, f[0])?,
            columns,
            is_unique: unsquash_bool(Self::KIND, value, f[2])?,
            method: unsquash_opt(Self::KIND, value, f[3])?,
            where_clause: unsquash_opt(Self::KIND, value, f[4])?,
            concurrently: unsquash_bool(Self::KIND, value, f[5])?,
            algorithm,
            lock,
        })
    }
}

impl Squash for PrimaryKey {
    const KIND: &'static str = "primary key";

    fn squash(&self) -> String {
        format!("{};{}", escape(&self.name), squash_list(&self.columns))
    }

    fn unsquash(value: &str) -> Result<Self> {
        let f = split_fields(Self::KIND, value, 2)?;
        Ok(Self {
            name: unescape(Self::KIND, value, f[0])?,
            columns: unsquash_list(Self::KIND, value, f[1])?,
        })
    }
}

impl Squash for UniqueConstraint {
    const KIND: &'static str = "unique constraint";

    fn squash(&self) -> String {
        format!(
            "{};{};{}",
            escape(&self.name),
            squash_list(&self.columns),
            squash_bool(self.nulls_not_distinct)
        )
    }

    fn unsquash(value: &str) -> Result<Self> {
        let f = split_fields(Self::KIND, value, 3)?;
        Ok(Self {
            name: unescape(Self::KIND, value, f[0])?,
            columns: unsquash_list(Self::KIND, value, f[1])?,
            nulls_not_distinct: unsquash_bool(Self::KIND, value, f[2])?,
        })
    }
}

impl Squash for CheckConstraint {
    const KIND: &'static str = "check constraint";

    fn squash(&self) -> String {
        format!("{};{}", escape(&self.name), escape(&self.value))
    }

    fn unsquash(value: &str) -> Result<Self> {
        let f = split_fields(Self::KIND, value, 2)?;
        Ok(Self {
            name: unescape(Self::KIND, value, f[0])?,
            value: unescape(Self::KIND, value, f[1])?,
        })
    }
}

impl Squash for ForeignKey {
    const KIND: &'static str = "foreign key";

    fn squash(&self) -> String {
        [
            escape(&self.name),
            escape(&self.table_from),
            squash_list(&self.columns_from),
            escape(&self.table_to),
            escape(&self.schema_to),
            squash_list(&self.columns_to),
            squash_action(self.on_update),
            squash_action(self.on_delete),
        ]
        .join(&FIELD_SEPARATOR.to_string())
    }

    fn unsquash(value: &str) -> Result<Self> {
        let f = split_fields(Self::KIND, value, 8)?;
        Ok(Self {
            name: unescape(Self::KIND, value, f[0])?,
            table_from: unescape(Self::KIND, value, f[1])?,
            columns_from: unsquash_list(Self::KIND, value, f[2])?,
            table_to: unescape(Self::KIND, value, f[3])?,
            schema_to: unescape(Self::KIND, value, f[4])?,
            columns_to: unsquash_list(Self::KIND, value, f[5])?,
            on_update: unsquash_action(Self::KIND, value, f[6])?,
            on_delete: unsquash_action(Self::KIND, value, f[7])?,
        })
    }
}

/// A table whose nested structures are collapsed to canonical strings.
///
/// Only exists while diffing.
#[derive(Debug, Clone, PartialEq)]
pub struct SquashedTable {
    /// Table name.
    pub name: String,
    /// Owning schema.
    pub schema: String,
    /// Columns keyed by name.
    pub columns: BTreeMap<String, Column>,
    /// Squashed indexes keyed by name.
    pub indexes: BTreeMap<String, String>,
    /// Squashed foreign keys keyed by name.
    pub foreign_keys: BTreeMap<String, String>,
    /// Squashed composite primary keys keyed by name.
    pub composite_primary_keys: BTreeMap<String, String>,
    /// Squashed unique constraints keyed by name.
    pub unique_constraints: BTreeMap<String, String>,
    /// Squashed check constraints keyed by name.
    pub check_constraints: BTreeMap<String, String>,
}

fn squash_map<T: Squash>(items: &BTreeMap<String, T>) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(name, item)| (name.clone(), item.squash()))
        .collect()
}

fn unsquash_map<T: Squash>(items: &BTreeMap<String, String>) -> Result<BTreeMap<String, T>> {
    items
        .iter()
        .map(|(name, raw)| Ok((name.clone(), T::unsquash(raw)?)))
        .collect()
}

/// Collapses a table's nested structures.
#[must_use]
pub fn squash_table(table: &Table) -> SquashedTable {
    SquashedTable {
        name: table.name.clone(),
        schema: table.schema.clone(),
        columns: table.columns.clone(),
        indexes: squash_map(&table.indexes),
        foreign_keys: squash_map(&table.foreign_keys),
        composite_primary_keys: squash_map(&table.composite_primary_keys),
        unique_constraints: squash_map(&table.unique_constraints),
        check_constraints: squash_map(&table.check_constraints),
    }
}

impl SquashedTable {
    /// Restores the structured table.
    pub fn unsquash(&self) -> Result<Table> {
        Ok(Table {
            name: self.name.clone(),
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            indexes: unsquash_map(&self.indexes)?,
            foreign_keys: unsquash_map(&self.foreign_keys)?,
            composite_primary_keys: unsquash_map(&self.composite_primary_keys)?,
            unique_constraints: unsquash_map(&self.unique_constraints)?,
            check_constraints: unsquash_map(&self.check_constraints)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn tricky_index() -> Index {
        Index {
            name: "idx;weird,name".to_string(),
            columns: vec![
                IndexColumn::column("email"),
                IndexColumn::expression("coalesce(a, b)::text").desc(),
                IndexColumn::expression("100%").desc(),
            ],
            is_unique: true,
            method: Some("btree".to_string()),
            where_clause: Some("deleted_at IS NULL; -- x".to_string()),
            concurrently: true,
            algorithm: Some(IndexAlgorithm::Inplace),
            lock: Some(IndexLock::None),
        }
    }

    #[test]
    fn test_index_inverse_with_delimiters_in_values() {
        let index = tricky_index();
        let squashed = index.squash();
        assert_eq!(squashed.split(';').count(), 8);
        assert_eq!(Index::unsquash(&squashed).unwrap(), index);
    }

    #[test]
    fn test_index_absent_fields_encode_empty() {
        let index = Index::new("users_email_idx", &["email"]);
        assert_eq!(
            index.squash(),
            "users_email_idx;c:asc:email;false;;;false;;"
        );
        assert!(!index.squash().contains("null"));
        assert_eq!(Index::unsquash(&index.squash()).unwrap(), index);
    }

    #[test]
    fn test_primary_key_inverse() {
        let pk = PrimaryKey {
            name: "orders_pk".to_string(),
            columns: vec!["tenant_id".to_string(), "id".to_string()],
        };
        assert_eq!(pk.squash(), "orders_pk;tenant_id,id");
        assert_eq!(PrimaryKey::unsquash(&pk.squash()).unwrap(), pk);
    }

    #[test]
    fn test_unique_constraint_inverse() {
        let uc = UniqueConstraint {
            name: "users_email_unique".to_string(),
            columns: vec!["email".to_string()],
            nulls_not_distinct: true,
        };
        assert_eq!(UniqueConstraint::unsquash(&uc.squash()).unwrap(), uc);
    }

    #[test]
    fn test_check_constraint_inverse() {
        let check = CheckConstraint {
            name: "age_check".to_string(),
            value: "age > 0 AND age < 150, or; worse".to_string(),
        };
        assert_eq!(CheckConstraint::unsquash(&check.squash()).unwrap(), check);
    }

    #[test]
    fn test_foreign_key_inverse() {
        let fk = ForeignKey {
            name: "posts_author_fk".to_string(),
            table_from: "posts".to_string(),
            columns_from: vec!["author_id".to_string()],
            table_to: "users".to_string(),
            schema_to: "public".to_string(),
            columns_to: vec!["id".to_string()],
            on_update: None,
            on_delete: Some(ForeignKeyAction::SetNull),
        };
        let squashed = fk.squash();
        assert!(squashed.ends_with(";;set null"));
        assert_eq!(ForeignKey::unsquash(&squashed).unwrap(), fk);
    }

    #[test]
    fn test_wrong_field_count_fails_fast() {
        let err = PrimaryKey::unsquash("only_name").unwrap_err();
        match err {
            DiffError::MalformedSquash { kind, reason, .. } => {
                assert_eq!(kind, "primary key");
                assert!(reason.contains("expected 2 fields, found 1"));
            }
            other => panic!("Expected MalformedSquash, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_flag_rejected() {
        assert!(UniqueConstraint::unsquash("u;a;maybe").is_err());
        assert!(Index::unsquash("i;c:up:a;false;;;false;;").is_err());
        assert!(CheckConstraint::unsquash("c;bad%zz").is_err());
    }

    #[test]
    fn test_squashed_table_inverse() {
        let table = Table::new("orders")
            .in_schema("shop")
            .column(Column::new("tenant_id", "integer").not_null())
            .column(Column::new("id", "integer").not_null())
            .primary_key("orders_pk", &["tenant_id", "id"])
            .unique("orders_id_unique", &["id"])
            .check("orders_id_check", "id > 0")
            .index(tricky_index());

        let squashed = squash_table(&table);
        assert_eq!(squashed.composite_primary_keys["orders_pk"], "orders_pk;tenant_id,id");
        assert_eq!(squashed.unsquash().unwrap(), table);
    }
}
