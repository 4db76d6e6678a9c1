//! Rename resolution.
//!
//! When a category has both deleted and created entities, the diff cannot
//! tell a rename from a drop plus create on its own. It hands both lists to
//! a [`Resolver`], which may ask an operator, replay earlier decisions, or
//! apply a heuristic. The diff never guesses; it only checks that the
//! answer accounts for every candidate exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DiffError, Result};
use crate::schema::{qualified_key, Column, Enum, Index, Sequence, Table};
use crate::snapshot::SnapshotMeta;

/// The category (and, for nested entities, the owning table) a resolver
/// call is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveScope {
    /// Database schemas.
    Schemas,
    /// Enum types.
    Enums,
    /// Sequences.
    Sequences,
    /// Tables.
    Tables,
    /// Columns of one table (identified by its current key).
    Columns {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
    },
    /// Indexes of one table.
    Indexes {
        /// Table schema.
        schema: String,
        /// Table name.
        table: String,
    },
}

impl ResolveScope {
    /// The rename kind used by [`RenameRule`]s for this scope.
    #[must_use]
    pub fn kind(&self) -> RenameKind {
        match self {
            Self::Schemas => RenameKind::Schema,
            Self::Enums => RenameKind::Enum,
            Self::Sequences => RenameKind::Sequence,
            Self::Tables => RenameKind::Table,
            Self::Columns { .. } => RenameKind::Column,
            Self::Indexes { .. } => RenameKind::Index,
        }
    }

    /// Builds the cancellation error for this scope. Interactive resolvers
    /// return it when the operator gives up.
    #[must_use]
    pub fn abort(&self) -> DiffError {
        DiffError::Aborted {
            scope: self.to_string(),
        }
    }
}

impl fmt::Display for ResolveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schemas => f.write_str("schemas"),
            Self::Enums => f.write_str("enums"),
            Self::Sequences => f.write_str("sequences"),
            Self::Tables => f.write_str("tables"),
            Self::Columns { schema, table } => {
                write!(f, "columns of {}", qualified_key(schema, table))
            }
            Self::Indexes { schema, table } => {
                write!(f, "indexes of {}", qualified_key(schema, table))
            }
        }
    }
}

/// Entities a resolver can pair up.
pub trait Named {
    /// Display name.
    fn name(&self) -> &str;

    /// Stable key within `scope`: `schema.name` for top-level entities,
    /// `schema.table.name` for columns and indexes.
    fn key(&self, scope: &ResolveScope) -> String {
        match scope {
            ResolveScope::Columns { schema, table } | ResolveScope::Indexes { schema, table } => {
                format!("{}.{}", qualified_key(schema, table), self.name())
            }
            _ => self.name().to_string(),
        }
    }
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

impl Named for Enum {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, _scope: &ResolveScope) -> String {
        Enum::key(self)
    }
}

impl Named for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, _scope: &ResolveScope) -> String {
        Sequence::key(self)
    }
}

impl Named for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, _scope: &ResolveScope) -> String {
        Table::key(self)
    }
}

impl Named for Column {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Index {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A pair the resolver declared to be the same entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Rename<T> {
    /// Entity as it was in the previous snapshot.
    pub from: T,
    /// Entity as it is in the current snapshot.
    pub to: T,
}

/// Candidates handed to a resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverInput<T> {
    /// What is being resolved.
    pub scope: ResolveScope,
    /// Entities only present in the previous snapshot.
    pub deleted: Vec<T>,
    /// Entities only present in the current snapshot.
    pub created: Vec<T>,
}

/// A resolver's decision: renames plus the residual true deletes and
/// creates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverOutput<T> {
    /// Pairs treated as renames.
    pub renamed: Vec<Rename<T>>,
    /// Entities to drop.
    pub deleted: Vec<T>,
    /// Entities to create.
    pub created: Vec<T>,
}

impl<T> ResolverOutput<T> {
    /// Treats every candidate as a separate delete or create.
    #[must_use]
    pub fn unresolved(input: ResolverInput<T>) -> Self {
        Self {
            renamed: Vec::new(),
            deleted: input.deleted,
            created: input.created,
        }
    }
}

/// Decides which deleted/created pairs are renames.
///
/// Implementations may suspend indefinitely (for instance while waiting for
/// an operator). Returning [`ResolveScope::abort`]'s error cancels the whole
/// diff without producing statements.
#[async_trait]
pub trait Resolver<T: Send + Sync + 'static>: Send + Sync {
    /// Partitions the candidates.
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>>;
}

/// Never pairs anything: every candidate is a drop or a create.
///
/// This is the policy for non-interactive pushes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenames;

#[async_trait]
impl<T: Send + Sync + 'static> Resolver<T> for NoRenames {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        Ok(ResolverOutput::unresolved(input))
    }
}

/// Entity kinds a [`RenameRule`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenameKind {
    /// Schema rename.
    Schema,
    /// Enum rename or move.
    Enum,
    /// Sequence rename or move.
    Sequence,
    /// Table rename or move.
    Table,
    /// Column rename.
    Column,
    /// Index rename.
    Index,
}

impl RenameKind {
    /// Returns the lowercase kind name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Enum => "enum",
            Self::Sequence => "sequence",
            Self::Table => "table",
            Self::Column => "column",
            Self::Index => "index",
        }
    }

    /// Parses a lowercase kind name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "schema" => Some(Self::Schema),
            "enum" => Some(Self::Enum),
            "sequence" => Some(Self::Sequence),
            "table" => Some(Self::Table),
            "column" => Some(Self::Column),
            "index" => Some(Self::Index),
            _ => None,
        }
    }
}

/// One scripted rename decision, expressed with qualified keys.
///
/// Columns and indexes are keyed under the table's *current* identity:
/// `public.accounts.name` → `public.accounts.full_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    /// Kind of entity.
    pub kind: RenameKind,
    /// Key in the previous snapshot.
    pub from: String,
    /// Key in the current snapshot.
    pub to: String,
}

impl RenameRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(kind: RenameKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
        }
    }
}

impl FromStr for RenameRule {
    type Err = String;

    /// Parses `kind:from=to`, e.g. `table:public.users=public.accounts`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, pair) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<from>=<to>, got '{s}'"))?;
        let kind = RenameKind::parse(kind).ok_or_else(|| {
            format!("unknown rename kind '{kind}' (schema|enum|sequence|table|column|index)")
        })?;
        let (from, to) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected <from>=<to>, got '{pair}'"))?;
        if from.is_empty() || to.is_empty() {
            return Err(format!("empty rename key in '{s}'"));
        }
        Ok(Self::new(kind, from, to))
    }
}

/// Replays a fixed list of rename decisions. Anything not covered by a rule
/// is treated as a drop or create.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResolver {
    rules: Vec<RenameRule>,
}

impl ScriptedResolver {
    /// Creates a resolver from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<RenameRule>) -> Self {
        Self { rules }
    }

    /// Adds a rule.
    #[must_use]
    pub fn rule(mut self, kind: RenameKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rules.push(RenameRule::new(kind, from, to));
        self
    }

    /// Rebuilds the decisions recorded in a diff's `_meta`, so a re-run
    /// makes the same choices without asking again.
    #[must_use]
    pub fn from_meta(meta: &SnapshotMeta) -> Self {
        let mut rules = Vec::new();
        let sections = [
            (RenameKind::Schema, &meta.schemas),
            (RenameKind::Table, &meta.tables),
            (RenameKind::Column, &meta.columns),
        ];
        for (kind, entries) in sections {
            for (from, to) in entries {
                rules.push(RenameRule::new(kind, unquote_meta_key(from), unquote_meta_key(to)));
            }
        }
        Self { rules }
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn rules(&self) -> &[RenameRule] {
        &self.rules
    }
}

#[async_trait]
impl<T: Named + Send + Sync + 'static> Resolver<T> for ScriptedResolver {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        let kind = input.scope.kind();
        let scope = input.scope;
        let mut deleted: Vec<Option<T>> = input.deleted.into_iter().map(Some).collect();
        let mut created: Vec<Option<T>> = input.created.into_iter().map(Some).collect();
        let mut renamed = Vec::new();

        for rule in self.rules.iter().filter(|r| r.kind == kind) {
            let from = deleted
                .iter()
                .position(|d| d.as_ref().is_some_and(|d| d.key(&scope) == rule.from));
            let to = created
                .iter()
                .position(|c| c.as_ref().is_some_and(|c| c.key(&scope) == rule.to));
            if let (Some(from), Some(to)) = (from, to) {
                if let (Some(from), Some(to)) = (deleted[from].take(), created[to].take()) {
                    renamed.push(Rename { from, to });
                }
            }
        }

        Ok(ResolverOutput {
            renamed,
            deleted: deleted.into_iter().flatten().collect(),
            created: created.into_iter().flatten().collect(),
        })
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();
    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Name similarity in `[0.0, 1.0]`; 1.0 means identical.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// Opt-in heuristic: pairs a lone deleted candidate with a lone created
/// candidate when their names are similar enough. Any other shape of input
/// is left unresolved.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityResolver {
    threshold: f64,
}

impl SimilarityResolver {
    /// Creates the resolver. `threshold` is clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimilarityResolver {
    fn default() -> Self {
        Self::new(0.7)
    }
}

#[async_trait]
impl<T: Named + Send + Sync + 'static> Resolver<T> for SimilarityResolver {
    async fn resolve(&self, input: ResolverInput<T>) -> Result<ResolverOutput<T>> {
        if input.deleted.len() != 1 || input.created.len() != 1 {
            return Ok(ResolverOutput::unresolved(input));
        }
        let score = similarity(input.deleted[0].name(), input.created[0].name());
        if score < self.threshold {
            debug!(scope = %input.scope, score, "Names not similar enough to pair");
            return Ok(ResolverOutput::unresolved(input));
        }
        let mut deleted = input.deleted;
        let mut created = input.created;
        match (deleted.pop(), created.pop()) {
            (Some(from), Some(to)) => Ok(ResolverOutput {
                renamed: vec![Rename { from, to }],
                deleted,
                created,
            }),
            _ => Ok(ResolverOutput {
                renamed: Vec::new(),
                deleted,
                created,
            }),
        }
    }
}

/// One resolver per category.
#[derive(Clone, Copy)]
pub struct Resolvers<'a> {
    /// Schemas.
    pub schemas: &'a dyn Resolver<String>,
    /// Enums.
    pub enums: &'a dyn Resolver<Enum>,
    /// Sequences.
    pub sequences: &'a dyn Resolver<Sequence>,
    /// Tables.
    pub tables: &'a dyn Resolver<Table>,
    /// Columns.
    pub columns: &'a dyn Resolver<Column>,
    /// Indexes.
    pub indexes: &'a dyn Resolver<Index>,
}

static NO_RENAMES: NoRenames = NoRenames;

impl<'a> Resolvers<'a> {
    /// Uses the same resolver for every category.
    #[must_use]
    pub fn uniform<R>(resolver: &'a R) -> Self
    where
        R: Resolver<String>
            + Resolver<Enum>
            + Resolver<Sequence>
            + Resolver<Table>
            + Resolver<Column>
            + Resolver<Index>,
    {
        Self {
            schemas: resolver,
            enums: resolver,
            sequences: resolver,
            tables: resolver,
            columns: resolver,
            indexes: resolver,
        }
    }
}

impl Resolvers<'static> {
    /// Treats every change as drop plus create.
    #[must_use]
    pub fn no_renames() -> Self {
        Self::uniform(&NO_RENAMES)
    }
}

impl fmt::Debug for Resolvers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}

/// Runs `resolver` over the candidates and checks its answer.
///
/// The resolver is only consulted when both lists are non-empty; otherwise
/// there is nothing ambiguous to decide.
pub(crate) async fn resolve_candidates<T>(
    resolver: &dyn Resolver<T>,
    scope: ResolveScope,
    deleted: Vec<T>,
    created: Vec<T>,
) -> Result<ResolverOutput<T>>
where
    T: Named + Send + Sync + 'static,
{
    debug!(
        scope = %scope,
        deleted = deleted.len(),
        created = created.len(),
        "Matched entities"
    );
    let input = ResolverInput {
        scope: scope.clone(),
        deleted,
        created,
    };
    if input.deleted.is_empty() || input.created.is_empty() {
        return Ok(ResolverOutput::unresolved(input));
    }

    let deleted_keys = counts(input.deleted.iter().map(|d| d.key(&scope)));
    let created_keys = counts(input.created.iter().map(|c| c.key(&scope)));

    let output = resolver.resolve(input).await?;
    check_partition(&scope, &deleted_keys, &created_keys, &output)?;

    for rename in &output.renamed {
        info!(
            scope = %scope,
            from = %rename.from.key(&scope),
            to = %rename.to.key(&scope),
            "Resolved rename"
        );
    }
    Ok(output)
}

fn counts(keys: impl Iterator<Item = String>) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for key in keys {
        *out.entry(key).or_insert(0) += 1;
    }
    out
}

fn check_partition<T: Named>(
    scope: &ResolveScope,
    deleted: &BTreeMap<String, usize>,
    created: &BTreeMap<String, usize>,
    output: &ResolverOutput<T>,
) -> Result<()> {
    let returned_deleted = counts(
        output
            .renamed
            .iter()
            .map(|r| r.from.key(scope))
            .chain(output.deleted.iter().map(|d| d.key(scope))),
    );
    let returned_created = counts(
        output
            .renamed
            .iter()
            .map(|r| r.to.key(scope))
            .chain(output.created.iter().map(|c| c.key(scope))),
    );

    for (side, expected, returned) in [
        ("deleted", deleted, &returned_deleted),
        ("created", created, &returned_created),
    ] {
        if expected != returned {
            return Err(DiffError::ResolverContract {
                scope: scope.to_string(),
                message: format!(
                    "{side} candidates {:?} were answered with {:?}",
                    expected.keys().collect::<Vec<_>>(),
                    returned.keys().collect::<Vec<_>>()
                ),
            });
        }
        if let Some((key, _)) = returned.iter().find(|(_, n)| **n > 1) {
            return Err(DiffError::ResolverContract {
                scope: scope.to_string(),
                message: format!("{side} candidate '{key}' was used more than once"),
            });
        }
    }
    Ok(())
}

/// Quotes key parts the way `_meta` records them: `"public"."users"`.
/// Empty parts (the default schema) are skipped.
#[must_use]
pub fn meta_key(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(".")
}

fn unquote_meta_key(key: &str) -> String {
    key.trim_matches('"').split("\".\"").collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns_scope() -> ResolveScope {
        ResolveScope::Columns {
            schema: "public".to_string(),
            table: "users".to_string(),
        }
    }

    struct Greedy;

    #[async_trait]
    impl Resolver<Column> for Greedy {
        async fn resolve(&self, input: ResolverInput<Column>) -> Result<ResolverOutput<Column>> {
            // Pairs the first deleted column twice.
            let from = input.deleted[0].clone();
            Ok(ResolverOutput {
                renamed: input
                    .created
                    .iter()
                    .map(|to| Rename {
                        from: from.clone(),
                        to: to.clone(),
                    })
                    .collect(),
                deleted: Vec::new(),
                created: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_no_renames_leaves_everything_unresolved() {
        let out = resolve_candidates::<Column>(
            &NoRenames,
            columns_scope(),
            vec![Column::new("name", "text")],
            vec![Column::new("full_name", "text")],
        )
        .await
        .unwrap();
        assert!(out.renamed.is_empty());
        assert_eq!(out.deleted.len(), 1);
        assert_eq!(out.created.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_column_rename() {
        let resolver = ScriptedResolver::default().rule(
            RenameKind::Column,
            "public.users.name",
            "public.users.full_name",
        );
        let out = resolve_candidates::<Column>(
            &resolver,
            columns_scope(),
            vec![Column::new("name", "text"), Column::new("age", "int")],
            vec![Column::new("full_name", "text")],
        )
        .await
        .unwrap();
        assert_eq!(out.renamed.len(), 1);
        assert_eq!(out.renamed[0].from.name, "name");
        assert_eq!(out.renamed[0].to.name, "full_name");
        assert_eq!(out.deleted[0].name, "age");
        assert!(out.created.is_empty());
    }

    #[tokio::test]
    async fn test_contract_violation_detected() {
        let err = resolve_candidates::<Column>(
            &Greedy,
            columns_scope(),
            vec![Column::new("a", "text"), Column::new("b", "text")],
            vec![Column::new("c", "text"), Column::new("d", "text")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DiffError::ResolverContract { .. }));
    }

    #[tokio::test]
    async fn test_similarity_pairs_lone_candidates_only() {
        let resolver = SimilarityResolver::new(0.6);
        let out = resolve_candidates::<Table>(
            &resolver,
            ResolveScope::Tables,
            vec![Table::new("user")],
            vec![Table::new("users")],
        )
        .await
        .unwrap();
        assert_eq!(out.renamed.len(), 1);

        let out = resolve_candidates::<Table>(
            &resolver,
            ResolveScope::Tables,
            vec![Table::new("user"), Table::new("post")],
            vec![Table::new("users")],
        )
        .await
        .unwrap();
        assert!(out.renamed.is_empty());
    }

    #[test]
    fn test_similarity_scores() {
        assert!((similarity("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        let s = similarity("name", "full_name");
        assert!(s > 0.4 && s < 0.5, "sim={s}");
    }

    #[test]
    fn test_rename_rule_parse() {
        let rule: RenameRule = "table:public.users=public.accounts".parse().unwrap();
        assert_eq!(rule.kind, RenameKind::Table);
        assert_eq!(rule.from, "public.users");
        assert_eq!(rule.to, "public.accounts");

        assert!("users=accounts".parse::<RenameRule>().is_err());
        assert!("view:a=b".parse::<RenameRule>().is_err());
        assert!("table:a=".parse::<RenameRule>().is_err());
    }

    #[test]
    fn test_from_meta_unquotes_keys() {
        let mut meta = SnapshotMeta::default();
        meta.tables.insert(
            meta_key(&["public", "users"]),
            meta_key(&["public", "accounts"]),
        );
        meta.columns.insert(
            meta_key(&["", "t", "a"]),
            meta_key(&["", "t", "b"]),
        );
        let resolver = ScriptedResolver::from_meta(&meta);
        assert!(resolver
            .rules()
            .contains(&RenameRule::new(RenameKind::Table, "public.users", "public.accounts")));
        assert!(resolver
            .rules()
            .contains(&RenameRule::new(RenameKind::Column, "t.a", "t.b")));
    }

    #[test]
    fn test_abort_is_cancellation() {
        assert!(ResolveScope::Tables.abort().is_cancellation());
        assert_eq!(
            columns_scope().to_string(),
            "columns of public.users"
        );
    }
}
