use std::sync::Arc;

use sea_orm::sea_query::Condition;
use sea_orm::{EntityTrait, QueryFilter, Select};

use super::compare;
use super::condition::AssocCondition;
use super::path::{resolve_expanded, AssocPath};
use super::subquery::{synthesize, OuterContext};
use crate::config::{default_options, WhereAssocOptions};
use crate::entity_metadata::{schema, SchemaRegistry};
use crate::types::{AssocRelation, ComparisonSpec, IntoCountOp, WhereAssocError, WhereAssocResult};

/// Resolve, validate, synthesize and compare. Nothing is merged into any
/// query here, so an error leaves the caller untouched.
pub(crate) fn build_predicate(
    registry: &Arc<SchemaRegistry>,
    options: &WhereAssocOptions,
    outer: &OuterContext,
    relation: AssocRelation,
    path: &AssocPath,
    condition: &AssocCondition,
) -> WhereAssocResult<Condition> {
    let paths = resolve_expanded(registry.as_ref(), &outer.entity, path, options)?;
    condition.validate()?;
    let nodes = paths
        .iter()
        .map(|resolved| synthesize(registry, options, outer, resolved, condition))
        .collect::<WhereAssocResult<Vec<_>>>()?;
    log::debug!(
        "where_assoc {} on {} via '{}' ({} condition, {} branch(es))",
        relation,
        outer.entity,
        path,
        condition.kind(),
        nodes.len()
    );
    Ok(compare::build(relation, nodes))
}

/// An explicit registry plus options.
///
/// The extension traits use the installed registry and the process default
/// options; use this when either has to differ.
#[derive(Debug, Clone)]
pub struct WhereAssoc {
    registry: Arc<SchemaRegistry>,
    options: WhereAssocOptions,
}

impl WhereAssoc {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            options: default_options(),
        }
    }

    /// Context over the installed registry.
    pub fn global() -> WhereAssocResult<Self> {
        Ok(Self::new(schema()?))
    }

    pub fn with_options(mut self, options: WhereAssocOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &WhereAssocOptions {
        &self.options
    }

    /// Bare EXISTS predicate over rows of `entity`, for use inside `Condition::any()`.
    pub fn assoc_exists_sql<P, C>(&self, entity: &str, path: P, condition: C) -> WhereAssocResult<Condition>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.predicate_for(entity, AssocRelation::Exists, path.into(), condition.into())
    }

    pub fn assoc_not_exists_sql<P, C>(&self, entity: &str, path: P, condition: C) -> WhereAssocResult<Condition>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.predicate_for(entity, AssocRelation::NotExists, path.into(), condition.into())
    }

    pub fn compare_assoc_count_sql<O, P, C>(
        &self,
        entity: &str,
        threshold: i64,
        op: O,
        path: P,
        condition: C,
    ) -> WhereAssocResult<Condition>
    where
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        let spec = ComparisonSpec::new(threshold, op)?;
        self.predicate_for(entity, AssocRelation::Count(spec), path.into(), condition.into())
    }

    pub fn where_assoc_exists<E, P, C>(&self, query: Select<E>, path: P, condition: C) -> WhereAssocResult<Select<E>>
    where
        E: EntityTrait,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.apply(query, AssocRelation::Exists, path.into(), condition.into())
    }

    pub fn where_assoc_not_exists<E, P, C>(
        &self,
        query: Select<E>,
        path: P,
        condition: C,
    ) -> WhereAssocResult<Select<E>>
    where
        E: EntityTrait,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.apply(query, AssocRelation::NotExists, path.into(), condition.into())
    }

    /// Keep rows whose association count satisfies `count <op> threshold`.
    ///
    /// The count is the left operand: `(50, "<=")` keeps rows with at most 50
    /// associated records, `(50, ">=")` those with at least 50.
    pub fn where_assoc_count<E, O, P, C>(
        &self,
        query: Select<E>,
        threshold: i64,
        op: O,
        path: P,
        condition: C,
    ) -> WhereAssocResult<Select<E>>
    where
        E: EntityTrait,
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        let spec = ComparisonSpec::new(threshold, op)?;
        self.apply(query, AssocRelation::Count(spec), path.into(), condition.into())
    }

    fn predicate_for(
        &self,
        entity: &str,
        relation: AssocRelation,
        path: AssocPath,
        condition: AssocCondition,
    ) -> WhereAssocResult<Condition> {
        let meta = self
            .registry
            .entity(entity)
            .ok_or_else(|| WhereAssocError::UnknownEntity {
                entity: entity.to_string(),
            })?;
        let outer = OuterContext::for_entity(meta);
        build_predicate(&self.registry, &self.options, &outer, relation, &path, &condition)
    }

    fn apply<E: EntityTrait>(
        &self,
        query: Select<E>,
        relation: AssocRelation,
        path: AssocPath,
        condition: AssocCondition,
    ) -> WhereAssocResult<Select<E>> {
        let meta = self.registry.entity_for::<E>()?;
        let outer = OuterContext::for_entity(meta);
        let predicate = build_predicate(&self.registry, &self.options, &outer, relation, &path, &condition)?;
        Ok(query.filter(predicate))
    }
}

/// Association filters on `Select<E>`, backed by the installed registry.
pub trait WhereAssocExt: Sized {
    fn where_assoc_exists<P, C>(self, path: P, condition: C) -> WhereAssocResult<Self>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>;

    fn where_assoc_not_exists<P, C>(self, path: P, condition: C) -> WhereAssocResult<Self>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>;

    /// Compares as `count <op> threshold`, so `(1, ">=")` means "has any".
    fn where_assoc_count<O, P, C>(self, threshold: i64, op: O, path: P, condition: C) -> WhereAssocResult<Self>
    where
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>;
}

impl<E: EntityTrait> WhereAssocExt for Select<E> {
    fn where_assoc_exists<P, C>(self, path: P, condition: C) -> WhereAssocResult<Self>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        WhereAssoc::global()?.where_assoc_exists(self, path, condition)
    }

    fn where_assoc_not_exists<P, C>(self, path: P, condition: C) -> WhereAssocResult<Self>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        WhereAssoc::global()?.where_assoc_not_exists(self, path, condition)
    }

    fn where_assoc_count<O, P, C>(self, threshold: i64, op: O, path: P, condition: C) -> WhereAssocResult<Self>
    where
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        // Operator and threshold are checked before the registry is consulted
        let spec = ComparisonSpec::new(threshold, op)?;
        WhereAssoc::global()?.where_assoc_count(self, spec.threshold(), spec.op(), path, condition)
    }
}

/// The same filters as associated functions on entity types,
/// e.g. `post::Entity::where_assoc_exists("comments", ())`.
pub trait WhereAssocEntityExt: EntityTrait {
    fn where_assoc_exists<P, C>(path: P, condition: C) -> WhereAssocResult<Select<Self>>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        Self::find().where_assoc_exists(path, condition)
    }

    fn where_assoc_not_exists<P, C>(path: P, condition: C) -> WhereAssocResult<Select<Self>>
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        Self::find().where_assoc_not_exists(path, condition)
    }

    /// See [`WhereAssoc::where_assoc_count`] for the operand order.
    fn where_assoc_count<O, P, C>(threshold: i64, op: O, path: P, condition: C) -> WhereAssocResult<Select<Self>>
    where
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        Self::find().where_assoc_count(threshold, op, path, condition)
    }
}

impl<E: EntityTrait> WhereAssocEntityExt for E {}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{Alias, Expr, Query, SqliteQueryBuilder};

    fn context() -> WhereAssoc {
        let registry = SchemaRegistry::builder()
            .table("User", "users", &["id"], |e| {
                e.has_many("posts", "Post", "author_id")
                    .scope("admins", |s| {
                        let admin = s.col("is_admin");
                        s.filter(admin.eq(true))
                    })
            })
            .table("Post", "posts", &["id"], |e| {
                e.belongs_to("author", "User", "author_id")
                    .has_many("comments", "Comment", "post_id")
            })
            .table("Comment", "comments", &["id"], |e| {
                e.belongs_to("post", "Post", "post_id")
                    .belongs_to("author", "User", "author_id")
            })
            .build()
            .unwrap();
        WhereAssoc::new(Arc::new(registry))
    }

    fn render(cond: Condition) -> String {
        Query::select()
            .expr(Expr::cust("1"))
            .from(Alias::new("posts"))
            .cond_where(cond)
            .to_string(SqliteQueryBuilder)
    }

    #[test]
    fn count_threshold_shapes() {
        let ctx = context();
        let sql = render(ctx.compare_assoc_count_sql("Post", 1, ">=", "comments", ()).unwrap());
        assert!(sql.contains("EXISTS"), "{}", sql);
        assert!(!sql.contains("COUNT"), "{}", sql);

        let sql = render(ctx.compare_assoc_count_sql("Post", 3, ">=", "comments", ()).unwrap());
        assert!(sql.contains("COUNT(*)"), "{}", sql);
        assert!(sql.contains(">= 3"), "{}", sql);

        let sql = render(ctx.compare_assoc_count_sql("Post", 0, "=", "comments", ()).unwrap());
        assert!(sql.contains("NOT"), "{}", sql);
    }

    #[test]
    fn nested_call_inside_block_correlates_to_the_hop() {
        let ctx = context();
        let cond = AssocCondition::block(|s| s.where_assoc_exists("author", AssocCondition::named("admins")));
        let sql = render(ctx.assoc_exists_sql("Post", "comments", cond).unwrap());
        assert!(sql.contains(r#""users"."id" = "comments"."author_id""#), "{}", sql);
        assert!(sql.contains(r#""users"."is_admin""#), "{}", sql);
    }

    #[test]
    fn errors_from_blocks_surface() {
        let ctx = context();
        let cond = AssocCondition::block(|s| s.where_assoc_exists("nope", ()));
        let err = ctx.assoc_exists_sql("Post", "comments", cond).unwrap_err();
        assert_eq!(err, WhereAssocError::association_not_found("Comment", "nope"));

        let err = ctx
            .assoc_exists_sql("Post", "author", AssocCondition::named("missing"))
            .unwrap_err();
        assert!(matches!(err, WhereAssocError::ScopeNotFound { .. }));
    }

    #[test]
    fn comparison_is_checked_before_the_path() {
        let ctx = context();
        let err = ctx
            .compare_assoc_count_sql("Post", -1, ">=", "nope", ())
            .unwrap_err();
        assert!(matches!(err, WhereAssocError::InvalidComparison { .. }));

        let err = ctx.assoc_exists_sql("Nope", "comments", ()).unwrap_err();
        assert!(matches!(err, WhereAssocError::UnknownEntity { .. }));
    }
}
