use std::sync::Arc;

use sea_orm::sea_query::{Alias, Expr, IntoCondition, JoinType, Query, SelectStatement};
use sea_orm::QueryFilter;

use super::condition::AssocCondition;
use super::path::AssocPath;
use super::subquery::OuterContext;
use super::where_assoc::build_predicate;
use crate::config::WhereAssocOptions;
use crate::entity_metadata::SchemaRegistry;
use crate::types::{AssocRelation, ComparisonSpec, IntoCountOp, WhereAssocError, WhereAssocResult};

/// The `SELECT` of one hop, as seen by condition blocks and scopes.
///
/// Filters and joins added here stay inside the hop's subquery. Methods are
/// chainable and infallible; the first error is kept and reported when the
/// enclosing call finishes.
#[derive(Debug, Clone)]
pub struct AssocScope {
    registry: Arc<SchemaRegistry>,
    options: WhereAssocOptions,
    entity: String,
    alias: String,
    visible: Vec<String>,
    statement: SelectStatement,
    pending_error: Option<WhereAssocError>,
}

impl AssocScope {
    pub(crate) fn new(
        registry: Arc<SchemaRegistry>,
        options: WhereAssocOptions,
        entity: &str,
        table: &str,
        alias: &str,
        visible: Vec<String>,
    ) -> Self {
        let mut statement = Query::select();
        if alias == table {
            statement.from(Alias::new(table));
        } else {
            statement.from_as(Alias::new(table), Alias::new(alias));
        }
        Self {
            registry,
            options,
            entity: entity.to_string(),
            alias: alias.to_string(),
            visible,
            statement,
            pending_error: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Alias of this hop's table inside the subquery.
    pub fn table_alias(&self) -> &str {
        &self.alias
    }

    /// Every table name or alias that can be referenced from here.
    pub fn visible_aliases(&self) -> &[String] {
        &self.visible
    }

    pub fn col(&self, column: &str) -> Expr {
        Expr::col((Alias::new(self.alias.as_str()), Alias::new(column)))
    }

    pub fn error(&self) -> Option<&WhereAssocError> {
        self.pending_error.as_ref()
    }

    /// Apply a named scope declared on this hop's entity.
    pub fn apply_scope(self, name: &str) -> Self {
        let scope = self
            .registry
            .entity(&self.entity)
            .and_then(|meta| meta.scope(name))
            .cloned();
        match scope {
            Some(scope) => scope.apply(self),
            None => {
                let err = WhereAssocError::ScopeNotFound {
                    entity: self.entity.clone(),
                    scope: name.to_string(),
                };
                self.fail(err)
            }
        }
    }

    /// Join another table into this hop's subquery under `alias`.
    pub fn join<C>(mut self, join: JoinType, table: &str, alias: &str, on: C) -> Self
    where
        C: IntoCondition,
    {
        if self.visible.iter().any(|v| v == alias) {
            return self.fail(WhereAssocError::AmbiguousAlias {
                alias: alias.to_string(),
            });
        }
        self.visible.push(alias.to_string());
        self.push_join(join, table, alias, on)
    }

    pub fn inner_join<C: IntoCondition>(self, table: &str, alias: &str, on: C) -> Self {
        self.join(JoinType::InnerJoin, table, alias, on)
    }

    pub fn left_join<C: IntoCondition>(self, table: &str, alias: &str, on: C) -> Self {
        self.join(JoinType::LeftJoin, table, alias, on)
    }

    // Alias already reserved by the caller
    pub(crate) fn push_join<C>(mut self, join: JoinType, table: &str, alias: &str, on: C) -> Self
    where
        C: IntoCondition,
    {
        if alias == table {
            self.statement.join(join, Alias::new(table), on);
        } else {
            self.statement
                .join_as(join, Alias::new(table), Alias::new(alias), on);
        }
        self
    }

    pub fn where_assoc_exists<P, C>(self, path: P, condition: C) -> Self
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.nest(AssocRelation::Exists, path.into(), condition.into())
    }

    pub fn where_assoc_not_exists<P, C>(self, path: P, condition: C) -> Self
    where
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        self.nest(AssocRelation::NotExists, path.into(), condition.into())
    }

    /// Nested count filter, compared as `count <op> threshold`.
    pub fn where_assoc_count<O, P, C>(self, threshold: i64, op: O, path: P, condition: C) -> Self
    where
        O: IntoCountOp,
        P: Into<AssocPath>,
        C: Into<AssocCondition>,
    {
        match ComparisonSpec::new(threshold, op) {
            Ok(spec) => self.nest(AssocRelation::Count(spec), path.into(), condition.into()),
            Err(err) => self.fail(err),
        }
    }

    fn nest(self, relation: AssocRelation, path: AssocPath, condition: AssocCondition) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        let outer = self.outer_context();
        match build_predicate(&self.registry, &self.options, &outer, relation, &path, &condition) {
            Ok(predicate) => self.filter(predicate),
            Err(err) => self.fail(err),
        }
    }

    /// Record an error; only the first one is kept.
    pub fn fail(mut self, err: WhereAssocError) -> Self {
        if self.pending_error.is_none() {
            log::debug!("deferred error in scope of '{}': {}", self.entity, err);
            self.pending_error = Some(err);
        }
        self
    }

    pub(crate) fn outer_context(&self) -> OuterContext {
        OuterContext {
            entity: self.entity.clone(),
            alias: self.alias.clone(),
            visible: self.visible.clone(),
        }
    }

    pub(crate) fn finish(mut self) -> WhereAssocResult<Self> {
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub(crate) fn into_statement(self) -> SelectStatement {
        self.statement
    }
}

impl QueryFilter for AssocScope {
    type QueryStatement = SelectStatement;

    fn query(&mut self) -> &mut SelectStatement {
        &mut self.statement
    }
}
