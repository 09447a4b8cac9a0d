use std::sync::Arc;

use sea_orm::sea_query::{
    Alias, Asterisk, Condition, Expr, Func, JoinType, SelectStatement, SimpleExpr, SubQueryStatement,
};

use super::condition::{normalize, AssocCondition};
use super::path::{AssociationHop, PolymorphicSide, ResolvedPath};
use super::scope::AssocScope;
use crate::config::WhereAssocOptions;
use crate::entity_metadata::{EntityMetadata, SchemaRegistry};
use crate::types::{WhereAssocError, WhereAssocResult};

/// The row a predicate is correlated against, plus every name already in use.
#[derive(Debug, Clone)]
pub(crate) struct OuterContext {
    pub entity: String,
    pub alias: String,
    pub visible: Vec<String>,
}

impl OuterContext {
    pub(crate) fn for_entity(meta: &EntityMetadata) -> Self {
        Self {
            entity: meta.name.clone(),
            alias: meta.table_name.clone(),
            visible: vec![meta.table_name.clone()],
        }
    }
}

/// One correlated subquery per hop, outermost first.
#[derive(Debug)]
pub struct SubqueryNode {
    hop: AssociationHop,
    alias: String,
    join_alias: Option<String>,
    correlation: Condition,
    scope: AssocScope,
    inner: Option<Box<SubqueryNode>>,
}

impl SubqueryNode {
    pub fn hop(&self) -> &AssociationHop {
        &self.hop
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn join_alias(&self) -> Option<&str> {
        self.join_alias.as_deref()
    }

    pub fn inner(&self) -> Option<&SubqueryNode> {
        self.inner.as_deref()
    }

    /// `SELECT 1 FROM ... WHERE <correlation> AND EXISTS(<inner>)`
    pub fn exists_statement(self) -> SelectStatement {
        let SubqueryNode {
            correlation,
            scope,
            inner,
            ..
        } = self;
        let mut statement = scope.into_statement();
        statement.expr(Expr::cust("1")).cond_where(correlation);
        if let Some(inner) = inner {
            statement.and_where(Expr::exists(inner.exists_statement()));
        }
        statement
    }

    /// `SELECT COUNT(*)` at the leaf, `SELECT SUM((<inner>))` above it.
    pub fn count_statement(self) -> SelectStatement {
        let SubqueryNode {
            correlation,
            scope,
            inner,
            ..
        } = self;
        let mut statement = scope.into_statement();
        match inner {
            None => statement.expr(Func::count(Expr::col(Asterisk))),
            Some(inner) => statement.expr(Func::sum(scalar(inner.count_statement()))),
        };
        statement.cond_where(correlation);
        statement
    }

    /// Scalar count of matching leaf rows, never NULL.
    pub fn count_expr(self) -> SimpleExpr {
        let nested = self.inner.is_some();
        let count = scalar(self.count_statement());
        if nested {
            Func::coalesce([count, SimpleExpr::from(0i64)]).into()
        } else {
            count
        }
    }
}

fn scalar(statement: SelectStatement) -> SimpleExpr {
    SimpleExpr::SubQuery(None, Box::new(SubQueryStatement::SelectStatement(statement)))
}

/// Keep the bare table name unless it is already visible, otherwise
/// `<table>_<n>` with `n` the number of visible names.
pub(crate) fn allocate_alias(table: &str, visible: &[String]) -> WhereAssocResult<String> {
    let alias = if visible.iter().any(|v| v == table) {
        format!("{}_{}", table, visible.len())
    } else {
        table.to_string()
    };
    if visible.iter().any(|v| *v == alias) {
        return Err(WhereAssocError::AmbiguousAlias { alias });
    }
    log::trace!("alias '{}' for table '{}'", alias, table);
    Ok(alias)
}

/// Build the subquery tree for one resolved path.
pub(crate) fn synthesize(
    registry: &Arc<SchemaRegistry>,
    options: &WhereAssocOptions,
    outer: &OuterContext,
    path: &ResolvedPath,
    condition: &AssocCondition,
) -> WhereAssocResult<SubqueryNode> {
    let hops = path.hops();
    if hops.is_empty() {
        return Err(WhereAssocError::EmptyPath);
    }

    // Aliases are handed out outermost first
    let mut visible = outer.visible.clone();
    let mut aliases: Vec<(String, Option<String>, usize)> = Vec::with_capacity(hops.len());
    for hop in hops {
        let alias = allocate_alias(&hop.target_table, &visible)?;
        visible.push(alias.clone());
        let join_alias = match &hop.join_table {
            Some(join) => {
                let join_alias = allocate_alias(&join.table, &visible)?;
                visible.push(join_alias.clone());
                Some(join_alias)
            }
            None => None,
        };
        aliases.push((alias, join_alias, visible.len()));
    }

    let leaf = hops.len() - 1;
    let mut inner: Option<Box<SubqueryNode>> = None;
    for (index, hop) in hops.iter().enumerate().rev() {
        let (alias, join_alias, visible_len) = aliases[index].clone();
        let outer_alias = if index == 0 {
            outer.alias.as_str()
        } else {
            aliases[index - 1].0.as_str()
        };

        let mut scope = AssocScope::new(
            registry.clone(),
            options.clone(),
            &hop.target_entity,
            &hop.target_table,
            &alias,
            visible[..visible_len].to_vec(),
        );
        if let (Some(join), Some(join_alias)) = (&hop.join_table, join_alias.as_deref()) {
            let on = join
                .target_columns
                .iter()
                .zip(&hop.target_keys)
                .fold(Condition::all(), |cond, (join_col, target_key)| {
                    let target_col = (Alias::new(alias.as_str()), Alias::new(target_key.as_str()));
                    cond.add(column(join_alias, join_col).equals(target_col))
                });
            scope = scope.push_join(JoinType::InnerJoin, &join.table, join_alias, on);
        }
        if let Some(assoc_scope) = hop.scope.as_ref().filter(|_| !options.ignore_association_scopes) {
            scope = assoc_scope.apply(scope);
        }
        let scope = if index == leaf {
            normalize(condition, scope)?
        } else {
            scope.finish()?
        };

        let correlation = correlate(hop, &alias, join_alias.as_deref(), outer_alias);
        inner = Some(Box::new(SubqueryNode {
            hop: hop.clone(),
            alias,
            join_alias,
            correlation,
            scope,
            inner: inner.take(),
        }));
    }

    inner.map(|node| *node).ok_or(WhereAssocError::EmptyPath)
}

fn column(table: &str, name: &str) -> Expr {
    Expr::col((Alias::new(table), Alias::new(name)))
}

fn correlate(hop: &AssociationHop, alias: &str, join_alias: Option<&str>, outer_alias: &str) -> Condition {
    let outer_col = |key: &String| (Alias::new(outer_alias), Alias::new(key.as_str()));
    let mut cond = match (&hop.join_table, join_alias) {
        (Some(join), Some(join_alias)) => join
            .source_columns
            .iter()
            .zip(&hop.source_keys)
            .fold(Condition::all(), |cond, (join_col, source_key)| {
                cond.add(column(join_alias, join_col).equals(outer_col(source_key)))
            }),
        _ => hop
            .target_keys
            .iter()
            .zip(&hop.source_keys)
            .fold(Condition::all(), |cond, (target_key, source_key)| {
                cond.add(column(alias, target_key).equals(outer_col(source_key)))
            }),
    };
    if let Some(poly) = &hop.polymorphic {
        let table = match poly.side {
            PolymorphicSide::Source => outer_alias,
            PolymorphicSide::Target => alias,
        };
        cond = cond.add(column(table, &poly.column).eq(poly.type_name.as_str()));
    }
    cond
}
