use std::fmt;

use sea_orm::sea_query::{Alias, Condition, Expr, SimpleExpr};
use sea_orm::{QueryFilter, Value};
use serde_json::Value as JsonValue;

use super::scope::AssocScope;
use crate::fragment;
use crate::types::{WhereAssocError, WhereAssocResult};

type BlockFn = dyn Fn(AssocScope) -> AssocScope;

/// Expected value of one column in a mapping condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Eq(Value),
    In(Vec<Value>),
    Null,
}

impl ColumnValue {
    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ColumnValue::In(values.into_iter().map(Into::into).collect())
    }
}

impl<T> From<T> for ColumnValue
where
    Value: From<T>,
{
    fn from(v: T) -> Self {
        ColumnValue::Eq(Value::from(v))
    }
}

/// Filter applied to the rows of the last hop.
pub enum AssocCondition {
    None,
    Mapping(Vec<(String, ColumnValue)>),
    /// SQL text with `?` placeholders, values are bound.
    Fragment { sql: String, values: Vec<Value> },
    /// Trusted SQL text, used verbatim.
    Text(String),
    Expr(SimpleExpr),
    Condition(Condition),
    /// A scope declared on the leaf entity.
    Named(String),
    Block(Box<BlockFn>),
    Json(JsonValue),
}

impl AssocCondition {
    pub fn mapping<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ColumnValue>,
    {
        AssocCondition::Mapping(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn fragment<I, V>(sql: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        AssocCondition::Fragment {
            sql: sql.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// A fragment using `:name` placeholders.
    pub fn fragment_named<I, K, V>(sql: &str, binds: I) -> WhereAssocResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let binds: Vec<(String, Value)> = binds.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let (sql, values) = fragment::bind_named(sql, &binds)?;
        Ok(AssocCondition::Fragment { sql, values })
    }

    pub fn text(sql: impl Into<String>) -> Self {
        AssocCondition::Text(sql.into())
    }

    pub fn named(scope: impl Into<String>) -> Self {
        AssocCondition::Named(scope.into())
    }

    pub fn block<F>(f: F) -> Self
    where
        F: Fn(AssocScope) -> AssocScope + 'static,
    {
        AssocCondition::Block(Box::new(f))
    }

    pub fn json(value: JsonValue) -> Self {
        AssocCondition::Json(value)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssocCondition::None => "none",
            AssocCondition::Mapping(_) => "mapping",
            AssocCondition::Fragment { .. } => "fragment",
            AssocCondition::Text(_) => "text",
            AssocCondition::Expr(_) => "expr",
            AssocCondition::Condition(_) => "condition",
            AssocCondition::Named(_) => "named",
            AssocCondition::Block(_) => "block",
            AssocCondition::Json(_) => "json",
        }
    }

    /// Shape checks that do not need a scope. Runs before any SQL is built.
    pub fn validate(&self) -> WhereAssocResult<()> {
        match self {
            AssocCondition::Fragment { sql, values } => check_fragment(sql, values),
            AssocCondition::Json(value) => AssocCondition::from_json(value)?.validate(),
            _ => Ok(()),
        }
    }

    /// Dispatch a dynamic JSON value onto a typed condition.
    pub fn from_json(value: &JsonValue) -> WhereAssocResult<Self> {
        match value {
            JsonValue::Null => Ok(AssocCondition::None),
            JsonValue::String(sql) => Ok(AssocCondition::Text(sql.clone())),
            JsonValue::Object(map) => {
                let mut pairs = Vec::with_capacity(map.len());
                for (column, v) in map {
                    let expected = match v {
                        JsonValue::Null => ColumnValue::Null,
                        JsonValue::Array(items) => ColumnValue::In(
                            items
                                .iter()
                                .map(|item| json_scalar(item).ok_or_else(|| unsupported_json(item)))
                                .collect::<WhereAssocResult<_>>()?,
                        ),
                        other => ColumnValue::Eq(json_scalar(other).ok_or_else(|| unsupported_json(other))?),
                    };
                    pairs.push((column.clone(), expected));
                }
                Ok(AssocCondition::Mapping(pairs))
            }
            JsonValue::Array(items) => match items.split_first() {
                Some((JsonValue::String(sql), binds)) => {
                    let values = binds
                        .iter()
                        .map(|item| json_scalar(item).ok_or_else(|| unsupported_json(item)))
                        .collect::<WhereAssocResult<Vec<_>>>()?;
                    Ok(AssocCondition::Fragment {
                        sql: sql.clone(),
                        values,
                    })
                }
                _ => Err(unsupported_json(value)),
            },
            JsonValue::Bool(_) | JsonValue::Number(_) => Err(unsupported_json(value)),
        }
    }
}

fn check_fragment(sql: &str, values: &[Value]) -> WhereAssocResult<()> {
    let placeholders = fragment::count_placeholders(sql);
    if placeholders != values.len() {
        return Err(WhereAssocError::invalid_fragment(format!(
            "'{}' has {} placeholders but {} values",
            sql,
            placeholders,
            values.len()
        )));
    }
    Ok(())
}

fn json_scalar(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::Bool(b) => Some(Value::from(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::from)
            .or_else(|| n.as_u64().map(Value::from))
            .or_else(|| n.as_f64().map(Value::from)),
        JsonValue::String(s) => Some(Value::from(s.clone())),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn unsupported_json(value: &JsonValue) -> WhereAssocError {
    let kind = match value {
        JsonValue::Null => "json null",
        JsonValue::Bool(_) => "json boolean",
        JsonValue::Number(_) => "json number",
        JsonValue::String(_) => "json string",
        JsonValue::Array(_) => "json array",
        JsonValue::Object(_) => "json object",
    };
    WhereAssocError::unsupported_condition(format!("{}: {}", kind, value))
}

impl fmt::Debug for AssocCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssocCondition::None => f.write_str("None"),
            AssocCondition::Mapping(pairs) => f.debug_tuple("Mapping").field(pairs).finish(),
            AssocCondition::Fragment { sql, values } => f
                .debug_struct("Fragment")
                .field("sql", sql)
                .field("values", values)
                .finish(),
            AssocCondition::Text(sql) => f.debug_tuple("Text").field(sql).finish(),
            AssocCondition::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            AssocCondition::Condition(cond) => f.debug_tuple("Condition").field(cond).finish(),
            AssocCondition::Named(name) => f.debug_tuple("Named").field(name).finish(),
            AssocCondition::Block(_) => f.write_str("Block(..)"),
            AssocCondition::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl Default for AssocCondition {
    fn default() -> Self {
        AssocCondition::None
    }
}

impl From<()> for AssocCondition {
    fn from(_: ()) -> Self {
        AssocCondition::None
    }
}

impl From<&str> for AssocCondition {
    fn from(sql: &str) -> Self {
        AssocCondition::Text(sql.to_string())
    }
}

impl From<String> for AssocCondition {
    fn from(sql: String) -> Self {
        AssocCondition::Text(sql)
    }
}

impl From<SimpleExpr> for AssocCondition {
    fn from(expr: SimpleExpr) -> Self {
        AssocCondition::Expr(expr)
    }
}

impl From<Expr> for AssocCondition {
    fn from(expr: Expr) -> Self {
        AssocCondition::Expr(expr.into())
    }
}

impl From<Condition> for AssocCondition {
    fn from(cond: Condition) -> Self {
        AssocCondition::Condition(cond)
    }
}

impl From<JsonValue> for AssocCondition {
    fn from(value: JsonValue) -> Self {
        AssocCondition::Json(value)
    }
}

impl<T: Into<AssocCondition>> From<Option<T>> for AssocCondition {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Apply `condition` to the leaf scope and surface any error deferred inside it.
pub(crate) fn normalize(condition: &AssocCondition, scope: AssocScope) -> WhereAssocResult<AssocScope> {
    let scope = match condition {
        AssocCondition::None => scope,
        AssocCondition::Mapping(pairs) => {
            if pairs.is_empty() {
                scope
            } else {
                let cond = pairs.iter().fold(Condition::all(), |cond, (column, expected)| {
                    cond.add(mapping_expr(&scope, column, expected))
                });
                scope.filter(cond)
            }
        }
        AssocCondition::Fragment { sql, values } => {
            check_fragment(sql, values)?;
            scope.filter(Expr::cust_with_values(sql.as_str(), values.iter().cloned()))
        }
        AssocCondition::Text(sql) => {
            if sql.trim().is_empty() {
                scope
            } else {
                scope.filter(Expr::cust(sql.as_str()))
            }
        }
        AssocCondition::Expr(expr) => scope.filter(expr.clone()),
        AssocCondition::Condition(cond) => scope.filter(cond.clone()),
        AssocCondition::Named(name) => scope.apply_scope(name),
        AssocCondition::Block(block) => block(scope),
        AssocCondition::Json(value) => return normalize(&AssocCondition::from_json(value)?, scope),
    };
    scope.finish()
}

fn mapping_expr(scope: &AssocScope, column: &str, expected: &ColumnValue) -> SimpleExpr {
    let col = match column.split_once('.') {
        Some((table, column)) => Expr::col((Alias::new(table), Alias::new(column))),
        None => scope.col(column),
    };
    match expected {
        ColumnValue::Eq(v) => col.eq(v.clone()),
        ColumnValue::In(values) => col.is_in(values.iter().cloned()),
        ColumnValue::Null => col.is_null(),
    }
}
