use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Crate-wide result alias
pub type WhereAssocResult<T> = std::result::Result<T, WhereAssocError>;

/// Typed errors raised while building association predicates.
///
/// Every error is produced before the caller's query is touched, so a failed
/// call never leaves a half-applied filter behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WhereAssocError {
    #[error("WhereAssocError::AssociationNotFound: entity='{entity}' association='{association}'")]
    AssociationNotFound { entity: String, association: String },

    #[error("WhereAssocError::UnsupportedConditionType: kind='{kind}'")]
    UnsupportedConditionType { kind: String },

    #[error("WhereAssocError::InvalidComparison: {message}")]
    InvalidComparison { message: String },

    #[error("WhereAssocError::AmbiguousAlias: alias='{alias}'")]
    AmbiguousAlias { alias: String },

    #[error("WhereAssocError::EmptyPath: association path has no tokens")]
    EmptyPath,

    #[error("WhereAssocError::PolymorphicTypeRequired: entity='{entity}' association='{association}'")]
    PolymorphicTypeRequired { entity: String, association: String },

    #[error("WhereAssocError::ScopeNotFound: entity='{entity}' scope='{scope}'")]
    ScopeNotFound { entity: String, scope: String },

    #[error("WhereAssocError::UnknownEntity: entity='{entity}'")]
    UnknownEntity { entity: String },

    #[error("WhereAssocError::InvalidFragment: {message}")]
    InvalidFragment { message: String },

    #[error("WhereAssocError::InvalidSchema: {message}")]
    InvalidSchema { message: String },

    #[error("WhereAssocError::InvalidConfiguration: component='{component}' message='{message}'")]
    InvalidConfiguration { component: String, message: String },

    #[error("WhereAssocError::SchemaNotInstalled: no schema registry has been installed")]
    SchemaNotInstalled,
}

impl From<WhereAssocError> for sea_orm::DbErr {
    fn from(err: WhereAssocError) -> Self {
        sea_orm::DbErr::Custom(err.to_string())
    }
}

impl WhereAssocError {
    pub fn association_not_found(entity: impl Into<String>, association: impl Into<String>) -> Self {
        Self::AssociationNotFound {
            entity: entity.into(),
            association: association.into(),
        }
    }

    pub fn unsupported_condition(kind: impl Into<String>) -> Self {
        Self::UnsupportedConditionType { kind: kind.into() }
    }

    pub fn invalid_comparison(message: impl Into<String>) -> Self {
        Self::InvalidComparison {
            message: message.into(),
        }
    }

    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    pub fn invalid_fragment(message: impl Into<String>) -> Self {
        Self::InvalidFragment {
            message: message.into(),
        }
    }

    /// True for errors caused by how the call was written rather than by the
    /// registry or process configuration.
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::AssociationNotFound { .. }
            | Self::UnsupportedConditionType { .. }
            | Self::InvalidComparison { .. }
            | Self::EmptyPath
            | Self::PolymorphicTypeRequired { .. }
            | Self::ScopeNotFound { .. }
            | Self::InvalidFragment { .. } => true,
            Self::AmbiguousAlias { .. }
            | Self::UnknownEntity { .. }
            | Self::InvalidSchema { .. }
            | Self::InvalidConfiguration { .. }
            | Self::SchemaNotInstalled => false,
        }
    }
}

/// Comparison operator applied as `count <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
}

impl CountOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountOp::Lt => "<",
            CountOp::Lte => "<=",
            CountOp::Eq => "=",
            CountOp::Gte => ">=",
            CountOp::Gt => ">",
            CountOp::Ne => "!=",
        }
    }

    /// Evaluates the operator on concrete numbers.
    pub fn evaluate(&self, count: i64, threshold: i64) -> bool {
        match self {
            CountOp::Lt => count < threshold,
            CountOp::Lte => count <= threshold,
            CountOp::Eq => count == threshold,
            CountOp::Gte => count >= threshold,
            CountOp::Gt => count > threshold,
            CountOp::Ne => count != threshold,
        }
    }
}

impl fmt::Display for CountOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountOp {
    type Err = WhereAssocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(CountOp::Lt),
            "<=" => Ok(CountOp::Lte),
            "=" | "==" => Ok(CountOp::Eq),
            ">=" => Ok(CountOp::Gte),
            ">" => Ok(CountOp::Gt),
            "!=" | "<>" => Ok(CountOp::Ne),
            other => Err(WhereAssocError::invalid_comparison(format!(
                "unknown operator '{}', expected one of <, <=, =, >=, >, !=",
                other
            ))),
        }
    }
}

/// Anything accepted as the operator argument of a count filter.
pub trait IntoCountOp {
    fn into_count_op(self) -> WhereAssocResult<CountOp>;
}

impl IntoCountOp for CountOp {
    fn into_count_op(self) -> WhereAssocResult<CountOp> {
        Ok(self)
    }
}

impl IntoCountOp for &str {
    fn into_count_op(self) -> WhereAssocResult<CountOp> {
        self.parse()
    }
}

impl IntoCountOp for String {
    fn into_count_op(self) -> WhereAssocResult<CountOp> {
        self.parse()
    }
}

impl IntoCountOp for &String {
    fn into_count_op(self) -> WhereAssocResult<CountOp> {
        self.parse()
    }
}

/// A validated `count <op> threshold` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComparisonSpec {
    threshold: i64,
    op: CountOp,
}

impl ComparisonSpec {
    pub fn new(threshold: i64, op: impl IntoCountOp) -> WhereAssocResult<Self> {
        let op = op.into_count_op()?;
        if threshold < 0 {
            return Err(WhereAssocError::invalid_comparison(format!(
                "threshold must be non-negative, got {}",
                threshold
            )));
        }
        Ok(Self { threshold, op })
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn op(&self) -> CountOp {
        self.op
    }
}

impl fmt::Display for ComparisonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "count {} {}", self.op, self.threshold)
    }
}

/// What an entry point asks of the related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocRelation {
    Exists,
    NotExists,
    Count(ComparisonSpec),
}

impl fmt::Display for AssocRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssocRelation::Exists => f.write_str("exists"),
            AssocRelation::NotExists => f.write_str("not exists"),
            AssocRelation::Count(spec) => spec.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_operator_spelling() {
        assert_eq!("<".into_count_op().unwrap(), CountOp::Lt);
        assert_eq!("<=".into_count_op().unwrap(), CountOp::Lte);
        assert_eq!("==".into_count_op().unwrap(), CountOp::Eq);
        assert_eq!(" = ".into_count_op().unwrap(), CountOp::Eq);
        assert_eq!("<>".into_count_op().unwrap(), CountOp::Ne);
        assert_eq!(String::from(">").into_count_op().unwrap(), CountOp::Gt);
    }

    #[test]
    fn rejects_unknown_operator_and_negative_threshold() {
        let err = ComparisonSpec::new(1, "=>").unwrap_err();
        assert!(matches!(err, WhereAssocError::InvalidComparison { .. }));

        let err = ComparisonSpec::new(-1, CountOp::Gte).unwrap_err();
        assert!(matches!(err, WhereAssocError::InvalidComparison { .. }));
        assert!(err.is_usage_error());
    }

    #[test]
    fn converts_into_db_err() {
        let err: sea_orm::DbErr = WhereAssocError::EmptyPath.into();
        match err {
            sea_orm::DbErr::Custom(message) => assert!(message.contains("EmptyPath")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn operator_deserializes_from_symbol() {
        let op: CountOp = serde_json::from_str("\"<>\"").unwrap();
        assert_eq!(op, CountOp::Ne);
        assert_eq!(serde_json::to_string(&CountOp::Gte).unwrap(), "\">=\"");
    }
}
