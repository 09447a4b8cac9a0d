pub mod compare;
pub mod condition;
pub mod path;
pub mod scope;
pub mod subquery;
pub mod where_assoc;

pub use compare::PredicateShape;
pub use condition::{AssocCondition, ColumnValue};
pub use path::{
    resolve, resolve_expanded, AssocPath, AssocToken, AssociationHop, PolymorphicFilter, PolymorphicSide,
    ResolvedPath,
};
pub use scope::AssocScope;
pub use subquery::SubqueryNode;
pub use where_assoc::{WhereAssoc, WhereAssocEntityExt, WhereAssocExt};
