pub mod config;
pub mod entity_metadata;
pub mod fragment;
pub mod query_builders;
pub mod types;

pub use config::{default_options, set_default_options, PolyBelongsTo, WhereAssocOptions};
pub use entity_metadata::{
    schema, AssociationKind, AssociationMetadata, AssociationMetadataProvider, AssociationTarget,
    EntityMetadata, EntityMetadataBuilder, JoinTableMetadata, SchemaRegistry, SchemaRegistryBuilder,
    ScopeFn,
};
pub use query_builders::*;
pub use types::*;

pub mod prelude {
    pub use crate::{
        AssocCondition, AssocPath, AssocScope, AssocToken, ColumnValue, CountOp, SchemaRegistry,
        WhereAssoc, WhereAssocEntityExt, WhereAssocError, WhereAssocExt, WhereAssocOptions,
        WhereAssocResult,
    };
    pub use sea_orm::QueryFilter;
}

// ===== Fragment macros =====

/// Build a fragment condition, binding each `{}` argument.
///
/// `fragment!("{} = {}", ident!("body"), "hello")` yields `"body" = ?` with
/// one bound value. Returns `WhereAssocResult<AssocCondition>`.
#[macro_export]
macro_rules! fragment {
    ($fmt:literal $(, $arg:expr )* $(,)?) => {{
        #[allow(unused_mut)]
        let mut __args: ::std::vec::Vec<$crate::fragment::FragmentArg> = ::std::vec![];
        $( __args.push(($arg).into()); )*
        $crate::fragment::finalize_sql_with_args($fmt, __args)
            .map(|(__sql, __values)| $crate::AssocCondition::Fragment { sql: __sql, values: __values })
    }};
}

#[macro_export]
macro_rules! ident {
    ($name:expr) => {{
        $crate::fragment::Inline($crate::fragment::ident($name))
    }};
}
