use std::fmt;

use crate::config::{PolyBelongsTo, WhereAssocOptions};
use crate::entity_metadata::{
    AssociationKind, AssociationMetadata, AssociationMetadataProvider, AssociationTarget,
    EntityMetadata, JoinTableMetadata, ScopeFn,
};
use crate::types::{WhereAssocError, WhereAssocResult};

/// One association name, optionally pinned to a polymorphic target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssocToken {
    name: String,
    polymorphic_type: Option<String>,
}

impl AssocToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polymorphic_type: None,
        }
    }

    /// Pick the concrete target of a polymorphic belongs-to.
    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.polymorphic_type = Some(type_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polymorphic_type(&self) -> Option<&str> {
        self.polymorphic_type.as_deref()
    }
}

impl From<&str> for AssocToken {
    fn from(name: &str) -> Self {
        AssocToken::new(name)
    }
}

impl From<String> for AssocToken {
    fn from(name: String) -> Self {
        AssocToken::new(name)
    }
}

impl fmt::Display for AssocToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.polymorphic_type {
            Some(t) => write!(f, "{}<{}>", self.name, t),
            None => f.write_str(&self.name),
        }
    }
}

/// Ordered association tokens, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AssocPath {
    tokens: Vec<AssocToken>,
}

impl AssocPath {
    pub fn new<I>(tokens: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AssocToken>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[AssocToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

impl From<&str> for AssocPath {
    fn from(name: &str) -> Self {
        AssocPath::new([name])
    }
}

impl From<String> for AssocPath {
    fn from(name: String) -> Self {
        AssocPath::new([name])
    }
}

impl From<AssocToken> for AssocPath {
    fn from(token: AssocToken) -> Self {
        AssocPath::new([token])
    }
}

impl<T: Into<AssocToken>> From<Vec<T>> for AssocPath {
    fn from(tokens: Vec<T>) -> Self {
        AssocPath::new(tokens)
    }
}

impl<T: Into<AssocToken>, const N: usize> From<[T; N]> for AssocPath {
    fn from(tokens: [T; N]) -> Self {
        AssocPath::new(tokens)
    }
}

impl fmt::Display for AssocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            token.fmt(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolymorphicSide {
    /// The enclosing row carries the discriminator (polymorphic belongs-to).
    Source,
    /// The hop's own table carries it (`has_one_as` / `has_many_as`).
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolymorphicFilter {
    pub side: PolymorphicSide,
    pub column: String,
    pub type_name: String,
}

/// One resolved step of a path.
#[derive(Debug, Clone)]
pub struct AssociationHop {
    pub source_entity: String,
    pub association: String,
    pub kind: AssociationKind,
    pub target_entity: String,
    pub target_table: String,
    pub source_keys: Vec<String>,
    pub target_keys: Vec<String>,
    pub join_table: Option<JoinTableMetadata>,
    pub polymorphic: Option<PolymorphicFilter>,
    pub self_referential: bool,
    pub scope: Option<ScopeFn>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPath {
    hops: Vec<AssociationHop>,
}

impl ResolvedPath {
    pub fn hops(&self) -> &[AssociationHop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn leaf(&self) -> Option<&AssociationHop> {
        self.hops.last()
    }
}

/// Resolve a path that must not fan out over polymorphic types.
pub fn resolve<P>(provider: &P, start_entity: &str, path: &AssocPath) -> WhereAssocResult<ResolvedPath>
where
    P: AssociationMetadataProvider + ?Sized,
{
    let options = WhereAssocOptions::default().with_poly_belongs_to(PolyBelongsTo::Raise);
    let mut paths = resolve_expanded(provider, start_entity, path, &options)?;
    // Raise mode never expands
    paths.pop().ok_or(WhereAssocError::EmptyPath)
}

/// Resolve a path, expanding untyped polymorphic belongs-to tokens into one
/// branch per declared type when the options allow it.
pub fn resolve_expanded<P>(
    provider: &P,
    start_entity: &str,
    path: &AssocPath,
    options: &WhereAssocOptions,
) -> WhereAssocResult<Vec<ResolvedPath>>
where
    P: AssociationMetadataProvider + ?Sized,
{
    if path.is_empty() {
        return Err(WhereAssocError::EmptyPath);
    }
    let mut out = Vec::new();
    expand(provider, start_entity, path.tokens(), options, Vec::new(), &mut out)?;
    Ok(out)
}

fn expand<P>(
    provider: &P,
    entity: &str,
    tokens: &[AssocToken],
    options: &WhereAssocOptions,
    prefix: Vec<AssociationHop>,
    out: &mut Vec<ResolvedPath>,
) -> WhereAssocResult<()>
where
    P: AssociationMetadataProvider + ?Sized,
{
    let Some((token, rest)) = tokens.split_first() else {
        out.push(ResolvedPath { hops: prefix });
        return Ok(());
    };

    let source = provider
        .entity_metadata(entity)
        .ok_or_else(|| WhereAssocError::UnknownEntity {
            entity: entity.to_string(),
        })?;
    let assoc = provider.lookup_association(&source.name, token.name())?;

    let types: Vec<Option<&str>> = match (&assoc.target, token.polymorphic_type()) {
        (AssociationTarget::Polymorphic(declared), None) => match options.poly_belongs_to {
            PolyBelongsTo::Raise => {
                return Err(WhereAssocError::PolymorphicTypeRequired {
                    entity: source.name.clone(),
                    association: assoc.name.clone(),
                })
            }
            PolyBelongsTo::Declared => declared.iter().map(|t| Some(t.as_str())).collect(),
        },
        (_, explicit) => vec![explicit],
    };

    for type_name in types {
        let hop = resolve_hop(provider, source, assoc, type_name)?;
        let next_entity = hop.target_entity.clone();
        let mut hops = prefix.clone();
        hops.push(hop);
        expand(provider, &next_entity, rest, options, hops, out)?;
    }
    Ok(())
}

fn resolve_hop<P>(
    provider: &P,
    source: &EntityMetadata,
    assoc: &AssociationMetadata,
    type_name: Option<&str>,
) -> WhereAssocResult<AssociationHop>
where
    P: AssociationMetadataProvider + ?Sized,
{
    let not_found = |type_name: &str| {
        WhereAssocError::association_not_found(&source.name, format!("{}<{}>", assoc.name, type_name))
    };

    let (target, target_keys, polymorphic) = match &assoc.target {
        AssociationTarget::Entity(target_name) => {
            let target = lookup_entity(provider, target_name)?;
            if let Some(t) = type_name {
                if t != target.name && t != target.polymorphic_name {
                    return Err(not_found(t));
                }
            }
            let polymorphic = assoc.polymorphic_type_column.as_ref().map(|column| PolymorphicFilter {
                side: PolymorphicSide::Target,
                column: column.clone(),
                type_name: source.polymorphic_name.clone(),
            });
            (target, assoc.target_keys.clone(), polymorphic)
        }
        AssociationTarget::Polymorphic(declared) => {
            let Some(t) = type_name else {
                return Err(WhereAssocError::PolymorphicTypeRequired {
                    entity: source.name.clone(),
                    association: assoc.name.clone(),
                });
            };
            let target = declared
                .iter()
                .filter_map(|name| provider.entity_metadata(name))
                .find(|meta| meta.name == t || meta.polymorphic_name == t)
                .ok_or_else(|| not_found(t))?;
            let target_keys = if assoc.target_keys.is_empty() {
                target.primary_key.clone()
            } else {
                assoc.target_keys.clone()
            };
            if target_keys.len() != assoc.source_keys.len() {
                return Err(WhereAssocError::invalid_schema(format!(
                    "'{}.{}' keys do not match the primary key of '{}'",
                    source.name, assoc.name, target.name
                )));
            }
            let polymorphic = assoc.polymorphic_type_column.as_ref().map(|column| PolymorphicFilter {
                side: PolymorphicSide::Source,
                column: column.clone(),
                type_name: target.polymorphic_name.clone(),
            });
            (target, target_keys, polymorphic)
        }
    };

    Ok(AssociationHop {
        source_entity: source.name.clone(),
        association: assoc.name.clone(),
        kind: assoc.kind,
        target_entity: target.name.clone(),
        target_table: target.table_name.clone(),
        source_keys: assoc.source_keys.clone(),
        target_keys,
        join_table: assoc.join_table.clone(),
        polymorphic,
        self_referential: source.name == target.name,
        scope: assoc.scope.clone(),
    })
}

fn lookup_entity<'a, P>(provider: &'a P, name: &str) -> WhereAssocResult<&'a EntityMetadata>
where
    P: AssociationMetadataProvider + ?Sized,
{
    provider
        .entity_metadata(name)
        .ok_or_else(|| WhereAssocError::UnknownEntity {
            entity: name.to_string(),
        })
}
