// Association metadata registry: the read-only table every resolution walks

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use heck::ToUpperCamelCase;
use once_cell::sync::OnceCell;
use sea_orm::sea_query::DynIden;
use sea_orm::{
    EntityTrait, IdenStatic, Identity, Iterable, PrimaryKeyToColumn, RelationDef,
    RelationType,
};

use crate::query_builders::AssocScope;
use crate::types::{WhereAssocError, WhereAssocResult};

type ScopeClosure = dyn Fn(AssocScope) -> AssocScope + Send + Sync;

/// A reusable query fragment applied to an association's scope.
#[derive(Clone)]
pub struct ScopeFn(Arc<ScopeClosure>);

impl ScopeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(AssocScope) -> AssocScope + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, scope: AssocScope) -> AssocScope {
        (self.0)(scope)
    }
}

impl fmt::Debug for ScopeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScopeFn(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasAndBelongsToMany,
}

impl AssociationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongs_to",
            AssociationKind::HasOne => "has_one",
            AssociationKind::HasMany => "has_many",
            AssociationKind::HasAndBelongsToMany => "has_and_belongs_to_many",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationTarget {
    Entity(String),
    /// Polymorphic belongs-to: the concrete target is picked per token.
    Polymorphic(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableMetadata {
    pub table: String,
    /// Columns referencing the source entity's keys.
    pub source_columns: Vec<String>,
    /// Columns referencing the target entity's keys.
    pub target_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AssociationMetadata {
    pub name: String,
    pub kind: AssociationKind,
    pub target: AssociationTarget,
    pub source_keys: Vec<String>,
    pub target_keys: Vec<String>,
    pub join_table: Option<JoinTableMetadata>,
    /// Discriminator column. Lives on the target for `*_as` associations and
    /// on the source for polymorphic belongs-to.
    pub polymorphic_type_column: Option<String>,
    pub scope: Option<ScopeFn>,
}

impl AssociationMetadata {
    pub fn new(name: impl Into<String>, kind: AssociationKind, target: AssociationTarget) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            join_table: None,
            polymorphic_type_column: None,
            scope: None,
        }
    }

    pub fn keys<S, T>(mut self, source_keys: S, target_keys: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        self.source_keys = source_keys.into_iter().map(Into::into).collect();
        self.target_keys = target_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, AssociationTarget::Polymorphic(_))
    }
}

#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    /// Value stored in discriminator columns pointing at this entity.
    pub polymorphic_name: String,
    associations: Vec<AssociationMetadata>,
    scopes: HashMap<String, ScopeFn>,
}

impl EntityMetadata {
    pub fn association(&self, name: &str) -> Option<&AssociationMetadata> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn associations(&self) -> &[AssociationMetadata] {
        &self.associations
    }

    pub fn scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(name)
    }
}

/// Read side of the registry, consumed by the path resolver.
pub trait AssociationMetadataProvider {
    fn entity_metadata(&self, entity_name: &str) -> Option<&EntityMetadata>;

    fn lookup_association(
        &self,
        entity_name: &str,
        association: &str,
    ) -> WhereAssocResult<&AssociationMetadata> {
        let entity = self
            .entity_metadata(entity_name)
            .ok_or_else(|| WhereAssocError::UnknownEntity {
                entity: entity_name.to_string(),
            })?;
        entity
            .association(association)
            .ok_or_else(|| WhereAssocError::association_not_found(&entity.name, association))
    }
}

static SCHEMA: OnceCell<Arc<SchemaRegistry>> = OnceCell::new();

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, EntityMetadata>,
    tables: HashMap<String, String>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    // Namespace-aware lookup: "blog::Post", "post" and "Post" all find Post
    pub fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        if let Some(meta) = self.entities.get(name) {
            return Some(meta);
        }
        if let Some(colon_pos) = name.rfind("::") {
            if let Some(meta) = self.entities.get(&name[colon_pos + 2..]) {
                return Some(meta);
            }
        }
        let pascal = name.to_upper_camel_case();
        self.entities.get(&pascal)
    }

    pub fn entity_by_table(&self, table: &str) -> Option<&EntityMetadata> {
        self.tables
            .get(table)
            .and_then(|name| self.entities.get(name))
    }

    pub fn entity_for<E: EntityTrait>(&self) -> WhereAssocResult<&EntityMetadata> {
        let table = E::default().table_name().to_owned();
        self.entity_by_table(&table)
            .ok_or(WhereAssocError::UnknownEntity { entity: table })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    /// Publish this registry process-wide. Can only be done once.
    pub fn install(self) -> WhereAssocResult<Arc<SchemaRegistry>> {
        let registry = Arc::new(self);
        SCHEMA
            .set(registry.clone())
            .map_err(|_| WhereAssocError::invalid_schema("a schema registry is already installed"))?;
        log::debug!("installed schema registry with {} entities", registry.entities.len());
        Ok(registry)
    }

    /// Return the installed registry, building and installing it on first use.
    pub fn get_or_install<F>(build: F) -> WhereAssocResult<Arc<SchemaRegistry>>
    where
        F: FnOnce() -> WhereAssocResult<SchemaRegistry>,
    {
        SCHEMA
            .get_or_try_init(|| build().map(Arc::new))
            .cloned()
    }
}

impl AssociationMetadataProvider for SchemaRegistry {
    fn entity_metadata(&self, entity_name: &str) -> Option<&EntityMetadata> {
        self.entity(entity_name)
    }
}

/// The process-wide registry.
pub fn schema() -> WhereAssocResult<Arc<SchemaRegistry>> {
    SCHEMA.get().cloned().ok_or(WhereAssocError::SchemaNotInstalled)
}

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    entities: Vec<EntityMetadataBuilder>,
}

impl SchemaRegistryBuilder {
    /// Register a sea-orm entity; table name and primary key come from the entity.
    pub fn entity<E: EntityTrait>(
        mut self,
        name: &str,
        configure: impl FnOnce(EntityMetadataBuilder) -> EntityMetadataBuilder,
    ) -> Self {
        let table = E::default().table_name().to_owned();
        let primary_key: Vec<String> = <E::PrimaryKey as Iterable>::iter()
            .map(|key| key.into_column().as_str().to_owned())
            .collect();
        let builder = EntityMetadataBuilder::new(name, table).primary_key(primary_key);
        self.entities.push(configure(builder));
        self
    }

    /// Register a table with no sea-orm entity behind it.
    pub fn table<F>(mut self, name: &str, table: &str, primary_key: &[&str], configure: F) -> Self
    where
        F: FnOnce(EntityMetadataBuilder) -> EntityMetadataBuilder,
    {
        let builder = EntityMetadataBuilder::new(name, table).primary_key(primary_key.iter().copied());
        self.entities.push(configure(builder));
        self
    }

    pub fn build(self) -> WhereAssocResult<SchemaRegistry> {
        let mut registry = SchemaRegistry::default();
        for builder in self.entities {
            let meta = builder.finish();
            if registry.entities.contains_key(&meta.name) {
                return Err(WhereAssocError::invalid_schema(format!(
                    "entity '{}' registered twice",
                    meta.name
                )));
            }
            registry
                .tables
                .insert(meta.table_name.clone(), meta.name.clone());
            registry.entities.insert(meta.name.clone(), meta);
        }

        // Default keys come from the primary keys of either side
        let primary_keys: HashMap<String, Vec<String>> = registry
            .entities
            .values()
            .map(|e| (e.name.clone(), e.primary_key.clone()))
            .collect();

        for entity in registry.entities.values_mut() {
            for assoc in entity.associations.iter_mut() {
                complete_association(&entity.name, &entity.primary_key, assoc, &primary_keys)?;
            }
        }
        Ok(registry)
    }
}

fn complete_association(
    entity: &str,
    own_primary_key: &[String],
    assoc: &mut AssociationMetadata,
    primary_keys: &HashMap<String, Vec<String>>,
) -> WhereAssocResult<()> {
    let assoc_name = assoc.name.clone();
    let target_pk = |target: &str| {
        primary_keys.get(target).cloned().ok_or_else(|| {
            WhereAssocError::invalid_schema(format!(
                "association '{}.{}' targets unknown entity '{}'",
                entity, assoc_name, target
            ))
        })
    };

    match &assoc.target {
        AssociationTarget::Polymorphic(declared) => {
            for target in declared {
                target_pk(target)?;
            }
            if assoc.polymorphic_type_column.is_none() {
                return Err(WhereAssocError::invalid_schema(format!(
                    "polymorphic association '{}.{}' has no type column",
                    entity, assoc.name
                )));
            }
        }
        AssociationTarget::Entity(target) => {
            let pk = target_pk(target)?;
            match assoc.kind {
                AssociationKind::BelongsTo => {
                    if assoc.target_keys.is_empty() {
                        assoc.target_keys = pk;
                    }
                }
                AssociationKind::HasOne | AssociationKind::HasMany => {
                    if assoc.source_keys.is_empty() {
                        assoc.source_keys = own_primary_key.to_vec();
                    }
                }
                AssociationKind::HasAndBelongsToMany => {
                    if assoc.source_keys.is_empty() {
                        assoc.source_keys = own_primary_key.to_vec();
                    }
                    if assoc.target_keys.is_empty() {
                        assoc.target_keys = pk;
                    }
                    let join = assoc.join_table.as_ref().ok_or_else(|| {
                        WhereAssocError::invalid_schema(format!(
                            "association '{}.{}' has no join table",
                            entity, assoc.name
                        ))
                    })?;
                    if join.source_columns.len() != assoc.source_keys.len()
                        || join.target_columns.len() != assoc.target_keys.len()
                    {
                        return Err(WhereAssocError::invalid_schema(format!(
                            "join table '{}' columns do not match the keys of '{}.{}'",
                            join.table, entity, assoc.name
                        )));
                    }
                }
            }
            if assoc.source_keys.len() != assoc.target_keys.len() || assoc.source_keys.is_empty() {
                return Err(WhereAssocError::invalid_schema(format!(
                    "association '{}.{}' has mismatched key columns",
                    entity, assoc.name
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct EntityMetadataBuilder {
    name: String,
    table_name: String,
    primary_key: Vec<String>,
    polymorphic_name: Option<String>,
    associations: Vec<AssociationMetadata>,
    scopes: HashMap<String, ScopeFn>,
}

impl EntityMetadataBuilder {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            primary_key: vec!["id".to_string()],
            polymorphic_name: None,
            associations: Vec::new(),
            scopes: HashMap::new(),
        }
    }

    pub fn primary_key<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn polymorphic_name(mut self, name: impl Into<String>) -> Self {
        self.polymorphic_name = Some(name.into());
        self
    }

    pub fn association(mut self, association: AssociationMetadata) -> Self {
        self.associations.push(association);
        self
    }

    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(
            AssociationMetadata::new(name, AssociationKind::BelongsTo, entity_target(target))
                .keys([foreign_key], Vec::<String>::new()),
        )
    }

    pub fn has_one(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(
            AssociationMetadata::new(name, AssociationKind::HasOne, entity_target(target))
                .keys(Vec::<String>::new(), [foreign_key]),
        )
    }

    pub fn has_many(self, name: &str, target: &str, foreign_key: &str) -> Self {
        self.association(
            AssociationMetadata::new(name, AssociationKind::HasMany, entity_target(target))
                .keys(Vec::<String>::new(), [foreign_key]),
        )
    }

    /// Owner side of a polymorphic association: the target carries
    /// `<as_name>_id` and `<as_name>_type`.
    pub fn has_one_as(self, name: &str, target: &str, as_name: &str) -> Self {
        self.polymorphic_owner(name, AssociationKind::HasOne, target, as_name)
    }

    pub fn has_many_as(self, name: &str, target: &str, as_name: &str) -> Self {
        self.polymorphic_owner(name, AssociationKind::HasMany, target, as_name)
    }

    fn polymorphic_owner(self, name: &str, kind: AssociationKind, target: &str, as_name: &str) -> Self {
        let mut assoc = AssociationMetadata::new(name, kind, entity_target(target))
            .keys(Vec::<String>::new(), [format!("{}_id", as_name)]);
        assoc.polymorphic_type_column = Some(format!("{}_type", as_name));
        self.association(assoc)
    }

    pub fn belongs_to_polymorphic(self, name: &str, as_name: &str, declared_targets: &[&str]) -> Self {
        let declared = declared_targets.iter().map(|t| String::from(*t)).collect();
        let mut assoc = AssociationMetadata::new(
            name,
            AssociationKind::BelongsTo,
            AssociationTarget::Polymorphic(declared),
        )
        .keys([format!("{}_id", as_name)], Vec::<String>::new());
        assoc.polymorphic_type_column = Some(format!("{}_type", as_name));
        self.association(assoc)
    }

    pub fn has_and_belongs_to_many(
        self,
        name: &str,
        target: &str,
        join_table: &str,
        source_column: &str,
        target_column: &str,
    ) -> Self {
        let mut assoc =
            AssociationMetadata::new(name, AssociationKind::HasAndBelongsToMany, entity_target(target));
        assoc.join_table = Some(JoinTableMetadata {
            table: join_table.to_string(),
            source_columns: vec![source_column.to_string()],
            target_columns: vec![target_column.to_string()],
        });
        self.association(assoc)
    }

    /// Declare an association from a sea-orm relation definition.
    pub fn relation(self, name: &str, target: &str, def: RelationDef) -> Self {
        let kind = match (&def.rel_type, def.is_owner) {
            (RelationType::HasMany, _) => AssociationKind::HasMany,
            (RelationType::HasOne, true) => AssociationKind::HasOne,
            (RelationType::HasOne, false) => AssociationKind::BelongsTo,
        };
        self.association(
            AssociationMetadata::new(name, kind, entity_target(target))
                .keys(identity_columns(&def.from_col), identity_columns(&def.to_col)),
        )
    }

    /// Attach a scope to the most recently declared association.
    pub fn with_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(AssocScope) -> AssocScope + Send + Sync + 'static,
    {
        match self.associations.last_mut() {
            Some(assoc) => assoc.scope = Some(ScopeFn::new(f)),
            None => log::warn!("with_scope on '{}' before any association", self.name),
        }
        self
    }

    /// Declare a named scope usable as a condition on this entity.
    pub fn scope<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(AssocScope) -> AssocScope + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), ScopeFn::new(f));
        self
    }

    fn finish(self) -> EntityMetadata {
        let polymorphic_name = self.polymorphic_name.unwrap_or_else(|| self.name.clone());
        EntityMetadata {
            name: self.name,
            table_name: self.table_name,
            primary_key: self.primary_key,
            polymorphic_name,
            associations: self.associations,
            scopes: self.scopes,
        }
    }
}

fn entity_target(target: &str) -> AssociationTarget {
    AssociationTarget::Entity(target.to_string())
}

fn identity_columns(identity: &Identity) -> Vec<String> {
    match identity {
        Identity::Unary(a) => vec![iden_name(a)],
        Identity::Binary(a, b) => vec![iden_name(a), iden_name(b)],
        Identity::Ternary(a, b, c) => vec![iden_name(a), iden_name(b), iden_name(c)],
        Identity::Many(columns) => columns.iter().map(iden_name).collect(),
    }
}

fn iden_name(iden: &DynIden) -> String {
    sea_orm::sea_query::Iden::to_string(&**iden)
}
