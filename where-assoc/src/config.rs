use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::types::{WhereAssocError, WhereAssocResult};

/// How a polymorphic belongs-to token without an explicit type is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolyBelongsTo {
    /// Fail with `PolymorphicTypeRequired`.
    #[default]
    Raise,
    /// Expand the path into one branch per declared target type.
    Declared,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhereAssocOptions {
    pub poly_belongs_to: PolyBelongsTo,
    /// Skip the scopes attached to association declarations.
    pub ignore_association_scopes: bool,
}

impl WhereAssocOptions {
    pub fn with_poly_belongs_to(mut self, mode: PolyBelongsTo) -> Self {
        self.poly_belongs_to = mode;
        self
    }

    pub fn with_ignore_association_scopes(mut self, ignore: bool) -> Self {
        self.ignore_association_scopes = ignore;
        self
    }

    /// Parse options from a JSON document, missing keys take their defaults.
    pub fn from_json(json: &str) -> WhereAssocResult<Self> {
        serde_json::from_str(json).map_err(|e| WhereAssocError::InvalidConfiguration {
            component: "WhereAssocOptions".to_string(),
            message: e.to_string(),
        })
    }
}

static DEFAULT_OPTIONS: OnceCell<WhereAssocOptions> = OnceCell::new();

/// Set the process-wide defaults. Can only be done once.
pub fn set_default_options(options: WhereAssocOptions) -> WhereAssocResult<()> {
    DEFAULT_OPTIONS
        .set(options)
        .map_err(|_| WhereAssocError::InvalidConfiguration {
            component: "WhereAssocOptions".to_string(),
            message: "default options were already set".to_string(),
        })
}

pub fn default_options() -> WhereAssocOptions {
    DEFAULT_OPTIONS.get().cloned().unwrap_or_default()
}
