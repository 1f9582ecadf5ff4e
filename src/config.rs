//! Configuration for the inbox sync engine
//!
//! All configuration is supplied by the caller once at construction time and
//! validated up front; the engine never mutates it. Field names on the wire
//! are derived from the publisher prefix unless explicitly overridden.

use std::collections::BTreeMap;

use crate::errors::{AppError, AppResult};

/// Relationship metadata for the message entity
///
/// Names the tabular entity backing messages and the navigation properties
/// used to bind replies to their parent record and party entries.
#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    /// Logical name of the message entity (e.g. `adx_portalcomment`)
    pub entity_name: String,
    /// Plural collection name queried for records (e.g. `adx_portalcomments`)
    pub collection_name: String,
    /// Navigation property binding a record to its parent business record
    pub navigation_property: String,
    /// Collection name of the parent business record (e.g. `incidents`)
    pub regarding_collection: String,
    /// Navigation property holding the activity party entries
    pub parties_property: String,
    /// Collection name used for contact party bindings (e.g. `contacts`)
    pub contact_collection: String,
    /// Collection name used for staff party bindings (e.g. `systemusers`)
    pub staff_collection: String,
}

impl RelationshipConfig {
    fn validate(&self) -> AppResult<()> {
        let required = [
            ("entity_name", &self.entity_name),
            ("collection_name", &self.collection_name),
            ("navigation_property", &self.navigation_property),
            ("regarding_collection", &self.regarding_collection),
            ("parties_property", &self.parties_property),
            ("contact_collection", &self.contact_collection),
            ("staff_collection", &self.staff_collection),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::invalid(format!(
                    "relationship configuration field '{name}' must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Query-shaping options for one operation
///
/// Values are passed through verbatim to the tabular API, except `filter`,
/// which is always combined with the mandatory inbound-direction predicate.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Field selection (`$select` analogue)
    pub select: Option<String>,
    /// Additional filter, ANDed with the mandatory direction predicate
    pub filter: Option<String>,
    /// Sort order (`$orderby` analogue)
    pub order_by: Option<String>,
    /// Relation expansion (`$expand` analogue)
    pub expand: Option<String>,
}

/// Enablement and query shaping for one operation
#[derive(Debug, Clone, Default)]
pub struct OperationConfig {
    /// Whether the operation may be performed at all
    pub enabled: bool,
    /// Query-shaping options applied when the operation runs
    pub query: QueryOptions,
}

impl OperationConfig {
    /// An enabled operation with no query shaping
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            query: QueryOptions::default(),
        }
    }

    /// An enabled operation with the given query shaping
    pub fn enabled_with(query: QueryOptions) -> Self {
        Self {
            enabled: true,
            query,
        }
    }
}

/// Per-operation configuration for the tabular API
///
/// Operations default to disabled; callers opt in per operation.
#[derive(Debug, Clone, Default)]
pub struct OperationSet {
    /// Record fetch
    pub read: OperationConfig,
    /// Reply creation
    pub create: OperationConfig,
    /// Read-flag update
    pub update: OperationConfig,
    /// Record deletion (reserved; the engine itself never deletes)
    pub delete: OperationConfig,
}

/// Tabular API endpoint configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the tabular API, without trailing slash
    /// (e.g. `https://org.example.com/api/data/v9.2`)
    pub base_url: String,
}

/// Engine configuration, validated at construction
///
/// Immutable once handed to the engine. The `api` section is optional: when
/// absent, the engine falls back to the snapshot source even in a hosted
/// context.
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Publisher prefix used to derive default wire field names
    pub publisher_prefix: String,
    /// Explicit field-name overrides keyed by logical name
    field_overrides: BTreeMap<String, String>,
    /// Relationship metadata for the message entity
    pub relationship: RelationshipConfig,
    /// Per-operation enablement and query shaping
    pub operations: OperationSet,
    /// Tabular API endpoint, if one is available
    pub api: Option<ApiConfig>,
}

impl InboxConfig {
    /// Build a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the publisher prefix is empty, any
    /// relationship field is empty, or the API base URL is set but blank.
    pub fn new(
        publisher_prefix: impl Into<String>,
        relationship: RelationshipConfig,
        operations: OperationSet,
        api: Option<ApiConfig>,
    ) -> AppResult<Self> {
        let publisher_prefix = publisher_prefix.into();
        if publisher_prefix.trim().is_empty() {
            return Err(AppError::invalid("publisher prefix must not be empty"));
        }
        relationship.validate()?;
        if let Some(api) = &api
            && api.base_url.trim().is_empty()
        {
            return Err(AppError::invalid("API base_url must not be empty"));
        }

        Ok(Self {
            publisher_prefix,
            field_overrides: BTreeMap::new(),
            relationship,
            operations,
            api,
        })
    }

    /// Add an explicit field-name override before handing the config off
    ///
    /// `key` is the logical field key (e.g. `hasread`); `field` is the exact
    /// wire name to use instead of the prefix-derived default.
    #[must_use]
    pub fn with_field_override(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_overrides.insert(key.into(), field.into());
        self
    }

    /// Resolve the wire name for a logical field key
    ///
    /// Looks up an explicit override first, else derives
    /// `{publisher_prefix}_{key}`.
    pub fn resolved_field(&self, key: &str) -> String {
        self.field_overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("{}_{key}", self.publisher_prefix))
    }

    /// Whether a tabular API endpoint was configured
    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }
}
