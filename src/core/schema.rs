//! Entity schema descriptors and the registry that serves them
//!
//! Schemas are declared statically (in code or configuration), loaded once
//! at startup and shared read-only by every request.

use crate::core::error::ConfigError;
use crate::core::field::FieldType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How a relationship is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// This row holds the target's primary key in `foreign_key`
    BelongsTo { foreign_key: String },
    /// Target rows hold this row's primary key in `foreign_key`
    HasMany { foreign_key: String },
}

/// A named relationship to another entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Target entity type
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl Relationship {
    pub fn belongs_to(target: &str, foreign_key: &str) -> Self {
        Self {
            target: target.to_string(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
            },
        }
    }

    pub fn has_many(target: &str, foreign_key: &str) -> Self {
        Self {
            target: target.to_string(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
            },
        }
    }

    /// Whether the relationship resolves to at most one resource
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::BelongsTo { .. })
    }
}

/// Description of an entity's fields, key and relationships
///
/// This is the contract the access layer consults instead of discovering
/// entity structure at runtime.
pub trait EntitySchema: Send + Sync {
    /// Resource type name used in documents (e.g. "books")
    fn entity_type(&self) -> &str;

    /// Store-level table/collection name
    fn table_name(&self) -> &str {
        self.entity_type()
    }

    /// All filterable/sortable field names
    fn fields(&self) -> &[String];

    /// Check whether a field exists on this entity
    fn field_exists(&self, name: &str) -> bool {
        self.fields().iter().any(|f| f == name)
    }

    fn primary_key_field(&self) -> &str;

    fn relationships(&self) -> &IndexMap<String, Relationship>;

    /// Declared column type; filter operands on typed fields are coerced to it
    fn field_type(&self, _name: &str) -> Option<FieldType> {
        None
    }

    fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships().get(name)
    }

    /// Field holding the tenant/workspace id, if the entity is tenant-scoped
    fn tenant_field(&self) -> Option<&str>;

    /// Field holding the owning user's id
    fn owner_field(&self) -> Option<&str>;

    fn department_field(&self) -> Option<&str> {
        None
    }

    /// Timestamp used by time-window access rules
    fn timestamp_field(&self) -> Option<&str> {
        None
    }

    /// Boolean flag used by "active only" access rules
    fn active_field(&self) -> Option<&str> {
        None
    }

    /// Soft-delete marker used by "active only" access rules
    fn deleted_field(&self) -> Option<&str> {
        None
    }
}

/// Static, declarative implementation of [`EntitySchema`]
///
/// # Example
///
/// ```rust,ignore
/// let books = EntityDescriptor::new("books", "id")
///     .with_fields(["title", "status", "workspace_id", "user_id", "author_id"])
///     .with_tenant_field("workspace_id")
///     .with_owner_field("user_id")
///     .with_relationship("author", Relationship::belongs_to("authors", "author_id"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Defaults to the entity type
    #[serde(default)]
    pub table: Option<String>,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    #[serde(default)]
    pub fields: Vec<String>,

    /// Column types of the fields that declare one
    #[serde(default)]
    pub field_types: IndexMap<String, FieldType>,

    #[serde(default)]
    pub relationships: IndexMap<String, Relationship>,

    #[serde(default)]
    pub tenant_field: Option<String>,

    #[serde(default)]
    pub owner_field: Option<String>,

    #[serde(default)]
    pub department_field: Option<String>,

    #[serde(default)]
    pub timestamp_field: Option<String>,

    #[serde(default)]
    pub active_field: Option<String>,

    #[serde(default)]
    pub deleted_field: Option<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl EntityDescriptor {
    /// Create a descriptor whose only field is the primary key
    pub fn new(entity_type: &str, primary_key: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            table: None,
            primary_key: primary_key.to_string(),
            fields: vec![primary_key.to_string()],
            field_types: IndexMap::new(),
            relationships: IndexMap::new(),
            tenant_field: None,
            owner_field: None,
            department_field: None,
            timestamp_field: None,
            active_field: None,
            deleted_field: None,
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    /// Declare `field` (if needed) with a column type
    pub fn with_field_type(self, field: &str, ty: FieldType) -> Self {
        let mut this = self.with_fields([field]);
        this.field_types.insert(field.to_string(), ty);
        this
    }

    pub fn with_relationship(mut self, name: &str, relationship: Relationship) -> Self {
        self.relationships.insert(name.to_string(), relationship);
        self
    }

    pub fn with_tenant_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.tenant_field = Some(field.to_string());
        this
    }

    pub fn with_owner_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.owner_field = Some(field.to_string());
        this
    }

    pub fn with_department_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.department_field = Some(field.to_string());
        this
    }

    pub fn with_timestamp_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.timestamp_field = Some(field.to_string());
        this
    }

    pub fn with_active_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.active_field = Some(field.to_string());
        this
    }

    pub fn with_deleted_field(self, field: &str) -> Self {
        let mut this = self.with_fields([field]);
        this.deleted_field = Some(field.to_string());
        this
    }

    /// Check internal consistency: every special field must be a declared field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let special = [
            Some(self.primary_key.as_str()),
            self.tenant_field.as_deref(),
            self.owner_field.as_deref(),
            self.department_field.as_deref(),
            self.timestamp_field.as_deref(),
            self.active_field.as_deref(),
            self.deleted_field.as_deref(),
        ];

        let typed = self.field_types.keys().map(String::as_str).map(Some);
        for field in special.into_iter().chain(typed).flatten() {
            if !self.field_exists(field) {
                return Err(ConfigError::InvalidEntity {
                    entity_type: self.entity_type.clone(),
                    message: format!("field '{}' is not declared", field),
                });
            }
        }

        for (name, rel) in &self.relationships {
            if let RelationKind::BelongsTo { foreign_key } = &rel.kind {
                if !self.field_exists(foreign_key) {
                    return Err(ConfigError::InvalidEntity {
                        entity_type: self.entity_type.clone(),
                        message: format!(
                            "relationship '{}' uses undeclared foreign key '{}'",
                            name, foreign_key
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

impl EntitySchema for EntityDescriptor {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.entity_type)
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    fn relationships(&self) -> &IndexMap<String, Relationship> {
        &self.relationships
    }

    fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field_types.get(name).copied()
    }

    fn tenant_field(&self) -> Option<&str> {
        self.tenant_field.as_deref()
    }

    fn owner_field(&self) -> Option<&str> {
        self.owner_field.as_deref()
    }

    fn department_field(&self) -> Option<&str> {
        self.department_field.as_deref()
    }

    fn timestamp_field(&self) -> Option<&str> {
        self.timestamp_field.as_deref()
    }

    fn active_field(&self) -> Option<&str> {
        self.active_field.as_deref()
    }

    fn deleted_field(&self) -> Option<&str> {
        self.deleted_field.as_deref()
    }
}

/// Registry for all entity schemas in the application
#[derive(Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<dyn EntitySchema>>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register a schema under its entity type. Re-registering replaces.
    pub fn register(&mut self, schema: Arc<dyn EntitySchema>) {
        let entity_type = schema.entity_type().to_string();
        self.schemas.insert(entity_type, schema);
    }

    /// Build a registry from descriptors, validating each one and every
    /// relationship target.
    pub fn from_descriptors(descriptors: Vec<EntityDescriptor>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            registry.register(Arc::new(descriptor));
        }
        registry.validate_relationships()?;
        Ok(registry)
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn EntitySchema>> {
        self.schemas.get(entity_type).cloned()
    }

    /// Get all registered entity types (sorted)
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    fn validate_relationships(&self) -> Result<(), ConfigError> {
        for schema in self.schemas.values() {
            for (name, rel) in schema.relationships() {
                let Some(target) = self.schemas.get(&rel.target) else {
                    return Err(ConfigError::InvalidEntity {
                        entity_type: schema.entity_type().to_string(),
                        message: format!(
                            "relationship '{}' targets unknown entity '{}'",
                            name, rel.target
                        ),
                    });
                };
                if let RelationKind::HasMany { foreign_key } = &rel.kind {
                    if !target.field_exists(foreign_key) {
                        return Err(ConfigError::InvalidEntity {
                            entity_type: schema.entity_type().to_string(),
                            message: format!(
                                "relationship '{}' uses '{}' which '{}' does not declare",
                                name, foreign_key, rel.target
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
