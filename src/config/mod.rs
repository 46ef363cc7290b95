//! Configuration loading and management
//!
//! Everything here is read once at startup and shared read-only.

use crate::core::error::ConfigError;
use crate::core::field::FieldValue;
use crate::core::schema::{EntityDescriptor, SchemaRegistry};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Pagination defaults and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_page_bounds"))]
pub struct PaginationConfig {
    /// Page size used when the caller does not give one
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub default_size: u64,

    /// Larger requested sizes are clamped to this value
    #[serde(default = "default_max_page_size")]
    #[validate(range(min = 1))]
    pub max_size: u64,
}

fn default_page_size() -> u64 {
    10
}

fn default_max_page_size() -> u64 {
    100
}

fn validate_page_bounds(config: &PaginationConfig) -> Result<(), ValidationError> {
    if config.default_size > config.max_size {
        return Err(ValidationError::new("default_size_exceeds_max_size"));
    }
    Ok(())
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: default_page_size(),
            max_size: default_max_page_size(),
        }
    }
}

/// A predicate template applied for callers holding a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleConstraint {
    /// `field = value`
    Equals { field: String, value: FieldValue },
    /// `field IN context.role_access[key]`
    InRoleAccess { field: String, key: String },
    /// `field = <caller id>`
    EqualsUser { field: String },
}

impl RoleConstraint {
    pub fn field(&self) -> &str {
        match self {
            RoleConstraint::Equals { field, .. } => field,
            RoleConstraint::InRoleAccess { field, .. } => field,
            RoleConstraint::EqualsUser { field } => field,
        }
    }
}

/// Constraints applied to every caller holding `role`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: String,
    pub constraints: Vec<RoleConstraint>,
}

/// Static temporal/lifecycle rule applied to non-admin callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct LifecycleRule {
    /// Only rows whose active flag is true and soft-delete marker is null
    #[serde(default)]
    pub only_active: bool,

    /// Only rows whose timestamp lies within the last N days
    #[serde(default)]
    #[validate(range(min = 1, max = 36500))]
    pub window_days: Option<i64>,
}

/// Access policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Role granting tenant-wide access
    #[serde(default = "default_admin_role")]
    pub admin_role: String,

    /// Entity types never restricted by ownership
    #[serde(default)]
    pub read_only_entities: Vec<String>,

    /// Let contexts without identity through (restricted by `anonymous_roles`)
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Role rules applied to anonymous callers when they are allowed
    #[serde(default)]
    pub anonymous_roles: Vec<String>,

    #[serde(default)]
    pub role_rules: Vec<RoleRule>,

    #[serde(default)]
    pub lifecycle: Option<LifecycleRule>,
}

fn default_admin_role() -> String {
    "admin".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
            read_only_entities: Vec::new(),
            allow_anonymous: false,
            anonymous_roles: Vec::new(),
            role_rules: Vec::new(),
            lifecycle: None,
        }
    }
}

impl PolicyConfig {
    /// Policy mirroring the stock deployment: managers see their teams,
    /// supervisors their direct reports' records, viewers published public
    /// content only.
    pub fn standard() -> Self {
        Self {
            read_only_entities: vec![
                "role".to_string(),
                "permission".to_string(),
                "resourcetype".to_string(),
            ],
            role_rules: vec![
                RoleRule {
                    role: "manager".to_string(),
                    constraints: vec![RoleConstraint::InRoleAccess {
                        field: "team_id".to_string(),
                        key: "team_ids".to_string(),
                    }],
                },
                RoleRule {
                    role: "supervisor".to_string(),
                    constraints: vec![RoleConstraint::InRoleAccess {
                        field: "created_by".to_string(),
                        key: "direct_report_ids".to_string(),
                    }],
                },
                RoleRule {
                    role: "viewer".to_string(),
                    constraints: vec![
                        RoleConstraint::Equals {
                            field: "status".to_string(),
                            value: FieldValue::from("published"),
                        },
                        RoleConstraint::Equals {
                            field: "is_public".to_string(),
                            value: FieldValue::Boolean(true),
                        },
                    ],
                },
            ],
            ..Self::default()
        }
    }

    pub fn is_read_only(&self, entity_type: &str) -> bool {
        self.read_only_entities
            .iter()
            .any(|e| e.eq_ignore_ascii_case(entity_type))
    }

    pub fn rules_for<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a RoleRule> + 'a {
        self.role_rules.iter().filter(move |rule| rule.role == role)
    }
}

/// Complete configuration of the access layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// Emit audit events for every access
    #[serde(default = "default_audit_logging")]
    pub audit_logging: bool,

    /// Statically declared entity schemas
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
}

fn default_audit_logging() -> bool {
    true
}

impl AccessConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pagination
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                field: "pagination".to_string(),
                message: e.to_string(),
            })?;

        if self.policy.admin_role.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "policy.admin_role".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if let Some(lifecycle) = &self.policy.lifecycle {
            lifecycle.validate().map_err(|e| ConfigError::InvalidValue {
                field: "policy.lifecycle".to_string(),
                message: e.to_string(),
            })?;
        }

        for entity in &self.entities {
            entity.validate()?;
        }
        Ok(())
    }

    /// Build the schema registry from the declared entities
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        SchemaRegistry::from_descriptors(self.entities.clone())
    }

    /// Create a default configuration for testing
    pub fn default_config() -> Self {
        Self {
            pagination: PaginationConfig::default(),
            policy: PolicyConfig::standard(),
            audit_logging: true,
            entities: Vec::new(),
        }
    }
}
