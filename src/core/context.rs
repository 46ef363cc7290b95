//! Security context threaded through every stage of a request
//!
//! A [`SecurityContext`] is resolved once per request and never mutated
//! afterwards. Stages receive it by reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: String,

    /// Workspace the user belongs to (tenant fallback)
    #[serde(default)]
    pub workspace_id: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Externally computed allow-list of primary keys
    ///
    /// `None` means no allow-list applies. `Some(vec![])` means the caller
    /// may access nothing.
    #[serde(default)]
    pub accessible_ids: Option<Vec<String>>,

    #[serde(default)]
    pub department_id: Option<String>,
}

impl UserContext {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            workspace_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            email: None,
            accessible_ids: None,
            department_id: None,
        }
    }

    pub fn with_workspace(mut self, workspace_id: &str) -> Self {
        self.workspace_id = Some(workspace_id.to_string());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accessible_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accessible_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_department(mut self, department_id: &str) -> Self {
        self.department_id = Some(department_id.to_string());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Metadata about the inbound request, kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub api_version: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

impl RequestInfo {
    /// Request info with a generated id and nothing else known
    pub fn generated() -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            origin: None,
            ip_address: None,
            user_agent: None,
            api_version: "1.0".to_string(),
            endpoint: None,
            method: None,
            session_id: None,
            csrf_token: None,
        }
    }
}

/// Role-specific access parameters, keyed by name (e.g. `team_ids`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleAccess(BTreeMap<String, Vec<String>>);

impl RoleAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, ids: Vec<String>) -> Self {
        self.0.insert(key.to_string(), ids);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-request temporal access window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeAccess {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Restrict to active, non-deleted rows
    #[serde(default)]
    pub only_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub advanced_search: bool,
    pub beta_features: bool,
    pub audit_logging: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            advanced_search: false,
            beta_features: false,
            audit_logging: true,
        }
    }
}

/// Normalized security context of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// `None` for anonymous callers
    pub user: Option<UserContext>,

    /// Tenant the request is scoped to
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub role_access: RoleAccess,

    #[serde(default)]
    pub time_access: Option<TimeAccess>,

    pub request: RequestInfo,

    #[serde(default)]
    pub features: FeatureFlags,
}

impl SecurityContext {
    /// Context without identity, tenant or permissions
    pub fn anonymous(request: RequestInfo) -> Self {
        Self {
            user: None,
            tenant_id: None,
            role_access: RoleAccess::new(),
            time_access: None,
            request,
            features: FeatureFlags::default(),
        }
    }

    /// Context for an authenticated user, tenant taken from their workspace
    pub fn for_user(user: UserContext) -> Self {
        Self {
            tenant_id: user.workspace_id.clone(),
            user: Some(user),
            role_access: RoleAccess::new(),
            time_access: None,
            request: RequestInfo::generated(),
            features: FeatureFlags::default(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn with_role_access(mut self, role_access: RoleAccess) -> Self {
        self.role_access = role_access;
        self
    }

    pub fn with_time_access(mut self, time_access: TimeAccess) -> Self {
        self.time_access = Some(time_access);
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn roles(&self) -> &[String] {
        self.user.as_ref().map(|u| u.roles.as_slice()).unwrap_or(&[])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    pub fn accessible_ids(&self) -> Option<&[String]> {
        self.user
            .as_ref()
            .and_then(|u| u.accessible_ids.as_deref())
    }
}
