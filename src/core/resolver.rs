//! Context resolution: inbound request metadata → [`SecurityContext`]
//!
//! The upstream authentication layer stores a verified [`CallerIdentity`] in
//! the request extensions. [`RequestMetadata`] gathers it together with the
//! headers and connection info, and the [`ContextResolver`] turns that into a
//! normalized context using either the default strategy or a caller-supplied
//! [`ContextExtractor`].
//!
//! Resolution never fails: any extraction error degrades to an anonymous
//! context, which the policy engine then treats as a denial condition.

use crate::core::context::{FeatureFlags, RequestInfo, SecurityContext, UserContext};
use anyhow::Result;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Verified caller identity placed in request extensions by authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub accessible_ids: Option<Vec<String>>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl CallerIdentity {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            workspace_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            email: None,
            accessible_ids: None,
            department_id: None,
            session_id: None,
        }
    }
}

/// Everything the resolver may look at, captured from one request
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub identity: Option<CallerIdentity>,
    pub headers: HeaderMap,
    pub method: Option<Method>,
    pub path: Option<String>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestMetadata {
    /// Capture metadata from request parts
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            identity: parts.extensions.get::<CallerIdentity>().cloned(),
            headers: parts.headers.clone(),
            method: Some(parts.method.clone()),
            path: Some(parts.uri.path().to_string()),
            remote_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    /// Capture metadata from a full request (body untouched)
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            identity: req.extensions().get::<CallerIdentity>().cloned(),
            headers: req.headers().clone(),
            method: Some(req.method().clone()),
            path: Some(req.uri().path().to_string()),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    pub fn with_identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Header value as UTF-8 text, if present and valid
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Best-effort request info, used by every strategy and by the fallback
    pub fn request_info(&self) -> RequestInfo {
        let forwarded_for = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());

        RequestInfo {
            request_id: self
                .header("x-request-id")
                .map(str::to_string)
                .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4())),
            timestamp: Utc::now(),
            origin: self.header("origin").map(str::to_string),
            ip_address: self
                .remote_addr
                .map(|addr| addr.ip().to_string())
                .or(forwarded_for),
            user_agent: self.header("user-agent").map(str::to_string),
            api_version: self.header("api-version").unwrap_or("1.0").to_string(),
            endpoint: self.path.clone(),
            method: self.method.as_ref().map(|m| m.to_string()),
            session_id: self.identity.as_ref().and_then(|i| i.session_id.clone()),
            csrf_token: self.header("x-csrf-token").map(str::to_string),
        }
    }
}

impl<S> FromRequestParts<S> for RequestMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Strategy turning request metadata into a security context
pub trait ContextExtractor: Send + Sync {
    fn extract(&self, request: &RequestMetadata) -> Result<SecurityContext>;
}

impl<F> ContextExtractor for F
where
    F: Fn(&RequestMetadata) -> Result<SecurityContext> + Send + Sync,
{
    fn extract(&self, request: &RequestMetadata) -> Result<SecurityContext> {
        self(request)
    }
}

/// Default strategy: identity from extensions, tenant and metadata from headers
///
/// The `x-tenant-id` header, when present, replaces the identity's workspace
/// as the tenant scope. It is trusted as-is: deployments must strip or verify
/// it at the gateway, or build the resolver with
/// [`without_tenant_header`](Self::without_tenant_header) so the tenant always
/// comes from the verified identity.
#[derive(Debug, Clone)]
pub struct DefaultContextExtractor {
    tenant_header: Option<String>,
}

impl Default for DefaultContextExtractor {
    fn default() -> Self {
        Self {
            tenant_header: Some("x-tenant-id".to_string()),
        }
    }
}

impl DefaultContextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore tenant override headers; the tenant always comes from the
    /// identity's workspace.
    pub fn without_tenant_header(mut self) -> Self {
        self.tenant_header = None;
        self
    }
}

impl ContextExtractor for DefaultContextExtractor {
    fn extract(&self, request: &RequestMetadata) -> Result<SecurityContext> {
        let info = request.request_info();

        let Some(identity) = &request.identity else {
            return Ok(SecurityContext::anonymous(info));
        };

        let header_tenant = self
            .tenant_header
            .as_deref()
            .and_then(|name| request.header(name))
            .map(str::to_string);

        let user = UserContext {
            id: identity.id.clone(),
            workspace_id: identity.workspace_id.clone(),
            roles: identity.roles.clone(),
            permissions: identity.permissions.clone(),
            email: identity.email.clone(),
            accessible_ids: identity.accessible_ids.clone(),
            department_id: identity.department_id.clone(),
        };

        let features = FeatureFlags {
            advanced_search: user.has_role("admin"),
            beta_features: user.has_role("beta-tester"),
            audit_logging: true,
        };

        let mut ctx = SecurityContext::for_user(user);
        ctx.tenant_id = header_tenant.or(ctx.tenant_id);
        ctx.request = info;
        ctx.features = features;
        Ok(ctx)
    }
}

/// Resolves the security context of a request
#[derive(Clone)]
pub struct ContextResolver {
    default: Arc<dyn ContextExtractor>,
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultContextExtractor::new()))
    }
}

impl ContextResolver {
    pub fn new(default: Arc<dyn ContextExtractor>) -> Self {
        Self { default }
    }

    /// Resolve a context. An override strategy, when given, is used
    /// exclusively and its output trusted as-is.
    pub fn resolve(
        &self,
        request: &RequestMetadata,
        override_strategy: Option<&dyn ContextExtractor>,
    ) -> SecurityContext {
        let strategy = override_strategy.unwrap_or(self.default.as_ref());

        match strategy.extract(request) {
            Ok(ctx) => {
                tracing::debug!(
                    request_id = %ctx.request.request_id,
                    user_id = ctx.user_id().unwrap_or("anonymous"),
                    tenant_id = ctx.tenant_id.as_deref().unwrap_or("-"),
                    custom = override_strategy.is_some(),
                    "security context resolved"
                );
                ctx
            }
            Err(e) => {
                tracing::warn!(error = %e, "context extraction failed, falling back to anonymous");
                SecurityContext::anonymous(request.request_info())
            }
        }
    }
}
