//! # Scoped Resources
//!
//! A context-aware resource access layer: callers shape ad-hoc queries with
//! filters, sort keys, pagination and includes, and every query is narrowed
//! by the mandatory access constraints of the caller's security context
//! before it reaches the store.
//!
//! ## Pipeline
//!
//! - **Context Resolver**: request metadata → [`SecurityContext`](core::SecurityContext)
//! - **Query Normalizer**: raw JSON:API parameters → [`QueryDescription`](core::QueryDescription)
//! - **Access Policy Engine**: tenant isolation, allow-lists, ownership, role
//!   and temporal rules → [`EffectiveQuery`](core::EffectiveQuery)
//! - **Query Executor**: count and page fetch against a [`ResourceStore`](core::ResourceStore)
//! - **Resource Renderer**: rows → `{ data, included, meta }`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scoped::prelude::*;
//!
//! let config = AccessConfig::from_yaml_file("access.yaml")?;
//! let store = Arc::new(InMemoryStore::new());
//! let service = ResourceService::from_config(&config, store)?;
//!
//! let ctx = SecurityContext::for_user(
//!     UserContext::new("u1").with_workspace("ws-1").with_roles(["viewer"]),
//! );
//! let raw = RawQuery::new()
//!     .page(1, 20)
//!     .filter(json!({"pages": {"$gte": 100}}))
//!     .sort("-created_at")
//!     .include("author");
//!
//! let document = service.get_all("books", &raw, &ctx).await?;
//! ```

pub mod config;
pub mod core;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AccessError, AccessPolicyEngine, EffectiveQuery, EntityDescriptor, EntitySchema,
        FieldType, FieldValue, FilterOp, QueryDescription, QueryExecutor, QueryNormalizer, RawQuery,
        Relationship, ResourceDocument, ResourceRenderer, ResourceService, ResourceStore, Row,
        SchemaRegistry,
    };

    // === Context ===
    pub use crate::core::{
        CallerIdentity, ContextExtractor, ContextResolver, DefaultContextExtractor,
        RequestInfo, RequestMetadata, RoleAccess, SecurityContext, TimeAccess, UserContext,
    };

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryStore;
    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresStore;

    // === Config ===
    pub use crate::config::{
        AccessConfig, LifecycleRule, PaginationConfig, PolicyConfig, RoleConstraint, RoleRule,
    };

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::json;
    pub use std::sync::Arc;
}
