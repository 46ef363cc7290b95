//! Core module containing the access pipeline and its value types

pub mod context;
pub mod error;
pub mod executor;
pub mod field;
pub mod normalizer;
pub mod policy;
pub mod query;
pub mod render;
pub mod resolver;
pub mod schema;
pub mod service;

pub use context::{FeatureFlags, RequestInfo, RoleAccess, SecurityContext, TimeAccess, UserContext};
pub use error::{AccessError, ConfigError, EntityError, ErrorResponse, ExecutionError, InvalidQueryError};
pub use executor::{Predicate, QueryExecutor, QueryResult, Related, ResourceStore, Row, StoreQuery};
pub use field::{FieldType, FieldValue};
pub use normalizer::QueryNormalizer;
pub use policy::{AccessPolicyEngine, DenyReason, EffectiveQuery, InjectedConstraint, PolicyStep};
pub use query::{FilterMap, FilterOp, Page, PageMeta, QueryDescription, RawQuery, SortDirection, SortKey};
pub use render::{PrimaryData, Resource, ResourceDocument, ResourceIdentifier, ResourceRenderer};
pub use resolver::{
    CallerIdentity, ContextExtractor, ContextResolver, DefaultContextExtractor, RequestMetadata,
};
pub use schema::{EntityDescriptor, EntitySchema, RelationKind, Relationship, SchemaRegistry};
pub use service::ResourceService;
