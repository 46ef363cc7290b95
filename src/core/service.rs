//! Resource service: the normalize → apply → execute → render pipeline

use crate::config::AccessConfig;
use crate::core::context::SecurityContext;
use crate::core::error::{AccessError, EntityError};
use crate::core::executor::{QueryExecutor, ResourceStore};
use crate::core::normalizer::QueryNormalizer;
use crate::core::policy::{AccessPolicyEngine, EffectiveQuery};
use crate::core::query::{Page, RawQuery};
use crate::core::render::{ResourceDocument, ResourceRenderer};
use crate::core::schema::{EntitySchema, SchemaRegistry};
use std::sync::Arc;

/// Read access to every registered entity type, scoped by the caller's context
///
/// Cheap to share: all state is read-only after construction.
pub struct ResourceService {
    registry: Arc<SchemaRegistry>,
    normalizer: QueryNormalizer,
    policy: AccessPolicyEngine,
    executor: QueryExecutor,
    renderer: ResourceRenderer,
    audit_logging: bool,
}

impl ResourceService {
    pub fn new(
        config: &AccessConfig,
        registry: SchemaRegistry,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let policy = AccessPolicyEngine::new(config.policy.clone());
        Self {
            normalizer: QueryNormalizer::new(config.pagination).with_registry(registry.clone()),
            executor: QueryExecutor::new(store, registry.clone(), policy.clone()),
            policy,
            renderer: ResourceRenderer::new(registry.clone()),
            audit_logging: config.audit_logging,
            registry,
        }
    }

    /// Build a service for the entities declared in `config`
    pub fn from_config(
        config: &AccessConfig,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self, AccessError> {
        let registry = config.registry()?;
        Ok(Self::new(config, registry, store))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn schema(&self, entity_type: &str) -> Result<Arc<dyn EntitySchema>, EntityError> {
        self.registry
            .get(entity_type)
            .ok_or_else(|| EntityError::UnknownType {
                entity_type: entity_type.to_string(),
            })
    }

    /// List the resources of `entity_type` visible to the caller
    pub async fn get_all(
        &self,
        entity_type: &str,
        raw: &RawQuery,
        ctx: &SecurityContext,
    ) -> Result<ResourceDocument, AccessError> {
        let schema = self.schema(entity_type)?;
        let query = self.normalizer.normalize(raw, schema.as_ref())?;
        let effective = self.policy.apply(query, ctx, schema.as_ref());

        self.audit("get_all", ctx, schema.as_ref(), &effective);

        let result = self.executor.execute(&effective, schema.as_ref(), ctx).await?;
        Ok(self.renderer.render_many(
            &result.rows,
            result.total,
            &effective.query,
            schema.as_ref(),
        ))
    }

    /// Fetch one resource by primary key
    ///
    /// A row outside the caller's scope is reported exactly like a missing one.
    pub async fn get_one(
        &self,
        entity_type: &str,
        id: &str,
        raw: &RawQuery,
        ctx: &SecurityContext,
    ) -> Result<ResourceDocument, AccessError> {
        let schema = self.schema(entity_type)?;
        let mut query = self.normalizer.normalize(raw, schema.as_ref())?;
        query.page = Page::new(1, 1);
        query.sort.clear();

        let effective = self
            .policy
            .apply(query, ctx, schema.as_ref())
            .with_primary_key(schema.primary_key_field(), id);

        self.audit("get_one", ctx, schema.as_ref(), &effective);

        let result = self.executor.execute(&effective, schema.as_ref(), ctx).await?;
        let Some(row) = result.rows.first() else {
            return Err(EntityError::NotFound {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            }
            .into());
        };

        Ok(self
            .renderer
            .render_one(row, &effective.query, schema.as_ref()))
    }

    fn audit(
        &self,
        operation: &str,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
        effective: &EffectiveQuery,
    ) {
        if !self.audit_logging || !ctx.features.audit_logging {
            return;
        }

        let constraints = effective
            .injected
            .iter()
            .map(|c| format!("{:?}:{}:{}", c.step, c.field, c.op.name()))
            .collect::<Vec<_>>()
            .join(",");

        tracing::info!(
            target: "audit",
            user_id = ctx.user_id().unwrap_or("anonymous"),
            operation = operation,
            entity = schema.entity_type(),
            request_id = %ctx.request.request_id,
            timestamp = %ctx.request.timestamp.to_rfc3339(),
            tenant_id = ctx.tenant_id.as_deref().unwrap_or(""),
            ip = ctx.request.ip_address.as_deref().unwrap_or(""),
            user_agent = ctx.request.user_agent.as_deref().unwrap_or(""),
            origin = ctx.request.origin.as_deref().unwrap_or(""),
            denied = effective.is_denied(),
            constraints = %constraints,
            "resource access"
        );
    }
}
