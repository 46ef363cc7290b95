//! Access policy engine
//!
//! Layers the mandatory constraints derived from a [`SecurityContext`] on top
//! of a caller's normalized query. Steps run in a fixed order and only ever
//! add conditions; a caller filter on the same field stays in place and the
//! two are AND-ed, so the caller can narrow a policy constraint but never
//! widen it.

use crate::config::{PolicyConfig, RoleConstraint};
use crate::core::context::SecurityContext;
use crate::core::field::FieldValue;
use crate::core::query::{FilterOp, Page, QueryDescription};
use crate::core::schema::EntitySchema;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;

/// Policy step that injected a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStep {
    Tenant,
    AllowList,
    Ownership,
    Role,
    Department,
    TimeWindow,
    Lifecycle,
}

/// One constraint added by the policy engine, kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectedConstraint {
    pub step: PolicyStep,
    pub field: String,
    pub op: FilterOp,
}

/// Why a query was denied outright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Anonymous,
    EmptyAllowList,
}

/// The merged query actually sent to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveQuery {
    pub query: QueryDescription,
    pub injected: Vec<InjectedConstraint>,
    /// Set when the caller may see nothing; the executor must not run
    pub denied: Option<DenyReason>,
}

impl EffectiveQuery {
    pub fn is_denied(&self) -> bool {
        self.denied.is_some()
    }

    /// Constrain the primary key to a single value (single-resource reads)
    pub fn with_primary_key(mut self, pk_field: &str, id: &str) -> Self {
        self.query
            .filter
            .and(pk_field, FilterOp::Eq(FieldValue::from(id)));
        self
    }
}

struct Injector<'a> {
    entity_type: &'a str,
    query: QueryDescription,
    injected: Vec<InjectedConstraint>,
}

impl Injector<'_> {
    fn inject(&mut self, step: PolicyStep, field: &str, op: FilterOp) {
        tracing::debug!(
            entity = self.entity_type,
            step = ?step,
            field = field,
            op = op.name(),
            "injecting access constraint"
        );
        self.query.filter.and(field, op.clone());
        self.injected.push(InjectedConstraint {
            step,
            field: field.to_string(),
            op,
        });
    }
}

/// Applies the configured access policy to normalized queries
#[derive(Debug, Clone, Default)]
pub struct AccessPolicyEngine {
    policy: Arc<PolicyConfig>,
}

impl AccessPolicyEngine {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Produce the effective query for `query` under `ctx`
    pub fn apply(
        &self,
        query: QueryDescription,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
    ) -> EffectiveQuery {
        self.scope(query, ctx, schema, true)
    }

    /// Constraints for rows of `schema` reached through an include
    ///
    /// Every step applies except the allow-list, which names ids of the
    /// primary entity only.
    pub fn scope_related(&self, ctx: &SecurityContext, schema: &dyn EntitySchema) -> EffectiveQuery {
        self.scope(QueryDescription::new(Page::new(1, 1)), ctx, schema, false)
    }

    fn scope(
        &self,
        query: QueryDescription,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
        with_allow_list: bool,
    ) -> EffectiveQuery {
        let mut injector = Injector {
            entity_type: schema.entity_type(),
            query,
            injected: Vec::new(),
        };

        if let (Some(field), Some(tenant)) = (schema.tenant_field(), ctx.tenant_id.as_deref()) {
            injector.inject(PolicyStep::Tenant, field, FilterOp::Eq(FieldValue::from(tenant)));
        }

        let denied = self.restrict(&mut injector, ctx, schema, with_allow_list);
        if let Some(reason) = denied {
            tracing::debug!(
                entity = schema.entity_type(),
                reason = ?reason,
                "access denied by policy"
            );
        }

        EffectiveQuery {
            query: injector.query,
            injected: injector.injected,
            denied,
        }
    }

    fn restrict(
        &self,
        injector: &mut Injector<'_>,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
        with_allow_list: bool,
    ) -> Option<DenyReason> {
        let Some(user) = ctx.user.as_ref() else {
            if !self.policy.allow_anonymous {
                return Some(DenyReason::Anonymous);
            }
            for role in &self.policy.anonymous_roles {
                self.apply_role_rules(injector, role, ctx, schema);
            }
            self.apply_temporal(injector, ctx, schema);
            return None;
        };

        let allow_list = user.accessible_ids.as_deref().filter(|_| with_allow_list);
        if allow_list.is_some_and(<[String]>::is_empty) {
            return Some(DenyReason::EmptyAllowList);
        }

        if user.has_role(&self.policy.admin_role) {
            return None;
        }

        match allow_list {
            Some(ids) => {
                let ids = ids.iter().map(|id| FieldValue::from(id.as_str())).collect();
                injector.inject(
                    PolicyStep::AllowList,
                    schema.primary_key_field(),
                    FilterOp::In(ids),
                );
            }
            None => {
                if let Some(owner) = schema.owner_field() {
                    if !self.policy.is_read_only(schema.entity_type()) {
                        injector.inject(
                            PolicyStep::Ownership,
                            owner,
                            FilterOp::Eq(FieldValue::from(user.id.as_str())),
                        );
                    }
                }

                for role in &user.roles {
                    self.apply_role_rules(injector, role, ctx, schema);
                }

                if let (Some(field), Some(department)) =
                    (schema.department_field(), user.department_id.as_deref())
                {
                    injector.inject(
                        PolicyStep::Department,
                        field,
                        FilterOp::Eq(FieldValue::from(department)),
                    );
                }
            }
        }

        self.apply_temporal(injector, ctx, schema);
        None
    }

    fn apply_role_rules(
        &self,
        injector: &mut Injector<'_>,
        role: &str,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
    ) {
        for rule in self.policy.rules_for(role) {
            for constraint in &rule.constraints {
                if !schema.field_exists(constraint.field()) {
                    continue;
                }
                let op = match constraint {
                    RoleConstraint::Equals { value, .. } => Some(FilterOp::Eq(value.clone())),
                    RoleConstraint::InRoleAccess { key, .. } => ctx.role_access.get(key).map(|ids| {
                        FilterOp::In(ids.iter().map(|id| FieldValue::from(id.as_str())).collect())
                    }),
                    RoleConstraint::EqualsUser { .. } => ctx
                        .user_id()
                        .map(|id| FilterOp::Eq(FieldValue::from(id))),
                };
                match op {
                    Some(op) => injector.inject(PolicyStep::Role, constraint.field(), op),
                    None => tracing::debug!(
                        role,
                        field = constraint.field(),
                        "role constraint skipped, context value missing"
                    ),
                }
            }
        }
    }

    fn apply_temporal(
        &self,
        injector: &mut Injector<'_>,
        ctx: &SecurityContext,
        schema: &dyn EntitySchema,
    ) {
        let mut only_active = false;

        if let Some(window) = &ctx.time_access {
            if let Some(field) = schema.timestamp_field() {
                if let Some(start) = window.start {
                    injector.inject(PolicyStep::TimeWindow, field, FilterOp::Gte(start.into()));
                }
                if let Some(end) = window.end {
                    injector.inject(PolicyStep::TimeWindow, field, FilterOp::Lte(end.into()));
                }
            }
            only_active |= window.only_active;
        }

        if let Some(lifecycle) = &self.policy.lifecycle {
            if let (Some(days), Some(field)) = (lifecycle.window_days, schema.timestamp_field()) {
                // Relative to the request, so replays of one context agree
                let since = Duration::try_days(days)
                    .and_then(|window| ctx.request.timestamp.checked_sub_signed(window));
                match since {
                    Some(since) => {
                        injector.inject(PolicyStep::Lifecycle, field, FilterOp::Gte(since.into()))
                    }
                    None => tracing::warn!(
                        entity = schema.entity_type(),
                        window_days = days,
                        "lifecycle window out of range, constraint skipped"
                    ),
                }
            }
            only_active |= lifecycle.only_active;
        }

        if only_active {
            if let Some(field) = schema.active_field() {
                injector.inject(PolicyStep::Lifecycle, field, FilterOp::Eq(true.into()));
            }
            if let Some(field) = schema.deleted_field() {
                injector.inject(PolicyStep::Lifecycle, field, FilterOp::Eq(FieldValue::Null));
            }
        }
    }
}
