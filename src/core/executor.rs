//! Query executor: the single I/O boundary of the pipeline
//!
//! Compiles an [`EffectiveQuery`] into a store-level [`StoreQuery`], runs the
//! count and the page fetch concurrently and loads requested relationships
//! in batches.

use crate::core::error::ExecutionError;
use crate::core::field::FieldValue;
use crate::core::context::SecurityContext;
use crate::core::policy::{AccessPolicyEngine, EffectiveQuery};
use crate::core::query::{FilterMap, FilterOp, SortDirection, SortKey};
use crate::core::schema::{EntitySchema, RelationKind, SchemaRegistry};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Compiled predicate tree handed to stores
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Single column condition
    Compare { field: String, op: FilterOp },
    /// All children must hold; an empty conjunction is true
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn compare(field: &str, op: FilterOp) -> Self {
        Predicate::Compare {
            field: field.to_string(),
            op,
        }
    }

    /// Conjunction of every condition of a filter map
    pub fn from_filter(filter: &FilterMap) -> Self {
        let mut clauses = Vec::with_capacity(filter.len());
        for (field, ops) in filter.iter() {
            for op in ops {
                clauses.push(Predicate::compare(field, op.clone()));
            }
        }
        Predicate::And(clauses)
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut clauses) => {
                clauses.push(other);
                Predicate::And(clauses)
            }
            single => Predicate::And(vec![single, other]),
        }
    }

    /// Evaluate against a row; absent columns read as NULL
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Compare { field, op } => op.matches(row.get(field)),
            Predicate::And(clauses) => clauses.iter().all(|c| c.matches(row)),
        }
    }
}

/// Store-level query for one table
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub table: String,
    /// Columns to return
    pub fields: Vec<String>,
    pub predicate: Predicate,
    /// Total order: caller keys, then the primary key ascending
    pub sort: Vec<SortKey>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl StoreQuery {
    /// Unpaginated query over every declared field of `schema`
    pub fn for_schema(schema: &dyn EntitySchema, predicate: Predicate) -> Self {
        Self {
            table: schema.table_name().to_string(),
            fields: schema.fields().to_vec(),
            predicate,
            sort: vec![SortKey::asc(schema.primary_key_field())],
            offset: None,
            limit: None,
        }
    }
}

/// Related rows attached to a row by include loading
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Row>>),
    Many(Vec<Row>),
}

/// A raw row as returned by a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub fields: IndexMap<String, FieldValue>,
    pub relations: IndexMap<String, Related>,
}

static NULL: FieldValue = FieldValue::Null;

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Column value, NULL when absent
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Build a row from a JSON object. Nested values are kept as JSON text.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .map(|(k, v)| {
                let value =
                    FieldValue::from_json(v).unwrap_or_else(|| FieldValue::String(v.to_string()));
                (k.clone(), value)
            })
            .collect();
        Self {
            fields,
            relations: IndexMap::new(),
        }
    }

    /// Keep only the listed columns, in that order
    pub fn project(&self, fields: &[String]) -> Row {
        Row {
            fields: fields
                .iter()
                .filter_map(|f| self.fields.get(f).map(|v| (f.clone(), v.clone())))
                .collect(),
            relations: self.relations.clone(),
        }
    }
}

/// Compare two rows under a sort specification
pub fn compare_rows(a: &Row, b: &Row, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let (left, right) = (a.get(&key.field), b.get(&key.field));
        // NULLs sort last ascending, first descending (PostgreSQL default)
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Storage collaborator
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Number of rows matching the predicate, ignoring offset and limit
    async fn count(&self, query: &StoreQuery) -> Result<u64, ExecutionError>;

    /// Rows matching the predicate, ordered and windowed
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Row>, ExecutionError>;
}

/// Rows of one page plus the unpaginated match count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct IncludeTree(IndexMap<String, IncludeTree>);

impl IncludeTree {
    fn from_paths(paths: &[String]) -> Self {
        let mut root = IncludeTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.') {
                node = node.0.entry(segment.to_string()).or_default();
            }
        }
        root
    }
}

pub struct QueryExecutor {
    store: Arc<dyn ResourceStore>,
    registry: Arc<SchemaRegistry>,
    /// Scopes included relations the same way primary queries are scoped
    policy: AccessPolicyEngine,
}

impl QueryExecutor {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        registry: Arc<SchemaRegistry>,
        policy: AccessPolicyEngine,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    /// Compile the effective query without executing it
    pub fn compile(&self, effective: &EffectiveQuery, schema: &dyn EntitySchema) -> StoreQuery {
        let query = &effective.query;
        let pk = schema.primary_key_field();

        let mut sort = query.sort.clone();
        if !sort.iter().any(|key| key.field == pk) {
            sort.push(SortKey::asc(pk));
        }

        StoreQuery {
            table: schema.table_name().to_string(),
            fields: schema.fields().to_vec(),
            predicate: Predicate::from_filter(&query.filter),
            sort,
            offset: Some(query.page.offset()),
            limit: Some(query.page.limit()),
        }
    }

    /// Run the effective query. Denied queries never reach the store.
    ///
    /// Included relations are filtered by the policy for their own entity
    /// type under `ctx`, so an include never shows a row a direct query
    /// would hide.
    pub async fn execute(
        &self,
        effective: &EffectiveQuery,
        schema: &dyn EntitySchema,
        ctx: &SecurityContext,
    ) -> Result<QueryResult, ExecutionError> {
        if effective.is_denied() {
            return Ok(QueryResult::empty());
        }

        let store_query = self.compile(effective, schema);
        let (total, mut rows) = futures::try_join!(
            self.store.count(&store_query),
            self.store.fetch(&store_query)
        )?;

        tracing::debug!(
            entity = schema.entity_type(),
            total = total,
            returned = rows.len(),
            "query executed"
        );

        if !rows.is_empty() && !effective.query.include.is_empty() {
            let tree = IncludeTree::from_paths(&effective.query.include);
            self.load_relations(&mut rows, schema, &tree, ctx).await?;
        }

        Ok(QueryResult { rows, total })
    }

    fn load_relations<'a>(
        &'a self,
        rows: &'a mut [Row],
        schema: &'a dyn EntitySchema,
        tree: &'a IncludeTree,
        ctx: &'a SecurityContext,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        async move {
            for (name, subtree) in &tree.0 {
                let Some(relationship) = schema.relationship(name) else {
                    continue;
                };
                let Some(target) = self.registry.get(&relationship.target) else {
                    tracing::warn!(
                        entity = schema.entity_type(),
                        relationship = name.as_str(),
                        target = relationship.target.as_str(),
                        "relationship target is not registered"
                    );
                    continue;
                };

                // to-one: our foreign key → their pk; to-many: our pk → their foreign key
                let (local_field, remote_field) = match &relationship.kind {
                    RelationKind::BelongsTo { foreign_key } => {
                        (foreign_key.as_str(), target.primary_key_field())
                    }
                    RelationKind::HasMany { foreign_key } => {
                        (schema.primary_key_field(), foreign_key.as_str())
                    }
                };

                let mut keys: IndexMap<String, FieldValue> = IndexMap::new();
                for row in rows.iter() {
                    let value = row.get(local_field);
                    if !value.is_null() {
                        keys.entry(value.as_key()).or_insert_with(|| value.clone());
                    }
                }

                let scope = self.policy.scope_related(ctx, target.as_ref());
                let mut related = if keys.is_empty() || scope.is_denied() {
                    Vec::new()
                } else {
                    let predicate = Predicate::from_filter(&scope.query.filter).and(
                        Predicate::compare(remote_field, FilterOp::In(keys.into_values().collect())),
                    );
                    let query = StoreQuery::for_schema(target.as_ref(), predicate);
                    self.store.fetch(&query).await?
                };

                if !subtree.0.is_empty() && !related.is_empty() {
                    self.load_relations(&mut related, target.as_ref(), subtree, ctx)
                        .await?;
                }

                let mut by_key: HashMap<String, Vec<Row>> = HashMap::new();
                for row in related {
                    by_key
                        .entry(row.get(remote_field).as_key())
                        .or_default()
                        .push(row);
                }

                for row in rows.iter_mut() {
                    let value = row.get(local_field);
                    let matches = if value.is_null() {
                        Vec::new()
                    } else {
                        by_key.get(&value.as_key()).cloned().unwrap_or_default()
                    };
                    let attached = if relationship.is_to_one() {
                        Related::One(matches.into_iter().next().map(Box::new))
                    } else {
                        Related::Many(matches)
                    };
                    row.relations.insert(name.clone(), attached);
                }
            }
            Ok(())
        }
        .boxed()
    }
}
