//! PostgreSQL storage backend using sqlx.
//!
//! Compiles a [`StoreQuery`] into parameterized SQL with `QueryBuilder` and
//! reads rows back as `to_jsonb(t)`, so any table shape can be served
//! without per-entity row types.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! scoped-resources = { version = "0.1", features = ["postgres"] }
//! ```

use crate::core::error::ExecutionError;
use crate::core::executor::{Predicate, ResourceStore, Row, StoreQuery};
use crate::core::field::FieldValue;
use crate::core::query::{FilterOp, SortDirection};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Resource store backed by PostgreSQL.
///
/// Each entity maps to one table; columns are addressed by the entity's
/// declared field names.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new `PostgresStore` with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResourceStore for PostgresStore {
    async fn count(&self, query: &StoreQuery) -> Result<u64, ExecutionError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        push_table(&mut builder, &query.table);
        builder.push(" WHERE ");
        push_predicate(&mut builder, &query.predicate);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| with_entity(e, &query.table))?;
        Ok(count.max(0) as u64)
    }

    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Row>, ExecutionError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) FROM ");
        push_table(&mut builder, &query.table);
        builder.push(" WHERE ");
        push_predicate(&mut builder, &query.predicate);

        if !query.sort.is_empty() {
            builder.push(" ORDER BY ");
            for (i, key) in query.sort.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push(quote_ident(&key.field));
                builder.push(match key.direction {
                    SortDirection::Asc => " ASC NULLS LAST",
                    SortDirection::Desc => " DESC NULLS FIRST",
                });
            }
        }
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ");
            builder.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let values: Vec<Value> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| with_entity(e, &query.table))?;

        values
            .into_iter()
            .map(|value| match value {
                Value::Object(object) => Ok(Row::from_json_object(&object).project(&query.fields)),
                other => Err(ExecutionError::Decode {
                    entity_type: query.table.clone(),
                    message: format!("expected a JSON object, got {}", other),
                }),
            })
            .collect()
    }
}

fn with_entity(err: sqlx::Error, table: &str) -> ExecutionError {
    match ExecutionError::from(err) {
        ExecutionError::Query { message, .. } => ExecutionError::Query {
            entity_type: table.to_string(),
            message,
        },
        other => other,
    }
}

/// Double-quote an identifier, escaping embedded quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_table(builder: &mut QueryBuilder<'_, Postgres>, table: &str) {
    let qualified = table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".");
    builder.push(qualified);
    builder.push(" AS t");
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::And(clauses) if clauses.is_empty() => {
            builder.push("TRUE");
        }
        Predicate::And(clauses) => {
            builder.push("(");
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    builder.push(" AND ");
                }
                push_predicate(builder, clause);
            }
            builder.push(")");
        }
        Predicate::Compare { field, op } => push_condition(builder, field, op),
    }
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, field: &str, op: &FilterOp) {
    let column = quote_ident(field);
    match op {
        FilterOp::Eq(FieldValue::Null) => {
            builder.push(format!("{} IS NULL", column));
        }
        FilterOp::Ne(FieldValue::Null) => {
            builder.push(format!("{} IS NOT NULL", column));
        }
        FilterOp::Eq(value) => push_equality(builder, &column, "=", value),
        FilterOp::Ne(value) => push_equality(builder, &column, "<>", value),
        FilterOp::In(values) => {
            let values: Vec<&FieldValue> = values.iter().filter(|v| !v.is_null()).collect();
            if values.is_empty() {
                builder.push("FALSE");
                return;
            }
            let textual = values.iter().any(|v| compares_as_text(v));
            if textual {
                builder.push(format!("{}::text IN (", column));
            } else {
                builder.push(format!("{} IN (", column));
            }
            let mut list = builder.separated(", ");
            for value in values {
                if textual {
                    list.push_bind(value.as_key());
                } else {
                    push_native(&mut list, value);
                }
            }
            list.push_unseparated(")");
        }
        FilterOp::Gt(value) => push_range(builder, &column, ">", value),
        FilterOp::Lt(value) => push_range(builder, &column, "<", value),
        FilterOp::Gte(value) => push_range(builder, &column, ">=", value),
        FilterOp::Lte(value) => push_range(builder, &column, "<=", value),
        FilterOp::Contains(needle) => {
            builder.push(format!("{}::text ILIKE ", column));
            builder.push_bind(format!("%{}%", escape_like(needle)));
        }
    }
}

/// Equality goes through the column's text form, so an operand of another
/// type than the column (`{"title": 5}`) matches nothing instead of failing
/// the statement. Timestamps bind natively: their text form depends on the
/// server's `DateStyle`.
fn compares_as_text(value: &FieldValue) -> bool {
    !matches!(value, FieldValue::DateTime(_))
}

fn push_equality(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    operator: &str,
    value: &FieldValue,
) {
    if compares_as_text(value) {
        builder.push(format!("{}::text {} ", column, operator));
        builder.push_bind(value.as_key());
    } else {
        builder.push(format!("{} {} ", column, operator));
        bind_native(builder, value);
    }
}

fn push_range(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    operator: &str,
    value: &FieldValue,
) {
    match value {
        FieldValue::String(s) => match parse_datetime(s) {
            Some(dt) => {
                builder.push(format!("{} {} ", column, operator));
                builder.push_bind(dt);
            }
            None => {
                builder.push(format!("{}::text {} ", column, operator));
                builder.push_bind(s.clone());
            }
        },
        other => {
            builder.push(format!("{} {} ", column, operator));
            bind_native(builder, other);
        }
    }
}

fn bind_native(builder: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::String(s) => builder.push_bind(s.clone()),
        FieldValue::Integer(i) => builder.push_bind(*i),
        FieldValue::Float(f) => builder.push_bind(*f),
        FieldValue::Boolean(b) => builder.push_bind(*b),
        FieldValue::Uuid(u) => builder.push_bind(*u),
        FieldValue::DateTime(dt) => builder.push_bind(*dt),
        FieldValue::Null => builder.push_bind(Option::<String>::None),
    };
}

fn push_native(list: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &str>, value: &FieldValue) {
    match value {
        FieldValue::String(s) => list.push_bind(s.clone()),
        FieldValue::Integer(i) => list.push_bind(*i),
        FieldValue::Float(f) => list.push_bind(*f),
        FieldValue::Boolean(b) => list.push_bind(*b),
        FieldValue::Uuid(u) => list.push_bind(*u),
        FieldValue::DateTime(dt) => list.push_bind(*dt),
        FieldValue::Null => list.push_bind(Option::<String>::None),
    };
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
