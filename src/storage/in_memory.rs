//! In-memory implementation of ResourceStore for testing and development

use crate::core::error::ExecutionError;
use crate::core::executor::{ResourceStore, Row, StoreQuery, compare_rows};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory resource store
///
/// Tables are plain vectors of rows keyed by table name. Uses RwLock for
/// thread-safe access; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to a table, creating the table on first use
    pub fn insert(&self, table: &str, row: Row) -> Result<(), ExecutionError> {
        let mut tables = self.tables.write().map_err(|e| ExecutionError::Connection {
            message: format!("Failed to acquire write lock: {}", e),
        })?;
        tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    /// Append a row given as a JSON object
    pub fn insert_json(&self, table: &str, value: Value) -> Result<(), ExecutionError> {
        let Value::Object(object) = value else {
            return Err(ExecutionError::Decode {
                entity_type: table.to_string(),
                message: "row must be a JSON object".to_string(),
            });
        };
        self.insert(table, Row::from_json_object(&object))
    }

    /// Remove every row of every table
    pub fn clear(&self) -> Result<(), ExecutionError> {
        let mut tables = self.tables.write().map_err(|e| ExecutionError::Connection {
            message: format!("Failed to acquire write lock: {}", e),
        })?;
        tables.clear();
        Ok(())
    }

    /// Matching rows in sort order, before windowing
    fn matching(&self, query: &StoreQuery) -> Result<Vec<Row>, ExecutionError> {
        let tables = self.tables.read().map_err(|e| ExecutionError::Connection {
            message: format!("Failed to acquire read lock: {}", e),
        })?;

        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.predicate.matches(row))
                    .map(|row| row.project(&query.fields))
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| compare_rows(a, b, &query.sort));
        Ok(rows)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn count(&self, query: &StoreQuery) -> Result<u64, ExecutionError> {
        let tables = self.tables.read().map_err(|e| ExecutionError::Connection {
            message: format!("Failed to acquire read lock: {}", e),
        })?;

        let count = tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|row| query.predicate.matches(row)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Row>, ExecutionError> {
        let rows = self.matching(query)?;
        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::Predicate;
    use crate::core::query::{FilterOp, SortKey};
    use serde_json::json;

    fn query(predicate: Predicate) -> StoreQuery {
        StoreQuery {
            table: "books".to_string(),
            fields: vec!["id".to_string(), "title".to_string()],
            predicate,
            sort: vec![SortKey::asc("id")],
            offset: None,
            limit: None,
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, title) in [(3, "C"), (1, "A"), (2, "B")] {
            store
                .insert_json("books", json!({"id": id, "title": title, "secret": "x"}))
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_fetch_orders_and_projects() {
        let rows = store().fetch(&query(Predicate::always())).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.get("id").as_key()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(rows[0].fields.get("secret").is_none());
    }

    #[tokio::test]
    async fn test_count_ignores_window() {
        let store = store();
        let mut q = query(Predicate::compare("id", FilterOp::Gt(1.into())));
        q.offset = Some(1);
        q.limit = Some(1);
        assert_eq!(store.count(&q).await.unwrap(), 2);
        assert_eq!(store.fetch(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let mut q = query(Predicate::always());
        q.table = "ghosts".to_string();
        assert_eq!(store().count(&q).await.unwrap(), 0);
        assert!(store().fetch(&q).await.unwrap().is_empty());
    }

    #[test]
    fn test_insert_json_requires_object() {
        let result = InMemoryStore::new().insert_json("books", json!([1, 2]));
        assert!(matches!(result, Err(ExecutionError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        clone.insert("books", Row::new().with("id", 1)).unwrap();
        assert_eq!(store.count(&query(Predicate::always())).await.unwrap(), 1);
        store.clear().unwrap();
        assert_eq!(clone.count(&query(Predicate::always())).await.unwrap(), 0);
    }
}
