//! Macro-generated test suite for `ResourceStore` contract validation.
//!
//! The `resource_store_tests!` macro generates a test module that drives a
//! store through the full resource pipeline (normalize → policy → execute →
//! render) over the fixture data and checks the access guarantees every
//! backend must uphold.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//!
//! use store_harness::*;
//!
//! resource_store_tests!(seeded_in_memory_store());
//! ```
//!
//! # Generated Tests
//!
//! ## Scope
//! - `test_admin_sees_whole_tenant_only`: admin of ws-1 never sees ws-2 rows
//! - `test_allow_list_pagination`: ids [1,2,3], size 2 → 2 rows, total 3
//! - `test_allow_list_cannot_cross_tenant`: ids outside the tenant are dropped
//! - `test_empty_allow_list_returns_nothing`: denied, meta still echoes page
//! - `test_ownership_fallback`: plain users see their own rows
//! - `test_viewer_sees_published_public_rows`: role template narrows ownership
//! - `test_manager_team_scope`: team ids from role access
//! - `test_time_window`: context time window on the timestamp field
//!
//! ## Query shaping
//! - `test_caller_filter_narrows`, `test_in_and_contains_operators`
//! - `test_operands_follow_declared_types`: `{"title": 5}` matches nothing,
//!   `"1000"` compares as a number, `"abc"` on an integer field is a 400
//! - `test_sort_with_primary_key_tiebreak`, `test_page_past_the_end`
//! - `test_include_belongs_to`, `test_include_has_many_is_tenant_scoped`
//! - `test_viewer_include_respects_policy`: included rows obey the caller's
//!   role and ownership rules for the related entity
//!
//! ## Single resources & errors
//! - `test_get_one_in_scope`, `test_get_one_out_of_scope_is_not_found`
//! - `test_unknown_entity_type`, `test_repeat_runs_are_identical`

/// Generate a full `ResourceStore` conformance test suite.
///
/// `$factory` must evaluate to an `Arc<dyn ResourceStore>` seeded with
/// [`fixture_rows`]. It is re-evaluated for each test.
#[macro_export]
macro_rules! resource_store_tests {
    ($factory:expr) => {
        mod resource_store_contract_tests {
            use super::*;
            use chrono::{TimeZone, Utc};
            use scoped::core::error::{AccessError, EntityError};
            use scoped::core::query::RawQuery;
            use scoped::core::TimeAccess;
            use serde_json::json;

            // ==================================================================
            // Scope
            // ==================================================================

            #[tokio::test]
            async fn test_admin_sees_whole_tenant_only() {
                init_tracing();
                let service = service($factory);

                let doc = service
                    .get_all("books", &RawQuery::new(), &admin("ws-1"))
                    .await
                    .unwrap();
                assert_ids(&doc, &["1", "2", "3", "4", "5"]);
                assert_eq!(doc.meta.total_items, 5);

                let doc = service
                    .get_all("books", &RawQuery::new(), &admin("ws-2"))
                    .await
                    .unwrap();
                assert_ids(&doc, &["6", "7"]);
            }

            #[tokio::test]
            async fn test_allow_list_pagination() {
                let service = service($factory);
                let raw = RawQuery::new().page(1, 2);

                let doc = service
                    .get_all("books", &raw, &with_allow_list("u7", &["1", "2", "3"]))
                    .await
                    .unwrap();
                assert_eq!(doc.resources().len(), 2);
                assert_eq!(doc.meta.total_items, 3);
                assert_eq!(doc.meta.page_size, 2);
                for id in ids(&doc) {
                    assert!(["1", "2", "3"].contains(&id.as_str()));
                }
            }

            #[tokio::test]
            async fn test_allow_list_cannot_cross_tenant() {
                let service = service($factory);
                let doc = service
                    .get_all("books", &RawQuery::new(), &with_allow_list("u7", &["1", "6", "7"]))
                    .await
                    .unwrap();
                assert_ids(&doc, &["1"]);
            }

            #[tokio::test]
            async fn test_empty_allow_list_returns_nothing() {
                let service = service($factory);
                let raw = RawQuery::new().page(3, 4);
                let doc = service
                    .get_all("books", &raw, &with_allow_list("u1", &[]))
                    .await
                    .unwrap();
                assert!(doc.resources().is_empty());
                assert_eq!(doc.meta.total_items, 0);
                assert_eq!(doc.meta.page_number, 3);
                assert_eq!(doc.meta.page_size, 4);
            }

            #[tokio::test]
            async fn test_ownership_fallback() {
                let service = service($factory);
                let doc = service
                    .get_all("books", &RawQuery::new(), &member("u2", &[]))
                    .await
                    .unwrap();
                assert_ids(&doc, &["3", "4"]);
            }

            #[tokio::test]
            async fn test_viewer_sees_published_public_rows() {
                let service = service($factory);
                let doc = service
                    .get_all("books", &RawQuery::new(), &member("u2", &["viewer"]))
                    .await
                    .unwrap();
                assert_ids(&doc, &["3"]);

                // A caller filter on the same field only narrows further
                let raw = RawQuery::new().filter(json!({"status": "draft"}));
                let doc = service
                    .get_all("books", &raw, &member("u1", &["viewer"]))
                    .await
                    .unwrap();
                assert!(doc.resources().is_empty());
            }

            #[tokio::test]
            async fn test_manager_team_scope() {
                let service = service($factory);
                let doc = service
                    .get_all("books", &RawQuery::new(), &manager("u1", &["t1"]))
                    .await
                    .unwrap();
                assert_ids(&doc, &["1", "2"]);

                let doc = service
                    .get_all("books", &RawQuery::new(), &manager("u1", &["t2"]))
                    .await
                    .unwrap();
                assert!(doc.resources().is_empty());
            }

            #[tokio::test]
            async fn test_time_window() {
                let service = service($factory);
                let ctx = member("u2", &[]).with_time_access(TimeAccess {
                    start: Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()),
                    end: None,
                    only_active: true,
                });
                let doc = service.get_all("books", &RawQuery::new(), &ctx).await.unwrap();
                assert_ids(&doc, &["4"]);
            }

            // ==================================================================
            // Query shaping
            // ==================================================================

            #[tokio::test]
            async fn test_caller_filter_narrows() {
                let service = service($factory);
                let raw = RawQuery::new().filter(json!({"pages": {"$gte": 300}, "secret": 1}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["1", "2"]);
                assert_eq!(doc.meta.total_items, 2);
            }

            #[tokio::test]
            async fn test_in_and_contains_operators() {
                let service = service($factory);

                let raw = RawQuery::new().filter(json!({"status": {"$in": ["draft", "archived"]}}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["2"]);

                let raw = RawQuery::new().filter(json!({"title": {"$like": "UN"}}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["1"]);

                let raw = RawQuery::new().filter(json!({"status": {"$ne": "published"}}));
                let doc = service.get_all("books", &raw, &admin("ws-2")).await.unwrap();
                assert_ids(&doc, &["7"]);
            }

            #[tokio::test]
            async fn test_operands_follow_declared_types() {
                let service = service($factory);

                let raw = RawQuery::new().filter(json!({"title": 5}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert!(doc.resources().is_empty());
                assert_eq!(doc.meta.total_items, 0);

                let raw = RawQuery::new().filter(json!({"pages": {"$lt": "1000"}}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["1", "2", "3", "4", "5"]);

                let raw = RawQuery::new().filter(json!({"pages": {"$gt": "300"}}));
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["1", "2"]);

                let raw = RawQuery::new().filter(json!({"pages": {"$gt": "abc"}}));
                let err = service
                    .get_all("books", &raw, &admin("ws-1"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, AccessError::Query(_)));
                assert_eq!(err.status_code().as_u16(), 400);
            }

            #[tokio::test]
            async fn test_sort_with_primary_key_tiebreak() {
                let service = service($factory);
                let raw = RawQuery::new().sort("status");
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["2", "1", "3", "4", "5"]);

                let raw = RawQuery::new().sort("-pages").page(2, 2);
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert_ids(&doc, &["5", "3"]);
            }

            #[tokio::test]
            async fn test_page_past_the_end() {
                let service = service($factory);
                let raw = RawQuery::new().page(10, 2);
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();
                assert!(doc.resources().is_empty());
                assert_eq!(doc.meta.total_items, 5);
                assert_eq!(doc.meta.page_number, 10);
            }

            #[tokio::test]
            async fn test_include_belongs_to() {
                let service = service($factory);
                let raw = RawQuery::new().include("author").sort("title");
                let doc = service.get_all("books", &raw, &admin("ws-1")).await.unwrap();

                let value = serde_json::to_value(&doc).unwrap();
                assert_eq!(
                    value["data"][0]["relationships"]["author"],
                    json!({"data": {"type": "authors", "id": "1"}})
                );
                let included: Vec<_> = doc.included.iter().map(|r| r.id.as_str()).collect();
                assert_eq!(included, vec!["1", "2"]);
                assert_eq!(doc.included[0].attributes["name"], json!("Ann"));
            }

            #[tokio::test]
            async fn test_include_has_many_is_tenant_scoped() {
                let service = service($factory);
                let raw = RawQuery::new().include("books");
                let doc = service.get_all("authors", &raw, &admin("ws-1")).await.unwrap();

                assert_ids(&doc, &["1", "2"]);
                let ann = &doc.resources()[0];
                let value = serde_json::to_value(&ann.relationships["books"]).unwrap();
                assert_eq!(
                    value,
                    json!({"data": [
                        {"type": "books", "id": "1"},
                        {"type": "books", "id": "3"},
                        {"type": "books", "id": "5"}
                    ]})
                );
                assert_eq!(doc.included.len(), 5);
            }

            #[tokio::test]
            async fn test_viewer_include_respects_policy() {
                let service = service($factory);
                let viewer = member("u1", &["viewer"]);

                let direct = service
                    .get_all("books", &RawQuery::new(), &viewer)
                    .await
                    .unwrap();
                assert_ids(&direct, &["1"]);

                let raw = RawQuery::new().include("books");
                let doc = service.get_all("authors", &raw, &viewer).await.unwrap();
                assert_ids(&doc, &["1", "2"]);

                let included: Vec<_> = doc.included.iter().map(|r| r.id.as_str()).collect();
                assert_eq!(included, vec!["1"]);

                let value = serde_json::to_value(&doc).unwrap();
                assert_eq!(
                    value["data"][0]["relationships"]["books"],
                    json!({"data": [{"type": "books", "id": "1"}]})
                );
                assert_eq!(
                    value["data"][1]["relationships"]["books"],
                    json!({"data": []})
                );
            }

            // ==================================================================
            // Single resources & errors
            // ==================================================================

            #[tokio::test]
            async fn test_get_one_in_scope() {
                let service = service($factory);
                let doc = service
                    .get_one("books", "3", &RawQuery::new().include("author"), &member("u2", &[]))
                    .await
                    .unwrap();
                assert_ids(&doc, &["3"]);
                assert_eq!(doc.resources()[0].attributes["title"], json!("Ubik"));
                assert_eq!(doc.included.len(), 1);
            }

            #[tokio::test]
            async fn test_get_one_out_of_scope_is_not_found() {
                let service = service($factory);

                let hidden = service
                    .get_one("books", "6", &RawQuery::new(), &admin("ws-1"))
                    .await
                    .unwrap_err();
                let missing = service
                    .get_one("books", "999", &RawQuery::new(), &admin("ws-1"))
                    .await
                    .unwrap_err();

                assert!(matches!(hidden, AccessError::Entity(EntityError::NotFound { .. })));
                assert!(matches!(missing, AccessError::Entity(EntityError::NotFound { .. })));
                assert_eq!(hidden.status_code(), missing.status_code());
            }

            #[tokio::test]
            async fn test_unknown_entity_type() {
                let service = service($factory);
                let err = service
                    .get_all("ghosts", &RawQuery::new(), &admin("ws-1"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, AccessError::Entity(EntityError::UnknownType { .. })));
                assert_eq!(err.status_code().as_u16(), 404);
            }

            #[tokio::test]
            async fn test_repeat_runs_are_identical() {
                let service = service($factory);
                let raw = RawQuery::new()
                    .filter(json!({"pages": {"$lt": 400}}))
                    .sort("-title")
                    .include("author");
                let ctx = member("u1", &["viewer", "manager"]);

                let first = service.get_all("books", &raw, &ctx).await.unwrap();
                let second = service.get_all("books", &raw, &ctx).await.unwrap();
                assert_eq!(
                    serde_json::to_string(&first).unwrap(),
                    serde_json::to_string(&second).unwrap()
                );
            }
        }
    };
}
