//! Shared test harness for resource store backends
//!
//! Provides the fixture schema (`books` belonging to `authors`), the fixture
//! rows every backend is seeded with, and helpers to build contexts and read
//! rendered documents.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//! use store_harness::*;
//! ```
//!
//! # Fixture data
//!
//! | id | title       | status    | public | pages | workspace | owner | team | author |
//! |----|-------------|-----------|--------|-------|-----------|-------|------|--------|
//! | 1  | Dune        | published | yes    | 412   | ws-1      | u1    | t1   | 1      |
//! | 2  | Emma        | draft     | no     | 320   | ws-1      | u1    | t1   | 2      |
//! | 3  | Ubik        | published | yes    | 224   | ws-1      | u2    | t2   | 1      |
//! | 4  | Solaris     | published | no     | 204   | ws-1      | u2    | t2   | 2      |
//! | 5  | Kindred     | published | yes    | 264   | ws-1      | u3    | t1   | 1      |
//! | 6  | Neuromancer | published | yes    | 271   | ws-2      | u9    | t9   | 3      |
//! | 7  | Hyperion    | archived  | yes    | 482   | ws-2      | u9    | t9   | 3      |

#![allow(dead_code)]

#[macro_use]
mod resource_store_tests;

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use scoped::config::AccessConfig;
use scoped::core::executor::{ResourceStore, Row};
use scoped::core::field::{FieldType, FieldValue};
use scoped::core::render::ResourceDocument;
use scoped::core::schema::{EntityDescriptor, Relationship};
use scoped::core::service::ResourceService;
use scoped::core::{RoleAccess, SecurityContext, UserContext};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

pub fn books_schema() -> EntityDescriptor {
    EntityDescriptor::new("books", "id")
        .with_field_type("id", FieldType::Integer)
        .with_field_type("title", FieldType::String)
        .with_field_type("status", FieldType::String)
        .with_field_type("is_public", FieldType::Boolean)
        .with_field_type("pages", FieldType::Integer)
        .with_field_type("team_id", FieldType::String)
        .with_field_type("author_id", FieldType::Integer)
        .with_field_type("workspace_id", FieldType::String)
        .with_field_type("user_id", FieldType::String)
        .with_field_type("created_at", FieldType::DateTime)
        .with_field_type("deleted_at", FieldType::DateTime)
        .with_tenant_field("workspace_id")
        .with_owner_field("user_id")
        .with_timestamp_field("created_at")
        .with_deleted_field("deleted_at")
        .with_relationship("author", Relationship::belongs_to("authors", "author_id"))
}

pub fn authors_schema() -> EntityDescriptor {
    EntityDescriptor::new("authors", "id")
        .with_field_type("id", FieldType::Integer)
        .with_field_type("name", FieldType::String)
        .with_field_type("workspace_id", FieldType::String)
        .with_tenant_field("workspace_id")
        .with_relationship("books", Relationship::has_many("books", "author_id"))
}

pub fn fixture_config() -> AccessConfig {
    AccessConfig {
        entities: vec![books_schema(), authors_schema()],
        ..AccessConfig::default_config()
    }
}

/// Service over `store` using the fixture configuration
pub fn service(store: Arc<dyn ResourceStore>) -> ResourceService {
    service_with(&fixture_config(), store)
}

/// Service over `store` with a tweaked configuration; entities come from
/// `config` as well
pub fn service_with(config: &AccessConfig, store: Arc<dyn ResourceStore>) -> ResourceService {
    let registry = config.registry().expect("fixture schema is valid");
    ResourceService::new(config, registry, store)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn book(
    id: i64,
    title: &str,
    status: &str,
    is_public: bool,
    pages: i64,
    workspace: &str,
    owner: &str,
    team: &str,
    author: i64,
    month: u32,
) -> Row {
    Row::new()
        .with("id", id)
        .with("title", title)
        .with("status", status)
        .with("is_public", is_public)
        .with("pages", pages)
        .with("workspace_id", workspace)
        .with("user_id", owner)
        .with("team_id", team)
        .with("author_id", author)
        .with(
            "created_at",
            Utc.with_ymd_and_hms(2024, month, 10, 0, 0, 0).unwrap(),
        )
        .with("deleted_at", FieldValue::Null)
}

fn author(id: i64, name: &str, workspace: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("name", name)
        .with("workspace_id", workspace)
}

/// A row with the same shape as the fixture books
pub fn extra_book(id: i64, title: &str, workspace: &str, owner: &str, month: u32) -> Row {
    book(id, title, "published", true, 300, workspace, owner, "t1", 1, month)
}

/// `(table, row)` pairs every backend is seeded with
pub fn fixture_rows() -> Vec<(&'static str, Row)> {
    vec![
        ("authors", author(1, "Ann", "ws-1")),
        ("authors", author(2, "Bob", "ws-1")),
        ("authors", author(3, "Cid", "ws-2")),
        ("books", book(1, "Dune", "published", true, 412, "ws-1", "u1", "t1", 1, 1)),
        ("books", book(2, "Emma", "draft", false, 320, "ws-1", "u1", "t1", 2, 2)),
        ("books", book(3, "Ubik", "published", true, 224, "ws-1", "u2", "t2", 1, 3)),
        ("books", book(4, "Solaris", "published", false, 204, "ws-1", "u2", "t2", 2, 4)),
        ("books", book(5, "Kindred", "published", true, 264, "ws-1", "u3", "t1", 1, 5)),
        ("books", book(6, "Neuromancer", "published", true, 271, "ws-2", "u9", "t9", 3, 6)),
        ("books", book(7, "Hyperion", "archived", true, 482, "ws-2", "u9", "t9", 3, 7)),
    ]
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

pub fn admin(workspace: &str) -> SecurityContext {
    SecurityContext::for_user(
        UserContext::new("root")
            .with_workspace(workspace)
            .with_roles(["admin"]),
    )
}

pub fn member(id: &str, roles: &[&str]) -> SecurityContext {
    SecurityContext::for_user(
        UserContext::new(id)
            .with_workspace("ws-1")
            .with_roles(roles.iter().copied()),
    )
}

pub fn with_allow_list(id: &str, ids: &[&str]) -> SecurityContext {
    SecurityContext::for_user(
        UserContext::new(id)
            .with_workspace("ws-1")
            .with_accessible_ids(ids.iter().copied()),
    )
}

pub fn manager(id: &str, teams: &[&str]) -> SecurityContext {
    member(id, &["manager"]).with_role_access(
        RoleAccess::new().with("team_ids", teams.iter().map(|t| t.to_string()).collect()),
    )
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

/// Ids of the primary resources, in document order
pub fn ids(document: &ResourceDocument) -> Vec<String> {
    document.resources().iter().map(|r| r.id.clone()).collect()
}

pub fn assert_ids(document: &ResourceDocument, expected: &[&str]) {
    assert_eq!(
        ids(document),
        expected.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "unexpected primary resources"
    );
}

/// Install a test-writer subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
