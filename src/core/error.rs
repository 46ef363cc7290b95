//! Typed error handling for the resource access layer
//!
//! Errors are grouped by category so callers can map them onto transport
//! responses without inspecting messages.
//!
//! # Error Categories
//!
//! - [`InvalidQueryError`]: malformed pagination, filter or sort syntax (4xx)
//! - [`EntityError`]: unknown entity type or missing resource (404)
//! - [`ExecutionError`]: store-level faults (5xx, never retried here)
//! - [`ConfigError`]: configuration parsing and validation
//!
//! Two conditions are deliberately *not* errors: an empty allow-list produces
//! an empty document, and unknown filter/sort fields are logged and dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! match service.get_all("books", &raw, &ctx).await {
//!     Ok(doc) => Json(doc).into_response(),
//!     Err(AccessError::Query(e)) => println!("bad query: {}", e),
//!     Err(e) => e.into_response(),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type of the access layer
#[derive(Debug)]
pub enum AccessError {
    /// The caller's query description is malformed
    Query(InvalidQueryError),

    /// Entity type or resource lookup failures
    Entity(EntityError),

    /// The store failed while executing the effective query
    Execution(ExecutionError),

    /// Configuration errors
    Config(ConfigError),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::Query(e) => write!(f, "{}", e),
            AccessError::Entity(e) => write!(f, "{}", e),
            AccessError::Execution(e) => write!(f, "{}", e),
            AccessError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AccessError::Query(e) => Some(e),
            AccessError::Entity(e) => Some(e),
            AccessError::Execution(e) => Some(e),
            AccessError::Config(e) => Some(e),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AccessError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::Query(_) => StatusCode::BAD_REQUEST,
            AccessError::Entity(e) => e.status_code(),
            AccessError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AccessError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AccessError::Query(e) => e.error_code(),
            AccessError::Entity(e) => e.error_code(),
            AccessError::Execution(_) => "EXECUTION_ERROR",
            AccessError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Convert to an error response
    ///
    /// Server-side failures get a generic message so store internals
    /// (table names, driver errors) never reach the caller.
    pub fn to_response(&self) -> ErrorResponse {
        let message = if self.status_code().is_server_error() {
            "The request could not be completed".to_string()
        } else {
            self.to_string()
        };

        ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AccessError::Query(InvalidQueryError::InvalidPage { parameter, value }) => {
                Some(serde_json::json!({ "parameter": parameter, "value": value }))
            }
            AccessError::Entity(EntityError::NotFound { entity_type, id }) => {
                Some(serde_json::json!({ "entity_type": entity_type, "id": id }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Structurally malformed query input. Always user-correctable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidQueryError {
    /// Page number or size is not a positive integer
    #[error("Invalid value '{value}' for {parameter}: expected a positive integer")]
    InvalidPage { parameter: String, value: String },

    /// The filter parameter is not a JSON object
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Unrecognized operator key in a filter
    #[error("Unknown filter operator '{operator}'")]
    UnknownOperator { operator: String },

    /// Operator operand has the wrong shape (e.g. `$in` with a scalar)
    #[error("Invalid operand for operator '{operator}': {message}")]
    InvalidOperand { operator: String, message: String },

    /// Sort or include syntax error
    #[error("Invalid {parameter} expression '{value}'")]
    InvalidSyntax { parameter: String, value: String },
}

impl InvalidQueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            InvalidQueryError::InvalidPage { .. } => "INVALID_PAGE",
            InvalidQueryError::InvalidFilter { .. } => "INVALID_FILTER",
            InvalidQueryError::UnknownOperator { .. } => "UNKNOWN_OPERATOR",
            InvalidQueryError::InvalidOperand { .. } => "INVALID_OPERAND",
            InvalidQueryError::InvalidSyntax { .. } => "INVALID_SYNTAX",
        }
    }
}

impl From<InvalidQueryError> for AccessError {
    fn from(err: InvalidQueryError) -> Self {
        AccessError::Query(err)
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to entity lookups
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    /// Entity type is not registered
    #[error("Unknown entity type: {entity_type}")]
    UnknownType { entity_type: String },

    /// Resource does not exist or is outside the caller's scope
    #[error("{entity_type} with id '{id}' not found")]
    NotFound { entity_type: String, id: String },
}

impl EntityError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EntityError::UnknownType { .. } => StatusCode::NOT_FOUND,
            EntityError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::UnknownType { .. } => "UNKNOWN_ENTITY_TYPE",
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
        }
    }
}

impl From<EntityError> for AccessError {
    fn from(err: EntityError) -> Self {
        AccessError::Entity(err)
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Store-level faults. Not retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Connection to the store was lost or could not be acquired
    #[error("Store connection failed: {message}")]
    Connection { message: String },

    /// The store rejected the compiled query
    #[error("Store rejected query on '{entity_type}': {message}")]
    Query {
        entity_type: String,
        message: String,
    },

    /// A row returned by the store could not be decoded
    #[error("Failed to decode row of '{entity_type}': {message}")]
    Decode {
        entity_type: String,
        message: String,
    },
}

impl From<ExecutionError> for AccessError {
    fn from(err: ExecutionError) -> Self {
        AccessError::Execution(err)
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ExecutionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ExecutionError::Connection {
                    message: err.to_string(),
                }
            }
            other => ExecutionError::Query {
                entity_type: String::new(),
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    /// Invalid value in configuration
    #[error("Invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// An entity descriptor references something that does not exist
    #[error("Entity '{entity_type}' is misconfigured: {message}")]
    InvalidEntity {
        entity_type: String,
        message: String,
    },
}

impl From<ConfigError> for AccessError {
    fn from(err: ConfigError) -> Self {
        AccessError::Config(err)
    }
}
