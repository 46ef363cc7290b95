//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors return correct HTTP status codes
//! - Error responses are properly formatted
//! - Error conversions work correctly
//! - Server-side failures never leak store details

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use scoped::core::error::{
    AccessError, ConfigError, EntityError, ExecutionError, InvalidQueryError,
};
use serde_json::{Value, json};

async fn body_json(err: AccessError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    (status, serde_json::from_slice(&bytes).expect("body is JSON"))
}

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_query_errors_return_400() {
        let errors = [
            InvalidQueryError::InvalidPage {
                parameter: "page[size]".into(),
                value: "0".into(),
            },
            InvalidQueryError::InvalidFilter {
                message: "expected a JSON object".into(),
            },
            InvalidQueryError::UnknownOperator {
                operator: "$regex".into(),
            },
            InvalidQueryError::InvalidOperand {
                operator: "$in".into(),
                message: "expected an array".into(),
            },
            InvalidQueryError::InvalidSyntax {
                parameter: "sort".into(),
                value: "title desc".into(),
            },
        ];
        for err in errors {
            assert_eq!(AccessError::from(err).status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_entity_errors_return_404() {
        let unknown = AccessError::from(EntityError::UnknownType {
            entity_type: "ghosts".into(),
        });
        let missing = AccessError::from(EntityError::NotFound {
            entity_type: "books".into(),
            id: "9".into(),
        });
        assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_side_errors_return_500() {
        let errors = [
            AccessError::from(ExecutionError::Connection {
                message: "pool timed out".into(),
            }),
            AccessError::from(ConfigError::InvalidValue {
                field: "pagination".into(),
                message: "bad".into(),
            }),
            AccessError::from(ExecutionError::Decode {
                entity_type: "books".into(),
                message: "expected a JSON object".into(),
            }),
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

// =============================================================================
// Error Code Tests
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = [
            (
                AccessError::from(InvalidQueryError::UnknownOperator {
                    operator: "$regex".into(),
                }),
                "UNKNOWN_OPERATOR",
            ),
            (
                AccessError::from(EntityError::UnknownType {
                    entity_type: "x".into(),
                }),
                "UNKNOWN_ENTITY_TYPE",
            ),
            (
                AccessError::from(EntityError::NotFound {
                    entity_type: "x".into(),
                    id: "1".into(),
                }),
                "ENTITY_NOT_FOUND",
            ),
            (
                AccessError::from(ExecutionError::Decode {
                    entity_type: "x".into(),
                    message: "bad row".into(),
                }),
                "EXECUTION_ERROR",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.error_code(), code);
        }
    }
}

// =============================================================================
// Response Body Tests
// =============================================================================

mod response_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_page_body_has_details() {
        let (status, body) = body_json(AccessError::from(InvalidQueryError::InvalidPage {
            parameter: "page[number]".into(),
            value: "abc".into(),
        }))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PAGE");
        assert_eq!(
            body["details"],
            json!({"parameter": "page[number]", "value": "abc"})
        );
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_json(AccessError::from(EntityError::NotFound {
            entity_type: "books".into(),
            id: "42".into(),
        }))
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ENTITY_NOT_FOUND");
        assert_eq!(body["details"], json!({"entity_type": "books", "id": "42"}));
    }

    #[tokio::test]
    async fn test_execution_error_body_is_opaque() {
        let (status, body) = body_json(AccessError::from(ExecutionError::Query {
            entity_type: "books".into(),
            message: "column \"secret\" does not exist".into(),
        }))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(!message.contains("secret"));
        assert!(!message.contains("books"));
        assert!(body.get("details").is_none());
    }
}

// =============================================================================
// Conversion Tests
// =============================================================================

mod conversion_tests {
    use super::*;

    #[test]
    fn test_display_delegates_to_leaf() {
        let err = AccessError::from(InvalidQueryError::UnknownOperator {
            operator: "$regex".into(),
        });
        assert!(err.to_string().contains("$regex"));
    }

    #[test]
    fn test_question_mark_conversion() {
        fn fails() -> Result<(), AccessError> {
            Err(ConfigError::ParseError {
                message: "bad yaml".into(),
            })?;
            Ok(())
        }
        assert!(matches!(fails(), Err(AccessError::Config(_))));
    }

    #[test]
    fn test_match_on_category() {
        let err = AccessError::from(EntityError::NotFound {
            entity_type: "books".into(),
            id: "1".into(),
        });
        match err {
            AccessError::Entity(EntityError::NotFound { id, .. }) => assert_eq!(id, "1"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
