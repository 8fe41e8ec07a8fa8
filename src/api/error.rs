//! API error taxonomy with structured JSON responses.
//!
//! Body shape: `{ "error": <kind>, "message"?, "details"? }`. Every error
//! response also carries an `X-Error-Type` header. Internal failures are
//! logged server-side and never leak their detail to the client.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::auth::token::TokenError;
use crate::db::DatabaseError;
use crate::scope::ScopeError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn missing_fields(fields: &[&str]) -> Self {
        ApiError::Validation {
            message: "missing required fields".into(),
            details: Some(json!({ "missing": fields })),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Validation { .. } => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut body = json!({ "error": kind });
        match &self {
            ApiError::Unauthorized(message)
            | ApiError::Forbidden(message) => {
                body["message"] = json!(message);
            }
            ApiError::Validation { message, details } => {
                body["message"] = json!(message);
                if let Some(details) = details {
                    body["details"] = details.clone();
                }
            }
            ApiError::NotFound(entity) => {
                body["message"] = json!(format!("{entity} not found"));
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
            }
        }

        let mut response = (self.status(), Json(body)).into_response();
        response
            .headers_mut()
            .insert("X-Error-Type", HeaderValue::from_static(kind));
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => ApiError::NotFound(entity_type),
            DatabaseError::InvalidEnum { .. } => ApiError::validation(err.to_string()),
            DatabaseError::ConstraintViolation(message) => ApiError::validation(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthorized_returns_401_with_error_type_header() {
        let response = ApiError::Unauthorized("missing credentials".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("X-Error-Type").unwrap(), "unauthorized");
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthorized");
        assert_eq!(json["message"], "missing credentials");
    }

    #[tokio::test]
    async fn validation_carries_field_details() {
        let response = ApiError::missing_fields(&["email", "password"]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["details"]["missing"][0], "email");
    }

    #[tokio::test]
    async fn internal_hides_the_detail() {
        let response = ApiError::Internal("disk full at /var/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn database_not_found_maps_to_404() {
        let err: ApiError = DatabaseError::NotFound {
            entity_type: "appointment".into(),
            id: "x".into(),
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scope_rejection_maps_to_403() {
        let err: ApiError = ScopeError::RoleNotPermitted("distributor").into();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
