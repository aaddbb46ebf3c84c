//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its mapping
//! onto HTTP responses. Every response body follows the same shape:
//! `{detail, error_code, context}` so clients can branch on `error_code`
//! instead of parsing messages.

use axum::{
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::ConfigError;
use ctxt_core::convert::ConvertError;
use ctxt_core::domain::RateLimitDecision;
use ctxt_core::ports::{ExtractError, PortError};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bad input shape or value; user-correctable.
    #[error("{detail}")]
    Validation {
        detail: String,
        field: Option<&'static str>,
    },

    /// Missing or invalid credentials.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated, but not entitled to the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Quota exceeded. Carries the full decision so the response can expose
    /// machine-readable quota metadata.
    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    /// Extraction failed. Upstream internals are not leaked, but the upstream
    /// status code is preserved.
    #[error("{detail}")]
    Conversion {
        detail: String,
        url: String,
        upstream_status: Option<u16>,
    },

    #[error("{resource} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },

    /// A write collided with an existing resource.
    #[error("{0}")]
    Conflict(String),

    /// An upstream dependency failed.
    #[error("{service} service error: {detail}")]
    External {
        service: &'static str,
        detail: String,
        upstream_status: Option<u16>,
    },

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(detail: impl Into<String>) -> Self {
        ApiError::Validation {
            detail: detail.into(),
            field: None,
        }
    }

    pub fn validation_for(field: &'static str, detail: impl Into<String>) -> Self {
        ApiError::Validation {
            detail: detail.into(),
            field: Some(field),
        }
    }

    pub fn not_found(resource: &'static str, identifier: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource,
            identifier: identifier.into(),
        }
    }

    /// Error mapper for lookups: a missing row becomes a resource-specific
    /// 404, every other port failure keeps its own mapping (a store outage
    /// must not masquerade as "not found").
    pub fn or_not_found(
        resource: &'static str,
        identifier: impl Into<String>,
    ) -> impl FnOnce(PortError) -> ApiError {
        let identifier = identifier.into();
        move |e| match e {
            PortError::NotFound(_) => ApiError::NotFound {
                resource,
                identifier,
            },
            other => other.into(),
        }
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => ApiError::NotFound {
                resource: "Resource",
                identifier: what,
            },
            PortError::Conflict(what) => ApiError::Conflict(what),
            PortError::Unavailable(detail) => ApiError::External {
                service: "database",
                detail,
                upstream_status: None,
            },
            PortError::Unexpected(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::InvalidUrl(detail) => ApiError::validation_for("url", detail),
            ConvertError::Extraction { url, source } => {
                let (detail, upstream_status) = match source {
                    ExtractError::Timeout => (
                        "Conversion timeout - the webpage took too long to process".to_string(),
                        None,
                    ),
                    ExtractError::UpstreamStatus(code) => {
                        ("Conversion failed".to_string(), Some(code))
                    }
                    ExtractError::Transport(_) => ("Conversion failed".to_string(), None),
                };
                ApiError::Conversion {
                    detail,
                    url,
                    upstream_status,
                }
            }
            ConvertError::SlugExhausted { url } => {
                ApiError::Internal(format!("could not allocate a unique slug for {url}"))
            }
            ConvertError::Store(err) => err.into(),
        }
    }
}

/// Standard quota headers for both allowed and denied responses.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };

    put("x-ratelimit-tier", decision.tier.to_string());
    put("x-ratelimit-used", decision.current_usage.to_string());
    match decision.daily_limit {
        Some(limit) => {
            put("x-ratelimit-limit", limit.to_string());
            put(
                "x-ratelimit-remaining",
                decision.remaining.unwrap_or(0).to_string(),
            );
            if let Some(reset_at) = decision.reset_at {
                put("x-ratelimit-reset", reset_at.to_rfc3339());
            }
        }
        None => {
            put("x-ratelimit-limit", "unlimited".to_string());
            put("x-ratelimit-remaining", "unlimited".to_string());
        }
    }

    headers
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation { detail, field } => respond(
                StatusCode::UNPROCESSABLE_ENTITY,
                &detail,
                "VALIDATION_ERROR",
                json!({ "field": field }),
            ),
            ApiError::Authentication(detail) => respond(
                StatusCode::UNAUTHORIZED,
                &detail,
                "AUTHENTICATION_ERROR",
                json!({}),
            ),
            ApiError::Forbidden(detail) => respond(
                StatusCode::FORBIDDEN,
                &detail,
                "AUTHORIZATION_ERROR",
                json!({}),
            ),
            ApiError::RateLimited(decision) => {
                let detail = match (decision.daily_limit, decision.reset_at) {
                    (Some(limit), Some(reset_at)) => format!(
                        "Rate limit exceeded. You've used {}/{} conversions today. Limit resets at {}",
                        decision.current_usage,
                        limit,
                        reset_at.to_rfc3339()
                    ),
                    _ => "Rate limit exceeded".to_string(),
                };
                let headers = rate_limit_headers(&decision);
                let body = Json(json!({
                    "detail": detail,
                    "error_code": "RATE_LIMIT_EXCEEDED",
                    "context": {
                        "allowed": false,
                        "tier": decision.tier,
                        "daily_limit": decision.daily_limit,
                        "current_usage": decision.current_usage,
                        "remaining": decision.remaining,
                        "reset_at": decision.reset_at,
                    }
                }));
                (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
            }
            ApiError::Conversion {
                detail,
                url,
                upstream_status,
            } => {
                warn!(%url, upstream_status, "conversion failed");
                respond(
                    StatusCode::BAD_REQUEST,
                    &detail,
                    "CONVERSION_ERROR",
                    json!({ "url": url, "upstream_status": upstream_status }),
                )
            }
            ApiError::NotFound {
                resource,
                identifier,
            } => respond(
                StatusCode::NOT_FOUND,
                &format!("{resource} not found"),
                "RESOURCE_NOT_FOUND",
                json!({ "resource_type": resource, "identifier": identifier }),
            ),
            ApiError::Conflict(detail) => {
                respond(StatusCode::CONFLICT, &detail, "CONFLICT", json!({}))
            }
            ApiError::External {
                service,
                detail,
                upstream_status,
            } => {
                error!(service, %detail, upstream_status, "external service failure");
                respond(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &format!("{service} service error"),
                    "EXTERNAL_SERVICE_ERROR",
                    json!({ "service_name": service, "upstream_status": upstream_status }),
                )
            }
            ApiError::Config(err) => internal(err.to_string()),
            ApiError::Database(err) => internal(err.to_string()),
            ApiError::Io(err) => internal(err.to_string()),
            ApiError::Internal(detail) => internal(detail),
        }
    }
}

fn respond(
    status: StatusCode,
    detail: &str,
    error_code: &'static str,
    context: serde_json::Value,
) -> Response {
    let body = Json(json!({
        "detail": detail,
        "error_code": error_code,
        "context": context,
    }));
    (status, body).into_response()
}

// Unexpected failures get a correlation id; the full detail goes to the log
// and, outside release builds, into the response.
fn internal(detail: String) -> Response {
    let correlation_id = Uuid::new_v4();
    error!(%correlation_id, %detail, "internal error");

    let exposed = if cfg!(debug_assertions) {
        detail
    } else {
        "An unexpected internal error occurred".to_string()
    };

    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        &exposed,
        "INTERNAL_ERROR",
        json!({ "correlation_id": correlation_id }),
    )
}
