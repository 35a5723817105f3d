use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::flags::flag_decision::{AccessDecision, DecisionReason};
use crate::usage::usage_models::QuotaStatus;

/// Structured error body, shaped like Django REST Framework errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaStatus>,
}

#[derive(Error, Debug)]
pub enum ClientFacingError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Service unavailable")]
    ServiceUnavailable,
}

#[derive(Error, Debug)]
pub enum FlagError {
    #[error(transparent)]
    ClientFacing(#[from] ClientFacingError),
    #[error("access denied: {}", .0.reason)]
    AccessDenied(Box<AccessDecision>),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error, Option<String>),
    #[error("Timed out while fetching data")]
    TimeoutError(Option<String>),
    #[error("Failed to parse data")]
    DataParsingError,
    #[error("Unknown value for {0}: {1}")]
    UnknownEnumValue(String, String),
    #[error("Invalid daily_limit in flag metadata: {0}")]
    InvalidDailyLimit(String),
}

impl FlagError {
    /// Returns (error_code, status_code) for this error.
    fn error_metadata(&self) -> (&'static str, u16) {
        match self {
            FlagError::ClientFacing(ClientFacingError::BadRequest(_)) => ("bad_request", 400),
            FlagError::ClientFacing(ClientFacingError::ServiceUnavailable) => {
                ("service_unavailable", 503)
            }
            FlagError::AccessDenied(decision) => match decision.reason {
                DecisionReason::QuotaExceeded => ("quota_exceeded", 429),
                _ => ("feature_not_available", 403),
            },

            FlagError::RequestDecodingError(_) => ("request_decoding_error", 400),
            FlagError::RequestParsingError(_) => ("request_parsing_error", 400),

            FlagError::Internal(_) => ("internal_error", 500),
            FlagError::DatabaseError(_, _) => ("database_error", 500),
            FlagError::DataParsingError => ("data_parsing_error", 500),
            FlagError::UnknownEnumValue(_, _) => ("unknown_enum_value", 500),
            FlagError::InvalidDailyLimit(_) => ("invalid_daily_limit", 500),

            FlagError::DatabaseUnavailable => ("database_unavailable", 503),
            FlagError::TimeoutError(_) => ("timeout", 503),
        }
    }

    /// Returns a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.error_metadata().1
    }

    /// Stored data could be read but not understood.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            FlagError::DataParsingError
                | FlagError::UnknownEnumValue(_, _)
                | FlagError::InvalidDailyLimit(_)
        )
    }

    pub fn is_5xx(&self) -> bool {
        StatusCode::from_u16(self.status_code())
            .map(|status| status.is_server_error())
            .unwrap_or(true)
    }
}

impl From<sqlx::Error> for FlagError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => FlagError::TimeoutError(Some("pool_timeout".to_string())),
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) => FlagError::DatabaseUnavailable,
            other => FlagError::DatabaseError(other, None),
        }
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let (error_type, detail, reason, quota) = match self {
            FlagError::AccessDenied(decision) => {
                let decision = *decision;
                let detail = match &decision.quota {
                    Some(quota) if decision.reason == DecisionReason::QuotaExceeded => format!(
                        "Daily limit reached ({} per day). Resets at {}",
                        quota.daily_limit,
                        quota.reset_at.to_rfc3339()
                    ),
                    _ => decision.reason.describe().to_string(),
                };
                ("access_denied", detail, Some(decision.reason), decision.quota)
            }
            FlagError::ClientFacing(ClientFacingError::BadRequest(msg)) => {
                ("validation_error", msg, None, None)
            }
            FlagError::RequestDecodingError(msg) => (
                "validation_error",
                format!("Failed to decode request: {msg}. Please check the request format."),
                None,
                None,
            ),
            FlagError::RequestParsingError(err) => (
                "validation_error",
                format!("Failed to parse request: {err}. Required fields may be missing."),
                None,
                None,
            ),
            FlagError::DatabaseError(ref sqlx_error, ref context) => {
                if let Some(ctx) = context {
                    tracing::error!("Database error with context '{}': {}", ctx, sqlx_error);
                } else {
                    tracing::error!("Database error: {}", sqlx_error);
                }
                (
                    "server_error",
                    "A database error occurred. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            FlagError::DatabaseUnavailable
            | FlagError::ClientFacing(ClientFacingError::ServiceUnavailable) => {
                tracing::error!("Service unavailable: {:?}", self);
                (
                    "server_error",
                    "The database is currently unavailable. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            FlagError::TimeoutError(ref timeout_type) => {
                let timeout_desc = timeout_type.as_deref().unwrap_or("unknown type");
                tracing::error!("Timeout error ({}): {:?}", timeout_desc, self);
                (
                    "server_error",
                    "The request timed out. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            FlagError::Internal(ref msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    "server_error",
                    "An internal server error occurred. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            FlagError::DataParsingError
            | FlagError::UnknownEnumValue(_, _)
            | FlagError::InvalidDailyLimit(_) => {
                tracing::error!("Failed to parse data: {}", self);
                (
                    "server_error",
                    "Failed to parse internal data.".to_string(),
                    None,
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error_type: error_type.to_string(),
            code: code.to_string(),
            detail,
            reason,
            quota,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::quota::evaluate_daily_limit;
    use chrono::Utc;

    #[test]
    fn test_denials_map_to_403() {
        for reason in [
            DecisionReason::NoMatchingRule,
            DecisionReason::DisabledByFlag,
            DecisionReason::DataError,
            DecisionReason::StoreUnavailable,
        ] {
            let error = FlagError::AccessDenied(Box::new(AccessDecision::denied("chat", reason)));
            assert_eq!(error.status_code(), 403);
            assert_eq!(error.error_code(), "feature_not_available");
            assert!(!error.is_5xx());
        }
    }

    #[test]
    fn test_quota_denial_maps_to_429() {
        let decision = AccessDecision::denied("chat", DecisionReason::NoMatchingRule)
            .quota_exceeded(evaluate_daily_limit(5, 5, Utc::now()));
        let error = FlagError::AccessDenied(Box::new(decision));
        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), "quota_exceeded");
    }

    #[test]
    fn test_store_errors_are_5xx() {
        assert!(FlagError::DatabaseUnavailable.is_5xx());
        assert!(FlagError::TimeoutError(None).is_5xx());
        assert!(FlagError::InvalidDailyLimit("-1".to_string()).is_5xx());
        assert!(!FlagError::RequestDecodingError("bad".to_string()).is_5xx());
    }

    #[test]
    fn test_data_errors_are_told_apart_from_outages() {
        assert!(FlagError::UnknownEnumValue("scope_type".into(), "planet".into()).is_data_error());
        assert!(FlagError::DataParsingError.is_data_error());
        assert!(!FlagError::DatabaseUnavailable.is_data_error());
        assert!(!FlagError::TimeoutError(None).is_data_error());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_timeout() {
        let error: FlagError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(error, FlagError::TimeoutError(Some(ref t)) if t == "pool_timeout"));
    }

    #[test]
    fn test_into_response_status() {
        let response = FlagError::AccessDenied(Box::new(AccessDecision::denied(
            "faq",
            DecisionReason::DisabledByFlag,
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = FlagError::DatabaseUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
