//! Error handling for Cadence Core.
//!
//! This module provides:
//! - Machine-readable error codes with HTTP status mapping
//! - User-friendly messages vs detailed internal messages
//! - Axum `IntoResponse` integration for API handlers
//! - Metrics integration for error tracking

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// A specialized Result type for Cadence operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Scheduling errors
    InvalidSchedule,
    InvalidExecutionType,
    ValidationError,

    // Lookup errors
    JobNotFound,
    ExecutionNotFound,

    // Store errors
    DatabaseError,
    DatabaseConnectionFailed,
    SerializationError,

    // Dispatch errors
    TransportError,
    DispatchRejected,

    // Configuration errors
    ConfigurationError,

    // Internal errors
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    ///
    /// Input errors map to 400 per the public API contract (invalid
    /// schedule or type on job registration is a plain Bad Request).
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidSchedule | Self::InvalidExecutionType | Self::ValidationError => {
                StatusCode::BAD_REQUEST
            }

            Self::JobNotFound | Self::ExecutionNotFound => StatusCode::NOT_FOUND,

            Self::DatabaseConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,

            Self::TransportError => StatusCode::BAD_GATEWAY,

            Self::DispatchRejected => StatusCode::TOO_MANY_REQUESTS,

            Self::DatabaseError
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable through the standard retry path.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError
                | Self::DatabaseConnectionFailed
                | Self::TransportError
                | Self::DispatchRejected
        )
    }

    /// Get the error category for grouping in logs and metrics.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidSchedule | Self::InvalidExecutionType | Self::ValidationError => {
                "validation"
            }
            Self::JobNotFound | Self::ExecutionNotFound => "not_found",
            Self::DatabaseError | Self::DatabaseConnectionFailed => "database",
            Self::SerializationError => "serialization",
            Self::TransportError | Self::DispatchRejected => "dispatch",
            Self::ConfigurationError => "configuration",
            Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Cadence Core.
///
/// Carries a stable code, a message safe to expose to API clients, an
/// optional internal message for logs, and the source error chain.
#[derive(Error, Debug)]
pub struct SchedulerError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl SchedulerError {
    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Domain constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an invalid schedule error.
    pub fn invalid_schedule(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidSchedule,
            format!(
                "Invalid cron expression: {}. Expected 6-field format: second minute hour day month day-of-week",
                detail.into()
            ),
        )
    }

    /// Create an invalid execution type error.
    pub fn invalid_execution_type(value: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidExecutionType,
            format!(
                "Invalid execution type: {}. Must be either ATLEAST_ONCE or ATMOST_ONCE",
                value.into()
            ),
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a job not found error.
    pub fn job_not_found(job_id: Uuid) -> Self {
        Self::new(
            ErrorCode::JobNotFound,
            format!("Job not found with ID: {}", job_id),
        )
    }

    /// Create an execution not found error.
    pub fn execution_not_found(execution_id: Uuid) -> Self {
        Self::new(
            ErrorCode::ExecutionNotFound,
            format!("Job execution not found with ID: {}", execution_id),
        )
    }

    /// Create a transport error (external call failed below the HTTP layer).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::TransportError,
            "Callback request failed before an HTTP status was received",
            message,
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Log this error with severity based on its status class.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        if self.http_status().is_server_error() {
            error!(
                error_code = %code,
                category = category,
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "Server error"
            );
        } else {
            warn!(
                error_code = %code,
                category = category,
                http_status = status,
                user_message = %self.user_message,
                "Client error"
            );
        }
    }

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "cadence_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response body for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// User-friendly error message
    pub message: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&SchedulerError> for ErrorResponse {
    fn from(error: &SchedulerError) -> Self {
        Self {
            code: error.code,
            message: error.user_message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for SchedulerError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => {
                (ErrorCode::JobNotFound, "The requested record was not found")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to reach the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for SchedulerError {
    fn from(error: reqwest::Error) -> Self {
        // Status-bearing responses are handled by the call client; anything
        // surfacing here failed below the HTTP layer.
        Self::transport(error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<cron::error::Error> for SchedulerError {
    fn from(error: cron::error::Error) -> Self {
        Self::invalid_schedule(error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for SchedulerError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(
            ErrorCode::InvalidSchedule.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::InvalidExecutionType.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::TransportError.is_retryable());
        assert!(ErrorCode::DatabaseConnectionFailed.is_retryable());
        assert!(!ErrorCode::InvalidSchedule.is_retryable());
        assert!(!ErrorCode::JobNotFound.is_retryable());
    }

    #[test]
    fn test_not_found_message_carries_actual_id() {
        let id = Uuid::new_v4();
        let error = SchedulerError::job_not_found(id);
        assert_eq!(error.code(), ErrorCode::JobNotFound);
        assert!(error.user_message().contains(&id.to_string()));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = SchedulerError::invalid_execution_type("SOMETIMES");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_EXECUTION_TYPE"));
        assert!(json.contains("SOMETIMES"));
    }

    #[test]
    fn test_error_display() {
        let error = SchedulerError::with_internal(
            ErrorCode::DatabaseError,
            "A database error occurred",
            "connection refused: localhost:5432",
        );

        let display = format!("{}", error);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("connection refused"));
    }
}
