use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection reason carried in the club backend's error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Session token missing or expired.
    Unauthorized,
    /// Authenticated, but the profile may not see this data.
    Forbidden,
    NotFound,
    Validation,
    Unavailable,
    Internal,
    #[serde(other)]
    Unrecognized,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Validation => "validation",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
            ErrorCode::Unrecognized => "unrecognized",
        }
    }

    /// The member has to sign in again before any further call can succeed.
    pub fn ends_session(self) -> bool {
        matches!(self, ErrorCode::Unauthorized | ErrorCode::Forbidden)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a non-success backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

/// A backend rejection surfaced through `anyhow` so callers can downcast it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("club backend rejected the request ({code}): {message}")]
pub struct ApiException {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiException {
    pub fn is_session_error(&self) -> bool {
        self.code.ends_session()
    }
}

impl From<ApiError> for ApiException {
    fn from(body: ApiError) -> Self {
        Self {
            code: body.code,
            message: body.message,
        }
    }
}
