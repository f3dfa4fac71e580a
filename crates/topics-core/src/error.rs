use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopicsErrorCategory {
    /// Input rejected before any network call.
    Validation,
    /// Timeout or no response received at all.
    Network,
    /// Response received with a 5xx status.
    Server,
    /// Response received with a 4xx status other than not-found.
    Client,
    /// The requested identity does not exist on the server.
    NotFound,
    /// Response body could not be decoded.
    Serialization,
    /// Invalid local configuration.
    Config,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload shared by the client, controller and frontends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct TopicsError {
    /// High-level error category.
    pub category: TopicsErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status when the error came from a response.
    pub status: Option<u16>,
}

impl TopicsError {
    /// Construct a new error.
    pub fn new(
        category: TopicsErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let category = classify_http_status(status);
        let code = match category {
            TopicsErrorCategory::NotFound => "not_found",
            TopicsErrorCategory::Client => "client_error",
            TopicsErrorCategory::Server => "server_error",
            _ => "unexpected_status",
        };
        Self {
            category,
            code: code.to_owned(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Build a validation error for a single input field.
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TopicsErrorCategory::Validation, code, message)
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            TopicsErrorCategory::Network | TopicsErrorCategory::Server
        )
    }
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> TopicsErrorCategory {
    match status {
        404 => TopicsErrorCategory::NotFound,
        400..=499 => TopicsErrorCategory::Client,
        500..=599 => TopicsErrorCategory::Server,
        _ => TopicsErrorCategory::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_categories() {
        assert_eq!(classify_http_status(404), TopicsErrorCategory::NotFound);
        assert_eq!(classify_http_status(400), TopicsErrorCategory::Client);
        assert_eq!(classify_http_status(401), TopicsErrorCategory::Client);
        assert_eq!(classify_http_status(503), TopicsErrorCategory::Server);
        assert_eq!(classify_http_status(700), TopicsErrorCategory::Internal);
    }

    #[test]
    fn only_network_and_server_failures_are_transient() {
        assert!(TopicsError::from_status(502, "bad gateway").is_transient());
        assert!(
            TopicsError::new(TopicsErrorCategory::Network, "timeout", "timed out").is_transient()
        );
        assert!(!TopicsError::from_status(404, "missing").is_transient());
        assert!(!TopicsError::from_status(422, "invalid").is_transient());
        assert!(!TopicsError::validation("title_too_short", "short").is_transient());
    }

    #[test]
    fn keeps_status_error_codes_stable() {
        let err = TopicsError::from_status(404, "no such topic");
        assert_eq!(err.code, "not_found");
        assert_eq!(err.status, Some(404));

        let err = TopicsError::from_status(500, "boom");
        assert_eq!(err.code, "server_error");
        assert_eq!(err.category, TopicsErrorCategory::Server);
    }
}
