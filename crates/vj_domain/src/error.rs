use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date key `{0}`, expected YYYY-MM-DD")]
    InvalidDateKey(String),
    #[error("invalid month key `{0}`, expected YYYY-MM")]
    InvalidMonthKey(String),
    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),
    #[error("unknown range selector `{0}`")]
    UnknownRange(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title is required.")]
    MissingTitle,
    #[error("Title must be at most {max} characters (got {len}).")]
    TitleTooLong { max: usize, len: usize },
    #[error("Name is required.")]
    MissingName,
}

/// Whether a failed request should surface the offline indicator or a generic retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Other,
}

const NETWORK_MARKERS: [&str; 2] = ["Network request failed", "Failed to fetch"];

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        if NETWORK_MARKERS.iter().any(|marker| message.contains(marker)) {
            FailureKind::Network
        } else {
            FailureKind::Other
        }
    }
}

/// Renders an optional failure message for display.
pub fn failure_message(message: Option<&str>) -> String {
    match message.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => "Unknown error".to_string(),
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("request failed: {message}")]
    Request { kind: FailureKind, message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        let message = message.into();
        StoreError::Request {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::Request { kind, .. } => *kind,
            _ => FailureKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connectivity_failures() {
        assert_eq!(
            FailureKind::classify("TypeError: Network request failed"),
            FailureKind::Network
        );
        assert_eq!(
            FailureKind::classify("Failed to fetch"),
            FailureKind::Network
        );
        assert_eq!(
            FailureKind::classify("duplicate key value violates unique constraint"),
            FailureKind::Other
        );
        assert_eq!(
            StoreError::request("Failed to fetch").failure_kind(),
            FailureKind::Network
        );
        assert_eq!(
            StoreError::not_found("habit", "h1").failure_kind(),
            FailureKind::Other
        );
    }

    #[test]
    fn blank_messages_render_as_unknown() {
        assert_eq!(failure_message(None), "Unknown error");
        assert_eq!(failure_message(Some("  ")), "Unknown error");
        assert_eq!(failure_message(Some("boom")), "boom");
    }
}
