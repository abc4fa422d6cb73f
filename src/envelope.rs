//! Success/failure envelope returned by every gateway operation.

use std::fmt::Display;

use serde::Serialize;

/// Result envelope handed to the calling agent.
///
/// Operations never surface a Rust error or a panic across this boundary:
/// failures become `success = false` with a human-readable `message` that
/// carries the identifier, URL, or tool diagnostic needed to decide on a retry.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure reason or informational note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    /// Successful envelope.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Successful envelope with an informational message.
    #[must_use]
    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// Failure envelope.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Converts a `Result` into an envelope using the error's display text.
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failure(error.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_serializes_without_data() {
        let result: OperationResult<u32> = OperationResult::failure("boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_from_result_maps_error_display() {
        let result: OperationResult<u32> =
            OperationResult::from_result(Err::<u32, _>(std::fmt::Error));
        assert!(!result.success);
        assert!(result.message.is_some());

        let ok = OperationResult::from_result(Ok::<_, std::fmt::Error>(7));
        assert!(ok.success);
        assert_eq!(ok.data, Some(7));
    }
}
