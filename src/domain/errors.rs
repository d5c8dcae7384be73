//! Domain errors for the test bridge.

use thiserror::Error;

use super::models::test_item::ItemId;

/// Errors that can occur while bridging a legacy adapter to the native protocol.
///
/// None of these are fatal to the process: every failure degrades to "this
/// one tree or run is inconsistent" and the next discovery or run recovers.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Legacy adapter '{adapter}' call '{operation}' failed: {reason}")]
    AdapterCall {
        adapter: String,
        operation: &'static str,
        reason: String,
    },

    #[error("Converter not found: {0}")]
    ConverterNotFound(String),

    #[error("Test item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Legacy adapter '{0}' does not support debugging")]
    DebugUnsupported(String),

    #[error("Converter '{0}' has been disposed")]
    ConverterDisposed(String),

    #[error("Legacy adapter host is not available")]
    HostUnavailable,

    #[error("Invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Native host error: {0}")]
    HostError(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Build an [`BridgeError::AdapterCall`] from any displayable failure.
    pub fn adapter_call(
        adapter: impl Into<String>,
        operation: &'static str,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::AdapterCall {
            adapter: adapter.into(),
            operation,
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        BridgeError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_call_message() {
        let err = BridgeError::adapter_call("mocha", "run", "boom");
        assert_eq!(
            err.to_string(),
            "Legacy adapter 'mocha' call 'run' failed: boom"
        );
    }

    #[test]
    fn test_serde_json_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: BridgeError = parse.unwrap_err().into();
        assert!(matches!(err, BridgeError::SerializationError(_)));
    }
}
