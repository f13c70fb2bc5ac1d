use crate::models::MessageType;
use crate::utils::now_utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply sent to the originating connection for every inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echoes the request type, or `ERROR` when it could not be determined
    #[serde(rename = "type")]
    pub kind: MessageType,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// One of [`error_codes`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub timestamp: String,
}

impl Response {
    pub fn success(kind: MessageType, data: Option<Value>) -> Self {
        Self {
            kind,
            success: true,
            data,
            error: None,
            code: None,
            timestamp: now_utc(),
        }
    }

    pub fn error(kind: MessageType, code: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.to_string()),
            timestamp: now_utc(),
        }
    }

    /// Error response carrying validation details in `data`.
    pub fn error_with_details(
        kind: MessageType,
        code: &str,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            data: Some(details),
            ..Self::error(kind, code, message)
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"ERROR","success":false,"error":"Failed to encode response: {}","timestamp":"{}"}}"#,
                e, self.timestamp
            )
        })
    }
}

/// Error code constants
pub mod error_codes {
    /// Frame was not valid JSON. The connection is closed afterwards.
    pub const MALFORMED_MESSAGE: &str = "MALFORMED_MESSAGE";

    pub const UNKNOWN_MESSAGE_TYPE: &str = "UNKNOWN_MESSAGE_TYPE";

    /// Validation reported at least one error
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

    /// Payload passed validation but could not be decoded
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";

    pub const HANDLER_FAILED: &str = "HANDLER_FAILED";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response_serialization() {
        let response = Response::success(MessageType::GetState, Some(json!({"state": {}})));
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();

        assert_eq!(value["type"], "GET_STATE");
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
        assert!(value.get("code").is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let response = Response::error(
            MessageType::Error,
            error_codes::MALFORMED_MESSAGE,
            "Invalid JSON",
        );
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();

        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Invalid JSON");
        assert_eq!(value["code"], "MALFORMED_MESSAGE");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_error_with_details() {
        let response = Response::error_with_details(
            MessageType::ComponentAdded,
            error_codes::INVALID_MESSAGE,
            "Validation failed",
            json!({"errors": ["componentName is required for COMPONENT_ADDED"]}),
        );
        assert!(!response.success);
        assert_eq!(response.data.unwrap()["errors"][0], "componentName is required for COMPONENT_ADDED");
    }
}
