//! The `{success, data}` envelope.

use serde::Serialize;
use serde_json::{json, Value};

/// `{"success": true, "data": ...}` or
/// `{"success": false, "data": {"message": ...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Value,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: json!({ "message": message.into() }),
        }
    }

    /// The failure message, if this is a failure.
    pub fn message(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        self.data.get("message").and_then(Value::as_str)
    }

    pub fn to_json(&self) -> String {
        // Value and bool never fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_shape() {
        let response = ApiResponse::failure("Unauthorized");
        assert_eq!(
            response.to_json(),
            r#"{"success":false,"data":{"message":"Unauthorized"}}"#
        );
        assert_eq!(response.message(), Some("Unauthorized"));
    }

    #[test]
    fn test_success_shape() {
        let response = ApiResponse::success(json!({ "count": 3 }));
        assert_eq!(response.to_json(), r#"{"success":true,"data":{"count":3}}"#);
        assert_eq!(response.message(), None);
    }
}
