//! DevTools protocol wire types

use serde::{Deserialize, Serialize};

/// Outgoing JSON-RPC command
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Incoming command response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
}

/// Error payload of a failed command
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Incoming event notification
#[derive(Debug, Clone, Deserialize)]
pub struct CdpNotification {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Result object of `Runtime.evaluate`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteObject {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `Runtime.evaluate` response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResponse {
    #[serde(default)]
    pub result: RemoteObject,
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = CdpRequest {
            id: 1,
            method: "Page.navigate".to_string(),
            params: Some(serde_json::json!({ "url": "https://example.com" })),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"Page.navigate\""));
    }

    #[test]
    fn test_request_without_params() {
        let request = CdpRequest {
            id: 2,
            method: "Page.enable".to_string(),
            params: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_response_with_error() {
        let raw = r#"{"id": 7, "error": {"code": -32000, "message": "Target closed"}}"#;
        let response: CdpRpcResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, 7);
        assert_eq!(response.error.unwrap().message, "Target closed");
    }
}
