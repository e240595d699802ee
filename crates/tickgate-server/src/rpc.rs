//! JSON-RPC 2.0 framing for the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use tickgate_core::GatewayError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Incoming request line.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Notifications carry no id and get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// `tools/call` parameters.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            String::from(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"response serialization failed"}}"#)
        })
    }
}

/// Tool-result envelope: `{content:[{type:"text",text:…}], isError}`.
pub fn tool_result(text: String, is_error: bool) -> Value {
    let mut result = json!({
        "content": [{ "type": "text", "text": text }],
    });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

/// Map a gateway error onto the `isError` envelope, keeping the attempt log
/// for the retryable aggregate kinds.
pub fn tool_error_result(error: &GatewayError) -> Value {
    let body = match error {
        GatewayError::AggregateFailure { attempts, .. }
        | GatewayError::DeadlineExceeded { attempts, .. } => json!({
            "error": error.to_string(),
            "attempts": attempts,
        }),
        _ => json!({ "error": error.to_string() }),
    };
    tool_result(body.to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_lines_parse_with_and_without_params() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let request: RpcRequest = serde_json::from_str(line).expect("parses");
        assert_eq!(request.method, "tools/list");
        assert!(!request.is_notification());

        let notification = r#"{"jsonrpc":"2.0","method":"ping"}"#;
        let request: RpcRequest = serde_json::from_str(notification).expect("parses");
        assert!(request.is_notification());
    }

    #[test]
    fn tool_results_only_mark_errors_when_asked() {
        let ok = tool_result(String::from("{}"), false);
        assert!(ok.get("isError").is_none());
        assert_eq!(ok["content"][0]["type"], "text");

        let failed = tool_result(String::from("boom"), true);
        assert_eq!(failed["isError"], serde_json::json!(true));
    }

    #[test]
    fn responses_serialize_to_single_lines() {
        let line = RpcResponse::success(serde_json::json!(7), serde_json::json!({"ok": true}))
            .to_line();
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""id":7"#));
    }
}
