use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Envelope every tool returns. `content` is itself a JSON document.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: String,
    pub content_type: &'static str,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub provider_used: String,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    /// Wrap a serializable payload as a successful response.
    pub fn json<T: Serialize>(payload: &T, metadata: ToolMetadata) -> Self {
        match serde_json::to_string(payload) {
            Ok(content) => Self {
                status: "success",
                content,
                content_type: "json",
                metadata,
            },
            Err(e) => Self::error(format!("serialization failed: {e}"), metadata),
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: message,
            content_type: "text",
            metadata,
        }
    }

    /// Convert to MCP CallToolResult.
    /// Failures are reported inside the payload (`"status": "error"`) rather
    /// than as transport errors, so clients can show them next to results.
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","content":"serialization failed: {escaped}","content_type":"text","metadata":{{}}}}"#
                ))])
            }
        }
    }
}
