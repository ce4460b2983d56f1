use serde::Serialize;
use serde_json::Value;

/// Uniform envelope every coordination tool returns instead of propagating
/// an error type, so a failing tool call never aborts its caller's stage.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Re-export shape for the MCP tool surface (§6): `{content: [{type:
    /// "text", text: <json>}], isError: <bool>}` where the JSON is either
    /// `data` or `{error}`.
    pub fn to_mcp_content(&self) -> Value {
        let text = match (&self.data, &self.error) {
            (Some(data), _) => data.clone(),
            (None, Some(error)) => serde_json::json!({ "error": error }),
            (None, None) => Value::Null,
        };
        serde_json::json!({
            "content": [{ "type": "text", "text": text.to_string() }],
            "isError": !self.success,
        })
    }
}
