use {async_trait::async_trait, serde_json::Value};

use quartermaster_mcp::{McpToolDef, ToolSession, ToolsCallResult};

/// Where the agent gets its tools from.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> quartermaster_mcp::Result<Vec<McpToolDef>>;

    async fn call_tool(&self, name: &str, arguments: Value)
    -> quartermaster_mcp::Result<ToolsCallResult>;
}

#[async_trait]
impl ToolSource for ToolSession {
    async fn list_tools(&self) -> quartermaster_mcp::Result<Vec<McpToolDef>> {
        ToolSession::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> quartermaster_mcp::Result<ToolsCallResult> {
        ToolSession::call_tool(self, name, arguments).await
    }
}

/// Text handed back to the model for a tool result: the first text part,
/// or the whole result as JSON when there is none.
#[must_use]
pub fn render_tool_result(result: &ToolsCallResult) -> String {
    result
        .content
        .iter()
        .find_map(|part| part.as_text())
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string(result).unwrap_or_default())
}

/// Text handed back to the model when the call itself failed.
#[must_use]
pub fn render_tool_failure(name: &str, error: &quartermaster_mcp::Error) -> String {
    serde_json::json!({ "error": format!("Failed to execute {name}: {error}") }).to_string()
}

#[cfg(test)]
mod tests {
    use {super::*, quartermaster_mcp::ToolContent};

    #[test]
    fn renders_first_text_part() {
        let result = ToolsCallResult {
            content: vec![
                ToolContent::Image {
                    data: "AAAA".into(),
                    mime_type: "image/png".into(),
                },
                ToolContent::Text {
                    text: "3 stockpiles".into(),
                },
                ToolContent::Text {
                    text: "ignored".into(),
                },
            ],
            is_error: false,
        };
        assert_eq!(render_tool_result(&result), "3 stockpiles");
    }

    #[test]
    fn renders_json_without_text() {
        let result = ToolsCallResult {
            content: vec![],
            is_error: true,
        };
        assert_eq!(render_tool_result(&result), r#"{"content":[],"isError":true}"#);
    }

    #[test]
    fn failure_names_tool() {
        let rendered =
            render_tool_failure("list_stockpiles", &quartermaster_mcp::Error::NotInitialized);
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            value["error"],
            "Failed to execute list_stockpiles: tool session is not initialized"
        );
    }
}
