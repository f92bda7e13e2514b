//! OpenAI-compatible Chat Completions client.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    serde_json::Value,
    tracing::{debug, trace, warn},
};

use {quartermaster_config::LlmConfig, quartermaster_mcp::McpToolDef};

use crate::{
    error::{Error, Result},
    model::{ChatMessage, CompletionResponse, ToolCall},
};

/// A model that can complete a conversation, optionally calling tools.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model(&self) -> &str;

    /// `tools` are in Chat Completions format (see [`to_openai_tools`]).
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value])
    -> Result<CompletionResponse>;
}

/// Talks to any endpoint implementing `POST {base_url}/chat/completions`.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<Secret<String>>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: None,
        }
    }

    /// Build from the `[llm]` config section, applying its request timeout.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            temperature: config.temperature,
            ..Self::new(&config.base_url, config.api_key.clone(), &config.model)
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<CompletionResponse> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(ChatMessage::to_openai_value).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        debug!(
            model = %self.model,
            messages_count = messages.len(),
            tools_count = tools.len(),
            "chat completion request"
        );

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        let http_resp = req.send().await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body_text, "LLM API error");
            return Err(Error::Api {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let resp = http_resp.json::<Value>().await?;
        trace!(response = %resp, "chat completion raw response");

        let message = resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| Error::malformed("missing choices[0].message"))?;

        let text = message["content"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        Ok(CompletionResponse {
            text,
            tool_calls: parse_tool_calls(message),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatCompletionsFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

/// Convert a tool-server catalog into Chat Completions function tools.
#[must_use]
pub fn to_openai_tools(tools: &[McpToolDef]) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| {
            let tool = ChatCompletionsTool {
                tool_type: "function",
                function: ChatCompletionsFunction {
                    name: &t.name,
                    description: t.description.as_deref().unwrap_or(""),
                    parameters: &t.input_schema,
                },
            };
            serde_json::to_value(tool).ok()
        })
        .collect()
}

/// Extract tool calls from a completion message. Unparseable argument
/// strings become an empty object.
#[must_use]
pub fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let raw = tc["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments =
                        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
