//! Agent loop: ask the model, run the tools it asks for, repeat.

use std::{collections::BTreeSet, sync::Arc};

use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    tracing::{debug, info, warn},
};

use {
    quartermaster_chat::{Decider, EffectiveRequest},
    quartermaster_common::Stopwatch,
};

use crate::{
    error::Result,
    model::{ChatMessage, ToolCall},
    prompt::build_system_prompt,
    provider::{LlmProvider, to_openai_tools},
    tool_registry::{ToolSource, render_tool_failure, render_tool_result},
};

/// Reply when the model finished without any text.
pub const FALLBACK_REPLY: &str =
    "I processed your request but couldn't generate a response. Please try again.";

/// [`Decider`] backed by an LLM with access to the tool server's catalog.
pub struct ToolLoopDecider {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolSource>,
    max_iterations: usize,
}

impl ToolLoopDecider {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolSource>,
        max_iterations: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            max_iterations,
        }
    }

    /// Run the loop for one request and return the reply text.
    pub async fn run(&self, request: &EffectiveRequest) -> Result<String> {
        let timer = Stopwatch::start();
        let catalog = self.tools.list_tools().await?;
        let schemas = to_openai_tools(&catalog);

        debug!(
            model = %self.provider.model(),
            tools = catalog.len(),
            regiment = ?request.conversation_id,
            "agent run started"
        );

        let mut messages = vec![
            ChatMessage::system(build_system_prompt(request)),
            ChatMessage::user(request.user_text.clone()),
        ];
        let mut tools_called = BTreeSet::new();
        let mut iterations = 0;

        let text = loop {
            iterations += 1;
            let round = Stopwatch::start();
            let resp = self.provider.complete(&messages, &schemas).await?;
            debug!(
                iteration = iterations,
                elapsed_ms = round.elapsed_ms(),
                tool_calls = resp.tool_calls.len(),
                "model responded"
            );

            if resp.tool_calls.is_empty() {
                break resp.text.unwrap_or_default();
            }
            if iterations > self.max_iterations {
                warn!(
                    max_iterations = self.max_iterations,
                    "agent loop exceeded max iterations"
                );
                break resp.text.unwrap_or_default();
            }

            let mut results = Vec::with_capacity(resp.tool_calls.len());
            for call in &resp.tool_calls {
                let arguments = inject_context(&call.arguments, request);
                results.push(ChatMessage::tool(
                    call.id.clone(),
                    self.execute(call, arguments).await,
                ));
                tools_called.insert(call.name.clone());
            }
            messages.push(ChatMessage::assistant_with_tools(resp.text, resp.tool_calls));
            messages.extend(results);
        };

        info!(
            elapsed_ms = timer.elapsed_ms(),
            iterations,
            tools = tools_called.len(),
            "agent run complete"
        );

        let text = strip_wrapping_code_block(&text);
        if text.is_empty() {
            return Ok(FALLBACK_REPLY.to_string());
        }
        Ok(text)
    }

    async fn execute(&self, call: &ToolCall, arguments: Value) -> String {
        let timer = Stopwatch::start();
        let outcome = self.tools.call_tool(&call.name, arguments).await;
        let elapsed_ms = timer.elapsed_ms();
        match outcome {
            Ok(result) => {
                debug!(
                    tool = %call.name,
                    elapsed_ms,
                    is_error = result.is_error,
                    "tool call finished"
                );
                render_tool_result(&result)
            },
            Err(e) => {
                warn!(tool = %call.name, elapsed_ms, error = %e, "tool call failed");
                render_tool_failure(&call.name, &e)
            },
        }
    }
}

#[async_trait]
impl Decider for ToolLoopDecider {
    async fn decide(&self, request: &EffectiveRequest) -> quartermaster_chat::Result<String> {
        self.run(request)
            .await
            .map_err(|e| quartermaster_chat::Error::decision_with("agent run failed", e))
    }
}

/// Add `regimentId` and `userId` from the request unless the model already
/// supplied them. Non-object arguments are replaced by an object.
fn inject_context(arguments: &Value, request: &EffectiveRequest) -> Value {
    let mut args = match arguments {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Some(regiment) = &request.conversation_id {
        args.entry("regimentId")
            .or_insert_with(|| Value::String(regiment.clone()));
    }
    args.entry("userId")
        .or_insert_with(|| Value::String(request.user_id.clone()));
    Value::Object(args)
}

/// Remove a code fence wrapping the whole reply, which would otherwise
/// disable Discord formatting. Fences inside the text are left alone.
fn strip_wrapping_code_block(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed.to_string();
    };

    let body = match inner.split_once('\n') {
        Some((tag, rest)) if tag.chars().all(|c| c.is_alphanumeric() || c == '_') => rest,
        _ => inner,
    };
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use {
        super::*,
        crate::{error::Error, model::CompletionResponse},
        quartermaster_mcp::{McpToolDef, ToolContent, ToolsCallResult},
        serde_json::json,
    };

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<CompletionResponse>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<CompletionResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[Value],
        ) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(call("call_loop", "list_stockpiles", json!({}))))
        }
    }

    #[derive(Default)]
    struct FakeTools {
        calls: Mutex<Vec<(String, Value)>>,
        fail: bool,
    }

    #[async_trait]
    impl ToolSource for FakeTools {
        async fn list_tools(&self) -> quartermaster_mcp::Result<Vec<McpToolDef>> {
            Ok(vec![McpToolDef {
                name: "search_inventory".into(),
                description: Some("Find items".into()),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
        ) -> quartermaster_mcp::Result<ToolsCallResult> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            if self.fail {
                return Err(quartermaster_mcp::Error::NotInitialized);
            }
            Ok(ToolsCallResult {
                content: vec![ToolContent::Text {
                    text: "516 crates of bmats".into(),
                }],
                is_error: false,
            })
        }
    }

    fn text(s: &str) -> CompletionResponse {
        CompletionResponse {
            text: Some(s.into()),
            tool_calls: vec![],
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> CompletionResponse {
        CompletionResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
        }
    }

    fn request() -> EffectiveRequest {
        EffectiveRequest {
            user_text: "do we have 50 crates of bmats?".into(),
            conversation_id: Some("555".into()),
            user_id: "2000".into(),
            user_display_name: "logi_lead".into(),
            channel_id: "c1".into(),
            guild_display_name: Some("7th Logistics".into()),
        }
    }

    #[tokio::test]
    async fn plain_answer_needs_no_tools() {
        let provider = ScriptedProvider::new(vec![Ok(text("Yes."))]);
        let tools = Arc::new(FakeTools::default());
        let decider = ToolLoopDecider::new(provider.clone(), tools.clone(), 5);

        assert_eq!(decider.run(&request()).await.unwrap(), "Yes.");
        assert!(tools.calls.lock().unwrap().is_empty());
        let first = &provider.requests.lock().unwrap()[0];
        assert!(matches!(
            &first[0],
            ChatMessage::System { content } if content.contains("Regiment ID: 555")
        ));
        assert_eq!(first[1], ChatMessage::user("do we have 50 crates of bmats?"));
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_with_context_injected() {
        let provider = ScriptedProvider::new(vec![
            Ok(call("call_1", "search_inventory", json!({"query": "bmat"}))),
            Ok(text("**Yes**, 516 crates.")),
        ]);
        let tools = Arc::new(FakeTools::default());
        let decider = ToolLoopDecider::new(provider.clone(), tools.clone(), 5);

        let reply = decider.run(&request()).await.unwrap();

        assert_eq!(reply, "**Yes**, 516 crates.");
        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls[0].0, "search_inventory");
        assert_eq!(
            calls[0].1,
            json!({"query": "bmat", "regimentId": "555", "userId": "2000"})
        );
        let second = &provider.requests.lock().unwrap()[1];
        assert_eq!(
            second.last(),
            Some(&ChatMessage::tool("call_1", "516 crates of bmats"))
        );
    }

    #[tokio::test]
    async fn model_supplied_ids_are_kept() {
        let args = json!({"regimentId": "999", "userId": "1"});
        let injected = inject_context(&args, &request());
        assert_eq!(injected, args);

        let dm = EffectiveRequest {
            conversation_id: None,
            ..request()
        };
        assert_eq!(inject_context(&json!(null), &dm), json!({"userId": "2000"}));
    }

    #[tokio::test]
    async fn tool_failure_is_reported_to_model() {
        let provider = ScriptedProvider::new(vec![
            Ok(call("call_1", "search_inventory", json!({}))),
            Ok(text("The inventory service is down.")),
        ]);
        let tools = Arc::new(FakeTools {
            fail: true,
            ..FakeTools::default()
        });
        let decider = ToolLoopDecider::new(provider.clone(), tools, 5);

        let reply = decider.run(&request()).await.unwrap();

        assert_eq!(reply, "The inventory service is down.");
        let second = &provider.requests.lock().unwrap()[1];
        match second.last() {
            Some(ChatMessage::Tool { content, .. }) => {
                assert!(content.contains("Failed to execute search_inventory"));
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let provider = ScriptedProvider::new(vec![]);
        let tools = Arc::new(FakeTools::default());
        let decider = ToolLoopDecider::new(provider.clone(), tools.clone(), 3);

        let reply = decider.run(&request()).await.unwrap();

        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(tools.calls.lock().unwrap().len(), 3);
        assert_eq!(provider.requests.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_answer_uses_fallback() {
        let provider = ScriptedProvider::new(vec![Ok(CompletionResponse::default())]);
        let decider = ToolLoopDecider::new(provider, Arc::new(FakeTools::default()), 5);
        assert_eq!(decider.run(&request()).await.unwrap(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn provider_error_becomes_decision_error() {
        let provider = ScriptedProvider::new(vec![Err(Error::Api {
            status: 500,
            body: "boom".into(),
        })]);
        let decider = ToolLoopDecider::new(provider, Arc::new(FakeTools::default()), 5);

        let err = decider.decide(&request()).await.unwrap_err();
        assert!(matches!(err, quartermaster_chat::Error::Decision { .. }));
    }

    #[test]
    fn strips_fence_around_whole_reply() {
        assert_eq!(
            strip_wrapping_code_block("```markdown\n**Yes** 🟢\n```"),
            "**Yes** 🟢"
        );
        assert_eq!(strip_wrapping_code_block("```\nplain\n```"), "plain");
        assert_eq!(strip_wrapping_code_block("```one line```"), "one line");
    }

    #[test]
    fn inner_fences_are_kept() {
        let text = "Run this:\n```\n!refresh\n```\nthen check.";
        assert_eq!(strip_wrapping_code_block(text), text);
    }
}
