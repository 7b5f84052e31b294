//! The two LLM passes: initial response and tool-result refinement.

use std::sync::Arc;

use serde_json::Value;

use rv_domain::channel::Channel;
use rv_domain::contract::AgentResponse;
use rv_domain::conversation::{StructuredMemory, Turn, TurnRole};
use rv_domain::tool::ExecutedTool;
use rv_domain::trace::TraceEvent;
use rv_domain::Result;
use rv_tools::classify_failure;

use crate::contract::parse_agent_response;
use crate::prompts;
use crate::provider::{ChatMessage, ChatRequest, LlmProvider};

/// How many recent turns the prompt carries.
const HISTORY_WINDOW: usize = 12;
/// Longest tool-result JSON embedded in the refinement prompt.
const TOOL_RESULT_PREVIEW: usize = 1200;

/// Everything one agent invocation needs.
pub struct AgentInput<'a> {
    pub user_text: &'a str,
    pub history: &'a [Turn],
    pub memory: &'a StructuredMemory,
    pub channel: Channel,
    /// Prompt version override (experiments); `None` = config default.
    pub prompt_version: Option<&'a str>,
    pub request_id: &'a str,
    pub proactive_context: Option<&'a str>,
    pub customer_context: Option<&'a str>,
}

pub struct AgentCore {
    provider: Arc<dyn LlmProvider>,
    default_prompt_version: String,
    tool_catalog: Vec<Value>,
}

impl AgentCore {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        default_prompt_version: &str,
        tool_catalog: Vec<Value>,
    ) -> Self {
        Self {
            provider,
            default_prompt_version: default_prompt_version.to_owned(),
            tool_catalog,
        }
    }

    /// First pass: derive the reply, intent, and tool calls from the
    /// user's message.
    pub async fn process(&self, input: &AgentInput<'_>) -> Result<AgentResponse> {
        let messages = self.build_messages(input, None);
        self.invoke(messages, input, false).await
    }

    /// Second pass: refine the reply with the executed tool results.
    pub async fn process_with_tool_results(
        &self,
        input: &AgentInput<'_>,
        tool_results: &[ExecutedTool],
        previous_reply: &str,
    ) -> Result<AgentResponse> {
        let refinement = RefinementContext { tool_results, previous_reply };
        let messages = self.build_messages(input, Some(&refinement));
        self.invoke(messages, input, true).await
    }

    async fn invoke(
        &self,
        messages: Vec<ChatMessage>,
        input: &AgentInput<'_>,
        refinement: bool,
    ) -> Result<AgentResponse> {
        let started = std::time::Instant::now();
        let raw = self
            .provider
            .complete_json(&ChatRequest {
                messages,
                temperature: 0.2,
                max_tokens: None,
            })
            .await?;

        TraceEvent::LlmRequest {
            model: self.provider.model().to_owned(),
            prompt_version: self.prompt_version(input).to_owned(),
            refinement,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        parse_agent_response(&raw)
    }

    fn prompt_version<'a>(&'a self, input: &AgentInput<'a>) -> &'a str {
        input.prompt_version.unwrap_or(&self.default_prompt_version)
    }

    fn build_messages(
        &self,
        input: &AgentInput<'_>,
        refinement: Option<&RefinementContext<'_>>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        let mut system = prompts::system_prompt(
            input.channel,
            self.prompt_version(input),
            &self.tool_catalog,
        );
        system.push_str("\n\nKnown customer context:\n");
        system.push_str(&memory_summary(input.memory));
        if let Some(proactive) = input.proactive_context {
            system.push_str("\n\nProactively detected issues:\n");
            system.push_str(proactive);
        }
        if let Some(customer) = input.customer_context {
            system.push_str("\n\nCustomer profile:\n");
            system.push_str(customer);
        }
        messages.push(ChatMessage::system(system));

        // Recent history, oldest first, system turns included as user
        // context notes.
        let start = input.history.len().saturating_sub(HISTORY_WINDOW);
        for turn in &input.history[start..] {
            match turn.role {
                TurnRole::User => messages.push(ChatMessage::user(&turn.content)),
                TurnRole::Assistant => messages.push(ChatMessage::assistant(&turn.content)),
                TurnRole::System => {
                    messages.push(ChatMessage::user(format!("[context] {}", turn.content)));
                }
            }
        }

        match refinement {
            None => messages.push(ChatMessage::user(input.user_text)),
            Some(refinement) => {
                messages.push(ChatMessage::user(input.user_text));
                messages.push(ChatMessage::assistant(refinement.previous_reply));
                messages.push(ChatMessage::user(build_refinement_prompt(
                    refinement.tool_results,
                )));
            }
        }

        messages
    }
}

struct RefinementContext<'a> {
    tool_results: &'a [ExecutedTool],
    previous_reply: &'a str,
}

/// One compact block per executed tool: outcome, data or classified
/// failure with a suggestion.
fn build_refinement_prompt(tool_results: &[ExecutedTool]) -> String {
    let mut out = String::from(
        "Tool results are in. Produce the final reply for the customer, still as \
         contract JSON with an empty tool_calls array.\n",
    );
    for executed in tool_results {
        match &executed.result {
            rv_domain::tool::ToolResult::Success { data } => {
                let mut preview = data.to_string();
                if preview.len() > TOOL_RESULT_PREVIEW {
                    preview.truncate(TOOL_RESULT_PREVIEW);
                    preview.push('…');
                }
                out.push_str(&format!("\n[{} → ok] {preview}", executed.tool));
            }
            rv_domain::tool::ToolResult::Failure { error } => {
                let context = classify_failure(error);
                out.push_str(&format!(
                    "\n[{} → failed: {error}] Suggestion: {}",
                    executed.tool, context.suggestion
                ));
            }
        }
    }
    out
}

/// Flatten structured memory into the short block the prompt carries.
fn memory_summary(memory: &StructuredMemory) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &memory.name {
        parts.push(format!("name: {name}"));
    }
    if let Some(email) = &memory.email {
        parts.push(format!("email: {email}"));
    }
    if let Some(phone) = &memory.phone {
        parts.push(format!("phone: {phone}"));
    }
    if let Some(company) = &memory.company {
        parts.push(format!("company: {company}"));
    }
    if let Some(intent) = &memory.intent {
        parts.push(format!("known intent: {intent}"));
    }
    if !memory.order_numbers.is_empty() {
        parts.push(format!("orders: {}", memory.order_numbers.join(", ")));
    }
    if !memory.product_interest.is_empty() {
        parts.push(format!("interested in: {}", memory.product_interest.join(", ")));
    }
    for (key, value) in &memory.custom_fields {
        parts.push(format!("{key}: {value}"));
    }
    if parts.is_empty() {
        "(nothing known yet)".to_owned()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rv_domain::tool::ToolResult;
    use rv_domain::{Error, Result};

    /// A scripted provider: returns canned responses and records the
    /// requests it saw.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn returning(raw: &str) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Ok(raw.to_owned())]),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Err(Error::Llm("down".into()))]),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete_json(&self, req: &ChatRequest) -> Result<String> {
            self.seen.lock().push(req.clone());
            self.responses.lock().remove(0)
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn input<'a>(memory: &'a StructuredMemory, history: &'a [Turn]) -> AgentInput<'a> {
        AgentInput {
            user_text: "where is Q2593VU",
            history,
            memory,
            channel: Channel::Web,
            prompt_version: None,
            request_id: "r1",
            proactive_context: None,
            customer_context: None,
        }
    }

    #[tokio::test]
    async fn process_parses_contract() {
        let provider = ScriptedProvider::returning(
            r#"{"user_facing_message":"Checking!","intent":"order_status",
                "tool_calls":[{"name":"lookup_customer_orders","args":{"order_no":"Q2593VU"}}]}"#,
        );
        let core = AgentCore::new(provider.clone(), "v2", vec![]);
        let memory = StructuredMemory::default();
        let response = core.process(&input(&memory, &[])).await.unwrap();
        assert_eq!(response.intent, "order_status");
        assert_eq!(response.tool_calls.len(), 1);

        // The request carried the system prompt and the user text.
        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].messages[0].role, Role::System));
        assert_eq!(seen[0].messages.last().unwrap().content, "where is Q2593VU");
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let core = AgentCore::new(ScriptedProvider::failing(), "v2", vec![]);
        let memory = StructuredMemory::default();
        let err = core.process(&input(&memory, &[])).await.unwrap_err();
        assert!(err.to_string().contains("LLM"));
    }

    #[tokio::test]
    async fn history_is_windowed() {
        let provider = ScriptedProvider::returning(
            r#"{"user_facing_message":"ok","intent":"order_status"}"#,
        );
        let core = AgentCore::new(provider.clone(), "v2", vec![]);
        let memory = StructuredMemory::default();
        let history: Vec<Turn> = (0..30)
            .map(|i| Turn::new(TurnRole::User, format!("m{i}")))
            .collect();
        core.process(&input(&memory, &history)).await.unwrap();

        let seen = provider.seen.lock();
        // system + 12 history + current user text
        assert_eq!(seen[0].messages.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(seen[0].messages[1].content, "m18");
    }

    #[tokio::test]
    async fn refinement_carries_results_and_suggestions() {
        let provider = ScriptedProvider::returning(
            r#"{"user_facing_message":"final","intent":"order_status"}"#,
        );
        let core = AgentCore::new(provider.clone(), "v2", vec![]);
        let memory = StructuredMemory::default();
        let results = vec![
            ExecutedTool {
                tool: "lookup_customer_orders".into(),
                args: serde_json::json!({"order_no": "Q1"}),
                result: ToolResult::success(serde_json::json!({"orders": []})),
                duration_ms: 12,
            },
            ExecutedTool {
                tool: "track_shipment".into(),
                args: serde_json::json!({"awb": "1"}),
                result: ToolResult::failure("timeout: track_shipment exceeded 15s"),
                duration_ms: 15_000,
            },
        ];
        let response = core
            .process_with_tool_results(&input(&memory, &[]), &results, "draft reply")
            .await
            .unwrap();
        assert_eq!(response.user_facing_message, "final");

        let seen = provider.seen.lock();
        let last = &seen[0].messages.last().unwrap().content;
        assert!(last.contains("lookup_customer_orders → ok"));
        assert!(last.contains("track_shipment → failed"));
        assert!(last.contains("Suggestion:"));
        // The draft reply is present as assistant context.
        assert!(seen[0]
            .messages
            .iter()
            .any(|m| m.content == "draft reply"));
    }

    #[tokio::test]
    async fn memory_lands_in_system_prompt() {
        let provider = ScriptedProvider::returning(
            r#"{"user_facing_message":"ok","intent":"greeting"}"#,
        );
        let core = AgentCore::new(provider.clone(), "v2", vec![]);
        let memory = StructuredMemory {
            name: Some("Asha".into()),
            order_numbers: vec!["Q2593VU".into()],
            ..Default::default()
        };
        core.process(&input(&memory, &[])).await.unwrap();
        let seen = provider.seen.lock();
        assert!(seen[0].messages[0].content.contains("name: Asha"));
        assert!(seen[0].messages[0].content.contains("Q2593VU"));
    }
}
