//! Responders: one model persona with optional knowledge and tools.
//!
//! A request runs as a bounded tool loop:
//!
//! ```text
//! system prompt (+ retrieved context)  ─┐
//! user query                           ─┤
//!                                       ▼
//!                 ┌──────── model.chat(messages, tools) ◀────────┐
//!                 │                                               │
//!        no tool calls ──▶ final text          tool calls ──▶ execute, append results
//! ```
//!
//! The last permitted round is sent without tool schemas, so the model has
//! to answer in text. Tool failures the model can act on (unknown tool,
//! bad arguments, a failed save) go back to it as `{"error": ...}`; backend
//! failures abort with [`Error::Upstream`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use review_harness_core::models::RetrievedChunk;

use crate::config::RetrievalMode;
use crate::error::{Error, Result};
use crate::knowledge::CombinedKnowledge;
use crate::llm::{ChatMessage, ChatRequest, ModelClient, ToolCall};
use crate::tools::{SearchKnowledgeTool, Tool, ToolError, ToolRegistry};

/// Answer of one [`Respond::respond`] call.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Response {
    pub text: String,
    /// Tool names in call order.
    pub tool_calls: Vec<String>,
    /// Chunks placed in the prompt up front.
    pub retrieved: usize,
}

#[async_trait]
pub trait Respond: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn respond(&self, query: &str) -> Result<Response>;
}

pub struct Responder {
    name: String,
    description: String,
    instructions: Vec<String>,
    sections: Vec<String>,
    markdown: bool,
    model: String,
    client: Arc<dyn ModelClient>,
    knowledge: Option<Arc<CombinedKnowledge>>,
    retrieval: RetrievalMode,
    top_k: usize,
    tools: ToolRegistry,
    max_tool_rounds: usize,
}

impl Responder {
    pub fn new(name: impl Into<String>, model: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: Vec::new(),
            sections: Vec::new(),
            markdown: true,
            model: model.into(),
            client,
            knowledge: None,
            retrieval: RetrievalMode::None,
            top_k: 5,
            tools: ToolRegistry::new(),
            max_tool_rounds: 8,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: Vec<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Extra system-prompt paragraph, placed after the instructions.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.sections.push(section.into());
        self
    }

    /// Bind knowledge. In [`RetrievalMode::Tool`] this registers
    /// `search_knowledge_base`; in [`RetrievalMode::None`] the knowledge is unused.
    pub fn with_knowledge(
        mut self,
        knowledge: Arc<CombinedKnowledge>,
        mode: RetrievalMode,
        top_k: usize,
    ) -> Self {
        self.top_k = top_k.max(1);
        self.retrieval = mode;
        match mode {
            RetrievalMode::Context => self.knowledge = Some(knowledge),
            RetrievalMode::Tool => {
                self.tools
                    .register(Box::new(SearchKnowledgeTool::new(knowledge, self.top_k)));
            }
            RetrievalMode::None => {}
        }
        self
    }

    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = self.description.clone();
        if !self.instructions.is_empty() {
            prompt.push_str("\n\nInstructions:");
            for (i, line) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("\n{}. {}", i + 1, line));
            }
        }
        for section in &self.sections {
            prompt.push_str("\n\n");
            prompt.push_str(section);
        }
        if self.markdown {
            prompt.push_str("\n\nFormat your answers as Markdown.");
        }
        prompt.trim_start().to_string()
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<Value> {
        let name = call.function.name.as_str();
        let Some(tool) = self.tools.find(name) else {
            warn!(agent = %self.name, tool = name, "model requested unknown tool");
            return Ok(json!({ "error": format!("unknown tool: {}", name) }));
        };
        debug!(agent = %self.name, tool = name, "calling tool");
        match tool.execute(call.function.arguments_object()).await {
            Ok(v) => Ok(v),
            Err(ToolError::Upstream(e)) => Err(e),
            Err(e) => {
                warn!(agent = %self.name, tool = name, error = %e, "tool failed");
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }
}

fn context_message(hits: &[RetrievedChunk]) -> String {
    let mut out = String::from("Relevant excerpts from the knowledge base:");
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "\n\n[{}] {} (chunk {})\n{}",
            i + 1,
            hit.source_file,
            hit.chunk_index,
            hit.text
        ));
    }
    out
}

fn tool_content(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl Respond for Responder {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn respond(&self, query: &str) -> Result<Response> {
        if query.trim().is_empty() {
            return Err(Error::precondition("Please enter a query"));
        }
        info!(agent = %self.name, "responding");

        let mut response = Response::default();
        let mut messages = vec![ChatMessage::system(self.system_prompt())];

        if let Some(knowledge) = &self.knowledge {
            let hits = knowledge.query(query, self.top_k).await?;
            response.retrieved = hits.len();
            if !hits.is_empty() {
                messages.push(ChatMessage::system(context_message(&hits)));
            }
        }
        messages.push(ChatMessage::user(query));

        let specs = self.tools.specs();
        let mut round = 1;
        loop {
            let last = round >= self.max_tool_rounds;
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: if last { Vec::new() } else { specs.clone() },
            };
            let reply = self.client.chat(&request).await.map_err(Error::upstream)?;

            if reply.tool_calls.is_empty() || last {
                response.text = reply.content;
                return Ok(response);
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in &calls {
                let result = self.call_tool(call).await?;
                response.tool_calls.push(call.function.name.clone());
                messages.push(ChatMessage::tool_result(
                    &call.function.name,
                    tool_content(result),
                ));
            }
            round += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::tools::ToolKind;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Replays canned replies and records every request.
    struct Scripted {
        replies: Mutex<Vec<ChatMessage>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<ChatMessage>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatMessage> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow!("connection refused"))
        }
    }

    fn calling(name: &str, args: Value) -> ChatMessage {
        ChatMessage {
            tool_calls: vec![ToolCall::new(name, args)],
            ..ChatMessage::assistant("")
        }
    }

    #[test]
    fn system_prompt_numbers_instructions() {
        let r = Responder::new("A", "m", Scripted::new(vec![]))
            .with_description("You review C code.")
            .with_instructions(vec!["Find bugs".into(), "Be brief".into()]);
        let p = r.system_prompt();
        assert!(p.starts_with("You review C code.\n\nInstructions:\n1. Find bugs\n2. Be brief"));
        assert!(p.ends_with("Format your answers as Markdown."));

        let plain = Responder::new("A", "m", Scripted::new(vec![])).with_markdown(false);
        assert_eq!(plain.system_prompt(), "");
    }

    #[tokio::test]
    async fn plain_answer_in_one_round() {
        let model = Scripted::new(vec![ChatMessage::assistant("looks fine")]);
        let r = Responder::new("A", "phi3:mini", model.clone());
        let out = r.respond("check this").await.unwrap();
        assert_eq!(out.text, "looks fine");
        assert!(out.tool_calls.is_empty());

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "phi3:mini");
        assert_eq!(seen[0].messages.last().unwrap().content, "check this");
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let model = Scripted::new(vec![
            calling("get_test_template", json!({ "test_type": "admin" })),
            ChatMessage::assistant("here is your test"),
        ]);
        let r = Responder::new("Gen", "m", model.clone())
            .with_tool(ToolKind::GetTestTemplate.build(None));
        let out = r.respond("write an admin test").await.unwrap();
        assert_eq!(out.text, "here is your test");
        assert_eq!(out.tool_calls, vec!["get_test_template"]);

        let seen = model.seen.lock().unwrap();
        let tool_msg = seen[1].messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert!(tool_msg.content.contains("test_admin_command"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_args_do_not_fail() {
        let model = Scripted::new(vec![
            calling("format_disk", json!({})),
            calling("validate_test_syntax", json!({ "wrong": 1 })),
            ChatMessage::assistant("done"),
        ]);
        let r = Responder::new("Gen", "m", model.clone())
            .with_tool(ToolKind::ValidateTestSyntax.build(None));
        let out = r.respond("go").await.unwrap();
        assert_eq!(out.text, "done");

        let seen = model.seen.lock().unwrap();
        assert!(seen[1].messages.last().unwrap().content.contains("unknown tool"));
        assert!(seen[2].messages.last().unwrap().content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn last_round_is_sent_without_tools() {
        let model = Scripted::new(vec![
            calling("get_test_template", json!({})),
            calling("get_test_template", json!({})),
            calling("get_test_template", json!({})),
        ]);
        let r = Responder::new("Gen", "m", model.clone())
            .with_tool(ToolKind::GetTestTemplate.build(None))
            .with_max_tool_rounds(3);
        r.respond("loop forever").await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(!seen[1].tools.is_empty());
        assert!(seen[2].tools.is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_upstream() {
        let r = Responder::new("A", "m", Scripted::new(vec![]));
        let err = r.respond("hello").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn empty_query_never_reaches_model() {
        let model = Scripted::new(vec![ChatMessage::assistant("x")]);
        let r = Responder::new("A", "m", model.clone());
        let err = r.respond("   ").await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(model.seen.lock().unwrap().is_empty());
    }
}
