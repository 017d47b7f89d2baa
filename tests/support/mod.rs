//! Fakes shared by the integration tests: a deterministic embedder, a
//! scripted model endpoint, and a two-page configuration rooted in a
//! temporary directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use review_harness::config::{parse_config, Config};
use review_harness::controller::App;
use review_harness::embedding::Embedder;
use review_harness::llm::{ChatMessage, ChatRequest, ModelClient, Role, ToolCall};
use review_harness_core::index::memory::InMemoryIndex;
use review_harness_core::index::VectorIndex;
use serde_json::Value;
use tempfile::TempDir;

// ─── Embedder ───────────────────────────────────────────────────────

/// Byte-frequency vectors. Similar text gets similar vectors, and every
/// call is counted.
pub struct BagOfBytes {
    pub calls: AtomicUsize,
}

impl BagOfBytes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for BagOfBytes {
    fn model_name(&self) -> &str {
        "bag-of-bytes"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 16];
                for b in t.bytes() {
                    v[(b % 16) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

// ─── Model ──────────────────────────────────────────────────────────

/// Replays queued replies, then answers by echoing the last user message.
/// With `fail` set, every call errors like an unreachable endpoint.
pub struct ScriptedModel {
    replies: Mutex<Vec<ChatMessage>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    fail: bool,
}

impl ScriptedModel {
    pub fn echo() -> Arc<Self> {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(mut replies: Vec<ChatMessage>) -> Arc<Self> {
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(anyhow!("error sending request: connection refused"));
        }
        if let Some(reply) = self.replies.lock().unwrap().pop() {
            return Ok(reply);
        }
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatMessage::assistant(format!("Reviewed: {}", user)))
    }
}

pub fn tool_call(name: &str, args: Value) -> ChatMessage {
    ChatMessage {
        tool_calls: vec![ToolCall::new(name, args)],
        ..ChatMessage::assistant("")
    }
}

// ─── Config ─────────────────────────────────────────────────────────

/// A code-analysis page and a test-generation page under `root`.
pub fn config_toml(root: &Path) -> String {
    let root = root.display();
    format!(
        r#"
[embedding]
provider = "ollama"
model = "bag-of-bytes"
dims = 16

[retrieval]
top_k = 3

[pages.code-analysis]
title = "Embedded C Code Analysis"
vector_path = "{root}/chroma_db"
collection = "code_review_docs"

[pages.code-analysis.categories.code]
dir = "{root}/uploaded_code"
include_globs = ["*.c", "*.h"]

[pages.code-analysis.categories.doc]
dir = "{root}/uploaded_docs"
include_globs = ["*.h", "*.md"]

[pages.code-analysis.agents.analyzer]
name = "Code Analyzer"
description = "Expert in C language syntax, embedded systems patterns, and code structure analysis"
instructions = ["Identify potential bugs, memory leaks, buffer overflows, and unsafe operations"]

[[pages.code-analysis.tabs]]
kind = "Code Analysis"
agent = "analyzer"
requires = ["code"]

[pages.pynvme]
title = "PyNVMe Test Generation"
vector_path = "{root}/pynvme_chroma_db"
collection = "pynvme_docs"
output_dir = "{root}/generated_tests"

[pages.pynvme.categories.doc]
dir = "{root}/pynvme_docs"
include_globs = ["*.md", "*.txt"]

[pages.pynvme.agents.generator]
name = "Test Case Generator"
retrieval = "tool"
tools = ["get_test_template", "save_test_case"]

[pages.pynvme.agents.expert]
name = "PyNVMe Expert"
retrieval = "tool"

[[pages.pynvme.tabs]]
kind = "Generation"
agent = "generator"
template = "{{query}}\nCategory: {{category}}"
options = {{ category = "performance" }}

[[pages.pynvme.tabs]]
kind = "Expert"
agent = "expert"
record = false
"#
    )
}

pub fn test_config(root: &Path) -> Config {
    parse_config(&config_toml(root)).expect("test config should be valid")
}

/// An [`App`] over fakes. Every page shares one in-memory index.
pub struct Harness {
    pub tmp: TempDir,
    pub app: Arc<App>,
    pub model: Arc<ScriptedModel>,
    pub embedder: Arc<BagOfBytes>,
    pub index: Arc<InMemoryIndex>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_model(ScriptedModel::echo())
    }

    pub fn with_model(model: Arc<ScriptedModel>) -> Self {
        let tmp = TempDir::new().unwrap();
        let embedder = BagOfBytes::new();
        let index = Arc::new(InMemoryIndex::new());
        let shared = index.clone();
        let app = App::with_services(
            test_config(tmp.path()),
            model.clone(),
            embedder.clone(),
            move |_| shared.clone() as Arc<dyn VectorIndex>,
        )
        .unwrap();
        Self {
            tmp,
            app: Arc::new(app),
            model,
            embedder,
            index,
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }
}
