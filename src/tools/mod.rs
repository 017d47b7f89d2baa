//! Tools a responder can offer to the model.
//!
//! Tool calling is a typed command set: agents name their tools in config
//! as [`ToolKind`] values, each kind builds a [`Tool`], and the responder
//! looks calls up by name in its [`ToolRegistry`].
//!
//! ```text
//! config: tools = ["validate_test_syntax", "save_test_case"]
//!            │
//!            ▼
//!      ToolKind::build(output_dir) ──▶ Box<dyn Tool> ──▶ ToolRegistry
//!                                                           │
//!        model tool_call { name, arguments } ──find(name)───┘
//!                                                 │
//!                                        execute(arguments) → JSON
//! ```
//!
//! | Tool | Module | Side effects |
//! |------|--------|--------------|
//! | PyNVMe checks and templates | [`nvme`] | none |
//! | RENODE checks, templates, compatibility | [`renode`] | none |
//! | `save_test_case`, `save_renode_code` | [`save`] | new file under the page output dir |
//! | `search_knowledge_base` | [`SearchKnowledgeTool`] | embedding + index query |
//! | `transfer_task_to_<member>` | [`crate::orchestrator`] | delegate model call |

pub mod nvme;
pub mod renode;
pub mod save;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::knowledge::CombinedKnowledge;
use crate::llm::ToolSpec;
use save::SaveRequest;

// ═══════════════════════════════════════════════════════════════════════
// Shared result shapes
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of a syntax check. Any error makes the code invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_type: Option<String>,
}

impl Default for Validation {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Validation {
    pub fn new(code_type: Option<String>) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            code_type,
        }
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.is_valid = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Practices {
    pub good_practices: Vec<String>,
    pub improvements_needed: Vec<String>,
}

impl Practices {
    pub fn good(&mut self, msg: &str) {
        self.good_practices.push(msg.to_string());
    }

    /// Record `good` when `cond` holds, otherwise `improve`.
    pub fn check(&mut self, cond: bool, good: &str, improve: &str) {
        if cond {
            self.good(good);
        } else {
            self.improvements_needed.push(improve.to_string());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool trait
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments did not match the tool's schema. Reported to the model.
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The tool ran and failed. Reported to the model.
    #[error("{0}")]
    Failed(String),

    /// A backend the tool depends on failed. Aborts the request.
    #[error(transparent)]
    Upstream(#[from] crate::error::Error),
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by. Lowercase with underscores.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the argument object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<Value, ToolError>;
}

fn parse_args<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Tools available to one responder, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Schemas advertised to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

/// Every built-in tool an agent can name in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ValidateTestSyntax,
    CheckPynvmeBestPractices,
    SuggestTestImprovements,
    GetTestTemplate,
    SaveTestCase,
    ValidateRenodeSyntax,
    CheckRenodeBestPractices,
    SuggestCodeImprovements,
    GetRenodeTemplate,
    AnalyzePlatformCompatibility,
    SaveRenodeCode,
}

impl ToolKind {
    pub const ALL: [ToolKind; 11] = [
        ToolKind::ValidateTestSyntax,
        ToolKind::CheckPynvmeBestPractices,
        ToolKind::SuggestTestImprovements,
        ToolKind::GetTestTemplate,
        ToolKind::SaveTestCase,
        ToolKind::ValidateRenodeSyntax,
        ToolKind::CheckRenodeBestPractices,
        ToolKind::SuggestCodeImprovements,
        ToolKind::GetRenodeTemplate,
        ToolKind::AnalyzePlatformCompatibility,
        ToolKind::SaveRenodeCode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ValidateTestSyntax => "validate_test_syntax",
            ToolKind::CheckPynvmeBestPractices => "check_pynvme_best_practices",
            ToolKind::SuggestTestImprovements => "suggest_test_improvements",
            ToolKind::GetTestTemplate => "get_test_template",
            ToolKind::SaveTestCase => "save_test_case",
            ToolKind::ValidateRenodeSyntax => "validate_renode_syntax",
            ToolKind::CheckRenodeBestPractices => "check_renode_best_practices",
            ToolKind::SuggestCodeImprovements => "suggest_code_improvements",
            ToolKind::GetRenodeTemplate => "get_renode_template",
            ToolKind::AnalyzePlatformCompatibility => "analyze_platform_compatibility",
            ToolKind::SaveRenodeCode => "save_renode_code",
        }
    }

    pub fn parse(name: &str) -> Option<ToolKind> {
        ToolKind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Whether the tool creates files and so needs an output directory.
    pub fn writes_files(self) -> bool {
        matches!(self, ToolKind::SaveTestCase | ToolKind::SaveRenodeCode)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::ValidateTestSyntax => {
                "Validate PyNVMe test code syntax and structure. Returns is_valid, errors and warnings."
            }
            ToolKind::CheckPynvmeBestPractices => {
                "Check PyNVMe test code against best practices (cleanup, error handling, timeouts, docs)."
            }
            ToolKind::SuggestTestImprovements => {
                "Suggest improvements for a PyNVMe test, optionally using earlier validation results."
            }
            ToolKind::GetTestTemplate => {
                "Get a PyNVMe test template. test_type is one of read, write, admin."
            }
            ToolKind::SaveTestCase => {
                "Save a generated PyNVMe test case under the generated tests directory."
            }
            ToolKind::ValidateRenodeSyntax => {
                "Validate RENODE code. code_type is one of resc, repl, cs, platform."
            }
            ToolKind::CheckRenodeBestPractices => {
                "Check RENODE code against best practices for its code_type."
            }
            ToolKind::SuggestCodeImprovements => {
                "Suggest improvements for RENODE code, optionally using earlier validation results."
            }
            ToolKind::GetRenodeTemplate => {
                "Get a RENODE template: resc_basic, resc_with_uart, repl_platform, repl_uart, cs_peripheral, robot_test."
            }
            ToolKind::AnalyzePlatformCompatibility => {
                "Analyze a platform description for a target architecture (ARM or RISC-V)."
            }
            ToolKind::SaveRenodeCode => {
                "Save generated RENODE code under the generated code directory."
            }
        }
    }

    pub fn parameters_schema(self) -> Value {
        let validation = json!({
            "type": "object",
            "description": "Result of an earlier validation call"
        });
        match self {
            ToolKind::ValidateTestSyntax | ToolKind::CheckPynvmeBestPractices => object(
                json!({ "test_code": string("PyNVMe test code") }),
                &["test_code"],
            ),
            ToolKind::SuggestTestImprovements => object(
                json!({
                    "test_code": string("PyNVMe test code"),
                    "validation_results": validation,
                }),
                &["test_code"],
            ),
            ToolKind::GetTestTemplate => object(
                json!({ "test_type": { "type": "string", "enum": nvme::TEST_TYPES } }),
                &[],
            ),
            ToolKind::SaveTestCase => object(
                json!({
                    "test_name": string("Name of the test"),
                    "test_code": string("The test code"),
                    "category": string("Test category, e.g. performance, functional, stress"),
                }),
                &["test_name", "test_code"],
            ),
            ToolKind::ValidateRenodeSyntax | ToolKind::CheckRenodeBestPractices => object(
                json!({
                    "code": string("RENODE code"),
                    "code_type": string("resc, repl, cs or platform"),
                }),
                &["code", "code_type"],
            ),
            ToolKind::SuggestCodeImprovements => object(
                json!({
                    "code": string("RENODE code"),
                    "code_type": string("resc, repl, cs or platform"),
                    "validation_results": validation,
                }),
                &["code", "code_type"],
            ),
            ToolKind::GetRenodeTemplate => object(
                json!({ "template_type": { "type": "string", "enum": renode::TEMPLATE_TYPES } }),
                &[],
            ),
            ToolKind::AnalyzePlatformCompatibility => object(
                json!({
                    "code": string("Platform description"),
                    "target_arch": { "type": "string", "enum": ["ARM", "RISC-V"] },
                }),
                &["code"],
            ),
            ToolKind::SaveRenodeCode => object(
                json!({
                    "filename": string("File name without extension"),
                    "code": string("The code content"),
                    "code_type": string("resc, repl, cs or platform"),
                    "category": string("Code category"),
                }),
                &["filename", "code", "code_type"],
            ),
        }
    }

    /// Instantiate the tool. Save tools write under `output_dir`.
    pub fn build(self, output_dir: Option<&Path>) -> Box<dyn Tool> {
        Box::new(BuiltinTool {
            kind: self,
            output: output_dir.map(Path::to_path_buf),
        })
    }
}

fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn general() -> String {
    "general".to_string()
}

#[derive(Deserialize)]
struct TestCode {
    test_code: String,
}

#[derive(Deserialize)]
struct SuggestTest {
    test_code: String,
    #[serde(default)]
    validation_results: Option<Validation>,
}

#[derive(Deserialize)]
struct TestType {
    #[serde(default)]
    test_type: String,
}

#[derive(Deserialize)]
struct SaveTest {
    test_name: String,
    test_code: String,
    #[serde(default = "general")]
    category: String,
}

#[derive(Deserialize)]
struct RenodeCode {
    code: String,
    code_type: String,
}

#[derive(Deserialize)]
struct SuggestCode {
    code: String,
    code_type: String,
    #[serde(default)]
    validation_results: Option<Validation>,
}

#[derive(Deserialize)]
struct TemplateType {
    #[serde(default)]
    template_type: String,
}

#[derive(Deserialize)]
struct Compat {
    code: String,
    #[serde(default = "arm")]
    target_arch: String,
}

fn arm() -> String {
    "ARM".to_string()
}

#[derive(Deserialize)]
struct SaveCode {
    filename: String,
    code: String,
    code_type: String,
    #[serde(default = "general")]
    category: String,
}

/// A [`ToolKind`] bound to its page's output directory.
pub struct BuiltinTool {
    kind: ToolKind,
    output: Option<PathBuf>,
}

impl BuiltinTool {
    fn output_dir(&self) -> Result<&Path, ToolError> {
        self.output.as_deref().ok_or_else(|| {
            ToolError::Failed(format!("{} has no output directory", self.kind.name()))
        })
    }

    fn run(&self, params: Value) -> Result<Value, ToolError> {
        let name = self.kind.name();
        let value = match self.kind {
            ToolKind::ValidateTestSyntax => {
                let a: TestCode = parse_args(name, params)?;
                to_value(nvme::validate_test_syntax(&a.test_code))
            }
            ToolKind::CheckPynvmeBestPractices => {
                let a: TestCode = parse_args(name, params)?;
                to_value(nvme::check_best_practices(&a.test_code))
            }
            ToolKind::SuggestTestImprovements => {
                let a: SuggestTest = parse_args(name, params)?;
                let validation = a
                    .validation_results
                    .unwrap_or_else(|| nvme::validate_test_syntax(&a.test_code));
                Value::String(nvme::suggest_improvements(&a.test_code, &validation))
            }
            ToolKind::GetTestTemplate => {
                let a: TestType = parse_args(name, params)?;
                Value::String(nvme::test_template(&a.test_type).to_string())
            }
            ToolKind::SaveTestCase => {
                let a: SaveTest = parse_args(name, params)?;
                let saved = SaveRequest::new(self.output_dir()?, &a.test_name, ".py", &a.test_code)
                    .subdir(&a.category)
                    .validate()
                    .and_then(|v| v.write())
                    .map_err(|e| ToolError::Failed(format!("Error saving test: {}", e)))?;
                saved.report("Test")
            }
            ToolKind::ValidateRenodeSyntax => {
                let a: RenodeCode = parse_args(name, params)?;
                to_value(renode::validate_syntax(&a.code, &a.code_type))
            }
            ToolKind::CheckRenodeBestPractices => {
                let a: RenodeCode = parse_args(name, params)?;
                to_value(renode::check_best_practices(&a.code, &a.code_type))
            }
            ToolKind::SuggestCodeImprovements => {
                let a: SuggestCode = parse_args(name, params)?;
                let validation = a
                    .validation_results
                    .unwrap_or_else(|| renode::validate_syntax(&a.code, &a.code_type));
                Value::String(renode::suggest_improvements(&a.code_type, &validation))
            }
            ToolKind::GetRenodeTemplate => {
                let a: TemplateType = parse_args(name, params)?;
                Value::String(renode::template(&a.template_type).to_string())
            }
            ToolKind::AnalyzePlatformCompatibility => {
                let a: Compat = parse_args(name, params)?;
                to_value(renode::analyze_platform_compatibility(&a.code, &a.target_arch))
            }
            ToolKind::SaveRenodeCode => {
                let a: SaveCode = parse_args(name, params)?;
                let ext = renode::CodeType::parse(&a.code_type).extension();
                let saved = SaveRequest::new(self.output_dir()?, &a.filename, ext, &a.code)
                    .subdir(&a.category)
                    .subdir(&a.code_type)
                    .validate()
                    .and_then(|v| v.write())
                    .map_err(|e| ToolError::Failed(format!("Error saving code: {}", e)))?;
                saved.report("Code")
            }
        };
        Ok(value)
    }
}

fn to_value<T: Serialize>(v: T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

#[async_trait]
impl Tool for BuiltinTool {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    fn parameters_schema(&self) -> Value {
        self.kind.parameters_schema()
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        if !self.kind.writes_files() {
            return self.run(params);
        }
        let tool = BuiltinTool {
            kind: self.kind,
            output: self.output.clone(),
        };
        tokio::task::spawn_blocking(move || tool.run(params))
            .await
            .map_err(|e| ToolError::Failed(format!("{} did not finish: {}", self.kind.name(), e)))?
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Knowledge search
// ═══════════════════════════════════════════════════════════════════════

/// `search_knowledge_base`, offered to responders in `tool` retrieval mode.
pub struct SearchKnowledgeTool {
    knowledge: Arc<CombinedKnowledge>,
    top_k: usize,
}

impl SearchKnowledgeTool {
    pub const NAME: &'static str = "search_knowledge_base";

    pub fn new(knowledge: Arc<CombinedKnowledge>, top_k: usize) -> Self {
        Self { knowledge, top_k }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the uploaded code and documentation. Returns the most relevant chunks."
    }

    fn parameters_schema(&self) -> Value {
        object(
            json!({
                "query": string("Search query"),
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum results" },
            }),
            &["query"],
        )
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(Self::NAME, params)?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: Self::NAME.to_string(),
                reason: "query must not be empty".to_string(),
            });
        }
        let k = args.limit.unwrap_or(self.top_k).max(1);
        let hits = self.knowledge.query(&args.query, k).await?;
        Ok(json!({ "results": hits }))
    }
}
