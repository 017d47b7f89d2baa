//! TOML configuration.
//!
//! One file describes the model endpoint, the embedding service, chunking
//! and retrieval knobs, the HTTP bind address, and every front-end page.
//! A page is one front-end: an upload surface per artifact category, one
//! knowledge base, a roster of agents and the tabs that route queries to
//! them.
//!
//! ```toml
//! [model]
//! host = "http://localhost:11434"
//! model = "phi3:mini"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [pages.code-analysis]
//! title = "Code Analysis"
//! vector_path = "./chroma_db"
//! collection = "code_review_docs"
//!
//! [pages.code-analysis.categories.code]
//! dir = "./uploaded_code"
//! include_globs = ["*.c", "*.h"]
//!
//! [pages.code-analysis.agents.analyzer]
//! name = "Code Analyzer"
//! instructions = ["Analyze the code for bugs"]
//!
//! [[pages.code-analysis.tabs]]
//! kind = "Code Analysis"
//! agent = "analyzer"
//! requires = ["code"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::artifacts::Category;
use crate::tools::ToolKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pages: BTreeMap<String, PageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout. Absent means a hung model blocks the session.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            timeout_secs: None,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "phi3:mini".to_string()
}
fn default_max_tool_rounds() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of the embedding service. Defaults to `model.host`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

// ═══════════════════════════════════════════════════════════════════════
// Pages
// ═══════════════════════════════════════════════════════════════════════

/// One front-end: upload surface, knowledge base, agents and tabs.
#[derive(Debug, Deserialize, Clone)]
pub struct PageConfig {
    pub title: String,
    /// Directory holding the vector index for this page.
    pub vector_path: PathBuf,
    /// Collection name inside the index. Unique across pages.
    pub collection: String,
    /// Where `save_*` tools write generated files.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
}

impl PageConfig {
    pub fn tab(&self, kind: &str) -> Option<&TabConfig> {
        self.tabs.iter().find(|t| t.kind == kind)
    }

    /// Every directory a clear of this page deletes, keyed by config path.
    fn owned_paths(&self, id: &str) -> Vec<(String, &Path)> {
        let mut paths = vec![(format!("pages.{}.vector_path", id), self.vector_path.as_path())];
        for (category, cfg) in self.categories.iter() {
            paths.push((
                format!("pages.{}.categories.{}.dir", id, category),
                cfg.dir.as_path(),
            ));
        }
        if let Some(out) = &self.output_dir {
            paths.push((format!("pages.{}.output_dir", id), out.as_path()));
        }
        paths
    }
}

/// Drop `.` components so `./uploads` and `uploads` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CategoriesConfig {
    #[serde(default)]
    pub code: Option<CategoryConfig>,
    #[serde(default)]
    pub doc: Option<CategoryConfig>,
}

impl CategoriesConfig {
    pub fn get(&self, category: Category) -> Option<&CategoryConfig> {
        match category {
            Category::Code => self.code.as_ref(),
            Category::Doc => self.doc.as_ref(),
        }
    }

    /// Configured categories in fixed order (code, then doc).
    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryConfig)> {
        [
            (Category::Code, self.code.as_ref()),
            (Category::Doc, self.doc.as_ref()),
        ]
        .into_iter()
        .filter_map(|(c, cfg)| cfg.map(|cfg| (c, cfg)))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryConfig {
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*".to_string()]
}

/// How an agent uses the page's knowledge base.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Retrieve top-k chunks up front and add them to the prompt.
    #[default]
    Context,
    /// Expose a `search_knowledge_base` tool and let the model decide.
    Tool,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Overrides `model.model` for this agent.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub retrieval: RetrievalMode,
    #[serde(default)]
    pub tools: Vec<ToolKind>,
    /// Agent ids this agent may hand work to. Non-empty makes it an orchestrator.
    #[serde(default)]
    pub delegates: Vec<String>,
    #[serde(default = "default_true")]
    pub markdown: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TabConfig {
    /// Label recorded as the interaction kind, e.g. `"Code Analysis"`.
    pub kind: String,
    pub agent: String,
    /// Categories that must hold at least one artifact before a query runs.
    #[serde(default)]
    pub requires: Vec<Category>,
    /// Prompt template. `{query}` and any option name are substituted.
    #[serde(default)]
    pub template: Option<String>,
    /// Default option values for the template.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Whether interactions on this tab are appended to session history.
    #[serde(default = "default_true")]
    pub record: bool,
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════
// Loading and validation
// ═══════════════════════════════════════════════════════════════════════

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn page(&self, id: &str) -> Option<&PageConfig> {
        self.pages.get(id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.model.max_tool_rounds == 0 {
            bail!("model.max_tool_rounds must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if matches!(self.embedding.dims, None | Some(0)) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }

        let mut collections = HashSet::new();
        let mut owned: Vec<(PathBuf, String)> = Vec::new();
        for (id, page) in &self.pages {
            if !collections.insert(page.collection.clone()) {
                bail!(
                    "pages.{}.collection '{}' is already used by another page",
                    id,
                    page.collection
                );
            }
            for (key, path) in page.owned_paths(id) {
                let path = normalize(path);
                if let Some((_, other)) = owned
                    .iter()
                    .find(|(p, _)| p.starts_with(&path) || path.starts_with(p))
                {
                    bail!(
                        "{} '{}' overlaps {}: clearing one would delete the other",
                        key,
                        path.display(),
                        other
                    );
                }
                owned.push((path, key));
            }
            validate_page(id, page)?;
        }
        Ok(())
    }
}

fn validate_page(id: &str, page: &PageConfig) -> Result<()> {
    if page.collection.trim().is_empty() {
        bail!("pages.{}.collection must not be empty", id);
    }
    if page.categories.iter().next().is_none() {
        bail!("pages.{} must configure at least one category", id);
    }
    for (category, cfg) in page.categories.iter() {
        for pattern in &cfg.include_globs {
            globset::Glob::new(pattern).with_context(|| {
                format!("pages.{}.categories.{}: bad glob '{}'", id, category, pattern)
            })?;
        }
    }

    for (agent_id, agent) in &page.agents {
        for d in &agent.delegates {
            if !page.agents.contains_key(d) {
                bail!(
                    "pages.{}.agents.{} delegates to unknown agent '{}'",
                    id,
                    agent_id,
                    d
                );
            }
        }
        let saves = agent.tools.iter().any(|t| t.writes_files());
        if saves && page.output_dir.is_none() {
            bail!(
                "pages.{}.agents.{} has a save tool but the page has no output_dir",
                id,
                agent_id
            );
        }
    }
    check_delegation_acyclic(id, &page.agents)?;

    let mut kinds = HashSet::new();
    for tab in &page.tabs {
        if !kinds.insert(tab.kind.as_str()) {
            bail!("pages.{}: duplicate tab '{}'", id, tab.kind);
        }
        if !page.agents.contains_key(&tab.agent) {
            bail!(
                "pages.{}: tab '{}' references unknown agent '{}'",
                id,
                tab.kind,
                tab.agent
            );
        }
        for c in &tab.requires {
            if page.categories.get(*c).is_none() {
                bail!(
                    "pages.{}: tab '{}' requires category '{}' which is not configured",
                    id,
                    tab.kind,
                    c
                );
            }
        }
    }
    Ok(())
}

fn check_delegation_acyclic(page: &str, agents: &BTreeMap<String, AgentConfig>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        page: &str,
        id: &'a str,
        agents: &'a BTreeMap<String, AgentConfig>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                bail!("pages.{}: delegation cycle through agent '{}'", page, id)
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(agent) = agents.get(id) {
            for d in &agent.delegates {
                visit(page, d, agents, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for id in agents.keys() {
        visit(page, id, agents, &mut marks)?;
    }
    Ok(())
}
