//! Page controllers: the request flow behind every front-end.
//!
//! A page is one configured front-end (code analysis, code review, PyNVMe,
//! RENODE). Its controller owns the page's artifact store, knowledge
//! sources and agents; the session owns the history.
//!
//! ```text
//! upload ──▶ ArtifactStore::store ──any written?──▶ KnowledgeSource::ingest
//!
//! submit ──▶ tab lookup ──▶ non-empty query ──▶ required artifacts present
//!                                                        │
//!                          InteractionRecord ◀── respond ┘
//!
//! clear  ──▶ reset(collection, category dirs, vector path, output dir)
//! ```
//!
//! Every precondition is checked before any model or index call.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use review_harness_core::index::VectorIndex;

use crate::artifacts::{remove_tree, ArtifactStore, Category, StoreOutcome};
use crate::config::{Config, PageConfig, RetrievalMode};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::knowledge::{reset, CombinedKnowledge, IngestOutcome, KnowledgeSource, ResetReport};
use crate::llm::{ModelClient, OllamaChatClient};
use crate::orchestrator::Orchestrator;
use crate::responder::{Respond, Responder};
use crate::session::{InteractionRecord, SessionContext, SessionManager};
use crate::sqlite_index::SqliteVectorIndex;

/// One uploaded file, as received from a front-end.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub filename: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub stored: Vec<StoreOutcome>,
    pub failures: Vec<UploadFailure>,
    /// Empty when nothing new was written.
    pub ingestion: Vec<IngestOutcome>,
}

/// Result of a submitted query.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub record: InteractionRecord,
    pub tool_calls: Vec<String>,
    pub retrieved: usize,
    /// Whether the record was appended to session history.
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageStatus {
    pub page: String,
    pub title: String,
    pub model: String,
    pub host: String,
    pub collection: String,
    pub artifacts: BTreeMap<Category, usize>,
    pub generated_files: usize,
    pub indexed_chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    /// Path relative to the output directory.
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TabSummary {
    pub kind: String,
    pub agent: String,
    pub requires: Vec<Category>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub categories: BTreeMap<Category, Vec<String>>,
    pub tabs: Vec<TabSummary>,
}

pub struct PageController {
    id: String,
    page: PageConfig,
    model: String,
    host: String,
    artifacts: Arc<ArtifactStore>,
    index: Arc<dyn VectorIndex>,
    sources: Vec<Arc<KnowledgeSource>>,
    agents: HashMap<String, Arc<dyn Respond>>,
}

impl PageController {
    /// Wire a page from config. All agents of the page share `client`,
    /// `embedder` and `index`.
    pub fn build(
        id: &str,
        config: &Config,
        client: Arc<dyn ModelClient>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> anyhow::Result<Self> {
        let page = config
            .page(id)
            .ok_or_else(|| anyhow!("unknown page '{}'", id))?
            .clone();
        let artifacts = Arc::new(
            ArtifactStore::new(&page.categories)
                .with_context(|| format!("pages.{}.categories", id))?,
        );

        let sources: Vec<Arc<KnowledgeSource>> = artifacts
            .categories()
            .into_iter()
            .map(|category| {
                Arc::new(
                    KnowledgeSource::new(
                        category,
                        artifacts.clone(),
                        page.collection.clone(),
                        index.clone(),
                        embedder.clone(),
                    )
                    .with_chunking(config.chunking.max_tokens, config.embedding.batch_size),
                )
            })
            .collect();
        let knowledge = Arc::new(CombinedKnowledge::new(sources.clone()));

        let mut agents = HashMap::new();
        for agent_id in page.agents.keys() {
            build_agent(agent_id, &page, config, &client, &knowledge, &mut agents)?;
        }

        Ok(Self {
            id: id.to_string(),
            model: config.model.model.clone(),
            host: config.model.host.clone(),
            page,
            artifacts,
            index,
            sources,
            agents,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &PageConfig {
        &self.page
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            id: self.id.clone(),
            title: self.page.title.clone(),
            categories: self
                .page
                .categories
                .iter()
                .map(|(c, cfg)| (c, cfg.include_globs.clone()))
                .collect(),
            tabs: self
                .page
                .tabs
                .iter()
                .map(|t| TabSummary {
                    kind: t.kind.clone(),
                    agent: self
                        .page
                        .agents
                        .get(&t.agent)
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| t.agent.clone()),
                    requires: t.requires.clone(),
                    options: t.options.clone(),
                })
                .collect(),
        }
    }

    /// Store a batch of uploads, then ingest if anything new was written.
    ///
    /// A file that fails to store is reported and the batch continues.
    pub async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        files: Vec<UploadFile>,
    ) -> Result<UploadReport> {
        if self.artifacts.dir(category).is_none() {
            return Err(Error::precondition(format!(
                "{} does not accept {} uploads",
                self.page.title, category
            )));
        }

        let mut report = UploadReport {
            stored: Vec::new(),
            failures: Vec::new(),
            ingestion: Vec::new(),
        };
        for UploadFile { filename, bytes } in files {
            let artifacts = self.artifacts.clone();
            let name = filename.clone();
            let stored = tokio::task::spawn_blocking(move || artifacts.store(category, &name, &bytes))
                .await
                .unwrap_or_else(|e| Err(Error::filesystem(&filename, std::io::Error::other(e))));
            match stored {
                Ok(outcome) => report.stored.push(outcome),
                Err(e) => {
                    warn!(page = %self.id, filename = %filename, error = %e, "upload failed");
                    report.failures.push(UploadFailure {
                        filename,
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let written = report.stored.iter().filter(|s| s.written).count();
        info!(
            page = %self.id,
            session = %session.id,
            %category,
            written,
            duplicates = report.stored.len() - written,
            "upload stored"
        );
        if written > 0 {
            for source in self.sources.iter().filter(|s| s.category() == category) {
                report.ingestion.push(source.ingest().await);
            }
        }
        Ok(report)
    }

    /// Run a query on a tab and record it in the session.
    pub async fn submit(
        &self,
        session: &mut SessionContext,
        tab: &str,
        query: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Submission> {
        let tab = self
            .page
            .tab(tab)
            .ok_or_else(|| Error::NotFound(format!("tab '{}' on page {}", tab, self.id)))?;

        if query.trim().is_empty() {
            return Err(Error::precondition("Please enter a query"));
        }
        for category in &tab.requires {
            if self.artifacts.count(*category)? == 0 {
                return Err(Error::precondition(format!(
                    "Please upload at least one {} file first",
                    category
                )));
            }
        }

        let agent = self
            .agents
            .get(&tab.agent)
            .ok_or_else(|| Error::NotFound(format!("agent '{}'", tab.agent)))?;

        let mut values = tab.options.clone();
        values.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        let prompt = match &tab.template {
            Some(template) => render(template, query, &values),
            None => query.to_string(),
        };

        info!(page = %self.id, tab = %tab.kind, agent = agent.name(), "query submitted");
        let response = agent.respond(&prompt).await?;

        let record = InteractionRecord {
            page: self.id.clone(),
            kind: tab.kind.clone(),
            query: query.to_string(),
            response: response.text,
            category: values.get("category").cloned(),
            timestamp: Utc::now(),
        };
        if tab.record {
            session.record(record.clone());
        }
        Ok(Submission {
            record,
            tool_calls: response.tool_calls,
            retrieved: response.retrieved,
            recorded: tab.record,
        })
    }

    /// Delete the collection, every category directory, the index directory
    /// and the output directory. Best effort; see [`reset`].
    pub async fn clear(&self, session: &mut SessionContext) -> ResetReport {
        let mut dirs: Vec<PathBuf> = self
            .page
            .categories
            .iter()
            .map(|(_, cfg)| cfg.dir.clone())
            .collect();
        dirs.push(self.page.vector_path.clone());
        if let Some(out) = &self.page.output_dir {
            dirs.push(out.clone());
        }

        let report = reset(self.index.as_ref(), &self.page.collection, &dirs).await;
        session.uploader_generation += 1;
        info!(
            page = %self.id,
            removed = report.removed.len(),
            failures = report.failures.len(),
            "knowledge base cleared"
        );
        report
    }

    pub async fn status(&self) -> Result<PageStatus> {
        let mut artifacts = BTreeMap::new();
        for category in self.artifacts.categories() {
            artifacts.insert(category, self.artifacts.count(category)?);
        }
        let indexed_chunks = self
            .index
            .count(&self.page.collection)
            .await
            .map_err(Error::upstream)?;
        let generated_files: usize = self.generated()?.values().map(Vec::len).sum();

        Ok(PageStatus {
            page: self.id.clone(),
            title: self.page.title.clone(),
            model: self.model.clone(),
            host: self.host.clone(),
            collection: self.page.collection.clone(),
            artifacts,
            generated_files,
            indexed_chunks,
        })
    }

    /// Files under the output directory, grouped by their first directory.
    pub fn generated(&self) -> Result<BTreeMap<String, Vec<GeneratedFile>>> {
        let mut groups: BTreeMap<String, Vec<GeneratedFile>> = BTreeMap::new();
        let Some(out) = &self.page.output_dir else {
            return Ok(groups);
        };
        if !out.exists() {
            return Ok(groups);
        }

        for entry in WalkDir::new(out).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(out).to_path_buf();
                Error::filesystem(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(out).unwrap_or(entry.path());
            let group = match rel.components().next() {
                Some(Component::Normal(first)) if rel.components().count() > 1 => {
                    first.to_string_lossy().into_owned()
                }
                _ => String::new(),
            };
            let meta = entry
                .metadata()
                .map_err(|e| Error::filesystem(entry.path(), e.into()))?;
            groups.entry(group).or_default().push(GeneratedFile {
                path: rel.to_string_lossy().replace('\\', "/"),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(groups)
    }

    /// Remove one generated file, given relative to the output directory.
    pub fn delete_generated(&self, rel: &str) -> Result<PathBuf> {
        let out = self
            .page
            .output_dir
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("output directory for {}", self.id)))?;

        let rel_path = Path::new(rel);
        let plain = !rel.trim().is_empty()
            && rel_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(Error::precondition(format!(
                "refusing to delete {:?}: not a path inside the output directory",
                rel
            )));
        }

        let path = out.join(rel_path);
        let canonical_out = out
            .canonicalize()
            .map_err(|_| Error::NotFound(format!("generated file {}", rel)))?;
        let canonical = path
            .canonicalize()
            .map_err(|_| Error::NotFound(format!("generated file {}", rel)))?;
        if !canonical.starts_with(&canonical_out) || !canonical.is_file() {
            return Err(Error::precondition(format!(
                "refusing to delete {:?}: not a generated file",
                rel
            )));
        }

        std::fs::remove_file(&canonical).map_err(|e| Error::filesystem(&canonical, e))?;
        info!(page = %self.id, path = rel, "generated file deleted");
        Ok(path)
    }

    /// Remove the whole output directory, leaving knowledge intact.
    pub fn clear_generated(&self) -> Result<()> {
        match &self.page.output_dir {
            Some(out) => remove_tree(out).map_err(|e| Error::filesystem(out, e)),
            None => Ok(()),
        }
    }
}

/// Substitute `{query}` and every `{option}` in a tab template.
fn render(template: &str, query: &str, options: &BTreeMap<String, String>) -> String {
    let mut out = template.replace("{query}", query);
    for (key, value) in options {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Build `agent_id` and, first, everything it delegates to.
fn build_agent(
    agent_id: &str,
    page: &PageConfig,
    config: &Config,
    client: &Arc<dyn ModelClient>,
    knowledge: &Arc<CombinedKnowledge>,
    built: &mut HashMap<String, Arc<dyn Respond>>,
) -> anyhow::Result<Arc<dyn Respond>> {
    if let Some(agent) = built.get(agent_id) {
        return Ok(agent.clone());
    }
    let cfg = page
        .agents
        .get(agent_id)
        .ok_or_else(|| anyhow!("unknown agent '{}'", agent_id))?;

    let mut responder = Responder::new(
        cfg.name.clone(),
        cfg.model.clone().unwrap_or_else(|| config.model.model.clone()),
        client.clone(),
    )
    .with_description(cfg.description.clone())
    .with_instructions(cfg.instructions.clone())
    .with_markdown(cfg.markdown)
    .with_max_tool_rounds(config.model.max_tool_rounds);
    if cfg.retrieval != RetrievalMode::None {
        responder = responder.with_knowledge(knowledge.clone(), cfg.retrieval, config.retrieval.top_k);
    }
    for kind in &cfg.tools {
        responder = responder.with_tool(kind.build(page.output_dir.as_deref()));
    }

    let agent: Arc<dyn Respond> = if cfg.delegates.is_empty() {
        Arc::new(responder)
    } else {
        let mut members = Vec::with_capacity(cfg.delegates.len());
        for d in &cfg.delegates {
            members.push(build_agent(d, page, config, client, knowledge, built)?);
        }
        Arc::new(Orchestrator::new(responder, members))
    };
    built.insert(agent_id.to_string(), agent.clone());
    Ok(agent)
}

// ═══════════════════════════════════════════════════════════════════════
// App
// ═══════════════════════════════════════════════════════════════════════

/// Every configured page plus the live sessions.
pub struct App {
    config: Config,
    pages: BTreeMap<String, Arc<PageController>>,
    pub sessions: SessionManager,
}

impl App {
    /// Ollama model client, configured embedder, one SQLite index per page.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client: Arc<dyn ModelClient> = Arc::new(OllamaChatClient::new(&config.model)?);
        let embedder = create_embedder(&config)?;
        Self::with_services(config, client, embedder, |page| {
            Arc::new(SqliteVectorIndex::new(&page.vector_path))
        })
    }

    /// Build with explicit services; `index_for` supplies each page's index.
    pub fn with_services(
        config: Config,
        client: Arc<dyn ModelClient>,
        embedder: Arc<dyn Embedder>,
        index_for: impl Fn(&PageConfig) -> Arc<dyn VectorIndex>,
    ) -> anyhow::Result<Self> {
        let mut pages = BTreeMap::new();
        for (id, page) in &config.pages {
            let controller =
                PageController::build(id, &config, client.clone(), embedder.clone(), index_for(page))?;
            pages.insert(id.clone(), Arc::new(controller));
        }
        Ok(Self {
            config,
            pages,
            sessions: SessionManager::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn page(&self, id: &str) -> Result<Arc<PageController>> {
        self.pages
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("page '{}'", id)))
    }

    pub fn pages(&self) -> impl Iterator<Item = &Arc<PageController>> {
        self.pages.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_query_and_options() {
        let mut opts = BTreeMap::new();
        opts.insert("category".to_string(), "stress".to_string());
        let out = render("Generate a {category} test: {query} ({missing})", "trim", &opts);
        assert_eq!(out, "Generate a stress test: trim ({missing})");
    }
}
