//! Knowledge sources: turning stored artifacts into retrievable chunks.
//!
//! ```text
//!  ArtifactStore ──list──▶ KnowledgeSource::ingest()
//!                             │ extract → hash → skip if indexed
//!                             │ chunk → embed (batched) → upsert
//!                             ▼
//!                        VectorIndex (one collection per page)
//!                             ▲
//!  Responder ──query──▶ CombinedKnowledge (fan-out, dedupe)
//! ```
//!
//! Ingestion is upsert-only: it never drops the collection and never
//! removes records. A file whose current content hash is already in the
//! index is skipped without calling the embedding service, so re-running
//! ingestion only embeds files written since the last successful run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use review_harness_core::chunk::{chunk_text, content_hash};
use review_harness_core::index::{CollectionNotFound, VectorIndex};
use review_harness_core::models::{IndexRecord, RetrievedChunk};

use crate::artifacts::{remove_tree, ArtifactStore, Category};
use crate::embedding::Embedder;
use crate::error::{Error, PartialDeleteError, Result};
use crate::extract::extract_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Error,
}

/// Summary of one [`KnowledgeSource::ingest`] run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub source: Category,
    pub status: IngestStatus,
    pub detail: String,
    pub files_seen: usize,
    pub files_embedded: usize,
    pub files_skipped: usize,
    pub chunks_upserted: usize,
}

/// One artifact category bound to a collection in a vector index.
pub struct KnowledgeSource {
    category: Category,
    artifacts: Arc<ArtifactStore>,
    collection: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    max_tokens: usize,
    batch_size: usize,
}

impl KnowledgeSource {
    pub fn new(
        category: Category,
        artifacts: Arc<ArtifactStore>,
        collection: impl Into<String>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            category,
            artifacts,
            collection: collection.into(),
            index,
            embedder,
            max_tokens: 500,
            batch_size: 32,
        }
    }

    pub fn with_chunking(mut self, max_tokens: usize, batch_size: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn corpus(&self) -> Option<PathBuf> {
        self.artifacts.dir(self.category).map(PathBuf::from)
    }

    /// Index key of an artifact: `<category>/<filename>`. Sources of one page
    /// share a collection, so the same filename in two categories must not
    /// collide on chunk ids.
    pub fn source_key(&self, filename: &str) -> String {
        format!("{}/{}", self.category, filename)
    }

    /// Embed every artifact not already indexed with its current content.
    ///
    /// Unreadable files are reported in `detail` and skipped; an embedding
    /// or index failure stops the run, since every later file would hit the
    /// same service.
    pub async fn ingest(&self) -> IngestOutcome {
        let mut outcome = IngestOutcome {
            source: self.category,
            status: IngestStatus::Success,
            detail: String::new(),
            files_seen: 0,
            files_embedded: 0,
            files_skipped: 0,
            chunks_upserted: 0,
        };

        let (files, dir) = match (self.artifacts.list(self.category), self.corpus()) {
            (Ok(files), Some(dir)) => (files, dir),
            (Err(e), _) => return fail(outcome, e.to_string()),
            (_, None) => return fail(outcome, format!("no {} directory configured", self.category)),
        };
        outcome.files_seen = files.len();

        let mut problems = Vec::new();
        for name in files {
            let path = dir.join(&name);
            let extracted = tokio::task::spawn_blocking(move || extract_file(&path)).await;
            let (bytes, text) = match extracted {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!(file = %name, error = %e, "skipping unreadable artifact");
                    problems.push(format!("{}: {}", name, e));
                    continue;
                }
                Err(e) => {
                    problems.push(format!("{}: {}", name, e));
                    continue;
                }
            };

            let hash = content_hash(&bytes);
            let key = self.source_key(&name);
            match self.index.has_source(&self.collection, &key, &hash).await {
                Ok(true) => {
                    outcome.files_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => return fail(outcome, format!("vector index: {:#}", e)),
            }

            let chunks = chunk_text(&self.collection, &key, &text, self.max_tokens);
            if chunks.is_empty() {
                outcome.files_skipped += 1;
                continue;
            }

            match self.embed_and_upsert(chunks, &hash).await {
                Ok(n) => {
                    outcome.files_embedded += 1;
                    outcome.chunks_upserted += n;
                }
                Err(e) => {
                    problems.push(format!("{}: {:#}", name, e));
                    outcome.status = IngestStatus::Error;
                    outcome.detail = problems.join("; ");
                    return outcome;
                }
            }
        }

        if !problems.is_empty() {
            outcome.status = IngestStatus::Error;
            outcome.detail = problems.join("; ");
        } else {
            outcome.detail = format!(
                "{} embedded, {} already indexed",
                outcome.files_embedded, outcome.files_skipped
            );
        }
        info!(
            source = %self.category,
            collection = %self.collection,
            embedded = outcome.files_embedded,
            skipped = outcome.files_skipped,
            chunks = outcome.chunks_upserted,
            "ingestion finished"
        );
        outcome
    }

    async fn embed_and_upsert(
        &self,
        chunks: Vec<review_harness_core::models::IngestionChunk>,
        hash: &str,
    ) -> anyhow::Result<usize> {
        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            records.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(c, v)| IndexRecord::new(c, v, hash)),
            );
        }
        // All chunks of a file land together so a partial file never
        // counts as indexed.
        self.index.upsert(&self.collection, &records).await?;
        Ok(records.len())
    }
}

fn fail(mut outcome: IngestOutcome, detail: String) -> IngestOutcome {
    warn!(source = %outcome.source, %detail, "ingestion failed");
    outcome.status = IngestStatus::Error;
    outcome.detail = detail;
    outcome
}

// ═══════════════════════════════════════════════════════════════════════
// Combined knowledge
// ═══════════════════════════════════════════════════════════════════════

/// Several sources presented as one retrieval surface.
///
/// Results are concatenated in source order with duplicate chunk ids
/// removed; there is no cross-source ranking.
#[derive(Clone, Default)]
pub struct CombinedKnowledge {
    sources: Vec<Arc<KnowledgeSource>>,
}

impl CombinedKnowledge {
    pub fn new(sources: Vec<Arc<KnowledgeSource>>) -> Self {
        Self { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[Arc<KnowledgeSource>] {
        &self.sources
    }

    /// Retrieve up to `k` chunks from each distinct collection.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        // One embed per embedder, one query per (index, collection).
        let mut vectors: Vec<(&Arc<dyn Embedder>, Vec<f32>)> = Vec::new();
        let mut queried: Vec<(&Arc<dyn VectorIndex>, &str)> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for source in &self.sources {
            if queried
                .iter()
                .any(|(i, c)| Arc::ptr_eq(*i, &source.index) && *c == source.collection)
            {
                continue;
            }
            queried.push((&source.index, source.collection.as_str()));

            let cached = vectors
                .iter()
                .find(|(e, _)| Arc::ptr_eq(*e, &source.embedder));
            let vector = match cached {
                Some((_, v)) => v.clone(),
                None => {
                    let v = source
                        .embedder
                        .embed(&[text.to_string()])
                        .await
                        .map_err(Error::upstream)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| Error::Upstream("embedding service returned no vector".into()))?;
                    vectors.push((&source.embedder, v.clone()));
                    v
                }
            };

            let hits = source
                .index
                .query(&source.collection, &vector, k)
                .await
                .map_err(Error::upstream)?;
            out.extend(hits.into_iter().filter(|h| seen.insert(h.id.clone())));
        }
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reset
// ═══════════════════════════════════════════════════════════════════════

/// What a best-effort [`reset`] removed and what it could not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetReport {
    pub removed: Vec<String>,
    pub failures: Vec<PartialDeleteError>,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete `collection`, then every directory in `dirs`.
///
/// No step aborts the others. A collection that does not exist counts as
/// removed. The index is asked to release its handles before directories
/// are deleted.
pub async fn reset(index: &dyn VectorIndex, collection: &str, dirs: &[PathBuf]) -> ResetReport {
    let mut report = ResetReport::default();

    match index.delete_collection(collection).await {
        Ok(()) => report.removed.push(collection.to_string()),
        Err(e) if e.downcast_ref::<CollectionNotFound>().is_some() => {
            report.removed.push(collection.to_string())
        }
        Err(e) => {
            warn!(collection, error = %e, "could not delete collection");
            report.failures.push(PartialDeleteError {
                resource: collection.to_string(),
                reason: format!("{:#}", e),
            });
        }
    }

    if let Err(e) = index.release().await {
        warn!(error = %e, "could not release vector index handles");
    }

    for dir in dirs {
        match remove_tree(dir) {
            Ok(()) => report.removed.push(dir.display().to_string()),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "could not remove directory");
                report.failures.push(PartialDeleteError {
                    resource: dir.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}
