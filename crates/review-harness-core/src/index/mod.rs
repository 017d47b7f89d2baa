//! Vector index abstraction.
//!
//! A [`VectorIndex`] holds named collections of [`IndexRecord`]s and answers
//! nearest-neighbour queries against them. The application ships a SQLite
//! implementation; [`memory::InMemoryIndex`] backs tests and ephemeral use.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or replace records by id, creating the collection if needed |
//! | [`query`](VectorIndex::query) | Top-`k` records by cosine similarity |
//! | [`has_source`](VectorIndex::has_source) | Whether a file with a given content hash is already indexed |
//! | [`delete_collection`](VectorIndex::delete_collection) | Drop a collection and all its records |
//! | [`count`](VectorIndex::count) | Number of records in a collection |
//! | [`release`](VectorIndex::release) | Close open handles before the backing directory is removed |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexRecord, RetrievedChunk};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records. Never removes records not named in `records`.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `k` records ordered by descending similarity.
    ///
    /// Querying a collection that does not exist yields an empty list.
    async fn query(&self, collection: &str, vector: &[f32], k: usize)
        -> Result<Vec<RetrievedChunk>>;

    /// True if any record for `source_file` was ingested from content
    /// with hash `content_hash`.
    async fn has_source(
        &self,
        collection: &str,
        source_file: &str,
        content_hash: &str,
    ) -> Result<bool>;

    /// Drop a collection. Fails with [`CollectionNotFound`] if it does not exist.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Number of records stored in `collection` (0 if absent).
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Release file handles so the persistence directory can be deleted.
    /// Implementations reopen lazily on the next call.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Returned (inside `anyhow::Error`) by
/// [`delete_collection`](VectorIndex::delete_collection) when there is
/// nothing to delete. Callers that treat absence as success downcast to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNotFound(pub String);

impl std::fmt::Display for CollectionNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "collection '{}' does not exist", self.0)
    }
}

impl std::error::Error for CollectionNotFound {}

/// Sort by descending score and keep the first `k`.
pub fn rank(mut hits: Vec<RetrievedChunk>, k: usize) -> Vec<RetrievedChunk> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);
    hits
}
