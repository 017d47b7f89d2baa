//! In-memory [`VectorIndex`] for tests and ephemeral sessions.
//!
//! Collections are `BTreeMap`s keyed by record id behind a `std::sync::RwLock`.
//! Queries are brute-force cosine similarity.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{rank, CollectionNotFound, VectorIndex};
use crate::models::{IndexRecord, RetrievedChunk};
use crate::vector::cosine_similarity;

type Collection = BTreeMap<String, IndexRecord>;

#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all collections currently held.
    pub fn collection_names(&self) -> Vec<String> {
        match self.collections.read() {
            Ok(guard) => {
                let mut names: Vec<String> = guard.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let coll = guard.entry(collection.to_string()).or_default();
        for r in records {
            coll.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let guard = self.collections.read().map_err(poisoned)?;
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let hits = coll
            .values()
            .map(|r| RetrievedChunk {
                id: r.id.clone(),
                source_file: r.metadata.source_file.clone(),
                chunk_index: r.metadata.chunk_index,
                text: r.metadata.text.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn has_source(
        &self,
        collection: &str,
        source_file: &str,
        content_hash: &str,
    ) -> Result<bool> {
        let guard = self.collections.read().map_err(poisoned)?;
        Ok(guard.get(collection).is_some_and(|coll| {
            coll.values().any(|r| {
                r.metadata.source_file == source_file && r.metadata.content_hash == content_hash
            })
        }))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        if guard.remove(collection).is_none() {
            return Err(CollectionNotFound(collection.to_string()).into());
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.collections.read().map_err(poisoned)?;
        Ok(guard.get(collection).map(|c| c.len()).unwrap_or(0))
    }
}
