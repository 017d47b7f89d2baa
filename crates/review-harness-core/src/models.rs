//! Data models shared by the ingestion and retrieval pipeline.
//!
//! ```text
//! artifact file ──▶ chunk_text() ──▶ IngestionChunk ──embed──▶ IndexRecord
//!                                                                  │
//!                                   VectorIndex::query() ◀─────────┘
//!                                          │
//!                                          ▼
//!                                   RetrievedChunk
//! ```

use serde::{Deserialize, Serialize};

/// A piece of an artifact's text, produced by [`chunk_text`](crate::chunk::chunk_text).
///
/// Transient: it lives only between extraction and the embedding call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionChunk {
    /// Deterministic id derived from collection, source file and index.
    pub id: String,
    /// Filename of the artifact this chunk came from.
    pub source_file: String,
    /// Zero-based position within the source file.
    pub chunk_index: i64,
    pub text: String,
}

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub chunk_index: i64,
    /// SHA-256 of the whole source file at ingestion time.
    pub content_hash: String,
    pub text: String,
}

/// A chunk with its embedding, ready to be upserted.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl IndexRecord {
    pub fn new(chunk: IngestionChunk, vector: Vec<f32>, content_hash: &str) -> Self {
        Self {
            id: chunk.id,
            vector,
            metadata: ChunkMetadata {
                source_file: chunk.source_file,
                chunk_index: chunk.chunk_index,
                content_hash: content_hash.to_string(),
                text: chunk.text,
            },
        }
    }
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub source_file: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}
