//! SQLite-backed [`VectorIndex`].
//!
//! Each page persists its index as `<vector_path>/index.sqlite`. Vectors are
//! little-endian f32 BLOBs and queries are brute-force cosine similarity
//! over one collection, which is plenty for the few hundred chunks an
//! upload session produces.
//!
//! The pool is opened lazily. [`release`](VectorIndex::release) closes it so
//! a clear can delete the directory; the next call reopens it. Reads against
//! a database that was never created answer as if it were empty instead of
//! creating it.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use review_harness_core::index::{rank, CollectionNotFound, VectorIndex};
use review_harness_core::models::{IndexRecord, RetrievedChunk};
use review_harness_core::vector::{blob_to_vec, cosine_similarity, vec_to_blob};

use crate::{db, migrate};

pub const DB_FILE: &str = "index.sqlite";

pub struct SqliteVectorIndex {
    db_path: PathBuf,
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteVectorIndex {
    /// Index stored under `dir`. Nothing is touched on disk until first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            db_path: dir.join(DB_FILE),
            pool: Mutex::new(None),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn open(&self) -> Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        debug!(path = %self.db_path.display(), "opening vector index");
        let pool = db::connect(&self.db_path).await?;
        migrate::run_migrations(&pool).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Pool for read paths; `None` when the database file does not exist yet.
    async fn open_existing(&self) -> Result<Option<SqlitePool>> {
        let is_open = self.pool.lock().await.is_some();
        if !is_open && !self.db_path.exists() {
            return Ok(None);
        }
        self.open().await.map(Some)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()> {
        let pool = self.open().await?;
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for r in records {
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, source_file, chunk_index,
                                     content_hash, text, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    source_file = excluded.source_file,
                    chunk_index = excluded.chunk_index,
                    content_hash = excluded.content_hash,
                    text = excluded.text,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&r.id)
            .bind(&r.metadata.source_file)
            .bind(r.metadata.chunk_index)
            .bind(&r.metadata.content_hash)
            .bind(&r.metadata.text)
            .bind(r.vector.len() as i64)
            .bind(vec_to_blob(&r.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let Some(pool) = self.open_existing().await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT id, source_file, chunk_index, text, embedding FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RetrievedChunk {
                    id: row.get("id"),
                    source_file: row.get("source_file"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
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
        let Some(pool) = self.open_existing().await? else {
            return Ok(false);
        };
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE collection = ? AND source_file = ? AND content_hash = ?",
        )
        .bind(collection)
        .bind(source_file)
        .bind(content_hash)
        .fetch_one(&pool)
        .await?;
        Ok(found > 0)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let Some(pool) = self.open_existing().await? else {
            return Err(CollectionNotFound(collection.to_string()).into());
        };
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        if removed == 0 {
            return Err(CollectionNotFound(collection.to_string()).into());
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let Some(pool) = self.open_existing().await? else {
            return Ok(0);
        };
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&pool)
            .await?;
        Ok(n as usize)
    }

    async fn release(&self) -> Result<()> {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_harness_core::chunk::chunk_text;
    use tempfile::TempDir;

    fn records(collection: &str, file: &str, hash: &str) -> Vec<IndexRecord> {
        chunk_text(collection, file, "alpha\n\nbeta", 2)
            .into_iter()
            .enumerate()
            .map(|(i, c)| IndexRecord::new(c, vec![1.0, i as f32], hash))
            .collect()
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_queryable() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteVectorIndex::new(&tmp.path().join("db"));

        index.upsert("code", &records("code", "a.c", "h")).await.unwrap();
        index.upsert("code", &records("code", "a.c", "h")).await.unwrap();
        assert_eq!(index.count("code").await.unwrap(), 2);

        let hits = index.query("code", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "alpha");
        assert!(index.has_source("code", "a.c", "h").await.unwrap());
        assert!(!index.has_source("code", "a.c", "other").await.unwrap());
    }

    #[tokio::test]
    async fn reads_do_not_create_database() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("never");
        let index = SqliteVectorIndex::new(&dir);
        assert_eq!(index.count("x").await.unwrap(), 0);
        assert!(index.query("x", &[1.0], 3).await.unwrap().is_empty());
        assert!(index.delete_collection("x").await.is_err());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn collections_are_isolated_and_deletable() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteVectorIndex::new(tmp.path());
        index.upsert("code", &records("code", "a.c", "h")).await.unwrap();
        index.upsert("docs", &records("docs", "a.md", "h")).await.unwrap();

        index.delete_collection("code").await.unwrap();
        assert_eq!(index.count("code").await.unwrap(), 0);
        assert_eq!(index.count("docs").await.unwrap(), 2);
        assert!(index.delete_collection("code").await.is_err());
    }

    #[tokio::test]
    async fn release_then_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("db");
        let index = SqliteVectorIndex::new(&dir);
        index.upsert("code", &records("code", "a.c", "h")).await.unwrap();

        index.release().await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(index.count("code").await.unwrap(), 0);

        index.upsert("code", &records("code", "b.c", "h")).await.unwrap();
        assert_eq!(index.count("code").await.unwrap(), 2);
    }
}
