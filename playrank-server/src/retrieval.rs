//! Evidence retrieval over the project playbook
//!
//! The similarity search itself lives in the `match_playbook_chunks` SQL
//! function; this module embeds the query text and maps rows to chunks.

use std::sync::Arc;

use async_trait::async_trait;
use playrank_client::{ClientError, Embedder, to_pgvector_literal};
use playrank_core::domain::evidence::EvidenceChunk;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] ClientError),

    #[error("retrieval query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Source of evidence chunks for a project
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` chunks most similar to `query`, best first
    async fn search(
        &self,
        project_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError>;

    /// The chunks with the given ids, in the order of `ids`; unknown ids are skipped
    async fn fetch(&self, project_id: Uuid, ids: &[Uuid]) -> Result<Vec<EvidenceChunk>, RetrievalError>;
}

/// pgvector-backed retriever
pub struct PgRetriever {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
}

impl PgRetriever {
    pub fn new(pool: PgPool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }
}

#[async_trait]
impl Retriever for PgRetriever {
    async fn search(
        &self,
        project_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(embedding) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT id, chunk_title, chunk_text, similarity
            FROM match_playbook_chunks($1::vector, $2, $3)
            "#,
        )
        .bind(to_pgvector_literal(&embedding))
        .bind(project_id)
        .bind(top_k as i32)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks: Vec<EvidenceChunk> = rows
            .into_iter()
            .map(|r| EvidenceChunk {
                id: r.id,
                title: r.chunk_title,
                text: r.chunk_text,
                similarity: r.similarity,
            })
            .collect();
        chunks.sort_by(|a, b| {
            b.similarity
                .unwrap_or(f64::MIN)
                .total_cmp(&a.similarity.unwrap_or(f64::MIN))
        });

        tracing::debug!(project_id = %project_id, found = chunks.len(), "Playbook search finished");
        Ok(chunks)
    }

    async fn fetch(&self, project_id: Uuid, ids: &[Uuid]) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT id, chunk_title, chunk_text
            FROM playbook_chunks
            WHERE project_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(project_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks: Vec<EvidenceChunk> = rows
            .into_iter()
            .map(|r| EvidenceChunk {
                id: r.id,
                title: r.chunk_title,
                text: r.chunk_text,
                similarity: None,
            })
            .collect();
        chunks.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
        Ok(chunks)
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    chunk_title: Option<String>,
    chunk_text: String,
    similarity: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    chunk_title: Option<String>,
    chunk_text: String,
}
