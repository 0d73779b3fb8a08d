//! Artifact Repository
//!
//! Handles all database operations related to generated artifacts.

use playrank_core::domain::artifact::{Artifact, ArtifactKind, NewArtifact};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert the artifacts of one generation in a single transaction
pub async fn insert_many(
    pool: &PgPool,
    rows: &[NewArtifact],
) -> Result<Vec<Artifact>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut saved = Vec::with_capacity(rows.len());
    let now = chrono::Utc::now();

    for row in rows {
        let id = Uuid::new_v4();
        let citations = serde_json::to_value(&row.citations).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO artifacts (id, job_id, run_id, project_id, owner_id, kind,
                                   content_markdown, citations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(row.job_id)
        .bind(row.run_id)
        .bind(row.project_id)
        .bind(row.owner_id)
        .bind(row.kind.as_str())
        .bind(&row.content_markdown)
        .bind(citations)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        saved.push(Artifact {
            id,
            job_id: row.job_id,
            run_id: row.run_id,
            project_id: row.project_id,
            owner_id: row.owner_id,
            kind: row.kind,
            content_markdown: row.content_markdown.clone(),
            citations: row.citations.clone(),
            created_at: now,
        });
    }

    tx.commit().await?;
    Ok(saved)
}

/// List a run's artifacts, newest first
pub async fn list_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<Artifact>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ArtifactRow>(
        r#"
        SELECT id, job_id, run_id, project_id, owner_id, kind, content_markdown,
               citations, created_at
        FROM artifacts
        WHERE run_id = $1
        ORDER BY created_at DESC, kind ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn count_by_job(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    job_id: Uuid,
    run_id: Uuid,
    project_id: Uuid,
    owner_id: Uuid,
    kind: String,
    content_markdown: String,
    citations: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            id: row.id,
            job_id: row.job_id,
            run_id: row.run_id,
            project_id: row.project_id,
            owner_id: row.owner_id,
            kind: ArtifactKind::parse(&row.kind).unwrap_or(ArtifactKind::Plan306090),
            content_markdown: row.content_markdown,
            citations: serde_json::from_value(row.citations).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}
