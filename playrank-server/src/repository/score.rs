//! Score Repository
//!
//! Handles all database operations related to idea scores.

use playrank_core::domain::score::{IdeaScore, NewIdeaScore, ResourceEstimate, SubScores};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert every score of a run in one transaction
pub async fn insert_many(
    pool: &PgPool,
    rows: &[NewIdeaScore],
) -> Result<Vec<IdeaScore>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut saved = Vec::with_capacity(rows.len());
    let now = chrono::Utc::now();

    for row in rows {
        let id = Uuid::new_v4();
        let citations = serde_json::to_value(&row.citations).unwrap_or_default();
        let resource_estimate = serde_json::to_value(&row.resource_estimate).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO idea_scores (id, job_id, project_id, owner_id, idea_id,
                                     impact, effort, risk, data_readiness, overall,
                                     rationale, citations, cost_estimate_usd,
                                     resource_estimate, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(id)
        .bind(row.job_id)
        .bind(row.project_id)
        .bind(row.owner_id)
        .bind(row.idea_id)
        .bind(row.scores.impact)
        .bind(row.scores.effort)
        .bind(row.scores.risk)
        .bind(row.scores.data_readiness)
        .bind(row.overall)
        .bind(&row.rationale)
        .bind(citations)
        .bind(row.cost_estimate_usd)
        .bind(resource_estimate)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        saved.push(IdeaScore {
            id,
            job_id: row.job_id,
            project_id: row.project_id,
            owner_id: row.owner_id,
            idea_id: row.idea_id,
            scores: row.scores,
            overall: row.overall,
            rationale: row.rationale.clone(),
            citations: row.citations.clone(),
            cost_estimate_usd: row.cost_estimate_usd,
            resource_estimate: row.resource_estimate.clone(),
            created_at: now,
        });
    }

    tx.commit().await?;
    Ok(saved)
}

/// List a run's scores, best first
pub async fn list_by_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<IdeaScore>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IdeaScoreRow>(
        r#"
        SELECT id, job_id, project_id, owner_id, idea_id, impact, effort, risk,
               data_readiness, overall, rationale, citations, cost_estimate_usd,
               resource_estimate, created_at
        FROM idea_scores
        WHERE job_id = $1
        ORDER BY overall DESC, idea_id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

pub async fn count_by_job(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM idea_scores WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct IdeaScoreRow {
    id: Uuid,
    job_id: Uuid,
    project_id: Uuid,
    owner_id: Uuid,
    idea_id: Uuid,
    impact: i32,
    effort: i32,
    risk: i32,
    data_readiness: i32,
    overall: f64,
    rationale: String,
    citations: serde_json::Value,
    cost_estimate_usd: Option<i64>,
    resource_estimate: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<IdeaScoreRow> for IdeaScore {
    fn from(row: IdeaScoreRow) -> Self {
        IdeaScore {
            id: row.id,
            job_id: row.job_id,
            project_id: row.project_id,
            owner_id: row.owner_id,
            idea_id: row.idea_id,
            scores: SubScores {
                impact: row.impact,
                effort: row.effort,
                risk: row.risk,
                data_readiness: row.data_readiness,
            },
            overall: row.overall,
            rationale: row.rationale,
            citations: serde_json::from_value(row.citations).unwrap_or_default(),
            cost_estimate_usd: row.cost_estimate_usd,
            resource_estimate: serde_json::from_value::<ResourceEstimate>(row.resource_estimate)
                .unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}
