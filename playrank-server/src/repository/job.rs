//! Job Repository
//!
//! Handles all database operations related to jobs. Every transition out of
//! `running` is a conditional update, so concurrent writers (orchestrator and
//! reconciler) can never move a job twice.

use playrank_core::domain::job::{Job, JobKind, JobStatus, NewJob, SourceRef};
use sqlx::PgPool;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, kind, project_id, owner_id, parent_job_id, status, model,
    input_snapshot, sources_used, raw_response, error_type, error_message,
    created_at, updated_at, completed_at
"#;

/// Create a new running job
pub async fn create(pool: &PgPool, new: NewJob) -> Result<Job, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let job = Job {
        id,
        kind: new.kind,
        project_id: new.project_id,
        owner_id: new.owner_id,
        parent_job_id: new.parent_job_id,
        status: JobStatus::Running,
        model: new.model,
        input_snapshot: new.input_snapshot,
        sources_used: Vec::new(),
        raw_response: None,
        error_type: None,
        error_message: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO jobs (id, kind, project_id, owner_id, parent_job_id, status, model,
                          input_snapshot, sources_used, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '[]'::jsonb, $9, $9)
        "#,
    )
    .bind(id)
    .bind(job.kind.as_str())
    .bind(job.project_id)
    .bind(job.owner_id)
    .bind(job.parent_job_id)
    .bind(job.status.as_str())
    .bind(&job.model)
    .bind(&job.input_snapshot)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(job)
}

/// Find a job by ID within an owner's project
pub async fn find_by_id(
    pool: &PgPool,
    owner_id: Uuid,
    project_id: Uuid,
    id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE id = $1 AND project_id = $2 AND owner_id = $3",
        JOB_COLUMNS
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(id)
        .bind(project_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

/// List a project's jobs, newest first, optionally of one kind
pub async fn list_by_project(
    pool: &PgPool,
    owner_id: Uuid,
    project_id: Uuid,
    kind: Option<JobKind>,
) -> Result<Vec<Job>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {} FROM jobs
        WHERE project_id = $1 AND owner_id = $2 AND ($3::text IS NULL OR kind = $3)
        ORDER BY created_at DESC
        "#,
        JOB_COLUMNS
    );
    let rows = sqlx::query_as::<_, JobRow>(&sql)
        .bind(project_id)
        .bind(owner_id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Write the grounding set once; later calls are no-ops
pub async fn record_sources(
    pool: &PgPool,
    job_id: Uuid,
    sources: &[SourceRef],
) -> Result<bool, sqlx::Error> {
    let sources = serde_json::to_value(sources).unwrap_or_default();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET sources_used = $1, updated_at = now()
        WHERE id = $2 AND status = 'running' AND sources_used = '[]'::jsonb
        "#,
    )
    .bind(sources)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Complete a job with its audit fields
pub async fn complete(
    pool: &PgPool,
    job_id: Uuid,
    model: &str,
    raw_response: &serde_json::Value,
) -> Result<Option<Job>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE jobs
        SET status = 'completed', model = $1, raw_response = $2,
            error_type = NULL, error_message = NULL,
            updated_at = now(), completed_at = COALESCE(completed_at, now())
        WHERE id = $3 AND status IN ('running', 'completed')
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(model)
        .bind(raw_response)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

/// Fail a running job
pub async fn fail(
    pool: &PgPool,
    job_id: Uuid,
    error_type: &str,
    error_message: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE jobs
        SET status = 'failed', error_type = $1, error_message = $2,
            updated_at = now(), completed_at = now()
        WHERE id = $3 AND status = 'running'
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(error_type)
        .bind(error_message)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

/// Mark a running job completed (repair path, no audit fields)
pub async fn mark_completed(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE jobs
        SET status = 'completed', updated_at = now(), completed_at = now()
        WHERE id = $1 AND status = 'running'
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    project_id: Uuid,
    owner_id: Uuid,
    parent_job_id: Option<Uuid>,
    status: String,
    model: Option<String>,
    input_snapshot: serde_json::Value,
    sources_used: serde_json::Value,
    raw_response: Option<serde_json::Value>,
    error_type: Option<String>,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        // The CHECK constraints only admit known values
        let kind = JobKind::parse(&row.kind).unwrap_or(JobKind::Run);
        let status = JobStatus::parse(&row.status).unwrap_or(JobStatus::Running);
        let sources_used = serde_json::from_value(row.sources_used).unwrap_or_default();

        Job {
            id: row.id,
            kind,
            project_id: row.project_id,
            owner_id: row.owner_id,
            parent_job_id: row.parent_job_id,
            status,
            model: row.model,
            input_snapshot: row.input_snapshot,
            sources_used,
            raw_response: row.raw_response,
            error_type: row.error_type,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}
