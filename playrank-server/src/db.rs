use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    // Projects and ideas are written by the CRUD side of the product
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            owner_id UUID NOT NULL,
            name TEXT NOT NULL,
            constraints JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ideas (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            owner_id UUID NOT NULL,
            title TEXT NOT NULL,
            raw_text TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playbook_chunks (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            owner_id UUID NOT NULL,
            chunk_title TEXT,
            chunk_text TEXT NOT NULL,
            embedding vector(1536) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION match_playbook_chunks(
            query_embedding vector(1536),
            match_project_id UUID,
            match_count INT
        )
        RETURNS TABLE (id UUID, chunk_title TEXT, chunk_text TEXT, similarity DOUBLE PRECISION)
        LANGUAGE sql STABLE
        AS $$
            SELECT c.id, c.chunk_title, c.chunk_text,
                   1 - (c.embedding <=> query_embedding) AS similarity
            FROM playbook_chunks c
            WHERE c.project_id = match_project_id
            ORDER BY c.embedding <=> query_embedding
            LIMIT match_count
        $$
        "#,
    )
    .execute(pool)
    .await?;

    // Jobs: scoring runs and artifact generations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            kind VARCHAR(20) NOT NULL CHECK (kind IN ('run', 'artifacts')),
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            owner_id UUID NOT NULL,
            parent_job_id UUID REFERENCES jobs(id) ON DELETE CASCADE,
            status VARCHAR(20) NOT NULL CHECK (status IN ('running', 'completed', 'failed')),
            model TEXT,
            input_snapshot JSONB NOT NULL DEFAULT '{}',
            sources_used JSONB NOT NULL DEFAULT '[]',
            raw_response JSONB,
            error_type TEXT,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idea_scores (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            project_id UUID NOT NULL,
            owner_id UUID NOT NULL,
            idea_id UUID NOT NULL,
            impact INTEGER NOT NULL,
            effort INTEGER NOT NULL,
            risk INTEGER NOT NULL,
            data_readiness INTEGER NOT NULL,
            overall DOUBLE PRECISION NOT NULL,
            rationale TEXT NOT NULL,
            citations JSONB NOT NULL DEFAULT '[]',
            cost_estimate_usd BIGINT,
            resource_estimate JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE (job_id, idea_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            run_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            project_id UUID NOT NULL,
            owner_id UUID NOT NULL,
            kind VARCHAR(32) NOT NULL CHECK (kind IN ('plan_30_60_90', 'experiment_card')),
            content_markdown TEXT NOT NULL,
            citations JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ideas_project ON ideas(project_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs(project_id, owner_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_running ON jobs(status) WHERE status = 'running'")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_idea_scores_job ON idea_scores(job_id, overall DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
