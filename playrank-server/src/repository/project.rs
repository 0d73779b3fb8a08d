//! Project Repository
//!
//! Read-only access to projects and their ideas.

use playrank_core::domain::project::{Idea, Project};
use sqlx::PgPool;
use uuid::Uuid;

/// Find a project owned by `owner_id`
pub async fn find_by_id(
    pool: &PgPool,
    owner_id: Uuid,
    id: Uuid,
) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, owner_id, name, constraints
        FROM projects
        WHERE id = $1 AND owner_id = $2
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Project {
        id: r.id,
        owner_id: r.owner_id,
        name: r.name,
        constraints: r.constraints,
    }))
}

/// List up to `limit` ideas of a project, oldest first
pub async fn list_ideas(
    pool: &PgPool,
    project_id: Uuid,
    limit: usize,
) -> Result<Vec<Idea>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IdeaRow>(
        r#"
        SELECT id, project_id, title, raw_text
        FROM ideas
        WHERE project_id = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(project_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Idea {
            id: r.id,
            project_id: r.project_id,
            title: r.title,
            raw_text: r.raw_text,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    constraints: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct IdeaRow {
    id: Uuid,
    project_id: Uuid,
    title: String,
    raw_text: String,
}
