//! Project and idea types
//!
//! Projects and ideas are owned by the CRUD side of the application; the run
//! engine only reads them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Free-form constraints (budget, team size, ...) forwarded to the model
    pub constraints: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub raw_text: String,
}
