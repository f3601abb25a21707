use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// A project: a named, versioned cue script plus the set of media it
/// references, backed by a directory under the library's projects tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Project {
    pub id: ProjectId,
    pub unix_name: String,
    pub name: String,
    pub description: String,
    pub trashed: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}
