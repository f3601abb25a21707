use serde::{Deserialize, Serialize};

use crate::ids::{MediaId, ProjectId};

/// A many-to-many edge recording that a project's script references a
/// given media item. Rows are recomputed wholesale on every project save
/// (see the Project Service), never patched incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProjectMedia {
    pub project_id: ProjectId,
    pub media_id: MediaId,
}
