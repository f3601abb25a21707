//! SQLite-backed metadata store: a thin transactional layer over the
//! `project`/`media`/`project_media` tables, grounded on the peewee models
//! in `original_source/CuemsDBModel.py` and the query helpers
//! (`medias()`, `projects()`, `orphan()`, `missing_refs()`) scattered
//! across the original manager classes.
//!
//! Mirrors the teacher's async_trait read/write port split
//! (`ferrex-core/src/database/repositories/media.rs`), adapted from a
//! `PgPool` to a single-writer `SqlitePool`.

mod schema;

use chrono::Utc;
use cuems_model::{Media, MediaId, Project, ProjectId, ProjectMedia};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Row, SqlitePool};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

/// A media row plus the project-membership counts the original
/// `Media.list()`/`Media.list_trash()` queries compute with a `GROUP BY`.
#[derive(Debug, Clone, Serialize)]
pub struct MediaListing {
    pub media: Media,
    pub in_projects: i64,
    pub in_trash_projects: i64,
}

impl MetadataStore {
    /// Opens (creating if absent) the SQLite file at `path`, enables
    /// foreign key enforcement, and ensures the schema exists.
    pub async fn connect(path: &std::path::Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(schema::SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- Project reads ----------------------------------------------

    pub async fn get_project(&self, id: ProjectId) -> Result<Project> {
        sqlx::query_as::<_, Project>("SELECT * FROM project WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::non_existent("project", id.to_string()))
    }

    pub async fn get_project_by_unix_name(&self, unix_name: &str) -> Result<Option<Project>> {
        Ok(
            sqlx::query_as::<_, Project>("SELECT * FROM project WHERE unix_name = ?")
                .bind(unix_name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_projects(&self, trashed: bool) -> Result<Vec<Project>> {
        Ok(sqlx::query_as::<_, Project>(
            "SELECT * FROM project WHERE trashed = ? ORDER BY created_at",
        )
        .bind(trashed)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn project_media_ids(&self, project_id: ProjectId) -> Result<Vec<MediaId>> {
        let rows = sqlx::query("SELECT media_id FROM project_media WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let raw: String = r.try_get("media_id")?;
                Ok(MediaId::from_uuid(
                    uuid::Uuid::parse_str(&raw).map_err(|e| {
                        sqlx::Error::ColumnDecode {
                            index: "media_id".into(),
                            source: Box::new(e),
                        }
                    })?,
                ))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(CoreError::from)
    }

    // ---- Project writes ----------------------------------------------

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "INSERT INTO project (id, unix_name, name, description, trashed, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id)
        .bind(&project.unix_name)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.trashed)
        .bind(project.created_at.to_rfc3339())
        .bind(project.modified_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_project(&self, project: &Project) -> Result<()> {
        let result = sqlx::query(
            "UPDATE project SET unix_name = ?, name = ?, description = ?, trashed = ?, modified_at = ?
             WHERE id = ?",
        )
        .bind(&project.unix_name)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.trashed)
        .bind(Utc::now().to_rfc3339())
        .bind(project.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("project", project.id.to_string()));
        }
        Ok(())
    }

    pub async fn set_project_trashed(&self, id: ProjectId, trashed: bool) -> Result<()> {
        let result = sqlx::query("UPDATE project SET trashed = ?, modified_at = ? WHERE id = ?")
            .bind(trashed)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("project", id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let result = sqlx::query("DELETE FROM project WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("project", id.to_string()));
        }
        Ok(())
    }

    /// Replaces a project's referenced-media edge set wholesale, the Rust
    /// analogue of `CuemsDBProject.update_media_relations`'s symmetric
    /// difference of old vs. new `unix_name` sets.
    pub async fn replace_project_media_edges(
        &self,
        project_id: ProjectId,
        media_ids: &[MediaId],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM project_media WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        for media_id in media_ids {
            sqlx::query("INSERT INTO project_media (project_id, media_id) VALUES (?, ?)")
                .bind(project_id)
                .bind(*media_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- Media reads ---------------------------------------------------

    pub async fn get_media(&self, id: MediaId) -> Result<Media> {
        sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::non_existent("media", id.to_string()))
    }

    pub async fn get_media_by_unix_name(&self, unix_name: &str) -> Result<Option<Media>> {
        Ok(
            sqlx::query_as::<_, Media>("SELECT * FROM media WHERE unix_name = ?")
                .bind(unix_name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_media(&self, trashed: bool) -> Result<Vec<MediaListing>> {
        let rows = sqlx::query(
            "SELECT m.*,
                    COUNT(CASE WHEN p.trashed = 0 THEN 1 END) AS in_projects,
                    COUNT(CASE WHEN p.trashed = 1 THEN 1 END) AS in_trash_projects
             FROM media m
             LEFT JOIN project_media pm ON pm.media_id = m.id
             LEFT JOIN project p ON p.id = pm.project_id
             WHERE m.trashed = ?
             GROUP BY m.id
             ORDER BY m.created_at",
        )
        .bind(trashed)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_media_listing).collect()
    }

    pub async fn media_projects(&self, media_id: MediaId) -> Result<Vec<Project>> {
        Ok(sqlx::query_as::<_, Project>(
            "SELECT p.* FROM project p
             JOIN project_media pm ON pm.project_id = p.id
             WHERE pm.media_id = ?
             ORDER BY p.created_at",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Media with no `project_media` edge at all — `Media.orphan()`.
    pub async fn orphan_media(&self) -> Result<Vec<Media>> {
        Ok(sqlx::query_as::<_, Media>(
            "SELECT m.* FROM media m
             LEFT JOIN project_media pm ON pm.media_id = m.id
             WHERE pm.media_id IS NULL
             ORDER BY m.created_at",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Edges whose project or media no longer resolves —
    /// `ProjectMedia.missing_refs()`. Diagnostic only; foreign keys with
    /// `ON DELETE CASCADE` should keep this always empty.
    pub async fn dangling_edges(&self) -> Result<Vec<ProjectMedia>> {
        Ok(sqlx::query_as::<_, ProjectMedia>(
            "SELECT pm.* FROM project_media pm
             LEFT JOIN media m ON m.id = pm.media_id
             LEFT JOIN project p ON p.id = pm.project_id
             WHERE m.id IS NULL OR p.id IS NULL",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    // ---- Media writes --------------------------------------------------

    pub async fn insert_media(&self, media: &Media) -> Result<()> {
        sqlx::query(
            "INSERT INTO media (id, unix_name, name, description, media_type, duration_secs, trashed, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(media.id)
        .bind(&media.unix_name)
        .bind(&media.name)
        .bind(&media.description)
        .bind(media.media_type)
        .bind(media.duration_secs)
        .bind(media.trashed)
        .bind(media.created_at.to_rfc3339())
        .bind(media.modified_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_media_metadata(
        &self,
        id: MediaId,
        name: &str,
        description: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE media SET name = ?, description = ?, modified_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("media", id.to_string()));
        }
        Ok(())
    }

    pub async fn set_media_trashed(&self, id: MediaId, trashed: bool) -> Result<()> {
        let result = sqlx::query("UPDATE media SET trashed = ?, modified_at = ? WHERE id = ?")
            .bind(trashed)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("media", id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_media(&self, id: MediaId) -> Result<()> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::non_existent("media", id.to_string()));
        }
        Ok(())
    }
}

fn row_to_media_listing(row: sqlx::sqlite::SqliteRow) -> Result<MediaListing> {
    let media = Media::from_row(&row).map_err(CoreError::from)?;
    let in_projects: i64 = row.try_get("in_projects")?;
    let in_trash_projects: i64 = row.try_get("in_trash_projects")?;
    Ok(MediaListing {
        media,
        in_projects,
        in_trash_projects,
    })
}
