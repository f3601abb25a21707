//! Project lifecycle, script persistence, and media-reference edge
//! recomputation. Grounded end-to-end on
//! `original_source/CuemsDBProject.py`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use cuems_model::{Project, ProjectId};

use crate::error::{CoreError, Result};
use crate::layout::LibraryLayout;
use crate::sanitize::{sanitize_dir_permit_increment, sanitize_file_name};
use crate::script::{CueScript, ScriptCodec, ScriptReferenceScanner};
use crate::store::MetadataStore;
use crate::versioned_move::copy_dir_versioned;

pub struct ProjectService {
    store: MetadataStore,
    layout: LibraryLayout,
    codec: Arc<dyn ScriptCodec>,
    scanner: Arc<dyn ScriptReferenceScanner>,
}

impl ProjectService {
    pub fn new(
        store: MetadataStore,
        layout: LibraryLayout,
        codec: Arc<dyn ScriptCodec>,
        scanner: Arc<dyn ScriptReferenceScanner>,
    ) -> Self {
        Self {
            store,
            layout,
            codec,
            scanner,
        }
    }

    pub async fn list(&self, trashed: bool) -> Result<Vec<Project>> {
        self.store.list_projects(trashed).await
    }

    pub async fn load(&self, id: ProjectId) -> Result<(Project, CueScript)> {
        let project = self.store.get_project(id).await?;
        let path = self.layout.project_script_path(&project.unix_name);
        let script = self.codec.read(&path)?;
        Ok((project, script))
    }

    /// Creates a new project: sanitizes the unix name (preserving any
    /// pre-existing `-NNN` version suffix), mints a project directory,
    /// inserts the row, resolves the script's media references, and
    /// writes the script. Rolls the directory back on any later failure.
    pub async fn new_project(
        &self,
        name: &str,
        description: &str,
        unix_name_hint: &str,
        script: CueScript,
    ) -> Result<Project> {
        let unix_name = sanitize_dir_permit_increment(unix_name_hint);
        let project_dir = self.layout.project_path(&unix_name);

        std::fs::create_dir(&project_dir).map_err(|e| CoreError::io(&project_dir, e))?;

        let result = self.new_project_inner(name, description, &unix_name, script).await;
        if result.is_err() {
            let _ = std::fs::remove_dir_all(&project_dir);
        }
        result
    }

    async fn new_project_inner(
        &self,
        name: &str,
        description: &str,
        unix_name: &str,
        script: CueScript,
    ) -> Result<Project> {
        let media_ids = self.resolve_media_ids(&script).await?;

        let now = Utc::now();
        let project = Project {
            id: ProjectId::new_v1(),
            unix_name: unix_name.to_string(),
            name: sanitize_file_name(name),
            description: description.to_string(),
            trashed: false,
            created_at: now,
            modified_at: now,
        };

        self.store.insert_project(&project).await?;
        self.store
            .replace_project_media_edges(project.id, &media_ids)
            .await?;

        let script_path = self.layout.project_script_path(unix_name);
        self.codec.write(&script_path, &script)?;

        Ok(project)
    }

    /// Updates name/description, rewrites the script, and recomputes the
    /// media-reference edges via symmetric difference of the old and new
    /// referenced `unix_name` sets (the Rust analogue of
    /// `update_media_relations`'s `remove_set`/`add_set`).
    pub async fn update(
        &self,
        id: ProjectId,
        name: &str,
        description: &str,
        script: CueScript,
    ) -> Result<Project> {
        let mut project = self.store.get_project(id).await?;
        let new_media_ids = self.resolve_media_ids(&script).await?;

        project.name = sanitize_file_name(name);
        project.description = description.to_string();
        project.modified_at = Utc::now();

        self.store.update_project(&project).await?;
        self.store
            .replace_project_media_edges(id, &new_media_ids)
            .await?;

        let script_path = self.layout.project_script_path(&project.unix_name);
        self.codec.write(&script_path, &script)?;

        Ok(project)
    }

    /// Resolves a script's referenced `unix_name`s to media ids, raising
    /// `NonExistentItem` for any that don't resolve — matching
    /// `add_media_relations`'s `Media.get(...)` raising `DoesNotExist`
    /// rather than silently skipping an unresolved reference.
    async fn resolve_media_ids(&self, script: &CueScript) -> Result<Vec<cuems_model::MediaId>> {
        let unix_names = self.scanner.referenced_media(script)?;
        let mut ids = Vec::with_capacity(unix_names.len());
        for unix_name in unix_names {
            let media = self
                .store
                .get_media_by_unix_name(&unix_name)
                .await?
                .ok_or_else(|| CoreError::non_existent("media", unix_name.clone()))?;
            ids.push(media.id);
        }
        Ok(ids)
    }

    /// Copies a project directory under a versioned name, duplicates the
    /// row with a fresh id, and re-adds its media relations. Mirrors
    /// `CuemsDBProject.duplicate`.
    pub async fn duplicate(&self, id: ProjectId) -> Result<Project> {
        let project = self.store.get_project(id).await?;
        let project_dir = self.layout.project_path(&project.unix_name);
        let projects_root = self.layout.projects_path();

        let new_unix_name = copy_dir_versioned(&project_dir, &projects_root, &project.unix_name)?;

        let result = self.duplicate_inner(&project, &new_unix_name).await;
        if result.is_err() {
            let _ = std::fs::remove_dir_all(self.layout.project_path(&new_unix_name));
        }
        result
    }

    async fn duplicate_inner(&self, original: &Project, new_unix_name: &str) -> Result<Project> {
        let now = Utc::now();
        let duplicate = Project {
            id: ProjectId::new_v1(),
            unix_name: new_unix_name.to_string(),
            name: format!("{} - Copy", original.name),
            description: original.description.clone(),
            trashed: false,
            created_at: now,
            modified_at: now,
        };

        self.store.insert_project(&duplicate).await?;

        let script_path = self.layout.project_script_path(new_unix_name);
        let script = self.codec.read(&script_path)?;
        let media_ids = self.resolve_media_ids(&script).await?;
        self.store
            .replace_project_media_edges(duplicate.id, &media_ids)
            .await?;

        Ok(duplicate)
    }

    /// Moves a project directory into trash and flags the row. Mirrors
    /// `CuemsDBProject.delete`.
    pub async fn delete(&self, id: ProjectId) -> Result<()> {
        let project = self.store.get_project(id).await?;
        if project.trashed {
            return Err(CoreError::Conflict(format!("project {id} already trashed")));
        }
        let src = self.layout.project_path(&project.unix_name);
        let dest_dir = self.layout.projects_trash_path();
        crate::versioned_move::copy_dir_versioned(&src, &dest_dir, &project.unix_name)?;
        std::fs::remove_dir_all(&src).map_err(|e| CoreError::io(&src, e))?;
        self.store.set_project_trashed(id, true).await
    }

    /// Restores a trashed project directory and row. Mirrors
    /// `CuemsDBProject.restore`.
    pub async fn restore(&self, id: ProjectId) -> Result<()> {
        let project = self.store.get_project(id).await?;
        if !project.trashed {
            return Err(CoreError::Conflict(format!("project {id} is not trashed")));
        }
        let src = self.layout.project_trash_path(&project.unix_name);
        let dest_dir = self.layout.projects_path();
        crate::versioned_move::copy_dir_versioned(&src, &dest_dir, &project.unix_name)?;
        std::fs::remove_dir_all(&src).map_err(|e| CoreError::io(&src, e))?;
        self.store.set_project_trashed(id, false).await
    }

    /// Permanently removes a trashed project. Mirrors
    /// `CuemsDBProject.delete_from_trash`.
    pub async fn purge(&self, id: ProjectId) -> Result<()> {
        let project = self.store.get_project(id).await?;
        if !project.trashed {
            return Err(CoreError::Conflict(format!("project {id} is not trashed")));
        }
        let dir = self.layout.project_trash_path(&project.unix_name);
        self.store.delete_project(id).await?;
        std::fs::remove_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        Ok(())
    }
}

/// Symmetric difference of two `unix_name` sets, exposed standalone for
/// testing the recomputation rule in isolation from the service's I/O.
pub fn media_reference_diff(old: &[String], new: &[String]) -> (HashSet<String>, HashSet<String>) {
    let old_set: HashSet<String> = old.iter().cloned().collect();
    let new_set: HashSet<String> = new.iter().cloned().collect();
    let remove = old_set.difference(&new_set).cloned().collect();
    let add = new_set.difference(&old_set).cloned().collect();
    (remove, add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_finds_added_and_removed_media() {
        let old = vec!["a.wav".to_string(), "b.mp4".to_string()];
        let new = vec!["b.mp4".to_string(), "c.png".to_string()];
        let (remove, add) = media_reference_diff(&old, &new);
        assert_eq!(remove, HashSet::from(["a.wav".to_string()]));
        assert_eq!(add, HashSet::from(["c.png".to_string()]));
    }

    #[test]
    fn diff_is_empty_for_identical_sets() {
        let names = vec!["a.wav".to_string()];
        let (remove, add) = media_reference_diff(&names, &names);
        assert!(remove.is_empty());
        assert!(add.is_empty());
    }
}
