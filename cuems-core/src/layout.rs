//! Derives every on-disk path the library uses from a single root, and
//! creates them on bootstrap. Grounded on the `*_FOLDER_NAME` constants and
//! `os.path.join` composition in the original media/project managers.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

const PROJECT_FOLDER_NAME: &str = "projects";
const MEDIA_FOLDER_NAME: &str = "media";
const TRASH_FOLDER_NAME: &str = "trash";
const THUMBNAIL_FOLDER_NAME: &str = "thumbnail";
const WAVEFORM_FOLDER_NAME: &str = "waveform";
pub const SCRIPT_FILE_NAME: &str = "script.xml";

#[derive(Debug, Clone)]
pub struct LibraryLayout {
    root: PathBuf,
}

impl LibraryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_path(&self) -> PathBuf {
        self.root.join(PROJECT_FOLDER_NAME)
    }

    pub fn project_path(&self, unix_name: &str) -> PathBuf {
        self.projects_path().join(unix_name)
    }

    pub fn project_script_path(&self, unix_name: &str) -> PathBuf {
        self.project_path(unix_name).join(SCRIPT_FILE_NAME)
    }

    pub fn projects_trash_path(&self) -> PathBuf {
        self.root.join(TRASH_FOLDER_NAME).join(PROJECT_FOLDER_NAME)
    }

    pub fn project_trash_path(&self, unix_name: &str) -> PathBuf {
        self.projects_trash_path().join(unix_name)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root.join(MEDIA_FOLDER_NAME)
    }

    pub fn media_file_path(&self, file_name: &str) -> PathBuf {
        self.media_path().join(file_name)
    }

    pub fn media_trash_path(&self) -> PathBuf {
        self.root.join(TRASH_FOLDER_NAME).join(MEDIA_FOLDER_NAME)
    }

    pub fn media_trash_file_path(&self, file_name: &str) -> PathBuf {
        self.media_trash_path().join(file_name)
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.media_path().join(THUMBNAIL_FOLDER_NAME)
    }

    pub fn thumbnail_trash_path(&self) -> PathBuf {
        self.media_trash_path().join(THUMBNAIL_FOLDER_NAME)
    }

    pub fn waveform_path(&self) -> PathBuf {
        self.media_path().join(WAVEFORM_FOLDER_NAME)
    }

    pub fn waveform_trash_path(&self) -> PathBuf {
        self.media_trash_path().join(WAVEFORM_FOLDER_NAME)
    }

    /// Creates every directory the layout defines that doesn't yet exist.
    /// Called once on bootstrap (`spec.md` §4.3).
    pub fn ensure_created(&self) -> Result<()> {
        for dir in [
            self.projects_path(),
            self.projects_trash_path(),
            self.media_path(),
            self.media_trash_path(),
            self.thumbnail_path(),
            self.thumbnail_trash_path(),
            self.waveform_path(),
            self.waveform_trash_path(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_created_makes_every_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LibraryLayout::new(tmp.path());
        layout.ensure_created().unwrap();

        assert!(layout.projects_path().is_dir());
        assert!(layout.projects_trash_path().is_dir());
        assert!(layout.thumbnail_path().is_dir());
        assert!(layout.waveform_trash_path().is_dir());
    }

    #[test]
    fn derives_expected_relative_layout() {
        let layout = LibraryLayout::new("/lib");
        assert_eq!(layout.media_path(), Path::new("/lib/media"));
        assert_eq!(layout.thumbnail_path(), Path::new("/lib/media/thumbnail"));
        assert_eq!(
            layout.media_trash_path(),
            Path::new("/lib/trash/media")
        );
        assert_eq!(
            layout.project_script_path("demo"),
            Path::new("/lib/projects/demo/script.xml")
        );
    }
}
