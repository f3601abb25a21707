//! Streaming upload ingestion state machine. Grounded on
//! `original_source/CuemsUpload.py`: the `Idle -> Announced -> Streaming
//! -> Committed|Failed` progression is the Rust analogue of the original's
//! `uploading` string-flag state (`False` / `'Ready'`), the temp filename
//! scheme (`<name>.tmp<6-digit-random>`) and the cleanup-on-drop behavior
//! are reproduced verbatim.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use rand::Rng;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{CoreError, Result};
use crate::sanitize::sanitize_file_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Announced,
    Streaming,
    Committed,
    Failed,
}

/// One in-flight upload, scoped to a session. The temp file is removed on
/// `Drop` if the upload never reached `Committed`, matching
/// `CuemsUpload.__del__`'s cleanup-on-destruction.
pub struct UploadSession {
    tmp_upload_path: PathBuf,
    state: UploadState,
    file_name: Option<String>,
    tmp_file_name: Option<String>,
    expected_size: u64,
    bytes_received: u64,
    file: Option<File>,
}

impl UploadSession {
    pub fn new(tmp_upload_path: impl Into<PathBuf>) -> Self {
        Self {
            tmp_upload_path: tmp_upload_path.into(),
            state: UploadState::Idle,
            file_name: None,
            tmp_file_name: None,
            expected_size: 0,
            bytes_received: 0,
            file: None,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    fn tmp_file_path(&self) -> Option<PathBuf> {
        self.tmp_file_name
            .as_ref()
            .map(|name| self.tmp_upload_path.join(name))
    }

    /// Announces an upload: sanitizes the name, mints a randomized temp
    /// filename, and moves to `Announced` if no file with that temp name
    /// already exists.
    pub async fn announce(&mut self, original_name: &str, size: u64) -> Result<()> {
        let file_name = sanitize_file_name(original_name);
        let tmp_file_name = format!("{file_name}.tmp{}", rand::thread_rng().gen_range(100_000..999_999));

        let tmp_path = self.tmp_upload_path.join(&tmp_file_name);
        if tokio::fs::try_exists(&tmp_path).await.unwrap_or(false) {
            return Err(CoreError::Conflict(format!(
                "upload temp file already exists: {}",
                tmp_path.display()
            )));
        }

        self.file_name = Some(file_name);
        self.tmp_file_name = Some(tmp_file_name);
        self.expected_size = size;
        self.bytes_received = 0;
        self.state = UploadState::Announced;
        Ok(())
    }

    /// Writes a binary chunk, opening the temp file lazily on the first
    /// chunk (moving `Announced -> Streaming`).
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if !matches!(self.state, UploadState::Announced | UploadState::Streaming) {
            return Err(CoreError::Conflict("upload is not accepting data".into()));
        }

        if self.file.is_none() {
            let path = self
                .tmp_file_path()
                .ok_or_else(|| CoreError::Conflict("upload was never announced".into()))?;
            let file = File::create(&path).await.map_err(|e| CoreError::io(&path, e))?;
            self.file = Some(file);
            self.state = UploadState::Streaming;
        }

        let file = self.file.as_mut().expect("file opened above");
        file.write_all(chunk).await.map_err(|e| {
            CoreError::io(self.tmp_file_path().unwrap_or_default(), e)
        })?;
        self.bytes_received += chunk.len() as u64;
        Ok(())
    }

    /// Finalizes the upload: flushes, verifies the MD5 against the
    /// client-reported digest, and returns the staged temp path and
    /// original file name for the Media Service to ingest. Mirrors
    /// `upload_done`/`check_file_integrity`.
    pub async fn finish(&mut self, expected_md5: &str) -> Result<(PathBuf, String)> {
        if self.state != UploadState::Streaming {
            return Err(CoreError::Conflict("upload has no data streamed".into()));
        }

        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| {
                CoreError::io(self.tmp_file_path().unwrap_or_default(), e)
            })?;
        }

        let path = self.tmp_file_path().expect("announced before finish");
        let actual_md5 = hash_file(&path).await?;
        if !actual_md5.eq_ignore_ascii_case(expected_md5) {
            self.state = UploadState::Failed;
            return Err(CoreError::FileIntegrity {
                path,
                expected: expected_md5.to_string(),
                actual: actual_md5,
            });
        }

        self.state = UploadState::Committed;
        let file_name = self.file_name.clone().expect("announced before finish");
        Ok((path, file_name))
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.state != UploadState::Committed {
            if let Some(path) = self.tmp_file_path() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

async fn hash_file(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path).await.map_err(|e| CoreError::io(path, e))?;
    let mut hasher = Md5::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_upload_lifecycle_succeeds_on_matching_md5() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = UploadSession::new(tmp.path());

        session.announce("My Clip.wav", 4).await.unwrap();
        session.write_chunk(b"data").await.unwrap();

        let mut hasher = Md5::new();
        hasher.update(b"data");
        let digest = format!("{:x}", hasher.finalize());

        let (path, name) = session.finish(&digest).await.unwrap();
        assert_eq!(name, "my_clip.wav");
        assert!(path.exists());
        assert_eq!(*session.state(), UploadState::Committed);
    }

    #[tokio::test]
    async fn mismatched_md5_fails_with_file_integrity_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = UploadSession::new(tmp.path());
        session.announce("clip.wav", 4).await.unwrap();
        session.write_chunk(b"data").await.unwrap();

        let err = session.finish("deadbeef").await.unwrap_err();
        assert!(matches!(err, CoreError::FileIntegrity { .. }));
    }

    #[tokio::test]
    async fn temp_file_cleaned_up_when_dropped_before_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let path;
        {
            let mut session = UploadSession::new(tmp.path());
            session.announce("clip.wav", 4).await.unwrap();
            session.write_chunk(b"data").await.unwrap();
            path = session.tmp_file_path().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
