//! Collision-avoiding move/copy: if the destination name is taken, retry
//! with a `-NNN` suffix inserted before the extension (files) or appended
//! (directories), starting at 001, until a free name is found.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

fn versioned_file_name(base: &str, ext: &str, i: u32) -> String {
    if ext.is_empty() {
        format!("{base}-{i:03}")
    } else {
        format!("{base}-{i:03}.{ext}")
    }
}

/// Moves `orig_path` into `dest_dir` under `dest_file_name`, retrying with
/// a numeric suffix until the destination is free. Returns the name
/// actually used.
pub fn move_versioned(
    orig_path: &Path,
    dest_dir: &Path,
    dest_file_name: &str,
) -> Result<String> {
    let path = Path::new(dest_file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(dest_file_name)
        .to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();

    let mut candidate = dest_file_name.to_string();
    let mut i = 0u32;
    loop {
        let dest = dest_dir.join(&candidate);
        if !dest.exists() {
            std::fs::rename(orig_path, &dest).map_err(|e| CoreError::io(&dest, e))?;
            return Ok(candidate);
        }
        i += 1;
        candidate = versioned_file_name(&stem, &ext, i);
    }
}

/// Recursively copies `orig_path` into `dest_dir` under `dest_dir_name`,
/// retrying with a numeric suffix until the destination is free. Returns
/// the directory name actually used.
pub fn copy_dir_versioned(
    orig_path: &Path,
    dest_dir: &Path,
    dest_dir_name: &str,
) -> Result<String> {
    let mut candidate = dest_dir_name.to_string();
    let mut i = 0u32;
    loop {
        let dest = dest_dir.join(&candidate);
        if !dest.exists() {
            copy_recursive(orig_path, &dest)?;
            return Ok(candidate);
        }
        i += 1;
        candidate = format!("{dest_dir_name}-{i:03}");
    }
}

fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| CoreError::io(dest, e))?;
    for entry in std::fs::read_dir(src).map_err(|e| CoreError::io(src, e))? {
        let entry = entry.map_err(|e| CoreError::io(src, e))?;
        let file_type = entry.file_type().map_err(|e| CoreError::io(entry.path(), e))?;
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).map_err(|e| CoreError::io(&dest_path, e))?;
        }
    }
    Ok(())
}

/// Just the next free versioned name, without performing the move/copy —
/// useful where the caller needs to reserve a name ahead of a transaction.
pub fn next_free_name(dest_dir: &Path, desired: &str) -> PathBuf {
    let path = Path::new(desired);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(desired)
        .to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();

    let mut candidate = desired.to_string();
    let mut i = 0u32;
    loop {
        let dest = dest_dir.join(&candidate);
        if !dest.exists() {
            return dest;
        }
        i += 1;
        candidate = versioned_file_name(&stem, &ext, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn moves_to_free_name_on_first_try() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.wav");
        fs::write(&src, b"data").unwrap();
        let dest_dir = tmp.path().join("dest");
        fs::create_dir(&dest_dir).unwrap();

        let used = move_versioned(&src, &dest_dir, "clip.wav").unwrap();
        assert_eq!(used, "clip.wav");
        assert!(dest_dir.join("clip.wav").exists());
    }

    #[test]
    fn moves_with_version_suffix_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let dest_dir = tmp.path().join("dest");
        fs::create_dir(&dest_dir).unwrap();
        fs::write(dest_dir.join("clip.wav"), b"existing").unwrap();

        let src = tmp.path().join("src.wav");
        fs::write(&src, b"data").unwrap();

        let used = move_versioned(&src, &dest_dir, "clip.wav").unwrap();
        assert_eq!(used, "clip-001.wav");
    }

    #[test]
    fn copies_dir_with_version_suffix_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let orig = tmp.path().join("proj");
        fs::create_dir(&orig).unwrap();
        fs::write(orig.join("a.txt"), b"hi").unwrap();

        let dest_dir = tmp.path().join("dest");
        fs::create_dir(&dest_dir).unwrap();
        fs::create_dir(dest_dir.join("proj")).unwrap();

        let used = copy_dir_versioned(&orig, &dest_dir, "proj").unwrap();
        assert_eq!(used, "proj-001");
        assert!(dest_dir.join("proj-001/a.txt").exists());
    }
}
