//! Media ingest, listing, metadata, derivatives, and trash lifecycle.
//! Grounded end-to-end on `original_source/CuemsDBMedia.py`: subprocess
//! argument lists, the duration-parsing quirk, and the thumbnail/waveform
//! filename-folding scheme are all reproduced from there.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use cuems_model::{Media, MediaId, MediaType};
use regex::Regex;
use tokio::process::Command;

use crate::error::{CoreError, Result};
use crate::layout::LibraryLayout;
use crate::sanitize::sanitize_file_name;
use crate::store::{MediaListing, MetadataStore};
use crate::versioned_move::move_versioned;

const THUMBNAIL_EXTENSION: &str = "png";
const WAVEFORM_EXTENSION: &str = "dat";
const THUMBNAIL_W: u32 = 240;
const THUMBNAIL_H: u32 = 240;

pub struct MediaService {
    store: MetadataStore,
    layout: LibraryLayout,
}

impl MediaService {
    pub fn new(store: MetadataStore, layout: LibraryLayout) -> Self {
        Self { store, layout }
    }

    /// Moves a staged upload into the media folder (with versioned-name
    /// collision handling), probes its type/duration, generates
    /// derivatives, and inserts the metadata row. Rolls back the filesystem
    /// moves it made if any later step fails — the Rust analogue of
    /// `CuemsDBMedia.new`'s try/except cleanup.
    pub async fn ingest(&self, staged_path: &Path, original_file_name: &str) -> Result<Media> {
        let sanitized = sanitize_file_name(original_file_name);
        let media_dir = self.layout.media_path();

        let dest_name = tokio::task::spawn_blocking({
            let staged_path = staged_path.to_path_buf();
            let media_dir = media_dir.clone();
            move || move_versioned(&staged_path, &media_dir, &sanitized)
        })
        .await
        .map_err(|e| CoreError::Conflict(e.to_string()))??;

        let mut undo: Vec<Box<dyn FnOnce() + Send>> = Vec::new();
        let result = self.ingest_inner(&dest_name, &mut undo).await;

        if result.is_err() {
            while let Some(step) = undo.pop() {
                step();
            }
        }
        result
    }

    async fn ingest_inner(
        &self,
        dest_name: &str,
        undo: &mut Vec<Box<dyn FnOnce() + Send>>,
    ) -> Result<Media> {
        let dest_path = self.layout.media_file_path(dest_name);
        undo.push({
            let dest_path = dest_path.clone();
            Box::new(move || {
                let _ = std::fs::remove_file(&dest_path);
            })
        });

        let media_type = MediaType::from_path(Path::new(dest_name))
            .ok_or_else(|| CoreError::Conflict(format!("unrecognized media extension: {dest_name}")))?;

        let duration_secs = if matches!(media_type, MediaType::Movie | MediaType::Audio) {
            Some(self.probe_duration(&dest_path).await?)
        } else {
            None
        };

        match media_type {
            MediaType::Movie => {
                self.create_video_thumbnail(dest_name, duration_secs).await?;
                let thumb = self.layout.thumbnail_path().join(thumbnail_file_name(dest_name));
                undo.push(Box::new(move || {
                    let _ = std::fs::remove_file(&thumb);
                }));
            }
            MediaType::Audio => {
                self.create_audio_thumbnail(dest_name, duration_secs).await?;
                let thumb = self.layout.thumbnail_path().join(thumbnail_file_name(dest_name));
                undo.push(Box::new(move || {
                    let _ = std::fs::remove_file(&thumb);
                }));
                self.create_audio_waveform(dest_name).await?;
                let wave = self.layout.waveform_path().join(waveform_file_name(dest_name));
                undo.push(Box::new(move || {
                    let _ = std::fs::remove_file(&wave);
                }));
            }
            MediaType::Image => {
                self.create_video_thumbnail(dest_name, None).await?;
                let thumb = self.layout.thumbnail_path().join(thumbnail_file_name(dest_name));
                undo.push(Box::new(move || {
                    let _ = std::fs::remove_file(&thumb);
                }));
            }
        }

        let now = Utc::now();
        let media = Media {
            id: MediaId::new_v1(),
            name: dest_name.to_string(),
            unix_name: dest_name.to_string(),
            description: String::new(),
            media_type,
            duration_secs,
            trashed: false,
            created_at: now,
            modified_at: now,
        };

        self.store.insert_media(&media).await?;
        Ok(media)
    }

    pub async fn list(&self, trashed: bool) -> Result<Vec<MediaListing>> {
        self.store.list_media(trashed).await
    }

    pub async fn update_metadata(&self, id: MediaId, name: &str, description: &str) -> Result<Media> {
        self.store.update_media_metadata(id, name, description).await?;
        self.store.get_media(id).await
    }

    pub async fn load_meta(&self, id: MediaId) -> Result<(Media, Vec<cuems_model::Project>)> {
        let media = self.store.get_media(id).await?;
        let projects = self.store.media_projects(id).await?;
        Ok((media, projects))
    }

    pub async fn load_thumbnail(&self, id: MediaId) -> Result<Vec<u8>> {
        let media = self.store.get_media(id).await?;
        let path = if media.trashed {
            self.layout.thumbnail_trash_path()
        } else {
            self.layout.thumbnail_path()
        }
        .join(thumbnail_file_name(&media.unix_name));
        read_with_header(&path, id).await
    }

    pub async fn load_waveform(&self, id: MediaId) -> Result<Vec<u8>> {
        let media = self.store.get_media(id).await?;
        let path = if media.trashed {
            self.layout.waveform_trash_path()
        } else {
            self.layout.waveform_path()
        }
        .join(waveform_file_name(&media.unix_name));
        read_with_header(&path, id).await
    }

    /// Moves the media file and any derivatives into trash and flags the
    /// row. Mirrors `CuemsDBMedia.delete`.
    pub async fn delete(&self, id: MediaId) -> Result<()> {
        let media = self.store.get_media(id).await?;
        if media.trashed {
            return Err(CoreError::Conflict(format!("media {id} already trashed")));
        }
        self.move_derivatives(&media.unix_name, false, true).await?;
        self.store.set_media_trashed(id, true).await
    }

    /// Restores a trashed media file and its derivatives. Mirrors
    /// `CuemsDBMedia.restore`.
    pub async fn restore(&self, id: MediaId) -> Result<()> {
        let media = self.store.get_media(id).await?;
        if !media.trashed {
            return Err(CoreError::Conflict(format!("media {id} is not trashed")));
        }
        self.move_derivatives(&media.unix_name, true, false).await?;
        self.store.set_media_trashed(id, false).await
    }

    /// Permanently removes a trashed media item and its derivatives.
    /// Mirrors `CuemsDBMedia.delete_from_trash`.
    pub async fn purge(&self, id: MediaId) -> Result<()> {
        let media = self.store.get_media(id).await?;
        if !media.trashed {
            return Err(CoreError::Conflict(format!("media {id} is not trashed")));
        }
        let file_path = self.layout.media_trash_file_path(&media.unix_name);
        let thumb_path = self
            .layout
            .thumbnail_trash_path()
            .join(thumbnail_file_name(&media.unix_name));
        let wave_path = self
            .layout
            .waveform_trash_path()
            .join(waveform_file_name(&media.unix_name));

        self.store.delete_media(id).await?;
        let _ = std::fs::remove_file(thumb_path);
        if media.media_type.is_audio() {
            let _ = std::fs::remove_file(wave_path);
        }
        std::fs::remove_file(&file_path).map_err(|e| CoreError::io(&file_path, e))?;
        Ok(())
    }

    async fn move_derivatives(&self, unix_name: &str, from_trash: bool, to_trash: bool) -> Result<()> {
        let (src_media_dir, dst_media_dir, src_thumb_dir, dst_thumb_dir, src_wave_dir, dst_wave_dir) =
            if to_trash {
                (
                    self.layout.media_path(),
                    self.layout.media_trash_path(),
                    self.layout.thumbnail_path(),
                    self.layout.thumbnail_trash_path(),
                    self.layout.waveform_path(),
                    self.layout.waveform_trash_path(),
                )
            } else {
                debug_assert!(from_trash);
                (
                    self.layout.media_trash_path(),
                    self.layout.media_path(),
                    self.layout.thumbnail_trash_path(),
                    self.layout.thumbnail_path(),
                    self.layout.waveform_trash_path(),
                    self.layout.waveform_path(),
                )
            };

        let thumb_src = src_thumb_dir.join(thumbnail_file_name(unix_name));
        if thumb_src.exists() {
            move_versioned(&thumb_src, &dst_thumb_dir, &thumbnail_file_name(unix_name))?;
        }

        let wave_src = src_wave_dir.join(waveform_file_name(unix_name));
        if wave_src.exists() {
            move_versioned(&wave_src, &dst_wave_dir, &waveform_file_name(unix_name))?;
        }

        let file_src = src_media_dir.join(unix_name);
        move_versioned(&file_src, &dst_media_dir, unix_name)?;
        Ok(())
    }

    /// `ffprobe -sexagesimal -v error -show_entries format=duration -of
    /// default=noprint_wrappers=1:nokey=1 <file>`, parsed with the same
    /// regex and millis-clamping quirk as the original.
    async fn probe_duration(&self, file_path: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-sexagesimal",
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(file_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CoreError::io(file_path, e))?;

        let text = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_duration(text.trim())
    }

    async fn create_video_thumbnail(&self, filename: &str, duration: Option<f64>) -> Result<()> {
        let file_path = self.layout.media_file_path(filename);
        let thumb_path = self.layout.thumbnail_path().join(thumbnail_file_name(filename));

        let mut cmd = Command::new("ffmpeg");
        if duration.is_some() {
            cmd.args(["-ss", "200ms"]);
        }
        cmd.args(["-y", "-hide_banner", "-loglevel", "warning", "-i"])
            .arg(&file_path)
            .args(["-vf", &format!("scale={THUMBNAIL_W}:-1"), "-vframes", "1"])
            .arg(&thumb_path);

        run_checked(cmd, &thumb_path).await
    }

    async fn create_audio_thumbnail(&self, filename: &str, duration: Option<f64>) -> Result<()> {
        let file_path = self.layout.media_file_path(filename);
        let thumb_path = self.layout.thumbnail_path().join(thumbnail_file_name(filename));
        let duration_secs = duration.unwrap_or(0.0);

        let mut cmd = Command::new("audiowaveform");
        cmd.args(["-i"])
            .arg(&file_path)
            .args(["-o"])
            .arg(&thumb_path)
            .args([
                "-e",
                &duration_secs.to_string(),
                "-w",
                &THUMBNAIL_W.to_string(),
                "-h",
                &THUMBNAIL_H.to_string(),
                "--no-axis-labels",
                "--amplitude-scale",
                "0.9",
            ]);

        run_checked(cmd, &thumb_path).await
    }

    async fn create_audio_waveform(&self, filename: &str) -> Result<()> {
        let file_path = self.layout.media_file_path(filename);
        let wave_path = self.layout.waveform_path().join(waveform_file_name(filename));

        let mut cmd = Command::new("audiowaveform");
        cmd.args(["-i"])
            .arg(&file_path)
            .args(["-o"])
            .arg(&wave_path)
            .args(["-b", "8"]);

        run_checked(cmd, &wave_path).await
    }
}

async fn run_checked(mut cmd: Command, expected_output: &Path) -> Result<()> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let _ = cmd
        .output()
        .await
        .map_err(|e| CoreError::io(expected_output, e))?;
    if !expected_output.exists() {
        return Err(CoreError::Conflict(format!(
            "expected derivative was not produced: {}",
            expected_output.display()
        )));
    }
    Ok(())
}

/// `{stem}_{ext}.png`, e.g. `clip.mp4` -> `clip_mp4.png`.
fn thumbnail_file_name(filename: &str) -> String {
    folded_derivative_name(filename, THUMBNAIL_EXTENSION)
}

/// `{stem}_{ext}.dat`, e.g. `take.wav` -> `take_wav.dat`.
fn waveform_file_name(filename: &str) -> String {
    folded_derivative_name(filename, WAVEFORM_EXTENSION)
}

fn folded_derivative_name(filename: &str, derivative_ext: &str) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    format!("{stem}_{ext}.{derivative_ext}")
}

/// 36-byte ASCII-encoded uuid header prepended to binary thumbnail/
/// waveform payloads, matching `CuemsDBMedia.add_binary_header`'s
/// `struct.pack('<36s', ...)`.
fn pack_uuid_header(id: MediaId) -> [u8; 36] {
    let mut header = [0u8; 36];
    let s = id.to_string();
    let bytes = s.as_bytes();
    let n = bytes.len().min(36);
    header[..n].copy_from_slice(&bytes[..n]);
    header
}

async fn read_with_header(path: &PathBuf, id: MediaId) -> Result<Vec<u8>> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|_| CoreError::non_existent("media derivative", path.display().to_string()))?;
    let mut out = Vec::with_capacity(36 + data.len());
    out.extend_from_slice(&pack_uuid_header(id));
    out.extend_from_slice(&data);
    Ok(out)
}

/// `^([\d]{1,2}:[\d]{2}:[\d]{2})(\.[\d]{6})`, with the same "round the
/// fraction to 3 decimals, and if that rounds up to a whole second (its
/// string form starts with '1'), clamp the fraction to 0.9 instead of
/// dropping its leading digit" quirk documented (and left unexplained) in
/// the original. Kept verbatim rather than "fixed" — see DESIGN.md.
fn parse_ffprobe_duration(text: &str) -> Result<f64> {
    let re = Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})(\.\d{6})").expect("valid regex");
    let caps = re
        .captures(text)
        .ok_or_else(|| CoreError::NotTimecode { value: text.to_string() })?;

    let hours: f64 = caps[1].parse().unwrap_or(0.0);
    let minutes: f64 = caps[2].parse().unwrap_or(0.0);
    let seconds: f64 = caps[3].parse().unwrap_or(0.0);
    let millis_val: f64 = caps[4].parse().unwrap_or(0.0);

    let rounded = (millis_val * 1000.0).round() / 1000.0;
    let rounded_str = format!("{rounded}");
    let clamped: f64 = if rounded_str.starts_with('1') {
        0.9
    } else {
        rounded_str
            .strip_prefix('0')
            .and_then(|rest| rest.parse().ok())
            .unwrap_or(0.0)
    };

    Ok(hours * 3600.0 + minutes * 60.0 + seconds + clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_thumbnail_and_waveform_names() {
        assert_eq!(thumbnail_file_name("clip.mp4"), "clip_mp4.png");
        assert_eq!(waveform_file_name("take.wav"), "take_wav.dat");
    }

    #[test]
    fn packs_uuid_into_36_byte_header() {
        let id = MediaId::new_v1();
        let header = pack_uuid_header(id);
        assert_eq!(header.len(), 36);
        assert!(std::str::from_utf8(&header).unwrap().starts_with(&id.to_string()));
    }

    #[test]
    fn parses_sexagesimal_duration() {
        let secs = parse_ffprobe_duration("00:01:02.500000").unwrap();
        assert!((secs - 62.5).abs() < 0.01);
    }

    #[test]
    fn rejects_non_timecode_output() {
        assert!(parse_ffprobe_duration("garbage").is_err());
    }
}
