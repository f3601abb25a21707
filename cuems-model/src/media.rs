use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MediaId;

/// Coarse media kind, derived from file extension on ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Audio,
    Image,
}

impl MediaType {
    const MOVIE_EXTENSIONS: &'static [&'static str] = &["mov", "avi", "mkv", "mpg", "mp4"];
    const AUDIO_EXTENSIONS: &'static [&'static str] = &["aif", "aiff", "wav", "mp3"];
    const IMAGE_EXTENSIONS: &'static [&'static str] = &["png", "jpg", "tga"];

    /// Classifies a file by its extension, case-insensitively. Returns
    /// `None` for extensions outside the three recognized families.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if Self::MOVIE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Movie)
        } else if Self::AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn is_movie(self) -> bool {
        matches!(self, Self::Movie)
    }

    pub fn is_image(self) -> bool {
        matches!(self, Self::Image)
    }
}

/// A library media item: an ingested file plus the derivatives and
/// metadata computed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Media {
    pub id: MediaId,
    pub name: String,
    pub unix_name: String,
    pub description: String,
    pub media_type: MediaType,
    /// Seconds; `None` for image media or when duration probing failed.
    pub duration_secs: Option<f64>,
    pub trashed: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
mod sqlx_impls {
    use super::MediaType;

    impl sqlx::Type<sqlx::Sqlite> for MediaType {
        fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
            <String as sqlx::Type<sqlx::Sqlite>>::type_info()
        }
    }

    impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for MediaType {
        fn encode_by_ref(
            &self,
            buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            let s = match self {
                MediaType::Movie => "movie",
                MediaType::Audio => "audio",
                MediaType::Image => "image",
            };
            sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&s.to_string(), buf)
        }
    }

    impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for MediaType {
        fn decode(
            value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
        ) -> Result<Self, sqlx::error::BoxDynError> {
            let raw = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
            match raw.as_str() {
                "movie" => Ok(MediaType::Movie),
                "audio" => Ok(MediaType::Audio),
                "image" => Ok(MediaType::Image),
                other => Err(format!("unknown media_type {other:?}").into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(
            MediaType::from_path(Path::new("clip.MP4")),
            Some(MediaType::Movie)
        );
        assert_eq!(
            MediaType::from_path(Path::new("take.wav")),
            Some(MediaType::Audio)
        );
        assert_eq!(
            MediaType::from_path(Path::new("frame.png")),
            Some(MediaType::Image)
        );
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert_eq!(MediaType::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaType::from_path(Path::new("noextension")), None);
    }
}
