use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use serde::Serialize;

/// Start offset stored for everything that is not a virtual sub-track.
pub const NOT_INDEXED: f64 = -1.0;

/// Version stamped on every record written by this engine. Records carrying an
/// older version are always refreshed.
pub const ENGINE_VERSION: i32 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Directory,
    Album,
    Music,
    Podcast,
    Audiobook,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Directory => "DIRECTORY",
            MediaType::Album => "ALBUM",
            MediaType::Music => "MUSIC",
            MediaType::Podcast => "PODCAST",
            MediaType::Audiobook => "AUDIOBOOK",
            MediaType::Video => "VIDEO",
        }
    }

    pub fn from_str(v: &str) -> Option<MediaType> {
        match v {
            "DIRECTORY" => Some(MediaType::Directory),
            "ALBUM" => Some(MediaType::Album),
            "MUSIC" => Some(MediaType::Music),
            "PODCAST" => Some(MediaType::Podcast),
            "AUDIOBOOK" => Some(MediaType::Audiobook),
            "VIDEO" => Some(MediaType::Video),
            _ => None,
        }
    }

    pub fn is_directory(self) -> bool {
        self == MediaType::Directory || self == MediaType::Album
    }
}

/// What a record stands for. The store keeps the flat `(start_position,
/// index_path)` columns; this is how the engine reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    Directory,
    PlainFile,
    /// A container file whose content is split by the track list at `index_path`.
    BaseIndexedFile { index_path: String },
    /// A virtual track inside its base file, identified by its start offset.
    IndexedSubtrack { start: f64 },
}

impl RecordKind {
    pub fn from_columns(media_type: MediaType, start: f64, index_path: Option<String>) -> RecordKind {
        if start > NOT_INDEXED {
            RecordKind::IndexedSubtrack { start }
        } else if let Some(index_path) = index_path {
            RecordKind::BaseIndexedFile { index_path }
        } else if media_type.is_directory() {
            RecordKind::Directory
        } else {
            RecordKind::PlainFile
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: Option<i64>,
    pub path: String,
    pub folder_id: i64,
    #[serde(flatten)]
    pub kind: RecordKind,
    pub media_type: MediaType,
    pub format: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub disc_number: Option<i32>,
    pub track_number: Option<i32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub bit_rate: Option<i32>,
    pub variable_bit_rate: bool,
    pub duration: Option<f64>,
    pub file_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub parent_path: Option<String>,
    pub cover_art_path: Option<String>,
    pub play_count: i32,
    pub last_played: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
    pub children_last_updated: DateTime<Utc>,
    pub present: bool,
    pub version: i32,
    pub mb_release_id: Option<String>,
    pub mb_recording_id: Option<String>,
}

impl MediaRecord {
    /// An empty, not yet persisted record for `path` in `folder_id`.
    pub fn new(path: &str, folder_id: i64) -> MediaRecord {
        let distant_past = distant_past();

        MediaRecord {
            id: None,
            path: path.to_string(),
            folder_id,
            kind: RecordKind::PlainFile,
            media_type: MediaType::Music,
            format: None,
            title: None,
            album: None,
            artist: None,
            album_artist: None,
            disc_number: None,
            track_number: None,
            year: None,
            genre: None,
            bit_rate: None,
            variable_bit_rate: false,
            duration: None,
            file_size: None,
            width: None,
            height: None,
            parent_path: None,
            cover_art_path: None,
            play_count: 0,
            last_played: None,
            comment: None,
            created: distant_past,
            changed: distant_past,
            last_scanned: distant_past,
            children_last_updated: distant_past,
            present: true,
            version: ENGINE_VERSION,
            mb_release_id: None,
            mb_recording_id: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.path, self.folder_id, self.start_offset())
    }

    pub fn start_offset(&self) -> f64 {
        match self.kind {
            RecordKind::IndexedSubtrack { start } => start,
            _ => NOT_INDEXED,
        }
    }

    pub fn index_path(&self) -> Option<&str> {
        match &self.kind {
            RecordKind::BaseIndexedFile { index_path } => Some(index_path),
            _ => None,
        }
    }

    /// Points the record at a track list, or demotes it back to an ordinary
    /// file when `index_path` is `None`. Sub-tracks and directories are left alone.
    pub fn set_index_path(&mut self, index_path: Option<String>) {
        match (&self.kind, index_path) {
            (RecordKind::PlainFile, Some(index_path))
            | (RecordKind::BaseIndexedFile { .. }, Some(index_path)) => {
                self.kind = RecordKind::BaseIndexedFile { index_path };
            }
            (RecordKind::BaseIndexedFile { .. }, None) => {
                self.kind = RecordKind::PlainFile;
            }
            _ => {}
        }
    }

    pub fn has_index(&self) -> bool {
        matches!(self.kind, RecordKind::BaseIndexedFile { .. })
    }

    pub fn is_indexed_track(&self) -> bool {
        matches!(self.kind, RecordKind::IndexedSubtrack { .. })
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, RecordKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    pub fn relative_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn name(&self) -> String {
        self.relative_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn full_path(&self, root: &Path) -> PathBuf {
        if self.path.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.path)
        }
    }

    pub fn full_index_path(&self, root: &Path) -> Option<PathBuf> {
        self.index_path().map(|p| root.join(p))
    }
}

/// Natural identity of a record: `(path, folder_id, start_offset)`.
#[derive(Debug, Clone)]
pub struct RecordKey {
    pub path: String,
    pub folder_id: i64,
    pub start: f64,
}

impl RecordKey {
    pub fn new(path: &str, folder_id: i64, start: f64) -> RecordKey {
        RecordKey {
            path: path.to_string(),
            folder_id,
            start,
        }
    }
}

impl PartialEq for RecordKey {
    fn eq(&self, other: &RecordKey) -> bool {
        self.path == other.path
            && self.folder_id == other.folder_id
            && self.start.to_bits() == other.start.to_bits()
    }
}

impl Eq for RecordKey {}

impl Hash for RecordKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.folder_id.hash(state);
        self.start.to_bits().hash(state);
    }
}

/// One millisecond after the epoch. Marks "children never reconciled".
pub fn distant_past() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1).single().unwrap_or_default()
}

/// Children-last-updated stamp for sub-tracks, which never have children.
pub fn distant_future(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(100 * 365)
}

pub fn truncate_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

/// Modification time of `path`, truncated to what the store can hold.
pub fn last_modified(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(truncate_micros(DateTime::<Utc>::from(modified)))
}
