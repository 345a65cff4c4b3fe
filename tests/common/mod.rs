#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use parking_lot::Mutex;

use mediaindex::cache::LookupCache;
use mediaindex::folder::{FolderType, MusicFolder, StaticCatalog};
use mediaindex::media::{MediaRecord, RecordKey, NOT_INDEXED};
use mediaindex::settings::Settings;
use mediaindex::store::{RecordStore, SqliteStore};
use mediaindex::tags::{MetaData, TagReader};
use mediaindex::MediaFileService;

/// Base mtime for every fixture file, in seconds since the epoch.
pub const T0: i64 = 1_600_000_000;

/// Tag reader answering from a table keyed by file name.
#[derive(Default)]
pub struct ScriptedTags {
    durations: Mutex<HashMap<String, f64>>,
}

impl ScriptedTags {
    pub fn set_duration(&self, name: &str, seconds: f64) {
        self.durations.lock().insert(name.to_string(), seconds);
    }
}

impl TagReader for ScriptedTags {
    fn can_parse(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e == "flac" || e == "mp3",
            None => false,
        }
    }

    fn read(&self, path: &Path) -> MetaData {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        MetaData {
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            artist: Some("Artist".into()),
            album: Some("Album".into()),
            duration: self.durations.lock().get(&name).copied(),
            ..Default::default()
        }
    }

    fn has_embedded_image(&self, _path: &Path) -> bool {
        false
    }
}

pub struct Library {
    pub dir: tempfile::TempDir,
    pub folder: MusicFolder,
    pub tags: Arc<ScriptedTags>,
    pub store: Arc<SqliteStore>,
    pub service: MediaFileService,
}

pub fn library() -> Library {
    let mut settings = Settings::default();
    settings.memory_cache_enabled = false;
    settings.scan_threads = 2;
    library_with(settings, FolderType::Media)
}

pub fn library_with(settings: Settings, folder_type: FolderType) -> Library {
    library_with_nested(settings, folder_type, &[])
}

/// Library whose root also holds the folders in `nested`, numbered from 2 on.
pub fn library_with_nested(
    settings: Settings,
    folder_type: FolderType,
    nested: &[(&str, FolderType)],
) -> Library {
    let dir = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    let folder = MusicFolder::new(1, "Music", &root, folder_type);

    let mut roots = vec![folder.clone()];
    for (i, (name, nested_type)) in nested.iter().enumerate() {
        roots.push(MusicFolder::new(i as i64 + 2, name, &root.join(name), *nested_type));
    }

    let tags = Arc::new(ScriptedTags::default());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cache = Arc::new(LookupCache::new(settings.memory_cache_enabled));

    let service = MediaFileService::new(
        store.clone(),
        tags.clone(),
        Arc::new(StaticCatalog::new(roots)),
        cache,
        settings,
    )
    .unwrap();

    Library {
        dir,
        folder,
        tags,
        store,
        service,
    }
}

impl Library {
    pub fn path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.folder.path.clone()
        } else {
            self.folder.path.join(relative)
        }
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).unwrap();
    }

    /// Pins the mtime of `relative` to `T0 + offset` seconds.
    pub fn touch(&self, relative: &str, offset: i64) {
        filetime::set_file_mtime(self.path(relative), FileTime::from_unix_time(T0 + offset, 0))
            .unwrap();
    }

    pub fn get(&self, relative: &str) -> Option<MediaRecord> {
        self.service.media_file(&self.path(relative)).unwrap()
    }

    pub fn children(&self, relative: &str) -> Vec<MediaRecord> {
        let dir = self.get(relative).unwrap();
        self.service.children_of(&dir, true, true, true).unwrap()
    }

    pub fn visible(&self, relative: &str) -> Vec<MediaRecord> {
        let dir = self.get(relative).unwrap();
        self.service.visible_children_of(&dir, true, true).unwrap()
    }

    pub fn stored(&self, relative: &str, start: f64) -> Option<MediaRecord> {
        self.store
            .find_by_key(&RecordKey::new(relative, self.folder.id, start))
            .unwrap()
    }

    pub fn stored_file(&self, relative: &str) -> Option<MediaRecord> {
        self.stored(relative, NOT_INDEXED)
    }
}

pub const LIVE_CUE: &str = "PERFORMER \"Band\"
TITLE \"Live\"
FILE \"live.flac\" WAVE
  TRACK 01 AUDIO
    TITLE \"One\"
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    TITLE \"Two\"
    INDEX 01 02:00:00
  TRACK 03 AUDIO
    TITLE \"Three\"
    INDEX 01 04:00:00
";

/// Writes `Live/live.flac` with `duration` seconds and a cue sheet, all at `T0`.
pub fn live_album(lib: &Library, cue: &str, duration: f64) {
    lib.tags.set_duration("live.flac", duration);
    lib.write("Live/live.flac", &[0u8; 3000]);
    lib.write("Live/live.cue", cue.as_bytes());
    lib.touch("Live/live.flac", 0);
    lib.touch("Live/live.cue", 0);
    lib.touch("Live", 0);
    lib.touch("", 0);
}
