use std::collections::HashSet;
use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::Result;
use crate::folder::{FolderType, MusicFolder};
use crate::media::{MediaRecord, MediaType};
use crate::settings::{split_types, Settings};

/// File type sets and exclusion rules, compiled once from `Settings`.
#[derive(Debug, Clone)]
pub struct Policy {
    music_types: HashSet<String>,
    video_types: HashSet<String>,
    ignore_symlinks: bool,
    exclude: Option<Regex>,
}

impl Policy {
    pub fn new(settings: &Settings) -> Result<Policy> {
        let exclude = match settings.exclude_pattern.as_deref() {
            Some(p) if !p.is_empty() => Some(Regex::new(p)?),
            _ => None,
        };

        Ok(Policy {
            music_types: split_types(&settings.music_file_types).into_iter().collect(),
            video_types: split_types(&settings.video_file_types).into_iter().collect(),
            ignore_symlinks: settings.ignore_symlinks,
            exclude,
        })
    }

    pub fn is_audio(&self, format: &str) -> bool {
        self.music_types.contains(&format.to_lowercase())
    }

    pub fn is_video(&self, format: &str) -> bool {
        self.video_types.contains(&format.to_lowercase())
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.ignore_symlinks
            && fs::symlink_metadata(path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
        {
            info!("excluding symbolic link '{}'", path.to_string_lossy());
            return true;
        }

        match path.file_name() {
            Some(n) => self.is_excluded_name(&n.to_string_lossy()),
            None => false,
        }
    }

    fn is_excluded_name(&self, name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(name) {
                info!("excluding '{}' matching pattern '{}'", name, exclude.as_str());
                return true;
            }
        }

        // Hidden files, and thumbnail artifacts left by NAS boxes and Windows.
        (name.starts_with('.') && !name.starts_with(".."))
            || name.starts_with("@eaDir")
            || name == "Thumbs.db"
    }

    /// Whether `path` should be indexed at all: a directory, or an audio/video file.
    pub fn includes(&self, path: &Path) -> bool {
        if self.is_excluded(path) {
            return false;
        }

        if path.is_dir() {
            return true;
        }

        match format_of(path) {
            Some(f) => self.is_audio(&f) || self.is_video(&f),
            None => false,
        }
    }

    /// Like `includes`, decided from a stored record without touching the disk.
    pub fn includes_record(&self, record: &MediaRecord) -> bool {
        if self.is_excluded_name(&record.name()) {
            return false;
        }

        record.is_directory()
            || record
                .format
                .as_deref()
                .map_or(false, |f| self.is_audio(f) || self.is_video(f))
    }

    pub fn classify(&self, record: &MediaRecord, folder: &MusicFolder) -> MediaType {
        if folder.folder_type == FolderType::Podcast {
            return MediaType::Podcast;
        }

        if record.format.as_deref().map_or(false, |f| self.is_video(f)) {
            return MediaType::Video;
        }

        let path = record.path.to_lowercase();
        let genre = record
            .genre
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if path.contains("podcast")
            || genre.contains("podcast")
            || path.contains("netcast")
            || genre.contains("netcast")
        {
            return MediaType::Podcast;
        }

        if path.contains("audiobook")
            || genre.contains("audiobook")
            || path.contains("audio book")
            || genre.contains("audio book")
            || path.contains("audio/book")
            || path.contains("audio\\book")
        {
            return MediaType::Audiobook;
        }

        MediaType::Music
    }
}

/// Lower-cased extension of `path`, if any.
pub fn format_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn policy() -> Policy {
        Policy::new(&Settings::default()).unwrap()
    }

    fn folder(folder_type: FolderType) -> MusicFolder {
        MusicFolder::new(1, "music", &PathBuf::from("/music"), folder_type)
    }

    fn record(path: &str, genre: Option<&str>) -> MediaRecord {
        let mut r = MediaRecord::new(path, 1);
        r.format = format_of(Path::new(path));
        r.genre = genre.map(|g| g.to_string());
        r
    }

    #[test]
    fn podcast_folder_wins() {
        let p = policy();
        let r = record("videos/clip.mkv", Some("Audiobook"));
        assert_eq!(p.classify(&r, &folder(FolderType::Podcast)), MediaType::Podcast);
    }

    #[test]
    fn video_extension_precedes_text_heuristics() {
        let p = policy();
        let r = record("podcasts/show.mp4", None);
        assert_eq!(p.classify(&r, &folder(FolderType::Media)), MediaType::Video);
    }

    #[test]
    fn text_heuristics() {
        let p = policy();
        let media = folder(FolderType::Media);

        assert_eq!(p.classify(&record("My Podcasts/ep.mp3", None), &media), MediaType::Podcast);
        assert_eq!(p.classify(&record("x/ep.mp3", Some(" NetCast ")), &media), MediaType::Podcast);
        assert_eq!(p.classify(&record("Audio Book/ch1.mp3", None), &media), MediaType::Audiobook);
        assert_eq!(p.classify(&record("audio/book/ch1.mp3", None), &media), MediaType::Audiobook);
        assert_eq!(p.classify(&record("x/ch1.m4b", Some("Audiobook")), &media), MediaType::Audiobook);
        assert_eq!(p.classify(&record("Album/01.flac", Some("Rock")), &media), MediaType::Music);
    }

    #[test]
    fn exclusions() {
        let mut settings = Settings::default();
        settings.exclude_pattern = Some("^skip".to_string());
        let p = Policy::new(&settings).unwrap();

        assert!(p.is_excluded(Path::new("/m/.hidden.mp3")));
        assert!(p.is_excluded(Path::new("/m/@eaDir")));
        assert!(p.is_excluded(Path::new("/m/Thumbs.db")));
        assert!(p.is_excluded(Path::new("/m/skip me.mp3")));
        assert!(!p.is_excluded(Path::new("/m/..odd.mp3")));
        assert!(!p.is_excluded(Path::new("/m/track.mp3")));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let mut settings = Settings::default();
        settings.exclude_pattern = Some("(".to_string());
        assert!(Policy::new(&settings).is_err());
    }

    #[test]
    fn includes_only_media_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy();

        std::fs::write(dir.path().join("a.flac"), b"x").unwrap();
        std::fs::write(dir.path().join("a.cue"), b"x").unwrap();
        std::fs::write(dir.path().join("clip.MKV"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(p.includes(&dir.path().join("a.flac")));
        assert!(p.includes(&dir.path().join("clip.MKV")));
        assert!(p.includes(&dir.path().join("sub")));
        assert!(!p.includes(&dir.path().join("a.cue")));
    }

    #[test]
    fn stored_records_follow_current_rules() {
        let mut settings = Settings::default();
        settings.music_file_types = "mp3".to_string();
        let p = Policy::new(&settings).unwrap();

        assert!(p.includes_record(&record("a/01.mp3", None)));
        assert!(!p.includes_record(&record("a/01.flac", None)));
        assert!(!p.includes_record(&record("a/.01.mp3", None)));
    }
}
