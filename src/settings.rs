use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How eagerly stored records are checked against the disk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// Trust the store, never stat files.
    MinimizeDiskAccess,
    /// Compare timestamps and refresh what drifted.
    Normal,
    /// Refresh every record touched, regardless of timestamps.
    Full,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoverArtSource {
    File,
    Tag,
    Filetag,
    Tagfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fast_cache_enabled: bool,
    pub full_scan: bool,
    pub enable_cue_indexing: bool,
    pub hide_indexed_files: bool,
    pub music_file_types: String,
    pub video_file_types: String,
    pub cover_art_file_types: String,
    pub cover_art_source: CoverArtSource,
    pub ignore_symlinks: bool,
    pub exclude_pattern: Option<String>,
    pub memory_cache_enabled: bool,
    pub scan_threads: usize,
    pub sort_albums_by_year: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            fast_cache_enabled: false,
            full_scan: false,
            enable_cue_indexing: true,
            hide_indexed_files: true,
            music_file_types: "mp3 ogg oga aac m4a m4b flac wav wma aif aiff aifc ape mpc shn mka opus wv"
                .to_string(),
            video_file_types: "flv avi mpg mpeg mp4 m4v mkv mov wmv ogv divx m2ts webm".to_string(),
            cover_art_file_types: "cover.jpg cover.png cover.gif folder.jpg jpg jpeg gif png"
                .to_string(),
            cover_art_source: CoverArtSource::Filetag,
            ignore_symlinks: false,
            exclude_pattern: None,
            memory_cache_enabled: true,
            scan_threads: 0,
            sort_albums_by_year: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings> {
        info!("loading settings from '{}'", path.to_string_lossy());

        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn scan_mode(&self) -> ScanMode {
        if self.fast_cache_enabled {
            ScanMode::MinimizeDiskAccess
        } else if self.full_scan {
            ScanMode::Full
        } else {
            ScanMode::Normal
        }
    }

    /// Hiding base files only makes sense while their sub-tracks are shown.
    pub fn hide_indexed_files(&self) -> bool {
        self.enable_cue_indexing && self.hide_indexed_files
    }
}

/// Splits a space separated type list into lower-cased entries, keeping order.
pub fn split_types(types: &str) -> Vec<String> {
    types
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "fast_cache_enabled": true, "cover_art_source": "TAG" }"#)
                .unwrap();

        assert_eq!(settings.scan_mode(), ScanMode::MinimizeDiskAccess);
        assert_eq!(settings.cover_art_source, CoverArtSource::Tag);
        assert!(settings.enable_cue_indexing);
        assert!(settings.music_file_types.contains("flac"));
    }

    #[test]
    fn hide_indexed_requires_cue_indexing() {
        let mut settings = Settings::default();
        settings.enable_cue_indexing = false;
        settings.hide_indexed_files = true;
        assert!(!settings.hide_indexed_files());
    }

    #[test]
    fn split_types_lowercases() {
        assert_eq!(split_types(" MP3  Flac "), vec!["mp3", "flac"]);
    }
}
