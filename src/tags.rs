use std::path::Path;

use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey};

/// Tag fields the index copies from an audio or video container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaData {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub disc_number: Option<i32>,
    pub track_number: Option<i32>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
    pub bit_rate: Option<i32>,
    pub variable_bit_rate: bool,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub mb_release_id: Option<String>,
    pub mb_recording_id: Option<String>,
}

pub trait TagReader: Send + Sync {
    fn can_parse(&self, path: &Path) -> bool;

    /// Reads whatever the container offers. Unreadable files yield empty metadata.
    fn read(&self, path: &Path) -> MetaData;

    fn has_embedded_image(&self, path: &Path) -> bool;

    fn metadata(&self, path: &Path) -> Option<MetaData> {
        if self.can_parse(path) {
            Some(self.read(path))
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn can_parse(&self, path: &Path) -> bool {
        path.extension().and_then(FileType::from_ext).is_some()
    }

    fn read(&self, path: &Path) -> MetaData {
        let tagged_file = match lofty::read_from_path(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("can't read tags '{}': {}", path.to_string_lossy(), e);
                return MetaData::default();
            }
        };

        let properties = tagged_file.properties();

        let mut meta = MetaData {
            duration: Some(properties.duration().as_secs_f64()),
            bit_rate: properties.audio_bitrate().map(|b| b as i32),
            ..Default::default()
        };

        let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            Some(t) => t,
            None => return meta,
        };

        meta.title = tag.title().map(|s| s.to_string());
        meta.artist = tag.artist().map(|s| s.to_string());
        meta.album = tag.album().map(|s| s.to_string());
        meta.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string());
        meta.genre = tag.genre().map(|s| s.to_string());
        meta.track_number = tag.track().map(|n| n as i32);
        meta.disc_number = tag.disk().map(|n| n as i32);
        meta.year = tag.year().map(|n| n as i32);
        meta.mb_release_id = tag
            .get_string(&ItemKey::MusicBrainzReleaseId)
            .map(|s| s.to_string());
        meta.mb_recording_id = tag
            .get_string(&ItemKey::MusicBrainzRecordingId)
            .map(|s| s.to_string());

        meta
    }

    fn has_embedded_image(&self, path: &Path) -> bool {
        match lofty::read_from_path(path) {
            Ok(f) => f.tags().iter().any(|t| !t.pictures().is_empty()),
            Err(_) => false,
        }
    }
}
