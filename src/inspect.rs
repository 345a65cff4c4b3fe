//! Builds and refreshes single records from what is on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::classify::format_of;
use crate::cover::CoverLocator;
use crate::folder::MusicFolder;
use crate::media::{self, distant_past, MediaRecord, MediaType, RecordKind};
use crate::service::MediaFileService;
use crate::tags::MetaData;

/// Parent path of a relative record path: `None` for the folder root, `""`
/// for its immediate entries.
pub fn parent_path_of(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }

    Some(
        Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )
}

impl MediaFileService {
    /// Record for an entry not yet in the store, or `None` when it does not exist.
    pub(crate) fn create_by_file(&self, path: &str, folder: &MusicFolder) -> Option<MediaRecord> {
        let record = self.update_by_file(MediaRecord::new(path, folder.id), folder);
        if record.present {
            Some(record)
        } else {
            None
        }
    }

    /// Re-reads everything the disk says about `record`. The result is not
    /// persisted. A vanished entry comes back flagged as not present.
    pub(crate) fn update_by_file(&self, mut record: MediaRecord, folder: &MusicFolder) -> MediaRecord {
        let file = record.full_path(&folder.path);

        let metadata = match fs::metadata(&file) {
            Ok(m) => m,
            Err(_) => {
                debug!("'{}' is gone", file.to_string_lossy());
                record.present = false;
                record.children_last_updated = distant_past();
                return record;
            }
        };

        match self.folders.folder_for_path(&file) {
            Some(owner) if owner.id != folder.id => warn!(
                "'{}' belongs to folder {} but was reached through folder {}",
                file.to_string_lossy(),
                owner.id,
                folder.id
            ),
            _ => {}
        }

        let now = Utc::now();
        let last_modified = metadata
            .modified()
            .map(|t| media::truncate_micros(t.into()))
            .unwrap_or(now);

        record.folder_id = folder.id;
        record.parent_path = parent_path_of(&record.path);
        if record.id.is_none() {
            record.created = last_modified;
        }
        record.changed = last_modified;
        record.last_scanned = now;
        record.children_last_updated = distant_past();
        record.present = true;

        if metadata.is_file() {
            if let Some(meta) = self.tags.metadata(&file) {
                apply_metadata(&mut record, meta);
            }

            if record.is_directory() {
                record.kind = RecordKind::PlainFile;
            }
            record.format = format_of(&file);
            record.file_size = Some(metadata.len() as i64);
            record.media_type = self.policy.classify(&record, folder);
        } else {
            record.kind = RecordKind::Directory;
            record.media_type = MediaType::Directory;
            record.format = None;
            record.file_size = None;

            if record.path.is_empty() {
                record.title = Some(folder.name.clone());
            } else {
                self.inspect_directory(&mut record, &file, folder);
            }
        }

        record
    }

    /// Promotes a directory holding playable files to an album, taking its
    /// descriptive fields from the first of them.
    fn inspect_directory(&self, record: &mut MediaRecord, dir: &Path, folder: &MusicFolder) {
        let entries = match list_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("can't list '{}': {}", dir.to_string_lossy(), e);
                record.artist = Some(record.name());
                return;
            }
        };

        let first = entries
            .iter()
            .find(|p| p.is_file() && self.policy.includes(p));

        let first = match first {
            Some(f) => f,
            None => {
                record.artist = Some(record.name());
                return;
            }
        };

        record.media_type = MediaType::Album;

        if let Some(meta) = self.tags.metadata(first) {
            record.artist = meta.album_artist.or(meta.artist);
            record.album_artist = record.artist.clone();
            record.album = meta.album;
            record.year = meta.year;
            record.genre = meta.genre;
        }

        let locator = CoverLocator::new(
            self.settings.cover_art_source,
            &self.cover_types,
            self.tags.as_ref(),
        );
        record.cover_art_path = locator
            .locate(&entries)
            .and_then(|cover| folder.relativize(&cover));
    }
}

fn apply_metadata(record: &mut MediaRecord, meta: MetaData) {
    record.title = meta.title;
    record.album = meta.album;
    record.artist = meta.artist;
    record.album_artist = meta.album_artist;
    record.disc_number = meta.disc_number;
    record.track_number = meta.track_number;
    record.genre = meta.genre;
    record.year = meta.year;
    record.duration = meta.duration;
    record.bit_rate = meta.bit_rate;
    record.variable_bit_rate = meta.variable_bit_rate;
    record.width = meta.width;
    record.height = meta.height;
    record.mb_release_id = meta.mb_release_id;
    record.mb_recording_id = meta.mb_recording_id;
}

/// Entries of `dir`, sorted by name.
pub(crate) fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_paths() {
        assert_eq!(parent_path_of(""), None);
        assert_eq!(parent_path_of("Album").as_deref(), Some(""));
        assert_eq!(parent_path_of("Artist/Album/01.flac").as_deref(), Some("Artist/Album"));
    }
}
