//! Expands a base file and its track list into virtual sub-track records.

use std::collections::HashMap;
use std::fs;

use chrono::Utc;

use crate::classify::{format_of, Policy};
use crate::cue::TrackList;
use crate::folder::MusicFolder;
use crate::media::{self, distant_future, MediaRecord, RecordKind};
use crate::tags::TagReader;

/// Outcome of expanding one base file.
#[derive(Debug)]
pub struct Expansion {
    /// The base record, pointing at its track list, or demoted back to an
    /// ordinary file when the list was unusable.
    pub base: MediaRecord,
    /// Sub-tracks in track list order.
    pub tracks: Vec<MediaRecord>,
    /// Sub-tracks from `tracks` that must be written.
    pub writes: Vec<MediaRecord>,
    /// Stored sub-tracks whose duration changed. They are removed and replaced
    /// by fresh rows.
    pub replaced: Vec<MediaRecord>,
    /// Stored sub-tracks without a counterpart in the track list.
    pub obsolete: Vec<MediaRecord>,
}

impl Expansion {
    pub fn is_indexed(&self) -> bool {
        self.base.has_index()
    }

    /// Sub-tracks followed by the base.
    pub fn into_records(self) -> Vec<MediaRecord> {
        let mut records = self.tracks;
        records.push(self.base);
        records
    }
}

pub struct CueIndexer<'a> {
    tags: &'a dyn TagReader,
    policy: &'a Policy,
}

impl<'a> CueIndexer<'a> {
    pub fn new(tags: &'a dyn TagReader, policy: &'a Policy) -> CueIndexer<'a> {
        CueIndexer { tags, policy }
    }

    /// Builds the sub-tracks of `base` from `track_list`.
    ///
    /// `stored` holds the sub-tracks previously persisted for the base path.
    /// Present sub-tracks are rewritten only when `base_stale` is set; a
    /// sub-track whose duration changed is always replaced.
    pub fn expand(
        &self,
        mut base: MediaRecord,
        folder: &MusicFolder,
        index_path: &str,
        track_list: Option<&TrackList>,
        stored: Vec<MediaRecord>,
        base_stale: bool,
    ) -> Expansion {
        let track_list = match track_list {
            Some(t) if !t.entries.is_empty() => t,
            _ => {
                debug!("no usable track list for '{}'", base.path);
                return abandon(base, stored);
            }
        };

        let audio_file = base.full_path(&folder.path);

        let file_size = match fs::metadata(&audio_file) {
            Ok(m) => m.len() as i64,
            Err(e) => {
                warn!("can't stat '{}': {}", audio_file.to_string_lossy(), e);
                return abandon(base, stored);
            }
        };

        let last_modified = match media::last_modified(&audio_file) {
            Ok(t) => t,
            Err(e) => {
                warn!("can't stat '{}': {}", audio_file.to_string_lossy(), e);
                return abandon(base, stored);
            }
        };

        let meta = self.tags.metadata(&audio_file).unwrap_or_default();
        let whole_duration = meta.duration.unwrap_or(0.0);

        let starts: Vec<f64> = track_list
            .entries
            .iter()
            .map(|e| e.start.as_seconds())
            .collect();

        let last_start = starts.last().copied().unwrap_or(0.0);
        if last_start >= whole_duration {
            warn!(
                "track list '{}' starts a track at {:.3}s, past the end of '{}' ({:.3}s)",
                index_path,
                last_start,
                base.path,
                whole_duration
            );
            return abandon(base, stored);
        }

        let mut stored: HashMap<u64, MediaRecord> = stored
            .into_iter()
            .map(|r| (r.start_offset().to_bits(), r))
            .collect();

        let now = Utc::now();
        let format = format_of(&audio_file);
        let media_type = self.policy.classify(&base, folder);
        let count = starts.len() as i64;

        let mut tracks = Vec::with_capacity(starts.len());
        let mut writes = Vec::new();
        let mut replaced = Vec::new();

        for (i, entry) in track_list.entries.iter().enumerate() {
            let start = starts[i];
            let end = starts.get(i + 1).copied().unwrap_or(whole_duration);
            let duration = end - start;

            let existing = match stored.remove(&start.to_bits()) {
                Some(prior) if same_duration(prior.duration, duration) => Some(prior),
                Some(prior) => {
                    debug!(
                        "track at {:.3}s of '{}' changed length, replacing",
                        start, base.path
                    );
                    replaced.push(prior);
                    None
                }
                None => None,
            };

            if let Some(prior) = &existing {
                if prior.present && !base_stale {
                    tracks.push(prior.clone());
                    continue;
                }
            }

            let mut track = match existing {
                Some(prior) => prior,
                None => {
                    let mut t = MediaRecord::new(&base.path, folder.id);
                    t.created = last_modified;
                    t
                }
            };

            track.kind = RecordKind::IndexedSubtrack { start };
            track.folder_id = folder.id;
            track.parent_path = base.parent_path.clone();
            track.media_type = media_type;
            track.format = format.clone();

            track.album = track_list.title.clone();
            track.album_artist = track_list.performer.clone();
            track.title = entry.title.clone();
            track.artist = entry
                .performer
                .clone()
                .or_else(|| track_list.performer.clone());
            track.track_number = Some(entry.number);

            track.disc_number = meta.disc_number;
            track.genre = meta.genre.clone();
            track.year = meta.year;
            track.bit_rate = meta.bit_rate;
            track.variable_bit_rate = meta.variable_bit_rate;
            track.width = meta.width;
            track.height = meta.height;

            track.duration = Some(duration);
            track.file_size = Some(estimate_size(duration, whole_duration, file_size, count));

            track.changed = last_modified;
            track.last_scanned = now;
            track.children_last_updated = distant_future(now);
            track.present = true;

            tracks.push(track.clone());
            writes.push(track);
        }

        let index_modified = media::last_modified(&folder.path.join(index_path))
            .unwrap_or(last_modified);

        base.set_index_path(Some(index_path.to_string()));
        base.changed = last_modified.max(index_modified);
        base.last_scanned = now;

        Expansion {
            base,
            tracks,
            writes,
            replaced,
            obsolete: stored.into_values().collect(),
        }
    }
}

fn abandon(mut base: MediaRecord, stored: Vec<MediaRecord>) -> Expansion {
    base.set_index_path(None);

    Expansion {
        base,
        tracks: Vec::new(),
        writes: Vec::new(),
        replaced: Vec::new(),
        obsolete: stored,
    }
}

fn same_duration(stored: Option<f64>, duration: f64) -> bool {
    stored.map_or(false, |d| (d - duration).abs() < 1e-6)
}

/// Share of the container's bytes attributed to a track of `duration` seconds.
fn estimate_size(duration: f64, whole_duration: f64, file_size: i64, count: i64) -> i64 {
    let estimate = (duration / whole_duration * file_size as f64) as i64;

    if (0..=file_size).contains(&estimate) {
        estimate
    } else {
        file_size / count.max(1)
    }
}
