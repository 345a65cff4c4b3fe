//! Brings the stored children of one directory in line with the disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::cue::{self, TrackList};
use crate::error::Result;
use crate::folder::MusicFolder;
use crate::freshness;
use crate::indexer::CueIndexer;
use crate::inspect::list_dir;
use crate::media::{MediaRecord, RecordKey, NOT_INDEXED};
use crate::service::MediaFileService;
use crate::settings::ScanMode;
use crate::store::CommitBatch;

/// A directory entry after the parallel refresh stage.
struct Candidate {
    name: String,
    prior: Option<MediaRecord>,
    record: MediaRecord,
}

impl Candidate {
    fn dirty(&self) -> bool {
        self.prior.as_ref() != Some(&self.record)
    }
}

#[derive(Debug, Default)]
struct ReconcileStat {
    written: usize,
    removed: usize,
    replaced: usize,
    tracks: usize,
}

impl MediaFileService {
    /// Reconciles the children of `dir` with the directory listing.
    ///
    /// Returns `None` when the stored children are known to be current, or the
    /// directory can't be listed. Otherwise every write of the pass is
    /// committed at once and the present children are returned. `dir` comes
    /// back with its reconciliation stamp set.
    pub(crate) fn reconcile(
        &self,
        dir: &mut MediaRecord,
        folder: &MusicFolder,
        mode: ScanMode,
    ) -> Result<Option<Vec<MediaRecord>>> {
        if !dir.is_directory() {
            return Ok(None);
        }

        if dir.children_last_updated >= dir.changed {
            trace!("children of '{}' are current", dir.path);
            return Ok(None);
        }

        let fs_path = dir.full_path(&folder.path);
        debug!("directory '{}'", fs_path.to_string_lossy());

        let start_instant = Instant::now();

        let entries = match list_dir(&fs_path) {
            Ok(e) => e,
            Err(e) => {
                warn!("can't list '{}': {}", fs_path.to_string_lossy(), e);
                return Ok(None);
            }
        };

        // Everything stored under the directory is removed unless the listing
        // accounts for it.
        let mut removal: HashMap<RecordKey, MediaRecord> = self
            .store
            .children(folder.id, &dir.path, false)?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        let included: Vec<&PathBuf> = entries
            .iter()
            .filter(|p| self.policy.includes(p))
            .filter(|p| self.owned_by(p, folder))
            .collect();

        // Existing children are refreshed in normal mode at least, whatever the
        // configured scan mode.
        let refresh_mode = if mode == ScanMode::Full {
            ScanMode::Full
        } else {
            ScanMode::Normal
        };

        let candidates: Vec<Candidate> = self.pool.install(|| {
            included
                .par_iter()
                .filter_map(|p| self.candidate(p, folder, &removal, refresh_mode))
                .collect()
        });

        let track_lists = if self.settings.enable_cue_indexing {
            self.read_track_lists(&entries, folder)
        } else {
            Vec::new()
        };

        let mut stat = ReconcileStat::default();
        let mut batch = CommitBatch::default();
        let mut bare: HashMap<String, Candidate> = HashMap::new();

        for candidate in candidates {
            removal.remove(&candidate.record.key());
            bare.insert(candidate.name.clone(), candidate);
        }

        let indexer = CueIndexer::new(self.tags.as_ref(), &self.policy);
        let mut claimed: HashSet<String> = HashSet::new();

        for (index_path, track_list) in track_lists {
            let name = file_name(Path::new(&track_list.file));

            let candidate = match bare.remove(&name) {
                Some(c) if c.record.is_file() => c,
                Some(c) => {
                    bare.insert(name, c);
                    continue;
                }
                None if claimed.contains(&name) => {
                    debug!(
                        "'{}' is already split by another track list, skipping '{}'",
                        name, index_path
                    );
                    continue;
                }
                None => {
                    warn!(
                        "track list '{}' references '{}', which is not indexed here",
                        index_path, track_list.file
                    );
                    continue;
                }
            };

            let base_stale = match &candidate.prior {
                Some(prior) => {
                    let mut prior = prior.clone();
                    prior.set_index_path(Some(index_path.clone()));
                    !prior.present || freshness::check(&prior, &folder.path, refresh_mode)
                }
                None => true,
            };

            let stored: Vec<MediaRecord> = removal
                .values()
                .filter(|r| r.is_indexed_track() && r.path == candidate.record.path)
                .cloned()
                .collect();

            let expansion = indexer.expand(
                candidate.record,
                folder,
                &index_path,
                Some(&track_list),
                stored,
                base_stale,
            );

            if !expansion.is_indexed() {
                bare.insert(
                    name.clone(),
                    Candidate {
                        name,
                        prior: candidate.prior,
                        record: expansion.base,
                    },
                );
                continue;
            }

            for track in &expansion.tracks {
                removal.remove(&track.key());
            }
            claimed.insert(name);

            stat.tracks += expansion.tracks.len();
            stat.replaced += expansion.replaced.len();

            batch.purge.extend(expansion.replaced);
            batch.upserts.extend(expansion.writes);
            batch.upserts.push(expansion.base);
        }

        for (_, mut candidate) in bare {
            // The track list this file pointed at is gone or no longer usable.
            if candidate.record.has_index() {
                candidate.record.set_index_path(None);
            }

            if candidate.dirty() {
                batch.upserts.push(candidate.record);
            }
        }

        batch.missing = removal.into_values().filter(|r| r.present).collect();

        stat.written = batch.upserts.len();
        stat.removed = batch.missing.len();

        // Stamp the stored row, not the caller's copy, which may predate a
        // play count or other write.
        let mut stamped = self.store.find_by_key(&dir.key())?.unwrap_or_else(|| dir.clone());
        stamped.children_last_updated = dir.changed;
        stamped.present = true;
        batch.upserts.push(stamped);

        self.commit(&mut batch)?;

        if let Some(stored_dir) = batch.upserts.last() {
            *dir = stored_dir.clone();
        }

        let children = self.store.children(folder.id, &dir.path, true)?;

        debug!(
            "reconciled '{}' in {}ms: {:?}",
            dir.path,
            start_instant.elapsed().as_millis(),
            stat
        );

        Ok(Some(children))
    }

    /// Whether the catalog agrees that `path` lies in `folder`. Nested roots
    /// own their own subtrees.
    fn owned_by(&self, path: &Path, folder: &MusicFolder) -> bool {
        match self.folders.folder_for_path(path) {
            Some(owner) => owner.id == folder.id,
            None => false,
        }
    }

    fn candidate(
        &self,
        path: &Path,
        folder: &MusicFolder,
        stored: &HashMap<RecordKey, MediaRecord>,
        mode: ScanMode,
    ) -> Option<Candidate> {
        let relative = folder.relativize(path)?;
        let name = file_name(path);
        let key = RecordKey::new(&relative, folder.id, NOT_INDEXED);

        match stored.get(&key) {
            Some(prior) => {
                let record = if !prior.present || freshness::check(prior, &folder.path, mode) {
                    self.update_by_file(prior.clone(), folder)
                } else {
                    prior.clone()
                };

                Some(Candidate {
                    name,
                    prior: Some(prior.clone()),
                    record,
                })
            }
            None => self.create_by_file(&relative, folder).map(|record| Candidate {
                name,
                prior: None,
                record,
            }),
        }
    }

    /// Track lists found among `entries`, from `.cue` sheets and from `.flac`
    /// files carrying an embedded one, ordered by path.
    fn read_track_lists(&self, entries: &[PathBuf], folder: &MusicFolder) -> Vec<(String, TrackList)> {
        let sources: Vec<&PathBuf> = entries
            .iter()
            .filter(|p| is_track_list_source(p) && !self.policy.is_excluded(p))
            .collect();

        let mut lists: Vec<(String, TrackList)> = self.pool.install(|| {
            sources
                .par_iter()
                .filter_map(|p| {
                    let relative = folder.relativize(p)?;

                    match cue::read_track_list(p) {
                        Ok(Some(list)) => Some((relative, list)),
                        Ok(None) => None,
                        Err(e) => {
                            warn!("ignoring track list '{}': {}", p.to_string_lossy(), e);
                            None
                        }
                    }
                })
                .collect()
        });

        lists.sort_by(|a, b| a.0.cmp(&b.0));
        lists
    }
}

fn is_track_list_source(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.eq_ignore_ascii_case("cue") || e.eq_ignore_ascii_case("flac"),
        None => false,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
