//! Lookup and maintenance API over the media index.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;

use crate::cache::LookupCache;
use crate::classify::Policy;
use crate::cue;
use crate::error::{Error, Result};
use crate::folder::{FolderCatalog, MusicFolder};
use crate::freshness;
use crate::indexer::CueIndexer;
use crate::media::{distant_past, MediaRecord, RecordKey, NOT_INDEXED};
use crate::settings::{split_types, ScanMode, Settings};
use crate::store::{CommitBatch, RecordStore};
use crate::tags::TagReader;

pub struct MediaFileService {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) tags: Arc<dyn TagReader>,
    pub(crate) folders: Arc<dyn FolderCatalog>,
    pub(crate) cache: Arc<LookupCache>,
    pub(crate) settings: Settings,
    pub(crate) policy: Policy,
    pub(crate) cover_types: Vec<String>,
    pub(crate) pool: rayon::ThreadPool,
}

impl MediaFileService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        tags: Arc<dyn TagReader>,
        folders: Arc<dyn FolderCatalog>,
        cache: Arc<LookupCache>,
        settings: Settings,
    ) -> Result<MediaFileService> {
        let policy = Policy::new(&settings)?;
        let cover_types = split_types(&settings.cover_art_file_types);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.scan_threads)
            .thread_name(|i| format!("mediaindex-scan-{}", i))
            .build()
            .map_err(|e| Error::OtherError(format!("can't start scan threads: {}", e)))?;

        debug!(
            "media file service with {} scan threads, {:?}",
            pool.current_num_threads(),
            settings.scan_mode()
        );

        Ok(MediaFileService {
            store,
            tags,
            folders,
            cache,
            settings,
            policy,
            cover_types,
            pool,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.settings.scan_mode()
    }

    /// Looks up the record for an absolute path inside one of the folders.
    pub fn media_file(&self, full_path: &Path) -> Result<Option<MediaRecord>> {
        let folder = match self.folders.folder_for_path(full_path) {
            Some(f) => f,
            None => {
                debug!("'{}' is outside every folder", full_path.to_string_lossy());
                return Ok(None);
            }
        };

        let path = match folder.relativize(full_path) {
            Some(p) => p,
            None => return Ok(None),
        };

        self.media_file_at(&path, &folder, NOT_INDEXED, self.scan_mode())
    }

    /// Looks up a record by natural key, refreshing it from disk as `mode`
    /// allows and creating it when the entry exists but was never seen.
    pub fn media_file_at(
        &self,
        path: &str,
        folder: &MusicFolder,
        start: f64,
        mode: ScanMode,
    ) -> Result<Option<MediaRecord>> {
        let key = RecordKey::new(path, folder.id, start);
        let generation = self.cache.generation();

        if let Some(record) = self.cache.get_by_key(&key) {
            trace!("cache hit '{}' at {}", path, start);
            return Ok(Some(record));
        }

        let (record, wrote) = match self.store.find_by_key(&key)? {
            Some(stored) => {
                let record = self.check_last_modified(stored.clone(), folder, mode)?;
                let wrote = record != stored;
                (record, wrote)
            }
            None => {
                if start > NOT_INDEXED {
                    return Ok(None);
                }

                let mut record = match self.create_by_file(path, folder) {
                    Some(r) => r,
                    None => return Ok(None),
                };
                self.update_media_file(&mut record)?;
                (record, true)
            }
        };

        if !record.present {
            return Ok(None);
        }

        // A record this lookup wrote is current as of its own eviction.
        let generation = if wrote { self.cache.generation() } else { generation };
        self.cache.put_by_key(key, &record, generation);
        Ok(Some(record))
    }

    pub fn media_file_by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
        let generation = self.cache.generation();

        if let Some(record) = self.cache.get_by_id(id) {
            trace!("cache hit id={}", id);
            return Ok(Some(record));
        }

        let stored = match self.store.find_by_id(id)? {
            Some(r) => r,
            None => return Ok(None),
        };

        let folder = match self.folders.folder_by_id(stored.folder_id) {
            Some(f) => f,
            None => {
                warn!("record id={} points at unknown folder {}", id, stored.folder_id);
                return Ok(None);
            }
        };

        let record = self.check_last_modified(stored.clone(), &folder, self.scan_mode())?;
        if !record.present {
            return Ok(None);
        }

        let generation = if record != stored {
            self.cache.generation()
        } else {
            generation
        };
        self.cache.put_by_id(&record, generation);
        Ok(Some(record))
    }

    /// Every stored record at `path` in any folder, without touching the disk.
    pub fn media_files_by_relative_path(&self, path: &str) -> Result<Vec<MediaRecord>> {
        self.store.find_by_path_any_folder(path)
    }

    pub fn parent_of(&self, record: &MediaRecord) -> Result<Option<MediaRecord>> {
        let parent_path = match &record.parent_path {
            Some(p) => p,
            None => return Ok(None),
        };

        let folder = match self.folders.folder_by_id(record.folder_id) {
            Some(f) => f,
            None => return Ok(None),
        };

        self.media_file_at(parent_path, &folder, NOT_INDEXED, self.scan_mode())
    }

    pub fn is_root(&self, record: &MediaRecord) -> bool {
        record.path.is_empty() && self.folders.folder_by_id(record.folder_id).is_some()
    }

    pub fn children_of(
        &self,
        parent: &MediaRecord,
        include_files: bool,
        include_directories: bool,
        sort: bool,
    ) -> Result<Vec<MediaRecord>> {
        self.children_of_with_mode(parent, include_files, include_directories, sort, self.scan_mode())
    }

    /// Children of a directory. Unless `mode` forbids disk access, the
    /// directory is reconciled against the disk first.
    pub fn children_of_with_mode(
        &self,
        parent: &MediaRecord,
        include_files: bool,
        include_directories: bool,
        sort: bool,
        mode: ScanMode,
    ) -> Result<Vec<MediaRecord>> {
        if !parent.is_directory() {
            return Ok(Vec::new());
        }

        let folder = match self.folders.folder_by_id(parent.folder_id) {
            Some(f) => f,
            None => return Ok(Vec::new()),
        };

        let reconciled = if mode == ScanMode::MinimizeDiskAccess {
            None
        } else {
            let mut dir = parent.clone();
            self.reconcile(&mut dir, &folder, mode)?
        };

        let children = match reconciled {
            Some(children) => children,
            None => {
                let stored = self.store.children(folder.id, &parent.path, true)?;
                let checked: Result<Vec<MediaRecord>> = self.pool.install(|| {
                    stored
                        .into_par_iter()
                        .map(|r| self.check_last_modified(r, &folder, mode))
                        .collect()
                });

                checked?
                    .into_iter()
                    .filter(|r| r.present && self.policy.includes_record(r))
                    .collect()
            }
        };

        let mut result: Vec<MediaRecord> = children
            .into_iter()
            .filter(|c| (c.is_directory() && include_directories) || (c.is_file() && include_files))
            .collect();

        if sort {
            self.sort(&mut result);
        }

        Ok(result)
    }

    /// Children a client should be shown: hidden base files and, with cue
    /// indexing off, sub-tracks are filtered out.
    pub fn visible_children_of(
        &self,
        parent: &MediaRecord,
        include_directories: bool,
        sort: bool,
    ) -> Result<Vec<MediaRecord>> {
        Ok(self
            .children_of(parent, true, include_directories, sort)?
            .into_iter()
            .filter(|c| self.show_media_file(c))
            .collect())
    }

    pub fn show_media_file(&self, record: &MediaRecord) -> bool {
        if !self.settings.enable_cue_indexing && record.is_indexed_track() {
            return false;
        }

        !(self.settings.hide_indexed_files() && record.has_index())
    }

    /// Every visible file below `ancestor`, depth first in listing order.
    pub fn descendants_of(&self, ancestor: &MediaRecord, sort: bool) -> Result<Vec<MediaRecord>> {
        if ancestor.is_file() {
            return Ok(vec![ancestor.clone()]);
        }

        let mut result = Vec::new();
        let mut stack = vec![self.visible_children_of(ancestor, true, sort)?.into_iter()];

        while let Some(level) = stack.last_mut() {
            match level.next() {
                Some(child) if child.is_directory() => {
                    let children = self.visible_children_of(&child, true, sort)?;
                    stack.push(children.into_iter());
                }
                Some(child) => result.push(child),
                None => {
                    stack.pop();
                }
            }
        }

        Ok(result)
    }

    /// Re-reads `record` from disk and persists it.
    pub fn refresh_media_file(&self, record: MediaRecord, folder: &MusicFolder) -> Result<MediaRecord> {
        let mut record = self.update_by_file(record, folder);
        self.update_media_file(&mut record)?;
        Ok(record)
    }

    /// Persists `record` and drops any cached copy of it.
    pub fn update_media_file(&self, record: &mut MediaRecord) -> Result<()> {
        self.store.upsert(record)?;
        self.cache.evict(record);
        Ok(())
    }

    /// Counts a play of `record` and of its directory, unless that is a folder root.
    pub fn increment_play_count(&self, record: &mut MediaRecord) -> Result<()> {
        let now = Utc::now();

        record.last_played = Some(now);
        record.play_count += 1;
        self.update_media_file(record)?;

        if let Some(mut parent) = self.parent_of(record)? {
            if !self.is_root(&parent) {
                parent.last_played = Some(now);
                parent.play_count += 1;
                self.update_media_file(&mut parent)?;
            }
        }

        Ok(())
    }

    pub fn set_memory_cache_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Physically removes every record flagged as not present.
    pub fn expunge(&self) -> Result<usize> {
        let n = self.store.expunge()?;
        info!("expunged {} records", n);
        Ok(n)
    }

    /// Brings a stored record up to date with the disk when the freshness
    /// check calls for it, writing the result through.
    pub(crate) fn check_last_modified(
        &self,
        record: MediaRecord,
        folder: &MusicFolder,
        mode: ScanMode,
    ) -> Result<MediaRecord> {
        if !freshness::check(&record, &folder.path, mode) {
            trace!("'{}' is up to date", record.path);
            return Ok(record);
        }

        debug!("updating '{}' from disk", record.path);

        let mut record = record;

        if !record.full_path(&folder.path).exists() {
            record.present = false;
            record.children_last_updated = distant_past();
            self.update_media_file(&mut record)?;
            return Ok(record);
        }

        match record.full_index_path(&folder.path) {
            Some(index) if index.exists() => {
                let record = self.update_by_file(record, folder);
                self.reindex(record, folder)
            }
            Some(_) => {
                record.set_index_path(None);
                self.refresh_media_file(record, folder)
            }
            None => self.refresh_media_file(record, folder),
        }
    }

    /// Expands a stale base file on its own, outside a directory pass.
    fn reindex(&self, base: MediaRecord, folder: &MusicFolder) -> Result<MediaRecord> {
        let index_path = base.index_path().unwrap_or_default().to_string();

        let track_list = match cue::read_track_list(&folder.path.join(&index_path)) {
            Ok(t) => t,
            Err(e) => {
                warn!("can't read track list '{}': {}", index_path, e);
                None
            }
        };

        let stored: Vec<MediaRecord> = self
            .store
            .find_by_path(folder.id, &base.path)?
            .into_iter()
            .filter(|r| r.is_indexed_track())
            .collect();

        let indexer = CueIndexer::new(self.tags.as_ref(), &self.policy);
        let expansion = indexer.expand(base, folder, &index_path, track_list.as_ref(), stored, true);

        let mut batch = CommitBatch {
            purge: expansion.replaced,
            upserts: expansion.writes,
            missing: expansion.obsolete.into_iter().filter(|r| r.present).collect(),
        };
        batch.upserts.push(expansion.base);

        self.commit(&mut batch)?;

        batch
            .upserts
            .pop()
            .ok_or_else(|| Error::OtherError("empty commit".to_string()))
    }

    /// Applies `batch` and evicts every record it touched from the cache.
    pub(crate) fn commit(&self, batch: &mut CommitBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.store.commit(batch)?;

        for record in batch
            .purge
            .iter()
            .chain(batch.upserts.iter())
            .chain(batch.missing.iter())
        {
            self.cache.evict(record);
        }

        Ok(())
    }

    /// Directories first, then files in disc, track and offset order.
    pub fn sort(&self, records: &mut [MediaRecord]) {
        let by_year = self.settings.sort_albums_by_year;
        records.sort_by(|a, b| compare(a, b, by_year));
    }
}

fn compare(a: &MediaRecord, b: &MediaRecord, by_year: bool) -> Ordering {
    match (a.is_directory(), b.is_directory()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    if a.is_directory() {
        let year = if by_year && a.media_type.is_directory() && b.media_type.is_directory() {
            a.year.cmp(&b.year)
        } else {
            Ordering::Equal
        };

        return year.then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()));
    }

    a.disc_number
        .cmp(&b.disc_number)
        .then_with(|| a.track_number.cmp(&b.track_number))
        .then_with(|| a.start_offset().total_cmp(&b.start_offset()))
        .then_with(|| a.path.cmp(&b.path))
}
