use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::media::{MediaRecord, RecordKey};

/// In-memory lookups in front of the record store: one map by natural key, one
/// by surrogate id. Both share a single enable flag.
///
/// Every eviction bumps a generation counter. A lookup takes the generation
/// before it reads the store and hands it to `put_*`, which drops the record
/// if anything was evicted in between.
#[derive(Debug)]
pub struct LookupCache {
    enabled: AtomicBool,
    generation: AtomicU64,
    by_key: RwLock<HashMap<RecordKey, MediaRecord>>,
    by_id: RwLock<HashMap<i64, MediaRecord>>,
}

impl LookupCache {
    pub fn new(enabled: bool) -> LookupCache {
        info!("lookup cache {}", if enabled { "enabled" } else { "disabled" });

        LookupCache {
            enabled: AtomicBool::new(enabled),
            generation: AtomicU64::new(0),
            by_key: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggles the cache. Both maps are emptied under their write locks, so no
    /// reader observes entries from before the switch.
    pub fn set_enabled(&self, enabled: bool) {
        let mut by_key = self.by_key.write();
        let mut by_id = self.by_id.write();

        self.enabled.store(enabled, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        by_key.clear();
        by_id.clear();

        debug!("lookup cache {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn accepts(&self, generation: u64) -> bool {
        self.is_enabled() && self.generation() == generation
    }

    pub fn get_by_key(&self, key: &RecordKey) -> Option<MediaRecord> {
        if !self.is_enabled() {
            return None;
        }
        self.by_key.read().get(key).cloned()
    }

    pub fn get_by_id(&self, id: i64) -> Option<MediaRecord> {
        if !self.is_enabled() {
            return None;
        }
        self.by_id.read().get(&id).cloned()
    }

    pub fn put_by_key(&self, key: RecordKey, record: &MediaRecord, generation: u64) {
        if !self.accepts(generation) {
            return;
        }
        let mut by_key = self.by_key.write();
        // re-checked under the lock, a concurrent evict or disable may have run
        if self.accepts(generation) {
            by_key.insert(key, record.clone());
        }
    }

    pub fn put_by_id(&self, record: &MediaRecord, generation: u64) {
        let id = match record.id {
            Some(id) => id,
            None => return,
        };
        if !self.accepts(generation) {
            return;
        }
        let mut by_id = self.by_id.write();
        if self.accepts(generation) {
            by_id.insert(id, record.clone());
        }
    }

    /// Drops every entry that could describe `record`.
    pub fn evict(&self, record: &MediaRecord) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.by_key.write().remove(&record.key());

        if let Some(id) = record.id {
            self.by_id.write().remove(&id);
        }
    }

    pub fn len(&self) -> (usize, usize) {
        (self.by_key.read().len(), self.by_id.read().len())
    }
}
