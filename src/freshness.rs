//! Decides whether a stored record must be re-read from disk.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::media::{self, MediaRecord, ENGINE_VERSION};
use crate::settings::ScanMode;

/// Modification times observed on disk for a record's backing paths.
/// `None` means the path could not be stat'ed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskState {
    pub modified: Option<DateTime<Utc>>,
    pub index_modified: Option<DateTime<Utc>>,
}

impl DiskState {
    pub fn probe(record: &MediaRecord, root: &Path) -> DiskState {
        DiskState {
            modified: media::last_modified(&record.full_path(root)).ok(),
            index_modified: record
                .full_index_path(root)
                .and_then(|p| media::last_modified(&p).ok()),
        }
    }
}

fn newer_than(disk: Option<DateTime<Utc>>, changed: DateTime<Utc>) -> bool {
    match disk {
        Some(t) => media::truncate_micros(t) > changed,
        None => true,
    }
}

pub fn needs_refresh(record: &MediaRecord, disk: &DiskState, mode: ScanMode) -> bool {
    if mode == ScanMode::MinimizeDiskAccess || record.is_indexed_track() {
        return false;
    }

    if record.version < ENGINE_VERSION || mode == ScanMode::Full {
        return true;
    }

    let changed = media::truncate_micros(record.changed);

    if newer_than(disk.modified, changed) {
        return true;
    }

    record.has_index() && newer_than(disk.index_modified, changed)
}

/// Like `needs_refresh`, but only touches the disk when the answer depends on it.
pub fn check(record: &MediaRecord, root: &Path, mode: ScanMode) -> bool {
    if mode == ScanMode::MinimizeDiskAccess || record.is_indexed_track() {
        return false;
    }

    if record.version < ENGINE_VERSION || mode == ScanMode::Full {
        return true;
    }

    needs_refresh(record, &DiskState::probe(record, root), mode)
}
