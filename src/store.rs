use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db_meta;
use crate::error::{Error, Result};
use crate::media::{self, MediaRecord, MediaType, RecordKey, RecordKind, ENGINE_VERSION};
use crate::schema;

const COLUMNS: &str = "id, path, folder_id, type, start_position, format, title, album, artist, \
    album_artist, disc_number, track_number, year, genre, bit_rate, variable_bit_rate, duration, \
    file_size, width, height, parent_path, index_path, cover_art_path, play_count, last_played, \
    comment, created, changed, last_scanned, children_last_updated, present, version, \
    mb_release_id, mb_recording_id";

const INSERT: &str = "INSERT INTO media_file (path, folder_id, type, start_position, format, \
    title, album, artist, album_artist, disc_number, track_number, year, genre, bit_rate, \
    variable_bit_rate, duration, file_size, width, height, parent_path, index_path, \
    cover_art_path, play_count, last_played, comment, created, changed, last_scanned, \
    children_last_updated, present, version, mb_release_id, mb_recording_id)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, \
    ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33)
    ON CONFLICT (path, folder_id, start_position) DO UPDATE SET
    type = excluded.type, format = excluded.format, title = excluded.title, \
    album = excluded.album, artist = excluded.artist, album_artist = excluded.album_artist, \
    disc_number = excluded.disc_number, track_number = excluded.track_number, \
    year = excluded.year, genre = excluded.genre, bit_rate = excluded.bit_rate, \
    variable_bit_rate = excluded.variable_bit_rate, duration = excluded.duration, \
    file_size = excluded.file_size, width = excluded.width, height = excluded.height, \
    parent_path = excluded.parent_path, index_path = excluded.index_path, \
    cover_art_path = excluded.cover_art_path, play_count = excluded.play_count, \
    last_played = excluded.last_played, comment = excluded.comment, \
    changed = excluded.changed, last_scanned = excluded.last_scanned, \
    children_last_updated = excluded.children_last_updated, present = excluded.present, \
    version = excluded.version, mb_release_id = excluded.mb_release_id, \
    mb_recording_id = excluded.mb_recording_id";

const UPDATE_BY_ID: &str = "UPDATE media_file SET path = ?1, folder_id = ?2, type = ?3, \
    start_position = ?4, format = ?5, title = ?6, album = ?7, artist = ?8, album_artist = ?9, \
    disc_number = ?10, track_number = ?11, year = ?12, genre = ?13, bit_rate = ?14, \
    variable_bit_rate = ?15, duration = ?16, file_size = ?17, width = ?18, height = ?19, \
    parent_path = ?20, index_path = ?21, cover_art_path = ?22, play_count = ?23, \
    last_played = ?24, comment = ?25, created = ?26, changed = ?27, last_scanned = ?28, \
    children_last_updated = ?29, present = ?30, version = ?31, mb_release_id = ?32, \
    mb_recording_id = ?33
    WHERE id = ?34";

/// Writes of one directory pass, applied in a single transaction: purged rows
/// go first, then upserts, then soft deletes.
#[derive(Debug, Default)]
pub struct CommitBatch {
    pub purge: Vec<MediaRecord>,
    pub upserts: Vec<MediaRecord>,
    pub missing: Vec<MediaRecord>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.purge.is_empty() && self.upserts.is_empty() && self.missing.is_empty()
    }
}

/// Persistent side of the index.
pub trait RecordStore: Send + Sync {
    fn find_by_key(&self, key: &RecordKey) -> Result<Option<MediaRecord>>;
    fn find_by_id(&self, id: i64) -> Result<Option<MediaRecord>>;
    /// Every record sharing `path` in a folder (a base file and its sub-tracks),
    /// ordered by start offset.
    fn find_by_path(&self, folder_id: i64, path: &str) -> Result<Vec<MediaRecord>>;
    fn find_by_path_any_folder(&self, path: &str) -> Result<Vec<MediaRecord>>;
    /// Children of a directory ordered by start offset.
    fn children(&self, folder_id: i64, parent_path: &str, present_only: bool) -> Result<Vec<MediaRecord>>;
    /// Inserts or updates by natural key; assigns `record.id` on first insert.
    fn upsert(&self, record: &mut MediaRecord) -> Result<()>;
    /// Applies the whole batch or nothing. Ids of upserted records are filled in.
    fn commit(&self, batch: &mut CommitBatch) -> Result<()>;
    /// Soft deletes: the rows stay, flagged as not present.
    fn mark_missing(&self, keys: &[RecordKey]) -> Result<usize>;
    /// Physically removes every record flagged as not present.
    fn expunge(&self) -> Result<usize>;
}

pub struct SqliteStore {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<SqliteStore> {
        info!("using '{}'", db_path.to_string_lossy());

        let conn = match Connection::open(db_path) {
            Ok(c) => c,
            Err(e) => {
                error!(
                    "can't open sqlite database '{}': {}",
                    db_path.to_string_lossy(),
                    e
                );
                return Err(e.into());
            }
        };

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;",
        )?;

        Self::prepare(conn, Some(db_path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<SqliteStore> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(mut conn: Connection, db_path: Option<PathBuf>) -> Result<SqliteStore> {
        if !db_meta::ensure_schema(&mut conn, schema::INDEX_SCHEMA)? {
            return Err(Error::SchemaMismatch {
                found: db_meta::schema_version(&conn)?.unwrap_or_default(),
                expected: schema::SCHEMA_VERSION,
            });
        }

        Ok(SqliteStore {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<i64> {
        Ok(self
            .conn
            .lock()
            .query_row("SELECT COUNT(id) FROM media_file", [], |row| row.get(0))?)
    }
}

fn to_micros(t: DateTime<Utc>) -> i64 {
    media::truncate_micros(t).timestamp_micros()
}

fn from_micros(idx: usize, v: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(v)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "timestamp".to_string(), Type::Integer))
}

fn _get_record(row: &Row) -> rusqlite::Result<MediaRecord> {
    let type_name: String = row.get(3)?;
    let media_type = MediaType::from_str(&type_name)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(3, type_name.clone(), Type::Text))?;
    let start: f64 = row.get(4)?;
    let index_path: Option<String> = row.get(21)?;
    let last_played: Option<i64> = row.get(24)?;

    Ok(MediaRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        folder_id: row.get(2)?,
        kind: RecordKind::from_columns(media_type, start, index_path),
        media_type,
        format: row.get(5)?,
        title: row.get(6)?,
        album: row.get(7)?,
        artist: row.get(8)?,
        album_artist: row.get(9)?,
        disc_number: row.get(10)?,
        track_number: row.get(11)?,
        year: row.get(12)?,
        genre: row.get(13)?,
        bit_rate: row.get(14)?,
        variable_bit_rate: row.get(15)?,
        duration: row.get(16)?,
        file_size: row.get(17)?,
        width: row.get(18)?,
        height: row.get(19)?,
        parent_path: row.get(20)?,
        cover_art_path: row.get(22)?,
        play_count: row.get(23)?,
        last_played: match last_played {
            Some(v) => Some(from_micros(24, v)?),
            None => None,
        },
        comment: row.get(25)?,
        created: from_micros(26, row.get(26)?)?,
        changed: from_micros(27, row.get(27)?)?,
        last_scanned: from_micros(28, row.get(28)?)?,
        children_last_updated: from_micros(29, row.get(29)?)?,
        present: row.get(30)?,
        version: row.get(31)?,
        mb_release_id: row.get(32)?,
        mb_recording_id: row.get(33)?,
    })
}

fn query_records(conn: &Connection, sql: &str, values: &[&dyn ToSql]) -> Result<Vec<MediaRecord>> {
    let mut st = conn.prepare(sql)?;
    let mut rows = st.query(values)?;

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(_get_record(row)?);
    }

    Ok(result)
}

fn query_record(conn: &Connection, sql: &str, values: &[&dyn ToSql]) -> Result<Option<MediaRecord>> {
    Ok(conn.query_row(sql, values, _get_record).optional()?)
}

fn bind<T>(record: &MediaRecord, f: impl FnOnce(&[&dyn ToSql]) -> Result<T>) -> Result<T> {
    let media_type = record.media_type.as_str();
    let start = record.start_offset();
    let index_path = record.index_path();
    let last_played = record.last_played.map(to_micros);
    let created = to_micros(record.created);
    let changed = to_micros(record.changed);
    let last_scanned = to_micros(record.last_scanned);
    let children_last_updated = to_micros(record.children_last_updated);

    f(params![
        record.path,
        record.folder_id,
        media_type,
        start,
        record.format,
        record.title,
        record.album,
        record.artist,
        record.album_artist,
        record.disc_number,
        record.track_number,
        record.year,
        record.genre,
        record.bit_rate,
        record.variable_bit_rate,
        record.duration,
        record.file_size,
        record.width,
        record.height,
        record.parent_path,
        index_path,
        record.cover_art_path,
        record.play_count,
        last_played,
        record.comment,
        created,
        changed,
        last_scanned,
        children_last_updated,
        record.present,
        ENGINE_VERSION,
        record.mb_release_id,
        record.mb_recording_id,
    ])
}

/// Drops the sub-microsecond part of every timestamp so the caller's copy
/// equals what a later read returns.
fn truncate_times(record: &mut MediaRecord) {
    record.created = media::truncate_micros(record.created);
    record.changed = media::truncate_micros(record.changed);
    record.last_scanned = media::truncate_micros(record.last_scanned);
    record.children_last_updated = media::truncate_micros(record.children_last_updated);
    record.last_played = record.last_played.map(media::truncate_micros);
}

fn upsert_record(conn: &Connection, record: &mut MediaRecord) -> Result<()> {
    truncate_times(record);

    trace!(
        "upsert id={:?} path='{}' folder={} start={} index={:?} type={}",
        record.id,
        record.path,
        record.folder_id,
        record.start_offset(),
        record.index_path(),
        record.media_type.as_str()
    );

    if let Some(id) = record.id {
        let updated = bind(record, |values| {
            let mut values = values.to_vec();
            values.push(&id);
            Ok(conn.execute(UPDATE_BY_ID, values.as_slice())?)
        })?;

        if updated > 0 {
            record.version = ENGINE_VERSION;
            return Ok(());
        }

        debug!("record id={} vanished, inserting by key", id);
    }

    bind(record, |values| Ok(conn.execute(INSERT, values)?))?;

    let key = record.key();
    let id: i64 = conn.query_row(
        "SELECT id FROM media_file WHERE path = ? AND folder_id = ? AND start_position = ?",
        params![key.path, key.folder_id, key.start],
        |row| row.get(0),
    )?;

    record.id = Some(id);
    record.version = ENGINE_VERSION;

    Ok(())
}

fn mark_missing_keys(conn: &Connection, keys: &[RecordKey]) -> Result<usize> {
    let mut st = conn.prepare(
        "UPDATE media_file SET present = 0, children_last_updated = ?
        WHERE path = ? AND folder_id = ? AND start_position = ?",
    )?;

    let distant_past = to_micros(media::distant_past());
    let mut n = 0;

    for key in keys {
        trace!("mark missing path='{}' folder={} start={}", key.path, key.folder_id, key.start);
        n += st.execute(params![distant_past, key.path, key.folder_id, key.start])?;
    }

    Ok(n)
}

impl RecordStore for SqliteStore {
    fn find_by_key(&self, key: &RecordKey) -> Result<Option<MediaRecord>> {
        trace!("get record path='{}' folder={} start={}", key.path, key.folder_id, key.start);

        query_record(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM media_file WHERE path = ? AND folder_id = ? AND start_position = ?",
                COLUMNS
            ),
            params![key.path, key.folder_id, key.start],
        )
    }

    fn find_by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
        trace!("get record id={}", id);

        query_record(
            &self.conn.lock(),
            &format!("SELECT {} FROM media_file WHERE id = ?", COLUMNS),
            params![id],
        )
    }

    fn find_by_path(&self, folder_id: i64, path: &str) -> Result<Vec<MediaRecord>> {
        trace!("list records path='{}' folder={}", path, folder_id);

        query_records(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM media_file WHERE folder_id = ? AND path = ? ORDER BY start_position",
                COLUMNS
            ),
            params![folder_id, path],
        )
    }

    fn find_by_path_any_folder(&self, path: &str) -> Result<Vec<MediaRecord>> {
        trace!("list records path='{}'", path);

        query_records(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM media_file WHERE path = ? ORDER BY folder_id, start_position",
                COLUMNS
            ),
            params![path],
        )
    }

    fn children(&self, folder_id: i64, parent_path: &str, present_only: bool) -> Result<Vec<MediaRecord>> {
        trace!(
            "list children parent='{}' folder={} present_only={}",
            parent_path,
            folder_id,
            present_only
        );

        let sql = if present_only {
            format!(
                "SELECT {} FROM media_file WHERE folder_id = ? AND parent_path = ? AND present \
                ORDER BY start_position, path",
                COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM media_file WHERE folder_id = ? AND parent_path = ? \
                ORDER BY start_position, path",
                COLUMNS
            )
        };

        query_records(&self.conn.lock(), &sql, params![folder_id, parent_path])
    }

    fn upsert(&self, record: &mut MediaRecord) -> Result<()> {
        upsert_record(&self.conn.lock(), record)
    }

    fn commit(&self, batch: &mut CommitBatch) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for record in batch.purge.iter() {
            if let Some(id) = record.id {
                trace!("purge record id={}", id);
                tx.execute("DELETE FROM media_file WHERE id = ?", [id])?;
            }
        }

        for record in batch.upserts.iter_mut() {
            upsert_record(&tx, record)?;
        }

        let missing: Vec<RecordKey> = batch.missing.iter().map(|r| r.key()).collect();
        mark_missing_keys(&tx, &missing)?;

        tx.commit()?;

        debug!(
            "committed {} upserts, {} purges, {} soft deletes",
            batch.upserts.len(),
            batch.purge.len(),
            batch.missing.len()
        );

        Ok(())
    }

    fn mark_missing(&self, keys: &[RecordKey]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let n = mark_missing_keys(&tx, keys)?;
        tx.commit()?;
        Ok(n)
    }

    fn expunge(&self) -> Result<usize> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM media_file WHERE present = 0", [])?;

        info!("expunged {} records", n);

        Ok(n)
    }
}
