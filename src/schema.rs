pub const SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS MediaIndex (
    key TEXT PRIMARY KEY,
    value);
";

pub const INDEX_SCHEMA: &str = "
CREATE TABLE media_file (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    folder_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    start_position REAL NOT NULL DEFAULT -1,
    format TEXT,
    title TEXT,
    album TEXT,
    artist TEXT,
    album_artist TEXT,
    disc_number INTEGER,
    track_number INTEGER,
    year INTEGER,
    genre TEXT,
    bit_rate INTEGER,
    variable_bit_rate INTEGER NOT NULL DEFAULT 0,
    duration REAL,
    file_size INTEGER,
    width INTEGER,
    height INTEGER,
    parent_path TEXT,
    index_path TEXT,
    cover_art_path TEXT,
    play_count INTEGER NOT NULL DEFAULT 0,
    last_played INTEGER,
    comment TEXT,
    created INTEGER NOT NULL,
    changed INTEGER NOT NULL,
    last_scanned INTEGER NOT NULL,
    children_last_updated INTEGER NOT NULL,
    present INTEGER NOT NULL DEFAULT 1,
    version INTEGER NOT NULL,
    mb_release_id TEXT,
    mb_recording_id TEXT,
    UNIQUE (path, folder_id, start_position));

CREATE INDEX media_file_parent ON media_file (folder_id, parent_path);
CREATE INDEX media_file_present ON media_file (present);
";
