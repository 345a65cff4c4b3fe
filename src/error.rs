use thiserror::Error;

use crate::cue;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("invalid cue sheet: {0}")]
    CueError(#[from] cue::ParseError),
    #[error("flac error: {0}")]
    FlacError(#[from] metaflac::Error),
    #[error("invalid exclude pattern: {0}")]
    PatternError(#[from] regex::Error),
    #[error("invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),
    #[error("database schema version {found} differs from {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("{0}")]
    OtherError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
