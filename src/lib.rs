#[macro_use]
extern crate log;

pub mod cache;
pub mod classify;
pub mod cover;
pub mod cue;
pub mod db_meta;
pub mod error;
pub mod flac;
pub mod folder;
pub mod freshness;
pub mod indexer;
pub mod inspect;
pub mod media;
pub mod reconcile;
pub mod schema;
pub mod service;
pub mod settings;
pub mod store;
pub mod tags;

pub use error::{Error, Result};
pub use media::{MediaRecord, MediaType, RecordKind};
pub use service::MediaFileService;
