use chrono::prelude::*;
use log::{Level, LevelFilter, Metadata, Record};

const TARGET: &str = "mediaindex";

pub struct Logger;

static LOGGER: Logger = Logger;

/// Installs the logger, letting through records up to `level`.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Maps the number of `-v` flags to a level.
pub fn level_for(verbosity: u64) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(TARGET) && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut target = record.target();
        if target.starts_with("mediaindex::") {
            target = &target[TARGET.len() + 2..];
        }

        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };

        eprintln!(
            "{} {} {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            target,
            record.args()
        );
    }

    fn flush(&self) {}
}
