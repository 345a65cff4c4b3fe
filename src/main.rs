#[macro_use]
extern crate log;

mod logger;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use serde::Serialize;

use mediaindex::cache::LookupCache;
use mediaindex::folder::{FolderType, MusicFolder, StaticCatalog};
use mediaindex::settings::Settings;
use mediaindex::store::SqliteStore;
use mediaindex::tags::LoftyTagReader;
use mediaindex::{Error, MediaFileService, MediaRecord, Result};

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| Error::OtherError(format!("can't expand '{}': {}", path, e)))?;

    let path = PathBuf::from(expanded.as_ref());
    Ok(fs::canonicalize(&path).unwrap_or(path))
}

fn parse_roots(matches: &ArgMatches, arg: &str, folder_type: FolderType, roots: &mut Vec<MusicFolder>) -> Result<()> {
    for value in matches.values_of(arg).into_iter().flatten() {
        let (name, path) = match value.split_once('=') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => (name, path),
            _ => {
                return Err(Error::OtherError(format!(
                    "invalid root '{}', expected name=path",
                    value
                )))
            }
        };

        let id = roots.len() as i64 + 1;
        let path = expand_path(path)?;
        debug!("root {} '{}' = '{}'", id, name, path.to_string_lossy());

        roots.push(MusicFolder::new(id, name, &path, folder_type));
    }

    Ok(())
}

fn load_settings(matches: &ArgMatches) -> Result<Settings> {
    let mut settings = match matches.value_of("config") {
        Some(path) => Settings::load(&expand_path(path)?)?,
        None => Settings::default(),
    };

    if matches.is_present("fast") {
        settings.fast_cache_enabled = true;
    }

    if matches.is_present("full-scan") {
        settings.full_scan = true;
    }

    if matches.is_present("no-cue") {
        settings.enable_cue_indexing = false;
    }

    if let Some(threads) = matches.value_of("threads") {
        settings.scan_threads = threads
            .parse()
            .map_err(|_| Error::OtherError(format!("invalid thread count '{}'", threads)))?;
    }

    Ok(settings)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn lookup(service: &MediaFileService, matches: &ArgMatches) -> Result<MediaRecord> {
    let path = expand_path(matches.value_of("path").unwrap_or_default())?;

    match service.media_file(&path)? {
        Some(record) => Ok(record),
        None => Err(Error::OtherError(format!(
            "'{}' is not in the index",
            path.to_string_lossy()
        ))),
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let settings = load_settings(matches)?;

    let mut roots = Vec::new();
    parse_roots(matches, "root", FolderType::Media, &mut roots)?;
    parse_roots(matches, "podcast-root", FolderType::Podcast, &mut roots)?;

    let db = expand_path(matches.value_of("db").unwrap_or("mediaindex.db"))?;
    let store = SqliteStore::open(&db)?;

    let cache = Arc::new(LookupCache::new(settings.memory_cache_enabled));
    let service = MediaFileService::new(
        Arc::new(store),
        Arc::new(LoftyTagReader),
        Arc::new(StaticCatalog::new(roots)),
        cache,
        settings,
    )?;

    match matches.subcommand() {
        ("get", Some(sub)) => print_json(&lookup(&service, sub)?),
        ("ls", Some(sub)) => {
            let record = lookup(&service, sub)?;
            print_json(&service.visible_children_of(&record, true, true)?)
        }
        ("tree", Some(sub)) => {
            let record = lookup(&service, sub)?;
            print_json(&service.descendants_of(&record, true)?)
        }
        ("id", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            let id: i64 = id
                .parse()
                .map_err(|_| Error::OtherError(format!("invalid id '{}'", id)))?;

            match service.media_file_by_id(id)? {
                Some(record) => print_json(&record),
                None => Err(Error::OtherError(format!("no record with id {}", id))),
            }
        }
        ("expunge", Some(_)) => {
            let n = service.expunge()?;
            println!("{}", n);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn main() {
    let path_arg = || {
        Arg::with_name("path")
            .help("Path inside one of the roots")
            .required(true)
    };

    let matches = App::new("mediaindex")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keeps a media index in sync with music folders")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON settings file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("db")
                .long("db")
                .value_name("FILE")
                .help("Index database")
                .default_value("~/.mediaindex.db")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("root")
                .long("root")
                .value_name("NAME=PATH")
                .help("Music folder root")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("podcast-root")
                .long("podcast-root")
                .value_name("NAME=PATH")
                .help("Podcast folder root")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("fast")
                .long("fast")
                .help("Trust the index, never check the disk"),
        )
        .arg(
            Arg::with_name("full-scan")
                .long("full-scan")
                .help("Refresh every record touched"),
        )
        .arg(
            Arg::with_name("no-cue")
                .long("no-cue")
                .help("Don't split files by their track lists"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .value_name("N")
                .help("Scan worker threads, 0 for one per CPU")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("More logging, repeat for trace"),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("Show the record for a path")
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("ls")
                .about("List the visible children of a directory")
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("tree")
                .about("List every visible file below a directory")
                .arg(path_arg()),
        )
        .subcommand(
            SubCommand::with_name("id")
                .about("Show the record with an id")
                .arg(Arg::with_name("id").required(true)),
        )
        .subcommand(SubCommand::with_name("expunge").about("Purge records of vanished files"))
        .get_matches();

    if let Err(e) = logger::init(logger::level_for(matches.occurrences_of("verbose"))) {
        eprintln!("can't initialize logging: {}", e);
    }

    if let Err(e) = run(&matches) {
        error!("{}", e);
        process::exit(1);
    }
}
