mod common;

use mediaindex::folder::FolderType;
use mediaindex::media::{MediaRecord, NOT_INDEXED};
use mediaindex::settings::Settings;
use mediaindex::store::RecordStore;

use common::*;

fn durations(records: &[MediaRecord]) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.is_indexed_track())
        .map(|r| r.duration.unwrap())
        .collect()
}

#[test]
fn track_list_splits_base_file() {
    let lib = library();
    live_album(&lib, LIVE_CUE, 300.0);

    let all = lib.children("Live");
    assert_eq!(all.len(), 4);
    assert_eq!(durations(&all), vec![120.0, 120.0, 60.0]);

    let base = lib.stored_file("Live/live.flac").unwrap();
    assert_eq!(base.index_path(), Some("Live/live.cue"));
    assert!(base.has_index());

    let visible = lib.visible("Live");
    assert_eq!(visible.len(), 3);
    assert!(visible.iter().all(|r| r.is_indexed_track()));

    let two = &visible[1];
    assert_eq!(two.path, "Live/live.flac");
    assert_eq!(two.start_offset(), 120.0);
    assert_eq!(two.title.as_deref(), Some("Two"));
    assert_eq!(two.album.as_deref(), Some("Live"));
    assert_eq!(two.album_artist.as_deref(), Some("Band"));
    assert_eq!(two.track_number, Some(2));
    assert_eq!(two.parent_path.as_deref(), Some("Live"));
    assert_eq!(two.file_size, Some(1200));

    // Sub-tracks are reachable by key, but never created from a bare lookup.
    let found = lib
        .service
        .media_file_at("Live/live.flac", &lib.folder, 240.0, lib.service.scan_mode())
        .unwrap()
        .unwrap();
    assert_eq!(found.title.as_deref(), Some("Three"));
    assert_eq!(
        lib.service
            .media_file_at("Live/live.flac", &lib.folder, 10.0, lib.service.scan_mode())
            .unwrap(),
        None
    );
}

#[test]
fn track_past_the_end_leaves_a_plain_file() {
    let lib = library();
    let cue = "FILE \"live.flac\" WAVE
  TRACK 01 AUDIO
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    INDEX 01 04:50:00
";
    live_album(&lib, cue, 280.0);

    let all = lib.children("Live");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].path, "Live/live.flac");
    assert_eq!(all[0].index_path(), None);
    assert_eq!(all[0].start_offset(), NOT_INDEXED);
    assert_eq!(lib.visible("Live").len(), 1);
}

#[test]
fn malformed_track_list_is_ignored() {
    let lib = library();
    live_album(&lib, "FILE \"live.flac\" WAVE\n  TRACK 01 AUDIO\n    INDEX 01 zz:00:00\n", 300.0);

    let all = lib.children("Live");
    assert_eq!(all.len(), 1);
    assert!(!all[0].has_index());
}

#[test]
fn disabled_cue_indexing_shows_the_whole_file() {
    let mut settings = Settings::default();
    settings.memory_cache_enabled = false;
    settings.enable_cue_indexing = false;
    let lib = library_with(settings, FolderType::Media);
    live_album(&lib, LIVE_CUE, 300.0);

    let visible = lib.visible("Live");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].index_path(), None);
}

#[test]
fn base_file_can_stay_visible() {
    let mut settings = Settings::default();
    settings.memory_cache_enabled = false;
    settings.hide_indexed_files = false;
    let lib = library_with(settings, FolderType::Media);
    live_album(&lib, LIVE_CUE, 300.0);

    assert_eq!(lib.visible("Live").len(), 4);
}

#[test]
fn touched_track_list_keeps_play_counts() {
    let lib = library();
    live_album(&lib, LIVE_CUE, 300.0);
    lib.children("Live");

    let mut two = lib.stored("Live/live.flac", 120.0).unwrap();
    lib.service.increment_play_count(&mut two).unwrap();

    lib.touch("Live/live.cue", 30);

    lib.children("Live");

    let after = lib.stored("Live/live.flac", 120.0).unwrap();
    assert_eq!(after.id, two.id);
    assert_eq!(after.play_count, 1);
    assert!(after.last_scanned > two.last_scanned);

    let base = lib.stored_file("Live/live.flac").unwrap();
    assert_eq!(base.changed.timestamp(), T0 + 30);
}

#[test]
fn edited_track_list_replaces_changed_tracks() {
    let lib = library();
    live_album(&lib, LIVE_CUE, 300.0);
    lib.children("Live");

    let mut one = lib.stored("Live/live.flac", 0.0).unwrap();
    lib.service.increment_play_count(&mut one).unwrap();
    let mut three = lib.stored("Live/live.flac", 240.0).unwrap();
    lib.service.increment_play_count(&mut three).unwrap();

    lib.write("Live/live.cue", LIVE_CUE.replace("02:00:00", "02:30:00").as_bytes());
    lib.touch("Live/live.cue", 30);
    lib.touch("Live", 0);

    lib.children("Live");
    let visible = lib.visible("Live");
    assert_eq!(durations(&visible), vec![150.0, 90.0, 60.0]);

    let new_one = lib.stored("Live/live.flac", 0.0).unwrap();
    assert_ne!(new_one.id, one.id);
    assert_eq!(new_one.play_count, 0);
    assert_eq!(lib.store.find_by_id(one.id.unwrap()).unwrap(), None);

    assert!(!lib.stored("Live/live.flac", 120.0).unwrap().present);
    assert!(lib.stored("Live/live.flac", 150.0).unwrap().present);

    let same_three = lib.stored("Live/live.flac", 240.0).unwrap();
    assert_eq!(same_three.id, three.id);
    assert_eq!(same_three.play_count, 1);
}

#[test]
fn removed_track_list_demotes_base_file() {
    let lib = library();
    live_album(&lib, LIVE_CUE, 300.0);
    assert_eq!(lib.children("Live").len(), 4);

    lib.remove("Live/live.cue");
    lib.touch("Live", 10);

    let all = lib.children("Live");
    assert_eq!(all.len(), 1);
    assert!(!all[0].has_index());
    assert!(!lib.stored("Live/live.flac", 120.0).unwrap().present);
}

fn flac_with_sheet(sheet: &str) -> Vec<u8> {
    let comment = format!("CUESHEET={}", sheet);

    let mut data = Vec::new();
    data.extend_from_slice(&6u32.to_le_bytes());
    data.extend_from_slice(b"vendor");
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&(comment.len() as u32).to_le_bytes());
    data.extend_from_slice(comment.as_bytes());

    let mut out = b"fLaC".to_vec();
    out.push(0x80 | 4);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&data);
    out.extend_from_slice(&[0u8; 64]);
    out
}

#[test]
fn embedded_track_list_splits_flac() {
    let lib = library();
    lib.tags.set_duration("image.flac", 100.0);
    lib.write(
        "Image/image.flac",
        &flac_with_sheet("FILE \"CD.wav\" WAVE\nTRACK 01 AUDIO\nINDEX 01 00:00:00\nTRACK 02 AUDIO\nINDEX 01 00:40:00\n"),
    );

    let all = lib.children("Image");
    assert_eq!(durations(&all), vec![40.0, 60.0]);

    let base = lib.stored_file("Image/image.flac").unwrap();
    assert_eq!(base.index_path(), Some("Image/image.flac"));

    // The base is its own track list, so it stays fresh until it changes.
    let count = lib.store.count().unwrap();
    lib.children("Image");
    assert_eq!(lib.store.count().unwrap(), count);
}
