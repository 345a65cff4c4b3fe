//! Cue sheets embedded in FLAC containers, either as a `CUESHEET` Vorbis
//! comment or as a binary CUESHEET metadata block.

use std::path::Path;

use metaflac::block::{Block, BlockType, CueSheet};
use metaflac::{ErrorKind, Tag};

use crate::cue::{self, CueTime, ParseError, TrackEntry, TrackList};
use crate::error::Result;

const LEAD_OUT_CD: u8 = 170;
const LEAD_OUT: u8 = 255;

fn first_comment(tag: &Tag, key: &str) -> Option<String> {
    tag.get_vorbis(key)
        .and_then(|mut values| values.next())
        .map(|s| s.to_string())
}

fn overflow(number: u8) -> ParseError {
    ParseError::InvalidContainer(format!("track {} starts past any sane offset", number))
}

/// Converts a binary CUESHEET block. Offsets are in samples.
fn convert_cue_sheet(
    sheet: &CueSheet,
    sample_rate: u32,
) -> std::result::Result<Vec<TrackEntry>, ParseError> {
    if sample_rate == 0 {
        return Err(ParseError::InvalidContainer("sample rate is zero".to_string()));
    }

    let mut entries = Vec::new();

    for track in &sheet.tracks {
        if track.number == LEAD_OUT || track.number == LEAD_OUT_CD {
            continue;
        }

        let index = track
            .indices
            .iter()
            .find(|i| i.point_num == 1)
            .or_else(|| track.indices.iter().find(|i| i.point_num == 0))
            .map(|i| i.offset)
            .ok_or(ParseError::MissingIndex(i32::from(track.number)))?;

        let frames = track
            .offset
            .checked_add(index)
            .and_then(|samples| samples.checked_mul(75))
            .ok_or_else(|| overflow(track.number))?
            / u64::from(sample_rate);

        entries.push(TrackEntry {
            number: i32::from(track.number),
            title: None,
            performer: None,
            start: CueTime::from_frames(frames),
        });
    }

    Ok(entries)
}

/// Extracts the embedded track list of the FLAC file at `path`, if it carries one.
/// The returned list always refers to the container itself.
pub fn read_cue_sheet(path: &Path) -> Result<Option<TrackList>> {
    let tag = match Tag::read_from_path(path) {
        Ok(t) => t,
        Err(e) if matches!(e.kind, ErrorKind::InvalidInput) => {
            trace!("'{}' is not a flac stream", path.to_string_lossy());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(text) = first_comment(&tag, "CUESHEET") {
        let mut list = cue::parse_text(&text)?;
        list.file = file;
        return Ok(Some(list));
    }

    let sheet = tag
        .get_blocks(BlockType::CueSheet)
        .into_iter()
        .find_map(|block| match block {
            Block::CueSheet(sheet) => Some(sheet),
            _ => None,
        });

    let sheet = match sheet {
        Some(s) => s,
        None => return Ok(None),
    };

    let sample_rate = tag
        .get_streaminfo()
        .map(|info| info.sample_rate)
        .ok_or_else(|| ParseError::InvalidContainer("no STREAMINFO".to_string()))?;

    let entries = convert_cue_sheet(sheet, sample_rate)?;
    if entries.is_empty() {
        return Err(ParseError::NoTracks.into());
    }

    Ok(Some(TrackList {
        file,
        performer: first_comment(&tag, "ALBUMARTIST").or_else(|| first_comment(&tag, "ARTIST")),
        title: first_comment(&tag, "ALBUM"),
        entries,
    }))
}
