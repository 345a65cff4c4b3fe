use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::flac;

/// Detection confidence (0-100) needed before a non UTF-8 sheet is read as
/// Windows-1252. Same cut-off ICU's charset detector uses for its single-byte
/// recognizers.
const CHARSET_THRESHOLD: u32 = 35;

const FRAMES_PER_SECOND: f64 = 75.0;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("bad timestamp '{0}'")]
    BadTimestamp(String),
    #[error("bad track number '{0}'")]
    BadTrackNumber(String),
    #[error("no FILE command")]
    MissingFile,
    #[error("track {0} has no INDEX")]
    MissingIndex(i32),
    #[error("no tracks")]
    NoTracks,
    #[error("invalid container: {0}")]
    InvalidContainer(String),
}

/// CUE timestamp: minutes, seconds and frames (75 per second).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CueTime {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl CueTime {
    pub fn parse(text: &str) -> Result<CueTime, ParseError> {
        let bad = || ParseError::BadTimestamp(text.to_string());

        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 3 {
            return Err(bad());
        }

        let minutes = parts[0].parse::<u32>().map_err(|_| bad())?;
        let seconds = parts[1].parse::<u32>().map_err(|_| bad())?;
        let frames = parts[2].parse::<u32>().map_err(|_| bad())?;

        if seconds >= 60 || frames >= 75 {
            return Err(bad());
        }

        Ok(CueTime {
            minutes,
            seconds,
            frames,
        })
    }

    pub fn from_frames(total: u64) -> CueTime {
        let frames = (total % 75) as u32;
        let total_seconds = total / 75;
        CueTime {
            minutes: (total_seconds / 60) as u32,
            seconds: (total_seconds % 60) as u32,
            frames,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        f64::from(self.minutes) * 60.0
            + f64::from(self.seconds)
            + f64::from(self.frames) / FRAMES_PER_SECOND
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub number: i32,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub start: CueTime,
}

/// Named segments of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackList {
    pub file: String,
    pub performer: Option<String>,
    pub title: Option<String>,
    pub entries: Vec<TrackEntry>,
}

fn generate_commands(text: &str) -> Vec<Vec<String>> {
    let mut commands: Vec<Vec<String>> = Vec::new();

    let mut quote_delimited = false;
    let mut command: Vec<String> = Vec::new();
    let mut string = String::new();

    for ch in text.chars() {
        if ch == '\n' || (!quote_delimited && ch.is_whitespace()) || (quote_delimited && ch == '"') {
            if !string.is_empty() || quote_delimited {
                command.push(std::mem::take(&mut string));
                quote_delimited = false;
            }

            if ch == '\n' {
                if !command.is_empty() {
                    commands.push(std::mem::take(&mut command));
                }
                quote_delimited = false;
            }
        } else if ch == '"' {
            quote_delimited = true;
        } else if !ch.is_control() {
            string.push(ch);
        }
    }

    if !string.is_empty() {
        command.push(string);
    }

    if !command.is_empty() {
        commands.push(command);
    }

    commands
}

struct PendingTrack {
    number: i32,
    title: Option<String>,
    performer: Option<String>,
    index00: Option<CueTime>,
    index01: Option<CueTime>,
}

impl PendingTrack {
    fn finish(self) -> Result<TrackEntry, ParseError> {
        let start = match self.index01.or(self.index00) {
            Some(s) => s,
            None => return Err(ParseError::MissingIndex(self.number)),
        };

        Ok(TrackEntry {
            number: self.number,
            title: self.title,
            performer: self.performer,
            start,
        })
    }
}

/// Parses the text of a cue sheet. Only tracks of the first FILE are kept.
pub fn parse_text(text: &str) -> Result<TrackList, ParseError> {
    let mut file: Option<String> = None;
    let mut performer = None;
    let mut title = None;
    let mut entries = Vec::new();
    let mut track: Option<PendingTrack> = None;
    let mut other_file = false;

    for command in generate_commands(text) {
        let name = command[0].to_ascii_uppercase();
        let arg = command.get(1).cloned();

        if other_file {
            continue;
        }

        match name.as_str() {
            "FILE" => {
                if file.is_some() {
                    other_file = true;
                    continue;
                }
                file = Some(arg.ok_or(ParseError::MissingFile)?);
            }
            "TRACK" => {
                if let Some(t) = track.take() {
                    entries.push(t.finish()?);
                }
                let number = arg.unwrap_or_default();
                track = Some(PendingTrack {
                    number: number
                        .parse()
                        .map_err(|_| ParseError::BadTrackNumber(number.clone()))?,
                    title: None,
                    performer: None,
                    index00: None,
                    index01: None,
                });
            }
            "TITLE" => match track.as_mut() {
                Some(t) => t.title = arg,
                None => title = arg,
            },
            "PERFORMER" => match track.as_mut() {
                Some(t) => t.performer = arg,
                None => performer = arg,
            },
            "INDEX" => {
                if let (Some(t), Some(number), Some(time)) =
                    (track.as_mut(), arg.as_deref(), command.get(2))
                {
                    let time = CueTime::parse(time)?;
                    match number.parse::<u32>() {
                        Ok(0) => t.index00 = Some(time),
                        Ok(1) => t.index01 = Some(time),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(t) = track.take() {
        entries.push(t.finish()?);
    }

    let file = file.ok_or(ParseError::MissingFile)?;
    if entries.is_empty() {
        return Err(ParseError::NoTracks);
    }

    Ok(TrackList {
        file,
        performer,
        title,
        entries,
    })
}

pub fn parse(bytes: &[u8]) -> Result<TrackList, ParseError> {
    parse_text(&decode(bytes))
}

/// Reads the track list described by a `.cue` sheet or embedded in a `.flac` file.
pub fn read_track_list(path: &Path) -> crate::error::Result<Option<TrackList>> {
    let extension = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return Ok(None),
    };

    match extension.as_str() {
        "cue" => {
            let bytes = fs::read(path)?;
            Ok(Some(parse(&bytes)?))
        }
        "flac" => flac::read_cue_sheet(path),
        _ => Ok(None),
    }
}

const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

/// Confidence (0-100) that `bytes` is Windows-1252 text: the share of bytes
/// that are printable ASCII, whitespace or Latin-1 letters. A coarse stand-in
/// for ICU's windows-1252 recognizer, which is the only non UTF-8 case handled.
fn windows_1252_confidence(bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return 0;
    }

    let plausible = bytes
        .iter()
        .filter(|&&b| {
            b == b'\t' || b == b'\r' || b == b'\n' || (0x20..0x7f).contains(&b) || b >= 0xc0
        })
        .count();

    (plausible * 100 / bytes.len()) as u32
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if windows_1252_confidence(bytes) > CHARSET_THRESHOLD {
        return bytes
            .iter()
            .map(|&b| match b {
                0x80..=0x9f => WINDOWS_1252_HIGH[(b - 0x80) as usize],
                _ => b as char,
            })
            .collect();
    }

    debug!("charset not detected, decoding cue sheet as utf-8");
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "REM GENRE Rock\r
PERFORMER \"The Band\"\r
TITLE \"Live at Home\"\r
FILE \"track.flac\" WAVE\r
  TRACK 01 AUDIO\r
    TITLE \"Intro\"\r
    PERFORMER \"The Band\"\r
    INDEX 01 00:00:00\r
  TRACK 02 AUDIO\r
    TITLE \"Song, Two\"\r
    INDEX 00 01:58:00\r
    INDEX 01 02:00:00\r
  TRACK 03 AUDIO\r
    TITLE \"Outro\"\r
    PERFORMER \"Guest\"\r
    INDEX 01 04:00:37\r
";

    #[test]
    fn parses_header_and_tracks() {
        let list = parse_text(SHEET).unwrap();

        assert_eq!(list.file, "track.flac");
        assert_eq!(list.performer.as_deref(), Some("The Band"));
        assert_eq!(list.title.as_deref(), Some("Live at Home"));
        assert_eq!(list.entries.len(), 3);

        assert_eq!(list.entries[1].title.as_deref(), Some("Song, Two"));
        assert_eq!(list.entries[1].performer, None);
        assert_eq!(list.entries[1].start.as_seconds(), 120.0);
        assert_eq!(list.entries[2].number, 3);
        assert_eq!(list.entries[2].performer.as_deref(), Some("Guest"));
    }

    #[test]
    fn frames_are_fractional_seconds() {
        let t = CueTime::parse("04:00:37").unwrap();
        assert!((t.as_seconds() - (240.0 + 37.0 / 75.0)).abs() < 1e-9);
        assert_eq!(CueTime::from_frames(75 * 61 + 3), CueTime::parse("01:01:03").unwrap());
    }

    #[test]
    fn rejects_bad_timestamps() {
        assert!(CueTime::parse("1:2").is_err());
        assert!(CueTime::parse("00:61:00").is_err());
        assert!(CueTime::parse("00:00:75").is_err());
    }

    #[test]
    fn track_without_index_is_an_error() {
        let text = "FILE \"a.flac\" WAVE\nTRACK 01 AUDIO\nTITLE \"x\"\n";
        assert_eq!(parse_text(text), Err(ParseError::MissingIndex(1)));
    }

    #[test]
    fn sheet_without_file_or_tracks_is_an_error() {
        assert_eq!(parse_text("TITLE \"x\"\n"), Err(ParseError::MissingFile));
        assert_eq!(parse_text("FILE \"a.flac\" WAVE\n"), Err(ParseError::NoTracks));
    }

    #[test]
    fn tracks_of_second_file_are_ignored() {
        let text = "FILE \"a.flac\" WAVE\nTRACK 01 AUDIO\nINDEX 01 00:00:00\n\
                    FILE \"b.flac\" WAVE\nTRACK 02 AUDIO\nINDEX 01 00:00:00\n";
        let list = parse_text(text).unwrap();
        assert_eq!(list.file, "a.flac");
        assert_eq!(list.entries.len(), 1);
    }

    #[test]
    fn decodes_latin_sheets() {
        let mut bytes = b"FILE \"a.flac\" WAVE\nTRACK 01 AUDIO\nTITLE \"Caf".to_vec();
        bytes.push(0xe9);
        bytes.extend_from_slice(b"\"\nINDEX 01 00:00:00\n");

        let list = parse(&bytes).unwrap();
        assert_eq!(list.entries[0].title.as_deref(), Some("Café"));
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = b"\xef\xbb\xbf".to_vec();
        bytes.extend_from_slice("FILE \"ä.flac\" WAVE\nTRACK 01 AUDIO\nINDEX 01 00:00:00\n".as_bytes());
        assert_eq!(parse(&bytes).unwrap().file, "ä.flac");
    }
}
