// OverDrive Tools - Audiobook chapter lookup and loan downloads
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Chapter timestamps and `chapters.txt` files
//!
//! A chapters file holds one line per chapter:
//!
//! ```text
//! 00:00:00.000 Opening Credits
//! 00:00:41.340 Chapter 1
//! ```

pub mod extractor;

use crate::error::{OverdriveError, Result};
use crate::odm::Part;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub use extractor::{ChapterExtractor, ExtractionReport, Prompter};

/// File name written next to the audio files
pub const CHAPTERS_FILE_NAME: &str = "chapters.txt";

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+):)?(\d+):(\d+(?:\.\d+)?)$").expect("valid duration pattern")
});

/// A chapter start and its title
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterMark {
    pub start_seconds: f64,
    pub title: String,
}

impl ChapterMark {
    pub fn new<S: Into<String>>(start_seconds: f64, title: S) -> Self {
        Self {
            start_seconds,
            title: title.into(),
        }
    }

    /// `HH:MM:SS.mmm Title`
    pub fn to_line(&self) -> String {
        format!("{} {}", format_timestamp(self.start_seconds), self.title)
    }
}

/// Format seconds as `HH:MM:SS.mmm`, truncating to whole milliseconds
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };

    let hours = (seconds / 3600.0).floor() as u64;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    let millis = ((seconds * 1000.0) % 1000.0).floor() as u64;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Parse a part duration: `MM:SS` or `HH:MM:SS`, seconds may be fractional
pub fn parse_duration(duration: &str) -> Result<f64> {
    let invalid = || OverdriveError::invalid_input(format!("Invalid duration '{}'", duration));

    let captures = DURATION_PATTERN.captures(duration.trim()).ok_or_else(invalid)?;
    let hours: f64 = match captures.get(1) {
        Some(h) => h.as_str().parse().map_err(|_| invalid())?,
        None => 0.0,
    };
    let minutes: f64 = captures[2].parse().map_err(|_| invalid())?;
    let secs: f64 = captures[3].parse().map_err(|_| invalid())?;

    Ok(hours * 3600.0 + minutes * 60.0 + secs)
}

/// One mark per part, starting at the summed duration of the parts before it
///
/// A part without a readable duration contributes nothing to the offsets of
/// the parts after it.
pub fn marks_from_parts(parts: &[Part]) -> Vec<ChapterMark> {
    let mut offset = 0.0;
    let mut marks = Vec::with_capacity(parts.len());

    for part in parts {
        marks.push(ChapterMark::new(offset, part.display_name()));

        match part.duration.as_deref().map(parse_duration) {
            Some(Ok(seconds)) => offset += seconds,
            Some(Err(e)) => warn!(part = part.number, error = %e, "skipping unreadable part duration"),
            None => warn!(part = part.number, "part has no duration"),
        }
    }

    marks
}

/// Write marks in order, one line each
pub async fn write_chapters_file(path: &Path, marks: &[ChapterMark]) -> Result<()> {
    let mut contents = String::new();
    for mark in marks {
        contents.push_str(&mark.to_line());
        contents.push('\n');
    }

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;

    debug!(path = %path.display(), count = marks.len(), "wrote chapters file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn part(number: u32, name: Option<&str>, duration: Option<&str>) -> Part {
        Part {
            number,
            filename: format!("{{ID}}Fmt425-Part{:02}.mp3", number),
            name: name.map(String::from),
            duration: duration.map(String::from),
            filesize: None,
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(41.34), "00:00:41.340");
        assert_eq!(format_timestamp(3723.5), "01:02:03.500");
        assert_eq!(format_timestamp(360000.0), "100:00:00.000");
    }

    #[test]
    fn test_format_timestamp_truncates() {
        assert_eq!(format_timestamp(59.9999), "00:00:59.999");
        assert_eq!(format_timestamp(1.0005), "00:00:01.000");
    }

    #[test]
    fn test_format_timestamp_negative_clamps() {
        assert_eq!(format_timestamp(-5.0), "00:00:00.000");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00.000");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("34:13").unwrap(), 2053.0);
        assert_eq!(parse_duration("1:02:03").unwrap(), 3723.0);
        assert_eq!(parse_duration(" 00:01.5 ").unwrap(), 1.5);
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("12").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_marks_from_parts() {
        let parts = vec![
            part(1, Some("Part 1"), Some("34:13")),
            part(2, None, Some("10:00")),
            part(3, Some("  "), None),
            part(4, Some("Epilogue"), Some("01:00")),
        ];
        let marks = marks_from_parts(&parts);

        assert_eq!(marks.len(), 4);
        assert_eq!(marks[0], ChapterMark::new(0.0, "Part 1"));
        assert_eq!(marks[1], ChapterMark::new(2053.0, "Part 2"));
        assert_eq!(marks[2], ChapterMark::new(2653.0, "Part 3"));
        // part 3 has no duration
        assert_eq!(marks[3], ChapterMark::new(2653.0, "Epilogue"));
    }

    #[tokio::test]
    async fn test_write_chapters_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CHAPTERS_FILE_NAME);
        let marks = vec![
            ChapterMark::new(0.0, "Opening Credits"),
            ChapterMark::new(41.34, "Kapitel 1: Über"),
        ];

        write_chapters_file(&path, &marks).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            contents,
            "00:00:00.000 Opening Credits\n00:00:41.340 Kapitel 1: Über\n"
        );
    }
}
