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


//! Output directory naming
//!
//! # Directory Format
//! - `@AUTHOR` and `@TITLE` are replaced by the book's primary author and title
//! - Substituted values are sanitized, so a `/` inside a title never creates
//!   a nested directory
//! - `/` written in the format itself does nest directories

use crate::error::{OverdriveError, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const AUTHOR_TAG: &str = "@AUTHOR";
const TITLE_TAG: &str = "@TITLE";

/// Byte limit for one path component on every supported filesystem
const MAX_COMPONENT_LENGTH: usize = 255;

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/+").expect("valid slash pattern"));

/// Render a directory format such as `@AUTHOR - @TITLE` into a relative path
pub fn render_dir_format(format: &str, author: &str, title: &str) -> Result<PathBuf> {
    let author = sanitize_path_component(author);
    let title = sanitize_path_component(title);
    let rendered = format.replace(AUTHOR_TAG, &author).replace(TITLE_TAG, &title);

    let rendered = REPEATED_SLASHES.replace_all(&rendered, "/");

    let mut path = PathBuf::new();
    for component in rendered.split('/').map(str::trim).filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            return Err(OverdriveError::InvalidPath(format!(
                "Directory format may not contain '{}': {}",
                component, format
            )));
        }
        path.push(truncate_component(component, MAX_COMPONENT_LENGTH));
    }

    if path.as_os_str().is_empty() {
        return Err(OverdriveError::InvalidPath(format!(
            "Directory format renders to an empty path: '{}'",
            format
        )));
    }

    Ok(path)
}

/// Sanitize a file name, replacing characters that are invalid on common filesystems
pub fn sanitize_filename(name: &str) -> String {
    sanitize(name, true, "file")
}

/// Sanitize a directory name; path separators are dropped
pub fn sanitize_path_component(name: &str) -> String {
    sanitize(name, false, "folder")
}

fn sanitize(name: &str, is_filename: bool, fallback: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len());

    for (i, &c) in chars.iter().enumerate() {
        if !is_filename && (c == '/' || c == '\\') {
            continue;
        }
        let prev_char = i.checked_sub(1).map(|p| chars[p]);
        let next_char = chars.get(i + 1).copied();
        result.push(replace_char(c, prev_char, next_char, is_filename));
    }

    let mut result = result.trim().trim_end_matches('.').trim_end().to_string();

    if cfg!(target_os = "windows") {
        result = handle_windows_reserved_names(&result);
    }

    if result.is_empty() {
        result = fallback.to_string();
    }

    result
}

/// Safe substitute for one character
fn replace_char(
    c: char,
    prev_char: Option<char>,
    next_char: Option<char>,
    is_filename: bool,
) -> char {
    if c == '"' {
        // opening: at start, or after a non-alphanumeric and before a word
        if prev_char.is_none()
            || prev_char.map_or(false, |p| {
                !p.is_alphanumeric() && next_char.map_or(false, |n| n.is_alphanumeric())
            })
        {
            return '\u{201C}';
        }
        // closing: at end, or after a word and before a non-alphanumeric
        if next_char.is_none()
            || next_char.map_or(false, |n| {
                !n.is_alphanumeric() && prev_char.map_or(false, |p| p.is_alphanumeric())
            })
        {
            return '\u{201D}';
        }
        return '\u{FF02}';
    }

    match c {
        '<' => '\u{FF1C}',
        '>' => '\u{FF1E}',
        ':' => '_',
        '|' => '\u{23D0}',
        '?' => '\u{FF1F}',
        '*' => '\u{2731}',
        '/' if is_filename => '\u{2215}',
        '\\' if is_filename => '_',
        c if c.is_control() => '_',
        c => c,
    }
}

fn handle_windows_reserved_names(name: &str) -> String {
    let upper = name.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    for reserved_name in &reserved {
        if upper == *reserved_name || upper.starts_with(&format!("{}.", reserved_name)) {
            return format!("_{}", name);
        }
    }

    name.to_string()
}

/// Truncate to at most `max_bytes`, on a char boundary
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut index = max_bytes.saturating_sub(3);
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }

    format!("{}...", text[..index].trim_end())
}
