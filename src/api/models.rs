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


//! Book metadata records returned by the catalog and Audnex APIs
//!
//! Both APIs are loosely specified and fields come and go between regions, so
//! every record deserializes leniently: missing fields take a default and
//! numeric fields also accept numeric strings. Field names follow Audnex
//! (camelCase) with aliases for the catalog's snake_case spelling.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

fn unknown_author() -> String {
    "Unknown Author".to_string()
}

fn unknown_narrator() -> String {
    "Unknown Narrator".to_string()
}

fn unknown_series() -> String {
    "Unknown Series".to_string()
}

fn unknown_genre() -> String {
    "Unknown Genre".to_string()
}

fn unknown_chapter() -> String {
    "Unknown Chapter".to_string()
}

fn unknown_title() -> String {
    "Unknown Title".to_string()
}

fn unknown_publisher() -> String {
    "Unknown Publisher".to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts a JSON number, a numeric string, or null
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid integer: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid integer: {}", s))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("invalid integer: {}", other))),
    }
}

/// Accepts a JSON number, a numeric string, or null
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {}", s))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!("invalid number: {}", other))),
    }
}

/// Treats null like an absent field
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Series position may be a number or a string ("1", "2.5", "1-3")
fn lenient_position<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default = "unknown_author")]
    pub name: String,
    #[serde(default)]
    pub asin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrator {
    #[serde(default = "unknown_narrator")]
    pub name: String,
    #[serde(default)]
    pub asin: Option<String>,
}

/// Series membership
///
/// Audnex calls the fields `name`/`position`, the catalog `title`/`sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default = "unknown_series", alias = "title")]
    pub name: String,
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default, alias = "sequence", deserialize_with = "lenient_position")]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    #[serde(default = "unknown_genre")]
    pub name: String,
    #[serde(default)]
    pub asin: Option<String>,
}

/// Chapter marker with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default = "unknown_chapter")]
    pub title: String,

    /// Chapter duration in milliseconds
    #[serde(default, alias = "length_ms", deserialize_with = "lenient_i64")]
    pub length_ms: i64,

    /// Start offset in milliseconds from beginning of audiobook
    #[serde(default, alias = "start_offset_ms", deserialize_with = "lenient_i64")]
    pub start_offset_ms: i64,

    /// Start offset in seconds
    #[serde(default, alias = "start_offset_sec", deserialize_with = "lenient_f64")]
    pub start_offset_sec: f64,
}

/// Chapter list for a book
///
/// Individual chapters that fail to parse are dropped with a warning rather
/// than failing the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBookChapters")]
pub struct BookChapters {
    pub chapters: Vec<Chapter>,
    /// Whether chapter timing is accurate
    pub is_accurate: bool,
    pub runtime_length_ms: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBookChapters {
    #[serde(default)]
    chapters: Vec<Value>,
    #[serde(default = "default_true", alias = "is_accurate")]
    is_accurate: bool,
    #[serde(default, alias = "runtime_length_ms")]
    runtime_length_ms: Option<i64>,
}

impl From<RawBookChapters> for BookChapters {
    fn from(raw: RawBookChapters) -> Self {
        let chapters = raw
            .chapters
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match serde_json::from_value::<Chapter>(value) {
                Ok(chapter) => Some(chapter),
                Err(e) => {
                    warn!(index = idx, error = %e, "skipping malformed chapter");
                    None
                }
            })
            .collect();

        Self {
            chapters,
            is_accurate: raw.is_accurate,
            runtime_length_ms: raw.runtime_length_ms,
        }
    }
}

impl BookChapters {
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }
}

/// Detailed book record from Audnex `/books/{asin}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(default, deserialize_with = "lenient_string")]
    pub asin: String,

    #[serde(default = "unknown_title")]
    pub title: String,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(default)]
    pub narrators: Vec<Narrator>,

    /// Primary series
    #[serde(default, alias = "seriesPrimary")]
    pub series: Option<Series>,

    #[serde(default)]
    pub genres: Vec<Genre>,

    #[serde(default, alias = "runtime_length_ms", deserialize_with = "lenient_i64")]
    pub runtime_length_ms: i64,

    #[serde(default, alias = "runtime_length_min", deserialize_with = "lenient_i64")]
    pub runtime_length_min: i64,

    #[serde(default, alias = "release_date", deserialize_with = "lenient_string")]
    pub release_date: String,

    #[serde(default = "unknown_publisher", alias = "publisherName")]
    pub publisher: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub language: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub region: String,

    #[serde(
        default,
        alias = "summary",
        alias = "summary_html",
        deserialize_with = "lenient_string"
    )]
    pub summary_html: String,

    #[serde(default, alias = "summary_markdown", deserialize_with = "lenient_string")]
    pub summary_markdown: String,

    #[serde(
        default,
        alias = "image",
        alias = "image_url",
        deserialize_with = "lenient_string"
    )]
    pub image_url: String,
}

impl Book {
    /// Runtime in milliseconds, falling back to the minute-resolution field
    pub fn runtime_ms(&self) -> i64 {
        if self.runtime_length_ms > 0 {
            self.runtime_length_ms
        } else {
            self.runtime_length_min * 60_000
        }
    }

    /// Format authors for display: "Author1, Author2"
    pub fn format_authors(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The catalog returns `series` as a list, Audnex search as a single object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum SeriesField {
    Many(Vec<Series>),
    One(Series),
}

fn series_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Series>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<SeriesField>::deserialize(deserializer)? {
        Some(SeriesField::Many(list)) => list,
        Some(SeriesField::One(series)) => vec![series],
        None => Vec::new(),
    })
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub asin: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(default)]
    pub narrators: Vec<Narrator>,

    #[serde(default, deserialize_with = "series_list")]
    pub series: Vec<Series>,

    #[serde(default, alias = "releaseDate")]
    pub release_date: Option<String>,
}

impl Product {
    /// `" - Series Name #3"` for the first series, empty when there is none
    pub fn series_label(&self) -> String {
        match self.series.first() {
            Some(series) => match series.position {
                Some(ref pos) => format!(" - {} #{}", series.name, pos),
                None => format!(" - {}", series.name),
            },
            None => String::new(),
        }
    }

    /// Lines describing this product in a numbered result list
    pub fn display_lines(&self, index: usize) -> Vec<String> {
        let mut lines = vec![format!("{}. {}{}", index, self.title, self.series_label())];

        let authors: Vec<&str> = self.authors.iter().map(|a| a.name.as_str()).collect();
        if !authors.is_empty() {
            lines.push(format!("   By: {}", authors.join(", ")));
        }

        let narrators: Vec<&str> = self.narrators.iter().map(|n| n.name.as_str()).collect();
        if !narrators.is_empty() {
            lines.push(format!("   Narrated by: {}", narrators.join(", ")));
        }

        if let Some(ref date) = self.release_date {
            if !date.is_empty() {
                lines.push(format!("   Release Date: {}", date));
            }
        }

        lines
    }
}

/// Search response; absent `products` means no hits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
