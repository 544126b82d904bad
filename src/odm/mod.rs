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


//! OverDrive license-request documents (`.odm`)
//!
//! An ODM file is a small XML document describing one loan:
//!
//! ```xml
//! <OverDriveMedia id="{MEDIA-ID}" ODMVersion="3.0">
//!   <License><AcquisitionUrl>https://license.example/acquire</AcquisitionUrl></License>
//!   <![CDATA[<Metadata><Title>...</Title><Creators>...</Creators></Metadata>]]>
//!   <Formats><Format name="MP3 Audio Book">
//!     <Protocols><Protocol method="download" baseurl="https://cdn.example/book" /></Protocols>
//!     <Parts count="2">
//!       <Part number="1" filename="{ID}Fmt425-Part01.mp3" name="Part 1" duration="34:13" />
//!       ...
//!     </Parts>
//!   </Format></Formats>
//!   <EarlyReturnURL>https://return.example/?loan=...</EarlyReturnURL>
//! </OverDriveMedia>
//! ```
//!
//! The book metadata travels as an XML fragment, usually wrapped in CDATA, so it
//! is located textually and parsed on its own.

pub mod license;

use crate::error::{OverdriveError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

pub use license::{generate_client_id, License, LicenseClient};

const METADATA_OPEN: &str = "<Metadata";
const METADATA_CLOSE: &str = "</Metadata>";

/// Book metadata embedded in an ODM document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub series: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
}

impl BookMetadata {
    /// Parse a `<Metadata>...</Metadata>` fragment
    pub fn parse(fragment: &str) -> Result<Self> {
        let mut reader = Reader::from_str(fragment);
        reader.config_mut().trim_text(true);

        let mut metadata = BookMetadata::default();
        let mut stack: Vec<String> = Vec::new();
        let mut creator_role: Option<String> = None;
        let mut creator_name = String::new();
        let mut seen_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if name == "Metadata" {
                        seen_root = true;
                    }
                    if name == "Creator" {
                        creator_role = attributes(&e)?.remove("role");
                        creator_name.clear();
                    }
                    stack.push(name);
                }
                Event::End(_) => {
                    if stack.pop().as_deref() == Some("Creator") {
                        let name = creator_name.trim().to_string();
                        if !name.is_empty() {
                            match creator_role.as_deref() {
                                Some("Author") => metadata.authors.push(name),
                                Some("Narrator") => metadata.narrators.push(name),
                                _ => {}
                            }
                        }
                        creator_role = None;
                    }
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| OverdriveError::InvalidOdm(err.to_string()))?;
                    metadata.append_text(stack.last().map(String::as_str), &text, &mut creator_name);
                }
                Event::CData(e) => {
                    let raw = e.into_inner();
                    let text = String::from_utf8_lossy(&raw);
                    metadata.append_text(stack.last().map(String::as_str), &text, &mut creator_name);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(OverdriveError::InvalidOdm(
                "Could not find Metadata section".to_string(),
            ));
        }

        Ok(metadata)
    }

    fn append_text(&mut self, element: Option<&str>, text: &str, creator_name: &mut String) {
        let field = match element {
            Some("Title") => &mut self.title,
            Some("SubTitle") | Some("Subtitle") => &mut self.subtitle,
            Some("Series") => &mut self.series,
            Some("Publisher") => &mut self.publisher,
            Some("Description") => &mut self.description,
            Some("Creator") => {
                creator_name.push_str(text);
                return;
            }
            _ => return,
        };
        field.get_or_insert_with(String::new).push_str(text);
    }

    /// First listed author
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    /// Both title and author are known
    pub fn is_complete(&self) -> bool {
        self.title.as_deref().map_or(false, |t| !t.trim().is_empty())
            && self.primary_author().map_or(false, |a| !a.trim().is_empty())
    }

    /// Render back to a `<Metadata>` fragment (used for the `.metadata` sidecar)
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<Metadata>\n");
        if let Some(ref title) = self.title {
            xml.push_str(&format!("  <Title>{}</Title>\n", escape(title)));
        }
        if let Some(ref subtitle) = self.subtitle {
            xml.push_str(&format!("  <SubTitle>{}</SubTitle>\n", escape(subtitle)));
        }
        if let Some(ref series) = self.series {
            xml.push_str(&format!("  <Series>{}</Series>\n", escape(series)));
        }
        if !self.authors.is_empty() || !self.narrators.is_empty() {
            xml.push_str("  <Creators>\n");
            for author in &self.authors {
                xml.push_str(&format!("    <Creator role=\"Author\">{}</Creator>\n", escape(author)));
            }
            for narrator in &self.narrators {
                xml.push_str(&format!(
                    "    <Creator role=\"Narrator\">{}</Creator>\n",
                    escape(narrator)
                ));
            }
            xml.push_str("  </Creators>\n");
        }
        if let Some(ref publisher) = self.publisher {
            xml.push_str(&format!("  <Publisher>{}</Publisher>\n", escape(publisher)));
        }
        if let Some(ref description) = self.description {
            xml.push_str(&format!("  <Description>{}</Description>\n", escape(description)));
        }
        xml.push_str("</Metadata>\n");
        xml
    }
}

/// One audio file of the loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub number: u32,
    pub filename: String,
    pub name: Option<String>,
    /// `MM:SS` (sometimes `HH:MM:SS`)
    pub duration: Option<String>,
    pub filesize: Option<u64>,
}

impl Part {
    /// Filename percent-encoded for use in a URL path (`/` kept)
    pub fn encoded_filename(&self) -> String {
        self.filename
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Local file name: the text after the last `-` of the encoded filename
    pub fn output_name(&self) -> String {
        let encoded = self.encoded_filename();
        let suffix = encoded.rsplit('-').next().unwrap_or(&encoded);
        let suffix = suffix.rsplit('/').next().unwrap_or(suffix);
        if suffix.is_empty() {
            format!("Part{:02}.mp3", self.number)
        } else {
            suffix.to_string()
        }
    }

    /// Title used in the derived chapter list
    pub fn display_name(&self) -> String {
        match self.name {
            Some(ref name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("Part {}", self.number),
        }
    }
}

/// Parsed license-request document
#[derive(Debug, Clone, PartialEq)]
pub struct OdmDocument {
    pub media_id: String,
    pub acquisition_url: Option<String>,
    pub early_return_url: Option<String>,
    pub download_base_url: Option<String>,
    pub parts: Vec<Part>,
    /// Empty when the document carries no readable metadata
    pub metadata: BookMetadata,
}

impl OdmDocument {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OverdriveError::FileNotFound(path.display().to_string()));
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut media_id = None;
        let mut acquisition_url = None;
        let mut early_return_url = None;
        let mut download_base_url = None;
        let mut parts = Vec::new();
        let mut stack: Vec<String> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| OverdriveError::InvalidOdm(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    handle_element(&name, &e, &mut media_id, &mut download_base_url, &mut parts)?;
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    handle_element(&name, &e, &mut media_id, &mut download_base_url, &mut parts)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| OverdriveError::InvalidOdm(err.to_string()))?
                        .trim()
                        .to_string();
                    match stack.last().map(String::as_str) {
                        Some("AcquisitionUrl") => acquisition_url = Some(text),
                        Some("EarlyReturnURL") => early_return_url = Some(text),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let media_id = media_id.ok_or_else(|| OverdriveError::missing_field("OverDriveMedia id"))?;

        let metadata = match extract_metadata_fragment(content) {
            Some(fragment) => BookMetadata::parse(fragment).unwrap_or_else(|e| {
                warn!(error = %e, "error parsing ODM metadata");
                BookMetadata::default()
            }),
            None => {
                warn!("could not find Metadata section in ODM file");
                BookMetadata::default()
            }
        };

        Ok(Self {
            media_id,
            acquisition_url,
            early_return_url,
            download_base_url,
            parts,
            metadata,
        })
    }

    pub fn require_acquisition_url(&self) -> Result<&str> {
        self.acquisition_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OverdriveError::missing_field("AcquisitionUrl"))
    }

    pub fn require_download_base_url(&self) -> Result<&str> {
        self.download_base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OverdriveError::missing_field("download Protocol baseurl"))
    }

    pub fn require_early_return_url(&self) -> Result<&str> {
        self.early_return_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OverdriveError::missing_field("EarlyReturnURL"))
    }
}

fn handle_element(
    name: &str,
    e: &BytesStart<'_>,
    media_id: &mut Option<String>,
    download_base_url: &mut Option<String>,
    parts: &mut Vec<Part>,
) -> Result<()> {
    match name {
        "OverDriveMedia" => {
            *media_id = attributes(e)?.remove("id");
        }
        "Protocol" => {
            let mut attrs = attributes(e)?;
            if attrs.get("method").map(String::as_str) == Some("download") && download_base_url.is_none() {
                *download_base_url = attrs.remove("baseurl");
            }
        }
        "Part" => {
            let mut attrs = attributes(e)?;
            let number = attrs
                .get("number")
                .and_then(|n| n.trim().parse::<u32>().ok())
                .unwrap_or(parts.len() as u32 + 1);
            let filename = attrs
                .remove("filename")
                .ok_or_else(|| OverdriveError::missing_field(format!("filename of Part {}", number)))?;
            parts.push(Part {
                number,
                filename,
                name: attrs.remove("name"),
                duration: attrs.remove("duration"),
                filesize: attrs.get("filesize").and_then(|s| s.trim().parse().ok()),
            });
        }
        _ => {}
    }
    Ok(())
}

/// Locate the `<Metadata>` fragment, whether raw or wrapped in CDATA
pub fn extract_metadata_fragment(content: &str) -> Option<&str> {
    let start = content.find(METADATA_OPEN)?;
    let end = content[start..].find(METADATA_CLOSE)? + start + METADATA_CLOSE.len();
    Some(&content[start..end])
}

/// `<odm path>.<extension>`, e.g. `book.odm.license`
pub fn sidecar_path(odm_path: &Path, extension: &str) -> PathBuf {
    let mut path: OsString = odm_path.as_os_str().to_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| OverdriveError::InvalidOdm(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| OverdriveError::InvalidOdm(err.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_ODM: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<OverDriveMedia id="{2F1B4C9E-0D5A-4F7E-9B1C-7A3E5D6F8A90}" ODMVersion="3.0.0">
<License><AcquisitionUrl>https://license.example.com/acquire</AcquisitionUrl></License>
<![CDATA[<Metadata><ContentType>Audiobook</ContentType><Title>The Left Hand of Darkness</Title><SubTitle>A Novel</SubTitle><Series>Hainish Cycle</Series><Creators><Creator role="Author" file-as="Le Guin, Ursula K.">Ursula K. Le Guin</Creator><Creator role="Narrator">George Guidall</Creator></Creators><Publisher>Recorded Books</Publisher><Description>&lt;p&gt;Winter &amp; ice.&lt;/p&gt;</Description></Metadata>]]>
<Formats><Format name="MP3 Audio Book"><Protocols><Protocol method="download" baseurl="https://cdn.example.com/books/lhod" /></Protocols>
<Parts count="2">
<Part number="1" filename="{2F1B4C9E}Fmt425-Part01.mp3" name="Part 1" filesize="1024" duration="34:13" />
<Part number="2" filename="{2F1B4C9E}Fmt425-Part02.mp3" name="Part 2" filesize="2048" duration="10:05" />
</Parts></Format></Formats>
<EarlyReturnURL>https://return.example.com/return?loan=42&amp;x=1</EarlyReturnURL>
</OverDriveMedia>"#;

    #[test]
    fn test_parse_document() {
        let odm = OdmDocument::parse(SAMPLE_ODM).unwrap();
        assert_eq!(odm.media_id, "{2F1B4C9E-0D5A-4F7E-9B1C-7A3E5D6F8A90}");
        assert_eq!(
            odm.acquisition_url.as_deref(),
            Some("https://license.example.com/acquire")
        );
        assert_eq!(
            odm.early_return_url.as_deref(),
            Some("https://return.example.com/return?loan=42&x=1")
        );
        assert_eq!(
            odm.download_base_url.as_deref(),
            Some("https://cdn.example.com/books/lhod")
        );
        assert_eq!(odm.parts.len(), 2);
        assert_eq!(odm.parts[0].number, 1);
        assert_eq!(odm.parts[0].duration.as_deref(), Some("34:13"));
        assert_eq!(odm.parts[1].filesize, Some(2048));
    }

    #[test]
    fn test_parse_embedded_metadata() {
        let odm = OdmDocument::parse(SAMPLE_ODM).unwrap();
        let metadata = &odm.metadata;
        assert_eq!(metadata.title.as_deref(), Some("The Left Hand of Darkness"));
        assert_eq!(metadata.subtitle.as_deref(), Some("A Novel"));
        assert_eq!(metadata.series.as_deref(), Some("Hainish Cycle"));
        assert_eq!(metadata.primary_author(), Some("Ursula K. Le Guin"));
        assert_eq!(metadata.narrators, vec!["George Guidall".to_string()]);
        assert_eq!(metadata.description.as_deref(), Some("<p>Winter & ice.</p>"));
        assert!(metadata.is_complete());
    }

    #[test]
    fn test_missing_media_id() {
        let result = OdmDocument::parse("<OverDriveMedia><License/></OverDriveMedia>");
        assert!(matches!(result, Err(OverdriveError::MissingOdmField(_))));
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let odm = OdmDocument::parse(r#"<OverDriveMedia id="X"></OverDriveMedia>"#).unwrap();
        assert_eq!(odm.metadata, BookMetadata::default());
        assert!(odm.require_acquisition_url().is_err());
        assert!(odm.require_early_return_url().is_err());
    }

    #[test]
    fn test_part_encoding_and_output_name() {
        let part = Part {
            number: 3,
            filename: "{AB CD}Fmt425-Part03.mp3".to_string(),
            name: None,
            duration: None,
            filesize: None,
        };
        assert_eq!(part.encoded_filename(), "%7BAB%20CD%7DFmt425-Part03.mp3");
        assert_eq!(part.output_name(), "Part03.mp3");
        assert_eq!(part.display_name(), "Part 3");
    }

    #[test]
    fn test_metadata_round_trip_through_sidecar_xml() {
        let odm = OdmDocument::parse(SAMPLE_ODM).unwrap();
        let xml = odm.metadata.to_xml();
        assert!(xml.contains("<Creator role=\"Author\">Ursula K. Le Guin</Creator>"));
        assert_eq!(BookMetadata::parse(&xml).unwrap(), odm.metadata);
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/book.odm"), "license"),
            PathBuf::from("/tmp/book.odm.license")
        );
    }
}
