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


//! Chapter lookup for a downloaded book
//!
//! Works out which book a directory holds, lets the user pick the matching
//! catalog entry and writes its chapter list next to the audio files.

use super::{write_chapters_file, ChapterMark, CHAPTERS_FILE_NAME};
use crate::api::{BookChapters, MetadataClient, Product, Region};
use crate::error::{OverdriveError, Result};
use crate::odm::OdmDocument;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Interactive input used while extracting chapters
pub trait Prompter {
    /// Ask a question. An empty answer yields `default` when one is given.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String>;

    /// Show a line of output to the user
    fn show(&mut self, text: &str);
}

/// Author and title used for the catalog search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookInfo {
    pub author: String,
    pub title: String,
    pub series: Option<String>,
}

impl BookInfo {
    fn is_complete(&self) -> bool {
        !self.author.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// Outcome of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub path: PathBuf,
    pub chapter_count: usize,
    pub is_accurate: bool,
}

pub struct ChapterExtractor {
    directory: PathBuf,
    client: MetadataClient,
}

impl ChapterExtractor {
    pub fn new<P: Into<PathBuf>>(directory: P, client: MetadataClient) -> Self {
        Self {
            directory: directory.into(),
            client,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Determine author and title
    ///
    /// Tries, in order: the first `.odm` file in the directory, a directory
    /// name of the form `Author - Title`, then the prompter.
    pub async fn book_info<P>(&self, prompter: &mut P) -> Result<BookInfo>
    where
        P: Prompter + ?Sized,
    {
        if let Some(odm_path) = self.first_odm_file().await? {
            match OdmDocument::load(&odm_path).await {
                Ok(odm) if odm.metadata.is_complete() => {
                    debug!(path = %odm_path.display(), "book info from ODM metadata");
                    let metadata = odm.metadata;
                    return Ok(BookInfo {
                        author: metadata.primary_author().unwrap_or_default().to_string(),
                        title: metadata.title.unwrap_or_default(),
                        series: metadata.series,
                    });
                }
                Ok(_) => debug!(path = %odm_path.display(), "ODM metadata lacks title or author"),
                Err(e) => warn!(path = %odm_path.display(), error = %e, "error parsing ODM file"),
            }
        }

        if let Some(info) = self.info_from_directory_name().await {
            debug!(author = %info.author, title = %info.title, "book info from directory name");
            return Ok(info);
        }

        prompter.show("Could not determine book information automatically.");
        let author = prompter.ask("Enter author name", None)?;
        let title = prompter.ask("Enter book title", None)?;
        Ok(BookInfo {
            author: author.trim().to_string(),
            title: title.trim().to_string(),
            series: None,
        })
    }

    /// Search, select and write `chapters.txt` into the directory
    pub async fn extract<P>(&self, region: Region, prompter: &mut P) -> Result<ExtractionReport>
    where
        P: Prompter + ?Sized,
    {
        let info = self.book_info(prompter).await?;
        if !info.is_complete() {
            return Err(OverdriveError::invalid_input(
                "Could not determine book information",
            ));
        }

        prompter.show(&format!("Searching for: {} by {}", info.title, info.author));
        let results = self
            .client
            .search_book(&info.author, &info.title, region)
            .await;

        let product = select_product(&results.products, Some("1"), prompter)?
            .ok_or(OverdriveError::Cancelled)?;
        let asin = product_asin(product)?;

        let chapters = self.client.get_chapters(asin, region).await?;
        let path = self.directory.join(CHAPTERS_FILE_NAME);
        save_chapters(&path, &chapters, prompter).await
    }

    /// Standalone lookup for an explicit author and title
    pub async fn search_and_get_chapters<P>(
        client: &MetadataClient,
        author: &str,
        title: &str,
        region: Region,
        output: &Path,
        prompter: &mut P,
    ) -> Result<ExtractionReport>
    where
        P: Prompter + ?Sized,
    {
        if author.trim().is_empty() || title.trim().is_empty() {
            return Err(OverdriveError::invalid_input(
                "Both author and title are required.",
            ));
        }

        prompter.show(&format!(
            "Searching for: {} in region: {}",
            crate::api::catalog::search_keywords(author, title),
            region
        ));
        let results = client.search_book(author, title, region).await;

        let product = select_product(&results.products, None, prompter)?
            .ok_or(OverdriveError::Cancelled)?;
        let asin = product_asin(product)?;

        let (book, chapters) = client.get_book_info(asin, region).await?;
        prompter.show(&format!("Selected: {} by {}", book.title, book.format_authors()));
        save_chapters(output, &chapters, prompter).await
    }

    async fn first_odm_file(&self) -> Result<Option<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OverdriveError::FileNotFound(
                    self.directory.display().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let mut odm_files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_odm = path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("odm"));
            if is_odm && path.is_file() {
                odm_files.push(path);
            }
        }

        odm_files.sort();
        Ok(odm_files.into_iter().next())
    }

    async fn info_from_directory_name(&self) -> Option<BookInfo> {
        let absolute = tokio::fs::canonicalize(&self.directory)
            .await
            .unwrap_or_else(|_| self.directory.clone());
        let name = absolute.file_name()?.to_string_lossy().into_owned();
        let (author, title) = name.split_once(" - ")?;

        let info = BookInfo {
            author: author.trim().to_string(),
            title: title.trim().to_string(),
            series: None,
        };
        info.is_complete().then_some(info)
    }
}

/// List the products and ask for a choice
///
/// Returns `None` when the user enters `0` or nothing. Anything that is not a
/// listed number is asked again.
pub fn select_product<'a, P>(
    products: &'a [Product],
    default: Option<&str>,
    prompter: &mut P,
) -> Result<Option<&'a Product>>
where
    P: Prompter + ?Sized,
{
    if products.is_empty() {
        return Err(OverdriveError::NoResults("No results found".to_string()));
    }

    prompter.show("Search Results:");
    for (i, product) in products.iter().enumerate() {
        for line in product.display_lines(i + 1) {
            prompter.show(&line);
        }
        prompter.show("");
    }

    loop {
        let choice = prompter.ask("Select a book number (0 to exit)", default)?;
        let choice = choice.trim();
        if choice.is_empty() || choice == "0" {
            return Ok(None);
        }

        match choice.parse::<usize>() {
            Ok(n) if (1..=products.len()).contains(&n) => return Ok(Some(&products[n - 1])),
            Ok(_) => prompter.show("Invalid choice. Please try again."),
            Err(_) => prompter.show("Please enter a valid number."),
        }
    }
}

fn product_asin(product: &Product) -> Result<&str> {
    product
        .asin
        .as_deref()
        .filter(|asin| !asin.is_empty())
        .ok_or_else(|| OverdriveError::MissingRequiredField("asin".to_string()))
}

async fn save_chapters<P>(
    path: &Path,
    chapters: &BookChapters,
    prompter: &mut P,
) -> Result<ExtractionReport>
where
    P: Prompter + ?Sized,
{
    if chapters.is_empty() {
        return Err(OverdriveError::NoResults("No chapters found".to_string()));
    }

    let marks: Vec<ChapterMark> = chapters
        .chapters
        .iter()
        .map(|c| ChapterMark::new(c.start_offset_sec, c.title.clone()))
        .collect();
    write_chapters_file(path, &marks).await?;

    info!(path = %path.display(), count = marks.len(), "chapters saved");
    if !chapters.is_accurate {
        warn!("chapter timestamps may be approximate");
        prompter.show("Note: Chapter timestamps may be approximate");
    }

    Ok(ExtractionReport {
        path: path.to_path_buf(),
        chapter_count: marks.len(),
        is_accurate: chapters.is_accurate,
    })
}
