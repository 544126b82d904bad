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


//! Audnex book and chapter lookups
//!
//! # Endpoints
//! - **GET** `/books/{asin}?region={region}&update=1` - book record
//! - **GET** `/books/{asin}/chapters?region={region}&update=1` - chapter list
//!
//! `update=1` asks Audnex to refresh its cached copy from the catalog.

use crate::api::client::{MetadataClient, Region};
use crate::api::models::{Book, BookChapters};
use crate::error::Result;
use tracing::info;

impl MetadataClient {
    /// Fetch the Audnex book record
    pub async fn get_book(&self, asin: &str, region: Region) -> Result<Book> {
        let url = format!(
            "{}/books/{}?region={}&update=1",
            self.audnex_url(),
            urlencoding::encode(asin),
            region.code()
        );
        self.get_json(&url).await
    }

    /// Fetch chapter timings for a book
    pub async fn get_chapters(&self, asin: &str, region: Region) -> Result<BookChapters> {
        let url = format!(
            "{}/books/{}/chapters?region={}&update=1",
            self.audnex_url(),
            urlencoding::encode(asin),
            region.code()
        );
        info!(url = %url, "fetching chapters");
        let chapters: BookChapters = self.get_json(&url).await?;
        info!(count = chapters.len(), accurate = chapters.is_accurate, "retrieved chapter data");
        Ok(chapters)
    }

    /// Fetch book record and chapters together
    pub async fn get_book_info(&self, asin: &str, region: Region) -> Result<(Book, BookChapters)> {
        let book = self.get_book(asin, region).await?;
        let chapters = self.get_chapters(asin, region).await?;
        Ok((book, chapters))
    }
}
