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


//! Catalog search with Audnex fallback
//!
//! # Search Flow
//! 1. `GET {catalog}?response_groups=...&num_results=10&products_sort_by=Relevance&keywords=...`
//! 2. If the JSON has a `products` key, that is the answer
//! 3. Otherwise `GET {audnex}/search/{region}?title={keywords}`
//!
//! Search never fails: any error is logged and turns into an empty result list.

use crate::api::client::{MetadataClient, Region};
use crate::api::models::SearchResults;
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, error, info};

/// Response groups requested from the catalog
pub const RESPONSE_GROUPS: &str =
    "contributors,product_attrs,product_desc,product_extended_attrs,series";

/// Results per search
pub const NUM_RESULTS: u32 = 10;

impl MetadataClient {
    /// Search for books matching free-text keywords
    pub async fn search(&self, keywords: &str, region: Region) -> SearchResults {
        match self.try_search(keywords, region).await {
            Ok(results) => results,
            Err(e) => {
                error!(keywords, region = %region, error = %e, "error during search");
                SearchResults::default()
            }
        }
    }

    /// Search by author and title; keywords are `"{title} {author}"`
    pub async fn search_book(&self, author: &str, title: &str, region: Region) -> SearchResults {
        let keywords = search_keywords(author, title);
        info!(query = %keywords, region = %region, "searching catalog");
        self.search(&keywords, region).await
    }

    async fn try_search(&self, keywords: &str, region: Region) -> Result<SearchResults> {
        let num_results = NUM_RESULTS.to_string();
        let query = [
            ("response_groups", RESPONSE_GROUPS),
            ("num_results", num_results.as_str()),
            ("products_sort_by", "Relevance"),
            ("keywords", keywords),
        ];

        let catalog_url = self.catalog_url(region);
        let response: Value = self.get_json_with_query(&catalog_url, &query).await?;
        if response.get("products").is_some() {
            return Ok(serde_json::from_value(response)?);
        }

        debug!("catalog response has no products, falling back to audnex");
        let fallback_url = format!(
            "{}/search/{}?title={}",
            self.audnex_url(),
            region.code(),
            urlencoding::encode(keywords)
        );
        self.get_json(&fallback_url).await
    }
}

pub fn search_keywords(author: &str, title: &str) -> String {
    format!("{} {}", title.trim(), author.trim()).trim().to_string()
}
