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


//! Book metadata API clients
//!
//! Two loosely specified JSON APIs are used to find chapter boundaries:
//! - The region-specific Audible catalog (`/1.0/catalog/products`) for search
//! - Audnex (`api.audnex.us`) for book records, chapters, and search fallback
//!
//! All requests go through [`MetadataClient`], which owns the retry policy.

pub mod audnex;
pub mod catalog;
pub mod client;
pub mod models;

// Re-export commonly used types
pub use client::{MetadataClient, Region};
pub use models::{Author, Book, BookChapters, Chapter, Genre, Narrator, Product, SearchResults, Series};
