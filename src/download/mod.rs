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


//! Sequential download of the audio parts named in an ODM loan
//!
//! - [`part`] streams one part to disk
//! - [`manager`] drives license, metadata, parts and the chapter list
//! - [`progress`] snapshots reported to the caller while parts download

pub mod manager;
pub mod part;
pub mod progress;

pub use manager::{DownloadReport, OverDriveDownloader};
pub use part::download_part;
pub use progress::{DownloadProgress, DownloadState};
