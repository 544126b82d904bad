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


//! Streaming download of a single audio part
//!
//! The body is written to `<output>.part` and renamed once complete, so an
//! interrupted download never leaves a file under the final name.

use crate::download::progress::{DownloadProgress, DownloadState, ProgressTracker};
use crate::error::{OverdriveError, Result};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Identifies the part being downloaded in progress reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLabel {
    pub number: u32,
    pub count: usize,
}

/// `<output>.part`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut path: OsString = output.as_os_str().to_os_string();
    path.push(".part");
    PathBuf::from(path)
}

/// Download `url` to `output`, returning the number of bytes written
///
/// `callback` receives a snapshot after every chunk when the server sent a
/// content length, and once more when the part is complete.
pub async fn download_part<F>(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    output: &Path,
    label: PartLabel,
    mut callback: F,
) -> Result<u64>
where
    F: FnMut(DownloadProgress),
{
    debug!(url, output = %output.display(), "downloading part");

    let response = client.get(url).headers(headers).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(OverdriveError::DownloadFailed(format!(
            "{} returned {}",
            url, status
        )));
    }

    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let total = response.content_length().unwrap_or(0);
    let mut tracker = ProgressTracker::new(label.number, label.count, file_name, total);

    let temp_path = partial_path(output);
    let written = match write_body(response, &temp_path, &mut tracker, &mut callback).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
                warn!(path = %temp_path.display(), error = %remove_err, "could not remove partial file");
            }
            tracker.set_error(e.to_string());
            callback(tracker.clone_progress());
            return Err(e);
        }
    };

    tokio::fs::rename(&temp_path, output).await?;

    tracker.update(written);
    tracker.set_state(DownloadState::Completed);
    callback(tracker.clone_progress());
    debug!(
        output = %output.display(),
        bytes = written,
        elapsed_ms = tracker.elapsed().as_millis() as u64,
        "part complete"
    );

    Ok(written)
}

async fn write_body<F>(
    response: Response,
    temp_path: &Path,
    tracker: &mut ProgressTracker,
    callback: &mut F,
) -> Result<u64>
where
    F: FnMut(DownloadProgress),
{
    let file = File::create(temp_path).await?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            OverdriveError::network_error(format!("Connection dropped: {}", e), true)
        })?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;

        tracker.update(written);
        if tracker.get_progress().has_total() {
            callback(tracker.clone_progress());
        }
    }

    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("out/Part01.mp3")),
            PathBuf::from("out/Part01.mp3.part")
        );
    }
}
