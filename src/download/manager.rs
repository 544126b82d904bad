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


//! Loan download orchestration
//!
//! # Download Flow
//! 1. Acquire the license (`<odm>.license`, reused when present)
//! 2. Resolve book metadata (`<odm>.metadata`, generated from the ODM when absent)
//! 3. Create the output directory from the configured directory format
//! 4. Download every part in document order, skipping files that already exist
//! 5. Write `chapters.txt` with one entry per part
//!
//! Parts are fetched one at a time.

use crate::chapters::{marks_from_parts, write_chapters_file, CHAPTERS_FILE_NAME};
use crate::config::Config;
use crate::download::part::{download_part, PartLabel};
use crate::download::progress::{DownloadProgress, DownloadState};
use crate::error::{OverdriveError, Result};
use crate::file::paths::{render_dir_format, sanitize_filename};
use crate::odm::license::{license_path, License, LicenseClient};
use crate::odm::{sidecar_path, BookMetadata, OdmDocument};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a completed download produced
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub output_dir: PathBuf,
    /// Parts fetched in this run
    pub downloaded: Vec<PathBuf>,
    /// Parts that were already on disk
    pub skipped: Vec<PathBuf>,
    pub chapters_file: PathBuf,
    pub finished_at: DateTime<Utc>,
}

impl DownloadReport {
    pub fn total_parts(&self) -> usize {
        self.downloaded.len() + self.skipped.len()
    }
}

/// Downloads the parts of one ODM loan
pub struct OverDriveDownloader {
    odm_path: PathBuf,
    odm: OdmDocument,
    config: Config,
    license_client: LicenseClient,
    content_client: Client,
    output_base: Option<PathBuf>,
}

impl OverDriveDownloader {
    /// Load the ODM document and prepare HTTP clients
    pub async fn new<P: Into<PathBuf>>(odm_path: P, config: Config) -> Result<Self> {
        let odm_path = odm_path.into();
        let odm = OdmDocument::load(&odm_path).await?;
        let license_client = LicenseClient::new(config.clone())?;

        let content_client = Client::builder()
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self {
            odm_path,
            odm,
            config,
            license_client,
            content_client,
            output_base: None,
        })
    }

    /// Create output directories under `base` instead of the working directory
    pub fn with_output_base<P: Into<PathBuf>>(mut self, base: P) -> Self {
        self.output_base = Some(base.into());
        self
    }

    pub fn odm(&self) -> &OdmDocument {
        &self.odm
    }

    pub fn odm_path(&self) -> &Path {
        &self.odm_path
    }

    pub fn license_path(&self) -> PathBuf {
        license_path(&self.odm_path)
    }

    pub fn metadata_path(&self) -> PathBuf {
        sidecar_path(&self.odm_path, "metadata")
    }

    pub async fn acquire_license(&self) -> Result<License> {
        self.license_client
            .acquire_document(&self.odm, &self.license_path())
            .await
    }

    /// Book metadata from `<odm>.metadata`, writing that file from the ODM if missing
    pub async fn metadata(&self) -> Result<BookMetadata> {
        let path = self.metadata_path();

        let metadata = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            BookMetadata::parse(&content)?
        } else {
            let metadata = self.odm.metadata.clone();
            if metadata.is_complete() {
                tokio::fs::write(&path, metadata.to_xml()).await?;
                debug!(path = %path.display(), "wrote metadata file");
            }
            metadata
        };

        if !metadata.is_complete() {
            return Err(OverdriveError::MissingRequiredField(format!(
                "title and author in {}",
                path.display()
            )));
        }

        Ok(metadata)
    }

    /// Output directory for this book, from the configured directory format
    pub async fn output_dir(&self) -> Result<PathBuf> {
        let metadata = self.metadata().await?;
        let author = metadata.primary_author().unwrap_or_default();
        let title = metadata.title.as_deref().unwrap_or_default();

        let relative = render_dir_format(&self.config.dir_format, author, title)?;
        Ok(match self.output_base {
            Some(ref base) => base.join(relative),
            None => relative,
        })
    }

    /// Download every part and write the chapter list
    pub async fn download<F>(&self, mut callback: F) -> Result<DownloadReport>
    where
        F: FnMut(DownloadProgress),
    {
        let license_file = self.license_path();
        let license = License::load(&license_file).await?;
        let base_url = self.odm.require_download_base_url()?.trim_end_matches('/');
        if self.odm.parts.is_empty() {
            return Err(OverdriveError::missing_field("Part"));
        }

        let output_dir = self.output_dir().await?;
        tokio::fs::create_dir_all(&output_dir).await?;
        info!(output_dir = %output_dir.display(), parts = self.odm.parts.len(), "downloading loan");

        let mut downloaded = Vec::new();
        let mut skipped = Vec::new();
        let part_count = self.odm.parts.len();

        for part in &self.odm.parts {
            let output = output_dir.join(sanitize_filename(&part.output_name()));
            let label = PartLabel {
                number: part.number,
                count: part_count,
            };

            if output.exists() {
                debug!(path = %output.display(), "part already downloaded");
                let mut progress = DownloadProgress::new(
                    part.number,
                    part_count,
                    part.output_name(),
                    part.filesize.unwrap_or(0),
                );
                progress.state = DownloadState::Skipped;
                callback(progress);
                skipped.push(output);
                continue;
            }

            let url = format!("{}/{}", base_url, part.encoded_filename());
            let headers = self.part_headers(&license)?;
            download_part(&self.content_client, &url, headers, &output, label, &mut callback).await?;
            downloaded.push(output);
        }

        let chapters_file = output_dir.join(CHAPTERS_FILE_NAME);
        write_chapters_file(&chapters_file, &marks_from_parts(&self.odm.parts)).await?;

        info!(
            downloaded = downloaded.len(),
            skipped = skipped.len(),
            "download complete"
        );

        Ok(DownloadReport {
            output_dir,
            downloaded,
            skipped,
            chapters_file,
            finished_at: Utc::now(),
        })
    }

    pub async fn early_return(&self) -> Result<()> {
        self.license_client.early_return(&self.odm).await
    }

    fn part_headers(&self, license: &License) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.odm_user_agent)
                .map_err(|e| OverdriveError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("license"),
            license_header_value(&license.raw)?,
        );
        headers.insert(
            HeaderName::from_static("clientid"),
            HeaderValue::from_str(&license.client_id)
                .map_err(|e| OverdriveError::InvalidLicense(format!("Invalid ClientID: {}", e)))?,
        );
        Ok(headers)
    }
}

/// License text as a single-line header value
fn license_header_value(raw: &str) -> Result<HeaderValue> {
    let single_line: String = raw.lines().map(str::trim).collect();
    HeaderValue::from_bytes(single_line.as_bytes())
        .map_err(|e| OverdriveError::InvalidLicense(format!("License cannot be sent as a header: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odm::tests::SAMPLE_ODM;
    use tempfile::TempDir;

    async fn downloader(temp_dir: &TempDir) -> OverDriveDownloader {
        let odm_path = temp_dir.path().join("book.odm");
        tokio::fs::write(&odm_path, SAMPLE_ODM).await.unwrap();
        OverDriveDownloader::new(&odm_path, Config::default())
            .await
            .unwrap()
            .with_output_base(temp_dir.path())
    }

    #[test]
    fn test_license_header_value() {
        let value = license_header_value("<License>\n  <ClientID>X</ClientID>\r\n</License>").unwrap();
        assert_eq!(value.to_str().unwrap(), "<License><ClientID>X</ClientID></License>");
    }

    #[tokio::test]
    async fn test_metadata_file_is_generated() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(&temp_dir).await;

        let metadata = downloader.metadata().await.unwrap();
        assert_eq!(metadata.title.as_deref(), Some("The Left Hand of Darkness"));
        assert!(downloader.metadata_path().exists());

        // an edited sidecar wins over the ODM
        tokio::fs::write(
            downloader.metadata_path(),
            "<Metadata><Title>Edited</Title><Creators><Creator role=\"Author\">Someone</Creator></Creators></Metadata>",
        )
        .await
        .unwrap();
        let metadata = downloader.metadata().await.unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Edited"));
    }

    #[tokio::test]
    async fn test_incomplete_metadata_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(&temp_dir).await;
        tokio::fs::write(downloader.metadata_path(), "<Metadata><Title>Only</Title></Metadata>")
            .await
            .unwrap();

        assert!(matches!(
            downloader.metadata().await,
            Err(OverdriveError::MissingRequiredField(_))
        ));
    }

    #[tokio::test]
    async fn test_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(&temp_dir).await;
        assert_eq!(
            downloader.output_dir().await.unwrap(),
            temp_dir.path().join("Ursula K. Le Guin - The Left Hand of Darkness")
        );
    }

    #[tokio::test]
    async fn test_download_requires_license() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(&temp_dir).await;
        let result = downloader.download(|_| {}).await;
        assert!(matches!(result, Err(OverdriveError::LicenseNotAcquired(_))));
    }
}
