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


//! License acquisition for ODM loans
//!
//! The lending service authenticates a desktop console by a random client id
//! and a hash derived from it. The returned license document is sent verbatim
//! in the `License` header of every part download.

use super::{sidecar_path, OdmDocument};
use crate::config::Config;
use crate::error::{OverdriveError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const HASH_SECRET: &str = "ELOSNOC*AIDEM*EVIRDREVO";

/// Generate a fresh `(client_id, hash)` pair
pub fn generate_client_id(config: &Config) -> (String, String) {
    let client_id = Uuid::new_v4().to_string().to_uppercase();
    let hash = license_hash(&client_id, &config.omc, &config.os);
    (client_id, hash)
}

/// base64(sha1(utf16le("{client_id}|{omc}|{os}|secret")))
pub fn license_hash(client_id: &str, omc: &str, os: &str) -> String {
    let raw = format!("{}|{}|{}|{}", client_id, omc, os, HASH_SECRET);
    let utf16: Vec<u8> = raw.encode_utf16().flat_map(u16::to_le_bytes).collect();

    let mut hasher = Sha1::new();
    hasher.update(&utf16);
    STANDARD.encode(hasher.finalize())
}

/// Acquired license document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    /// Trimmed license text, sent as the `License` header
    pub raw: String,
    pub client_id: String,
}

impl License {
    pub fn parse(text: &str) -> Result<Self> {
        let raw = text.trim().to_string();
        if raw.is_empty() {
            return Err(OverdriveError::InvalidLicense("license is empty".to_string()));
        }

        let mut reader = Reader::from_str(&raw);
        reader.config_mut().trim_text(true);
        let mut in_client_id = false;
        let mut client_id = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| OverdriveError::InvalidLicense(e.to_string()))?;
            match event {
                Event::Start(e) => in_client_id = e.local_name().as_ref() == b"ClientID",
                Event::End(_) => in_client_id = false,
                Event::Text(e) if in_client_id => {
                    let text = e
                        .unescape()
                        .map_err(|err| OverdriveError::InvalidLicense(err.to_string()))?;
                    client_id = Some(text.trim().to_string());
                    break;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OverdriveError::InvalidLicense("missing ClientID".to_string()))?;

        Ok(Self { raw, client_id })
    }

    /// Read a previously saved license. A missing or empty file means no license.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) if !text.trim().is_empty() => Self::parse(&text),
            Ok(_) => Err(OverdriveError::LicenseNotAcquired(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OverdriveError::LicenseNotAcquired(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `<odm>.license`
pub fn license_path(odm_path: &Path) -> PathBuf {
    sidecar_path(odm_path, "license")
}

/// Talks to the license and early-return endpoints named in an ODM
#[derive(Debug, Clone)]
pub struct LicenseClient {
    client: Client,
    config: Config,
}

impl LicenseClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.odm_user_agent)
                .map_err(|e| OverdriveError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Acquire the license for an ODM file, reusing a non-blank `<odm>.license`
    pub async fn acquire(&self, odm_path: &Path) -> Result<License> {
        let odm = OdmDocument::load(odm_path).await?;
        self.acquire_document(&odm, &license_path(odm_path)).await
    }

    pub async fn acquire_document(&self, odm: &OdmDocument, license_file: &Path) -> Result<License> {
        match tokio::fs::read_to_string(license_file).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(path = %license_file.display(), "license already acquired");
                return License::parse(&text);
            }
            Ok(_) => debug!(path = %license_file.display(), "license file is blank"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let acquisition_url = odm.require_acquisition_url()?;
        let (client_id, hash) = generate_client_id(&self.config);
        debug!(url = acquisition_url, client_id = %client_id, "requesting license");

        let mut url = Url::parse(acquisition_url)?;
        url.query_pairs_mut()
            .append_pair("MediaID", &odm.media_id)
            .append_pair("ClientID", &client_id)
            .append_pair("OMC", &self.config.omc)
            .append_pair("OS", &self.config.os)
            .append_pair("Hash", &hash);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OverdriveError::api_failed(
                format!("License request returned {}: {}", status, body.trim()),
                Some(status.as_u16()),
                Some(acquisition_url.to_string()),
            ));
        }

        let license = License::parse(&body)?;
        tokio::fs::write(license_file, &license.raw).await?;
        info!(path = %license_file.display(), "license acquired");

        Ok(license)
    }

    /// Return the loan before it expires
    pub async fn early_return(&self, odm: &OdmDocument) -> Result<()> {
        let url = odm.require_early_return_url()?;
        debug!(url, "returning loan");

        let response = self.client.get(Url::parse(url)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OverdriveError::api_failed(
                format!("Early return returned {}", status),
                Some(status.as_u16()),
                Some(url.to_string()),
            ));
        }

        info!(media_id = %odm.media_id, "loan returned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_LICENSE: &str = r#"
<License xmlns="http://license.overdrive.com/2008/03/License.xsd">
  <SignedInfo>
    <ContentID>2F1B4C9E-0D5A-4F7E-9B1C-7A3E5D6F8A90</ContentID>
    <ClientID>ABCDEF01-2345-4678-9ABC-DEF012345678</ClientID>
  </SignedInfo>
  <Signature>c2lnbmF0dXJl</Signature>
</License>
"#;

    #[test]
    fn test_license_hash() {
        assert_eq!(
            license_hash("ABCDEF01-2345-4678-9ABC-DEF012345678", "1.2.0", "10.11.6"),
            "CD7ReKdpuPk7mWjuDsWZvDs1jos="
        );
    }

    #[test]
    fn test_generate_client_id_is_uppercase_uuid() {
        let (client_id, hash) = generate_client_id(&Config::default());
        assert_eq!(client_id.len(), 36);
        assert_eq!(client_id, client_id.to_uppercase());
        assert!(Uuid::parse_str(&client_id).is_ok());
        assert_eq!(hash, license_hash(&client_id, "1.2.0", "10.11.6"));
    }

    #[test]
    fn test_parse_license() {
        let license = License::parse(SAMPLE_LICENSE).unwrap();
        assert_eq!(license.client_id, "ABCDEF01-2345-4678-9ABC-DEF012345678");
        assert!(license.raw.starts_with("<License"));
        assert!(license.raw.ends_with("</License>"));
    }

    #[test]
    fn test_parse_license_without_client_id() {
        let result = License::parse("<License><SignedInfo/></License>");
        assert!(matches!(result, Err(OverdriveError::InvalidLicense(_))));
    }

    #[tokio::test]
    async fn test_load_missing_license() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.odm.license");
        assert!(matches!(
            License::load(&path).await,
            Err(OverdriveError::LicenseNotAcquired(_))
        ));

        tokio::fs::write(&path, "  ").await.unwrap();
        assert!(matches!(
            License::load(&path).await,
            Err(OverdriveError::LicenseNotAcquired(_))
        ));
    }

    #[tokio::test]
    async fn test_existing_license_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.odm.license");
        tokio::fs::write(&path, SAMPLE_LICENSE).await.unwrap();

        // the acquisition URL is unroutable, so any request would fail
        let odm = OdmDocument::parse(
            r#"<OverDriveMedia id="X"><License><AcquisitionUrl>http://127.0.0.1:1/</AcquisitionUrl></License></OverDriveMedia>"#,
        )
        .unwrap();
        let client = LicenseClient::new(Config::default()).unwrap();
        let license = client.acquire_document(&odm, &path).await.unwrap();
        assert_eq!(license.client_id, "ABCDEF01-2345-4678-9ABC-DEF012345678");
    }
}
