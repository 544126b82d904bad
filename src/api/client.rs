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


//! HTTP client for the book metadata APIs
//!
//! Wraps `reqwest::Client` with:
//! - Region-specific catalog base URLs
//! - A fixed user agent and request timeout
//! - Retry with exponential backoff
//!
//! ## Retry Strategy
//! - Maximum 3 attempts (1 initial + 2 retries)
//! - Exponential backoff: 2s, then 4s between attempts
//! - 429 Rate Limiting: next wait is `Retry-After + 1` seconds (5 when absent)
//! - No wait is longer than `max_retry_delay`
//! - 404 Not Found: fail immediately
//! - Everything else (network errors, other statuses): retry
//! - No sleep after the final attempt

use crate::config::Config;
use crate::error::{OverdriveError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry-After value assumed when a 429 response carries none
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Catalog regions served by the Audible API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Australia - audible.com.au
    Au,
    /// Canada - audible.ca
    Ca,
    /// Germany - audible.de
    De,
    /// Spain - audible.es
    Es,
    /// France - audible.fr
    Fr,
    /// India - audible.in
    In,
    /// Italy - audible.it
    It,
    /// Japan - audible.co.jp
    Jp,
    /// United States - audible.com
    Us,
    /// United Kingdom - audible.co.uk
    Uk,
}

impl Region {
    /// All regions, sorted by code
    pub fn all() -> [Region; 10] {
        [
            Self::Au,
            Self::Ca,
            Self::De,
            Self::Es,
            Self::Fr,
            Self::In,
            Self::It,
            Self::Jp,
            Self::Uk,
            Self::Us,
        ]
    }

    /// Parse a region code such as `us` or `UK`
    pub fn parse(code: &str) -> Result<Self> {
        match code.trim().to_lowercase().as_str() {
            "au" => Ok(Self::Au),
            "ca" => Ok(Self::Ca),
            "de" => Ok(Self::De),
            "es" => Ok(Self::Es),
            "fr" => Ok(Self::Fr),
            "in" => Ok(Self::In),
            "it" => Ok(Self::It),
            "jp" => Ok(Self::Jp),
            "us" => Ok(Self::Us),
            "uk" => Ok(Self::Uk),
            _ => Err(OverdriveError::InvalidRegion(code.to_string())),
        }
    }

    /// Region code as used in Audnex query strings
    pub fn code(&self) -> &'static str {
        match self {
            Self::Au => "au",
            Self::Ca => "ca",
            Self::De => "de",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::In => "in",
            Self::It => "it",
            Self::Jp => "jp",
            Self::Us => "us",
            Self::Uk => "uk",
        }
    }

    /// Audible top-level domain for this region
    pub fn tld(&self) -> &'static str {
        match self {
            Self::Au => "com.au",
            Self::Ca => "ca",
            Self::De => "de",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::In => "in",
            Self::It => "it",
            Self::Jp => "co.jp",
            Self::Us => "com",
            Self::Uk => "co.uk",
        }
    }

    /// Catalog product search endpoint
    pub fn catalog_url(&self) -> String {
        format!("https://api.audible.{}/1.0/catalog/products", self.tld())
    }

    /// Comma separated list of codes for prompts and error messages
    pub fn codes_display() -> String {
        Self::all()
            .iter()
            .map(|r| r.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::Us
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Client for the catalog and Audnex APIs
///
/// # Example
/// ```rust,no_run
/// use overdrive_tools::api::{MetadataClient, Region};
/// use overdrive_tools::config::Config;
///
/// # async fn example() -> overdrive_tools::error::Result<()> {
/// let client = MetadataClient::new(Config::default())?;
/// let results = client.search("Dune Frank Herbert", Region::Us).await;
/// println!("{} products", results.products.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    config: Config,
}

impl MetadataClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| OverdriveError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Catalog endpoint for a region, honoring the configured override
    pub fn catalog_url(&self, region: Region) -> String {
        match self.config.catalog_base_url {
            Some(ref url) => url.clone(),
            None => region.catalog_url(),
        }
    }

    pub fn audnex_url(&self) -> &str {
        &self.config.audnex_base_url
    }

    /// GET a URL and return the raw body
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.request_with_retry(url, |client| client.get(url)).await
    }

    /// GET a URL with query parameters and return the raw body
    pub async fn get_bytes_with_query<Q>(&self, url: &str, query: &Q) -> Result<Vec<u8>>
    where
        Q: Serialize + ?Sized,
    {
        self.request_with_retry(url, |client| client.get(url).query(query))
            .await
    }

    /// GET a URL and deserialize the JSON body
    pub async fn get_json<T>(&self, url: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.get_bytes(url).await?;
        parse_json(&body)
    }

    /// GET a URL with query parameters and deserialize the JSON body
    pub async fn get_json_with_query<T, Q>(&self, url: &str, query: &Q) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let body = self.get_bytes_with_query(url, query).await?;
        parse_json(&body)
    }

    /// Execute a request with retry logic and exponential backoff
    ///
    /// Retry strategy:
    /// - Attempt 1: Immediate
    /// - Attempt 2: After `initial_retry_delay` (or Retry-After + 1 on 429)
    /// - Attempt 3: After twice the previous delay
    async fn request_with_retry<F>(&self, url: &str, request_builder: F) -> Result<Vec<u8>>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_retry_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url, attempt, "GET");

            let error = match request_builder(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.bytes().await?.to_vec());
                    }

                    match status {
                        StatusCode::NOT_FOUND => {
                            return Err(OverdriveError::NotFound(url.to_string()));
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            let retry_after = extract_retry_after(response.headers());
                            delay = rate_limit_delay(retry_after, self.config.max_retry_delay);
                            OverdriveError::RateLimitExceeded {
                                retry_after_seconds: retry_after,
                                endpoint: url.to_string(),
                            }
                        }
                        _ => {
                            let body = response.text().await.unwrap_or_default();
                            OverdriveError::api_failed(
                                format!("{} {}", status, truncate(&body, 200)),
                                Some(status.as_u16()),
                                Some(url.to_string()),
                            )
                        }
                    }
                }
                Err(e) => OverdriveError::network_error(
                    format!("Network request failed: {}", e),
                    e.is_timeout() || e.is_connect() || e.is_request(),
                ),
            };

            if attempt >= max_attempts {
                return Err(error);
            }

            warn!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "request failed, retrying"
            );
            sleep(delay).await;
            delay = delay.saturating_mul(2).min(self.config.max_retry_delay);
        }
    }
}

/// Parse JSON, keeping a snippet of the body around the failure for diagnostics
fn parse_json<T>(body: &[u8]) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice::<T>(body).map_err(|e| {
        let text = String::from_utf8_lossy(body);
        OverdriveError::InvalidApiResponse {
            message: format!("Parse error: {} at line {} col {}", e, e.line(), e.column()),
            response_body: Some(truncate(&text, 800)),
        }
    })
}

fn extract_retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// `Retry-After + 1` seconds, capped at `max`
fn rate_limit_delay(retry_after: u64, max: Duration) -> Duration {
    Duration::from_secs(retry_after.saturating_add(1)).min(max)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse() {
        assert_eq!(Region::parse("us").unwrap(), Region::Us);
        assert_eq!(Region::parse(" UK ").unwrap(), Region::Uk);
        assert_eq!(Region::parse("jp").unwrap(), Region::Jp);
        assert!(matches!(
            Region::parse("br"),
            Err(OverdriveError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_region_catalog_url() {
        assert_eq!(
            Region::Us.catalog_url(),
            "https://api.audible.com/1.0/catalog/products"
        );
        assert_eq!(
            Region::Au.catalog_url(),
            "https://api.audible.com.au/1.0/catalog/products"
        );
        assert_eq!(
            Region::Jp.catalog_url(),
            "https://api.audible.co.jp/1.0/catalog/products"
        );
        assert_eq!(
            Region::Uk.catalog_url(),
            "https://api.audible.co.uk/1.0/catalog/products"
        );
    }

    #[test]
    fn test_region_codes_sorted() {
        assert_eq!(
            Region::codes_display(),
            "au, ca, de, es, fr, in, it, jp, uk, us"
        );
    }

    #[test]
    fn test_extract_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_retry_after(&headers), 5);
        headers.insert("retry-after", HeaderValue::from_static("12"));
        assert_eq!(extract_retry_after(&headers), 12);
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(extract_retry_after(&headers), 5);
    }

    #[test]
    fn test_rate_limit_delay() {
        let max = Duration::from_secs(300);
        assert_eq!(rate_limit_delay(0, max), Duration::from_secs(1));
        assert_eq!(rate_limit_delay(12, max), Duration::from_secs(13));
        assert_eq!(rate_limit_delay(u64::MAX, max), max);
    }

    #[test]
    fn test_catalog_url_override() {
        let config = Config::builder()
            .catalog_base_url("http://127.0.0.1:1/catalog")
            .build();
        let client = MetadataClient::new(config).unwrap();
        assert_eq!(client.catalog_url(Region::De), "http://127.0.0.1:1/catalog");
    }

    #[test]
    fn test_parse_json_error_keeps_body() {
        let result = parse_json::<serde_json::Value>(b"{not json");
        match result {
            Err(OverdriveError::InvalidApiResponse { response_body, .. }) => {
                assert_eq!(response_body.as_deref(), Some("{not json"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
