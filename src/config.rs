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


//! Runtime configuration shared by both pipelines
//!
//! Defaults match what the lending service and the metadata APIs expect from a
//! desktop client. Every value can be changed through [`ConfigBuilder`], and the
//! user-facing ones through `OVERDRIVE_TOOLS_*` environment variables.

use std::time::Duration;

/// User agent sent to the catalog and Audnex APIs
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// User agent the lending service expects from its desktop console
pub const DEFAULT_ODM_USER_AGENT: &str = "OverDrive Media Console";

/// Console version reported during license acquisition
pub const DEFAULT_OMC: &str = "1.2.0";

/// Operating system version reported during license acquisition
pub const DEFAULT_OS: &str = "10.11.6";

/// Output directory template (`@AUTHOR` and `@TITLE` are substituted)
pub const DEFAULT_DIR_FORMAT: &str = "@AUTHOR - @TITLE";

/// Audnex API root
pub const DEFAULT_AUDNEX_URL: &str = "https://api.audnex.us";

/// 3 total attempts per request
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles after every failed attempt
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Upper bound for any single wait between attempts, including `Retry-After`
const DEFAULT_MAX_RETRY_DELAY_SECS: u64 = 300;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_PREFIX: &str = "OVERDRIVE_TOOLS_";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub user_agent: String,
    pub odm_user_agent: String,
    pub omc: String,
    pub os: String,
    pub dir_format: String,
    /// Default catalog region code
    pub region: String,
    pub max_attempts: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub timeout: Duration,
    /// Replaces the region-derived catalog URL when set
    pub catalog_base_url: Option<String>,
    pub audnex_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            odm_user_agent: DEFAULT_ODM_USER_AGENT.to_string(),
            omc: DEFAULT_OMC.to_string(),
            os: DEFAULT_OS.to_string(),
            dir_format: DEFAULT_DIR_FORMAT.to_string(),
            region: "us".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            max_retry_delay: Duration::from_secs(DEFAULT_MAX_RETRY_DELAY_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            catalog_base_url: None,
            audnex_base_url: DEFAULT_AUDNEX_URL.to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Defaults overridden by any `OVERDRIVE_TOOLS_*` variables that are set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = var("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = var("ODM_USER_AGENT") {
            config.odm_user_agent = v;
        }
        if let Some(v) = var("OMC") {
            config.omc = v;
        }
        if let Some(v) = var("OS") {
            config.os = v;
        }
        if let Some(v) = var("DIR_FORMAT") {
            config.dir_format = v;
        }
        if let Some(v) = var("REGION") {
            config.region = v.to_lowercase();
        }
        if let Some(v) = var("AUDNEX_URL") {
            config.audnex_base_url = v.trim_end_matches('/').to_string();
        }

        config
    }
}

/// Builder for Config
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn odm_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.odm_user_agent = user_agent.into();
        self
    }

    pub fn omc<S: Into<String>>(mut self, omc: S) -> Self {
        self.config.omc = omc.into();
        self
    }

    pub fn os<S: Into<String>>(mut self, os: S) -> Self {
        self.config.os = os.into();
        self
    }

    pub fn dir_format<S: Into<String>>(mut self, format: S) -> Self {
        self.config.dir_format = format.into();
        self
    }

    pub fn region<S: Into<String>>(mut self, region: S) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.config.initial_retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn catalog_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.catalog_base_url = Some(url.into());
        self
    }

    pub fn audnex_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.audnex_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.omc, "1.2.0");
        assert_eq!(config.os, "10.11.6");
        assert_eq!(config.dir_format, "@AUTHOR - @TITLE");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_retry_delay, Duration::from_secs(2));
        assert_eq!(config.max_retry_delay, Duration::from_secs(300));
        assert!(config.catalog_base_url.is_none());
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .region("uk")
            .max_attempts(0)
            .initial_retry_delay(Duration::from_millis(10))
            .audnex_base_url("http://localhost:9000/")
            .build();

        assert_eq!(config.region, "uk");
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(10));
        assert_eq!(config.audnex_base_url, "http://localhost:9000");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OVERDRIVE_TOOLS_REGION", "DE"),
            ("OVERDRIVE_TOOLS_DIR_FORMAT", "@TITLE"),
            ("OVERDRIVE_TOOLS_OMC", "  "),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.region, "de");
        assert_eq!(config.dir_format, "@TITLE");
        // blank values are ignored
        assert_eq!(config.omc, DEFAULT_OMC);
    }
}
