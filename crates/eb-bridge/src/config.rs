// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes.
//! Command-line flags are applied on top of the file by the binary.

use reqwest::header::{HeaderName, InvalidHeaderName};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{BridgeError, BridgeResult};

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BridgeConfig {
    /// Address the WebSocket endpoint listens on
    pub bind_addr: SocketAddr,

    /// Base URL of the experiment application
    pub experiment_url: Url,

    /// REST key for the application's session API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_key: Option<String>,

    /// User agent sent on every upstream request
    pub user_agent: String,

    /// Maximum concurrent agent connections (applied at upgrade time)
    pub connection_limit: usize,

    /// What to do when a participant code joins while its session is live
    pub rejoin_policy: RejoinPolicy,

    pub navigation: NavigationConfig,

    pub markers: PageMarkers,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8765)),
            experiment_url: default_experiment_url(),
            rest_key: None,
            user_agent: concat!("experiment-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
            connection_limit: 1024,
            rejoin_policy: RejoinPolicy::default(),
            navigation: NavigationConfig::default(),
            markers: PageMarkers::default(),
        }
    }
}

fn default_experiment_url() -> Url {
    Url::parse("http://localhost:8000").expect("default experiment URL is valid")
}

impl BridgeConfig {
    /// Load a TOML file, using defaults for missing keys.
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            BridgeError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let config = Self::from_toml(&text)?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            toml::from_str(text).map_err(|err| BridgeError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.connection_limit == 0 {
            return Err(BridgeError::Config(
                "connection-limit must be at least 1".into(),
            ));
        }
        if self.experiment_url.cannot_be_a_base() {
            return Err(BridgeError::Config(format!(
                "experiment-url {} cannot be used as a base URL",
                self.experiment_url
            )));
        }
        if self.markers.wait_header_name().is_err() {
            return Err(BridgeError::Config(format!(
                "wait-page-header {:?} is not a valid header name",
                self.markers.wait_page_header
            )));
        }
        if self.navigation.join_path.is_empty() {
            return Err(BridgeError::Config("navigation.join-path must not be empty".into()));
        }
        Ok(())
    }
}

/// Policy for a join whose participant code already has a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RejoinPolicy {
    /// Close the old session and start over (reconnecting agents)
    #[default]
    Replace,
    /// Refuse the second join
    Reject,
}

/// Timing and bounds of the navigation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NavigationConfig {
    /// Path, relative to the experiment URL, that starts a participant;
    /// the participant code is appended as the last segment.
    pub join_path: String,

    /// Timeout for redirects, submissions and page loads
    pub request_timeout_ms: u64,

    /// Timeout for polling a wait page again
    pub poll_timeout_ms: u64,

    /// Delay between two polls of a wait page
    pub barrier_poll_interval_ms: u64,

    /// Polls of one wait page before giving up
    pub max_barrier_polls: u32,

    /// Redirects plus click-throughs allowed within a single advance
    pub max_hops: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            join_path: "/InitializeParticipant/".to_string(),
            request_timeout_ms: 10_000,
            poll_timeout_ms: 30_000,
            barrier_poll_interval_ms: 2_000,
            max_barrier_polls: 30,
            max_hops: 64,
        }
    }
}

impl NavigationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn barrier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_interval_ms)
    }
}

/// Markers the experiment application uses to describe its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PageMarkers {
    /// `id` of the script block holding the page state as JSON
    pub state_block_id: String,

    /// Class of the element wrapping each form field
    pub field_wrapper_class: String,

    /// Response header present on wait pages
    pub wait_page_header: String,

    /// URL substring of the page shown after the last app
    pub terminal_url_marker: String,
}

impl Default for PageMarkers {
    fn default() -> Self {
        Self {
            state_block_id: "otree-data".to_string(),
            field_wrapper_class: "_formfield".to_string(),
            wait_page_header: "oTree-Wait-Page".to_string(),
            terminal_url_marker: "OutOfRangeNotification".to_string(),
        }
    }
}

impl PageMarkers {
    pub fn wait_header_name(&self) -> Result<HeaderName, InvalidHeaderName> {
        HeaderName::from_bytes(self.wait_page_header.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_experiment_app() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8765".parse().unwrap());
        assert_eq!(config.experiment_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.rejoin_policy, RejoinPolicy::Replace);
        assert_eq!(config.navigation.barrier_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.navigation.max_barrier_polls, 30);
        assert_eq!(config.navigation.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.navigation.poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.markers.wait_page_header, "oTree-Wait-Page");
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            experiment-url = "http://lab.example.org:8000/"
            rejoin-policy = "reject"

            [navigation]
            max-barrier-polls = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.experiment_url.host_str(), Some("lab.example.org"));
        assert_eq!(config.rejoin_policy, RejoinPolicy::Reject);
        assert_eq!(config.navigation.max_barrier_polls, 10);
        assert_eq!(config.navigation.barrier_poll_interval_ms, 2_000);
        assert_eq!(config.markers, PageMarkers::default());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connection-limit = 16").unwrap();
        writeln!(file, "[markers]").unwrap();
        writeln!(file, "terminal-url-marker = \"Finished\"").unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.connection_limit, 16);
        assert_eq!(config.markers.terminal_url_marker, "Finished");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            BridgeConfig::from_toml("connection-limit = 0"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("[markers]\nwait-page-header = \"not a header\""),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("experiment-url = 42"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_file(Path::new("/nonexistent/bridge.toml")),
            Err(BridgeError::Config(_))
        ));
    }
}
