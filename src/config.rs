//! Engine and live-feed settings, loadable from YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{FusionError, FusionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Maximum number of vehicle reports in the rendered trail.
    pub bsm_trail_length: usize,
    /// Default trailing-window width.
    pub time_window_seconds: i64,
    /// Radius in metres around the MAP reference point for historical BSM pulls.
    pub bsm_search_radius: f64,
    pub live_advance_interval_ms: u64,
    /// Hard cap per stream buffer.
    pub max_buffer_records: usize,
    pub notice_capacity: usize,
    pub view: ViewDefaults,
    pub live: LiveModeDefaults,
    pub feed: LiveFeedConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            bsm_trail_length: 20,
            time_window_seconds: 60,
            bsm_search_radius: 500.0,
            live_advance_interval_ms: 1_000,
            max_buffer_records: 100_000,
            notice_capacity: 64,
            view: ViewDefaults::default(),
            live: LiveModeDefaults::default(),
            feed: LiveFeedConfig::default(),
        }
    }
}

impl FusionConfig {
    pub fn load(path: impl AsRef<Path>) -> FusionResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| FusionError::Config(format!("{}: {err}", path.display())))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> FusionResult<Self> {
        serde_yaml::from_str(contents).map_err(|err| FusionError::Config(err.to_string()))
    }

    pub fn live_advance_interval(&self) -> Duration {
        Duration::from_millis(self.live_advance_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefaults {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            latitude: 39.587905,
            longitude: -105.0907089,
            zoom: 19.0,
        }
    }
}

/// Query shape applied on entering live mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveModeDefaults {
    pub seconds_before: i64,
    pub seconds_after: i64,
    pub window_seconds: i64,
}

impl Default for LiveModeDefaults {
    fn default() -> Self {
        Self {
            seconds_before: 10,
            seconds_after: 0,
            window_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveFeedConfig {
    /// Websocket endpoint of the STOMP broker.
    pub url: String,
    pub connect_timeout_ms: u64,
    pub outbound_capacity: usize,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8081/stomp".to_string(),
            connect_timeout_ms: 10_000,
            outbound_capacity: 64,
        }
    }
}

impl LiveFeedConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = FusionConfig::from_yaml(
            "bsm_trail_length: 5\nfeed:\n  url: wss://cv.example.org/stomp\n",
        )
        .unwrap();
        assert_eq!(config.bsm_trail_length, 5);
        assert_eq!(config.time_window_seconds, 60);
        assert_eq!(config.feed.url, "wss://cv.example.org/stomp");
        assert_eq!(config.feed.connect_timeout_ms, 10_000);
        assert_eq!(config.view.zoom, 19.0);
    }

    #[test]
    fn bad_yaml_is_config_error() {
        assert!(matches!(
            FusionConfig::from_yaml("bsm_trail_length: [1"),
            Err(FusionError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(matches!(
            FusionConfig::load("/nonexistent/fusion.yaml"),
            Err(FusionError::Config(_))
        ));
    }
}
