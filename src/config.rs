//! Service configuration
//!
//! Read from `HUB_*` environment variables with defaults suited to local
//! development:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `HUB_BIND_ADDR` | `0.0.0.0:5000` | Listening socket |
//! | `HUB_WS_PATH` | `/hubs/location` | WebSocket upgrade path |
//! | `HUB_PRESENCE_IDLE_SECS` | unset | Idle time before a device goes offline; unset disables the sweep |
//! | `HUB_PRESENCE_SWEEP_SECS` | `30` | How often idle devices are swept |
//! | `HUB_PRESENCE_RETENTION_SECS` | `86400` | How long an offline device is remembered |
//! | `HUB_HISTORY_RETENTION` | `100000` | Updates kept by the in-memory store |
//! | `HUB_OUTBOX_CAPACITY` | `1024` | Messages buffered per connection before it is dropped as lagging |

use std::env;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use thiserror::Error;

use crate::hub::DEFAULT_OUTBOX_CAPACITY;
use crate::storage::memory::DEFAULT_RETENTION;

pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 5000));
pub const DEFAULT_WS_PATH: &str = "/hubs/location";
pub const DEFAULT_SWEEP_SECS: u64 = 30;
pub const DEFAULT_PRESENCE_RETENTION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub bind_addr: SocketAddr,
    pub ws_path: String,
    /// `None` leaves offline detection to disconnects only
    pub presence_idle_timeout: Option<Duration>,
    pub presence_sweep_interval: Duration,
    /// Offline devices unseen for this long are forgotten
    pub presence_retention: Duration,
    pub history_retention: usize,
    pub outbox_capacity: usize,
}

impl HubConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("HUB_BIND_ADDR") {
            config.bind_addr = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "HUB_BIND_ADDR",
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = lookup("HUB_WS_PATH") {
            let path = raw.trim();
            if !path.starts_with('/') || path.len() < 2 {
                return Err(ConfigError::Invalid {
                    key: "HUB_WS_PATH",
                    value: raw.clone(),
                });
            }
            config.ws_path = path.to_string();
        }

        if let Some(raw) = lookup("HUB_PRESENCE_IDLE_SECS") {
            let secs = parse_positive("HUB_PRESENCE_IDLE_SECS", &raw)?;
            config.presence_idle_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup("HUB_PRESENCE_SWEEP_SECS") {
            let secs = parse_positive("HUB_PRESENCE_SWEEP_SECS", &raw)?;
            config.presence_sweep_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("HUB_PRESENCE_RETENTION_SECS") {
            let secs = parse_positive("HUB_PRESENCE_RETENTION_SECS", &raw)?;
            config.presence_retention = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("HUB_HISTORY_RETENTION") {
            config.history_retention = parse_positive("HUB_HISTORY_RETENTION", &raw)? as usize;
        }

        if let Some(raw) = lookup("HUB_OUTBOX_CAPACITY") {
            config.outbox_capacity = parse_positive("HUB_OUTBOX_CAPACITY", &raw)? as usize;
        }

        Ok(config)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            ws_path: DEFAULT_WS_PATH.to_string(),
            presence_idle_timeout: None,
            presence_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            presence_retention: Duration::from_secs(DEFAULT_PRESENCE_RETENTION_SECS),
            history_retention: DEFAULT_RETENTION,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HubConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.outbox_capacity, 1024);
        assert_eq!(config.presence_idle_timeout, None);
    }

    #[test]
    fn test_overrides() {
        let config = HubConfig::from_lookup(lookup(&[
            ("HUB_BIND_ADDR", "127.0.0.1:8080"),
            ("HUB_WS_PATH", "/ws"),
            ("HUB_PRESENCE_IDLE_SECS", "120"),
            ("HUB_PRESENCE_SWEEP_SECS", "5"),
            ("HUB_PRESENCE_RETENTION_SECS", "600"),
            ("HUB_OUTBOX_CAPACITY", "64"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.presence_idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.presence_sweep_interval, Duration::from_secs(5));
        assert_eq!(config.presence_retention, Duration::from_secs(600));
        assert_eq!(config.outbox_capacity, 64);
    }

    #[test]
    fn test_invalid_values() {
        assert!(HubConfig::from_lookup(lookup(&[("HUB_BIND_ADDR", "nowhere")])).is_err());
        assert!(HubConfig::from_lookup(lookup(&[("HUB_WS_PATH", "ws")])).is_err());
        assert_eq!(
            HubConfig::from_lookup(lookup(&[("HUB_PRESENCE_IDLE_SECS", "0")])).unwrap_err(),
            ConfigError::Invalid {
                key: "HUB_PRESENCE_IDLE_SECS",
                value: "0".to_string()
            }
        );
    }
}
