// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the bridge. Configuration is loaded from the environment at
//! startup via [`BridgeConfig::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `REQUEST_TIMEOUT_SECS` | Protocol-side wait before a pending request expires | `300` |
//! | `SWEEP_INTERVAL_SECS` | Interval of the request expiry sweeper | `15` |
//! | `RISK_WARN_VALUE` | Native amount above which a transfer is a warning | `100` |
//! | `RISK_DANGER_VALUE` | Native amount above which a transfer is a danger | `10000` |
//! | `PHISHING_LIST_URL` | Live phishing list API | built-in |
//! | `PHISHING_COMMUNITY_URL` | Community-maintained phishing JSON | built-in |
//! | `REPUTATION_API_URL` | Optional external domain reputation endpoint | unset |
//! | `REPUTATION_TIMEOUT_MS` | Timeout for a single reputation query | `2500` |
//! | `SIMULATION_TIMEOUT_MS` | Timeout for transaction simulation | `5000` |
//! | `RPC_URL_<chainId>` | Per-chain RPC endpoint override | network table |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::U256;

use crate::blockchain::parse_amount;
use crate::telemetry::LogFormat;

/// Environment variable name for the data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable for the protocol-side request timeout (seconds).
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";

/// Environment variable for the expiry sweeper interval (seconds).
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_SECS";

/// Environment variable for the high-value warning threshold (native units).
pub const RISK_WARN_VALUE_ENV: &str = "RISK_WARN_VALUE";

/// Environment variable for the high-value danger threshold (native units).
pub const RISK_DANGER_VALUE_ENV: &str = "RISK_DANGER_VALUE";

/// Environment variable for the live phishing list endpoint.
pub const PHISHING_LIST_URL_ENV: &str = "PHISHING_LIST_URL";

/// Environment variable for the community phishing list endpoint.
pub const PHISHING_COMMUNITY_URL_ENV: &str = "PHISHING_COMMUNITY_URL";

/// Environment variable for the optional reputation API.
pub const REPUTATION_API_URL_ENV: &str = "REPUTATION_API_URL";

/// Environment variable for the reputation query timeout (milliseconds).
pub const REPUTATION_TIMEOUT_ENV: &str = "REPUTATION_TIMEOUT_MS";

/// Environment variable for the simulation timeout (milliseconds).
pub const SIMULATION_TIMEOUT_ENV: &str = "SIMULATION_TIMEOUT_MS";

/// Prefix for per-chain RPC overrides, e.g. `RPC_URL_56`.
pub const RPC_URL_PREFIX: &str = "RPC_URL_";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_WARN_VALUE: &str = "100";
const DEFAULT_DANGER_VALUE: &str = "10000";
const DEFAULT_REPUTATION_TIMEOUT: Duration = Duration::from_millis(2500);
const DEFAULT_SIMULATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default live phishing list (MetaMask-compatible `blacklist` format).
pub const DEFAULT_PHISHING_LIST_URL: &str =
    "https://raw.githubusercontent.com/MetaMask/eth-phishing-detect/main/src/config.json";

/// Default community phishing list (plain JSON array of hostnames).
pub const DEFAULT_PHISHING_COMMUNITY_URL: &str =
    "https://raw.githubusercontent.com/scamsniffer/scam-database/main/blacklist/domains.json";

/// Risk policy thresholds, expressed in wei.
#[derive(Debug, Clone)]
pub struct RiskThresholds {
    pub warn_value: U256,
    pub danger_value: U256,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            warn_value: U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)),
            danger_value: U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64)),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub thresholds: RiskThresholds,
    pub phishing_list_url: String,
    pub phishing_community_url: String,
    pub reputation_api_url: Option<String>,
    pub reputation_timeout: Duration,
    pub simulation_timeout: Duration,
    /// chain id → RPC URL overrides
    pub rpc_overrides: HashMap<u64, String>,
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            thresholds: RiskThresholds::default(),
            phishing_list_url: DEFAULT_PHISHING_LIST_URL.to_string(),
            phishing_community_url: DEFAULT_PHISHING_COMMUNITY_URL.to_string(),
            reputation_api_url: None,
            reputation_timeout: DEFAULT_REPUTATION_TIMEOUT,
            simulation_timeout: DEFAULT_SIMULATION_TIMEOUT,
            rpc_overrides: HashMap::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl BridgeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let overrides: HashMap<u64, String> = std::env::vars()
            .filter_map(|(name, value)| {
                name.strip_prefix(RPC_URL_PREFIX)
                    .and_then(|id| id.parse::<u64>().ok())
                    .map(|id| (id, value))
            })
            .collect();

        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.rpc_overrides = overrides;
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset variables fall back to defaults; malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let request_timeout = parse_duration(&lookup, REQUEST_TIMEOUT_ENV, Duration::from_secs)?
            .unwrap_or(defaults.request_timeout);
        let sweep_interval = parse_duration(&lookup, SWEEP_INTERVAL_ENV, Duration::from_secs)?
            .unwrap_or(defaults.sweep_interval);
        let reputation_timeout =
            parse_duration(&lookup, REPUTATION_TIMEOUT_ENV, Duration::from_millis)?
                .unwrap_or(defaults.reputation_timeout);
        let simulation_timeout =
            parse_duration(&lookup, SIMULATION_TIMEOUT_ENV, Duration::from_millis)?
                .unwrap_or(defaults.simulation_timeout);

        let warn_raw = lookup(RISK_WARN_VALUE_ENV).unwrap_or_else(|| DEFAULT_WARN_VALUE.into());
        let danger_raw =
            lookup(RISK_DANGER_VALUE_ENV).unwrap_or_else(|| DEFAULT_DANGER_VALUE.into());
        let thresholds = RiskThresholds {
            warn_value: parse_native(RISK_WARN_VALUE_ENV, &warn_raw)?,
            danger_value: parse_native(RISK_DANGER_VALUE_ENV, &danger_raw)?,
        };
        if thresholds.danger_value < thresholds.warn_value {
            return Err(ConfigError::Invalid {
                name: RISK_DANGER_VALUE_ENV,
                reason: "danger threshold must not be below the warning threshold".into(),
            });
        }

        let log_format = match lookup(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                reason,
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            data_dir,
            request_timeout,
            sweep_interval,
            thresholds,
            phishing_list_url: lookup(PHISHING_LIST_URL_ENV).unwrap_or(defaults.phishing_list_url),
            phishing_community_url: lookup(PHISHING_COMMUNITY_URL_ENV)
                .unwrap_or(defaults.phishing_community_url),
            reputation_api_url: lookup(REPUTATION_API_URL_ENV).filter(|u| !u.trim().is_empty()),
            reputation_timeout,
            simulation_timeout,
            rpc_overrides: HashMap::new(),
            log_format,
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bridge.redb")
    }
}

fn parse_duration<F>(
    lookup: &F,
    name: &'static str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|v| Some(unit(v)))
            .map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_native(name: &'static str, raw: &str) -> Result<U256, ConfigError> {
    parse_amount(raw.trim(), 18).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.reputation_api_url.is_none());
        assert_eq!(config.database_path(), PathBuf::from("./data/bridge.redb"));
    }

    #[test]
    fn reads_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            (REQUEST_TIMEOUT_ENV, "60"),
            (RISK_WARN_VALUE_ENV, "1.5"),
            (REPUTATION_API_URL_ENV, "https://rep.example/check"),
            (LOG_FORMAT_ENV, "json"),
        ]))
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(
            config.thresholds.warn_value,
            U256::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(
            config.reputation_api_url.as_deref(),
            Some("https://rep.example/check")
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(BridgeConfig::from_lookup(lookup_from(&[(REQUEST_TIMEOUT_ENV, "soon")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup_from(&[(LOG_FORMAT_ENV, "xml")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup_from(&[
            (RISK_WARN_VALUE_ENV, "500"),
            (RISK_DANGER_VALUE_ENV, "10"),
        ]))
        .is_err());
    }
}
