//! switchyard.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RouteId, RoutePools};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

/// Raw `[migration]` table. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub warm_capacity: Option<u32>,
    pub poll_interval: Option<String>,
    pub deadline: Option<String>,
    pub max_poll_failures: Option<u32>,
}

/// One `[[routes]]` entry, as handed over by provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub id: RouteId,
    /// Path pattern of the listener rule (e.g. "/route1").
    pub path: String,
    /// Listener rule evaluation order.
    pub priority: u32,
    pub function_pool: String,
    pub container_pool: String,
    /// Per-route override of the warm-capacity target.
    pub warm_capacity: Option<u32>,
}

impl RouteSpec {
    pub fn pools(&self) -> RoutePools {
        RoutePools::new(&self.function_pool, &self.container_pool)
    }
}

/// Resolved migration settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Container replicas to hydrate and wait for before cutover.
    pub warm_capacity: u32,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
    /// Upper bound on how long a migration may wait for readiness.
    pub deadline: Duration,
    /// Consecutive capacity read failures before the readiness wait gives up.
    pub max_poll_failures: u32,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            warm_capacity: 3,
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(5 * 60),
            max_poll_failures: 3,
        }
    }
}

impl SwitchyardConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SwitchyardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply defaults to the `[migration]` table.
    pub fn settings(&self) -> Result<MigrationSettings, ConfigError> {
        let defaults = MigrationSettings::default();
        let m = &self.migration;
        Ok(MigrationSettings {
            warm_capacity: m.warm_capacity.unwrap_or(defaults.warm_capacity),
            poll_interval: match &m.poll_interval {
                Some(s) => parse_duration(s)?,
                None => defaults.poll_interval,
            },
            deadline: match &m.deadline {
                Some(s) => parse_duration(s)?,
                None => defaults.deadline,
            },
            max_poll_failures: m.max_poll_failures.unwrap_or(defaults.max_poll_failures),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let settings = self.settings()?;
        if settings.max_poll_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_poll_failures must be at least 1".to_string(),
            ));
        }
        if settings.deadline.is_zero() {
            return Err(ConfigError::Invalid("deadline must be positive".to_string()));
        }

        let mut ids = HashSet::new();
        let mut pools = HashSet::new();
        for route in &self.routes {
            if !ids.insert(route.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate route id {:?}", route.id)));
            }
            for handle in [&route.function_pool, &route.container_pool] {
                if handle.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "route {:?} has an empty pool handle",
                        route.id
                    )));
                }
                if !pools.insert(handle.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "pool {handle:?} is bound to more than one route slot"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parse a duration string like "500ms", "5s", or "5m".
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let bad = || ConfigError::Duration(s.to_string());
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().map(Duration::from_millis).map_err(|_| bad())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().map(Duration::from_secs).map_err(|_| bad())
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.parse::<u64>().map_err(|_| bad())?;
        mins.checked_mul(60).map(Duration::from_secs).ok_or_else(bad)
    } else {
        Err(bad())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[migration]
warm_capacity = 4
poll_interval = "250ms"

[[routes]]
id = "route1"
path = "/route1"
priority = 1
function_pool = "tg-fn-1"
container_pool = "tg-ctr-1"

[[routes]]
id = "route2"
path = "/route2"
priority = 2
function_pool = "tg-fn-2"
container_pool = "tg-ctr-2"
warm_capacity = 2
"#;

    #[test]
    fn parse_routes_and_settings() {
        let config = SwitchyardConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].warm_capacity, Some(2));

        let settings = config.settings().unwrap();
        assert_eq!(settings.warm_capacity, 4);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.deadline, Duration::from_secs(300));
        assert_eq!(settings.max_poll_failures, 3);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = SwitchyardConfig::from_toml("").unwrap();
        assert!(config.routes.is_empty());
        assert_eq!(config.settings().unwrap(), MigrationSettings::default());
    }

    #[test]
    fn rejects_duplicate_route_ids() {
        let toml_str = r#"
[[routes]]
id = "a"
path = "/a"
priority = 1
function_pool = "f1"
container_pool = "c1"

[[routes]]
id = "a"
path = "/b"
priority = 2
function_pool = "f2"
container_pool = "c2"
"#;
        let err = SwitchyardConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_shared_pool_handles() {
        let toml_str = r#"
[[routes]]
id = "a"
path = "/a"
priority = 1
function_pool = "same"
container_pool = "same"
"#;
        assert!(SwitchyardConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn rejects_zero_failure_budget() {
        let toml_str = "[migration]\nmax_poll_failures = 0\n";
        assert!(SwitchyardConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(matches!(
            parse_duration("999999999999999999m"),
            Err(ConfigError::Duration(_))
        ));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert!(parse_duration("soon").is_err());
    }
}
