//! Layered configuration for the `tube-status` process (§6.3, §10.3).
//!
//! Four layers, outermost wins: compiled defaults → optional TOML file →
//! `TUBE_`-prefixed environment variables → explicit CLI flags. Each layer is
//! represented as a [`PartialNodeConfig`] (every field `Option`) and merged
//! into the previous layer's result; only the final, fully-populated
//! [`NodeConfig`] is handed to the component builders.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("required option `{0}` was not set by any config layer")]
    Missing(&'static str),
    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// The fully-resolved configuration for one node (§6.3's table, plus the
/// `upstreamBaseUrl` external-collaborator detail the table omits).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub upstream_base_url: String,
    pub refresh_interval: Duration,
    pub refresh_jitter: Duration,
    pub recent_enough_threshold: Duration,
    pub background_refresh_threshold: Duration,
    pub min_ask_max_age_ms: u64,
    pub ask_timeout: Duration,
    pub drain_timeout: Duration,
    pub breaker_failure_threshold: usize,
    pub breaker_open_duration: Duration,
    pub retry_max_attempts: usize,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_jitter: f64,
    pub write_majority_timeout: Duration,
}

/// One configuration layer. `None` means "this layer doesn't speak to this
/// option"; layering is just "overwrite with whatever is `Some`, in order".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialNodeConfig {
    pub node_id: Option<String>,
    pub upstream_base_url: Option<String>,
    #[serde(with = "humantime_serde::option")]
    pub refresh_interval: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub refresh_jitter: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub recent_enough_threshold: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub background_refresh_threshold: Option<Duration>,
    pub min_ask_max_age_ms: Option<u64>,
    #[serde(with = "humantime_serde::option")]
    pub ask_timeout: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub drain_timeout: Option<Duration>,
    pub breaker_failure_threshold: Option<usize>,
    #[serde(with = "humantime_serde::option")]
    pub breaker_open_duration: Option<Duration>,
    pub retry_max_attempts: Option<usize>,
    #[serde(with = "humantime_serde::option")]
    pub retry_base_delay: Option<Duration>,
    #[serde(with = "humantime_serde::option")]
    pub retry_max_delay: Option<Duration>,
    pub retry_jitter: Option<f64>,
    #[serde(with = "humantime_serde::option")]
    pub write_majority_timeout: Option<Duration>,
}

impl PartialNodeConfig {
    /// The compiled-in defaults: every field set, matching §6.3. `node_id`
    /// and `upstream_base_url` have no sensible default and are left unset.
    fn compiled_defaults() -> Self {
        Self {
            node_id: None,
            upstream_base_url: None,
            refresh_interval: Some(Duration::from_secs(30)),
            refresh_jitter: Some(Duration::from_secs(5)),
            recent_enough_threshold: Some(Duration::from_secs(5)),
            background_refresh_threshold: Some(Duration::from_secs(20)),
            min_ask_max_age_ms: Some(5_000),
            ask_timeout: Some(Duration::from_secs(5)),
            drain_timeout: Some(Duration::from_secs(10)),
            breaker_failure_threshold: Some(5),
            breaker_open_duration: Some(Duration::from_secs(30)),
            retry_max_attempts: Some(4),
            retry_base_delay: Some(Duration::from_secs(1)),
            retry_max_delay: Some(Duration::from_secs(30)),
            retry_jitter: Some(0.25),
            write_majority_timeout: Some(Duration::from_secs(3)),
        }
    }

    /// Reads `TUBE_*` environment variables into a partial layer. Unset or
    /// unparsable variables are silently skipped (§10.3: the loader is
    /// forgiving about which layers are present).
    fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        fn duration(name: &str) -> Option<Duration> {
            var(name).and_then(|v| humantime::parse_duration(&v).ok())
        }

        Self {
            node_id: var("TUBE_NODE_ID"),
            upstream_base_url: var("TUBE_UPSTREAM_BASE_URL"),
            refresh_interval: duration("TUBE_REFRESH_INTERVAL"),
            refresh_jitter: duration("TUBE_REFRESH_JITTER"),
            recent_enough_threshold: duration("TUBE_RECENT_ENOUGH_THRESHOLD"),
            background_refresh_threshold: duration("TUBE_BACKGROUND_REFRESH_THRESHOLD"),
            min_ask_max_age_ms: var("TUBE_MIN_ASK_MAX_AGE_MS").and_then(|v| v.parse().ok()),
            ask_timeout: duration("TUBE_ASK_TIMEOUT"),
            drain_timeout: duration("TUBE_DRAIN_TIMEOUT"),
            breaker_failure_threshold: var("TUBE_BREAKER_FAILURE_THRESHOLD")
                .and_then(|v| v.parse().ok()),
            breaker_open_duration: duration("TUBE_BREAKER_OPEN_DURATION"),
            retry_max_attempts: var("TUBE_RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()),
            retry_base_delay: duration("TUBE_RETRY_BASE_DELAY"),
            retry_max_delay: duration("TUBE_RETRY_MAX_DELAY"),
            retry_jitter: var("TUBE_RETRY_JITTER").and_then(|v| v.parse().ok()),
            write_majority_timeout: duration("TUBE_WRITE_MAJORITY_TIMEOUT"),
        }
    }

    fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overwrites every field `other` sets; `self`'s values win where
    /// `other` is silent. Call with layers from outermost-losing to
    /// outermost-winning.
    fn merge(mut self, other: Self) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(node_id);
        take!(upstream_base_url);
        take!(refresh_interval);
        take!(refresh_jitter);
        take!(recent_enough_threshold);
        take!(background_refresh_threshold);
        take!(min_ask_max_age_ms);
        take!(ask_timeout);
        take!(drain_timeout);
        take!(breaker_failure_threshold);
        take!(breaker_open_duration);
        take!(retry_max_attempts);
        take!(retry_base_delay);
        take!(retry_max_delay);
        take!(retry_jitter);
        take!(write_majority_timeout);
        self
    }

    fn finish(self) -> Result<NodeConfig, ConfigError> {
        macro_rules! require {
            ($field:ident) => {
                self.$field.ok_or(ConfigError::Missing(stringify!($field)))?
            };
        }
        Ok(NodeConfig {
            node_id: require!(node_id),
            upstream_base_url: require!(upstream_base_url),
            refresh_interval: require!(refresh_interval),
            refresh_jitter: require!(refresh_jitter),
            recent_enough_threshold: require!(recent_enough_threshold),
            background_refresh_threshold: require!(background_refresh_threshold),
            min_ask_max_age_ms: require!(min_ask_max_age_ms),
            ask_timeout: require!(ask_timeout),
            drain_timeout: require!(drain_timeout),
            breaker_failure_threshold: require!(breaker_failure_threshold),
            breaker_open_duration: require!(breaker_open_duration),
            retry_max_attempts: require!(retry_max_attempts),
            retry_base_delay: require!(retry_base_delay),
            retry_max_delay: require!(retry_max_delay),
            retry_jitter: require!(retry_jitter),
            write_majority_timeout: require!(write_majority_timeout),
        })
    }
}

/// Resolves the full layer stack into a [`NodeConfig`].
///
/// `file` is the optional `--config` path; `cli` carries whatever the
/// command line set explicitly (highest precedence).
pub fn load(file: Option<&Path>, cli: PartialNodeConfig) -> Result<NodeConfig, ConfigError> {
    let mut layered = PartialNodeConfig::compiled_defaults();

    if let Some(path) = file {
        layered = layered.merge(PartialNodeConfig::from_toml_file(path)?);
    }

    layered = layered.merge(PartialNodeConfig::from_env());
    layered = layered.merge(cli);

    let resolved = layered.finish()?;

    if resolved.retry_max_attempts == 0 {
        return Err(ConfigError::Invalid {
            name: "retry_max_attempts",
            reason: "must be at least 1 (the initial attempt)".to_string(),
        });
    }
    if resolved.drain_timeout < resolved.ask_timeout {
        return Err(ConfigError::Invalid {
            name: "drain_timeout",
            reason: "must be >= ask_timeout (§6.3)".to_string(),
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(node_id: &str, base_url: &str) -> PartialNodeConfig {
        PartialNodeConfig {
            node_id: Some(node_id.to_string()),
            upstream_base_url: Some(base_url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_plus_required_cli_fields_resolve() {
        let cfg = load(None, cli_with("n1", "https://example.test")).unwrap();
        assert_eq!(cfg.node_id, "n1");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.min_ask_max_age_ms, 5_000);
    }

    #[test]
    fn missing_node_id_is_an_error() {
        let cli = PartialNodeConfig {
            upstream_base_url: Some("https://example.test".to_string()),
            ..Default::default()
        };
        let err = load(None, cli).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("node_id")));
    }

    #[test]
    fn cli_overrides_toml_overrides_defaults() {
        let base = PartialNodeConfig::compiled_defaults();
        let toml_layer = PartialNodeConfig {
            refresh_interval: Some(Duration::from_secs(45)),
            ..Default::default()
        };
        let merged = base.merge(toml_layer);
        assert_eq!(merged.refresh_interval, Some(Duration::from_secs(45)));

        let cli_layer = cli_with("n1", "https://example.test");
        let final_layer = merged.merge(cli_layer);
        assert_eq!(final_layer.refresh_interval, Some(Duration::from_secs(45)));
        assert_eq!(final_layer.node_id, Some("n1".to_string()));
    }

    #[test]
    fn drain_timeout_below_ask_timeout_is_rejected() {
        let cli = PartialNodeConfig {
            node_id: Some("n1".to_string()),
            upstream_base_url: Some("https://example.test".to_string()),
            ask_timeout: Some(Duration::from_secs(9)),
            drain_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let err = load(None, cli).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "drain_timeout", .. }));
    }
}
