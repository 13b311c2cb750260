//! Configuration management for Threadline
//!
//! Configuration is loaded from environment variables. Every key has a
//! default, and malformed values fall back to that default rather than
//! failing startup.

use std::env;
use std::time::Duration;

/// Default maximum display depth.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Default hop ceiling for parent-chain walks.
pub const DEFAULT_MAX_PARENT_HOPS: u32 = 100;

/// Main configuration struct for Threadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Master switch for thread ordering.
    pub enabled: bool,

    // Depth
    pub max_depth: u32,
    pub max_parent_hops: u32,

    // Order cache
    pub order_ttl: Duration,
    pub fetch_join_timeout: Duration,
    pub missing_refetch_cooldown: Duration,
    pub max_cached_discussions: usize,

    // Scheduling
    pub debounce: Duration,

    /// Build a local order with the canonical builder when no precomputed
    /// table exists.
    pub local_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: DEFAULT_MAX_DEPTH,
            max_parent_hops: DEFAULT_MAX_PARENT_HOPS,
            order_ttl: Duration::from_secs(60),
            fetch_join_timeout: Duration::from_millis(5_000),
            missing_refetch_cooldown: Duration::from_millis(2_000),
            max_cached_discussions: 64,
            debounce: Duration::from_millis(16),
            local_fallback: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = EnvReader { lookup };

        let max_depth = env.u32("THREADLINE_MAX_DEPTH", defaults.max_depth);
        // A hop ceiling below the display depth would truncate legitimate chains.
        let max_parent_hops = env
            .u32("THREADLINE_MAX_PARENT_HOPS", defaults.max_parent_hops)
            .max(max_depth);

        Self {
            enabled: env.bool("THREADLINE_ENABLED", defaults.enabled),
            max_depth,
            max_parent_hops,
            order_ttl: Duration::from_secs(env.u64(
                "THREADLINE_ORDER_TTL_SECS",
                defaults.order_ttl.as_secs(),
            )),
            fetch_join_timeout: env.millis(
                "THREADLINE_FETCH_JOIN_TIMEOUT_MS",
                defaults.fetch_join_timeout,
            ),
            missing_refetch_cooldown: env.millis(
                "THREADLINE_MISSING_REFETCH_COOLDOWN_MS",
                defaults.missing_refetch_cooldown,
            ),
            max_cached_discussions: env
                .usize(
                    "THREADLINE_MAX_CACHED_DISCUSSIONS",
                    defaults.max_cached_discussions,
                )
                .max(1),
            debounce: env.millis("THREADLINE_DEBOUNCE_MS", defaults.debounce),
            local_fallback: env.bool("THREADLINE_LOCAL_FALLBACK", defaults.local_fallback),
        }
    }

    /// `(key, value)` pairs for display, in a stable order.
    #[must_use]
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("THREADLINE_ENABLED", self.enabled.to_string()),
            ("THREADLINE_MAX_DEPTH", self.max_depth.to_string()),
            ("THREADLINE_MAX_PARENT_HOPS", self.max_parent_hops.to_string()),
            (
                "THREADLINE_ORDER_TTL_SECS",
                self.order_ttl.as_secs().to_string(),
            ),
            (
                "THREADLINE_FETCH_JOIN_TIMEOUT_MS",
                self.fetch_join_timeout.as_millis().to_string(),
            ),
            (
                "THREADLINE_MISSING_REFETCH_COOLDOWN_MS",
                self.missing_refetch_cooldown.as_millis().to_string(),
            ),
            (
                "THREADLINE_MAX_CACHED_DISCUSSIONS",
                self.max_cached_discussions.to_string(),
            ),
            (
                "THREADLINE_DEBOUNCE_MS",
                self.debounce.as_millis().to_string(),
            ),
            ("THREADLINE_LOCAL_FALLBACK", self.local_fallback.to_string()),
        ]
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn value(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.value(key).map_or(default, |v| parse_bool(&v, default))
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.value(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.value(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.value(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.value(key)
            .and_then(|v| v.parse().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config_from(&[]), Config::default());
        let config = Config::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.max_parent_hops, 100);
        assert!(config.enabled);
        assert!(config.local_fallback);
    }

    #[test]
    fn parses_overrides() {
        let config = config_from(&[
            ("THREADLINE_ENABLED", "no"),
            ("THREADLINE_MAX_DEPTH", "4"),
            ("THREADLINE_ORDER_TTL_SECS", "5"),
            ("THREADLINE_DEBOUNCE_MS", "0"),
            ("THREADLINE_LOCAL_FALLBACK", "0"),
            ("THREADLINE_MAX_CACHED_DISCUSSIONS", "3"),
        ]);
        assert!(!config.enabled);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.order_ttl, Duration::from_secs(5));
        assert_eq!(config.debounce, Duration::ZERO);
        assert!(!config.local_fallback);
        assert_eq!(config.max_cached_discussions, 3);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("THREADLINE_ENABLED", "maybe"),
            ("THREADLINE_MAX_DEPTH", "-2"),
            ("THREADLINE_FETCH_JOIN_TIMEOUT_MS", "soon"),
            ("THREADLINE_MAX_CACHED_DISCUSSIONS", "  "),
        ]);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn hop_ceiling_never_below_depth() {
        let config = config_from(&[
            ("THREADLINE_MAX_DEPTH", "40"),
            ("THREADLINE_MAX_PARENT_HOPS", "5"),
        ]);
        assert_eq!(config.max_parent_hops, 40);
    }

    #[test]
    fn cache_capacity_is_at_least_one() {
        let config = config_from(&[("THREADLINE_MAX_CACHED_DISCUSSIONS", "0")]);
        assert_eq!(config.max_cached_discussions, 1);
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["1", "true", "T", "yes", "Y"] {
            assert!(parse_bool(v, false), "{v}");
        }
        for v in ["0", "false", "F", "no", "N"] {
            assert!(!parse_bool(v, true), "{v}");
        }
        assert!(parse_bool("unknown", true));
    }

    #[test]
    fn describe_lists_every_key() {
        let pairs = Config::default().describe();
        assert_eq!(pairs.len(), 9);
        assert!(pairs.iter().any(|(k, v)| *k == "THREADLINE_MAX_DEPTH" && v == "10"));
    }
}
