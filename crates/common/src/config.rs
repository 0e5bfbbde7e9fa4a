//! Feed configuration loaded from `FEED_*` environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use model::SequencePolicy;
use thiserror::Error;

use crate::backoff::DEFAULT_RECONNECT_DELAY;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which exchange endpoints to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedEnvironment {
    #[default]
    Production,
    Testnet,
}

impl FeedEnvironment {
    /// Base URL for snapshot requests.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.binance.com",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }

    /// Base URL for raw stream subscriptions.
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://stream.binance.com:9443",
            Self::Testnet => "wss://testnet.binance.vision",
        }
    }
}

impl fmt::Display for FeedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for FeedEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "mainnet" => Ok(Self::Production),
            "testnet" | "test" => Ok(Self::Testnet),
            _ => Err("expected 'production' or 'testnet'".to_string()),
        }
    }
}

/// Runtime settings for one feed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// The single symbol tracked, upper case (e.g. `BTCUSDT`).
    pub symbol: String,
    pub environment: FeedEnvironment,
    /// Levels per side in the rendered projection.
    pub depth: usize,
    /// Levels requested from the snapshot provider.
    pub snapshot_limit: u32,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Silence on a subscription after which it is treated as dead.
    pub stale_after: Duration,
    /// Bound of the feed event channel.
    pub channel_capacity: usize,
    pub sequence_policy: SequencePolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            environment: FeedEnvironment::default(),
            depth: 20,
            snapshot_limit: 1000,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            stale_after: Duration::from_secs(30),
            channel_capacity: 1024,
            sequence_policy: SequencePolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Load from the process environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let symbol = lookup("FEED_SYMBOL")
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.symbol);

        let environment = parse_var(&lookup, "FEED_ENVIRONMENT", defaults.environment)?;
        let depth = parse_var(&lookup, "FEED_DEPTH", defaults.depth)?;
        let snapshot_limit = parse_var(&lookup, "FEED_SNAPSHOT_LIMIT", defaults.snapshot_limit)?;
        let reconnect_delay = parse_var(
            &lookup,
            "FEED_RECONNECT_DELAY_MS",
            defaults.reconnect_delay.as_millis() as u64,
        )
        .map(Duration::from_millis)?;
        let stale_after = parse_var(
            &lookup,
            "FEED_STALE_AFTER_SECS",
            defaults.stale_after.as_secs(),
        )
        .map(Duration::from_secs)?;
        let channel_capacity =
            parse_var(&lookup, "FEED_CHANNEL_CAPACITY", defaults.channel_capacity)?;
        let sequence_policy =
            parse_var(&lookup, "FEED_SEQUENCE_POLICY", defaults.sequence_policy)?;

        if channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FEED_CHANNEL_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            symbol,
            environment,
            depth,
            snapshot_limit,
            reconnect_delay,
            stale_after,
            channel_capacity,
            sequence_policy,
        })
    }

    /// Replace the symbol, normalising it to upper case.
    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.trim().to_uppercase();
        self
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = FeedConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, FeedConfig::default());
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.depth, 20);
    }

    #[test]
    fn test_overrides() {
        let config = FeedConfig::from_lookup(lookup_from(&[
            ("FEED_SYMBOL", " ethusdt "),
            ("FEED_ENVIRONMENT", "testnet"),
            ("FEED_DEPTH", "10"),
            ("FEED_RECONNECT_DELAY_MS", "500"),
            ("FEED_STALE_AFTER_SECS", "5"),
            ("FEED_SEQUENCE_POLICY", "verify"),
        ]))
        .unwrap();

        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.environment, FeedEnvironment::Testnet);
        assert_eq!(config.depth, 10);
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.stale_after, Duration::from_secs(5));
        assert_eq!(config.sequence_policy, SequencePolicy::Verify);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = FeedConfig::from_lookup(lookup_from(&[("FEED_DEPTH", "twenty")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "FEED_DEPTH", .. }
        ));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let err =
            FeedConfig::from_lookup(lookup_from(&[("FEED_CHANNEL_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "FEED_CHANNEL_CAPACITY",
                ..
            }
        ));
    }

    #[test]
    fn test_environment_urls() {
        assert_eq!(
            FeedEnvironment::Production.ws_base_url(),
            "wss://stream.binance.com:9443"
        );
        assert_eq!(
            FeedEnvironment::Testnet.rest_base_url(),
            "https://testnet.binance.vision"
        );
        assert!("sandbox".parse::<FeedEnvironment>().is_err());
        assert_eq!(
            "PROD".parse::<FeedEnvironment>().unwrap(),
            FeedEnvironment::Production
        );
    }

    #[test]
    fn test_with_symbol_normalises() {
        let config = FeedConfig::default().with_symbol("solusdt");
        assert_eq!(config.symbol, "SOLUSDT");
    }
}
