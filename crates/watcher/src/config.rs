//! Listener options
//!
//! A `Config` is checked against the declared option set when it is parsed
//! (unknown keys are rejected) and by [`Config::validate`] before a listener
//! freezes it behind an `Arc`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Warning logged when no optimized adapter can be used
pub const POLLING_FALLBACK_MESSAGE: &str =
    "Lookout will be polling for changes. Native notifications are unavailable on this platform.";

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Minimum delay between callbacks, so bursts can be coalesced
    /// (default: provided by the adapter)
    pub wait_for_delay_ms: Option<u64>,

    /// Polling interval of the polling adapter (default: 1s); native
    /// adapters deliver events as the OS reports them and ignore it
    pub latency_ms: Option<u64>,

    /// Report paths relative to the current directory
    pub relative: bool,

    /// Skip native notifications and poll
    pub force_polling: bool,

    /// Warning text when falling back to polling (empty: stay silent)
    pub polling_fallback_message: String,

    /// Patterns appended to the default ignore list
    pub ignore: Vec<String>,

    /// Patterns replacing the default ignore list entirely
    pub ignore_override: Option<Vec<String>>,

    /// Only report files matching one of these patterns
    pub only: Option<Vec<String>>,

    /// Verify content hashes when timestamps are too coarse to trust
    pub hashing: bool,

    /// How old a coarse mtime must be before its content is hashed
    pub fresh_guard_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wait_for_delay_ms: None,
            latency_ms: None,
            relative: false,
            force_polling: false,
            polling_fallback_message: POLLING_FALLBACK_MESSAGE.to_string(),
            ignore: vec![],
            ignore_override: None,
            only: None,
            hashing: true,
            fresh_guard_ms: 2000,
        }
    }
}

impl Config {
    /// Parse from TOML text; unknown keys are an error
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check values and patterns
    pub fn validate(&self) -> Result<()> {
        if self.latency_ms == Some(0) {
            return Err(Error::Config("latency_ms must be greater than 0".to_string()));
        }
        if let Some(delay) = self.wait_for_delay_ms {
            if delay > 60_000 {
                return Err(Error::Config(format!(
                    "wait_for_delay_ms must be at most 60000 (got {delay})"
                )));
            }
        }

        let overrides = self.ignore_override.iter().flatten();
        let only = self.only.iter().flatten();
        for pattern in self.ignore.iter().chain(overrides).chain(only) {
            compile_pattern(pattern)?;
        }
        Ok(())
    }

    /// Configured callback delay, if any
    pub fn wait_for_delay(&self) -> Option<Duration> {
        self.wait_for_delay_ms.map(Duration::from_millis)
    }

    /// Configured adapter latency, if any
    pub fn latency(&self) -> Option<Duration> {
        self.latency_ms.map(Duration::from_millis)
    }

    /// Fallback warning, `None` when suppressed
    pub fn fallback_message(&self) -> Option<&str> {
        Some(self.polling_fallback_message.as_str()).filter(|msg| !msg.is_empty())
    }

    /// Hashing settings for the file classifier
    pub fn hash_policy(&self) -> HashPolicy {
        HashPolicy {
            enabled: self.hashing,
            fresh_guard: Duration::from_millis(self.fresh_guard_ms),
        }
    }
}

/// When the file classifier may fall back to content hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPolicy {
    /// Hash at all
    pub enabled: bool,
    /// A coarse mtime younger than this is not trusted for hashing yet
    pub fresh_guard: Duration,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Config::default().hash_policy()
    }
}

/// Compile one ignore/only pattern
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.hashing);
        assert_eq!(config.fresh_guard_ms, 2000);
        assert!(!config.force_polling);
        assert_eq!(config.fallback_message(), Some(POLLING_FALLBACK_MESSAGE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(
            r#"
            force_polling = true
            latency_ms = 250
            ignore = ['\.log$']
            only = ['\.rs$']
            "#,
        )
        .unwrap();

        assert!(config.force_polling);
        assert_eq!(config.latency(), Some(Duration::from_millis(250)));
        assert_eq!(config.ignore, vec![r"\.log$".to_string()]);
        assert_eq!(config.only, Some(vec![r"\.rs$".to_string()]));
        // Unspecified keys keep their defaults
        assert!(config.hashing);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str("polling = true").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Config::from_toml_str("ignore = ['(unclosed']").unwrap_err();
        match err {
            Error::Pattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_latency_rejected() {
        let config = Config {
            latency_ms: Some(0),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_fallback_message_is_suppressed() {
        let config = Config {
            polling_fallback_message: String::new(),
            ..Config::default()
        };
        assert_eq!(config.fallback_message(), None);
    }

    #[test]
    fn test_hash_policy() {
        let config = Config {
            hashing: false,
            fresh_guard_ms: 500,
            ..Config::default()
        };
        let policy = config.hash_policy();
        assert!(!policy.enabled);
        assert_eq!(policy.fresh_guard, Duration::from_millis(500));
    }
}
