//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration
//! against a local relay.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use veil_shared::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_SERVER_URL, RECONNECT_DELAY_SECS};
use veil_shared::identity::{FileVault, KeyVault, MemoryVault};

/// Whether the sender's own nickname gets a wrapped key in group envelopes.
/// Applies to group text and group file metadata alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfWrapPolicy {
    #[default]
    IncludeSelf,
    ExcludeSelf,
}

impl FromStr for SelfWrapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" | "include-self" => Ok(Self::IncludeSelf),
            "exclude" | "exclude-self" => Ok(Self::ExcludeSelf),
            other => Err(format!("expected include or exclude, got {other:?}")),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relay, used for the HTTP file sub-protocol.
    /// Env: `VEIL_SERVER_URL`
    /// Default: `http://127.0.0.1:5000`
    pub server_url: String,

    /// Plaintext bytes read and encrypted per uploaded chunk.
    /// Env: `VEIL_CHUNK_SIZE`
    /// Default: 5 MiB
    pub chunk_size: usize,

    /// Fixed delay between reconnect attempts.
    /// Env: `VEIL_RECONNECT_SECS`
    /// Default: 3 seconds
    pub reconnect_delay: Duration,

    /// Env: `VEIL_GROUP_SELF_WRAP` (include/exclude)
    /// Default: include
    pub self_wrap: SelfWrapPolicy,

    /// Where to keep the session private key. Kept in memory when unset.
    /// Env: `VEIL_KEY_FILE`
    pub key_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            self_wrap: SelfWrapPolicy::default(),
            key_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("VEIL_SERVER_URL") {
            if url.trim().is_empty() {
                tracing::warn!("Empty VEIL_SERVER_URL, using default");
            } else {
                config.server_url = url.trim().to_string();
            }
        }

        if let Some(val) = lookup("VEIL_CHUNK_SIZE") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.chunk_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid VEIL_CHUNK_SIZE, using default");
                }
            }
        }

        if let Some(val) = lookup("VEIL_RECONNECT_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) => config.reconnect_delay = Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid VEIL_RECONNECT_SECS, using default");
                }
            }
        }

        if let Some(val) = lookup("VEIL_GROUP_SELF_WRAP") {
            match val.parse::<SelfWrapPolicy>() {
                Ok(policy) => config.self_wrap = policy,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid VEIL_GROUP_SELF_WRAP, using default");
                }
            }
        }

        if let Some(path) = lookup("VEIL_KEY_FILE") {
            if !path.trim().is_empty() {
                config.key_file = Some(PathBuf::from(path.trim()));
            }
        }

        config
    }

    /// The key vault selected by `key_file`.
    pub fn key_vault(&self) -> Box<dyn KeyVault> {
        match &self.key_file {
            Some(path) => Box::new(FileVault::new(path)),
            None => Box::new(MemoryVault::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:5000");
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.self_wrap, SelfWrapPolicy::IncludeSelf);
        assert!(config.key_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VEIL_SERVER_URL", "https://relay.example"),
            ("VEIL_CHUNK_SIZE", "1024"),
            ("VEIL_RECONNECT_SECS", "10"),
            ("VEIL_GROUP_SELF_WRAP", "exclude"),
            ("VEIL_KEY_FILE", "/run/veil/key"),
        ]));
        assert_eq!(config.server_url, "https://relay.example");
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.self_wrap, SelfWrapPolicy::ExcludeSelf);
        assert_eq!(config.key_file, Some(PathBuf::from("/run/veil/key")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VEIL_CHUNK_SIZE", "0"),
            ("VEIL_RECONNECT_SECS", "soon"),
            ("VEIL_GROUP_SELF_WRAP", "maybe"),
        ]));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.reconnect_delay, Duration::from_secs(RECONNECT_DELAY_SECS));
        assert_eq!(config.self_wrap, SelfWrapPolicy::IncludeSelf);
    }

    #[test]
    fn test_key_vault_selection() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            key_file: Some(dir.path().join("identity.key")),
            ..ClientConfig::default()
        };
        let vault = config.key_vault();
        assert!(vault.load().unwrap().is_none());
        vault.save(&[1u8; 32]).unwrap();
        assert!(dir.path().join("identity.key").exists());
    }
}
