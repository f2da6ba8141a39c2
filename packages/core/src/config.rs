/// Configuration for the section tree engine and controller
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deepest nesting any course may be configured for
const MAX_SUPPORTED_LEVEL: u8 = 16;

/// Prefix of the environment variables read by [`TreeConfig::from_env`]
pub const ENV_PREFIX: &str = "MULTITOPIC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    /// Deepest level a section may have (2 = pages containing topics)
    pub max_level: u8,

    /// Retries after a revision conflict (0 = single attempt)
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry
    pub retry_base_delay_ms: u64,

    /// How long a cached course tree is trusted before its revision is rechecked
    pub snapshot_ttl_secs: u64,

    /// Capacity of the domain event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_level: 2,
            max_retries: 3,
            retry_base_delay_ms: 10,
            snapshot_ttl_secs: 60,
            event_channel_capacity: 128,
        }
    }
}

impl TreeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_level == 0 {
            return Err("max_level must be at least 1".to_string());
        }

        if self.max_level > MAX_SUPPORTED_LEVEL {
            return Err(format!("max_level cannot exceed {}", MAX_SUPPORTED_LEVEL));
        }

        if self.max_retries > 0 && self.retry_base_delay_ms == 0 {
            return Err("retry_base_delay_ms must be greater than 0 when retries are enabled".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Load from a JSON file; missing keys take their default values
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TreeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Defaults overridden by `MULTITOPIC_*` environment variables
    ///
    /// Recognized: `MULTITOPIC_MAX_LEVEL`, `MULTITOPIC_MAX_RETRIES`,
    /// `MULTITOPIC_RETRY_BASE_DELAY_MS`, `MULTITOPIC_SNAPSHOT_TTL_SECS`,
    /// `MULTITOPIC_EVENT_CHANNEL_CAPACITY`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        override_from(&lookup, "MAX_LEVEL", &mut config.max_level)?;
        override_from(&lookup, "MAX_RETRIES", &mut config.max_retries)?;
        override_from(&lookup, "RETRY_BASE_DELAY_MS", &mut config.retry_base_delay_ms)?;
        override_from(&lookup, "SNAPSHOT_TTL_SECS", &mut config.snapshot_ttl_secs)?;
        override_from(
            &lookup,
            "EVENT_CHANNEL_CAPACITY",
            &mut config.event_channel_capacity,
        )?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }
}

fn override_from<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    suffix: &str,
    slot: &mut T,
) -> anyhow::Result<()>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let key = format!("{}{}", ENV_PREFIX, suffix);
    if let Some(raw) = lookup(&key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value {:?} for {}", raw, key))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = TreeConfig::default();
        assert_eq!(config.max_level, 2);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreeConfig::default();

        config.max_level = 0;
        assert!(config.validate().is_err());

        config.max_level = MAX_SUPPORTED_LEVEL + 1;
        assert!(config.validate().is_err());

        config.max_level = 3;
        config.retry_base_delay_ms = 0;
        assert!(config.validate().is_err());

        config.max_retries = 0;
        assert!(config.validate().is_ok());

        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MULTITOPIC_MAX_LEVEL", "3"),
            ("MULTITOPIC_MAX_RETRIES", " 5 "),
        ]
        .into_iter()
        .collect();
        let config = TreeConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.max_level, 3);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.snapshot_ttl_secs, 60);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = TreeConfig::from_lookup(|k| {
            (k == "MULTITOPIC_MAX_LEVEL").then(|| "deep".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("MULTITOPIC_MAX_LEVEL"));
    }

    #[test]
    fn test_from_file_fills_missing_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, r#"{ "maxLevel": 4, "snapshotTtlSecs": 5 }"#).unwrap();

        let config = TreeConfig::from_file(&path).unwrap();
        assert_eq!(config.max_level, 4);
        assert_eq!(config.snapshot_ttl(), Duration::from_secs(5));
        assert_eq!(config.event_channel_capacity, 128);
    }
}
