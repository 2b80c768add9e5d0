use serde::Deserialize;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("negative_cache.capacity must be greater than 0")]
    ZeroNegativeCacheCapacity,
    #[error("negative_cache.ttl_secs must be greater than 0")]
    ZeroNegativeCacheTtl,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NegativeCacheConfig {
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl Default for NegativeCacheConfig {
    fn default() -> Self {
        NegativeCacheConfig {
            capacity: 10_000,
            ttl_secs: 30,
        }
    }
}

/// The `auth` configuration section.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Reject every event with a maintenance error without reading storage.
    pub maintenance_freeze: bool,
    /// Seconds a throttled client is told to wait.
    pub throttle_retry_after_secs: u64,
    pub negative_cache: NegativeCacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            maintenance_freeze: false,
            throttle_retry_after_secs: 600,
            negative_cache: NegativeCacheConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.negative_cache.capacity == 0 {
            return Err(ValidationError::ZeroNegativeCacheCapacity);
        }
        if self.negative_cache.ttl_secs == 0 {
            return Err(ValidationError::ZeroNegativeCacheTtl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.maintenance_freeze);
        assert_eq!(config.throttle_retry_after_secs, 600);
        assert_eq!(config.negative_cache.capacity, 10_000);
        assert_eq!(config.negative_cache.ttl_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse() {
        let yaml = r#"
maintenance_freeze: true
throttle_retry_after_secs: 60
negative_cache:
  ttl_secs: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.maintenance_freeze);
        assert_eq!(config.throttle_retry_after_secs, 60);
        assert_eq!(
            config.negative_cache,
            NegativeCacheConfig {
                capacity: 10_000,
                ttl_secs: 5
            }
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.negative_cache.capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroNegativeCacheCapacity)
        );

        let mut config = Config::default();
        config.negative_cache.ttl_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroNegativeCacheTtl));
    }
}
