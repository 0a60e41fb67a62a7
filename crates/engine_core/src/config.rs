//! World configuration.

use serde::{Deserialize, Serialize};

/// What `remove` does when the entity holds no component for the factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingComponentPolicy {
    /// Fail with [`EcsError::MissingComponent`](crate::EcsError::MissingComponent).
    #[default]
    Error,
    /// Return `Ok(())` without touching storage.
    Ignore,
}

/// Configuration for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Behaviour of `remove` on a component the entity does not hold.
    pub missing_component: MissingComponentPolicy,
    /// Maximum number of cached query handles (0 = unbounded). The least
    /// recently used handle is evicted when the cache is full.
    pub query_cache_capacity: usize,
}

impl WorldConfig {
    /// Default number of cached query handles.
    pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 256;

    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            missing_component: MissingComponentPolicy::Error,
            query_cache_capacity: Self::DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }

    /// Override the missing-component policy.
    #[must_use]
    pub fn with_missing_component(mut self, policy: MissingComponentPolicy) -> Self {
        self.missing_component = policy;
        self
    }

    /// Override the query cache capacity.
    #[must_use]
    pub fn with_query_cache_capacity(mut self, capacity: usize) -> Self {
        self.query_cache_capacity = capacity;
        self
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.missing_component, MissingComponentPolicy::Error);
        assert_eq!(config.query_cache_capacity, 256);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WorldConfig = serde_json::from_str(r#"{"missing_component":"ignore"}"#).unwrap();
        assert_eq!(config.missing_component, MissingComponentPolicy::Ignore);
        assert_eq!(config.query_cache_capacity, WorldConfig::DEFAULT_QUERY_CACHE_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = WorldConfig::new()
            .with_missing_component(MissingComponentPolicy::Ignore)
            .with_query_cache_capacity(0);
        let json = serde_json::to_string(&config).unwrap();
        let restored: WorldConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
