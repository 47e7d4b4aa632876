//! Graph configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tunables for one graph instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub name: String,
    /// Budget used by graph-level calls that do not take an explicit timeout.
    pub default_timeout_ms: u64,
    /// Sub-budget for each attempt at locking a vertex pair.
    pub pair_attempt_timeout_ms: u64,
    /// Sleep between delete-engine retry passes.
    pub backoff_ms: u64,
    /// Maximum writable lock recursion per vertex.
    pub reentrancy_limit: u8,
    /// Maximum concurrent readonly locks per vertex.
    pub readers_limit: u8,
    /// Force the readonly transition even when disallowed.
    pub readonly_force: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "graph".into(),
            default_timeout_ms: 1000,
            pair_attempt_timeout_ms: 10,
            backoff_ms: 1,
            reentrancy_limit: 112,
            readers_limit: 112,
            readonly_force: false,
        }
    }
}

impl GraphConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("reentrancy_limit", self.reentrancy_limit), ("readers_limit", self.readers_limit)] {
            if !(1..=127).contains(&v) {
                return Err(Error::Config(format!("{name} must be within 1..=127, got {v}")));
            }
        }
        if self.pair_attempt_timeout_ms == 0 {
            return Err(Error::Config("pair_attempt_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = ms;
        self
    }

    pub fn with_reentrancy_limit(mut self, limit: u8) -> Self {
        self.reentrancy_limit = limit;
        self
    }

    pub fn with_readers_limit(mut self, limit: u8) -> Self {
        self.readers_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GraphConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let c = GraphConfig::from_json_str(r#"{"name":"g1","readers_limit":8}"#).unwrap();
        assert_eq!(c.name, "g1");
        assert_eq!(c.readers_limit, 8);
        assert_eq!(c.reentrancy_limit, 112);
    }

    #[test]
    fn test_from_json_rejects_limits() {
        assert!(matches!(
            GraphConfig::from_json_str(r#"{"reentrancy_limit":200}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(GraphConfig::from_json_str("not json"), Err(Error::Config(_))));
    }
}
