//! Agent configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and timeouts applied to every run of an agent.
///
/// The struct can be deserialized, so that hosts may keep it in a config
/// file. Missing fields fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of model steps in one run.
    pub recursion_limit: usize,
    /// Timeout of a single tool call, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_ms: Option<u64>,
    /// Timeout of a whole run, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 25,
            tool_timeout_ms: None,
            run_timeout_ms: None,
        }
    }
}

impl AgentConfig {
    /// Sets the maximum number of model steps in one run.
    #[inline]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets the timeout of a single tool call.
    #[inline]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Sets the timeout of a whole run.
    #[inline]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    #[inline]
    pub(crate) fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }

    #[inline]
    pub(crate) fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_partial_config() {
        let config: AgentConfig =
            serde_json::from_value(json!({ "tool_timeout_ms": 1500 }))
                .unwrap();
        assert_eq!(config.recursion_limit, 25);
        assert_eq!(config.tool_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.run_timeout(), None);

        let config = AgentConfig::default()
            .with_recursion_limit(3)
            .with_run_timeout(Duration::from_secs(2));
        assert_eq!(config.recursion_limit, 3);
        assert_eq!(config.run_timeout_ms, Some(2000));
    }
}
