//! Mock Scope Configuration
//!
//! Behaviour knobs shared by every session a scope creates. Values come from
//! code, from the environment, or from a YAML file.
//!
//! ```yaml
//! duplicate_stubs: replace
//! fail_on_drop: true
//! log_calls: false
//! ```

use crate::result::{MockError, MockResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable selecting the [`DuplicateStubPolicy`]
pub const ENV_DUPLICATE_STUBS: &str = "INTERPOSE_DUPLICATE_STUBS";
/// Environment variable toggling panics for unreported failures
pub const ENV_FAIL_ON_DROP: &str = "INTERPOSE_FAIL_ON_DROP";
/// Environment variable toggling per-call trace events
pub const ENV_LOG_CALLS: &str = "INTERPOSE_LOG_CALLS";

/// What happens when a stub is added with a pattern that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStubPolicy {
    /// Keep both rules; the earlier one wins at call time
    #[default]
    Append,
    /// Overwrite the earlier rule's outcome in place
    Replace,
}

impl DuplicateStubPolicy {
    /// Name used in configuration sources
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

impl std::str::FromStr for DuplicateStubPolicy {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(MockError::Config {
                message: format!("unknown duplicate stub policy '{other}' (expected append or replace)"),
            }),
        }
    }
}

/// Configuration for a `MockScope`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Handling of repeated stub patterns
    pub duplicate_stubs: DuplicateStubPolicy,
    /// Panic when a scope is dropped with unreported failures
    pub fail_on_drop: bool,
    /// Emit a trace event for every intercepted call
    pub log_calls: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            duplicate_stubs: DuplicateStubPolicy::Append,
            fail_on_drop: true,
            log_calls: true,
        }
    }
}

impl MockConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> MockConfigBuilder {
        MockConfigBuilder::default()
    }

    /// Defaults overridden by `INTERPOSE_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> MockResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MockResult<Self> {
        let mut config = Self::default();
        if let Some(policy) = lookup(ENV_DUPLICATE_STUBS) {
            config.duplicate_stubs = policy.parse()?;
        }
        if let Some(flag) = lookup(ENV_FAIL_ON_DROP) {
            config.fail_on_drop = parse_flag(ENV_FAIL_ON_DROP, &flag)?;
        }
        if let Some(flag) = lookup(ENV_LOG_CALLS) {
            config.log_calls = parse_flag(ENV_LOG_CALLS, &flag)?;
        }
        Ok(config)
    }

    /// Parse YAML; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    pub fn from_yaml_str(yaml: &str) -> MockResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> MockResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> MockResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

fn parse_flag(key: &str, raw: &str) -> MockResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MockError::Config {
            message: format!("{key}: expected a boolean, got '{other}'"),
        }),
    }
}

/// Builder for `MockConfig`
#[derive(Debug, Clone, Default)]
pub struct MockConfigBuilder {
    config: MockConfig,
}

impl MockConfigBuilder {
    /// Set the duplicate stub policy
    #[must_use]
    pub const fn duplicate_stubs(mut self, policy: DuplicateStubPolicy) -> Self {
        self.config.duplicate_stubs = policy;
        self
    }

    /// Enable/disable panicking on drop with unreported failures
    #[must_use]
    pub const fn fail_on_drop(mut self, enabled: bool) -> Self {
        self.config.fail_on_drop = enabled;
        self
    }

    /// Enable/disable per-call trace events
    #[must_use]
    pub const fn log_calls(mut self, enabled: bool) -> Self {
        self.config.log_calls = enabled;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> MockConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    mod default_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = MockConfig::default();
            assert_eq!(config.duplicate_stubs, DuplicateStubPolicy::Append);
            assert!(config.fail_on_drop);
            assert!(config.log_calls);
        }

        #[test]
        fn test_builder() {
            let config = MockConfig::builder()
                .duplicate_stubs(DuplicateStubPolicy::Replace)
                .fail_on_drop(false)
                .log_calls(false)
                .build();
            assert_eq!(config.duplicate_stubs, DuplicateStubPolicy::Replace);
            assert!(!config.fail_on_drop);
            assert!(!config.log_calls);
        }
    }

    mod env_tests {
        use super::*;

        fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
            let map: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            move |key| map.get(key).cloned()
        }

        #[test]
        fn test_empty_environment_keeps_defaults() {
            let config = MockConfig::from_lookup(lookup(&[])).unwrap();
            assert_eq!(config, MockConfig::default());
        }

        #[test]
        fn test_overrides() {
            let config = MockConfig::from_lookup(lookup(&[
                (ENV_DUPLICATE_STUBS, "Replace"),
                (ENV_FAIL_ON_DROP, "0"),
                (ENV_LOG_CALLS, "off"),
            ]))
            .unwrap();
            assert_eq!(config.duplicate_stubs, DuplicateStubPolicy::Replace);
            assert!(!config.fail_on_drop);
            assert!(!config.log_calls);
        }

        #[test]
        fn test_invalid_values() {
            let err = MockConfig::from_lookup(lookup(&[(ENV_DUPLICATE_STUBS, "merge")]))
                .unwrap_err();
            assert!(err.to_string().contains("merge"));
            assert!(MockConfig::from_lookup(lookup(&[(ENV_LOG_CALLS, "maybe")])).is_err());
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let config = MockConfig::from_yaml_str("duplicate_stubs: replace\n").unwrap();
            assert_eq!(config.duplicate_stubs, DuplicateStubPolicy::Replace);
            assert!(config.fail_on_drop);
        }

        #[test]
        fn test_yaml_file_roundtrip() {
            let config = MockConfig::builder().log_calls(false).build();
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();

            let loaded = MockConfig::from_yaml_file(file.path()).unwrap();
            assert_eq!(loaded, config);
        }

        #[test]
        fn test_missing_file_is_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = MockConfig::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
            assert!(matches!(err, MockError::Io(_)));
        }

        #[test]
        fn test_malformed_yaml() {
            let err = MockConfig::from_yaml_str("duplicate_stubs: [1, 2").unwrap_err();
            assert!(matches!(err, MockError::Yaml(_)));
        }
    }
}
