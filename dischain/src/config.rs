use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Engine tunables. Every key is optional in the TOML form.
///
/// ```toml
/// max_call_depth = 16
/// validate_chains = true
/// opaque_data_item = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How many `CallNextDissector` levels may nest below the top-level chain.
    pub max_call_depth: usize,
    /// Run the static push/pop checks when the registry is frozen.
    pub validate_chains: bool,
    /// Add a "Data" item for ranges no dissector was found for.
    pub opaque_data_item: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 32,
            validate_chains: true,
            opaque_data_item: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

#[cfg(test)]
mod test_engine_config {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = EngineConfig::from_toml_str("max_call_depth = 4").unwrap();
        assert_eq!(
            config,
            EngineConfig {
                max_call_depth: 4,
                ..EngineConfig::default()
            }
        );
        assert_eq!(
            EngineConfig::from_toml_str("").unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("max_depth = 4").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_path("/nonexistent/dischain.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
