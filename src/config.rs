//! Panel configuration.

use serde::Deserialize;

use crate::error::PanelError;

/// Brightness shown when the device status cannot be read.
pub const DEFAULT_BRIGHTNESS: u8 = 10;

/// Path prefix under which the device exposes its JSON API.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// Settings for a [`PanelViewModel`](crate::PanelViewModel).
///
/// Missing fields fall back to the built-in defaults, so an empty JSON
/// object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Prefix prepended to every endpoint (e.g. `/api/` + `status`).
    pub api_prefix: String,
    /// Brightness percent to seed when the status fetch fails.
    pub default_brightness: u8,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.into(),
            default_brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

impl PanelConfig {
    /// Parse a configuration from a JSON document.
    ///
    /// `default_brightness` is clamped to 100.
    pub fn from_json_str(raw: &str) -> Result<Self, PanelError> {
        let mut config: PanelConfig =
            serde_json::from_str(raw).map_err(|e| PanelError::Config(e.to_string()))?;
        config.default_brightness = config.default_brightness.min(100);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PanelConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PanelConfig::default());
        assert_eq!(config.default_brightness, 10);
        assert_eq!(config.api_prefix, "/api/");
    }

    #[test]
    fn test_partial_override() {
        let config = PanelConfig::from_json_str(r#"{"default_brightness": 250}"#).unwrap();
        assert_eq!(config.default_brightness, 100);
        assert_eq!(config.api_prefix, "/api/");
    }

    #[test]
    fn test_invalid_document() {
        let err = PanelConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, PanelError::Config(_)));
    }
}
