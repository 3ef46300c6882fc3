//! Configuration module for stream PAF
//!
//! Settings arrive as JSON from the host, already read into memory.
//! They are applied once, when the scanner registry is built.

use serde::Deserialize;

use crate::paf::{DEFAULT_MAX_FLUSH_POINT, MAX_FLUSH_LEN};

/// Top-level PAF settings
#[derive(Clone, Debug, Deserialize)]
pub struct PafSettings {
    /// Queued bytes that force a flush when no boundary is found (0 = default)
    #[serde(default = "default_max_flush_point")]
    pub max_flush_point: u32,

    /// HTTP scanner settings
    #[serde(default)]
    pub http: HttpPafSettings,
}

/// HTTP message boundary scanner settings
#[derive(Clone, Debug, Deserialize)]
pub struct HttpPafSettings {
    /// Register the HTTP scanner at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Server ports carrying HTTP
    #[serde(default = "default_http_ports")]
    pub ports: Vec<u16>,

    /// Scan requests (client to server)
    #[serde(default = "default_true")]
    pub client: bool,

    /// Scan responses (server to client)
    #[serde(default = "default_true")]
    pub server: bool,

    /// Run PAF without the host asking for it
    #[serde(default = "default_true")]
    pub auto_activate: bool,

    /// Stop scanning after this many bytes in total (0 = no cap)
    #[serde(default)]
    pub byte_cap: u32,
}

fn default_max_flush_point() -> u32 {
    DEFAULT_MAX_FLUSH_POINT
}

fn default_http_ports() -> Vec<u16> {
    vec![80, 8080]
}

fn default_true() -> bool {
    true
}

impl Default for PafSettings {
    fn default() -> Self {
        Self {
            max_flush_point: default_max_flush_point(),
            http: HttpPafSettings::default(),
        }
    }
}

impl Default for HttpPafSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: default_http_ports(),
            client: true,
            server: true,
            auto_activate: true,
            byte_cap: 0,
        }
    }
}

impl PafSettings {
    /// Parse and validate settings from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str = std::str::from_utf8(bytes)
            .map_err(|e| ConfigError::InvalidUtf8(e.to_string()))?;

        let settings: Self = serde_json::from_str(config_str)
            .map_err(|e| ConfigError::InvalidJson(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_point > MAX_FLUSH_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_flush_point {} exceeds {}",
                self.max_flush_point, MAX_FLUSH_LEN
            )));
        }
        if self.http.enabled && self.http.ports.is_empty() {
            return Err(ConfigError::Invalid(
                "http scanner enabled without ports".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidUtf8(String),
    InvalidJson(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidUtf8(e) => write!(f, "Invalid UTF-8: {}", e),
            ConfigError::InvalidJson(e) => write!(f, "Invalid JSON: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid setting: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let settings = PafSettings::default();
        assert_eq!(settings.max_flush_point, 65_280);
        assert!(settings.http.enabled);
        assert_eq!(settings.http.ports, vec![80, 8080]);
        assert_eq!(settings.http.byte_cap, 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{"max_flush_point": 16384, "http": {"ports": [8000], "server": false}}"#;
        let settings = PafSettings::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(settings.max_flush_point, 16384);
        assert_eq!(settings.http.ports, vec![8000]);
        assert!(settings.http.client);
        assert!(!settings.http.server);
        assert!(settings.http.auto_activate);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let settings = PafSettings::from_bytes(b"{}").unwrap();
        assert_eq!(settings.max_flush_point, DEFAULT_MAX_FLUSH_POINT);
        assert_eq!(settings.http.ports, vec![80, 8080]);
    }

    #[test]
    fn test_invalid_settings() {
        let err = PafSettings::from_bytes(br#"{"max_flush_point": 4294967295}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = PafSettings::from_bytes(br#"{"http": {"ports": []}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        // no ports is fine when the scanner is off
        assert!(PafSettings::from_bytes(br#"{"http": {"enabled": false, "ports": []}}"#).is_ok());
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            PafSettings::from_bytes(b"not json"),
            Err(ConfigError::InvalidJson(_))
        ));
        assert!(matches!(
            PafSettings::from_bytes(&[0xff, 0xfe]),
            Err(ConfigError::InvalidUtf8(_))
        ));
        let err = ConfigError::InvalidJson("eof".to_string());
        assert_eq!(err.to_string(), "Invalid JSON: eof");
    }
}
