//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for one daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Daemon host.
    pub host: String,
    /// Daemon remote-control port.
    pub port: u16,
    /// Remote-control password.
    pub password: String,
    /// Application name transmitted on login.
    pub client_name: String,
    /// Application version transmitted on login.
    pub client_version: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-read-attempt timeout in milliseconds. Reads that make
    /// progress keep accumulating; this bounds silence, not totals.
    pub read_timeout_ms: u64,
    /// Re-decode and trace-log every outgoing packet before sending.
    pub log_outgoing: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4712,
            password: String::new(),
            client_name: "ec-remote".into(),
            client_version: env!("CARGO_PKG_VERSION").into(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 1000,
            log_outgoing: false,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ConnectionConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("host"));
        assert!(text.contains("4712"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ConnectionConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ConnectionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.port, 4712);
        assert_eq!(parsed.read_timeout_ms, 1000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: ConnectionConfig =
            toml::from_str("host = \"10.0.0.2\"\npassword = \"hunter2\"").unwrap();
        assert_eq!(parsed.host, "10.0.0.2");
        assert_eq!(parsed.password, "hunter2");
        assert_eq!(parsed.port, 4712);
        assert_eq!(parsed.client_name, "ec-remote");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = ConnectionConfig::load(Path::new("/nonexistent/ec-remote.toml"));
        assert_eq!(cfg.port, 4712);
    }
}
