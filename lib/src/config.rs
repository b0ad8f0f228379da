//! Configuration schema persisted as TOML.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirlinkConfig {
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub sim: SimSection,
}

/// HTTP/WebSocket frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_bind")]
    pub bind: String,
    #[serde(default = "default_html_root")]
    pub html_root: String,
}

/// UDP device server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    #[serde(default = "default_device_bind")]
    pub bind: String,
    /// Start the device server at launch instead of waiting for a UI command.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

/// Simulator link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSection {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_true")]
    pub allow_reconnect: bool,
    /// Attempt the first simulator connection at launch.
    #[serde(default)]
    pub autostart: bool,
}

fn default_web_bind() -> String {
    "127.0.0.1:5170".into()
}

fn default_html_root() -> String {
    "html".into()
}

fn default_device_bind() -> String {
    "0.0.0.0:4209".into()
}

fn default_app_name() -> String {
    "Airlink".into()
}

fn default_true() -> bool {
    true
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            bind: default_web_bind(),
            html_root: default_html_root(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            bind: default_device_bind(),
            autostart: true,
        }
    }
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            allow_reconnect: true,
            autostart: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: AirlinkConfig = toml::from_str("").unwrap();
        assert_eq!(config.web.bind, "127.0.0.1:5170");
        assert_eq!(config.device.bind, "0.0.0.0:4209");
        assert!(config.device.autostart);
        assert!(config.sim.allow_reconnect);
        assert!(!config.sim.autostart);
    }

    #[test]
    fn partial_section_fills_in_defaults() {
        let config: AirlinkConfig =
            toml::from_str("[web]\nbind = \"0.0.0.0:8080\"\n").unwrap();
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.web.html_root, "html");
    }
}
