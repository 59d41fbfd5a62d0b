use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variables understood by the bridge; same names the daemon's
/// original launcher scripts use, so one shell profile configures both.
pub const HOST_ENV: &str = "JADX_DAEMON_MCP_HOST";
pub const PORT_ENV: &str = "JADX_DAEMON_MCP_PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host the jadx daemon listens on.
    pub host: String,
    /// Port the jadx daemon listens on.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8651,
        }
    }
}

impl Config {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".jadx-mcp.json"))
}

/// Defaults, overlaid by `~/.jadx-mcp.json` when present and parseable,
/// overlaid by environment variables. Unreadable or malformed files fall
/// back silently.
pub fn load_config() -> Config {
    let mut cfg = config_path()
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|text| serde_json::from_str::<Config>(&text).ok())
        .unwrap_or_default();

    if let Ok(host) = std::env::var(HOST_ENV) {
        if !host.is_empty() {
            cfg.host = host;
        }
    }
    if let Ok(port) = std::env::var(PORT_ENV) {
        if let Ok(port) = port.parse() {
            cfg.port = port;
        }
    }
    cfg
}
