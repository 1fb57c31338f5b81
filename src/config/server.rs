/// Server configuration.
///
/// Network binding defaults (overridable through the environment) and handshake limits.
use log::warn;

/// Default interface the HTTP server binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port the HTTP server binds to.
pub const DEFAULT_PORT: u16 = 8080;

/// Time (in seconds) a new connection has to answer the identity handshake.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Binding settings resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerSettings {
    /// Read `SERVER_HOST` and `SERVER_PORT`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(host) = lookup("SERVER_HOST").filter(|h| !h.is_empty()) {
            settings.host = host;
        }
        if let Some(raw) = lookup("SERVER_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => settings.port = port,
                Err(_) => warn!("[Config] Ignoring invalid SERVER_PORT={:?}, using {}", raw, settings.port),
            }
        }
        settings
    }
}
