use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8153;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection parameters for a GoCD server.
///
/// Built once at the CLI boundary from environment and flags, then
/// passed into every remote operation. Core code never reads the
/// process environment itself.
#[derive(Debug, Clone)]
pub struct ServerConnection {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl ServerConnection {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Base URL of the server, `host:port` with an `http://` default
    /// when the host carries no scheme.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }
}
