//! Server configuration.
//!
//! Sourced from CLI flags with environment-variable fallback via clap's
//! `env` attribute — an explicit flag always wins over the environment,
//! matching the process-startup wrapper described in spec.md §6.

use clap::Parser;

/// Default inbound frame-size budget on the streaming transport.
pub const DEFAULT_MAX_PAYLOAD: usize = 16384;

/// Default cap on an HTTP sideband `POST /{group}/send` body.
pub const DEFAULT_MAX_SIDEBAND_BODY: usize = 8 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "dbpeer-router", about = "Inter-process message router")]
pub struct ServerConfig {
    /// Bind port.
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Bind address (informational; defaults to all interfaces).
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Maximum inbound frame size on the streaming transport.
    #[arg(long, env = "MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,

    /// Cap on an HTTP sideband POST body, to avoid unbounded memory use.
    #[arg(long, env = "MAX_SIDEBAND_BODY", default_value_t = DEFAULT_MAX_SIDEBAND_BODY)]
    pub max_sideband_body: usize,

    /// Enable TLS on the streaming transport and HTTP endpoints.
    #[arg(long, env = "SSL", default_value_t = false)]
    pub ssl: bool,

    /// PEM certificate path (used when `ssl` is set).
    #[arg(long, env = "CERT_PATH")]
    pub cert_path: Option<String>,

    /// PEM private key path (used when `ssl` is set).
    #[arg(long, env = "KEY_PATH")]
    pub key_path: Option<String>,

    /// PKCS#12 bundle path. Not supported standalone — see DESIGN.md.
    #[arg(long, env = "PFX_PATH")]
    pub pfx_path: Option<String>,

    /// Passphrase for `pfx_path` or an encrypted private key.
    #[arg(long, env = "PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Pre-shared token required as the `t` query parameter, if set.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Enables the GET-based `/{group}/send` test endpoint (§9 Open
    /// Questions: the source's environment sniff is replaced with an
    /// explicit flag).
    #[arg(long, env = "DEV_MODE", default_value_t = false)]
    pub dev_mode: bool,

    /// Emit JSON logs instead of human-readable ones.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn tls_enabled(&self) -> bool {
        self.ssl
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_args() {
        let cfg = ServerConfig::parse_from(["dbpeer-router", "--port", "9001"]);
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_payload, DEFAULT_MAX_PAYLOAD);
        assert!(!cfg.ssl);
        assert!(cfg.token.is_none());
    }

    #[test]
    fn listen_addr_formats_host_and_port() {
        let cfg = ServerConfig::parse_from(["dbpeer-router", "--port", "9001", "--host", "127.0.0.1"]);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:9001");
    }
}
