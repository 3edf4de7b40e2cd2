use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Proxy protocol/scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProxyScheme {
    /// HTTP proxy
    Http,
    /// HTTPS proxy
    Https,
    /// SOCKS5 proxy (default - Tor exposes a SOCKS5 listener)
    #[default]
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            other => Err(anyhow!("unsupported proxy scheme: {}", other)),
        }
    }
}

/// Address of the SOCKS listener every rendered navigation is routed through.
///
/// The rendering process is launched with this endpoint at process level, so
/// one endpoint stays bound to a session for the session's whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Build the proxy URL handed to the browser's `--proxy-server` flag and
    /// to the HTTP client used for the routing check.
    pub fn server_string(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl Default for ProxyEndpoint {
    fn default() -> Self {
        Self::new(ProxyScheme::Socks5, "127.0.0.1", 9050)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.server_string())
    }
}

impl FromStr for ProxyEndpoint {
    type Err = anyhow::Error;

    /// Parses "scheme://host:port". Credentials are not supported: the Tor
    /// SOCKS listener is unauthenticated and Chrome ignores embedded
    /// credentials in --proxy-server anyway.
    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| anyhow!("proxy endpoint missing scheme: {}", s))?;
        let (host, port) = rest
            .trim_end_matches('/')
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("proxy endpoint missing port: {}", s))?;
        if host.is_empty() {
            return Err(anyhow!("proxy endpoint missing host: {}", s));
        }
        Ok(Self {
            scheme: scheme.parse()?,
            host: host.to_string(),
            port: port.parse()?,
        })
    }
}
