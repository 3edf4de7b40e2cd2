//! Anonymity-network control-channel adapter.
//!
//! Two capabilities: signal a circuit change (`SIGNAL NEWNYM` on the Tor
//! control port) and verify that egress traffic is actually routed through
//! the network (an advisory check against the identity-check endpoint,
//! issued through the SOCKS proxy). Both are best-effort: every failure
//! collapses to `false` and the fetch loop carries on.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use torfetch_common::ProxyEndpoint;
use tracing::{info, warn};

/// Bound on one control-channel conversation (connect, auth, signal).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait IdentityControl: Send + Sync {
    /// Advisory: is the current egress routed through the anonymity
    /// network? Never blocks the run - a `false` is only logged.
    async fn verify_routing(&self, timeout: Duration) -> bool;

    /// Signal a circuit change. Returns false on any connect/auth/signal
    /// failure; the caller proceeds with whatever identity results. After a
    /// `true`, the caller must wait the settling interval before the new
    /// identity is usable.
    async fn renew_identity(&self) -> bool;
}

/// Reply of the identity-check endpoint.
#[derive(Debug, Deserialize)]
struct CheckReply {
    #[serde(rename = "IsTor")]
    is_tor: bool,
    #[serde(rename = "IP", default)]
    ip: String,
}

pub struct TorController {
    control_addr: String,
    password: Option<String>,
    proxy: ProxyEndpoint,
    check_url: String,
}

impl TorController {
    pub fn new(
        control_addr: impl Into<String>,
        password: Option<String>,
        proxy: ProxyEndpoint,
        check_url: impl Into<String>,
    ) -> Self {
        Self {
            control_addr: control_addr.into(),
            password,
            proxy,
            check_url: check_url.into(),
        }
    }

    async fn check_exit(&self, timeout: Duration) -> Result<CheckReply> {
        let proxy = reqwest::Proxy::all(self.proxy.server_string())
            .context("building proxy for routing check")?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .build()
            .context("building HTTP client for routing check")?;
        let response = client
            .get(&self.check_url)
            .send()
            .await
            .context("requesting identity-check endpoint")?;
        if !response.status().is_success() {
            bail!("identity-check endpoint returned {}", response.status());
        }
        response
            .json::<CheckReply>()
            .await
            .context("decoding identity-check reply")
    }

    async fn signal_newnym(&self) -> Result<()> {
        let stream = TcpStream::connect(self.control_addr.as_str())
            .await
            .with_context(|| format!("connecting to control port {}", self.control_addr))?;
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let auth = match &self.password {
            Some(password) => format!("AUTHENTICATE \"{}\"\r\n", escape_control_arg(password)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        writer.write_all(auth.as_bytes()).await?;
        expect_ok(&mut lines, "AUTHENTICATE").await?;

        writer.write_all(b"SIGNAL NEWNYM\r\n").await?;
        expect_ok(&mut lines, "SIGNAL NEWNYM").await?;

        // Best effort - the signal already went through.
        let _ = writer.write_all(b"QUIT\r\n").await;
        Ok(())
    }
}

#[async_trait]
impl IdentityControl for TorController {
    async fn verify_routing(&self, timeout: Duration) -> bool {
        info!(
            "Checking egress routing via {} against {}",
            self.proxy, self.check_url
        );
        match self.check_exit(timeout).await {
            Ok(reply) if reply.is_tor => {
                info!("Egress verified as anonymized (exit IP: {})", reply.ip);
                true
            }
            Ok(reply) => {
                warn!(
                    "Connected, but egress is NOT routed through the anonymity network (IP: {})",
                    reply.ip
                );
                false
            }
            Err(e) => {
                warn!("Routing check failed: {:#}", e);
                false
            }
        }
    }

    async fn renew_identity(&self) -> bool {
        match tokio::time::timeout(CONTROL_TIMEOUT, self.signal_newnym()).await {
            Ok(Ok(())) => {
                info!("NEWNYM signal accepted by control port");
                true
            }
            Ok(Err(e)) => {
                warn!(
                    "Could not renew identity via {}: {:#}. \
                     Ensure the control port is enabled and the password (if any) is correct.",
                    self.control_addr, e
                );
                false
            }
            Err(_) => {
                warn!(
                    "Control-channel conversation with {} exceeded {:?}",
                    self.control_addr, CONTROL_TIMEOUT
                );
                false
            }
        }
    }
}

async fn expect_ok(lines: &mut Lines<BufReader<OwnedReadHalf>>, command: &str) -> Result<()> {
    loop {
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("control channel closed during {}", command))?;
        if !is_final_reply(&line) {
            // 250-/250+ continuation lines; keep reading.
            continue;
        }
        if is_ok_reply(&line) {
            return Ok(());
        }
        bail!("{} rejected: {}", command, line.trim_end());
    }
}

/// Replies are "NNN TEXT"; continuation lines use '-' or '+' after the code.
fn is_final_reply(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(b' ') | None => line.len() >= 3,
        _ => false,
    }
}

fn is_ok_reply(line: &str) -> bool {
    line.starts_with("250")
}

fn escape_control_arg(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_reply_detection() {
        assert!(is_ok_reply("250 OK"));
        assert!(is_ok_reply("250 closing connection"));
        assert!(!is_ok_reply("515 Bad authentication"));
        assert!(!is_ok_reply("550 Unrecognized command"));
    }

    #[test]
    fn test_final_vs_continuation_replies() {
        assert!(is_final_reply("250 OK"));
        assert!(is_final_reply("515 Bad authentication"));
        assert!(is_final_reply("250"));
        assert!(!is_final_reply("250-VERSION Tor=0.4.8.10"));
        assert!(!is_final_reply("250+info="));
    }

    #[test]
    fn test_password_escaping() {
        assert_eq!(escape_control_arg("plain"), "plain");
        assert_eq!(escape_control_arg(r#"pa"ss"#), r#"pa\"ss"#);
        assert_eq!(escape_control_arg(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn test_check_reply_decoding() {
        let reply: CheckReply =
            serde_json::from_str(r#"{"IsTor": true, "IP": "185.220.101.1"}"#).unwrap();
        assert!(reply.is_tor);
        assert_eq!(reply.ip, "185.220.101.1");

        // IP is optional in practice; IsTor is the decision bit.
        let reply: CheckReply = serde_json::from_str(r#"{"IsTor": false}"#).unwrap();
        assert!(!reply.is_tor);
        assert!(reply.ip.is_empty());
    }
}
