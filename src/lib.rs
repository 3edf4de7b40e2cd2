//! # torfetch
//!
//! torfetch fetches a single web page through the Tor SOCKS proxy,
//! tolerating proxy instability and anti-bot defenses by retrying with a
//! fresh egress identity and a randomized browser fingerprint on every
//! failed attempt.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use torfetch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FetchConfig {
//!         target_url: "https://example.com/".to_string(),
//!         ..FetchConfig::default()
//!     };
//!
//!     match torfetch::fetcher::run_fetch(config).await? {
//!         RunOutcome::Success { result, .. } => {
//!             println!("captured {} bytes", result.content.len());
//!         }
//!         RunOutcome::Failure { attempts } => {
//!             eprintln!("gave up after {} attempts", attempts.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The retry state machine is fully testable without Tor or a browser:
//! implement [`common::RenderEngine`] and [`fetcher::IdentityControl`] with
//! fakes and hand them to [`fetcher::FetchOrchestrator`] directly.

pub use torfetch_common as common;
pub use torfetch_fetcher as fetcher;

pub mod prelude {
    pub use torfetch_common::{
        FetchConfig, FingerprintPool, ProxyEndpoint, ProxyScheme, RenderContext, RenderEngine,
        RenderError, RenderErrorKind, RenderSession, RenderedDocument, Verdict, Viewport,
    };
    pub use torfetch_fetcher::{
        Attempt, AttemptOutcome, CapturedResult, FetchOrchestrator, IdentityControl, RunOutcome,
        TorController,
    };
}
