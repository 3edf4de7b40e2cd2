pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod proxy;
pub mod utils;
pub mod validate;

pub use config::{FetchConfig, Viewport};
pub use engine::{
    RenderContext, RenderEngine, RenderError, RenderErrorKind, RenderSession, RenderedDocument,
};
pub use fingerprint::FingerprintPool;
pub use proxy::{ProxyEndpoint, ProxyScheme};
pub use validate::{is_structurally_complete, validate, Verdict};
