//! # ntlm-gate (server-side NTLMv2 handshake middleware)
//!
//! `ntlm-gate` is a `tower` layer that authenticates inbound HTTP requests with
//! the two-round-trip NTLM challenge/response handshake and binds the resulting
//! identity to the caller's session.
//!
//! ## Handshake
//!
//! 1. A request without credentials (and without a bound session) receives
//!    `401` with `WWW-Authenticate: NTLM`.
//! 2. The client answers with a type 1 (negotiate) message. The server creates
//!    an 8-byte challenge, remembers it for the caller's address and replies
//!    `401` with the engine's type 2 message.
//! 3. The client answers with a type 3 (authenticate) message. The remembered
//!    challenge is consumed (single use), the engine validates the response and
//!    the principal is stored in the session before the request is forwarded.
//!
//! Any recoverable failure restarts the handshake with the same bare `401`, so
//! clients cannot tell a bad credential from an expired challenge.
//!
//! ## Collaborators
//!
//! The NTLM wire protocol itself is not implemented here. Hosts supply a
//! [`engine::CryptoEngine`] (for example a NETLOGON client talking to the domain
//! controller), a [`session::SessionBinder`] and optionally their own
//! [`cache::ChallengeCache`] backend; the crate ships in-memory implementations
//! of the latter two.
//!
//! ```ignore
//! let layer = NtlmLayer::builder(&EnvConfig)
//!     .engine(|snapshot| Ok(Arc::new(NetlogonEngine::connect(snapshot)?)))
//!     .build()?;
//! let app = Router::new().route("/", get(whoami)).layer(layer);
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod session;

pub use cache::{ChallengeCache, ClientIdentity, MemoryChallengeCache, ServerChallenge};
pub use config::{ConfigSnapshot, ConfigSource, EnvConfig, LayeredConfig, StaticConfig};
pub use engine::{CryptoEngine, EngineError, Principal};
pub use error::{AuthenticationError, InitializationError};
pub use handshake::{NtlmLayer, NtlmService, RemoteUser};
pub use session::{MemorySessionStore, SessionBinder};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
