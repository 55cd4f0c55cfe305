//! Server challenge storage between the two handshake round trips.

mod memory;

pub use memory::MemoryChallengeCache;

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use std::{fmt, net::IpAddr};

pub const CHALLENGE_LEN: usize = 8;

/// Correlation key linking the negotiate and authenticate requests of one
/// client, usually its IP address. It proves nothing about the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientIdentity {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The 8-byte nonce issued with a type 2 message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerChallenge([u8; CHALLENGE_LEN]);

impl ServerChallenge {
    /// Draw a fresh challenge from the operating system CSPRNG.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self, rand::Error> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CHALLENGE_LEN] {
        &self.0
    }
}

/// Concurrent store of in-flight challenges, bounded by TTL and capacity.
///
/// Implementations must tolerate concurrent `put`/`get`/`remove` from
/// independent requests; a `get` never observes a partially written value.
#[async_trait]
pub trait ChallengeCache: Send + Sync {
    /// Store `challenge` for `id`, replacing any challenge already in flight.
    async fn put(&self, id: &ClientIdentity, challenge: ServerChallenge);

    /// The live challenge for `id`, if any.
    async fn get(&self, id: &ClientIdentity) -> Option<ServerChallenge>;

    /// Forget the challenge for `id`; no-op if absent.
    async fn remove(&self, id: &ClientIdentity);

    /// Release backend resources. Called once at shutdown.
    async fn dispose(&self);
}
