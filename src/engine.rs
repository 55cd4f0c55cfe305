//! Boundary to the NTLM cryptographic engine.
//!
//! The engine owns the wire format: it builds type 2 messages and validates
//! type 3 responses (typically against a domain controller). The handshake
//! only ever looks at the message-type byte.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ServerChallenge;

/// Identity proven by a completed handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub domain: Option<String>,
    /// Engine-specific account data, opaque to this crate.
    #[serde(default)]
    pub credential: serde_json::Value,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: None,
            credential: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_credential(mut self, credential: serde_json::Value) -> Self {
        self.credential = credential;
        self
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The client message was malformed or the credential is invalid. The
    /// client may retry the handshake.
    #[error("{0}")]
    Rejected(String),
    /// The engine itself failed (domain controller unreachable, resource
    /// exhaustion, ...). Not the client's fault.
    #[error("engine fault: {0:#}")]
    Fault(#[source] anyhow::Error),
}

#[async_trait]
pub trait CryptoEngine: Send + Sync {
    /// Build the type 2 message answering `negotiate` with `challenge`.
    ///
    /// Must not mutate shared state.
    async fn negotiate(
        &self,
        negotiate: &[u8],
        challenge: &ServerChallenge,
    ) -> Result<Vec<u8>, EngineError>;

    /// Validate the type 3 message against the challenge that was issued.
    async fn authenticate(
        &self,
        authenticate: &[u8],
        challenge: &ServerChallenge,
    ) -> Result<Principal, EngineError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn principal_round_trips_through_json() {
        let principal = Principal::new("alice")
            .with_domain("CORP")
            .with_credential(json!({"sid": "S-1-5-21-1"}));

        let stored = serde_json::to_value(&principal).unwrap();
        let restored: Principal = serde_json::from_value(stored).unwrap();
        assert_eq!(restored, principal);
    }

    #[test]
    fn fault_keeps_its_source() {
        let err = EngineError::Fault(anyhow::anyhow!("dc unreachable"));
        assert_eq!(err.to_string(), "engine fault: dc unreachable");
        assert!(std::error::Error::source(&err).is_some());
    }
}
