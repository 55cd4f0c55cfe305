use thiserror::Error;

use crate::config::ConfigKey;

/// Fatal startup failures. The middleware refuses to start instead of
/// degrading to an unauthenticated pass-through.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("No value set for {0}")]
    MissingValue(ConfigKey),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: ConfigKey, reason: String },
    #[error("Failed to initialize challenge cache: {0}")]
    Cache(String),
    #[error("Failed to initialize crypto engine: {0}")]
    Engine(String),
    #[error("No crypto engine configured")]
    MissingEngine,
}

/// Recoverable handshake failures. All of them send the client back to the
/// start of the handshake.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("Authorization payload is not valid base64")]
    InvalidEncoding,
    #[error("NTLM message too short: {len} bytes")]
    MessageTooShort { len: usize },
    #[error("No server challenge in flight for {0}")]
    ChallengeNotFound(String),
    #[error("Could not resolve client identity")]
    UnknownClient,
    #[error("NTLM authentication rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_names_the_key() {
        let err = InitializationError::MissingValue(ConfigKey::DcHostname);
        assert_eq!(err.to_string(), "No value set for dc-hostname");
    }
}
