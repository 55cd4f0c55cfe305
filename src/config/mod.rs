//! Configuration sources and startup validation.
//!
//! Every source only answers raw lookups through [`ConfigSource::value`]; the
//! required/optional accessors and their validation are provided methods, so a
//! new source (or an override layer) never re-implements them.

mod snapshot;
mod sources;

pub use snapshot::{CacheSettings, ConfigSnapshot};
pub use sources::{EnvConfig, LayeredConfig, StaticConfig};

use secrecy::SecretString;
use std::{fmt, time::Duration};

use crate::error::InitializationError;

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 60;
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// How every surface reads the `enabled` switch: only a case-insensitive
/// `true` (surrounding whitespace ignored) enables; `1`, `yes`, `on` do not.
#[must_use]
pub fn parse_enabled(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Every option of the configuration surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    Enabled,
    Domain,
    DcIp,
    DcHostname,
    ServiceAccount,
    ServicePassword,
    CacheTtlSeconds,
    CacheCapacity,
}

impl ConfigKey {
    pub const ALL: [Self; 8] = [
        Self::Enabled,
        Self::Domain,
        Self::DcIp,
        Self::DcHostname,
        Self::ServiceAccount,
        Self::ServicePassword,
        Self::CacheTtlSeconds,
        Self::CacheCapacity,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Domain => "domain",
            Self::DcIp => "dc-ip",
            Self::DcHostname => "dc-hostname",
            Self::ServiceAccount => "service-account",
            Self::ServicePassword => "service-account-password",
            Self::CacheTtlSeconds => "cache-ttl-seconds",
            Self::CacheCapacity => "cache-capacity",
        }
    }

    /// Environment variable read by [`EnvConfig`].
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Enabled => "NTLM_ENABLED",
            Self::Domain => "NTLM_DOMAIN",
            Self::DcIp => "NTLM_DC_IP",
            Self::DcHostname => "NTLM_DC_HOSTNAME",
            Self::ServiceAccount => "NTLM_SERVICE_ACCOUNT",
            Self::ServicePassword => "NTLM_SERVICE_PASSWORD",
            Self::CacheTtlSeconds => "NTLM_CACHE_TTL_SECONDS",
            Self::CacheCapacity => "NTLM_CACHE_CAPACITY",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only access to the domain and cache parameters.
pub trait ConfigSource: Send + Sync {
    /// Raw lookup; `None` when the source has no value for `key`.
    fn value(&self, key: ConfigKey) -> Option<String>;

    /// See [`parse_enabled`]; a missing value disables.
    fn is_enabled(&self) -> bool {
        self.value(ConfigKey::Enabled)
            .is_some_and(|value| parse_enabled(&value))
    }

    /// Lookup that rejects absent and blank values.
    ///
    /// # Errors
    /// Returns `InitializationError::MissingValue` naming the key.
    fn required(&self, key: ConfigKey) -> Result<String, InitializationError> {
        match self.value(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(InitializationError::MissingValue(key)),
        }
    }

    /// Active Directory domain, e.g. `domain.local`.
    ///
    /// # Errors
    /// Returns an error if no value has been set.
    fn domain(&self) -> Result<String, InitializationError> {
        self.required(ConfigKey::Domain)
    }

    /// Domain controller IP address, e.g. `10.10.0.1`.
    ///
    /// # Errors
    /// Returns an error if no value has been set.
    fn dc_ip(&self) -> Result<String, InitializationError> {
        self.required(ConfigKey::DcIp)
    }

    /// Simple (non-FQDN) hostname of the domain controller, e.g. `adc01`.
    ///
    /// # Errors
    /// Returns an error if no value has been set.
    fn dc_hostname(&self) -> Result<String, InitializationError> {
        self.required(ConfigKey::DcHostname)
    }

    /// Computer account used to talk to the domain controller, e.g.
    /// `COMPUTER$@domain.local`.
    ///
    /// # Errors
    /// Returns an error if no value has been set.
    fn service_account(&self) -> Result<String, InitializationError> {
        self.required(ConfigKey::ServiceAccount)
    }

    /// # Errors
    /// Returns an error if no value has been set.
    fn service_password(&self) -> Result<SecretString, InitializationError> {
        self.required(ConfigKey::ServicePassword)
            .map(SecretString::from)
    }

    /// Challenge lifetime, measured from insertion.
    ///
    /// # Errors
    /// Returns an error if the value is not a positive integer.
    fn cache_ttl(&self) -> Result<Duration, InitializationError> {
        positive(self, ConfigKey::CacheTtlSeconds, DEFAULT_CACHE_TTL_SECONDS)
            .map(Duration::from_secs)
    }

    /// Maximum number of in-flight handshakes.
    ///
    /// # Errors
    /// Returns an error if the value is not a positive integer.
    fn cache_capacity(&self) -> Result<usize, InitializationError> {
        let capacity = positive(self, ConfigKey::CacheCapacity, DEFAULT_CACHE_CAPACITY as u64)?;
        usize::try_from(capacity).map_err(|_| InitializationError::InvalidValue {
            key: ConfigKey::CacheCapacity,
            reason: format!("{capacity} is too large"),
        })
    }
}

fn positive<C: ConfigSource + ?Sized>(
    source: &C,
    key: ConfigKey,
    default: u64,
) -> Result<u64, InitializationError> {
    let Some(raw) = source.value(key).filter(|value| !value.trim().is_empty()) else {
        return Ok(default);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(InitializationError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(err) => Err(InitializationError::InvalidValue {
            key,
            reason: format!("{raw:?} is not a number: {err}"),
        }),
    }
}
