use secrecy::SecretString;
use std::{fmt, time::Duration};
use tracing::info;

use super::ConfigSource;
use crate::error::InitializationError;

/// Challenge cache sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: usize,
}

/// Validated configuration, built once at startup and never mutated.
#[derive(Clone)]
pub struct ConfigSnapshot {
    enabled: bool,
    domain: String,
    dc_ip: String,
    dc_hostname: String,
    service_account: String,
    service_password: SecretString,
    cache: CacheSettings,
}

impl ConfigSnapshot {
    /// Read and validate every field of `source`.
    ///
    /// # Errors
    /// Returns the first `InitializationError` raised by a required or numeric
    /// field.
    pub fn load<C: ConfigSource + ?Sized>(source: &C) -> Result<Self, InitializationError> {
        let domain = source.domain()?;
        info!("Windows domain: {domain}");

        let dc_ip = source.dc_ip()?;
        info!("Domain controller IP address: {dc_ip}");

        let dc_hostname = source.dc_hostname()?;
        info!("Domain controller hostname: {dc_hostname}");

        let service_account = source.service_account()?;
        info!("Computer account name: {service_account}");

        let service_password = source.service_password()?;

        let cache = CacheSettings {
            ttl: source.cache_ttl()?,
            capacity: source.cache_capacity()?,
        };

        Ok(Self {
            enabled: source.is_enabled(),
            domain,
            dc_ip,
            dc_hostname,
            service_account,
            service_password,
            cache,
        })
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn dc_ip(&self) -> &str {
        &self.dc_ip
    }

    #[must_use]
    pub fn dc_hostname(&self) -> &str {
        &self.dc_hostname
    }

    #[must_use]
    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    #[must_use]
    pub fn service_password(&self) -> &SecretString {
        &self.service_password
    }

    #[must_use]
    pub fn cache(&self) -> CacheSettings {
        self.cache
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("enabled", &self.enabled)
            .field("domain", &self.domain)
            .field("dc_ip", &self.dc_ip)
            .field("dc_hostname", &self.dc_hostname)
            .field("service_account", &self.service_account)
            .field("service_password", &"***")
            .field("cache", &self.cache)
            .finish()
    }
}
