use secrecy::{ExposeSecret, SecretString};
use std::{collections::BTreeMap, env, fmt, sync::Arc};

use super::{ConfigKey, ConfigSource};

/// In-process value object, filled by the CLI or by the host application.
#[derive(Clone, Default)]
pub struct StaticConfig {
    enabled: bool,
    domain: Option<String>,
    dc_ip: Option<String>,
    dc_hostname: Option<String>,
    service_account: Option<String>,
    service_password: Option<SecretString>,
    cache_ttl_seconds: Option<u64>,
    cache_capacity: Option<usize>,
}

impl StaticConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_dc_ip(mut self, dc_ip: impl Into<String>) -> Self {
        self.dc_ip = Some(dc_ip.into());
        self
    }

    #[must_use]
    pub fn with_dc_hostname(mut self, dc_hostname: impl Into<String>) -> Self {
        self.dc_hostname = Some(dc_hostname.into());
        self
    }

    #[must_use]
    pub fn with_service_account(mut self, account: impl Into<String>) -> Self {
        self.service_account = Some(account.into());
        self
    }

    #[must_use]
    pub fn with_service_password(mut self, password: SecretString) -> Self {
        self.service_password = Some(password);
        self
    }

    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }
}

impl ConfigSource for StaticConfig {
    fn value(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Enabled => Some(self.enabled.to_string()),
            ConfigKey::Domain => self.domain.clone(),
            ConfigKey::DcIp => self.dc_ip.clone(),
            ConfigKey::DcHostname => self.dc_hostname.clone(),
            ConfigKey::ServiceAccount => self.service_account.clone(),
            ConfigKey::ServicePassword => self
                .service_password
                .as_ref()
                .map(|password| password.expose_secret().to_string()),
            ConfigKey::CacheTtlSeconds => self.cache_ttl_seconds.map(|v| v.to_string()),
            ConfigKey::CacheCapacity => self.cache_capacity.map(|v| v.to_string()),
        }
    }
}

impl fmt::Debug for StaticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticConfig")
            .field("enabled", &self.enabled)
            .field("domain", &self.domain)
            .field("dc_ip", &self.dc_ip)
            .field("dc_hostname", &self.dc_hostname)
            .field("service_account", &self.service_account)
            .field("service_password", &"***")
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

/// Reads `NTLM_*` environment variables (see [`ConfigKey::env_var`]) at lookup
/// time.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn value(&self, key: ConfigKey) -> Option<String> {
        env::var(key.env_var()).ok()
    }
}

/// A base source with selected keys overridden.
///
/// Overrides win whenever they hold a value for the key; everything else is
/// delegated to the base source. Validation still runs through the provided
/// [`ConfigSource`] methods.
#[derive(Clone)]
pub struct LayeredConfig {
    base: Arc<dyn ConfigSource>,
    overrides: BTreeMap<ConfigKey, String>,
}

impl LayeredConfig {
    pub fn new(base: impl ConfigSource + 'static) -> Self {
        Self {
            base: Arc::new(base),
            overrides: BTreeMap::new(),
        }
    }

    /// Layer every `NTLM_*` variable present in the environment over `base`.
    pub fn with_env(base: impl ConfigSource + 'static) -> Self {
        let mut layered = Self::new(base);
        for key in ConfigKey::ALL {
            if let Some(value) = EnvConfig.value(key) {
                layered.overrides.insert(key, value);
            }
        }
        layered
    }

    #[must_use]
    pub fn with_override(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.overrides.insert(key, value.into());
        self
    }
}

impl ConfigSource for LayeredConfig {
    fn value(&self, key: ConfigKey) -> Option<String> {
        self.overrides
            .get(&key)
            .cloned()
            .or_else(|| self.base.value(key))
    }
}

impl fmt::Debug for LayeredConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.overrides.keys().map(|key| key.as_str()).collect();
        f.debug_struct("LayeredConfig")
            .field("overridden", &keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::InitializationError;
    use std::time::Duration;

    fn base() -> StaticConfig {
        StaticConfig::new()
            .with_enabled(true)
            .with_domain("corp.local")
            .with_dc_ip("10.10.0.1")
            .with_dc_hostname("adc01")
            .with_service_account("GATE$@corp.local")
            .with_service_password(SecretString::from("hunter2".to_string()))
    }

    #[test]
    fn static_config_answers_every_key() {
        let config = base().with_cache_ttl_seconds(30).with_cache_capacity(5);
        assert!(config.is_enabled());
        assert_eq!(config.dc_hostname().unwrap(), "adc01");
        assert_eq!(config.service_password().unwrap().expose_secret(), "hunter2");
        assert_eq!(config.cache_ttl().unwrap(), Duration::from_secs(30));
        assert_eq!(config.cache_capacity().unwrap(), 5);
    }

    #[test]
    fn static_config_debug_masks_password() {
        let printed = format!("{:?}", base());
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn static_config_defaults_to_disabled() {
        assert!(!StaticConfig::new().is_enabled());
    }

    #[test]
    fn env_config_reads_prefixed_variables() {
        temp_env::with_vars(
            [
                ("NTLM_ENABLED", Some("true")),
                ("NTLM_DOMAIN", Some("corp.local")),
                ("NTLM_DC_IP", None),
                ("NTLM_CACHE_CAPACITY", Some("7")),
            ],
            || {
                let config = EnvConfig;
                assert!(config.is_enabled());
                assert_eq!(config.domain().unwrap(), "corp.local");
                assert!(matches!(
                    config.dc_ip(),
                    Err(InitializationError::MissingValue(ConfigKey::DcIp))
                ));
                assert_eq!(config.cache_capacity().unwrap(), 7);
            },
        );
    }

    #[test]
    fn layered_config_overrides_selected_keys() {
        let config = LayeredConfig::new(base())
            .with_override(ConfigKey::DcIp, "10.10.0.2")
            .with_override(ConfigKey::CacheTtlSeconds, "5");

        assert_eq!(config.dc_ip().unwrap(), "10.10.0.2");
        assert_eq!(config.domain().unwrap(), "corp.local");
        assert_eq!(config.cache_ttl().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn layered_config_still_validates_overrides() {
        let config = LayeredConfig::new(base()).with_override(ConfigKey::DcHostname, " ");
        assert!(matches!(
            config.dc_hostname(),
            Err(InitializationError::MissingValue(ConfigKey::DcHostname))
        ));
    }

    #[test]
    fn layered_config_with_env_prefers_environment() {
        temp_env::with_vars(
            [
                ("NTLM_ENABLED", Some("false")),
                ("NTLM_DOMAIN", Some("branch.corp.local")),
                ("NTLM_DC_IP", None),
                ("NTLM_DC_HOSTNAME", None),
                ("NTLM_SERVICE_ACCOUNT", None),
                ("NTLM_SERVICE_PASSWORD", None),
                ("NTLM_CACHE_TTL_SECONDS", None),
                ("NTLM_CACHE_CAPACITY", None),
            ],
            || {
                let config = LayeredConfig::with_env(base());
                assert!(!config.is_enabled());
                assert_eq!(config.domain().unwrap(), "branch.corp.local");
                assert_eq!(config.dc_ip().unwrap(), "10.10.0.1");

                let printed = format!("{config:?}");
                assert!(printed.contains("domain"));
                assert!(!printed.contains("branch.corp.local"));
            },
        );
    }
}
