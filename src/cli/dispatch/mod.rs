use crate::{
    cli::{
        actions::{check::Args, Action},
        commands::{
            ARG_CACHE_CAPACITY, ARG_CACHE_TTL_SECONDS, ARG_DC_HOSTNAME, ARG_DC_IP, ARG_DOMAIN,
            ARG_ENABLED, ARG_SERVICE_ACCOUNT, ARG_SERVICE_PASSWORD,
        },
    },
    config::StaticConfig,
};
use anyhow::Result;
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let mut config = StaticConfig::new().with_enabled(matches.get_flag(ARG_ENABLED));

    if let Some(domain) = matches.get_one::<String>(ARG_DOMAIN) {
        config = config.with_domain(domain);
    }
    if let Some(dc_ip) = matches.get_one::<String>(ARG_DC_IP) {
        config = config.with_dc_ip(dc_ip);
    }
    if let Some(dc_hostname) = matches.get_one::<String>(ARG_DC_HOSTNAME) {
        config = config.with_dc_hostname(dc_hostname);
    }
    if let Some(account) = matches.get_one::<String>(ARG_SERVICE_ACCOUNT) {
        config = config.with_service_account(account);
    }
    if let Some(password) = matches.get_one::<String>(ARG_SERVICE_PASSWORD) {
        config = config.with_service_password(SecretString::from(password.clone()));
    }
    if let Some(seconds) = matches.get_one::<u64>(ARG_CACHE_TTL_SECONDS) {
        config = config.with_cache_ttl_seconds(*seconds);
    }
    if let Some(capacity) = matches.get_one::<usize>(ARG_CACHE_CAPACITY) {
        config = config.with_cache_capacity(*capacity);
    }

    Ok(Action::Check(Args { config }))
}
