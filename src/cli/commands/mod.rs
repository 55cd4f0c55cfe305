use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};
use std::convert::Infallible;
use tracing::Level;

use crate::config::{parse_enabled, ConfigKey};

pub const ARG_ENABLED: &str = "enabled";
pub const ARG_DOMAIN: &str = "domain";
pub const ARG_DC_IP: &str = "dc-ip";
pub const ARG_DC_HOSTNAME: &str = "dc-hostname";
pub const ARG_SERVICE_ACCOUNT: &str = "service-account";
pub const ARG_SERVICE_PASSWORD: &str = "service-password";
pub const ARG_CACHE_TTL_SECONDS: &str = "cache-ttl-seconds";
pub const ARG_CACHE_CAPACITY: &str = "cache-capacity";
pub const ARG_VERBOSITY: &str = "verbosity";

const LOG_LEVEL_ENV: &str = "NTLM_LOG_LEVEL";

/// Indexed by `-v` count.
const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Tracing level for a `-v` count; counts past the last level saturate.
#[must_use]
pub fn verbosity_level(count: u8) -> Level {
    LEVELS[usize::from(count).min(LEVELS.len() - 1)]
}

/// `NTLM_LOG_LEVEL` accepts a level name in any case or a `-v` count.
fn parse_verbosity(value: &str) -> Result<u8, String> {
    let index = match value.trim().parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            let level = value
                .trim()
                .parse::<Level>()
                .map_err(|_| format!("invalid log level: {value}"))?;
            LEVELS
                .iter()
                .position(|candidate| *candidate == level)
                .unwrap_or_default()
        }
    };
    if index >= LEVELS.len() {
        return Err(format!("invalid log level: {value}"));
    }
    u8::try_from(index).map_err(|err| err.to_string())
}

fn parse_enabled_flag(value: &str) -> Result<bool, Infallible> {
    Ok(parse_enabled(value))
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("ntlm-gate")
        .about("Validate an NTLMv2 authentication configuration")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_ENABLED)
                .long("enabled")
                .help("Enable NTLMv2 authentication; when off nothing else is checked")
                .env(ConfigKey::Enabled.env_var())
                .action(ArgAction::SetTrue)
                .value_parser(parse_enabled_flag),
        )
        .arg(
            Arg::new(ARG_DOMAIN)
                .long("domain")
                .help("Windows domain name, example: CORP")
                .env(ConfigKey::Domain.env_var()),
        )
        .arg(
            Arg::new(ARG_DC_IP)
                .long("dc-ip")
                .help("Domain controller IP address")
                .env(ConfigKey::DcIp.env_var()),
        )
        .arg(
            Arg::new(ARG_DC_HOSTNAME)
                .long("dc-hostname")
                .help("Domain controller hostname, example: dc01.corp.example")
                .env(ConfigKey::DcHostname.env_var()),
        )
        .arg(
            Arg::new(ARG_SERVICE_ACCOUNT)
                .long("service-account")
                .help("Computer account used to talk to the domain controller, example: GATE$")
                .env(ConfigKey::ServiceAccount.env_var()),
        )
        .arg(
            Arg::new(ARG_SERVICE_PASSWORD)
                .long("service-password")
                .help("Computer account password")
                .env(ConfigKey::ServicePassword.env_var())
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CACHE_TTL_SECONDS)
                .long("cache-ttl-seconds")
                .help("Seconds a server challenge stays valid (default: 60)")
                .env(ConfigKey::CacheTtlSeconds.env_var())
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_CACHE_CAPACITY)
                .long("cache-capacity")
                .help("Maximum number of handshakes in flight (default: 100)")
                .env(ConfigKey::CacheCapacity.env_var())
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Log level, repeat for more: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE")
                .env(LOG_LEVEL_ENV)
                .global(true)
                .action(ArgAction::Count)
                .value_parser(parse_verbosity),
        )
}
