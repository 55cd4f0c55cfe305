use crate::{
    cache::{ChallengeCache, MemoryChallengeCache},
    config::{ConfigSnapshot, ConfigSource, StaticConfig},
};
use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: StaticConfig,
}

/// Validate the configuration the way the middleware does at startup.
///
/// # Errors
/// Returns the initialization error the middleware would fail with.
pub async fn handle(args: Args) -> Result<()> {
    println!("{}", check(&args.config).await?);
    Ok(())
}

async fn check(config: &StaticConfig) -> Result<String> {
    if !config.is_enabled() {
        info!("NTLMv2 filter disabled");
        return Ok("NTLMv2 authentication is disabled".to_string());
    }

    let snapshot = ConfigSnapshot::load(config).context("Invalid NTLMv2 configuration")?;

    let cache = MemoryChallengeCache::new(snapshot.cache())
        .context("Failed to start the challenge cache")?;
    cache.dispose().await;

    let settings = snapshot.cache();
    Ok(format!(
        "NTLMv2 configuration OK: domain {}, domain controller {} ({}), account {}, challenge TTL {}s, capacity {}",
        snapshot.domain(),
        snapshot.dc_hostname(),
        snapshot.dc_ip(),
        snapshot.service_account(),
        settings.ttl.as_secs(),
        settings.capacity,
    ))
}
