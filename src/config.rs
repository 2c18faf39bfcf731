use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::providers::ProviderKind;

const HOUR: u64 = 60 * 60;

/// Upper bound for per-call timeouts and the sync deadline, in seconds.
const MAX_WAIT_SECS: u64 = 24 * HOUR;

/// Settings read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub fixer_api_key: Option<String>,
    /// Secret required by `POST /jobs/sync`.
    pub sync_api_key: Option<String>,
    /// Provider names, highest priority first. Only these take part in the default merge.
    pub provider_priority: Vec<String>,
    pub rate_providers: Vec<ProviderKind>,
    pub symbols_provider: ProviderKind,
    /// Also the scheduler interval.
    pub rates_ttl: Duration,
    pub symbols_ttl: Duration,
    pub allow_origins: Vec<String>,
    pub adapter_timeout: Duration,
    pub sync_deadline: Duration,
    pub enable_scheduler: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(anyhow!("DATABASE_URL must be set"))?;

        let provider_priority =
            parse_list(&get("PROVIDER_PRIORITY").unwrap_or_else(|| "fixer,frankfurter".into()));

        let rate_providers = match get("RATE_PROVIDERS") {
            Some(list) => parse_list(&list),
            None => provider_priority.clone(),
        }
        .iter()
        .map(|name| name.parse::<ProviderKind>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid RATE_PROVIDERS")?;

        let symbols_provider = get("SYMBOLS_PROVIDER")
            .unwrap_or_else(|| "fixer".into())
            .parse::<ProviderKind>()
            .context("Invalid SYMBOLS_PROVIDER")?;

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            fixer_api_key: get("FIXER_API_KEY"),
            sync_api_key: get("SYNC_API_KEY"),
            provider_priority,
            rate_providers,
            symbols_provider,
            rates_ttl: parse_hours(&get, "SYNC_INTERVAL_HOURS", 24)?,
            symbols_ttl: parse_hours(&get, "SYMBOLS_CACHE_HOURS", 4320)?,
            allow_origins: parse_list(&get("ALLOW_ORIGINS").unwrap_or_else(|| "*".into())),
            adapter_timeout: parse_wait(&get, "ADAPTER_TIMEOUT_SECS", 20)?,
            sync_deadline: parse_wait(&get, "SYNC_DEADLINE_SECS", 60)?,
            enable_scheduler: parse_or(&get, "ENABLE_SCHEDULER", false)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_hours<G>(get: &G, key: &str, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let hours: u64 = parse_or(get, key, default)?;
    hours
        .checked_mul(HOUR)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("Invalid value for {}: {} hours is too large", key, hours))
}

fn parse_wait<G>(get: &G, key: &str, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(get, key, default)?;
    if secs > MAX_WAIT_SECS {
        return Err(anyhow!(
            "Invalid value for {}: {} exceeds {} seconds",
            key,
            secs,
            MAX_WAIT_SECS
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
