//! Upstream rate and symbol providers.
//!
//! Every provider normalizes its upstream format into a [`RateSnapshot`] or a
//! [`SymbolsSnapshot`]. The sync orchestrator only sees the traits below, so
//! providers can be swapped or faked without touching it. Providers never
//! retry; a failed call is reported and the next sync tries again.

pub mod cbr;
pub mod fixer;
pub mod frankfurter;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::{Client, StatusCode};

use crate::config::Config;
use crate::currency_symbols::SymbolsSnapshot;
use crate::error::AdapterError;
use crate::exchange_rate::RateSnapshot;

pub use cbr::CbrProvider;
pub use fixer::FixerProvider;
pub use frankfurter::FrankfurterProvider;

/// Capability "fetch rates for a base currency".
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Name used in storage, reports and the priority order.
    fn name(&self) -> &str;

    /// Fetch the latest rates, expressed against `base`.
    async fn fetch(&self, base: &str) -> Result<RateSnapshot, AdapterError>;
}

/// Capability "fetch currency display names".
#[async_trait]
pub trait SymbolProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_symbols(&self) -> Result<SymbolsSnapshot, AdapterError>;
}

/// The closed set of upstream sources this service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Fixer,
    Frankfurter,
    Cbr,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Fixer => fixer::PROVIDER_ID,
            ProviderKind::Frankfurter => frankfurter::PROVIDER_ID,
            ProviderKind::Cbr => cbr::PROVIDER_ID,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            fixer::PROVIDER_ID => Ok(ProviderKind::Fixer),
            frankfurter::PROVIDER_ID => Ok(ProviderKind::Frankfurter),
            cbr::PROVIDER_ID => Ok(ProviderKind::Cbr),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Providers selected by configuration.
#[derive(Clone, Default)]
pub struct Providers {
    pub rates: Vec<Arc<dyn RateProvider>>,
    pub symbols: Vec<Arc<dyn SymbolProvider>>,
}

/// Build the configured providers sharing one HTTP client.
///
/// Fixer needs an access key; without one it is left out with a warning
/// instead of failing every sync.
pub fn build_providers(config: &Config) -> Result<Providers, reqwest::Error> {
    let client = Client::builder()
        .timeout(config.adapter_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let mut providers = Providers::default();

    for kind in &config.rate_providers {
        let provider: Arc<dyn RateProvider> = match kind {
            ProviderKind::Fixer => match &config.fixer_api_key {
                Some(key) => Arc::new(FixerProvider::new(client.clone(), key.clone())),
                None => {
                    warn!("FIXER_API_KEY not set, fixer rates disabled");
                    continue;
                }
            },
            ProviderKind::Frankfurter => Arc::new(FrankfurterProvider::new(client.clone())),
            ProviderKind::Cbr => Arc::new(CbrProvider::new(client.clone())),
        };
        providers.rates.push(provider);
    }

    match config.symbols_provider {
        ProviderKind::Fixer => match &config.fixer_api_key {
            Some(key) => providers
                .symbols
                .push(Arc::new(FixerProvider::new(client.clone(), key.clone()))),
            None => warn!("FIXER_API_KEY not set, fixer symbols disabled"),
        },
        other => warn!("{} does not publish currency symbols", other),
    }

    info!(
        "Configured providers: rates=[{}], symbols=[{}]",
        providers
            .rates
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(","),
        providers
            .symbols
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(",")
    );

    Ok(providers)
}

/// Re-express `rates` (quoted against `source_base`) against `target`.
///
/// The target currency is always exactly 1.0 in the result.
pub fn rebase(
    provider: &str,
    source_base: &str,
    target: &str,
    rates: &HashMap<String, f64>,
) -> Result<HashMap<String, f64>, AdapterError> {
    if source_base.eq_ignore_ascii_case(target) {
        let mut rebased = rates.clone();
        rebased.insert(target.to_string(), 1.0);
        return Ok(rebased);
    }

    let target_per_base = match rates.get(target) {
        Some(rate) if *rate != 0.0 && rate.is_finite() => *rate,
        Some(_) => {
            return Err(AdapterError::bad_response(
                provider,
                format!("{} rate is zero or not finite, cannot rebase from {}", target, source_base),
            ));
        }
        None => {
            return Err(AdapterError::bad_response(
                provider,
                format!("{} rate missing, cannot rebase from {}", target, source_base),
            ));
        }
    };

    let mut rebased: HashMap<String, f64> = rates
        .iter()
        .map(|(code, rate)| (code.clone(), rate / target_per_base))
        .collect();
    rebased
        .entry(source_base.to_string())
        .or_insert(1.0 / target_per_base);
    rebased.insert(target.to_string(), 1.0);

    Ok(rebased)
}

/// Map a transport-level failure to the adapter taxonomy.
///
/// The URL is stripped since it may carry an access key.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AdapterError {
    if let Some(status) = err.status() {
        return status_error(provider, status);
    }
    let decode = err.is_decode();
    let message = err.without_url().to_string();
    if decode {
        AdapterError::bad_response(provider, message)
    } else {
        AdapterError::unreachable(provider, message)
    }
}

/// Map a non-success HTTP status to the adapter taxonomy.
pub(crate) fn status_error(provider: &str, status: StatusCode) -> AdapterError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::rate_limited(provider, status.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::auth_rejected(provider, status.to_string())
        }
        s => AdapterError::bad_response(provider, s.to_string()),
    }
}

/// Reject snapshots that would persist an empty run.
pub(crate) fn ensure_not_empty(
    provider: &str,
    rates: &HashMap<String, f64>,
) -> Result<(), AdapterError> {
    if rates.is_empty() {
        return Err(AdapterError::bad_response(provider, "no rates in response"));
    }
    Ok(())
}
