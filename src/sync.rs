//! Fetch every configured provider and persist what succeeded.
//!
//! A provider failing never stops the others: each outcome is recorded in the
//! [`SyncReport`] and only a run where every attempted provider failed is an
//! error. The merged view is not stored; it is recomputed from the latest runs
//! at read time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

use crate::config::Config;
use crate::currency_symbols::SymbolsSnapshot;
use crate::error::{AdapterError, FailureKind};
use crate::exchange_rate::{RateSnapshot, STORAGE_BASE};
use crate::providers::{Providers, RateProvider, SymbolProvider};
use crate::store::RunStore;

const FRESH_CACHE: &str = "fresh-cache";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Succeeded { run_id: Uuid, entries: usize },
    Skipped { reason: String },
    Failed { kind: FailureKind, message: String },
}

impl ProviderOutcome {
    fn failed(err: &AdapterError) -> Self {
        ProviderOutcome::Failed {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProviderOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub rates: BTreeMap<String, ProviderOutcome>,
    pub symbols: BTreeMap<String, ProviderOutcome>,
}

impl SyncReport {
    fn outcomes(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.rates.values().chain(self.symbols.values())
    }

    /// Every provider that was actually called failed.
    pub fn is_total_failure(&self) -> bool {
        let mut attempted = self
            .outcomes()
            .filter(|o| !matches!(o, ProviderOutcome::Skipped { .. }))
            .peekable();
        attempted.peek().is_some() && attempted.all(ProviderOutcome::is_failure)
    }

    pub fn status(&self) -> SyncStatus {
        if self.is_total_failure() {
            SyncStatus::Failed
        } else if self.outcomes().any(ProviderOutcome::is_failure) {
            SyncStatus::Partial
        } else {
            SyncStatus::Ok
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("every provider failed")]
    TotalFailure(SyncReport),
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_currency: String,
    pub adapter_timeout: Duration,
    pub rates_ttl: Duration,
    pub symbols_ttl: Duration,
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_currency: STORAGE_BASE.to_string(),
            adapter_timeout: config.adapter_timeout,
            rates_ttl: config.rates_ttl,
            symbols_ttl: config.symbols_ttl,
        }
    }
}

pub struct SyncService {
    store: Arc<dyn RunStore>,
    providers: Providers,
    settings: SyncSettings,
}

fn within_ttl(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(fetched_at) < ttl
}

impl SyncService {
    pub fn new(store: Arc<dyn RunStore>, providers: Providers, settings: SyncSettings) -> Self {
        Self {
            store,
            providers,
            settings,
        }
    }

    /// Run one sync.
    ///
    /// Unless `force` is set, providers whose latest run is younger than its
    /// TTL are skipped. `deadline` caps every adapter call on top of the
    /// per-adapter timeout.
    pub async fn sync_all(
        &self,
        force: bool,
        deadline: Option<Instant>,
    ) -> Result<SyncReport, SyncError> {
        info!(
            "Starting sync: force={}, rate_providers={}, symbol_providers={}",
            force,
            self.providers.rates.len(),
            self.providers.symbols.len()
        );
        let now = Utc::now();
        let mut report = SyncReport::default();

        let (due_rates, due_symbols) = if force {
            (
                self.providers.rates.iter().collect::<Vec<_>>(),
                self.providers.symbols.iter().collect::<Vec<_>>(),
            )
        } else {
            (
                self.due_rate_providers(now, &mut report).await,
                self.due_symbol_providers(now, &mut report).await,
            )
        };

        let (rate_results, symbol_results) = tokio::join!(
            join_all(due_rates.into_iter().map(|p| self.fetch_rates(Arc::as_ref(p), deadline))),
            join_all(
                due_symbols
                    .into_iter()
                    .map(|p| self.fetch_symbols(Arc::as_ref(p), deadline))
            ),
        );

        let (rate_outcomes, symbol_outcomes) = tokio::join!(
            join_all(rate_results.into_iter().map(|(name, result)| self.persist_rates(name, result))),
            join_all(
                symbol_results
                    .into_iter()
                    .map(|(name, result)| self.persist_symbols(name, result))
            ),
        );
        report.rates.extend(rate_outcomes);
        report.symbols.extend(symbol_outcomes);

        if report.is_total_failure() {
            error!("Sync failed for every provider: {:?}", report);
            return Err(SyncError::TotalFailure(report));
        }

        info!(
            "Sync complete: status={:?}, rates={}, symbols={}",
            report.status(),
            report.rates.len(),
            report.symbols.len()
        );
        Ok(report)
    }

    async fn due_rate_providers(
        &self,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Vec<&Arc<dyn RateProvider>> {
        let latest = match self.store.latest_rate_fetches().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("Could not read latest rate runs, fetching all: {}", e);
                HashMap::new()
            }
        };

        let mut due = Vec::new();
        for provider in &self.providers.rates {
            match latest.get(provider.name()) {
                Some(fetched_at) if within_ttl(*fetched_at, self.settings.rates_ttl, now) => {
                    info!("Skipping {}: cache is fresh", provider.name());
                    report.rates.insert(
                        provider.name().to_string(),
                        ProviderOutcome::Skipped {
                            reason: FRESH_CACHE.to_string(),
                        },
                    );
                }
                _ => due.push(provider),
            }
        }
        due
    }

    async fn due_symbol_providers(
        &self,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Vec<&Arc<dyn SymbolProvider>> {
        let mut due = Vec::new();
        for provider in &self.providers.symbols {
            let fresh = match self.store.latest_symbols_run(provider.name()).await {
                Ok(Some(run)) => within_ttl(run.fetched_at, self.settings.symbols_ttl, now),
                Ok(None) => false,
                Err(e) => {
                    warn!("Could not read latest symbols for {}: {}", provider.name(), e);
                    false
                }
            };

            if fresh {
                info!("Skipping {} symbols: cache is fresh", provider.name());
                report.symbols.insert(
                    provider.name().to_string(),
                    ProviderOutcome::Skipped {
                        reason: FRESH_CACHE.to_string(),
                    },
                );
            } else {
                due.push(provider);
            }
        }
        due
    }

    fn call_deadline(&self, deadline: Option<Instant>) -> Instant {
        let own = Instant::now() + self.settings.adapter_timeout;
        match deadline {
            Some(deadline) if deadline < own => deadline,
            _ => own,
        }
    }

    async fn fetch_rates(
        &self,
        provider: &dyn RateProvider,
        deadline: Option<Instant>,
    ) -> (String, Result<RateSnapshot, AdapterError>) {
        let name = provider.name().to_string();
        debug!("Syncing rates from {}", name);
        let result = match timeout_at(
            self.call_deadline(deadline),
            provider.fetch(&self.settings.base_currency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::unreachable(&name, "timed out")),
        };
        (name, result)
    }

    async fn fetch_symbols(
        &self,
        provider: &dyn SymbolProvider,
        deadline: Option<Instant>,
    ) -> (String, Result<SymbolsSnapshot, AdapterError>) {
        let name = provider.name().to_string();
        debug!("Syncing symbols from {}", name);
        let result = match timeout_at(self.call_deadline(deadline), provider.fetch_symbols()).await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::unreachable(&name, "timed out")),
        };
        (name, result)
    }

    async fn persist_rates(
        &self,
        name: String,
        result: Result<RateSnapshot, AdapterError>,
    ) -> (String, ProviderOutcome) {
        let outcome = match result {
            Ok(snapshot) => match self.store.insert_rate_run(&name, &snapshot).await {
                Ok(run) => {
                    info!("Synced {}: run_id={}, num_rates={}", name, run.id, snapshot.rates.len());
                    ProviderOutcome::Succeeded {
                        run_id: run.id,
                        entries: snapshot.rates.len(),
                    }
                }
                Err(e) => {
                    error!("Failed to store rates for {}: {}", name, e);
                    ProviderOutcome::Failed {
                        kind: FailureKind::Storage,
                        message: "failed to store run".to_string(),
                    }
                }
            },
            Err(e) => {
                warn!("Error syncing {}: {}", name, e);
                ProviderOutcome::failed(&e)
            }
        };
        (name, outcome)
    }

    async fn persist_symbols(
        &self,
        name: String,
        result: Result<SymbolsSnapshot, AdapterError>,
    ) -> (String, ProviderOutcome) {
        let outcome = match result {
            Ok(snapshot) => match self.store.insert_symbols_run(&name, &snapshot).await {
                Ok(run) => {
                    info!("Symbols synced from {}: run_id={}", name, run.id);
                    ProviderOutcome::Succeeded {
                        run_id: run.id,
                        entries: snapshot.symbols.len(),
                    }
                }
                Err(e) => {
                    error!("Failed to store symbols for {}: {}", name, e);
                    ProviderOutcome::Failed {
                        kind: FailureKind::Storage,
                        message: "failed to store run".to_string(),
                    }
                }
            },
            Err(e) => {
                warn!("Error syncing symbols from {}: {}", name, e);
                ProviderOutcome::failed(&e)
            }
        };
        (name, outcome)
    }
}
