//! Append-only storage of fetch runs.
//!
//! Runs are only ever inserted. "Latest" means greatest `fetched_at`, ties
//! broken by insertion order.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::currency_symbols::{SymbolsRun, SymbolsSnapshot};
use crate::error::StoreError;
use crate::exchange_rate::{RateRun, RateRunWithEntries, RateSnapshot};

pub use postgres::PgRunStore;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a rate run and all of its entries atomically.
    async fn insert_rate_run(
        &self,
        provider: &str,
        snapshot: &RateSnapshot,
    ) -> Result<RateRun, StoreError>;

    /// `fetched_at` of the most recent rate run per provider, without entries.
    async fn latest_rate_fetches(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError>;

    /// The most recent rate run of every provider that has one.
    async fn latest_rate_runs(&self) -> Result<Vec<RateRunWithEntries>, StoreError>;

    async fn latest_rate_run(
        &self,
        provider: &str,
    ) -> Result<Option<RateRunWithEntries>, StoreError>;

    async fn insert_symbols_run(
        &self,
        provider: &str,
        snapshot: &SymbolsSnapshot,
    ) -> Result<SymbolsRun, StoreError>;

    async fn latest_symbols_run(&self, provider: &str) -> Result<Option<SymbolsRun>, StoreError>;
}
