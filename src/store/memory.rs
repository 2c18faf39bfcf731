use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::RunStore;
use crate::currency_symbols::{SymbolsRun, SymbolsSnapshot};
use crate::error::StoreError;
use crate::exchange_rate::{RateRun, RateRunWithEntries, RateSnapshot};

/// In-process store with the same ordering rules as the Postgres one.
#[derive(Default)]
pub struct MemoryRunStore {
    rate_runs: Mutex<Vec<RateRunWithEntries>>,
    symbols_runs: Mutex<Vec<SymbolsRun>>,
    clock: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the `fetched_at` given to subsequent inserts.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = Some(now);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.lock().unwrap().unwrap_or_else(Utc::now)
    }

    pub fn rate_run_count(&self) -> usize {
        self.rate_runs.lock().unwrap().len()
    }

    pub fn symbols_run_count(&self) -> usize {
        self.symbols_runs.lock().unwrap().len()
    }
}

// Later entries win ties, matching `seq DESC`.
fn latest<'a, T, F>(items: impl Iterator<Item = &'a T>, fetched_at: F) -> Option<&'a T>
where
    T: 'a,
    F: Fn(&T) -> DateTime<Utc>,
{
    items.fold(None, |best, item| match best {
        Some(b) if fetched_at(b) > fetched_at(item) => Some(b),
        _ => Some(item),
    })
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert_rate_run(
        &self,
        provider: &str,
        snapshot: &RateSnapshot,
    ) -> Result<RateRun, StoreError> {
        let run = RateRun {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            base: snapshot.base.clone(),
            date: snapshot.date,
            fetched_at: self.now(),
        };
        self.rate_runs.lock().unwrap().push(RateRunWithEntries {
            run: run.clone(),
            rates: snapshot.rates.clone(),
        });
        Ok(run)
    }

    async fn latest_rate_fetches(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let runs = self.rate_runs.lock().unwrap();
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for r in runs.iter() {
            let entry = latest.entry(r.run.provider.clone()).or_insert(r.run.fetched_at);
            if r.run.fetched_at > *entry {
                *entry = r.run.fetched_at;
            }
        }
        Ok(latest)
    }

    async fn latest_rate_runs(&self) -> Result<Vec<RateRunWithEntries>, StoreError> {
        let runs = self.rate_runs.lock().unwrap();
        let mut providers: Vec<&str> = runs.iter().map(|r| r.run.provider.as_str()).collect();
        providers.sort_unstable();
        providers.dedup();

        Ok(providers
            .into_iter()
            .filter_map(|provider| {
                latest(
                    runs.iter().filter(|r| r.run.provider == provider),
                    |r: &RateRunWithEntries| r.run.fetched_at,
                )
                .cloned()
            })
            .collect())
    }

    async fn latest_rate_run(
        &self,
        provider: &str,
    ) -> Result<Option<RateRunWithEntries>, StoreError> {
        let runs = self.rate_runs.lock().unwrap();
        Ok(latest(
            runs.iter().filter(|r| r.run.provider == provider),
            |r: &RateRunWithEntries| r.run.fetched_at,
        )
        .cloned())
    }

    async fn insert_symbols_run(
        &self,
        provider: &str,
        snapshot: &SymbolsSnapshot,
    ) -> Result<SymbolsRun, StoreError> {
        let run = SymbolsRun {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            fetched_at: self.now(),
            symbols: Json(snapshot.symbols.clone()),
        };
        self.symbols_runs.lock().unwrap().push(run.clone());
        Ok(run)
    }

    async fn latest_symbols_run(&self, provider: &str) -> Result<Option<SymbolsRun>, StoreError> {
        let runs = self.symbols_runs.lock().unwrap();
        Ok(latest(
            runs.iter().filter(|r| r.provider == provider),
            |r: &SymbolsRun| r.fetched_at,
        )
        .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn snapshot(usd: f64) -> RateSnapshot {
        RateSnapshot {
            base: "EUR".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 4).unwrap(),
            rates: HashMap::from([("USD".to_string(), usd)]),
        }
    }

    #[tokio::test]
    async fn test_latest_by_fetched_at() {
        let store = MemoryRunStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 2, 4, 12, 0, 0).unwrap();

        store.set_now(t0 + Duration::hours(1));
        store.insert_rate_run("fixer", &snapshot(1.1)).await.unwrap();
        store.set_now(t0);
        store.insert_rate_run("fixer", &snapshot(1.0)).await.unwrap();

        let latest = store.latest_rate_run("fixer").await.unwrap().unwrap();
        assert_eq!(latest.rates["USD"], 1.1);

        let fetches = store.latest_rate_fetches().await.unwrap();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches["fixer"], t0 + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_equal_timestamps_latest_insert_wins() {
        let store = MemoryRunStore::new();
        store.set_now(Utc.with_ymd_and_hms(2024, 2, 4, 12, 0, 0).unwrap());

        store.insert_rate_run("fixer", &snapshot(1.0)).await.unwrap();
        let second = store.insert_rate_run("fixer", &snapshot(2.0)).await.unwrap();

        let latest = store.latest_rate_run("fixer").await.unwrap().unwrap();
        assert_eq!(latest.run.id, second.id);
        assert_eq!(store.latest_rate_runs().await.unwrap().len(), 1);
    }
}
